// Integration tests for the shared parameter store

use std::sync::Arc;
use std::thread;
use wavegen::config::GeneratorConfig;
use wavegen::engine::{ControlMode, Field, ParamError, ParameterStore};
use wavegen::gen::{SampleScaler, WaveformKind};

fn percentage_store() -> ParameterStore {
    let config = GeneratorConfig::percentage();
    ParameterStore::new(&config, config.initial_snapshot()).unwrap()
}

fn offset_store() -> ParameterStore {
    let config = GeneratorConfig::offset();
    ParameterStore::new(&config, config.initial_snapshot()).unwrap()
}

#[test]
fn test_write_then_regenerate() {
    let store = percentage_store();
    store
        .write(|s| {
            s.kind = WaveformKind::Sine;
            s.frequency = 50.0;
            s.amplitude = 25.0;
        })
        .unwrap();

    let buffer = store.regenerate();
    assert_eq!(buffer.len(), 100);
    assert_eq!(buffer[0], 8192, "sine starts at zero, scaled to round(0x7FFF * 0.25)");
    assert_eq!(buffer[25], SampleScaler::percentage().scale(1.0, 25.0, 0.0));
}

#[test]
fn test_out_of_range_amplitude_is_rejected() {
    let store = percentage_store();
    store.write(|s| s.amplitude = 25.0).unwrap();
    let before = store.read();

    let err = store.write(|s| s.amplitude = 150.0).unwrap_err();
    assert!(matches!(err, ParamError::OutOfRange { field: Field::Amplitude, .. }));
    assert_eq!(store.read(), before, "a rejected write must not change anything");
}

#[test]
fn test_rejected_write_changes_no_field() {
    let store = percentage_store();
    let before = store.read();
    let result = store.write(|s| {
        s.kind = WaveformKind::Pulse;
        s.frequency = 2000.0;
    });
    assert!(result.is_err());
    assert_eq!(store.read(), before, "valid fields of a rejected write are dropped too");
}

#[test]
fn test_frequency_bounds_are_inclusive() {
    let store = percentage_store();
    assert!(store.write(|s| s.frequency = 1.0).is_ok());
    assert!(store.write(|s| s.frequency = 1000.0).is_ok());
    assert!(store.write(|s| s.frequency = 0.999_999).is_err());
    assert!(store.write(|s| s.frequency = 1000.000_001).is_err());
    assert!(store.write(|s| s.frequency = f64::NAN).is_err());
}

#[test]
fn test_amplitude_bounds_are_inclusive() {
    let store = percentage_store();
    assert!(store.write(|s| s.amplitude = 0.0).is_ok());
    assert!(store.write(|s| s.amplitude = 100.0).is_ok());
    assert!(store.write(|s| s.amplitude = -0.1).is_err());
}

#[test]
fn test_offset_amplitude_must_not_exceed_mean() {
    let store = offset_store();
    store.write(|s| s.amplitude = 1.0).unwrap();
    store.write(|s| s.mean = 1.0).unwrap();

    let err = store.write(|s| s.amplitude = 1.5).unwrap_err();
    assert!(matches!(err, ParamError::AmplitudeExceedsMean { .. }));
    assert!(store.write(|s| s.mean = 0.9).is_err());

    // raising both together is fine
    store
        .write(|s| {
            s.mean = 2.0;
            s.amplitude = 1.5;
        })
        .unwrap();
    assert_eq!(store.read().amplitude, 1.5);
}

#[test]
fn test_writes_cannot_touch_running_flag() {
    let store = percentage_store();
    assert_eq!(store.write(|s| s.running = false), Err(ParamError::RunningFlag));
    assert!(store.is_running());
}

#[test]
fn test_stop_transitions_once() {
    let store = percentage_store();
    assert!(store.stop(), "first stop clears the flag");
    assert!(!store.stop(), "second stop is a no-op");
    assert!(!store.is_running());
    assert_eq!(store.write(|s| s.running = true), Err(ParamError::RunningFlag));
    assert!(!store.is_running(), "stopped is terminal");
}

#[test]
fn test_regenerate_is_idempotent() {
    let store = offset_store();
    let first = store.regenerate();
    let second = store.regenerate();
    assert_eq!(first, second);
    assert_eq!(store.buffer(), first);
}

#[test]
fn test_buffer_follows_shape_changes() {
    let store = percentage_store();
    let square = store.buffer();
    store.write(|s| s.kind = WaveformKind::Flat).unwrap();
    let flat = store.buffer();
    assert_ne!(square, flat, "a stale buffer is rebuilt on read");
    assert!(flat.iter().all(|&w| w == flat[0]));

    // frequency does not shape the buffer
    store.write(|s| s.frequency = 123.0).unwrap();
    assert_eq!(store.buffer(), flat);
}

#[test]
fn test_render_stops_emitting_after_stop() {
    let store = percentage_store();
    let mut emitted = Vec::new();
    let tick = store
        .render(0, |v| -> Result<(), ()> {
            emitted.push(v);
            Ok(())
        })
        .unwrap();
    assert!(tick.is_some());

    store.stop();
    let tick = store
        .render(1, |v| -> Result<(), ()> {
            emitted.push(v);
            Ok(())
        })
        .unwrap();
    assert!(tick.is_none());
    assert_eq!(emitted.len(), 1, "nothing is emitted once stopped");
}

#[test]
fn test_compare_and_set() {
    let store = percentage_store();
    store.write(|s| s.mode = ControlMode::Knobs).unwrap();

    let applied = store
        .compare_and_set(|s| s.mode.accepts_keyboard(), |s| s.frequency = 10.0)
        .unwrap();
    assert_eq!(applied, None);
    assert_eq!(store.read().frequency, 1.0);

    let committed = store
        .compare_and_set(|s| s.mode.accepts_knobs(), |s| s.frequency = 10.0)
        .unwrap()
        .expect("knob mode accepts the write");
    assert_eq!(committed.frequency, 10.0);
    assert_eq!(store.read(), committed);
}

#[test]
fn test_concurrent_writers_keep_fields_in_domain() {
    let store = Arc::new(offset_store());
    let limits = *store.limits();

    let writers: Vec<_> = (0..4)
        .map(|id| {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..500 {
                    let step = ((i * 7 + id * 13) % 40) as f64 * 0.1;
                    let _ = store.write(|s| {
                        s.frequency = step;
                        s.amplitude = step * 0.7;
                        s.mean = 3.0 - step;
                    });
                }
            })
        })
        .collect();

    for _ in 0..2000 {
        let snapshot = store.read();
        assert!(limits.validate(&snapshot).is_ok(), "reader saw {:?}", snapshot);
    }
    for writer in writers {
        writer.join().unwrap();
    }
    assert!(limits.validate(&store.read()).is_ok());
}

#[test]
fn test_invalid_initial_snapshot_is_rejected() {
    let config = GeneratorConfig::percentage();
    let mut initial = config.initial_snapshot();
    initial.frequency = 0.0;
    assert!(ParameterStore::new(&config, initial).is_err());
}

#[test]
fn test_store_rejects_degenerate_resolution() {
    for resolution in [0, 1] {
        let config = GeneratorConfig {
            resolution,
            ..GeneratorConfig::percentage()
        };
        let err = ParameterStore::new(&config, config.initial_snapshot()).err();
        assert_eq!(err, Some(ParamError::Resolution { resolution, min: 2 }));
    }

    let config = GeneratorConfig {
        resolution: 2,
        ..GeneratorConfig::percentage()
    };
    let store = ParameterStore::new(&config, config.initial_snapshot()).unwrap();
    assert_eq!(store.buffer().len(), 2);
    assert!(store.render(5, |_| Ok::<(), ()>(())).unwrap().is_some());
}
