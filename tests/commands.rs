// Integration tests for the line command interface

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use wavegen::config::GeneratorConfig;
use wavegen::control::{parse, Command, CommandError, CommandInterpreter, CommandLoop, Outcome};
use wavegen::engine::{ControlMode, ParameterStore};
use wavegen::gen::WaveformKind;
use wavegen::shutdown::ShutdownController;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("wavegen-cmd-{}-{}.txt", name, std::process::id()))
}

fn interpreter(config: GeneratorConfig, save_on_exit: Option<PathBuf>) -> (CommandInterpreter, Arc<ParameterStore>) {
    let store = Arc::new(ParameterStore::new(&config, config.initial_snapshot()).unwrap());
    let shutdown = Arc::new(ShutdownController::new(store.clone(), save_on_exit));
    let interpreter = CommandInterpreter::new(store.clone(), shutdown, temp_path("default"));
    (interpreter, store)
}

#[test]
fn test_parse_commands() {
    assert_eq!(parse("freq 50"), Ok(Some(Command::Frequency(50.0))));
    assert_eq!(parse("  AMP   12.5 "), Ok(Some(Command::Amplitude(12.5))));
    assert_eq!(parse("sawtooth"), Ok(Some(Command::Waveform(WaveformKind::Sawtooth))));
    assert_eq!(parse("waveform nothing"), Ok(Some(Command::Waveform(WaveformKind::Flat))));
    assert_eq!(parse("mode dual"), Ok(Some(Command::Mode(ControlMode::Dual))));
    assert_eq!(parse("save"), Ok(Some(Command::Save(None))));
    assert_eq!(parse("   "), Ok(None));
}

#[test]
fn test_parse_errors() {
    assert!(matches!(parse("freq"), Err(CommandError::MissingArgument { .. })));
    assert_eq!(parse("freq fast"), Err(CommandError::BadNumber("fast".to_string())));
    assert_eq!(parse("freq inf"), Err(CommandError::BadNumber("inf".to_string())));
    assert_eq!(parse("jump"), Err(CommandError::Unknown("jump".to_string())));
    assert!(matches!(parse("mode turbo"), Err(CommandError::BadMode(_))));
}

#[test]
fn test_frequency_and_amplitude_commands() {
    let (interp, store) = interpreter(GeneratorConfig::percentage(), None);

    let reply = interp.execute("freq 50");
    assert_eq!(reply.outcome, Outcome::Continue);
    assert!(reply.message.contains("50"), "acknowledgment: {}", reply.message);
    assert_eq!(store.read().frequency, 50.0);

    interp.execute("amp 25");
    assert_eq!(store.read().amplitude, 25.0);
}

#[test]
fn test_frequency_command_bounds() {
    let (interp, store) = interpreter(GeneratorConfig::percentage(), None);

    interp.execute("freq 1");
    assert_eq!(store.read().frequency, 1.0);
    interp.execute("freq 1000");
    assert_eq!(store.read().frequency, 1000.0);

    for line in ["freq 0.9999999", "freq 1000.0000001"] {
        let reply = interp.execute(line);
        assert!(reply.message.starts_with("Rejected"), "{}: {}", line, reply.message);
        assert_eq!(store.read().frequency, 1000.0, "{} left the frequency alone", line);
    }
}

#[test]
fn test_acknowledgment_names_the_committed_value() {
    let (interp, store) = interpreter(GeneratorConfig::percentage(), None);
    interp.execute("mode dual");

    // a knob-side writer keeps moving the frequency while commands are typed
    let done = Arc::new(AtomicBool::new(false));
    let knob = {
        let store = store.clone();
        let done = done.clone();
        thread::spawn(move || {
            while !done.load(Ordering::Relaxed) {
                let _ = store.write(|s| s.frequency = 777.0);
                thread::yield_now();
            }
        })
    };

    for hz in 10..60 {
        let reply = interp.execute(&format!("freq {}", hz));
        assert_eq!(reply.message, format!("Frequency set to {} Hz", hz));
    }
    done.store(true, Ordering::Relaxed);
    knob.join().unwrap();
}

#[test]
fn test_out_of_range_is_reported_and_ignored() {
    let (interp, store) = interpreter(GeneratorConfig::percentage(), None);
    interp.execute("amp 25");

    let reply = interp.execute("amp 150");
    assert!(reply.message.starts_with("Rejected"), "got: {}", reply.message);
    assert!(reply.message.contains("Amplitude: 25.00"), "reply shows the unchanged state");
    assert_eq!(store.read().amplitude, 25.0);
}

#[test]
fn test_waveform_command_regenerates() {
    let (interp, store) = interpreter(GeneratorConfig::percentage(), None);
    interp.execute("amp 25");
    interp.execute("sine");

    assert_eq!(store.read().kind, WaveformKind::Sine);
    assert_eq!(store.buffer()[0], 8192);
}

#[test]
fn test_empty_and_unknown_lines() {
    let (interp, store) = interpreter(GeneratorConfig::percentage(), None);
    let before = store.read();

    let reply = interp.execute("");
    assert_eq!(reply.outcome, Outcome::Ignored);
    assert!(reply.message.is_empty());

    let reply = interp.execute("bogus 1");
    assert_eq!(reply.outcome, Outcome::Continue);
    assert!(reply.message.contains("unknown command"));
    assert_eq!(store.read(), before);
}

#[test]
fn test_knob_mode_refuses_keyboard_writes() {
    let (interp, store) = interpreter(GeneratorConfig::percentage(), None);
    interp.execute("mode knobs");
    assert_eq!(store.read().mode, ControlMode::Knobs);

    let reply = interp.execute("freq 20");
    assert!(reply.message.contains("Knob control"), "got: {}", reply.message);
    assert_eq!(store.read().frequency, 1.0);

    interp.execute("mode dual");
    interp.execute("freq 20");
    assert_eq!(store.read().frequency, 20.0);
}

#[test]
fn test_mean_command() {
    let (interp, store) = interpreter(GeneratorConfig::percentage(), None);
    let reply = interp.execute("mean 1");
    assert!(reply.message.starts_with("Rejected"));

    let (interp, store_offset) = interpreter(GeneratorConfig::offset(), None);
    interp.execute("amp 1.0");
    interp.execute("mean 1.5");
    assert_eq!(store_offset.read().mean, 1.5);

    let reply = interp.execute("mean 0.5");
    assert!(reply.message.contains("exceeds mean"), "got: {}", reply.message);
    assert_eq!(store_offset.read().mean, 1.5);
    assert_eq!(store.read().mean, 0.0);
}

#[test]
fn test_status_and_help() {
    let (interp, _store) = interpreter(GeneratorConfig::offset(), None);
    let status = interp.execute("status").message;
    assert!(status.contains("Frequency: 10.00 Hz"));
    assert!(status.contains("Mean: 2.50 V"));
    assert!(status.contains("Waveform: sine"));

    assert!(interp.execute("help").message.contains("mean <volts>"));
}

#[test]
fn test_save_and_load_commands() {
    let path = temp_path("save-load");
    let (interp, _store) = interpreter(GeneratorConfig::percentage(), None);
    interp.execute("pulse");
    interp.execute("freq 300");
    let reply = interp.execute(&format!("save {}", path.display()));
    assert!(reply.message.starts_with("Saved"), "got: {}", reply.message);

    let (other, other_store) = interpreter(GeneratorConfig::percentage(), None);
    let reply = other.execute(&format!("load {}", path.display()));
    fs::remove_file(&path).ok();
    assert!(reply.message.starts_with("Loaded"), "got: {}", reply.message);
    assert_eq!(other_store.read().kind, WaveformKind::Pulse);
    assert_eq!(other_store.read().frequency, 300.0);
}

#[test]
fn test_quit_stops_and_persists() {
    let path = temp_path("quit");
    let (interp, store) = interpreter(GeneratorConfig::percentage(), Some(path.clone()));
    interp.execute("freq 42");

    let reply = interp.execute("quit");
    assert_eq!(reply.outcome, Outcome::Quit);
    assert!(!store.is_running());
    let saved = fs::read_to_string(&path).unwrap();
    fs::remove_file(&path).ok();
    assert!(saved.contains("freq=42"));
}

#[test]
fn test_command_loop_runs_script() {
    let (interp, store) = interpreter(GeneratorConfig::percentage(), None);
    let script: VecDeque<String> = ["freq 50", "", "triangle", "status", "quit", "freq 60"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut command_loop = CommandLoop::new(interp, Box::new(script), Vec::new());
    command_loop.serve().unwrap();

    let output = String::from_utf8(command_loop.output().clone()).unwrap();
    assert!(output.contains("Frequency set to 50 Hz"));
    assert!(output.contains("Waveform: triangle"));
    assert!(!store.is_running());
    assert_eq!(store.read().frequency, 50.0, "lines after quit are not executed");
}

#[test]
fn test_command_loop_ends_on_closed_input() {
    let (interp, store) = interpreter(GeneratorConfig::percentage(), None);
    let script: VecDeque<String> = vec!["amp 10".to_string()].into();
    let mut command_loop = CommandLoop::new(interp, Box::new(script), Vec::new());
    command_loop.serve().unwrap();

    assert_eq!(store.read().amplitude, 10.0);
    assert!(store.is_running(), "end of input does not stop the generator");
}
