// Integration tests for coordinated shutdown

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use wavegen::config::GeneratorConfig;
use wavegen::engine::ParameterStore;
use wavegen::shutdown::ShutdownController;

fn store() -> Arc<ParameterStore> {
    let config = GeneratorConfig::percentage();
    Arc::new(ParameterStore::new(&config, config.initial_snapshot()).unwrap())
}

#[test]
fn test_shutdown_runs_once() {
    let store = store();
    let controller = ShutdownController::new(store.clone(), None);

    let report = controller.shutdown().expect("first shutdown reports");
    assert!(report.stopped_here);
    assert_eq!(report.saved_to, None);
    assert!(!report.final_snapshot.running);
    assert!(controller.is_requested());
    assert!(controller.shutdown().is_none(), "second shutdown does nothing");
}

#[test]
fn test_shutdown_after_loop_stopped() {
    let store = store();
    let controller = ShutdownController::new(store.clone(), None);
    store.stop();
    let report = controller.shutdown().unwrap();
    assert!(!report.stopped_here, "the flag was already cleared");
}

#[test]
fn test_shutdown_saves_settings() {
    let path = std::env::temp_dir().join(format!("wavegen-shutdown-{}.txt", std::process::id()));
    let store = store();
    store.write(|s| s.amplitude = 33.0).unwrap();
    let controller = ShutdownController::new(store.clone(), Some(path.clone()));

    let report = controller.shutdown().unwrap();
    assert_eq!(report.saved_to.as_deref(), Some(path.as_path()));
    let text = fs::read_to_string(&path).unwrap();
    fs::remove_file(&path).ok();
    assert!(text.contains("amp=33"));
}

#[test]
fn test_wait_returns_on_token() {
    let store = store();
    let controller = Arc::new(ShutdownController::new(store.clone(), None));
    let token = controller.token();

    let waiter = {
        let controller = controller.clone();
        thread::spawn(move || {
            let started = Instant::now();
            controller.wait(Duration::from_millis(5), || false);
            started.elapsed()
        })
    };
    thread::sleep(Duration::from_millis(20));
    token.request();

    let waited = waiter.join().unwrap();
    assert!(waited >= Duration::from_millis(15));
    assert!(store.is_running(), "the token alone does not clear the flag");
    controller.shutdown();
    assert!(!store.is_running());
}

#[test]
fn test_wait_returns_when_done_or_stopped() {
    let store = store();
    let controller = ShutdownController::new(store.clone(), None);
    let mut polls = 0;
    controller.wait(Duration::from_millis(1), || {
        polls += 1;
        polls > 3
    });
    assert_eq!(polls, 4);

    store.stop();
    controller.wait(Duration::from_secs(60), || false);
}
