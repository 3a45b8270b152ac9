//! Process shutdown
//!
//! The interrupt handler only flips a token. The owning thread notices the token
//! on its next poll and does the real work: clearing the store's running flag,
//! which every loop checks at least once per iteration, and saving settings.

use crate::engine::params::{ParameterSnapshot, ParameterStore};
use crate::settings;
use log::{error, info};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Async-signal-safe stop request
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken(Arc<AtomicBool>);

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShutdownReport {
    /// Whether this shutdown cleared the running flag (false if a loop already had)
    pub stopped_here: bool,
    pub saved_to: Option<PathBuf>,
    pub final_snapshot: ParameterSnapshot,
}

pub struct ShutdownController {
    token: ShutdownToken,
    store: Arc<ParameterStore>,
    save_path: Option<PathBuf>,
    finished: AtomicBool,
}

impl ShutdownController {
    /// `save_path` is where settings are persisted on the way out, if anywhere
    pub fn new(store: Arc<ParameterStore>, save_path: Option<PathBuf>) -> Self {
        Self {
            token: ShutdownToken::new(),
            store,
            save_path,
            finished: AtomicBool::new(false),
        }
    }

    pub fn token(&self) -> ShutdownToken {
        self.token.clone()
    }

    /// Route Ctrl+C / SIGINT / SIGTERM to the token
    pub fn install_signal_handler(&self) -> Result<(), ctrlc::Error> {
        let token = self.token();
        ctrlc::set_handler(move || token.request())
    }

    pub fn request(&self) {
        self.token.request();
    }

    pub fn is_requested(&self) -> bool {
        self.token.is_requested()
    }

    /// Block until a stop is requested, the running flag is already cleared,
    /// or `done` reports that there is nothing left to supervise
    pub fn wait<F>(&self, poll: Duration, mut done: F)
    where
        F: FnMut() -> bool,
    {
        while !self.token.is_requested() && self.store.is_running() && !done() {
            std::thread::sleep(poll);
        }
    }

    /// Clear the running flag and persist settings if configured.
    /// Only the first call does anything; later calls return `None`.
    pub fn shutdown(&self) -> Option<ShutdownReport> {
        if self.finished.swap(true, Ordering::SeqCst) {
            return None;
        }
        self.token.request();
        let stopped_here = self.store.stop();
        info!("Shutting down");

        let saved_to = self.save_path.as_ref().and_then(|path| {
            match settings::save_from(&self.store, path) {
                Ok(_) => Some(path.clone()),
                Err(e) => {
                    error!("{}", e);
                    None
                }
            }
        });

        Some(ShutdownReport {
            stopped_here,
            saved_to,
            final_snapshot: self.store.read(),
        })
    }
}
