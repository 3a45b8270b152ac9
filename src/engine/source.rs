use log::info;
use std::thread::{self, JoinHandle};

/// Where parameter writes come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A person at the terminal
    Interactive,
    /// Analog inputs read from the card
    Sampled,
}

/// Anything that feeds writes into the parameter store from its own loop.
/// Send is required because every source runs on its own thread.
pub trait ParameterSource: Send {
    fn kind(&self) -> SourceKind;

    /// Thread name and log label
    fn name(&self) -> &str;

    /// Run until the store's running flag is cleared
    fn run(&mut self) -> anyhow::Result<()>;
}

/// Start `source` on a named thread
pub fn spawn(mut source: Box<dyn ParameterSource>) -> std::io::Result<JoinHandle<anyhow::Result<()>>> {
    let name = source.name().to_string();
    info!("Starting {:?} source '{}'", source.kind(), name);
    thread::Builder::new().name(name).spawn(move || source.run())
}
