//! Process-wide helpers

pub mod logging;

pub use logging::{init_logger, level_for};
