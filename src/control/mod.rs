//! Interactive parameter sources: a line-based command loop and single-key control

pub mod commands;
pub mod keys;

pub use commands::{
    parse, status_line, Command, CommandError, CommandInterpreter, CommandLoop, LineEvent, LineSource, Outcome,
    Reply, StdinLines,
};
pub use keys::{KeyAction, KeyControl};
