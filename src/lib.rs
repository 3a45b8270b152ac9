//! Software function generator
//!
//! A paced output loop writes one cycle of a waveform, sample by sample, to an
//! output sink while interactive commands or sampled knob inputs rewrite the
//! frequency, amplitude and shape it is producing.

pub mod config;
pub mod control;
pub mod engine;
pub mod gen;
pub mod platform;
pub mod settings;
pub mod shutdown;
pub mod utils;

pub use config::{GeneratorConfig, Limits, ScalingPolicy};
pub use engine::{ControlMode, OutputPacer, ParamError, ParameterSnapshot, ParameterStore};
pub use gen::WaveformKind;
