pub mod pacer;
pub mod params;
pub mod sampler;
pub mod source;

pub use pacer::{CycleMarker, OutputPacer, PacerConfig, PacerReport, PacerState, Pacing};
pub use params::{ControlMode, Field, ParamError, ParameterSnapshot, ParameterStore, Tick};
pub use sampler::{
    default_switch_patterns, ChannelMap, ChannelReading, ChannelTarget, InputSampler, SamplerConfig, SamplerReport,
    SwitchAction,
};
pub use source::{ParameterSource, SourceKind};

impl ParameterSource for InputSampler {
    fn kind(&self) -> SourceKind {
        SourceKind::Sampled
    }

    fn name(&self) -> &str {
        "sampler"
    }

    fn run(&mut self) -> anyhow::Result<()> {
        InputSampler::run(self)?;
        Ok(())
    }
}
