//! Deployment configuration
//!
//! A deployment fixes the scaling convention and, with it, the parameter domains.
//! Percentage and offset conventions are never mixed inside one process.

use crate::engine::params::{ControlMode, Field, ParamError, ParameterSnapshot};
use crate::gen::{SampleScaler, WaveformKind};

/// Smallest allowed cycle resolution
pub const MIN_RESOLUTION: usize = 2;
/// Default number of points per cycle
pub const DEFAULT_RESOLUTION: usize = 100;
/// Domain of the knob-driven frequency multiplier
pub const FREQUENCY_SCALE_RANGE: (f64, f64) = (0.01, 10.0);

/// How amplitude (and mean) are interpreted when scaling samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingPolicy {
    /// Amplitude is a percentage of half-scale, no mean
    Percentage,
    /// Amplitude and mean are volts, `amplitude <= mean`
    Offset,
}

impl ScalingPolicy {
    pub fn scaler(self) -> SampleScaler {
        match self {
            ScalingPolicy::Percentage => SampleScaler::percentage(),
            ScalingPolicy::Offset => SampleScaler::offset(),
        }
    }

    pub fn amplitude_unit(self) -> &'static str {
        match self {
            ScalingPolicy::Percentage => "%",
            ScalingPolicy::Offset => "V",
        }
    }
}

/// Accepted parameter domains and keyboard nudge sizes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub frequency: (f64, f64),   // Hz, inclusive
    pub amplitude: (f64, f64),   // % or V, inclusive
    pub mean: Option<(f64, f64)>, // V, offset deployments only
    pub frequency_step: f64,
    pub amplitude_step: f64,
    pub mean_step: f64,
}

impl Limits {
    pub fn check_frequency(&self, value: f64) -> Result<(), ParamError> {
        check_range(Field::Frequency, value, self.frequency)
    }

    pub fn check_amplitude(&self, value: f64) -> Result<(), ParamError> {
        check_range(Field::Amplitude, value, self.amplitude)
    }

    pub fn check_mean(&self, value: f64) -> Result<(), ParamError> {
        match self.mean {
            Some(range) => check_range(Field::Mean, value, range),
            None => Err(ParamError::MeanUnsupported),
        }
    }

    pub fn check_frequency_scale(&self, value: f64) -> Result<(), ParamError> {
        check_range(Field::FrequencyScale, value, FREQUENCY_SCALE_RANGE)
    }

    /// Validate every field of a candidate snapshot, including `amplitude <= mean`
    pub fn validate(&self, snapshot: &ParameterSnapshot) -> Result<(), ParamError> {
        self.check_frequency(snapshot.frequency)?;
        self.check_amplitude(snapshot.amplitude)?;
        self.check_frequency_scale(snapshot.frequency_scale)?;
        if self.mean.is_some() {
            self.check_mean(snapshot.mean)?;
            if snapshot.amplitude > snapshot.mean {
                return Err(ParamError::AmplitudeExceedsMean {
                    amplitude: snapshot.amplitude,
                    mean: snapshot.mean,
                });
            }
        }
        Ok(())
    }

    /// Clamp a sensor-derived value into the domain of `field`.
    /// Amplitude is additionally held under `mean` when the deployment has one.
    pub fn clamp(&self, field: Field, value: f64, mean: f64) -> f64 {
        match field {
            Field::Frequency => value.clamp(self.frequency.0, self.frequency.1),
            Field::Amplitude => {
                let upper = match self.mean {
                    Some(_) => self.amplitude.1.min(mean),
                    None => self.amplitude.1,
                };
                value.clamp(self.amplitude.0, upper.max(self.amplitude.0))
            }
            Field::Mean => match self.mean {
                Some((lo, hi)) => value.clamp(lo, hi),
                None => value,
            },
            Field::FrequencyScale => value.clamp(FREQUENCY_SCALE_RANGE.0, FREQUENCY_SCALE_RANGE.1),
        }
    }
}

fn check_range(field: Field, value: f64, (min, max): (f64, f64)) -> Result<(), ParamError> {
    if !value.is_finite() {
        return Err(ParamError::NotFinite { field });
    }
    if value < min || value > max {
        return Err(ParamError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Full description of one generator deployment
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    pub policy: ScalingPolicy,
    pub limits: Limits,
    pub resolution: usize, // points per cycle
    pub default_kind: WaveformKind,
    pub default_frequency: f64,
    pub default_amplitude: f64,
    pub default_mean: f64,
    pub default_mode: ControlMode,
}

impl GeneratorConfig {
    /// Amplitude as percent of half-scale, 1-1000 Hz
    pub fn percentage() -> Self {
        Self {
            policy: ScalingPolicy::Percentage,
            limits: Limits {
                frequency: (1.0, 1000.0),
                amplitude: (0.0, 100.0),
                mean: None,
                frequency_step: 10.0,
                amplitude_step: 5.0,
                mean_step: 0.0,
            },
            resolution: DEFAULT_RESOLUTION,
            default_kind: WaveformKind::Square,
            default_frequency: 1.0,
            default_amplitude: 100.0,
            default_mean: 0.0,
            default_mode: ControlMode::Keyboard,
        }
    }

    /// Amplitude and mean in volts on a 0-5 V output, 0.1-10 Hz
    pub fn offset() -> Self {
        Self {
            policy: ScalingPolicy::Offset,
            limits: Limits {
                frequency: (0.1, 10.0),
                amplitude: (0.1, 2.5),
                mean: Some((0.1, 2.5)),
                frequency_step: 0.1,
                amplitude_step: 0.1,
                mean_step: 0.1,
            },
            resolution: DEFAULT_RESOLUTION,
            default_kind: WaveformKind::Sine,
            default_frequency: 10.0,
            default_amplitude: 2.5,
            default_mean: 2.5,
            default_mode: ControlMode::Keyboard,
        }
    }

    pub fn for_policy(policy: ScalingPolicy) -> Self {
        match policy {
            ScalingPolicy::Percentage => Self::percentage(),
            ScalingPolicy::Offset => Self::offset(),
        }
    }

    pub fn with_resolution(mut self, resolution: usize) -> Result<Self, anyhow::Error> {
        if resolution < MIN_RESOLUTION {
            return Err(anyhow::anyhow!(
                "resolution must be at least {} points per cycle, got {}",
                MIN_RESOLUTION,
                resolution
            ));
        }
        self.resolution = resolution;
        Ok(self)
    }

    pub fn scaler(&self) -> SampleScaler {
        self.policy.scaler()
    }

    /// Snapshot built from the deployment defaults
    pub fn initial_snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            kind: self.default_kind,
            frequency: self.default_frequency,
            amplitude: self.default_amplitude,
            mean: self.default_mean,
            frequency_scale: 1.0,
            mode: self.default_mode,
            running: true,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::percentage()
    }
}
