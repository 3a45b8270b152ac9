//! Shared waveform parameters
//!
//! One `ParameterStore` exists per process. It guards the live `ParameterSnapshot`
//! and the derived `SampleBuffer` behind a single mutex so the two always change
//! together. Writers are serialized; the last one to take the lock wins.

use crate::config::{GeneratorConfig, Limits, ScalingPolicy, MIN_RESOLUTION};
use crate::gen::{SampleBuffer, SampleScaler, WaveformKind};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Which parameter sources may currently write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    Keyboard,
    Knobs,
    Dual,
}

impl ControlMode {
    pub fn accepts_keyboard(self) -> bool {
        matches!(self, ControlMode::Keyboard | ControlMode::Dual)
    }

    pub fn accepts_knobs(self) -> bool {
        matches!(self, ControlMode::Knobs | ControlMode::Dual)
    }

    /// Mode selected by the `m` key
    pub fn toggled(self) -> Self {
        match self {
            ControlMode::Keyboard => ControlMode::Knobs,
            ControlMode::Knobs | ControlMode::Dual => ControlMode::Keyboard,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ControlMode::Keyboard => "keyboard",
            ControlMode::Knobs => "knobs",
            ControlMode::Dual => "dual",
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ControlMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyboard" | "kbd" | "k" => Ok(ControlMode::Keyboard),
            "knobs" | "hardware" | "h" => Ok(ControlMode::Knobs),
            "dual" | "both" => Ok(ControlMode::Dual),
            other => Err(format!("unknown control mode '{}' (keyboard, knobs, dual)", other)),
        }
    }
}

/// Copy of the live generator parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSnapshot {
    pub kind: WaveformKind,
    pub frequency: f64,       // base frequency, Hz
    pub amplitude: f64,       // % or V depending on the deployment
    pub mean: f64,            // V, unused by percentage deployments
    pub frequency_scale: f64, // knob multiplier on `frequency`
    pub mode: ControlMode,
    pub running: bool,
}

impl ParameterSnapshot {
    /// Frequency the pacer runs at, held inside the frequency domain
    pub fn effective_frequency(&self, limits: &Limits) -> f64 {
        (self.frequency * self.frequency_scale).clamp(limits.frequency.0, limits.frequency.1)
    }

    /// Whether a change from `other` invalidates the sample buffer
    fn shapes_buffer_differently(&self, other: &ParameterSnapshot) -> bool {
        self.kind != other.kind || self.amplitude != other.amplitude || self.mean != other.mean
    }
}

/// Parameter that can be validated or written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Frequency,
    Amplitude,
    Mean,
    FrequencyScale,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::Frequency => "frequency",
            Field::Amplitude => "amplitude",
            Field::Mean => "mean",
            Field::FrequencyScale => "frequency scale",
        })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamError {
    #[error("{field} {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: Field,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{field} must be a finite number")]
    NotFinite { field: Field },
    #[error("amplitude {amplitude} exceeds mean {mean}; the waveform would leave the output range")]
    AmplitudeExceedsMean { amplitude: f64, mean: f64 },
    #[error("this deployment has no mean/offset parameter")]
    MeanUnsupported,
    #[error("the running flag can only be cleared by a shutdown")]
    RunningFlag,
    #[error("resolution must be at least {min} points per cycle, got {resolution}")]
    Resolution { resolution: usize, min: usize },
}

/// Result of one paced emission
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub snapshot: ParameterSnapshot,
    pub value: u16,
    pub regenerated: bool,
}

struct Shared {
    snapshot: ParameterSnapshot,
    revision: u64, // bumped whenever the buffer goes stale
    buffer: SampleBuffer,
}

impl Shared {
    fn regenerate(&mut self, scaler: &SampleScaler, resolution: usize) {
        let s = self.snapshot;
        self.buffer
            .regenerate(s.kind, s.amplitude, s.mean, resolution, scaler, self.revision);
    }
}

pub struct ParameterStore {
    shared: Mutex<Shared>,
    policy: ScalingPolicy,
    limits: Limits,
    scaler: SampleScaler,
    resolution: usize,
}

impl ParameterStore {
    /// Create the store for a deployment, validating the initial values
    pub fn new(config: &GeneratorConfig, initial: ParameterSnapshot) -> Result<Self, ParamError> {
        if config.resolution < MIN_RESOLUTION {
            return Err(ParamError::Resolution {
                resolution: config.resolution,
                min: MIN_RESOLUTION,
            });
        }
        let initial = ParameterSnapshot {
            running: true,
            ..initial
        };
        config.limits.validate(&initial)?;
        Ok(Self {
            shared: Mutex::new(Shared {
                snapshot: initial,
                revision: 0,
                buffer: SampleBuffer::empty(),
            }),
            policy: config.policy,
            limits: config.limits,
            scaler: config.scaler(),
            resolution: config.resolution,
        })
    }

    // The guarded data is plain values that are only replaced wholesale,
    // so a panic in another holder cannot leave it half-written.
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current parameters
    pub fn read(&self) -> ParameterSnapshot {
        self.lock().snapshot
    }

    pub fn is_running(&self) -> bool {
        self.lock().snapshot.running
    }

    /// Apply `mutate` to a copy of the snapshot and commit it if every field stays in
    /// its domain. On rejection the live snapshot is left untouched.
    pub fn write<F>(&self, mutate: F) -> Result<ParameterSnapshot, ParamError>
    where
        F: FnOnce(&mut ParameterSnapshot),
    {
        let mut shared = self.lock();
        let mut candidate = shared.snapshot;
        mutate(&mut candidate);
        self.commit(&mut shared, candidate)?;
        Ok(candidate)
    }

    /// Like `write`, but only when `predicate` holds for the current snapshot.
    /// Returns the committed snapshot, or `None` if the predicate refused.
    pub fn compare_and_set<P, F>(&self, predicate: P, mutate: F) -> Result<Option<ParameterSnapshot>, ParamError>
    where
        P: FnOnce(&ParameterSnapshot) -> bool,
        F: FnOnce(&mut ParameterSnapshot),
    {
        let mut shared = self.lock();
        if !predicate(&shared.snapshot) {
            return Ok(None);
        }
        let mut candidate = shared.snapshot;
        mutate(&mut candidate);
        self.commit(&mut shared, candidate)?;
        Ok(Some(candidate))
    }

    fn commit(&self, shared: &mut Shared, candidate: ParameterSnapshot) -> Result<(), ParamError> {
        if candidate.running != shared.snapshot.running {
            return Err(ParamError::RunningFlag);
        }
        self.limits.validate(&candidate)?;
        if candidate.shapes_buffer_differently(&shared.snapshot) {
            shared.revision += 1;
        }
        shared.snapshot = candidate;
        Ok(())
    }

    /// Clear the running flag. Returns true only for the call that made the transition.
    pub fn stop(&self) -> bool {
        let mut shared = self.lock();
        let was_running = shared.snapshot.running;
        shared.snapshot.running = false;
        was_running
    }

    /// Rebuild the sample buffer from the current snapshot and return a copy of it
    pub fn regenerate(&self) -> Vec<u16> {
        let mut shared = self.lock();
        shared.revision += 1;
        shared.regenerate(&self.scaler, self.resolution);
        shared.buffer.as_slice().to_vec()
    }

    /// Copy of the buffer, rebuilt first if it is stale
    pub fn buffer(&self) -> Vec<u16> {
        let mut shared = self.lock();
        if !shared.buffer.is_current(shared.revision) {
            shared.regenerate(&self.scaler, self.resolution);
        }
        shared.buffer.as_slice().to_vec()
    }

    /// Emit the buffered value at `index` through `emit` while holding the lock.
    ///
    /// A stale buffer is rebuilt for the whole cycle before anything is emitted.
    /// Returns `Ok(None)` without emitting once the running flag is cleared, so no
    /// value can reach the sink after `stop` has returned. The lock is released on
    /// every path, including an `emit` failure.
    pub fn render<E, F>(&self, index: usize, emit: F) -> Result<Option<Tick>, E>
    where
        F: FnOnce(u16) -> Result<(), E>,
    {
        let mut shared = self.lock();
        if !shared.snapshot.running {
            return Ok(None);
        }
        let regenerated = !shared.buffer.is_current(shared.revision);
        if regenerated {
            shared.regenerate(&self.scaler, self.resolution);
        }
        let value = shared.buffer.as_slice()[index % shared.buffer.len()];
        emit(value)?;
        Ok(Some(Tick {
            snapshot: shared.snapshot,
            value,
            regenerated,
        }))
    }

    pub fn policy(&self) -> ScalingPolicy {
        self.policy
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn scaler(&self) -> &SampleScaler {
        &self.scaler
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }
}
