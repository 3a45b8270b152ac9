//! Analog acquisition loop
//!
//! Cycles round-robin through the knob channels, converts each raw reading with
//! a per-channel affine map and writes the result into the parameter store. A
//! hysteresis band keeps converter noise from rewriting (and re-rendering) the
//! parameters on every pass.
//!
//! The card's switch port is polled on the same loop. Only a change of switch
//! state is acted on: kill patterns stop the generator, waveform patterns select
//! a shape while the knobs are in control.

use super::params::{Field, ParameterSnapshot, ParameterStore};
use crate::config::ScalingPolicy;
use crate::gen::WaveformKind;
use crate::platform::{InputSink, SinkError, INPUT_FULL_SCALE};
use crate::shutdown::ShutdownToken;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Parameter a knob channel drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelTarget {
    Frequency,
    Amplitude,
    FrequencyScale,
}

impl ChannelTarget {
    fn field(self) -> Field {
        match self {
            ChannelTarget::Frequency => Field::Frequency,
            ChannelTarget::Amplitude => Field::Amplitude,
            ChannelTarget::FrequencyScale => Field::FrequencyScale,
        }
    }

    fn current(self, snapshot: &ParameterSnapshot) -> f64 {
        match self {
            ChannelTarget::Frequency => snapshot.frequency,
            ChannelTarget::Amplitude => snapshot.amplitude,
            ChannelTarget::FrequencyScale => snapshot.frequency_scale,
        }
    }

    fn assign(self, snapshot: &mut ParameterSnapshot, value: f64) {
        match self {
            ChannelTarget::Frequency => snapshot.frequency = value,
            ChannelTarget::Amplitude => snapshot.amplitude = value,
            ChannelTarget::FrequencyScale => snapshot.frequency_scale = value,
        }
    }
}

/// `scale = offset + gain * (raw / full_scale)` for one input channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelMap {
    pub channel: u8,
    pub target: ChannelTarget,
    pub offset: f64,
    pub gain: f64,
}

impl ChannelMap {
    pub fn new(channel: u8, target: ChannelTarget, offset: f64, gain: f64) -> Self {
        Self {
            channel,
            target,
            offset,
            gain,
        }
    }

    pub fn convert(&self, raw: u16) -> f64 {
        self.offset + self.gain * (raw as f64 / INPUT_FULL_SCALE)
    }

    /// Smallest change in target units worth committing for a band of `counts` raw counts
    pub fn band(&self, counts: u16) -> f64 {
        self.gain.abs() * counts as f64 / INPUT_FULL_SCALE
    }
}

/// One conversion, from raw magnitude to target value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelReading {
    pub channel: u8,
    pub raw: u16,
    pub scale: f64,
}

/// What a switch pattern does when it appears
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchAction {
    Kill,
    Select(WaveformKind),
}

/// Switch patterns understood by the stock front panel
pub fn default_switch_patterns() -> Vec<(u8, SwitchAction)> {
    vec![
        (0xFF, SwitchAction::Kill),
        (0xF8, SwitchAction::Kill),
        (0xF4, SwitchAction::Select(WaveformKind::Square)),
        (0xF2, SwitchAction::Select(WaveformKind::Triangle)),
        (0xF1, SwitchAction::Select(WaveformKind::Sawtooth)),
        (0xF0, SwitchAction::Select(WaveformKind::Sine)),
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    pub channels: Vec<ChannelMap>,
    pub settle: Duration,             // mux settling time after a channel switch
    pub conversion_timeout: Duration, // give up on a conversion after this long
    pub poll_interval: Duration,      // pause between completion polls
    pub cycle_delay: Duration,        // pause between full channel sweeps
    pub hysteresis_counts: u16,       // raw counts a reading must move to be committed
    pub switch_patterns: Vec<(u8, SwitchAction)>,
}

impl SamplerConfig {
    /// Channel 0 drives amplitude and channel 1 drives frequency, spanning the deployment's domain
    pub fn for_policy(policy: ScalingPolicy) -> Self {
        let channels = match policy {
            ScalingPolicy::Offset => vec![
                ChannelMap::new(0, ChannelTarget::Amplitude, 0.0, 2.5),
                ChannelMap::new(1, ChannelTarget::Frequency, 1.0, 9.0),
            ],
            ScalingPolicy::Percentage => vec![
                ChannelMap::new(0, ChannelTarget::Amplitude, 0.0, 100.0),
                ChannelMap::new(1, ChannelTarget::Frequency, 1.0, 999.0),
            ],
        };
        Self {
            channels,
            settle: Duration::from_millis(1),
            conversion_timeout: Duration::from_millis(20),
            poll_interval: Duration::from_micros(50),
            cycle_delay: Duration::from_millis(10),
            hysteresis_counts: 100,
            switch_patterns: default_switch_patterns(),
        }
    }
}

/// Counters gathered over one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplerReport {
    pub sweeps: u64,
    pub readings: u64,
    pub timeouts: u64,
    pub commits: u64,
    pub rejected: u64,
    pub switch_changes: u64,
}

pub struct InputSampler {
    store: Arc<ParameterStore>,
    input: Box<dyn InputSink>,
    config: SamplerConfig,
    report: SamplerReport,
    shutdown: Option<ShutdownToken>,
    last_switches: u8,
}

impl InputSampler {
    pub fn new(store: Arc<ParameterStore>, input: Box<dyn InputSink>, config: SamplerConfig) -> Self {
        Self {
            store,
            input,
            config,
            report: SamplerReport::default(),
            shutdown: None,
            last_switches: 0x00,
        }
    }

    /// Route kill switches to `token` instead of stopping the store directly
    pub fn with_shutdown(mut self, token: ShutdownToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    pub fn report(&self) -> &SamplerReport {
        &self.report
    }

    /// Sweep the channels until the running flag is cleared.
    /// Converter errors other than a timed-out conversion are fatal.
    pub fn run(&mut self) -> Result<SamplerReport, SinkError> {
        info!("Sampler started on {} channels", self.config.channels.len());
        while self.store.is_running() {
            let mut polled = self.poll_switches().map(|_| ());
            if polled.is_ok() && self.store.read().mode.accepts_knobs() {
                polled = self.sweep();
            }
            if let Err(e) = polled {
                error!("Input converter failed: {}", e);
                self.store.stop();
                return Err(e);
            }
            self.pause(self.config.cycle_delay);
        }
        info!(
            "Sampler stopped after {} sweeps ({} readings, {} commits, {} timeouts)",
            self.report.sweeps, self.report.readings, self.report.commits, self.report.timeouts
        );
        Ok(self.report.clone())
    }

    /// Read every channel once and commit significant changes
    pub fn sweep(&mut self) -> Result<(), SinkError> {
        let channels = self.config.channels.clone();
        for map in &channels {
            if !self.store.is_running() {
                break;
            }
            let reading = match self.acquire(map) {
                Ok(reading) => reading,
                Err(SinkError::ConversionTimeout { channel, timeout }) => {
                    warn!("Channel {} conversion timed out after {:?}, skipping", channel, timeout);
                    self.report.timeouts += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.report.readings += 1;
            self.apply(map, reading);
        }
        self.report.sweeps += 1;
        Ok(())
    }

    /// Read the switch port and act on a change of state.
    /// Returns the action taken, if the new state matched a pattern.
    pub fn poll_switches(&mut self) -> Result<Option<SwitchAction>, SinkError> {
        let Some(state) = self.input.read_switches()? else {
            return Ok(None);
        };
        if state == self.last_switches {
            return Ok(None);
        }
        self.last_switches = state;
        self.report.switch_changes += 1;
        self.input.write_indicators(state)?;
        debug!("Switches changed to {:#04x}", state);

        let action = self
            .config
            .switch_patterns
            .iter()
            .find(|(pattern, _)| *pattern == state)
            .map(|&(_, action)| action);

        match action {
            Some(SwitchAction::Kill) => {
                info!("Kill switch {:#04x} set, stopping", state);
                match &self.shutdown {
                    Some(token) => token.request(),
                    None => {
                        self.store.stop();
                    }
                }
            }
            Some(SwitchAction::Select(kind)) => {
                match self.store.compare_and_set(|s| s.mode.accepts_knobs(), |s| s.kind = kind) {
                    Ok(Some(_)) => {
                        self.store.regenerate();
                        info!("Switches selected {}", kind);
                    }
                    Ok(None) => debug!("Ignoring waveform switch {:#04x} outside knob control", state),
                    Err(e) => {
                        self.report.rejected += 1;
                        warn!("Waveform switch {:#04x} rejected: {}", state, e);
                    }
                }
            }
            None => {}
        }
        Ok(action)
    }

    /// Select, settle, convert and read one channel
    fn acquire(&mut self, map: &ChannelMap) -> Result<ChannelReading, SinkError> {
        self.input.select_channel(map.channel)?;
        std::thread::sleep(self.config.settle);
        self.input.start_conversion()?;

        let started = Instant::now();
        while !self.input.conversion_ready()? {
            if started.elapsed() >= self.config.conversion_timeout {
                return Err(SinkError::ConversionTimeout {
                    channel: map.channel,
                    timeout: self.config.conversion_timeout,
                });
            }
            std::thread::sleep(self.config.poll_interval);
        }

        let raw = self.input.read()?;
        Ok(ChannelReading {
            channel: map.channel,
            raw,
            scale: map.convert(raw),
        })
    }

    fn apply(&mut self, map: &ChannelMap, reading: ChannelReading) {
        let band = map.band(self.config.hysteresis_counts);
        let limits = *self.store.limits();
        let target = map.target;

        let result = self.store.compare_and_set(
            |current| {
                let value = limits.clamp(target.field(), reading.scale, current.mean);
                current.mode.accepts_knobs() && (value - target.current(current)).abs() > band
            },
            |snapshot| {
                let value = limits.clamp(target.field(), reading.scale, snapshot.mean);
                target.assign(snapshot, value);
            },
        );

        match result {
            Ok(Some(_)) => {
                self.report.commits += 1;
                debug!(
                    "Channel {} raw {} -> {} {:.3}",
                    reading.channel,
                    reading.raw,
                    target.field(),
                    reading.scale
                );
            }
            Ok(None) => {}
            Err(e) => {
                self.report.rejected += 1;
                warn!("Channel {} reading rejected: {}", reading.channel, e);
            }
        }
    }

    /// Sleep in short slices so a stop is noticed promptly
    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        let slice = Duration::from_millis(5);
        while self.store.is_running() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(slice));
        }
    }
}
