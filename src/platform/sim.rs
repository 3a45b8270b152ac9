//! In-process stand-ins for the acquisition card
//!
//! Used by the binary when no card is attached and by the integration tests.

use super::{InputSink, OutputSink, SinkError, INPUT_FULL_SCALE, PARK_LEVEL};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Discards every word, keeping only a count
#[derive(Debug, Default)]
pub struct NullSink {
    written: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl OutputSink for NullSink {
    fn write(&mut self, _value: u16) -> Result<(), SinkError> {
        self.written += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Keeps every emitted word. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    words: Arc<Mutex<Vec<u16>>>,
    fail_after: Option<usize>,
    flushes: Arc<Mutex<u32>>,
    parked: Arc<Mutex<Option<u16>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose write fails once `count` words have been accepted
    pub fn failing_after(count: usize) -> Self {
        Self {
            fail_after: Some(count),
            ..Self::default()
        }
    }

    pub fn words(&self) -> Vec<u16> {
        lock(&self.words).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.words).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.words).is_empty()
    }

    pub fn flushes(&self) -> u32 {
        *lock(&self.flushes)
    }

    /// Level the sink was parked at, if it has been parked
    pub fn parked(&self) -> Option<u16> {
        *lock(&self.parked)
    }
}

impl OutputSink for RecordingSink {
    fn write(&mut self, value: u16) -> Result<(), SinkError> {
        let mut words = lock(&self.words);
        if let Some(limit) = self.fail_after {
            if words.len() >= limit {
                return Err(SinkError::Unavailable(format!(
                    "recording sink refused word {}",
                    words.len()
                )));
            }
        }
        words.push(value);
        Ok(())
    }

    fn park(&mut self) -> Result<(), SinkError> {
        *lock(&self.parked) = Some(PARK_LEVEL);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        *lock(&self.flushes) += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

#[derive(Debug)]
struct AdcState {
    readings: Vec<u16>,
    selected: Option<u8>,
    pending_polls: Option<u32>,
    latency_polls: u32,
    stalled: bool,
    conversions: u64,
    switches: Option<u8>,
    indicators: Option<u8>,
}

/// Multiplexed input converter with settable knob positions.
/// Clones share the same knobs, so a test can turn them while a sampler runs.
#[derive(Debug, Clone)]
pub struct SimulatedAdc {
    state: Arc<Mutex<AdcState>>,
}

impl SimulatedAdc {
    /// One channel per raw reading
    pub fn new(readings: Vec<u16>) -> Self {
        Self {
            state: Arc::new(Mutex::new(AdcState {
                readings,
                selected: None,
                pending_polls: None,
                latency_polls: 0,
                stalled: false,
                conversions: 0,
                switches: None,
                indicators: None,
            })),
        }
    }

    /// Knob positions in [0, 1]
    pub fn from_positions(positions: &[f64]) -> Self {
        Self::new(positions.iter().map(|&x| position_to_raw(x)).collect())
    }

    /// Number of `conversion_ready` polls that report busy before completion
    pub fn with_latency(self, polls: u32) -> Self {
        lock(&self.state).latency_polls = polls;
        self
    }

    pub fn set_reading(&self, channel: u8, raw: u16) {
        if let Some(slot) = lock(&self.state).readings.get_mut(channel as usize) {
            *slot = raw;
        }
    }

    pub fn set_position(&self, channel: u8, position: f64) {
        self.set_reading(channel, position_to_raw(position));
    }

    /// A stalled converter never reports completion
    pub fn set_stalled(&self, stalled: bool) {
        lock(&self.state).stalled = stalled;
    }

    pub fn conversions(&self) -> u64 {
        lock(&self.state).conversions
    }

    /// Fit a switch port, starting at `state`
    pub fn with_switches(self, state: u8) -> Self {
        self.set_switches(state);
        self
    }

    pub fn set_switches(&self, state: u8) {
        lock(&self.state).switches = Some(state);
    }

    /// Last value written to the indicator port
    pub fn indicators(&self) -> Option<u8> {
        lock(&self.state).indicators
    }
}

fn position_to_raw(position: f64) -> u16 {
    (position.clamp(0.0, 1.0) * INPUT_FULL_SCALE).round() as u16
}

impl InputSink for SimulatedAdc {
    fn select_channel(&mut self, channel: u8) -> Result<(), SinkError> {
        let mut state = lock(&self.state);
        if channel as usize >= state.readings.len() {
            return Err(SinkError::NoSuchChannel(channel));
        }
        state.selected = Some(channel);
        state.pending_polls = None;
        Ok(())
    }

    fn start_conversion(&mut self) -> Result<(), SinkError> {
        let mut state = lock(&self.state);
        if state.selected.is_none() {
            return Err(SinkError::Unavailable("no channel selected".to_string()));
        }
        state.pending_polls = Some(state.latency_polls);
        state.conversions += 1;
        Ok(())
    }

    fn conversion_ready(&mut self) -> Result<bool, SinkError> {
        let mut state = lock(&self.state);
        if state.stalled {
            return Ok(false);
        }
        match state.pending_polls {
            Some(0) => Ok(true),
            Some(remaining) => {
                state.pending_polls = Some(remaining - 1);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    fn read(&mut self) -> Result<u16, SinkError> {
        let state = lock(&self.state);
        let channel = state
            .selected
            .ok_or_else(|| SinkError::Unavailable("no channel selected".to_string()))?;
        Ok(state.readings[channel as usize])
    }

    fn read_switches(&mut self) -> Result<Option<u8>, SinkError> {
        Ok(lock(&self.state).switches)
    }

    fn write_indicators(&mut self, value: u8) -> Result<(), SinkError> {
        lock(&self.state).indicators = Some(value);
        Ok(())
    }
}
