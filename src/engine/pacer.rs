//! Real-time output loop
//!
//! Emits one buffered word per tick and paces ticks against absolute deadlines on
//! the monotonic clock, so scheduling error does not accumulate into drift.

use super::params::ParameterStore;
use crate::platform::{OutputSink, SinkError};
use log::{debug, error, info, warn};
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle of the output loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacerState {
    Idle,
    Armed,
    Running,
    Draining,
    Stopped,
}

/// How the pacer waits for the next deadline
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    /// Sleep until the deadline
    Sleep,
    /// Busy-spin until the deadline
    Spin,
    /// Sleep until `spin_window` before the deadline, then spin
    Hybrid { spin_window: Duration },
}

/// Signal emitted each time the phase index wraps to 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleMarker {
    None,
    Log,
    Bell,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacerConfig {
    pub pacing: Pacing,
    /// Longest single sleep, bounding how late a stop is noticed mid-wait
    pub max_sleep_slice: Duration,
    pub marker: CycleMarker,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            pacing: Pacing::Hybrid {
                spin_window: Duration::from_micros(200),
            },
            max_sleep_slice: Duration::from_millis(20),
            marker: CycleMarker::None,
        }
    }
}

/// Counters gathered over one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PacerReport {
    pub ticks: u64,
    pub cycles: u64,
    pub regenerations: u64,
    pub late_ticks: u64,
    pub worst_lateness: Duration,
    pub resyncs: u64, // deadline reset after falling a whole cycle behind
}

pub struct OutputPacer {
    store: Arc<ParameterStore>,
    sink: Box<dyn OutputSink>,
    config: PacerConfig,
    state: PacerState,
    index: usize,
    report: PacerReport,
}

impl OutputPacer {
    pub fn new(store: Arc<ParameterStore>, sink: Box<dyn OutputSink>, config: PacerConfig) -> Self {
        Self {
            store,
            sink,
            config,
            state: PacerState::Idle,
            index: 0,
            report: PacerReport::default(),
        }
    }

    pub fn state(&self) -> PacerState {
        self.state
    }

    pub fn report(&self) -> &PacerReport {
        &self.report
    }

    /// Prepare the sink. Idle -> Armed.
    pub fn arm(&mut self) -> Result<(), SinkError> {
        if self.state != PacerState::Idle {
            warn!("Pacer already armed (state {:?})", self.state);
            return Ok(());
        }
        self.sink.prepare()?;
        self.state = PacerState::Armed;
        info!("Pacer armed on {} sink", self.sink.name());
        Ok(())
    }

    /// Time between ticks for a cycle at `frequency` Hz spread over `resolution` points
    pub fn period(frequency: f64, resolution: usize) -> Duration {
        Duration::from_secs_f64(1.0 / (frequency * resolution as f64))
    }

    /// Run until the running flag is cleared or the sink fails.
    ///
    /// A sink failure is fatal: the running flag is cleared so every other loop winds
    /// down, and the error is returned.
    pub fn run(&mut self) -> Result<PacerReport, SinkError> {
        if self.state == PacerState::Idle {
            if let Err(e) = self.arm() {
                error!("Failed to prepare {} sink: {}", self.sink.name(), e);
                self.fail();
                return Err(e);
            }
        }

        let resolution = self.store.resolution();
        let mut deadline = Instant::now();

        loop {
            let index = self.index;
            let sink = &mut self.sink;
            let tick = match self.store.render(index, |value| sink.write(value)) {
                Ok(Some(tick)) => tick,
                Ok(None) => break,
                Err(e) => {
                    error!("Output sink failed at index {}: {}", index, e);
                    self.fail();
                    return Err(e);
                }
            };

            if self.state == PacerState::Armed {
                self.state = PacerState::Running;
                info!("Pacer running: {} at {} Hz", tick.snapshot.kind, tick.snapshot.frequency);
            }
            self.report.ticks += 1;
            if tick.regenerated {
                self.report.regenerations += 1;
            }

            self.index = (index + 1) % resolution;
            if self.index == 0 {
                self.report.cycles += 1;
                self.mark_cycle();
            }

            let frequency = tick.snapshot.effective_frequency(self.store.limits());
            let period = Self::period(frequency, resolution);
            deadline += period;

            let now = Instant::now();
            if now > deadline {
                let lateness = now - deadline;
                self.report.late_ticks += 1;
                self.report.worst_lateness = self.report.worst_lateness.max(lateness);
                if lateness > period * resolution as u32 {
                    debug!("Pacer fell {:?} behind, resynchronizing", lateness);
                    self.report.resyncs += 1;
                    deadline = now;
                }
            }

            if !self.wait_until(deadline) {
                break;
            }
        }

        self.drain()?;
        Ok(self.report.clone())
    }

    /// Wait for `deadline`. Returns false if the running flag was seen cleared while waiting.
    fn wait_until(&self, deadline: Instant) -> bool {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let remaining = deadline - now;
            let sleep_for = match self.config.pacing {
                Pacing::Sleep => Some(remaining),
                Pacing::Spin => None,
                Pacing::Hybrid { spin_window } if remaining > spin_window => {
                    Some(remaining - spin_window)
                }
                Pacing::Hybrid { .. } => None,
            };
            match sleep_for {
                Some(duration) => {
                    let slice = duration.min(self.config.max_sleep_slice);
                    std::thread::sleep(slice);
                    if slice < duration && !self.store.is_running() {
                        return false;
                    }
                }
                None => std::hint::spin_loop(),
            }
        }
    }

    fn mark_cycle(&self) {
        match self.config.marker {
            CycleMarker::None => {}
            CycleMarker::Log => debug!("Cycle {} complete", self.report.cycles),
            CycleMarker::Bell => {
                // Best effort: a failed bell must not disturb pacing
                let mut stderr = std::io::stderr();
                let _ = stderr.write_all(b"\x07");
                let _ = stderr.flush();
            }
        }
    }

    /// Running -> Draining -> Stopped. The output is parked at midscale before the flush.
    fn drain(&mut self) -> Result<(), SinkError> {
        self.state = PacerState::Draining;
        let flushed = self.sink.park().and_then(|_| self.sink.flush());
        self.state = PacerState::Stopped;
        info!(
            "Pacer stopped after {} ticks ({} cycles, {} regenerations, {} late, worst {:?})",
            self.report.ticks,
            self.report.cycles,
            self.report.regenerations,
            self.report.late_ticks,
            self.report.worst_lateness
        );
        if let Err(e) = &flushed {
            error!("Failed to flush {} sink: {}", self.sink.name(), e);
        }
        flushed
    }

    fn fail(&mut self) {
        self.store.stop();
        self.state = PacerState::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_calculation() {
        assert_eq!(OutputPacer::period(1.0, 100), Duration::from_millis(10));
        assert_eq!(OutputPacer::period(1000.0, 100), Duration::from_micros(10));
        assert_eq!(OutputPacer::period(10.0, 20), Duration::from_millis(5));
    }
}
