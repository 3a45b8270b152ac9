//! Normalized waveform synthesis
//!
//! Maps (kind, phase index, cycle resolution) to a normalized value. Pure: no state,
//! so every caller recomputes on demand and the output buffer acts as the cache.

use super::waveform::WaveformKind;
use std::f64::consts::PI;

/// Fraction of the cycle a pulse stays high
pub const PULSE_DUTY_RATIO: f64 = 0.1;

/// Normalized sample of `kind` at `index` within a cycle of `resolution` points.
///
/// `resolution` must be at least 2; `index` is taken modulo `resolution`.
pub fn sample(kind: WaveformKind, index: usize, resolution: usize) -> f64 {
    debug_assert!(resolution >= 2, "cycle resolution must be at least 2");
    let n = resolution as f64;
    let i = (index % resolution) as f64;

    match kind {
        WaveformKind::Sine => (2.0 * PI * i / n).sin(),
        WaveformKind::Square => {
            if i < n / 2.0 {
                1.0
            } else {
                -1.0
            }
        }
        WaveformKind::Triangle => 2.0 * (2.0 * i / n - 1.0).abs() - 1.0,
        // Ramp from -1 at index 0 to +1 at the last index
        WaveformKind::Sawtooth => 2.0 * i / (n - 1.0) - 1.0,
        WaveformKind::Pulse => {
            if i < n * PULSE_DUTY_RATIO {
                1.0
            } else {
                0.0
            }
        }
        WaveformKind::Cardiac => cardiac(i / n),
        WaveformKind::Flat => 1.0,
    }
}

/// One full cycle of normalized values
pub fn cycle(kind: WaveformKind, resolution: usize) -> Vec<f64> {
    (0..resolution).map(|i| sample(kind, i, resolution)).collect()
}

/// Stylized heartbeat: a tall R bump, a small negative dip and a low T bump
fn cardiac(t: f64) -> f64 {
    (-200.0 * (t - 0.2).powi(2)).exp() - 0.1 * (-50.0 * (t - 0.35).powi(2)).exp()
        + 0.05 * (-300.0 * (t - 0.75).powi(2)).exp()
}
