//! Conversion of normalized values into converter words
//!
//! Two conventions exist for the same card and are kept as separate strategies:
//! amplitude as a percentage of half-scale, or amplitude and mean as voltages.

/// Half-scale word of the 16-bit output converter
pub const HALF_RANGE: f64 = 0x7FFF as f64;
/// Full-scale word of the 16-bit output converter
pub const FULL_RANGE: f64 = 0xFFFF as f64;
/// Output voltage at full scale
pub const MAX_VOLTAGE: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleScaler {
    /// `round((value + 1) * half_range * amplitude / 100)`, `mean` is ignored
    Percentage { half_range: f64 },
    /// `mean + amplitude * value` volts, clipped to `[0, max_voltage]`, mapped onto `full_range`
    Offset { max_voltage: f64, full_range: f64 },
}

impl SampleScaler {
    pub fn percentage() -> Self {
        SampleScaler::Percentage {
            half_range: HALF_RANGE,
        }
    }

    pub fn offset() -> Self {
        SampleScaler::Offset {
            max_voltage: MAX_VOLTAGE,
            full_range: FULL_RANGE,
        }
    }

    /// Scale one normalized value into a device word
    pub fn scale(&self, value: f64, amplitude: f64, mean: f64) -> u16 {
        let word = match *self {
            SampleScaler::Percentage { half_range } => {
                ((value + 1.0) * half_range * amplitude / 100.0).round()
            }
            SampleScaler::Offset {
                max_voltage,
                full_range,
            } => {
                // Analog safety clip: saturate, never reject
                let voltage = (mean + amplitude * value).clamp(0.0, max_voltage);
                (voltage / max_voltage * full_range).round()
            }
        };
        word.clamp(0.0, u16::MAX as f64) as u16
    }
}
