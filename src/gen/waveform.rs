use std::fmt;
use std::str::FromStr;

/// Shape family synthesized by the waveform table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaveformKind {
    Sine,
    Square,
    Triangle,
    Sawtooth,
    Pulse,
    Cardiac,
    Flat, // "nothing": constant output
}

impl WaveformKind {
    /// Every kind, in key-binding order ('1' = Sine ... '7' = Flat)
    pub const ALL: [WaveformKind; 7] = [
        WaveformKind::Sine,
        WaveformKind::Square,
        WaveformKind::Triangle,
        WaveformKind::Sawtooth,
        WaveformKind::Pulse,
        WaveformKind::Cardiac,
        WaveformKind::Flat,
    ];

    /// Lowercase canonical name, as written to settings files
    pub fn name(self) -> &'static str {
        match self {
            WaveformKind::Sine => "sine",
            WaveformKind::Square => "square",
            WaveformKind::Triangle => "triangle",
            WaveformKind::Sawtooth => "sawtooth",
            WaveformKind::Pulse => "pulse",
            WaveformKind::Cardiac => "cardiac",
            WaveformKind::Flat => "nothing",
        }
    }

    /// Inclusive range of the normalized value produced by the table
    pub fn range(self) -> (f64, f64) {
        match self {
            WaveformKind::Sine
            | WaveformKind::Square
            | WaveformKind::Triangle
            | WaveformKind::Sawtooth => (-1.0, 1.0),
            WaveformKind::Pulse => (0.0, 1.0),
            // Sum of the three bumps never leaves this band
            WaveformKind::Cardiac => (-0.1, 1.05),
            WaveformKind::Flat => (1.0, 1.0),
        }
    }
}

impl fmt::Display for WaveformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown waveform '{0}' (expected sine, square, triangle, sawtooth, pulse, cardiac or nothing)")]
pub struct UnknownWaveform(pub String);

impl FromStr for WaveformKind {
    type Err = UnknownWaveform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sine" | "sin" => Ok(WaveformKind::Sine),
            "square" => Ok(WaveformKind::Square),
            "triangle" | "triangular" => Ok(WaveformKind::Triangle),
            "sawtooth" | "saw" => Ok(WaveformKind::Sawtooth),
            "pulse" => Ok(WaveformKind::Pulse),
            "cardiac" => Ok(WaveformKind::Cardiac),
            "nothing" | "flat" => Ok(WaveformKind::Flat),
            _ => Err(UnknownWaveform(s.trim().to_string())),
        }
    }
}
