//! Hardware boundary
//! The generator only needs a word-wide output converter and a multiplexed input
//! converter. Register layouts and device discovery stay behind these traits.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("device I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("device unavailable: {0}")]
    Unavailable(String),
    #[error("conversion on channel {channel} did not complete within {timeout:?}")]
    ConversionTimeout { channel: u8, timeout: Duration },
    #[error("channel {0} is not wired")]
    NoSuchChannel(u8),
}

/// Output converter accepting one device word per tick
pub trait OutputSink: Send {
    /// Make the sink ready to accept words
    fn prepare(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Emit one word
    fn write(&mut self, value: u16) -> Result<(), SinkError>;

    /// Hold the output at `PARK_LEVEL` once the generator has stopped.
    /// Not counted as an emitted word.
    fn park(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Push out anything still buffered
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Short name used in logs
    fn name(&self) -> &str;
}

/// Multiplexed analog input converter
pub trait InputSink: Send {
    /// Route `channel` to the converter
    fn select_channel(&mut self, channel: u8) -> Result<(), SinkError>;

    /// Start a conversion on the selected channel
    fn start_conversion(&mut self) -> Result<(), SinkError>;

    /// Poll whether the last conversion has completed
    fn conversion_ready(&mut self) -> Result<bool, SinkError>;

    /// Raw magnitude of the completed conversion
    fn read(&mut self) -> Result<u16, SinkError>;

    /// State of the digital switch port, or `None` when the card has none
    fn read_switches(&mut self) -> Result<Option<u8>, SinkError> {
        Ok(None)
    }

    /// Drive the indicator port (one LED per switch)
    fn write_indicators(&mut self, _value: u8) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Full-scale raw reading of the input converter
pub const INPUT_FULL_SCALE: f64 = 65535.0;

/// Midscale word the output rests at after a stop
pub const PARK_LEVEL: u16 = 0x7FFF;

pub mod sim;
pub use self::sim::{NullSink, RecordingSink, SimulatedAdc};

#[cfg(feature = "native")]
pub mod cpal_output;
#[cfg(feature = "native")]
pub use self::cpal_output::{CpalMonitor, CpalSink};

#[cfg(feature = "bounce")]
pub mod wav;
#[cfg(feature = "bounce")]
pub use self::wav::WavSink;
