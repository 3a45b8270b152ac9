pub mod buffer;
pub mod scaler;
pub mod table;
pub mod waveform;

pub use self::buffer::*;
pub use self::scaler::*;
pub use self::waveform::*;
