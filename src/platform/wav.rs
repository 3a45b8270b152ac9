use super::{OutputSink, SinkError};
use hound::{SampleFormat, WavSpec, WavWriter};
use log::info;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Captures the converter output to a mono 16-bit WAV file.
///
/// Each tick becomes one frame, so `sample_rate` should be the nominal tick
/// rate (effective frequency times resolution) for the file to play back at pitch.
pub struct WavSink {
    writer: Option<WavWriter<BufWriter<File>>>,
    path: PathBuf,
    frames: u64,
}

impl WavSink {
    pub fn create(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self, SinkError> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: sample_rate.max(1),
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let path = path.as_ref().to_path_buf();
        let writer = WavWriter::create(&path, spec).map_err(wav_error)?;
        info!("Capturing output to {} at {} Hz", path.display(), spec.sample_rate);
        Ok(Self {
            writer: Some(writer),
            path,
            frames: 0,
        })
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

fn wav_error(err: hound::Error) -> SinkError {
    match err {
        hound::Error::IoError(io) => SinkError::Io(io),
        other => SinkError::Unavailable(other.to_string()),
    }
}

impl OutputSink for WavSink {
    fn write(&mut self, value: u16) -> Result<(), SinkError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| SinkError::Unavailable("WAV capture already finalized".to_string()))?;
        // Unsigned converter word to signed PCM around midscale
        writer
            .write_sample((value as i32 - 0x8000) as i16)
            .map_err(wav_error)?;
        self.frames += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(wav_error)?;
            info!("Wrote {} frames to {}", self.frames, self.path.display());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "wav"
    }
}
