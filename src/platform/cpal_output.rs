use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    FromSample, Sample, SizedSample, Stream, StreamConfig,
};
use super::{OutputSink, SinkError, PARK_LEVEL};
use log::{info, warn};
use std::sync::{Arc, Mutex, PoisonError};

/// Plays the converter output on the default audio device.
///
/// The last written word is held (zero-order hold) until the next one arrives,
/// so the speaker reproduces the stepped signal the card would produce. The
/// stream itself is not `Send`; it stays with whoever owns the monitor while the
/// matching `CpalSink` moves into the output thread.
pub struct CpalMonitor {
    stream: Stream,
    sample_rate: f32,
}

impl CpalMonitor {
    /// Open the default output device and start playing the held level
    pub fn start() -> Result<(Self, CpalSink), anyhow::Error> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("Default output device is not available"))?;

        info!("Output device: {}", device.name()?);

        let supported_config = device.default_output_config()?;
        info!("Default output config: {:?}", supported_config);

        let sample_rate = supported_config.sample_rate().0 as f32;
        let config: StreamConfig = supported_config.clone().into();
        let level = Arc::new(Mutex::new(PARK_LEVEL));

        let stream = match supported_config.sample_format() {
            cpal::SampleFormat::I8 => Self::make_stream::<i8>(&device, &config, level.clone())?,
            cpal::SampleFormat::I16 => Self::make_stream::<i16>(&device, &config, level.clone())?,
            cpal::SampleFormat::I32 => Self::make_stream::<i32>(&device, &config, level.clone())?,
            cpal::SampleFormat::I64 => Self::make_stream::<i64>(&device, &config, level.clone())?,
            cpal::SampleFormat::U8 => Self::make_stream::<u8>(&device, &config, level.clone())?,
            cpal::SampleFormat::U16 => Self::make_stream::<u16>(&device, &config, level.clone())?,
            cpal::SampleFormat::U32 => Self::make_stream::<u32>(&device, &config, level.clone())?,
            cpal::SampleFormat::U64 => Self::make_stream::<u64>(&device, &config, level.clone())?,
            cpal::SampleFormat::F32 => Self::make_stream::<f32>(&device, &config, level.clone())?,
            cpal::SampleFormat::F64 => Self::make_stream::<f64>(&device, &config, level.clone())?,
            sample_format => return Err(anyhow::anyhow!("Unsupported sample format '{}'", sample_format)),
        };

        stream.play()?;
        info!("Audio monitor started at sample rate: {}", sample_rate);

        Ok((Self { stream, sample_rate }, CpalSink { level }))
    }

    fn make_stream<T>(
        device: &cpal::Device,
        config: &StreamConfig,
        level: Arc<Mutex<u16>>,
    ) -> Result<Stream, anyhow::Error>
    where
        T: SizedSample + FromSample<f32>,
    {
        let num_channels = config.channels as usize;
        let err_fn = |err| warn!("Error on audio monitor stream: {}", err);

        let stream = device.build_output_stream(
            config,
            move |output: &mut [T], _: &cpal::OutputCallbackInfo| {
                Self::process_frame(output, &level, num_channels);
            },
            err_fn,
            None,
        )?;

        Ok(stream)
    }

    /// Fill one device buffer with the held level
    fn process_frame<SampleType>(output: &mut [SampleType], level: &Arc<Mutex<u16>>, num_channels: usize)
    where
        SampleType: Sample + FromSample<f32>,
    {
        // Lock once for the entire buffer
        let word = *level.lock().unwrap_or_else(PoisonError::into_inner);
        let value: SampleType = SampleType::from_sample(word_to_audio(word));

        for frame in output.chunks_mut(num_channels) {
            for sample in frame.iter_mut() {
                *sample = value;
            }
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn stop(&self) -> Result<(), anyhow::Error> {
        self.stream.pause()?;
        info!("Audio monitor stopped");
        Ok(())
    }
}

/// Map a converter word onto the [-1, 1] audio range
fn word_to_audio(word: u16) -> f32 {
    (word as f32 / u16::MAX as f32) * 2.0 - 1.0
}

/// Output half of the audio monitor
#[derive(Debug, Clone)]
pub struct CpalSink {
    level: Arc<Mutex<u16>>,
}

impl OutputSink for CpalSink {
    fn write(&mut self, value: u16) -> Result<(), SinkError> {
        *self.level.lock().unwrap_or_else(PoisonError::into_inner) = value;
        Ok(())
    }

    fn park(&mut self) -> Result<(), SinkError> {
        self.write(PARK_LEVEL)
    }

    fn name(&self) -> &str {
        "audio"
    }
}
