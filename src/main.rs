/* Function generator front end.
Builds the parameter store from presets, a settings file and the command line,
then runs the output pacer, an optional knob sampler and an interactive source
until quit, Ctrl+C or a device failure.
*/

use anyhow::Context;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, ValueEnum};
use log::{error, info, warn};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use wavegen::config::{GeneratorConfig, ScalingPolicy};
use wavegen::control::{CommandInterpreter, CommandLoop, KeyControl, StdinLines};
use wavegen::engine::source::{self, ParameterSource};
use wavegen::engine::{
    ControlMode, CycleMarker, InputSampler, OutputPacer, PacerConfig, Pacing, ParameterStore, SamplerConfig,
};
use wavegen::gen::WaveformKind;
use wavegen::platform::{NullSink, OutputSink, SimulatedAdc};
use wavegen::settings::{self, DEFAULT_SETTINGS_PATH};
use wavegen::shutdown::ShutdownController;
use wavegen::utils::{init_logger, level_for};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    /// Amplitude in percent of half-scale
    Percent,
    /// Amplitude and mean in volts on a 0-5 V output
    Offset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SinkArg {
    /// Discard samples
    Null,
    /// Monitor on the default audio device
    Audio,
    /// Capture to a WAV file
    Wav,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PacingArg {
    Sleep,
    Spin,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MarkerArg {
    None,
    Log,
    Bell,
}

#[derive(Parser, Debug)]
#[clap(about, version)]
struct Cli {
    /// Amplitude convention of this deployment
    #[clap(long, value_enum, default_value_t = PolicyArg::Percent)]
    policy: PolicyArg,

    /// Initial waveform: sine, square, triangle, sawtooth, pulse, cardiac, nothing
    #[clap(short, long)]
    waveform: Option<WaveformKind>,

    /// Initial frequency in Hz
    #[clap(short, long)]
    freq: Option<f64>,

    /// Initial amplitude (% or V depending on the policy)
    #[clap(short, long)]
    amp: Option<f64>,

    /// Initial mean level in V (offset policy only)
    #[clap(short, long)]
    mean: Option<f64>,

    /// Points per waveform cycle
    #[clap(short, long, default_value_t = wavegen::config::DEFAULT_RESOLUTION)]
    resolution: usize,

    /// Settings file used by load, save and save-on-exit
    #[clap(long, default_value = DEFAULT_SETTINGS_PATH)]
    settings: PathBuf,

    /// Load the settings file before applying command-line values
    #[clap(long)]
    load: bool,

    /// Save the settings file when the generator stops
    #[clap(long)]
    save_on_exit: bool,

    /// Initial control mode: keyboard, knobs or dual
    #[clap(long)]
    control: Option<ControlMode>,

    /// Single-key control instead of typed commands
    #[clap(long)]
    keys: bool,

    /// Simulated knob positions in [0, 1], one per input channel
    #[clap(long, value_delimiter = ',')]
    knobs: Vec<f64>,

    /// Simulated front-panel switch state, e.g. 0xF2 (needs --knobs)
    #[clap(long, value_parser = parse_switches, requires = "knobs")]
    switches: Option<u8>,

    /// Where samples go
    #[clap(long, value_enum, default_value_t = SinkArg::Null)]
    sink: SinkArg,

    /// Output file for the wav sink
    #[clap(long, default_value = "wavegen.wav")]
    wav: PathBuf,

    /// How the output loop waits between samples
    #[clap(long, value_enum, default_value_t = PacingArg::Hybrid)]
    pacing: PacingArg,

    /// Signal at each cycle boundary
    #[clap(long, value_enum, default_value_t = MarkerArg::None)]
    marker: MarkerArg,

    /// More logging (-v debug, -vv trace)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[clap(short, long)]
    quiet: bool,
}

fn parse_switches(text: &str) -> Result<u8, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => text.parse::<u8>(),
    };
    parsed.map_err(|e| format!("'{}' is not a switch state: {}", text, e))
}

/// Report a bad command-line value with usage and exit non-zero
fn usage_error(message: impl std::fmt::Display) -> ! {
    Cli::command().error(ErrorKind::ValueValidation, message).exit()
}

/// Devices that must outlive the output thread
#[derive(Default)]
struct Devices {
    #[cfg(feature = "native")]
    monitor: Option<wavegen::platform::CpalMonitor>,
}

impl Devices {
    #[cfg(feature = "native")]
    fn close(self) {
        if let Some(monitor) = self.monitor {
            if let Err(e) = monitor.stop() {
                warn!("{}", e);
            }
        }
    }

    #[cfg(not(feature = "native"))]
    fn close(self) {}
}

fn build_store(cli: &Cli) -> anyhow::Result<Arc<ParameterStore>> {
    let policy = match cli.policy {
        PolicyArg::Percent => ScalingPolicy::Percentage,
        PolicyArg::Offset => ScalingPolicy::Offset,
    };
    let config = GeneratorConfig::for_policy(policy)
        .with_resolution(cli.resolution)
        .unwrap_or_else(|e| usage_error(e));

    let mut initial = config.initial_snapshot();
    if let Some(mode) = cli.control {
        initial.mode = mode;
    }
    let store = Arc::new(ParameterStore::new(&config, initial).context("invalid deployment defaults")?);

    if cli.load {
        if let Err(e) = settings::load_into(&store, &cli.settings) {
            warn!("{}; keeping defaults", e);
        }
    }

    if let Some(mean) = cli.mean {
        if let Err(e) = store.limits().check_mean(mean) {
            usage_error(e);
        }
    }
    let overrides = store.write(|s| {
        if let Some(kind) = cli.waveform {
            s.kind = kind;
        }
        if let Some(freq) = cli.freq {
            s.frequency = freq;
        }
        if let Some(amp) = cli.amp {
            s.amplitude = amp;
        }
        if let Some(mean) = cli.mean {
            s.mean = mean;
        }
    });
    if let Err(e) = overrides {
        usage_error(e);
    }

    store.regenerate();
    Ok(store)
}

fn open_sink(cli: &Cli, store: &ParameterStore, devices: &mut Devices) -> anyhow::Result<Box<dyn OutputSink>> {
    match cli.sink {
        SinkArg::Null => Ok(Box::new(NullSink::new())),
        #[cfg(feature = "native")]
        SinkArg::Audio => {
            let (monitor, sink) = wavegen::platform::CpalMonitor::start()?;
            devices.monitor = Some(monitor);
            Ok(Box::new(sink))
        }
        #[cfg(not(feature = "native"))]
        SinkArg::Audio => {
            let _ = devices;
            anyhow::bail!("the audio sink needs the 'native' feature")
        }
        #[cfg(feature = "bounce")]
        SinkArg::Wav => {
            let snapshot = store.read();
            let tick_rate = snapshot.effective_frequency(store.limits()) * store.resolution() as f64;
            let sink = wavegen::platform::WavSink::create(&cli.wav, tick_rate.round() as u32)?;
            Ok(Box::new(sink))
        }
        #[cfg(not(feature = "bounce"))]
        SinkArg::Wav => {
            let _ = store;
            anyhow::bail!("the wav sink needs the 'bounce' feature")
        }
    }
}

fn pacer_config(cli: &Cli) -> PacerConfig {
    let defaults = PacerConfig::default();
    PacerConfig {
        pacing: match cli.pacing {
            PacingArg::Sleep => Pacing::Sleep,
            PacingArg::Spin => Pacing::Spin,
            PacingArg::Hybrid => defaults.pacing,
        },
        marker: match cli.marker {
            MarkerArg::None => CycleMarker::None,
            MarkerArg::Log => CycleMarker::Log,
            MarkerArg::Bell => CycleMarker::Bell,
        },
        ..defaults
    }
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    let store = build_store(&cli)?;

    let sampler_config = SamplerConfig::for_policy(store.policy());
    if !cli.knobs.is_empty() {
        if cli.knobs.len() < sampler_config.channels.len() {
            usage_error(format!(
                "--knobs needs {} positions, got {}",
                sampler_config.channels.len(),
                cli.knobs.len()
            ));
        }
        if let Some(bad) = cli.knobs.iter().find(|x| !(0.0..=1.0).contains(*x)) {
            usage_error(format!("knob position {} is outside [0, 1]", bad));
        }
    }

    let save_path = cli.save_on_exit.then(|| cli.settings.clone());
    let shutdown = Arc::new(ShutdownController::new(store.clone(), save_path));
    shutdown
        .install_signal_handler()
        .context("failed to install the interrupt handler")?;

    let mut devices = Devices::default();
    let sink = open_sink(&cli, &store, &mut devices)?;
    let pacer_store = store.clone();
    let config = pacer_config(&cli);
    let pacer = thread::Builder::new()
        .name("pacer".to_string())
        .spawn(move || OutputPacer::new(pacer_store, sink, config).run())
        .context("failed to start the output thread")?;

    let sampler = if cli.knobs.is_empty() {
        None
    } else {
        let mut adc = SimulatedAdc::from_positions(&cli.knobs);
        if let Some(state) = cli.switches {
            adc = adc.with_switches(state);
        }
        let sampler =
            InputSampler::new(store.clone(), Box::new(adc), sampler_config).with_shutdown(shutdown.token());
        Some(source::spawn(Box::new(sampler)).context("failed to start the sampler")?)
    };

    let interactive: Box<dyn ParameterSource> = if cli.keys {
        Box::new(KeyControl::new(store.clone(), shutdown.clone(), cli.settings.clone()))
    } else {
        let interpreter = CommandInterpreter::new(store.clone(), shutdown.clone(), cli.settings.clone());
        let lines = StdinLines::spawn().context("failed to read standard input")?;
        Box::new(CommandLoop::new(interpreter, Box::new(lines), io::stdout()))
    };
    let interactive = source::spawn(interactive).context("failed to start the interactive source")?;

    shutdown.wait(Duration::from_millis(50), || pacer.is_finished());
    if let Some(report) = shutdown.shutdown() {
        info!(
            "Final settings: {} {} Hz amplitude {} mean {}",
            report.final_snapshot.kind,
            report.final_snapshot.frequency,
            report.final_snapshot.amplitude,
            report.final_snapshot.mean
        );
    }

    let mut failed = false;
    match pacer.join() {
        Ok(Ok(report)) => info!(
            "Output: {} ticks, {} late, {} resyncs",
            report.ticks, report.late_ticks, report.resyncs
        ),
        Ok(Err(e)) => {
            error!("Output failed: {}", e);
            failed = true;
        }
        Err(_) => {
            error!("Output thread panicked");
            failed = true;
        }
    }
    if let Some(sampler) = sampler {
        match sampler.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Sampler failed: {:#}", e);
                failed = true;
            }
            Err(_) => {
                error!("Sampler thread panicked");
                failed = true;
            }
        }
    }
    match interactive.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Interactive control ended with an error: {:#}", e),
        Err(_) => warn!("Interactive thread panicked"),
    }
    devices.close();

    Ok(!failed)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(level_for(cli.verbose, cli.quiet));

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
