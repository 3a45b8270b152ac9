//! Line-oriented command interface
//!
//! One command per line, answered synchronously. Parsing and execution are kept
//! apart from terminal I/O so the same interpreter serves stdin, scripts and tests.

use crate::config::ScalingPolicy;
use crate::engine::params::{ControlMode, ParamError, ParameterSnapshot, ParameterStore};
use crate::engine::source::{ParameterSource, SourceKind};
use crate::gen::WaveformKind;
use crate::settings;
use crate::shutdown::ShutdownController;
use log::{debug, info};
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Waveform(WaveformKind),
    Frequency(f64),
    Amplitude(f64),
    Mean(f64),
    Mode(ControlMode),
    Status,
    Save(Option<PathBuf>),
    Load(Option<PathBuf>),
    Quit,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command '{0}' (type 'help' for the list)")]
    Unknown(String),
    #[error("'{command}' needs {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },
    #[error("'{0}' is not a number")]
    BadNumber(String),
    #[error("{0}")]
    BadMode(String),
}

/// Parse one input line. Blank lines parse to `None`.
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let mut words = line.split_whitespace();
    let Some(token) = words.next() else {
        return Ok(None);
    };
    let argument = words.next();
    let token = token.to_ascii_lowercase();

    let command = match token.as_str() {
        "help" | "?" => Command::Help,
        "freq" | "frequency" => Command::Frequency(number("freq", argument)?),
        "amp" | "amplitude" => Command::Amplitude(number("amp", argument)?),
        "mean" | "offset" => Command::Mean(number("mean", argument)?),
        "mode" => {
            let name = argument.ok_or(CommandError::MissingArgument {
                command: "mode",
                expected: "keyboard, knobs or dual",
            })?;
            Command::Mode(name.parse().map_err(CommandError::BadMode)?)
        }
        "waveform" | "wave" => {
            let name = argument.ok_or(CommandError::MissingArgument {
                command: "waveform",
                expected: "a waveform name",
            })?;
            Command::Waveform(name.parse().map_err(|_| CommandError::Unknown(name.to_string()))?)
        }
        "status" => Command::Status,
        "save" => Command::Save(argument.map(PathBuf::from)),
        "load" => Command::Load(argument.map(PathBuf::from)),
        "quit" | "exit" | "q" => Command::Quit,
        other => match other.parse::<WaveformKind>() {
            Ok(kind) => Command::Waveform(kind),
            Err(_) => return Err(CommandError::Unknown(other.to_string())),
        },
    };
    Ok(Some(command))
}

fn number(command: &'static str, argument: Option<&str>) -> Result<f64, CommandError> {
    let text = argument.ok_or(CommandError::MissingArgument {
        command,
        expected: "a number",
    })?;
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| CommandError::BadNumber(text.to_string()))
}

/// What the loop should do after a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Ignored,
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub message: String,
    pub outcome: Outcome,
}

impl Reply {
    fn say(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            outcome: Outcome::Continue,
        }
    }
}

/// One-line summary of the live parameters
pub fn status_line(snapshot: &ParameterSnapshot, policy: ScalingPolicy) -> String {
    let unit = policy.amplitude_unit();
    let mut line = format!(
        "Frequency: {:.2} Hz | Amplitude: {:.2} {}",
        snapshot.frequency, snapshot.amplitude, unit
    );
    if policy == ScalingPolicy::Offset {
        line.push_str(&format!(" | Mean: {:.2} V", snapshot.mean));
    }
    if snapshot.frequency_scale != 1.0 {
        line.push_str(&format!(" | Scale: x{:.2}", snapshot.frequency_scale));
    }
    line.push_str(&format!(" | Waveform: {} | Mode: {}", snapshot.kind, snapshot.mode));
    line
}

pub struct CommandInterpreter {
    store: Arc<ParameterStore>,
    shutdown: Arc<ShutdownController>,
    settings_path: PathBuf,
}

impl CommandInterpreter {
    pub fn new(store: Arc<ParameterStore>, shutdown: Arc<ShutdownController>, settings_path: PathBuf) -> Self {
        Self {
            store,
            shutdown,
            settings_path,
        }
    }

    pub fn help(&self) -> String {
        let limits = self.store.limits();
        let unit = self.store.policy().amplitude_unit();
        let mut text = String::from("Commands:\n");
        text.push_str("  sine | square | triangle | sawtooth | pulse | cardiac | nothing\n");
        text.push_str(&format!(
            "  freq <hz>        frequency, {} - {} Hz\n",
            limits.frequency.0, limits.frequency.1
        ));
        text.push_str(&format!(
            "  amp <value>      amplitude, {} - {} {}\n",
            limits.amplitude.0, limits.amplitude.1, unit
        ));
        if let Some((lo, hi)) = limits.mean {
            text.push_str(&format!("  mean <volts>     mean level, {} - {} V (amplitude <= mean)\n", lo, hi));
        }
        text.push_str("  mode <keyboard|knobs|dual>\n");
        text.push_str("  status\n");
        text.push_str(&format!(
            "  save [path] | load [path]   default {}\n",
            self.settings_path.display()
        ));
        text.push_str("  quit");
        text
    }

    /// Parse and run one line
    pub fn execute(&self, line: &str) -> Reply {
        match parse(line) {
            Ok(Some(command)) => self.run_command(command),
            Ok(None) => Reply {
                message: String::new(),
                outcome: Outcome::Ignored,
            },
            Err(e) => Reply::say(e.to_string()),
        }
    }

    pub fn run_command(&self, command: Command) -> Reply {
        debug!("Command: {:?}", command);
        match command {
            Command::Help => Reply::say(self.help()),
            Command::Waveform(kind) => {
                let reply = self.keyboard_write(|s| s.kind = kind, |_| format!("Waveform set to {}", kind));
                if reply.is_ok() {
                    self.store.regenerate();
                }
                Reply::say(reply.unwrap_or_else(|message| message))
            }
            Command::Frequency(hz) => Reply::say(
                self.keyboard_write(|s| s.frequency = hz, |s| format!("Frequency set to {} Hz", s.frequency))
                    .unwrap_or_else(|message| message),
            ),
            Command::Amplitude(value) => {
                let unit = self.store.policy().amplitude_unit();
                Reply::say(
                    self.keyboard_write(
                        |s| s.amplitude = value,
                        |s| format!("Amplitude set to {} {}", s.amplitude, unit),
                    )
                    .unwrap_or_else(|message| message),
                )
            }
            Command::Mean(volts) => {
                if let Err(e) = self.store.limits().check_mean(volts) {
                    return Reply::say(self.rejection(&e));
                }
                Reply::say(
                    self.keyboard_write(|s| s.mean = volts, |s| format!("Mean set to {} V", s.mean))
                        .unwrap_or_else(|message| message),
                )
            }
            Command::Mode(mode) => match self.store.write(|s| s.mode = mode) {
                Ok(_) => Reply::say(format!("Control mode set to {}", mode)),
                Err(e) => Reply::say(self.rejection(&e)),
            },
            Command::Status => Reply::say(status_line(&self.store.read(), self.store.policy())),
            Command::Save(path) => {
                let path = path.unwrap_or_else(|| self.settings_path.clone());
                match settings::save_from(&self.store, &path) {
                    Ok(_) => Reply::say(format!("Saved settings to {}", path.display())),
                    Err(e) => Reply::say(format!("Save failed: {}", e)),
                }
            }
            Command::Load(path) => {
                let path = path.unwrap_or_else(|| self.settings_path.clone());
                match settings::load_into(&self.store, &path) {
                    Ok(report) => {
                        let mut message = format!("Loaded {}", path.display());
                        if !report.applied.is_empty() {
                            message.push_str(&format!(": applied {}", report.applied.join(", ")));
                        }
                        for (key, error) in &report.rejected {
                            message.push_str(&format!("\n  rejected {}: {}", key, error));
                        }
                        Reply::say(message)
                    }
                    Err(e) => Reply::say(format!("Load failed: {}", e)),
                }
            }
            Command::Quit => {
                let mut message = String::from("Stopping");
                if let Some(report) = self.shutdown.shutdown() {
                    if let Some(path) = report.saved_to {
                        message.push_str(&format!("; settings saved to {}", path.display()));
                    }
                }
                Reply {
                    message,
                    outcome: Outcome::Quit,
                }
            }
        }
    }

    /// Apply a parameter change if keyboard control is enabled.
    /// `Err` carries the message explaining why nothing changed.
    fn keyboard_write<M, D>(&self, mutate: M, describe: D) -> Result<String, String>
    where
        M: FnOnce(&mut ParameterSnapshot),
        D: FnOnce(&ParameterSnapshot) -> String,
    {
        match self.store.compare_and_set(|s| s.mode.accepts_keyboard(), mutate) {
            Ok(Some(committed)) => Ok(describe(&committed)),
            Ok(None) => Err("Knob control is active; use 'mode keyboard' or 'mode dual' first".to_string()),
            Err(e) => Err(self.rejection(&e)),
        }
    }

    fn rejection(&self, error: &ParamError) -> String {
        format!(
            "Rejected: {}\n  unchanged: {}",
            error,
            status_line(&self.store.read(), self.store.policy())
        )
    }

    pub fn store(&self) -> &Arc<ParameterStore> {
        &self.store
    }
}

/// Result of waiting for an input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Line(String),
    Idle,
    Closed,
}

/// Supplier of command lines
pub trait LineSource: Send {
    /// Wait up to `timeout` for the next line
    fn next_line(&mut self, timeout: Duration) -> LineEvent;
}

/// Scripted input: lines are served in order, then the source reports closed
impl LineSource for VecDeque<String> {
    fn next_line(&mut self, _timeout: Duration) -> LineEvent {
        match self.pop_front() {
            Some(line) => LineEvent::Line(line),
            None => LineEvent::Closed,
        }
    }
}

/// Standard input, read on a helper thread so the loop can keep polling the running flag
pub struct StdinLines {
    rx: Receiver<String>,
}

impl StdinLines {
    pub fn spawn() -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("stdin".to_string())
            .spawn(move || {
                for line in io::stdin().lock().lines() {
                    match line {
                        Ok(line) => {
                            if tx.send(line).is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
            })?;
        Ok(Self { rx })
    }
}

impl LineSource for StdinLines {
    fn next_line(&mut self, timeout: Duration) -> LineEvent {
        match self.rx.recv_timeout(timeout) {
            Ok(line) => LineEvent::Line(line),
            Err(RecvTimeoutError::Timeout) => LineEvent::Idle,
            Err(RecvTimeoutError::Disconnected) => LineEvent::Closed,
        }
    }
}

/// Prompt/read/reply loop around a `CommandInterpreter`
pub struct CommandLoop<W: Write + Send> {
    interpreter: CommandInterpreter,
    lines: Box<dyn LineSource>,
    out: W,
    poll: Duration,
}

impl<W: Write + Send> CommandLoop<W> {
    pub fn new(interpreter: CommandInterpreter, lines: Box<dyn LineSource>, out: W) -> Self {
        Self {
            interpreter,
            lines,
            out,
            poll: Duration::from_millis(100),
        }
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    fn prompt(&mut self) -> io::Result<()> {
        write!(self.out, "> ")?;
        self.out.flush()
    }

    /// Serve lines until `quit`, end of input, or the running flag is cleared
    pub fn serve(&mut self) -> io::Result<()> {
        let snapshot = self.interpreter.store().read();
        writeln!(self.out, "{}", self.interpreter.help())?;
        writeln!(self.out, "{}", status_line(&snapshot, self.interpreter.store().policy()))?;
        self.prompt()?;

        while self.interpreter.store().is_running() {
            match self.lines.next_line(self.poll) {
                LineEvent::Line(line) => {
                    let reply = self.interpreter.execute(&line);
                    if !reply.message.is_empty() {
                        writeln!(self.out, "{}", reply.message)?;
                    }
                    if reply.outcome == Outcome::Quit {
                        break;
                    }
                    self.prompt()?;
                }
                LineEvent::Idle => {}
                LineEvent::Closed => {
                    info!("Command input closed; generator keeps running until interrupted");
                    break;
                }
            }
        }
        writeln!(self.out)?;
        self.out.flush()
    }
}

impl<W: Write + Send> ParameterSource for CommandLoop<W> {
    fn kind(&self) -> SourceKind {
        SourceKind::Interactive
    }

    fn name(&self) -> &str {
        "commands"
    }

    fn run(&mut self) -> anyhow::Result<()> {
        self.serve()?;
        Ok(())
    }
}
