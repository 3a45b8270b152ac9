//! Settings persistence
//!
//! Snapshots are stored as `key=value` lines:
//!
//! ```text
//! waveform=triangle
//! freq=200
//! amp=60
//! mean=2.5      (offset deployments only)
//! ```
//!
//! Loading is forgiving: unknown keys and malformed lines are skipped, missing keys
//! keep the in-memory value, and an out-of-range value rejects only its own field.

use crate::config::ScalingPolicy;
use crate::engine::params::{ParamError, ParameterSnapshot, ParameterStore};
use crate::gen::WaveformKind;
use log::{debug, info, warn};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File used by `save`/`load` without a path and by save-on-exit
pub const DEFAULT_SETTINGS_PATH: &str = "settings.txt";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot read settings from {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("cannot write settings to {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// Values found in a settings file; `None` means the key was absent or unusable
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsPatch {
    pub kind: Option<WaveformKind>,
    pub frequency: Option<f64>,
    pub amplitude: Option<f64>,
    pub mean: Option<f64>,
    pub skipped_lines: usize,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.frequency.is_none() && self.amplitude.is_none() && self.mean.is_none()
    }
}

/// Outcome of applying a patch to the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub applied: Vec<&'static str>,
    pub rejected: Vec<(&'static str, ParamError)>,
    pub snapshot: Option<ParameterSnapshot>,
}

/// Parse settings text. Later occurrences of a key win.
pub fn parse(text: &str) -> SettingsPatch {
    let mut patch = SettingsPatch::default();

    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            debug!("settings line {}: no '=' in {:?}, skipped", number + 1, line);
            patch.skipped_lines += 1;
            continue;
        };
        let value = value.trim();
        let parsed = match key.trim().to_ascii_lowercase().as_str() {
            "waveform" => value.parse::<WaveformKind>().map(|kind| patch.kind = Some(kind)).is_ok(),
            "freq" | "frequency" => parse_number(value).map(|v| patch.frequency = Some(v)).is_some(),
            "amp" | "amplitude" => parse_number(value).map(|v| patch.amplitude = Some(v)).is_some(),
            "mean" | "offset" => parse_number(value).map(|v| patch.mean = Some(v)).is_some(),
            other => {
                debug!("settings line {}: unknown key '{}', skipped", number + 1, other);
                false
            }
        };
        if !parsed {
            patch.skipped_lines += 1;
        }
    }

    patch
}

fn parse_number(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Settings text for a snapshot; `mean` is written only by offset deployments
pub fn render(snapshot: &ParameterSnapshot, policy: ScalingPolicy) -> String {
    let mut text = format!(
        "waveform={}\nfreq={}\namp={}\n",
        snapshot.kind, snapshot.frequency, snapshot.amplitude
    );
    if policy == ScalingPolicy::Offset {
        text.push_str(&format!("mean={}\n", snapshot.mean));
    }
    text
}

/// Read and parse a settings file
pub fn load(path: impl AsRef<Path>) -> Result<SettingsPatch, SettingsError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let patch = parse(&text);
    if patch.skipped_lines > 0 {
        warn!("Skipped {} unusable lines in {}", patch.skipped_lines, path.display());
    }
    Ok(patch)
}

/// Write a snapshot to `path` through a temporary file and a rename,
/// so a crash mid-save leaves the previous file intact
pub fn save(
    path: impl AsRef<Path>,
    snapshot: &ParameterSnapshot,
    policy: ScalingPolicy,
) -> Result<(), SettingsError> {
    let path = path.as_ref();
    let mut temp_name = OsString::from(path.as_os_str());
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let write_error = |source| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    };
    fs::write(&temp_path, render(snapshot, policy)).map_err(write_error)?;
    fs::rename(&temp_path, path).map_err(|source| {
        let _ = fs::remove_file(&temp_path);
        write_error(source)
    })?;

    info!(
        "Saved settings to {}: {} {} Hz amplitude {}",
        path.display(),
        snapshot.kind,
        snapshot.frequency,
        snapshot.amplitude
    );
    Ok(())
}

/// Apply every acceptable field of `patch` to the store in one write, then
/// regenerate the buffer. Rejected fields keep their prior values.
pub fn apply(store: &ParameterStore, patch: &SettingsPatch) -> LoadReport {
    let limits = *store.limits();
    let has_mean = limits.mean.is_some();
    let mut report = LoadReport::default();

    let written = store.write(|s| {
        if let Some(kind) = patch.kind {
            s.kind = kind;
            report.applied.push("waveform");
        }
        if let Some(frequency) = patch.frequency {
            match limits.check_frequency(frequency) {
                Ok(()) => {
                    s.frequency = frequency;
                    report.applied.push("freq");
                }
                Err(e) => report.rejected.push(("freq", e)),
            }
        }

        let (prior_amplitude, prior_mean) = (s.amplitude, s.mean);
        let mut mean_taken = false;
        let mut amplitude_taken = false;
        if let (true, Some(mean)) = (has_mean, patch.mean) {
            match limits.check_mean(mean) {
                Ok(()) => {
                    s.mean = mean;
                    mean_taken = true;
                }
                Err(e) => report.rejected.push(("mean", e)),
            }
        }
        if let Some(amplitude) = patch.amplitude {
            match limits.check_amplitude(amplitude) {
                Ok(()) => {
                    s.amplitude = amplitude;
                    amplitude_taken = true;
                }
                Err(e) => report.rejected.push(("amp", e)),
            }
        }

        // amplitude <= mean: give up the new amplitude first, then the new mean
        if has_mean && amplitude_taken && s.amplitude > s.mean {
            report.rejected.push((
                "amp",
                ParamError::AmplitudeExceedsMean {
                    amplitude: s.amplitude,
                    mean: s.mean,
                },
            ));
            s.amplitude = prior_amplitude;
            amplitude_taken = false;
        }
        if has_mean && mean_taken && s.amplitude > s.mean {
            report.rejected.push((
                "mean",
                ParamError::AmplitudeExceedsMean {
                    amplitude: s.amplitude,
                    mean: s.mean,
                },
            ));
            s.mean = prior_mean;
            mean_taken = false;
        }

        if mean_taken {
            report.applied.push("mean");
        }
        if amplitude_taken {
            report.applied.push("amp");
        }
    });

    match written {
        Ok(snapshot) => {
            report.snapshot = Some(snapshot);
            store.regenerate();
        }
        Err(e) => {
            warn!("Settings could not be applied: {}", e);
            report.applied.clear();
        }
    }

    for (key, error) in &report.rejected {
        warn!("Settings value '{}' rejected: {}", key, error);
    }
    report
}

/// Load `path` and apply it to the store
pub fn load_into(store: &ParameterStore, path: impl AsRef<Path>) -> Result<LoadReport, SettingsError> {
    let patch = load(path.as_ref())?;
    let report = apply(store, &patch);
    info!(
        "Loaded settings from {}: applied [{}]",
        path.as_ref().display(),
        report.applied.join(", ")
    );
    Ok(report)
}

/// Save the store's current snapshot to `path`
pub fn save_from(store: &ParameterStore, path: impl AsRef<Path>) -> Result<ParameterSnapshot, SettingsError> {
    let snapshot = store.read();
    save(path, &snapshot, store.policy())?;
    Ok(snapshot)
}
