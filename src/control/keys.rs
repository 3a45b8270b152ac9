//! Single-key terminal control
//!
//! Up/Down nudge frequency, Right/Left nudge amplitude, j/k nudge the mean.
//! 1-7 pick a waveform, m toggles keyboard/knob control, s saves, q/e/Esc quit.

use super::commands::status_line;
use crate::config::Limits;
use crate::engine::params::{Field, ParameterSnapshot, ParameterStore};
use crate::engine::source::{ParameterSource, SourceKind};
use crate::gen::WaveformKind;
use crate::settings;
use crate::shutdown::ShutdownController;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use log::{debug, warn};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// What a key press did
#[derive(Debug, Clone, PartialEq)]
pub enum KeyAction {
    Updated(ParameterSnapshot),
    Refused(String),
    Saved(PathBuf),
    Quit,
    Ignored,
}

/// Restores cooked mode when dropped, including on early return
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            warn!("Could not restore terminal mode: {}", e);
        }
    }
}

pub struct KeyControl {
    store: Arc<ParameterStore>,
    shutdown: Arc<ShutdownController>,
    settings_path: PathBuf,
    poll: Duration,
}

fn snap(value: f64, step: f64) -> f64 {
    if step > 0.0 {
        (value / step).round() * step
    } else {
        value
    }
}

fn nudge(limits: &Limits, field: Field, s: &mut ParameterSnapshot, direction: f64) {
    match field {
        Field::Frequency => {
            let next = snap(s.frequency + direction * limits.frequency_step, limits.frequency_step);
            s.frequency = limits.clamp(Field::Frequency, next, s.mean);
        }
        Field::Amplitude => {
            let next = snap(s.amplitude + direction * limits.amplitude_step, limits.amplitude_step);
            s.amplitude = limits.clamp(Field::Amplitude, next, s.mean);
        }
        Field::Mean => {
            let next = snap(s.mean + direction * limits.mean_step, limits.mean_step);
            // never drop below the amplitude
            s.mean = limits.clamp(Field::Mean, next.max(s.amplitude), s.mean);
        }
        Field::FrequencyScale => {}
    }
}

impl KeyControl {
    pub fn new(store: Arc<ParameterStore>, shutdown: Arc<ShutdownController>, settings_path: PathBuf) -> Self {
        Self {
            store,
            shutdown,
            settings_path,
            poll: Duration::from_millis(16),
        }
    }

    /// Apply one key press to the store
    pub fn handle_key(&self, key: KeyEvent) -> KeyAction {
        if key.kind != KeyEventKind::Press {
            return KeyAction::Ignored;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return self.quit();
        }

        match key.code {
            KeyCode::Up => self.adjust(Field::Frequency, 1.0),
            KeyCode::Down => self.adjust(Field::Frequency, -1.0),
            KeyCode::Right => self.adjust(Field::Amplitude, 1.0),
            KeyCode::Left => self.adjust(Field::Amplitude, -1.0),
            KeyCode::Char('k') | KeyCode::Char('K') => self.adjust(Field::Mean, 1.0),
            KeyCode::Char('j') | KeyCode::Char('J') => self.adjust(Field::Mean, -1.0),
            KeyCode::Char(digit @ '1'..='7') => {
                let kind = WaveformKind::ALL[(digit as usize) - ('1' as usize)];
                match self.store.compare_and_set(|s| s.mode.accepts_keyboard(), |s| s.kind = kind) {
                    Ok(Some(committed)) => {
                        self.store.regenerate();
                        KeyAction::Updated(committed)
                    }
                    Ok(None) => self.refused_by_mode(),
                    Err(e) => KeyAction::Refused(e.to_string()),
                }
            }
            KeyCode::Char('m') | KeyCode::Char('M') => {
                match self.store.write(|s| s.mode = s.mode.toggled()) {
                    Ok(snapshot) => KeyAction::Updated(snapshot),
                    Err(e) => KeyAction::Refused(e.to_string()),
                }
            }
            KeyCode::Char('s') | KeyCode::Char('S') => match settings::save_from(&self.store, &self.settings_path) {
                Ok(_) => KeyAction::Saved(self.settings_path.clone()),
                Err(e) => KeyAction::Refused(e.to_string()),
            },
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Char('e') | KeyCode::Char('E') | KeyCode::Esc => {
                self.quit()
            }
            _ => KeyAction::Ignored,
        }
    }

    fn adjust(&self, field: Field, direction: f64) -> KeyAction {
        let limits = *self.store.limits();
        if field == Field::Mean && limits.mean.is_none() {
            return KeyAction::Ignored;
        }
        match self
            .store
            .compare_and_set(|s| s.mode.accepts_keyboard(), |s| nudge(&limits, field, s, direction))
        {
            Ok(Some(committed)) => KeyAction::Updated(committed),
            Ok(None) => self.refused_by_mode(),
            Err(e) => KeyAction::Refused(e.to_string()),
        }
    }

    fn refused_by_mode(&self) -> KeyAction {
        KeyAction::Refused("knob control is active, press m for keyboard control".to_string())
    }

    fn quit(&self) -> KeyAction {
        self.shutdown.shutdown();
        KeyAction::Quit
    }

    fn render(&self, note: Option<&str>) -> io::Result<()> {
        let mut out = io::stdout();
        let status = status_line(&self.store.read(), self.store.policy());
        match note {
            Some(note) => write!(out, "\r{} ({})\x1b[K", status, note)?,
            None => write!(out, "\r{}\x1b[K", status)?,
        }
        out.flush()
    }

    /// Read keys until quit or the running flag is cleared
    pub fn serve(&mut self) -> io::Result<()> {
        println!("Up/Down: frequency | Left/Right: amplitude | j/k: mean | 1-7: waveform");
        println!("m: toggle knobs | s: save | q: quit");
        let guard = RawModeGuard::enable()?;
        self.render(None)?;

        while self.store.is_running() {
            if !event::poll(self.poll)? {
                continue;
            }
            if let Event::Key(key) = event::read()? {
                let action = self.handle_key(key);
                debug!("Key {:?}: {:?}", key.code, action);
                match action {
                    KeyAction::Quit => break,
                    KeyAction::Updated(_) => self.render(None)?,
                    KeyAction::Saved(path) => self.render(Some(&format!("saved to {}", path.display())))?,
                    KeyAction::Refused(reason) => self.render(Some(&reason))?,
                    KeyAction::Ignored => {}
                }
            }
        }

        drop(guard);
        println!("\nQuitting...");
        Ok(())
    }
}

impl ParameterSource for KeyControl {
    fn kind(&self) -> SourceKind {
        SourceKind::Interactive
    }

    fn name(&self) -> &str {
        "keys"
    }

    fn run(&mut self) -> anyhow::Result<()> {
        self.serve()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use crate::engine::params::ControlMode;

    fn control(config: GeneratorConfig) -> (KeyControl, Arc<ParameterStore>) {
        let store = Arc::new(ParameterStore::new(&config, config.initial_snapshot()).unwrap());
        let shutdown = Arc::new(ShutdownController::new(store.clone(), None));
        let path = std::env::temp_dir().join("wavegen-keys-unused.txt");
        (KeyControl::new(store.clone(), shutdown, path), store)
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_arrows_saturate_at_bounds() {
        let (keys, store) = control(GeneratorConfig::offset());
        // offset defaults sit at the top of the frequency range
        keys.handle_key(press(KeyCode::Up));
        assert_eq!(store.read().frequency, 10.0);

        keys.handle_key(press(KeyCode::Down));
        assert!((store.read().frequency - 9.9).abs() < 1e-9);

        for _ in 0..200 {
            keys.handle_key(press(KeyCode::Left));
        }
        assert!((store.read().amplitude - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_amplitude_held_under_mean() {
        let (keys, store) = control(GeneratorConfig::offset());
        for _ in 0..5 {
            keys.handle_key(press(KeyCode::Char('j')));
        }
        // mean cannot go below amplitude, which starts at 2.5
        assert_eq!(store.read().mean, 2.5);

        keys.handle_key(press(KeyCode::Left));
        keys.handle_key(press(KeyCode::Char('j')));
        let s = store.read();
        assert!(s.amplitude <= s.mean);
        assert!((s.mean - 2.4).abs() < 1e-9);
    }

    #[test]
    fn test_digit_selects_waveform() {
        let (keys, store) = control(GeneratorConfig::percentage());
        keys.handle_key(press(KeyCode::Char('3')));
        assert_eq!(store.read().kind, WaveformKind::Triangle);
        keys.handle_key(press(KeyCode::Char('7')));
        assert_eq!(store.read().kind, WaveformKind::Flat);
    }

    #[test]
    fn test_knob_mode_refuses_nudges() {
        let (keys, store) = control(GeneratorConfig::percentage());
        keys.handle_key(press(KeyCode::Char('m')));
        assert_eq!(store.read().mode, ControlMode::Knobs);

        let before = store.read();
        assert!(matches!(keys.handle_key(press(KeyCode::Up)), KeyAction::Refused(_)));
        assert_eq!(store.read(), before);
    }

    #[test]
    fn test_quit_keys_stop_the_store() {
        let (keys, store) = control(GeneratorConfig::percentage());
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(keys.handle_key(ctrl_c), KeyAction::Quit);
        assert!(!store.is_running());
    }
}
