//! Typed access to the `cue.*` keys of pmoconfig
//!
//! ```rust,ignore
//! use pmoconfig::get_config;
//! use pmocue::CueConfigExt;
//!
//! let config = get_config();
//! let options = config.get_cue_session_options()?;
//! config.set_cue_auto_fit(false)?;
//! ```
//!
//! Values of the wrong type are logged and replaced by their default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use pmoconfig::Config;
use serde_yaml::Value;
use tracing::warn;

use crate::player::{Point, Size};
use crate::session::SessionOptions;
use crate::shortcuts::KeyBindings;
use crate::window_fit::FitGeometry;

const DEFAULT_APPLICATION: &str = "Music";
const DEFAULT_MAIN_WINDOW_TITLE: &str = "Music";
const DEFAULT_CALL_TIMEOUT_MS: i64 = 3000;
const DEFAULT_POLL_INTERVAL_SECS: i64 = 5;
const DEFAULT_FIT_DELAY_MS: i64 = 500;

const APPLICATION: &[&str] = &["cue", "player", "application"];
const MAIN_WINDOW_TITLE: &[&str] = &["cue", "player", "main_window_title"];
const CALL_TIMEOUT_MS: &[&str] = &["cue", "player", "call_timeout_ms"];
const CATALOG_PATH: &[&str] = &["cue", "catalog", "path"];
const AUTO_FIT: &[&str] = &["cue", "features", "auto_fit"];
const RESUME_STUCK_VIDEO: &[&str] = &["cue", "features", "resume_stuck_video"];
const POLL_INTERVAL_SECS: &[&str] = &["cue", "reconcile", "poll_interval_secs"];
const FIT_DELAY_MS: &[&str] = &["cue", "window_fit", "delay_ms"];

pub trait CueConfigExt {
    /// Scripting name of the controlled player (default: `Music`)
    fn get_cue_player_application(&self) -> Result<String>;

    /// Title of the player's main window, skipped by the window fit
    fn get_cue_main_window_title(&self) -> Result<String>;

    fn get_cue_call_timeout(&self) -> Result<Duration>;

    /// Last catalog file used, `None` when never set
    fn get_cue_catalog_path(&self) -> Result<Option<PathBuf>>;
    fn set_cue_catalog_path(&self, path: &Path) -> Result<()>;

    fn get_cue_auto_fit(&self) -> Result<bool>;
    fn set_cue_auto_fit(&self, enabled: bool) -> Result<()>;

    fn get_cue_resume_stuck_video(&self) -> Result<bool>;
    fn set_cue_resume_stuck_video(&self, enabled: bool) -> Result<()>;

    fn get_cue_poll_interval(&self) -> Result<Duration>;

    fn get_cue_fit_delay(&self) -> Result<Duration>;
    fn get_cue_fit_geometry(&self) -> Result<FitGeometry>;
    fn get_cue_key_bindings(&self) -> Result<KeyBindings>;

    /// Everything a session needs, in one read
    fn get_cue_session_options(&self) -> Result<SessionOptions>;
}

fn read_string(config: &Config, path: &[&str], default: &str) -> String {
    match config.get_value(path) {
        Ok(Value::String(s)) if !s.is_empty() => s,
        Ok(Value::String(_)) | Err(_) => default.to_string(),
        Ok(other) => {
            warn!(key = %path.join("."), value = ?other, default, "Not a string, using default");
            default.to_string()
        }
    }
}

fn read_i64(config: &Config, path: &[&str], default: i64) -> i64 {
    match config.get_value(path) {
        Ok(Value::Number(n)) if n.is_i64() => n.as_i64().unwrap_or(default),
        Ok(Value::String(s)) => s.trim().parse().unwrap_or_else(|_| {
            warn!(key = %path.join("."), value = %s, default, "Not a number, using default");
            default
        }),
        Err(_) => default,
        Ok(other) => {
            warn!(key = %path.join("."), value = ?other, default, "Not a number, using default");
            default
        }
    }
}

fn read_bool(config: &Config, path: &[&str], default: bool) -> bool {
    match config.get_value(path) {
        Ok(Value::Bool(b)) => b,
        Err(_) => default,
        Ok(other) => {
            warn!(key = %path.join("."), value = ?other, default, "Not a boolean, using default");
            default
        }
    }
}

fn read_millis(config: &Config, path: &[&str], default: i64) -> Duration {
    Duration::from_millis(read_i64(config, path, default).max(0) as u64)
}

fn read_key_code(config: &Config, name: &str, default: u16) -> u16 {
    let code = read_i64(config, &["cue", "shortcuts", name], i64::from(default));
    u16::try_from(code).unwrap_or_else(|_| {
        warn!(shortcut = name, code, "Key code out of range, using default");
        default
    })
}

fn read_i32(config: &Config, name: &str, default: i32) -> i32 {
    let value = read_i64(config, &["cue", "window_fit", name], i64::from(default));
    i32::try_from(value).unwrap_or(default)
}

impl CueConfigExt for Config {
    fn get_cue_player_application(&self) -> Result<String> {
        Ok(read_string(self, APPLICATION, DEFAULT_APPLICATION))
    }

    fn get_cue_main_window_title(&self) -> Result<String> {
        Ok(read_string(self, MAIN_WINDOW_TITLE, DEFAULT_MAIN_WINDOW_TITLE))
    }

    fn get_cue_call_timeout(&self) -> Result<Duration> {
        Ok(read_millis(self, CALL_TIMEOUT_MS, DEFAULT_CALL_TIMEOUT_MS))
    }

    fn get_cue_catalog_path(&self) -> Result<Option<PathBuf>> {
        let path = read_string(self, CATALOG_PATH, "");
        Ok((!path.is_empty()).then(|| PathBuf::from(path)))
    }

    fn set_cue_catalog_path(&self, path: &Path) -> Result<()> {
        self.set_value(
            CATALOG_PATH,
            Value::String(path.to_string_lossy().to_string()),
        )
    }

    fn get_cue_auto_fit(&self) -> Result<bool> {
        Ok(read_bool(self, AUTO_FIT, true))
    }

    fn set_cue_auto_fit(&self, enabled: bool) -> Result<()> {
        self.set_value(AUTO_FIT, Value::Bool(enabled))
    }

    fn get_cue_resume_stuck_video(&self) -> Result<bool> {
        Ok(read_bool(self, RESUME_STUCK_VIDEO, false))
    }

    fn set_cue_resume_stuck_video(&self, enabled: bool) -> Result<()> {
        self.set_value(RESUME_STUCK_VIDEO, Value::Bool(enabled))
    }

    fn get_cue_poll_interval(&self) -> Result<Duration> {
        let secs = read_i64(self, POLL_INTERVAL_SECS, DEFAULT_POLL_INTERVAL_SECS);
        if secs <= 0 {
            warn!(secs, "Poll interval must be positive, using default");
            return Ok(Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS as u64));
        }
        Ok(Duration::from_secs(secs as u64))
    }

    fn get_cue_fit_delay(&self) -> Result<Duration> {
        Ok(read_millis(self, FIT_DELAY_MS, DEFAULT_FIT_DELAY_MS))
    }

    fn get_cue_fit_geometry(&self) -> Result<FitGeometry> {
        let default = FitGeometry::default();
        Ok(FitGeometry {
            anchor: Point {
                x: read_i32(self, "anchor_x", default.anchor.x),
                y: read_i32(self, "anchor_y", default.anchor.y),
            },
            reference: Size {
                width: read_i32(self, "width", default.reference.width),
                height: read_i32(self, "height", default.reference.height),
            },
            tolerance: read_i32(self, "tolerance", default.tolerance),
        })
    }

    fn get_cue_key_bindings(&self) -> Result<KeyBindings> {
        let default = KeyBindings::default();
        Ok(KeyBindings {
            previous: read_key_code(self, "previous", default.previous),
            replay: read_key_code(self, "replay", default.replay),
            next: read_key_code(self, "next", default.next),
        })
    }

    fn get_cue_session_options(&self) -> Result<SessionOptions> {
        Ok(SessionOptions {
            call_timeout: self.get_cue_call_timeout()?,
            poll_interval: self.get_cue_poll_interval()?,
            fit_delay: self.get_cue_fit_delay()?,
            fit_geometry: self.get_cue_fit_geometry()?,
            auto_fit: self.get_cue_auto_fit()?,
            resume_stuck_video: self.get_cue_resume_stuck_video()?,
            key_bindings: self.get_cue_key_bindings()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(yaml: &str) -> (TempDir, Config) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.yaml"), yaml).unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        (dir, config)
    }

    #[test]
    fn test_defaults_match_session_defaults() {
        let (_dir, config) = config("{}");
        let options = config.get_cue_session_options().unwrap();
        let expected = SessionOptions::default();

        assert_eq!(options.call_timeout, expected.call_timeout);
        assert_eq!(options.poll_interval, expected.poll_interval);
        assert_eq!(options.fit_delay, expected.fit_delay);
        assert_eq!(options.fit_geometry, expected.fit_geometry);
        assert_eq!(options.key_bindings, expected.key_bindings);
        assert!(options.auto_fit);
        assert!(!options.resume_stuck_video);
        assert_eq!(config.get_cue_catalog_path().unwrap(), None);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let (_dir, config) = config(
            "cue:\n  reconcile:\n    poll_interval_secs: 0\n  shortcuts:\n    next: 70000\n  features:\n    auto_fit: maybe\n",
        );
        assert_eq!(config.get_cue_poll_interval().unwrap(), Duration::from_secs(5));
        assert_eq!(config.get_cue_key_bindings().unwrap().next, 106);
        assert!(config.get_cue_auto_fit().unwrap());
    }

    #[test]
    fn test_toggles_and_catalog_path_persist() {
        let (dir, config) = config("{}");
        config.set_cue_resume_stuck_video(true).unwrap();
        config
            .set_cue_catalog_path(Path::new("/tmp/songs.json"))
            .unwrap();

        let reloaded = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        assert!(reloaded.get_cue_resume_stuck_video().unwrap());
        assert_eq!(
            reloaded.get_cue_catalog_path().unwrap(),
            Some(PathBuf::from("/tmp/songs.json"))
        );
    }
}
