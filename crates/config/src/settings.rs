// Host settings
// Loaded from ~/.config/luma/settings.json

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors reading or writing the settings file.
#[derive(Debug)]
pub enum SettingsError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "settings I/O error: {}", e),
            Self::Parse(e) => write!(f, "settings parse error: {}", e),
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for SettingsError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Runtime
    #[serde(rename = "runtime.executionQueueCapacity")]
    pub exec_queue_capacity: usize,

    #[serde(rename = "runtime.eventQueueCapacity")]
    pub event_queue_capacity: usize,

    #[serde(rename = "runtime.callbackTimeoutMs")]
    pub callback_timeout_ms: Option<u64>, // None = watchdog disabled

    #[serde(rename = "runtime.sandbox")]
    pub sandbox: bool,

    #[serde(rename = "runtime.consoleLines")]
    pub console_lines: usize,

    // Frame pacing
    #[serde(rename = "frame.targetFps")]
    pub target_fps: f64,

    #[serde(rename = "frame.maxFrames")]
    pub max_frames: Option<u64>, // None = run until quit

    // Window
    #[serde(rename = "window.width")]
    pub window_width: u32,

    #[serde(rename = "window.height")]
    pub window_height: u32,

    // Overlays
    #[serde(rename = "overlay.console")]
    pub overlay_console: bool,

    #[serde(rename = "overlay.stats")]
    pub overlay_stats: bool,

    #[serde(rename = "overlay.frameRate")]
    pub overlay_frame_rate: bool,

    // Logging
    #[serde(rename = "log.level")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            // Runtime
            exec_queue_capacity: 1024,
            event_queue_capacity: 1024,
            callback_timeout_ms: Some(10_000),
            sandbox: true,
            console_lines: 5000,
            // Frame
            target_fps: 60.0,
            max_frames: None,
            // Window
            window_width: 800,
            window_height: 600,
            // Overlays
            overlay_console: false,
            overlay_stats: false,
            overlay_frame_rate: false,
            // Logging
            log_level: "info".to_string(),
        }
    }
}

const DEFAULT_FILE: &str = r#"{
    // Script runtime
    "runtime.executionQueueCapacity": 1024,
    "runtime.eventQueueCapacity": 1024,
    // Per-callback time limit; null disables the watchdog
    "runtime.callbackTimeoutMs": 10000,
    "runtime.sandbox": true,
    "runtime.consoleLines": 5000,

    // Frame pacing (maxFrames null = run until the script quits)
    "frame.targetFps": 60,
    "frame.maxFrames": null,

    // Initial window size reported to scripts
    "window.width": 800,
    "window.height": 600,

    // Diagnostic overlays
    "overlay.console": false,
    "overlay.stats": false,
    "overlay.frameRate": false,

    // One of: error, warn, info, debug, trace
    "log.level": "info"
}
"#;

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("luma");
        config_dir.join("settings.json")
    }

    /// Load settings from the default path, falling back to defaults
    pub fn load() -> Self {
        Self::load_or_default(&Self::config_path())
    }

    /// Load from `path`. A missing file yields defaults; unreadable or
    /// malformed files fall back to defaults with a warning.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("{}: {}; using default settings", path.display(), e);
                Self::default()
            }
        }
    }

    /// Strict load. Lines starting with `//` are treated as comments.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, SettingsError> {
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(serde_json::from_str(&cleaned)?)
    }

    /// Save current settings to the default path
    pub fn save(&self) -> Result<(), SettingsError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Write the commented default file. Existing files are left alone;
    /// returns whether a file was written.
    pub fn write_default_file(path: &Path) -> Result<bool, SettingsError> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, DEFAULT_FILE)?;
        Ok(true)
    }

    pub fn callback_timeout(&self) -> Option<Duration> {
        self.callback_timeout_ms.map(Duration::from_millis)
    }

    /// Time budget per frame. Non-positive rates fall back to 60 fps.
    pub fn frame_interval(&self) -> Duration {
        let fps = if self.target_fps.is_finite() && self.target_fps > 0.0 {
            self.target_fps
        } else {
            60.0
        };
        Duration::from_secs_f64(1.0 / fps)
    }

    /// Get the config file path for display
    pub fn config_path_display() -> String {
        Self::config_path().to_string_lossy().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_file_matches_defaults() {
        let parsed = Settings::parse(DEFAULT_FILE).unwrap();
        assert_eq!(parsed, Settings::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let parsed = Settings::parse(
            r#"{
                // only override a couple of keys
                "frame.targetFps": 30,
                "runtime.callbackTimeoutMs": null
            }"#,
        )
        .unwrap();
        assert_eq!(parsed.target_fps, 30.0);
        assert_eq!(parsed.callback_timeout(), None);
        assert_eq!(parsed.exec_queue_capacity, 1024);
        assert!(parsed.sandbox);
    }

    #[test]
    fn test_frame_interval() {
        let mut settings = Settings::default();
        settings.target_fps = 50.0;
        assert_eq!(settings.frame_interval(), Duration::from_millis(20));
        settings.target_fps = 0.0;
        assert_eq!(settings.frame_interval(), Duration::from_secs_f64(1.0 / 60.0));
    }

    #[test]
    fn test_parse_error_variant() {
        let err = Settings::parse("{ not json").unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
        assert!(err.to_string().starts_with("settings parse error"));
    }
}
