use crate::controller::{ControllerSettings, DEFAULT_MAX_PROGRESS_STEP};
use hairmatch_hw::StreamConstraints;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default checkout page for the premium subscription.
pub const DEFAULT_CHECKOUT_URL: &str =
    "https://www.mercadopago.com.br/subscriptions/checkout?preapproval_plan_id=f3e587d9e2a146479f139de7748ac610";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Application configuration.
///
/// Layered as defaults, then an optional TOML file named by
/// `HAIRMATCH_CONFIG`, then `HAIRMATCH_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// JSON file holding the entitlement flags.
    pub entitlements_path: PathBuf,
    /// Interval between analysis progress ticks.
    pub tick_ms: u64,
    /// Pause between progress reaching 100 and the classifier call.
    pub settle_ms: u64,
    /// Upper bound of a single random progress increment.
    pub max_progress_step: f32,
    /// External checkout page opened by the upgrade flow.
    pub checkout_url: String,
    pub preview_width: u32,
    pub preview_height: u32,
    /// How long the CLI lets the camera run before grabbing a still.
    pub warmup_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_device: "/dev/video0".to_string(),
            entitlements_path: default_data_dir().join("entitlements.json"),
            tick_ms: 200,
            settle_ms: 500,
            max_progress_step: DEFAULT_MAX_PROGRESS_STEP,
            checkout_url: DEFAULT_CHECKOUT_URL.to_string(),
            preview_width: 640,
            preview_height: 480,
            warmup_ms: 500,
        }
    }
}

impl Config {
    /// Load defaults, the optional config file, then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os("HAIRMATCH_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a TOML config file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `HAIRMATCH_*` overrides read through `lookup`. Unparseable
    /// values are ignored and the current value kept.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("HAIRMATCH_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = lookup("HAIRMATCH_ENTITLEMENTS_PATH") {
            self.entitlements_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("HAIRMATCH_CHECKOUT_URL") {
            self.checkout_url = v;
        }
        self.tick_ms = parse_or(&lookup, "HAIRMATCH_TICK_MS", self.tick_ms);
        self.settle_ms = parse_or(&lookup, "HAIRMATCH_SETTLE_MS", self.settle_ms);
        self.max_progress_step =
            parse_or(&lookup, "HAIRMATCH_MAX_PROGRESS_STEP", self.max_progress_step);
        self.preview_width = parse_or(&lookup, "HAIRMATCH_PREVIEW_WIDTH", self.preview_width);
        self.preview_height = parse_or(&lookup, "HAIRMATCH_PREVIEW_HEIGHT", self.preview_height);
        self.warmup_ms = parse_or(&lookup, "HAIRMATCH_WARMUP_MS", self.warmup_ms);
    }

    /// Timing and stream parameters for the session controller.
    pub fn controller_settings(&self) -> ControllerSettings {
        let max_progress_step = if self.max_progress_step.is_finite() && self.max_progress_step > 0.0 {
            self.max_progress_step
        } else {
            tracing::warn!(
                value = self.max_progress_step,
                fallback = DEFAULT_MAX_PROGRESS_STEP,
                "max_progress_step must be positive; using default"
            );
            DEFAULT_MAX_PROGRESS_STEP
        };
        ControllerSettings {
            tick: Duration::from_millis(self.tick_ms.max(1)),
            settle: Duration::from_millis(self.settle_ms),
            max_progress_step,
            constraints: StreamConstraints {
                ideal_width: self.preview_width,
                ideal_height: self.preview_height,
                ..StreamConstraints::default()
            },
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("hairmatch")
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    current: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.tick_ms, 200);
        assert_eq!(config.settle_ms, 500);
        assert_eq!(config.max_progress_step, 15.0);
        assert!(config.entitlements_path.ends_with("hairmatch/entitlements.json"));
    }

    #[test]
    fn test_file_keeps_defaults_for_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hairmatch.toml");
        std::fs::write(&path, "camera_device = \"/dev/video4\"\ntick_ms = 50\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.camera_device, "/dev/video4");
        assert_eq!(config.tick_ms, 50);
        assert_eq!(config.settle_ms, 500);
    }

    #[test]
    fn test_file_parse_error_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "tick_ms = \"soon\"").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_overrides_apply_and_ignore_garbage() {
        let env: HashMap<&str, &str> = [
            ("HAIRMATCH_TICK_MS", "10"),
            ("HAIRMATCH_SETTLE_MS", "not-a-number"),
            ("HAIRMATCH_ENTITLEMENTS_PATH", "/var/lib/hairmatch/flags.json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.tick_ms, 10);
        assert_eq!(config.settle_ms, 500);
        assert_eq!(
            config.entitlements_path,
            PathBuf::from("/var/lib/hairmatch/flags.json")
        );
    }

    #[test]
    fn test_controller_settings_carry_preview_size() {
        let config = Config {
            preview_width: 1280,
            preview_height: 720,
            tick_ms: 0,
            ..Config::default()
        };
        let settings = config.controller_settings();
        assert_eq!(settings.constraints.ideal_width, 1280);
        assert_eq!(settings.constraints.ideal_height, 720);
        assert_eq!(settings.tick, Duration::from_millis(1));
    }

    #[test]
    fn test_unusable_progress_step_falls_back_to_default() {
        for raw in ["0", "-3", "NaN", "inf"] {
            let mut config = Config::default();
            config.apply_overrides(|key| {
                (key == "HAIRMATCH_MAX_PROGRESS_STEP").then(|| raw.to_string())
            });
            let settings = config.controller_settings();
            assert_eq!(settings.max_progress_step, DEFAULT_MAX_PROGRESS_STEP, "raw={raw}");
        }

        let mut config = Config::default();
        config.apply_overrides(|key| (key == "HAIRMATCH_MAX_PROGRESS_STEP").then(|| "40".into()));
        assert_eq!(config.controller_settings().max_progress_step, 40.0);
    }
}
