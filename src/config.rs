//! Configuration resolution.
//!
//! Order: defaults, caller config, build mode, environment, validation.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use ui_renderer::{AppConfig, LogLevel, ParseLogLevelError};

/// Compile profile the application was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    #[default]
    Debug,
    /// Inspector is always disabled and logging defaults to `error`.
    Release,
}

impl BuildMode {
    #[must_use]
    pub fn current() -> Self {
        if cfg!(debug_assertions) {
            Self::Debug
        } else {
            Self::Release
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    ZeroDimension { field: &'static str },

    #[error("invalid colour '{0}'; expected #rgb, #rrggbb, #rrggbbaa, rgb() or rgba()")]
    InvalidColour(String),

    #[error("invalid TANDEM_LOG value: {0}")]
    InvalidLogLevel(ParseLogLevelError),

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config JSON{}: {source}", display_path(.path))]
    Parse {
        path: Option<PathBuf>,
        #[source]
        source: serde_json::Error,
    },
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" in {}", path.display()),
        None => String::new(),
    }
}

/// Environment overrides.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub log_level: Option<String>,
    pub disable_inspector: bool,
    pub title: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            log_level: env_string_opt("TANDEM_LOG"),
            disable_inspector: env_flag("TANDEM_DISABLE_INSPECTOR"),
            title: env_string_opt("TANDEM_TITLE"),
        }
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

/// Produces the immutable configuration the application runs with.
pub fn resolve(
    user: Option<AppConfig>,
    mode: BuildMode,
    env: &EnvConfig,
) -> Result<AppConfig, ConfigError> {
    let mut config = user.unwrap_or_default();

    if mode == BuildMode::Release {
        config.disable_inspector = true;
        config.log_level = LogLevel::Error;
    }

    if let Some(level) = &env.log_level {
        config.log_level = level
            .parse::<LogLevel>()
            .map_err(ConfigError::InvalidLogLevel)?;
    }
    if env.disable_inspector {
        config.disable_inspector = true;
    }
    if let Some(title) = &env.title {
        config.title = title.clone();
    }

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &AppConfig) -> Result<(), ConfigError> {
    if config.width == 0 {
        return Err(ConfigError::ZeroDimension { field: "width" });
    }
    if config.height == 0 {
        return Err(ConfigError::ZeroDimension { field: "height" });
    }
    if !is_valid_colour(&config.colour) {
        return Err(ConfigError::InvalidColour(config.colour.clone()));
    }
    Ok(())
}

pub fn from_json_str(json: &str) -> Result<AppConfig, ConfigError> {
    serde_json::from_str(json).map_err(|source| ConfigError::Parse { path: None, source })
}

pub fn from_path(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: Some(path.to_path_buf()),
        source,
    })
}

/// Accepts `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`, `rgb(r,g,b)` and
/// `rgba(r,g,b,a)` where `a` is either `0..=255` or `0.0..=1.0`.
pub fn is_valid_colour(value: &str) -> bool {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix('#') {
        return matches!(hex.len(), 3 | 4 | 6 | 8) && hex.chars().all(|ch| ch.is_ascii_hexdigit());
    }

    let lower = value.to_ascii_lowercase();
    let (inner, expected) = if let Some(rest) = lower.strip_prefix("rgba(") {
        (rest, 4)
    } else if let Some(rest) = lower.strip_prefix("rgb(") {
        (rest, 3)
    } else {
        return false;
    };
    let Some(inner) = inner.strip_suffix(')') else {
        return false;
    };

    let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
    if parts.len() != expected {
        return false;
    }

    let channels_ok = parts[..3].iter().all(|part| part.parse::<u8>().is_ok());
    let alpha_ok = match parts.get(3) {
        None => true,
        Some(alpha) => {
            alpha.parse::<u8>().is_ok()
                || alpha
                    .parse::<f32>()
                    .map(|value| (0.0..=1.0).contains(&value))
                    .unwrap_or(false)
        }
    };
    channels_ok && alpha_ok
}
