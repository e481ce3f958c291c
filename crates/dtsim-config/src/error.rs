//! Configuration-surfaced errors.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    FileNotFound { path: PathBuf },
    UnknownKey { key: String },
    MissingKey { key: &'static str },
    Malformed { key: String, value: String },
    BadOverride { spec: String },
    NotPowerOfTwo { key: &'static str, value: u64 },
    TooSmall { key: &'static str, value: u64, minimum: u64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileNotFound { path } => write!(f, "configuration file not found: {}", path.display()),
            Self::UnknownKey { key } => write!(f, "unrecognized configuration key '{key}'"),
            Self::MissingKey { key } => write!(f, "missing required configuration key '{key}'"),
            Self::Malformed { key, value } => write!(f, "key '{key}' has a malformed value '{value}'"),
            Self::BadOverride { spec } => write!(f, "malformed -o override '{spec}', expected NAME=VALUE"),
            Self::NotPowerOfTwo { key, value } => write!(f, "{key}={value} must be a power of two"),
            Self::TooSmall { key, value, minimum } => write!(f, "{key}={value} is below the minimum of {minimum}"),
        }
    }
}

impl std::error::Error for ConfigError {}
