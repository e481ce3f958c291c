//! Raw configuration store: a parsed file plus CLI overrides
//! (CLI flag `-o NAME=VAL`).

use std::collections::HashMap;
use std::path::Path;

use crate::error::ConfigError;
use crate::parser;

/// Untyped key/value store. Overrides always win over file contents,
/// mirroring a layered-config pattern (CLI flags win over a
/// config file).
#[derive(Debug, Clone, Default)]
pub struct Config {
    data: HashMap<String, String>,
    overrides: HashMap<String, String>,
}

impl Config {
    #[must_use]
    pub fn from_str(text: &str) -> Self {
        Self {
            data: parser::parse(text),
            overrides: HashMap::new(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound { path: path.to_path_buf() })?;
        Ok(Self::from_str(&text))
    }

    /// Apply a `-o NAME=VALUE` CLI override.
    pub fn apply_override(&mut self, spec: &str) -> Result<(), ConfigError> {
        let (name, value) = spec.split_once('=').ok_or_else(|| ConfigError::BadOverride { spec: spec.to_string() })?;
        self.overrides.insert(name.trim().to_uppercase(), value.trim().to_string());
        Ok(())
    }

    #[must_use]
    pub fn get_string(&self, name: &str) -> Option<&str> {
        let key = name.to_uppercase();
        self.overrides.get(&key).or_else(|| self.data.get(&key)).map(String::as_str)
    }

    pub fn get_u64(&self, name: &str, default: u64) -> Result<u64, ConfigError> {
        match self.get_string(name) {
            None => Ok(default),
            Some(v) => v.parse().map_err(|_| ConfigError::Malformed {
                key: name.to_string(),
                value: v.to_string(),
            }),
        }
    }

    pub fn get_u32(&self, name: &str, default: u32) -> Result<u32, ConfigError> {
        Ok(u32::try_from(self.get_u64(name, u64::from(default))?).unwrap_or(u32::MAX))
    }
}
