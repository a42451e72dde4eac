use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::address::{parse_units_str, AddressSpace, AddressTemplate};
use crate::error::EngineError;

/// Loaded when `--config` is not given and the file exists in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "vpos-reset.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub first_store: u16,
    pub last_store: u16,
    /// SCO numbers, e.g. `31-38,41-44`.
    pub units: String,
    pub host_prefix: String,
    pub host_middle: String,
    pub share: String,
    pub mount_root: Option<PathBuf>,
    pub probe_timeout_ms: u64,
    pub concurrency: usize,
    pub log_file: PathBuf,
    /// Read the value back after every write.
    pub verify_writes: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let template = AddressTemplate::default();
        Self {
            first_store: 2,
            last_store: 92,
            units: "31-38,41-44".into(),
            host_prefix: template.prefix,
            host_middle: template.middle,
            share: template.share,
            mount_root: None,
            probe_timeout_ms: 2000,
            concurrency: 16,
            log_file: PathBuf::from("VPOS_Reset_Log.log"),
            verify_writes: true,
        }
    }
}

impl Settings {
    pub fn address_space(&self) -> Result<AddressSpace, EngineError> {
        let units = parse_units_str(&self.units)
            .map_err(|e| EngineError::AddressSpace(format!("units `{}`: {e:#}", self.units)))?;
        AddressSpace::new(self.first_store..=self.last_store, units)
    }

    pub fn template(&self) -> AddressTemplate {
        AddressTemplate {
            prefix: self.host_prefix.clone(),
            middle: self.host_middle.clone(),
            share: self.share.clone(),
            mount_root: self.mount_root.clone(),
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms.max(1))
    }
}

/// Read settings from `path`, or from [`DEFAULT_CONFIG_FILE`] if present, or use defaults.
///
/// An explicitly named file that cannot be read or parsed is an error; a missing default file
/// is not.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG_FILE);
            if p.exists() {
                p.to_path_buf()
            } else {
                return Ok(Settings::default());
            }
        }
    };
    let s = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    parse_settings(&s).with_context(|| format!("invalid config file: {}", path.display()))
}

pub fn parse_settings(s: &str) -> Result<Settings> {
    if s.trim().is_empty() {
        return Ok(Settings::default());
    }
    Ok(serde_yaml::from_str(s)?)
}
