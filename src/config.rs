use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::aggregate::DEFAULT_UNTAGGED;
use crate::lookup::DEFAULT_MAX_ENTRIES;
use crate::report::ReportFormat;

/// Flow logs larger than this are rejected unless configured otherwise.
pub const DEFAULT_MAX_FLOW_LOG_BYTES: u64 = 10 * 1024 * 1024;

fn empty_path_none<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<PathBuf>::deserialize(deserializer)?;
    Ok(opt.and_then(|path| {
        if path.as_os_str().is_empty() {
            None
        } else {
            Some(path)
        }
    }))
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "config io error: {}", err),
            ConfigError::Parse(err) => write!(f, "config parse error: {}", err),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub lookup: LookupConfig,
    pub protocols: ProtocolsConfig,
    pub flow_log: FlowLogConfig,
    pub output: OutputConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lookup.untagged_label.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "lookup.untagged_label must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Maximum number of rows in the lookup table.
    pub max_entries: usize,
    /// Tag reported for records without a lookup entry.
    pub untagged_label: String,
}

impl Default for LookupConfig {
    fn default() -> Self {
        LookupConfig {
            max_entries: DEFAULT_MAX_ENTRIES,
            untagged_label: DEFAULT_UNTAGGED.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolsConfig {
    /// CSV of `number,name[,description]` rows added to the built-in table.
    #[serde(deserialize_with = "empty_path_none")]
    pub mapping_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowLogConfig {
    /// Reject flow logs larger than this many bytes (0 = unlimited).
    pub max_file_bytes: u64,
    /// Malformed lines logged at warn level before switching to debug.
    pub max_logged_malformed: u64,
}

impl Default for FlowLogConfig {
    fn default() -> Self {
        FlowLogConfig {
            max_file_bytes: DEFAULT_MAX_FLOW_LOG_BYTES,
            max_logged_malformed: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: ReportFormat,
    pub quiet: bool,
}
