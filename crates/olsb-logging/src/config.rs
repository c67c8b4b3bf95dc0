//! Logging configuration
//!
//! A [`LogConfig`] decides which events pass the filter, how they reach the
//! console, and whether they are also written to JSONL files. The filter is a
//! base level plus per-target overrides, so a protocol trace can be switched
//! on without the noise of every dependency.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Targets whose events make up a protocol trace
pub const PROTOCOL_TARGETS: [&str; 2] = ["olsb_routing", "olsb_simulation"];

/// Main logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level for targets without an override (RUST_LOG replaces the whole filter)
    pub level: String,
    /// Per-target levels, e.g. `olsb_routing = "trace"`
    pub targets: BTreeMap<String, String>,
    /// Console output format
    pub console: ConsoleFormat,
    /// JSONL file output
    pub file: Option<FileConfig>,
    /// Record source file and line in JSON output
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            targets: BTreeMap::new(),
            console: ConsoleFormat::Json,
            file: None,
            include_location: false,
        }
    }
}

impl LogConfig {
    /// Pretty console output at debug level
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            console: ConsoleFormat::Pretty { ansi: true },
            ..Default::default()
        }
    }

    /// OLSB crates at `level`, everything else at warn
    ///
    /// Suited to following route decisions and timer activity in a
    /// simulation without dependency chatter.
    pub fn protocol(level: &str) -> Self {
        let targets = PROTOCOL_TARGETS
            .iter()
            .map(|target| (target.to_string(), level.to_string()))
            .collect();
        Self {
            level: "warn".to_string(),
            targets,
            console: ConsoleFormat::Pretty { ansi: true },
            ..Default::default()
        }
    }

    /// JSONL files only, for long simulation runs
    pub fn production(log_dir: PathBuf) -> Self {
        Self {
            console: ConsoleFormat::Off,
            file: Some(FileConfig::new(log_dir)),
            ..Default::default()
        }
    }

    /// Warnings only, plain console
    pub fn testing() -> Self {
        Self {
            level: "warn".to_string(),
            console: ConsoleFormat::Pretty { ansi: false },
            ..Default::default()
        }
    }

    /// Set the base level, keeping target overrides
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Override the level of one target
    pub fn with_target(mut self, target: impl Into<String>, level: impl Into<String>) -> Self {
        self.targets.insert(target.into(), level.into());
        self
    }

    /// Filter directives in `EnvFilter` syntax
    pub fn directives(&self) -> String {
        std::iter::once(self.level.clone())
            .chain(
                self.targets
                    .iter()
                    .map(|(target, level)| format!("{target}={level}")),
            )
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// How events are written to the console
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleFormat {
    /// No console output
    Off,
    /// Human-readable lines
    Pretty { ansi: bool },
    /// One JSON object per line
    #[default]
    Json,
}

/// File output configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    /// Directory for log files
    pub directory: PathBuf,
    /// File name prefix
    pub prefix: String,
    /// Rotation strategy
    pub rotation: RotationStrategy,
}

impl FileConfig {
    /// Daily-rotated `olsb.*` files in a directory
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            prefix: "olsb".to_string(),
            rotation: RotationStrategy::Daily,
        }
    }

    /// Files for a single node, named after its address
    ///
    /// Node 10.1.1.3 logs to `olsb-10-1-1-3.*`, so nodes sharing a
    /// directory never write to the same file.
    pub fn for_node(directory: impl Into<PathBuf>, address: Ipv4Addr) -> Self {
        let [a, b, c, d] = address.octets();
        Self {
            prefix: format!("olsb-{a}-{b}-{c}-{d}"),
            ..Self::new(directory)
        }
    }

    /// Use a rotation strategy
    pub fn with_rotation(mut self, rotation: RotationStrategy) -> Self {
        self.rotation = rotation;
        self
    }
}

/// File rotation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    /// Single file, truncated on start
    Never,
}
