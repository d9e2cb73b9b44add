//! Configuration for the codec and the schema CLI
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (sauron.toml)
//! - Environment variables (SAURON__*)
//!
//! ## Example config file (sauron.toml):
//! ```toml
//! [codec]
//! serializer = "avro"
//! validate_constraints = true
//! apply_defaults = true
//!
//! [snapshot]
//! path = "schema/people.json"
//! output_format = "compact"
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SauronConfig {
    /// Codec settings
    #[serde(default)]
    pub codec: CodecConfig,

    /// Snapshot file settings
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

/// Wire serializers the codec can speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializerKind {
    #[default]
    #[serde(alias = "arvo")]
    Avro,
}

impl FromStr for SerializerKind {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            // "arvo" is a long-standing misspelling found in stored schemas
            "avro" | "arvo" => Ok(SerializerKind::Avro),
            _ => Err(SchemaError::UnknownSerializer(s.to_string())),
        }
    }
}

impl fmt::Display for SerializerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializerKind::Avro => write!(f, "avro"),
        }
    }
}

/// Codec configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Serializer used when the registry does not name one
    #[serde(default)]
    pub serializer: SerializerKind,

    /// Check number, string and array constraints on encode
    #[serde(default = "default_true")]
    pub validate_constraints: bool,

    /// Fill absent fields from their declared default on encode
    #[serde(default = "default_true")]
    pub apply_defaults: bool,
}

/// Snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Default snapshot file
    #[serde(default = "default_snapshot_path")]
    pub path: PathBuf,

    /// Output format (pretty or compact)
    #[serde(default)]
    pub output_format: OutputFormat,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

impl OutputFormat {
    pub fn is_pretty(self) -> bool {
        self == OutputFormat::Pretty
    }
}

fn default_true() -> bool {
    true
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("schema.json")
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            serializer: SerializerKind::Avro,
            validate_constraints: true,
            apply_defaults: true,
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: default_snapshot_path(),
            output_format: OutputFormat::Pretty,
        }
    }
}

impl SauronConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a specific file on top of the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["sauron.toml", ".sauron.toml", "config/sauron.toml"];
        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "sauron", "sauron") {
            let xdg_config = config_dir.config_dir().join("sauron.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // SAURON__CODEC__APPLY_DEFAULTS=false
        builder = builder.add_source(
            Environment::with_prefix("SAURON")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Snapshot path, resolved against the current directory
    pub fn snapshot_path(&self) -> PathBuf {
        if self.snapshot.path.is_absolute() {
            self.snapshot.path.clone()
        } else {
            std::env::current_dir().unwrap_or_default().join(&self.snapshot.path)
        }
    }
}
