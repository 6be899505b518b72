//! Configuration module

use crate::{Error, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default chunk size for payload copies (64 KiB)
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default gzip compression level
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Compression settings
    pub compression: CompressionConfig,
    /// Directory packing settings
    pub pack: PackOptions,
    /// Extraction settings
    pub extract: ExtractOptions,
}

/// Compression configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// gzip compression level (0-9)
    pub level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl CompressionConfig {
    /// Check the level is one gzip accepts
    pub fn validate(&self) -> Result<()> {
        if self.level > 9 {
            return Err(Error::Config(format!(
                "compression level must be between 0 and 9, got {}",
                self.level
            )));
        }
        Ok(())
    }
}

/// Options for packing a directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackOptions {
    /// Follow symlinks (pack link targets instead of skipping links)
    pub follow_symlinks: bool,
    /// Chunk size in bytes for copying file contents
    #[serde(deserialize_with = "deserialize_size")]
    pub buffer_size: usize,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Options for extracting an archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    /// Apply stored permission bits to extracted files (Unix only)
    pub preserve_permissions: bool,
    /// Apply stored modification times to extracted files
    pub preserve_timestamps: bool,
    /// Chunk size in bytes for copying payloads to disk
    #[serde(deserialize_with = "deserialize_size")]
    pub buffer_size: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            preserve_permissions: true,
            preserve_timestamps: true,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Size given either as a number of bytes or as a string with a unit
#[derive(Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Numeric(u64),
    String(String),
}

fn deserialize_size<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    match SizeValue::deserialize(deserializer)? {
        SizeValue::Numeric(bytes) => usize::try_from(bytes)
            .map_err(|_| D::Error::custom(format!("Size too large: {}", bytes))),
        SizeValue::String(text) => parse_size(&text)
            .map_err(|e| D::Error::custom(format!("Failed to parse size: {}", e))),
    }
}

/// Parse a buffer size such as "64KiB" or "1MB" into bytes.
///
/// Only whole numbers are accepted, and the result must fit in `usize`.
pub fn parse_size(size_str: &str) -> Result<usize> {
    let size_str = size_str.trim();
    let split_pos = size_str
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(size_str.len());

    if split_pos == 0 {
        return Err(Error::Config(format!("Invalid size format: {}", size_str)));
    }

    let (number_part, unit_part) = size_str.split_at(split_pos);
    let number: usize = number_part
        .parse()
        .map_err(|_| Error::Config(format!("Invalid number in size: {}", number_part)))?;

    let multiplier: usize = match unit_part.trim().to_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1_000,
        "m" | "mb" => 1_000_000,
        "g" | "gb" => 1_000_000_000,
        "ki" | "kib" => 1 << 10,
        "mi" | "mib" => 1 << 20,
        "gi" | "gib" => 1 << 30,
        _ => return Err(Error::Config(format!("Unknown size unit: {}", unit_part))),
    };

    number
        .checked_mul(multiplier)
        .ok_or_else(|| Error::Config(format!("Size too large: {}", size_str)))
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = config_dir()
            .ok_or_else(|| Error::Config("Unable to determine config directory".to_string()))?;
        Ok(config_dir.join("spool").join("config.toml"))
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).map_err(|e| Error::filesystem("reading", path, e))?;
        Self::from_toml_str(&contents)
    }

    /// Load configuration from the default location, falling back to
    /// defaults when no file exists
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Save configuration to a file, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::filesystem("creating", parent, e))?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, contents).map_err(|e| Error::filesystem("writing", path, e))?;
        Ok(())
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        self.compression.validate()?;
        if self.pack.buffer_size == 0 || self.extract.buffer_size == 0 {
            return Err(Error::Config("buffer_size must be non-zero".to_string()));
        }
        Ok(())
    }
}
