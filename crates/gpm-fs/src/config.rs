//! Config file formats
//!
//! gpm reads `config.toml`, `config.yaml`/`config.yml` or `config.json`
//! from the global and repository config directories. The format follows
//! the extension, and the first candidate present in [`ConfigFormat::ALL`]
//! order wins.

use serde::{Serialize, de::DeserializeOwned};

use crate::{Error, NormalizedPath, Result, RobustnessConfig, io};

/// A serialization format accepted for config files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Lookup order used by [`find_config`]
    pub const ALL: [ConfigFormat; 3] = [Self::Toml, Self::Yaml, Self::Json];

    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Toml => &["toml"],
            Self::Yaml => &["yaml", "yml"],
            Self::Json => &["json"],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Yaml => "YAML",
            Self::Json => "JSON",
        }
    }

    /// Format named by the extension of `path`.
    pub fn of(path: &NormalizedPath) -> Result<Self> {
        let extension = path.extension().unwrap_or("").to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|format| format.extensions().contains(&extension.as_str()))
            .ok_or(Error::UnsupportedFormat { extension })
    }

    pub fn parse<T: DeserializeOwned>(self, content: &str) -> std::result::Result<T, String> {
        match self {
            Self::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            Self::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            Self::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        }
    }

    pub fn render<T: Serialize>(self, value: &T) -> std::result::Result<String, String> {
        match self {
            Self::Toml => toml::to_string_pretty(value).map_err(|e| e.to_string()),
            Self::Yaml => serde_yaml::to_string(value).map_err(|e| e.to_string()),
            Self::Json => serde_json::to_string_pretty(value).map_err(|e| e.to_string()),
        }
    }
}

/// Read and parse a config file in the format named by its extension.
pub fn load_config<T: DeserializeOwned>(path: &NormalizedPath) -> Result<T> {
    let format = ConfigFormat::of(path)?;
    let content = io::read_text(path)?;
    tracing::trace!(%path, format = format.label(), "Parsing config file");
    format.parse(&content).map_err(|message| Error::ConfigParse {
        path: path.to_native(),
        format: format.label().into(),
        message,
    })
}

/// Write `value` atomically in the format named by the extension of `path`.
pub fn save_config<T: Serialize>(path: &NormalizedPath, value: &T, robustness: RobustnessConfig) -> Result<()> {
    let format = ConfigFormat::of(path)?;
    let content = format.render(value).map_err(|message| Error::ConfigSerialize {
        path: path.to_native(),
        format: format.label().into(),
        message,
    })?;
    io::write_atomic(path, content.as_bytes(), robustness)
}

/// First `<stem>.<ext>` config file present in `dir`.
pub fn find_config(dir: &NormalizedPath, stem: &str) -> Option<NormalizedPath> {
    ConfigFormat::ALL
        .iter()
        .flat_map(|format| format.extensions())
        .map(|ext| dir.join(&format!("{stem}.{ext}")))
        .find(|candidate| candidate.is_file())
}
