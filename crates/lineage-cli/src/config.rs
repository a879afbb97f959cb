//! CLI configuration

use std::path::{Path, PathBuf};

use lineage_engine::EngineConfig;
use serde::{Deserialize, Serialize};

/// Get default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lineage")
}

/// Default location of the config file
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lineage")
        .join("config.toml")
}

/// Configuration for the CLI, stored as TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    pub backend: String,
    pub format: String,
    pub cache_enabled: bool,
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
    pub allow_reparenting: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            backend: "redb".to_string(),
            format: "table".to_string(),
            cache_enabled: true,
            cache_capacity: 1024,
            cache_ttl_secs: 3600,
            allow_reparenting: false,
        }
    }
}

const KEYS: &[&str] = &[
    "data_dir",
    "backend",
    "format",
    "cache_enabled",
    "cache_capacity",
    "cache_ttl_secs",
    "allow_reparenting",
];

impl Config {
    pub fn keys() -> &'static [&'static str] {
        KEYS
    }

    /// Load the config at `path`, falling back to defaults if it is missing
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("Invalid config file {}: {}", path.display(), e))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        tracing::debug!("Saved config to {:?}", path);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "data_dir" => self
                .data_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(default)".to_string()),
            "backend" => self.backend.clone(),
            "format" => self.format.clone(),
            "cache_enabled" => self.cache_enabled.to_string(),
            "cache_capacity" => self.cache_capacity.to_string(),
            "cache_ttl_secs" => self.cache_ttl_secs.to_string(),
            "allow_reparenting" => self.allow_reparenting.to_string(),
            _ => return None,
        };
        Some(value)
    }

    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "data_dir" => self.data_dir = Some(PathBuf::from(value)),
            "backend" => {
                if !matches!(value, "redb" | "sqlite" | "memory") {
                    anyhow::bail!("backend must be one of: redb, sqlite, memory");
                }
                self.backend = value.to_string();
            }
            "format" => {
                if !matches!(value, "table" | "json") {
                    anyhow::bail!("format must be one of: table, json");
                }
                self.format = value.to_string();
            }
            "cache_enabled" => self.cache_enabled = parse(key, value)?,
            "cache_capacity" => self.cache_capacity = parse(key, value)?,
            "cache_ttl_secs" => self.cache_ttl_secs = parse(key, value)?,
            "allow_reparenting" => self.allow_reparenting = parse(key, value)?,
            _ => anyhow::bail!(
                "Unknown config key: {} (available: {})",
                key,
                KEYS.join(", ")
            ),
        }
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            cache_ttl_secs: self.cache_ttl_secs,
            allow_reparenting: self.allow_reparenting,
            ..Default::default()
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> anyhow::Result<T> {
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid value for {}: {}", key, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut config = Config::default();
        config.set("backend", "sqlite").unwrap();
        config.set("cache_ttl_secs", "60").unwrap();
        assert_eq!(config.get("backend").as_deref(), Some("sqlite"));
        assert_eq!(config.engine_config().cache_ttl_secs, 60);

        assert!(config.set("backend", "postgres").is_err());
        assert!(config.set("cache_enabled", "maybe").is_err());
        assert!(config.set("colour", "blue").is_err());
        assert!(config.get("colour").is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        assert_eq!(Config::load(&path).unwrap(), Config::default());

        let mut config = Config::default();
        config.set("allow_reparenting", "true").unwrap();
        config.set("data_dir", "/tmp/family").unwrap();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert!(loaded.allow_reparenting);
        assert_eq!(loaded.data_dir(), PathBuf::from("/tmp/family"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str("format = \"json\"").unwrap();
        assert_eq!(config.format, "json");
        assert_eq!(config.backend, "redb");
        assert!(config.cache_enabled);
    }
}
