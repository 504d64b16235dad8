use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::embed::Method;
use crate::geo::applicator::WindowTieBreak;
use crate::geo::grouper::MissingGpsPolicy;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub geo: GeoConfig,

    #[serde(default)]
    pub similarity: SimilarityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
}

fn default_image_extensions() -> Vec<String> {
    vec!["jpg".to_string(), "jpeg".to_string()]
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            image_extensions: default_image_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    /// Photos farther apart than this are not at the same place.
    #[serde(default = "default_max_distance_km")]
    pub max_distance_km: f64,

    /// Photos farther apart in time than this are not at the same visit.
    #[serde(default = "default_max_time_sec")]
    pub max_time_sec: i64,

    #[serde(default)]
    pub missing_gps_policy: MissingGpsPolicy,

    #[serde(default)]
    pub tie_break: WindowTieBreak,

    #[serde(default = "default_location_map")]
    pub location_map: PathBuf,
}

fn default_max_distance_km() -> f64 {
    0.5
}

fn default_max_time_sec() -> i64 {
    3600
}

fn default_location_map() -> PathBuf {
    PathBuf::from("location_map.csv")
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            max_distance_km: default_max_distance_km(),
            max_time_sec: default_max_time_sec(),
            missing_gps_policy: MissingGpsPolicy::default(),
            tie_break: WindowTieBreak::default(),
            location_map: default_location_map(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityConfig {
    #[serde(default)]
    pub method: Method,

    #[serde(default = "default_top_n")]
    pub top_n: usize,

    #[serde(default = "default_threshold")]
    pub threshold: f32,

    #[serde(default = "default_embedding_table")]
    pub embedding_table: PathBuf,
}

fn default_top_n() -> usize {
    10
}

fn default_threshold() -> f32 {
    0.95
}

fn default_embedding_table() -> PathBuf {
    PathBuf::from("embeddings.csv")
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            method: Method::default(),
            top_n: default_top_n(),
            threshold: default_threshold(),
            embedding_table: default_embedding_table(),
        }
    }
}

impl Config {
    /// Load from `PHOTOTRAIL_CONFIG`, the default config file, or fall back
    /// to defaults when no file exists yet.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("PHOTOTRAIL_CONFIG") {
            return Self::load_from(&PathBuf::from(path));
        }

        let config_path = Self::config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Config::default())
        }
    }

    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("phototrail")
            .join("config.toml")
    }
}
