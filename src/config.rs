use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Venue;
use crate::utils;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unknown timezone: {0}")]
    Timezone(String),
}

const DEFAULT_TIMEZONE: &str = "America/New_York";
const DEFAULT_CACHE_TTL_SECS: u64 = 60 * 60;
const DEFAULT_IMAGE_MAX_DIM: u32 = 1000;
const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:1234/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TEMPERATURE: f32 = 0.2;
const DEFAULT_MAX_TOKENS: u32 = 1000;
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub timezone: String,
    pub cache_ttl_secs: u64,
    pub image_max_dimension: u32,
    pub llm: LlmConfig,
    pub listings: Vec<ListingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub endpoint: String,
    pub model: String,
    /// Model used for flyer images; falls back to `model`.
    pub vision_model: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

/// An HTML listing page where each event is rendered as one card.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingConfig {
    pub venue: Venue,
    pub url: String,
    pub card_selector: String,
    #[serde(default)]
    pub link_selector: Option<String>,
    #[serde(default)]
    pub image_selector: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            image_max_dimension: DEFAULT_IMAGE_MAX_DIM,
            llm: LlmConfig::default(),
            listings: Vec::new(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            vision_model: None,
            api_key: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
        }
    }
}

impl AppConfig {
    /// Reads `config.json` from the data root, then applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = read_config(&utils::config_path())?;
        config.apply_env(|key| std::env::var(key).ok());
        config.tz()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        write_config(&utils::config_path(), self)
    }

    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(tz) = var("NIGHT_SCRAPE_TIMEZONE") {
            self.timezone = tz;
        }
        if let Some(ttl) = var("NIGHT_SCRAPE_CACHE_TTL_SECS").and_then(|s| s.parse().ok()) {
            self.cache_ttl_secs = ttl;
        }
        if let Some(dim) = var("NIGHT_SCRAPE_IMAGE_MAX_DIM").and_then(|s| s.parse().ok()) {
            self.image_max_dimension = dim;
        }
        if let Some(endpoint) = var("LLM_ENDPOINT") {
            self.llm.endpoint = endpoint;
        }
        if let Some(model) = var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(model) = var("LLM_VISION_MODEL") {
            self.llm.vision_model = Some(model);
        }
        if let Some(key) = var("LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(temperature) = var("LLM_TEMPERATURE").and_then(|s| s.parse().ok()) {
            self.llm.temperature = temperature;
        }
        if let Some(max_tokens) = var("LLM_MAX_TOKENS").and_then(|s| s.parse().ok()) {
            self.llm.max_tokens = max_tokens;
        }
        if let Some(timeout) = var("LLM_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.llm.timeout_secs = timeout;
        }
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Timezone(self.timezone.clone()))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn listing_for(&self, venue: Venue) -> Option<&ListingConfig> {
        self.listings.iter().find(|listing| listing.venue == venue)
    }
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&contents)?)
}

fn write_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let contents = serde_json::to_string_pretty(config)?;
    fs::write(path, contents).map_err(io_err)
}
