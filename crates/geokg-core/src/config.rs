//! GeoKG Configuration Management
//!
//! Handles configuration from environment variables and TOML config files,
//! with defaults suitable for running against the public authorities.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Geocoding service used to hydrate locations
    pub geocoder: GeocoderConfig,

    /// Stratigraphic/mineral lexicon authority
    pub authority: AuthorityConfig,

    /// Entity alignment settings
    pub alignment: AlignmentConfig,

    /// Embedding provider used by alignment
    pub embedding: EmbeddingConfig,

    /// Ontology serializer settings
    pub serializer: SerializerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Geocoder
        if let Ok(url) = std::env::var("GEOCODE_URL") {
            config.geocoder.base_url = url;
        }
        if let Ok(key) = std::env::var("GEOCODE_API_KEY") {
            config.geocoder.api_key = Some(key);
        }

        // Authority
        if let Ok(url) = std::env::var("MACROSTRAT_URL") {
            config.authority.base_url = url;
        }

        // Embedding
        if let Ok(provider) = std::env::var("EMBEDDING_PROVIDER") {
            config.embedding.provider = provider.parse()?;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.embedding.openai_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            config.embedding.ollama_url = url;
        }

        // Alignment
        if let Ok(dir) = std::env::var("ALIGNMENT_DIR") {
            config.alignment.artifact_dir = PathBuf::from(dir);
        }
        if let Ok(threshold) = std::env::var("ALIGNMENT_THRESHOLD") {
            config.alignment.threshold =
                threshold.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "ALIGNMENT_THRESHOLD".to_string(),
                    value: threshold,
                })?;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(json) = std::env::var("LOG_JSON") {
            config.logging.json_format = matches!(json.as_str(), "1" | "true" | "yes");
        }

        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;

        // Only override if env values differ from defaults
        if env_config.geocoder.base_url != GeocoderConfig::default().base_url {
            self.geocoder.base_url = env_config.geocoder.base_url;
        }
        if env_config.authority.base_url != AuthorityConfig::default().base_url {
            self.authority.base_url = env_config.authority.base_url;
        }
        if env_config.embedding.provider != EmbeddingConfig::default().provider {
            self.embedding.provider = env_config.embedding.provider;
        }
        if env_config.embedding.model != EmbeddingConfig::default().model {
            self.embedding.model = env_config.embedding.model;
        }
        if env_config.alignment.artifact_dir != AlignmentConfig::default().artifact_dir {
            self.alignment.artifact_dir = env_config.alignment.artifact_dir;
        }
        if std::env::var("ALIGNMENT_THRESHOLD").is_ok() {
            self.alignment.threshold = env_config.alignment.threshold;
        }
        if env_config.logging.level != LoggingConfig::default().level {
            self.logging.level = env_config.logging.level;
        }

        // Always use env for sensitive values
        if env_config.geocoder.api_key.is_some() {
            self.geocoder.api_key = env_config.geocoder.api_key;
        }
        if env_config.embedding.openai_api_key.is_some() {
            self.embedding.openai_api_key = env_config.embedding.openai_api_key;
        }

        Ok(self)
    }
}

/// Pacing and backoff for one outbound authority
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Starting spacing between slot reuses, in seconds
    pub interval_secs: f64,

    /// Floor for the adaptive interval; defaults to the starting interval
    pub min_interval_secs: Option<f64>,

    /// Ceiling for the adaptive interval
    pub max_interval_secs: f64,

    /// Send slots per interval; each frees `interval` after it was taken
    pub max_in_flight: usize,

    /// Attempts per logical request when the service answers 429/503
    pub max_attempts: u32,

    /// Per-request timeout in seconds, response body included
    pub timeout_secs: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            interval_secs: 1.0,
            min_interval_secs: None,
            max_interval_secs: 60.0,
            max_in_flight: 1,
            max_attempts: 3,
            timeout_secs: 30.0,
        }
    }
}

impl RateLimitConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_secs.max(0.0))
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_secs_f64(self.min_interval_secs.unwrap_or(self.interval_secs).max(0.0))
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_secs_f64(self.max_interval_secs.max(self.interval_secs).max(0.0))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs.max(0.0))
    }
}

/// Geocoding service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    /// Service root; `/search` is appended
    pub base_url: String,

    /// API key, never recorded in provenance
    pub api_key: Option<String>,

    /// Name recorded in provenance nodes
    pub source_name: String,

    /// Version recorded in provenance nodes
    pub source_version: String,

    pub rate_limit: RateLimitConfig,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://geocode.maps.co".to_string(),
            api_key: None,
            source_name: "geocodingAPI".to_string(),
            source_version: "v1".to_string(),
            rate_limit: RateLimitConfig {
                interval_secs: 1.5,
                ..RateLimitConfig::default()
            },
        }
    }
}

/// Lexicon authority configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// API root, e.g. `https://macrostrat.org/api`
    pub base_url: String,

    /// Name recorded in provenance nodes
    pub source_name: String,

    /// Only accept records whose name equals the query
    pub exact_match: bool,

    pub rate_limit: RateLimitConfig,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            base_url: "https://macrostrat.org/api".to_string(),
            source_name: "macrostrat".to_string(),
            exact_match: true,
            rate_limit: RateLimitConfig {
                interval_secs: 0.1,
                max_in_flight: 4,
                ..RateLimitConfig::default()
            },
        }
    }
}

/// Entity alignment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Root holding `<kind>/<model>/` artifact directories
    pub artifact_dir: PathBuf,

    /// Minimum cosine similarity for snapping onto a known name
    pub threshold: f32,

    /// Align object names before hydration
    pub enabled: bool,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("data/alignment"),
            threshold: 0.95,
            enabled: false,
        }
    }
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,

    /// Model name; also recorded in alignment artifacts
    pub model: String,

    pub openai_api_key: Option<String>,

    /// OpenAI-compatible base URL
    pub openai_base_url: String,

    pub ollama_url: String,

    /// Vector width for the hashing provider
    pub dimension: usize,

    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hashing,
            model: "all-MiniLM-L6-v2".to_string(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            dimension: 384,
            timeout_secs: 60,
        }
    }
}

/// Supported embedding providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local character n-gram hashing, no network
    Hashing,
    OpenAI,
    Ollama,
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hashing" | "local" => Ok(Self::Hashing),
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(ConfigError::InvalidValue {
                key: "EMBEDDING_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Ontology serializer configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SerializerConfig {
    /// JSON interval list (`[{"name", "int_type"}]`); built-in table when unset
    pub intervals_file: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
