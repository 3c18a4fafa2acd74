//! Configuration file handling.
//!
//! This module handles loading `.jaltol.toml` files, overlaying environment
//! variables and merging CLI arguments.

use crate::agent::IndicatorSettings;
use crate::analysis::temporal;
use crate::error::JaltolError;
use crate::models::{Indicator, ReducerKind};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".jaltol.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Chat model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Raster archive settings.
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Time and space slicing of the indicator tools.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Place-name lookup settings.
    #[serde(default)]
    pub geocoder: GeocoderConfig,

    /// Session cookie signing.
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Name of the cookie carrying conversation memory.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Cookie lifetime in seconds.
    #[serde(default = "default_cookie_max_age")]
    pub cookie_max_age_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cookie_name: default_cookie_name(),
            cookie_max_age_seconds: default_cookie_max_age(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cookie_name() -> String {
    "jaltol_session".to_string()
}

fn default_cookie_max_age() -> u64 {
    60 * 60 * 24 * 14
}

/// Chat model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name, e.g. `gpt-4o-mini`. Required.
    #[serde(default)]
    pub name: Option<String>,

    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// API key. Usually supplied through `OPENAI_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: u64,

    /// Model calls per user query before the agent gives up.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Verbatim conversation kept before older turns are summarized.
    #[serde(default = "default_memory_token_limit")]
    pub memory_token_limit: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: None,
            api_base: default_api_base(),
            api_key: None,
            temperature: default_temperature(),
            timeout_seconds: default_model_timeout(),
            max_iterations: default_max_iterations(),
            memory_token_limit: default_memory_token_limit(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_temperature() -> f32 {
    0.0
}

fn default_model_timeout() -> u64 {
    60
}

fn default_max_iterations() -> usize {
    3
}

fn default_memory_token_limit() -> usize {
    300
}

/// Earth Engine archive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_archive_url")]
    pub base_url: String,

    /// Cloud project used for compute requests. Required.
    #[serde(default)]
    pub project: Option<String>,

    /// OAuth access token. Required.
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_precipitation_asset")]
    pub precipitation_asset: String,

    #[serde(default = "default_evapotranspiration_asset")]
    pub evapotranspiration_asset: String,

    #[serde(default = "default_archive_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            base_url: default_archive_url(),
            project: None,
            token: None,
            precipitation_asset: default_precipitation_asset(),
            evapotranspiration_asset: default_evapotranspiration_asset(),
            timeout_seconds: default_archive_timeout(),
        }
    }
}

impl ArchiveConfig {
    /// Asset holding the indicator's raster time series.
    pub fn asset_for(&self, indicator: Indicator) -> &str {
        match indicator {
            Indicator::Precipitation => &self.precipitation_asset,
            Indicator::Evapotranspiration => &self.evapotranspiration_asset,
        }
    }
}

fn default_archive_url() -> String {
    "https://earthengine.googleapis.com".to_string()
}

fn default_precipitation_asset() -> String {
    Indicator::Precipitation.default_asset().to_string()
}

fn default_evapotranspiration_asset() -> String {
    Indicator::Evapotranspiration.default_asset().to_string()
}

fn default_archive_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// `hydrological` (June to May) or `calendar`.
    #[serde(default = "default_temporal_span")]
    pub temporal_span: String,

    #[serde(default = "default_temporal_step")]
    pub temporal_step: String,

    /// `mean` or `sum`.
    #[serde(default = "default_spatial_reducer")]
    pub spatial_reducer: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            temporal_span: default_temporal_span(),
            temporal_step: default_temporal_step(),
            spatial_reducer: default_spatial_reducer(),
        }
    }
}

impl AnalysisConfig {
    /// Parse the named span, step and reducer.
    pub fn settings(&self) -> crate::error::Result<IndicatorSettings> {
        let (span, step) = temporal::parse_span_step(&self.temporal_span, &self.temporal_step)?;
        let spatial_reducer = self.spatial_reducer.parse::<ReducerKind>()?;
        Ok(IndicatorSettings {
            span,
            step,
            spatial_reducer,
        })
    }
}

fn default_temporal_span() -> String {
    "hydrological".to_string()
}

fn default_temporal_step() -> String {
    "year".to_string()
}

fn default_spatial_reducer() -> String {
    "mean".to_string()
}

/// Nominatim geocoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderConfig {
    #[serde(default = "default_geocoder_url")]
    pub base_url: String,

    /// Nominatim's usage policy requires an identifying user agent.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_geocoder_timeout")]
    pub timeout_seconds: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: default_geocoder_url(),
            user_agent: default_user_agent(),
            timeout_seconds: default_geocoder_timeout(),
        }
    }
}

fn default_geocoder_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_user_agent() -> String {
    "JaltolAI".to_string()
}

fn default_geocoder_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Key for signing the memory cookie. Required.
    #[serde(default)]
    pub secret: Option<String>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Overlay values from `lookup`. Empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(name) = get("LLM_MODEL") {
            self.model.name = Some(name);
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Some(base) = get("OPENAI_API_BASE") {
            self.model.api_base = base;
        }
        if let Some(project) = get("EARTHENGINE_PROJECT") {
            self.archive.project = Some(project);
        }
        if let Some(token) = get("EARTHENGINE_TOKEN") {
            self.archive.token = Some(token);
        }
        if let Some(secret) = get("JALTOL_SESSION_SECRET") {
            self.session.secret = Some(secret);
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file and environment.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref host) = args.host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(ref model) = args.model {
            self.model.name = Some(model.clone());
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }
    }

    /// Check that every required value is present and well-formed.
    pub fn validate(&self) -> crate::error::Result<()> {
        require("model.name", &self.model.name)?;
        require("model.api_key", &self.model.api_key)?;
        require("archive.project", &self.archive.project)?;
        require("archive.token", &self.archive.token)?;
        require("session.secret", &self.session.secret)?;

        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(invalid("model.temperature", "must be between 0.0 and 2.0"));
        }
        if self.model.max_iterations == 0 {
            return Err(invalid("model.max_iterations", "must be at least 1"));
        }
        if self.model.memory_token_limit == 0 {
            return Err(invalid("model.memory_token_limit", "must be at least 1"));
        }
        if self.server.cookie_name.is_empty()
            || !self
                .server
                .cookie_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(invalid(
                "server.cookie_name",
                "must be non-empty ASCII letters, digits, '_' or '-'",
            ));
        }

        self.analysis.settings()?;
        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

fn require(key: &str, value: &Option<String>) -> crate::error::Result<()> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(JaltolError::ConfigMissing {
            key: key.to_string(),
        }),
    }
}

fn invalid(key: &str, reason: &str) -> JaltolError {
    JaltolError::ConfigInvalid {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TemporalSpan, TemporalStep};
    use std::collections::HashMap;
    use std::io::Write;

    fn complete_config() -> Config {
        let mut config = Config::default();
        config.model.name = Some("gpt-4o-mini".to_string());
        config.model.api_key = Some("sk-test".to_string());
        config.archive.project = Some("jaltol".to_string());
        config.archive.token = Some("ya29.token".to_string());
        config.session.secret = Some("secret".to_string());
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.cookie_name, "jaltol_session");
        assert_eq!(config.model.max_iterations, 3);
        assert_eq!(config.model.memory_token_limit, 300);
        assert_eq!(config.model.temperature, 0.0);
        assert_eq!(config.geocoder.user_agent, "JaltolAI");
        assert_eq!(
            config.archive.asset_for(Indicator::Precipitation),
            "users/jaltolwelllabs/IMD/rain"
        );
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[server]
port = 9000

[model]
name = "gpt-4o"
temperature = 0.2

[archive]
project = "my-project"
evapotranspiration_asset = "users/me/et"

[analysis]
temporal_span = "calendar"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.model.name.as_deref(), Some("gpt-4o"));
        assert_eq!(config.model.temperature, 0.2);
        assert_eq!(config.archive.project.as_deref(), Some("my-project"));
        assert_eq!(
            config.archive.asset_for(Indicator::Evapotranspiration),
            "users/me/et"
        );

        let settings = config.analysis.settings().unwrap();
        assert_eq!(settings.span, TemporalSpan::Calendar);
        assert_eq!(settings.step, TemporalStep::Year);
        assert_eq!(settings.spatial_reducer, ReducerKind::Mean);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[geocoder]\nbase_url = \"http://localhost:8080\"").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.geocoder.base_url, "http://localhost:8080");
        assert_eq!(config.geocoder.timeout_seconds, 10);
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nport = ").unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("LLM_MODEL", "gpt-4o-mini"),
            ("OPENAI_API_KEY", "sk-env"),
            ("EARTHENGINE_TOKEN", "ya29.env"),
            ("EARTHENGINE_PROJECT", ""),
            ("JALTOL_SESSION_SECRET", "s3cret"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.archive.project = Some("from-file".to_string());
        config.apply_env_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.model.name.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(config.model.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.archive.token.as_deref(), Some("ya29.env"));
        assert_eq!(config.archive.project.as_deref(), Some("from-file"));
        assert_eq!(config.session.secret.as_deref(), Some("s3cret"));
        assert_eq!(config.model.api_base, "https://api.openai.com/v1");
    }

    #[test]
    fn test_validate_reports_missing_keys() {
        assert!(complete_config().validate().is_ok());

        let mut config = complete_config();
        config.model.api_key = None;
        assert!(matches!(
            config.validate(),
            Err(JaltolError::ConfigMissing { ref key }) if key == "model.api_key"
        ));

        let mut config = complete_config();
        config.session.secret = Some("  ".to_string());
        assert!(matches!(
            config.validate(),
            Err(JaltolError::ConfigMissing { ref key }) if key == "session.secret"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = complete_config();
        config.analysis.temporal_span = "fiscal".to_string();
        assert!(matches!(
            config.validate(),
            Err(JaltolError::UnsupportedTemporalSpan { .. })
        ));

        let mut config = complete_config();
        config.analysis.spatial_reducer = "median".to_string();
        assert!(matches!(
            config.validate(),
            Err(JaltolError::UnknownReducerKind { .. })
        ));

        let mut config = complete_config();
        config.model.max_iterations = 0;
        assert!(matches!(
            config.validate(),
            Err(JaltolError::ConfigInvalid { .. })
        ));

        let mut config = complete_config();
        config.server.cookie_name = "bad name;".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[server]"));
        assert!(toml_str.contains("[model]"));
        assert!(toml_str.contains("[archive]"));
        assert!(toml_str.contains("[analysis]"));
        assert!(toml_str.contains("[geocoder]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.server.port, 8000);
        assert!(parsed.model.api_key.is_none());
    }
}
