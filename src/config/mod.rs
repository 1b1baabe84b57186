//! Configuration module for the speech relay server
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use speech_relay::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::endpoint::{DEFAULT_ENDPOINT_URL, DEFAULT_SIGNING_KEY, DEFAULT_USER_AGENT};
use crate::core::synthesis::{
    DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY, DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_INPUT_CHARS,
    SynthesisDefaults,
};
use crate::core::text::CleaningOptions;
use crate::core::tts::voices::builtin_aliases;
use crate::core::tts::{DEFAULT_OUTPUT_FORMAT, DEFAULT_STYLE, DEFAULT_SYNTHESIS_URL_TEMPLATE};

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_VOICE: &str = "zh-CN-XiaoxiaoNeural";
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_REFRESH_MARGIN_SECONDS: u64 = 300;

#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// API secret authentication entry with a client identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthApiSecret {
    pub id: String,
    pub secret: String,
}

/// Server configuration
///
/// Contains everything needed to run the relay:
/// - Server settings (host, port, TLS)
/// - Bearer API secrets guarding the `/v1` routes
/// - Security settings (CORS, rate limiting)
/// - Synthesis defaults and limits
/// - Credential endpoint and synthesis endpoint settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    // Authentication
    pub auth_api_secrets: Vec<AuthApiSecret>,
    pub auth_required: bool,

    // Security settings
    /// CORS allowed origins (comma-separated list or "*" for all)
    pub cors_allowed_origins: Option<String>,
    /// Default: 60
    pub rate_limit_requests_per_second: u32,
    /// Default: 10
    pub rate_limit_burst_size: u32,

    // Synthesis defaults
    pub default_voice: String,
    pub default_style: String,
    pub output_format: String,
    /// Maximum characters per utterance. Default: 300
    pub chunk_size: usize,
    /// Utterance fetches in flight per request. Default: 10
    pub concurrency: usize,
    /// Upper bound for a request's `concurrency`. Default: 20
    pub max_concurrency: usize,
    pub max_input_chars: usize,
    /// Timeout applied to every upstream HTTP call. Default: 30
    pub request_timeout_seconds: u64,
    /// OpenAI voice alias -> backend voice. Built-in aliases plus configured ones.
    pub voice_aliases: HashMap<String, String>,

    // Upstream endpoints
    pub credential_endpoint_url: String,
    /// Seconds before expiry at which the credential is refreshed. Default: 300
    pub credential_refresh_margin_seconds: u64,
    /// Base64 pre-shared key used to sign credential requests
    pub signing_key: String,
    /// Synthesis URL containing a `{region}` placeholder
    pub synthesis_url_template: String,
    pub upstream_user_agent: String,
}

/// Implement Drop to zeroize all secret fields when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        for secret in &mut self.auth_api_secrets {
            secret.secret.zeroize();
        }
        self.signing_key.zeroize();
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tls: None,
            auth_api_secrets: Vec::new(),
            auth_required: false,
            cors_allowed_origins: Some("*".to_string()),
            rate_limit_requests_per_second: 60,
            rate_limit_burst_size: 10,
            default_voice: DEFAULT_VOICE.to_string(),
            default_style: DEFAULT_STYLE.to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            voice_aliases: builtin_aliases(),
            credential_endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            credential_refresh_margin_seconds: DEFAULT_REFRESH_MARGIN_SECONDS,
            signing_key: DEFAULT_SIGNING_KEY.to_string(),
            synthesis_url_template: DEFAULT_SYNTHESIS_URL_TEMPLATE.to_string(),
            upstream_user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// After loading and merging, performs validation on the final configuration.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // .env is loaded in main.rs at startup; YAML overrides everything below it
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        validation::validate_auth_api_secrets(&self.auth_api_secrets)?;
        validation::validate_auth_required(self.auth_required, &self.auth_api_secrets)?;
        validation::validate_synthesis_limits(
            self.chunk_size,
            self.concurrency,
            self.max_concurrency,
            self.max_input_chars,
        )?;
        validation::validate_upstream(
            &self.signing_key,
            &self.credential_endpoint_url,
            &self.synthesis_url_template,
        )?;
        Ok(())
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Find the API secret identifier that matches a bearer token
    ///
    /// Comparison is constant-time per entry.
    pub fn find_api_secret_id(&self, token: &str) -> Option<&str> {
        use subtle::ConstantTimeEq;

        self.auth_api_secrets
            .iter()
            .find(|entry| bool::from(entry.secret.as_bytes().ct_eq(token.as_bytes())))
            .map(|entry| entry.id.as_str())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn credential_refresh_margin(&self) -> Duration {
        Duration::from_secs(self.credential_refresh_margin_seconds)
    }

    /// Synthesis defaults derived from this configuration.
    pub fn synthesis_defaults(&self) -> SynthesisDefaults {
        SynthesisDefaults {
            chunk_size: self.chunk_size,
            concurrency: self.concurrency,
            max_concurrency: self.max_concurrency,
            max_input_chars: self.max_input_chars,
            cleaning: CleaningOptions::default(),
        }
    }
}

pub(crate) fn parse_auth_api_secrets_json(
    json_str: &str,
) -> Result<Vec<AuthApiSecret>, Box<dyn std::error::Error>> {
    #[derive(serde::Deserialize)]
    struct AuthApiSecretJson {
        id: String,
        secret: String,
    }

    let secrets: Vec<AuthApiSecretJson> = serde_json::from_str(json_str)
        .map_err(|e| format!("Invalid AUTH_API_SECRETS_JSON format: {e}"))?;

    Ok(secrets
        .into_iter()
        .map(|entry| AuthApiSecret {
            id: entry.id,
            secret: entry.secret,
        })
        .collect())
}

pub(crate) fn parse_voice_aliases_json(
    json_str: &str,
) -> Result<HashMap<String, String>, Box<dyn std::error::Error>> {
    let aliases: HashMap<String, String> = serde_json::from_str(json_str)
        .map_err(|e| format!("Invalid VOICE_ALIASES_JSON format: {e}"))?;
    Ok(aliases
        .into_iter()
        .map(|(alias, voice)| (alias.to_lowercase(), voice))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.address(), "0.0.0.0:5000");
        assert_eq!(config.chunk_size, 300);
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.max_concurrency, 20);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.credential_refresh_margin(), Duration::from_secs(300));
        assert_eq!(config.cors_allowed_origins.as_deref(), Some("*"));
        assert_eq!(
            config.voice_aliases.get("shimmer").map(String::as_str),
            Some("zh-CN-XiaoxiaoNeural")
        );
        assert!(!config.is_tls_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_find_api_secret_id() {
        let mut config = ServerConfig::default();
        config.auth_api_secrets = vec![
            AuthApiSecret {
                id: "client-a".to_string(),
                secret: "secret-a".to_string(),
            },
            AuthApiSecret {
                id: "client-b".to_string(),
                secret: "secret-b".to_string(),
            },
        ];

        assert_eq!(config.find_api_secret_id("secret-b"), Some("client-b"));
        assert_eq!(config.find_api_secret_id("secret"), None);
        assert_eq!(config.find_api_secret_id(""), None);
    }

    #[test]
    fn test_synthesis_defaults_follow_config() {
        let mut config = ServerConfig::default();
        config.chunk_size = 120;
        config.max_concurrency = 4;

        let defaults = config.synthesis_defaults();
        assert_eq!(defaults.chunk_size, 120);
        assert_eq!(defaults.max_concurrency, 4);
        assert_eq!(defaults.cleaning, CleaningOptions::default());
    }

    #[test]
    fn test_parse_auth_api_secrets_json() {
        let secrets =
            parse_auth_api_secrets_json(r#"[{"id":"a","secret":"s1"},{"id":"b","secret":"s2"}]"#)
                .unwrap();
        assert_eq!(secrets.len(), 2);
        assert_eq!(secrets[1].id, "b");

        assert!(parse_auth_api_secrets_json("not json").is_err());
    }

    #[test]
    fn test_parse_voice_aliases_json_lowercases_keys() {
        let aliases = parse_voice_aliases_json(r#"{"Narrator":"en-US-GuyNeural"}"#).unwrap();
        assert_eq!(
            aliases.get("narrator").map(String::as_str),
            Some("en-US-GuyNeural")
        );
    }

    fn cleanup_env_vars() {
        unsafe {
            env::remove_var("HOST");
            env::remove_var("PORT");
            env::remove_var("CHUNK_SIZE");
            env::remove_var("CONCURRENCY");
            env::remove_var("AUTH_REQUIRED");
            env::remove_var("AUTH_API_SECRET");
            env::remove_var("AUTH_API_SECRETS_JSON");
        }
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();
        unsafe {
            env::set_var("PORT", "7000");
            env::set_var("CHUNK_SIZE", "150");
        }

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            r#"
server:
  port: 8080
synthesis:
  concurrency: 4
"#,
        )
        .unwrap();

        let config = ServerConfig::from_file(&config_path).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.chunk_size, 150);
        assert_eq!(config.concurrency, 4);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_with_auth() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            r#"
auth:
  required: true
  api_secrets:
    - id: "web"
      secret: "tok-1"
"#,
        )
        .unwrap();

        let config = ServerConfig::from_file(&config_path).unwrap();
        assert!(config.auth_required);
        assert_eq!(config.find_api_secret_id("tok-1"), Some("web"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_rejects_invalid_limits() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            r#"
synthesis:
  concurrency: 30
  max_concurrency: 5
"#,
        )
        .unwrap();

        let err = ServerConfig::from_file(&config_path).unwrap_err();
        assert!(err.to_string().contains("concurrency"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file() {
        let result = ServerConfig::from_file(&PathBuf::from("/nonexistent/config.yaml"));
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }
}
