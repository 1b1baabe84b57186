use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// YAML configuration file structure
///
/// Every section and field is optional; missing values fall back to
/// environment variables and then to defaults.
///
/// # Example
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 5000
///   tls:
///     enabled: true
///     cert_path: "/etc/relay/cert.pem"
///     key_path: "/etc/relay/key.pem"
///
/// auth:
///   required: true
///   api_secrets:
///     - id: "web"
///       secret: "sk-relay-1"
///
/// security:
///   cors_allowed_origins: "*"
///   rate_limit_requests_per_second: 60
///   rate_limit_burst_size: 10
///
/// synthesis:
///   default_voice: "zh-CN-XiaoxiaoNeural"
///   chunk_size: 300
///   concurrency: 10
///   max_concurrency: 20
///   voices:
///     narrator: "en-US-GuyNeural"
///
/// upstream:
///   credential_endpoint_url: "https://dev.microsofttranslator.com/apps/endpoint?api-version=1.0"
///   refresh_margin_seconds: 300
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub auth: Option<AuthYaml>,
    pub security: Option<SecurityYaml>,
    pub synthesis: Option<SynthesisYaml>,
    pub upstream: Option<UpstreamYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Authentication configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuthYaml {
    pub required: Option<bool>,
    /// Preferred multi-secret form. If non-empty, it takes precedence over api_secret.
    #[serde(default)]
    pub api_secrets: Vec<AuthApiSecretYaml>,
    /// Legacy single-secret alias. Ignored when api_secrets is non-empty.
    pub api_secret: Option<String>,
}

/// API secret authentication entry in YAML
#[derive(Debug, Clone, Deserialize)]
pub struct AuthApiSecretYaml {
    pub id: String,
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// CORS allowed origins (comma-separated list or "*" for all)
    pub cors_allowed_origins: Option<String>,
    /// Maximum requests per second per IP address
    pub rate_limit_requests_per_second: Option<u32>,
    /// Maximum burst size for rate limiting
    pub rate_limit_burst_size: Option<u32>,
}

/// Synthesis defaults and limits from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SynthesisYaml {
    pub default_voice: Option<String>,
    pub default_style: Option<String>,
    pub output_format: Option<String>,
    pub chunk_size: Option<usize>,
    pub concurrency: Option<usize>,
    pub max_concurrency: Option<usize>,
    pub max_input_chars: Option<usize>,
    pub request_timeout_seconds: Option<u64>,
    /// Extra or overriding voice aliases
    pub voices: HashMap<String, String>,
}

/// Credential and synthesis endpoint settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct UpstreamYaml {
    pub credential_endpoint_url: Option<String>,
    pub refresh_margin_seconds: Option<u64>,
    pub signing_key: Option<String>,
    pub synthesis_url_template: Option<String>,
    pub user_agent: Option<String>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
