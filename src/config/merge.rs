use std::env;
use std::path::PathBuf;

use super::utils::{parse_bool, parse_number};
use super::yaml::YamlConfig;
use super::{
    AuthApiSecret, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_REFRESH_MARGIN_SECONDS,
    DEFAULT_REQUEST_TIMEOUT_SECONDS, DEFAULT_VOICE, ServerConfig, TlsConfig,
    parse_auth_api_secrets_json, parse_voice_aliases_json,
};
use crate::core::endpoint::{DEFAULT_ENDPOINT_URL, DEFAULT_SIGNING_KEY, DEFAULT_USER_AGENT};
use crate::core::synthesis::{
    DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY, DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_INPUT_CHARS,
};
use crate::core::tts::voices::builtin_aliases;
use crate::core::tts::{DEFAULT_OUTPUT_FORMAT, DEFAULT_STYLE, DEFAULT_SYNTHESIS_URL_TEMPLATE};

/// Merge YAML configuration with environment variables
///
/// Priority order (highest to lowest):
/// 1. YAML configuration values
/// 2. Environment variables
/// 3. Default values
pub fn merge_config(
    yaml_config: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let yaml = yaml_config.unwrap_or_default();

    // Helper macro to get value with priority: YAML > ENV > Default
    macro_rules! get_value {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            $yaml_value
                .or_else(|| env::var($env_var).ok())
                .unwrap_or_else(|| $default.to_string())
        };
    }

    // Helper macro for optional values: YAML > ENV
    macro_rules! get_optional {
        ($env_var:expr, $yaml_value:expr) => {
            $yaml_value.or_else(|| env::var($env_var).ok())
        };
    }

    // Helper macro for numeric values: YAML > ENV (parsed, errors surface) > Default
    macro_rules! get_number {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            match $yaml_value {
                Some(value) => value,
                None => match env::var($env_var) {
                    Ok(raw) => parse_number($env_var, &raw)?,
                    Err(_) => $default,
                },
            }
        };
    }

    let server = yaml.server.as_ref();
    let auth = yaml.auth.as_ref();
    let security = yaml.security.as_ref();
    let synthesis = yaml.synthesis.as_ref();
    let upstream = yaml.upstream.as_ref();

    // Server configuration
    let host = get_value!("HOST", server.and_then(|s| s.host.clone()), DEFAULT_HOST);
    let port: u16 = get_number!("PORT", server.and_then(|s| s.port), DEFAULT_PORT);

    // TLS configuration
    let tls_yaml = server.and_then(|s| s.tls.as_ref());
    let tls_enabled = tls_yaml
        .and_then(|t| t.enabled)
        .or_else(|| env::var("TLS_ENABLED").ok().and_then(|v| parse_bool(&v)))
        .unwrap_or(false);
    let tls = if tls_enabled {
        let cert_path = get_optional!("TLS_CERT_PATH", tls_yaml.and_then(|t| t.cert_path.clone()))
            .ok_or("TLS_CERT_PATH is required when TLS is enabled")?;
        let key_path = get_optional!("TLS_KEY_PATH", tls_yaml.and_then(|t| t.key_path.clone()))
            .ok_or("TLS_KEY_PATH is required when TLS is enabled")?;
        Some(TlsConfig {
            cert_path: PathBuf::from(cert_path),
            key_path: PathBuf::from(key_path),
        })
    } else {
        None
    };

    // Authentication: YAML api_secrets > YAML api_secret > ENV JSON > ENV single secret
    let auth_api_secrets = if let Some(entries) = auth.map(|a| &a.api_secrets).filter(|s| !s.is_empty())
    {
        entries
            .iter()
            .map(|entry| AuthApiSecret {
                id: entry.id.clone(),
                secret: entry.secret.clone(),
            })
            .collect()
    } else if let Some(secret) = auth.and_then(|a| a.api_secret.clone()) {
        vec![AuthApiSecret {
            id: "default".to_string(),
            secret,
        }]
    } else if let Ok(json) = env::var("AUTH_API_SECRETS_JSON") {
        parse_auth_api_secrets_json(&json)?
    } else if let Ok(secret) = env::var("AUTH_API_SECRET") {
        vec![AuthApiSecret {
            id: "default".to_string(),
            secret,
        }]
    } else {
        Vec::new()
    };

    let auth_required = auth
        .and_then(|a| a.required)
        .or_else(|| env::var("AUTH_REQUIRED").ok().and_then(|v| parse_bool(&v)))
        .unwrap_or(false);

    // Security configuration
    let cors_allowed_origins = get_optional!(
        "CORS_ALLOWED_ORIGINS",
        security.and_then(|s| s.cors_allowed_origins.clone())
    )
    .or_else(|| Some("*".to_string()));
    let rate_limit_requests_per_second: u32 = get_number!(
        "RATE_LIMIT_REQUESTS_PER_SECOND",
        security.and_then(|s| s.rate_limit_requests_per_second),
        60
    );
    let rate_limit_burst_size: u32 = get_number!(
        "RATE_LIMIT_BURST_SIZE",
        security.and_then(|s| s.rate_limit_burst_size),
        10
    );

    // Synthesis defaults
    let default_voice = get_value!(
        "DEFAULT_VOICE",
        synthesis.and_then(|s| s.default_voice.clone()),
        DEFAULT_VOICE
    );
    let default_style = get_value!(
        "DEFAULT_STYLE",
        synthesis.and_then(|s| s.default_style.clone()),
        DEFAULT_STYLE
    );
    let output_format = get_value!(
        "OUTPUT_FORMAT",
        synthesis.and_then(|s| s.output_format.clone()),
        DEFAULT_OUTPUT_FORMAT
    );
    let chunk_size: usize = get_number!(
        "CHUNK_SIZE",
        synthesis.and_then(|s| s.chunk_size),
        DEFAULT_CHUNK_SIZE
    );
    let concurrency: usize = get_number!(
        "CONCURRENCY",
        synthesis.and_then(|s| s.concurrency),
        DEFAULT_CONCURRENCY
    );
    let max_concurrency: usize = get_number!(
        "MAX_CONCURRENCY",
        synthesis.and_then(|s| s.max_concurrency),
        DEFAULT_MAX_CONCURRENCY
    );
    let max_input_chars: usize = get_number!(
        "MAX_INPUT_CHARS",
        synthesis.and_then(|s| s.max_input_chars),
        DEFAULT_MAX_INPUT_CHARS
    );
    let request_timeout_seconds: u64 = get_number!(
        "REQUEST_TIMEOUT_SECONDS",
        synthesis.and_then(|s| s.request_timeout_seconds),
        DEFAULT_REQUEST_TIMEOUT_SECONDS
    );

    // Voice aliases: built-in, then ENV JSON, then YAML
    let mut voice_aliases = builtin_aliases();
    if let Ok(json) = env::var("VOICE_ALIASES_JSON") {
        voice_aliases.extend(parse_voice_aliases_json(&json)?);
    }
    if let Some(s) = synthesis {
        voice_aliases.extend(
            s.voices
                .iter()
                .map(|(alias, voice)| (alias.to_lowercase(), voice.clone())),
        );
    }

    // Upstream endpoints
    let credential_endpoint_url = get_value!(
        "CREDENTIAL_ENDPOINT_URL",
        upstream.and_then(|u| u.credential_endpoint_url.clone()),
        DEFAULT_ENDPOINT_URL
    );
    let credential_refresh_margin_seconds: u64 = get_number!(
        "CREDENTIAL_REFRESH_MARGIN_SECONDS",
        upstream.and_then(|u| u.refresh_margin_seconds),
        DEFAULT_REFRESH_MARGIN_SECONDS
    );
    let signing_key = get_value!(
        "SIGNING_KEY",
        upstream.and_then(|u| u.signing_key.clone()),
        DEFAULT_SIGNING_KEY
    );
    let synthesis_url_template = get_value!(
        "SYNTHESIS_URL_TEMPLATE",
        upstream.and_then(|u| u.synthesis_url_template.clone()),
        DEFAULT_SYNTHESIS_URL_TEMPLATE
    );
    let upstream_user_agent = get_value!(
        "UPSTREAM_USER_AGENT",
        upstream.and_then(|u| u.user_agent.clone()),
        DEFAULT_USER_AGENT
    );

    Ok(ServerConfig {
        host,
        port,
        tls,
        auth_api_secrets,
        auth_required,
        cors_allowed_origins,
        rate_limit_requests_per_second,
        rate_limit_burst_size,
        default_voice,
        default_style,
        output_format,
        chunk_size,
        concurrency,
        max_concurrency,
        max_input_chars,
        request_timeout_seconds,
        voice_aliases,
        credential_endpoint_url,
        credential_refresh_margin_seconds,
        signing_key,
        synthesis_url_template,
        upstream_user_agent,
    })
}
