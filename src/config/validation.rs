use std::collections::HashSet;

use super::AuthApiSecret;
use crate::core::endpoint::decode_signing_key;

/// Validate API secret entries
///
/// Ids and secrets must be non-empty and ids unique.
pub fn validate_auth_api_secrets(
    secrets: &[AuthApiSecret],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut seen = HashSet::new();
    for entry in secrets {
        if entry.id.trim().is_empty() {
            return Err("API secret id cannot be empty".into());
        }
        if entry.secret.is_empty() {
            return Err(format!("API secret for '{}' cannot be empty", entry.id).into());
        }
        if !seen.insert(entry.id.as_str()) {
            return Err(format!("Duplicate API secret id: {}", entry.id).into());
        }
    }
    Ok(())
}

/// Validate that when auth is required, at least one API secret is configured
pub fn validate_auth_required(
    auth_required: bool,
    secrets: &[AuthApiSecret],
) -> Result<(), Box<dyn std::error::Error>> {
    if auth_required && secrets.is_empty() {
        return Err(
            "When AUTH_REQUIRED=true, AUTH_API_SECRETS_JSON or AUTH_API_SECRET must be configured"
                .into(),
        );
    }
    Ok(())
}

pub fn validate_synthesis_limits(
    chunk_size: usize,
    concurrency: usize,
    max_concurrency: usize,
    max_input_chars: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    if chunk_size == 0 {
        return Err("chunk_size must be positive".into());
    }
    if max_concurrency == 0 {
        return Err("max_concurrency must be positive".into());
    }
    if concurrency == 0 || concurrency > max_concurrency {
        return Err(format!(
            "concurrency must be between 1 and max_concurrency ({max_concurrency}), got {concurrency}"
        )
        .into());
    }
    if max_input_chars == 0 {
        return Err("max_input_chars must be positive".into());
    }
    Ok(())
}

/// Validate the signing key and upstream URLs
pub fn validate_upstream(
    signing_key: &str,
    credential_endpoint_url: &str,
    synthesis_url_template: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    decode_signing_key(signing_key).map_err(|e| e.to_string())?;

    url::Url::parse(credential_endpoint_url)
        .map_err(|e| format!("Invalid credential endpoint URL: {e}"))?;

    if !synthesis_url_template.contains("{region}") {
        return Err("Synthesis URL template must contain a {region} placeholder".into());
    }
    url::Url::parse(&synthesis_url_template.replace("{region}", "region"))
        .map_err(|e| format!("Invalid synthesis URL template: {e}"))?;

    Ok(())
}
