use base64::{
    Engine,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use serde::Deserialize;

use crate::core::error::{SynthesisError, SynthesisResult};

// Accepts both padded and unpadded segments
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &base64::alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Deserialize)]
struct Claims {
    exp: i64,
}

/// Read the `exp` claim (epoch seconds) from a JWT-shaped access token.
///
/// The token is otherwise opaque: no signature check, no other claims.
pub fn parse_token_expiry(token: &str) -> SynthesisResult<i64> {
    let payload = token.split('.').nth(1).ok_or_else(|| {
        SynthesisError::CredentialUnavailable("Access token has no claims segment".to_string())
    })?;

    let decoded = URL_SAFE_LENIENT
        .decode(payload.trim())
        .map_err(|e| {
            SynthesisError::CredentialUnavailable(format!("Undecodable token claims: {e}"))
        })?;

    let claims: Claims = serde_json::from_slice(&decoded)
        .map_err(|e| SynthesisError::CredentialUnavailable(format!("Invalid token claims: {e}")))?;

    Ok(claims.exp)
}
