//! Request signing for the credential endpoint.

use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use time::OffsetDateTime;
use time::macros::format_description;

use crate::core::error::{SynthesisError, SynthesisResult};

type HmacSha256 = Hmac<Sha256>;

/// Application identifier that prefixes both the signed message and the header.
pub const APP_ID: &str = "MSTranslatorAndroidApp";

/// Lowercase HTTP-date without the space before `GMT`, e.g. `fri, 16 oct 2026 08:30:05gmt`.
pub fn signature_date(now: OffsetDateTime) -> SynthesisResult<String> {
    let format = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second]GMT"
    );
    now.to_offset(time::UtcOffset::UTC)
        .format(&format)
        .map(|s| s.to_lowercase())
        .map_err(|e| SynthesisError::CredentialUnavailable(format!("Failed to format date: {e}")))
}

fn url_without_scheme(url: &str) -> &str {
    url.split_once("://").map(|(_, rest)| rest).unwrap_or(url)
}

/// Produce the `X-MT-Signature` header value for `url`.
///
/// The signed message is `APP_ID + urlencode(url without scheme) + date + nonce`,
/// lowercased, authenticated with HMAC-SHA256 under `key`.
pub fn sign_request(
    url: &str,
    key: &[u8],
    now: OffsetDateTime,
    nonce: &str,
) -> SynthesisResult<String> {
    let date = signature_date(now)?;
    let encoded_url: String =
        url::form_urlencoded::byte_serialize(url_without_scheme(url).as_bytes()).collect();
    let message = format!("{APP_ID}{encoded_url}{date}{nonce}").to_lowercase();

    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| SynthesisError::CredentialUnavailable(format!("Invalid signing key: {e}")))?;
    mac.update(message.as_bytes());
    let digest = STANDARD.encode(mac.finalize().into_bytes());

    Ok(format!("{APP_ID}::{digest}::{date}::{nonce}"))
}

/// Decode the base64 pre-shared signing key from configuration.
pub fn decode_signing_key(encoded: &str) -> SynthesisResult<Vec<u8>> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| SynthesisError::CredentialUnavailable(format!("Invalid signing key: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const KEY: &str = "oik6PdDdMnOXemTbwvMn9de/h9lFnfBaCWbGMMZqqoSaQaqUOqjVGm5NqsmjcBI1x+sS9ugjB55HEJWRiFXYFw==";

    #[test]
    fn test_date_format() {
        let date = signature_date(datetime!(2026-10-16 08:30:05 UTC)).unwrap();
        assert_eq!(date, "fri, 16 oct 2026 08:30:05gmt");

        let date = signature_date(datetime!(2026-03-02 23:04:09 UTC)).unwrap();
        assert_eq!(date, "mon, 02 mar 2026 23:04:09gmt");
    }

    #[test]
    fn test_date_converted_to_utc() {
        let date = signature_date(datetime!(2026-10-16 10:30:05 +2)).unwrap();
        assert_eq!(date, "fri, 16 oct 2026 08:30:05gmt");
    }

    #[test]
    fn test_known_signature() {
        let key = decode_signing_key(KEY).unwrap();
        let header = sign_request(
            "https://dev.microsofttranslator.com/apps/endpoint?api-version=1.0",
            &key,
            datetime!(2026-10-16 08:30:05 UTC),
            "0123456789abcdef0123456789abcdef",
        )
        .unwrap();
        assert_eq!(
            header,
            "MSTranslatorAndroidApp::Yym+YgJbHEfDf4bcuv49k4LqECppVERFJMBe2IWfuPM=::\
             fri, 16 oct 2026 08:30:05gmt::0123456789abcdef0123456789abcdef"
        );
    }

    #[test]
    fn test_scheme_does_not_affect_signature() {
        let key = decode_signing_key(KEY).unwrap();
        let now = datetime!(2026-10-16 08:30:05 UTC);
        let a = sign_request("https://example.com/a?b=c", &key, now, "n").unwrap();
        let b = sign_request("http://example.com/a?b=c", &key, now, "n").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_key_rejected() {
        assert!(matches!(
            decode_signing_key("not base64!"),
            Err(SynthesisError::CredentialUnavailable(_))
        ));
    }
}
