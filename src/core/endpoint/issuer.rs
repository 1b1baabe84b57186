use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::broker::EndpointCredential;
use super::signature::sign_request;
use super::token::parse_token_expiry;
use crate::core::error::{SynthesisError, SynthesisResult};

/// Default credential endpoint.
pub const DEFAULT_ENDPOINT_URL: &str =
    "https://dev.microsofttranslator.com/apps/endpoint?api-version=1.0";

/// Default pre-shared signing key, base64.
pub const DEFAULT_SIGNING_KEY: &str =
    "oik6PdDdMnOXemTbwvMn9de/h9lFnfBaCWbGMMZqqoSaQaqUOqjVGm5NqsmjcBI1x+sS9ugjB55HEJWRiFXYFw==";

pub const DEFAULT_USER_AGENT: &str = "okhttp/4.5.0";

const CLIENT_VERSION: &str = "4.0.530a 5fe1dc6c";
const USER_ID: &str = "0f04d16a175c411e";
const HOME_REGION: &str = "zh-Hans-CN";
const ACCEPT_LANGUAGE: &str = "zh-Hans";

/// Obtains a fresh endpoint credential. One call is one refresh attempt.
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn issue(&self) -> SynthesisResult<EndpointCredential>;
}

#[derive(Debug, Deserialize)]
struct EndpointResponse {
    #[serde(rename = "r")]
    region: String,
    #[serde(rename = "t")]
    token: String,
}

/// Issues credentials from the translator app endpoint with a signed POST.
pub struct TranslatorCredentialIssuer {
    client: Client,
    endpoint_url: String,
    signing_key: Vec<u8>,
    user_agent: String,
}

impl TranslatorCredentialIssuer {
    pub fn new(
        client: Client,
        endpoint_url: impl Into<String>,
        signing_key: Vec<u8>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint_url: endpoint_url.into(),
            signing_key,
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl CredentialIssuer for TranslatorCredentialIssuer {
    async fn issue(&self) -> SynthesisResult<EndpointCredential> {
        let trace_id = Uuid::new_v4().to_string();
        let nonce = Uuid::new_v4().simple().to_string();
        let signature = sign_request(
            &self.endpoint_url,
            &self.signing_key,
            OffsetDateTime::now_utc(),
            &nonce,
        )?;

        let response = self
            .client
            .post(&self.endpoint_url)
            .header("Accept-Language", ACCEPT_LANGUAGE)
            .header("X-ClientVersion", CLIENT_VERSION)
            .header("X-UserId", USER_ID)
            .header("X-HomeGeographicRegion", HOME_REGION)
            .header("X-ClientTraceId", &trace_id)
            .header("X-MT-Signature", signature)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| {
                SynthesisError::CredentialUnavailable(format!(
                    "Failed to reach credential endpoint: {e}"
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::CredentialUnavailable(format!(
                "Credential endpoint returned {status}: {body}"
            )));
        }

        let parsed: EndpointResponse = response.json().await.map_err(|e| {
            SynthesisError::CredentialUnavailable(format!("Failed to parse credential: {e}"))
        })?;

        let expires_at = parse_token_expiry(&parsed.token)?;

        debug!(
            region = %parsed.region,
            expires_at,
            trace_id = %trace_id,
            "Issued endpoint credential"
        );

        Ok(EndpointCredential {
            region: parsed.region,
            token: parsed.token,
            expires_at,
        })
    }
}
