use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::debug;

use crate::core::endpoint::EndpointProvider;
use crate::core::error::{SynthesisError, SynthesisResult};

/// Default synthesis URL; `{region}` is replaced with the credential's region.
pub const DEFAULT_SYNTHESIS_URL_TEMPLATE: &str =
    "https://{region}.tts.speech.microsoft.com/cognitiveservices/v1";

/// Turns one SSML document into encoded audio.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn synthesize(&self, ssml: &str, output_format: &str) -> SynthesisResult<Bytes>;
}

/// HTTP client for the regional synthesis endpoint.
pub struct EdgeSpeechClient {
    client: Client,
    endpoints: Arc<dyn EndpointProvider>,
    url_template: String,
    user_agent: String,
}

impl EdgeSpeechClient {
    pub fn new(
        client: Client,
        endpoints: Arc<dyn EndpointProvider>,
        url_template: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoints,
            url_template: url_template.into(),
            user_agent: user_agent.into(),
        }
    }

    fn synthesis_url(&self, region: &str) -> String {
        self.url_template.replace("{region}", region)
    }
}

#[async_trait]
impl SpeechBackend for EdgeSpeechClient {
    async fn synthesize(&self, ssml: &str, output_format: &str) -> SynthesisResult<Bytes> {
        let credential = self.endpoints.get_endpoint().await?;
        let url = self.synthesis_url(&credential.region);

        debug!(
            region = %credential.region,
            ssml_len = ssml.len(),
            format = output_format,
            "Requesting utterance audio"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&credential.token)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", output_format)
            .header("User-Agent", &self.user_agent)
            .body(ssml.to_owned())
            .send()
            .await
            .map_err(|e| SynthesisError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| SynthesisError::Transport(format!("Failed to read audio: {e}")))
    }
}
