use std::sync::Arc;

use reqwest::Client;

use crate::config::ServerConfig;
use crate::core::endpoint::{
    CredentialBroker, CredentialIssuer, EndpointProvider, TranslatorCredentialIssuer,
    decode_signing_key,
};
use crate::core::synthesis::SynthesisService;
use crate::core::tts::{EdgeSpeechClient, SpeechBackend};

/// Application state that can be shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    /// Credential cache shared by every synthesis call
    pub broker: Arc<CredentialBroker>,
    pub synthesis: Arc<SynthesisService>,
}

impl AppState {
    /// Wire the HTTP client, credential broker and synthesis service from `config`.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, Box<dyn std::error::Error>> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(config.max_concurrency)
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {e}"))?;

        let signing_key = decode_signing_key(&config.signing_key)?;
        let issuer: Arc<dyn CredentialIssuer> = Arc::new(TranslatorCredentialIssuer::new(
            client.clone(),
            config.credential_endpoint_url.clone(),
            signing_key,
            config.upstream_user_agent.clone(),
        ));
        let broker = Arc::new(CredentialBroker::new(
            issuer,
            config.credential_refresh_margin(),
        ));

        let endpoints: Arc<dyn EndpointProvider> = broker.clone();
        let backend: Arc<dyn SpeechBackend> = Arc::new(EdgeSpeechClient::new(
            client,
            endpoints,
            config.synthesis_url_template.clone(),
            config.upstream_user_agent.clone(),
        ));
        let synthesis = Arc::new(SynthesisService::new(
            backend,
            config.synthesis_defaults(),
        ));

        tracing::debug!(
            credential_endpoint = %config.credential_endpoint_url,
            max_concurrency = config.max_concurrency,
            "Application state initialized"
        );

        Ok(Arc::new(Self {
            config,
            broker,
            synthesis,
        }))
    }
}
