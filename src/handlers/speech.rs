//! OpenAI-compatible speech endpoint plus the legacy `/generate` form endpoint.

use std::sync::Arc;

use axum::{
    body::Body,
    Extension,
    extract::{State, rejection::JsonRejection},
    http::header,
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;
use futures::{StreamExt, stream};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::ServerConfig;
use crate::core::error::{SynthesisError, SynthesisResult};
use crate::core::synthesis::{SynthesisRequest, SynthesisService};
use crate::core::text::CleaningOptionsPatch;
use crate::core::tts::{VoiceParams, resolve_voice};
use crate::errors::app_error::{AppError, AppResult};
use crate::middleware::AuthContext;
use crate::state::AppState;

const SPEED_RANGE: (f32, f32) = (0.25, 2.0);
const PITCH_RANGE: (f32, f32) = (0.5, 1.5);
const LEGACY_DEFAULT_VOICE: &str = "shimmer";

fn neutral() -> f32 {
    1.0
}

/// Request body for `POST /v1/audio/speech`
#[derive(Debug, Deserialize)]
pub struct SpeechRequest {
    /// `tts-1`, `tts-1-hd` or `tts-1-{alias}`
    pub model: Option<String>,
    pub input: Option<String>,
    pub voice: Option<String>,
    #[serde(default = "neutral")]
    pub speed: f32,
    #[serde(default = "neutral")]
    pub pitch: f32,
    pub style: Option<String>,
    #[serde(default)]
    pub stream: bool,
    pub concurrency: Option<usize>,
    pub chunk_size: Option<usize>,
    #[serde(default, alias = "cleaningOptions")]
    pub cleaning_options: CleaningOptionsPatch,
}

fn check_range(name: &str, value: f32, (min, max): (f32, f32)) -> SynthesisResult<()> {
    if !value.is_finite() || value < min || value > max {
        return Err(SynthesisError::InvalidRequest(format!(
            "'{name}' must be between {min} and {max}, got {value}"
        )));
    }
    Ok(())
}

impl SpeechRequest {
    /// Validate the body and resolve voice and defaults against `config`.
    pub fn into_synthesis_request(self, config: &ServerConfig) -> SynthesisResult<SynthesisRequest> {
        let input = self
            .input
            .ok_or_else(|| SynthesisError::InvalidRequest("'input' is required".to_string()))?;
        check_range("speed", self.speed, SPEED_RANGE)?;
        check_range("pitch", self.pitch, PITCH_RANGE)?;

        let voice_name = resolve_voice(
            self.voice.as_deref(),
            self.model.as_deref(),
            &config.voice_aliases,
            &config.default_voice,
        );
        let style = self
            .style
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| config.default_style.clone());

        let voice = VoiceParams::from_speed_pitch(
            voice_name,
            self.speed,
            self.pitch,
            style,
            config.output_format.clone(),
        );

        Ok(SynthesisRequest {
            input,
            voice,
            concurrency: self.concurrency,
            chunk_size: self.chunk_size,
            cleaning: self.cleaning_options,
        })
    }
}

/// MIME type for a backend output format name.
pub fn content_type_for(output_format: &str) -> &'static str {
    let format = output_format.to_ascii_lowercase();
    if format.contains("mp3") {
        "audio/mpeg"
    } else if format.starts_with("riff") || format.contains("wav") {
        "audio/wav"
    } else if format.contains("opus") && format.starts_with("webm") {
        "audio/webm"
    } else if format.contains("ogg") || format.contains("opus") {
        "audio/ogg"
    } else if format.starts_with("raw") {
        "audio/pcm"
    } else {
        "application/octet-stream"
    }
}

/// Turn the synthesis channel into a chunked response.
///
/// The first item is awaited before any header is sent so that a failure on
/// the first utterance still produces a structured error response. Later
/// failures end the body with an error, which tears the connection down.
async fn stream_response(
    mut rx: mpsc::Receiver<SynthesisResult<Bytes>>,
    content_type: &'static str,
) -> AppResult<Response> {
    let first = match rx.recv().await {
        Some(Ok(chunk)) => chunk,
        Some(Err(e)) => return Err(AppError::Synthesis(e)),
        None => Bytes::new(),
    };

    let rest = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });
    let body = stream::once(async move { Ok::<_, SynthesisError>(first) }).chain(rest);

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response())
}

async fn respond(
    synthesis: Arc<SynthesisService>,
    request: SynthesisRequest,
    streaming: bool,
) -> AppResult<Response> {
    let content_type = content_type_for(&request.voice.output_format);

    if streaming {
        let rx = synthesis.synthesize_streaming(request)?;
        return stream_response(rx, content_type).await;
    }

    let audio = synthesis.synthesize_buffered(request).await?;
    Ok(([(header::CONTENT_TYPE, content_type)], audio).into_response())
}

/// Handler for `POST /v1/audio/speech`
pub async fn speech_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    payload: Result<Json<SpeechRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = payload?;
    let streaming = body.stream;

    info!(
        auth_id = auth.id.as_deref().unwrap_or("anonymous"),
        model = body.model.as_deref().unwrap_or_default(),
        voice = body.voice.as_deref().unwrap_or_default(),
        input_len = body.input.as_ref().map(|s| s.len()).unwrap_or_default(),
        stream = streaming,
        "Speech request received"
    );

    let request = body.into_synthesis_request(&state.config)?;
    respond(state.synthesis.clone(), request, streaming).await
}

/// Request body for the legacy `POST /generate` endpoint used by form clients
///
/// Cleaning is opt-in here: options the client does not send are off.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub input: String,
    pub voice: Option<String>,
    #[serde(default = "neutral")]
    pub speed: f32,
    #[serde(default = "neutral")]
    pub pitch: f32,
    #[serde(default)]
    pub cleaning_options: CleaningOptionsPatch,
}

impl GenerateRequest {
    fn into_speech_request(self) -> SpeechRequest {
        let patch = self.cleaning_options;
        let cleaning_options = CleaningOptionsPatch {
            remove_markdown: Some(patch.remove_markdown.unwrap_or(false)),
            remove_emoji: Some(patch.remove_emoji.unwrap_or(false)),
            remove_urls: Some(patch.remove_urls.unwrap_or(false)),
            remove_line_breaks: Some(patch.remove_line_breaks.unwrap_or(false)),
            remove_citation_numbers: Some(patch.remove_citation_numbers.unwrap_or(false)),
            custom_keywords: patch.custom_keywords,
        };

        SpeechRequest {
            model: None,
            input: Some(self.input),
            voice: Some(self.voice.unwrap_or_else(|| LEGACY_DEFAULT_VOICE.to_string())),
            speed: self.speed,
            pitch: self.pitch,
            style: None,
            stream: true,
            concurrency: None,
            chunk_size: None,
            cleaning_options,
        }
    }
}

/// Handler for `POST /generate`, always streamed
pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = payload?;
    info!(
        auth_id = auth.id.as_deref().unwrap_or("anonymous"),
        voice = body.voice.as_deref().unwrap_or(LEGACY_DEFAULT_VOICE),
        input_len = body.input.len(),
        "Generate request received"
    );

    let request = body.into_speech_request().into_synthesis_request(&state.config)?;
    respond(state.synthesis.clone(), request, true).await
}
