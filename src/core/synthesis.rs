//! End-to-end synthesis of one request: clean, segment, fan out, collect.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::core::batch::{BatchExecutor, BufferedSink, StreamingSink};
use crate::core::error::{SynthesisError, SynthesisResult};
use crate::core::text::{CleaningOptions, CleaningOptionsPatch, Utterance, clean, segment};
use crate::core::tts::{SpeechBackend, VoiceParams, build_ssml};

pub const DEFAULT_CHUNK_SIZE: usize = 300;
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_MAX_CONCURRENCY: usize = 20;
pub const DEFAULT_MAX_INPUT_CHARS: usize = 100_000;

/// Server-wide limits and defaults applied to every request.
#[derive(Debug, Clone)]
pub struct SynthesisDefaults {
    pub chunk_size: usize,
    pub concurrency: usize,
    pub max_concurrency: usize,
    pub max_input_chars: usize,
    pub cleaning: CleaningOptions,
}

impl Default for SynthesisDefaults {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            cleaning: CleaningOptions::default(),
        }
    }
}

/// A validated-on-use synthesis request with the voice already resolved.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub input: String,
    pub voice: VoiceParams,
    pub concurrency: Option<usize>,
    pub chunk_size: Option<usize>,
    pub cleaning: CleaningOptionsPatch,
}

impl SynthesisRequest {
    pub fn new(input: impl Into<String>, voice: VoiceParams) -> Self {
        Self {
            input: input.into(),
            voice,
            concurrency: None,
            chunk_size: None,
            cleaning: CleaningOptionsPatch::default(),
        }
    }
}

pub struct SynthesisService {
    backend: Arc<dyn SpeechBackend>,
    defaults: SynthesisDefaults,
}

impl SynthesisService {
    pub fn new(backend: Arc<dyn SpeechBackend>, defaults: SynthesisDefaults) -> Self {
        Self { backend, defaults }
    }

    pub fn defaults(&self) -> &SynthesisDefaults {
        &self.defaults
    }

    /// Effective concurrency: requested or default, capped by the server maximum.
    fn concurrency_for(&self, request: &SynthesisRequest) -> usize {
        request
            .concurrency
            .unwrap_or(self.defaults.concurrency)
            .min(self.defaults.max_concurrency)
            .max(1)
    }

    /// Validate the request and turn its input into utterances.
    pub fn prepare(&self, request: &SynthesisRequest) -> SynthesisResult<Vec<Utterance>> {
        if request.input.trim().is_empty() {
            return Err(SynthesisError::InvalidRequest(
                "'input' must not be empty".to_string(),
            ));
        }

        let input_chars = request.input.chars().count();
        if input_chars > self.defaults.max_input_chars {
            return Err(SynthesisError::InvalidRequest(format!(
                "'input' is {input_chars} characters, the limit is {}",
                self.defaults.max_input_chars
            )));
        }

        let chunk_size = request.chunk_size.unwrap_or(self.defaults.chunk_size);
        if chunk_size == 0 {
            return Err(SynthesisError::InvalidRequest(
                "'chunk_size' must be positive".to_string(),
            ));
        }
        if request.concurrency == Some(0) {
            return Err(SynthesisError::InvalidRequest(
                "'concurrency' must be positive".to_string(),
            ));
        }

        let options = self.defaults.cleaning.merge(&request.cleaning);
        let cleaned = clean(&request.input, &options);
        let utterances = segment(&cleaned, chunk_size);

        if utterances.is_empty() {
            return Err(SynthesisError::InvalidRequest(
                "'input' is empty after cleaning".to_string(),
            ));
        }

        debug!(
            input_chars,
            cleaned_chars = cleaned.chars().count(),
            utterances = utterances.len(),
            chunk_size,
            "Prepared synthesis request"
        );

        Ok(utterances)
    }

    async fn fetch_one(&self, utterance: Utterance, voice: Arc<VoiceParams>) -> SynthesisResult<Bytes> {
        let ssml = build_ssml(&utterance, &voice);
        self.backend.synthesize(&ssml, &voice.output_format).await
    }

    /// Synthesize the whole request and return the concatenated audio.
    pub async fn synthesize_buffered(&self, request: SynthesisRequest) -> SynthesisResult<Bytes> {
        let utterances = self.prepare(&request)?;
        let concurrency = self.concurrency_for(&request);

        info!(
            voice = %request.voice.voice_name,
            utterances = utterances.len(),
            concurrency,
            "Starting buffered synthesis"
        );

        let voice = Arc::new(request.voice);
        let mut sink = BufferedSink::new();
        BatchExecutor::new(concurrency)
            .run(
                utterances,
                |u| self.fetch_one(u, Arc::clone(&voice)),
                &mut sink,
            )
            .await?;

        sink.into_audio().ok_or_else(|| {
            SynthesisError::StreamAborted("synthesis finished without audio".to_string())
        })
    }

    /// Start synthesis in the background and return a channel of audio chunks.
    ///
    /// Validation errors are returned before anything is spawned. Later
    /// failures arrive as a terminal `Err` item on the channel.
    pub fn synthesize_streaming(
        self: Arc<Self>,
        request: SynthesisRequest,
    ) -> SynthesisResult<mpsc::Receiver<SynthesisResult<Bytes>>> {
        let utterances = self.prepare(&request)?;
        let concurrency = self.concurrency_for(&request);
        let (tx, rx) = mpsc::channel(concurrency * 2);

        info!(
            voice = %request.voice.voice_name,
            utterances = utterances.len(),
            concurrency,
            "Starting streaming synthesis"
        );

        tokio::spawn(async move {
            let service: &SynthesisService = &self;
            let voice = Arc::new(request.voice);
            let mut sink = StreamingSink::new(tx);

            let result = BatchExecutor::new(concurrency)
                .run(
                    utterances,
                    |u| service.fetch_one(u, Arc::clone(&voice)),
                    &mut sink,
                )
                .await;

            if let Err(e) = result {
                debug!(error = %e, delivered = sink.started(), "Streaming synthesis ended early");
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tts::{DEFAULT_OUTPUT_FORMAT, DEFAULT_STYLE};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Echoes the prosody body back as audio and records every SSML payload.
    #[derive(Default)]
    struct EchoBackend {
        payloads: Mutex<Vec<String>>,
        fail_containing: Option<&'static str>,
        calls: AtomicUsize,
    }

    fn body_of(ssml: &str) -> String {
        let start = ssml.find("volume=\"50\">").map(|i| i + "volume=\"50\">".len()).unwrap_or(0);
        let end = ssml.find("</prosody>").unwrap_or(ssml.len());
        ssml[start..end].to_string()
    }

    #[async_trait]
    impl SpeechBackend for EchoBackend {
        async fn synthesize(&self, ssml: &str, output_format: &str) -> SynthesisResult<Bytes> {
            assert_eq!(output_format, DEFAULT_OUTPUT_FORMAT);
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.payloads.lock().unwrap().push(ssml.to_string());
            let body = body_of(ssml);
            if let Some(marker) = self.fail_containing {
                if body.contains(marker) {
                    return Err(SynthesisError::Backend {
                        status: 500,
                        body: "failed".into(),
                    });
                }
            }
            Ok(Bytes::from(format!("<{body}>")))
        }
    }

    fn voice() -> VoiceParams {
        VoiceParams::from_speed_pitch(
            "zh-CN-XiaoxiaoNeural",
            1.0,
            1.0,
            DEFAULT_STYLE,
            DEFAULT_OUTPUT_FORMAT,
        )
    }

    fn service(backend: Arc<EchoBackend>) -> SynthesisService {
        SynthesisService::new(backend, SynthesisDefaults::default())
    }

    #[tokio::test]
    async fn test_buffered_concatenates_in_order() {
        let backend = Arc::new(EchoBackend::default());
        let svc = service(backend.clone());

        let mut request = SynthesisRequest::new("Hello world. This is a test.", voice());
        request.chunk_size = Some(15);

        let audio = svc.synthesize_buffered(request).await.unwrap();
        assert_eq!(&audio[..], b"<Hello world.><This is a test.>");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cleaning_applied_before_segmentation() {
        let backend = Arc::new(EchoBackend::default());
        let svc = service(backend.clone());

        let request = SynthesisRequest::new("Check [this](http://x.com) out! 😀 1.", voice());
        let audio = svc.synthesize_buffered(request).await.unwrap();
        assert_eq!(&audio[..], b"<Check this out!>");
    }

    #[tokio::test]
    async fn test_pause_directive_reaches_markup_intact() {
        let backend = Arc::new(EchoBackend::default());
        let svc = service(backend.clone());

        let mut request =
            SynthesisRequest::new("Hello there<break time=\"1.5s\"/>friend", voice());
        request.chunk_size = Some(25);

        let audio = svc.synthesize_buffered(request).await.unwrap();
        assert_eq!(
            &audio[..],
            b"<Hello there><<break time=\"1.5s\"/>><friend>".as_slice()
        );

        let payloads = backend.payloads.lock().unwrap();
        assert!(payloads.iter().any(|p| p.contains("<break time=\"1.5s\"/>")));
        assert!(payloads.iter().all(|p| !p.contains("&lt;break")));
    }

    #[tokio::test]
    async fn test_cleaning_patch_overrides_defaults() {
        let backend = Arc::new(EchoBackend::default());
        let svc = service(backend.clone());

        let mut request = SynthesisRequest::new("**bold**", voice());
        request.cleaning = CleaningOptionsPatch {
            remove_markdown: Some(false),
            ..Default::default()
        };
        let audio = svc.synthesize_buffered(request).await.unwrap();
        assert_eq!(&audio[..], b"<**bold**>");
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let svc = service(Arc::new(EchoBackend::default()));

        let empty = SynthesisRequest::new("   ", voice());
        assert!(matches!(svc.prepare(&empty), Err(SynthesisError::InvalidRequest(_))));

        let mut zero_chunk = SynthesisRequest::new("hi", voice());
        zero_chunk.chunk_size = Some(0);
        assert!(matches!(svc.prepare(&zero_chunk), Err(SynthesisError::InvalidRequest(_))));

        let mut zero_concurrency = SynthesisRequest::new("hi", voice());
        zero_concurrency.concurrency = Some(0);
        assert!(matches!(
            svc.prepare(&zero_concurrency),
            Err(SynthesisError::InvalidRequest(_))
        ));

        let only_url = SynthesisRequest::new("https://example.com/page", voice());
        assert!(matches!(svc.prepare(&only_url), Err(SynthesisError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_input_length_limit() {
        let defaults = SynthesisDefaults {
            max_input_chars: 5,
            ..Default::default()
        };
        let svc = SynthesisService::new(Arc::new(EchoBackend::default()), defaults);
        let request = SynthesisRequest::new("123456", voice());
        assert!(matches!(svc.prepare(&request), Err(SynthesisError::InvalidRequest(_))));
    }

    #[test]
    fn test_concurrency_capped_by_maximum() {
        let svc = service(Arc::new(EchoBackend::default()));
        let mut request = SynthesisRequest::new("hi", voice());
        assert_eq!(svc.concurrency_for(&request), DEFAULT_CONCURRENCY);
        request.concurrency = Some(500);
        assert_eq!(svc.concurrency_for(&request), DEFAULT_MAX_CONCURRENCY);
        request.concurrency = Some(3);
        assert_eq!(svc.concurrency_for(&request), 3);
    }

    #[tokio::test]
    async fn test_buffered_failure_returns_error() {
        let backend = Arc::new(EchoBackend {
            fail_containing: Some("two"),
            ..Default::default()
        });
        let svc = service(backend);

        let mut request = SynthesisRequest::new("one. two. three.", voice());
        request.chunk_size = Some(5);
        let err = svc.synthesize_buffered(request).await.unwrap_err();
        assert!(matches!(err, SynthesisError::Backend { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_streaming_yields_chunks_in_order() {
        let svc = Arc::new(service(Arc::new(EchoBackend::default())));

        let mut request = SynthesisRequest::new("a. b. c. d. e.", voice());
        request.chunk_size = Some(2);
        request.concurrency = Some(2);

        let mut rx = svc.synthesize_streaming(request).unwrap();
        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk.unwrap());
        }
        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(joined, b"<a.><b.><c.><d.><e.>");
    }

    #[tokio::test]
    async fn test_streaming_validation_error_is_immediate() {
        let svc = Arc::new(service(Arc::new(EchoBackend::default())));
        let request = SynthesisRequest::new("", voice());
        assert!(matches!(
            svc.synthesize_streaming(request),
            Err(SynthesisError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_streaming_failure_after_audio_is_stream_aborted() {
        let backend = Arc::new(EchoBackend {
            fail_containing: Some("c"),
            ..Default::default()
        });
        let svc = Arc::new(service(backend));

        let mut request = SynthesisRequest::new("a. b. c. d.", voice());
        request.chunk_size = Some(2);
        request.concurrency = Some(1);

        let mut rx = svc.synthesize_streaming(request).unwrap();
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok() && items[1].is_ok());
        assert!(matches!(items[2], Err(SynthesisError::StreamAborted(_))));
    }

    #[tokio::test]
    async fn test_prosody_reflects_voice_params() {
        let backend = Arc::new(EchoBackend::default());
        let svc = service(backend.clone());

        let v = VoiceParams::from_speed_pitch("en-US-JennyNeural", 1.5, 1.0, "cheerful", DEFAULT_OUTPUT_FORMAT);
        svc.synthesize_buffered(SynthesisRequest::new("Hi", v)).await.unwrap();

        let payloads = backend.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        assert!(payloads[0].contains("rate=\"+50%\""));
        assert!(payloads[0].contains("<voice name=\"en-US-JennyNeural\">"));
    }
}
