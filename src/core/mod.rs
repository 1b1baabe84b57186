pub mod batch;
pub mod endpoint;
pub mod error;
pub mod synthesis;
pub mod text;
pub mod tts;

pub use batch::{AudioResult, AudioSink, BatchExecutor, BufferedSink, StreamingSink};
pub use endpoint::{
    BrokerState, CredentialBroker, CredentialIssuer, EndpointCredential, EndpointProvider,
    TranslatorCredentialIssuer,
};
pub use error::{SynthesisError, SynthesisResult};
pub use synthesis::{SynthesisDefaults, SynthesisRequest, SynthesisService};
pub use text::{CleaningOptions, CleaningOptionsPatch, Utterance, clean, segment};
pub use tts::{EdgeSpeechClient, SpeechBackend, VoiceParams, build_ssml};
