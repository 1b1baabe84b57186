pub mod client;
pub mod ssml;
pub mod voices;

pub use client::{DEFAULT_SYNTHESIS_URL_TEMPLATE, EdgeSpeechClient, SpeechBackend};
pub use ssml::{DEFAULT_OUTPUT_FORMAT, DEFAULT_STYLE, VoiceParams, build_ssml};
pub use voices::{ModelInfo, VoiceAliases, builtin_aliases, list_models, resolve_voice};
