//! OpenAI voice aliases and model names.

use std::collections::HashMap;

use serde::Serialize;

/// Model name prefix shared by every advertised model.
pub const MODEL_PREFIX: &str = "tts-1";

/// Built-in OpenAI voice alias table.
pub const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("shimmer", "zh-CN-XiaoxiaoNeural"),
    ("alloy", "zh-CN-YunyangNeural"),
    ("fable", "zh-CN-YunjianNeural"),
    ("onyx", "zh-CN-XiaoyiNeural"),
    ("nova", "zh-CN-YunxiNeural"),
    ("echo", "zh-CN-liaoning-XiaobeiNeural"),
];

/// Alias name to backend voice identifier.
pub type VoiceAliases = HashMap<String, String>;

pub fn builtin_aliases() -> VoiceAliases {
    BUILTIN_ALIASES
        .iter()
        .map(|(alias, voice)| (alias.to_string(), voice.to_string()))
        .collect()
}

/// Pick the backend voice for a request.
///
/// An explicit `voice` wins (mapped through the alias table, otherwise used
/// verbatim). Next comes the alias suffix of `model` (`tts-1-shimmer`), then
/// `default_voice`.
pub fn resolve_voice(
    voice: Option<&str>,
    model: Option<&str>,
    aliases: &VoiceAliases,
    default_voice: &str,
) -> String {
    if let Some(voice) = voice.map(str::trim).filter(|v| !v.is_empty()) {
        return aliases
            .get(&voice.to_lowercase())
            .cloned()
            .unwrap_or_else(|| voice.to_string());
    }

    model
        .and_then(|m| m.trim().strip_prefix(MODEL_PREFIX))
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|alias| aliases.get(&alias.to_lowercase()))
        .cloned()
        .unwrap_or_else(|| default_voice.to_string())
}

/// One entry of the `/v1/models` listing.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,
    pub object: &'static str,
    pub owned_by: &'static str,
}

impl ModelInfo {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object: "model",
            owned_by: "speech-relay",
        }
    }
}

/// `tts-1`, `tts-1-hd`, then `tts-1-{alias}` for every alias in name order.
pub fn list_models(aliases: &VoiceAliases) -> Vec<ModelInfo> {
    let mut names: Vec<&String> = aliases.keys().collect();
    names.sort();

    let mut models = vec![
        ModelInfo::new(MODEL_PREFIX),
        ModelInfo::new(format!("{MODEL_PREFIX}-hd")),
    ];
    models.extend(
        names
            .into_iter()
            .map(|alias| ModelInfo::new(format!("{MODEL_PREFIX}-{alias}"))),
    );
    models
}
