//! SSML document construction for one utterance.
//!
//! Pause directives (`<break time="500ms"/>`) already present in the text are
//! kept byte-for-byte. Everything else is escaped before being wrapped in the
//! `speak`/`voice`/`express-as`/`prosody` envelope.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::text::Utterance;
use crate::core::text::segmenter::PAUSE_DIRECTIVE;

/// Default backend output format, 24kHz mono MP3.
pub const DEFAULT_OUTPUT_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";

/// Default speaking style.
pub const DEFAULT_STYLE: &str = "general";

const FALLBACK_LANG: &str = "en-US";

/// Voice parameters shared by every utterance of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceParams {
    /// Backend voice identifier, e.g. `zh-CN-XiaoxiaoNeural`
    pub voice_name: String,
    /// Offset from the neutral rate in percent
    pub rate_percent: i32,
    /// Offset from the neutral pitch in percent
    pub pitch_percent: i32,
    pub style: String,
    pub output_format: String,
}

impl VoiceParams {
    /// Build from OpenAI-style multipliers where `1.0` is neutral.
    ///
    /// `speed = 1.5` becomes `rate_percent = 50`, `pitch = 0.9` becomes
    /// `pitch_percent = -10`.
    pub fn from_speed_pitch(
        voice_name: impl Into<String>,
        speed: f32,
        pitch: f32,
        style: impl Into<String>,
        output_format: impl Into<String>,
    ) -> Self {
        Self {
            voice_name: voice_name.into(),
            rate_percent: multiplier_to_percent(speed),
            pitch_percent: multiplier_to_percent(pitch),
            style: style.into(),
            output_format: output_format.into(),
        }
    }

    /// Locale prefix of the voice name (`zh-CN-XiaoxiaoNeural` -> `zh-CN`).
    pub fn lang(&self) -> String {
        let mut parts = self.voice_name.split('-');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(lang), Some(region), Some(_)) if !lang.is_empty() && !region.is_empty() => {
                format!("{lang}-{region}")
            }
            _ => FALLBACK_LANG.to_string(),
        }
    }
}

fn multiplier_to_percent(value: f32) -> i32 {
    ((value - 1.0) * 100.0).round() as i32
}

fn signed_percent(value: i32) -> String {
    format!("{value:+}%")
}

const PLACEHOLDER_OPEN: char = '\u{E000}';
const PLACEHOLDER_CLOSE: char = '\u{E001}';

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new("\u{E000}([0-9]+)\u{E001}").unwrap());

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    escape_text(value)
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Escape `text` for the SSML body while leaving pause directives intact.
///
/// Placeholder code points in the input are dropped first, so only the
/// placeholders inserted here are restored.
pub fn escape_preserving_pauses(text: &str) -> String {
    let text: String = text
        .chars()
        .filter(|&c| c != PLACEHOLDER_OPEN && c != PLACEHOLDER_CLOSE)
        .collect();

    let mut preserved: Vec<&str> = Vec::new();
    let masked = PAUSE_DIRECTIVE.replace_all(&text, |caps: &regex::Captures| {
        let directive = caps.get(0).map(|m| &text[m.range()]).unwrap_or_default();
        preserved.push(directive);
        format!("{PLACEHOLDER_OPEN}{}{PLACEHOLDER_CLOSE}", preserved.len() - 1)
    });

    let escaped = escape_text(&masked);
    PLACEHOLDER
        .replace_all(&escaped, |caps: &regex::Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| preserved.get(i))
                .copied()
                .unwrap_or_default()
                .to_string()
        })
        .into_owned()
}

/// Render one utterance as a complete SSML document.
pub fn build_ssml(utterance: &Utterance, voice: &VoiceParams) -> String {
    let body = escape_preserving_pauses(&utterance.text);

    format!(
        "<speak xmlns=\"http://www.w3.org/2001/10/synthesis\" \
         xmlns:mstts=\"http://www.w3.org/2001/mstts\" version=\"1.0\" xml:lang=\"{lang}\">\
         <voice name=\"{voice_name}\">\
         <mstts:express-as style=\"{style}\" styledegree=\"2.0\" role=\"default\">\
         <prosody rate=\"{rate}\" pitch=\"{pitch}\" volume=\"50\">{body}</prosody>\
         </mstts:express-as></voice></speak>",
        lang = escape_attr(&voice.lang()),
        voice_name = escape_attr(&voice.voice_name),
        style = escape_attr(&voice.style),
        rate = signed_percent(voice.rate_percent),
        pitch = signed_percent(voice.pitch_percent),
    )
}
