//! Text cleaning applied before segmentation.
//!
//! Stages always run in the same order: URLs, Markdown, custom keywords,
//! emoji, citation numbers (bracketed `[n]` markers and stray footnote
//! digits), whitespace. Later stages rely on the structural
//! noise removed by earlier ones.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Toggles for the cleaning stages. Every toggle defaults to `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningOptions {
    pub remove_markdown: bool,
    pub remove_emoji: bool,
    pub remove_urls: bool,
    pub remove_line_breaks: bool,
    pub remove_citation_numbers: bool,
    /// Comma separated literals removed from the text (case-sensitive)
    pub custom_keywords: String,
}

impl Default for CleaningOptions {
    fn default() -> Self {
        Self {
            remove_markdown: true,
            remove_emoji: true,
            remove_urls: true,
            remove_line_breaks: true,
            remove_citation_numbers: true,
            custom_keywords: String::new(),
        }
    }
}

/// Caller-supplied overrides. Absent fields keep the base value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CleaningOptionsPatch {
    #[serde(alias = "removeMarkdown")]
    pub remove_markdown: Option<bool>,
    #[serde(alias = "removeEmoji")]
    pub remove_emoji: Option<bool>,
    #[serde(alias = "removeUrls", alias = "remove_url", alias = "removeUrl")]
    pub remove_urls: Option<bool>,
    #[serde(alias = "removeLineBreaks")]
    pub remove_line_breaks: Option<bool>,
    #[serde(alias = "removeCitationNumbers")]
    pub remove_citation_numbers: Option<bool>,
    #[serde(alias = "customKeywords")]
    pub custom_keywords: Option<String>,
}

impl CleaningOptions {
    /// Merge a patch over these options field by field.
    pub fn merge(&self, patch: &CleaningOptionsPatch) -> CleaningOptions {
        CleaningOptions {
            remove_markdown: patch.remove_markdown.unwrap_or(self.remove_markdown),
            remove_emoji: patch.remove_emoji.unwrap_or(self.remove_emoji),
            remove_urls: patch.remove_urls.unwrap_or(self.remove_urls),
            remove_line_breaks: patch.remove_line_breaks.unwrap_or(self.remove_line_breaks),
            remove_citation_numbers: patch
                .remove_citation_numbers
                .unwrap_or(self.remove_citation_numbers),
            custom_keywords: patch
                .custom_keywords
                .clone()
                .unwrap_or_else(|| self.custom_keywords.clone()),
        }
    }

    fn keywords(&self) -> Vec<&str> {
        self.custom_keywords
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .collect()
    }
}

// A URL stops at brackets and parens so `[label](http://..)` keeps its shape
// for the Markdown stage.
static URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:https?://|\bwww\.)[^\s()\[\]<>]+").unwrap());

static MD_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").unwrap());
static MD_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").unwrap());
static MD_FENCED_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:[A-Za-z0-9_+\-]*\n)?(.*?)```").unwrap());
static MD_INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`\n]+)`").unwrap());
static MD_BOLD_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static MD_BOLD_UNDERSCORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"__(.+?)__").unwrap());
static MD_ITALIC_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*\n]+)\*").unwrap());
// Underscore emphasis only counts at word edges, identifiers like snake_case survive.
static MD_ITALIC_UNDERSCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[^\w])_([^_\n]+)_([^\w]|$)").unwrap());
static MD_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]{0,3}#{1,6}[ \t]*").unwrap());

static EMOJI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\p{Emoji_Presentation}|\p{Emoji_Modifier}|[\x{1F000}-\x{1FAFF}]|[\x{2600}-\x{27BF}]\x{FE0F}?|[\x{FE0F}\x{200D}\x{20E3}]",
    )
    .unwrap()
});

const CITATION_PUNCTUATION: &str = ".,;:!?。，；：！？";

static BRACKETED_CITATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\d+\]").unwrap());

static CITATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\S)\s+\d{1,2}([.,;:!?。，；：！？]|$)").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Clean `text` according to `opts`.
///
/// Never fails. Returns an empty string when nothing speakable is left.
pub fn clean(text: &str, opts: &CleaningOptions) -> String {
    let mut out = text.to_string();

    if opts.remove_urls {
        out = URL.replace_all(&out, "").into_owned();
    }

    if opts.remove_markdown {
        out = strip_markdown(&out);
    }

    let keywords = opts.keywords();
    if !keywords.is_empty() {
        out = remove_keywords(&out, &keywords);
    }

    if opts.remove_emoji {
        out = EMOJI.replace_all(&out, "").into_owned();
    }

    if opts.remove_citation_numbers {
        out = remove_citation_numbers(&out);
    }

    if opts.remove_line_breaks {
        out = WHITESPACE.replace_all(&out, " ").into_owned();
    }

    out.trim().to_string()
}

fn strip_markdown(text: &str) -> String {
    let out = MD_IMAGE.replace_all(text, "");
    let out = MD_LINK.replace_all(&out, "$1");
    let out = MD_FENCED_CODE.replace_all(&out, "$1");
    let out = MD_INLINE_CODE.replace_all(&out, "$1");
    let out = MD_BOLD_STAR.replace_all(&out, "$1");
    let out = MD_BOLD_UNDERSCORE.replace_all(&out, "$1");
    let out = MD_ITALIC_STAR.replace_all(&out, "$1");
    let out = MD_ITALIC_UNDERSCORE.replace_all(&out, "${1}${2}${3}");
    MD_HEADING.replace_all(&out, "").into_owned()
}

fn remove_keywords(text: &str, keywords: &[&str]) -> String {
    let mut sorted: Vec<&str> = keywords.to_vec();
    // Longest first so a keyword that contains another is removed whole
    sorted.sort_by_key(|k| std::cmp::Reverse(k.len()));

    let pattern = sorted
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");

    match Regex::new(&pattern) {
        Ok(re) => re.replace_all(text, "").into_owned(),
        Err(e) => {
            tracing::debug!(error = %e, "Keyword pattern rejected, removing literally");
            sorted
                .iter()
                .fold(text.to_string(), |acc, k| acc.replace(k, ""))
        }
    }
}

fn remove_citation_numbers(text: &str) -> String {
    let stripped = BRACKETED_CITATION.replace_all(text, "");
    let text: &str = &stripped;
    CITATION
        .replace_all(text, |caps: &Captures| {
            let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            let end = caps.get(0).map(|m| m.end()).unwrap_or(text.len());
            let before = &caps[1];
            let punct = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

            // "12.5" is a decimal, not a footnote marker
            if !punct.is_empty()
                && text[end..].chars().next().is_some_and(|c| c.is_ascii_digit())
            {
                return whole.to_string();
            }

            let before_is_punct = before.chars().all(|c| CITATION_PUNCTUATION.contains(c));
            if before_is_punct {
                before.to_string()
            } else {
                format!("{before}{punct}")
            }
        })
        .into_owned()
}
