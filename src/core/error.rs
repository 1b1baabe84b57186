use thiserror::Error;

/// Errors produced while turning a speech request into audio.
///
/// Sanitization and segmentation never fail; everything here originates from
/// request validation, the credential endpoint, or the synthesis backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SynthesisError {
    /// Missing or malformed request fields. Raised before any network call.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No credential was ever issued and the refresh attempt failed.
    #[error("Credential unavailable: {0}")]
    CredentialUnavailable(String),

    /// The synthesis endpoint answered with a non-success status.
    #[error("Synthesis backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    /// The synthesis endpoint could not be reached or the body could not be read.
    #[error("Synthesis request failed: {0}")]
    Transport(String),

    /// A failure after streaming output had already started.
    #[error("Stream aborted: {0}")]
    StreamAborted(String),
}

impl SynthesisError {
    /// Error category, mirrors the `type` field of OpenAI error bodies.
    pub fn category(&self) -> &'static str {
        match self {
            SynthesisError::InvalidRequest(_) => "invalid_request_error",
            SynthesisError::CredentialUnavailable(_) => "authentication_error",
            SynthesisError::Backend { .. } | SynthesisError::Transport(_) => "api_error",
            SynthesisError::StreamAborted(_) => "stream_error",
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            SynthesisError::InvalidRequest(_) => "invalid_request",
            SynthesisError::CredentialUnavailable(_) => "credential_unavailable",
            SynthesisError::Backend { .. } => "synthesis_backend_error",
            SynthesisError::Transport(_) => "synthesis_backend_unreachable",
            SynthesisError::StreamAborted(_) => "stream_aborted",
        }
    }
}

pub type SynthesisResult<T> = Result<T, SynthesisError>;
