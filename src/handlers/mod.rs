//! HTTP request handlers
//!
//! - `api` - Health check endpoint
//! - `models` - OpenAI-style model listing
//! - `speech` - Speech synthesis (`/v1/audio/speech` and legacy `/generate`)

pub mod api;
pub mod models;
pub mod speech;

pub use speech::{generate_handler, speech_handler};
