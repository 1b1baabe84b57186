use std::sync::Arc;

use axum::{extract::State, response::Json};
use serde::Serialize;

use crate::core::tts::{ModelInfo, list_models};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelInfo>,
}

/// Handler for `GET /v1/models`
pub async fn list_models_handler(State(state): State<Arc<AppState>>) -> Json<ModelList> {
    Json(ModelList {
        object: "list",
        data: list_models(&state.config.voice_aliases),
    })
}
