//! Capability table listing.

use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

use crate::device::{ColorModel, DeviceProfile};

use super::super::state::AppState;

/// One catalog entry as exposed over HTTP.
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    /// Hex id, e.g. "0x28".
    pub model_id: String,
    pub name: &'static str,
    pub width: usize,
    pub height: usize,
    pub color_model: ColorModel,
    pub chunk_size: usize,
    pub frame_bytes: usize,
}

impl From<&DeviceProfile> for ModelInfo {
    fn from(p: &DeviceProfile) -> Self {
        Self {
            model_id: format!("{:#04x}", p.model_id),
            name: p.name,
            width: p.width,
            height: p.height,
            color_model: p.color_model,
            chunk_size: p.chunk_size,
            frame_bytes: p.frame_bytes(),
        }
    }
}

/// GET /api/models
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<ModelInfo>> {
    Json(
        state
            .writer
            .catalog()
            .profiles()
            .iter()
            .map(ModelInfo::from)
            .collect(),
    )
}
