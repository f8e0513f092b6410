//! Preview and write handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::device::catalog::parse_model_id;
use crate::device::discovery::is_valid_mac;
use crate::error::EtiquetaError;
use crate::payload::ServiceCall;
use crate::writer::{WriteReport, WriteTarget};

use super::super::error::ApiError;
use super::super::state::AppState;

/// Model id as a number (`40`) or a string (`"0x28"`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ModelRef {
    Id(u8),
    Text(String),
}

impl ModelRef {
    pub fn resolve(&self) -> Result<u8, EtiquetaError> {
        match self {
            ModelRef::Id(id) => Ok(*id),
            ModelRef::Text(s) => parse_model_id(s).map_err(EtiquetaError::Config),
        }
    }
}

/// Body of POST /api/preview.
#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub model_id: ModelRef,
    #[serde(flatten)]
    pub call: ServiceCall,
}

/// Body of POST /api/write.
#[derive(Debug, Deserialize)]
pub struct WriteRequest {
    pub address: String,
    pub model_id: ModelRef,
    #[serde(flatten)]
    pub call: ServiceCall,
}

#[derive(Debug, Serialize)]
pub struct WriteResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: WriteReport,
}

#[derive(Debug, Serialize)]
pub struct LabelStatus {
    pub address: String,
    pub busy: bool,
    /// Last known transfer state, if the label was ever written.
    pub state: Option<String>,
}

/// POST /api/preview - render a service call as PNG.
pub async fn preview(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PreviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let model_id = req.model_id.resolve()?;
    let png = state.writer.preview(model_id, req.call).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

/// POST /api/write - render and push to a label.
///
/// The transfer runs on its own task so a dropped client cannot abandon a
/// half-open link.
pub async fn write(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WriteRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    if !is_valid_mac(&req.address) {
        return Err(EtiquetaError::Config(format!("invalid address '{}'", req.address)).into());
    }
    let target = WriteTarget::new(req.address, req.model_id.resolve()?);
    let cancel = state.shutdown.child_token();
    let task_state = Arc::clone(&state);

    let report = tokio::spawn(async move {
        task_state.writer.write(&target, req.call, &cancel).await
    })
    .await
    .map_err(|e| EtiquetaError::Server(format!("transfer task failed: {}", e)))??;

    Ok(Json(WriteResponse {
        success: true,
        report,
    }))
}

/// GET /api/labels/:address - session state of one label.
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Json<LabelStatus> {
    let registry = state.writer.registry();
    Json(LabelStatus {
        busy: registry.is_busy(&address),
        state: registry.state(&address).map(|s| s.to_string()),
        address,
    })
}

/// DELETE /api/labels/:address - forget an idle label's session history.
pub async fn forget(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.writer.registry().forget(&address)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}
