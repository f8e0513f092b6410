//! Shared server state.

use tokio_util::sync::CancellationToken;

use crate::writer::LabelWriter;

/// Application state shared across handlers.
pub struct AppState {
    pub writer: LabelWriter,
    /// Cancelled on shutdown; every transfer runs under a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(writer: LabelWriter) -> Self {
        Self {
            writer,
            shutdown: CancellationToken::new(),
        }
    }
}
