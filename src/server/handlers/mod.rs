//! HTTP request handlers.

pub mod labels;
pub mod models;
