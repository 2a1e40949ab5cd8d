//! Request handlers

pub mod analysis;
pub mod anomalies;
pub mod events;
pub mod health;
pub mod logs;

use serde::Serialize;

/// Uniform mutation result body.
#[derive(Debug, Serialize)]
pub struct MutationResponse {
    pub success: bool,
    pub message: String,
}

impl MutationResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
