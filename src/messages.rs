// JSON bodies exchanged over the HTTP API

use serde::{Deserialize, Serialize};

use crate::camera::CameraError;

// Reply to a motor route
// {"status":"ok","action":"forward"}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReply {
    pub status: String,
    pub action: String,
}

impl ActionReply {
    pub fn ok(action: &str) -> Self {
        Self {
            status: "ok".to_string(),
            action: action.to_string(),
        }
    }
}

// Error body for failed captures and unknown routes
// {"status":"error","message":"Not found"}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub status: String,
    pub message: String,
}

impl ErrorReply {
    pub fn new(message: &str) -> Self {
        Self {
            status: "error".to_string(),
            message: message.to_string(),
        }
    }

    pub fn not_found() -> Self {
        Self::new("Not found")
    }
}

/// Client-facing message for a capture failure
impl From<&CameraError> for ErrorReply {
    fn from(err: &CameraError) -> Self {
        match err {
            CameraError::OutOfMemory { .. } => Self::new("Out of memory"),
            _ => Self::new("Camera failed"),
        }
    }
}

/// Reply to /api/status. `wifi` is the current address, empty when offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub camera: bool,
    pub wifi: String,
}
