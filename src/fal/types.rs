//! Wire types for fal's queue and storage REST APIs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct QueueSubmitResponse {
    pub request_id: String,
    #[serde(default)]
    pub status_url: Option<String>,
    #[serde(default)]
    pub response_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    InQueue,
    InProgress,
    Completed,
}

#[derive(Debug, Deserialize)]
pub struct QueueStatusResponse {
    pub status: String,
    #[serde(default)]
    pub queue_position: Option<u64>,
}

impl QueueStatusResponse {
    pub fn state(&self) -> Option<QueueState> {
        match self.status.as_str() {
            "IN_QUEUE" => Some(QueueState::InQueue),
            "IN_PROGRESS" => Some(QueueState::InProgress),
            "COMPLETED" => Some(QueueState::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadInitiateRequest {
    pub content_type: String,
    pub file_name: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadInitiateResponse {
    pub upload_url: String,
    pub file_url: String,
}
