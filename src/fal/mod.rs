//! fal.ai integration for image generation, LoRA training, and file storage
//!
//! Jobs go through fal's asynchronous queue: a submission returns a handle,
//! and waiting on the handle polls until the job completes. Uploads go to
//! fal's object storage and come back as publicly reachable URLs.

pub mod client;
pub mod mime;
pub mod mock;
pub mod types;

pub use client::FalClient;
pub use mock::MockFalClient;

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Reference to a job accepted by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_type: String,
    pub request_id: String,
    pub status_url: Option<String>,
    pub response_url: Option<String>,
}

#[async_trait]
pub trait JobService: Send + Sync {
    async fn submit(&self, job_type: &str, arguments: Value) -> Result<JobHandle>;

    /// Wait until the job completes and return its raw result payload.
    async fn wait(&self, handle: &JobHandle) -> Result<Value>;

    async fn run(&self, job_type: &str, arguments: Value) -> Result<Value> {
        let handle = self.submit(job_type, arguments).await?;
        tracing::info!(
            "Submitted {} job (request id {})",
            handle.job_type,
            handle.request_id
        );
        self.wait(&handle).await
    }
}

#[async_trait]
pub trait StorageService: Send + Sync {
    /// Upload a local file and return a URL the job provider can read.
    async fn upload_file(&self, path: &Path) -> Result<String>;
}
