use super::mime::content_type_for;
use super::types::{
    QueueState, QueueStatusResponse, QueueSubmitResponse, UploadInitiateRequest,
    UploadInitiateResponse,
};
use super::{JobHandle, JobService, StorageService};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;

const DEFAULT_QUEUE_URL: &str = "https://queue.fal.run";
const DEFAULT_STORAGE_URL: &str = "https://rest.alpha.fal.ai";

/// REST client for fal's queue and storage APIs.
pub struct FalClient {
    client: Client,
    api_key: String,
    queue_url: String,
    storage_url: String,
    request_timeout: Duration,
    upload_timeout: Duration,
    poll_interval: Duration,
    max_wait: Duration,
}

/// Outcome of a single status check that did not finish the wait.
#[derive(Debug)]
enum PollError {
    Pending(String),
    Failed(Error),
}

impl PollError {
    fn is_pending(&self) -> bool {
        matches!(self, PollError::Pending(_))
    }
}

impl FalClient {
    pub fn new(api_key: String) -> Self {
        Self::new_with_client(api_key, Client::new())
    }

    pub fn new_with_client(api_key: String, client: Client) -> Self {
        Self {
            client,
            api_key,
            queue_url: DEFAULT_QUEUE_URL.to_string(),
            storage_url: DEFAULT_STORAGE_URL.to_string(),
            request_timeout: Duration::from_secs(60),
            upload_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
            max_wait: Duration::from_secs(1800),
        }
    }

    pub fn with_queue_url(mut self, queue_url: String) -> Self {
        self.queue_url = queue_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_storage_url(mut self, storage_url: String) -> Self {
        self.storage_url = storage_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_polling(mut self, poll_interval: Duration, max_wait: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.max_wait = max_wait;
        self
    }

    fn auth_header(&self) -> String {
        format!("Key {}", self.api_key)
    }

    /// Queue app id: the `owner/app` part of a job type such as
    /// `fal-ai/flux-lora` or `fal-ai/flux-pro/v1.1`.
    fn app_id(job_type: &str) -> String {
        job_type
            .trim_matches('/')
            .splitn(3, '/')
            .take(2)
            .collect::<Vec<_>>()
            .join("/")
    }

    fn status_url(&self, handle: &JobHandle) -> String {
        handle.status_url.clone().unwrap_or_else(|| {
            format!(
                "{}/{}/requests/{}/status",
                self.queue_url,
                Self::app_id(&handle.job_type),
                handle.request_id
            )
        })
    }

    fn response_url(&self, handle: &JobHandle) -> String {
        handle.response_url.clone().unwrap_or_else(|| {
            format!(
                "{}/{}/requests/{}",
                self.queue_url,
                Self::app_id(&handle.job_type),
                handle.request_id
            )
        })
    }

    fn max_polls(&self) -> usize {
        let interval = self.poll_interval.as_millis().max(1);
        (self.max_wait.as_millis() / interval).max(1) as usize
    }

    async fn ensure_success(response: Response, what: &str) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let error_text = response.text().await?;
        tracing::error!("fal {} error (status {}): {}", what, status, error_text);
        Err(Error::JobProvider(format!(
            "fal {} error (status {}): {}",
            what, status, error_text
        )))
    }

    async fn parse_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse fal {} response: {}\nBody: {}", what, e, body);
            Error::JobProvider(format!("Failed to parse fal {} response: {}", what, e))
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to reach fal {}: {}", what, e);
                e
            })?;

        let response = Self::ensure_success(response, what).await?;
        Self::parse_json(response, what).await
    }

    async fn check_status(&self, url: &str) -> std::result::Result<(), PollError> {
        let status: QueueStatusResponse = self
            .get_json(url, "status")
            .await
            .map_err(PollError::Failed)?;

        match status.state() {
            Some(QueueState::Completed) => Ok(()),
            Some(QueueState::InQueue) | Some(QueueState::InProgress) => {
                tracing::debug!(
                    "Job still {} (queue position {:?})",
                    status.status,
                    status.queue_position
                );
                Err(PollError::Pending(status.status))
            }
            None => Err(PollError::Failed(Error::JobProvider(format!(
                "Unexpected job status: {}",
                status.status
            )))),
        }
    }
}

#[async_trait]
impl JobService for FalClient {
    async fn submit(&self, job_type: &str, arguments: Value) -> Result<JobHandle> {
        let url = format!("{}/{}", self.queue_url, job_type.trim_matches('/'));
        tracing::debug!("Submitting job to {}", url);

        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .header("Authorization", self.auth_header())
            .json(&arguments)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to submit job to fal: {}", e);
                e
            })?;

        let response = Self::ensure_success(response, "submit").await?;
        let submitted: QueueSubmitResponse = Self::parse_json(response, "submit").await?;

        Ok(JobHandle {
            job_type: job_type.to_string(),
            request_id: submitted.request_id,
            status_url: submitted.status_url,
            response_url: submitted.response_url,
        })
    }

    async fn wait(&self, handle: &JobHandle) -> Result<Value> {
        let status_url = self.status_url(handle);
        let strategy = FixedInterval::new(self.poll_interval).take(self.max_polls());

        RetryIf::spawn(strategy, || self.check_status(&status_url), PollError::is_pending)
            .await
            .map_err(|e| match e {
                PollError::Failed(e) => e,
                PollError::Pending(status) => Error::JobProvider(format!(
                    "Job {} still {} after {}s",
                    handle.request_id,
                    status,
                    self.max_wait.as_secs()
                )),
            })?;

        tracing::info!("Job {} completed", handle.request_id);
        self.get_json(&self.response_url(handle), "result").await
    }
}

#[async_trait]
impl StorageService for FalClient {
    async fn upload_file(&self, path: &Path) -> Result<String> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::Storage(format!("Invalid upload path: {}", path.display())))?
            .to_string();
        let content_type = content_type_for(path);
        let data = tokio::fs::read(path).await?;

        let url = format!(
            "{}/storage/upload/initiate?storage_type=fal-cdn-v3",
            self.storage_url
        );
        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .header("Authorization", self.auth_header())
            .json(&UploadInitiateRequest {
                content_type: content_type.to_string(),
                file_name: file_name.clone(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!("fal upload initiate error (status {}): {}", status, error_text);
            return Err(Error::Storage(format!(
                "Failed to initiate upload (status {}): {}",
                status, error_text
            )));
        }

        let body = response.text().await?;
        let initiated: UploadInitiateResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Storage(format!("Failed to parse upload response: {}", e)))?;

        let response = self
            .client
            .put(&initiated.upload_url)
            .timeout(self.upload_timeout)
            .header("Content-Type", content_type)
            .body(data)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!("fal upload error (status {}): {}", status, error_text);
            return Err(Error::Storage(format!(
                "Failed to upload file (status {}): {}",
                status, error_text
            )));
        }

        tracing::info!("Uploaded {} to {}", file_name, initiated.file_url);
        Ok(initiated.file_url)
    }
}
