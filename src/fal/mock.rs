use super::{JobHandle, JobService, StorageService};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A file as the mock storage saw it at upload time.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub data: Vec<u8>,
}

/// In-memory stand-in for fal. Job results and upload outcomes are scripted
/// and cycle when more calls arrive than were configured.
#[derive(Clone)]
pub struct MockFalClient {
    job_results: Arc<Mutex<Vec<std::result::Result<Value, String>>>>,
    submit_failure: Arc<Mutex<Option<String>>>,
    upload_results: Arc<Mutex<Vec<std::result::Result<String, String>>>>,
    submissions: Arc<Mutex<Vec<(String, Value)>>>,
    uploads: Arc<Mutex<Vec<UploadedFile>>>,
    base_url: String,
}

impl MockFalClient {
    pub fn new() -> Self {
        Self {
            job_results: Arc::new(Mutex::new(Vec::new())),
            submit_failure: Arc::new(Mutex::new(None)),
            upload_results: Arc::new(Mutex::new(Vec::new())),
            submissions: Arc::new(Mutex::new(Vec::new())),
            uploads: Arc::new(Mutex::new(Vec::new())),
            base_url: "https://mock-fal.example.com".to_string(),
        }
    }

    pub fn with_job_result(self, result: Value) -> Self {
        self.job_results.lock().unwrap().push(Ok(result));
        self
    }

    /// Make the job's result retrieval fail with `message`.
    pub fn with_job_failure(self, message: String) -> Self {
        self.job_results.lock().unwrap().push(Err(message));
        self
    }

    /// Make every submission fail with `message`.
    pub fn with_submit_failure(self, message: String) -> Self {
        *self.submit_failure.lock().unwrap() = Some(message);
        self
    }

    pub fn with_upload_url(self, url: String) -> Self {
        self.upload_results.lock().unwrap().push(Ok(url));
        self
    }

    pub fn with_upload_failure(self, message: String) -> Self {
        self.upload_results.lock().unwrap().push(Err(message));
        self
    }

    pub fn get_submissions(&self) -> Vec<(String, Value)> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn get_uploads(&self) -> Vec<UploadedFile> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn get_submit_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }
}

impl Default for MockFalClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobService for MockFalClient {
    async fn submit(&self, job_type: &str, arguments: Value) -> Result<JobHandle> {
        if let Some(message) = self.submit_failure.lock().unwrap().clone() {
            return Err(Error::JobProvider(message));
        }

        let mut submissions = self.submissions.lock().unwrap();
        submissions.push((job_type.to_string(), arguments));

        Ok(JobHandle {
            job_type: job_type.to_string(),
            request_id: format!("mock-{}", submissions.len()),
            status_url: None,
            response_url: None,
        })
    }

    async fn wait(&self, handle: &JobHandle) -> Result<Value> {
        let index = handle
            .request_id
            .strip_prefix("mock-")
            .and_then(|n| n.parse::<usize>().ok())
            .ok_or_else(|| Error::JobProvider(format!("Unknown job {}", handle.request_id)))?;

        let results = self.job_results.lock().unwrap();
        if results.is_empty() {
            return Ok(serde_json::json!({}));
        }

        match &results[(index - 1) % results.len()] {
            Ok(value) => Ok(value.clone()),
            Err(message) => Err(Error::JobProvider(message.clone())),
        }
    }
}

#[async_trait]
impl StorageService for MockFalClient {
    async fn upload_file(&self, path: &Path) -> Result<String> {
        let data = std::fs::read(path)?;

        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(UploadedFile {
            path: path.to_path_buf(),
            data,
        });

        let results = self.upload_results.lock().unwrap();
        if results.is_empty() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            return Ok(format!("{}/files/{}", self.base_url, name));
        }

        match &results[(uploads.len() - 1) % results.len()] {
            Ok(url) => Ok(url.clone()),
            Err(message) => Err(Error::Storage(message.clone())),
        }
    }
}
