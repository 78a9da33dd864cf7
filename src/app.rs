//! Request orchestration for image generation and LoRA training.

use crate::ai::{GeminiTextClient, PromptEnhancer, TextGenerationService};
use crate::fal::{FalClient, JobService, StorageService};
use crate::jobs::{self, FluxLoraArguments, TrainingArguments};
use crate::models::{Config, GenerationRequest, GenerationResponse, TrainingResponse};
use crate::transient::TransientFile;
use crate::Result;
use std::path::PathBuf;
use tokio::io::AsyncRead;
use tracing::{error, info};
use uuid::Uuid;

/// Coordinates prompt enhancement, fal job submission, and upload handling.
pub struct App {
    enhancer: PromptEnhancer,
    jobs: Box<dyn JobService>,
    storage: Box<dyn StorageService>,
    transient_dir: PathBuf,
}

/// Injectable service bundle used to construct [`App`] in tests/harnesses.
pub struct AppServices {
    pub text: Box<dyn TextGenerationService>,
    pub jobs: Box<dyn JobService>,
    pub storage: Box<dyn StorageService>,
}

impl App {
    /// Build an app from concrete service dependencies.
    pub fn with_services(services: AppServices, transient_dir: PathBuf) -> Self {
        Self {
            enhancer: PromptEnhancer::new(services.text),
            jobs: services.jobs,
            storage: services.storage,
            transient_dir,
        }
    }

    /// Construct an app talking to Gemini and fal with the given config.
    pub fn new(config: &Config) -> Self {
        // Reuse one HTTP connection pool across provider clients.
        let http_client = reqwest::Client::new();

        info!("Text provider: Gemini (model: {})", config.gemini_model);
        let text = GeminiTextClient::new_with_client(
            config.gemini_api_key.clone(),
            config.gemini_model.clone(),
            http_client.clone(),
        )
        .with_base_url(config.gemini_base_url.clone());

        let fal = || {
            FalClient::new_with_client(config.fal_key.clone(), http_client.clone())
                .with_queue_url(config.fal_queue_url.clone())
                .with_storage_url(config.fal_storage_url.clone())
                .with_polling(config.job_poll_interval, config.job_max_wait)
        };
        info!("Job provider: fal (queue: {})", config.fal_queue_url);

        Self::with_services(
            AppServices {
                text: Box::new(text),
                jobs: Box::new(fal()),
                storage: Box::new(fal()),
            },
            config.transient_dir.clone(),
        )
    }

    /// Enhance the prompt, render it with the caller's LoRA, and return the
    /// first image URL.
    pub async fn generate_image(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let id = Uuid::new_v4();

        let enhanced_prompt = self
            .enhancer
            .enhance(&request.prompt, &request.trigger_word)
            .await;
        info!("[{}] Generating for: {}", id, enhanced_prompt);

        let arguments =
            serde_json::to_value(FluxLoraArguments::new(&enhanced_prompt, &request.lora_url))?;
        let result = self
            .jobs
            .run(jobs::FLUX_LORA, arguments)
            .await
            .map_err(|e| {
                error!("[{}] Image job failed: {}", id, e);
                e
            })?;

        let image_url = jobs::image_url(&result)?;
        info!("[{}] Image ready at {}", id, image_url);

        Ok(GenerationResponse {
            image_url,
            enhanced_prompt,
        })
    }

    /// Create an empty transient file for an incoming upload. The caller
    /// streams data into it and hands it to [`App::train_staged`].
    pub fn stage_upload(&self, filename: &str) -> Result<TransientFile> {
        TransientFile::create(&self.transient_dir, filename)
    }

    /// Upload a training archive and train a LoRA for `trigger_word`.
    ///
    /// The archive is staged in a transient file that is removed before the
    /// training job is submitted, and on every error path.
    pub async fn train_user<R>(
        &self,
        reader: &mut R,
        filename: &str,
        trigger_word: &str,
    ) -> Result<TrainingResponse>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let transient = TransientFile::persist(&self.transient_dir, filename, reader).await?;
        self.train_staged(transient, trigger_word).await
    }

    /// Upload an already staged archive, remove it, and train a LoRA.
    pub async fn train_staged(
        &self,
        transient: TransientFile,
        trigger_word: &str,
    ) -> Result<TrainingResponse> {
        let id = Uuid::new_v4();
        info!(
            "[{}] Uploading training archive {} ({} bytes)",
            id,
            transient.path().display(),
            transient.len()
        );

        let uploaded = self.storage.upload_file(transient.path()).await;
        let removed = transient.close();

        let images_data_url = uploaded.map_err(|e| {
            error!("[{}] Upload failed: {}", id, e);
            e
        })?;
        removed?;
        info!("[{}] Uploaded training data to {}", id, images_data_url);

        let arguments = serde_json::to_value(TrainingArguments {
            images_data_url,
            trigger_phrase: trigger_word.to_string(),
        })?;
        let result = self
            .jobs
            .run(jobs::FLUX_LORA_FAST_TRAINING, arguments)
            .await
            .map_err(|e| {
                error!("[{}] Training job failed: {}", id, e);
                e
            })?;

        let lora_url = jobs::lora_url(&result)?;
        info!("[{}] Training complete: {}", id, lora_url);

        Ok(TrainingResponse { lora_url })
    }
}

#[cfg(test)]
mod tests {
    use super::{App, AppServices};
    use crate::ai::MockTextClient;
    use crate::fal::MockFalClient;
    use crate::models::{GenerationRequest, DEFAULT_TRIGGER_WORD};
    use crate::Error;
    use std::path::Path;
    use tempfile::tempdir;

    fn build_test_app(text: MockTextClient, fal: MockFalClient, transient_dir: &Path) -> App {
        App::with_services(
            AppServices {
                text: Box::new(text),
                jobs: Box::new(fal.clone()),
                storage: Box::new(fal),
            },
            transient_dir.to_path_buf(),
        )
    }

    fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.to_string(),
            lora_url: "https://fal.media/files/lora.safetensors".to_string(),
            trigger_word: DEFAULT_TRIGGER_WORD.to_string(),
        }
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_generate_image_returns_first_image_and_enhanced_prompt() {
        let dir = tempdir().unwrap();
        let fal = MockFalClient::new().with_job_result(serde_json::json!({
            "images": [{ "url": "https://fal.media/files/out.jpg" }]
        }));
        let recorder = fal.clone();
        let app = build_test_app(
            MockTextClient::new().with_text_response(" OHAD_USER at the Louvre, 8k ".to_string()),
            fal,
            dir.path(),
        );

        let response = app.generate_image(&request("me in Paris")).await.unwrap();

        assert_eq!(response.image_url, "https://fal.media/files/out.jpg");
        assert_eq!(response.enhanced_prompt, "OHAD_USER at the Louvre, 8k");

        let submissions = recorder.get_submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].0, "fal-ai/flux-lora");
        assert_eq!(submissions[0].1["prompt"], "OHAD_USER at the Louvre, 8k");
        assert_eq!(
            submissions[0].1["loras"][0]["path"],
            "https://fal.media/files/lora.safetensors"
        );
    }

    #[tokio::test]
    async fn test_generate_image_uses_original_prompt_when_enhancement_fails() {
        let dir = tempdir().unwrap();
        let fal = MockFalClient::new().with_job_result(serde_json::json!({
            "images": [{ "url": "https://fal.media/files/out.jpg" }]
        }));
        let recorder = fal.clone();
        let app = build_test_app(
            MockTextClient::new().with_failure("429 quota".to_string()),
            fal,
            dir.path(),
        );

        let response = app.generate_image(&request("me in Paris")).await.unwrap();

        assert_eq!(response.enhanced_prompt, "me in Paris");
        assert_eq!(recorder.get_submissions()[0].1["prompt"], "me in Paris");
    }

    #[tokio::test]
    async fn test_generate_image_surfaces_submission_failure() {
        let dir = tempdir().unwrap();
        let app = build_test_app(
            MockTextClient::new(),
            MockFalClient::new().with_submit_failure("connection refused".to_string()),
            dir.path(),
        );

        let err = app.generate_image(&request("x")).await.unwrap_err();
        assert!(matches!(err, Error::JobProvider(_)));
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_generate_image_rejects_malformed_result() {
        let dir = tempdir().unwrap();
        let app = build_test_app(
            MockTextClient::new(),
            MockFalClient::new().with_job_result(serde_json::json!({ "images": [] })),
            dir.path(),
        );

        let err = app.generate_image(&request("x")).await.unwrap_err();
        assert!(err.to_string().contains("no images"));
    }

    #[tokio::test]
    async fn test_train_user_uploads_then_trains_and_cleans_up() {
        let dir = tempdir().unwrap();
        let fal = MockFalClient::new()
            .with_upload_url("https://v3.fal.media/files/u/photos.zip".to_string())
            .with_job_result(serde_json::json!({
                "diffusers_lora_file": { "url": "https://fal.media/files/lora.safetensors" }
            }));
        let recorder = fal.clone();
        let app = build_test_app(MockTextClient::new(), fal, dir.path());

        let mut archive: &[u8] = b"PK\x03\x04selfies";
        let response = app
            .train_user(&mut archive, "photos.zip", "ZXQ_PERSON")
            .await
            .unwrap();

        assert_eq!(response.lora_url, "https://fal.media/files/lora.safetensors");

        let uploads = recorder.get_uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].data, b"PK\x03\x04selfies");
        assert!(!uploads[0].path.exists());
        assert!(dir_is_empty(dir.path()));

        let submissions = recorder.get_submissions();
        assert_eq!(submissions[0].0, "fal-ai/flux-lora-fast-training");
        assert_eq!(
            submissions[0].1,
            serde_json::json!({
                "images_data_url": "https://v3.fal.media/files/u/photos.zip",
                "trigger_phrase": "ZXQ_PERSON"
            })
        );
    }

    #[tokio::test]
    async fn test_train_staged_uploads_streamed_chunks() {
        let dir = tempdir().unwrap();
        let fal = MockFalClient::new().with_job_result(serde_json::json!({
            "diffusers_lora_file": { "url": "https://fal.media/files/lora.safetensors" }
        }));
        let recorder = fal.clone();
        let app = build_test_app(MockTextClient::new(), fal, dir.path());

        let mut staged = app.stage_upload("photos.zip").unwrap();
        staged.write_chunk(b"PK\x03\x04").await.unwrap();
        staged.write_chunk(b"selfies").await.unwrap();
        staged.finish().await.unwrap();

        let response = app.train_staged(staged, "ZXQ_PERSON").await.unwrap();

        assert_eq!(response.lora_url, "https://fal.media/files/lora.safetensors");
        assert_eq!(recorder.get_uploads()[0].data, b"PK\x03\x04selfies");
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_train_user_removes_transient_file_when_upload_fails() {
        let dir = tempdir().unwrap();
        let fal = MockFalClient::new().with_upload_failure("storage unavailable".to_string());
        let recorder = fal.clone();
        let app = build_test_app(MockTextClient::new(), fal, dir.path());

        let mut archive: &[u8] = b"zip";
        let err = app
            .train_user(&mut archive, "photos.zip", "OHAD_USER")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("storage unavailable"));
        assert_eq!(recorder.get_uploads().len(), 1);
        assert_eq!(recorder.get_submit_count(), 0);
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_train_user_removes_transient_file_when_training_fails() {
        let dir = tempdir().unwrap();
        let app = build_test_app(
            MockTextClient::new(),
            MockFalClient::new().with_job_failure("training crashed".to_string()),
            dir.path(),
        );

        let mut archive: &[u8] = b"zip";
        let err = app
            .train_user(&mut archive, "photos.zip", "OHAD_USER")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("training crashed"));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_train_user_rejects_result_without_lora_file() {
        let dir = tempdir().unwrap();
        let app = build_test_app(
            MockTextClient::new(),
            MockFalClient::new().with_job_result(serde_json::json!({ "status": "ok" })),
            dir.path(),
        );

        let mut archive: &[u8] = b"zip";
        let err = app
            .train_user(&mut archive, "photos.zip", "OHAD_USER")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::JobProvider(_)));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_train_user_fails_cleanly_when_staging_dir_is_missing() {
        let dir = tempdir().unwrap();
        let fal = MockFalClient::new();
        let recorder = fal.clone();
        let app = build_test_app(MockTextClient::new(), fal, &dir.path().join("gone"));

        let mut archive: &[u8] = b"zip";
        let err = app
            .train_user(&mut archive, "photos.zip", "OHAD_USER")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Io(_)));
        assert!(recorder.get_uploads().is_empty());
        assert!(dir_is_empty(dir.path()));
    }
}
