//! Job argument schemas and result extraction for the two fal jobs we run.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const FLUX_LORA: &str = "fal-ai/flux-lora";
pub const FLUX_LORA_FAST_TRAINING: &str = "fal-ai/flux-lora-fast-training";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LoraWeight {
    pub path: String,
    pub scale: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FluxLoraArguments {
    pub prompt: String,
    pub loras: Vec<LoraWeight>,
    pub model_name: String,
    pub num_inference_steps: u32,
    pub guidance_scale: f64,
    pub image_size: String,
}

impl FluxLoraArguments {
    /// Arguments for one image from `prompt` with a single LoRA at full scale.
    pub fn new(prompt: &str, lora_url: &str) -> Self {
        Self {
            prompt: prompt.to_string(),
            loras: vec![LoraWeight {
                path: lora_url.to_string(),
                scale: 1.0,
            }],
            model_name: "flux-dev".to_string(),
            num_inference_steps: 28,
            guidance_scale: 3.5,
            image_size: "landscape_4_3".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrainingArguments {
    pub images_data_url: String,
    pub trigger_phrase: String,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ImageJobOutput {
    images: Vec<FileRef>,
}

#[derive(Debug, Deserialize)]
struct TrainingJobOutput {
    diffusers_lora_file: FileRef,
}

/// `images[0].url` from a flux-lora result.
pub fn image_url(result: &Value) -> Result<String> {
    let output = ImageJobOutput::deserialize(result)
        .map_err(|e| Error::JobProvider(format!("Unexpected image job result: {}", e)))?;

    output
        .images
        .into_iter()
        .next()
        .map(|image| image.url)
        .ok_or_else(|| Error::JobProvider("Image job returned no images".to_string()))
}

/// `diffusers_lora_file.url` from a training result.
pub fn lora_url(result: &Value) -> Result<String> {
    TrainingJobOutput::deserialize(result)
        .map(|output| output.diffusers_lora_file.url)
        .map_err(|e| Error::JobProvider(format!("Unexpected training job result: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_flux_lora_arguments_shape() {
        let args = FluxLoraArguments::new("ZXQ_PERSON on a cliff", "https://x/lora.safetensors");

        assert_eq!(
            serde_json::to_value(&args).unwrap(),
            serde_json::json!({
                "prompt": "ZXQ_PERSON on a cliff",
                "loras": [{ "path": "https://x/lora.safetensors", "scale": 1.0 }],
                "model_name": "flux-dev",
                "num_inference_steps": 28,
                "guidance_scale": 3.5,
                "image_size": "landscape_4_3"
            })
        );
    }

    #[test]
    fn test_training_arguments_shape() {
        let args = TrainingArguments {
            images_data_url: "https://v3.fal.media/files/a/photos.zip".to_string(),
            trigger_phrase: "OHAD_USER".to_string(),
        };

        assert_eq!(
            serde_json::to_value(&args).unwrap(),
            serde_json::json!({
                "images_data_url": "https://v3.fal.media/files/a/photos.zip",
                "trigger_phrase": "OHAD_USER"
            })
        );
    }

    #[test]
    fn test_image_url_reads_first_image() {
        let result = serde_json::json!({
            "images": [
                { "url": "https://fal.media/a.jpg", "width": 1024, "height": 768 },
                { "url": "https://fal.media/b.jpg" }
            ],
            "seed": 42
        });
        assert_eq!(image_url(&result).unwrap(), "https://fal.media/a.jpg");
    }

    #[test]
    fn test_image_url_rejects_missing_or_empty_images() {
        let err = image_url(&serde_json::json!({ "images": [] })).unwrap_err();
        assert!(err.to_string().contains("no images"));

        let err = image_url(&serde_json::json!({ "detail": "nsfw" })).unwrap_err();
        assert!(matches!(err, Error::JobProvider(_)));
    }

    #[test]
    fn test_lora_url_reads_diffusers_file() {
        let result = serde_json::json!({
            "diffusers_lora_file": { "url": "https://fal.media/lora.safetensors", "file_size": 1 },
            "config_file": { "url": "https://fal.media/config.json" }
        });
        assert_eq!(lora_url(&result).unwrap(), "https://fal.media/lora.safetensors");
    }

    #[test]
    fn test_lora_url_rejects_wrong_shape() {
        let err = lora_url(&serde_json::json!({ "diffusers_lora_file": "nope" })).unwrap_err();
        assert!(matches!(err, Error::JobProvider(_)));
    }
}
