//! Data models and structures
//!
//! Defines the request/response bodies exposed over HTTP and the process
//! configuration read from the environment.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Trigger word used when a caller does not supply one.
pub const DEFAULT_TRIGGER_WORD: &str = "OHAD_USER";

fn default_trigger_word() -> String {
    DEFAULT_TRIGGER_WORD.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub lora_url: String,
    #[serde(default = "default_trigger_word")]
    pub trigger_word: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationResponse {
    pub image_url: String,
    pub enhanced_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingResponse {
    pub lora_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub status: String,
    pub service: String,
}

impl Default for StatusResponse {
    fn default() -> Self {
        Self {
            status: "System is running".to_string(),
            service: "Hyper-Realism Generator".to_string(),
        }
    }
}

/// Uniform error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub detail: String,
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub fal_key: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub fal_queue_url: String,
    pub fal_storage_url: String,
    pub job_poll_interval: Duration,
    pub job_max_wait: Duration,
    pub transient_dir: PathBuf,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> crate::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| crate::Error::Config(format!("{} not set", key)))
        };
        let parse_u64 = |key: &str, default: u64| -> crate::Result<u64> {
            match get(key) {
                Some(raw) => raw.trim().parse().map_err(|_| {
                    crate::Error::Config(format!("{} must be an integer, got '{}'", key, raw))
                }),
                None => Ok(default),
            }
        };

        let port = parse_u64("PORT", 8000)?;
        let port = u16::try_from(port)
            .map_err(|_| crate::Error::Config(format!("PORT out of range: {}", port)))?;

        Ok(Self {
            fal_key: required("FAL_KEY")?,
            gemini_api_key: required("GEMINI_API_KEY")?,
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| "gemini-1.5-flash".to_string()),
            gemini_base_url: get("GEMINI_BASE_URL")
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            fal_queue_url: get("FAL_QUEUE_URL")
                .unwrap_or_else(|| "https://queue.fal.run".to_string()),
            fal_storage_url: get("FAL_STORAGE_URL")
                .unwrap_or_else(|| "https://rest.alpha.fal.ai".to_string()),
            job_poll_interval: Duration::from_millis(parse_u64("JOB_POLL_INTERVAL_MS", 1000)?),
            job_max_wait: Duration::from_secs(parse_u64("JOB_MAX_WAIT_SECS", 1800)?),
            transient_dir: get("TRANSIENT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
        })
    }

    pub fn bind_addr(&self) -> crate::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| crate::Error::Config(format!("Invalid bind address: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_generation_request_defaults_trigger_word() {
        let request: GenerationRequest = serde_json::from_str(
            r#"{"prompt": "me on a beach", "lora_url": "https://x/lora.safetensors"}"#,
        )
        .unwrap();
        assert_eq!(request.trigger_word, "OHAD_USER");
    }

    #[test]
    fn test_generation_request_keeps_explicit_trigger_word() {
        let request: GenerationRequest = serde_json::from_str(
            r#"{"prompt": "p", "lora_url": "u", "trigger_word": "ZXQ_PERSON"}"#,
        )
        .unwrap();
        assert_eq!(request.trigger_word, "ZXQ_PERSON");
    }

    #[test]
    fn test_config_defaults() {
        let config =
            Config::from_lookup(lookup(&[("FAL_KEY", "fal"), ("GEMINI_API_KEY", "gem")])).unwrap();

        assert_eq!(config.fal_key, "fal");
        assert_eq!(config.gemini_api_key, "gem");
        assert_eq!(config.gemini_model, "gemini-1.5-flash");
        assert_eq!(config.fal_queue_url, "https://queue.fal.run");
        assert_eq!(config.job_poll_interval, Duration::from_millis(1000));
        assert_eq!(config.job_max_wait, Duration::from_secs(1800));
        assert_eq!(config.bind_addr().unwrap().port(), 8000);
    }

    #[test]
    fn test_config_requires_keys() {
        let err = Config::from_lookup(lookup(&[("GEMINI_API_KEY", "gem")])).unwrap_err();
        assert!(err.to_string().contains("FAL_KEY"));

        let err = Config::from_lookup(lookup(&[("FAL_KEY", "fal"), ("GEMINI_API_KEY", "  ")]))
            .unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_config_rejects_bad_numbers() {
        let err = Config::from_lookup(lookup(&[
            ("FAL_KEY", "fal"),
            ("GEMINI_API_KEY", "gem"),
            ("PORT", "99999"),
        ]))
        .unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));

        let err = Config::from_lookup(lookup(&[
            ("FAL_KEY", "fal"),
            ("GEMINI_API_KEY", "gem"),
            ("JOB_POLL_INTERVAL_MS", "soon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("JOB_POLL_INTERVAL_MS"));
    }
}
