use crate::{Error, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Lightweight Gemini REST client.
pub struct GeminiHttpClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl GeminiHttpClient {
    /// Construct a Gemini client.
    ///
    /// `model` should be the bare model ID (for example `gemini-1.5-flash`);
    /// a `models/` prefix is stripped.
    pub fn new(api_key: String, model: String, timeout: Duration) -> Self {
        Self::new_with_client(api_key, model, timeout, Client::new())
    }

    pub fn new_with_client(
        api_key: String,
        model: String,
        timeout: Duration,
        client: Client,
    ) -> Self {
        let model = model.strip_prefix("models/").unwrap_or(&model).to_string();

        Self {
            client,
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Returns the configured model ID without the `models/` prefix.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Calls Gemini's `generateContent` endpoint.
    pub async fn generate_content<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        request: &Req,
    ) -> Result<Resp> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to Gemini: {}", e);
                e
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!("Gemini API error (status {}): {}", status, error_text);
            return Err(Error::AiProvider(format!(
                "Gemini API error (status {}): {}",
                status, error_text
            )));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse Gemini response: {}\nBody: {}", e, body);
            Error::AiProvider(format!("Failed to parse Gemini response: {}", e))
        })
    }
}
