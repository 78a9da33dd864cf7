use super::client::GeminiHttpClient;
use super::types::{Content, GenerateContentRequest, GenerateContentResponse, Part};
use crate::ai::TextGenerationService;
use crate::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;

pub struct GeminiTextClient {
    http: GeminiHttpClient,
}

impl GeminiTextClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self::new_with_client(api_key, model, reqwest::Client::new())
    }

    pub fn new_with_client(api_key: String, model: String, client: reqwest::Client) -> Self {
        Self {
            http: GeminiHttpClient::new_with_client(
                api_key,
                model,
                Duration::from_secs(30),
                client,
            ),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }

    fn extract_text(response: &GenerateContentResponse) -> Option<String> {
        response
            .candidates
            .first()
            .and_then(|c| c.content.parts.iter().find_map(|p| p.text.clone()))
    }
}

#[async_trait]
impl TextGenerationService for GeminiTextClient {
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
        };

        tracing::debug!("Sending generateContent request to {}", self.http.model());
        let response: GenerateContentResponse = self.http.generate_content(&request).await?;

        Self::extract_text(&response)
            .ok_or_else(|| Error::AiProvider("No text in Gemini response".to_string()))
    }
}
