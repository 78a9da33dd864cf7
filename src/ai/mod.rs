//! Text-generation integration used for prompt enhancement
//!
//! Provides the Gemini `generateContent` client and the best-effort
//! [`PromptEnhancer`] built on top of it.

pub mod enhancer;
pub mod gemini;
pub mod mock;

pub use enhancer::{Enhancement, PromptEnhancer};
pub use gemini::GeminiTextClient;
pub use mock::MockTextClient;

use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait TextGenerationService: Send + Sync {
    /// Send a free-text prompt and return the model's free-text answer.
    async fn generate_text(&self, prompt: &str) -> Result<String>;
}
