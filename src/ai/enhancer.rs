//! Best-effort prompt enhancement.
//!
//! The enhancer never fails: any error from the text model is logged and the
//! caller's original input is handed back unchanged.

use super::TextGenerationService;
use crate::prompts;

/// Outcome of one enhancement attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enhancement {
    Enhanced(String),
    Fallback(String),
}

impl Enhancement {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Enhancement::Fallback(_))
    }

    pub fn into_text(self) -> String {
        match self {
            Enhancement::Enhanced(text) | Enhancement::Fallback(text) => text,
        }
    }
}

pub struct PromptEnhancer {
    model: Box<dyn TextGenerationService>,
}

impl PromptEnhancer {
    pub fn new(model: Box<dyn TextGenerationService>) -> Self {
        Self { model }
    }

    /// Build the instruction sent to the text model.
    pub fn instruction(user_input: &str, trigger_word: &str) -> String {
        prompts::render(
            prompts::ENHANCE,
            &[("trigger_word", trigger_word), ("user_input", user_input)],
        )
    }

    pub async fn try_enhance(&self, user_input: &str, trigger_word: &str) -> Enhancement {
        let instruction = Self::instruction(user_input, trigger_word);

        match self.model.generate_text(&instruction).await {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    tracing::warn!("Text model returned an empty prompt, using original input");
                    Enhancement::Fallback(user_input.to_string())
                } else {
                    Enhancement::Enhanced(text.to_string())
                }
            }
            Err(e) => {
                tracing::warn!("Prompt enhancement failed, using original input: {}", e);
                Enhancement::Fallback(user_input.to_string())
            }
        }
    }

    pub async fn enhance(&self, user_input: &str, trigger_word: &str) -> String {
        self.try_enhance(user_input, trigger_word)
            .await
            .into_text()
    }
}
