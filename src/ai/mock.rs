use super::TextGenerationService;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Scripted text model. Responses cycle; with none configured it echoes a
/// canned enhancement of the prompt.
#[derive(Clone)]
pub struct MockTextClient {
    responses: Arc<Mutex<Vec<std::result::Result<String, String>>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    call_count: Arc<Mutex<usize>>,
}

impl MockTextClient {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_text_response(self, response: String) -> Self {
        self.responses.lock().unwrap().push(Ok(response));
        self
    }

    pub fn with_failure(self, message: String) -> Self {
        self.responses.lock().unwrap().push(Err(message));
        self
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn get_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Default for MockTextClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerationService for MockTextClient {
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        let mut count = self.call_count.lock().unwrap();
        *count += 1;

        self.prompts.lock().unwrap().push(prompt.to_string());

        let responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Ok(format!("Enhanced: {}", prompt.trim()));
        }

        match &responses[(*count - 1) % responses.len()] {
            Ok(text) => Ok(text.clone()),
            Err(message) => Err(Error::AiProvider(message.clone())),
        }
    }
}
