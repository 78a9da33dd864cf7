//! Gemini payload types for text-only `generateContent` calls.

use serde::{Deserialize, Serialize};

/// Gemini content container used in both requests and responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// A content part. Non-text parts (inline media, function calls) decode with
/// `text: None` and are skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

/// Top-level `generateContent` response envelope.
#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

/// Candidate completion item returned by Gemini.
#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: Content,
}
