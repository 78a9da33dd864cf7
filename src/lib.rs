//! Gateway for personalized Flux portraits
//!
//! Enhances user prompts with Gemini, renders them on fal.ai with a caller's
//! LoRA, and trains new LoRAs from uploaded photo archives.

pub mod ai;
pub mod app;
pub mod error;
pub mod fal;
pub mod jobs;
pub mod models;
pub mod prompts;
pub mod server;
pub mod transient;

pub use error::{Error, Result};
