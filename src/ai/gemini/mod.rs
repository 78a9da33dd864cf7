pub mod client;
pub mod text;
pub mod types;

pub use client::GeminiHttpClient;
pub use text::GeminiTextClient;
