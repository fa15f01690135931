//! OpenAI-compatible chat completions backend.
//!
//! Works against any server speaking the `/v1/chat/completions` streaming
//! dialect (OpenAI, vLLM, Ollama's compatibility endpoint).
mod adapter;
mod config;
pub(crate) mod transport;

pub use adapter::OpenAiBackend;
pub use config::OpenAiConfig;
