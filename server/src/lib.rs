//! HTTP surface of the relay: an OpenAI-style chat completions endpoint in
//! streaming (SSE) and buffered (JSON) flavors.
pub mod config;
pub mod error;
pub mod routes;

pub use routes::{AppState, router};
