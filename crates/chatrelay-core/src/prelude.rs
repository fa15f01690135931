//! Common imports for typical relay usage.
pub use crate::{
    AggregateResponse, AppConfig, AppStore, ChatMessage, CompletionRequest, CompletionSummary,
    EventStream, GenerationBackend, GenerationSink, InMemoryAppStore, Relay, RelayConfig,
    RelayError, StreamEvent,
};
