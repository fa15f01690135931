//! Bridges a callback-style token generation backend to two client protocols:
//! a live event stream and a single buffered aggregate response.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chatrelay_core::prelude::*;
//! use chatrelay_core::backends::scripted::ScriptedBackend;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), RelayError> {
//! let apps = InMemoryAppStore::from_apps([AppConfig::new("demo", "gpt-4o-mini")]);
//! let relay = Relay::builder()
//!     .backend(Arc::new(ScriptedBackend::echo()))
//!     .app_store(Arc::new(apps))
//!     .build()?;
//!
//! let request = CompletionRequest::new(vec![ChatMessage::user("Say hello")]);
//!
//! let mut events = relay.stream("demo", &request).await?;
//! while let Some(event) = events.next_event().await {
//!     println!("{event:?}");
//! }
//!
//! let response = relay.complete("demo", &request).await?;
//! println!("{}", response.content());
//! # Ok(())
//! # }
//! ```

/// Synchronous aggregator for the buffered protocol.
pub mod aggregate;
/// Generation backend contract: sink, subscription, client.
pub mod backend;
/// Concrete backends.
pub mod backends;
/// Relay runtime options.
pub mod config;
/// Incremental emitter for the streaming protocol.
pub mod emitter;
/// Public error types.
pub mod errors;
/// Backend identifiers.
pub mod model;
/// Logging initialization.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Relay entry point and builder.
pub mod relay;
/// Inbound requests, app configuration and normalization.
pub mod request;
/// Completion summaries and aggregate responses.
pub mod response;
/// Outbound streaming events.
pub mod stream;

pub use aggregate::{Aggregator, AggregatorState};
pub use backend::{
    GenerationBackend, GenerationClient, GenerationEvent, GenerationSink, Subscription,
    generation_channel,
};
pub use config::{ObservabilityConfig, RelayConfig};
pub use emitter::{Emitter, EmitterState, EventStream, spawn_emitter};
pub use errors::{BackendError, GenerationFailure, RelayError};
pub use model::BackendId;
pub use relay::{Relay, RelayBuilder};
pub use request::{
    AppConfig, AppStore, ChatMessage, CompletionRequest, GenerationRequest, InMemoryAppStore,
    normalize,
};
pub use response::{AggregateResponse, Choice, CompletionSummary, Delta, Usage};
pub use stream::StreamEvent;
