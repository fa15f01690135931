use std::sync::Arc;

use tracing::{info, warn};

use crate::aggregate::Aggregator;
use crate::backend::{GenerationBackend, GenerationClient};
use crate::config::RelayConfig;
use crate::emitter::{EventStream, spawn_emitter};
use crate::errors::RelayError;
use crate::request::{AppStore, CompletionRequest, normalize};
use crate::response::AggregateResponse;

struct RelayInner {
    client: GenerationClient,
    apps: Arc<dyn AppStore>,
    config: RelayConfig,
}

/// Entry point serving both client protocols over one generation backend.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

impl Relay {
    /// Starts a builder for wiring a backend and an app store.
    pub fn builder() -> RelayBuilder {
        RelayBuilder::default()
    }

    pub fn config(&self) -> &RelayConfig {
        &self.inner.config
    }

    /// Streaming protocol: starts a run and returns its live event stream.
    ///
    /// Validation failures and backend start failures are returned before any
    /// event is produced.
    pub async fn stream(
        &self,
        app_id: &str,
        request: &CompletionRequest,
    ) -> Result<EventStream, RelayError> {
        let request = normalize(request, app_id, self.inner.apps.as_ref())?;
        info!(run_id = %request.run_id, app_id, model = %request.model_id, "starting streaming run");
        let subscription = self.inner.client.subscribe(request).await?;
        Ok(spawn_emitter(
            subscription,
            self.inner.config.stream_buffer_capacity,
        ))
    }

    /// Buffered protocol: runs to a terminal signal (bounded by
    /// `aggregate_timeout`) and returns the assembled response.
    pub async fn complete(
        &self,
        app_id: &str,
        request: &CompletionRequest,
    ) -> Result<AggregateResponse, RelayError> {
        let request = normalize(request, app_id, self.inner.apps.as_ref())?;
        let run_id = request.run_id;
        info!(run_id = %run_id, app_id, model = %request.model_id, "starting buffered run");
        let mut aggregator = Aggregator::new(request.model_id.clone());
        let subscription = self.inner.client.subscribe(request).await?;
        let result = aggregator
            .collect(subscription, self.inner.config.aggregate_timeout)
            .await;
        match &result {
            Ok(response) => {
                info!(run_id = %run_id, total_tokens = response.usage.total_tokens, "buffered run finished");
            }
            Err(err) => warn!(run_id = %run_id, error = %err, state = ?aggregator.state(), "buffered run did not complete"),
        }
        result
    }
}

/// Builder used to assemble a [`Relay`].
#[derive(Default)]
pub struct RelayBuilder {
    backend: Option<Arc<dyn GenerationBackend>>,
    apps: Option<Arc<dyn AppStore>>,
    config: RelayConfig,
}

impl RelayBuilder {
    /// Sets the generation backend. Exactly one backend serves a relay.
    pub fn backend(mut self, backend: Arc<dyn GenerationBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets the application configuration store.
    pub fn app_store(mut self, apps: Arc<dyn AppStore>) -> Self {
        self.apps = Some(apps);
        self
    }

    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the relay, validating configuration.
    pub fn build(self) -> Result<Relay, RelayError> {
        let backend = self
            .backend
            .ok_or_else(|| RelayError::Config("a generation backend is required".into()))?;
        let apps = self
            .apps
            .ok_or_else(|| RelayError::Config("an app store is required".into()))?;
        self.config.validate()?;
        Ok(Relay {
            inner: Arc::new(RelayInner {
                client: GenerationClient::new(backend),
                apps,
                config: self.config,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::scripted::ScriptedBackend;
    use crate::errors::GenerationFailure;
    use crate::request::{AppConfig, ChatMessage, InMemoryAppStore};
    use crate::stream::StreamEvent;
    use std::time::Duration;

    fn apps() -> Arc<dyn AppStore> {
        Arc::new(InMemoryAppStore::from_apps([AppConfig::new(
            "demo",
            "gpt-4o-mini",
        )]))
    }

    fn relay_with(backend: ScriptedBackend, config: RelayConfig) -> Relay {
        Relay::builder()
            .backend(Arc::new(backend))
            .app_store(apps())
            .config(config)
            .build()
            .expect("relay")
    }

    fn hi() -> CompletionRequest {
        CompletionRequest::new(vec![ChatMessage::user("hi")])
    }

    #[test]
    fn build_requires_backend_and_store() {
        assert!(matches!(
            Relay::builder().app_store(apps()).build(),
            Err(RelayError::Config(msg)) if msg.contains("backend")
        ));
        assert!(matches!(
            Relay::builder()
                .backend(Arc::new(ScriptedBackend::new(["a"])))
                .build(),
            Err(RelayError::Config(msg)) if msg.contains("app store")
        ));
        assert!(matches!(
            Relay::builder()
                .backend(Arc::new(ScriptedBackend::new(["a"])))
                .app_store(apps())
                .config(RelayConfig::default().stream_buffer_capacity(0))
                .build(),
            Err(RelayError::Config(_))
        ));
    }

    #[tokio::test]
    async fn buffered_example_run() {
        let relay = relay_with(
            ScriptedBackend::new(["He", "llo"]).completes_with(5, 2),
            RelayConfig::default(),
        );
        let response = relay.complete("demo", &hi()).await.expect("complete");
        assert_eq!(response.content(), "Hello");
        assert_eq!(response.model, "gpt-4o-mini");
        assert_eq!(response.usage.completion_tokens, 2);
        assert_eq!(response.usage.prompt_tokens, 2);
        assert_eq!(response.usage.total_tokens, 5);
        assert_eq!(response.choices[0].finish_reason, "stop");
    }

    #[tokio::test]
    async fn validation_failure_never_starts_backend() {
        let backend = ScriptedBackend::new(["x"]);
        let starts = backend.start_counter();
        let relay = relay_with(backend, RelayConfig::default());

        let empty = CompletionRequest::new(Vec::new());
        assert!(matches!(
            relay.complete("demo", &empty).await,
            Err(RelayError::Validation(_))
        ));
        assert!(matches!(
            relay.stream("demo", &empty).await,
            Err(RelayError::Validation(_))
        ));
        assert!(matches!(
            relay.complete("unknown", &hi()).await,
            Err(RelayError::Validation(_))
        ));
        assert_eq!(starts.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn buffered_failure_is_not_a_stop_response() {
        let relay = relay_with(
            ScriptedBackend::new(Vec::<String>::new()).fails_with("model overloaded"),
            RelayConfig::default(),
        );
        assert!(matches!(
            relay.complete("demo", &hi()).await,
            Err(RelayError::Generation(GenerationFailure::Backend { message, .. })) if message == "model overloaded"
        ));
    }

    #[tokio::test]
    async fn buffered_timeout_is_distinct() {
        let relay = relay_with(
            ScriptedBackend::new(["partial"]).never_finishes(),
            RelayConfig::default().aggregate_timeout(Duration::from_millis(50)),
        );
        assert!(matches!(
            relay.complete("demo", &hi()).await,
            Err(RelayError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn streaming_run_emits_content_then_final() {
        let relay = relay_with(
            ScriptedBackend::new(["He", "llo"]).completes_with(5, 2),
            RelayConfig::default(),
        );
        let mut stream = relay.stream("demo", &hi()).await.expect("stream");
        let mut events = Vec::new();
        while let Some(event) = stream.next_event().await {
            events.push(event);
        }
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            StreamEvent::Content {
                content: "He".into()
            }
        );
        assert!(events[2].is_terminal());
        assert!(events[..2].iter().all(|e| !e.is_terminal()));
    }
}
