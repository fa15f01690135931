//! Contract between the relay and a token-producing backend.
//!
//! A backend receives a [`GenerationSink`] per run and reports tokens through
//! it, ending with exactly one of [`GenerationSink::complete`] or
//! [`GenerationSink::fail`]. Both consume the sink, so a second terminal
//! signal cannot be expressed. The relay reads the run back through the
//! paired [`Subscription`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::{BackendError, GenerationFailure, RelayError, failure_from_backend_error};
use crate::model::BackendId;
use crate::request::GenerationRequest;
use crate::response::CompletionSummary;

/// A backend capable of producing a streamed generation run.
#[async_trait::async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Stable backend id.
    fn id(&self) -> BackendId;

    /// Starts a run.
    ///
    /// Must return without waiting for the run to finish. Tokens and the
    /// terminal signal go through `sink`, from any task or thread. An `Err`
    /// means the run never started.
    async fn start(
        &self,
        request: GenerationRequest,
        sink: GenerationSink,
    ) -> Result<(), BackendError>;
}

/// Events observed on a [`Subscription`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenerationEvent {
    Token(String),
    Completed(CompletionSummary),
    Failed(GenerationFailure),
}

impl GenerationEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Token(_))
    }
}

/// Producer half of a run.
///
/// Writes never block and never fail: once the subscription is gone they are
/// silently dropped.
#[derive(Debug)]
pub struct GenerationSink {
    run_id: uuid::Uuid,
    tx: mpsc::UnboundedSender<GenerationEvent>,
}

impl GenerationSink {
    pub fn run_id(&self) -> uuid::Uuid {
        self.run_id
    }

    /// Reports one generated fragment.
    pub fn token(&self, fragment: impl Into<String>) {
        let _ = self.tx.send(GenerationEvent::Token(fragment.into()));
    }

    /// Ends the run successfully.
    pub fn complete(self, summary: CompletionSummary) {
        let _ = self.tx.send(GenerationEvent::Completed(summary));
    }

    /// Ends the run with a failure.
    pub fn fail(self, failure: impl Into<GenerationFailure>) {
        let _ = self.tx.send(GenerationEvent::Failed(failure.into()));
    }

    /// Whether the consumer has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the consumer has gone away.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}

/// Consumer half of a run.
///
/// Yields tokens in generation order followed by exactly one terminal event,
/// then `None`. Dropping it (or calling [`Subscription::cancel`]) turns further
/// sink writes into no-ops without stopping the backend.
#[derive(Debug)]
pub struct Subscription {
    run_id: uuid::Uuid,
    backend: BackendId,
    rx: mpsc::UnboundedReceiver<GenerationEvent>,
    finished: bool,
}

impl Subscription {
    pub fn run_id(&self) -> uuid::Uuid {
        self.run_id
    }

    pub fn backend_id(&self) -> &BackendId {
        &self.backend
    }

    /// Waits for the next event of the run.
    ///
    /// A sink dropped without a terminal signal surfaces as a
    /// [`GenerationFailure::Protocol`] terminal event.
    pub async fn next_event(&mut self) -> Option<GenerationEvent> {
        if self.finished {
            return None;
        }
        let event = match self.rx.recv().await {
            Some(event) => event,
            None => GenerationEvent::Failed(GenerationFailure::Protocol {
                message: format!(
                    "backend {} ended run {} without a terminal signal",
                    self.backend, self.run_id
                ),
            }),
        };
        if event.is_terminal() {
            self.finished = true;
            self.rx.close();
        }
        Some(event)
    }

    /// Detaches from the run.
    pub fn cancel(mut self) {
        self.rx.close();
    }
}

/// Creates the sink/subscription pair for one run.
pub fn generation_channel(
    run_id: uuid::Uuid,
    backend: BackendId,
) -> (GenerationSink, Subscription) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        GenerationSink { run_id, tx },
        Subscription {
            run_id,
            backend,
            rx,
            finished: false,
        },
    )
}

/// Starts runs on one backend, one subscription per run.
#[derive(Clone)]
pub struct GenerationClient {
    backend: Arc<dyn GenerationBackend>,
}

impl GenerationClient {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_id(&self) -> BackendId {
        self.backend.id()
    }

    /// Starts a run and returns its subscription.
    pub async fn subscribe(&self, request: GenerationRequest) -> Result<Subscription, RelayError> {
        let backend_id = self.backend.id();
        let (sink, subscription) = generation_channel(request.run_id, backend_id.clone());
        debug!(run_id = %request.run_id, backend = %backend_id, model = %request.model_id, "starting generation run");
        self.backend
            .start(request, sink)
            .await
            .map_err(|err| RelayError::Generation(failure_from_backend_error(&err)))?;
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (GenerationSink, Subscription) {
        generation_channel(uuid::Uuid::new_v4(), BackendId::new("test"))
    }

    #[tokio::test]
    async fn delivers_tokens_in_order_then_terminal() {
        let (sink, mut sub) = pair();
        std::thread::spawn(move || {
            sink.token("a");
            sink.token("b");
            sink.complete(CompletionSummary::new(3, 1));
        });

        assert_eq!(sub.next_event().await, Some(GenerationEvent::Token("a".into())));
        assert_eq!(sub.next_event().await, Some(GenerationEvent::Token("b".into())));
        assert!(matches!(
            sub.next_event().await,
            Some(GenerationEvent::Completed(summary)) if summary.total_tokens == 3
        ));
        assert_eq!(sub.next_event().await, None);
    }

    #[tokio::test]
    async fn dropped_sink_becomes_protocol_failure() {
        let (sink, mut sub) = pair();
        sink.token("partial");
        drop(sink);

        assert_eq!(
            sub.next_event().await,
            Some(GenerationEvent::Token("partial".into()))
        );
        assert!(matches!(
            sub.next_event().await,
            Some(GenerationEvent::Failed(GenerationFailure::Protocol { message }))
                if message.contains("without a terminal signal")
        ));
        assert_eq!(sub.next_event().await, None);
    }

    #[tokio::test]
    async fn cancelled_subscription_turns_writes_into_noops() {
        let (sink, sub) = pair();
        assert!(!sink.is_closed());
        sub.cancel();
        assert!(sink.is_closed());
        sink.token("ignored");
        sink.fail(GenerationFailure::Protocol {
            message: "ignored".into(),
        });
    }

    struct RefusingBackend;

    #[async_trait::async_trait]
    impl GenerationBackend for RefusingBackend {
        fn id(&self) -> BackendId {
            BackendId::new("refusing")
        }

        async fn start(
            &self,
            _request: GenerationRequest,
            _sink: GenerationSink,
        ) -> Result<(), BackendError> {
            Err(BackendError::provider("refusing", "quota exceeded", Some(429)))
        }
    }

    #[tokio::test]
    async fn start_error_is_generation_error() {
        let client = GenerationClient::new(Arc::new(RefusingBackend));
        let request = GenerationRequest {
            run_id: uuid::Uuid::new_v4(),
            message: "hi".into(),
            role: "user".into(),
            model_id: "m".into(),
            prompt: None,
            knowledge_ids: Vec::new(),
        };
        let err = client.subscribe(request).await.expect_err("start fails");
        assert!(matches!(
            err,
            RelayError::Generation(GenerationFailure::Backend { message, .. }) if message == "quota exceeded"
        ));
    }
}
