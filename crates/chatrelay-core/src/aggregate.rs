//! Synchronous aggregator: turns a streamed run into one bounded-wait call
//! returning a complete [`AggregateResponse`].

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::backend::{GenerationEvent, Subscription};
use crate::errors::{GenerationFailure, RelayError};
use crate::response::{AggregateResponse, CompletionSummary, Usage};

/// Lifecycle of an [`Aggregator`]. The last three states are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregatorState {
    Init,
    Streaming,
    Completed,
    Failed,
    TimedOut,
}

/// Buffers one run's fragments and usage counters.
///
/// The buffer is owned by the consuming task and filled from the run's
/// subscription, so no lock is needed: the terminal event is received after
/// every token that preceded it.
#[derive(Debug)]
pub struct Aggregator {
    model: String,
    content: String,
    usage: Usage,
    state: AggregatorState,
}

impl Aggregator {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            content: String::new(),
            usage: Usage::default(),
            state: AggregatorState::Init,
        }
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    /// Content buffered so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Marks the run as started; tokens may follow.
    pub fn on_start(&mut self) {
        if self.state == AggregatorState::Init {
            self.state = AggregatorState::Streaming;
        }
    }

    pub fn on_token(&mut self, fragment: &str) {
        self.state = AggregatorState::Streaming;
        self.content.push_str(fragment);
        self.usage.completion_tokens = self.usage.completion_tokens.saturating_add(1);
    }

    pub fn on_complete(&mut self, summary: &CompletionSummary) {
        self.usage.prompt_tokens = summary.input_tokens;
        self.usage.total_tokens = summary.total_tokens;
        self.state = AggregatorState::Completed;
    }

    pub fn on_error(&mut self) {
        self.state = AggregatorState::Failed;
    }

    /// Drains `subscription` for at most `wait`.
    ///
    /// Returns the aggregate on completion, [`RelayError::Generation`] on a
    /// failure signal and [`RelayError::Timeout`] when no terminal signal
    /// arrives in time. The subscription is dropped on return; a run still in
    /// progress keeps going in the background with its writes discarded.
    pub async fn collect(
        &mut self,
        mut subscription: Subscription,
        wait: Duration,
    ) -> Result<AggregateResponse, RelayError> {
        let run_id = subscription.run_id();
        let outcome = tokio::time::timeout(wait, self.drain(&mut subscription)).await;
        match outcome {
            Ok(Ok(())) => {
                debug!(run_id = %run_id, completion_tokens = self.usage.completion_tokens, "aggregate completed");
                Ok(AggregateResponse::new(
                    self.model.clone(),
                    self.content.clone(),
                    self.usage,
                    Utc::now(),
                ))
            }
            Ok(Err(failure)) => {
                warn!(run_id = %run_id, error = %failure, "aggregate failed");
                Err(RelayError::Generation(failure))
            }
            Err(_) => {
                self.state = AggregatorState::TimedOut;
                warn!(run_id = %run_id, buffered = self.content.len(), "aggregate timed out");
                Err(RelayError::Timeout { waited: wait })
            }
        }
    }

    async fn drain(&mut self, subscription: &mut Subscription) -> Result<(), GenerationFailure> {
        self.on_start();
        while let Some(event) = subscription.next_event().await {
            match event {
                GenerationEvent::Token(text) => self.on_token(&text),
                GenerationEvent::Completed(summary) => {
                    self.on_complete(&summary);
                    return Ok(());
                }
                GenerationEvent::Failed(failure) => {
                    self.on_error();
                    return Err(failure);
                }
            }
        }
        // next_event always yields a terminal event before None.
        self.on_error();
        Err(GenerationFailure::Protocol {
            message: "subscription ended without a terminal event".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::generation_channel;
    use crate::model::BackendId;

    fn pair() -> (crate::backend::GenerationSink, Subscription) {
        generation_channel(uuid::Uuid::new_v4(), BackendId::new("t"))
    }

    #[tokio::test]
    async fn builds_response_from_tokens_and_summary() {
        let (sink, subscription) = pair();
        tokio::spawn(async move {
            sink.token("He");
            sink.token("llo");
            sink.complete(CompletionSummary::new(5, 2));
        });

        let mut aggregator = Aggregator::new("gpt-4o-mini");
        let response = aggregator
            .collect(subscription, Duration::from_secs(5))
            .await
            .expect("aggregate");
        assert_eq!(aggregator.state(), AggregatorState::Completed);
        assert_eq!(response.content(), "Hello");
        assert_eq!(response.model, "gpt-4o-mini");
        assert_eq!(response.choices[0].finish_reason, "stop");
        assert_eq!(
            response.usage,
            Usage {
                prompt_tokens: 2,
                completion_tokens: 2,
                total_tokens: 5
            }
        );
        assert!(response.id.starts_with("chatcmpl-"));
    }

    #[tokio::test]
    async fn zero_tokens_completes_with_empty_content() {
        let (sink, subscription) = pair();
        sink.complete(CompletionSummary::new(3, 3));
        let mut aggregator = Aggregator::new("m");
        let response = aggregator
            .collect(subscription, Duration::from_secs(1))
            .await
            .expect("aggregate");
        assert_eq!(response.content(), "");
        assert_eq!(response.usage.completion_tokens, 0);
        assert_eq!(aggregator.state(), AggregatorState::Completed);
    }

    #[test]
    fn zero_token_run_passes_through_streaming() {
        let mut aggregator = Aggregator::new("m");
        assert_eq!(aggregator.state(), AggregatorState::Init);
        aggregator.on_start();
        assert_eq!(aggregator.state(), AggregatorState::Streaming);
        aggregator.on_complete(&CompletionSummary::new(3, 3));
        assert_eq!(aggregator.state(), AggregatorState::Completed);
        aggregator.on_start();
        assert_eq!(aggregator.state(), AggregatorState::Completed);
    }

    #[tokio::test]
    async fn error_before_any_token_is_failure_not_stop() {
        let (sink, subscription) = pair();
        sink.fail(GenerationFailure::Backend {
            backend: "t".into(),
            message: "boom".into(),
        });

        let mut aggregator = Aggregator::new("m");
        let result = aggregator.collect(subscription, Duration::from_secs(1)).await;
        assert!(matches!(
            result,
            Err(RelayError::Generation(GenerationFailure::Backend { message, .. })) if message == "boom"
        ));
        assert_eq!(aggregator.state(), AggregatorState::Failed);
    }

    #[tokio::test]
    async fn silent_backend_times_out_without_partial_success() {
        let (sink, subscription) = pair();
        sink.token("partial");

        let mut aggregator = Aggregator::new("m");
        let result = aggregator
            .collect(subscription, Duration::from_millis(50))
            .await;
        assert!(matches!(
            result,
            Err(RelayError::Timeout { waited }) if waited == Duration::from_millis(50)
        ));
        assert_eq!(aggregator.state(), AggregatorState::TimedOut);
        assert_eq!(aggregator.content(), "partial");
        assert!(sink.is_closed());
    }

    #[tokio::test]
    async fn abandoned_run_is_a_failure() {
        let (sink, subscription) = pair();
        sink.token("x");
        drop(sink);
        let mut aggregator = Aggregator::new("m");
        assert!(matches!(
            aggregator.collect(subscription, Duration::from_secs(1)).await,
            Err(RelayError::Generation(GenerationFailure::Protocol { .. }))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concatenation_preserves_order_across_threads() {
        let (sink, subscription) = pair();
        let fragments: Vec<String> = (0..200).map(|i| format!("{i},")).collect();
        let expected = fragments.concat();
        std::thread::spawn(move || {
            for fragment in fragments {
                sink.token(fragment);
            }
            sink.complete(CompletionSummary::new(250, 50));
        });

        let mut aggregator = Aggregator::new("m");
        let response = aggregator
            .collect(subscription, Duration::from_secs(5))
            .await
            .expect("aggregate");
        assert_eq!(response.content(), expected);
        assert_eq!(response.usage.completion_tokens, 200);
    }
}
