//! Deterministic backend that replays a fixed token script.
//!
//! Used by tests and as the server's offline fallback (echo mode).

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracing::debug;

use crate::backend::{GenerationBackend, GenerationSink};
use crate::errors::{BackendError, GenerationFailure};
use crate::model::BackendId;
use crate::request::GenerationRequest;
use crate::response::CompletionSummary;

const SCRIPTED_BACKEND: &str = "scripted";

#[derive(Clone, Debug)]
enum TokenSource {
    Fixed(Vec<String>),
    /// Replays the request message word by word.
    Echo,
}

#[derive(Clone, Debug)]
enum Ending {
    /// Completes with word-count usage.
    Counted,
    Complete { total_tokens: u32, input_tokens: u32 },
    Fail(String),
    /// Holds the run open until the consumer goes away.
    Hang,
}

/// Backend replaying a configured script on a spawned task.
#[derive(Clone, Debug)]
pub struct ScriptedBackend {
    id: BackendId,
    source: TokenSource,
    delay: Option<Duration>,
    ending: Ending,
    starts: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    /// Replays `tokens` then completes.
    pub fn new(tokens: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::with_source(TokenSource::Fixed(
            tokens.into_iter().map(Into::into).collect(),
        ))
    }

    /// Echoes each request message back word by word.
    pub fn echo() -> Self {
        Self::with_source(TokenSource::Echo)
    }

    fn with_source(source: TokenSource) -> Self {
        Self {
            id: BackendId::new(SCRIPTED_BACKEND),
            source,
            delay: None,
            ending: Ending::Counted,
            starts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleeps before every token.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Completes with explicit usage.
    pub fn completes_with(mut self, total_tokens: u32, input_tokens: u32) -> Self {
        self.ending = Ending::Complete {
            total_tokens,
            input_tokens,
        };
        self
    }

    /// Ends every run with a failure after the tokens.
    pub fn fails_with(mut self, message: impl Into<String>) -> Self {
        self.ending = Ending::Fail(message.into());
        self
    }

    /// Never sends a terminal signal.
    pub fn never_finishes(mut self) -> Self {
        self.ending = Ending::Hang;
        self
    }

    /// Shared counter of `start` calls.
    pub fn start_counter(&self) -> Arc<AtomicUsize> {
        self.starts.clone()
    }

    fn tokens_for(&self, request: &GenerationRequest) -> Vec<String> {
        match &self.source {
            TokenSource::Fixed(tokens) => tokens.clone(),
            TokenSource::Echo => request
                .message
                .split_inclusive(' ')
                .map(ToOwned::to_owned)
                .collect(),
        }
    }
}

#[async_trait::async_trait]
impl GenerationBackend for ScriptedBackend {
    fn id(&self) -> BackendId {
        self.id.clone()
    }

    async fn start(
        &self,
        request: GenerationRequest,
        sink: GenerationSink,
    ) -> Result<(), BackendError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let tokens = self.tokens_for(&request);
        let input_tokens = word_count(&request.message)
            + request.prompt.as_deref().map(word_count).unwrap_or(0);
        let backend = self.id.to_string();
        let delay = self.delay;
        let ending = self.ending.clone();

        tokio::spawn(async move {
            let output_tokens = u32::try_from(tokens.len()).unwrap_or(u32::MAX);
            for token in tokens {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if sink.is_closed() {
                    debug!(run_id = %sink.run_id(), "scripted run abandoned by consumer");
                    return;
                }
                sink.token(token);
            }
            match ending {
                Ending::Counted => sink.complete(
                    CompletionSummary::new(input_tokens + output_tokens, input_tokens)
                        .output_tokens(output_tokens),
                ),
                Ending::Complete {
                    total_tokens,
                    input_tokens,
                } => sink.complete(CompletionSummary::new(total_tokens, input_tokens)),
                Ending::Fail(message) => sink.fail(GenerationFailure::Backend { backend, message }),
                Ending::Hang => sink.closed().await,
            }
        });
        Ok(())
    }
}

fn word_count(text: &str) -> u32 {
    u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX)
}
