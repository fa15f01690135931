//! Incremental emitter: forwards a run to a live outbound channel, one event per
//! generation event, and closes the channel after the terminal event.

use futures::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::backend::{GenerationEvent, Subscription};
use crate::errors::GenerationFailure;
use crate::response::CompletionSummary;
use crate::stream::StreamEvent;

/// Lifecycle of an [`Emitter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmitterState {
    Open,
    /// Terminal: a final/error event was forwarded or the consumer left.
    Closed,
}

/// Forwards generation callbacks to an outbound channel.
///
/// Every method returns whether the consumer is still attached. After the
/// channel closes all calls are no-ops.
pub struct Emitter {
    run_id: uuid::Uuid,
    tx: Option<mpsc::Sender<StreamEvent>>,
}

impl Emitter {
    pub fn new(run_id: uuid::Uuid, tx: mpsc::Sender<StreamEvent>) -> Self {
        Self {
            run_id,
            tx: Some(tx),
        }
    }

    pub fn state(&self) -> EmitterState {
        if self.tx.is_some() {
            EmitterState::Open
        } else {
            EmitterState::Closed
        }
    }

    pub async fn on_token(&mut self, fragment: String) -> bool {
        self.forward(StreamEvent::Content { content: fragment }).await
    }

    pub async fn on_complete(&mut self, summary: &CompletionSummary) -> bool {
        let sent = self.forward(StreamEvent::finished(summary)).await;
        self.close();
        sent
    }

    pub async fn on_error(&mut self, failure: &GenerationFailure) -> bool {
        let sent = self.forward(StreamEvent::error(failure)).await;
        self.close();
        sent
    }

    async fn forward(&mut self, event: StreamEvent) -> bool {
        let Some(tx) = self.tx.as_ref() else {
            return false;
        };
        if tx.send(event).await.is_ok() {
            return true;
        }
        debug!(run_id = %self.run_id, "stream consumer disconnected");
        self.close();
        false
    }

    fn close(&mut self) {
        self.tx = None;
    }

    /// Resolves once the consumer has dropped its end, or at once when closed.
    async fn detached(&self) {
        if let Some(tx) = self.tx.as_ref() {
            tx.closed().await;
        }
    }
}

/// Consumer side of the streaming protocol.
pub struct EventStream {
    run_id: uuid::Uuid,
    rx: mpsc::Receiver<StreamEvent>,
}

impl EventStream {
    pub fn run_id(&self) -> uuid::Uuid {
        self.run_id
    }

    /// Waits for the next event. Returns `None` once the channel is closed.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Converts into a `futures::Stream` (for SSE bodies).
    pub fn into_stream(self) -> impl Stream<Item = StreamEvent> + Send + 'static {
        futures::stream::unfold(self.rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
    }
}

/// Spawns a task forwarding `subscription` into a bounded outbound channel.
///
/// The backend writes into an unbounded sink, so a slow consumer only delays
/// this task. If the consumer disconnects the subscription is dropped; the
/// backend keeps running but its writes go nowhere.
pub fn spawn_emitter(subscription: Subscription, capacity: usize) -> EventStream {
    let run_id = subscription.run_id();
    let (tx, rx) = mpsc::channel(capacity);
    tokio::spawn(forward_run(subscription, Emitter::new(run_id, tx)));
    EventStream { run_id, rx }
}

async fn forward_run(mut subscription: Subscription, mut emitter: Emitter) {
    let run_id = subscription.run_id();
    let mut seq = 0_u64;
    loop {
        let event = tokio::select! {
            event = subscription.next_event() => event,
            () = emitter.detached() => {
                debug!(run_id = %run_id, "stream consumer disconnected while waiting for the backend");
                break;
            }
        };
        let Some(event) = event else {
            break;
        };
        let attached = match event {
            GenerationEvent::Token(text) => {
                debug!(run_id = %run_id, seq, "forwarding token");
                seq = seq.saturating_add(1);
                emitter.on_token(text).await
            }
            GenerationEvent::Completed(summary) => {
                debug!(run_id = %run_id, total_tokens = summary.total_tokens, "forwarding completion");
                emitter.on_complete(&summary).await
            }
            GenerationEvent::Failed(failure) => {
                debug!(run_id = %run_id, error = %failure, "forwarding failure");
                emitter.on_error(&failure).await
            }
        };
        if !attached || emitter.state() == EmitterState::Closed {
            break;
        }
    }
}
