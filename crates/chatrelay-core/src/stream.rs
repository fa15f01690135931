use crate::errors::GenerationFailure;
use crate::response::{CompletionSummary, Usage};

/// Outbound events of the streaming protocol.
///
/// Serialized untagged, so each event's JSON is exactly its fields
/// (`{"content": ..}`, `{"usage": .., "time": ..}` or `{"error": ..}`).
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum StreamEvent {
    /// Incremental content fragment.
    Content { content: String },
    /// Final event of a successful run.
    Finished {
        usage: Usage,
        /// Completion time in unix milliseconds.
        time: i64,
    },
    /// Terminal failure event.
    Error { error: String },
}

impl StreamEvent {
    pub(crate) fn finished(summary: &CompletionSummary) -> Self {
        Self::Finished {
            usage: summary.usage(),
            time: summary.completed_at.timestamp_millis(),
        }
    }

    pub(crate) fn error(failure: &GenerationFailure) -> Self {
        Self::Error {
            error: failure.to_string(),
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished { .. } | Self::Error { .. })
    }

    /// SSE event name.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Content { .. } => "content",
            Self::Finished { .. } => "finished",
            Self::Error { .. } => "error",
        }
    }
}
