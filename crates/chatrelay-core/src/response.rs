use chrono::{DateTime, Utc};

/// Finish reason reported for every successfully aggregated run.
pub const FINISH_REASON_STOP: &str = "stop";

/// Usage accounting reported by a finished run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Terminal success signal of a generation run.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CompletionSummary {
    /// Total tokens billed for the run.
    pub total_tokens: u32,
    /// Prompt (input) tokens.
    pub input_tokens: u32,
    /// Completion (output) tokens as counted by the backend.
    pub output_tokens: u32,
    /// When the backend finished the run.
    pub completed_at: DateTime<Utc>,
}

impl CompletionSummary {
    /// Creates a summary stamped with the current time.
    ///
    /// Output tokens default to `total - input`.
    pub fn new(total_tokens: u32, input_tokens: u32) -> Self {
        Self {
            total_tokens,
            input_tokens,
            output_tokens: total_tokens.saturating_sub(input_tokens),
            completed_at: Utc::now(),
        }
    }

    /// Overrides the backend-reported output token count.
    pub fn output_tokens(mut self, output_tokens: u32) -> Self {
        self.output_tokens = output_tokens;
        self
    }

    /// Overrides the completion timestamp.
    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = at;
        self
    }

    /// Usage as reported by the backend.
    pub fn usage(&self) -> Usage {
        Usage {
            prompt_tokens: self.input_tokens,
            completion_tokens: self.output_tokens,
            total_tokens: self.total_tokens,
        }
    }
}

/// Content carried by an aggregate choice.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Delta {
    pub content: String,
}

/// Single choice of an aggregate response.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Choice {
    pub delta: Delta,
    pub finish_reason: String,
}

/// Fully assembled answer returned by the buffered protocol.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AggregateResponse {
    /// `chatcmpl-<unix millis>`.
    pub id: String,
    /// Unix seconds.
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

impl AggregateResponse {
    /// Builds a single-choice response stamped with `now`.
    pub fn new(model: impl Into<String>, content: String, usage: Usage, now: DateTime<Utc>) -> Self {
        Self {
            id: format!("chatcmpl-{}", now.timestamp_millis()),
            created: now.timestamp(),
            model: model.into(),
            choices: vec![Choice {
                delta: Delta { content },
                finish_reason: FINISH_REASON_STOP.to_string(),
            }],
            usage,
        }
    }

    /// Content of the first choice.
    pub fn content(&self) -> &str {
        self.choices
            .first()
            .map(|choice| choice.delta.content.as_str())
            .unwrap_or_default()
    }
}
