use futures::StreamExt as _;
use tracing::{debug, warn};

use crate::backend::{GenerationBackend, GenerationSink};
use crate::errors::{BackendError, RelayError};
use crate::model::BackendId;
use crate::request::GenerationRequest;
use crate::response::{CompletionSummary, Usage};

use super::config::OpenAiConfig;
use super::transport::{ChunkEvent, SseDecoder, SseFrame, map_frame_to_events};

const OPENAI_BACKEND: &str = "openai";

/// Backend streaming OpenAI-compatible chat completions.
pub struct OpenAiBackend {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    /// Creates a backend from explicit configuration.
    pub fn new(config: OpenAiConfig) -> Result<Self, RelayError> {
        if config.api_key.trim().is_empty() {
            return Err(RelayError::Config(
                "OpenAI backend api_key must not be empty".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| RelayError::Config(format!("failed to build OpenAI client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a backend using `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self, RelayError> {
        Self::new(OpenAiConfig::from_env()?)
    }
}

#[async_trait::async_trait]
impl GenerationBackend for OpenAiBackend {
    fn id(&self) -> BackendId {
        BackendId::new(OPENAI_BACKEND)
    }

    async fn start(
        &self,
        request: GenerationRequest,
        sink: GenerationSink,
    ) -> Result<(), BackendError> {
        let body = build_request_body(&request);
        debug!(run_id = %request.run_id, model = %request.model_id, knowledge = request.knowledge_ids.len(), "starting OpenAI chat completion stream");
        let http_req = self
            .client
            .post(self.config.chat_completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body);
        tokio::spawn(async move {
            match stream_completion(http_req, &sink).await {
                Ok(summary) => sink.complete(summary),
                Err(err) => {
                    warn!(run_id = %sink.run_id(), error = %err, "OpenAI run failed");
                    sink.fail(err);
                }
            }
        });
        Ok(())
    }
}

pub(crate) fn build_request_body(req: &GenerationRequest) -> serde_json::Value {
    let mut messages = Vec::new();
    if let Some(prompt) = req
        .prompt
        .as_ref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
    {
        messages.push(serde_json::json!({
            "role": "system",
            "content": prompt,
        }));
    }
    messages.push(serde_json::json!({
        "role": req.role,
        "content": req.message,
    }));

    serde_json::json!({
        "model": req.model_id,
        "messages": messages,
        "stream": true,
        "stream_options": { "include_usage": true },
    })
}

async fn stream_completion(
    http_req: reqwest::RequestBuilder,
    sink: &GenerationSink,
) -> Result<CompletionSummary, BackendError> {
    let backend = BackendId::new(OPENAI_BACKEND);
    let response = http_req.send().await.map_err(|e| {
        BackendError::transport(backend.clone(), format!("OpenAI request failed: {e}"))
    })?;
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(BackendError::provider(
            backend,
            format!("OpenAI chat completion failed with status {status}: {body}"),
            Some(status.as_u16()),
        ));
    }

    let mut run = RunProgress::default();
    let mut decoder = SseDecoder::default();
    let mut bytes = response.bytes_stream();
    while let Some(chunk) = bytes.next().await {
        let chunk = chunk.map_err(|e| {
            BackendError::transport(backend.clone(), format!("OpenAI streaming read failed: {e}"))
        })?;
        for frame in decoder.push_chunk(&chunk) {
            if run.apply(&backend, &frame, sink)? {
                return Ok(run.summary());
            }
        }
        if sink.is_closed() {
            debug!(run_id = %sink.run_id(), "consumer gone, dropping OpenAI stream");
            return Ok(run.summary());
        }
    }
    if let Some(frame) = decoder.finish()
        && run.apply(&backend, &frame, sink)?
    {
        return Ok(run.summary());
    }
    Err(BackendError::protocol(
        backend,
        format!("stream ended without [DONE] after {} tokens", run.tokens),
    ))
}

#[derive(Default)]
struct RunProgress {
    tokens: u32,
    usage: Option<Usage>,
}

impl RunProgress {
    /// Applies one frame; returns `true` once the stream signalled `[DONE]`.
    fn apply(
        &mut self,
        backend: &BackendId,
        frame: &SseFrame,
        sink: &GenerationSink,
    ) -> Result<bool, BackendError> {
        for event in map_frame_to_events(backend, frame)? {
            match event {
                ChunkEvent::Token(text) => {
                    self.tokens = self.tokens.saturating_add(1);
                    sink.token(text);
                }
                ChunkEvent::Usage(usage) => self.usage = Some(usage),
                ChunkEvent::Done => return Ok(true),
            }
        }
        Ok(false)
    }

    /// Backend-reported usage, or the locally counted tokens when the server
    /// sent none.
    fn summary(&self) -> CompletionSummary {
        match self.usage {
            Some(usage) => CompletionSummary::new(usage.total_tokens, usage.prompt_tokens)
                .output_tokens(usage.completion_tokens),
            None => CompletionSummary::new(self.tokens, 0),
        }
    }
}
