use crate::errors::BackendError;
use crate::model::BackendId;
use crate::response::Usage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental `text/event-stream` decoder tolerant of arbitrary chunk
/// boundaries.
#[derive(Default)]
pub(crate) struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some((idx, delim_len)) = find_frame_delimiter(&self.buf) {
            let frame_bytes: Vec<u8> = self.buf.drain(..idx + delim_len).take(idx).collect();
            if let Some(frame) = parse_sse_frame(&frame_bytes) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flushes a trailing frame the server did not terminate with a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let rest = std::mem::take(&mut self.buf);
        parse_sse_frame(&rest)
    }
}

fn find_frame_delimiter(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if buf[i..].starts_with(b"\r\n\r\n") {
            return Some((i, 4));
        }
        i += 1;
    }
    None
}

fn parse_sse_frame(bytes: &[u8]) -> Option<SseFrame> {
    if bytes.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    let mut event: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();
    for raw_line in text.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim_start().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim_start());
        }
    }
    if event.is_none() && data_lines.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data_lines.join("\n"),
    })
}

/// What one chat-completions chunk contributes to a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChunkEvent {
    Token(String),
    Usage(Usage),
    Done,
}

pub(crate) fn map_frame_to_events(
    backend: &BackendId,
    frame: &SseFrame,
) -> Result<Vec<ChunkEvent>, BackendError> {
    let data = frame.data.trim();
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if data == "[DONE]" {
        return Ok(vec![ChunkEvent::Done]);
    }
    let value: serde_json::Value = serde_json::from_str(data).map_err(|e| {
        BackendError::protocol(backend.clone(), format!("invalid SSE JSON frame: {e}"))
    })?;
    map_chunk_json_to_events(backend, &value)
}

pub(crate) fn map_chunk_json_to_events(
    backend: &BackendId,
    value: &serde_json::Value,
) -> Result<Vec<ChunkEvent>, BackendError> {
    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(|v| v.as_str())
            .or_else(|| error.as_str())
            .unwrap_or("OpenAI stream error");
        return Err(BackendError::provider(backend.clone(), message, None));
    }

    let mut events = Vec::new();
    let choices = value.get("choices").and_then(|v| v.as_array());
    for choice in choices.into_iter().flatten() {
        if let Some(text) = choice
            .get("delta")
            .and_then(|d| d.get("content"))
            .and_then(|v| v.as_str())
            .filter(|text| !text.is_empty())
        {
            events.push(ChunkEvent::Token(text.to_string()));
        }
    }
    if let Some(usage) = value.get("usage").filter(|u| !u.is_null()) {
        let count = |key: &str| {
            usage
                .get(key)
                .and_then(|v| v.as_u64())
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0)
        };
        events.push(ChunkEvent::Usage(Usage {
            prompt_tokens: count("prompt_tokens"),
            completion_tokens: count("completion_tokens"),
            total_tokens: count("total_tokens"),
        }));
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> BackendId {
        BackendId::new("openai")
    }

    #[test]
    fn sse_decoder_handles_partial_chunk_boundaries() {
        let mut decoder = SseDecoder::default();
        let part1 = b"data: {\"choices\":[{\"delta\":{\"content\":\"hel";
        let part2 = b"lo\"}}]}\r\n\r\ndata: [DONE]\n\n";
        assert!(decoder.push_chunk(part1).is_empty());
        let frames = decoder.push_chunk(part2);
        assert_eq!(frames.len(), 2);
        assert!(frames[0].data.contains("hello"));
        assert_eq!(frames[1].data, "[DONE]");
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn finish_flushes_unterminated_frame() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push_chunk(b": keep-alive\n\ndata: [DONE]").is_empty());
        assert_eq!(
            decoder.finish(),
            Some(SseFrame {
                event: None,
                data: "[DONE]".into()
            })
        );
    }

    #[test]
    fn maps_delta_usage_and_done() {
        let delta = serde_json::json!({"choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]});
        assert_eq!(
            map_chunk_json_to_events(&backend(), &delta).expect("delta"),
            vec![ChunkEvent::Token("Hi".into())]
        );

        let role_only = serde_json::json!({"choices":[{"delta":{"role":"assistant","content":""}}]});
        assert!(
            map_chunk_json_to_events(&backend(), &role_only)
                .expect("role")
                .is_empty()
        );

        let usage = serde_json::json!({"choices":[],"usage":{"prompt_tokens":2,"completion_tokens":3,"total_tokens":5}});
        assert_eq!(
            map_chunk_json_to_events(&backend(), &usage).expect("usage"),
            vec![ChunkEvent::Usage(Usage {
                prompt_tokens: 2,
                completion_tokens: 3,
                total_tokens: 5
            })]
        );

        let done = SseFrame {
            event: None,
            data: "[DONE]".into(),
        };
        assert_eq!(
            map_frame_to_events(&backend(), &done).expect("done"),
            vec![ChunkEvent::Done]
        );
    }

    #[test]
    fn maps_error_frame_to_provider_error() {
        let failed = serde_json::json!({"error": {"message": "quota exceeded"}});
        let err = map_chunk_json_to_events(&backend(), &failed).expect_err("should fail");
        assert!(matches!(err, BackendError::Provider { .. }));
        assert_eq!(err.message(), "quota exceeded");
    }

    #[test]
    fn invalid_json_is_protocol_error() {
        let frame = SseFrame {
            event: None,
            data: "{not json".into(),
        };
        assert!(matches!(
            map_frame_to_events(&backend(), &frame),
            Err(BackendError::Protocol { .. })
        ));
    }
}
