use crate::errors::{PilotError, PilotResult};
use crate::llm::types::{StreamChunk, StreamChunkKind};

/// Parses a raw SSE line (OpenAI-compatible format) into a StreamChunk.
/// Returns None if the line is a keep-alive or non-data line.
pub fn parse_sse_line(line: &str) -> PilotResult<Option<StreamChunk>> {
    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }

    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
        return Ok(None);
    };

    if data == "[DONE]" {
        return Ok(Some(StreamChunk {
            kind: StreamChunkKind::Done,
            content: String::new(),
        }));
    }

    let json: serde_json::Value =
        serde_json::from_str(data).map_err(|e| PilotError::Model(format!("bad SSE frame: {e}")))?;

    let Some(first) = json["choices"].as_array().and_then(|c| c.first()) else {
        return Ok(None);
    };
    let delta = &first["delta"];

    // Some models (DeepSeek et al.) stream their reasoning separately.
    if let Some(reasoning) = delta["reasoning_content"].as_str().filter(|s| !s.is_empty()) {
        return Ok(Some(StreamChunk {
            kind: StreamChunkKind::Reasoning,
            content: reasoning.to_string(),
        }));
    }

    if let Some(content) = delta["content"].as_str().filter(|s| !s.is_empty()) {
        return Ok(Some(StreamChunk {
            kind: StreamChunkKind::Content,
            content: content.to_string(),
        }));
    }

    if first["finish_reason"].as_str().is_some() {
        return Ok(Some(StreamChunk {
            kind: StreamChunkKind::Done,
            content: String::new(),
        }));
    }

    Ok(None)
}

/// Accumulates the visible content of an SSE body fed in arbitrary chunks.
#[derive(Debug, Default)]
pub struct SseAccumulator {
    line_buf: Vec<u8>,
    content: String,
    reasoning_len: usize,
    done: bool,
}

impl SseAccumulator {
    /// Feed raw body bytes; returns true once the stream signalled completion.
    /// Lines are decoded only once complete, so a multi-byte character split
    /// across network chunks survives intact.
    pub fn feed(&mut self, bytes: &[u8]) -> bool {
        for &byte in bytes {
            if byte != b'\n' {
                self.line_buf.push(byte);
                continue;
            }
            let raw = std::mem::take(&mut self.line_buf);
            let line = String::from_utf8_lossy(&raw);
            match parse_sse_line(line.trim()) {
                Ok(Some(chunk)) => match chunk.kind {
                    StreamChunkKind::Content => self.content.push_str(&chunk.content),
                    StreamChunkKind::Reasoning => self.reasoning_len += chunk.content.len(),
                    StreamChunkKind::Done => {
                        self.done = true;
                        return true;
                    }
                },
                Ok(None) => {}
                Err(e) => tracing::debug!("SSE parse skipped: {e}"),
            }
        }
        self.done
    }

    pub fn reasoning_len(&self) -> usize {
        self.reasoning_len
    }

    pub fn finish(self) -> String {
        self.content
    }
}
