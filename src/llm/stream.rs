//! Helpers for streamed completions: first-chunk peeking, truncation marking
//! and decoding of server-sent event bodies.

use crate::llm::types::{LlmError, TextStream};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, future};
use std::collections::VecDeque;
use tracing::warn;

/// Appended once when a provider fails after output has already been yielded
pub const TRUNCATION_MARKER: &str = "\n\n[output truncated: upstream provider failed mid-stream]";

/// Pulls a JSON payload's text delta out of one SSE `data:` line
pub type ChunkExtractor = fn(&serde_json::Value) -> Option<String>;

/// Raw response body as a stream of byte chunks
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, LlmError>>;

/// Wait for the first non-empty chunk.
///
/// Returns `Ok(None)` when the stream ends without yielding anything, and the
/// error when the stream fails before any chunk arrives.
pub async fn peek_first(mut stream: TextStream) -> Result<Option<(String, TextStream)>, LlmError> {
    while let Some(item) = stream.next().await {
        let chunk = item?;
        if !chunk.is_empty() {
            return Ok(Some((chunk, stream)));
        }
    }
    Ok(None)
}

/// Put an already consumed chunk back in front of the remaining stream
pub fn prepend(first: String, rest: TextStream) -> TextStream {
    stream::once(future::ready(Ok(first))).chain(rest).boxed()
}

/// Convert a fallible chunk stream into plain text, ending with
/// [`TRUNCATION_MARKER`] at the first mid-stream error.
pub fn mark_truncation(stream: TextStream, provider: String) -> BoxStream<'static, String> {
    stream
        .scan(false, move |failed, item| {
            if *failed {
                return future::ready(None);
            }
            match item {
                Ok(chunk) => future::ready(Some(chunk)),
                Err(error) => {
                    warn!("Stream from {} failed after partial output: {}", provider, error);
                    *failed = true;
                    future::ready(Some(TRUNCATION_MARKER.to_string()))
                }
            }
        })
        .boxed()
}

struct SseState {
    body: ByteStream,
    buffer: Vec<u8>,
    pending: VecDeque<String>,
    finished: bool,
    extract: ChunkExtractor,
}

/// Decode an SSE body into text chunks.
///
/// Lines other than `data:` are ignored, `data: [DONE]` terminates the stream and
/// payloads that fail to parse are skipped.
pub fn sse_text_stream(body: ByteStream, extract: ChunkExtractor) -> TextStream {
    let state = SseState {
        body,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
        extract,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.pending.pop_front() {
                return Some((Ok(chunk), state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    state.buffer.extend_from_slice(&bytes);
                    state.finished =
                        drain_sse_lines(&mut state.buffer, state.extract, &mut state.pending);
                }
                Some(Err(error)) => {
                    state.finished = true;
                    return Some((Err(error), state));
                }
                None => {
                    state.buffer.push(b'\n');
                    drain_sse_lines(&mut state.buffer, state.extract, &mut state.pending);
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}

/// Consume every complete line in `buffer`. Returns true once `[DONE]` is seen.
pub fn drain_sse_lines(
    buffer: &mut Vec<u8>,
    extract: ChunkExtractor,
    pending: &mut VecDeque<String>,
) -> bool {
    while let Some(position) = buffer.iter().position(|byte| *byte == b'\n') {
        let line: Vec<u8> = buffer.drain(..=position).collect();
        let line = String::from_utf8_lossy(&line);
        let Some(data) = line.trim().strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data == "[DONE]" {
            buffer.clear();
            return true;
        }
        if let Ok(payload) = serde_json::from_str::<serde_json::Value>(data)
            && let Some(text) = extract(&payload)
            && !text.is_empty()
        {
            pending.push_back(text);
        }
    }
    false
}
