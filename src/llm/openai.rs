//! OpenAI-compatible API client (Groq, `OpenAI`, local gateways).
//!
//! Covers `/chat/completions` (plain and SSE-streamed) and `/embeddings`.
//! Parsing is kept in pure functions for testability; the SSE decoder is
//! fed raw body chunks so frame boundaries can fall anywhere.

use std::collections::VecDeque;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;

use super::config::LlmTimeouts;
use super::stream::FragmentStream;
use super::types::{LlmError, Message};

// =============================================================================
// CLIENT
// =============================================================================

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    /// Whole-request deadline for unstreamed calls.
    request_timeout: Duration,
}

/// Sampling parameters sent with every completion request.
#[derive(Debug, Clone, Copy)]
pub struct Sampling<'a> {
    pub model: &'a str,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl OpenAiClient {
    /// Build a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is blank or the HTTP client fails to build.
    pub fn new(api_key: &str, base_url: &str, timeouts: LlmTimeouts) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey { var: "api key".into() });
        }
        let request_timeout = Duration::from_secs(timeouts.request_secs);
        // Streamed bodies are bounded per read, never in total.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .read_timeout(request_timeout)
            .build()
            .map_err(|e| LlmError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            api_key: api_key.trim().to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    /// Non-streamed completion: one request, one full answer.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-200 status, or a malformed body.
    pub async fn complete(&self, sampling: Sampling<'_>, messages: &[Message]) -> Result<String, LlmError> {
        let body = CcRequest::new(sampling, messages, false);
        let response = self
            .send_json("/chat/completions", &body, Some(self.request_timeout))
            .await?;
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;
        parse_chat_completions_text(&text)
    }

    /// Streamed completion. Returns once the provider has accepted the request;
    /// fragments arrive lazily through the returned stream.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-200 status.
    pub async fn stream(&self, sampling: Sampling<'_>, messages: &[Message]) -> Result<FragmentStream, LlmError> {
        let body = CcRequest::new(sampling, messages, true);
        let response = self.send_json("/chat/completions", &body, None).await?;
        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(|e| e.to_string()));
        Ok(sse_fragments(bytes))
    }

    /// Embed a batch of inputs, returning one vector per input in input order.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-200 status, or a malformed body.
    pub async fn embeddings(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let body = EmbeddingRequest { model, input: inputs };
        let response = self
            .send_json("/embeddings", &body, Some(self.request_timeout))
            .await?;
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;
        parse_embeddings_response(&text, inputs.len())
    }

    /// POST `body` as JSON. `total` bounds the whole exchange; streamed calls
    /// pass `None` and rely on the per-read timeout plus the fragment idle timeout.
    async fn send_json(
        &self,
        path: &str,
        body: &impl Serialize,
        total: Option<Duration>,
    ) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.post(url).bearer_auth(&self.api_key).json(body);
        if let Some(total) = total {
            request = request.timeout(total);
        }
        let response = request
            .send()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiResponse { status, body: text });
        }
        Ok(response)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
struct CcRequest<'a> {
    model: &'a str,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    messages: &'a [Message],
}

impl<'a> CcRequest<'a> {
    fn new(sampling: Sampling<'a>, messages: &'a [Message], stream: bool) -> Self {
        Self {
            model: sampling.model,
            temperature: sampling.temperature,
            max_tokens: sampling.max_tokens,
            stream,
            messages,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

// =============================================================================
// RESPONSE PARSING
// =============================================================================

pub(crate) fn parse_chat_completions_text(json_text: &str) -> Result<String, LlmError> {
    let root: Value = serde_json::from_str(json_text).map_err(|e| LlmError::ApiParse(e.to_string()))?;
    let Some(choice) = root
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
    else {
        return Err(LlmError::ApiParse("chat_completions: missing choices[0]".to_string()));
    };
    Ok(choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string())
}

pub(crate) fn parse_embeddings_response(json_text: &str, expected: usize) -> Result<Vec<Vec<f32>>, LlmError> {
    let root: Value = serde_json::from_str(json_text).map_err(|e| LlmError::ApiParse(e.to_string()))?;
    let Some(data) = root.get("data").and_then(Value::as_array) else {
        return Err(LlmError::ApiParse("embeddings: missing data".to_string()));
    };

    let mut rows: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .and_then(|i| usize::try_from(i).ok())
            .unwrap_or(position);
        let Some(values) = item.get("embedding").and_then(Value::as_array) else {
            return Err(LlmError::ApiParse(format!("embeddings: item {position} missing embedding")));
        };
        #[allow(clippy::cast_possible_truncation)]
        let vector = values
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| LlmError::ApiParse(format!("embeddings: item {position} has non-numeric values")))?;
        rows.push((index, vector));
    }
    if rows.len() != expected {
        return Err(LlmError::ApiParse(format!("embeddings: expected {expected} vectors, got {}", rows.len())));
    }
    rows.sort_by_key(|(index, _)| *index);
    Ok(rows.into_iter().map(|(_, v)| v).collect())
}

/// One decoded SSE `data` payload from a chat-completions stream.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StreamChunk {
    Fragment(String),
    Done,
    Skip,
}

pub(crate) fn parse_stream_data(data: &str) -> Result<StreamChunk, LlmError> {
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(StreamChunk::Done);
    }
    if data.is_empty() {
        return Ok(StreamChunk::Skip);
    }
    let root: Value = serde_json::from_str(data).map_err(|e| LlmError::ApiParse(format!("{e}, data: {data}")))?;

    if let Some(error) = root.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| error.as_str())
            .unwrap_or("provider reported an error mid-stream");
        return Err(LlmError::Stream(message.to_string()));
    }

    let fragment = root
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("delta"))
        .and_then(|delta| delta.get("content"))
        .and_then(Value::as_str);
    match fragment {
        Some(text) if !text.is_empty() => Ok(StreamChunk::Fragment(text.to_string())),
        _ => Ok(StreamChunk::Skip),
    }
}

// =============================================================================
// SSE DECODING
// =============================================================================

/// Incremental server-sent-events decoder.
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// sequences and `data:` lines split across network chunks decode intact.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    /// Feed raw bytes; returns the data payloads of every completed event.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            self.accept_line(line, &mut events);
        }
        events
    }

    /// Flush a trailing event that was not terminated by a blank line.
    pub(crate) fn finish(&mut self) -> Vec<String> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
            self.accept_line(&line, &mut events);
        }
        if !self.data_lines.is_empty() {
            events.push(self.data_lines.drain(..).collect::<Vec<_>>().join("\n"));
        }
        events
    }

    fn accept_line(&mut self, line: &str, events: &mut Vec<String>) {
        if line.is_empty() {
            if !self.data_lines.is_empty() {
                events.push(self.data_lines.drain(..).collect::<Vec<_>>().join("\n"));
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }
        if let Some(data) = line.strip_prefix("data:") {
            self.data_lines
                .push(data.strip_prefix(' ').unwrap_or(data).to_string());
        }
    }
}

struct SseState {
    body: BoxStream<'static, Result<Vec<u8>, String>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, LlmError>>,
    finished: bool,
}

impl SseState {
    fn absorb(&mut self, events: Vec<String>) {
        for data in events {
            if self.finished {
                break;
            }
            match parse_stream_data(&data) {
                Ok(StreamChunk::Fragment(text)) => self.pending.push_back(Ok(text)),
                Ok(StreamChunk::Done) => self.finished = true,
                Ok(StreamChunk::Skip) => {}
                Err(e) => {
                    self.pending.push_back(Err(e));
                    self.finished = true;
                }
            }
        }
    }
}

/// Turn a raw SSE byte stream into a fragment stream.
///
/// Ends at `[DONE]` or end of body; a transport error or an error event is
/// yielded once and ends the stream.
pub(crate) fn sse_fragments<S>(body: S) -> FragmentStream
where
    S: Stream<Item = Result<Vec<u8>, String>> + Send + 'static,
{
    let state = SseState { body: body.boxed(), decoder: SseDecoder::default(), pending: VecDeque::new(), finished: false };
    FragmentStream::new(futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(bytes)) => {
                    let events = st.decoder.push(&bytes);
                    st.absorb(events);
                }
                Some(Err(e)) => {
                    st.pending.push_back(Err(LlmError::Stream(e)));
                    st.finished = true;
                }
                None => {
                    let events = st.decoder.finish();
                    st.absorb(events);
                    st.finished = true;
                }
            }
        }
    }))
}

#[cfg(test)]
#[path = "openai_test.rs"]
mod tests;
