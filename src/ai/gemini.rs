use super::backend::{ChatBackend, ChunkStream, ReplyChunk, SessionBinding, TurnRequest};
use super::error::{SessionError, StreamError, StreamResult};
use crate::config::Settings;
use crate::types::{HistoryTurn, WebSource};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const JSON_MIME_TYPE: &str = "application/json";

/// Client for the Gemini `streamGenerateContent` endpoint.
pub struct GeminiBackend {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key,
        }
    }

    pub fn from_settings(settings: &Settings, api_key: String) -> Self {
        Self::new(settings.base_url.clone(), settings.model.clone(), api_key)
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

// ============================================
// Request types
// ============================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    system_instruction: SystemInstruction<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Serialize)]
struct GoogleSearch {}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

impl<'a> GenerateRequest<'a> {
    fn from_turn(request: &TurnRequest<'a>) -> Self {
        // Empty turns (e.g. a reply that produced no text) are not valid content.
        let mut contents: Vec<Content<'a>> = request
            .history
            .iter()
            .filter(|turn| !turn.text.trim().is_empty())
            .map(history_content)
            .collect();
        contents.push(Content {
            role: "user",
            parts: vec![TextPart {
                text: request.user_text,
            }],
        });

        let binding = request.binding;
        let tools = if binding.use_search {
            vec![Tool {
                google_search: GoogleSearch {},
            }]
        } else {
            Vec::new()
        };
        let generation_config = binding.structured_output.then_some(GenerationConfig {
            response_mime_type: JSON_MIME_TYPE,
        });

        Self {
            contents,
            system_instruction: SystemInstruction {
                parts: vec![TextPart {
                    text: binding.system_instruction,
                }],
            },
            tools,
            generation_config,
        }
    }
}

fn history_content(turn: &HistoryTurn) -> Content<'_> {
    Content {
        role: turn.role.as_str(),
        parts: vec![TextPart { text: &turn.text }],
    }
}

// ============================================
// Response types
// ============================================

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GeminiChunk {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    pub prompt_feedback: Option<PromptFeedback>,
    pub error: Option<GeminiApiError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    pub content: Option<CandidateContent>,
    pub grounding_metadata: Option<GroundingMetadata>,
    pub finish_reason: Option<String>,
}

#[derive(Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
pub struct GeminiPart {
    pub text: Option<String>,
    #[serde(default)]
    pub thought: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Deserialize)]
pub struct GroundingChunk {
    pub web: Option<WebSource>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Deserialize)]
pub struct GeminiApiError {
    pub code: Option<u16>,
    #[serde(default)]
    pub message: String,
    pub status: Option<String>,
    #[serde(default)]
    pub details: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiApiError,
}

impl GeminiApiError {
    fn into_stream_error(self, http_status: u16) -> StreamError {
        let status = self.code.unwrap_or(http_status);
        let key_invalid = self.details.iter().any(|detail| {
            detail.get("reason").and_then(|r| r.as_str()) == Some("API_KEY_INVALID")
        }) || self.message.contains("API key not valid");

        if key_invalid || matches!(status, 401 | 403) {
            return StreamError::Credential(self.message);
        }

        let message = match self.status {
            Some(code) if !self.message.is_empty() => format!("{code}: {}", self.message),
            Some(code) => code,
            None => self.message,
        };
        StreamError::Api { status, message }
    }
}

/// Map a non-success HTTP response to the matching stream error.
pub fn classify_api_error(status: u16, body: &str) -> StreamError {
    match serde_json::from_str::<GeminiErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.into_stream_error(status),
        Err(_) if matches!(status, 401 | 403) => StreamError::Credential(body.trim().to_string()),
        Err(_) => StreamError::Api {
            status,
            message: body.trim().to_string(),
        },
    }
}

/// Interpret one SSE `data:` payload.
///
/// Returns `None` for payloads that carry nothing (blank, `[DONE]`).
pub fn parse_gemini_sse_data(data: &str) -> Option<StreamResult<ReplyChunk>> {
    let trimmed = data.trim();
    if trimmed.is_empty() || trimmed == "[DONE]" {
        return None;
    }

    let parsed: GeminiChunk = match serde_json::from_str(trimmed) {
        Ok(parsed) => parsed,
        Err(err) => return Some(Err(StreamError::Decode(err.to_string()))),
    };

    if let Some(api_error) = parsed.error {
        return Some(Err(api_error.into_stream_error(500)));
    }
    if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
        return Some(Err(StreamError::Blocked(reason)));
    }

    let mut chunk = ReplyChunk::default();
    if let Some(candidate) = parsed.candidates.into_iter().next() {
        if let Some(content) = candidate.content {
            let text: String = content
                .parts
                .into_iter()
                .filter(|part| !part.thought)
                .filter_map(|part| part.text)
                .collect();
            if !text.is_empty() {
                chunk.text = Some(text);
            }
        }
        if let Some(metadata) = candidate.grounding_metadata {
            chunk.sources = metadata
                .grounding_chunks
                .into_iter()
                .filter_map(|c| c.web)
                .collect();
        }
        if let Some(reason) = candidate.finish_reason.as_deref()
            && reason != "STOP"
        {
            debug!(finish_reason = reason, "candidate finished early");
        }
    }
    Some(Ok(chunk))
}

// ============================================
// SSE framing
// ============================================

/// Splits a byte feed into server-sent event payloads.
///
/// Consecutive `data:` lines are joined until a blank line closes the event.
#[derive(Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Option<String>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.feed_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush whatever is left once the byte feed ends.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest);
        let line = line.trim_end_matches('\r');
        if !line.is_empty()
            && let Some(event) = self.feed_line(line)
        {
            return Some(event);
        }
        self.data.take()
    }

    fn feed_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.data.take();
        }
        if let Some(rest) = line.strip_prefix("data:") {
            let fragment = rest.strip_prefix(' ').unwrap_or(rest);
            match &mut self.data {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(fragment);
                }
                None => self.data = Some(fragment.to_string()),
            }
        }
        None
    }
}

fn chunk_stream(response: reqwest::Response) -> ChunkStream {
    Box::pin(stream! {
        let mut decoder = SseDecoder::default();
        let mut bytes = response.bytes_stream();
        let mut payloads = Vec::new();
        loop {
            let ended = match bytes.next().await {
                Some(Ok(received)) => {
                    payloads.extend(decoder.push(&received));
                    false
                }
                Some(Err(err)) => {
                    warn!(error = %err, "gemini stream read failed");
                    yield Err(StreamError::from(err));
                    return;
                }
                None => {
                    payloads.extend(decoder.finish());
                    true
                }
            };

            for data in payloads.drain(..) {
                match parse_gemini_sse_data(&data) {
                    Some(Ok(chunk)) => yield Ok(chunk),
                    Some(Err(err)) => {
                        yield Err(err);
                        return;
                    }
                    None => {}
                }
            }

            if ended {
                break;
            }
        }
    })
}

#[async_trait]
impl ChatBackend for GeminiBackend {
    fn check_binding(&self, binding: &SessionBinding) -> Result<(), SessionError> {
        if binding.use_search && binding.structured_output {
            return Err(SessionError::UnsupportedCapabilities { mode: binding.mode });
        }
        Ok(())
    }

    async fn stream(&self, request: TurnRequest<'_>) -> StreamResult<ChunkStream> {
        let body = GenerateRequest::from_turn(&request);
        debug!(
            model = %self.model,
            mode = ?request.binding.mode,
            contents = body.contents.len(),
            search = request.binding.use_search,
            structured = request.binding.structured_output,
            "starting gemini stream"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("accept", "text/event-stream")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = classify_api_error(status.as_u16(), &body);
            error!(status = status.as_u16(), error = %err, "gemini request failed");
            return Err(err);
        }

        Ok(chunk_stream(response))
    }
}
