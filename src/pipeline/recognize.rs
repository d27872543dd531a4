//! Recognition clients: send one section image plus prompt, get text back.
//!
//! This is the only stage with network I/O. Clients are stateless and never
//! retry; retry policy lives in the orchestrator so every attempt is visible
//! to logging and progress reporting in one place.
//!
//! Two clients ship with the crate:
//!
//! * [`HttpRecognizer`]: POSTs JSON to a transcription endpoint (for example
//!   a serverless proxy in front of a vision API) and reads the text back.
//! * [`LlmRecognizer`]: talks to any vision-capable provider supported by
//!   `edgequake-llm` (OpenAI, Anthropic, Gemini, Ollama, …).

use crate::error::{RecognitionError, ScribeError};
use crate::pipeline::encode::SectionImage;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default per-request deadline.
pub const DEFAULT_TIMEOUT_SECS: u64 = 25;

/// Turns one section image into text.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognize the text in `image`, following `prompt`.
    async fn recognize(&self, image: &SectionImage, prompt: &str) -> Result<String, RecognitionError>;
}

#[async_trait]
impl<R: Recognizer + ?Sized> Recognizer for Arc<R> {
    async fn recognize(&self, image: &SectionImage, prompt: &str) -> Result<String, RecognitionError> {
        (**self).recognize(image, prompt).await
    }
}

// ── HTTP endpoint ────────────────────────────────────────────────────────────

/// Request body sent to a transcription endpoint.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TranscribeRequest<'a> {
    image: String,
    media_type: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

/// Recognizer backed by a plain HTTP transcription endpoint.
///
/// Request: `POST {endpoint}` with `{"image": <base64>, "mediaType": …,
/// "prompt": …, "apiKey": …}`. The response may be `{"text": …}` or a
/// Messages-API body whose `content` array holds `{"type": "text"}` blocks.
pub struct HttpRecognizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl HttpRecognizer {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, ScribeError> {
        let endpoint = endpoint.into();
        if reqwest::Url::parse(&endpoint).is_err() {
            return Err(ScribeError::InvalidConfig(format!(
                "endpoint '{endpoint}' is not a valid URL"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ScribeError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            timeout_secs,
        })
    }
}

#[async_trait]
impl Recognizer for HttpRecognizer {
    async fn recognize(&self, image: &SectionImage, prompt: &str) -> Result<String, RecognitionError> {
        let body = TranscribeRequest {
            image: image.to_base64(),
            media_type: image.mime_type,
            prompt,
            api_key: self.api_key.as_deref(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_reqwest_error(e))?;
        debug!("Endpoint answered {} with {} bytes", status, text.len());

        if !status.is_success() {
            let message = extract_error_message(&text).unwrap_or_else(|| {
                format!(
                    "request failed: {} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("")
                )
                .trim_end()
                .to_string()
            });
            return Err(RecognitionError::Service {
                status: Some(status.as_u16()),
                message,
            });
        }

        extract_text(&text).ok_or_else(|| RecognitionError::Service {
            status: Some(status.as_u16()),
            message: "response carried no text".into(),
        })
    }
}

impl HttpRecognizer {
    fn map_reqwest_error(&self, e: reqwest::Error) -> RecognitionError {
        if e.is_timeout() {
            RecognitionError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            RecognitionError::Transport {
                message: e.to_string(),
            }
        }
    }
}

/// Pull the recognized text out of a success body.
fn extract_text(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;

    if let Some(text) = json.get("text").and_then(Value::as_str) {
        return Some(text.to_string());
    }

    let blocks = json.get("content")?.as_array()?;
    let parts: Vec<&str> = blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str).unwrap_or("text") == "text")
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

/// Best-effort human message from an error body.
fn extract_error_message(body: &str) -> Option<String> {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        let trimmed = body.trim();
        return (!trimmed.is_empty()).then(|| trimmed.chars().take(300).collect());
    };

    let error = json.get("error");
    if let Some(msg) = error.and_then(|e| e.get("message")).and_then(Value::as_str) {
        return Some(msg.to_string());
    }
    let detail = json.get("message").and_then(Value::as_str);
    match (error.and_then(Value::as_str), detail) {
        (Some(e), Some(d)) => Some(format!("{e}: {d}")),
        (Some(e), None) => Some(e.to_string()),
        (None, Some(d)) => Some(d.to_string()),
        (None, None) => None,
    }
}

// ── Vision LLM provider ──────────────────────────────────────────────────────

/// Recognizer backed by an `edgequake-llm` vision provider.
///
/// The request is a single user turn carrying the prompt and the section
/// image. Low temperature keeps the model faithful to what it sees.
pub struct LlmRecognizer {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    timeout: Duration,
}

impl LlmRecognizer {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32, max_tokens: usize, timeout_secs: u64) -> Self {
        Self {
            provider,
            temperature,
            max_tokens,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Recognizer for LlmRecognizer {
    async fn recognize(&self, image: &SectionImage, prompt: &str) -> Result<String, RecognitionError> {
        // `detail: "high"` lets GPT-class models tile the full image instead
        // of a single 512 px overview.
        let image_data = ImageData::new(image.to_base64(), image.mime_type).with_detail("high");
        let messages = vec![ChatMessage::user_with_images(prompt, vec![image_data])];
        let options = self.options();

        match tokio::time::timeout(self.timeout, self.provider.chat(&messages, Some(&options))).await {
            Err(_) => Err(RecognitionError::Timeout {
                secs: self.timeout.as_secs(),
            }),
            Ok(Err(e)) => Err(RecognitionError::Service {
                status: None,
                message: e.to_string(),
            }),
            Ok(Ok(response)) => {
                debug!(
                    "{} input tokens, {} output tokens",
                    response.prompt_tokens, response.completion_tokens
                );
                Ok(response.content)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn tiny_image() -> SectionImage {
        SectionImage {
            bytes: vec![0x89, b'P', b'N', b'G'],
            mime_type: "image/png",
            width: 1,
            height: 1,
        }
    }

    /// Serve exactly one HTTP response, after `delay`, and return the URL.
    async fn one_shot_server(status_line: &'static str, body: &'static str, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            tokio::time::sleep(delay).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/transcribe")
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let content_length = text[..head_end]
                    .lines()
                    .find_map(|l| {
                        let (k, v) = l.split_once(':')?;
                        k.eq_ignore_ascii_case("content-length")
                            .then(|| v.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + content_length {
                    return;
                }
            }
        }
    }

    #[test]
    fn extract_plain_text_body() {
        assert_eq!(extract_text(r#"{"text":"L1: a"}"#).as_deref(), Some("L1: a"));
    }

    #[test]
    fn extract_messages_api_body() {
        let body = r#"{"content":[{"type":"text","text":"L1: a"},{"type":"tool_use"},{"type":"text","text":"L2: b"}]}"#;
        assert_eq!(extract_text(body).as_deref(), Some("L1: a\nL2: b"));
    }

    #[test]
    fn extract_text_rejects_unknown_shape() {
        assert!(extract_text(r#"{"foo":1}"#).is_none());
        assert!(extract_text("not json").is_none());
    }

    #[test]
    fn error_message_shapes() {
        assert_eq!(
            extract_error_message(r#"{"error":{"message":"invalid key"}}"#).as_deref(),
            Some("invalid key")
        );
        assert_eq!(
            extract_error_message(r#"{"error":"Request timeout","message":"too slow"}"#).as_deref(),
            Some("Request timeout: too slow")
        );
        assert_eq!(extract_error_message("Bad Gateway").as_deref(), Some("Bad Gateway"));
        assert!(extract_error_message("").is_none());
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        assert!(matches!(
            HttpRecognizer::new("not a url", None, 5),
            Err(ScribeError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn http_success_returns_text() {
        let url = one_shot_server("200 OK", r#"{"content":[{"type":"text","text":"L1: hello"}]}"#, Duration::ZERO).await;
        let client = HttpRecognizer::new(url, Some("k".into()), 5).unwrap();
        let text = client.recognize(&tiny_image(), "prompt").await.unwrap();
        assert_eq!(text, "L1: hello");
    }

    #[tokio::test]
    async fn http_error_status_is_service_error() {
        let url = one_shot_server(
            "529 Overloaded",
            r#"{"error":{"message":"overloaded"}}"#,
            Duration::ZERO,
        )
        .await;
        let client = HttpRecognizer::new(url, None, 5).unwrap();
        let err = client.recognize(&tiny_image(), "prompt").await.unwrap_err();
        assert_eq!(
            err,
            RecognitionError::Service {
                status: Some(529),
                message: "overloaded".into()
            }
        );
    }

    #[tokio::test]
    async fn http_slow_response_is_timeout() {
        let url = one_shot_server("200 OK", r#"{"text":"late"}"#, Duration::from_secs(3)).await;
        let client = HttpRecognizer::new(url, None, 1).unwrap();
        let err = client.recognize(&tiny_image(), "prompt").await.unwrap_err();
        assert_eq!(err, RecognitionError::Timeout { secs: 1 });
    }

    #[tokio::test]
    async fn http_refused_connection_is_transport_error() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let client = HttpRecognizer::new(format!("http://127.0.0.1:{port}/"), None, 2).unwrap();
        let err = client.recognize(&tiny_image(), "prompt").await.unwrap_err();
        assert!(matches!(err, RecognitionError::Transport { .. }), "got {err:?}");
    }
}
