use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::metrics::{AI_REQUESTS_TOTAL, AI_REQUEST_DURATION_SECONDS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AiError {
    /// The call (or an idle gap within a stream) exceeded the configured bound.
    #[error("AI request timed out")]
    Timeout,
    #[error("AI transport error: {0}")]
    Transport(String),
    #[error("AI API error: {0}")]
    Api(String),
}

pub type TokenReceiver = mpsc::Receiver<Result<String, AiError>>;

/// Opaque "complete text given messages" capability. Implementations must
/// deliver stream fragments in generation order; the stream is finite and not
/// restartable.
#[async_trait]
pub trait AiClient: Send + Sync {
    async fn complete(&self, req: CompletionRequest) -> Result<String, AiError>;

    async fn complete_stream(&self, req: CompletionRequest) -> Result<TokenReceiver, AiError>;
}

/// Client for any OpenAI-compatible chat completions API.
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout,
        }
    }

    fn payload(&self, req: &CompletionRequest, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": req.messages,
            "temperature": req.temperature,
            "max_tokens": req.max_tokens,
            "stream": stream,
        })
    }

    async fn send(&self, body: serde_json::Value) -> Result<reqwest::Response, AiError> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout
                } else {
                    AiError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(AiError::Api(format!("{}: {}", status, detail)));
        }
        Ok(response)
    }
}

#[async_trait]
impl AiClient for OpenAiClient {
    async fn complete(&self, req: CompletionRequest) -> Result<String, AiError> {
        let start = std::time::Instant::now();
        let result = tokio::time::timeout(self.timeout, async {
            let response = self.send(self.payload(&req, false)).await?;
            let completion: ChatCompletion = response
                .json()
                .await
                .map_err(|e| AiError::Transport(e.to_string()))?;
            completion
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .ok_or_else(|| AiError::Api("empty completion".to_string()))
        })
        .await
        .unwrap_or(Err(AiError::Timeout));

        let status = match &result {
            Ok(_) => "success",
            Err(AiError::Timeout) => "timeout",
            Err(_) => "error",
        };
        AI_REQUESTS_TOTAL.with_label_values(&["complete", status]).inc();
        AI_REQUEST_DURATION_SECONDS
            .with_label_values(&["complete"])
            .observe(start.elapsed().as_secs_f64());
        result
    }

    async fn complete_stream(&self, req: CompletionRequest) -> Result<TokenReceiver, AiError> {
        let response = tokio::time::timeout(self.timeout, self.send(self.payload(&req, true)))
            .await
            .unwrap_or(Err(AiError::Timeout))?;

        let (tx, rx) = mpsc::channel(64);
        let idle_timeout = self.timeout;
        tokio::spawn(async move {
            let start = std::time::Instant::now();
            let mut body = response.bytes_stream();
            let mut buffer = String::new();
            let mut status = "success";

            'outer: loop {
                let chunk = match tokio::time::timeout(idle_timeout, body.next()).await {
                    Ok(Some(Ok(bytes))) => bytes,
                    Ok(Some(Err(e))) => {
                        status = "error";
                        let _ = tx.send(Err(AiError::Transport(e.to_string()))).await;
                        break;
                    }
                    Ok(None) => break,
                    Err(_) => {
                        status = "timeout";
                        let _ = tx.send(Err(AiError::Timeout)).await;
                        break;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data == "[DONE]" {
                        break 'outer;
                    }
                    match serde_json::from_str::<ChatChunk>(data) {
                        Ok(chunk) => {
                            if let Some(token) = chunk
                                .choices
                                .into_iter()
                                .next()
                                .and_then(|choice| choice.delta.content)
                            {
                                if !token.is_empty() && tx.send(Ok(token)).await.is_err() {
                                    break 'outer;
                                }
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Skipping malformed stream chunk: {}", e);
                        }
                    }
                }
            }

            AI_REQUESTS_TOTAL.with_label_values(&["stream", status]).inc();
            AI_REQUEST_DURATION_SECONDS
                .with_label_values(&["stream"])
                .observe(start.elapsed().as_secs_f64());
        });

        Ok(rx)
    }
}

/// Deterministic client: pops pre-scripted responses in order. Backs the test
/// suites and local development without an API key.
#[derive(Default)]
pub struct ScriptedAiClient {
    script: Mutex<VecDeque<Result<String, AiError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicUsize,
}

impl ScriptedAiClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::new();
        for response in responses {
            client.push(response);
        }
        client
    }

    pub fn push(&self, response: impl Into<String>) {
        self.script
            .lock()
            .expect("script lock poisoned")
            .push_back(Ok(response.into()));
    }

    pub fn push_failure(&self, error: AiError) {
        self.script
            .lock()
            .expect("script lock poisoned")
            .push_back(Err(error));
    }

    /// Number of AI invocations made so far (cache hits must not add to it).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests seen so far, for asserting on prompt contents.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("requests lock poisoned").clone()
    }

    fn next_response(&self, req: &CompletionRequest) -> Result<String, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("requests lock poisoned")
            .push(req.clone());
        self.script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(AiError::Api("script exhausted".to_string())))
    }
}

#[async_trait]
impl AiClient for ScriptedAiClient {
    async fn complete(&self, req: CompletionRequest) -> Result<String, AiError> {
        self.next_response(&req)
    }

    async fn complete_stream(&self, req: CompletionRequest) -> Result<TokenReceiver, AiError> {
        let response = self.next_response(&req);
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            match response {
                Ok(text) => {
                    // Emit in small fragments so consumers exercise real
                    // token reassembly.
                    let chars: Vec<char> = text.chars().collect();
                    for piece in chars.chunks(6) {
                        let token: String = piece.iter().collect();
                        if tx.send(Ok(token)).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                }
            }
        });
        Ok(rx)
    }
}
