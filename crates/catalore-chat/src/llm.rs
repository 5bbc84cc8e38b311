//! LLM backends: Ollama over HTTP, plus a deterministic hash embedder.
//!
//! Everything here is blocking; the pipeline is batch-shaped and a request in
//! flight is the only thing happening. Chat calls are non-streaming with
//! temperature 0 so reruns are as reproducible as the model allows.

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use catalore_store::{Embedder, EmbedderIdentity};

/// Failures talking to a generation or embedding backend.
///
/// Kept distinct from data-shape anomalies: callers must be able to tell
/// "the service is down" from "the catalog has no answer", because only the
/// former may leave conversation state untouched.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("failed to reach {url} (is the server running? try `ollama serve` or set OLLAMA_HOST): {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("llm http error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("llm returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// A text-completion backend.
pub trait ChatModel {
    fn complete(&self, system: Option<&str>, user: &str) -> Result<String, LlmError>;
}

// ============================================================================
// Ollama
// ============================================================================

/// Blocking client for a local Ollama server. One struct serves both chat
/// (`/api/chat`) and embeddings (`/api/embed`, falling back to
/// `/api/embeddings` for older servers).
#[derive(Debug, Clone)]
pub struct OllamaClient {
    host: String,
    chat_model: String,
    embed_model: String,
    timeout: Option<Duration>,
}

/// Some local installs bind 127.0.0.1 but not ::1, and `localhost` may
/// resolve to ::1 first, so the default stays on the IPv4 loopback.
pub fn normalize_ollama_host(host: &str) -> String {
    let mut host = host.trim().to_string();
    if host.is_empty() {
        host = "http://127.0.0.1:11434".to_string();
    }
    if !host.starts_with("http://") && !host.starts_with("https://") {
        host = format!("http://{host}");
    }
    host.trim_end_matches('/').to_string()
}

impl OllamaClient {
    pub fn new(host: &str, chat_model: &str, embed_model: &str) -> Self {
        Self {
            host: normalize_ollama_host(host),
            chat_model: chat_model.to_string(),
            embed_model: embed_model.to_string(),
            timeout: Some(Duration::from_secs(120)),
        }
    }

    /// `None` disables the timeout (wait forever).
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn client(&self) -> Result<reqwest::blocking::Client, LlmError> {
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|e| LlmError::InvalidResponse(format!("failed to build http client: {e}")))
    }

    fn chat(&self, system: Option<&str>, user: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.host);

        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": user }));

        let body = json!({
            "model": self.chat_model,
            "stream": false,
            "messages": messages,
            "options": { "temperature": 0 }
        });

        let resp = self
            .client()?
            .post(&url)
            .json(&body)
            .send()
            .map_err(|source| LlmError::Network { url: url.clone(), source })?;

        if !resp.status().is_success() {
            return Err(LlmError::Api {
                status: resp.status().as_u16(),
                body: resp.text().unwrap_or_default(),
            });
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            message: ChatMessage,
        }
        #[derive(Deserialize)]
        struct ChatMessage {
            content: String,
        }

        let out: ChatResponse = resp
            .json()
            .map_err(|e| LlmError::InvalidResponse(format!("/api/chat returned invalid JSON: {e}")))?;
        Ok(out.message.content)
    }

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let client = self.client()?;

        // Newer batched endpoint first.
        let url_embed = format!("{}/api/embed", self.host);
        let body = json!({
            "model": self.embed_model,
            "input": texts,
            "truncate": true
        });

        match client.post(&url_embed).json(&body).send() {
            Ok(resp) if resp.status().is_success() => {
                #[derive(Deserialize)]
                struct EmbedResp {
                    embeddings: Vec<Vec<f32>>,
                }
                let out: EmbedResp = resp.json().map_err(|e| {
                    LlmError::InvalidResponse(format!("/api/embed returned invalid JSON: {e}"))
                })?;
                if out.embeddings.len() != texts.len() {
                    return Err(LlmError::InvalidResponse(format!(
                        "/api/embed returned {} embeddings for {} inputs",
                        out.embeddings.len(),
                        texts.len()
                    )));
                }
                return Ok(out.embeddings);
            }
            // Non-success: older server; fall through to `/api/embeddings`.
            Ok(_) => {}
            Err(source) => return Err(LlmError::Network { url: url_embed, source }),
        }

        let url = format!("{}/api/embeddings", self.host);
        #[derive(Deserialize)]
        struct EmbeddingsResp {
            embedding: Vec<f32>,
        }

        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            let body = json!({ "model": self.embed_model, "prompt": text });
            let resp = client
                .post(&url)
                .json(&body)
                .send()
                .map_err(|source| LlmError::Network { url: url.clone(), source })?;
            if !resp.status().is_success() {
                return Err(LlmError::Api {
                    status: resp.status().as_u16(),
                    body: resp.text().unwrap_or_default(),
                });
            }
            let r: EmbeddingsResp = resp.json().map_err(|e| {
                LlmError::InvalidResponse(format!("/api/embeddings returned invalid JSON: {e}"))
            })?;
            out.push(r.embedding);
        }
        Ok(out)
    }
}

impl ChatModel for OllamaClient {
    fn complete(&self, system: Option<&str>, user: &str) -> Result<String, LlmError> {
        self.chat(system, user)
    }
}

impl Embedder for OllamaClient {
    fn identity(&self) -> EmbedderIdentity {
        EmbedderIdentity::new("ollama", self.embed_model.clone())
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(self.embed_texts(texts)?)
    }
}

// ============================================================================
// Scripted model for tests and offline runs
// ============================================================================

/// Replays a fixed script of responses and records every call it receives.
#[derive(Debug, Default)]
pub struct MockChatModel {
    responses: std::cell::RefCell<std::collections::VecDeque<String>>,
    calls: std::cell::RefCell<Vec<(Option<String>, String)>>,
}

impl MockChatModel {
    pub fn scripted(responses: &[&str]) -> Self {
        Self {
            responses: std::cell::RefCell::new(
                responses.iter().map(|s| s.to_string()).collect(),
            ),
            calls: std::cell::RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Option<String>, String)> {
        self.calls.borrow().clone()
    }
}

impl ChatModel for MockChatModel {
    fn complete(&self, system: Option<&str>, user: &str) -> Result<String, LlmError> {
        self.calls
            .borrow_mut()
            .push((system.map(|s| s.to_string()), user.to_string()));
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| LlmError::InvalidResponse("scripted responses exhausted".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_normalization() {
        assert_eq!(normalize_ollama_host(""), "http://127.0.0.1:11434");
        assert_eq!(normalize_ollama_host("localhost:11434"), "http://localhost:11434");
        assert_eq!(
            normalize_ollama_host("http://10.0.0.5:11434/"),
            "http://10.0.0.5:11434"
        );
        assert_eq!(
            normalize_ollama_host("https://ollama.internal"),
            "https://ollama.internal"
        );
    }

    #[test]
    fn mock_replays_script_and_records_calls() {
        let model = MockChatModel::scripted(&["first", "second"]);
        assert_eq!(model.complete(Some("sys"), "q1").unwrap(), "first");
        assert_eq!(model.complete(None, "q2").unwrap(), "second");
        assert!(model.complete(None, "q3").is_err());

        let calls = model.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], (Some("sys".to_string()), "q1".to_string()));
    }

    #[test]
    fn ollama_identity_names_the_embed_model() {
        let client = OllamaClient::new("", "llama3.2", "nomic-embed-text");
        let id = client.identity();
        assert_eq!(id.backend, "ollama");
        assert_eq!(id.model, "nomic-embed-text");
    }
}
