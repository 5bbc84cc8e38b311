//! LLM clients and the conversational front end for Catalore
//!
//! Three pieces: the [`ChatModel`] seam with its Ollama implementation, the
//! embedding backends (Ollama, plus a deterministic hash embedder for offline
//! runs), and the [`ChatSession`] that turns user questions into grounded
//! answers via rewrite, retrieval, and generation.

pub mod hash;
pub mod llm;
pub mod session;

pub use hash::HashEmbedder;
pub use llm::{normalize_ollama_host, ChatModel, LlmError, MockChatModel, OllamaClient};
pub use session::{ChatAnswer, ChatSession, ChatTurn, Role, NO_DATA_ANSWER};
