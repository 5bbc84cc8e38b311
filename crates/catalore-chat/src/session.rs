//! The conversational front end.
//!
//! A [`ChatSession`] owns one append-only turn log and nothing else; the
//! store, embedder, and chat model are borrowed per call so one process can
//! serve many sessions. Follow-up questions are rewritten into standalone
//! queries before retrieval, the rewritten form is used for retrieval only,
//! and history is appended strictly after a generated answer exists, so a
//! failed backend call or an empty retrieval never leaves a turn behind.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use catalore_store::{retrieve, Embedder, SearchHit, VectorStore};

use crate::llm::ChatModel;

/// Fixed response when retrieval comes back empty. Zero hits is a normal
/// outcome, not an error, costs no generation call, and records no history
/// turn.
pub const NO_DATA_ANSWER: &str = "No relevant catalog data found.";

const REWRITE_SYSTEM: &str = "Given a conversation and a follow-up question, \
rewrite the follow-up into a single standalone question that can be understood \
without the conversation. Do not answer it. Return only the rewritten question.";

const GROUNDING_SYSTEM: &str = "You are a product catalog assistant. Answer \
using only the catalog excerpts provided. Never invent products, prices, or \
specifications that are not in the excerpts. If the excerpts do not contain \
the answer, say you don't have enough information.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One message in a session, in call order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

/// An answer plus the retrieval hits it was grounded on.
#[derive(Debug, Clone)]
pub struct ChatAnswer {
    pub answer: String,
    pub sources: Vec<SearchHit>,
}

/// One conversation: an ordered turn log plus retrieval settings.
#[derive(Debug)]
pub struct ChatSession {
    history: Vec<ChatTurn>,
    top_k: usize,
    /// How many trailing turns the rewrite prompt sees. Bounded so long
    /// sessions do not grow the rewrite prompt without limit.
    rewrite_window: usize,
}

impl ChatSession {
    pub fn new(top_k: usize) -> Self {
        Self {
            history: Vec::new(),
            top_k,
            rewrite_window: 12,
        }
    }

    pub fn with_rewrite_window(mut self, turns: usize) -> Self {
        self.rewrite_window = turns;
        self
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    /// Answer one user question against the store.
    ///
    /// The first question of a session retrieves with its verbatim wording; a
    /// follow-up is first rewritten into a standalone question. Either way it
    /// is the original wording that lands in history.
    pub fn ask(
        &mut self,
        store: &VectorStore,
        embedder: &dyn Embedder,
        model: &dyn ChatModel,
        question: &str,
    ) -> Result<ChatAnswer> {
        let retrieval_query = if self.history.is_empty() {
            question.to_string()
        } else {
            self.rewrite_query(model, question)?
        };

        let sources = retrieve(store, embedder, &retrieval_query, self.top_k)?;
        if sources.is_empty() {
            // Not a conversation turn: history records only generated answers.
            tracing::debug!(query = %retrieval_query, "retrieval returned nothing");
            return Ok(ChatAnswer {
                answer: NO_DATA_ANSWER.to_string(),
                sources,
            });
        }

        let context = sources
            .iter()
            .map(|hit| hit.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let user = format!("Catalog excerpts:\n\n{context}\n\nQuestion: {question}");
        let answer = model.complete(Some(GROUNDING_SYSTEM), &user)?;

        self.append_turns(question, &answer);
        Ok(ChatAnswer { answer, sources })
    }

    fn rewrite_query(&self, model: &dyn ChatModel, question: &str) -> Result<String> {
        let start = self.history.len().saturating_sub(self.rewrite_window);
        let mut transcript = String::new();
        for turn in &self.history[start..] {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            transcript.push_str(role);
            transcript.push_str(": ");
            transcript.push_str(&turn.content);
            transcript.push('\n');
        }

        let user = format!("Conversation:\n{transcript}\nFollow-up question: {question}");
        let rewritten = model.complete(Some(REWRITE_SYSTEM), &user)?;
        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            // A model that returns nothing still leaves us the literal question.
            return Ok(question.to_string());
        }
        Ok(rewritten.to_string())
    }

    fn append_turns(&mut self, question: &str, answer: &str) {
        self.history.push(ChatTurn {
            role: Role::User,
            content: question.to_string(),
        });
        self.history.push(ChatTurn {
            role: Role::Assistant,
            content: answer.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashEmbedder;
    use crate::llm::MockChatModel;
    use catalore_ingest::ChunkMetadata;
    use catalore_store::{EmbedderIdentity, StoredRecord};
    use tempfile::TempDir;

    fn store_with(texts: &[(&str, &str)], embedder: &HashEmbedder, dir: &TempDir) -> VectorStore {
        let path = dir.path().join("store.cbor");
        let mut store = VectorStore::open_or_create(&path, embedder.identity()).unwrap();
        let inputs: Vec<String> = texts.iter().map(|(_, t)| t.to_string()).collect();
        let vectors = embedder.embed_batch(&inputs).unwrap();
        let records = texts
            .iter()
            .zip(vectors)
            .map(|((key, text), vector)| StoredRecord {
                key: key.to_string(),
                text: text.to_string(),
                vector,
                metadata: ChunkMetadata::default(),
            })
            .collect();
        store.upsert_batch(records).unwrap();
        store
    }

    fn empty_store(embedder: &HashEmbedder, dir: &TempDir) -> VectorStore {
        VectorStore::open_or_create(&dir.path().join("store.cbor"), embedder.identity()).unwrap()
    }

    #[test]
    fn first_question_skips_the_rewrite() {
        let dir = TempDir::new().unwrap();
        let embedder = HashEmbedder::new(64).unwrap();
        let store = store_with(&[("a", "led bulb 9W warm white ₹499")], &embedder, &dir);
        let model = MockChatModel::scripted(&["The LED bulb costs ₹499."]);

        let mut session = ChatSession::new(3);
        let answer = session
            .ask(&store, &embedder, &model, "how much is the led bulb?")
            .unwrap();

        assert_eq!(answer.answer, "The LED bulb costs ₹499.");
        assert_eq!(answer.sources.len(), 1);
        // Exactly one model call: the generation, no rewrite.
        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1.contains("led bulb 9W"));
    }

    #[test]
    fn follow_up_is_rewritten_but_history_keeps_original_wording() {
        let dir = TempDir::new().unwrap();
        let embedder = HashEmbedder::new(64).unwrap();
        let store = store_with(
            &[
                ("bulb", "led bulb 9W warm white ₹499"),
                ("tube", "tube light 20W cool daylight ₹299"),
            ],
            &embedder,
            &dir,
        );
        let model = MockChatModel::scripted(&[
            "first answer",
            "what is the price of the tube light?",
            "second answer",
        ]);

        let mut session = ChatSession::new(1);
        session
            .ask(&store, &embedder, &model, "tell me about the tube light")
            .unwrap();
        session
            .ask(&store, &embedder, &model, "and its price?")
            .unwrap();

        let calls = model.calls();
        assert_eq!(calls.len(), 3);
        // The rewrite call saw the prior exchange and the follow-up.
        assert!(calls[1].1.contains("user: tell me about the tube light"));
        assert!(calls[1].1.contains("Follow-up question: and its price?"));
        // History holds what the user typed, not the rewritten query.
        let history = session.history();
        assert_eq!(history.len(), 4);
        assert_eq!(history[2].content, "and its price?");
        assert_eq!(history[2].role, Role::User);
        assert_eq!(history[3].role, Role::Assistant);
    }

    #[test]
    fn empty_retrieval_short_circuits_without_generation() {
        let dir = TempDir::new().unwrap();
        let embedder = HashEmbedder::new(64).unwrap();
        let store = empty_store(&embedder, &dir);
        let model = MockChatModel::scripted(&[]);

        let mut session = ChatSession::new(3);
        let answer = session
            .ask(&store, &embedder, &model, "any water heaters?")
            .unwrap();

        assert_eq!(answer.answer, NO_DATA_ANSWER);
        assert!(answer.sources.is_empty());
        assert!(model.calls().is_empty());
        // A zero-hit question never becomes a conversation turn.
        assert!(session.history().is_empty());
    }

    #[test]
    fn failed_generation_leaves_history_untouched() {
        let dir = TempDir::new().unwrap();
        let embedder = HashEmbedder::new(64).unwrap();
        let store = store_with(&[("a", "led bulb 9W warm white ₹499")], &embedder, &dir);
        // Script is empty, so the generation call fails.
        let model = MockChatModel::scripted(&[]);

        let mut session = ChatSession::new(3);
        let err = session.ask(&store, &embedder, &model, "led bulb price?");
        assert!(err.is_err());
        assert!(session.history().is_empty());
    }

    #[test]
    fn history_alternates_user_assistant_across_cycles() {
        let dir = TempDir::new().unwrap();
        let embedder = HashEmbedder::new(64).unwrap();
        let store = store_with(&[("a", "led bulb 9W warm white ₹499")], &embedder, &dir);
        let model = MockChatModel::scripted(&["a1", "rewritten", "a2", "rewritten", "a3"]);

        let mut session = ChatSession::new(3);
        for q in ["q1", "q2", "q3"] {
            session.ask(&store, &embedder, &model, q).unwrap();
        }

        let history = session.history();
        assert_eq!(history.len(), 6);
        for (i, turn) in history.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            assert_eq!(turn.role, expected, "turn {i}");
        }
        assert_eq!(history[0].content, "q1");
        assert_eq!(history[5].content, "a3");
    }

    #[test]
    fn rewrite_window_bounds_the_transcript() {
        let dir = TempDir::new().unwrap();
        let embedder = HashEmbedder::new(64).unwrap();
        let store = store_with(&[("a", "led bulb 9W warm white ₹499")], &embedder, &dir);
        let model = MockChatModel::scripted(&["a1", "rewritten", "a2", "rewritten", "a3"]);

        let mut session = ChatSession::new(3).with_rewrite_window(2);
        session.ask(&store, &embedder, &model, "oldest question").unwrap();
        session.ask(&store, &embedder, &model, "newer question").unwrap();
        session.ask(&store, &embedder, &model, "latest question").unwrap();

        let calls = model.calls();
        // Last rewrite call sees only the trailing window.
        let last_rewrite = &calls[3].1;
        assert!(!last_rewrite.contains("oldest question"));
        assert!(last_rewrite.contains("newer question"));
    }

    #[test]
    fn blank_rewrite_falls_back_to_the_original_question() {
        let dir = TempDir::new().unwrap();
        let embedder = HashEmbedder::new(64).unwrap();
        let store = store_with(&[("a", "led bulb 9W warm white ₹499")], &embedder, &dir);
        let model = MockChatModel::scripted(&["a1", "   ", "a2"]);

        let mut session = ChatSession::new(3);
        session.ask(&store, &embedder, &model, "led bulb?").unwrap();
        let answer = session
            .ask(&store, &embedder, &model, "led bulb price?")
            .unwrap();
        assert_eq!(answer.answer, "a2");
    }

    #[test]
    fn foreign_store_identity_is_an_error() {
        let dir = TempDir::new().unwrap();
        let embedder = HashEmbedder::new(64).unwrap();
        let store = VectorStore::open_or_create(
            &dir.path().join("store.cbor"),
            EmbedderIdentity::new("ollama", "nomic-embed-text"),
        )
        .unwrap();
        let model = MockChatModel::scripted(&[]);

        let mut session = ChatSession::new(3);
        assert!(session.ask(&store, &embedder, &model, "hi").is_err());
        assert!(session.history().is_empty());
    }
}
