//! Retrieval-augmented chat session.
//!
//! A turn embeds the question, ranks the candidate chunks and asks the model to
//! answer from the best passages. When there is nothing to ground on (no chunks,
//! no query vector, no passages) the turn is answered without context and the
//! reply records why. Model failures come back as inline `[Error]` replies, so
//! every turn produces a reply.

use crate::embeddings::Embedder;
use crate::llm::LlmClient;
use crate::models::{ChatMessage, ChatOptions, Chunk, RetrievalResult};
use crate::search::search_similar_chunks;
use crate::traits::ChunkStore;
use tracing::{info, warn};

/// Prior turns replayed into each request (two exchanges).
pub const HISTORY_WINDOW: usize = 4;
pub const DEFAULT_TOP_K: usize = 5;
pub const EXPLAIN_TEMPERATURE: f32 = 0.5;
pub const DEFAULT_TARGET_LANGUAGE: &str = "zh-CN";

const ASSISTANT_ROLE: &str = "You are PaperMiner AI, an academic research assistant.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatScope {
    Paper,
    Library,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UngroundedReason {
    NotIndexed(ChatScope),
    EmbeddingFailed,
    NoRelevantPassages,
    FreeChat,
}

impl UngroundedReason {
    pub fn note(&self) -> &'static str {
        match self {
            Self::NotIndexed(ChatScope::Paper) => "(This paper has not been indexed for RAG yet.)",
            Self::NotIndexed(ChatScope::Library) => {
                "(No papers have been indexed in the library yet.)"
            }
            Self::EmbeddingFailed => "(Embedding generation failed, answering without context.)",
            Self::NoRelevantPassages => "(No relevant passages found in the paper(s).)",
            Self::FreeChat => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Grounding {
    Grounded { passages: Vec<RetrievalResult> },
    Ungrounded { reason: UngroundedReason },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub text: String,
    pub grounding: Grounding,
}

pub struct ChatSession<E, L, S> {
    embedder: E,
    llm: L,
    store: S,
    top_k: usize,
    history: Vec<ChatMessage>,
}

impl<E, L, S> ChatSession<E, L, S>
where
    E: Embedder,
    L: LlmClient,
    S: ChunkStore,
{
    pub fn new(embedder: E, llm: L, store: S) -> Self {
        Self {
            embedder,
            llm,
            store,
            top_k: DEFAULT_TOP_K,
            history: Vec::new(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Every user and assistant turn since the last [`Self::clear_history`].
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub async fn chat_with_paper(&mut self, paper_id: &str, message: &str) -> ChatReply {
        let chunks = match self.store.chunks_for_paper(paper_id).await {
            Ok(chunks) => chunks,
            Err(error) => {
                warn!(paper_id, %error, "could not load paper chunks");
                Vec::new()
            }
        };
        self.chat_with_chunks(message, &chunks, ChatScope::Paper).await
    }

    pub async fn chat_with_library(&mut self, message: &str) -> ChatReply {
        let chunks = match self.store.all_chunks().await {
            Ok(chunks) => chunks,
            Err(error) => {
                warn!(%error, "could not load library chunks");
                Vec::new()
            }
        };
        self.chat_with_chunks(message, &chunks, ChatScope::Library).await
    }

    /// One grounded turn over a caller-chosen candidate set.
    pub async fn chat_with_chunks(
        &mut self,
        message: &str,
        chunks: &[Chunk],
        scope: ChatScope,
    ) -> ChatReply {
        if chunks.is_empty() {
            return self
                .ungrounded_chat(message, UngroundedReason::NotIndexed(scope))
                .await;
        }

        let query = self
            .embedder
            .embed(&[message.to_string()])
            .await
            .into_iter()
            .next()
            .unwrap_or_default();
        if query.is_empty() {
            return self
                .ungrounded_chat(message, UngroundedReason::EmbeddingFailed)
                .await;
        }

        let passages = search_similar_chunks(&query, chunks, self.top_k);
        if passages.is_empty() {
            return self
                .ungrounded_chat(message, UngroundedReason::NoRelevantPassages)
                .await;
        }

        info!(?scope, candidates = chunks.len(), passages = passages.len(), "answering with retrieved context");
        let mut messages = vec![ChatMessage::system(grounded_system_prompt())];
        messages.extend(self.recent_history());
        messages.push(ChatMessage::user(grounded_user_prompt(&passages, message)));

        let text = self.complete(&messages, ChatOptions::default()).await;
        self.remember(message, &text);

        ChatReply {
            text,
            grounding: Grounding::Grounded { passages },
        }
    }

    /// Chat without retrieval.
    pub async fn free_chat(&mut self, message: &str) -> ChatReply {
        self.ungrounded_chat(message, UngroundedReason::FreeChat).await
    }

    /// Explains a passage. Ignores and does not record history.
    pub async fn explain_text(&self, text: &str) -> String {
        let messages = [
            ChatMessage::system(
                "You are an expert academic research assistant. \
                 Explain the following text clearly and concisely. \
                 If it contains technical terms, formulas, or jargon, break them down. \
                 Respond in the same language as the input text.",
            ),
            ChatMessage::user(format!("Please explain this:\n\n{text}")),
        ];
        self.complete(&messages, ChatOptions::with_temperature(EXPLAIN_TEMPERATURE))
            .await
    }

    /// Translates a passage. Ignores and does not record history.
    pub async fn translate_text(&self, text: &str, target_lang: &str) -> String {
        match self.llm.translate(text, target_lang).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(%error, target_lang, "translation failed");
                error.to_reply()
            }
        }
    }

    async fn ungrounded_chat(&mut self, message: &str, reason: UngroundedReason) -> ChatReply {
        if reason != UngroundedReason::FreeChat {
            info!(?reason, "answering without retrieved context");
        }

        let mut messages = vec![ChatMessage::system(plain_system_prompt(reason.note()))];
        messages.extend(self.recent_history());
        messages.push(ChatMessage::user(message));

        let text = self.complete(&messages, ChatOptions::default()).await;
        self.remember(message, &text);

        ChatReply {
            text,
            grounding: Grounding::Ungrounded { reason },
        }
    }

    fn recent_history(&self) -> Vec<ChatMessage> {
        let start = self.history.len().saturating_sub(HISTORY_WINDOW);
        self.history[start..].to_vec()
    }

    fn remember(&mut self, message: &str, reply: &str) {
        self.history.push(ChatMessage::user(message));
        self.history.push(ChatMessage::assistant(reply));
    }

    async fn complete(&self, messages: &[ChatMessage], options: ChatOptions) -> String {
        match self.llm.chat(messages, options).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(%error, "language model call failed");
                error.to_reply()
            }
        }
    }
}

fn grounded_system_prompt() -> String {
    format!(
        "{ASSISTANT_ROLE} \
         Answer the user's question based on the following passages from their research papers. \
         Cite passage numbers [Passage N] when referencing specific content. \
         If the passages don't contain enough information to answer, say so honestly. \
         Maintain academic rigor and precision."
    )
}

fn plain_system_prompt(note: &str) -> String {
    let prompt = format!("{ASSISTANT_ROLE} Help the user with their research questions. {note}");
    prompt.trim_end().to_string()
}

fn grounded_user_prompt(passages: &[RetrievalResult], question: &str) -> String {
    let context = passages
        .iter()
        .enumerate()
        .map(|(position, hit)| {
            format!(
                "[Passage {}] (Page {}, Relevance: {:.2})\n{}",
                position + 1,
                hit.chunk.page_start,
                hit.score,
                hit.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("## Retrieved Context:\n\n{context}\n\n## Question:\n{question}")
}
