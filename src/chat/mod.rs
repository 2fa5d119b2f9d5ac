// Chat module
// Retrieval-augmented answering on top of the vector store


use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::embeddings::{Embedder, Generator};
use crate::index::{IndexError, SearchHit, VectorStore};
use crate::ingest::normalize::{contains_arabic, normalize};
use crate::{RagError, Result, run_blocking};

/// Returned instead of a generated answer that contains no Arabic text
pub const ARABIC_RETRY_MESSAGE: &str =
    "عذراً، يجب أن تكون الإجابة باللغة العربية. الرجاء إعادة السؤال.";

const EXCERPT_CHARS: usize = 200;

const PROMPT_TEMPLATE: &str = "أنت مساعد ذكي. أجب بإيجاز ووضوح.

السياق من قاعدة المعرفة:
{context}

السؤال الحالي: {question}

تعليمات مهمة:
١. استخدم المعلومات من المحادثات السابقة إذا كانت ذات صلة
٢. استخدم المعلومات من قاعدة المعرفة
٣. اربط بين المعلومات من المصدرين
٤. أجب باللغة العربية
٥. كن دقيقاً ومختصراً

الإجابة:";

/// One question and the answer that was given for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

/// Append-only history of one chat session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    #[inline]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Render the history as `Q: ...` / `A: ...` pairs, oldest first
    #[inline]
    pub fn history_text(&self) -> String {
        self.turns
            .iter()
            .map(|turn| format!("Q: {}\nA: {}", turn.question, turn.answer))
            .join("\n")
    }
}

/// Where an answer's supporting text came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRef {
    pub source: String,
    pub excerpt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SourceRef>,
}

/// Answer post-processing and retrieval width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatSettings {
    pub top_k: usize,
    pub require_arabic: bool,
    pub cite_sources: bool,
}

impl Default for ChatSettings {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: 20,
            require_arabic: true,
            cite_sources: true,
        }
    }
}

/// Question answering over the vector store with per-session history
pub struct RagService {
    store: Arc<RwLock<VectorStore>>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    settings: ChatSettings,
    conversation: RwLock<ConversationState>,
}

impl RagService {
    #[inline]
    pub fn new(
        store: Arc<RwLock<VectorStore>>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        settings: ChatSettings,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            settings,
            conversation: RwLock::new(ConversationState::new()),
        }
    }

    #[inline]
    pub const fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// Find the `k` chunks most similar to `query`.
    ///
    /// The query is normalized like the corpus before it is embedded. An empty
    /// index yields no hits rather than an error.
    #[inline]
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let embedder = Arc::clone(&self.embedder);
        let normalized = normalize(query.trim());
        let vector = run_blocking(move || {
            embedder
                .embed(&normalized)
                .map_err(|e| RagError::Collaborator(format!("Embedding failed: {e:#}")))
        })
        .await?;

        let store = Arc::clone(&self.store).read_owned().await;
        let result = run_blocking(move || Ok(store.search(&vector, k))).await?;
        match result {
            Ok(hits) => {
                debug!("Retrieved {} chunks for query", hits.len());
                Ok(hits)
            }
            Err(IndexError::EmptyIndex) => {
                warn!("Vector store is empty, no context available");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Answer `question` from the retrieved context and the session history
    #[inline]
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let hits = self.retrieve(question, self.settings.top_k).await?;
        let context = hits.iter().map(|hit| hit.entry.chunk.text()).join("\n\n");
        let prompt = render_prompt(&context, question.trim());
        let history = self.conversation.read().await.turns().to_vec();

        let generator = Arc::clone(&self.generator);
        let raw = run_blocking(move || {
            generator
                .generate(&prompt, &history)
                .map_err(|e| RagError::Collaborator(format!("Generation failed: {e:#}")))
        })
        .await?;
        let answer = raw.trim();

        if self.settings.require_arabic && !contains_arabic(answer) {
            warn!("Generated answer contains no Arabic text, asking for a retry");
            return Ok(Answer {
                text: ARABIC_RETRY_MESSAGE.to_string(),
                sources: Vec::new(),
            });
        }

        let top = hits.first();
        let text = match top {
            Some(hit) if self.settings.cite_sources => format!(
                "{answer}\n\n---\n\nSource: {}",
                hit.entry.chunk.source_document_id()
            ),
            _ => answer.to_string(),
        };
        let sources = top
            .map(|hit| SourceRef {
                source: hit.entry.chunk.source_document_id().to_string(),
                excerpt: excerpt(hit.entry.chunk.text()),
            })
            .into_iter()
            .collect();

        self.conversation.write().await.push(Turn {
            question: question.trim().to_string(),
            answer: text.clone(),
        });
        info!("Answered question using {} retrieved chunks", hits.len());

        Ok(Answer { text, sources })
    }

    /// Snapshot of the turns recorded so far
    #[inline]
    pub async fn conversation(&self) -> ConversationState {
        self.conversation.read().await.clone()
    }

    #[inline]
    pub async fn reset_conversation(&self) {
        *self.conversation.write().await = ConversationState::new();
        debug!("Conversation history cleared");
    }
}

/// Fill the template placeholders in order, so substituted text is never rescanned
fn render_prompt(context: &str, question: &str) -> String {
    let mut prompt =
        String::with_capacity(PROMPT_TEMPLATE.len() + context.len() + question.len());
    let mut rest = PROMPT_TEMPLATE;
    for (placeholder, value) in [("{context}", context), ("{question}", question)] {
        if let Some((head, tail)) = rest.split_once(placeholder) {
            prompt.push_str(head);
            prompt.push_str(value);
            rest = tail;
        }
    }
    prompt.push_str(rest);
    prompt
}

fn excerpt(text: &str) -> String {
    match text.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => text.get(..cut).map_or_else(String::new, |head| format!("{head}...")),
        None => text.to_string(),
    }
}
