//! Caller-facing surface
//!
//! `Assistant` is what the CLI and the HTTP API talk to. It always answers
//! with a string: either generated text or a labeled error. It also keeps
//! the tagged conversation for the current session.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::{LifecycleError, QueryError};
use crate::index::SearchHit;
use crate::lifecycle::KnowledgeBaseManager;
use crate::provider::Providers;
use crate::query::{QueryEngine, ERROR_PREFIX};
use crate::storage::LockError;
use crate::types::{BuildSummary, LifecycleState, Turn};

pub const EMPTY_QUESTION: &str = "Error: please enter a question";

/// An answer plus the chunks it was grounded on
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub answer: String,
    pub sources: Vec<SearchHit>,
    pub is_error: bool,
}

impl Reply {
    fn error(message: impl std::fmt::Display) -> Self {
        Self {
            answer: format!("{ERROR_PREFIX}{message}"),
            sources: Vec::new(),
            is_error: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub state: &'static str,
    /// Failure reason when `state` is Failed
    pub reason: Option<String>,
    pub documents: usize,
    pub entries: usize,
    pub embedding_model: String,
    pub generation_model: String,
    pub endpoint: String,
    pub index_path: PathBuf,
    pub indexed_at: Option<DateTime<Utc>>,
    pub conversation_id: u64,
    pub turns: usize,
    pub last_build: Option<BuildSummary>,
}

/// A rendered conversation ready to be saved
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub file_name: String,
    pub contents: String,
}

impl Transcript {
    pub fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.contents)?;
        Ok(path)
    }
}

#[derive(Debug)]
struct Conversation {
    id: u64,
    /// Bumped whenever the turns are reset
    generation: u64,
    turns: Vec<Turn>,
}

pub struct Assistant {
    knowledge_base: KnowledgeBaseManager,
    engine: QueryEngine,
    providers: Providers,
    conversation: Mutex<Conversation>,
}

impl Assistant {
    /// Takes the index directory lock; the knowledge base starts Absent.
    pub fn new(config: &AppConfig, providers: Providers) -> Result<Self, LockError> {
        let knowledge_base = KnowledgeBaseManager::open(config, Arc::clone(&providers.embedder))?;
        let engine = QueryEngine::new(
            knowledge_base.handle(),
            Arc::clone(&providers.embedder),
            Arc::clone(&providers.generator),
            config.query.top_k,
        );

        Ok(Self {
            knowledge_base,
            engine,
            providers,
            conversation: Mutex::new(Conversation {
                id: 1,
                generation: 0,
                turns: Vec::new(),
            }),
        })
    }

    pub fn knowledge_base(&self) -> &KnowledgeBaseManager {
        &self.knowledge_base
    }

    /// Load or build the knowledge base now rather than on first question.
    pub async fn initialize(&self) -> Result<(), LifecycleError> {
        self.knowledge_base.initialize().await
    }

    /// Answer a question. Never fails: errors come back as labeled strings.
    pub async fn submit(&self, question: &str) -> String {
        self.ask(question).await.answer
    }

    /// `submit`, keeping the retrieved sources.
    pub async fn ask(&self, question: &str) -> Reply {
        let question = question.trim();
        if question.is_empty() {
            return Reply {
                answer: EMPTY_QUESTION.to_string(),
                sources: Vec::new(),
                is_error: true,
            };
        }

        let asked_in = {
            let mut conversation = self.conversation.lock().await;
            conversation.turns.push(Turn::user(question));
            conversation.generation
        };

        let reply = match self.answer(question).await {
            Ok(reply) => reply,
            Err(e) => Reply::error(e),
        };

        let mut conversation = self.conversation.lock().await;
        if conversation.generation == asked_in {
            conversation.turns.push(Turn::assistant(reply.answer.clone()));
        } else {
            debug!(
                conversation_id = conversation.id,
                "Conversation reset while answering, reply not recorded"
            );
        }
        reply
    }

    async fn answer(&self, question: &str) -> Result<Reply, QueryError> {
        self.knowledge_base.ensure_initialized().await?;
        let answer = self.engine.query(question).await?;
        Ok(Reply {
            answer: answer.text,
            sources: answer.sources,
            is_error: answer.is_error,
        })
    }

    /// Clear the persisted index and in-memory state; rebuilt on next question.
    pub async fn reinitialize(&self) -> Result<(), LifecycleError> {
        self.knowledge_base.reinitialize().await
    }

    /// Discard the persisted index and re-ingest the corpus immediately.
    pub async fn update_knowledge_base(&self) -> Result<Arc<BuildSummary>, LifecycleError> {
        self.knowledge_base.update_knowledge_base().await
    }

    pub async fn status(&self) -> Status {
        let handle = self.knowledge_base.handle();
        let state = handle.state();
        let index = handle.index();
        let conversation = self.conversation.lock().await;

        Status {
            state: state.name(),
            reason: match state {
                LifecycleState::Failed(reason) => Some(reason),
                _ => None,
            },
            documents: index.as_ref().map_or(0, |i| i.document_count()),
            entries: index.as_ref().map_or(0, |i| i.len()),
            embedding_model: self.providers.embedder.model_id().to_string(),
            generation_model: self.providers.generator.model_id().to_string(),
            endpoint: self.providers.embedder.endpoint().to_string(),
            index_path: self.knowledge_base.index_dir().to_path_buf(),
            indexed_at: index.as_ref().map(|i| i.created_at()),
            conversation_id: conversation.id,
            turns: conversation.turns.len(),
            last_build: handle.last_build().map(|b| BuildSummary::clone(&b)),
        }
    }

    /// Start a new conversation; returns its id.
    pub async fn new_conversation(&self) -> u64 {
        let mut conversation = self.conversation.lock().await;
        conversation.id += 1;
        conversation.generation += 1;
        conversation.turns.clear();
        info!(conversation_id = conversation.id, "New conversation");
        conversation.id
    }

    pub async fn clear_conversation(&self) {
        let mut conversation = self.conversation.lock().await;
        conversation.generation += 1;
        conversation.turns.clear();
        info!(conversation_id = conversation.id, "Conversation cleared");
    }

    pub async fn turns(&self) -> Vec<Turn> {
        self.conversation.lock().await.turns.clone()
    }

    /// Render the current conversation as `chat_history_{id}_{YYYYmmdd_HHMMSS}.txt`.
    pub async fn export_conversation(&self) -> Transcript {
        let conversation = self.conversation.lock().await;
        let now = Local::now();

        let mut contents = format!(
            "Conversation {}\nExported {}\n",
            conversation.id,
            now.format("%Y-%m-%d %H:%M:%S")
        );
        for turn in &conversation.turns {
            contents.push_str(&format!(
                "\n[{}] {}: {}\n",
                turn.at.with_timezone(&Local).format("%H:%M:%S"),
                turn.role.label(),
                turn.text
            ));
        }

        Transcript {
            file_name: format!(
                "chat_history_{}_{}.txt",
                conversation.id,
                now.format("%Y%m%d_%H%M%S")
            ),
            contents,
        }
    }
}
