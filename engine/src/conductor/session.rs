//! Per-conversation state carried across turns

use crate::conductor::approval::ApprovalRecord;
use crate::conductor::types::{ExecutionPlan, ExecutionReport, ExtractedTask};
use crate::context::ContextStore;
use crate::llm::Message;

#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: String,

    /// Full message history, oldest first
    pub history: Vec<Message>,

    /// Long-lived facts about the user the extractor may draw on
    pub memory: Vec<String>,

    pub task: Option<ExtractedTask>,
    pub active_capabilities: Vec<String>,
    pub plan: Option<ExecutionPlan>,
    pub step_index: usize,
    pub store: ContextStore,
    pub pending: Option<ApprovalRecord>,
    pub response: Option<String>,

    /// Trace of the last executor run
    pub last_report: Option<ExecutionReport>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            history: Vec::new(),
            memory: Vec::new(),
            task: None,
            active_capabilities: Vec::new(),
            plan: None,
            step_index: 0,
            store: ContextStore::new(),
            pending: None,
            response: None,
            last_report: None,
        }
    }

    /// Session with a random id
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.history.push(Message::user(content));
    }

    pub fn add_assistant_message(&mut self, content: impl Into<String>) {
        self.history.push(Message::assistant(content));
    }

    pub fn remember(&mut self, fact: impl Into<String>) {
        self.memory.push(fact.into());
    }

    /// Clear per-turn fields; history, memory and the context store survive
    pub fn reset_turn(&mut self) {
        self.task = None;
        self.active_capabilities.clear();
        self.plan = None;
        self.step_index = 0;
        self.response = None;
        self.pending = None;
        self.last_report = None;
    }
}
