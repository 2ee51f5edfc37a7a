//! Shared fixtures for conductor integration tests
//!
//! `ScriptedCompleter` answers every completion role deterministically; the
//! capabilities below record how and when the executor calls them.

#![allow(dead_code)]

use async_trait::async_trait;
use cadence_engine::capabilities::CapabilityRegistry;
use cadence_engine::conductor::{Conductor, PlanStore};
use cadence_engine::config::OrchestrationConfig;
use cadence_engine::llm::{Completer, CompletionRequest, CompletionRole, LLMError};
use sdk::capability::{AvailableContext, Capability, CapabilityError, CapabilityOutcome};
use sdk::context::JsonPayload;
use sdk::types::RetryPolicy;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub struct ScriptedCompleter {
    task: String,
    matching: Vec<String>,
    plans: Mutex<VecDeque<Value>>,
    approve: bool,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompleter {
    pub fn new(task: &str) -> Self {
        Self {
            task: task.to_string(),
            matching: Vec::new(),
            plans: Mutex::new(VecDeque::new()),
            approve: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Capabilities the classifier should report as matching
    pub fn matching(mut self, names: &[&str]) -> Self {
        self.matching = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Queue an orchestrator reply; replies are handed out in order
    pub fn plan(self, plan: Value) -> Self {
        self.plans.lock().unwrap().push_back(plan);
        self
    }

    pub fn approving(mut self, approve: bool) -> Self {
        self.approve = approve;
        self
    }

    pub fn calls_for(&self, role: CompletionRole) -> Vec<CompletionRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.role == role)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Completer for ScriptedCompleter {
    async fn complete(&self, request: CompletionRequest) -> Result<Value, LLMError> {
        self.calls.lock().unwrap().push(request.clone());

        match request.role {
            CompletionRole::TaskExtractor => Ok(json!({
                "task": self.task,
                "depends_on_history": false,
                "depends_on_memory": false
            })),
            CompletionRole::Classifier => {
                let name = request.instructions.split('\'').nth(1).unwrap_or_default();
                Ok(json!({ "is_match": self.matching.iter().any(|m| m == name) }))
            }
            CompletionRole::Orchestrator => self
                .plans
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LLMError::Unknown("no scripted plan left".to_string())),
            CompletionRole::ApprovalClassifier => Ok(json!({ "approved": self.approve })),
            CompletionRole::Responder => Ok(json!({
                "response": format!("Answer from context: {}", request.input)
            })),
        }
    }
}

/// Non-terminal capability returning a fixed payload
pub struct FixedCapability {
    name: &'static str,
    output_type: &'static str,
    output: Value,
    pub calls: AtomicU32,

    /// Invocation log shared between capabilities: (name, input keys seen)
    log: Arc<Mutex<Vec<(String, Vec<String>)>>>,
}

impl FixedCapability {
    pub fn new(
        name: &'static str,
        output_type: &'static str,
        output: Value,
        log: Arc<Mutex<Vec<(String, Vec<String>)>>>,
    ) -> Self {
        Self {
            name,
            output_type,
            output,
            calls: AtomicU32::new(0),
            log,
        }
    }
}

#[async_trait]
impl Capability for FixedCapability {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.name
    }

    fn provides(&self) -> Vec<String> {
        vec![self.output_type.to_string()]
    }

    async fn execute(
        &self,
        _task_objective: &str,
        context: &AvailableContext,
    ) -> Result<CapabilityOutcome, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let seen = context.entries.iter().map(|e| e.key.clone()).collect();
        self.log.lock().unwrap().push((self.name.to_string(), seen));
        Ok(CapabilityOutcome::completed(JsonPayload::new(
            self.output_type,
            self.output.clone(),
        )))
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::no_retry()
    }
}

/// Capability whose every call times out
pub struct TimingOut {
    pub calls: AtomicU32,
}

impl TimingOut {
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Capability for TimingOut {
    fn name(&self) -> &str {
        "stock_quote"
    }

    fn description(&self) -> &str {
        "Fetches a stock quote"
    }

    fn provides(&self) -> Vec<String> {
        vec!["STOCK_QUOTE".to_string()]
    }

    async fn execute(
        &self,
        _task_objective: &str,
        _context: &AvailableContext,
    ) -> Result<CapabilityOutcome, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CapabilityError::Timeout("quote service did not answer".to_string()))
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::immediate(3)
    }
}

/// Sends an email, but only once a human approved it
pub struct SendEmail {
    pub calls: AtomicU32,
    pub approved_flags: Mutex<Vec<bool>>,
}

impl SendEmail {
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
            approved_flags: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Capability for SendEmail {
    fn name(&self) -> &str {
        "send_email"
    }

    fn description(&self) -> &str {
        "Sends an email"
    }

    fn provides(&self) -> Vec<String> {
        vec!["EMAIL_RECEIPT".to_string()]
    }

    async fn execute(
        &self,
        _task_objective: &str,
        context: &AvailableContext,
    ) -> Result<CapabilityOutcome, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.approved_flags.lock().unwrap().push(context.approved);

        if !context.approved {
            let draft = context.require("EMAIL_DRAFT", "draft")?;
            return Ok(CapabilityOutcome::approval_required(format!(
                "Send email to {}",
                draft.payload["to"].as_str().unwrap_or("unknown")
            )));
        }

        Ok(CapabilityOutcome::completed(JsonPayload::new(
            "EMAIL_RECEIPT",
            json!({ "status": "sent" }),
        )))
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::no_retry()
    }
}

pub fn shared_log() -> Arc<Mutex<Vec<(String, Vec<String>)>>> {
    Arc::new(Mutex::new(Vec::new()))
}

/// Registry with the built-ins plus `extra`, all answering through `completer`
pub fn registry(
    completer: Arc<ScriptedCompleter>,
    extra: Vec<Arc<dyn Capability>>,
) -> Arc<CapabilityRegistry> {
    let mut registry = CapabilityRegistry::new();
    for capability in extra {
        registry.register(capability).unwrap();
    }
    let builtins = CapabilityRegistry::with_builtins(completer, RetryPolicy::no_retry()).unwrap();
    for capability in builtins.iter() {
        registry.register(Arc::clone(capability)).unwrap();
    }
    Arc::new(registry)
}

pub fn conductor(
    completer: Arc<ScriptedCompleter>,
    extra: Vec<Arc<dyn Capability>>,
    plans: Arc<dyn PlanStore>,
    config: OrchestrationConfig,
) -> Conductor {
    let registry = registry(Arc::clone(&completer), extra);
    Conductor::new(registry, completer, plans, config)
}
