//! Command handlers for CLI operations
//!
//! - run: one conversational turn
//! - approve: answer a pending approval
//! - pending: list suspended plans
//! - capabilities: list the registry
//! - doctor: validate configuration and check dependencies

use anyhow::{Context, Result};
use sdk::capability::Capability;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::capabilities::CapabilityRegistry;
use crate::conductor::{
    ApprovalRecord, Conductor, PlanHandle, PlanStore, SessionState, TurnCancellation,
    TurnOptions, TurnOutcome,
};
use crate::config::Config;
use crate::db::Database;
use crate::llm::ollama::OllamaProvider;
use crate::llm::{Completer, LLMProvider, ProviderCompleter};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

fn ollama(config: &Config) -> Result<OllamaProvider> {
    OllamaProvider::new(
        config.llm.ollama.base_url.clone(),
        config.llm.ollama.model.clone(),
        Duration::from_secs(config.llm.request_timeout_secs),
    )
    .context("Failed to create Ollama provider")
}

fn registry(config: &Config, completer: Arc<dyn Completer>) -> Result<CapabilityRegistry> {
    CapabilityRegistry::with_builtins(completer, config.retry.clone())
        .context("Failed to register built-in capabilities")
}

/// Wire the conductor to the configured backend and database
async fn open_conductor(config: &Config) -> Result<(Database, Conductor)> {
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;

    let provider: Arc<dyn LLMProvider> = Arc::new(ollama(config)?);
    let completer: Arc<dyn Completer> = Arc::new(ProviderCompleter::new(provider));
    let registry = Arc::new(registry(config, Arc::clone(&completer))?);
    let plans: Arc<dyn PlanStore> = Arc::new(database.plans());

    let conductor = Conductor::new(registry, completer, plans, config.orchestration.clone());
    Ok((database, conductor))
}

/// Cancellation tripped by Ctrl-C
fn cancel_on_interrupt() -> TurnCancellation {
    let cancel = TurnCancellation::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling turn");
            trigger.cancel();
        }
    });
    cancel
}

/// Run one turn
pub async fn handle_run(
    message: String,
    session: Option<String>,
    options: TurnOptions,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let (database, conductor) = open_conductor(config).await?;

    let mut session = match session {
        Some(id) => SessionState::new(id),
        None => SessionState::generate(),
    };
    let cancel = cancel_on_interrupt();

    let outcome = conductor
        .handle_turn(&mut session, &message, options, &cancel)
        .await;
    print_outcome(&session.session_id, &outcome, format)?;

    database.close().await?;
    exit_status(&outcome)
}

/// Answer a pending approval with a free-text reply
pub async fn handle_approve(
    handle: String,
    reply: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let (database, conductor) = open_conductor(config).await?;
    let handle = PlanHandle::from(handle);

    let pending = database
        .plans()
        .get(&handle)
        .await?
        .with_context(|| format!("No pending plan with handle {}", handle))?;

    let mut session = SessionState::new(pending.record.session_id);
    let cancel = cancel_on_interrupt();

    let outcome = conductor.resume(&mut session, &handle, &reply, &cancel).await;
    print_outcome(&session.session_id, &outcome, format)?;

    database.close().await?;
    exit_status(&outcome)
}

/// List plans waiting for approval
pub async fn handle_pending(config: &Config, format: OutputFormat) -> Result<()> {
    let (database, conductor) = open_conductor(config).await?;
    let records = conductor.list_pending().await?;

    match format {
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No plans are waiting for approval.");
            } else {
                println!("Pending approvals ({}):", records.len());
                println!();
                for record in &records {
                    print_record(record);
                    println!();
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }

    database.close().await?;
    Ok(())
}

/// List registered capabilities
pub async fn handle_capabilities(config: &Config, format: OutputFormat) -> Result<()> {
    let provider: Arc<dyn LLMProvider> = Arc::new(ollama(config)?);
    let registry = registry(config, Arc::new(ProviderCompleter::new(provider)))?;

    match format {
        OutputFormat::Text => {
            println!("Registered capabilities ({}):", registry.len());
            println!();
            for capability in registry.iter() {
                println!("  {}{}", capability.name(), capability_flags(capability.as_ref()));
                println!("    {}", capability.description());
                let provides = capability.provides();
                if !provides.is_empty() {
                    println!("    provides: {}", provides.join(", "));
                }
            }
        }
        OutputFormat::Json => {
            let output: Vec<_> = registry
                .iter()
                .map(|c| {
                    json!({
                        "name": c.name(),
                        "description": c.description(),
                        "provides": c.provides(),
                        "requires": c.requires(),
                        "terminal": c.is_terminal(),
                        "always_active": c.always_active(),
                        "max_attempts": c.retry_policy().max_attempts,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn capability_flags(capability: &dyn Capability) -> String {
    let mut flags = Vec::new();
    if capability.is_terminal() {
        flags.push("terminal");
    }
    if capability.always_active() {
        flags.push("always active");
    }
    if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(", "))
    }
}

/// Validate configuration and check dependencies
pub async fn handle_doctor(config: &Config, format: OutputFormat) -> Result<()> {
    let mut issues = Vec::new();
    let mut checks = Vec::new();

    // Config was validated when loaded
    checks.push(("Configuration", "Valid"));

    if config.core.data_dir.exists() {
        checks.push(("Data directory", "Exists"));
    } else {
        checks.push(("Data directory", "Missing"));
        issues.push(format!(
            "Data directory does not exist: {}",
            config.core.data_dir.display()
        ));
    }

    match Database::new(&config.database_path()).await {
        Ok(database) => {
            checks.push(("Database connection", "OK"));
            match database.plans().records().await {
                Ok(records) if records.is_empty() => checks.push(("Pending approvals", "None")),
                Ok(_) => checks.push(("Pending approvals", "Waiting")),
                Err(e) => {
                    checks.push(("Pending approvals", "Unreadable"));
                    issues.push(format!("Cannot read pending plans: {}", e));
                }
            }
            database.close().await?;
        }
        Err(e) => {
            checks.push(("Database connection", "Failed"));
            issues.push(format!("Cannot open database: {:#}", e));
        }
    }

    match ollama(config) {
        Ok(provider) if provider.check_health().await => checks.push(("Ollama", "Available")),
        Ok(_) => {
            checks.push(("Ollama", "Not available"));
            issues.push(format!(
                "Ollama is not reachable at {}. Start Ollama to run turns.",
                config.llm.ollama.base_url
            ));
        }
        Err(e) => {
            checks.push(("Ollama", "Misconfigured"));
            issues.push(format!("{:#}", e));
        }
    }

    match format {
        OutputFormat::Text => {
            println!("Cadence Diagnostics");
            println!("===================");
            println!();

            for (check, status) in &checks {
                println!("  {:<25} {}", format!("{}:", check), status);
            }

            println!();

            if issues.is_empty() {
                println!("✓ All checks passed!");
            } else {
                println!("⚠ Issues found:");
                println!();
                for (i, issue) in issues.iter().enumerate() {
                    println!("  {}. {}", i + 1, issue);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "checks": checks.iter().map(|(name, status)| {
                    json!({
                        "name": name,
                        "status": status
                    })
                }).collect::<Vec<_>>(),
                "issues": issues,
                "healthy": issues.is_empty()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn print_record(record: &ApprovalRecord) {
    println!("  Handle:     {}", record.handle);
    println!("  Session:    {}", record.session_id);
    println!("  Requested:  {} ({})", record.capability, record.kind.as_str());
    println!("  Step:       {}", record.step_index);
    println!("  Action:     {}", record.description);
}

fn print_outcome(session_id: &str, outcome: &TurnOutcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let mut output = serde_json::to_value(outcome)?;
            if let Some(map) = output.as_object_mut() {
                map.insert("session_id".to_string(), json!(session_id));
            }
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => match outcome {
            TurnOutcome::Completed { response } => {
                println!("{}", response);
            }
            TurnOutcome::AwaitingApproval(record) => {
                println!("⏸ Approval required");
                println!();
                print_record(record);
                println!();
                println!("Reply with: cadence approve {} \"<your answer>\"", record.handle);
            }
            TurnOutcome::Rejected { message } => {
                println!("✗ {}", message);
            }
            TurnOutcome::Failed(report) => {
                println!("✗ Turn failed: {}", report.message);
                if let Some(step) = &report.step {
                    println!("  Step:       {}", step);
                }
                if let Some(capability) = &report.capability {
                    println!("  Capability: {}", capability);
                }
                if let Some(attempts) = report.attempts {
                    println!("  Attempts:   {}", attempts);
                }
                println!("  Hint:       {}", report.hint);
            }
            TurnOutcome::Cancelled => {
                println!("Turn cancelled.");
            }
        },
    }
    Ok(())
}

fn exit_status(outcome: &TurnOutcome) -> Result<()> {
    match outcome {
        TurnOutcome::Failed(report) => Err(anyhow::anyhow!("{}", report.message)),
        _ => Ok(()),
    }
}
