//! Integration tests for full conductor turns
//!
//! Every completion comes from a scripted completer so each turn is
//! deterministic end to end: extraction, classification, planning, execution.

mod common;

use cadence_engine::conductor::{
    ExecutionState, ExtractedTask, InMemoryPlanStore, SessionState, TurnCancellation, TurnOptions,
    TurnOutcome,
};
use cadence_engine::config::OrchestrationConfig;
use cadence_engine::llm::CompletionRole;
use common::{conductor, shared_log, FixedCapability, ScriptedCompleter, TimingOut};
use sdk::capability::Capability;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn weather_plan() -> serde_json::Value {
    json!({
        "steps": [
            {
                "context_key": "weather_paris",
                "capability": "current_weather",
                "task_objective": "Get current weather for Paris",
                "expected_output": "CURRENT_WEATHER",
                "inputs": []
            },
            {
                "context_key": "reply",
                "capability": "respond",
                "task_objective": "Tell the user the current weather in Paris",
                "expected_output": null,
                "inputs": [
                    { "context_type": "CURRENT_WEATHER", "source_context_key": "weather_paris" }
                ]
            }
        ]
    })
}

#[tokio::test]
async fn test_weather_turn_two_steps() {
    let completer = Arc::new(
        ScriptedCompleter::new("Get current weather for Paris")
            .matching(&["current_weather"])
            .plan(weather_plan()),
    );
    let log = shared_log();
    let weather = Arc::new(FixedCapability::new(
        "current_weather",
        "CURRENT_WEATHER",
        json!({ "city": "Paris", "temp_c": 18, "conditions": "sunny" }),
        Arc::clone(&log),
    ));
    let extra: Vec<Arc<dyn Capability>> = vec![Arc::clone(&weather) as Arc<dyn Capability>, Arc::new(TimingOut::new())];
    let conductor = conductor(
        Arc::clone(&completer),
        extra,
        Arc::new(InMemoryPlanStore::new()),
        OrchestrationConfig::default(),
    );

    let mut session = SessionState::new("s1");
    let outcome = conductor
        .handle_turn(
            &mut session,
            "What's the weather in Paris?",
            TurnOptions::default(),
            &TurnCancellation::new(),
        )
        .await;

    let response = match outcome {
        TurnOutcome::Completed { response } => response,
        other => panic!("expected completion, got {:?}", other),
    };
    assert!(response.contains("sunny"));
    assert!(response.contains("Paris"));

    let plan = session.plan.as_ref().unwrap();
    assert_eq!(plan.len(), 2);
    assert_eq!(plan.steps()[1].inputs[0].source_context_key, plan.steps()[0].context_key);

    // Classification activated only the weather capability plus the always-active built-ins
    assert_eq!(
        session.active_capabilities,
        vec!["current_weather", "respond", "clarify"]
    );
    assert_eq!(completer.calls_for(CompletionRole::Classifier).len(), 2);

    assert_eq!(weather.calls.load(Ordering::SeqCst), 1);
    assert!(session.store.contains("CURRENT_WEATHER", "weather_paris"));
    assert_eq!(session.response.as_deref(), Some(response.as_str()));
    assert_eq!(session.history.len(), 2);

    let report = session.last_report.as_ref().unwrap();
    assert_eq!(report.final_state(), Some(&ExecutionState::Succeeded));
}

#[tokio::test]
async fn test_multi_root_dependent_waits_for_both_roots() {
    let plan = json!({
        "steps": [
            {
                "context_key": "weather",
                "capability": "current_weather",
                "task_objective": "Weather in Rome",
                "expected_output": "CURRENT_WEATHER"
            },
            {
                "context_key": "events",
                "capability": "city_events",
                "task_objective": "Events in Rome tonight",
                "expected_output": "CITY_EVENTS"
            },
            {
                "context_key": "suggestion",
                "capability": "outing_planner",
                "task_objective": "Pick an outing that suits the weather",
                "expected_output": "OUTING",
                "inputs": [
                    { "CURRENT_WEATHER": "weather" },
                    { "CITY_EVENTS": "events" }
                ]
            },
            {
                "context_key": "reply",
                "capability": "respond",
                "task_objective": "Suggest the outing",
                "inputs": [{ "OUTING": "suggestion" }]
            }
        ]
    });

    let completer = Arc::new(
        ScriptedCompleter::new("Suggest something to do in Rome tonight").plan(plan),
    );
    let log = shared_log();
    let extra: Vec<Arc<dyn Capability>> = vec![
        Arc::new(FixedCapability::new(
            "current_weather",
            "CURRENT_WEATHER",
            json!({ "conditions": "clear" }),
            Arc::clone(&log),
        )),
        Arc::new(FixedCapability::new(
            "city_events",
            "CITY_EVENTS",
            json!({ "events": ["open-air concert"] }),
            Arc::clone(&log),
        )),
        Arc::new(FixedCapability::new(
            "outing_planner",
            "OUTING",
            json!({ "pick": "open-air concert" }),
            Arc::clone(&log),
        )),
    ];
    let conductor = conductor(
        Arc::clone(&completer),
        extra,
        Arc::new(InMemoryPlanStore::new()),
        OrchestrationConfig::default(),
    );

    let mut session = SessionState::new("s2");
    let options = TurnOptions {
        bypass_classification: Some(true),
        ..TurnOptions::default()
    };
    let outcome = conductor
        .handle_turn(&mut session, "what should I do tonight?", options, &TurnCancellation::new())
        .await;
    assert!(matches!(outcome, TurnOutcome::Completed { .. }), "{:?}", outcome);

    let plan = session.plan.as_ref().unwrap();
    assert_eq!(plan.roots().len(), 2);

    let log = log.lock().unwrap();
    let order: Vec<&str> = log.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(order, vec!["current_weather", "city_events", "outing_planner"]);

    // The dependent step saw both root outputs
    assert_eq!(log[2].1, vec!["weather".to_string(), "events".to_string()]);

    // Bypassed classification makes no classifier completions
    assert!(completer.calls_for(CompletionRole::Classifier).is_empty());
}

#[tokio::test]
async fn test_retry_bound_then_failure() {
    let plan = json!({
        "steps": [
            {
                "context_key": "quote",
                "capability": "stock_quote",
                "task_objective": "Get the AAPL quote",
                "expected_output": "STOCK_QUOTE"
            },
            {
                "context_key": "reply",
                "capability": "respond",
                "task_objective": "Report the quote",
                "inputs": [{ "context_type": "STOCK_QUOTE", "source_context_key": "quote" }]
            }
        ]
    });
    let completer = Arc::new(
        ScriptedCompleter::new("Get the AAPL stock quote")
            .matching(&["stock_quote"])
            .plan(plan),
    );
    let quotes = Arc::new(TimingOut::new());
    let extra: Vec<Arc<dyn Capability>> = vec![Arc::clone(&quotes) as Arc<dyn Capability>];
    let conductor = conductor(
        Arc::clone(&completer),
        extra,
        Arc::new(InMemoryPlanStore::new()),
        OrchestrationConfig::default(),
    );

    let mut session = SessionState::new("s3");
    let outcome = conductor
        .handle_turn(&mut session, "AAPL?", TurnOptions::default(), &TurnCancellation::new())
        .await;

    let report = match outcome {
        TurnOutcome::Failed(report) => report,
        other => panic!("expected failure, got {:?}", other),
    };
    assert_eq!(report.kind, "retries_exhausted");
    assert_eq!(report.attempts, Some(3));
    assert_eq!(report.step.as_deref(), Some("quote"));
    assert_eq!(report.capability.as_deref(), Some("stock_quote"));

    assert_eq!(quotes.calls.load(Ordering::SeqCst), 3);
    assert!(session.store.is_empty());
    assert!(completer.calls_for(CompletionRole::Responder).is_empty());

    let trace = session.last_report.as_ref().unwrap();
    assert_eq!(trace.attempts_for("quote"), 3);
    assert_eq!(trace.final_state(), Some(&ExecutionState::Failed));
}

#[tokio::test]
async fn test_invalid_plans_fail_the_turn() {
    // Both candidates read a key nobody produces
    let bad = json!({
        "steps": [
            {
                "context_key": "reply",
                "capability": "respond",
                "task_objective": "Answer",
                "inputs": [{ "CURRENT_WEATHER": "missing" }]
            }
        ]
    });
    let completer = Arc::new(ScriptedCompleter::new("Weather?").plan(bad.clone()).plan(bad));
    let conductor = conductor(
        Arc::clone(&completer),
        Vec::new(),
        Arc::new(InMemoryPlanStore::new()),
        OrchestrationConfig::default(),
    );

    // Leftovers from an earlier turn
    let mut session = SessionState::new("s4");
    session.task = Some(ExtractedTask {
        task: "Get the AAPL stock quote".to_string(),
        depends_on_history: false,
        depends_on_memory: false,
    });
    session.active_capabilities = vec!["stock_quote".to_string()];

    let outcome = conductor
        .handle_turn(&mut session, "Weather?", TurnOptions::default(), &TurnCancellation::new())
        .await;

    match outcome {
        TurnOutcome::Failed(report) => {
            assert_eq!(report.kind, "planning_failed");
            assert_eq!(report.attempts, Some(2));
            assert!(!report.recoverable);
        }
        other => panic!("expected planning failure, got {:?}", other),
    }

    let orchestrator_calls = completer.calls_for(CompletionRole::Orchestrator);
    assert_eq!(orchestrator_calls.len(), 2);
    assert!(orchestrator_calls[1].input.contains("previous_plan_rejected"));
    assert!(session.plan.is_none());

    // The session describes the failed turn, not the one before it
    assert_eq!(session.task.as_ref().unwrap().task, "Weather?");
    assert_eq!(session.active_capabilities, vec!["respond", "clarify"]);
}

#[tokio::test]
async fn test_cancelled_turn_makes_no_calls() {
    let completer = Arc::new(ScriptedCompleter::new("Weather?").plan(weather_plan()));
    let conductor = conductor(
        Arc::clone(&completer),
        Vec::new(),
        Arc::new(InMemoryPlanStore::new()),
        OrchestrationConfig::default(),
    );

    let cancel = TurnCancellation::new();
    cancel.cancel();

    let mut session = SessionState::new("s5");
    let outcome = conductor
        .handle_turn(&mut session, "Weather?", TurnOptions::default(), &cancel)
        .await;

    assert_eq!(outcome, TurnOutcome::Cancelled);
    assert!(completer.calls_for(CompletionRole::TaskExtractor).is_empty());
}

#[tokio::test]
async fn test_bypass_extraction_uses_history() {
    let completer = Arc::new(
        ScriptedCompleter::new("unused").plan(json!({
            "steps": [{
                "context_key": "reply",
                "capability": "respond",
                "task_objective": "Greet the user"
            }]
        })),
    );
    let config = OrchestrationConfig {
        bypass_task_extraction: true,
        ..OrchestrationConfig::default()
    };
    let conductor = conductor(
        Arc::clone(&completer),
        Vec::new(),
        Arc::new(InMemoryPlanStore::new()),
        config,
    );

    let mut session = SessionState::new("s6");
    let outcome = conductor
        .handle_turn(&mut session, "hello there", TurnOptions::default(), &TurnCancellation::new())
        .await;

    assert!(matches!(outcome, TurnOutcome::Completed { .. }), "{:?}", outcome);
    assert!(completer.calls_for(CompletionRole::TaskExtractor).is_empty());

    let task = session.task.as_ref().unwrap();
    assert_eq!(task.task, "user: hello there");
    assert!(task.depends_on_history);
}
