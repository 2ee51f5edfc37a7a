use proptest::prelude::*;
use sdk::context::{downsample_series, summarize_value};
use sdk::errors::{CadenceErrorExt, EngineError};
use sdk::types::{PlannedStep, RetryPolicy};
use std::time::Duration;

// User hints are static and never echo the error detail
proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "[a-z_/]{8,40}") {
        let errs = vec![
            EngineError::Config(error_str.clone()),
            EngineError::Database(error_str.clone()),
            EngineError::Completion(error_str.clone()),
            EngineError::UnknownCapability(error_str.clone()),
            EngineError::InvalidInput(error_str.clone()),
            EngineError::PendingPlanNotFound(error_str.clone()),
            EngineError::InvalidPlan { step: error_str.clone(), reason: error_str.clone() },
            EngineError::DuplicateKey { context_type: error_str.clone(), key: error_str.clone() },
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            prop_assert!(!hint.contains(&error_str));
        }
    }
}

// Backoff never exceeds the cap and never shrinks between attempts
proptest! {
    #[test]
    fn test_retry_delay_monotonic_and_capped(
        base_ms in 1u64..2_000,
        multiplier in 1.0f64..4.0,
        cap_ms in 1u64..30_000,
        attempts in 1u32..20,
    ) {
        let policy = RetryPolicy::new(attempts, Duration::from_millis(base_ms), multiplier)
            .with_max_delay(Duration::from_millis(cap_ms));
        let ceiling = Duration::from_millis(cap_ms.max(base_ms));

        let mut previous = Duration::ZERO;
        for n in 1..=attempts {
            let delay = policy.delay_for(n);
            prop_assert!(delay <= ceiling);
            prop_assert!(delay >= previous);
            previous = delay;
        }
        prop_assert!(!policy.allows_another(attempts));
    }
}

// Downsampled series keep their endpoints and respect the sample bound
proptest! {
    #[test]
    fn test_downsample_bounds(
        values in prop::collection::vec(-1_000.0f64..1_000.0, 1..500),
        max_points in 2usize..50,
    ) {
        let series = downsample_series(&values, max_points).unwrap();
        prop_assert_eq!(series.count, values.len());
        prop_assert!(series.sample.len() <= max_points);
        prop_assert_eq!(series.sample[0], values[0]);
        prop_assert_eq!(*series.sample.last().unwrap(), *values.last().unwrap());
        prop_assert!(series.min - 1e-9 <= series.mean && series.mean <= series.max + 1e-9);

        let summary = summarize_value(&serde_json::json!(values), max_points);
        if values.len() > max_points {
            prop_assert!(summary.get("warning").is_some());
        } else {
            prop_assert!(summary.is_array());
        }
    }
}

// Planned steps survive a JSON round-trip through the planner wire format
proptest! {
    #[test]
    fn test_planned_step_roundtrip(
        key in "[a-z_]{1,16}",
        capability in "[a-z_]{1,16}",
        objective in "[a-zA-Z ]{0,40}",
        output in proptest::option::of("[A-Z_]{1,16}"),
        source in "[a-z_]{1,16}",
    ) {
        let mut step = PlannedStep::new(key, capability, objective)
            .with_input("SOME_TYPE", source)
            .with_success_criteria("done");
        step.expected_output = output;

        let json = serde_json::to_string(&step).unwrap();
        let parsed: PlannedStep = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(parsed, step);
    }
}
