use proptest::prelude::*;
use scout_engine::conductor::types::{placeholders, substitute};
use scout_engine::conductor::{Planner, PlannerSettings};
use scout_engine::llm::gateway::{GatewaySettings, ModelGateway, RetryPolicy};
use scout_engine::llm::ollama::OllamaProvider;
use scout_engine::tools::documents::chunk_text;
use scout_engine::tools::{DirectAnswerTool, RegistrySettings, ResearchTool, ToolRegistry};
use serde_json::{json, Value};
use std::sync::Arc;

const MAX_STEPS: usize = 6;

fn registry() -> Arc<ToolRegistry> {
    let tools: Vec<Arc<dyn ResearchTool>> = vec![Arc::new(DirectAnswerTool::offline())];
    Arc::new(ToolRegistry::new(tools, RegistrySettings::default()))
}

fn planner() -> Planner {
    // Never called: these properties only exercise plan validation
    let provider = Arc::new(OllamaProvider::new("http://127.0.0.1:9", "unused"));
    let gateway = ModelGateway::new(provider, RetryPolicy::default(), GatewaySettings::default());
    Planner::new(
        Arc::new(gateway),
        registry(),
        PlannerSettings {
            max_steps: MAX_STEPS,
            ..PlannerSettings::default()
        },
    )
}

fn direct_step(question: &str, depends_on: &[usize]) -> Value {
    json!({
        "action": "direct_answer",
        "parameters": {"question": question},
        "rationale": "answer",
        "depends_on": depends_on
    })
}

proptest! {
    // Accepted plans number their steps 0..n in the order given
    #[test]
    fn test_accepted_plan_ordinals_are_dense(questions in prop::collection::vec("[a-z][a-z ]{0,19}", 1..=MAX_STEPS)) {
        let planner = planner();
        let steps: Vec<Value> = questions.iter().map(|q| direct_step(q, &[])).collect();

        let parsed = planner.parse_steps(&Value::Array(steps)).unwrap();

        prop_assert_eq!(parsed.len(), questions.len());
        for (i, step) in parsed.iter().enumerate() {
            prop_assert_eq!(step.ordinal, i);
            prop_assert_eq!(step.parameters["question"].as_str(), Some(questions[i].as_str()));
        }
    }

    // A step may only depend on steps before it
    #[test]
    fn test_forward_dependencies_rejected(len in 1..=MAX_STEPS, target in 0..MAX_STEPS, from in 0..MAX_STEPS) {
        prop_assume!(from < len);
        let planner = planner();
        let steps: Vec<Value> = (0..len)
            .map(|i| if i == from { direct_step("q", &[target]) } else { direct_step("q", &[]) })
            .collect();

        let result = planner.parse_steps(&Value::Array(steps));
        if target < from {
            prop_assert!(result.is_ok());
        } else {
            prop_assert!(result.is_err());
        }
    }

    #[test]
    fn test_oversized_plans_rejected(extra in 1usize..5) {
        let planner = planner();
        let steps: Vec<Value> = (0..MAX_STEPS + extra).map(|_| direct_step("q", &[])).collect();
        prop_assert!(planner.parse_steps(&Value::Array(steps)).is_err());
    }

    // Unregistered actions never resolve and always fail validation
    #[test]
    fn test_unknown_actions_never_resolve(action in "[a-z_]{1,24}") {
        let registry = registry();
        let known = registry.action_names().contains(&action.as_str());

        prop_assert_eq!(registry.resolve(&action).is_some(), known);
        prop_assert_eq!(registry.validate(&action, &Default::default()).is_empty(), known);
    }

    #[test]
    fn test_text_without_placeholders_is_untouched(text in "[^{}]{0,80}") {
        prop_assert!(placeholders(&text).is_empty());
        prop_assert_eq!(substitute(&text, |_, _| Some("x".to_string())), text);
    }

    #[test]
    fn test_placeholder_substitution(n in 0usize..50, prefix in "[a-z ]{0,10}") {
        let text = format!("{}{{{{step:{}}}}}", prefix, n);
        prop_assert_eq!(placeholders(&text), vec![n]);
        prop_assert_eq!(
            substitute(&text, |i, path| (i == n && path.is_none()).then(|| "RESULT".to_string())),
            format!("{}RESULT", prefix)
        );
    }

    // A field path still counts as a reference to its step
    #[test]
    fn test_field_path_placeholder(n in 0usize..50, index in 0usize..10, field in "[a-z_]{1,12}") {
        let path = format!("results.{}.{}", index, field);
        let text = format!("{{{{step:{}.{}}}}}", n, path);

        prop_assert_eq!(placeholders(&text), vec![n]);
        prop_assert_eq!(
            substitute(&text, |i, p| (i == n && p == Some(path.as_str())).then(|| "https://a.example".to_string())),
            "https://a.example"
        );
    }

    // Chunks never exceed the window and never come back empty
    #[test]
    fn test_chunks_are_bounded(text in "[a-z \n]{0,400}", size in 10usize..80, overlap in 0usize..10) {
        let chunks = chunk_text(&text, size, overlap);

        prop_assert_eq!(chunks.is_empty(), text.trim().is_empty());
        for chunk in &chunks {
            prop_assert!(!chunk.is_empty());
            prop_assert!(chunk.chars().count() <= size);
        }
    }
}
