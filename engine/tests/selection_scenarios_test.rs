//! End-to-end checks of role selection over the built-in tables.

use cadre_engine::config::SelectionConfig;
use cadre_engine::selection::{AgentSelector, SelectionOptions};
use sdk::types::{Complexity, TaskType};

fn selector() -> AgentSelector {
    AgentSelector::builtin(&SelectionConfig::default()).unwrap()
}

#[test]
fn test_bug_report_is_routed_to_debugging() {
    let rec = selector()
        .select_agents(
            "Fix login timeout bug causing 500 errors",
            &SelectionOptions::default(),
        )
        .unwrap();

    assert_eq!(rec.task_type, TaskType::Bug);
    assert_eq!(rec.estimated_complexity, Complexity::Simple);
    assert_eq!(
        rec.roles,
        vec![
            "debugger",
            "performance-engineer",
            "test-engineer",
            "code-reviewer"
        ]
    );
    assert_eq!(rec.recipe.as_deref(), Some("bug-hunt"));
    assert_eq!(rec.workflow_steps.len(), 4);
    assert_eq!(rec.workflow_steps[0].step, 1);
    assert_eq!(rec.workflow_steps[0].role, "debugger");
}

#[test]
fn test_secure_payment_feature() {
    let rec = selector()
        .select_agents(
            "Design and implement a secure payment checkout with Stripe integration",
            &SelectionOptions::default(),
        )
        .unwrap();

    assert_eq!(rec.task_type, TaskType::Feature);
    assert_eq!(rec.estimated_complexity, Complexity::Complex);
    assert_eq!(
        rec.roles,
        vec![
            "system-architect",
            "security-auditor",
            "backend-developer",
            "frontend-developer"
        ]
    );
    assert_eq!(rec.recipe.as_deref(), Some("secure-feature"));
    assert_eq!(rec.confidence, 61);
}

#[test]
fn test_roles_match_workflow_steps() {
    let rec = selector()
        .select_agents(
            "Refactor the database layer and add integration tests",
            &SelectionOptions::default(),
        )
        .unwrap();

    let from_steps: Vec<&str> = rec.workflow_steps.iter().map(|s| s.role.as_str()).collect();
    assert_eq!(rec.roles, from_steps);
    for (index, step) in rec.workflow_steps.iter().enumerate() {
        assert_eq!(step.step, index + 1);
        assert!(!step.purpose.is_empty());
    }
}

#[test]
fn test_recommendation_serializes_to_json() {
    let rec = selector()
        .select_agents(
            "Fix login timeout bug causing 500 errors",
            &SelectionOptions::default(),
        )
        .unwrap();

    let value: serde_json::Value = serde_json::from_str(&rec.to_json()).unwrap();
    assert_eq!(value["roles"][0], "debugger");
    assert!(value["reasoning"].as_str().unwrap().contains("bug"));
}
