use super::registry::RoleRegistry;
use sdk::types::{TaskType, WorkflowStep};
use std::collections::HashMap;

/// Orders selected roles by a canonical per-type sequence.
pub struct WorkflowSequencer {
    tables: HashMap<TaskType, Vec<String>>,
}

impl WorkflowSequencer {
    pub fn new(tables: HashMap<TaskType, Vec<String>>) -> Self {
        Self { tables }
    }

    pub fn builtin() -> Self {
        use TaskType::*;

        let tables: &[(TaskType, &[&str])] = &[
            // architecture -> security -> implementation -> testing -> documentation
            (
                Feature,
                &["system-architect", "security-auditor", "backend-developer", "frontend-developer", "test-engineer", "technical-writer"],
            ),
            (
                Bug,
                &["debugger", "backend-developer", "frontend-developer", "performance-engineer", "test-engineer", "code-reviewer"],
            ),
            (
                Security,
                &["security-auditor", "system-architect", "backend-developer", "code-reviewer", "test-engineer"],
            ),
            (
                Performance,
                &["performance-engineer", "system-architect", "backend-developer", "devops-engineer", "test-engineer"],
            ),
            (
                Refactor,
                &["code-reviewer", "refactoring-specialist", "system-architect", "test-engineer"],
            ),
            (Testing, &["test-engineer", "debugger", "code-reviewer"]),
            (Documentation, &["researcher", "technical-writer"]),
            (
                Deployment,
                &["devops-engineer", "security-auditor", "backend-developer", "test-engineer"],
            ),
            (
                Architecture,
                &["researcher", "system-architect", "security-auditor", "performance-engineer", "backend-developer", "technical-writer"],
            ),
            (Research, &["researcher", "system-architect", "technical-writer"]),
            (General, &["researcher", "backend-developer", "code-reviewer", "test-engineer"]),
        ];

        Self::new(
            tables
                .iter()
                .map(|(task_type, roles)| (*task_type, roles.iter().map(|r| r.to_string()).collect()))
                .collect(),
        )
    }

    /// Roles in the canonical order for `task_type`. `ranked` is in score
    /// order; roles missing from the table follow in that order.
    pub fn order(&self, task_type: TaskType, ranked: &[String]) -> Vec<String> {
        let table = self.tables.get(&task_type).map(Vec::as_slice).unwrap_or(&[]);
        let position = |role: &str| table.iter().position(|r| r.eq_ignore_ascii_case(role));

        let mut listed: Vec<(usize, &String)> = ranked
            .iter()
            .filter_map(|role| position(role).map(|pos| (pos, role)))
            .collect();
        listed.sort_by_key(|(pos, _)| *pos);

        listed
            .into_iter()
            .map(|(_, role)| role.clone())
            .chain(ranked.iter().filter(|role| position(role).is_none()).cloned())
            .collect()
    }

    /// Ordered steps, each with the role's primary use case as its purpose.
    pub fn sequence(&self, task_type: TaskType, ranked: &[String], registry: &RoleRegistry) -> Vec<WorkflowStep> {
        self.order(task_type, ranked)
            .into_iter()
            .enumerate()
            .map(|(i, role)| WorkflowStep {
                step: i + 1,
                purpose: registry
                    .get(&role)
                    .map(|p| p.primary_use_case().to_string())
                    .unwrap_or_else(|| format!("Contribute as {}", role)),
                role,
            })
            .collect()
    }
}
