//! Static capability profiles and the task-type suitability table.

use sdk::types::{Complexity, TaskType};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Which task complexity a role is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityHandling {
    Simple,
    Medium,
    Complex,
    All,
}

impl ComplexityHandling {
    /// `All` matches every complexity.
    pub fn handles_exactly(&self, complexity: Complexity) -> bool {
        match self {
            ComplexityHandling::All => true,
            ComplexityHandling::Simple => complexity == Complexity::Simple,
            ComplexityHandling::Medium => complexity == Complexity::Medium,
            ComplexityHandling::Complex => complexity == Complexity::Complex,
        }
    }
}

/// What a role is good at.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityProfile {
    pub name: String,
    pub capabilities: Vec<String>,
    pub specializations: Vec<String>,
    pub complexity_handling: ComplexityHandling,
    pub typical_use_cases: Vec<String>,
}

impl CapabilityProfile {
    pub fn new(
        name: &str,
        capabilities: &[&str],
        specializations: &[&str],
        complexity_handling: ComplexityHandling,
        typical_use_cases: &[&str],
    ) -> Self {
        let owned = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_lowercase()).collect() };
        Self {
            name: name.to_string(),
            capabilities: owned(capabilities),
            specializations: owned(specializations),
            complexity_handling,
            typical_use_cases: typical_use_cases.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Capability and specialization tags together.
    pub fn tags(&self) -> BTreeSet<&str> {
        self.capabilities
            .iter()
            .chain(&self.specializations)
            .map(String::as_str)
            .collect()
    }

    pub fn primary_use_case(&self) -> &str {
        self.typical_use_cases
            .first()
            .map(String::as_str)
            .unwrap_or("General assistance")
    }
}

/// Immutable role registry. Registration order is the scoring tie-break.
#[derive(Debug, Clone)]
pub struct RoleRegistry {
    profiles: Vec<CapabilityProfile>,
    suitability: HashMap<TaskType, Vec<String>>,
}

impl RoleRegistry {
    pub fn new(profiles: Vec<CapabilityProfile>, suitability: HashMap<TaskType, Vec<String>>) -> Self {
        Self {
            profiles,
            suitability,
        }
    }

    /// The built-in roster.
    pub fn builtin() -> Self {
        use ComplexityHandling::*;

        let profiles = vec![
            CapabilityProfile::new(
                "system-architect",
                &["architecture", "design", "scalability", "microservices", "patterns", "integration"],
                &["distributed", "api", "system", "migration"],
                Complex,
                &["Define the architecture and component boundaries", "Review designs for scalability"],
            ),
            CapabilityProfile::new(
                "security-auditor",
                &["security", "audit", "vulnerability", "authentication", "authorization", "encryption"],
                &["payment", "compliance", "secure", "owasp", "login"],
                Complex,
                &["Review the threat model and security controls", "Audit code for vulnerabilities"],
            ),
            CapabilityProfile::new(
                "backend-developer",
                &["backend", "api", "database", "server", "implement", "integration"],
                &["payment", "checkout", "authentication", "services"],
                Medium,
                &["Implement server-side logic and APIs", "Integrate third-party services"],
            ),
            CapabilityProfile::new(
                "frontend-developer",
                &["frontend", "ui", "components", "react", "css", "accessibility"],
                &["checkout", "forms", "client"],
                Medium,
                &["Build user-facing screens and interactions", "Fix rendering and layout issues"],
            ),
            CapabilityProfile::new(
                "debugger",
                &["debugging", "bug", "fix", "errors", "crash", "troubleshooting"],
                &["timeout", "logs", "stacktrace", "regression", "exception"],
                All,
                &["Reproduce the failure and find the root cause", "Trace errors through logs"],
            ),
            CapabilityProfile::new(
                "test-engineer",
                &["testing", "test", "coverage", "qa", "automation"],
                &["regression", "integration", "e2e", "unit"],
                Simple,
                &["Write tests that pin the behavior down", "Extend regression coverage"],
            ),
            CapabilityProfile::new(
                "performance-engineer",
                &["performance", "optimization", "profiling", "latency", "caching"],
                &["timeout", "memory", "database", "scalability"],
                Complex,
                &["Profile hot paths and remove bottlenecks", "Tune latency and memory use"],
            ),
            CapabilityProfile::new(
                "devops-engineer",
                &["deployment", "infrastructure", "docker", "kubernetes", "pipeline"],
                &["monitoring", "release", "cloud", "rollback"],
                Medium,
                &["Ship the change through the deployment pipeline", "Provision infrastructure"],
            ),
            CapabilityProfile::new(
                "technical-writer",
                &["documentation", "docs", "readme", "guides"],
                &["api", "tutorials", "onboarding"],
                Simple,
                &["Document the change for users and maintainers", "Write guides and references"],
            ),
            CapabilityProfile::new(
                "code-reviewer",
                &["review", "quality", "standards", "bug", "maintainability"],
                &["security", "refactor", "conventions"],
                Medium,
                &["Review the change for correctness and style", "Spot risky patterns"],
            ),
            CapabilityProfile::new(
                "refactoring-specialist",
                &["refactor", "cleanup", "simplify", "patterns", "debt"],
                &["legacy", "migration", "modularity"],
                Medium,
                &["Restructure code without changing behavior", "Pay down technical debt"],
            ),
            CapabilityProfile::new(
                "researcher",
                &["research", "investigate", "evaluate", "compare", "analysis"],
                &["prototyping", "benchmarks", "libraries"],
                Simple,
                &["Gather background and compare options", "Summarize findings"],
            ),
        ];

        let table: &[(TaskType, &[&str])] = &[
            (
                TaskType::Bug,
                &["debugger", "backend-developer", "frontend-developer", "test-engineer", "code-reviewer", "performance-engineer"],
            ),
            (
                TaskType::Security,
                &["security-auditor", "system-architect", "backend-developer", "code-reviewer"],
            ),
            (
                TaskType::Performance,
                &["performance-engineer", "backend-developer", "system-architect", "devops-engineer"],
            ),
            (
                TaskType::Refactor,
                &["refactoring-specialist", "code-reviewer", "system-architect", "test-engineer"],
            ),
            (TaskType::Testing, &["test-engineer", "debugger", "code-reviewer"]),
            (TaskType::Documentation, &["technical-writer", "researcher"]),
            (
                TaskType::Deployment,
                &["devops-engineer", "security-auditor", "backend-developer"],
            ),
            (
                TaskType::Feature,
                &["system-architect", "security-auditor", "backend-developer", "frontend-developer", "test-engineer", "technical-writer"],
            ),
            (
                TaskType::Architecture,
                &["system-architect", "security-auditor", "performance-engineer", "backend-developer", "technical-writer"],
            ),
            (TaskType::Research, &["researcher", "system-architect", "technical-writer"]),
            (TaskType::General, &["backend-developer", "code-reviewer", "researcher"]),
        ];
        let suitability = table
            .iter()
            .map(|(task_type, roles)| (*task_type, roles.iter().map(|r| r.to_string()).collect()))
            .collect();

        Self::new(profiles, suitability)
    }

    /// Profiles in registration order.
    pub fn profiles(&self) -> &[CapabilityProfile] {
        &self.profiles
    }

    pub fn get(&self, name: &str) -> Option<&CapabilityProfile> {
        self.profiles.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn is_suitable(&self, role: &str, task_type: TaskType) -> bool {
        self.suitability
            .get(&task_type)
            .map(|roles| roles.iter().any(|r| r.eq_ignore_ascii_case(role)))
            .unwrap_or(false)
    }

    pub fn suitable_for(&self, task_type: TaskType) -> &[String] {
        self.suitability
            .get(&task_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
