//! Task classification.
//!
//! Rules are tried in priority order and the first match sets the task type
//! and baseline complexity:
//!
//! | # | rule          | type          | baseline |
//! |---|---------------|---------------|----------|
//! | 1 | bug           | bug           | simple   |
//! | 2 | security      | security      | complex  |
//! | 3 | performance   | performance   | medium   |
//! | 4 | refactor      | refactor      | medium   |
//! | 5 | testing       | testing       | simple   |
//! | 6 | documentation | documentation | simple   |
//! | 7 | deployment    | deployment    | medium   |
//! | 8 | feature       | feature       | medium   |
//! | 9 | architecture  | architecture  | complex  |
//! | 10| research      | research      | simple   |
//!
//! No match yields `general` / `medium`. Complexity override words then
//! adjust the baseline; the last override word in the text wins.

use anyhow::Context;
use regex::Regex;
use sdk::types::{Complexity, TaskType};
use serde::Serialize;
use std::collections::BTreeSet;

/// Words that raise the complexity to `complex`
const COMPLEX_WORDS: &[&str] = &[
    "architecture",
    "architect",
    "complex",
    "concurrent",
    "design",
    "distributed",
    "enterprise",
    "integration",
    "migrate",
    "migration",
    "overhaul",
    "payment",
    "payments",
    "realtime",
    "rewrite",
    "scalable",
    "scalability",
    "secure",
    "security",
];

/// Words that set the complexity to `medium`
const MEDIUM_WORDS: &[&str] = &["enhance", "extend", "improve", "moderate", "multiple", "several"];

/// Words that lower the complexity to `simple`
const SIMPLE_WORDS: &[&str] = &[
    "minor", "quick", "rename", "simple", "small", "trivial", "tweak", "typo",
];

/// Deployment-tier nouns
const COMPONENT_WORDS: &[&str] = &[
    "api",
    "backend",
    "cache",
    "cli",
    "client",
    "database",
    "db",
    "frontend",
    "gateway",
    "infrastructure",
    "mobile",
    "queue",
    "server",
    "service",
    "storage",
    "ui",
    "worker",
];

/// Business-capability nouns
const DOMAIN_WORDS: &[&str] = &[
    "account",
    "analytics",
    "auth",
    "authentication",
    "authorization",
    "billing",
    "cart",
    "checkout",
    "email",
    "inventory",
    "login",
    "messaging",
    "notification",
    "notifications",
    "order",
    "orders",
    "payment",
    "payments",
    "reporting",
    "search",
    "session",
    "signup",
    "subscription",
    "user",
    "users",
];

const STOP_WORDS: &[&str] = &[
    "about", "after", "all", "also", "and", "any", "are", "before", "but", "can", "could", "for",
    "from", "has", "have", "into", "its", "our", "should", "some", "such", "than", "that", "the",
    "their", "them", "then", "there", "these", "they", "this", "those", "was", "were", "what",
    "when", "which", "while", "will", "with", "would", "you", "your",
];

/// One entry of the ordered dispatch table.
#[derive(Debug, Clone)]
pub struct TaskRule {
    pub name: &'static str,
    pub task_type: TaskType,
    pub complexity: Complexity,
    pattern: Regex,
}

impl TaskRule {
    pub fn new(
        name: &'static str,
        pattern: &str,
        task_type: TaskType,
        complexity: Complexity,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            name,
            task_type,
            complexity,
            pattern: Regex::new(pattern)
                .with_context(|| format!("invalid pattern for task rule '{}'", name))?,
        })
    }

    /// `text` is expected to be lowercased.
    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// The structured shape of a task description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskClassification {
    pub task_type: TaskType,
    pub complexity: Complexity,
    pub components: BTreeSet<String>,
    pub keywords: BTreeSet<String>,
    pub domains: BTreeSet<String>,
    /// Name of the rule that set the type, `None` for `general`
    pub matched_rule: Option<&'static str>,
}

pub struct TaskAnalyzer {
    rules: Vec<TaskRule>,
}

impl TaskAnalyzer {
    /// Analyzer with the built-in rule table.
    pub fn new() -> anyhow::Result<Self> {
        use Complexity::*;

        let rules = vec![
            TaskRule::new(
                "bug",
                r"\b(bugs?|fix|fixes|fixing|errors?|crash\w*|broken|fail(s|ing|ure)?|regression|exceptions?|defects?)\b",
                TaskType::Bug,
                Simple,
            )?,
            TaskRule::new(
                "security",
                r"\b(vulnerab\w*|audit\w*|pentest\w*|cve|exploit\w*|harden\w*|xss|csrf)\b",
                TaskType::Security,
                Complex,
            )?,
            TaskRule::new(
                "performance",
                r"\b(slow\w*|performance|optimi[sz]\w*|latency|bottlenecks?|memory leaks?|profil\w*)\b",
                TaskType::Performance,
                Medium,
            )?,
            TaskRule::new(
                "refactor",
                r"\b(refactor\w*|clean ?up|restructur\w*|simplif\w*|tech(nical)? debt)\b",
                TaskType::Refactor,
                Medium,
            )?,
            TaskRule::new(
                "testing",
                r"\b(tests?|testing|coverage|e2e)\b",
                TaskType::Testing,
                Simple,
            )?,
            TaskRule::new(
                "documentation",
                r"\b(document\w*|docs|readme|docstrings?|tutorials?|guides?)\b",
                TaskType::Documentation,
                Simple,
            )?,
            TaskRule::new(
                "deployment",
                r"\b(deploy\w*|release|ci/cd|pipelines?|docker\w*|kubernetes|k8s|provision\w*)\b",
                TaskType::Deployment,
                Medium,
            )?,
            TaskRule::new(
                "feature",
                r"\b(implement\w*|add|adding|build|create|develop\w*|integrat\w*|new feature)\b",
                TaskType::Feature,
                Medium,
            )?,
            TaskRule::new(
                "architecture",
                r"\b(design\w*|architect\w*|scalab\w*|microservices?)\b",
                TaskType::Architecture,
                Complex,
            )?,
            TaskRule::new(
                "research",
                r"\b(research\w*|investigat\w*|explore|evaluate|compare|analy[sz]e)\b",
                TaskType::Research,
                Simple,
            )?,
        ];

        Ok(Self { rules })
    }

    /// Analyzer with a custom rule table, tried in the given order.
    pub fn with_rules(rules: Vec<TaskRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[TaskRule] {
        &self.rules
    }

    /// Classify a task description. Pure and deterministic.
    pub fn analyze(&self, text: &str) -> TaskClassification {
        let lowered = text.to_lowercase();
        let tokens = tokenize(&lowered);

        let rule = self.rules.iter().find(|rule| rule.matches(&lowered));
        let (task_type, baseline) = match rule {
            Some(rule) => (rule.task_type, rule.complexity),
            None => (TaskType::General, Complexity::Medium),
        };

        TaskClassification {
            task_type,
            complexity: adjust_complexity(baseline, &tokens),
            components: vocabulary_hits(&tokens, COMPONENT_WORDS),
            domains: vocabulary_hits(&tokens, DOMAIN_WORDS),
            keywords: keywords_in(&tokens),
            matched_rule: rule.map(|r| r.name),
        }
    }
}

/// Significant words of a task: lowercased, three characters or more, stop
/// words removed.
pub fn task_keywords(text: &str) -> BTreeSet<String> {
    let lowered = text.to_lowercase();
    keywords_in(&tokenize(&lowered))
}

fn keywords_in(tokens: &[&str]) -> BTreeSet<String> {
    tokens
        .iter()
        .filter(|t| t.chars().count() >= 3 && !STOP_WORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

/// Lowercase alphanumeric runs, in text order.
fn tokenize(lowered: &str) -> Vec<&str> {
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

fn adjust_complexity(baseline: Complexity, tokens: &[&str]) -> Complexity {
    tokens
        .iter()
        .filter_map(|token| {
            if COMPLEX_WORDS.contains(token) {
                Some(Complexity::Complex)
            } else if MEDIUM_WORDS.contains(token) {
                Some(Complexity::Medium)
            } else if SIMPLE_WORDS.contains(token) {
                Some(Complexity::Simple)
            } else {
                None
            }
        })
        .last()
        .unwrap_or(baseline)
}

fn vocabulary_hits(tokens: &[&str], vocabulary: &[&str]) -> BTreeSet<String> {
    tokens
        .iter()
        .filter(|t| vocabulary.contains(t))
        .map(|t| t.to_string())
        .collect()
}
