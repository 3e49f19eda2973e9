use super::analyzer::TaskClassification;
use anyhow::Context;
use regex::Regex;
use sdk::types::{Complexity, TaskType};
use serde::Serialize;

pub const TYPE_POINTS: u32 = 40;
pub const PATTERN_POINTS: u32 = 30;
pub const COMPLEX_POINTS: u32 = 10;
/// Recipes must score strictly above this to be considered
pub const RECIPE_FLOOR: u32 = 30;

/// A predefined multi-role workflow.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub name: String,
    pub description: String,
    pub task_types: Vec<TaskType>,
    pub roles: Vec<String>,
    patterns: Vec<Regex>,
}

impl Recipe {
    /// Patterns are matched against single lowercase keywords.
    pub fn new(
        name: &str,
        description: &str,
        task_types: &[TaskType],
        patterns: &[&str],
        roles: &[&str],
    ) -> anyhow::Result<Self> {
        Ok(Self {
            name: name.to_string(),
            description: description.to_string(),
            task_types: task_types.to_vec(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            patterns: patterns
                .iter()
                .map(|p| Regex::new(p))
                .collect::<Result<_, _>>()
                .with_context(|| format!("invalid keyword pattern in recipe '{}'", name))?,
        })
    }

    fn matching_keyword<'c>(&self, classification: &'c TaskClassification) -> Option<&'c str> {
        classification
            .keywords
            .iter()
            .find(|keyword| self.patterns.iter().any(|p| p.is_match(keyword)))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipeMatch {
    pub name: String,
    pub score: u32,
    pub reasons: Vec<String>,
}

pub struct RecipeMatcher {
    recipes: Vec<Recipe>,
}

impl RecipeMatcher {
    pub fn new(recipes: Vec<Recipe>) -> Self {
        Self { recipes }
    }

    pub fn builtin() -> anyhow::Result<Self> {
        use TaskType::*;

        Ok(Self::new(vec![
            Recipe::new(
                "secure-feature",
                "Design, threat-model, build and test a feature that handles sensitive data",
                &[Feature, Security],
                &[r"^(payments?|checkout|auth\w*|login|secure|security|credentials?)$"],
                &["system-architect", "security-auditor", "backend-developer", "test-engineer"],
            )?,
            Recipe::new(
                "full-stack-feature",
                "Build a feature across API and UI, then document it",
                &[Feature],
                &[r"^(ui|frontend|backend|api|page|forms?|dashboard|screen)$"],
                &["system-architect", "backend-developer", "frontend-developer", "test-engineer", "technical-writer"],
            )?,
            Recipe::new(
                "bug-hunt",
                "Reproduce, fix and guard a defect with a regression test",
                &[Bug, Testing],
                &[r"^(bugs?|crash\w*|errors?|fix\w*|regression|broken|fail\w*)$"],
                &["debugger", "test-engineer", "code-reviewer"],
            )?,
            Recipe::new(
                "performance-sweep",
                "Profile, optimize and verify a slow path",
                &[Performance],
                &[r"^(slow\w*|latency|optimi[sz]\w*|memory|timeouts?|throughput)$"],
                &["performance-engineer", "backend-developer", "test-engineer"],
            )?,
            Recipe::new(
                "release-readiness",
                "Harden, test and ship a release",
                &[Deployment],
                &[r"^(deploy\w*|release|pipelines?|docker|kubernetes|rollout)$"],
                &["devops-engineer", "security-auditor", "test-engineer"],
            )?,
            Recipe::new(
                "docs-refresh",
                "Research the current behavior and rewrite the docs",
                &[Documentation],
                &[r"^(docs?|readme|guides?|tutorials?|documentation)$"],
                &["researcher", "technical-writer"],
            )?,
            Recipe::new(
                "legacy-modernization",
                "Plan and execute an incremental restructuring of old code",
                &[Refactor, Architecture],
                &[r"^(legacy|migrat\w*|moderni[sz]\w*|monolith|refactor\w*)$"],
                &["system-architect", "refactoring-specialist", "test-engineer"],
            )?,
        ]))
    }

    pub fn recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    /// Recipes scoring above the floor, highest first. Ties keep registration order.
    pub fn rank(&self, classification: &TaskClassification) -> Vec<RecipeMatch> {
        let mut matches: Vec<RecipeMatch> = self
            .recipes
            .iter()
            .map(|recipe| {
                let mut score = 0;
                let mut reasons = Vec::new();

                if recipe.task_types.contains(&classification.task_type) {
                    score += TYPE_POINTS;
                    reasons.push(format!("covers {} tasks", classification.task_type));
                }
                if let Some(keyword) = recipe.matching_keyword(classification) {
                    score += PATTERN_POINTS;
                    reasons.push(format!("keyword '{}'", keyword));
                }
                if classification.complexity == Complexity::Complex {
                    score += COMPLEX_POINTS;
                    reasons.push("complex task".to_string());
                }

                RecipeMatch {
                    name: recipe.name.clone(),
                    score,
                    reasons,
                }
            })
            .filter(|m| m.score > RECIPE_FLOOR)
            .collect();

        matches.sort_by(|a, b| b.score.cmp(&a.score));
        matches
    }

    pub fn best(&self, classification: &TaskClassification) -> Option<RecipeMatch> {
        self.rank(classification).into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::analyzer::TaskAnalyzer;

    fn classify(text: &str) -> TaskClassification {
        TaskAnalyzer::new().unwrap().analyze(text)
    }

    #[test]
    fn test_secure_feature_wins_for_payments() {
        let matcher = RecipeMatcher::builtin().unwrap();
        let c = classify("Design and implement a secure payment checkout with Stripe integration");

        let ranked = matcher.rank(&c);
        assert_eq!(ranked[0].name, "secure-feature");
        assert_eq!(ranked[0].score, 80);
        assert_eq!(ranked[1].name, "full-stack-feature");
        assert_eq!(ranked[1].score, 50);
    }

    #[test]
    fn test_pattern_only_match_is_excluded() {
        let matcher = RecipeMatcher::builtin().unwrap();
        let c = classify("Fix login timeout bug causing 500 errors");

        let ranked = matcher.rank(&c);
        // performance-sweep only matches "timeout": 30 points, not enough
        assert!(ranked.iter().all(|m| m.name != "performance-sweep"));
        assert_eq!(matcher.best(&c).map(|m| m.name), Some("bug-hunt".to_string()));
    }

    #[test]
    fn test_no_recipe_for_general_task() {
        let matcher = RecipeMatcher::builtin().unwrap();
        assert!(matcher.best(&classify("Something about the weekly sync meeting")).is_none());
    }
}
