//! Role Selection
//!
//! Turns a free-text task description into a [`Recommendation`]:
//!
//! 1. `TaskAnalyzer` classifies the text (type, complexity, vocabulary hits)
//! 2. `CapabilityScorer` ranks every registered role
//! 3. excluded roles are dropped and the top `max_agents` above the score
//!    floor are kept
//! 4. `RecipeMatcher` picks the best predefined workflow, if enabled
//! 5. `WorkflowSequencer` puts the kept roles in canonical order
//!
//! Everything here is synchronous and deterministic.

pub mod analyzer;
pub mod recipes;
pub mod registry;
pub mod scorer;
pub mod workflow;

pub use analyzer::{task_keywords, TaskAnalyzer, TaskClassification, TaskRule};
pub use recipes::{Recipe, RecipeMatch, RecipeMatcher};
pub use registry::{CapabilityProfile, ComplexityHandling, RoleRegistry};
pub use scorer::{CapabilityScorer, ScoredRole};
pub use workflow::WorkflowSequencer;

use crate::config::SelectionConfig;
use sdk::errors::EngineError;
use sdk::types::{Complexity, Recommendation};
use std::fmt::Write;
use tracing::{debug, info};

const MIN_CONFIDENCE: u32 = 30;
const MAX_CONFIDENCE: u32 = 95;

/// Per-call selection options.
#[derive(Debug, Clone)]
pub struct SelectionOptions {
    pub max_agents: usize,
    pub include_recipes: bool,
    pub exclude_agents: Vec<String>,
    /// Replaces the classified complexity when set
    pub preferred_complexity: Option<Complexity>,
}

impl SelectionOptions {
    pub fn from_config(config: &SelectionConfig) -> Self {
        Self {
            max_agents: config.max_agents,
            include_recipes: config.include_recipes,
            exclude_agents: Vec::new(),
            preferred_complexity: None,
        }
    }
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self::from_config(&SelectionConfig::default())
    }
}

/// Owns the immutable selection tables and runs `select_agents`.
pub struct AgentSelector {
    analyzer: TaskAnalyzer,
    registry: RoleRegistry,
    recipes: RecipeMatcher,
    sequencer: WorkflowSequencer,
    min_score: u32,
    min_task_length: usize,
    max_task_length: usize,
}

impl AgentSelector {
    /// Selector over the built-in tables.
    pub fn builtin(config: &SelectionConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            config,
            TaskAnalyzer::new()?,
            RoleRegistry::builtin(),
            RecipeMatcher::builtin()?,
            WorkflowSequencer::builtin(),
        ))
    }

    pub fn new(
        config: &SelectionConfig,
        analyzer: TaskAnalyzer,
        registry: RoleRegistry,
        recipes: RecipeMatcher,
        sequencer: WorkflowSequencer,
    ) -> Self {
        Self {
            analyzer,
            registry,
            recipes,
            sequencer,
            min_score: config.min_score,
            min_task_length: config.min_task_length,
            max_task_length: config.max_task_length,
        }
    }

    pub fn registry(&self) -> &RoleRegistry {
        &self.registry
    }

    pub fn recipes(&self) -> &RecipeMatcher {
        &self.recipes
    }

    /// Reject descriptions outside the accepted length range.
    pub fn validate_task(&self, task: &str) -> Result<(), EngineError> {
        let length = task.trim().chars().count();
        if length < self.min_task_length {
            return Err(EngineError::InvalidTask(format!(
                "task description is {} characters, minimum is {}",
                length, self.min_task_length
            )));
        }
        if length > self.max_task_length {
            return Err(EngineError::InvalidTask(format!(
                "task description is {} characters, maximum is {}",
                length, self.max_task_length
            )));
        }
        Ok(())
    }

    /// Validate and classify, applying the preferred complexity.
    pub fn classify(
        &self,
        task: &str,
        preferred_complexity: Option<Complexity>,
    ) -> Result<TaskClassification, EngineError> {
        self.validate_task(task)?;
        let mut classification = self.analyzer.analyze(task.trim());
        if let Some(complexity) = preferred_complexity {
            classification.complexity = complexity;
        }
        Ok(classification)
    }

    pub fn select_agents(&self, task: &str, options: &SelectionOptions) -> Result<Recommendation, EngineError> {
        let classification = self.classify(task, options.preferred_complexity)?;
        debug!(
            "Classified task as {} ({}) via {:?}",
            classification.task_type, classification.complexity, classification.matched_rule
        );

        let ranked = CapabilityScorer::new(&self.registry).score(&classification);
        let selected: Vec<ScoredRole> = ranked
            .into_iter()
            .filter(|s| {
                !options
                    .exclude_agents
                    .iter()
                    .any(|excluded| excluded.eq_ignore_ascii_case(&s.role))
            })
            .filter(|s| s.score > self.min_score)
            .take(options.max_agents)
            .collect();

        let recipe = if options.include_recipes {
            self.recipes.best(&classification)
        } else {
            None
        };

        let names: Vec<String> = selected.iter().map(|s| s.role.clone()).collect();
        let workflow_steps = self
            .sequencer
            .sequence(classification.task_type, &names, &self.registry);
        let roles = workflow_steps.iter().map(|s| s.role.clone()).collect();
        let confidence = confidence(&selected);

        info!(
            "Recommended {} roles for {} task (confidence {})",
            selected.len(),
            classification.task_type,
            confidence
        );

        Ok(Recommendation {
            roles,
            recipe: recipe.as_ref().map(|r| r.name.clone()),
            confidence,
            reasoning: self.reasoning(&classification, &selected, recipe.as_ref()),
            workflow_steps,
            task_type: classification.task_type,
            estimated_complexity: classification.complexity,
        })
    }

    fn reasoning(
        &self,
        classification: &TaskClassification,
        selected: &[ScoredRole],
        recipe: Option<&RecipeMatch>,
    ) -> String {
        let mut text = String::new();
        let _ = write!(
            text,
            "Classified as a {} task of {} complexity",
            classification.task_type, classification.complexity
        );
        match classification.matched_rule {
            Some(rule) => {
                let _ = writeln!(text, " (rule '{}').", rule);
            }
            None => text.push_str(" (no rule matched).\n"),
        }
        if !classification.components.is_empty() {
            let _ = writeln!(text, "Components: {}.", join(&classification.components));
        }
        if !classification.domains.is_empty() {
            let _ = writeln!(text, "Domains: {}.", join(&classification.domains));
        }

        if selected.is_empty() {
            let _ = writeln!(text, "No role scored above {}.", self.min_score);
        }
        for role in selected {
            let _ = writeln!(
                text,
                "- {} ({}): {}",
                role.role,
                role.score,
                role.reasons.join(", ")
            );
        }

        if let Some(recipe) = recipe {
            let _ = writeln!(
                text,
                "Recipe '{}' fits ({}): {}",
                recipe.name,
                recipe.score,
                recipe.reasons.join(", ")
            );
        }
        text.trim_end().to_string()
    }
}

/// Mean score of the selected roles, clamped to [30, 95].
fn confidence(selected: &[ScoredRole]) -> u8 {
    if selected.is_empty() {
        return MIN_CONFIDENCE as u8;
    }
    let total: u32 = selected.iter().map(|s| s.score).sum();
    let mean = total / selected.len() as u32;
    mean.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE) as u8
}

fn join<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
    items
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
