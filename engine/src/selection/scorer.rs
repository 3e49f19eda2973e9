use super::analyzer::TaskClassification;
use super::registry::RoleRegistry;
use sdk::types::Complexity;
use serde::Serialize;

pub const SUITABILITY_POINTS: u32 = 30;
pub const COMPLEXITY_MATCH_POINTS: u32 = 20;
pub const COMPLEXITY_STRETCH_POINTS: u32 = 10;
pub const KEYWORD_POINTS: u32 = 5;
pub const DOMAIN_POINTS: u32 = 10;

/// A role with its additive score and the reason for every increment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredRole {
    pub role: String,
    pub score: u32,
    pub reasons: Vec<String>,
}

/// Rule-table scorer over a role registry.
pub struct CapabilityScorer<'r> {
    registry: &'r RoleRegistry,
}

impl<'r> CapabilityScorer<'r> {
    pub fn new(registry: &'r RoleRegistry) -> Self {
        Self { registry }
    }

    /// Score every registered role, highest first. Ties keep registry order.
    pub fn score(&self, classification: &TaskClassification) -> Vec<ScoredRole> {
        let mut scored: Vec<ScoredRole> = self
            .registry
            .profiles()
            .iter()
            .map(|profile| {
                let mut score = 0;
                let mut reasons = Vec::new();

                if self
                    .registry
                    .is_suitable(&profile.name, classification.task_type)
                {
                    score += SUITABILITY_POINTS;
                    reasons.push(format!("suited to {} tasks", classification.task_type));
                }

                if profile
                    .complexity_handling
                    .handles_exactly(classification.complexity)
                {
                    score += COMPLEXITY_MATCH_POINTS;
                    reasons.push(format!("handles {} complexity", classification.complexity));
                } else if profile
                    .complexity_handling
                    .handles_exactly(Complexity::Complex)
                    && classification.complexity == Complexity::Medium
                {
                    score += COMPLEXITY_STRETCH_POINTS;
                    reasons.push("handles complex work, task is medium".to_string());
                }

                let tags = profile.tags();
                for keyword in &classification.keywords {
                    if tags.contains(keyword.as_str()) {
                        score += KEYWORD_POINTS;
                        reasons.push(format!("keyword '{}'", keyword));
                    }
                }
                for domain in &classification.domains {
                    if tags.contains(domain.as_str()) {
                        score += DOMAIN_POINTS;
                        reasons.push(format!("domain '{}'", domain));
                    }
                }

                ScoredRole {
                    role: profile.name.clone(),
                    score,
                    reasons,
                }
            })
            .collect();

        // sort_by is stable
        scored.sort_by(|a, b| b.score.cmp(&a.score));
        scored
    }
}
