//! Shared value types for task classification and recommendations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed set of task categories a description can be classified into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Bug,
    Security,
    Performance,
    Refactor,
    Testing,
    Documentation,
    Deployment,
    Feature,
    Architecture,
    Research,
    General,
}

impl TaskType {
    /// All variants, in declaration order.
    pub fn all() -> &'static [TaskType] {
        &[
            TaskType::Bug,
            TaskType::Security,
            TaskType::Performance,
            TaskType::Refactor,
            TaskType::Testing,
            TaskType::Documentation,
            TaskType::Deployment,
            TaskType::Feature,
            TaskType::Architecture,
            TaskType::Research,
            TaskType::General,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Bug => "bug",
            TaskType::Security => "security",
            TaskType::Performance => "performance",
            TaskType::Refactor => "refactor",
            TaskType::Testing => "testing",
            TaskType::Documentation => "documentation",
            TaskType::Deployment => "deployment",
            TaskType::Feature => "feature",
            TaskType::Architecture => "architecture",
            TaskType::Research => "research",
            TaskType::General => "general",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estimated effort of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Medium => "medium",
            Complexity::Complex => "complex",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Complexity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simple" => Ok(Complexity::Simple),
            "medium" => Ok(Complexity::Medium),
            "complex" => Ok(Complexity::Complex),
            other => Err(format!(
                "unknown complexity '{}' (expected simple, medium or complex)",
                other
            )),
        }
    }
}

/// One step of a recommended workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// 1-based position in the sequence
    pub step: usize,
    pub role: String,
    pub purpose: String,
}

/// Result of a role selection
///
/// `reasoning` is display text only; nothing should parse it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub roles: Vec<String>,
    pub recipe: Option<String>,
    /// 0-100
    pub confidence: u8,
    pub reasoning: String,
    pub workflow_steps: Vec<WorkflowStep>,
    pub task_type: TaskType,
    pub estimated_complexity: Complexity,
}

impl Recommendation {
    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complexity_from_str() {
        assert_eq!("Simple".parse::<Complexity>().unwrap(), Complexity::Simple);
        assert_eq!(" complex ".parse::<Complexity>().unwrap(), Complexity::Complex);
        assert!("huge".parse::<Complexity>().is_err());
    }

    #[test]
    fn test_task_type_serializes_lowercase() {
        let json = serde_json::to_string(&TaskType::Documentation).unwrap();
        assert_eq!(json, "\"documentation\"");
        assert_eq!(TaskType::all().len(), 11);
    }

    #[test]
    fn test_recommendation_to_json() {
        let rec = Recommendation {
            roles: vec!["debugger".into()],
            recipe: None,
            confidence: 72,
            reasoning: "Classified as bug".into(),
            workflow_steps: vec![WorkflowStep {
                step: 1,
                role: "debugger".into(),
                purpose: "Root-cause analysis".into(),
            }],
            task_type: TaskType::Bug,
            estimated_complexity: Complexity::Simple,
        };

        let json = rec.to_json();
        assert!(json.contains("\"confidence\": 72"));
        assert!(json.contains("\"task_type\": \"bug\""));
        let back: Recommendation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
    }
}
