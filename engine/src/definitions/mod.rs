//! Definition Store
//!
//! Loads role-definition documents (`*.md`) from a directory into immutable
//! [`RoleDefinition`] records. A malformed document is skipped with a
//! warning; only an empty result is fatal.

pub mod parser;

pub use parser::{parse_definition, DEFAULT_MAX_CONTEXT_FILES, DEFAULT_MAX_CONTEXT_TOKENS};

use sdk::errors::EngineError;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

/// A worked example from the `Examples` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleExample {
    pub input: String,
    pub output: String,
}

/// A parsed role definition.
#[derive(Debug, Clone, Serialize)]
pub struct RoleDefinition {
    pub name: String,
    pub description: String,
    pub capabilities: Vec<String>,
    pub requirements: Vec<String>,
    pub max_context_tokens: usize,
    pub max_context_files: usize,
    pub prompt_template: String,
    pub examples: Vec<RoleExample>,
    /// Every section body keyed by normalized title
    pub sections: BTreeMap<String, String>,
    /// Metadata keys without a dedicated field
    pub metadata: BTreeMap<String, String>,
    pub source: PathBuf,
}

/// A document that did not make it into the store.
#[derive(Debug, Clone)]
pub struct SkippedDefinition {
    pub path: PathBuf,
    pub reason: String,
}

/// Role definitions in load order, looked up by case-insensitive name.
#[derive(Debug, Default)]
pub struct DefinitionStore {
    definitions: Vec<RoleDefinition>,
    index: HashMap<String, usize>,
    skipped: Vec<SkippedDefinition>,
}

impl DefinitionStore {
    /// Load every `*.md` file in `root`, in file-name order.
    pub async fn load(root: &Path) -> Result<Self, EngineError> {
        let mut entries = fs::read_dir(root).await.map_err(|e| {
            EngineError::NoDefinitionsLoaded(format!("cannot read {}: {}", root.display(), e))
        })?;

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("md") && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut sources = Vec::with_capacity(paths.len());
        let mut unreadable = Vec::new();
        for path in paths {
            match fs::read_to_string(&path).await {
                Ok(text) => sources.push((path, text)),
                Err(e) => unreadable.push(SkippedDefinition {
                    path,
                    reason: e.to_string(),
                }),
            }
        }

        let mut store = Self::from_sources(sources);
        for skipped in &unreadable {
            warn!("Skipping role definition {}: {}", skipped.path.display(), skipped.reason);
        }
        store.skipped.extend(unreadable);

        if store.is_empty() {
            return Err(EngineError::NoDefinitionsLoaded(format!(
                "no valid role definitions in {} ({} skipped)",
                root.display(),
                store.skipped.len()
            )));
        }

        info!(
            "Loaded {} role definitions from {} ({} skipped)",
            store.len(),
            root.display(),
            store.skipped.len()
        );
        Ok(store)
    }

    /// Build from already-read documents. Never fails; check `is_empty`.
    pub fn from_sources(sources: Vec<(PathBuf, String)>) -> Self {
        let mut store = Self::default();
        for (path, text) in sources {
            match parse_definition(&path, &text) {
                Ok(definition) => store.insert(definition),
                Err(e) => {
                    warn!("Skipping role definition {}: {}", path.display(), e);
                    store.skipped.push(SkippedDefinition {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }
        store
    }

    fn insert(&mut self, definition: RoleDefinition) {
        let key = definition.name.to_lowercase();
        if let Some(&existing) = self.index.get(&key) {
            let reason = format!(
                "duplicate role name '{}' (already defined in {})",
                definition.name,
                self.definitions[existing].source.display()
            );
            warn!("Skipping role definition {}: {}", definition.source.display(), reason);
            self.skipped.push(SkippedDefinition {
                path: definition.source,
                reason,
            });
            return;
        }
        self.index.insert(key, self.definitions.len());
        self.definitions.push(definition);
    }

    pub fn get(&self, name: &str) -> Option<&RoleDefinition> {
        self.index
            .get(&name.to_lowercase())
            .map(|&i| &self.definitions[i])
    }

    /// Like `get`, but unknown names are an error.
    pub fn require(&self, name: &str) -> Result<&RoleDefinition, EngineError> {
        self.get(name)
            .ok_or_else(|| EngineError::UnknownRole(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.definitions.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoleDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn skipped(&self) -> &[SkippedDefinition] {
        &self.skipped
    }
}
