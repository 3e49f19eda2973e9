//! Conductor
//!
//! Owns every component, built once from validated config, and runs
//! recommendation and context preparation under the invocation timeout.

pub mod context;
pub mod tokens;

pub use context::{ContextAssembler, ContextOptions, PreparedContext};
pub use tokens::{estimate_tokens, estimate_tokens_as, ContentKind};

use crate::cache::ContextCache;
use crate::config::Config;
use crate::definitions::DefinitionStore;
use crate::fs_guard::SecurityGate;
use crate::loader::ConcurrentFileLoader;
use crate::sanitizer::ContentSanitizer;
use crate::selection::{AgentSelector, SelectionOptions};
use sdk::errors::EngineError;
use sdk::types::Recommendation;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Recommendation plus the context prepared for its lead role.
#[derive(Debug, Clone, Serialize)]
pub struct Invocation {
    pub recommendation: Recommendation,
    /// `None` when no recommended role has a loaded definition
    pub context: Option<PreparedContext>,
}

pub struct Conductor {
    config: Config,
    gate: Arc<SecurityGate>,
    loader: Arc<ConcurrentFileLoader>,
    cache: Arc<ContextCache>,
    definitions: Arc<DefinitionStore>,
    selector: AgentSelector,
    assembler: ContextAssembler,
    timeout: Duration,
}

impl Conductor {
    /// Load role definitions from `core.definitions_dir` and wire everything up.
    pub async fn new(config: Config) -> Result<Self, EngineError> {
        let definitions = DefinitionStore::load(&config.core.definitions_dir).await?;
        Self::with_definitions(config, definitions)
    }

    /// Wire up with an already loaded definition store.
    pub fn with_definitions(config: Config, definitions: DefinitionStore) -> Result<Self, EngineError> {
        if definitions.is_empty() {
            return Err(EngineError::NoDefinitionsLoaded(
                "definition store is empty".to_string(),
            ));
        }

        let gate = Arc::new(SecurityGate::new(&config.security));
        let loader = Arc::new(ConcurrentFileLoader::new(
            Arc::clone(&gate),
            config.loader.clone(),
        ));
        let cache = Arc::new(ContextCache::new(&config.cache));
        let definitions = Arc::new(definitions);
        let sanitizer = ContentSanitizer::new().map_err(|e| EngineError::Config(e.to_string()))?;
        let selector =
            AgentSelector::builtin(&config.selection).map_err(|e| EngineError::Config(e.to_string()))?;
        let assembler = ContextAssembler::new(
            Arc::clone(&definitions),
            Arc::clone(&gate),
            Arc::clone(&loader),
            Arc::clone(&cache),
            sanitizer,
        );

        for profile in selector.registry().profiles() {
            if definitions.get(&profile.name).is_none() {
                warn!("Role {} has no definition document", profile.name);
            }
        }

        info!(
            "Conductor ready: {} definitions, {} roles, {} recipes",
            definitions.len(),
            selector.registry().len(),
            selector.recipes().recipes().len()
        );

        Ok(Self {
            timeout: Duration::from_secs(config.selection.invocation_timeout_secs),
            config,
            gate,
            loader,
            cache,
            definitions,
            selector,
            assembler,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn gate(&self) -> &SecurityGate {
        &self.gate
    }

    pub fn loader(&self) -> &ConcurrentFileLoader {
        &self.loader
    }

    pub fn cache(&self) -> &ContextCache {
        &self.cache
    }

    pub fn definitions(&self) -> &DefinitionStore {
        &self.definitions
    }

    pub fn selector(&self) -> &AgentSelector {
        &self.selector
    }

    /// Selection options seeded from config.
    pub fn default_options(&self) -> SelectionOptions {
        SelectionOptions::from_config(&self.config.selection)
    }

    /// Recommend roles for a task.
    pub fn recommend(&self, task: &str, options: &SelectionOptions) -> Result<Recommendation, EngineError> {
        self.selector.select_agents(task, options)
    }

    /// Prepare a role's context within the invocation timeout.
    pub async fn prepare(&self, role: &str, options: &ContextOptions) -> Result<PreparedContext, EngineError> {
        self.bounded(self.assembler.prepare_context(role, options)).await
    }

    /// Recommend, then prepare context for the first recommended role that
    /// has a definition. Both steps share one timeout.
    pub async fn invoke(
        &self,
        task: &str,
        selection: &SelectionOptions,
        context: &ContextOptions,
    ) -> Result<Invocation, EngineError> {
        self.bounded(async {
            let recommendation = self.selector.select_agents(task, selection)?;
            let lead = recommendation
                .roles
                .iter()
                .find(|role| self.definitions.get(role).is_some())
                .cloned();

            let context = match lead {
                Some(role) => {
                    let options = ContextOptions {
                        task: context.task.clone().or_else(|| Some(task.to_string())),
                        ..context.clone()
                    };
                    Some(self.assembler.prepare_context(&role, &options).await?)
                }
                None => {
                    warn!("No recommended role has a definition; skipping context");
                    None
                }
            };

            Ok(Invocation {
                recommendation,
                context,
            })
        })
        .await
    }

    async fn bounded<T>(
        &self,
        work: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout(self.timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Invocation exceeded {}s; partial work discarded", self.timeout.as_secs());
                Err(EngineError::InvocationTimeout(self.timeout.as_secs()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn definitions() -> DefinitionStore {
        let doc = |name: &str| {
            format!("---\nname: {}\n---\n# Prompt Template\nYou are the {}.\n", name, name)
        };
        DefinitionStore::from_sources(vec![
            (PathBuf::from("debugger.md"), doc("debugger")),
            (PathBuf::from("test-engineer.md"), doc("test-engineer")),
        ])
    }

    fn config(root: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.security.allowed_roots = vec![root.to_path_buf()];
        config.core.definitions_dir = root.join("agents");
        config.cache.cache_dir = root.join("cache");
        config
    }

    #[tokio::test]
    async fn test_invoke_prepares_lead_role() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("main.rs"), "fn main() {}").unwrap();
        let conductor = Conductor::with_definitions(config(temp.path()), definitions()).unwrap();

        let context = ContextOptions {
            context_path: Some(temp.path().to_path_buf()),
            ..ContextOptions::default()
        };
        let invocation = conductor
            .invoke(
                "Fix login timeout bug causing 500 errors",
                &conductor.default_options(),
                &context,
            )
            .await
            .unwrap();

        let prepared = invocation.context.unwrap();
        assert_eq!(prepared.role, "debugger");
        assert!(prepared.text.contains("## Task\nFix login timeout bug"));
        assert_eq!(prepared.files_included, 1);
    }

    #[tokio::test]
    async fn test_empty_store_is_rejected() {
        let temp = TempDir::new().unwrap();
        let result = Conductor::with_definitions(config(temp.path()), DefinitionStore::default());
        assert!(matches!(result, Err(EngineError::NoDefinitionsLoaded(_))));
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let temp = TempDir::new().unwrap();
        let mut config = config(temp.path());
        config.selection.invocation_timeout_secs = 0;
        let conductor = Conductor::with_definitions(config, definitions()).unwrap();

        let slow = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        };
        let err = conductor.bounded(slow).await.unwrap_err();
        assert!(matches!(err, EngineError::InvocationTimeout(0)));
    }

    #[tokio::test]
    async fn test_timed_out_prepare_caches_nothing() {
        let temp = TempDir::new().unwrap();
        for i in 0..300 {
            std::fs::write(
                temp.path().join(format!("module_{:03}.rs", i)),
                format!("pub fn handler_{}() -> u32 {{ {} }}\n", i, i).repeat(40),
            )
            .unwrap();
        }
        let mut config = config(temp.path());
        config.selection.invocation_timeout_secs = 0;
        let mut conductor = Conductor::with_definitions(config, definitions()).unwrap();
        let options = ContextOptions {
            context_path: Some(temp.path().to_path_buf()),
            ..ContextOptions::default()
        };

        let err = conductor.prepare("debugger", &options).await.unwrap_err();
        assert!(matches!(err, EngineError::InvocationTimeout(0)));
        assert_eq!(conductor.cache().stats().await.entries, 0);

        conductor.timeout = Duration::from_secs(30);
        let prepared = conductor.prepare("debugger", &options).await.unwrap();
        assert!(!prepared.cache_hit);
        assert!(prepared.files_included > 0);
    }
}
