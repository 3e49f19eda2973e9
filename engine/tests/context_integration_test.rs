//! Context preparation through the `Conductor`, with role documents and
//! project files on disk.

use cadre_engine::conductor::{Conductor, ContextOptions};
use cadre_engine::config::Config;
use sdk::errors::EngineError;
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const DEBUGGER: &str = "\
---
name: debugger
description: Finds root causes
max_context_files: 5
max_context_tokens: 4000
---

# Prompt Template
You are the debugger. Reproduce first, then fix.
";

const REVIEWER: &str = "\
---
name: code-reviewer
description: Reviews changes
---

# Prompt Template
You review code.
";

struct Fixture {
    temp: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let agents = temp.path().join("agents");
        let project = temp.path().join("project");
        fs::create_dir_all(&agents).unwrap();
        fs::create_dir_all(project.join("src")).unwrap();

        fs::write(agents.join("debugger.md"), DEBUGGER).unwrap();
        fs::write(agents.join("code-reviewer.md"), REVIEWER).unwrap();
        fs::write(project.join("src/login.rs"), "fn login() -> Result<(), Timeout> { todo() }").unwrap();
        fs::write(project.join("README.md"), "# Login service").unwrap();

        Self { temp }
    }

    fn root(&self) -> &Path {
        self.temp.path()
    }

    fn project(&self) -> std::path::PathBuf {
        self.temp.path().join("project")
    }

    fn config(&self) -> Config {
        let mut config = Config::default();
        config.core.definitions_dir = self.root().join("agents");
        config.security.allowed_roots = vec![self.project()];
        config.cache.cache_dir = self.root().join("cache");
        config
    }
}

#[tokio::test]
async fn test_context_is_cached_between_calls() {
    let fixture = Fixture::new();
    let conductor = Conductor::new(fixture.config()).await.unwrap();

    let options = ContextOptions {
        task: Some("Fix login timeout".to_string()),
        context_path: Some(fixture.project()),
        ..ContextOptions::default()
    };

    let first = conductor.prepare("debugger", &options).await.unwrap();
    assert!(!first.cache_hit);
    assert_eq!(first.files_included, 2);
    assert!(first.text.starts_with("You are the debugger."));
    assert!(first.text.contains("<file path=\"README.md\">"));
    assert!(first.text.contains("fn login() -&gt; Result&lt;(), Timeout&gt;"));

    let second = conductor.prepare("debugger", &options).await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.text, first.text);
    assert_eq!(second.files_included, first.files_included);

    // The second call never touched the filesystem
    assert_eq!(conductor.loader().loads_performed(), 1);

    let stats = conductor.cache().stats().await;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn test_cache_hit_is_faster_than_miss() {
    let fixture = Fixture::new();
    for i in 0..150 {
        fs::write(
            fixture.project().join(format!("src/module_{:03}.rs", i)),
            format!("pub fn handler_{}() -> u32 {{ {} }}\n", i, i).repeat(20),
        )
        .unwrap();
    }
    let conductor = Conductor::new(fixture.config()).await.unwrap();
    let options = ContextOptions {
        context_path: Some(fixture.project()),
        ..ContextOptions::default()
    };

    let started = std::time::Instant::now();
    let miss = conductor.prepare("debugger", &options).await.unwrap();
    let miss_time = started.elapsed();

    let started = std::time::Instant::now();
    let hit = conductor.prepare("debugger", &options).await.unwrap();
    let hit_time = started.elapsed();

    assert!(!miss.cache_hit);
    assert!(hit.cache_hit);
    assert!(hit_time < miss_time, "hit {:?} vs miss {:?}", hit_time, miss_time);
}

#[tokio::test]
async fn test_roles_are_cached_separately() {
    let fixture = Fixture::new();
    let conductor = Conductor::new(fixture.config()).await.unwrap();
    let options = ContextOptions {
        context_path: Some(fixture.project()),
        ..ContextOptions::default()
    };

    conductor.prepare("debugger", &options).await.unwrap();
    let reviewer = conductor.prepare("Code-Reviewer", &options).await.unwrap();

    assert!(!reviewer.cache_hit);
    assert_eq!(reviewer.role, "code-reviewer");
    assert_eq!(conductor.loader().loads_performed(), 2);
}

#[tokio::test]
async fn test_outside_content_never_appears() {
    let fixture = Fixture::new();
    fs::write(fixture.root().join("secret.txt"), "TOP-SECRET-VALUE").unwrap();
    #[cfg(unix)]
    std::os::unix::fs::symlink(
        fixture.root().join("secret.txt"),
        fixture.project().join("src/secret.txt"),
    )
    .unwrap();

    let conductor = Conductor::new(fixture.config()).await.unwrap();

    // Whole project, including the symlink
    let project = conductor
        .prepare(
            "debugger",
            &ContextOptions {
                context_path: Some(fixture.project()),
                ..ContextOptions::default()
            },
        )
        .await
        .unwrap();
    assert!(!project.text.contains("TOP-SECRET-VALUE"));

    // A path outside the allowed root
    let outside = conductor
        .prepare(
            "debugger",
            &ContextOptions {
                context_path: Some(fixture.project().join("../secret.txt")),
                ..ContextOptions::default()
            },
        )
        .await
        .unwrap();
    assert!(!outside.text.contains("TOP-SECRET-VALUE"));
    assert_eq!(outside.files_included, 0);
    assert!(outside
        .warnings
        .iter()
        .any(|w| w.contains("outside allowed roots")));
}

#[tokio::test]
async fn test_variables_are_rendered() {
    let fixture = Fixture::new();
    let conductor = Conductor::new(fixture.config()).await.unwrap();

    let mut options = ContextOptions::default();
    options.variables.insert("ticket".to_string(), json!(4521));
    options.variables.insert("branch".to_string(), json!("fix/login"));

    let prepared = conductor.prepare("debugger", &options).await.unwrap();
    assert!(prepared.text.contains("## Variables\n```json\n"));
    assert!(prepared.text.contains("\"ticket\": 4521"));
    assert!(prepared.text.contains("\"branch\": \"fix/login\""));
    assert!(!prepared.text.contains("## Context"));
}

#[tokio::test]
async fn test_unknown_role_is_an_error() {
    let fixture = Fixture::new();
    let conductor = Conductor::new(fixture.config()).await.unwrap();

    let err = conductor
        .prepare("wizard", &ContextOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownRole(_)));
}

#[tokio::test]
async fn test_invoke_runs_both_stages() {
    let fixture = Fixture::new();
    let conductor = Conductor::new(fixture.config()).await.unwrap();

    let invocation = conductor
        .invoke(
            "Fix login timeout bug causing 500 errors",
            &conductor.default_options(),
            &ContextOptions {
                context_path: Some(fixture.project()),
                ..ContextOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(invocation.recommendation.roles[0], "debugger");
    let context = invocation.context.unwrap();
    assert_eq!(context.role, "debugger");
    assert!(context.text.contains("## Task\nFix login timeout bug causing 500 errors"));
}

#[tokio::test]
async fn test_missing_definitions_dir_fails_startup() {
    let fixture = Fixture::new();
    let mut config = fixture.config();
    config.core.definitions_dir = fixture.root().join("nowhere");

    let result = Conductor::new(config).await;
    assert!(matches!(result, Err(EngineError::NoDefinitionsLoaded(_))));
}
