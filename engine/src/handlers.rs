//! Command handlers
//!
//! Each handler runs one CLI command against the library and prints the
//! result as text or JSON.

use crate::cache::ContextCache;
use crate::cli::CacheAction;
use crate::conductor::{Conductor, ContextOptions, PreparedContext};
use crate::definitions::DefinitionStore;
use crate::selection::{RecipeMatcher, RoleRegistry, SelectionOptions};
use anyhow::Result;
use sdk::types::Recommendation;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// `KEY=VALUE` pairs to variables. Values that parse as JSON keep their type.
pub fn parse_variables(vars: Vec<(String, String)>) -> BTreeMap<String, Value> {
    vars.into_iter()
        .map(|(key, raw)| {
            let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            (key, value)
        })
        .collect()
}

pub fn handle_recommend(
    conductor: &Conductor,
    task: &str,
    options: &SelectionOptions,
    format: OutputFormat,
) -> Result<()> {
    let recommendation = conductor.recommend(task, options)?;
    match format {
        OutputFormat::Json => println!("{}", recommendation.to_json()),
        OutputFormat::Text => print_recommendation(&recommendation),
    }
    Ok(())
}

pub async fn handle_context(
    conductor: &Conductor,
    role: &str,
    options: &ContextOptions,
    format: OutputFormat,
) -> Result<()> {
    let prepared = conductor.prepare(role, options).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&prepared)?),
        OutputFormat::Text => print_context(&prepared),
    }
    Ok(())
}

pub async fn handle_run(
    conductor: &Conductor,
    task: &str,
    path: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let context = ContextOptions {
        context_path: path,
        ..ContextOptions::default()
    };
    let invocation = conductor
        .invoke(task, &conductor.default_options(), &context)
        .await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&invocation)?),
        OutputFormat::Text => {
            print_recommendation(&invocation.recommendation);
            match &invocation.context {
                Some(prepared) => {
                    println!();
                    print_context(prepared);
                }
                None => println!("\nNo recommended role has a definition document."),
            }
        }
    }
    Ok(())
}

pub fn handle_roles(
    definitions: &DefinitionStore,
    registry: &RoleRegistry,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let output = json!({
                "definitions": definitions.iter().collect::<Vec<_>>(),
                "profiles": registry.profiles(),
                "skipped": definitions
                    .skipped()
                    .iter()
                    .map(|s| json!({ "path": s.path, "reason": s.reason }))
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            println!("Role definitions ({}):", definitions.len());
            for definition in definitions.iter() {
                println!(
                    "  {:<24} {} (files ≤ {}, tokens ≤ {})",
                    definition.name,
                    definition.description,
                    definition.max_context_files,
                    definition.max_context_tokens
                );
            }
            for skipped in definitions.skipped() {
                println!("  ! skipped {}: {}", skipped.path.display(), skipped.reason);
            }

            println!("\nCapability profiles ({}):", registry.len());
            for profile in registry.profiles() {
                let marker = if definitions.get(&profile.name).is_some() {
                    "✓"
                } else {
                    " "
                };
                println!(
                    "  {} {:<24} {:?} - {}",
                    marker,
                    profile.name,
                    profile.complexity_handling,
                    profile.capabilities.join(", ")
                );
            }
        }
    }
    Ok(())
}

pub fn handle_recipes(recipes: &RecipeMatcher, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let output: Vec<Value> = recipes
                .recipes()
                .iter()
                .map(|r| {
                    json!({
                        "name": r.name,
                        "description": r.description,
                        "task_types": r.task_types,
                        "roles": r.roles,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            for recipe in recipes.recipes() {
                let types: Vec<&str> = recipe.task_types.iter().map(|t| t.as_str()).collect();
                println!("{} [{}]", recipe.name, types.join(", "));
                println!("  {}", recipe.description);
                println!("  roles: {}", recipe.roles.join(" → "));
            }
        }
    }
    Ok(())
}

pub async fn handle_cache(cache: &ContextCache, action: CacheAction, format: OutputFormat) -> Result<()> {
    match action {
        CacheAction::Stats => {
            let stats = cache.stats().await;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Text => {
                    println!("Entries:     {} ({} memory, {} disk)", stats.entries, stats.memory_entries, stats.disk_entries);
                    println!("Memory:      {} bytes", stats.memory_bytes);
                    println!("Hits/misses: {}/{} ({:.1}%)", stats.hits, stats.misses, stats.hit_rate * 100.0);
                    println!("Evictions:   {}", stats.evictions);
                    println!("Expirations: {}", stats.expirations);
                }
            }
        }
        CacheAction::Clear { prefix } => {
            let removed = cache.clear(prefix.as_deref()).await;
            match format {
                OutputFormat::Json => println!("{}", json!({ "removed": removed })),
                OutputFormat::Text => println!("Removed {} cache entries", removed),
            }
        }
    }
    Ok(())
}

fn print_recommendation(recommendation: &Recommendation) {
    println!(
        "Task type: {} ({})",
        recommendation.task_type, recommendation.estimated_complexity
    );
    println!("Confidence: {}%", recommendation.confidence);
    if let Some(recipe) = &recommendation.recipe {
        println!("Recipe: {}", recipe);
    }
    if recommendation.workflow_steps.is_empty() {
        println!("\nNo roles recommended.");
    } else {
        println!("\nWorkflow:");
        for step in &recommendation.workflow_steps {
            println!("  {}. {:<24} {}", step.step, step.role, step.purpose);
        }
    }
    println!("\n{}", recommendation.reasoning);
}

fn print_context(prepared: &PreparedContext) {
    println!("{}", prepared.text);
    eprintln!(
        "\n[{}] {} files, ~{} tokens, cache {}",
        prepared.role,
        prepared.files_included,
        prepared.estimated_tokens,
        if prepared.cache_hit { "hit" } else { "miss" }
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variables_keeps_json_types() {
        let vars = parse_variables(vec![
            ("count".to_string(), "3".to_string()),
            ("flags".to_string(), "[\"a\"]".to_string()),
            ("name".to_string(), "plain text".to_string()),
        ]);
        assert_eq!(vars["count"], json!(3));
        assert_eq!(vars["flags"], json!(["a"]));
        assert_eq!(vars["name"], json!("plain text"));
    }
}
