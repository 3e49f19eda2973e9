// Cadre role recommender
// Main entry point for the cadre binary

use cadre_engine::cache::ContextCache;
use cadre_engine::cli::{Cli, Command};
use cadre_engine::conductor::{Conductor, ContextOptions};
use cadre_engine::config::Config;
use cadre_engine::definitions::DefinitionStore;
use cadre_engine::handlers::{
    handle_cache, handle_context, handle_recipes, handle_recommend, handle_roles, handle_run,
    parse_variables, OutputFormat,
};
use cadre_engine::selection::{AgentSelector, SelectionOptions};
use cadre_engine::telemetry::init_telemetry_with_level;
use clap::Parser;
use sdk::errors::{CadreErrorExt, EngineError};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<EngineError>() {
                Some(engine) => {
                    eprintln!("Error: {}", engine);
                    eprintln!("Hint: {}", engine.user_hint());
                }
                None => eprintln!("Error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config file; RUST_LOG wins over both
    let level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(level);

    tracing::info!("Cadre v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Recommend {
            task,
            max_agents,
            no_recipes,
            exclude,
            complexity,
        } => {
            tracing::info!("Recommending roles for: {}", task);
            let mut options = SelectionOptions::from_config(&config.selection);
            if let Some(max) = max_agents {
                options.max_agents = usize::from(max);
            }
            options.include_recipes &= !no_recipes;
            options.exclude_agents = exclude;
            options.preferred_complexity = complexity;

            let conductor = Conductor::new(config).await?;
            handle_recommend(&conductor, &task, &options, format)
        }

        Command::Context {
            role,
            task,
            path,
            vars,
        } => {
            tracing::info!("Preparing context for role: {}", role);
            let options = ContextOptions {
                task,
                context_path: path,
                variables: parse_variables(vars),
            };
            let conductor = Conductor::new(config).await?;
            handle_context(&conductor, &role, &options, format).await
        }

        Command::Run { task, path } => {
            tracing::info!("Executing task: {}", task);
            let conductor = Conductor::new(config).await?;
            handle_run(&conductor, &task, path, format).await
        }

        Command::Roles => {
            let definitions = DefinitionStore::load(&config.core.definitions_dir).await?;
            let selector = AgentSelector::builtin(&config.selection)?;
            handle_roles(&definitions, selector.registry(), format)
        }

        Command::Recipes => {
            let selector = AgentSelector::builtin(&config.selection)?;
            handle_recipes(selector.recipes(), format)
        }

        Command::Cache { action } => {
            tracing::info!("Cache management: {:?}", action);
            let cache = ContextCache::new(&config.cache);
            handle_cache(&cache, action, format).await
        }
    }
}
