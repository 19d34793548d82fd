//! mnemo - personal knowledge-retention memory CLI
//!
//! Thin front-end over mnemo-core: every command opens the engine on the
//! configured data directory, runs one operation and closes it.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cli;
mod commands;
mod config;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("mnemo_core=warn".parse()?))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = config::Config::load()?;

    // Execute command
    match cli.command {
        Commands::Insert {
            content,
            kind,
            importance,
            tags,
            skill,
            project,
            no_analysis,
        } => {
            commands::memory::insert(&content, &kind, importance, tags, skill, project, no_analysis, &config)
                .await
        }
        Commands::Recall {
            query,
            kinds,
            limit,
            min_importance,
            durable,
            json,
        } => commands::memory::recall(&query, kinds, limit, min_importance, durable, json, &config).await,
        Commands::Search {
            query,
            k,
            threshold,
            hybrid,
            json,
        } => commands::memory::search(&query, k, threshold, hybrid, json, &config).await,
        Commands::Context { query, json } => {
            commands::context::snapshot(query.as_deref(), json, &config).await
        }
        Commands::Project { name, tech, data } => {
            commands::context::project(&name, tech.as_deref(), data.as_deref(), &config).await
        }
        Commands::Concepts { query } => commands::context::concepts(&query, &config).await,
        Commands::Sweep { dry_run, days, floor } => {
            commands::memory::sweep(dry_run, days, floor, &config).await
        }
        Commands::Stats { json } => commands::memory::stats(json, &config).await,
        Commands::Version => {
            println!("mnemo {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
