//! Memory commands: insert, recall, search, sweep and stats.

use anyhow::{Context, Result};
use colored::Colorize;
use mnemo_core::{NewMemory, RecallOptions, RetentionConfig, ScoredRecord};

use super::{open, parse_kind, print_record};
use crate::config::Config;

/// Store a memory.
#[allow(clippy::too_many_arguments)]
pub async fn insert(
    content: &str,
    kind: &str,
    importance: Option<f64>,
    tags: Vec<String>,
    skill: Option<String>,
    project: Option<String>,
    no_analysis: bool,
    config: &Config,
) -> Result<()> {
    let kind = parse_kind(kind)?;
    let memory = open(config)?;

    let mut new = NewMemory::new(content, kind).with_tags(tags);
    if let Some(importance) = importance {
        new = new.with_importance(importance);
    }
    if let Some(skill) = skill {
        new = new.with_skill(skill);
    }
    if let Some(project) = project {
        new = new.with_project(project);
    }
    if no_analysis {
        new = new.without_analysis();
    }

    let result = memory.insert(new).await;
    memory.close().await.context("Failed to close memory")?;

    match result {
        Ok(id) => {
            println!("{} Stored {} memory", "✓".green(), kind.as_str().cyan());
            println!("  ID: {}", id);
            Ok(())
        }
        Err(e) if e.is_storage_unavailable() => {
            println!(
                "{} Memory {} was not persisted: {}",
                "⚠".yellow(),
                e.record_id().unwrap_or("?"),
                e
            );
            Err(e).context("Failed to persist memory")
        }
        Err(e) => Err(e).context("Failed to store memory"),
    }
}

/// Recall memories matching a query.
pub async fn recall(
    query: &str,
    kinds: Vec<String>,
    limit: Option<usize>,
    min_importance: f64,
    durable: bool,
    json: bool,
    config: &Config,
) -> Result<()> {
    let kinds = kinds
        .iter()
        .map(|k| parse_kind(k))
        .collect::<Result<Vec<_>>>()?;

    let mut options = RecallOptions::new().kinds(kinds).min_importance(min_importance);
    if let Some(limit) = limit {
        options = options.max_results(limit);
    }
    if durable {
        options = options.durable();
    }

    let memory = open(config)?;
    let records = memory
        .recall(query, options)
        .await
        .context("Failed to recall memories")?;
    memory.close().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("{} No memories found matching '{}'", "⚠".yellow(), query);
        return Ok(());
    }

    println!("{} Found {} memories:", "✓".green(), records.len());
    println!();
    for (i, record) in records.iter().enumerate() {
        print_record(i + 1, record, None);
    }

    Ok(())
}

/// Semantic or hybrid search.
pub async fn search(
    query: &str,
    k: usize,
    threshold: Option<f32>,
    hybrid: bool,
    json: bool,
    config: &Config,
) -> Result<()> {
    let memory = open(config)?;
    let semantic_enabled = memory.stats().await?.semantic_enabled;
    let results: Vec<ScoredRecord> = if hybrid {
        memory.hybrid_search(query, k, None).await
    } else {
        memory.semantic_search(query, k, threshold).await
    }
    .context("Search failed")?;
    memory.close().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if !semantic_enabled {
        println!(
            "{} No embedding backend; results come from keyword recall",
            "⚠".yellow()
        );
    }
    if results.is_empty() {
        println!("{} Nothing similar to '{}'", "⚠".yellow(), query);
        return Ok(());
    }

    println!("{} {} results:", "✓".green(), results.len());
    println!();
    for (i, hit) in results.iter().enumerate() {
        print_record(i + 1, &hit.record, Some(hit.score));
    }

    Ok(())
}

/// Run the retention sweep.
pub async fn sweep(dry_run: bool, days: Option<i64>, floor: Option<f64>, config: &Config) -> Result<()> {
    let defaults = &config.memory.retention;
    let policy = RetentionConfig {
        max_age_days: days.unwrap_or(defaults.max_age_days),
        importance_floor: floor.unwrap_or(defaults.importance_floor),
    };

    let memory = open(config)?;
    let report = memory
        .with_engine(move |engine| engine.sweep_with(&policy, dry_run))
        .await
        .context("Retention sweep failed")?;
    memory.close().await?;

    let verb = if report.dry_run { "Would remove" } else { "Removed" };
    println!("{} {} {} memories", "✓".green(), verb, report.removed());
    if let Some(cutoff) = report.cutoff {
        println!("  Older than: {}", cutoff.format("%Y-%m-%d %H:%M"));
    }
    if report.dry_run {
        for id in &report.removed_ids {
            println!("  {}", id.dimmed());
        }
    }

    Ok(())
}

/// Show memory statistics.
pub async fn stats(json: bool, config: &Config) -> Result<()> {
    let memory = open(config)?;
    let stats = memory.stats().await.context("Failed to get memory stats")?;
    memory.close().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{} Memory Statistics", "📊".cyan());
    println!();
    println!("  Total memories: {}", stats.total_stored().to_string().bold());
    println!();
    println!("  By kind (stored / in memory):");
    for kind in mnemo_core::MemoryKind::ALL {
        let stored = stats.stored.get(&kind).copied().unwrap_or(0);
        let in_memory = stats.in_memory.get(&kind).copied().unwrap_or(0);
        println!("    {:<11} {} / {}", kind.as_str(), stored.to_string().cyan(), in_memory);
    }
    println!();
    println!("  Concepts:      {}", stats.concepts);
    match &stats.embedder {
        Some(name) => println!("  Vector index:  {} slots ({})", stats.vector_slots, name.green()),
        None => println!("  Vector index:  {}", "disabled".yellow()),
    }
    println!("  Data dir:      {}", config.paths.data_dir.display());

    Ok(())
}
