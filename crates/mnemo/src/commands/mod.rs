//! Command implementations for mnemo CLI.
//!
//! Each submodule implements the logic for a command group.

pub mod context;
pub mod memory;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use mnemo_core::{MemoryEngine, MemoryKind, MemoryRecord, SharedMemory};

use crate::config::Config;

/// Open the memory engine for this invocation
pub fn open(config: &Config) -> Result<SharedMemory> {
    let engine = MemoryEngine::open(config.engine_config()).with_context(|| {
        format!("Failed to open memory at {}", config.paths.data_dir.display())
    })?;
    Ok(SharedMemory::new(engine))
}

/// Parse a kind name, accepting short aliases
pub fn parse_kind(kind: &str) -> Result<MemoryKind> {
    let canonical = match kind {
        "w" | "work" => "working",
        "e" | "episode" => "episodic",
        "p" | "skill" => "procedural",
        "proj" => "project",
        "s" | "fact" => "semantic",
        other => other,
    };
    match MemoryKind::from_str(canonical) {
        Some(kind) => Ok(kind),
        None => bail!(
            "Invalid kind: {}. Use: working, episodic, procedural, project, or semantic",
            kind
        ),
    }
}

fn kind_display(kind: MemoryKind) -> colored::ColoredString {
    match kind {
        MemoryKind::Working => kind.as_str().yellow(),
        MemoryKind::Episodic => kind.as_str().cyan(),
        MemoryKind::Procedural => kind.as_str().magenta(),
        MemoryKind::Project => kind.as_str().blue(),
        MemoryKind::Semantic => kind.as_str().green(),
    }
}

/// Print a single record
pub fn print_record(index: usize, record: &MemoryRecord, score: Option<f64>) {
    let score = score
        .map(|s| format!(" score {:.3}", s))
        .unwrap_or_default();
    println!(
        "{}. [{}] {}{}",
        index,
        kind_display(record.kind),
        record.id.dimmed(),
        score.dimmed()
    );
    println!("   {}", record.content);

    let mut details = vec![
        format!("importance {:.2}", record.importance),
        record.created_at.format("%Y-%m-%d %H:%M").to_string(),
    ];
    if let Some(skill) = record.attributes.skill_name() {
        details.push(format!("skill {}", skill));
    }
    if let Some(project) = record.attributes.project_name() {
        details.push(format!("project {}", project));
    }
    if !record.tags.is_empty() {
        let tags: Vec<&str> = record.tags.iter().map(String::as_str).collect();
        details.push(format!("tags {}", tags.join(", ")));
    }
    println!("   {}", details.join(" · ").dimmed());
    println!();
}
