//! Context commands: snapshot, project updates and concept lookup.

use anyhow::{Context, Result, bail};
use colored::Colorize;
use serde_json::{Map, Value};

use super::{open, print_record};
use crate::config::Config;

/// Show the context snapshot for an optional query.
pub async fn snapshot(query: Option<&str>, json: bool, config: &Config) -> Result<()> {
    let memory = open(config)?;
    let snapshot = memory
        .context_snapshot(query)
        .await
        .context("Failed to build context snapshot")?;
    memory.close().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("{} Context ({})", "✓".green(), snapshot.session_id.dimmed());
    println!();

    match &snapshot.current_project {
        Some(project) => println!(
            "  Project: {} {}",
            project.project_name.cyan(),
            project.tech_stack.as_deref().unwrap_or("").dimmed()
        ),
        None => println!("  Project: {}", "none".dimmed()),
    }
    if let Some(name) = &snapshot.preferences.name {
        println!("  User:    {}", name);
    }
    println!();

    let sections = [
        ("Relevant memories", &snapshot.recent_memories),
        ("Relevant skills", &snapshot.relevant_skills),
        ("Recent conversation", &snapshot.recent_conversation),
    ];
    for (title, records) in sections {
        if records.is_empty() {
            continue;
        }
        println!("{}", title.bold());
        for (i, record) in records.iter().enumerate() {
            print_record(i + 1, record, None);
        }
    }

    if !snapshot.concepts.is_empty() {
        println!("{}", "Concepts".bold());
        for concept in &snapshot.concepts {
            println!(
                "  {} ×{} → {}",
                concept.concept.cyan(),
                concept.occurrence_count,
                concept.related_concepts.join(", ")
            );
        }
    }
    if !snapshot.suggested_tags.is_empty() {
        println!("  Suggested tags: {}", snapshot.suggested_tags.join(", "));
    }

    Ok(())
}

/// Replace a project's context.
pub async fn project(name: &str, tech: Option<&str>, data: Option<&str>, config: &Config) -> Result<()> {
    let context_data = match data {
        Some(raw) => match serde_json::from_str::<Value>(raw).context("Invalid --data JSON")? {
            Value::Object(map) => map,
            _ => bail!("--data must be a JSON object"),
        },
        None => Map::new(),
    };

    let memory = open(config)?;
    let context = memory
        .update_project_context(name, tech, context_data)
        .await
        .context("Failed to update project context")?;
    memory.close().await?;

    println!("{} Updated project {}", "✓".green(), context.project_name.cyan());
    if let Some(tech) = &context.tech_stack {
        println!("  Tech stack: {}", tech);
    }
    if !context.context_data.is_empty() {
        println!("  Data: {}", Value::Object(context.context_data.clone()));
    }
    println!("  Since: {}", context.created_at.format("%Y-%m-%d %H:%M"));

    Ok(())
}

/// Show knowledge graph concepts named in a query.
pub async fn concepts(query: &str, config: &Config) -> Result<()> {
    let memory = open(config)?;
    let owned = query.to_string();
    let insights = memory
        .with_engine(move |engine| Ok(engine.concepts(&owned)))
        .await?;
    memory.close().await?;

    if insights.is_empty() {
        println!("{} No known concepts in '{}'", "⚠".yellow(), query);
        return Ok(());
    }

    for insight in insights {
        println!(
            "{} {} (seen {}×, salience {:.1})",
            "•".cyan(),
            insight.concept.bold(),
            insight.occurrence_count,
            insight.salience
        );
        println!(
            "  {} → {}",
            insight.first_seen.format("%Y-%m-%d"),
            insight.last_seen.format("%Y-%m-%d")
        );
        if !insight.related_concepts.is_empty() {
            println!("  Related: {}", insight.related_concepts.join(", "));
        }
    }

    Ok(())
}
