//! CLI argument definitions using clap derive macros.

use clap::{Parser, Subcommand};

/// Mnemo - personal knowledge-retention memory
///
/// Store what you say, learn and work on; recall it when it matters.
#[derive(Parser, Debug)]
#[command(name = "mnemo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store a memory
    Insert {
        /// Content to remember
        content: String,

        /// Memory kind: working, episodic, procedural, project, semantic
        #[arg(short, long, default_value = "episodic")]
        kind: String,

        /// Importance (0.0 - 1.0); estimated from the content when omitted
        #[arg(short, long)]
        importance: Option<f64>,

        /// Tags for categorization
        #[arg(short = 'T', long = "tag", action = clap::ArgAction::Append)]
        tags: Vec<String>,

        /// Skill name (procedural memories)
        #[arg(long)]
        skill: Option<String>,

        /// Project name (project memories)
        #[arg(long)]
        project: Option<String>,

        /// Skip automatic tagging and importance estimation
        #[arg(long)]
        no_analysis: bool,
    },

    /// Recall memories matching a query
    Recall {
        /// Search text (matched against content, tags, skill and project names)
        query: String,

        /// Restrict to these kinds
        #[arg(short, long = "kind", action = clap::ArgAction::Append)]
        kinds: Vec<String>,

        /// Maximum results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Minimum importance (0.0 - 1.0)
        #[arg(short = 'm', long, default_value = "0.0")]
        min_importance: f64,

        /// Search every stored record, not just the in-memory tiers
        #[arg(long)]
        durable: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Semantic (or hybrid) search
    Search {
        /// Search text
        query: String,

        /// Number of results
        #[arg(short, default_value = "5")]
        k: usize,

        /// Minimum similarity (-1.0 - 1.0)
        #[arg(short, long)]
        threshold: Option<f32>,

        /// Fuse semantic and keyword results
        #[arg(long)]
        hybrid: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the context snapshot for a query
    Context {
        /// Query to recall against
        query: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Update a project's context
    Project {
        /// Project name
        name: String,

        /// Technology stack description
        #[arg(short, long)]
        tech: Option<String>,

        /// Extra context as a JSON object
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Knowledge graph concepts mentioned in a query
    Concepts {
        /// Text to look up
        query: String,
    },

    /// Delete old, unimportant memories
    Sweep {
        /// Show what would be removed without deleting
        #[arg(long)]
        dry_run: bool,

        /// Age threshold in days (default from config)
        #[arg(long)]
        days: Option<i64>,

        /// Importance floor (default from config)
        #[arg(long)]
        floor: Option<f64>,
    },

    /// Show memory statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version
    Version,
}
