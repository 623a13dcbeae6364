//! Command-line front end for reference matching.
//!
//! Usage:
//!     docmatch --references refs.txt --paths files.txt search "Exhibit A5-02"
//!     docmatch --references refs.txt --paths files.txt series --apply
//!     docmatch --references refs.txt --paths files.txt --learning learning.json auto --threshold 0.85
//!     docmatch --references refs.txt --paths files.txt --learning learning.json stats

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use docmatch_explain::{explain_candidate, summarize_confidence};
use docmatch_session::{MatchingSession, SessionConfig};
use docmatch_store::{JsonFileStore, SnapshotStore};

#[derive(Parser)]
#[command(name = "docmatch")]
#[command(about = "Match document references to file paths")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// File with one reference per line
    #[arg(long)]
    references: PathBuf,

    /// File with one candidate path per line
    #[arg(long)]
    paths: PathBuf,

    /// Learning snapshot to load and update
    #[arg(long)]
    learning: Option<PathBuf>,

    /// Session configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text", global = true)]
    format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank candidate paths for a reference
    Search {
        /// Reference text to search
        reference: String,

        /// Maximum results
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Print the reasons behind each score
        #[arg(long)]
        explain: bool,
    },

    /// Detect series among the references
    Series {
        /// Confirm generated pairings whose paths exist
        #[arg(long)]
        apply: bool,
    },

    /// Confirm unambiguous top results above a threshold
    Auto {
        #[arg(short, long, default_value = "0.85")]
        threshold: f64,
    },

    /// Show learning statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("docmatch=debug".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.format != "text" && cli.format != "json" {
        bail!("unknown format '{}', expected text or json", cli.format);
    }

    let config = match &cli.config {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str::<SessionConfig>(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => SessionConfig::default(),
    };

    let references = read_lines(&cli.references).await?;
    let paths = read_lines(&cli.paths).await?;
    let mut session = MatchingSession::with_config(references, paths, config);

    let store = cli.learning.as_ref().map(JsonFileStore::new);
    if let Some(store) = &store {
        if let Some(snapshot) = store.load().await? {
            let report = session.import_learning_data(snapshot)?;
            for warning in &report.warnings {
                tracing::warn!(store = store.name(), "{warning}");
            }
        }
    }

    let learned = match cli.command {
        Commands::Search {
            reference,
            limit,
            explain,
        } => {
            run_search(&mut session, &reference, limit, explain, &cli.format).await?;
            false
        }
        Commands::Series { apply } => run_series(&mut session, apply, &cli.format)?,
        Commands::Auto { threshold } => run_auto(&mut session, threshold, &cli.format)?,
        Commands::Stats => {
            run_stats(&session, &cli.format)?;
            false
        }
    };

    if let (true, Some(store)) = (learned, &store) {
        store.save(&session.export_learning_data()).await?;
        println!("Saved learning data to {}", store.path().display());
    }

    Ok(())
}

async fn read_lines(path: &Path) -> Result<Vec<String>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

async fn run_search(
    session: &mut MatchingSession,
    reference: &str,
    limit: usize,
    explain: bool,
    format: &str,
) -> Result<()> {
    let job = session.begin_search(reference);
    let pool = job.pool_size();
    let batch = job.spawn().await?;
    let mut results = session.finish_search(batch).unwrap_or_default();
    results.truncate(limit);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    println!("Searching for: {}", reference);
    println!("Scored {} available candidates", pool);
    println!("---");

    for (i, result) in results.iter().enumerate() {
        println!("\n{}. {}", i + 1, result.path);
        println!(
            "   Score: {:.2} | Base: {:.2} | Learned: {:.3} | Context: {:.3}",
            result.score,
            result.breakdown.base_score,
            result.breakdown.pattern_bonus + result.breakdown.term_bonus,
            result.breakdown.context.total()
        );
        println!("   {}", summarize_confidence(result));

        if explain {
            for explanation in explain_candidate(result, reference) {
                println!("     - {}: {}", explanation.summary, explanation.detail);
            }
        }
    }

    println!("\n---");
    println!("Total: {} results", results.len());

    Ok(())
}

fn run_series(session: &mut MatchingSession, apply: bool, format: &str) -> Result<bool> {
    let groups = session.bulk_detect_series();
    let mut applied = 0;

    if format == "json" && !apply {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(false);
    }

    for group in &groups {
        let numbers: Vec<String> = group.items.iter().map(|i| i.number.to_string()).collect();
        println!(
            "\n{} '{}' ({} items, step {}, {:?}): {}",
            group.kind.label(),
            group.series_code,
            group.len(),
            group.increment.step,
            group.increment.pattern,
            numbers.join(", ")
        );

        let Some(plan) = session.suggest_series(group) else {
            println!("   No path template found");
            continue;
        };
        println!(
            "   Template: {} (from {}, score {:.2})",
            plan.template.pattern, plan.template.source_path, plan.template.score
        );

        if !apply {
            for suggestion in &plan.suggestions {
                println!("   {} -> {}", suggestion.reference, suggestion.path);
            }
            continue;
        }

        let outcome = session.apply_series(&plan);
        for m in &outcome.applied {
            println!("   + {} -> {}", m.reference, m.path);
        }
        for (reference, reason) in &outcome.skipped {
            println!("   - {} ({})", reference, reason);
        }
        applied += outcome.applied.len();
    }

    println!("\n---");
    println!("Series: {} | Applied: {}", groups.len(), applied);
    Ok(applied > 0)
}

fn run_auto(session: &mut MatchingSession, threshold: f64, format: &str) -> Result<bool> {
    let matched = session.auto_match(threshold)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&matched)?);
    } else {
        for m in &matched {
            println!("{:.2}  {} -> {}", m.score, m.reference, m.path);
        }
        println!("---");
        println!(
            "Matched {} of {} references",
            matched.len(),
            session.ledger().references().len()
        );
    }
    Ok(!matched.is_empty())
}

fn run_stats(session: &MatchingSession, format: &str) -> Result<()> {
    let stats = session.statistics();

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let learning = &stats.learning;
    println!("References: {} ({} matched)", stats.references, stats.matched_references);
    println!("Candidates: {} ({} available)", stats.candidates, stats.available_candidates);
    println!(
        "Samples: {} ({} confirmed, {} rejected)",
        learning.statistics.total_matches,
        learning.statistics.successful_matches,
        learning.statistics.failed_matches
    );
    println!("Success rate: {:.1}%", learning.success_rate * 100.0);
    println!("Average confidence: {:.2}", learning.statistics.average_confidence);
    println!(
        "Weights: word {:.3} | character {:.3} | learned {:.3}",
        learning.weights.word, learning.weights.character, learning.weights.learned
    );
    println!(
        "Patterns: {} | Term relationships: {}",
        learning.pattern_count, learning.term_relationship_count
    );
    Ok(())
}
