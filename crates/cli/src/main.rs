//! cinetaste command line interface.
//!
//! Works over three JSON files: a film catalog, a watch library, and a
//! feedback log. The catalog and library are read-only inputs; the feedback
//! log is the only file this tool writes.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;
use tracing::warn;

use catalog::types::{FeatureKind, FeedbackEvent, FeedbackKind, UserId};
use catalog::{CatalogId, TasteStore, ingest};
use discovery::FixtureProvider;
use engine::RecommendationEngine;
use profile::{FeedbackLearner, SignatureScorer, TasteProfile, TasteProfileBuilder};
use ranking::{ScoredCandidate, SessionContext, SessionTone};

/// cinetaste - personal film ranking
#[derive(Parser)]
#[command(name = "cinetaste")]
#[command(about = "Rank film suggestions against your own watch history", long_about = None)]
struct Cli {
    /// Path to the film catalog JSON file
    #[arg(long, default_value = "data/catalog.json")]
    catalog: PathBuf,

    /// Path to the watch library JSON file
    #[arg(long, default_value = "data/library.json")]
    library: PathBuf,

    /// Path to the feedback log JSON file
    #[arg(long, default_value = "data/feedback.json")]
    feedback: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Get ranked suggestions for a user
    Recommend {
        /// User ID to rank for
        #[arg(long)]
        user: UserId,

        /// Number of suggestions to return
        #[arg(long, default_value = "10")]
        limit: usize,

        /// Session tone: any, short, weeknight, family
        #[arg(long, default_value = "any")]
        tone: String,

        /// Show the reasons behind each suggestion
        #[arg(long)]
        explain: bool,
    },

    /// Show a user's taste profile
    Profile {
        /// User ID to display
        #[arg(long)]
        user: UserId,

        /// Entries to show per feature kind
        #[arg(long, default_value = "5")]
        per_kind: usize,
    },

    /// Show a user's signature films, strongest first
    Signature {
        /// User ID to display
        #[arg(long)]
        user: UserId,

        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Record feedback on a suggestion
    Feedback {
        #[arg(long)]
        user: UserId,

        /// Catalog id of the film
        #[arg(long)]
        film: CatalogId,

        /// One of: positive, skip, block, win, loss
        #[arg(long)]
        kind: String,

        /// Optional free-form reasons
        #[arg(long)]
        reason: Vec<String>,
    },

    /// Remove the active feedback on a film
    Undo {
        #[arg(long)]
        user: UserId,

        #[arg(long)]
        film: CatalogId,
    },

    /// Run repeated ranking requests and report latencies
    Benchmark {
        /// Number of requests to make
        #[arg(long, default_value = "50")]
        requests: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let films = load_catalog(&cli.catalog)?;
    let library = load_library(&cli.library)?;
    let feedback = load_feedback(&cli.feedback)?;
    let store = build_store(&films, &library, &feedback);
    let now = unix_now()?;

    match cli.command {
        Commands::Recommend {
            user,
            limit,
            tone,
            explain,
        } => handle_recommend(store, films, user, limit, &tone, explain, now).await?,
        Commands::Profile { user, per_kind } => handle_profile(&store, user, per_kind, now)?,
        Commands::Signature { user, limit } => handle_signature(&store, user, limit, now)?,
        Commands::Feedback {
            user,
            film,
            kind,
            reason,
        } => handle_feedback(&cli.feedback, store, feedback, user, film, &kind, reason, now)?,
        Commands::Undo { user, film } => handle_undo(&cli.feedback, store, feedback, user, film)?,
        Commands::Benchmark { requests } => {
            handle_benchmark(store, films, library, requests, now).await?
        }
    }

    Ok(())
}

fn unix_now() -> Result<i64> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before the unix epoch")?;
    Ok(now.as_secs() as i64)
}

fn load_catalog(path: &Path) -> Result<Vec<catalog::CandidateDetails>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog file {}", path.display()))?;
    let values: Vec<Value> = serde_json::from_str(&raw)
        .with_context(|| format!("catalog file {} is not a JSON array", path.display()))?;

    let mut films = Vec::with_capacity(values.len());
    for value in &values {
        match ingest::candidate_from_value(value) {
            Ok(details) => films.push(details),
            Err(err) => warn!(error = %err, "skipping malformed catalog row"),
        }
    }
    Ok(films)
}

/// Library rows are watch events tagged with a `user_id` field.
fn load_library(path: &Path) -> Result<Vec<(UserId, catalog::WatchEvent)>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read library file {}", path.display()))?;
    let values: Vec<Value> = serde_json::from_str(&raw)
        .with_context(|| format!("library file {} is not a JSON array", path.display()))?;

    let mut rows = Vec::with_capacity(values.len());
    for value in &values {
        let Some(user) = value.get("user_id").and_then(Value::as_u64) else {
            warn!("skipping library row without a user_id");
            continue;
        };
        match ingest::watch_event_from_value(value) {
            Ok(event) => rows.push((user as UserId, event)),
            Err(err) => warn!(error = %err, "skipping malformed library row"),
        }
    }
    Ok(rows)
}

fn load_feedback(path: &Path) -> Result<Vec<FeedbackEvent>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read feedback file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("feedback file {} is not a list of events", path.display()))
}

fn save_feedback(path: &Path, events: &[FeedbackEvent]) -> Result<()> {
    let raw = serde_json::to_string_pretty(events)?;
    fs::write(path, raw)
        .with_context(|| format!("failed to write feedback file {}", path.display()))
}

/// Build the in-memory store: catalog details, watch history, then the
/// feedback log replayed in recorded order.
fn build_store(
    films: &[catalog::CandidateDetails],
    library: &[(UserId, catalog::WatchEvent)],
    feedback: &[FeedbackEvent],
) -> TasteStore {
    let mut store = TasteStore::new();
    for details in films {
        store.upsert_details(details.clone());
    }
    for (user, event) in library {
        store.upsert_watch_event(*user, event.clone());
    }
    let learner = FeedbackLearner::new();
    for event in feedback {
        learner.apply(&mut store, event.clone());
    }
    store
}

fn build_profile(store: &TasteStore, user: UserId, now: i64) -> TasteProfile {
    let watches = store.resolved_watches(user);
    let stats = store.feature_stats(user);
    TasteProfileBuilder::default().build(user, &watches, &stats, now)
}

async fn handle_recommend(
    store: TasteStore,
    films: Vec<catalog::CandidateDetails>,
    user: UserId,
    limit: usize,
    tone: &str,
    explain: bool,
    now: i64,
) -> Result<()> {
    let tone = SessionTone::parse(tone)
        .ok_or_else(|| anyhow!("unknown tone '{tone}', expected any/short/weeknight/family"))?;

    let store = Arc::new(RwLock::new(store));
    let provider = Arc::new(FixtureProvider::new(films));
    let engine = RecommendationEngine::with_config(
        store,
        provider,
        engine::EngineConfig {
            limit,
            ..engine::EngineConfig::default()
        },
    );

    let start = Instant::now();
    let picks = engine
        .run(user, SessionContext::with_tone(tone), now)
        .await
        .context("ranking run failed")?;
    println!(
        "{} Ranked {} suggestions in {:?}",
        "✓".green(),
        picks.len(),
        start.elapsed()
    );
    print_picks(&picks, explain);
    Ok(())
}

fn print_picks(picks: &[ScoredCandidate], explain: bool) {
    println!("{}", "Suggestions:".bold().blue());
    for (i, pick) in picks.iter().enumerate() {
        let details = &pick.candidate.details;
        let genres = details
            .genres
            .iter()
            .map(|g| g.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{}. {} ({}) [{}] - score {:.2}",
            (i + 1).to_string().green(),
            details.title,
            details
                .release_year
                .map(|y| y.to_string())
                .unwrap_or_else(|| "????".to_string()),
            genres,
            pick.score,
        );
        if explain {
            for reason in &pick.reasons {
                println!("   - {reason}");
            }
            for (feature, titles) in &pick.contributing_films {
                println!("   {} {} (because you watched {})", "•".cyan(), feature, titles.join(", "));
            }
        }
    }
}

fn handle_profile(store: &TasteStore, user: UserId, per_kind: usize, now: i64) -> Result<()> {
    let profile = build_profile(store, user, now);
    if profile.is_empty() {
        bail!("user {user} has no watch history");
    }

    println!("{}", format!("Taste profile for user {user}").bold().blue());
    println!("History size: {}", profile.history_size);
    for kind in [
        FeatureKind::Genre,
        FeatureKind::Keyword,
        FeatureKind::Director,
        FeatureKind::Actor,
        FeatureKind::Studio,
        FeatureKind::Decade,
    ] {
        let preferred = profile.preferred(kind);
        if !preferred.is_empty() {
            println!("{}", format!("Preferred {}s:", kind.label()).bold());
            for fw in preferred.iter().take(per_kind) {
                println!(
                    "  {} {} ({:.2}, {} films)",
                    "•".green(),
                    fw.feature.name,
                    fw.weight,
                    fw.samples
                );
            }
        }
        let avoided = profile.avoided(kind);
        if !avoided.is_empty() {
            println!("{}", format!("Avoided {}s:", kind.label()).bold());
            for fw in avoided.iter().take(per_kind) {
                println!("  {} {} ({:.2})", "•".red(), fw.feature.name, fw.weight);
            }
        }
    }
    Ok(())
}

fn handle_signature(store: &TasteStore, user: UserId, limit: usize, now: i64) -> Result<()> {
    let profile = build_profile(store, user, now);
    let watches = store.resolved_watches(user);
    let signatures = SignatureScorer::default().score_history(&watches, &profile);
    if signatures.is_empty() {
        bail!("user {user} has no watched films");
    }

    println!("{}", format!("Signature films for user {user}").bold().blue());
    for (i, sig) in signatures.iter().take(limit).enumerate() {
        println!(
            "{}. {} - {:.2} ({})",
            (i + 1).to_string().green(),
            sig.title,
            sig.score,
            sig.reasons.join(", ")
        );
    }
    Ok(())
}

fn parse_feedback_kind(kind: &str) -> Result<FeedbackKind> {
    match kind.to_ascii_lowercase().as_str() {
        "positive" => Ok(FeedbackKind::Positive),
        "skip" => Ok(FeedbackKind::NegativeSoft),
        "block" => Ok(FeedbackKind::NegativeHard),
        "win" => Ok(FeedbackKind::PairwiseWin),
        "loss" => Ok(FeedbackKind::PairwiseLoss),
        other => bail!("unknown feedback kind '{other}', expected positive/skip/block/win/loss"),
    }
}

fn handle_feedback(
    path: &Path,
    mut store: TasteStore,
    mut log: Vec<FeedbackEvent>,
    user: UserId,
    film: CatalogId,
    kind: &str,
    reasons: Vec<String>,
    now: i64,
) -> Result<()> {
    if store.details(film).is_none() {
        bail!("film {film} is not in the catalog");
    }
    let kind = parse_feedback_kind(kind)?;
    let event = FeedbackEvent {
        user_id: user,
        candidate_id: film,
        kind,
        reasons,
        created_at: now,
        // Channel attribution is only known inside a live run; feedback
        // recorded from the CLI carries none.
        channels: Vec::new(),
        consensus_at_time: catalog::ConsensusLevel::Low,
    };
    FeedbackLearner::new().apply(&mut store, event.clone());

    // One active event per (user, film) in the log, matching the store.
    log.retain(|e| !(e.user_id == user && e.candidate_id == film));
    log.push(event);
    save_feedback(path, &log)?;

    let title = store
        .details(film)
        .map(|d| d.title.clone())
        .unwrap_or_default();
    println!("{} Recorded {:?} on {}", "✓".green(), kind, title);
    if store.is_blocked(user, film) {
        println!("  {} is now excluded from future suggestions", title);
    } else if store.is_dismissed(user, film) {
        println!("  {} will rank lower until you undo this", title);
    }
    Ok(())
}

fn handle_undo(
    path: &Path,
    mut store: TasteStore,
    mut log: Vec<FeedbackEvent>,
    user: UserId,
    film: CatalogId,
) -> Result<()> {
    let undone = FeedbackLearner::new().undo(&mut store, user, film);
    if undone.is_none() {
        bail!("no active feedback for user {user} on film {film}");
    }
    log.retain(|e| !(e.user_id == user && e.candidate_id == film));
    save_feedback(path, &log)?;
    println!("{} Feedback on film {film} removed", "✓".green());
    Ok(())
}

async fn handle_benchmark(
    store: TasteStore,
    films: Vec<catalog::CandidateDetails>,
    library: Vec<(UserId, catalog::WatchEvent)>,
    requests: usize,
    now: i64,
) -> Result<()> {
    let users: Vec<UserId> = library
        .iter()
        .map(|(user, _)| *user)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    if users.is_empty() {
        bail!("the library has no users to benchmark");
    }

    let store = Arc::new(RwLock::new(store));
    let provider = Arc::new(FixtureProvider::new(films));
    let engine = Arc::new(RecommendationEngine::new(store, provider));

    let mut timings = Vec::with_capacity(requests);
    for _ in 0..requests {
        let user = users[rand::random::<u32>() as usize % users.len()];
        let start = Instant::now();
        engine
            .run(user, SessionContext::default(), now)
            .await
            .context("benchmark run failed")?;
        timings.push(start.elapsed());
    }

    let total: std::time::Duration = timings.iter().sum();
    let avg = total / timings.len() as u32;
    timings.sort();
    let p50 = timings[timings.len() / 2];
    let p95 = timings[(timings.len() as f32 * 0.95) as usize];
    let p99 = timings[(timings.len() as f32 * 0.99) as usize];

    println!("Benchmark results:");
    println!("Total time: {total:?}");
    println!("Average latency: {avg:?}");
    println!("P50 latency: {p50:?}");
    println!("P95 latency: {p95:?}");
    println!("P99 latency: {p99:?}");
    println!(
        "Throughput: {:.2} requests/second",
        requests as f32 / total.as_secs_f32()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog_rows() -> Vec<Value> {
        vec![
            json!({
                "id": 1,
                "title": "Static Frequencies",
                "genres": [{"id": 27, "name": "Horror"}],
                "release_year": 1986,
                "popularity": 12.0
            }),
            json!({
                "id": 2,
                "title": "Wedding Season",
                "genres": [{"id": 10749, "name": "Romance"}],
                "release_year": 2018,
                "popularity": 80.0
            }),
            json!({"title": "No Id Here"}),
        ]
    }

    #[test]
    fn malformed_catalog_rows_are_skipped_not_fatal() {
        let films: Vec<catalog::CandidateDetails> = catalog_rows()
            .iter()
            .filter_map(|v| ingest::candidate_from_value(v).ok())
            .collect();
        assert_eq!(films.len(), 2, "the id-less row drops out");
    }

    #[test]
    fn feedback_replay_reconstructs_store_state() {
        let films: Vec<catalog::CandidateDetails> = catalog_rows()
            .iter()
            .filter_map(|v| ingest::candidate_from_value(v).ok())
            .collect();
        let feedback = vec![FeedbackEvent {
            user_id: 1,
            candidate_id: 2,
            kind: FeedbackKind::NegativeHard,
            reasons: vec![],
            created_at: 1_700_000_000,
            channels: Vec::new(),
            consensus_at_time: catalog::ConsensusLevel::Low,
        }];
        let store = build_store(&films, &[], &feedback);
        assert!(store.is_blocked(1, 2));
        assert!(!store.is_blocked(1, 1));
    }

    #[tokio::test]
    async fn ranking_is_deterministic_for_fixed_inputs() {
        let films: Vec<catalog::CandidateDetails> = catalog_rows()
            .iter()
            .filter_map(|v| ingest::candidate_from_value(v).ok())
            .collect();
        let now = 1_700_000_000;

        let mut runs = Vec::new();
        for _ in 0..2 {
            let store = Arc::new(RwLock::new(build_store(&films, &[], &[])));
            let provider = Arc::new(FixtureProvider::new(films.clone()));
            let engine = RecommendationEngine::new(store, provider);
            let picks = engine
                .run(1, SessionContext::default(), now)
                .await
                .expect("run");
            runs.push(
                picks
                    .iter()
                    .map(|p| (p.id(), p.score))
                    .collect::<Vec<_>>(),
            );
        }
        assert_eq!(runs[0], runs[1], "same inputs must rank identically");
    }

    #[test]
    fn feedback_kind_parsing_covers_the_full_vocabulary() {
        assert!(matches!(
            parse_feedback_kind("positive").unwrap(),
            FeedbackKind::Positive
        ));
        assert!(matches!(
            parse_feedback_kind("SKIP").unwrap(),
            FeedbackKind::NegativeSoft
        ));
        assert!(matches!(
            parse_feedback_kind("block").unwrap(),
            FeedbackKind::NegativeHard
        ));
        assert!(parse_feedback_kind("meh").is_err());
    }
}
