//! Demo harness for the recommendation engine.
//!
//! Seeds a small in-memory store and fixture catalog, then prints one
//! ranked run for a sample user.

use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use tracing::info;

use catalog::TasteStore;
use catalog::types::{CandidateDetails, FeatureRef, WatchEvent};
use discovery::FixtureProvider;
use engine::RecommendationEngine;
use ranking::SessionContext;

fn film(
    id: u32,
    title: &str,
    genres: &[(u32, &str)],
    director: (u32, &str),
    year: u16,
    popularity: f32,
) -> CandidateDetails {
    let mut d = CandidateDetails::new(id, title);
    d.genres = genres
        .iter()
        .map(|(id, name)| FeatureRef::new(*id, *name))
        .collect();
    d.directors = vec![FeatureRef::new(director.0, director.1)];
    d.release_year = Some(year);
    d.popularity = popularity;
    d.vote_average = 7.2;
    d.vote_count = 800;
    d
}

fn demo_films() -> Vec<CandidateDetails> {
    let horror = &[(27u32, "Horror"), (53, "Thriller")][..];
    vec![
        film(1, "Static Frequencies", horror, (1, "Harlan West"), 1986, 12.0),
        film(2, "Wedding Season", &[(10749, "Romance"), (35, "Comedy")], (3, "Paul Chen"), 2018, 80.0),
        film(3, "The Long Meadow", &[(18, "Drama")], (4, "Sofia Brandt"), 2005, 30.0),
        film(4, "Cellar Door II", horror, (2, "Iris Moreno"), 1989, 8.0),
        film(5, "Monsoon Run", &[(28, "Action"), (53, "Thriller")], (5, "Dele Akande"), 2012, 55.0),
        film(101, "The Shining Echo", horror, (1, "Harlan West"), 1981, 40.0),
        film(102, "Night Fixture", horror, (1, "Harlan West"), 1984, 25.0),
        film(103, "Cellar Door", horror, (2, "Iris Moreno"), 1988, 15.0),
    ]
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info,engine=debug,discovery=debug,ranking=debug")
        .init();

    info!("starting cinetaste demo harness");
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64;

    let mut store = TasteStore::new();
    for details in demo_films() {
        store.upsert_details(details.clone());
    }
    let user = 1;
    let day = 86_400;
    for (uri, id, rating) in [
        ("lib://101", 101u32, 4.5f32),
        ("lib://102", 102, 4.0),
        ("lib://103", 103, 5.0),
    ] {
        store.upsert_watch_event(
            user,
            WatchEvent::watched(uri, id)
                .with_rating(rating)
                .with_liked(true)
                .with_last_watched_at(now - 25 * day),
        );
    }

    let store = Arc::new(RwLock::new(store));
    let provider = Arc::new(FixtureProvider::new(demo_films()));
    let engine = RecommendationEngine::new(store, provider);

    let picks = engine.run(user, SessionContext::default(), now).await?;
    info!("received {} picks:", picks.len());
    for (i, pick) in picks.iter().enumerate() {
        let details = &pick.candidate.details;
        info!(
            "{}. {} ({}) - score {:.3} [{}]",
            i + 1,
            details.title,
            details
                .release_year
                .map(|y| y.to_string())
                .unwrap_or_else(|| "????".to_string()),
            pick.score,
            pick.candidate
                .channels
                .iter()
                .map(|c| c.label())
                .collect::<Vec<_>>()
                .join("+"),
        );
        if !pick.reasons.is_empty() {
            info!("   because: {}", pick.reasons.join("; "));
        }
    }

    Ok(())
}
