//! Validated ingress for loosely-typed JSON payloads.
//!
//! External payloads arrive as `serde_json::Value` and are coerced field by
//! field rather than deserialized strictly: numbers may arrive as strings,
//! lists may be missing entirely, and entries inside lists may be malformed.
//! The posture is fail-closed: anything unusable becomes empty or `None`,
//! and only a record with no identity at all is rejected.

use serde_json::Value;
use tracing::warn;

use crate::error::{CatalogError, Result};
use crate::types::{CandidateDetails, CatalogId, FeatureRef, WatchEvent};

/// Build candidate metadata from an untrusted JSON object.
///
/// Only a missing or unparseable `id` is an error; every other field falls
/// back to its empty default so partial metadata still scores.
pub fn candidate_from_value(value: &Value) -> Result<CandidateDetails> {
    let obj = value
        .as_object()
        .ok_or(CatalogError::NotAnObject { found: value_kind(value) })?;

    let id = obj
        .get("id")
        .and_then(coerce_u32)
        .ok_or(CatalogError::MissingId)?;

    let mut details = CandidateDetails::new(id, coerce_string(obj.get("title")));
    details.genres = feature_list(obj.get("genres"));
    details.keywords = feature_list(obj.get("keywords"));
    details.directors = feature_list(obj.get("directors"));
    details.actors = feature_list(obj.get("actors"));
    details.studios = feature_list(obj.get("studios"));
    details.release_year = obj.get("release_year").and_then(coerce_u32).and_then(|y| {
        if (1870..=2100).contains(&y) {
            Some(y as u16)
        } else {
            warn!(id, year = y, "dropping out-of-range release year");
            None
        }
    });
    details.runtime_minutes = obj.get("runtime_minutes").and_then(coerce_u32);
    details.popularity = obj.get("popularity").and_then(coerce_f32).unwrap_or(0.0);
    details.vote_average = obj.get("vote_average").and_then(coerce_f32).unwrap_or(0.0);
    details.vote_count = obj.get("vote_count").and_then(coerce_u32).unwrap_or(0);
    Ok(details)
}

/// Build a watch-history row from an untrusted JSON object.
///
/// `uri` is the upsert key and the only required field. A rating outside the
/// half-star range 0.5..=5.0 is dropped rather than rejected.
pub fn watch_event_from_value(value: &Value) -> Result<WatchEvent> {
    let obj = value
        .as_object()
        .ok_or(CatalogError::NotAnObject { found: value_kind(value) })?;

    let uri = match obj.get("uri").and_then(Value::as_str) {
        Some(uri) if !uri.is_empty() => uri.to_string(),
        _ => return Err(CatalogError::MissingId),
    };

    let rating = obj.get("rating").and_then(coerce_f32).and_then(|r| {
        if (0.5..=5.0).contains(&r) && (r * 2.0).fract() == 0.0 {
            Some(r)
        } else {
            warn!(%uri, rating = r, "dropping invalid rating");
            None
        }
    });

    let watch_count = obj.get("watch_count").and_then(coerce_u32).unwrap_or(1);

    Ok(WatchEvent {
        uri,
        catalog_id: obj.get("catalog_id").and_then(coerce_u32),
        rating,
        liked: obj.get("liked").and_then(Value::as_bool).unwrap_or(false),
        rewatch: watch_count > 1,
        watch_count,
        last_watched_at: obj.get("last_watched_at").and_then(coerce_i64),
        on_watchlist: obj
            .get("on_watchlist")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        watchlist_added_at: obj.get("watchlist_added_at").and_then(coerce_i64),
    })
}

/// Coerce a `[{id, name}, ...]` array, skipping entries without a usable id.
fn feature_list(value: Option<&Value>) -> Vec<FeatureRef> {
    let Some(Value::Array(entries)) = value else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let obj = entry.as_object()?;
            let id: CatalogId = obj.get("id").and_then(coerce_u32)?;
            Some(FeatureRef::new(id, coerce_string(obj.get("name"))))
        })
        .collect()
}

/// Accept a JSON number or a numeric string.
fn coerce_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_f32(value: &Value) -> Option<f32> {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_string(value: Option<&Value>) -> String {
    value.and_then(Value::as_str).unwrap_or("").to_string()
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn candidate_requires_only_an_id() {
        let details = candidate_from_value(&json!({ "id": 603 })).unwrap();
        assert_eq!(details.id, 603);
        assert_eq!(details.title, "");
        assert!(details.genres.is_empty());
        assert_eq!(details.release_year, None);
        assert_eq!(details.popularity, 0.0);
    }

    #[test]
    fn candidate_without_id_is_rejected() {
        let err = candidate_from_value(&json!({ "title": "The Matrix" })).unwrap_err();
        assert!(matches!(err, CatalogError::MissingId));
    }

    #[test]
    fn candidate_coerces_string_numbers() {
        let details = candidate_from_value(&json!({
            "id": "603",
            "release_year": "1999",
            "popularity": "84.5",
            "vote_count": "21000"
        }))
        .unwrap();
        assert_eq!(details.id, 603);
        assert_eq!(details.release_year, Some(1999));
        assert_eq!(details.vote_count, 21_000);
        assert!((details.popularity - 84.5).abs() < f32::EPSILON);
    }

    #[test]
    fn malformed_feature_entries_are_skipped() {
        let details = candidate_from_value(&json!({
            "id": 603,
            "genres": [
                { "id": 878, "name": "Science Fiction" },
                { "name": "no id" },
                "not an object",
                { "id": "28", "name": "Action" }
            ]
        }))
        .unwrap();
        assert_eq!(details.genres.len(), 2);
        assert_eq!(details.genres[0].id, 878);
        assert_eq!(details.genres[1].name, "Action");
    }

    #[test]
    fn out_of_range_release_year_is_dropped() {
        let details = candidate_from_value(&json!({ "id": 1, "release_year": 19999 })).unwrap();
        assert_eq!(details.release_year, None);
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let err = candidate_from_value(&json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, CatalogError::NotAnObject { found: "array" }));
    }

    #[test]
    fn watch_event_requires_uri() {
        let err = watch_event_from_value(&json!({ "catalog_id": 603 })).unwrap_err();
        assert!(matches!(err, CatalogError::MissingId));
    }

    #[test]
    fn watch_event_coerces_and_derives_rewatch() {
        let event = watch_event_from_value(&json!({
            "uri": "film/the-matrix",
            "catalog_id": 603,
            "rating": 4.5,
            "liked": true,
            "watch_count": 3,
            "last_watched_at": 1700000000
        }))
        .unwrap();
        assert_eq!(event.catalog_id, Some(603));
        assert_eq!(event.rating, Some(4.5));
        assert!(event.liked);
        assert!(event.rewatch, "watch_count above one implies rewatch");
        assert_eq!(event.last_watched_at, Some(1_700_000_000));
    }

    #[test]
    fn invalid_ratings_are_dropped_not_rejected() {
        for bad in [0.0, 5.5, 4.3, -1.0] {
            let event = watch_event_from_value(&json!({
                "uri": "film/x",
                "rating": bad
            }))
            .unwrap();
            assert_eq!(event.rating, None, "rating {bad} should be dropped");
        }
    }

    #[test]
    fn watchlist_fields_pass_through() {
        let event = watch_event_from_value(&json!({
            "uri": "film/dune",
            "on_watchlist": true,
            "watchlist_added_at": 1690000000,
            "watch_count": 0
        }))
        .unwrap();
        assert!(event.on_watchlist);
        assert_eq!(event.watchlist_added_at, Some(1_690_000_000));
        assert_eq!(event.watch_count, 0);
        assert!(!event.rewatch);
    }
}
