//! # Catalog Crate
//!
//! Domain types and record storage for the cinetaste ranking pipeline.
//!
//! ## Main Components
//!
//! - **types**: watch history, candidate metadata, feedback, reliability
//!   priors, feature counters
//! - **store**: `TasteStore`, the per-user in-memory record store with
//!   idempotent last-write-wins upserts
//! - **ingest**: validated coercion of loosely-typed JSON payloads
//! - **error**: the crate error type
//!
//! Scoring lives in the `profile` and `ranking` crates; this crate only
//! defines the shapes and their storage contract.

pub mod error;
pub mod ingest;
pub mod store;
pub mod types;

pub use error::{CatalogError, Result};
pub use store::{ResolvedWatch, TasteStore};
pub use types::{
    Candidate,
    CandidateDetails,
    CatalogId,
    ConsensusLevel,
    DiscoveryChannel,
    FeatureId,
    FeatureKind,
    FeatureRef,
    FeatureStat,
    FeedbackEvent,
    FeedbackKind,
    ReliabilityPrior,
    UserId,
    WatchEvent,
};
