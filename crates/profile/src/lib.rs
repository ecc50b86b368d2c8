//! # Profile Crate
//!
//! Taste learning for the cinetaste pipeline.
//!
//! ## Main Components
//!
//! - **taste**: `TasteProfileBuilder` aggregates watch history and feedback
//!   counters into a weighted `TasteProfile`
//! - **signature**: `SignatureScorer` ranks the user's own films to pick
//!   discovery seeds
//! - **learner**: `FeedbackLearner` applies and reverses feedback deltas
//!   against the store
//!
//! Profiles are rebuilt from decayed sources on every run. Nothing in this
//! crate reads the clock: `now` is always an argument, so every result is
//! deterministic given its inputs.

pub mod learner;
pub mod signature;
pub mod taste;

pub use learner::FeedbackLearner;
pub use signature::{SignatureConfig, SignatureScore, SignatureScorer};
pub use taste::{FeatureWeight, ProfileConfig, TasteProfile, TasteProfileBuilder};
