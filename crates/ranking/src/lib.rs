//! Scoring and reranking of discovered candidates.
//!
//! This crate provides:
//! - OverlapScorer for taste-profile overlap scoring with explanations
//! - SourceReliabilityWeighter for per-channel multipliers from feedback
//! - DiversityReranker for MMR-based diversity selection
//! - SessionContext for per-request mood biasing
//!
//! ## Architecture
//! Ranking runs in stages:
//! 1. Reliability multipliers are precomputed per candidate (sequential)
//! 2. OverlapScorer scores the pool against the taste profile (parallel)
//! 3. DiversityReranker selects the final top-k with MMR
//!
//! ## Example Usage
//! ```ignore
//! use ranking::{DiversityReranker, OverlapScorer, SourceReliabilityWeighter};
//!
//! let weighter = SourceReliabilityWeighter::default();
//! let multipliers = weighter.multipliers_for(user, &priors, &candidates);
//!
//! let scored = OverlapScorer::default()
//!     .score(&profile, &candidates, &multipliers, &dismissed, session);
//! let picks = DiversityReranker::default().rerank(scored, 10);
//! ```

pub mod mmr;
pub mod overlap;
pub mod reliability;
pub mod session;

// Re-export main types
pub use mmr::DiversityReranker;
pub use overlap::{OverlapScorer, RankingWeights, ScoredCandidate};
pub use reliability::{PriorSnapshot, ReliabilityConfig, SourceReliabilityWeighter};
pub use session::{SessionContext, SessionTone};
