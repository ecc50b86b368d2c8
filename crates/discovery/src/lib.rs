//! # Discovery Crate
//!
//! The boundary between the ranking pipeline and candidate discovery
//! collaborators.
//!
//! ## Main Components
//!
//! - **provider**: `DiscoveryProvider`, the async contract every discovery
//!   source implements
//! - **merge**: `merge_channels` combines per-channel id lists into an
//!   attributed, filtered pool
//! - **fetch**: `DetailFetcher`, a bounded retrying pool for metadata
//!   resolution
//! - **fixture**: `FixtureProvider`, a deterministic table-backed provider
//!   for tests, demos, and offline runs
//!
//! Channel queries return bare id lists so fan-out stays cheap; only the
//! merged survivors pay for a detail lookup.

pub mod error;
pub mod fetch;
pub mod fixture;
pub mod merge;
pub mod provider;

pub use error::{DiscoveryError, Result};
pub use fetch::{DetailFetcher, FetcherConfig};
pub use fixture::FixtureProvider;
pub use merge::{MergedCandidate, PoolExclusions, merge_channels};
pub use provider::DiscoveryProvider;
