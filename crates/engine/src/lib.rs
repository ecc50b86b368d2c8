//! Engine crate for the cinetaste ranking pipeline.
//!
//! This crate contains the engine that coordinates all components of a
//! ranked run, plus the per-user generation tokens that let newer requests
//! supersede in-flight ones.

pub mod orchestrator;

pub use orchestrator::{EngineConfig, EngineError, RecommendationEngine, Result};
