//! Experiment generation and remote synchronization for optimization trials
//!
//! This crate provides the core functionality for:
//! - Scanning manifests into applications and generating experiments
//! - Rendering patch, metric and Helm value templates
//! - Summarizing experiment lifecycle phases
//! - Translating experiments and trials to and from the remote service model

pub mod api;
pub mod application;
pub mod error;
pub mod experiment;
pub mod generation;
pub mod observability;
pub mod patch;
pub mod quantity;
pub mod remote;
pub mod scan;
pub mod server;
pub mod template;

pub use application::ApplicationGenerator;
pub use error::{Error, Result};
pub use experiment::{summarize, Phase};
pub use generation::{guess_scenario_and_objective, ExperimentGenerator};
pub use observability::StructuredLogger;
pub use patch::{create_patches, Patch, PatchTarget};
