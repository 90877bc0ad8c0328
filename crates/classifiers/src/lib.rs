//! Classification strategies for dropsort.
//!
//! All strategies implement the `dropsort_core::Strategy` trait. The
//! orchestrator runs them in priority order and always produces a result;
//! the builder selects which ones run based on configuration.

pub mod builder;
pub mod chat;
pub mod heuristic;
pub mod orchestrator;
pub mod web;

pub use builder::{build_orchestrator, build_strategies};
pub use chat::ChatStrategy;
pub use heuristic::HeuristicStrategy;
pub use orchestrator::{ClassificationOrchestrator, OrchestratorSettings};
pub use web::WebLookupStrategy;
