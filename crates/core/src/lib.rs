//! # dropsort Core
//!
//! Domain types, traits, and error definitions for dropsort.
//! This crate has **no runtime wiring**: it defines the domain model that
//! the grouping engine, the classifier chain and the pipeline implement
//! against.
//!
//! ## Design Philosophy
//!
//! Every collaborator is a trait here (`Strategy`, `Extractor`, `Router`).
//! Implementations live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod classify;
pub mod error;
pub mod event;
pub mod fragment;
pub mod group;
pub mod handoff;

// Re-export key types at crate root for ergonomics
pub use classify::{
    Answer, Asset, AssetType, ClassificationMethod, ClassificationResult, Confidence, Strategy,
};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use fragment::{FragmentDescriptor, parse_fragment, parse_fragment_path};
pub use group::{AbandonedGroup, CompletedGroup, GroupStatus};
pub use handoff::{Extractor, Router};
