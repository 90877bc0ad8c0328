//! Fragment grouping engine: registry and completion sweeper.
//!
//! The registry is the single shared-mutable resource of the pipeline: file
//! events feed it concurrently, the sweeper drains it. Completed groups leave
//! through the sweeper's channel; abandoned ones are reported as events.

pub mod registry;
pub mod sweeper;

pub use registry::{FragmentGroup, GroupRegistry, GroupSnapshot, GroupState};
pub use sweeper::{CompletionSweeper, SweepReport, SweeperConfig};
