//! Weighted node-group placement decision engine.
//!
//! This crate holds no I/O entry points of its own; the controller, extender and scheduler
//! plug-in crates each drive it from their own event loop.

pub mod catalog;
pub mod crd;
pub mod engine;
pub mod error;
pub mod occupancy;
pub mod policy_index;
pub mod quota;

pub use catalog::{GroupCatalog, GroupView};
pub use crd::{NodeGroup, NodeGroupSpec, NodeGroupStatus, Policy, PolicySpec, PolicyStatus, ResourceSelector};
pub use engine::{pre_filter, filter, score, ScratchState, MAX_SCORE};
pub use error::{Error, Result};
pub use occupancy::OccupancyCounter;
pub use policy_index::PolicyIndex;
