//! Core types and traits for checkpoint/restore coordination
//!
//! This crate defines the foundational pieces used throughout the system:
//! - Resource: participant notified before checkpoint and after restore
//! - Context: group of resources that fans notifications out
//! - Phase: which half of a cycle is running
//! - NestedErrors: ordered aggregate of independent failures from one phase
//! - CheckpointRestoreError: outcome of a failed cycle
//! - CheckpointCause: causes synthesized by the coordinator or a backend

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;

pub use error::{
    CheckpointCause, CheckpointRestoreError, CracResult, NestedErrors, Phase, ResourceResult,
};
pub use traits::{Context, Resource};
