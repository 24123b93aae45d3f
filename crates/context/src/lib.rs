//! Notification contexts for checkpoint/restore coordination
//!
//! This crate implements:
//! - WeakRegistry: ordered registry that holds resources weakly and pins
//!   them only while a cycle is notifying them
//! - OrderedContext: named group of resources that fans both notifications
//!   out in registration order, aggregating failures per phase

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod registry;

pub use context::OrderedContext;
pub use registry::{RegistrationHandle, WeakRegistry, DEFAULT_SWEEP_THRESHOLD};
