//! Checkpoint/restore engine
//!
//! This crate orchestrates the lower layers:
//! - Coordinator: drives the two-phase cycle against a bound backend
//! - Backend: narrow interface to the external pause/resume primitive,
//!   resolved once from a fixed preference order
//! - Global: the process-wide coordinator and its context handle
//! - Config: `crac.toml` and environment overrides
//! - Management: time since the most recent restore

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod global;
pub mod management;

pub use backend::{
    resolve_backend, Backend, BackendCandidate, BackendError, ExecBackend, ProbeError,
    SimulatedBackend, KNOWN_BACKENDS,
};
pub use config::{ConfigError, CracConfig};
pub use coordinator::{Coordinator, CycleState};
#[allow(deprecated)]
pub use global::{
    checkpoint_restore, coordinator, global_context, init, management, register,
    try_checkpoint_restore, GlobalContext, InitError,
};
pub use management::{RestoreInfo, RestoreStats};
