//! Coordinated checkpoint/restore notification
//!
//! Components that hold external state (sockets, file descriptors, timers,
//! caches) register as [`Resource`]s. When a checkpoint/restore cycle is
//! requested, every live resource is told to quiesce before the pause and to
//! re-acquire its state after resume, in registration order, with each
//! resource's failure isolated and reported together with the others.
//!
//! Registration never keeps a resource alive: drop your last `Arc` and the
//! resource is gone, notification or not.
//!
//! # Quick Start
//!
//! ```ignore
//! use crac::{Context, Resource, ResourceResult};
//! use std::sync::Arc;
//!
//! struct Cache;
//!
//! impl Resource for Cache {
//!     fn before_checkpoint(&self, _ctx: &dyn Context) -> ResourceResult { Ok(()) }
//!     fn after_restore(&self, _ctx: &dyn Context) -> ResourceResult { Ok(()) }
//! }
//!
//! let cache = Arc::new(Cache);
//! crac::register(cache.clone());
//!
//! match crac::checkpoint_restore() {
//!     Ok(()) => println!("restored"),
//!     Err(e) if e.is_unsupported() => println!("no checkpoint backend"),
//!     Err(e) => eprint!("{}", e.report()),
//! }
//! ```
//!
//! # Backend selection
//!
//! The pause/resume primitive is bound once per process, from `CRAC_ENGINE`
//! (or [`init`] with an explicit [`CracConfig`]). Without a usable backend
//! every cycle fails as unsupported and no resource is notified.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub use crac_context::{OrderedContext, RegistrationHandle, WeakRegistry};
pub use crac_core::{
    CheckpointCause, CheckpointRestoreError, Context, CracResult, NestedErrors, Phase, Resource,
    ResourceResult,
};
#[allow(deprecated)]
pub use crac_engine::{
    checkpoint_restore, global_context, init, management, register, try_checkpoint_restore,
    Backend, BackendError, ConfigError, Coordinator, CracConfig, CycleState, ExecBackend,
    GlobalContext, InitError, RestoreInfo, RestoreStats, SimulatedBackend,
};

/// Backend interfaces and resolution
pub mod backend {
    pub use crac_engine::backend::*;
}
