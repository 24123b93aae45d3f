//! Pause/resume backends and their one-time resolution
//!
//! A backend is the narrow entry point to whatever actually snapshots and
//! restores the process. The coordinator never looks inside it: it calls
//! [`Backend::checkpoint_restore`] once per cycle and interprets the result.
//!
//! Backends are discovered once at startup from a fixed, ordered candidate
//! list. Each candidate has a probe that either yields a bound backend or
//! explains why it is not usable here. With no candidate resolving, the
//! coordinator runs in unsupported mode for the life of the process.

pub mod exec;
pub mod simulated;

pub use exec::ExecBackend;
pub use simulated::SimulatedBackend;

use crate::config::CracConfig;
use crac_core::CheckpointCause;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Name of the external-executable backend
pub const EXEC_ENGINE: &str = "execengine";
/// Name of the simulated backend
pub const SIM_ENGINE: &str = "simengine";

/// Outcome of a failed pause/resume call
#[derive(Debug, Error)]
pub enum BackendError {
    /// The process was not paused; causes join the checkpoint aggregate
    #[error("checkpoint refused with {} cause(s)", .0.len())]
    CheckpointRefused(Vec<CheckpointCause>),

    /// The process resumed but the backend reported problems restoring
    #[error("restore completed with {} problem(s)", .0.len())]
    RestoreIncomplete(Vec<CheckpointCause>),

    /// The backend could not be reached at all
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// The external pause/resume primitive
pub trait Backend: Send + Sync {
    /// Name used in logs and diagnostics
    fn name(&self) -> &str;

    /// Checkpoint the process and return once it has been restored
    ///
    /// May block for an unbounded, externally controlled time. On return the
    /// caller may be running in a different process instance.
    fn checkpoint_restore(&self) -> Result<(), BackendError>;
}

/// Why a candidate backend could not be bound
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The facility is not present on this system
    #[error("not installed: {0}")]
    NotInstalled(String),

    /// Present but missing required configuration
    #[error("misconfigured: {0}")]
    Misconfigured(String),

    /// Only bound when named by the engine override
    #[error("must be selected explicitly")]
    ExplicitOnly,
}

/// Probe function for a candidate
pub type ProbeFn = fn(&CracConfig, bool) -> Result<Arc<dyn Backend>, ProbeError>;

/// A known backend and how to detect it
#[derive(Clone, Copy)]
pub struct BackendCandidate {
    /// Name matched against the engine override
    pub name: &'static str,
    /// Capability check; the flag is true when selected by override
    pub probe: ProbeFn,
}

impl std::fmt::Debug for BackendCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendCandidate")
            .field("name", &self.name)
            .finish()
    }
}

/// Known backends in preference order
pub static KNOWN_BACKENDS: &[BackendCandidate] = &[
    BackendCandidate {
        name: EXEC_ENGINE,
        probe: exec::probe,
    },
    BackendCandidate {
        name: SIM_ENGINE,
        probe: simulated::probe,
    },
];

/// Bind a backend from the known candidates
pub fn resolve_backend(config: &CracConfig) -> Option<Arc<dyn Backend>> {
    resolve_from(KNOWN_BACKENDS, config)
}

/// Bind a backend from an explicit candidate list
///
/// With an engine override only the named candidate is probed. Otherwise
/// candidates are probed in order and the first success wins. Probe failures
/// are logged and fall through.
pub fn resolve_from(
    candidates: &[BackendCandidate],
    config: &CracConfig,
) -> Option<Arc<dyn Backend>> {
    let selected: Vec<&BackendCandidate> = match &config.engine {
        Some(name) => candidates
            .iter()
            .filter(|c| c.name == name.as_str())
            .collect(),
        None => candidates.iter().collect(),
    };
    let explicit = config.engine.is_some();

    for candidate in selected {
        match (candidate.probe)(config, explicit) {
            Ok(backend) => {
                info!(target: "crac::backend", backend = candidate.name, "Bound checkpoint/restore backend");
                return Some(backend);
            }
            Err(e) => {
                debug!(target: "crac::backend", backend = candidate.name, error = %e, "Backend probe failed");
            }
        }
    }

    info!(
        target: "crac::backend",
        engine = config.engine.as_deref().unwrap_or("<auto>"),
        "No checkpoint/restore backend available; running unsupported"
    );
    None
}
