//! Simulated pause/resume
//!
//! Returns immediately as if the process had been checkpointed and restored
//! in place. Useful for exercising resources in tests and development; it is
//! only bound when selected explicitly, so production never silently
//! "succeeds" without a real checkpoint.

use super::{Backend, BackendError, ProbeError, SIM_ENGINE};
use crate::config::CracConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Backend that pretends to pause and resume
#[derive(Debug, Default)]
pub struct SimulatedBackend {
    cycles: AtomicU64,
}

impl SimulatedBackend {
    /// Create a new simulated backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of simulated pauses so far
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }
}

impl Backend for SimulatedBackend {
    fn name(&self) -> &str {
        SIM_ENGINE
    }

    fn checkpoint_restore(&self) -> Result<(), BackendError> {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(target: "crac::backend", cycle, "Simulated checkpoint and restore");
        Ok(())
    }
}

pub(crate) fn probe(_config: &CracConfig, explicit: bool) -> Result<Arc<dyn Backend>, ProbeError> {
    if !explicit {
        return Err(ProbeError::ExplicitOnly);
    }
    Ok(Arc::new(SimulatedBackend::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_cycle_counts() {
        let backend = SimulatedBackend::new();
        assert_eq!(backend.cycles(), 0);
        backend.checkpoint_restore().unwrap();
        backend.checkpoint_restore().unwrap();
        assert_eq!(backend.cycles(), 2);
    }

    #[test]
    fn test_probe_requires_override() {
        let config = CracConfig::default();
        assert!(matches!(probe(&config, false), Err(ProbeError::ExplicitOnly)));
        assert!(probe(&config, true).is_ok());
    }
}
