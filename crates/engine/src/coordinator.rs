//! Checkpoint/restore cycle coordinator
//!
//! Drives one cycle through:
//!
//! ```text
//! Idle -> CheckpointInProgress -> (backend pause/resume) -> RestoreInProgress -> Idle
//! ```
//!
//! 1. No backend bound: fail with an unsupported checkpoint failure, notify nobody
//! 2. Sweep, then `before_checkpoint` on every reachable resource (pinning each)
//! 3. Invoke the backend, unless a resource failed to quiesce
//! 4. `after_restore` on every pinned resource, whatever happened in step 3
//! 5. Report the checkpoint aggregate if non-empty, else the restore aggregate
//!
//! Once step 2 has begun the cycle always runs to completion, so a failed
//! cycle never leaves pins behind and the next request is fully retryable.

use crate::backend::{resolve_backend, Backend, BackendError};
use crate::config::CracConfig;
use crate::management::RestoreStats;
use crac_context::OrderedContext;
use crac_core::{
    CheckpointCause, CheckpointRestoreError, CracResult, NestedErrors, Phase, Resource,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the context owned by a coordinator
pub const GLOBAL_CONTEXT_NAME: &str = "global";

/// Where the coordinator is in a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// No cycle running
    Idle,
    /// Dispatching `before_checkpoint` or waiting on the backend
    CheckpointInProgress,
    /// Dispatching `after_restore`
    RestoreInProgress,
}

/// Owns a notification context and drives cycles against one backend
///
/// The backend binding is fixed at construction.
pub struct Coordinator {
    context: Arc<OrderedContext>,
    backend: Option<Arc<dyn Backend>>,
    state: Mutex<CycleState>,
    stats: RestoreStats,
}

/// Resets the state to `Idle` when a cycle ends, however it ends
struct CycleGuard<'a> {
    state: &'a Mutex<CycleState>,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock() = CycleState::Idle;
    }
}

impl Coordinator {
    /// Create a coordinator bound to `backend` (or unsupported with `None`)
    pub fn new(backend: Option<Arc<dyn Backend>>) -> Self {
        Self::with_context(OrderedContext::new(GLOBAL_CONTEXT_NAME), backend)
    }

    /// Create a coordinator from configuration, resolving the backend once
    pub fn from_config(config: &CracConfig) -> Self {
        Self::with_context(
            OrderedContext::with_sweep_threshold(GLOBAL_CONTEXT_NAME, config.sweep_threshold),
            resolve_backend(config),
        )
    }

    fn with_context(context: OrderedContext, backend: Option<Arc<dyn Backend>>) -> Self {
        Self {
            context: Arc::new(context),
            backend,
            state: Mutex::new(CycleState::Idle),
            stats: RestoreStats::new(),
        }
    }

    /// The context this coordinator notifies
    pub fn context(&self) -> &Arc<OrderedContext> {
        &self.context
    }

    /// Register a resource with the coordinator's context
    ///
    /// Never fails. With no backend bound the resource is kept (weakly)
    /// but will never be notified.
    pub fn register(&self, resource: Arc<dyn Resource>) {
        if self.backend.is_none() {
            debug!(
                target: "crac::coordinator",
                resource = resource.name(),
                "Registering without a backend; resource will not be notified"
            );
        }
        self.context.register_entry(resource);
    }

    /// Name of the bound backend
    pub fn backend_name(&self) -> Option<&str> {
        self.backend.as_ref().map(|b| b.name())
    }

    /// True if a backend is bound
    pub fn is_supported(&self) -> bool {
        self.backend.is_some()
    }

    /// Current cycle state
    pub fn state(&self) -> CycleState {
        *self.state.lock()
    }

    /// Restore-time statistics for this coordinator
    pub fn restore_stats(&self) -> &RestoreStats {
        &self.stats
    }

    /// Run one checkpoint/restore cycle
    ///
    /// # Errors
    ///
    /// * `Checkpoint` - a `before_checkpoint` callback failed (the backend is
    ///   then never called), the backend refused, or no backend is bound
    ///   (see [`CheckpointRestoreError::is_unsupported`])
    /// * `Restore` - checkpoint succeeded but an `after_restore` callback failed
    /// * `CycleInProgress` - another cycle is running, including a request
    ///   made from inside a resource callback
    pub fn checkpoint_restore(&self) -> CracResult<()> {
        let Some(backend) = self.backend.as_ref() else {
            warn!(target: "crac::coordinator", "Checkpoint requested but no backend is bound");
            return Err(CheckpointRestoreError::unsupported(
                "no checkpoint/restore backend is bound",
            ));
        };

        let _guard = self.begin_cycle()?;
        info!(
            target: "crac::coordinator",
            backend = backend.name(),
            resources = self.context.len(),
            "Checkpoint/restore cycle started"
        );

        self.context.sweep();
        let mut before = self.context.notify_before_checkpoint();
        let mut after = NestedErrors::new(Phase::AfterRestore);

        if !before.is_empty() {
            warn!(
                target: "crac::coordinator",
                failures = before.len(),
                "Resources failed to quiesce; skipping backend"
            );
        } else {
            self.invoke_backend(backend.as_ref(), &mut before, &mut after);
        }

        self.set_state(CycleState::RestoreInProgress);
        for cause in self.context.notify_after_restore().into_causes() {
            after.push(cause);
        }
        self.context.sweep();

        info!(
            target: "crac::coordinator",
            checkpoint_failures = before.len(),
            restore_failures = after.len(),
            "Checkpoint/restore cycle finished"
        );
        resolve_outcome(before, after)
    }

    /// Pause and resume through the backend, folding its outcome into the aggregates
    fn invoke_backend(
        &self,
        backend: &dyn Backend,
        before: &mut NestedErrors,
        after: &mut NestedErrors,
    ) {
        match backend.checkpoint_restore() {
            Ok(()) => self.stats.record_restore(),
            Err(BackendError::CheckpointRefused(causes)) => {
                for cause in causes {
                    before.push(cause);
                }
            }
            Err(BackendError::RestoreIncomplete(causes)) => {
                self.stats.record_restore();
                for cause in causes {
                    after.push(cause);
                }
            }
            Err(BackendError::Unavailable(reason)) => {
                before.push(CheckpointCause::Unsupported(reason));
            }
        }
    }

    fn begin_cycle(&self) -> CracResult<CycleGuard<'_>> {
        let mut state = self.state.lock();
        if *state != CycleState::Idle {
            let current = *state;
            warn!(target: "crac::coordinator", state = ?current, "Rejected overlapping cycle request");
            return Err(CheckpointRestoreError::CycleInProgress);
        }
        *state = CycleState::CheckpointInProgress;
        Ok(CycleGuard { state: &self.state })
    }

    fn set_state(&self, next: CycleState) {
        *self.state.lock() = next;
    }
}

/// Checkpoint failures take precedence over restore failures
fn resolve_outcome(before: NestedErrors, after: NestedErrors) -> CracResult<()> {
    if !before.is_empty() {
        if !after.is_empty() {
            warn!(
                target: "crac::coordinator",
                suppressed = after.len(),
                "Restore failures not reported because checkpoint failed"
            );
        }
        return Err(CheckpointRestoreError::Checkpoint(before));
    }
    if !after.is_empty() {
        return Err(CheckpointRestoreError::Restore(after));
    }
    Ok(())
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("backend", &self.backend_name())
            .field("state", &self.state())
            .field("context", &self.context)
            .finish()
    }
}
