//! Process-wide coordinator
//!
//! The global coordinator is created once, either explicitly through [`init`]
//! or lazily from the environment on first use, and is never torn down. Its
//! backend binding is decided at that moment and never re-evaluated.

use crate::config::{ConfigError, CracConfig};
use crate::coordinator::{Coordinator, GLOBAL_CONTEXT_NAME};
use crate::management::RestoreStats;
use anyhow::anyhow;
use crac_core::{Context, CracResult, Resource, ResourceResult};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

static GLOBAL: OnceCell<Coordinator> = OnceCell::new();

/// Errors from [`init`]
#[derive(Debug, Error)]
pub enum InitError {
    /// The global coordinator already exists
    #[error("the global coordinator is already initialized")]
    AlreadyInitialized,

    /// The supplied configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Initialize the global coordinator from explicit configuration
///
/// Must run before anything touches the global coordinator; afterwards it
/// returns `AlreadyInitialized` and changes nothing.
pub fn init(config: CracConfig) -> Result<(), InitError> {
    config.validate()?;
    let mut created = false;
    GLOBAL.get_or_init(|| {
        created = true;
        Coordinator::from_config(&config)
    });
    if created {
        Ok(())
    } else {
        Err(InitError::AlreadyInitialized)
    }
}

/// The global coordinator, initializing it from the environment if needed
pub fn coordinator() -> &'static Coordinator {
    GLOBAL.get_or_init(|| {
        let config = CracConfig::from_env().unwrap_or_else(|e| {
            warn!(target: "crac::coordinator", error = %e, "Invalid environment configuration; using defaults");
            CracConfig::default()
        });
        Coordinator::from_config(&config)
    })
}

/// Register a resource with the global context
pub fn register(resource: Arc<dyn Resource>) {
    coordinator().register(resource);
}

/// Handle to the global context
pub fn global_context() -> GlobalContext {
    GlobalContext {
        coordinator: coordinator(),
    }
}

/// Run a checkpoint/restore cycle on the global coordinator
pub fn checkpoint_restore() -> CracResult<()> {
    coordinator().checkpoint_restore()
}

/// Run a checkpoint/restore cycle on the global coordinator
#[deprecated(since = "0.2.0", note = "Use checkpoint_restore instead")]
pub fn try_checkpoint_restore() -> CracResult<()> {
    checkpoint_restore()
}

/// Restore-time statistics of the global coordinator
pub fn management() -> &'static RestoreStats {
    coordinator().restore_stats()
}

/// Handle to the process-wide context
///
/// Registering through it goes to the global coordinator. The global
/// context is notified only by the coordinator itself, so its own
/// `before_checkpoint`/`after_restore` always fail.
#[derive(Clone, Copy)]
pub struct GlobalContext {
    coordinator: &'static Coordinator,
}

impl GlobalContext {
    /// The coordinator behind this context
    pub fn coordinator(&self) -> &'static Coordinator {
        self.coordinator
    }
}

impl Resource for GlobalContext {
    fn before_checkpoint(&self, _context: &dyn Context) -> ResourceResult {
        Err(anyhow!(
            "the global context is notified only by the coordinator"
        ))
    }

    fn after_restore(&self, _context: &dyn Context) -> ResourceResult {
        Err(anyhow!(
            "the global context is notified only by the coordinator"
        ))
    }

    fn name(&self) -> &str {
        GLOBAL_CONTEXT_NAME
    }
}

impl Context for GlobalContext {
    fn register(&self, resource: Arc<dyn Resource>) {
        self.coordinator.register(resource);
    }
}

impl std::fmt::Debug for GlobalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalContext")
            .field("coordinator", self.coordinator)
            .finish()
    }
}
