//! Core trait definitions
//!
//! - [`Resource`]: anything that must be told before a checkpoint and after a restore
//! - [`Context`]: a group of resources that fans both notifications out to its members
//!
//! Contexts are resources themselves, so a context can be registered with a
//! parent context to build a tree.

use crate::error::ResourceResult;
use std::sync::Arc;

/// A participant in checkpoint/restore notification
///
/// `before_checkpoint` should release or quiesce external state (sockets,
/// file descriptors, timers). `after_restore` re-acquires it. Either may fail;
/// a failure is collected and never stops other resources from being notified.
///
/// `after_restore` is called for every resource whose `before_checkpoint` was
/// called in the same cycle, including ones that failed.
///
/// # Example
///
/// ```ignore
/// struct Listener { /* ... */ }
///
/// impl Resource for Listener {
///     fn before_checkpoint(&self, _ctx: &dyn Context) -> ResourceResult {
///         self.close()?;
///         Ok(())
///     }
///
///     fn after_restore(&self, _ctx: &dyn Context) -> ResourceResult {
///         self.rebind()?;
///         Ok(())
///     }
/// }
/// ```
pub trait Resource: Send + Sync {
    /// Invoked before the process is checkpointed
    fn before_checkpoint(&self, context: &dyn Context) -> ResourceResult;

    /// Invoked after the process is restored
    fn after_restore(&self, context: &dyn Context) -> ResourceResult;

    /// Name used in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A registry of resources that fans out notifications
///
/// Registration does not keep the resource alive: the context holds it
/// weakly and strongly only while a cycle is notifying it. A resource
/// passed in with no other owner is dropped immediately and never notified.
pub trait Context: Resource {
    /// Register a resource with this context
    ///
    /// Registering the same resource twice yields two independent entries
    /// and two notifications per phase.
    fn register(&self, resource: Arc<dyn Resource>);
}
