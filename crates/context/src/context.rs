//! Ordered notification context
//!
//! Fans both notifications out to every registered resource in registration
//! order. A failing (or panicking) callback is recorded and dispatch continues
//! with the next resource. After-restore goes to exactly the resources that
//! were pinned for before-checkpoint, whether or not their callback succeeded.

use crate::registry::{RegistrationHandle, WeakRegistry};
use crac_core::{CheckpointCause, Context, NestedErrors, Phase, Resource, ResourceResult};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// A named group of resources notified in registration order
pub struct OrderedContext {
    name: String,
    registry: WeakRegistry,
}

impl OrderedContext {
    /// Create an empty context
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: WeakRegistry::new(),
        }
    }

    /// Create an empty context with a custom sweep threshold
    pub fn with_sweep_threshold(name: impl Into<String>, threshold: usize) -> Self {
        Self {
            name: name.into(),
            registry: WeakRegistry::with_sweep_threshold(threshold),
        }
    }

    /// Register a resource, returning a handle that can unregister it
    pub fn register_entry(&self, resource: Arc<dyn Resource>) -> RegistrationHandle {
        let handle = self.registry.register(&resource);
        debug!(
            target: "crac::context",
            context = %self.name,
            resource = resource.name(),
            seq = handle.seq(),
            "Registered resource"
        );
        handle
    }

    /// Remove a registration
    ///
    /// If the entry is being notified it still receives `after_restore`
    /// in the current cycle.
    pub fn unregister(&self, handle: RegistrationHandle) -> bool {
        self.registry.unregister(handle)
    }

    /// Drop entries whose resources are gone
    pub fn sweep(&self) -> usize {
        self.registry.sweep()
    }

    /// Number of entries, including ones not yet swept
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Number of resources held strongly by an in-flight cycle
    pub fn pinned_count(&self) -> usize {
        self.registry.pinned_count()
    }

    /// True if the handle addresses a registered, live resource
    pub fn contains(&self, handle: RegistrationHandle) -> bool {
        self.registry.contains(handle)
    }

    /// Call `before_checkpoint` on every reachable resource
    ///
    /// Each reachable resource is pinned before its callback runs and stays
    /// pinned until [`notify_after_restore`](Self::notify_after_restore).
    /// Resources already dropped are skipped silently.
    pub fn notify_before_checkpoint(&self) -> NestedErrors {
        let mut nested = NestedErrors::new(Phase::BeforeCheckpoint);

        for handle in self.registry.handles() {
            let Some(resource) = self.registry.pin(handle) else {
                continue;
            };
            self.dispatch(Phase::BeforeCheckpoint, handle, resource.as_ref(), &mut nested);
        }

        nested
    }

    /// Call `after_restore` on every pinned resource, then release one pin
    ///
    /// Pairs with one [`notify_before_checkpoint`](Self::notify_before_checkpoint).
    /// A context registered twice with its parent is notified twice per phase,
    /// so its resources stay pinned until the second call.
    pub fn notify_after_restore(&self) -> NestedErrors {
        let mut nested = NestedErrors::new(Phase::AfterRestore);

        for (handle, resource) in self.registry.pinned() {
            self.dispatch(Phase::AfterRestore, handle, resource.as_ref(), &mut nested);
            self.registry.release(handle);
        }

        nested
    }

    fn dispatch(
        &self,
        phase: Phase,
        handle: RegistrationHandle,
        resource: &dyn Resource,
        nested: &mut NestedErrors,
    ) {
        debug!(
            target: "crac::context",
            context = %self.name,
            resource = resource.name(),
            seq = handle.seq(),
            %phase,
            "Notifying resource"
        );

        if let Err(e) = invoke(phase, resource, self) {
            warn!(
                target: "crac::context",
                context = %self.name,
                resource = resource.name(),
                seq = handle.seq(),
                %phase,
                error = %e,
                "Resource notification failed"
            );
            nested.push(e);
        }
    }
}

/// Run one callback, turning a panic into a recorded cause
fn invoke(phase: Phase, resource: &dyn Resource, context: &dyn Context) -> ResourceResult {
    let outcome = catch_unwind(AssertUnwindSafe(|| match phase {
        Phase::BeforeCheckpoint => resource.before_checkpoint(context),
        Phase::AfterRestore => resource.after_restore(context),
    }));

    match outcome {
        Ok(result) => result,
        Err(payload) => Err(CheckpointCause::Panicked {
            phase,
            message: panic_message(payload.as_ref()),
        }
        .into()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "(non-string panic)".to_string()
    }
}

impl Resource for OrderedContext {
    fn before_checkpoint(&self, _context: &dyn Context) -> ResourceResult {
        self.notify_before_checkpoint()
            .into_result()
            .map_err(anyhow::Error::new)
    }

    fn after_restore(&self, _context: &dyn Context) -> ResourceResult {
        self.notify_after_restore()
            .into_result()
            .map_err(anyhow::Error::new)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Context for OrderedContext {
    fn register(&self, resource: Arc<dyn Resource>) {
        self.register_entry(resource);
    }
}

impl std::fmt::Debug for OrderedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderedContext")
            .field("name", &self.name)
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use parking_lot::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        id: &'static str,
        log: Log,
        fail_checkpoint: bool,
        fail_restore: bool,
    }

    impl Recorder {
        fn new(id: &'static str, log: &Log) -> Arc<Self> {
            Arc::new(Self {
                id,
                log: Arc::clone(log),
                fail_checkpoint: false,
                fail_restore: false,
            })
        }

        fn failing_checkpoint(id: &'static str, log: &Log) -> Arc<Self> {
            Arc::new(Self {
                id,
                log: Arc::clone(log),
                fail_checkpoint: true,
                fail_restore: false,
            })
        }
    }

    impl Resource for Recorder {
        fn before_checkpoint(&self, _context: &dyn Context) -> ResourceResult {
            self.log.lock().push(format!("before:{}", self.id));
            if self.fail_checkpoint {
                bail!("{} refused checkpoint", self.id);
            }
            Ok(())
        }

        fn after_restore(&self, _context: &dyn Context) -> ResourceResult {
            self.log.lock().push(format!("after:{}", self.id));
            if self.fail_restore {
                bail!("{} refused restore", self.id);
            }
            Ok(())
        }
    }

    struct Panics;

    impl Resource for Panics {
        fn before_checkpoint(&self, _context: &dyn Context) -> ResourceResult {
            panic!("boom");
        }

        fn after_restore(&self, _context: &dyn Context) -> ResourceResult {
            Ok(())
        }
    }

    #[test]
    fn test_empty_context_notifies_nothing() {
        let ctx = OrderedContext::new("empty");
        assert!(ctx.notify_before_checkpoint().is_empty());
        assert!(ctx.notify_after_restore().is_empty());
    }

    #[test]
    fn test_both_phases_in_registration_order() {
        let log = Log::default();
        let ctx = OrderedContext::new("test");
        let a = Recorder::new("a", &log);
        let b = Recorder::new("b", &log);
        ctx.register(a.clone());
        ctx.register(b.clone());

        assert!(ctx.notify_before_checkpoint().is_empty());
        assert_eq!(ctx.pinned_count(), 2);
        assert!(ctx.notify_after_restore().is_empty());
        assert_eq!(ctx.pinned_count(), 0);

        assert_eq!(*log.lock(), vec!["before:a", "before:b", "after:a", "after:b"]);
    }

    #[test]
    fn test_failure_does_not_short_circuit() {
        let log = Log::default();
        let ctx = OrderedContext::new("test");
        let a = Recorder::new("a", &log);
        let b = Recorder::failing_checkpoint("b", &log);
        let c = Recorder::new("c", &log);
        ctx.register(a.clone());
        ctx.register(b.clone());
        ctx.register(c.clone());

        let before = ctx.notify_before_checkpoint();
        assert_eq!(before.len(), 1);
        assert_eq!(before.causes()[0].to_string(), "b refused checkpoint");

        // b failed but still gets after_restore
        assert!(ctx.notify_after_restore().is_empty());
        assert_eq!(
            *log.lock(),
            vec!["before:a", "before:b", "before:c", "after:a", "after:b", "after:c"]
        );
    }

    #[test]
    fn test_panic_is_recorded() {
        let ctx = OrderedContext::new("test");
        let p: Arc<dyn Resource> = Arc::new(Panics);
        ctx.register(p.clone());

        let before = ctx.notify_before_checkpoint();
        assert_eq!(before.len(), 1);
        assert_eq!(
            before.causes()[0].downcast_ref::<CheckpointCause>(),
            Some(&CheckpointCause::Panicked {
                phase: Phase::BeforeCheckpoint,
                message: "boom".to_string(),
            })
        );

        assert!(ctx.notify_after_restore().is_empty());
        assert_eq!(ctx.pinned_count(), 0);
    }

    #[test]
    fn test_dropped_resource_skipped() {
        let log = Log::default();
        let ctx = OrderedContext::new("test");
        ctx.register(Recorder::new("gone", &log));
        let kept = Recorder::new("kept", &log);
        ctx.register(kept.clone());

        ctx.notify_before_checkpoint();
        ctx.notify_after_restore();
        assert_eq!(*log.lock(), vec!["before:kept", "after:kept"]);
    }

    #[test]
    fn test_double_registration_notifies_twice() {
        let log = Log::default();
        let ctx = OrderedContext::new("test");
        let a = Recorder::new("a", &log);
        ctx.register(a.clone());
        ctx.register(a.clone());

        ctx.notify_before_checkpoint();
        ctx.notify_after_restore();
        assert_eq!(*log.lock(), vec!["before:a", "before:a", "after:a", "after:a"]);
    }

    #[test]
    fn test_unregistered_resource_not_notified() {
        let log = Log::default();
        let ctx = OrderedContext::new("test");
        let a = Recorder::new("a", &log);
        let handle = ctx.register_entry(a.clone());
        assert!(ctx.unregister(handle));

        ctx.notify_before_checkpoint();
        ctx.notify_after_restore();
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_nested_context_wraps_child_failures() {
        let log = Log::default();
        let parent = OrderedContext::new("parent");
        let child = Arc::new(OrderedContext::new("child"));
        let failing = Recorder::failing_checkpoint("inner", &log);
        child.register(failing.clone());
        parent.register(child.clone());

        let before = parent.notify_before_checkpoint();
        assert_eq!(before.len(), 1);
        let inner = before.causes()[0].downcast_ref::<NestedErrors>().unwrap();
        assert_eq!(inner.len(), 1);
        assert_eq!(inner.causes()[0].to_string(), "inner refused checkpoint");

        assert!(parent.notify_after_restore().is_empty());
        assert_eq!(child.pinned_count(), 0);
        assert_eq!(*log.lock(), vec!["before:inner", "after:inner"]);
    }

    #[test]
    fn test_child_registered_twice_restores_twice() {
        let log = Log::default();
        let parent = OrderedContext::new("parent");
        let child = Arc::new(OrderedContext::new("child"));
        let leaf = Recorder::new("leaf", &log);
        child.register(leaf.clone());
        parent.register(child.clone());
        parent.register(child.clone());

        assert!(parent.notify_before_checkpoint().is_empty());
        assert_eq!(child.pinned_count(), 1);
        assert!(parent.notify_after_restore().is_empty());

        assert_eq!(
            *log.lock(),
            vec!["before:leaf", "before:leaf", "after:leaf", "after:leaf"]
        );
        assert_eq!(child.pinned_count(), 0);
        assert_eq!(parent.pinned_count(), 0);
    }

    static_assertions::assert_impl_all!(OrderedContext: Send, Sync);
}
