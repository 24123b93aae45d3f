//! Weak registry of notification participants
//!
//! Registering a resource must not keep it alive, otherwise every registered
//! object would leak for the life of the process. Entries therefore hold a
//! `Weak` reference. While a cycle is notifying an entry, the registry also
//! holds a strong reference (a "pin") so the resource survives the pause
//! between `before_checkpoint` and `after_restore`.
//!
//! Entries are keyed by a monotonically increasing sequence number. Sequence
//! numbers are never reused, so a stale [`RegistrationHandle`] can never
//! address a newer entry.
//!
//! Uses parking_lot::Mutex; callbacks are never invoked while it is held.

use crac_core::Resource;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Registry size that triggers an opportunistic sweep on `register`
pub const DEFAULT_SWEEP_THRESHOLD: usize = 64;

/// Identifies one registration
///
/// Ordering of handles is registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistrationHandle(u64);

impl RegistrationHandle {
    /// Sequence number assigned at registration
    pub fn seq(&self) -> u64 {
        self.0
    }
}

struct Entry {
    resource: Weak<dyn Resource>,
    /// Set only while a cycle is notifying this entry
    hold: Option<Arc<dyn Resource>>,
    /// Outstanding pins; a nested context can pin the same entry repeatedly
    depth: usize,
    /// Unregistered while pinned; removed on release
    retired: bool,
}

impl Entry {
    fn is_dead(&self) -> bool {
        self.hold.is_none() && (self.retired || self.resource.strong_count() == 0)
    }
}

struct RegistryInner {
    entries: BTreeMap<u64, Entry>,
    next_seq: u64,
    /// Size at which the next opportunistic sweep runs
    sweep_at: usize,
}

impl RegistryInner {
    fn sweep(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_dead());
        before - self.entries.len()
    }
}

/// Ordered registry holding resources weakly
pub struct WeakRegistry {
    inner: Mutex<RegistryInner>,
    sweep_threshold: usize,
}

impl WeakRegistry {
    /// Create an empty registry with the default sweep threshold
    pub fn new() -> Self {
        Self::with_sweep_threshold(DEFAULT_SWEEP_THRESHOLD)
    }

    /// Create an empty registry that sweeps once it reaches `threshold` entries
    ///
    /// After each opportunistic sweep the next trigger point is twice the
    /// surviving entry count, keeping `register` amortized O(1).
    pub fn with_sweep_threshold(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            inner: Mutex::new(RegistryInner {
                entries: BTreeMap::new(),
                next_seq: 0,
                sweep_at: threshold,
            }),
            sweep_threshold: threshold,
        }
    }

    /// Add a resource, holding it weakly
    pub fn register(&self, resource: &Arc<dyn Resource>) -> RegistrationHandle {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            seq,
            Entry {
                resource: Arc::downgrade(resource),
                hold: None,
                depth: 0,
                retired: false,
            },
        );

        if inner.entries.len() >= inner.sweep_at {
            let removed = inner.sweep();
            inner.sweep_at = self.sweep_threshold.max(inner.entries.len() * 2);
            debug!(
                target: "crac::registry",
                removed,
                live = inner.entries.len(),
                next_sweep_at = inner.sweep_at,
                "Opportunistic sweep"
            );
        }

        RegistrationHandle(seq)
    }

    /// Remove a registration
    ///
    /// A pinned entry is retired instead: it still receives the rest of the
    /// current cycle and is removed when released. Returns false if the handle
    /// is unknown or already retired.
    pub fn unregister(&self, handle: RegistrationHandle) -> bool {
        let mut inner = self.inner.lock();
        match inner.entries.get_mut(&handle.0) {
            Some(entry) if entry.hold.is_some() => {
                if entry.retired {
                    return false;
                }
                entry.retired = true;
                true
            }
            Some(_) => {
                inner.entries.remove(&handle.0);
                true
            }
            None => false,
        }
    }

    /// Remove entries whose resource is gone and which are not pinned
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let mut inner = self.inner.lock();
        let removed = inner.sweep();
        inner.sweep_at = self.sweep_threshold.max(inner.entries.len() * 2);
        if removed > 0 {
            debug!(target: "crac::registry", removed, live = inner.entries.len(), "Swept registry");
        }
        removed
    }

    /// Number of entries, including ones not yet swept
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// True if the registry has no entries
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Number of entries currently strongly held
    pub fn pinned_count(&self) -> usize {
        self.inner
            .lock()
            .entries
            .values()
            .filter(|e| e.hold.is_some())
            .count()
    }

    /// True if the handle still addresses a live, registered entry
    pub fn contains(&self, handle: RegistrationHandle) -> bool {
        self.inner
            .lock()
            .entries
            .get(&handle.0)
            .map(|e| !e.retired && (e.hold.is_some() || e.resource.strong_count() > 0))
            .unwrap_or(false)
    }

    // ------------------------------------------------------------------------
    // Dispatch support. Only the notifying context touches pins.
    // ------------------------------------------------------------------------

    /// Handles of all non-retired entries, in registration order
    pub(crate) fn handles(&self) -> Vec<RegistrationHandle> {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|(_, e)| !e.retired)
            .map(|(seq, _)| RegistrationHandle(*seq))
            .collect()
    }

    /// Strongly hold an entry's resource
    ///
    /// Pins nest: each call must be matched by one [`release`](Self::release).
    /// Returns `None` if the entry is gone or its resource was dropped.
    pub(crate) fn pin(&self, handle: RegistrationHandle) -> Option<Arc<dyn Resource>> {
        let mut inner = self.inner.lock();
        let entry = inner.entries.get_mut(&handle.0)?;
        if entry.retired {
            return None;
        }
        let resource = match &entry.hold {
            Some(held) => Arc::clone(held),
            None => entry.resource.upgrade()?,
        };
        entry.hold = Some(Arc::clone(&resource));
        entry.depth += 1;
        Some(resource)
    }

    /// All pinned entries, in registration order
    pub(crate) fn pinned(&self) -> Vec<(RegistrationHandle, Arc<dyn Resource>)> {
        self.inner
            .lock()
            .entries
            .iter()
            .filter_map(|(seq, e)| {
                e.hold
                    .as_ref()
                    .map(|r| (RegistrationHandle(*seq), Arc::clone(r)))
            })
            .collect()
    }

    /// Undo one pin, dropping the strong hold when none remain
    pub(crate) fn release(&self, handle: RegistrationHandle) {
        let released = {
            let mut inner = self.inner.lock();
            let (released, remove) = match inner.entries.get_mut(&handle.0) {
                Some(entry) if entry.depth > 1 => {
                    entry.depth -= 1;
                    (None, false)
                }
                Some(entry) => {
                    entry.depth = 0;
                    (entry.hold.take(), entry.retired)
                }
                None => (None, false),
            };
            if remove {
                inner.entries.remove(&handle.0);
            }
            released
        };
        // The resource may be dropped here, outside the lock
        drop(released);
    }
}

impl Default for WeakRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WeakRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("WeakRegistry")
            .field("entries", &inner.entries.len())
            .field("next_seq", &inner.next_seq)
            .field("sweep_at", &inner.sweep_at)
            .finish()
    }
}
