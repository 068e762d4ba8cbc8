//! Debug-build registry of shared-mode holders.
//!
//! The underlying lock does not know which threads hold it in shared mode,
//! so checked builds keep their own set. The set has its own mutex so that
//! querying it never contends with the main S/U/X protocol.

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::owner::ThreadId;

/// Set of threads currently holding an S acquisition.
///
/// The inner `HashSet` allocates lazily, on the first registration.
#[derive(Debug, Default)]
pub(crate) struct Readers {
    set: Mutex<HashSet<ThreadId>>,
}

impl Readers {
    /// Registers the calling thread as a shared holder.
    ///
    /// S is non-recursive, so a second registration is a caller bug.
    pub(crate) fn register(&self, id: ThreadId) {
        let inserted = self.set.lock().insert(id);
        assert!(inserted, "shared lock acquired twice by the same thread");
    }

    /// Deregisters the calling thread; it must have been registered.
    pub(crate) fn deregister(&self, id: ThreadId) {
        let removed = self.set.lock().remove(&id);
        assert!(removed, "shared unlock by a thread that holds no shared lock");
    }

    /// Returns `true` if `id` currently holds a shared acquisition.
    pub(crate) fn contains(&self, id: ThreadId) -> bool {
        self.set.lock().contains(&id)
    }

    /// Returns `true` if no thread holds a shared acquisition.
    pub(crate) fn is_empty(&self) -> bool {
        self.set.lock().is_empty()
    }
}
