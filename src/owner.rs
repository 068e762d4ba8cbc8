//! Thread identity and write-side ownership tracking.

use std::num::NonZeroU64;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::Relaxed;

/// Identity of a thread that may own the write side of a
/// [`SuxLock`](crate::SuxLock).
///
/// Identifiers are handed out from a process-wide counter on first use by
/// each thread and are never reused within the process lifetime.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) struct ThreadId(NonZeroU64);

impl ThreadId {
    fn allocate() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        let raw = NEXT.fetch_add(1, Relaxed);
        debug_assert_ne!(raw, Owner::RAW_IO);
        Self(NonZeroU64::new(raw).expect("thread id counter wrapped around"))
    }
}

thread_local! {
    static SELF_ID: ThreadId = ThreadId::allocate();
}

/// Returns the identity of the calling thread.
pub(crate) fn current() -> ThreadId {
    SELF_ID.with(|id| *id)
}

/// Owner of the U or X side of a lock.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Owner {
    /// No thread holds U or X.
    Unowned,
    /// Held by the given thread.
    Thread(ThreadId),
    /// Held, with the final release deferred to an I/O completion thread.
    Io,
}

impl Owner {
    const RAW_UNOWNED: u64 = 0;
    const RAW_IO: u64 = u64::MAX;

    const fn to_raw(self) -> u64 {
        match self {
            Owner::Unowned => Self::RAW_UNOWNED,
            Owner::Thread(id) => id.0.get(),
            Owner::Io => Self::RAW_IO,
        }
    }

    fn from_raw(raw: u64) -> Self {
        match raw {
            Self::RAW_UNOWNED => Owner::Unowned,
            Self::RAW_IO => Owner::Io,
            id => match NonZeroU64::new(id) {
                Some(id) => Owner::Thread(ThreadId(id)),
                None => Owner::Unowned,
            },
        }
    }
}

/// Atomic [`Owner`] cell.
///
/// Mutated only by the current owner, or by a thread that has just won the
/// underlying update/exclusive acquisition; the underlying lock provides the
/// synchronization, so relaxed ordering suffices.
#[derive(Debug, Default)]
pub(crate) struct OwnerCell(AtomicU64);

impl OwnerCell {
    /// Returns the current owner.
    #[inline]
    pub(crate) fn load(&self) -> Owner {
        Owner::from_raw(self.0.load(Relaxed))
    }

    /// Assigns the first owner; the cell must be unowned.
    #[inline]
    pub(crate) fn set_first(&self, owner: Owner) {
        debug_assert_ne!(owner, Owner::Unowned);
        if cfg!(debug_assertions) {
            let prev = self.0.swap(owner.to_raw(), Relaxed);
            assert_eq!(prev, Owner::RAW_UNOWNED, "lock already has an owner");
        } else {
            self.0.store(owner.to_raw(), Relaxed);
        }
    }

    /// Replaces the owner of a known-owned cell, possibly clearing it.
    #[inline]
    pub(crate) fn set_next(&self, owner: Owner) {
        if cfg!(debug_assertions) {
            let prev = self.0.swap(owner.to_raw(), Relaxed);
            assert_ne!(prev, Owner::RAW_UNOWNED, "lock has no owner to replace");
        } else {
            self.0.store(owner.to_raw(), Relaxed);
        }
    }
}
