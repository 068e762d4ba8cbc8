//! The underlying single-mode lock and its instrumentation decorator.
//!
//! [`RawLatch`] is the capability [`SuxLock`](crate::SuxLock) builds on: it
//! knows the three verbs and the atomic update-to-exclusive upgrade, but it
//! owns no recursion or ownership semantics. [`Latch`] implements it over
//! `parking_lot`'s raw reader-writer lock, whose upgradable-read mode has
//! exactly the update-mode compatibility (coexists with shared holders,
//! excludes other update and exclusive holders). [`Traced`] decorates any
//! implementation with `tracing` events for acquisitions that blocked.

use std::fmt;
use std::panic::Location;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::Relaxed;

use parking_lot::lock_api::RawRwLock as RawRwLockApi;
use parking_lot::lock_api::RawRwLockUpgrade as RawRwLockUpgradeApi;
use parking_lot::RawRwLock;
use tracing::trace;

/// Single-mode lock capability required by [`SuxLock`](crate::SuxLock).
///
/// Implementations provide blocking and non-blocking acquisition for the
/// three verbs plus an in-place update-to-exclusive upgrade. Blocking calls
/// report whether they had to wait at least once; the wrapping lock turns
/// that into its wait statistics. Release calls must only be made by holders
/// of the corresponding mode; [`SuxLock`](crate::SuxLock) guarantees this by
/// construction.
pub trait RawLatch {
    /// Tries to acquire shared mode without blocking.
    fn try_shared(&self) -> bool;

    /// Acquires shared mode, returning `true` if the call had to wait.
    #[track_caller]
    fn shared(&self) -> bool;

    /// Releases shared mode.
    fn release_shared(&self);

    /// Tries to acquire update mode without blocking.
    fn try_update(&self) -> bool;

    /// Acquires update mode, returning `true` if the call had to wait.
    #[track_caller]
    fn update(&self) -> bool;

    /// Releases update mode.
    fn release_update(&self);

    /// Tries to acquire exclusive mode without blocking.
    fn try_exclusive(&self) -> bool;

    /// Acquires exclusive mode, returning `true` if the call had to wait.
    #[track_caller]
    fn exclusive(&self) -> bool;

    /// Releases exclusive mode.
    fn release_exclusive(&self);

    /// Tries to upgrade a held update mode to exclusive without blocking.
    fn try_upgrade(&self) -> bool;

    /// Upgrades a held update mode to exclusive, returning `true` if the
    /// call had to wait.
    ///
    /// The transition must be atomic: no other thread can slip in between
    /// the update hold and the exclusive hold.
    #[track_caller]
    fn upgrade(&self) -> bool;

    /// Returns `true` if any thread is blocked waiting for update or
    /// exclusive mode.
    fn has_waiters(&self) -> bool;
}

/// The production [`RawLatch`], backed by `parking_lot`'s raw
/// reader-writer lock.
///
/// Update mode maps to the upgradable-read mode of the underlying lock.
/// `parking_lot` exposes no waiter probe, so the latch keeps its own count
/// of threads blocked on the write side. The crate enables `parking_lot`'s
/// `send_guard` feature: a raw write-side acquisition may be released by a
/// thread other than the acquirer, which the ownership-transfer protocol
/// relies on.
pub struct Latch {
    raw: RawRwLock,
    /// Number of threads currently blocked acquiring update or exclusive.
    contended: AtomicU32,
}

impl Default for Latch {
    #[inline]
    fn default() -> Self {
        Self {
            raw: RawRwLock::INIT,
            contended: AtomicU32::new(0),
        }
    }
}

impl Latch {
    /// Runs a blocking acquisition with the contention count held.
    fn blocked<T>(&self, acquire: impl FnOnce() -> T) -> T {
        self.contended.fetch_add(1, Relaxed);
        let result = acquire();
        self.contended.fetch_sub(1, Relaxed);
        result
    }
}

impl RawLatch for Latch {
    #[inline]
    fn try_shared(&self) -> bool {
        self.raw.try_lock_shared()
    }

    #[inline]
    #[track_caller]
    fn shared(&self) -> bool {
        if self.raw.try_lock_shared() {
            return false;
        }
        self.raw.lock_shared();
        true
    }

    #[inline]
    fn release_shared(&self) {
        // SAFETY: the caller holds a shared acquisition on `raw`.
        unsafe { self.raw.unlock_shared() };
    }

    #[inline]
    fn try_update(&self) -> bool {
        self.raw.try_lock_upgradable()
    }

    #[inline]
    #[track_caller]
    fn update(&self) -> bool {
        if self.raw.try_lock_upgradable() {
            return false;
        }
        self.blocked(|| self.raw.lock_upgradable());
        true
    }

    #[inline]
    fn release_update(&self) {
        // SAFETY: an upgradable acquisition on `raw` is held. It may have
        // been taken by a different thread when the wrapping lock transfers
        // ownership; the `send_guard` feature widens the lock context to
        // allow that.
        unsafe { self.raw.unlock_upgradable() };
    }

    #[inline]
    fn try_exclusive(&self) -> bool {
        self.raw.try_lock_exclusive()
    }

    #[inline]
    #[track_caller]
    fn exclusive(&self) -> bool {
        if self.raw.try_lock_exclusive() {
            return false;
        }
        self.blocked(|| self.raw.lock_exclusive());
        true
    }

    #[inline]
    fn release_exclusive(&self) {
        // SAFETY: an exclusive acquisition on `raw` is held. It may have
        // been taken by a different thread when the wrapping lock transfers
        // ownership; the `send_guard` feature widens the lock context to
        // allow that.
        unsafe { self.raw.unlock_exclusive() };
    }

    #[inline]
    fn try_upgrade(&self) -> bool {
        // SAFETY: the caller holds an upgradable acquisition on `raw`.
        unsafe { self.raw.try_upgrade() }
    }

    #[inline]
    #[track_caller]
    fn upgrade(&self) -> bool {
        // SAFETY: the caller holds an upgradable acquisition on `raw`; a
        // failed `try_upgrade` keeps it, so the blocking upgrade remains
        // valid.
        if unsafe { self.raw.try_upgrade() } {
            return false;
        }
        self.blocked(|| unsafe { self.raw.upgrade() });
        true
    }

    #[inline]
    fn has_waiters(&self) -> bool {
        self.contended.load(Relaxed) > 0
    }
}

impl fmt::Debug for Latch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Latch")
            .field("locked", &self.raw.is_locked())
            .field("contended", &self.contended.load(Relaxed))
            .finish()
    }
}

/// Decorator that emits `tracing` events when acquisitions block.
///
/// The wrapped lock keeps its semantics; the decorator only observes. The
/// recorded call site is the outermost `#[track_caller]` caller, typically
/// the [`SuxLock`](crate::SuxLock) entry point invoked by user code.
#[derive(Debug)]
pub struct Traced<R = Latch> {
    name: &'static str,
    raw: R,
}

impl<R: RawLatch> Traced<R> {
    /// Wraps `raw`, tagging events with `name`.
    #[must_use]
    pub const fn new(name: &'static str, raw: R) -> Self {
        Self { name, raw }
    }

    fn record(&self, verb: &'static str, caller: &Location<'_>, waited: bool) -> bool {
        if waited {
            trace!(target: "sux", lock = self.name, verb, %caller, "blocking wait");
        }
        waited
    }
}

impl<R: RawLatch> RawLatch for Traced<R> {
    #[inline]
    fn try_shared(&self) -> bool {
        self.raw.try_shared()
    }

    #[inline]
    #[track_caller]
    fn shared(&self) -> bool {
        let caller = Location::caller();
        self.record("s", caller, self.raw.shared())
    }

    #[inline]
    fn release_shared(&self) {
        self.raw.release_shared();
    }

    #[inline]
    fn try_update(&self) -> bool {
        self.raw.try_update()
    }

    #[inline]
    #[track_caller]
    fn update(&self) -> bool {
        let caller = Location::caller();
        self.record("u", caller, self.raw.update())
    }

    #[inline]
    fn release_update(&self) {
        self.raw.release_update();
    }

    #[inline]
    fn try_exclusive(&self) -> bool {
        self.raw.try_exclusive()
    }

    #[inline]
    #[track_caller]
    fn exclusive(&self) -> bool {
        let caller = Location::caller();
        self.record("x", caller, self.raw.exclusive())
    }

    #[inline]
    fn release_exclusive(&self) {
        self.raw.release_exclusive();
    }

    #[inline]
    fn try_upgrade(&self) -> bool {
        self.raw.try_upgrade()
    }

    #[inline]
    #[track_caller]
    fn upgrade(&self) -> bool {
        let caller = Location::caller();
        self.record("u-x", caller, self.raw.upgrade())
    }

    #[inline]
    fn has_waiters(&self) -> bool {
        self.raw.has_waiters()
    }
}
