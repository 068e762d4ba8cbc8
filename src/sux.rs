//! [`SuxLock`] is a shared/update/exclusive latch with recursive write-side
//! acquisition, in-place upgrade, and cross-thread ownership transfer.

use std::fmt;
use std::mem;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::Relaxed;

use crate::owner::{self, Owner, OwnerCell};
use crate::raw::{Latch, RawLatch};
#[cfg(debug_assertions)]
use crate::readers::Readers;
use crate::recursion::{Mode, Recursion};

/// A latch supporting S (shared), U (update) and X (exclusive) modes.
///
/// The semantics generalize [`RwLock`](std::sync::RwLock): U coexists with S
/// holders but excludes other U/X holders, can be acquired recursively by
/// its owner, and can be upgraded to X in place without an intervening
/// unlocked window. X excludes everything and is also recursive. S is
/// never recursive.
///
/// Like the raw locks it is built on, [`SuxLock`] only provides low-level
/// locking and releasing methods, forcing the caller to manage the scope of
/// acquired locks. Contract violations (releasing a mode that is not held,
/// recursing from a thread that is not the owner, upgrading without holding
/// pure U, exceeding the nesting limit) are programming errors caught by
/// assertions in debug builds and undefined in release builds.
///
/// A write-side acquisition can be marked *for I/O*: the recorded owner is
/// then a reserved sentinel instead of the acquiring thread, and some other
/// thread later either adopts the lock with [`claim_ownership`] or releases
/// it directly by passing `claim_ownership = true` to the unlock call. At no
/// point during the transfer does the lock appear unowned.
///
/// [`claim_ownership`]: Self::claim_ownership
pub struct SuxLock<R = Latch> {
    /// The underlying non-recursive lock.
    lock: R,
    /// The owner of the U or X lock; protected by `lock`.
    writer: OwnerCell,
    /// Packed counts of U and X acquisitions; protected by `lock`.
    recursion: Recursion,
    /// Number of blocking waits.
    waits: AtomicU32,
    /// Threads that hold the lock in shared mode.
    #[cfg(debug_assertions)]
    readers: Readers,
}

impl SuxLock {
    /// Creates a latch over the default [`Latch`].
    ///
    /// # Examples
    ///
    /// ```
    /// use sux::SuxLock;
    ///
    /// let lock = SuxLock::new();
    /// assert!(lock.x_lock_try());
    /// lock.x_unlock(false);
    /// ```
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::from_raw(Latch::default())
    }
}

impl<R: RawLatch> SuxLock<R> {
    /// Creates a latch over the supplied raw lock.
    ///
    /// # Examples
    ///
    /// ```
    /// use sux::{Latch, SuxLock, Traced};
    ///
    /// let lock = SuxLock::from_raw(Traced::new("index", Latch::default()));
    /// lock.s_lock();
    /// lock.s_unlock();
    /// ```
    #[inline]
    #[must_use]
    pub fn from_raw(raw: R) -> Self {
        Self {
            lock: raw,
            writer: OwnerCell::default(),
            recursion: Recursion::default(),
            waits: AtomicU32::new(0),
            #[cfg(debug_assertions)]
            readers: Readers::default(),
        }
    }

    #[inline]
    fn count_wait(&self, waited: bool) {
        if waited {
            self.waits.fetch_add(1, Relaxed);
        }
    }

    /// Acquires a shared lock.
    ///
    /// S is non-recursive: the calling thread must not already hold S or X
    /// on this instance. Holding U is fine, since U permits concurrent
    /// readers.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if the calling thread already holds S.
    ///
    /// # Examples
    ///
    /// ```
    /// use sux::SuxLock;
    ///
    /// let lock = SuxLock::new();
    /// lock.s_lock();
    /// assert!(!lock.x_lock_try());
    /// lock.s_unlock();
    /// ```
    #[inline]
    #[track_caller]
    pub fn s_lock(&self) {
        debug_assert!(!self.have_x());
        #[cfg(debug_assertions)]
        assert!(!self.have_s(), "shared lock is not recursive");
        self.count_wait(self.lock.shared());
        #[cfg(debug_assertions)]
        self.readers.register(owner::current());
    }

    /// Tries to acquire a shared lock without blocking.
    ///
    /// Fails whenever an exclusive holder exists, and possibly when racing
    /// against other acquirers.
    #[inline]
    #[must_use]
    pub fn s_lock_try(&self) -> bool {
        let acquired = self.lock.try_shared();
        #[cfg(debug_assertions)]
        if acquired {
            self.readers.register(owner::current());
        }
        acquired
    }

    /// Releases a shared lock.
    #[inline]
    pub fn s_unlock(&self) {
        #[cfg(debug_assertions)]
        self.readers.deregister(owner::current());
        self.lock.release_shared();
    }

    /// Acquires an update lock, recursively if the calling thread already
    /// owns the write side.
    ///
    /// # Examples
    ///
    /// ```
    /// use sux::SuxLock;
    ///
    /// let lock = SuxLock::new();
    /// lock.u_lock();
    /// lock.u_lock(); // recursive
    /// assert!(lock.s_lock_try()); // U permits readers
    /// lock.s_unlock();
    /// lock.u_unlock(false);
    /// lock.u_unlock(false);
    /// ```
    #[inline]
    #[track_caller]
    pub fn u_lock(&self) {
        let id = owner::current();
        if self.writer.load() == Owner::Thread(id) {
            self.recursion.recurse(Mode::Update);
        } else {
            self.count_wait(self.lock.update());
            self.recursion.start(Mode::Update);
            self.writer.set_first(Owner::Thread(id));
        }
    }

    /// Tries to acquire an update lock without blocking.
    ///
    /// `for_io` marks the acquisition for release by another thread. A
    /// `for_io` request by the current owner is refused: ownership transfer
    /// is incompatible with recursion.
    ///
    /// # Examples
    ///
    /// ```
    /// use sux::SuxLock;
    ///
    /// let lock = SuxLock::new();
    /// assert!(lock.u_lock_try(false));
    /// assert!(!lock.u_lock_try(true)); // transfer cannot recurse
    /// assert!(lock.u_lock_try(false)); // plain recursion
    /// lock.u_unlock(false);
    /// lock.u_unlock(false);
    /// ```
    #[inline]
    #[must_use]
    pub fn u_lock_try(&self, for_io: bool) -> bool {
        let id = owner::current();
        if self.writer.load() == Owner::Thread(id) {
            if for_io {
                return false;
            }
            self.recursion.recurse(Mode::Update);
            return true;
        }
        if self.lock.try_update() {
            self.recursion.start(Mode::Update);
            self.writer
                .set_first(if for_io { Owner::Io } else { Owner::Thread(id) });
            true
        } else {
            false
        }
    }

    /// Releases an update lock.
    ///
    /// `claim_ownership` acknowledges that the calling thread releases on
    /// behalf of an owner that deferred the release to an I/O completion
    /// thread; it is required when the recorded owner is the I/O sentinel
    /// and the held chain is exactly one acquisition deep.
    #[inline]
    pub fn u_unlock(&self, claim_ownership: bool) {
        self.u_or_x_unlock(Mode::Update, claim_ownership);
    }

    /// Acquires an exclusive lock, recursively if the calling thread
    /// already holds X.
    ///
    /// `for_io` marks a fresh acquisition for release by another thread and
    /// must not be combined with recursion. A thread holding only U must
    /// use [`u_x_upgrade`](Self::u_x_upgrade) or
    /// [`x_lock_upgraded`](Self::x_lock_upgraded) instead of recursing into
    /// X.
    ///
    /// # Examples
    ///
    /// ```
    /// use sux::SuxLock;
    ///
    /// let lock = SuxLock::new();
    /// lock.x_lock(false);
    /// lock.x_lock(false); // recursive
    /// assert!(!lock.s_lock_try());
    /// lock.x_unlock(false);
    /// lock.x_unlock(false);
    /// ```
    #[inline]
    #[track_caller]
    pub fn x_lock(&self, for_io: bool) {
        let id = owner::current();
        if self.writer.load() == Owner::Thread(id) {
            debug_assert!(!for_io);
            self.recursion.recurse(Mode::Exclusive);
        } else {
            self.count_wait(self.lock.exclusive());
            self.recursion.start(Mode::Exclusive);
            self.writer
                .set_first(if for_io { Owner::Io } else { Owner::Thread(id) });
        }
    }

    /// Tries to acquire an exclusive lock without blocking.
    #[inline]
    #[must_use]
    pub fn x_lock_try(&self) -> bool {
        let id = owner::current();
        if self.writer.load() == Owner::Thread(id) {
            self.recursion.recurse(Mode::Exclusive);
            return true;
        }
        if self.lock.try_exclusive() {
            self.recursion.start(Mode::Exclusive);
            self.writer.set_first(Owner::Thread(id));
            true
        } else {
            false
        }
    }

    /// Adds one level of X to a chain the calling thread already holds,
    /// without re-deriving the mode.
    #[inline]
    pub fn x_lock_recursive(&self) {
        debug_assert_eq!(self.writer.load(), Owner::Thread(owner::current()));
        self.recursion.recurse(Mode::Exclusive);
    }

    /// Releases an exclusive lock.
    ///
    /// `claim_ownership` has the same meaning as for
    /// [`u_unlock`](Self::u_unlock).
    #[inline]
    pub fn x_unlock(&self, claim_ownership: bool) {
        self.u_or_x_unlock(Mode::Exclusive, claim_ownership);
    }

    fn u_or_x_unlock(&self, mode: Mode, claim_ownership: bool) {
        if cfg!(debug_assertions) {
            let writer = self.writer.load();
            assert!(
                writer == Owner::Thread(owner::current())
                    || (writer == Owner::Io
                        && claim_ownership
                        && self.recursion.is_single(mode)),
                "unlock by a thread that does not own the lock"
            );
        }
        if self.recursion.release(mode) {
            self.writer.set_next(Owner::Unowned);
            match mode {
                Mode::Update => self.lock.release_update(),
                Mode::Exclusive => self.lock.release_exclusive(),
            }
        }
    }

    /// Upgrades a pure-U chain to X, preserving the total depth.
    ///
    /// The calling thread must hold U and no X. The transition is atomic:
    /// no other thread can acquire the lock in between.
    ///
    /// # Examples
    ///
    /// ```
    /// use sux::SuxLock;
    ///
    /// let lock = SuxLock::new();
    /// lock.u_lock();
    /// lock.u_lock();
    /// lock.u_x_upgrade();
    /// assert!(lock.have_x());
    /// lock.x_unlock(false);
    /// lock.x_unlock(false);
    /// assert!(!lock.have_u_or_x());
    /// ```
    #[inline]
    #[track_caller]
    pub fn u_x_upgrade(&self) {
        debug_assert!(self.have_u_not_x());
        self.count_wait(self.lock.upgrade());
        self.recursion.upgrade();
    }

    /// Acquires X unconditionally: recursively if the calling thread
    /// already holds some X, upgrading if it holds pure U, or freshly
    /// otherwise.
    ///
    /// Returns `true` if U locks were upgraded to X.
    ///
    /// # Examples
    ///
    /// ```
    /// use sux::SuxLock;
    ///
    /// let lock = SuxLock::new();
    /// lock.u_lock();
    /// assert!(lock.x_lock_upgraded()); // upgraded
    /// assert!(!lock.x_lock_upgraded()); // already X: plain recursion
    /// lock.x_unlock(false);
    /// lock.x_unlock(false);
    /// ```
    #[allow(clippy::must_use_candidate)]
    #[track_caller]
    pub fn x_lock_upgraded(&self) -> bool {
        let id = owner::current();
        if self.writer.load() == Owner::Thread(id) {
            debug_assert!(self.recursion.is_held());
            if self.recursion.depth(Mode::Exclusive) > 0 {
                self.recursion.recurse(Mode::Exclusive);
                false
            } else {
                self.count_wait(self.lock.upgrade());
                self.recursion.upgrade();
                true
            }
        } else {
            self.count_wait(self.lock.exclusive());
            self.recursion.start(Mode::Exclusive);
            self.writer.set_first(Owner::Thread(id));
            false
        }
    }

    /// Adopts the current U or X hold for the calling thread.
    ///
    /// Used by recovery and I/O completion paths that must take over a lock
    /// whose acquirer recorded the deferred-release owner.
    #[inline]
    pub fn claim_ownership(&self) {
        self.writer.set_next(Owner::Thread(owner::current()));
    }

    /// Returns `true` if the calling thread holds U or X.
    #[inline]
    #[must_use]
    pub fn have_u_or_x(&self) -> bool {
        if self.writer.load() != Owner::Thread(owner::current()) {
            return false;
        }
        debug_assert!(self.recursion.is_held());
        true
    }

    /// Returns `true` if the calling thread holds U but no X.
    #[inline]
    #[must_use]
    pub fn have_u_not_x(&self) -> bool {
        self.have_u_or_x() && self.recursion.depth(Mode::Exclusive) == 0
    }

    /// Returns `true` if the calling thread holds X.
    #[inline]
    #[must_use]
    pub fn have_x(&self) -> bool {
        self.have_u_or_x() && self.recursion.depth(Mode::Exclusive) > 0
    }

    /// Returns `true` if the calling thread holds S (debug builds only).
    #[cfg(debug_assertions)]
    #[must_use]
    pub fn have_s(&self) -> bool {
        self.readers.contains(owner::current())
    }

    /// Returns `true` if the calling thread holds the latch in any mode
    /// (debug builds only).
    #[cfg(debug_assertions)]
    #[must_use]
    pub fn have_any(&self) -> bool {
        self.have_u_or_x() || self.have_s()
    }

    /// Returns `true` if the held U/X chain is exactly one acquisition deep
    /// (debug builds only).
    ///
    /// # Panics
    ///
    /// Panics if no U or X lock is held at all.
    #[cfg(debug_assertions)]
    #[must_use]
    pub fn not_recursive(&self) -> bool {
        assert!(self.recursion.is_held());
        self.recursion.is_single_level()
    }

    /// Returns the number of acquisitions that had to block.
    ///
    /// # Examples
    ///
    /// ```
    /// use sux::SuxLock;
    ///
    /// let lock = SuxLock::new();
    /// lock.x_lock(false); // uncontended
    /// assert_eq!(lock.waited(), 0);
    /// lock.x_unlock(false);
    /// ```
    #[inline]
    #[must_use]
    pub fn waited(&self) -> u32 {
        self.waits.load(Relaxed)
    }

    /// Resets the blocking-acquisition counter.
    #[inline]
    pub fn reset_waited(&self) {
        self.waits.store(0, Relaxed);
    }

    /// Returns `true` if any thread is blocked waiting for U or X.
    #[inline]
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.lock.has_waiters()
    }

    /// Reinitializes the latch to the all-free state without releasing
    /// anything, for relocating or cloning a containing object.
    ///
    /// The exclusive borrow is the proof that no other holder or waiter can
    /// exist; the discarded state is forgotten rather than dropped, so the
    /// drop-time "must be unheld" checks do not apply to it.
    #[inline]
    pub fn reinit(&mut self)
    where
        R: Default,
    {
        let stale = mem::replace(self, Self::from_raw(R::default()));
        mem::forget(stale);
    }
}

impl<R: RawLatch + Default> Default for SuxLock<R> {
    #[inline]
    fn default() -> Self {
        Self::from_raw(R::default())
    }
}

impl<R> Drop for SuxLock<R> {
    #[inline]
    fn drop(&mut self) {
        debug_assert_eq!(self.writer.load(), Owner::Unowned);
        debug_assert!(!self.recursion.is_held());
        #[cfg(debug_assertions)]
        assert!(self.readers.is_empty(), "shared locks outlive the latch");
    }
}

impl<R> fmt::Debug for SuxLock<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuxLock")
            .field("writer", &self.writer.load())
            .field("u_depth", &self.recursion.depth(Mode::Update))
            .field("x_depth", &self.recursion.depth(Mode::Exclusive))
            .field("waits", &self.waits.load(Relaxed))
            .finish_non_exhaustive()
    }
}
