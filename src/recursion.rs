//! Packed recursion depths for the write-side modes.
//!
//! A single `u32` holds two counters: the X depth in bits 0–15 and the U
//! depth in bits 16–31. Mode-specific step constants keep the counters from
//! carrying into each other as long as each stays below
//! [`Recursion::MAX_DEPTH`]; exceeding the maximum is a caller bug caught by
//! debug assertions.

use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::Relaxed;

/// Write-side lock modes tracked by [`Recursion`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Mode {
    /// Update: coexists with shared holders.
    Update,
    /// Exclusive: excludes everything.
    Exclusive,
}

impl Mode {
    /// The step added to the packed word per acquisition in this mode.
    pub(crate) const fn step(self) -> u32 {
        match self {
            Mode::Update => Recursion::U_STEP,
            Mode::Exclusive => Recursion::X_STEP,
        }
    }
}

/// The two packed recursion counters.
///
/// Only the owning thread mutates the word while it is non-zero, and a fresh
/// owner writes it only right after winning the underlying update/exclusive
/// acquisition, so relaxed operations suffice.
#[derive(Debug, Default)]
pub(crate) struct Recursion(AtomicU32);

impl Recursion {
    /// Step per X acquisition.
    const X_STEP: u32 = 1;
    /// Step per U acquisition.
    const U_STEP: u32 = 1 << 16;
    /// Maximum nesting depth of either mode.
    pub(crate) const MAX_DEPTH: u32 = Self::U_STEP - 1;

    #[inline]
    fn word(&self) -> u32 {
        self.0.load(Relaxed)
    }

    #[inline]
    fn set(&self, word: u32) {
        self.0.store(word, Relaxed);
    }

    /// Extracts the depth of `mode` from a packed word.
    const fn depth_of(word: u32, mode: Mode) -> u32 {
        (word / mode.step()) & Self::MAX_DEPTH
    }

    /// Returns `true` if any U or X acquisition is outstanding.
    #[inline]
    pub(crate) fn is_held(&self) -> bool {
        self.word() != 0
    }

    /// Returns the current depth of `mode`.
    #[inline]
    pub(crate) fn depth(&self, mode: Mode) -> u32 {
        Self::depth_of(self.word(), mode)
    }

    /// Returns `true` if the word records exactly one acquisition of `mode`
    /// and nothing else.
    #[inline]
    pub(crate) fn is_single(&self, mode: Mode) -> bool {
        self.word() == mode.step()
    }

    /// Returns `true` if the held chain is exactly one acquisition deep.
    #[cfg(debug_assertions)]
    pub(crate) fn is_single_level(&self) -> bool {
        let word = self.word();
        word == Self::X_STEP || word == Self::U_STEP
    }

    /// Records the first acquisition of a fresh owner.
    #[inline]
    pub(crate) fn start(&self, mode: Mode) {
        debug_assert_eq!(self.word(), 0);
        self.set(mode.step());
    }

    /// Adds one level of `mode` to the current owner's chain.
    ///
    /// A recursive U request only needs some chain to exist; a recursive X
    /// request requires existing X depth (a pure-U holder must upgrade
    /// instead of recursing into X).
    #[inline]
    pub(crate) fn recurse(&self, mode: Mode) {
        let word = self.word();
        match mode {
            Mode::Update => debug_assert_ne!(word, 0),
            Mode::Exclusive => debug_assert_ne!(Self::depth_of(word, mode), 0),
        }
        debug_assert!(Self::depth_of(word, mode) < Self::MAX_DEPTH);
        self.set(word + mode.step());
    }

    /// Removes one level of `mode`; returns `true` when the whole chain is
    /// released.
    #[inline]
    pub(crate) fn release(&self, mode: Mode) -> bool {
        let word = self.word();
        debug_assert_ne!(Self::depth_of(word, mode), 0);
        let next = word - mode.step();
        self.set(next);
        next == 0
    }

    /// Reinterprets a pure-U chain as an X chain of the same total depth.
    ///
    /// Valid only while the X depth is zero: the division moves the U bits
    /// into the X bits.
    #[inline]
    pub(crate) fn upgrade(&self) {
        let word = self.word();
        debug_assert_eq!(Self::depth_of(word, Mode::Exclusive), 0);
        debug_assert_ne!(Self::depth_of(word, Mode::Update), 0);
        self.set(word / Self::U_STEP);
    }
}
