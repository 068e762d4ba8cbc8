#![deny(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![doc = include_str!("../README.md")]

pub mod raw;
pub use raw::{Latch, RawLatch, Traced};

pub mod sux;
pub use sux::SuxLock;

mod owner;
#[cfg(debug_assertions)]
mod readers;
mod recursion;

#[cfg(test)]
mod tests;
