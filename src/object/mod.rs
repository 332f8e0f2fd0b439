//! The object model (spec.md §4.2).
//!
//! The original header is a small struct carrying a strong ref count, an
//! optional parent weak reference, a release function pointer, and (in
//! developer builds) a frozen bit. Rust's `Arc<T>` already *is* that
//! ref-counted release-on-zero primitive, so this module does not
//! reimplement it — every strong/weak pair in this crate is a plain
//! `Arc`/`Weak`. What's left to provide, and what this module actually
//! supplies, is:
//!
//! * [`FrozenFlag`]: the freezable-after-first-instantiation bit class
//!   objects (`FieldClass`, `ClockClass`, `EventClass`, `StreamClass`,
//!   `TraceClass`) and instances (`Field`, `Event`, `Packet`, `Message`)
//!   carry, with the `debug_assert!`-gated check that stands in for the
//!   original's "developer mode" build flag (§4.2: "a frozen bit" checked
//!   only in developer builds — `debug_assertions` is the idiomatic Rust
//!   equivalent of that build-time switch).
//! * [`pool`], the generic recycling pool and the `Recycled<T>` smart
//!   pointer that automatically returns a value to its pool when the last
//!   strong reference drops.

use std::sync::atomic::{AtomicBool, Ordering};

/// A freeze bit usable from behind a shared reference (`&self` setters on
/// class builders still need interior mutability to flip it).
#[derive(Debug, Default)]
pub struct FrozenFlag(AtomicBool);

impl FrozenFlag {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Debug-mode-only assertion that a write site is not touching a frozen
    /// object, mirroring the original's developer-mode frozen check.
    pub fn debug_assert_mutable(&self) {
        debug_assert!(!self.get(), "mutation of a frozen object");
    }
}

impl Clone for FrozenFlag {
    fn clone(&self) -> Self {
        FrozenFlag(AtomicBool::new(self.get()))
    }
}

pub mod pool;
pub use pool::{ObjectPool, Recyclable, Recycled};
