//! Atomic cells used for metric storage.
//!
//! Counters and gauges are updated from arbitrary threads without taking a lock.  Integer deltas map
//! directly onto a 64-bit fetch-and-add, while floating-point deltas are applied by reinterpreting
//! the bit pattern of an `f64` stored in an `AtomicU64` and retrying a compare-and-swap until it
//! lands.
//!
//! A 64-bit atomic integer is required regardless of whether the standard library exposes one for
//! the target architecture, so 32-bit targets fall back to `portable-atomic`.

use std::sync::atomic::Ordering;

#[cfg(target_pointer_width = "32")]
pub use portable_atomic::AtomicU64;
#[cfg(not(target_pointer_width = "32"))]
pub use std::sync::atomic::AtomicU64;

/// An `f64` that can be shared and updated across threads.
///
/// Stored as the raw bit pattern of the float inside an [`AtomicU64`].
#[derive(Debug)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    /// Creates a new `AtomicF64` holding `value`.
    pub fn new(value: f64) -> Self {
        Self { bits: AtomicU64::new(value.to_bits()) }
    }

    /// Loads the current value.
    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Overwrites the current value.
    pub fn store(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }

    /// Adds `delta` to the current value, returning the previous value.
    ///
    /// Each failed compare-and-swap means another writer made progress, so the loop is bounded by
    /// contention rather than by time.
    pub fn fetch_add(&self, delta: f64) -> f64 {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match self.bits.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(previous) => return f64::from_bits(previous),
                Err(observed) => current = observed,
            }
        }
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}
