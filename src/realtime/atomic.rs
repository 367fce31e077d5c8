// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Atomic scalar wrappers for lock-free mixer-thread <-> reader
//! communication. Adapted from `sootmix`'s `realtime::atomic_params`.

use std::sync::atomic::{AtomicI32 as StdAtomicI32, AtomicU32 as StdAtomicU32, Ordering};

/// Atomic f32. `Relaxed` ordering is sufficient: these values (feedback
/// levels, soft master volume, output delay) are independent snapshots
/// where torn/stale reads are acceptable (spec.md §5 "Shared resources").
#[derive(Debug)]
pub struct AtomicF32 {
    bits: StdAtomicU32,
}

impl AtomicF32 {
    #[inline]
    pub const fn new(value: f32) -> Self {
        Self {
            bits: StdAtomicU32::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Clone for AtomicF32 {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

/// Atomic i32 wrapper (used for the measured output delay, in ms).
#[derive(Debug)]
pub struct AtomicI32 {
    inner: StdAtomicI32,
}

impl AtomicI32 {
    #[inline]
    pub const fn new(value: i32) -> Self {
        Self {
            inner: StdAtomicI32::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> i32 {
        self.inner.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set(&self, value: i32) {
        self.inner.store(value, Ordering::Relaxed);
    }
}

impl Default for AtomicI32 {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Atomic bool wrapper (used for the mixer's suspended/shutdown flags).
#[derive(Debug)]
pub struct AtomicBool {
    inner: std::sync::atomic::AtomicBool,
}

impl AtomicBool {
    #[inline]
    pub const fn new(value: bool) -> Self {
        Self {
            inner: std::sync::atomic::AtomicBool::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.inner.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set(&self, value: bool) {
        self.inner.store(value, Ordering::Relaxed);
    }
}

impl Default for AtomicBool {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_f32_roundtrip() {
        let a = AtomicF32::new(1.0);
        assert!((a.get() - 1.0).abs() < 1e-6);
        a.set(0.5);
        assert!((a.get() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn atomic_bool_roundtrip() {
        let b = AtomicBool::new(false);
        assert!(!b.get());
        b.set(true);
        assert!(b.get());
    }
}
