//! Atomic per-cell counters shared by the grid histogram and the counting-sort
//! slot claim.
//!
//! These are the only read-modify-write operations in the frame pipeline that
//! can contend across threads. The GPU backend mirrors the same layout with
//! `atomicAdd` on an `array<atomic<u32>>`.

use std::sync::atomic::{AtomicU32, Ordering};

/// A fixed-length array of `u32` counters supporting concurrent increments.
#[derive(Debug, Default)]
pub struct AtomicCounters {
    slots: Vec<AtomicU32>,
}

impl AtomicCounters {
    /// Create `len` counters, all zero.
    pub fn zeroed(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Create counters seeded from existing values (e.g. prefix sums used as
    /// write heads).
    pub fn from_values(values: &[u32]) -> Self {
        Self {
            slots: values.iter().map(|&v| AtomicU32::new(v)).collect(),
        }
    }

    /// Number of counters.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether there are no counters.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Atomically add one to counter `index`, returning the value it held
    /// before the increment.
    #[inline]
    pub fn increment(&self, index: usize) -> u32 {
        self.slots[index].fetch_add(1, Ordering::Relaxed)
    }

    /// Current value of counter `index`.
    #[inline]
    pub fn get(&self, index: usize) -> u32 {
        self.slots[index].load(Ordering::Relaxed)
    }

    /// Overwrite counter `index`. Used when the slots hold claimed indices
    /// rather than counts.
    #[inline]
    pub fn store(&self, index: usize, value: u32) {
        self.slots[index].store(value, Ordering::Relaxed)
    }

    /// Resize to `len` counters and zero every one of them.
    pub fn reset(&mut self, len: usize) {
        self.slots.resize_with(len, || AtomicU32::new(0));
        for slot in &mut self.slots {
            *slot.get_mut() = 0;
        }
    }

    /// Overwrite every counter with `values`, resizing to match.
    pub fn load_from(&mut self, values: &[u32]) {
        self.slots.resize_with(values.len(), || AtomicU32::new(0));
        for (slot, &v) in self.slots.iter_mut().zip(values) {
            *slot.get_mut() = v;
        }
    }

    /// Copy the counters out as plain integers.
    ///
    /// Takes `&mut self` so no increments can be in flight.
    pub fn snapshot(&mut self) -> Vec<u32> {
        self.slots.iter_mut().map(|s| *s.get_mut()).collect()
    }
}
