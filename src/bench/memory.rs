//! Heap introspection for the benchmark
//!
//! Rust has no portable "used heap" query, so measurement is opt-in: a
//! binary installs [`TrackingAllocator`] as its global allocator and hands
//! it to the harness as a [`MemoryProbe`]. Without a probe, memory cells
//! are recorded as unsupported.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicU64, Ordering};

/// Something that can report live heap bytes
pub trait MemoryProbe: Send + Sync {
    /// Bytes currently allocated
    fn allocated_bytes(&self) -> u64;
}

/// Global allocator wrapper counting live bytes
///
/// ```rust,ignore
/// #[global_allocator]
/// static ALLOCATOR: TrackingAllocator = TrackingAllocator::new();
/// ```
pub struct TrackingAllocator {
    allocated: AtomicU64,
}

impl TrackingAllocator {
    /// Create a counter starting at zero
    pub const fn new() -> Self {
        TrackingAllocator {
            allocated: AtomicU64::new(0),
        }
    }
}

impl Default for TrackingAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: every call is forwarded unchanged to the system allocator; the
// counter is only bookkeeping.
unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            self.allocated.fetch_add(layout.size() as u64, Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc_zeroed(layout);
        if !ptr.is_null() {
            self.allocated.fetch_add(layout.size() as u64, Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        self.allocated.fetch_sub(layout.size() as u64, Ordering::Relaxed);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = System.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            let old_size = layout.size() as u64;
            let new_size = new_size as u64;
            if new_size >= old_size {
                self.allocated.fetch_add(new_size - old_size, Ordering::Relaxed);
            } else {
                self.allocated.fetch_sub(old_size - new_size, Ordering::Relaxed);
            }
        }
        new_ptr
    }
}

impl MemoryProbe for TrackingAllocator {
    fn allocated_bytes(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }
}

/// Heap growth between two readings in KB
///
/// Other threads free memory while a tier runs, so `after` can be below
/// `before`; such a delta is reported as zero.
pub fn delta_kb(before: u64, after: u64) -> f64 {
    (after.saturating_sub(before)) as f64 / 1024.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_clamped_at_zero() {
        assert_eq!(delta_kb(4096, 1024), 0.0);
        assert_eq!(delta_kb(1024, 3072), 2.0);
    }

    #[test]
    fn test_tracking_counts_alloc_and_free() {
        let tracker = TrackingAllocator::new();
        let layout = Layout::from_size_align(4096, 8).unwrap();

        unsafe {
            let ptr = tracker.alloc(layout);
            assert!(!ptr.is_null());
            assert_eq!(tracker.allocated_bytes(), 4096);

            let ptr = tracker.realloc(ptr, layout, 8192);
            assert!(!ptr.is_null());
            assert_eq!(tracker.allocated_bytes(), 8192);

            tracker.dealloc(ptr, Layout::from_size_align(8192, 8).unwrap());
        }
        assert_eq!(tracker.allocated_bytes(), 0);
    }
}
