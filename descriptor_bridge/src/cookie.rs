//! Cookie allocation
//!
//! A cookie is a 64-bit identity handed to every view, resource and heap so
//! descriptor copies can tell "same object as before" without comparing
//! descriptions. Zero is reserved for "nothing bound".

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic cookie source owned by a device
///
/// Several devices may share one allocator through an `Arc` when cookies
/// must be unique across them.
#[derive(Debug)]
pub struct CookieAllocator {
    next: AtomicU64,
}

impl CookieAllocator {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(1) }
    }

    /// Allocate a fresh non-zero cookie
    ///
    /// Values are distinct across threads and strictly increasing in the
    /// order a single thread observes them.
    pub fn allocate(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of cookies handed out so far
    pub fn allocated(&self) -> u64 {
        self.next.load(Ordering::Relaxed) - 1
    }
}

impl Default for CookieAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "cookie_tests.rs"]
mod tests;
