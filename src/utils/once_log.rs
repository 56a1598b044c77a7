//! Log-once gate
//!
//! Long transient states (loading screens, teardown) make the same per-node
//! failure repeat thousands of times per second. Callers ask the gate first and
//! only log when it answers `true`.

use parking_lot::Mutex;
use std::collections::HashSet;

/// Remembers which error categories have been logged this session
#[derive(Debug, Default)]
pub struct OnceLog {
    seen: Mutex<HashSet<String>>,
}

impl OnceLog {
    /// Gate with nothing seen
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time `category` is seen
    pub fn first(&self, category: &str) -> bool {
        let mut seen = self.seen.lock();
        if seen.contains(category) {
            return false;
        }
        seen.insert(category.to_string())
    }

    /// Number of categories seen
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// Nothing seen yet
    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }

    /// Forget everything; the next occurrence of each category logs again
    pub fn clear(&self) {
        self.seen.lock().clear();
    }
}
