//! Reference counters embedded in every [`Object`](crate::Object)
//!
//! Both counters start at zero. `increment` and `decrement` return the count
//! after the operation, so a `decrement` returning `0` tells the caller it
//! dropped the last reference.

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering, fence};

/// Counter contract used by the lifecycle wrapper.
pub trait RefCount: Default {
    /// Increment the count. Returns the new count.
    fn increment(&self) -> usize;

    /// Decrement the count. Returns the new count.
    ///
    /// Decrementing a zero count is a contract violation.
    fn decrement(&self) -> usize;

    /// Current count
    fn count(&self) -> usize;
}

/// Atomic reference counter, safe to share across threads.
#[repr(transparent)]
#[derive(Debug)]
pub struct AtomicRefCount(AtomicUsize);

impl AtomicRefCount {
    /// Create a new counter with count = 0
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicUsize::new(0))
    }
}

impl Default for AtomicRefCount {
    fn default() -> Self {
        Self::new()
    }
}

impl RefCount for AtomicRefCount {
    #[inline]
    fn increment(&self) -> usize {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline]
    fn decrement(&self) -> usize {
        let previous = self.0.fetch_sub(1, Ordering::Release);
        debug_assert!(previous != 0, "reference count underflow");

        if previous == 1 {
            // Pairs with the Release above on every other holder's decrement
            fence(Ordering::Acquire);
        }

        previous.wrapping_sub(1)
    }

    #[inline]
    fn count(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

/// Non-atomic counter for objects that never leave one thread.
///
/// `LocalRefCount` is `!Sync`, so an object using it cannot be shared across
/// threads through [`ObjectRef`](crate::ObjectRef).
#[derive(Debug, Default)]
pub struct LocalRefCount(Cell<usize>);

impl LocalRefCount {
    /// Create a new counter with count = 0
    #[must_use]
    pub const fn new() -> Self {
        Self(Cell::new(0))
    }
}

impl RefCount for LocalRefCount {
    #[inline]
    fn increment(&self) -> usize {
        let count = self.0.get() + 1;
        self.0.set(count);
        count
    }

    #[inline]
    fn decrement(&self) -> usize {
        let previous = self.0.get();
        debug_assert!(previous != 0, "reference count underflow");

        let count = previous.wrapping_sub(1);
        self.0.set(count);
        count
    }

    #[inline]
    fn count(&self) -> usize {
        self.0.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise<R: RefCount>() {
        let counter = R::default();
        assert_eq!(counter.count(), 0);

        assert_eq!(counter.increment(), 1);
        assert_eq!(counter.increment(), 2);
        assert_eq!(counter.count(), 2);

        assert_eq!(counter.decrement(), 1);
        assert_eq!(counter.decrement(), 0);
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn test_atomic_counter() {
        exercise::<AtomicRefCount>();
    }

    #[test]
    fn test_local_counter() {
        exercise::<LocalRefCount>();
    }

    #[test]
    fn test_atomic_counter_is_pointer_sized() {
        assert_eq!(
            std::mem::size_of::<AtomicRefCount>(),
            std::mem::size_of::<usize>()
        );
    }

    #[test]
    fn test_atomic_counter_across_threads() {
        let counter = AtomicRefCount::new();
        counter.increment();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..1000 {
                        counter.increment();
                        counter.decrement();
                    }
                });
            }
        });

        assert_eq!(counter.count(), 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "reference count underflow")]
    fn test_underflow_is_caught_in_debug() {
        let counter = LocalRefCount::new();
        counter.decrement();
    }
}
