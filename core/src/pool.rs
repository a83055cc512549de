//! Reusable per-frame scratch storage.
//!
//! Frame-scoped lists (dispatch batches, transition lists) are rebuilt every
//! frame. [`Pooled<T>`] keeps such a list's allocation between frames: when
//! the frame is done the value is reset in place instead of dropped, and the
//! next frame activates it again with its capacity intact.
//!
//! # Example
//!
//! ```
//! use skincache_core::pool::{Poolable, Pooled};
//!
//! #[derive(Debug, Default)]
//! struct Transitions {
//!     buffers: Vec<u64>,
//! }
//!
//! impl Poolable for Transitions {
//!     fn new_empty() -> Self {
//!         Self::default()
//!     }
//!     fn reset(&mut self) {
//!         self.buffers.clear();
//!     }
//! }
//!
//! let mut scratch = Pooled::<Transitions>::default();
//! scratch.activate().buffers.extend_from_slice(&[7, 8, 9]);
//! assert_eq!(scratch.get().map(|t| t.buffers.len()), Some(3));
//!
//! scratch.release();
//! assert!(scratch.get().is_none());
//! assert!(scratch.inner().buffers.capacity() >= 3);
//! ```

/// A value that can be emptied without giving its allocation back.
pub trait Poolable {
    /// Creates an empty value.
    fn new_empty() -> Self;

    /// Empties the value, keeping capacity (`Vec::clear`, not `Vec::new`).
    fn reset(&mut self);
}

/// A [`Poolable`] value that is either in use or parked for reuse.
#[derive(Debug)]
pub enum Pooled<T: Poolable> {
    /// Holds data for the current frame.
    Active(T),
    /// Reset and waiting for the next frame.
    Pooled(T),
}

impl<T: Poolable> Pooled<T> {
    /// Returns `true` while the value holds live data.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// Live data, or `None` while parked.
    pub fn get(&self) -> Option<&T> {
        match self {
            Self::Active(t) => Some(t),
            Self::Pooled(_) => None,
        }
    }

    /// Live data mutably, or `None` while parked.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        match self {
            Self::Active(t) => Some(t),
            Self::Pooled(_) => None,
        }
    }

    /// Resets the value and parks it. No-op when already parked.
    pub fn release(&mut self) {
        if let Self::Active(t) = self {
            t.reset();
            let taken = std::mem::replace(t, T::new_empty());
            *self = Self::Pooled(taken);
        }
    }

    /// Marks the value live again and returns it for filling.
    pub fn activate(&mut self) -> &mut T {
        if let Self::Pooled(t) = self {
            let taken = std::mem::replace(t, T::new_empty());
            *self = Self::Active(taken);
        }
        match self {
            Self::Active(t) | Self::Pooled(t) => t,
        }
    }

    /// The underlying value in either state.
    pub fn inner(&self) -> &T {
        match self {
            Self::Active(t) | Self::Pooled(t) => t,
        }
    }
}

impl<T: Poolable> Default for Pooled<T> {
    fn default() -> Self {
        Self::Pooled(T::new_empty())
    }
}

impl<T> Poolable for Vec<T> {
    fn new_empty() -> Self {
        Vec::new()
    }

    fn reset(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Scratch {
        items: Vec<u32>,
    }

    impl Poolable for Scratch {
        fn new_empty() -> Self {
            Self::default()
        }
        fn reset(&mut self) {
            self.items.clear();
        }
    }

    #[test]
    fn test_default_is_parked() {
        let pooled = Pooled::<Scratch>::default();
        assert!(!pooled.is_active());
        assert!(pooled.get().is_none());
    }

    #[test]
    fn test_release_keeps_capacity() {
        let mut pooled = Pooled::<Scratch>::default();
        pooled.activate().items.extend(0..64);
        pooled.release();

        assert!(!pooled.is_active());
        assert!(pooled.inner().items.is_empty());
        assert!(pooled.inner().items.capacity() >= 64);
    }

    #[test]
    fn test_activate_after_release_reuses_allocation() {
        let mut pooled = Pooled::<Scratch>::default();
        pooled.activate().items.extend(0..16);
        pooled.release();
        let capacity = pooled.inner().items.capacity();

        let scratch = pooled.activate();
        assert!(scratch.items.is_empty());
        assert_eq!(scratch.items.capacity(), capacity);
    }

    #[test]
    fn test_activate_on_active_keeps_data() {
        let mut pooled = Pooled::<Scratch>::default();
        pooled.activate().items.push(5);
        assert_eq!(pooled.activate().items, vec![5]);
        if let Some(scratch) = pooled.get_mut() {
            scratch.items.push(6);
        }
        assert_eq!(pooled.get().map(|s| s.items.len()), Some(2));
    }

    #[test]
    fn test_vec_is_poolable() {
        let mut pooled = Pooled::<Vec<u8>>::default();
        pooled.activate().push(1);
        pooled.release();
        assert!(pooled.inner().is_empty());
    }
}
