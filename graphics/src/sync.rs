//! GPU synchronization primitives.
//!
//! - [`Fence`] lets the CPU observe GPU completion (readbacks, frame ends)
//! - [`PipeFence`] orders work between the graphics and async-compute pipes

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// GPU-to-GPU fence between two pipelines.
///
/// One pipe signals it, the other waits on it. Cannot be observed from the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipeFence {
    id: u64,
}

impl PipeFence {
    /// Allocate a fence with a process-unique id.
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Get the fence's unique ID (for debugging).
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Default for PipeFence {
    fn default() -> Self {
        Self::new()
    }
}

/// Status of a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// The fence has not yet been signaled.
    Unsignaled,
    /// The fence has been signaled (GPU work complete).
    Signaled,
}

/// CPU-GPU synchronization primitive.
///
/// Clones share the same signal state.
#[derive(Debug)]
pub struct Fence {
    signaled: Arc<AtomicBool>,
}

impl Fence {
    /// Create a new fence in the unsignaled state.
    pub fn new_unsignaled() -> Self {
        Self {
            signaled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check the current status of the fence.
    pub fn status(&self) -> FenceStatus {
        if self.signaled.load(Ordering::Acquire) {
            FenceStatus::Signaled
        } else {
            FenceStatus::Unsignaled
        }
    }

    /// Check if the fence is signaled (non-blocking).
    pub fn is_signaled(&self) -> bool {
        self.status() == FenceStatus::Signaled
    }

    /// Wait for the fence with a timeout.
    ///
    /// Returns `true` if the fence was signaled, `false` if timeout elapsed.
    pub fn wait_timeout(&self, timeout: std::time::Duration) -> bool {
        let start = std::time::Instant::now();
        while !self.signaled.load(Ordering::Acquire) {
            if start.elapsed() >= timeout {
                return false;
            }
            std::thread::yield_now();
        }
        true
    }

    /// Signal the fence.
    ///
    /// Called by the backend once the GPU work guarded by this fence retires.
    pub(crate) fn signal(&self) {
        self.signaled.store(true, Ordering::Release);
    }
}

impl Clone for Fence {
    fn clone(&self) -> Self {
        Self {
            signaled: Arc::clone(&self.signaled),
        }
    }
}

impl Default for Fence {
    fn default() -> Self {
        Self::new_unsignaled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_fence_ids_are_unique() {
        let a = PipeFence::new();
        let b = PipeFence::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_fence_unsignaled() {
        let fence = Fence::new_unsignaled();
        assert_eq!(fence.status(), FenceStatus::Unsignaled);
        assert!(!fence.is_signaled());
    }

    #[test]
    fn test_fence_signal_from_thread() {
        let fence = Fence::new_unsignaled();
        let fence_clone = fence.clone();
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(10));
            fence_clone.signal();
        });

        assert!(fence.wait_timeout(std::time::Duration::from_secs(5)));
        assert!(fence.is_signaled());
    }

    #[test]
    fn test_fence_wait_timeout() {
        let fence = Fence::new_unsignaled();
        assert!(!fence.wait_timeout(std::time::Duration::from_millis(10)));
    }
}
