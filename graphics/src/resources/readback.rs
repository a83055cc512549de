//! Asynchronous GPU→CPU buffer copies.

use std::sync::Arc;

use parking_lot::Mutex;

use super::BufferId;
use crate::sync::Fence;

/// A copy of (part of) a GPU buffer into CPU-visible memory.
///
/// The copy is recorded on a command list and retires some frames later.
/// Poll [`is_ready`](Self::is_ready) once per frame; never block on it.
#[derive(Debug, Clone)]
pub struct Readback {
    source: BufferId,
    byte_count: u64,
    fence: Fence,
    data: Arc<Mutex<Option<Vec<u8>>>>,
}

impl Readback {
    pub(crate) fn new(source: BufferId, byte_count: u64) -> Self {
        Self {
            source,
            byte_count,
            fence: Fence::new_unsignaled(),
            data: Arc::new(Mutex::new(None)),
        }
    }

    /// Buffer the copy reads from.
    pub fn source(&self) -> BufferId {
        self.source
    }

    /// Number of bytes copied.
    pub fn byte_count(&self) -> u64 {
        self.byte_count
    }

    /// Returns true once the GPU has finished the copy.
    pub fn is_ready(&self) -> bool {
        self.fence.is_signaled()
    }

    /// Takes the copied bytes. `None` before completion or after a previous take.
    pub fn take_data(&self) -> Option<Vec<u8>> {
        if !self.is_ready() {
            return None;
        }
        self.data.lock().take()
    }

    /// Stores the copied bytes and signals completion.
    pub(crate) fn complete(&self, bytes: Vec<u8>) {
        *self.data.lock() = Some(bytes);
        self.fence.signal();
    }
}
