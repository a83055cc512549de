//! Buffer access states and the transitions between them.

use crate::resources::{Buffer, BufferId};

/// How a buffer is accessed by a command.
///
/// Moving a buffer from one access to another requires a [`Transition`]
/// so that writes become visible to later readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferAccess {
    /// State is not tracked (freshly created or handed over from another system).
    Unknown,
    /// Read by shaders (SRV / vertex fetch).
    ShaderRead,
    /// Written by compute shaders (UAV).
    StorageWrite,
    /// Read and written by compute shaders, including atomics.
    StorageReadWrite,
    /// Source of a copy operation.
    TransferRead,
    /// Destination of a copy or clear operation.
    TransferWrite,
}

impl BufferAccess {
    /// Check if this access mode is a write operation.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::StorageWrite | Self::StorageReadWrite | Self::TransferWrite
        )
    }

    /// Check if this access mode is a read operation.
    pub fn is_read(self) -> bool {
        matches!(
            self,
            Self::ShaderRead | Self::StorageReadWrite | Self::TransferRead
        )
    }
}

/// A state change of one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transition {
    /// The buffer changing state.
    pub buffer: BufferId,
    /// Access before the transition.
    pub before: BufferAccess,
    /// Access after the transition.
    pub after: BufferAccess,
}

impl Transition {
    /// Transition `buffer` from `before` to `after`.
    pub fn new(buffer: &Buffer, before: BufferAccess, after: BufferAccess) -> Self {
        Self {
            buffer: buffer.id(),
            before,
            after,
        }
    }

    /// Transition from an untracked state to `after`.
    pub fn to(buffer: &Buffer, after: BufferAccess) -> Self {
        Self::new(buffer, BufferAccess::Unknown, after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_classification() {
        assert!(BufferAccess::StorageWrite.is_write());
        assert!(!BufferAccess::StorageWrite.is_read());
        assert!(BufferAccess::StorageReadWrite.is_write());
        assert!(BufferAccess::StorageReadWrite.is_read());
        assert!(BufferAccess::ShaderRead.is_read());
        assert!(!BufferAccess::Unknown.is_read());
        assert!(!BufferAccess::Unknown.is_write());
    }
}
