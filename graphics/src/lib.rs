//! # Skin Cache Graphics
//!
//! GPU-facing layer used by the skin cache.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`GraphicsDevice`] - buffer creation, resource tracking and submission
//! - [`CommandRecorder`] - the interface compute work is recorded through
//! - [`CommandList`] - a recorder that stores commands for submission or inspection
//! - [`ProgramLibrary`] - which compute program permutations are ready to bind
//! - [`Fence`] / [`PipeFence`] - CPU-GPU and cross-pipe synchronization
//! - [`Readback`] - asynchronous GPU→CPU buffer copies
//!
//! ## Example
//!
//! ```
//! use skincache_graphics::{
//!     BufferAccess, BufferDescriptor, BufferUsage, CommandList, CommandRecorder,
//!     ComputeDispatch, GraphicsDevice, Pipeline, ProgramId,
//! };
//!
//! let device = GraphicsDevice::new("example", Default::default());
//! let out = device.create_buffer(&BufferDescriptor::new(1024, BufferUsage::STORAGE)).unwrap();
//!
//! let program = ProgramId::new("skin", 0);
//! let mut list = CommandList::new(Pipeline::Graphics);
//! list.set_program(program);
//! list.dispatch(ComputeDispatch::new(program, 4).bind("Out", &out, BufferAccess::StorageWrite));
//! device.submit(list);
//! ```

pub mod command;
pub mod device;
pub mod error;
pub mod program;
pub mod resources;
pub mod sync;
pub mod types;

// Re-export main types for convenience
pub use command::{
    BufferAccess, BufferBinding, Command, CommandList, CommandRecorder, ComputeDispatch,
    Pipeline, Transition,
};
pub use device::{DeviceCapabilities, GraphicsDevice};
pub use error::GraphicsError;
pub use program::{ProgramId, ProgramLibrary};
pub use resources::{Buffer, BufferId, Readback};
pub use sync::{Fence, FenceStatus, PipeFence};
pub use types::{BufferDescriptor, BufferUsage, PixelFormat};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics layer.
pub fn init() {
    log::info!("Skin cache graphics v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_empty_command_list() {
        let list = CommandList::new(Pipeline::Graphics);
        assert!(list.is_empty());
        assert_eq!(list.pipeline(), Pipeline::Graphics);
    }
}
