//! Command recording interface.
//!
//! The skin cache never talks to a GPU API directly. It records work through
//! the [`CommandRecorder`] trait:
//! - bind a compute program and dispatch it with bound buffers
//! - transition buffers between access states
//! - clear buffers, copy them to readback memory
//! - signal and wait on fences between pipelines
//!
//! [`CommandList`] is the recording implementation: it stores the commands
//! in order so they can be submitted to a [`GraphicsDevice`] or inspected.
//!
//! [`GraphicsDevice`]: crate::GraphicsDevice

mod access;
mod list;

pub use access::{BufferAccess, Transition};
pub use list::{Command, CommandList};

use crate::program::ProgramId;
use crate::resources::{Buffer, BufferId, Readback};
use crate::sync::PipeFence;

/// GPU timeline a command list executes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Pipeline {
    /// The main graphics queue.
    #[default]
    Graphics,
    /// An independent compute queue that runs concurrently with graphics.
    AsyncCompute,
}

impl Pipeline {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Graphics => "graphics",
            Self::AsyncCompute => "async-compute",
        }
    }
}

/// A buffer bound to a named shader parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferBinding {
    /// Shader parameter name.
    pub name: &'static str,
    /// Bound buffer.
    pub buffer: BufferId,
    /// How the shader accesses it.
    pub access: BufferAccess,
}

/// One compute dispatch with its bindings and constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeDispatch {
    /// Program to run. Must match the currently bound program.
    pub program: ProgramId,
    /// Number of thread groups in X, Y and Z.
    pub groups: [u32; 3],
    /// Bound buffers.
    pub bindings: Vec<BufferBinding>,
    /// Named 32-bit constants.
    pub constants: Vec<(&'static str, u32)>,
}

impl ComputeDispatch {
    /// A one-dimensional dispatch of `groups` thread groups.
    pub fn new(program: ProgramId, groups: u32) -> Self {
        Self {
            program,
            groups: [groups, 1, 1],
            bindings: Vec::new(),
            constants: Vec::new(),
        }
    }

    /// Bind `buffer` to the parameter `name`.
    pub fn bind(mut self, name: &'static str, buffer: &Buffer, access: BufferAccess) -> Self {
        self.bindings.push(BufferBinding {
            name,
            buffer: buffer.id(),
            access,
        });
        self
    }

    /// Set the constant `name`.
    pub fn constant(mut self, name: &'static str, value: u32) -> Self {
        self.constants.push((name, value));
        self
    }

    /// Look up a constant by name.
    pub fn constant_value(&self, name: &str) -> Option<u32> {
        self.constants
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }

    /// Total number of thread groups.
    pub fn group_count(&self) -> u64 {
        self.groups.iter().map(|&g| u64::from(g)).product()
    }
}

/// Records GPU work for one pipeline.
///
/// Implementations may forward to a real command buffer or store the
/// commands (see [`CommandList`]).
pub trait CommandRecorder: Send {
    /// Pipeline this recorder targets.
    fn pipeline(&self) -> Pipeline;

    /// Bind a compute program for subsequent dispatches.
    fn set_program(&mut self, program: ProgramId);

    /// Dispatch the bound program.
    fn dispatch(&mut self, dispatch: ComputeDispatch);

    /// Change the access state of buffers.
    fn transition(&mut self, transitions: &[Transition]);

    /// Fill a buffer with a repeated 32-bit value.
    fn clear_buffer(&mut self, buffer: &Buffer, value: u32);

    /// Copy the first `byte_count` bytes of `buffer` into CPU-visible memory.
    fn copy_to_readback(&mut self, buffer: &Buffer, byte_count: u64) -> Readback;

    /// Signal `fence` once all previously recorded work completes.
    fn signal_fence(&mut self, fence: PipeFence);

    /// Block subsequent work until `fence` is signaled by another pipeline.
    fn wait_fence(&mut self, fence: PipeFence);

    /// Open a named debug region.
    fn push_marker(&mut self, label: &str);

    /// Close the innermost debug region.
    fn pop_marker(&mut self);
}
