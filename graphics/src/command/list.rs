//! Recording command list.

use std::collections::BTreeSet;

use super::{CommandRecorder, ComputeDispatch, Pipeline, Transition};
use crate::program::ProgramId;
use crate::resources::{Buffer, BufferId, Readback};
use crate::sync::PipeFence;

/// A recorded command.
#[derive(Debug, Clone)]
pub enum Command {
    /// Program bind.
    SetProgram(ProgramId),
    /// Compute dispatch.
    Dispatch(ComputeDispatch),
    /// Batched buffer state changes.
    Transition(Vec<Transition>),
    /// Buffer fill.
    Clear {
        /// Cleared buffer.
        buffer: BufferId,
        /// Fill value.
        value: u32,
    },
    /// GPU→CPU copy.
    CopyToReadback(Readback),
    /// Cross-pipe signal.
    SignalFence(PipeFence),
    /// Cross-pipe wait.
    WaitFence(PipeFence),
    /// Debug region start.
    PushMarker(String),
    /// Debug region end.
    PopMarker,
}

/// A command list that stores everything recorded into it.
///
/// # Example
///
/// ```
/// use skincache_graphics::{CommandList, CommandRecorder, Pipeline, ProgramId};
///
/// let mut list = CommandList::new(Pipeline::AsyncCompute);
/// list.set_program(ProgramId::new("skin", 0));
/// assert_eq!(list.len(), 1);
/// assert_eq!(list.program_switches(), 1);
/// ```
#[derive(Debug, Default)]
pub struct CommandList {
    pipeline: Pipeline,
    commands: Vec<Command>,
    bound_program: Option<ProgramId>,
    marker_depth: u32,
}

impl CommandList {
    /// Create an empty list for `pipeline`.
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            commands: Vec::new(),
            bound_program: None,
            marker_depth: 0,
        }
    }

    /// Recorded commands in order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of recorded commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Recorded dispatches in order.
    pub fn dispatches(&self) -> impl Iterator<Item = &ComputeDispatch> {
        self.commands.iter().filter_map(|c| match c {
            Command::Dispatch(d) => Some(d),
            _ => None,
        })
    }

    /// Number of program binds.
    pub fn program_switches(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::SetProgram(_)))
            .count()
    }

    /// Every buffer referenced by a dispatch, transition, clear or copy.
    pub fn referenced_buffers(&self) -> BTreeSet<BufferId> {
        let mut buffers = BTreeSet::new();
        for command in &self.commands {
            match command {
                Command::Dispatch(d) => buffers.extend(d.bindings.iter().map(|b| b.buffer)),
                Command::Transition(t) => buffers.extend(t.iter().map(|t| t.buffer)),
                Command::Clear { buffer, .. } => {
                    buffers.insert(*buffer);
                }
                Command::CopyToReadback(r) => {
                    buffers.insert(r.source());
                }
                Command::SetProgram(_)
                | Command::SignalFence(_)
                | Command::WaitFence(_)
                | Command::PushMarker(_)
                | Command::PopMarker => {}
            }
        }
        buffers
    }

    /// Fences signaled on this list.
    pub fn signaled_fences(&self) -> Vec<PipeFence> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::SignalFence(f) => Some(*f),
                _ => None,
            })
            .collect()
    }

    /// Fences waited on by this list.
    pub fn waited_fences(&self) -> Vec<PipeFence> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::WaitFence(f) => Some(*f),
                _ => None,
            })
            .collect()
    }

    /// Append every command of `other`, which must target the same pipeline.
    pub fn append(&mut self, mut other: CommandList) {
        assert_eq!(
            self.pipeline, other.pipeline,
            "cannot append a command list recorded for another pipeline"
        );
        self.commands.append(&mut other.commands);
        self.bound_program = other.bound_program.or(self.bound_program);
    }
}

impl CommandRecorder for CommandList {
    fn pipeline(&self) -> Pipeline {
        self.pipeline
    }

    fn set_program(&mut self, program: ProgramId) {
        self.bound_program = Some(program);
        self.commands.push(Command::SetProgram(program));
    }

    fn dispatch(&mut self, dispatch: ComputeDispatch) {
        assert_eq!(
            self.bound_program,
            Some(dispatch.program),
            "dispatch recorded without binding its program first"
        );
        log::trace!(
            "CommandList[{}]: dispatch {} x{}",
            self.pipeline.name(),
            dispatch.program,
            dispatch.group_count()
        );
        self.commands.push(Command::Dispatch(dispatch));
    }

    fn transition(&mut self, transitions: &[Transition]) {
        if !transitions.is_empty() {
            self.commands.push(Command::Transition(transitions.to_vec()));
        }
    }

    fn clear_buffer(&mut self, buffer: &Buffer, value: u32) {
        self.commands.push(Command::Clear {
            buffer: buffer.id(),
            value,
        });
    }

    fn copy_to_readback(&mut self, buffer: &Buffer, byte_count: u64) -> Readback {
        let readback = Readback::new(buffer.id(), byte_count.min(buffer.size()));
        self.commands.push(Command::CopyToReadback(readback.clone()));
        readback
    }

    fn signal_fence(&mut self, fence: PipeFence) {
        self.commands.push(Command::SignalFence(fence));
    }

    fn wait_fence(&mut self, fence: PipeFence) {
        self.commands.push(Command::WaitFence(fence));
    }

    fn push_marker(&mut self, label: &str) {
        self.marker_depth += 1;
        self.commands.push(Command::PushMarker(label.to_string()));
    }

    fn pop_marker(&mut self) {
        assert!(self.marker_depth > 0, "pop_marker without matching push_marker");
        self.marker_depth -= 1;
        self.commands.push(Command::PopMarker);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::BufferAccess;
    use crate::device::GraphicsDevice;
    use crate::types::{BufferDescriptor, BufferUsage};

    #[test]
    #[should_panic(expected = "dispatch recorded without binding its program first")]
    fn test_dispatch_requires_bound_program() {
        let mut list = CommandList::new(Pipeline::Graphics);
        list.dispatch(ComputeDispatch::new(ProgramId::new("skin", 0), 1));
    }

    #[test]
    fn test_referenced_buffers() {
        let device = GraphicsDevice::new("test", Default::default());
        let a = device
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::STORAGE))
            .unwrap();
        let b = device
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::STORAGE))
            .unwrap();

        let program = ProgramId::new("skin", 1);
        let mut list = CommandList::new(Pipeline::Graphics);
        list.set_program(program);
        list.dispatch(ComputeDispatch::new(program, 1).bind("Out", &a, BufferAccess::StorageWrite));
        list.transition(&[Transition::to(&b, BufferAccess::ShaderRead)]);
        list.transition(&[]);

        let referenced = list.referenced_buffers();
        assert!(referenced.contains(&a.id()));
        assert!(referenced.contains(&b.id()));
        assert_eq!(list.len(), 3);
        assert_eq!(list.dispatches().count(), 1);
    }

    #[test]
    fn test_fences_and_markers() {
        let fence = PipeFence::new();
        let mut list = CommandList::new(Pipeline::AsyncCompute);
        list.push_marker("SkinCache");
        list.signal_fence(fence);
        list.pop_marker();
        assert_eq!(list.signaled_fences(), vec![fence]);
        assert!(list.waited_fences().is_empty());
    }

    #[test]
    #[should_panic(expected = "cannot append a command list recorded for another pipeline")]
    fn test_append_rejects_other_pipeline() {
        let mut graphics = CommandList::new(Pipeline::Graphics);
        graphics.append(CommandList::new(Pipeline::AsyncCompute));
    }
}
