//! CPU readback of skinned output.
//!
//! Requests are recorded as copies on the next dispatched frame and polled
//! once per frame afterwards. Polling never blocks. A request keeps its
//! source buffer alive, so releasing the owner does not cancel it.

use std::sync::Arc;

use skincache_core::math::Vec3;
use skincache_graphics::{Buffer, BufferAccess, CommandRecorder, PixelFormat, Readback, Transition};

use crate::buffer_set::{POSITION_COMPONENTS, POSITION_STRIDE, TANGENTS_PER_VERTEX};
use crate::entry::{EntryHandle, OwnerId};
use crate::tangents::reference::{TangentFrame, decode_tangent_frames};

/// Which output of a section to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadbackKind {
    /// This frame's positions.
    Positions,
    /// Final tangents.
    Tangents,
}

/// Copied section output handed to a readback callback.
#[derive(Debug, Clone)]
pub struct ReadbackData {
    /// Owner that requested the copy.
    pub owner: OwnerId,
    /// Entry the data came from. May have been released since.
    pub entry: EntryHandle,
    /// Section index.
    pub section: u32,
    /// What was copied.
    pub kind: ReadbackKind,
    /// Element format of the source buffer.
    pub format: Option<PixelFormat>,
    /// Raw bytes covering exactly the section's vertices.
    pub bytes: Vec<u8>,
}

impl ReadbackData {
    /// Decodes the bytes as positions. Empty for tangent readbacks.
    pub fn positions(&self) -> Vec<Vec3> {
        if self.kind != ReadbackKind::Positions {
            return Vec::new();
        }
        self.bytes
            .chunks_exact((POSITION_STRIDE * POSITION_COMPONENTS) as usize)
            .map(|chunk| {
                let xyz: [f32; 3] = bytemuck::pod_read_unaligned(chunk);
                Vec3::new(xyz[0], xyz[1], xyz[2])
            })
            .collect()
    }

    /// Decodes the bytes as tangent frames. Empty for position readbacks.
    pub fn tangent_frames(&self) -> Vec<TangentFrame> {
        match (self.kind, self.format) {
            (ReadbackKind::Tangents, Some(format)) => decode_tangent_frames(&self.bytes, format),
            _ => Vec::new(),
        }
    }
}

/// Receives the copied data once the GPU copy retires.
pub type ReadbackCallback = Box<dyn FnOnce(ReadbackData) + Send>;

struct Request {
    owner: OwnerId,
    entry: EntryHandle,
    section: u32,
    kind: ReadbackKind,
    source: Arc<Buffer>,
    byte_offset: u64,
    byte_count: u64,
    callback: ReadbackCallback,
}

struct InFlight {
    request: Request,
    readback: Readback,
}

/// Readback requests waiting to be recorded or to complete.
#[derive(Default)]
pub(crate) struct ReadbackQueue {
    requested: Vec<Request>,
    in_flight: Vec<InFlight>,
}

impl ReadbackQueue {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn request(
        &mut self,
        owner: OwnerId,
        entry: EntryHandle,
        section: u32,
        kind: ReadbackKind,
        source: Arc<Buffer>,
        first_vertex: u32,
        num_vertices: u32,
        callback: ReadbackCallback,
    ) {
        let vertex_bytes = match kind {
            ReadbackKind::Positions => u64::from(POSITION_STRIDE * POSITION_COMPONENTS),
            ReadbackKind::Tangents => {
                let texel = source.format().map_or(0, |f| u64::from(f.block_bytes()));
                texel * u64::from(TANGENTS_PER_VERTEX)
            }
        };
        self.requested.push(Request {
            owner,
            entry,
            section,
            kind,
            source,
            byte_offset: vertex_bytes * u64::from(first_vertex),
            byte_count: vertex_bytes * u64::from(num_vertices),
            callback,
        });
    }

    /// Records a copy for every pending request.
    ///
    /// Sources are expected in [`BufferAccess::ShaderRead`] and are returned
    /// to it after the copy.
    pub(crate) fn record(&mut self, recorder: &mut dyn CommandRecorder) {
        if self.requested.is_empty() {
            return;
        }
        let to_copy: Vec<Transition> = self
            .requested
            .iter()
            .map(|r| Transition::new(&r.source, BufferAccess::ShaderRead, BufferAccess::TransferRead))
            .collect();
        recorder.transition(&to_copy);

        for request in self.requested.drain(..) {
            let readback = recorder
                .copy_to_readback(&request.source, request.byte_offset + request.byte_count);
            log::trace!(
                "ReadbackQueue: recorded {:?} copy for {} section {}",
                request.kind,
                request.owner,
                request.section
            );
            self.in_flight.push(InFlight { request, readback });
        }

        let back: Vec<Transition> = to_copy
            .iter()
            .map(|t| Transition {
                buffer: t.buffer,
                before: BufferAccess::TransferRead,
                after: BufferAccess::ShaderRead,
            })
            .collect();
        recorder.transition(&back);
    }

    /// Fires callbacks of completed copies. Returns how many fired.
    pub(crate) fn poll(&mut self) -> usize {
        let mut completed = Vec::new();
        let mut index = 0;
        while index < self.in_flight.len() {
            if self.in_flight[index].readback.is_ready() {
                completed.push(self.in_flight.remove(index));
            } else {
                index += 1;
            }
        }

        let fired = completed.len();
        for InFlight { request, readback } in completed {
            let mut bytes = readback.take_data().unwrap_or_default();
            let start = (request.byte_offset as usize).min(bytes.len());
            bytes.drain(..start);
            bytes.truncate(request.byte_count as usize);
            (request.callback)(ReadbackData {
                owner: request.owner,
                entry: request.entry,
                section: request.section,
                kind: request.kind,
                format: request.source.format(),
                bytes,
            });
        }
        fired
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.requested.len() + self.in_flight.len()
    }
}

impl std::fmt::Debug for ReadbackQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadbackQueue")
            .field("requested", &self.requested.len())
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}
