//! GPU buffers owned by one cache entry.
//!
//! A [`BufferSet`] holds the skinned outputs of one (instance, LOD):
//! - one or two position buffers (two when previous-frame positions are kept)
//! - the tangent buffer, always present
//! - an intermediate tangent buffer for masked tangent blending
//! - an accumulation buffer for parallel tangent recomputation
//!
//! Its footprint is a pure function of the [`BufferSetLayout`], computed once
//! at admission and held by a [`MemoryCharge`] until the set is dropped.

use std::sync::Arc;

use skincache_graphics::{
    Buffer, BufferAccess, BufferDescriptor, BufferId, BufferUsage, DeviceCapabilities,
    GraphicsDevice, GraphicsError, PixelFormat, Transition,
};

use crate::budget::MemoryCharge;
use crate::revision::PositionSlot;

/// Bytes per position component.
pub const POSITION_STRIDE: u32 = 4;
/// Position components per vertex.
pub const POSITION_COMPONENTS: u32 = 3;
/// Tangent-frame vectors per vertex (tangent X and tangent Z).
pub const TANGENTS_PER_VERTEX: u32 = 2;
/// 32-bit accumulators per vertex: normal xyz, tangent xyz, orientation, pad.
pub const ACCUMULATOR_INTS_PER_VERTEX: u32 = 8;

/// Picks the format skinned tangents are written in.
///
/// Devices that cannot write 16-bit SNORM from compute get the packed SINT
/// fallback. Otherwise the output matches the width of the target vertex
/// factory's tangents.
pub fn select_tangent_format(capabilities: &DeviceCapabilities, target: PixelFormat) -> PixelFormat {
    if !capabilities.snorm16_storage_writes {
        PixelFormat::Rgba16Sint
    } else if target.block_bytes() == 4 {
        PixelFormat::Rgba8Snorm
    } else {
        PixelFormat::Rgba16Snorm
    }
}

/// Shape of a buffer set. Determines its footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferSetLayout {
    /// Vertices across the LOD.
    pub num_vertices: u32,
    /// Keep previous-frame positions in a second buffer.
    pub previous_positions: bool,
    /// Allocate the intermediate tangent buffer.
    pub intermediate_tangents: bool,
    /// Vertices covered by the accumulation buffer. Zero for none.
    pub accumulated_vertices: u32,
    /// Format of the tangent buffers.
    pub tangent_format: PixelFormat,
}

impl BufferSetLayout {
    /// Number of position buffers (1 or 2).
    pub fn position_buffer_count(&self) -> u32 {
        if self.previous_positions { 2 } else { 1 }
    }

    /// Bytes of one position buffer.
    pub fn position_buffer_bytes(&self) -> u64 {
        u64::from(POSITION_STRIDE) * u64::from(self.num_vertices) * u64::from(POSITION_COMPONENTS)
    }

    /// Bytes of one tangent buffer.
    pub fn tangent_buffer_bytes(&self) -> u64 {
        u64::from(self.tangent_format.block_bytes())
            * u64::from(self.num_vertices)
            * u64::from(TANGENTS_PER_VERTEX)
    }

    /// Bytes of the accumulation buffer.
    pub fn accumulation_buffer_bytes(&self) -> u64 {
        u64::from(self.accumulated_vertices) * u64::from(ACCUMULATOR_INTS_PER_VERTEX) * 4
    }

    /// Total bytes of every buffer in the set.
    pub fn footprint_bytes(&self) -> u64 {
        let positions = self.position_buffer_bytes() * u64::from(self.position_buffer_count());
        let tangents = self.tangent_buffer_bytes();
        let intermediate = if self.intermediate_tangents {
            self.tangent_buffer_bytes()
        } else {
            0
        };
        positions + tangents + intermediate + self.accumulation_buffer_bytes()
    }
}

/// Names a buffer inside a [`BufferSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferRole {
    /// A position buffer.
    Position(PositionSlot),
    /// The final tangent buffer.
    Tangents,
    /// The intermediate tangent buffer.
    IntermediateTangents,
    /// The accumulation buffer.
    AccumulatedTangents,
}

/// A GPU buffer plus the access state the cache last left it in.
#[derive(Debug)]
pub struct TrackedBuffer {
    buffer: Arc<Buffer>,
    access: BufferAccess,
    last_transition_fence: u64,
}

impl TrackedBuffer {
    /// Wrap a freshly created buffer.
    pub fn new(buffer: Arc<Buffer>) -> Self {
        Self {
            buffer,
            access: BufferAccess::Unknown,
            last_transition_fence: 0,
        }
    }

    /// The buffer.
    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    /// Buffer id.
    pub fn id(&self) -> BufferId {
        self.buffer.id()
    }

    /// Last recorded access.
    pub fn access(&self) -> BufferAccess {
        self.access
    }

    /// Records a move to `after` and returns the transition.
    pub fn transition_to(&mut self, after: BufferAccess) -> Transition {
        let before = std::mem::replace(&mut self.access, after);
        Transition::new(&self.buffer, before, after)
    }

    /// Stamps the buffer with `fence`. Returns false if it already carried it.
    pub fn update_fence(&mut self, fence: u64) -> bool {
        let changed = self.last_transition_fence != fence;
        self.last_transition_fence = fence;
        changed
    }
}

/// The buffers of one cache entry.
#[derive(Debug)]
pub struct BufferSet {
    layout: BufferSetLayout,
    positions: Vec<TrackedBuffer>,
    tangents: TrackedBuffer,
    intermediate_tangents: Option<TrackedBuffer>,
    accumulated_tangents: Option<TrackedBuffer>,
    charge: MemoryCharge,
}

impl BufferSet {
    /// Create every buffer `layout` asks for.
    ///
    /// # Errors
    ///
    /// Fails if the device cannot create any of the buffers. Buffers created
    /// before the failure are dropped and `charge` is returned to the budget.
    pub fn create(
        device: &Arc<GraphicsDevice>,
        layout: BufferSetLayout,
        charge: MemoryCharge,
        owner: &str,
        extra_usage: BufferUsage,
    ) -> Result<Self, GraphicsError> {
        debug_assert_eq!(charge.bytes(), layout.footprint_bytes());
        let output_usage = BufferUsage::STORAGE
            | BufferUsage::SHADER_READ
            | BufferUsage::VERTEX
            | BufferUsage::COPY_SRC
            | extra_usage;
        let position_elements = u64::from(layout.num_vertices) * u64::from(POSITION_COMPONENTS);
        let tangent_elements = u64::from(layout.num_vertices) * u64::from(TANGENTS_PER_VERTEX);

        let mut positions = Vec::with_capacity(layout.position_buffer_count() as usize);
        for index in 0..layout.position_buffer_count() {
            let desc = BufferDescriptor::typed(PixelFormat::R32Float, position_elements, output_usage)
                .with_label(format!("SkinCachePositions{index} {owner}"));
            positions.push(TrackedBuffer::new(device.create_buffer(&desc)?));
        }

        let tangent_desc =
            BufferDescriptor::typed(layout.tangent_format, tangent_elements, output_usage)
                .with_label(format!("SkinCacheTangents {owner}"));
        let tangents = TrackedBuffer::new(device.create_buffer(&tangent_desc)?);

        let intermediate_tangents = if layout.intermediate_tangents {
            let desc = BufferDescriptor::typed(
                layout.tangent_format,
                tangent_elements,
                BufferUsage::STORAGE | BufferUsage::SHADER_READ,
            )
            .with_label(format!("SkinCacheIntermediateTangents {owner}"));
            Some(TrackedBuffer::new(device.create_buffer(&desc)?))
        } else {
            None
        };

        let accumulated_tangents = if layout.accumulated_vertices > 0 {
            let desc = BufferDescriptor::typed(
                PixelFormat::R32Sint,
                u64::from(layout.accumulated_vertices) * u64::from(ACCUMULATOR_INTS_PER_VERTEX),
                BufferUsage::STORAGE | BufferUsage::COPY_DST,
            )
            .with_label(format!("SkinCacheIntermediateAccumulatedTangents {owner}"));
            Some(TrackedBuffer::new(device.create_buffer(&desc)?))
        } else {
            None
        };

        log::trace!(
            "BufferSet: created for '{}' ({} vertices, {} bytes)",
            owner,
            layout.num_vertices,
            layout.footprint_bytes()
        );

        Ok(Self {
            layout,
            positions,
            tangents,
            intermediate_tangents,
            accumulated_tangents,
            charge,
        })
    }

    /// Layout the set was created with.
    pub fn layout(&self) -> &BufferSetLayout {
        &self.layout
    }

    /// Bytes charged to the budget for this set.
    pub fn footprint_bytes(&self) -> u64 {
        self.charge.bytes()
    }

    /// Returns true if previous-frame positions have their own buffer.
    pub fn has_previous_buffer(&self) -> bool {
        self.positions.len() > 1
    }

    /// Position buffer of `slot`. `None` for slot 1 of single-buffered sets.
    pub fn position(&self, slot: PositionSlot) -> Option<&TrackedBuffer> {
        self.positions.get(slot.index())
    }

    /// Tangent buffer.
    pub fn tangents(&self) -> &TrackedBuffer {
        &self.tangents
    }

    /// Intermediate tangent buffer, if allocated.
    pub fn intermediate_tangents(&self) -> Option<&TrackedBuffer> {
        self.intermediate_tangents.as_ref()
    }

    /// Accumulation buffer, if allocated.
    pub fn accumulated_tangents(&self) -> Option<&TrackedBuffer> {
        self.accumulated_tangents.as_ref()
    }

    /// Buffer playing `role`, if present.
    pub fn get(&self, role: BufferRole) -> Option<&TrackedBuffer> {
        match role {
            BufferRole::Position(slot) => self.position(slot),
            BufferRole::Tangents => Some(&self.tangents),
            BufferRole::IntermediateTangents => self.intermediate_tangents.as_ref(),
            BufferRole::AccumulatedTangents => self.accumulated_tangents.as_ref(),
        }
    }

    /// Mutable buffer playing `role`, if present.
    pub fn get_mut(&mut self, role: BufferRole) -> Option<&mut TrackedBuffer> {
        match role {
            BufferRole::Position(slot) => self.positions.get_mut(slot.index()),
            BufferRole::Tangents => Some(&mut self.tangents),
            BufferRole::IntermediateTangents => self.intermediate_tangents.as_mut(),
            BufferRole::AccumulatedTangents => self.accumulated_tangents.as_mut(),
        }
    }

    /// Ids of every buffer in the set.
    pub fn buffer_ids(&self) -> Vec<BufferId> {
        self.positions
            .iter()
            .chain(std::iter::once(&self.tangents))
            .chain(self.intermediate_tangents.iter())
            .chain(self.accumulated_tangents.iter())
            .map(TrackedBuffer::id)
            .collect()
    }
}
