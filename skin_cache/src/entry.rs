//! Cache entries: the skinned output of one (owner, LOD).

use std::fmt;

use skincache_core::Handle;
use skincache_graphics::ProgramId;

use crate::buffer_set::BufferSet;
use crate::mesh::{
    ClothInput, InfluenceType, MeshLod, MorphInput, SectionDesc, SkinType, SkinningSource,
    SourceFactoryHandle,
};
use crate::revision::{PositionSlot, RevisionTracker};

/// Handle to a live [`CacheEntry`].
pub type EntryHandle = Handle<CacheEntry>;

/// Identity of the mesh instance that owns an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(pub u64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

/// What the skinned output feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EntryMode {
    /// Rasterization. Keeps previous-frame positions for motion vectors.
    #[default]
    Raster,
    /// Ray-tracing geometry. Single position buffer, tangents never recomputed.
    RayTracing,
}

/// Lifecycle of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryState {
    /// Buffers created, no section queued yet.
    Uninitialized,
    /// Admitted and in use.
    Active,
    /// Flushed or superseded. Rebuilt on the next request.
    Invalidated,
    /// Removed from the cache. Handles to it no longer resolve.
    Released,
}

/// Which position buffers a section writes this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PositionWrites {
    /// Both slots already hold the requested revisions.
    #[default]
    None,
    /// Skin this frame's bones.
    Current,
    /// Skin last frame's bones.
    Previous,
    /// Skin both.
    Both,
}

impl PositionWrites {
    /// Returns true if the current slot is written.
    pub fn writes_current(self) -> bool {
        matches!(self, Self::Current | Self::Both)
    }

    /// Returns true if the previous slot is written.
    pub fn writes_previous(self) -> bool {
        matches!(self, Self::Previous | Self::Both)
    }

    /// Adds a current-slot write.
    pub fn with_current(self) -> Self {
        match self {
            Self::None | Self::Current => Self::Current,
            Self::Previous | Self::Both => Self::Both,
        }
    }

    /// Adds a previous-slot write.
    pub fn with_previous(self) -> Self {
        match self {
            Self::None | Self::Previous => Self::Previous,
            Self::Current | Self::Both => Self::Both,
        }
    }
}

/// Work one section needs this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DispatchPlan {
    /// Skinning writes.
    pub positions: PositionWrites,
    /// Rebuild tangents from the freshly skinned positions.
    pub recompute_tangents: bool,
}

impl DispatchPlan {
    /// Returns true if nothing has to be recorded.
    pub fn is_empty(&self) -> bool {
        self.positions == PositionWrites::None && !self.recompute_tangents
    }
}

/// Why an entry's work was skipped for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// A program the entry needs is still compiling.
    ProgramNotReady(ProgramId),
}

/// Reported to an entry's fallback callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackEvent {
    /// The entry.
    pub entry: EntryHandle,
    /// Its owner.
    pub owner: OwnerId,
    /// What went wrong.
    pub reason: FallbackReason,
}

/// Called when an entry's work is aborted, so the owner can render unskinned
/// or from last frame's output.
pub type FallbackFn = Box<dyn FnMut(FallbackEvent) + Send>;

/// Per-section state of an entry.
#[derive(Debug, Clone)]
pub struct SectionState {
    pub(crate) desc: SectionDesc,
    pub(crate) setup_factory: Option<SourceFactoryHandle>,
    pub(crate) source: Option<SkinningSource>,
    pub(crate) skin_type: SkinType,
    pub(crate) influence: InfluenceType,
    pub(crate) morph: Option<MorphInput>,
    pub(crate) cloth: Option<ClothInput>,
    pub(crate) tracker: RevisionTracker,
    pub(crate) queued_revision: Option<u32>,
    pub(crate) recompute_tangents: bool,
    pub(crate) accumulation_offset: Option<u32>,
    pub(crate) current_slot: PositionSlot,
    pub(crate) previous_slot: PositionSlot,
    pub(crate) plan: DispatchPlan,
}

impl SectionState {
    pub(crate) fn new(desc: SectionDesc, recompute_tangents: bool) -> Self {
        let influence = widest_influence(&desc);
        Self {
            desc,
            setup_factory: None,
            source: None,
            skin_type: SkinType::Normal,
            influence,
            morph: None,
            cloth: None,
            tracker: RevisionTracker::new(),
            queued_revision: None,
            recompute_tangents,
            accumulation_offset: None,
            current_slot: PositionSlot::First,
            previous_slot: PositionSlot::First,
            plan: DispatchPlan::default(),
        }
    }

    /// Section layout.
    pub fn desc(&self) -> &SectionDesc {
        &self.desc
    }

    /// Highest bone revision queued for the next dispatch.
    pub fn queued_revision(&self) -> Option<u32> {
        self.queued_revision
    }

    /// Skinning source of the latest request.
    pub fn source(&self) -> Option<&SkinningSource> {
        self.source.as_ref()
    }

    /// Skin type of the latest request.
    pub fn skin_type(&self) -> SkinType {
        self.skin_type
    }

    /// Widest influence mode across the section's weight streams.
    pub fn influence(&self) -> InfluenceType {
        self.influence
    }

    /// Returns true if tangents are rebuilt after skinning.
    pub fn recomputes_tangents(&self) -> bool {
        self.recompute_tangents
    }

    /// Slot holding this frame's positions.
    pub fn current_slot(&self) -> PositionSlot {
        self.current_slot
    }

    /// Slot holding last frame's positions.
    pub fn previous_slot(&self) -> PositionSlot {
        self.previous_slot
    }

    /// Plan from the most recent frame setup.
    pub fn plan(&self) -> DispatchPlan {
        self.plan
    }

    /// Re-derives the influence mode from the current streams.
    pub(crate) fn refresh_influence(&mut self) {
        self.influence = widest_influence(&self.desc);
    }
}

fn widest_influence(desc: &SectionDesc) -> InfluenceType {
    desc.streams
        .iter()
        .map(|stream| stream.weights.influence_type())
        .max()
        .unwrap_or_default()
}

/// GPU output and dispatch state of one (owner, LOD).
pub struct CacheEntry {
    pub(crate) owner: OwnerId,
    pub(crate) lod: u32,
    pub(crate) mode: EntryMode,
    pub(crate) state: EntryState,
    pub(crate) buffers: BufferSet,
    pub(crate) sections: Vec<SectionState>,
    pub(crate) full_precision_uvs: bool,
    pub(crate) queued: bool,
    pub(crate) fallback: Option<FallbackFn>,
}

impl CacheEntry {
    pub(crate) fn new(
        owner: OwnerId,
        lod: &MeshLod,
        mode: EntryMode,
        buffers: BufferSet,
        sections: Vec<SectionState>,
    ) -> Self {
        Self {
            owner,
            lod: lod.lod,
            mode,
            state: EntryState::Uninitialized,
            buffers,
            sections,
            full_precision_uvs: lod.full_precision_uvs,
            queued: false,
            fallback: None,
        }
    }

    /// Owner of the entry.
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// LOD the buffers were sized for.
    pub fn lod(&self) -> u32 {
        self.lod
    }

    /// Raster or ray tracing.
    pub fn mode(&self) -> EntryMode {
        self.mode
    }

    /// Lifecycle state.
    pub fn state(&self) -> EntryState {
        self.state
    }

    /// The entry's GPU buffers.
    pub fn buffers(&self) -> &BufferSet {
        &self.buffers
    }

    /// Per-section state.
    pub fn sections(&self) -> &[SectionState] {
        &self.sections
    }

    /// Returns true if any section is waiting for the next dispatch.
    pub fn is_queued(&self) -> bool {
        self.queued
    }

    /// Returns true if the entry can serve a request from `owner` for `lod`.
    pub(crate) fn is_valid_for(&self, owner: OwnerId, lod: u32, mode: EntryMode) -> bool {
        self.owner == owner
            && self.lod == lod
            && self.mode == mode
            && self.state != EntryState::Invalidated
    }

    pub(crate) fn report_fallback(&mut self, event: FallbackEvent) {
        if let Some(fallback) = self.fallback.as_mut() {
            fallback(event);
        }
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("owner", &self.owner)
            .field("lod", &self.lod)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("sections", &self.sections.len())
            .field("footprint_bytes", &self.buffers.footprint_bytes())
            .field("queued", &self.queued)
            .finish()
    }
}
