//! Revision tracking for double-buffered skinned positions.
//!
//! Each section owns a [`RevisionTracker`] with one tag per position slot.
//! A tag records which bone buffer and revision the slot's contents were
//! skinned from, so a later frame asking for the same pair can reuse the slot
//! instead of dispatching again.

use crate::mesh::BoneBufferHandle;

/// One of the two position buffers of a double-buffered entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PositionSlot {
    /// Slot 0. Also the only slot of single-buffered entries.
    First,
    /// Slot 1.
    Second,
}

impl PositionSlot {
    /// Both slots in index order.
    pub const ALL: [PositionSlot; 2] = [PositionSlot::First, PositionSlot::Second];

    /// Slot index (0 or 1).
    pub fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }

    /// The other slot.
    pub fn other(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }
}

/// How slots are retagged when the producer recreates its bone buffers.
///
/// Recreating render state hands out new bone-buffer handles while revision
/// numbers keep counting, so without a retag the previous-frame slot would
/// miss and be skinned again from the new buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RetagPolicy {
    /// Never retag. Recreation always costs one extra skinning pass.
    Never,
    /// Retag a slot whose revision matches the previous revision, but only if
    /// the slot's contents were actually recorded for the GPU.
    #[default]
    WrittenSlotsOnly,
}

/// Whether a tagged slot holds recorded data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SlotState {
    #[default]
    Empty,
    /// Chosen for writing this frame, dispatch not yet recorded.
    Pending,
    /// Dispatch recorded.
    Written,
}

#[derive(Debug, Clone, Copy, Default)]
struct Tag {
    bone_buffer: Option<BoneBufferHandle>,
    revision: u32,
    state: SlotState,
}

impl Tag {
    fn matches(&self, bone_buffer: BoneBufferHandle, revision: u32) -> bool {
        self.state != SlotState::Empty
            && self.bone_buffer == Some(bone_buffer)
            && self.revision == revision
    }
}

/// Two-slot map from (bone buffer, revision) to a position slot.
#[derive(Debug, Clone, Default)]
pub struct RevisionTracker {
    tags: [Tag; 2],
}

impl RevisionTracker {
    /// Create a tracker with both slots untagged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot holding positions skinned from `bone_buffer` at `revision`.
    pub fn find(&self, bone_buffer: BoneBufferHandle, revision: u32) -> Option<PositionSlot> {
        PositionSlot::ALL
            .into_iter()
            .find(|slot| self.tags[slot.index()].matches(bone_buffer, revision))
    }

    /// Tags a slot other than `exclude` for writing and returns it.
    ///
    /// Picks slot 0 unless slot 0 is excluded. Never fails.
    pub fn allocate_unused(
        &mut self,
        bone_buffer: BoneBufferHandle,
        revision: u32,
        exclude: Option<PositionSlot>,
    ) -> PositionSlot {
        let slot = match exclude {
            Some(PositionSlot::First) => PositionSlot::Second,
            _ => PositionSlot::First,
        };
        self.tags[slot.index()] = Tag {
            bone_buffer: Some(bone_buffer),
            revision,
            state: SlotState::Pending,
        };
        slot
    }

    /// Retags the slot skinned at `previous_revision` to `previous_bone_buffer`.
    ///
    /// Returns the retagged slot, if any.
    pub fn update_previous_tag(
        &mut self,
        policy: RetagPolicy,
        previous_bone_buffer: BoneBufferHandle,
        previous_revision: u32,
    ) -> Option<PositionSlot> {
        if policy == RetagPolicy::Never {
            return None;
        }
        let slot = PositionSlot::ALL.into_iter().find(|slot| {
            let tag = &self.tags[slot.index()];
            tag.state == SlotState::Written && tag.revision == previous_revision
        })?;
        self.tags[slot.index()].bone_buffer = Some(previous_bone_buffer);
        Some(slot)
    }

    /// Marks every pending slot as recorded.
    pub fn commit_pending(&mut self) {
        for tag in &mut self.tags {
            if tag.state == SlotState::Pending {
                tag.state = SlotState::Written;
            }
        }
    }

    /// Drops tags whose write was never recorded, so they cannot produce hits.
    pub fn discard_pending(&mut self) {
        for tag in &mut self.tags {
            if tag.state == SlotState::Pending {
                *tag = Tag::default();
            }
        }
    }

    /// Clears both tags.
    pub fn reset(&mut self) {
        self.tags = [Tag::default(); 2];
    }

    /// Revision tagged on `slot`, if the slot is tagged.
    pub fn revision(&self, slot: PositionSlot) -> Option<u32> {
        let tag = &self.tags[slot.index()];
        (tag.state != SlotState::Empty).then_some(tag.revision)
    }
}
