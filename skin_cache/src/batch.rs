//! The per-frame dispatch batch and its program-variant sort.

use skincache_core::pool::Pooled;

use crate::entry::EntryHandle;
use crate::mesh::{SkinStream, SkinType};
use crate::variant::SkinningVariant;

/// One queued section update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchItem {
    /// Entry owning the section.
    pub entry: EntryHandle,
    /// Section index within the entry's LOD.
    pub section: u32,
}

/// Section updates queued for the next dispatch, in submission order.
///
/// The backing storage is parked between frames so its allocation is reused.
#[derive(Debug, Default)]
pub struct DispatchBatch {
    items: Pooled<Vec<BatchItem>>,
}

impl DispatchBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an update.
    pub fn push(&mut self, item: BatchItem) {
        self.items.activate().push(item);
    }

    /// Queued updates in submission order.
    pub fn items(&self) -> &[BatchItem] {
        self.items.get().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of queued updates.
    pub fn len(&self) -> usize {
        self.items().len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Returns true if `item` is queued.
    pub fn contains(&self, item: BatchItem) -> bool {
        self.items().contains(&item)
    }

    /// Removes every update of `entry`, keeping the order of the rest.
    ///
    /// Returns the removed section indices.
    pub fn remove_entry(&mut self, entry: EntryHandle) -> Vec<u32> {
        let Some(items) = self.items.get_mut() else {
            return Vec::new();
        };
        let mut removed = Vec::new();
        items.retain(|item| {
            if item.entry == entry {
                removed.push(item.section);
                false
            } else {
                true
            }
        });
        removed
    }

    /// Empties the batch, keeping its allocation.
    pub fn clear(&mut self) {
        self.items.release();
    }
}

/// Consecutive weight streams of one section that share a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamGroup {
    /// Program variant.
    pub variant: SkinningVariant,
    /// First vertex of the group, relative to the section.
    pub first_vertex: u32,
    /// Vertices across all streams of the group.
    pub num_vertices: u32,
    /// Streams merged into the group.
    pub stream_count: u32,
}

impl StreamGroup {
    /// One past the last vertex of the group, relative to the section.
    pub fn end_vertex(&self) -> u32 {
        self.first_vertex + self.num_vertices
    }
}

/// Groups a section's streams into dispatches, in vertex order.
///
/// A stream joins the previous group when it resolves to the same program
/// and starts where that group ends, so every vertex is skinned exactly once.
/// Streams of one program separated by another program's stream stay apart.
pub fn coalesce_streams(streams: &[SkinStream], skin_type: SkinType) -> Vec<StreamGroup> {
    let mut groups: Vec<StreamGroup> = Vec::with_capacity(1);
    for stream in streams {
        let variant = SkinningVariant::new(&stream.weights, skin_type);
        let continues = |group: &StreamGroup| {
            group.variant == variant && group.end_vertex() == stream.first_vertex
        };
        if let Some(group) = groups.last_mut().filter(|group| continues(group)) {
            group.num_vertices += stream.num_vertices;
            group.stream_count += 1;
        } else {
            groups.push(StreamGroup {
                variant,
                first_vertex: stream.first_vertex,
                num_vertices: stream.num_vertices,
                stream_count: 1,
            });
        }
    }
    groups
}

/// Which bones a skinning dispatch evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkinTarget {
    /// This frame's bones into the current slot, tangents included.
    Current,
    /// Last frame's bones into the previous slot, positions only.
    Previous,
}

/// A skinning dispatch awaiting recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortedDispatch {
    /// Variant key the list is sorted by.
    pub key: u32,
    /// Position of the update in the batch.
    pub batch_index: u32,
    /// Streams covered by the dispatch.
    pub group: StreamGroup,
    /// Output slot.
    pub target: SkinTarget,
}

/// Sorts by variant key, keeping submission order within a key.
pub fn sort_dispatches(dispatches: &mut [SortedDispatch]) {
    // Stable, so equal keys keep batch order and per-section group order.
    dispatches.sort_by_key(|d| (d.key, d.batch_index));
}
