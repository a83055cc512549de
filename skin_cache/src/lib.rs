//! # Skin Cache
//!
//! Caches GPU-skinned vertex positions and tangents per mesh instance and LOD,
//! so every consumer of a frame (base pass, velocity, shadows, ray tracing)
//! reads the same skinned output instead of skinning again.
//!
//! ## Overview
//!
//! - [`CacheContext`] - entry registry, memory budget, dispatch batch and
//!   tangent staging pool
//! - [`SkinRequest`] - one section update submitted by a mesh owner
//! - [`CacheContext::setup_frame`] / [`CacheContext::execute_frame`] - the two
//!   phases of a frame's GPU work
//! - [`orchestrate::dispatch`] - runs both phases as tasks, optionally on the
//!   async-compute pipeline
//! - [`tangents::reference`] - CPU version of the tangent recomputation, used
//!   to validate GPU output
//!
//! ## Frame flow
//!
//! ```text
//! process_entry ──► batch ──► setup_frame ──► execute_frame ──► consumers read
//!   (admission,      (queued     (revision        (transitions,      position /
//!    budget)          sections)   lookup, sort)    dispatches)        tangent buffers
//! ```
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use skincache::{Admission, CacheContext, MeshLod, OwnerId, SectionDesc, SkinCacheConfig,
//!     SkinRequest, SkinWeightLayout, SourceRegistry, SourceFactory, SourceStreams, BoneBuffer};
//! use skincache_graphics::{BufferDescriptor, BufferUsage, CommandList, GraphicsDevice,
//!     Pipeline, ProgramLibrary};
//!
//! let device = GraphicsDevice::new("example", Default::default());
//! let programs = Arc::new(ProgramLibrary::new());
//! let mut cache = CacheContext::new(Arc::clone(&device), programs, SkinCacheConfig::default());
//!
//! let buffer = |size| device.create_buffer(&BufferDescriptor::new(size, BufferUsage::SHADER_READ)).unwrap();
//! let mut registry = SourceRegistry::new();
//! let factory = registry.register_factory(SourceFactory {
//!     label: "mesh".into(),
//!     streams: Arc::new(SourceStreams {
//!         positions: buffer(1200),
//!         tangents: buffer(800),
//!         uvs: buffer(800),
//!         weights: buffer(800),
//!         indices: None,
//!         colors: None,
//!     }),
//! });
//! let bones = registry.register_bone_buffer(BoneBuffer { label: "bones".into(), buffer: buffer(4096) });
//!
//! let lod = MeshLod::new(0, vec![SectionDesc::new(0, 100, SkinWeightLayout::default())]);
//! let source = registry.source(factory, bones, 1, 0).unwrap();
//!
//! let mut entry = None;
//! let admission = cache.process_entry(&mut entry, SkinRequest::new(OwnerId(1), &lod, 0, source)).unwrap();
//! assert_eq!(admission, Admission::Admitted);
//!
//! let mut commands = CommandList::new(Pipeline::Graphics);
//! let stats = cache.dispatch_now(&mut commands).unwrap();
//! assert_eq!(stats.dispatched_sections, 1);
//! assert!(cache.position_buffer(entry.unwrap(), 0).is_some());
//! ```

pub mod batch;
pub mod budget;
pub mod buffer_set;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod entry;
pub mod error;
pub mod mesh;
pub mod orchestrate;
pub mod readback;
pub mod revision;
pub mod summary;
pub mod tangents;
pub mod variant;

pub use budget::{Admission, MemoryBudget, MemoryCharge};
pub use buffer_set::{BufferSet, BufferSetLayout, select_tangent_format};
pub use config::{MemorySummaryMode, RecomputeTangentsMode, SkinCacheConfig};
pub use context::{CacheContext, FlushSignal, SkinRequest};
pub use dispatch::{FrameSetup, PlannedSection};
pub use entry::{
    CacheEntry, DispatchPlan, EntryHandle, EntryMode, EntryState, FallbackEvent, FallbackReason,
    OwnerId, PositionWrites,
};
pub use error::SkinCacheError;
pub use mesh::{
    BoneBinding, BoneBuffer, BoneBufferHandle, ClothInput, InfluenceType, MeshLod, MorphInput,
    SectionDesc, SkinStream, SkinType, SkinWeightLayout, SkinningSource, SourceFactory,
    SourceFactoryHandle, SourceRegistry, SourceStreams, VertexColorChannel,
};
pub use orchestrate::{FrameDispatch, FrameOutput, SharedCache, dispatch};
pub use readback::{ReadbackCallback, ReadbackData, ReadbackKind};
pub use revision::{PositionSlot, RetagPolicy};
pub use summary::{EntrySummary, FrameStats, MemorySummary};
pub use variant::SkinningVariant;

/// Skin cache library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the skin cache crates.
pub fn init() {
    skincache_core::init();
    skincache_graphics::init();
    log::info!("Skin cache v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
