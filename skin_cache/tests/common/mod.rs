//! Shared fixtures for the skin cache integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use skincache::{
    BoneBuffer, BoneBufferHandle, CacheContext, EntryHandle, MeshLod, OwnerId, SectionDesc,
    SkinCacheConfig, SkinRequest, SkinWeightLayout, SkinningSource, SourceFactory,
    SourceFactoryHandle, SourceRegistry, SourceStreams,
};
use skincache_graphics::{
    BufferDescriptor, BufferUsage, DeviceCapabilities, GraphicsDevice, ProgramLibrary,
};

/// Routes `log` output through the test harness.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A device, a program library and one registered mesh with its bones.
pub struct TestScene {
    pub device: Arc<GraphicsDevice>,
    pub programs: Arc<ProgramLibrary>,
    pub registry: SourceRegistry,
    pub factory: SourceFactoryHandle,
    pub bones: BoneBufferHandle,
    /// Bytes allocated on the device by the scene itself.
    pub baseline_bytes: u64,
}

impl TestScene {
    pub fn new() -> Self {
        Self::with_capabilities(DeviceCapabilities::default())
    }

    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        init_logger();
        let device = GraphicsDevice::new("test", capabilities);
        let buffer = |label: &str| {
            device
                .create_buffer(
                    &BufferDescriptor::new(4096, BufferUsage::SHADER_READ).with_label(label),
                )
                .expect("source buffer")
        };

        let mut registry = SourceRegistry::new();
        let factory = registry.register_factory(SourceFactory {
            label: "test mesh".into(),
            streams: Arc::new(SourceStreams {
                positions: buffer("positions"),
                tangents: buffer("tangents"),
                uvs: buffer("uvs"),
                weights: buffer("weights"),
                indices: Some(buffer("indices")),
                colors: Some(buffer("colors")),
            }),
        });
        let bones = registry.register_bone_buffer(BoneBuffer {
            label: "bones".into(),
            buffer: buffer("bones"),
        });
        let baseline_bytes = device.allocated_bytes();

        Self {
            device,
            programs: Arc::new(ProgramLibrary::new()),
            registry,
            factory,
            bones,
            baseline_bytes,
        }
    }

    pub fn cache(&self, config: SkinCacheConfig) -> CacheContext {
        CacheContext::new(Arc::clone(&self.device), Arc::clone(&self.programs), config)
    }

    /// Source at `revision`, with last frame's bones one revision older.
    pub fn source(&self, revision: u32) -> SkinningSource {
        self.registry
            .source(self.factory, self.bones, revision, revision.saturating_sub(1))
            .expect("live source handles")
    }

    /// Bytes the cache has allocated on the device.
    pub fn cache_bytes(&self) -> u64 {
        self.device.allocated_bytes() - self.baseline_bytes
    }
}

/// A LOD of back-to-back sections with the given vertex counts.
pub fn lod(vertex_counts: &[u32]) -> MeshLod {
    let mut base_vertex = 0;
    let sections = vertex_counts
        .iter()
        .map(|&count| {
            let section = SectionDesc::new(base_vertex, count, SkinWeightLayout::default());
            base_vertex += count;
            section
        })
        .collect();
    MeshLod::new(0, sections)
}

/// Like [`lod`], every section indexed and opting into tangent recomputation.
pub fn recompute_lod(vertex_counts: &[u32]) -> MeshLod {
    let mut lod = lod(vertex_counts);
    let mut base_index = 0;
    for section in &mut lod.sections {
        let triangles = section.num_vertices / 2;
        *section = section
            .clone()
            .with_triangles(base_index, triangles)
            .with_recompute_tangents();
        base_index += triangles * 3;
    }
    lod
}

/// Submits section 0 of `lod` for `owner` at `revision`.
pub fn submit(
    cache: &mut CacheContext,
    scene: &TestScene,
    entry: &mut Option<EntryHandle>,
    owner: u64,
    lod: &MeshLod,
    revision: u32,
) -> skincache::Admission {
    submit_section(cache, scene, entry, owner, lod, 0, revision)
}

/// Submits one section of `lod`.
pub fn submit_section(
    cache: &mut CacheContext,
    scene: &TestScene,
    entry: &mut Option<EntryHandle>,
    owner: u64,
    lod: &MeshLod,
    section: u32,
    revision: u32,
) -> skincache::Admission {
    cache
        .process_entry(
            entry,
            SkinRequest::new(OwnerId(owner), lod, section, scene.source(revision)),
        )
        .expect("valid request")
}
