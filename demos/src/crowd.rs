//! A crowd of skinned characters.
//!
//! Every character owns a raster entry, and every fourth one also owns a
//! ray-tracing entry. Bones advance one revision per frame. Odd characters
//! swap between two LODs at a fixed interval, which rebuilds their entries.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use skincache::{
    Admission, BoneBuffer, BoneBufferHandle, CacheContext, EntryHandle, FrameStats, MeshLod,
    OwnerId, ReadbackKind, SectionDesc, SharedCache, SkinCacheConfig, SkinCacheError,
    SkinRequest, SkinWeightLayout, SourceFactory, SourceFactoryHandle, SourceRegistry,
    SourceStreams,
};
use skincache_core::WorkerPool;
use skincache_graphics::{
    BufferDescriptor, BufferUsage, CommandList, GraphicsDevice, GraphicsError, Pipeline,
    ProgramLibrary,
};

/// Shape of the simulated crowd.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrowdParams {
    /// Number of characters.
    pub characters: u32,
    /// Vertices per section at LOD 0. LOD 1 has half as many.
    pub vertices_per_section: u32,
    /// Sections per LOD.
    pub sections: u32,
    /// Frames between LOD swaps of odd characters. Zero never swaps.
    pub lod_switch_interval: u32,
    /// Frames between position readbacks of the first character. Zero never reads back.
    pub readback_interval: u32,
    /// Dispatch on the async-compute pipeline when possible.
    pub async_compute: bool,
}

impl Default for CrowdParams {
    fn default() -> Self {
        Self {
            characters: 32,
            vertices_per_section: 2048,
            sections: 2,
            lod_switch_interval: 30,
            readback_interval: 0,
            async_compute: false,
        }
    }
}

/// What happened in one simulated frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameReport {
    /// Pipeline the skinning ran on.
    pub pipeline: Pipeline,
    /// Cache counters.
    pub stats: FrameStats,
    /// Section requests refused by the memory budget.
    pub rejected_sections: u32,
    /// Bytes that would have been needed to admit them.
    pub extra_required_bytes: u64,
    /// Ray-tracing entries whose geometry changed.
    pub ray_tracing_updates: usize,
    /// Readback callbacks that ran.
    pub completed_readbacks: usize,
}

struct Character {
    owner: OwnerId,
    lod: usize,
    raster: Option<EntryHandle>,
    ray_tracing: Option<EntryHandle>,
}

/// The simulation state.
pub struct Crowd {
    params: CrowdParams,
    device: Arc<GraphicsDevice>,
    cache: SharedCache,
    registry: SourceRegistry,
    factory: SourceFactoryHandle,
    bones: BoneBufferHandle,
    lods: [MeshLod; 2],
    characters: Vec<Character>,
    revision: u32,
    frame: u32,
    positions_read: Arc<AtomicUsize>,
}

fn crowd_lod(lod: u32, params: &CrowdParams) -> MeshLod {
    let vertices = (params.vertices_per_section >> lod).max(3);
    let sections = (0..params.sections)
        .map(|index| {
            let weights = if index == 0 {
                SkinWeightLayout::with_influences(8)
            } else {
                SkinWeightLayout::default()
            };
            let section = SectionDesc::new(index * vertices, vertices, weights)
                .with_triangles(index * vertices * 3, vertices / 2);
            // Faces recompute their tangents at full detail only.
            if index == 0 && lod == 0 {
                section.with_recompute_tangents()
            } else {
                section
            }
        })
        .collect();
    MeshLod::new(lod, sections)
}

impl Crowd {
    /// Builds the crowd on `device`.
    ///
    /// # Errors
    ///
    /// Fails if the shared source buffers cannot be created.
    pub fn new(
        device: Arc<GraphicsDevice>,
        config: SkinCacheConfig,
        params: CrowdParams,
    ) -> Result<Self, GraphicsError> {
        let vertices = u64::from(params.vertices_per_section * params.sections.max(1));
        let buffer = |label: &str, bytes_per_vertex: u64| {
            device.create_buffer(
                &BufferDescriptor::new(vertices * bytes_per_vertex, BufferUsage::SHADER_READ)
                    .with_label(label),
            )
        };

        let mut registry = SourceRegistry::new();
        let factory = registry.register_factory(SourceFactory {
            label: "crowd character".into(),
            streams: Arc::new(SourceStreams {
                positions: buffer("positions", 12)?,
                tangents: buffer("tangents", 8)?,
                uvs: buffer("uvs", 8)?,
                weights: buffer("weights", 16)?,
                indices: Some(buffer("indices", 18)?),
                colors: None,
            }),
        });
        let bones = registry.register_bone_buffer(BoneBuffer {
            label: "crowd bones".into(),
            buffer: device.create_buffer(
                &BufferDescriptor::new(256 * 48, BufferUsage::SHADER_READ)
                    .with_label("bone matrices"),
            )?,
        });

        let cache = CacheContext::new(
            Arc::clone(&device),
            Arc::new(ProgramLibrary::new()),
            config,
        );
        let characters = (0..params.characters)
            .map(|index| Character {
                owner: OwnerId(u64::from(index)),
                lod: 0,
                raster: None,
                ray_tracing: None,
            })
            .collect();

        log::info!(
            "Crowd: {} characters, {} sections of {} vertices",
            params.characters,
            params.sections,
            params.vertices_per_section
        );

        Ok(Self {
            lods: [crowd_lod(0, &params), crowd_lod(1, &params)],
            params,
            device,
            cache: Arc::new(parking_lot::Mutex::new(cache)),
            registry,
            factory,
            bones,
            characters,
            revision: 0,
            frame: 0,
            positions_read: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// The shared cache.
    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    /// Frames simulated so far.
    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Simulates one frame: submit every section, run the cache's frame
    /// tasks on `pool`, submit the recorded work and retire the GPU frame.
    ///
    /// # Errors
    ///
    /// Returns the first request or recording error.
    pub fn step(&mut self, pool: &WorkerPool) -> Result<FrameReport, SkinCacheError> {
        self.frame += 1;
        self.revision += 1;
        let mut report = FrameReport::default();

        let source = self
            .registry
            .source(
                self.factory,
                self.bones,
                self.revision,
                self.revision - 1,
            )
            .ok_or(SkinCacheError::StaleHandle)?;

        let swap = self.params.lod_switch_interval > 0
            && self.frame % self.params.lod_switch_interval == 0;
        {
            let mut cache = self.cache.lock();
            for (index, character) in self.characters.iter_mut().enumerate() {
                if swap && index % 2 == 1 {
                    character.lod ^= 1;
                    log::debug!("Crowd: {} switches to lod {}", character.owner, character.lod);
                }
                let lod = &self.lods[character.lod];
                for section in 0..lod.sections.len() as u32 {
                    let request = SkinRequest::new(character.owner, lod, section, source.clone());
                    if let Admission::Rejected { .. } =
                        cache.process_entry(&mut character.raster, request)?
                    {
                        report.rejected_sections += 1;
                    }
                    if index % 4 == 0 {
                        let request =
                            SkinRequest::new(character.owner, lod, section, source.clone())
                                .ray_tracing();
                        if let Admission::Rejected { .. } =
                            cache.process_entry(&mut character.ray_tracing, request)?
                        {
                            report.rejected_sections += 1;
                        }
                    }
                }
            }

            let interval = self.params.readback_interval;
            if interval > 0 && self.frame % interval == 0 {
                if let Some(handle) = self.characters.first().and_then(|c| c.raster) {
                    let counter = Arc::clone(&self.positions_read);
                    cache.request_readback(
                        handle,
                        0,
                        ReadbackKind::Positions,
                        Box::new(move |data| {
                            log::debug!(
                                "Crowd: read back {} positions of {}",
                                data.positions().len(),
                                data.owner
                            );
                            counter.fetch_add(1, Ordering::Relaxed);
                        }),
                    )?;
                }
            }
        }

        let requested = if self.params.async_compute {
            Pipeline::AsyncCompute
        } else {
            Pipeline::Graphics
        };
        let mut graphics = CommandList::new(Pipeline::Graphics);
        let mut frame = skincache::dispatch(&self.cache, pool, &[], requested);
        frame.add_async_compute_signal(&mut graphics);
        frame.add_async_compute_wait(&mut graphics);
        let output = frame.finish_frame()?;
        report.pipeline = output.pipeline;
        report.stats = output.stats;

        self.device.submit(output.commands);
        self.device.submit(graphics);
        self.device.end_frame();

        let mut cache = self.cache.lock();
        let before = self.positions_read.load(Ordering::Relaxed);
        cache.poll_readbacks();
        report.completed_readbacks = self.positions_read.load(Ordering::Relaxed) - before;
        report.ray_tracing_updates = cache.take_pending_ray_tracing_updates().len();
        report.extra_required_bytes = cache.take_extra_required_memory();
        Ok(report)
    }

    /// Releases every entry.
    pub fn shutdown(&mut self) {
        let mut cache = self.cache.lock();
        for character in &mut self.characters {
            if character.raster.is_some() {
                cache.release(&mut character.raster);
            }
            if character.ray_tracing.is_some() {
                cache.release(&mut character.ray_tracing);
            }
        }
        log::info!(
            "Crowd: shut down after {} frames, {} bytes still cached",
            self.frame,
            cache.used_memory_bytes()
        );
    }
}
