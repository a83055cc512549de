use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use skincache::batch::{SkinTarget, SortedDispatch, StreamGroup, sort_dispatches};
use skincache::{
    BoneBuffer, BoneBufferHandle, CacheContext, MeshLod, OwnerId, SectionDesc, SkinCacheConfig, SkinRequest,
    SkinType, SkinWeightLayout, SkinningVariant, SourceFactory, SourceFactoryHandle, SourceRegistry, SourceStreams,
};
use skincache_graphics::{
    BufferDescriptor, BufferUsage, CommandList, GraphicsDevice, Pipeline, ProgramLibrary,
};

// ---------------------------------------------------------------------------
// Batch sorting
// ---------------------------------------------------------------------------

fn dispatches(count: u32) -> Vec<SortedDispatch> {
    let variants: Vec<SkinningVariant> = SkinningVariant::all().collect();
    (0..count)
        .map(|i| {
            // Spread keys so neighbours rarely share a variant.
            let variant = variants[(i as usize * 7) % variants.len()];
            SortedDispatch {
                key: variant.key(),
                batch_index: i,
                group: StreamGroup {
                    variant,
                    first_vertex: 0,
                    num_vertices: 1024,
                    stream_count: 1,
                },
                target: SkinTarget::Current,
            }
        })
        .collect()
}

fn bench_sort_dispatches(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort_dispatches");
    for count in [64u32, 1024, 8192] {
        let input = dispatches(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &input, |b, input| {
            b.iter(|| {
                let mut sorted = input.clone();
                sort_dispatches(&mut sorted);
                black_box(sorted)
            });
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Frame dispatch
// ---------------------------------------------------------------------------

struct BenchScene {
    cache: CacheContext,
    registry: SourceRegistry,
    factory: SourceFactoryHandle,
    bones: BoneBufferHandle,
    lods: Vec<MeshLod>,
}

fn populated_cache(entries: u64) -> BenchScene {
    let device = GraphicsDevice::new("bench", Default::default());
    let buffer = || {
        device
            .create_buffer(&BufferDescriptor::new(4096, BufferUsage::SHADER_READ))
            .expect("source buffer")
    };
    let mut registry = SourceRegistry::new();
    let factory = registry.register_factory(SourceFactory {
        label: "bench mesh".into(),
        streams: Arc::new(SourceStreams {
            positions: buffer(),
            tangents: buffer(),
            uvs: buffer(),
            weights: buffer(),
            indices: Some(buffer()),
            colors: None,
        }),
    });
    let bones = registry.register_bone_buffer(BoneBuffer {
        label: "bench bones".into(),
        buffer: buffer(),
    });

    let config = SkinCacheConfig::default().with_memory_limit_mb(4096.0);
    let cache = CacheContext::new(device, Arc::new(ProgramLibrary::new()), config);
    let lods = (0..entries)
        .map(|i| {
            let weights = if i % 3 == 0 {
                SkinWeightLayout::with_influences(8)
            } else {
                SkinWeightLayout::default()
            };
            MeshLod::new(
                0,
                vec![
                    SectionDesc::new(0, 512, weights),
                    SectionDesc::new(512, 256, SkinWeightLayout::default()),
                ],
            )
        })
        .collect();
    BenchScene {
        cache,
        registry,
        factory,
        bones,
        lods,
    }
}

fn bench_frame_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_now");
    for count in [16u64, 256] {
        let BenchScene {
            mut cache,
            registry,
            factory,
            bones,
            lods,
        } = populated_cache(count);
        let mut handles = vec![None; lods.len()];
        let mut revision = 1;

        group.bench_function(BenchmarkId::from_parameter(count), |b| {
            b.iter(|| {
                revision += 1;
                let source = registry
                    .source(factory, bones, revision, revision - 1)
                    .expect("registered source");
                for (owner, (lod, handle)) in lods.iter().zip(handles.iter_mut()).enumerate() {
                    for section in 0..2 {
                        let request =
                            SkinRequest::new(OwnerId(owner as u64), lod, section, source.clone());
                        black_box(cache.process_entry(handle, request).expect("admitted"));
                    }
                }
                let mut list = CommandList::new(Pipeline::Graphics);
                black_box(cache.dispatch_now(&mut list).expect("frame"));
            });
        });
    }
    group.finish();
}

fn bench_variant_key(c: &mut Criterion) {
    let layouts = [
        SkinWeightLayout::default(),
        SkinWeightLayout::with_influences(8),
        SkinWeightLayout {
            bone_index_16: true,
            ..SkinWeightLayout::default()
        },
    ];
    c.bench_function("variant_key", |b| {
        b.iter(|| {
            let mut sum = 0u32;
            for layout in &layouts {
                for skin_type in [SkinType::Normal, SkinType::Morph, SkinType::Cloth] {
                    sum += SkinningVariant::new(black_box(layout), skin_type).key();
                }
            }
            black_box(sum)
        });
    });
}

criterion_group!(
    benches,
    bench_sort_dispatches,
    bench_frame_dispatch,
    bench_variant_key,
);
criterion_main!(benches);
