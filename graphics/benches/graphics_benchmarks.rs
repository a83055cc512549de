use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use skincache_graphics::{
    BufferAccess, BufferDescriptor, BufferUsage, CommandList, CommandRecorder, ComputeDispatch,
    GraphicsDevice, Pipeline, ProgramId, Transition,
};

// ---------------------------------------------------------------------------
// Command recording
// ---------------------------------------------------------------------------

fn bench_record_dispatches(c: &mut Criterion) {
    let device = GraphicsDevice::new("bench", Default::default());
    let buffers: Vec<_> = (0..64)
        .map(|_| {
            device
                .create_buffer(&BufferDescriptor::new(4096, BufferUsage::STORAGE))
                .expect("buffer")
        })
        .collect();

    let mut group = c.benchmark_group("record_dispatches");
    for count in [16usize, 256, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let mut list = CommandList::new(Pipeline::AsyncCompute);
                for i in 0..count {
                    let program = ProgramId::new("skin", (i / 64) as u32);
                    if i % 64 == 0 {
                        list.set_program(program);
                    }
                    let out = &buffers[i % buffers.len()];
                    list.dispatch(
                        ComputeDispatch::new(program, 8)
                            .constant("NumVertices", 512)
                            .bind("Out", out, BufferAccess::StorageWrite),
                    );
                }
                black_box(list)
            });
        });
    }
    group.finish();
}

fn bench_referenced_buffers(c: &mut Criterion) {
    let device = GraphicsDevice::new("bench", Default::default());
    let buffers: Vec<_> = (0..256)
        .map(|_| {
            device
                .create_buffer(&BufferDescriptor::new(256, BufferUsage::STORAGE))
                .expect("buffer")
        })
        .collect();
    let transitions: Vec<_> = buffers
        .iter()
        .map(|b| Transition::to(b, BufferAccess::ShaderRead))
        .collect();
    let mut list = CommandList::new(Pipeline::Graphics);
    for chunk in transitions.chunks(16) {
        list.transition(chunk);
    }

    c.bench_function("referenced_buffers_256", |b| {
        b.iter(|| black_box(list.referenced_buffers()));
    });
}

// ---------------------------------------------------------------------------
// Device bookkeeping
// ---------------------------------------------------------------------------

fn bench_buffer_churn(c: &mut Criterion) {
    let device = GraphicsDevice::new("bench", Default::default());
    c.bench_function("create_drop_buffer", |b| {
        b.iter(|| {
            let buffer = device
                .create_buffer(&BufferDescriptor::new(1024, BufferUsage::STORAGE))
                .expect("buffer");
            black_box(buffer.id())
        });
    });
}

criterion_group!(
    benches,
    bench_record_dispatches,
    bench_referenced_buffers,
    bench_buffer_churn,
);
criterion_main!(benches);
