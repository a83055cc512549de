//! Device integration tests.
//!
//! Each test runs against the device profiles in [`common::DeviceProfile`]
//! so capability-dependent behavior is covered on every hardware class.

mod common;

use rstest::rstest;

use common::{DeviceProfile, TestContext};
use skincache_graphics::{
    BufferAccess, BufferDescriptor, BufferUsage, Command, CommandList, CommandRecorder,
    ComputeDispatch, GraphicsError, Pipeline, PipeFence, PixelFormat, ProgramId, ProgramLibrary,
    Transition,
};

const SKIN: ProgramId = ProgramId::new("skin", 0);
const TANGENTS: ProgramId = ProgramId::new("tangents", 0);

// ============================================================================
// Buffer Tests
// ============================================================================

#[rstest]
#[case::desktop(DeviceProfile::Desktop)]
#[case::mobile(DeviceProfile::Mobile)]
#[case::constrained(DeviceProfile::Constrained)]
fn test_buffer_lifetime_tracking(#[case] profile: DeviceProfile) {
    let ctx = TestContext::new(profile);

    let a = ctx.storage_buffer(1024);
    let b = ctx.typed_buffer(PixelFormat::R32Float, 300);
    assert_eq!(ctx.device.buffer_count(), 2);
    assert_eq!(ctx.device.allocated_bytes(), 1024 + 1200);

    let id = a.id();
    drop(a);
    assert!(!ctx.device.is_buffer_alive(id));
    assert!(ctx.device.is_buffer_alive(b.id()));
    assert_eq!(ctx.device.allocated_bytes(), 1200);
}

#[rstest]
#[case::desktop(DeviceProfile::Desktop, true)]
#[case::mobile(DeviceProfile::Mobile, false)]
#[case::constrained(DeviceProfile::Constrained, true)]
fn test_snorm16_storage_support(#[case] profile: DeviceProfile, #[case] supported: bool) {
    let ctx = TestContext::new(profile);
    let result = ctx.device.create_buffer(&BufferDescriptor::typed(
        PixelFormat::Rgba16Snorm,
        64,
        BufferUsage::STORAGE,
    ));
    assert_eq!(result.is_ok(), supported);
    if !supported {
        assert_eq!(
            result.err(),
            Some(GraphicsError::UnsupportedStorageFormat(PixelFormat::Rgba16Snorm))
        );

        // Read-only SNORM16 buffers and the packed fallback stay available.
        assert!(
            ctx.device
                .create_buffer(&BufferDescriptor::typed(
                    PixelFormat::Rgba16Snorm,
                    64,
                    BufferUsage::SHADER_READ,
                ))
                .is_ok()
        );
        ctx.typed_buffer(PixelFormat::Rgba16Sint, 64);
    }
}

#[test]
fn test_memory_limit_reports_out_of_memory() {
    let ctx = TestContext::new(DeviceProfile::Constrained);
    let _big = ctx.storage_buffer(768 * 1024);

    let result = ctx
        .device
        .create_buffer(&BufferDescriptor::new(512 * 1024, BufferUsage::STORAGE));
    assert_eq!(
        result.err(),
        Some(GraphicsError::OutOfMemory {
            requested: 512 * 1024,
            available: 256 * 1024,
        })
    );

    drop(_big);
    assert!(
        ctx.device
            .create_buffer(&BufferDescriptor::new(512 * 1024, BufferUsage::STORAGE))
            .is_ok()
    );
}

#[rstest]
#[case::zero(0)]
#[case::too_large(2 << 30)]
fn test_invalid_buffer_size(#[case] size: u64) {
    let ctx = TestContext::new(DeviceProfile::Desktop);
    let result = ctx
        .device
        .create_buffer(&BufferDescriptor::new(size, BufferUsage::STORAGE));
    assert!(matches!(result, Err(GraphicsError::InvalidParameter(_))));
}

// ============================================================================
// Readback Tests
// ============================================================================

#[rstest]
#[case::desktop(DeviceProfile::Desktop)]
#[case::mobile(DeviceProfile::Mobile)]
fn test_readback_retires_after_latency(#[case] profile: DeviceProfile) {
    let ctx = TestContext::new(profile);
    let latency = profile.capabilities().readback_latency_frames;
    let buffer = ctx.storage_buffer(256);

    let mut list = CommandList::new(Pipeline::Graphics);
    let readback = list.copy_to_readback(&buffer, 64);
    assert_eq!(readback.source(), buffer.id());
    ctx.device.submit(list);

    ctx.end_frames(latency - 1);
    assert!(!readback.is_ready());

    ctx.device.end_frame();
    assert!(readback.is_ready());
    assert_eq!(readback.take_data(), Some(vec![0; 64]));
}

#[test]
fn test_readback_clamped_to_buffer_size() {
    let ctx = TestContext::new(DeviceProfile::Desktop);
    let buffer = ctx.storage_buffer(32);

    let mut list = CommandList::new(Pipeline::Graphics);
    let readback = list.copy_to_readback(&buffer, 1000);
    assert_eq!(readback.byte_count(), 32);
}

#[test]
fn test_unsubmitted_readback_never_completes() {
    let ctx = TestContext::new(DeviceProfile::Desktop);
    let buffer = ctx.storage_buffer(32);

    let mut list = CommandList::new(Pipeline::Graphics);
    let readback = list.copy_to_readback(&buffer, 32);
    drop(list);

    ctx.end_frames(4);
    assert!(!readback.is_ready());
}

// ============================================================================
// Recording Tests
// ============================================================================

#[test]
fn test_recorded_frame_shape() {
    let ctx = TestContext::new(DeviceProfile::Desktop);
    let positions = ctx.typed_buffer(PixelFormat::R32Float, 300);
    let accumulator = ctx.typed_buffer(PixelFormat::R32Sint, 800);

    let mut list = CommandList::new(Pipeline::Graphics);
    list.push_marker("SkinCache");
    list.clear_buffer(&accumulator, 0);
    list.transition(&[Transition::to(&positions, BufferAccess::StorageWrite)]);
    list.set_program(SKIN);
    list.dispatch(
        ComputeDispatch::new(SKIN, 2).bind("Out", &positions, BufferAccess::StorageWrite),
    );
    list.set_program(TANGENTS);
    list.dispatch(
        ComputeDispatch::new(TANGENTS, 1)
            .bind("Positions", &positions, BufferAccess::ShaderRead)
            .bind("Accumulator", &accumulator, BufferAccess::StorageReadWrite),
    );
    list.transition(&[Transition::new(
        &positions,
        BufferAccess::StorageWrite,
        BufferAccess::ShaderRead,
    )]);
    list.pop_marker();

    assert_eq!(list.program_switches(), 2);
    assert_eq!(list.dispatches().count(), 2);
    assert!(matches!(list.commands().first(), Some(Command::PushMarker(_))));
    assert!(matches!(list.commands().last(), Some(Command::PopMarker)));
    assert_eq!(list.referenced_buffers().len(), 2);

    ctx.device.submit(list);
    assert_eq!(ctx.device.submitted_list_count(), 1);
}

#[test]
fn test_cross_pipe_fences() {
    let start = PipeFence::new();
    let done = PipeFence::new();

    let mut graphics = CommandList::new(Pipeline::Graphics);
    graphics.signal_fence(start);

    let mut compute = CommandList::new(Pipeline::AsyncCompute);
    compute.wait_fence(start);
    compute.signal_fence(done);

    graphics.wait_fence(done);

    assert_eq!(graphics.signaled_fences(), vec![start]);
    assert_eq!(graphics.waited_fences(), vec![done]);
    assert_eq!(compute.waited_fences(), vec![start]);
    assert_eq!(compute.signaled_fences(), vec![done]);
}

#[test]
#[should_panic(expected = "cannot append a command list recorded for another pipeline")]
fn test_append_across_pipelines_panics() {
    let mut graphics = CommandList::new(Pipeline::Graphics);
    graphics.append(CommandList::new(Pipeline::AsyncCompute));
}

#[test]
fn test_program_library_shared_across_threads() {
    let library = std::sync::Arc::new(ProgramLibrary::new());
    library.mark_compiling(SKIN);

    let worker = {
        let library = std::sync::Arc::clone(&library);
        std::thread::spawn(move || library.mark_ready(SKIN))
    };
    worker.join().expect("worker thread");

    assert!(library.is_ready(&SKIN));
    assert_eq!(library.compiling_count(), 0);
}
