//! Runs a frame's skinning as two tasks on a worker pool.
//!
//! ```text
//! prerequisites ──► setup ──► execute ──► finish_frame
//!                     │
//!                     └─► add_async_compute_wait (graphics timeline)
//! ```
//!
//! Setup resolves revisions and sorts the batch. Execute records into its own
//! [`CommandList`]. On the async-compute pipeline the list waits for a fence
//! the graphics timeline signals before it, and signals a second fence the
//! graphics timeline must wait on before reading any cache output.

use std::sync::Arc;

use parking_lot::Mutex;
use skincache_core::profiling::profile_scope;
use skincache_core::{Prerequisite, TaskHandle, WorkerPool};
use skincache_graphics::{CommandList, CommandRecorder, PipeFence, Pipeline};

use crate::context::CacheContext;
use crate::dispatch::FrameSetup;
use crate::error::SkinCacheError;
use crate::summary::FrameStats;

/// A cache shared between the render thread and frame tasks.
pub type SharedCache = Arc<Mutex<CacheContext>>;

#[derive(Debug, Clone, Copy)]
struct AsyncFences {
    start: PipeFence,
    done: PipeFence,
}

/// Recorded work of one frame.
#[derive(Debug)]
pub struct FrameOutput {
    /// Commands to submit on [`FrameOutput::pipeline`].
    pub commands: CommandList,
    /// Pipeline the commands target.
    pub pipeline: Pipeline,
    /// Counters of the frame.
    pub stats: FrameStats,
}

/// Handle to a frame's in-flight skinning tasks.
#[derive(Debug)]
#[must_use = "a dispatched frame must be finished"]
pub struct FrameDispatch {
    cache: SharedCache,
    pipeline: Pipeline,
    fences: Option<AsyncFences>,
    setup: TaskHandle<FrameSetup>,
    execute: TaskHandle<Result<(CommandList, FrameStats), SkinCacheError>>,
    signal_added: bool,
}

/// Starts the frame's skinning work.
///
/// Setup runs once every prerequisite completes. Requests for the async
/// pipeline fall back to graphics when async compute is disabled in the
/// config or missing on the device.
pub fn dispatch(
    cache: &SharedCache,
    pool: &WorkerPool,
    prerequisites: &[&dyn Prerequisite],
    pipeline: Pipeline,
) -> FrameDispatch {
    let pipeline = {
        let mut guard = cache.lock();
        let supported =
            guard.config().async_compute && guard.device().capabilities().async_compute;
        let pipeline = match pipeline {
            Pipeline::AsyncCompute if !supported => {
                log::debug!("dispatch: async compute unavailable, using graphics");
                Pipeline::Graphics
            }
            other => other,
        };
        guard.begin_frame_gate(pipeline == Pipeline::AsyncCompute);
        pipeline
    };
    let fences = (pipeline == Pipeline::AsyncCompute).then(|| AsyncFences {
        start: PipeFence::new(),
        done: PipeFence::new(),
    });

    let setup: TaskHandle<FrameSetup> = {
        let cache = Arc::clone(cache);
        pool.spawn_after(prerequisites, move || {
            profile_scope!("skin_cache_setup_task");
            cache.lock().setup_frame()
        })
    };

    let execute = {
        let cache = Arc::clone(cache);
        let setup_done = setup.clone();
        pool.spawn_after(
            &[&setup],
            move || -> Result<(CommandList, FrameStats), SkinCacheError> {
                profile_scope!("skin_cache_execute_task");
                let setup = setup_done.wait_take()?;
                let mut commands = CommandList::new(pipeline);
                if let Some(fences) = fences {
                    commands.wait_fence(fences.start);
                }
                let stats = cache.lock().execute_frame(setup, &mut commands)?;
                if let Some(fences) = fences {
                    commands.signal_fence(fences.done);
                }
                Ok((commands, stats))
            },
        )
    };

    FrameDispatch {
        cache: Arc::clone(cache),
        pipeline,
        fences,
        setup,
        execute,
        signal_added: false,
    }
}

impl FrameDispatch {
    /// Pipeline the frame's work was recorded for.
    pub fn pipeline(&self) -> Pipeline {
        self.pipeline
    }

    /// Returns true if the work runs on the async-compute pipeline.
    pub fn is_async(&self) -> bool {
        self.fences.is_some()
    }

    /// Records the fence the async work waits on. Call on the graphics
    /// timeline after the bone data is uploaded. No-op on graphics frames.
    pub fn add_async_compute_signal(&mut self, graphics: &mut dyn CommandRecorder) {
        if let Some(fences) = self.fences {
            graphics.signal_fence(fences.start);
            self.signal_added = true;
        }
    }

    /// Makes the graphics timeline wait for the async work.
    ///
    /// Blocks until setup has finished. Cache output may be read after this.
    /// No-op on graphics frames.
    pub fn add_async_compute_wait(&mut self, graphics: &mut dyn CommandRecorder) {
        let Some(fences) = self.fences else {
            return;
        };
        self.setup.wait();
        graphics.wait_fence(fences.done);
        self.cache.lock().mark_async_wait_added();
    }

    /// Waits for the execute task and returns its commands.
    ///
    /// # Errors
    ///
    /// Returns the execute task's error, or [`SkinCacheError::Task`] if a
    /// task panicked.
    ///
    /// # Panics
    ///
    /// Panics on async frames whose graphics-side wait was never added.
    pub fn finish_frame(self) -> Result<FrameOutput, SkinCacheError> {
        let result = self.execute.wait_take();
        let gate = self.cache.lock().end_frame_gate();
        assert!(
            !gate.async_in_flight || gate.wait_added,
            "async compute wait was never added"
        );
        if self.is_async() && !self.signal_added {
            log::warn!("FrameDispatch: async frame finished without its start signal");
        }
        let (commands, stats) = result??;
        Ok(FrameOutput {
            commands,
            pipeline: self.pipeline,
            stats,
        })
    }
}
