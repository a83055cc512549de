//! Recompute-tangents support.
//!
//! Tangents are rebuilt in two compute passes per section. The triangle pass
//! scatters weighted contributions into a fixed-point accumulator with
//! atomic adds; the vertex pass normalizes each vertex and clears its slot.
//! [`reference`] holds a CPU rendition of both kernels.
//!
//! The accumulator lives in one of two places:
//! - [`TangentScheduling::Interleaved`]: a [`StagingPool`] buffer shared by
//!   all sections, reused round-robin, each section running both passes
//!   before the next one starts
//! - [`TangentScheduling::Parallel`]: a per-entry accumulation buffer, so all
//!   triangle passes can run before all vertex passes

pub mod reference;

use std::sync::Arc;

use skincache_graphics::{
    BufferDescriptor, BufferUsage, GraphicsDevice, GraphicsError, PixelFormat,
};

use crate::buffer_set::{ACCUMULATOR_INTS_PER_VERTEX, TrackedBuffer};
use crate::config::SkinCacheConfig;

/// How tangent passes are ordered within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TangentScheduling {
    /// Triangle and vertex pass alternate per section.
    Interleaved {
        /// Staging buffers in rotation.
        staging_depth: u32,
    },
    /// All triangle passes, one transition, all vertex passes.
    Parallel,
}

impl TangentScheduling {
    /// Scheduling selected by `config`.
    pub fn from_config(config: &SkinCacheConfig) -> Self {
        if config.parallel_tangent_dispatch {
            Self::Parallel
        } else {
            Self::Interleaved {
                staging_depth: config.effective_staging_depth(),
            }
        }
    }

    /// Returns true if entries need their own accumulation buffer.
    pub fn uses_entry_accumulation(&self) -> bool {
        matches!(self, Self::Parallel)
    }
}

/// A staging buffer handed out by [`StagingPool::acquire`].
#[derive(Debug)]
pub struct StagingLease<'a> {
    /// The accumulator.
    pub buffer: &'a mut TrackedBuffer,
    /// The buffer was just created and must be cleared before first use.
    pub needs_clear: bool,
}

/// Rotating accumulation buffers for interleaved tangent passes.
///
/// Each acquire advances to the next slot and grows it when it is too small
/// for the section. The vertex pass leaves every slot it touched zeroed, so
/// a buffer only needs clearing when it is created.
#[derive(Debug)]
pub struct StagingPool {
    slots: Vec<Option<TrackedBuffer>>,
    current: usize,
}

impl StagingPool {
    /// A pool of `depth` empty slots (at least one).
    pub fn new(depth: u32) -> Self {
        let mut pool = Self {
            slots: Vec::new(),
            current: 0,
        };
        pool.resize(depth);
        pool
    }

    /// Number of slots.
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Changes the number of slots. Dropped slots free their buffers.
    pub fn resize(&mut self, depth: u32) {
        let depth = depth.max(1) as usize;
        self.slots.resize_with(depth, || None);
        if self.current >= depth {
            self.current = 0;
        }
    }

    /// Advances to the next slot and returns a buffer covering `num_vertices`.
    ///
    /// # Errors
    ///
    /// Propagates buffer creation failures.
    pub fn acquire(
        &mut self,
        device: &Arc<GraphicsDevice>,
        num_vertices: u32,
    ) -> Result<StagingLease<'_>, GraphicsError> {
        self.current = (self.current + 1) % self.slots.len();
        let required =
            u64::from(num_vertices.max(1)) * u64::from(ACCUMULATOR_INTS_PER_VERTEX);
        let slot = &mut self.slots[self.current];

        let too_small = slot
            .as_ref()
            .is_none_or(|staging| staging.buffer().size() < required * 4);
        if too_small {
            let desc = BufferDescriptor::typed(
                PixelFormat::R32Sint,
                required,
                BufferUsage::STORAGE | BufferUsage::COPY_DST,
            )
            .with_label(format!("SkinCacheTangentStaging{}", self.current));
            let buffer = device.create_buffer(&desc)?;
            log::debug!(
                "StagingPool: slot {} grown to {} bytes",
                self.current,
                buffer.size()
            );
            *slot = Some(TrackedBuffer::new(buffer));
        }

        match slot.as_mut() {
            Some(buffer) => Ok(StagingLease {
                buffer,
                needs_clear: too_small,
            }),
            None => Err(GraphicsError::Internal(
                "staging slot empty after allocation".to_string(),
            )),
        }
    }

    /// Frees every staging buffer, keeping the depth.
    pub fn release_all(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.current = 0;
    }

    /// Bytes held by the pool.
    pub fn total_bytes(&self) -> u64 {
        self.slots
            .iter()
            .flatten()
            .map(|staging| staging.buffer().size())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduling_from_config() {
        let config = SkinCacheConfig::default().with_tangent_staging_depth(3);
        assert_eq!(
            TangentScheduling::from_config(&config),
            TangentScheduling::Interleaved { staging_depth: 3 }
        );
        let config = config.with_parallel_tangent_dispatch(true);
        assert!(TangentScheduling::from_config(&config).uses_entry_accumulation());
    }

    #[test]
    fn test_acquire_rotates_and_grows() {
        let device = GraphicsDevice::new("test", Default::default());
        let mut pool = StagingPool::new(2);

        let first = pool.acquire(&device, 100).unwrap();
        assert!(first.needs_clear);
        let first_id = first.buffer.id();

        let second = pool.acquire(&device, 100).unwrap();
        assert!(second.needs_clear);
        assert_ne!(second.buffer.id(), first_id);

        // Back to the first slot, large enough already.
        let again = pool.acquire(&device, 50).unwrap();
        assert!(!again.needs_clear);
        assert_eq!(again.buffer.id(), first_id);

        let grown = pool.acquire(&device, 1000).unwrap();
        assert!(grown.needs_clear);
        assert_eq!(pool.total_bytes(), 100 * 32 + 1000 * 32);
    }

    #[test]
    fn test_release_all_frees_buffers() {
        let device = GraphicsDevice::new("test", Default::default());
        let mut pool = StagingPool::new(1);
        pool.acquire(&device, 10).unwrap();
        assert_eq!(device.buffer_count(), 1);

        pool.release_all();
        assert_eq!(pool.total_bytes(), 0);
        assert_eq!(device.buffer_count(), 0);
        assert_eq!(pool.depth(), 1);
    }

    #[test]
    fn test_zero_depth_clamped() {
        let mut pool = StagingPool::new(0);
        assert_eq!(pool.depth(), 1);
        pool.resize(4);
        assert_eq!(pool.depth(), 4);
        pool.resize(1);
        assert_eq!(pool.depth(), 1);
    }
}
