//! Graphics device.
//!
//! The [`GraphicsDevice`] is the interface for creating GPU buffers and
//! submitting recorded command lists. This implementation performs no GPU
//! work: it validates and tracks resources, and retires readbacks after a
//! fixed frame latency, which is enough to drive the skin cache end to end.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use parking_lot::Mutex;
use skincache_core::profiling::profile_scope;

use crate::command::{Command, CommandList, CommandRecorder};
use crate::error::GraphicsError;
use crate::resources::{Buffer, BufferId, Readback};
use crate::types::{BufferDescriptor, PixelFormat};

/// Capabilities of a graphics device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceCapabilities {
    /// Maximum buffer size.
    pub max_buffer_size: u64,
    /// Total bytes the device will hand out before reporting out-of-memory.
    pub memory_limit: Option<u64>,
    /// Whether compute shaders are supported.
    pub compute_shaders: bool,
    /// Whether a separate async-compute queue exists.
    pub async_compute: bool,
    /// Whether ray tracing is supported.
    pub ray_tracing: bool,
    /// Whether compute shaders can write `R16G16B16A16_SNORM` buffers.
    ///
    /// False on GLES-class platforms, which fall back to a packed SINT format.
    pub snorm16_storage_writes: bool,
    /// Frames between recording a readback and its data becoming available.
    pub readback_latency_frames: u32,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            max_buffer_size: 1 << 30, // 1 GB
            memory_limit: None,
            compute_shaders: true,
            async_compute: true,
            ray_tracing: false,
            snorm16_storage_writes: true,
            readback_latency_frames: 2,
        }
    }
}

impl DeviceCapabilities {
    /// Returns true if compute shaders can write buffers of `format`.
    pub fn supports_storage_format(&self, format: PixelFormat) -> bool {
        match format {
            PixelFormat::Rgba16Snorm => self.snorm16_storage_writes,
            _ => true,
        }
    }
}

struct PendingReadback {
    readback: Readback,
    frames_left: u32,
}

/// A graphics device for creating GPU resources.
///
/// # Thread Safety
///
/// `GraphicsDevice` is `Send + Sync` and can be safely shared across threads.
///
/// # Example
///
/// ```
/// use skincache_graphics::{BufferDescriptor, BufferUsage, GraphicsDevice};
///
/// let device = GraphicsDevice::new("test", Default::default());
/// let buffer = device.create_buffer(&BufferDescriptor::new(256, BufferUsage::STORAGE)).unwrap();
/// assert_eq!(device.buffer_count(), 1);
/// drop(buffer);
/// assert_eq!(device.buffer_count(), 0);
/// ```
pub struct GraphicsDevice {
    name: String,
    capabilities: DeviceCapabilities,
    next_buffer_id: AtomicU64,
    // Weak references so dropping a buffer frees it without device involvement.
    buffers: RwLock<Vec<Weak<Buffer>>>,
    pending_readbacks: Mutex<Vec<PendingReadback>>,
    submitted_lists: AtomicU64,
}

impl GraphicsDevice {
    /// Create a new device.
    pub fn new(name: impl Into<String>, capabilities: DeviceCapabilities) -> Arc<Self> {
        let name = name.into();
        log::debug!("GraphicsDevice: created '{name}' with {capabilities:?}");
        Arc::new(Self {
            name,
            capabilities,
            next_buffer_id: AtomicU64::new(1),
            buffers: RwLock::new(Vec::new()),
            pending_readbacks: Mutex::new(Vec::new()),
            submitted_lists: AtomicU64::new(0),
        })
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the device capabilities.
    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    /// Create a GPU buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is zero or exceeds device limits, if the
    /// requested element format cannot be written by compute shaders, or if
    /// the device memory limit is exhausted.
    pub fn create_buffer(
        self: &Arc<Self>,
        descriptor: &BufferDescriptor,
    ) -> Result<Arc<Buffer>, GraphicsError> {
        if descriptor.size > self.capabilities.max_buffer_size {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer size {} exceeds maximum {}",
                descriptor.size, self.capabilities.max_buffer_size
            )));
        }

        if descriptor.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "buffer size cannot be zero".to_string(),
            ));
        }

        if let Some(format) = descriptor.format {
            if descriptor.usage.contains(crate::types::BufferUsage::STORAGE)
                && !self.capabilities.supports_storage_format(format)
            {
                return Err(GraphicsError::UnsupportedStorageFormat(format));
            }
        }

        if let Some(limit) = self.capabilities.memory_limit {
            let available = limit.saturating_sub(self.allocated_bytes());
            if descriptor.size > available {
                return Err(GraphicsError::OutOfMemory {
                    requested: descriptor.size,
                    available,
                });
            }
        }

        let id = BufferId(self.next_buffer_id.fetch_add(1, Ordering::Relaxed));
        let buffer = Arc::new(Buffer::new(id, Arc::downgrade(self), descriptor.clone()));

        if let Ok(mut buffers) = self.buffers.write() {
            buffers.retain(|weak| weak.strong_count() > 0);
            buffers.push(Arc::downgrade(&buffer));
        }

        log::trace!(
            "GraphicsDevice: created buffer {} {:?}, size={}",
            id,
            descriptor.label,
            descriptor.size
        );

        Ok(buffer)
    }

    /// Number of live buffers.
    pub fn buffer_count(&self) -> usize {
        self.buffers
            .read()
            .map(|buffers| buffers.iter().filter(|b| b.strong_count() > 0).count())
            .unwrap_or(0)
    }

    /// Sum of the sizes of all live buffers.
    pub fn allocated_bytes(&self) -> u64 {
        self.buffers
            .read()
            .map(|buffers| {
                buffers
                    .iter()
                    .filter_map(Weak::upgrade)
                    .map(|b| b.size())
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Returns true if the buffer with `id` is still alive.
    pub fn is_buffer_alive(&self, id: BufferId) -> bool {
        self.buffers
            .read()
            .map(|buffers| {
                buffers
                    .iter()
                    .filter_map(Weak::upgrade)
                    .any(|b| b.id() == id)
            })
            .unwrap_or(false)
    }

    /// Submit a recorded command list.
    ///
    /// Readbacks recorded on the list start their latency countdown here.
    pub fn submit(&self, list: CommandList) {
        profile_scope!("device_submit");
        let mut pending = self.pending_readbacks.lock();
        for command in list.commands() {
            if let Command::CopyToReadback(readback) = command {
                pending.push(PendingReadback {
                    readback: readback.clone(),
                    frames_left: self.capabilities.readback_latency_frames,
                });
            }
        }
        self.submitted_lists.fetch_add(1, Ordering::Relaxed);
        log::trace!(
            "GraphicsDevice: submitted {:?} list with {} commands",
            list.pipeline(),
            list.len()
        );
    }

    /// Number of command lists submitted so far.
    pub fn submitted_list_count(&self) -> u64 {
        self.submitted_lists.load(Ordering::Relaxed)
    }

    /// Advance the GPU timeline by one frame, retiring due readbacks.
    pub fn end_frame(&self) {
        profile_scope!("device_end_frame");
        let mut pending = self.pending_readbacks.lock();
        pending.retain_mut(|entry| {
            if entry.frames_left > 1 {
                entry.frames_left -= 1;
                return true;
            }
            // No real GPU behind this device; the copy yields zeroed memory.
            entry
                .readback
                .complete(vec![0; entry.readback.byte_count() as usize]);
            false
        });
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .field("buffer_count", &self.buffer_count())
            .finish()
    }
}

static_assertions::assert_impl_all!(GraphicsDevice: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandRecorder, Pipeline};
    use crate::types::BufferUsage;

    fn device() -> Arc<GraphicsDevice> {
        GraphicsDevice::new("test", DeviceCapabilities::default())
    }

    #[test]
    fn test_zero_size_buffer_rejected() {
        let err = device()
            .create_buffer(&BufferDescriptor::new(0, BufferUsage::STORAGE))
            .unwrap_err();
        assert!(matches!(err, GraphicsError::InvalidParameter(_)));
    }

    #[test]
    fn test_memory_limit_reports_out_of_memory() {
        let device = GraphicsDevice::new(
            "small",
            DeviceCapabilities {
                memory_limit: Some(100),
                ..Default::default()
            },
        );
        let _a = device
            .create_buffer(&BufferDescriptor::new(60, BufferUsage::STORAGE))
            .unwrap();
        let err = device
            .create_buffer(&BufferDescriptor::new(60, BufferUsage::STORAGE))
            .unwrap_err();
        assert_eq!(
            err,
            GraphicsError::OutOfMemory {
                requested: 60,
                available: 40
            }
        );
    }

    #[test]
    fn test_snorm16_storage_needs_capability() {
        let device = GraphicsDevice::new(
            "gles",
            DeviceCapabilities {
                snorm16_storage_writes: false,
                ..Default::default()
            },
        );
        let desc = BufferDescriptor::typed(PixelFormat::Rgba16Snorm, 4, BufferUsage::STORAGE);
        assert!(matches!(
            device.create_buffer(&desc),
            Err(GraphicsError::UnsupportedStorageFormat(PixelFormat::Rgba16Snorm))
        ));
    }

    #[test]
    fn test_buffer_tracking() {
        let device = device();
        let a = device
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::STORAGE))
            .unwrap();
        let b = device
            .create_buffer(&BufferDescriptor::new(32, BufferUsage::STORAGE))
            .unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(device.allocated_bytes(), 48);

        let a_id = a.id();
        drop(a);
        assert!(!device.is_buffer_alive(a_id));
        assert!(device.is_buffer_alive(b.id()));
        assert_eq!(device.buffer_count(), 1);
    }

    #[test]
    fn test_readback_retires_after_latency() {
        let device = device();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::COPY_SRC))
            .unwrap();

        let mut list = CommandList::new(Pipeline::Graphics);
        let readback = list.copy_to_readback(&buffer, 64);
        device.submit(list);

        device.end_frame();
        assert!(!readback.is_ready());
        device.end_frame();
        assert!(readback.is_ready());
        assert_eq!(readback.take_data().map(|d| d.len()), Some(64));
    }
}
