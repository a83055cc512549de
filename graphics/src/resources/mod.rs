//! GPU resources.
//!
//! - [`Buffer`] - GPU memory buffer created by [`GraphicsDevice`]
//! - [`Readback`] - pending GPU→CPU copy of a buffer
//!
//! Resources are reference-counted with [`Arc`] and can be shared across threads.
//!
//! [`GraphicsDevice`]: crate::GraphicsDevice
//! [`Arc`]: std::sync::Arc

mod buffer;
mod readback;

pub use buffer::{Buffer, BufferId};
pub use readback::Readback;
