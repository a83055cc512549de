//! # Skin Cache Demos
//!
//! Frame-loop simulations that drive the skin cache without a window.
//!
//! ## Available Demos
//!
//! - `crowd_demo` - a crowd of skinned characters switching LODs under a
//!   memory budget, optionally on the async-compute pipeline

pub mod crowd;

/// Demos library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
