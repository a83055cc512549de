//! # Skin Cache Core
//!
//! Engine-agnostic building blocks shared by the skin cache crates:
//!
//! - [`handle`] : generational handles and the arena that issues them
//! - [`pool`] : per-frame scratch storage that keeps its allocation
//! - [`task`] : typed tasks, dependency edges and a worker pool
//! - [`math`] : vector aliases and fixed-point / SNORM encodings
//! - [`profiling`] : optional Tracy instrumentation

pub mod handle;
pub mod math;
pub mod pool;
pub mod profiling;
pub mod task;

pub use handle::{Arena, Handle};
pub use task::{Prerequisite, TaskFailed, TaskHandle, WorkerPool};

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Logs the library version.
pub fn init() {
    log::info!("Skin cache core v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
