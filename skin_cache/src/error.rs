//! Skin cache error types.

use std::fmt;

use skincache_core::task::TaskFailed;
use skincache_graphics::GraphicsError;

/// Errors returned by skin cache operations.
///
/// Running out of budget is not an error: admission reports it as
/// [`Admission::Rejected`](crate::Admission::Rejected).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkinCacheError {
    /// The GPU layer failed to create a resource. Not retried.
    Graphics(GraphicsError),
    /// The cache is disabled by configuration.
    Disabled,
    /// The section index is outside the LOD's section list.
    InvalidSection {
        /// Requested section.
        section: u32,
        /// Sections in the LOD.
        count: u32,
    },
    /// A section description is unusable (no vertices, no influence streams).
    InvalidDescriptor(String),
    /// The LOD has no render data.
    InvalidLod {
        /// Requested LOD.
        lod: u32,
    },
    /// The entry handle does not refer to a live entry.
    StaleHandle,
    /// The section was never admitted, so there is nothing to read back.
    NotCached,
    /// A frame task panicked or its result was already taken.
    Task(TaskFailed),
}

impl fmt::Display for SkinCacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Graphics(err) => write!(f, "graphics error: {err}"),
            Self::Disabled => write!(f, "skin cache is disabled"),
            Self::InvalidSection { section, count } => {
                write!(f, "section {section} out of range (LOD has {count} sections)")
            }
            Self::InvalidDescriptor(msg) => write!(f, "invalid section descriptor: {msg}"),
            Self::InvalidLod { lod } => write!(f, "LOD {lod} has no render data"),
            Self::StaleHandle => write!(f, "stale skin cache entry handle"),
            Self::NotCached => write!(f, "section is not cached"),
            Self::Task(err) => write!(f, "frame task failed: {err}"),
        }
    }
}

impl std::error::Error for SkinCacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Graphics(err) => Some(err),
            Self::Task(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GraphicsError> for SkinCacheError {
    fn from(err: GraphicsError) -> Self {
        Self::Graphics(err)
    }
}

impl From<TaskFailed> for SkinCacheError {
    fn from(err: TaskFailed) -> Self {
        Self::Task(err)
    }
}
