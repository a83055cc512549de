//! Skin cache configuration.
//!
//! [`SkinCacheConfig`] gathers the tunables an engine usually exposes as
//! console variables. Applying a config whose buffer-shaping fields differ from the live
//! one flushes the cache (see [`SkinCacheConfig::requires_flush`]).

use crate::revision::RetagPolicy;

/// Bytes in one megabyte, as used by the memory limit.
pub const MB: f64 = 1024.0 * 1024.0;

/// Which sections run the recompute-tangents passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecomputeTangentsMode {
    /// Never recompute tangents.
    Off,
    /// Recompute tangents for every raster section.
    All,
    /// Recompute tangents only for sections that opt in.
    #[default]
    PerSection,
}

impl RecomputeTangentsMode {
    /// Returns true if a section with the given opt-in flag recomputes tangents.
    pub fn applies_to(self, section_opt_in: bool) -> bool {
        match self {
            Self::Off => false,
            Self::All => true,
            Self::PerSection => section_opt_in,
        }
    }
}

/// When to log the memory summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemorySummaryMode {
    /// Never.
    #[default]
    Off,
    /// When an admission was rejected since the last report.
    OnOverflow,
    /// Every frame.
    EveryFrame,
}

/// Skin cache configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SkinCacheConfig {
    /// Master switch. A disabled cache admits nothing.
    pub enabled: bool,
    /// Memory budget for all cached buffers of one scene, in megabytes.
    pub memory_limit_mb: f32,
    /// Whether the memory budget is enforced.
    pub requires_memory_limit: bool,
    /// Which sections recompute tangents.
    pub recompute_tangents: RecomputeTangentsMode,
    /// Number of rotating staging buffers used by interleaved tangent passes.
    pub tangent_staging_depth: u32,
    /// Run all triangle passes before all vertex passes, using a per-entry
    /// accumulation buffer instead of the staging pool.
    pub parallel_tangent_dispatch: bool,
    /// Prefer the async-compute pipe when the device has one.
    pub async_compute: bool,
    /// When to log the memory summary.
    pub memory_summary: MemorySummaryMode,
    /// Threads per group of the skinning program.
    pub thread_group_size: u32,
    /// Threads per group of the recompute-tangents programs.
    pub tangent_thread_group_size: u32,
    /// How revision slots are retagged when upstream bone buffers are recreated.
    pub retag_policy: RetagPolicy,
}

impl Default for SkinCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            memory_limit_mb: 128.0,
            requires_memory_limit: true,
            recompute_tangents: RecomputeTangentsMode::PerSection,
            tangent_staging_depth: 1,
            parallel_tangent_dispatch: false,
            async_compute: false,
            memory_summary: MemorySummaryMode::Off,
            thread_group_size: 64,
            tangent_thread_group_size: 64,
            retag_policy: RetagPolicy::default(),
        }
    }
}

impl SkinCacheConfig {
    /// Set the memory budget in megabytes.
    pub fn with_memory_limit_mb(mut self, megabytes: f32) -> Self {
        self.memory_limit_mb = megabytes;
        self
    }

    /// Disable budget enforcement.
    pub fn without_memory_limit(mut self) -> Self {
        self.requires_memory_limit = false;
        self
    }

    /// Set the recompute-tangents mode.
    pub fn with_recompute_tangents(mut self, mode: RecomputeTangentsMode) -> Self {
        self.recompute_tangents = mode;
        self
    }

    /// Set the staging pool depth (clamped to at least one).
    pub fn with_tangent_staging_depth(mut self, depth: u32) -> Self {
        self.tangent_staging_depth = depth;
        self
    }

    /// Select parallel (`true`) or interleaved (`false`) tangent scheduling.
    pub fn with_parallel_tangent_dispatch(mut self, parallel: bool) -> Self {
        self.parallel_tangent_dispatch = parallel;
        self
    }

    /// Prefer the async-compute pipe.
    pub fn with_async_compute(mut self, enabled: bool) -> Self {
        self.async_compute = enabled;
        self
    }

    /// Set when the memory summary is logged.
    pub fn with_memory_summary(mut self, mode: MemorySummaryMode) -> Self {
        self.memory_summary = mode;
        self
    }

    /// Set the retag policy.
    pub fn with_retag_policy(mut self, policy: RetagPolicy) -> Self {
        self.retag_policy = policy;
        self
    }

    /// Enable or disable the cache.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Memory budget in bytes.
    pub fn memory_limit_bytes(&self) -> u64 {
        (f64::from(self.memory_limit_mb.max(0.0)) * MB) as u64
    }

    /// Staging depth with the lower bound applied.
    pub fn effective_staging_depth(&self) -> u32 {
        self.tangent_staging_depth.max(1)
    }

    /// Returns a copy with out-of-range values clamped.
    pub fn validated(mut self) -> Self {
        if self.tangent_staging_depth == 0 {
            log::warn!("SkinCacheConfig: tangent_staging_depth must be at least 1, using 1");
            self.tangent_staging_depth = 1;
        }
        if !self.memory_limit_mb.is_finite() || self.memory_limit_mb < 0.0 {
            log::warn!(
                "SkinCacheConfig: invalid memory_limit_mb {}, using 0",
                self.memory_limit_mb
            );
            self.memory_limit_mb = 0.0;
        }
        self.thread_group_size = self.thread_group_size.max(1);
        self.tangent_thread_group_size = self.tangent_thread_group_size.max(1);
        self
    }

    /// Returns true if switching from `self` to `other` must invalidate every entry.
    ///
    /// These fields decide buffer layouts or the budget, so live entries built
    /// under the old values cannot be reused.
    pub fn requires_flush(&self, other: &Self) -> bool {
        self.enabled != other.enabled
            || self.recompute_tangents != other.recompute_tangents
            || self.memory_limit_mb != other.memory_limit_mb
            || self.requires_memory_limit != other.requires_memory_limit
            || self.effective_staging_depth() != other.effective_staging_depth()
            || self.parallel_tangent_dispatch != other.parallel_tangent_dispatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SkinCacheConfig::default();
        assert_eq!(config.memory_limit_bytes(), 128 * 1024 * 1024);
        assert_eq!(config.recompute_tangents, RecomputeTangentsMode::PerSection);
        assert_eq!(config.effective_staging_depth(), 1);
        assert!(!config.parallel_tangent_dispatch);
    }

    #[test]
    fn test_staging_depth_clamped() {
        let config = SkinCacheConfig::default()
            .with_tangent_staging_depth(0)
            .validated();
        assert_eq!(config.tangent_staging_depth, 1);
    }

    #[test]
    fn test_recompute_mode_applies() {
        assert!(!RecomputeTangentsMode::Off.applies_to(true));
        assert!(RecomputeTangentsMode::All.applies_to(false));
        assert!(RecomputeTangentsMode::PerSection.applies_to(true));
        assert!(!RecomputeTangentsMode::PerSection.applies_to(false));
    }

    #[test]
    fn test_requires_flush() {
        let base = SkinCacheConfig::default();
        assert!(!base.requires_flush(&base.clone().with_memory_summary(MemorySummaryMode::EveryFrame)));
        assert!(base.requires_flush(&base.clone().with_memory_limit_mb(64.0)));
        assert!(base.requires_flush(&base.clone().with_recompute_tangents(RecomputeTangentsMode::Off)));
        assert!(base.requires_flush(&base.clone().with_tangent_staging_depth(3)));
        assert!(base.requires_flush(&base.clone().without_memory_limit()));
    }
}
