//! Memory reports and per-frame statistics.

use std::fmt;

use crate::config::MB;
use crate::entry::{EntryHandle, EntryMode, EntryState, OwnerId};

/// Footprint of one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySummary {
    /// The entry.
    pub entry: EntryHandle,
    /// Its owner.
    pub owner: OwnerId,
    /// LOD.
    pub lod: u32,
    /// Raster or ray tracing.
    pub mode: EntryMode,
    /// Lifecycle state.
    pub state: EntryState,
    /// Sections in the LOD.
    pub sections: usize,
    /// Vertices covered.
    pub num_vertices: u32,
    /// Bytes charged to the budget.
    pub bytes: u64,
}

/// Snapshot of everything the cache holds.
#[derive(Debug, Clone, PartialEq)]
pub struct MemorySummary {
    /// Per-entry footprints, largest first.
    pub entries: Vec<EntrySummary>,
    /// Sum of the entry footprints.
    pub total_bytes: u64,
    /// Bytes the budget believes are in use. Always equal to `total_bytes`.
    pub used_bytes: u64,
    /// Budget limit.
    pub limit_bytes: u64,
    /// Bytes held by the tangent staging pool, outside the budget.
    pub staging_bytes: u64,
    /// Bytes rejected since the last report.
    pub extra_required_bytes: u64,
}

impl fmt::Display for MemorySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mb = |bytes: u64| bytes as f64 / MB;
        writeln!(
            f,
            "Skin cache: {} entries, {:.3} MB used of {:.3} MB, {:.3} MB staging",
            self.entries.len(),
            mb(self.used_bytes),
            mb(self.limit_bytes),
            mb(self.staging_bytes)
        )?;
        for entry in &self.entries {
            writeln!(
                f,
                "  {} lod {} {:?} {:?}: {} sections, {} vertices, {:.3} MB",
                entry.owner,
                entry.lod,
                entry.mode,
                entry.state,
                entry.sections,
                entry.num_vertices,
                mb(entry.bytes)
            )?;
        }
        if self.extra_required_bytes > 0 {
            writeln!(
                f,
                "  {:.3} MB more required to admit every request",
                mb(self.extra_required_bytes)
            )?;
        }
        Ok(())
    }
}

/// Counters of the last dispatched frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    /// Sections that recorded work.
    pub dispatched_sections: u32,
    /// Skinning dispatches recorded.
    pub skinning_dispatches: u32,
    /// Program binds.
    pub program_switches: u32,
    /// Sections whose tangents were rebuilt.
    pub tangent_sections: u32,
    /// Sections served entirely from cached slots.
    pub revision_hits: u32,
    /// Entries skipped because a program was not ready.
    pub aborted_entries: u32,
    /// Ray-tracing entries updated.
    pub ray_tracing_entries: u32,
    /// Live entries at the end of the frame.
    pub entries: u32,
    /// Bytes in use at the end of the frame.
    pub used_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use skincache_core::Handle;

    #[test]
    fn test_summary_display() {
        let summary = MemorySummary {
            entries: vec![EntrySummary {
                entry: Handle::from_raw_parts(0, 0),
                owner: OwnerId(3),
                lod: 1,
                mode: EntryMode::Raster,
                state: EntryState::Active,
                sections: 2,
                num_vertices: 100,
                bytes: 1024 * 1024,
            }],
            total_bytes: 1024 * 1024,
            used_bytes: 1024 * 1024,
            limit_bytes: 4 * 1024 * 1024,
            staging_bytes: 0,
            extra_required_bytes: 512 * 1024,
        };
        let text = summary.to_string();
        assert!(text.contains("1 entries, 1.000 MB used of 4.000 MB"));
        assert!(text.contains("owner#3 lod 1"));
        assert!(text.contains("0.500 MB more required"));
    }
}
