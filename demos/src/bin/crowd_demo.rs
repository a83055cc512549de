//! # Crowd Demo
//!
//! Runs the skin cache over a simulated crowd for a fixed number of frames
//! and logs per-frame counters and the final memory summary.
//!
//! ```bash
//! RUST_LOG=debug cargo run --bin crowd_demo -- --characters 64 --memory-limit-mb 8 --async-compute
//! ```

use clap::{Parser, ValueEnum};

use skincache::{MemorySummaryMode, RecomputeTangentsMode, SkinCacheConfig};
use skincache_core::WorkerPool;
use skincache_core::profiling::frame_mark;
use skincache_demos::crowd::{Crowd, CrowdParams};
use skincache_graphics::{DeviceCapabilities, GraphicsDevice};

/// Tangent recomputation selection for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum CliRecompute {
    /// Never recompute tangents.
    Off,
    /// Recompute tangents of every raster section.
    All,
    /// Recompute tangents of sections that opt in.
    #[default]
    #[value(name = "per-section")]
    PerSection,
}

impl From<CliRecompute> for RecomputeTangentsMode {
    fn from(value: CliRecompute) -> Self {
        match value {
            CliRecompute::Off => Self::Off,
            CliRecompute::All => Self::All,
            CliRecompute::PerSection => Self::PerSection,
        }
    }
}

/// When to log the memory summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum CliSummary {
    /// Never.
    #[default]
    Off,
    /// When a request was rejected.
    #[value(name = "on-overflow")]
    OnOverflow,
    /// Every frame.
    #[value(name = "every-frame")]
    EveryFrame,
}

impl From<CliSummary> for MemorySummaryMode {
    fn from(value: CliSummary) -> Self {
        match value {
            CliSummary::Off => Self::Off,
            CliSummary::OnOverflow => Self::OnOverflow,
            CliSummary::EveryFrame => Self::EveryFrame,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "crowd_demo", about = "Skin cache crowd simulation", version)]
struct Args {
    /// Frames to simulate.
    #[arg(long, default_value_t = 120)]
    frames: u32,

    /// Number of characters.
    #[arg(long, default_value_t = 32)]
    characters: u32,

    /// Vertices per section at LOD 0.
    #[arg(long, default_value_t = 2048)]
    vertices: u32,

    /// Sections per LOD.
    #[arg(long, default_value_t = 2)]
    sections: u32,

    /// Frames between LOD swaps (0 disables swapping).
    #[arg(long, default_value_t = 30)]
    lod_switch_interval: u32,

    /// Frames between position readbacks (0 disables readbacks).
    #[arg(long, default_value_t = 0)]
    readback_interval: u32,

    /// Skin cache memory budget in megabytes.
    #[arg(long, default_value_t = 128.0)]
    memory_limit_mb: f32,

    /// Do not enforce the memory budget.
    #[arg(long)]
    no_memory_limit: bool,

    /// Which sections recompute tangents.
    #[arg(long, value_enum, default_value_t = CliRecompute::PerSection)]
    recompute_tangents: CliRecompute,

    /// Run all triangle passes before all vertex passes.
    #[arg(long)]
    parallel_tangents: bool,

    /// Rotating staging buffers for interleaved tangent passes.
    #[arg(long, default_value_t = 1)]
    staging_depth: u32,

    /// Dispatch on the async-compute pipeline.
    #[arg(long)]
    async_compute: bool,

    /// When to log the memory summary.
    #[arg(long, value_enum, default_value_t = CliSummary::Off)]
    memory_summary: CliSummary,

    /// Worker threads (0 runs frame tasks inline).
    #[arg(long, default_value_t = 2)]
    threads: usize,

    /// Simulate a device without SNORM16 storage writes.
    #[arg(long)]
    no_snorm16: bool,
}

impl Args {
    fn config(&self) -> SkinCacheConfig {
        let mut config = SkinCacheConfig::default()
            .with_memory_limit_mb(self.memory_limit_mb)
            .with_recompute_tangents(self.recompute_tangents.into())
            .with_parallel_tangent_dispatch(self.parallel_tangents)
            .with_tangent_staging_depth(self.staging_depth)
            .with_async_compute(self.async_compute)
            .with_memory_summary(self.memory_summary.into());
        if self.no_memory_limit {
            config = config.without_memory_limit();
        }
        config
    }

    fn params(&self) -> CrowdParams {
        CrowdParams {
            characters: self.characters,
            vertices_per_section: self.vertices,
            sections: self.sections,
            lod_switch_interval: self.lod_switch_interval,
            readback_interval: self.readback_interval,
            async_compute: self.async_compute,
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    skincache::init();

    let args = Args::parse();
    log::debug!("crowd_demo: {args:?}");

    let device = GraphicsDevice::new(
        "crowd",
        DeviceCapabilities {
            snorm16_storage_writes: !args.no_snorm16,
            ..Default::default()
        },
    );
    let mut crowd = match Crowd::new(device, args.config(), args.params()) {
        Ok(crowd) => crowd,
        Err(err) => {
            log::error!("crowd_demo: failed to create crowd: {err}");
            std::process::exit(1);
        }
    };

    let pool = if args.threads == 0 {
        WorkerPool::inline()
    } else {
        WorkerPool::new(args.threads)
    };

    let mut totals = (0u64, 0u64, 0u64);
    for _ in 0..args.frames {
        let report = match crowd.step(&pool) {
            Ok(report) => report,
            Err(err) => {
                log::error!("crowd_demo: frame {} failed: {err}", crowd.frame());
                std::process::exit(1);
            }
        };
        log::debug!(
            "frame {}: {} sections on {}, {} dispatches, {} hits, {} rejected",
            crowd.frame(),
            report.stats.dispatched_sections,
            report.pipeline.name(),
            report.stats.skinning_dispatches,
            report.stats.revision_hits,
            report.rejected_sections
        );
        totals.0 += u64::from(report.stats.skinning_dispatches);
        totals.1 += u64::from(report.stats.tangent_sections);
        totals.2 += u64::from(report.rejected_sections);
        frame_mark!();
    }

    log::info!("{}", crowd.cache().lock().memory_summary());
    log::info!(
        "crowd_demo: {} frames, {} skinning dispatches, {} tangent rebuilds, {} rejected sections",
        args.frames,
        totals.0,
        totals.1,
        totals.2
    );
    crowd.shutdown();
}
