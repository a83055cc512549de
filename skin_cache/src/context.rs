//! The cache context: entry registry, budget, batch and staging pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use skincache_core::Arena;
use skincache_core::profiling::profile_function;
use skincache_graphics::{Buffer, BufferUsage, GraphicsDevice, ProgramLibrary};

use crate::batch::{BatchItem, DispatchBatch};
use crate::budget::{Admission, MemoryBudget};
use crate::buffer_set::{BufferSet, BufferSetLayout, select_tangent_format};
use crate::config::{MemorySummaryMode, SkinCacheConfig};
use crate::entry::{
    CacheEntry, EntryHandle, EntryMode, EntryState, FallbackFn, OwnerId, SectionState,
};
use crate::error::SkinCacheError;
use crate::mesh::{ClothInput, MeshLod, MorphInput, SkinType, SkinningSource};
use crate::readback::{ReadbackCallback, ReadbackKind, ReadbackQueue};
use crate::summary::{EntrySummary, FrameStats, MemorySummary};
use crate::tangents::{StagingPool, TangentScheduling};

/// Shared flush request counter.
///
/// Anything holding a clone can request a flush. The context compares the
/// epoch on every [`CacheContext::process_entry`] and invalidates all
/// entries when it moved.
#[derive(Debug, Clone, Default)]
pub struct FlushSignal {
    epoch: Arc<AtomicU64>,
}

impl FlushSignal {
    /// A signal at epoch zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a flush.
    pub fn flush(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Number of flushes requested so far.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }
}

/// One section update submitted by a producer.
#[derive(Debug, Clone)]
pub struct SkinRequest<'a> {
    /// Mesh instance.
    pub owner: OwnerId,
    /// LOD being rendered.
    pub lod: &'a MeshLod,
    /// Section within the LOD.
    pub section: u32,
    /// Source streams and bones.
    pub source: SkinningSource,
    /// Output consumer.
    pub mode: EntryMode,
    /// Morph deltas, if any section of the LOD is morphed.
    pub morph: Option<MorphInput>,
    /// Cloth simulation to blend in.
    pub cloth: Option<ClothInput>,
    /// The producer recreated its bone buffers since the last request.
    pub recreating: bool,
}

impl<'a> SkinRequest<'a> {
    /// A raster request with bones only.
    pub fn new(owner: OwnerId, lod: &'a MeshLod, section: u32, source: SkinningSource) -> Self {
        Self {
            owner,
            lod,
            section,
            source,
            mode: EntryMode::Raster,
            morph: None,
            cloth: None,
            recreating: false,
        }
    }

    /// Skin for ray-tracing geometry instead of rasterization.
    pub fn ray_tracing(mut self) -> Self {
        self.mode = EntryMode::RayTracing;
        self
    }

    /// Apply morph deltas.
    pub fn with_morph(mut self, morph: MorphInput) -> Self {
        self.morph = Some(morph);
        self
    }

    /// Blend simulated cloth.
    pub fn with_cloth(mut self, cloth: ClothInput) -> Self {
        self.cloth = Some(cloth);
        self
    }

    /// Mark the bone buffers as recreated since the previous request.
    pub fn recreating(mut self) -> Self {
        self.recreating = true;
        self
    }

    fn skin_type(&self) -> SkinType {
        if self.cloth.is_some() {
            SkinType::Cloth
        } else if self
            .morph
            .as_ref()
            .is_some_and(|morph| morph.sections.contains(&self.section))
        {
            SkinType::Morph
        } else {
            SkinType::Normal
        }
    }
}

/// Whether cache output may be read this frame.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FrameGate {
    pub(crate) async_in_flight: bool,
    pub(crate) wait_added: bool,
}

/// Owns every cache entry of one scene.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use skincache::{CacheContext, SkinCacheConfig};
/// use skincache_graphics::{GraphicsDevice, ProgramLibrary};
///
/// let device = GraphicsDevice::new("scene", Default::default());
/// let cache = CacheContext::new(device, Arc::new(ProgramLibrary::new()), SkinCacheConfig::default());
/// assert_eq!(cache.used_memory_bytes(), 0);
/// ```
pub struct CacheContext {
    pub(crate) device: Arc<GraphicsDevice>,
    pub(crate) programs: Arc<ProgramLibrary>,
    pub(crate) config: SkinCacheConfig,
    pub(crate) entries: Arena<CacheEntry>,
    pub(crate) budget: MemoryBudget,
    pub(crate) batch: DispatchBatch,
    pub(crate) staging: StagingPool,
    pub(crate) pending_clears: Vec<EntryHandle>,
    pub(crate) pending_ray_tracing: Vec<EntryHandle>,
    pub(crate) readbacks: ReadbackQueue,
    pub(crate) flush: FlushSignal,
    pub(crate) seen_flush_epoch: u64,
    pub(crate) transition_fence: u64,
    pub(crate) gate: FrameGate,
    pub(crate) stats: FrameStats,
}

static_assertions::assert_impl_all!(CacheContext: Send);

impl CacheContext {
    /// Create an empty cache.
    pub fn new(
        device: Arc<GraphicsDevice>,
        programs: Arc<ProgramLibrary>,
        config: SkinCacheConfig,
    ) -> Self {
        let config = config.validated();
        log::info!(
            "CacheContext: created on '{}' with {:.1} MB budget",
            device.name(),
            config.memory_limit_mb
        );
        Self {
            budget: MemoryBudget::new(config.memory_limit_bytes(), config.requires_memory_limit),
            staging: StagingPool::new(config.effective_staging_depth()),
            device,
            programs,
            config,
            entries: Arena::new(),
            batch: DispatchBatch::new(),
            pending_clears: Vec::new(),
            pending_ray_tracing: Vec::new(),
            readbacks: ReadbackQueue::default(),
            flush: FlushSignal::new(),
            seen_flush_epoch: 0,
            transition_fence: 0,
            gate: FrameGate::default(),
            stats: FrameStats::default(),
        }
    }

    /// Live configuration.
    pub fn config(&self) -> &SkinCacheConfig {
        &self.config
    }

    /// Device the cache allocates from.
    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    /// Program readiness the cache checks before dispatching.
    pub fn programs(&self) -> &Arc<ProgramLibrary> {
        &self.programs
    }

    /// Replaces the configuration.
    ///
    /// Changes to settings that shape buffers or the budget request a flush,
    /// applied on the next [`process_entry`](Self::process_entry).
    pub fn apply_config(&mut self, config: SkinCacheConfig) {
        let config = config.validated();
        let flush = self.config.requires_flush(&config);
        self.budget
            .set_limit(config.memory_limit_bytes(), config.requires_memory_limit);
        self.staging.resize(config.effective_staging_depth());
        self.config = config;
        if flush {
            log::info!("CacheContext: configuration changed, flushing all entries");
            self.flush.flush();
        }
    }

    /// A handle other systems can use to request a flush.
    pub fn flush_signal(&self) -> FlushSignal {
        self.flush.clone()
    }

    /// Submits one section update.
    ///
    /// `entry` is the producer's slot for this (owner, LOD). It is filled on
    /// first admission and replaced when the cached entry no longer matches
    /// the request. Returns [`Admission::Rejected`] without touching any
    /// dispatch state when the budget cannot hold a new entry.
    ///
    /// # Errors
    ///
    /// Fails on malformed input, a stale handle, a disabled cache, or when
    /// the device cannot create the buffers.
    pub fn process_entry(
        &mut self,
        entry: &mut Option<EntryHandle>,
        request: SkinRequest<'_>,
    ) -> Result<Admission, SkinCacheError> {
        profile_function!();
        if !self.config.enabled {
            return Err(SkinCacheError::Disabled);
        }
        self.check_flush();

        let lod = request.lod;
        if lod.sections.is_empty() || lod.num_vertices == 0 {
            return Err(SkinCacheError::InvalidLod { lod: lod.lod });
        }
        let desc = lod.section(request.section)?;
        desc.validate()?;

        if let Some(handle) = *entry {
            let existing = self
                .entries
                .get(handle)
                .ok_or(SkinCacheError::StaleHandle)?;
            if !existing.is_valid_for(request.owner, lod.lod, request.mode) {
                log::debug!(
                    "CacheContext: rebuilding entry of {} (lod {} -> {}, {:?})",
                    request.owner,
                    existing.lod,
                    lod.lod,
                    existing.state
                );
                self.release(entry);
            }
        }

        let handle = match *entry {
            Some(handle) => handle,
            None => {
                let (layout, sections) = self.entry_layout(lod, request.mode);
                let charge = match self.budget.try_reserve(layout.footprint_bytes()) {
                    Ok(charge) => charge,
                    Err(rejected) => {
                        if self.config.memory_summary == MemorySummaryMode::Off {
                            log::debug!(
                                "CacheContext: rejected {} ({} bytes over budget)",
                                request.owner,
                                layout.footprint_bytes()
                            );
                        } else {
                            log::warn!(
                                "CacheContext: rejected {} ({} bytes, {} of {} used)",
                                request.owner,
                                layout.footprint_bytes(),
                                self.budget.used_bytes(),
                                self.budget.limit_bytes()
                            );
                        }
                        return Ok(rejected);
                    }
                };
                let label = format!("{} LOD{}", request.owner, lod.lod);
                let extra_usage = match request.mode {
                    EntryMode::Raster => BufferUsage::empty(),
                    EntryMode::RayTracing => BufferUsage::ACCELERATION_STRUCTURE_INPUT,
                };
                let buffers = BufferSet::create(&self.device, layout, charge, &label, extra_usage)?;
                let handle = self.entries.insert(CacheEntry::new(
                    request.owner,
                    lod,
                    request.mode,
                    buffers,
                    sections,
                ));
                if layout.accumulated_vertices > 0 {
                    self.pending_clears.push(handle);
                }
                log::debug!(
                    "CacheContext: admitted {} as {:?} ({} bytes, {} used)",
                    label,
                    handle,
                    layout.footprint_bytes(),
                    self.budget.used_bytes()
                );
                *entry = Some(handle);
                handle
            }
        };

        let retag_policy = self.config.retag_policy;
        let skin_type = request.skin_type();
        let SkinRequest {
            section: section_index,
            source,
            morph,
            cloth,
            recreating,
            ..
        } = request;

        let cache_entry = self
            .entries
            .get_mut(handle)
            .ok_or(SkinCacheError::StaleHandle)?;
        let section_count = cache_entry.sections.len() as u32;
        let section = cache_entry
            .sections
            .get_mut(section_index as usize)
            .ok_or(SkinCacheError::InvalidSection {
                section: section_index,
                count: section_count,
            })?;

        let revision = source.current.revision;
        // An older request arriving after a newer one keeps the newer inputs.
        let stale = section.queued_revision.is_some_and(|queued| revision < queued);
        if stale {
            log::trace!(
                "CacheContext: section {section_index} already queued past revision {revision}"
            );
            return Ok(Admission::Admitted);
        }
        if section.setup_factory != Some(source.factory) {
            section.setup_factory = Some(source.factory);
            section.desc = desc.clone();
            section.refresh_influence();
        }
        section.skin_type = skin_type;
        section.morph = morph;
        section.cloth = cloth;
        if recreating {
            if let Some(slot) = section.tracker.update_previous_tag(
                retag_policy,
                source.previous.handle,
                source.previous.revision,
            ) {
                log::trace!("CacheContext: retagged {slot:?} after bone buffer recreation");
            }
        }

        section.source = Some(source);
        let newly_queued = section.queued_revision.replace(revision).is_none();

        cache_entry.state = EntryState::Active;
        cache_entry.queued = true;
        let ray_tracing = cache_entry.mode == EntryMode::RayTracing;

        if newly_queued {
            self.batch.push(BatchItem {
                entry: handle,
                section: section_index,
            });
        }
        if ray_tracing && !self.pending_ray_tracing.contains(&handle) {
            self.pending_ray_tracing.push(handle);
        }
        Ok(Admission::Admitted)
    }

    /// Buffer layout and fresh section states for a new entry.
    fn entry_layout(&self, lod: &MeshLod, mode: EntryMode) -> (BufferSetLayout, Vec<SectionState>) {
        let raster = mode == EntryMode::Raster;
        let parallel = TangentScheduling::from_config(&self.config).uses_entry_accumulation();
        let mut accumulated_vertices = 0;
        let mut intermediate_tangents = false;
        let mut sections = Vec::with_capacity(lod.sections.len());

        for desc in &lod.sections {
            let recompute = raster
                && lod.has_index_buffer
                && desc.num_triangles > 0
                && self.config.recompute_tangents.applies_to(desc.recompute_tangents);
            let mut state = SectionState::new(desc.clone(), recompute);
            if recompute {
                intermediate_tangents |= desc.tangent_mask_channel.is_some();
                if parallel {
                    state.accumulation_offset = Some(accumulated_vertices);
                    accumulated_vertices += desc.num_vertices;
                }
            }
            sections.push(state);
        }

        let layout = BufferSetLayout {
            num_vertices: lod.num_vertices,
            previous_positions: raster,
            intermediate_tangents,
            accumulated_vertices,
            tangent_format: select_tangent_format(
                self.device.capabilities(),
                lod.target_tangent_format,
            ),
        };
        (layout, sections)
    }

    fn check_flush(&mut self) {
        let epoch = self.flush.epoch();
        if epoch != self.seen_flush_epoch {
            self.seen_flush_epoch = epoch;
            self.invalidate_all();
        }
    }

    /// Marks every entry invalid and frees the staging pool.
    ///
    /// Invalidated entries keep their memory until their owner's next
    /// request rebuilds them or the owner releases them.
    pub fn invalidate_all(&mut self) {
        self.batch.clear();
        self.pending_ray_tracing.clear();
        for (_, entry) in self.entries.iter_mut() {
            entry.state = EntryState::Invalidated;
            entry.queued = false;
            for section in &mut entry.sections {
                section.queued_revision = None;
                section.tracker.reset();
            }
        }
        self.staging.release_all();
        log::debug!("CacheContext: invalidated {} entries", self.entries.len());
    }

    /// Removes every queued update of `handle`.
    pub fn dequeue(&mut self, handle: EntryHandle) {
        let removed = self.batch.remove_entry(handle);
        self.pending_ray_tracing.retain(|pending| *pending != handle);
        if let Some(entry) = self.entries.get_mut(handle) {
            for section in &mut entry.sections {
                section.queued_revision = None;
                section.tracker.discard_pending();
            }
            entry.queued = false;
        }
        if !removed.is_empty() {
            log::trace!("CacheContext: dequeued sections {removed:?} of {handle:?}");
        }
    }

    /// Releases the entry in `entry` and clears the slot.
    ///
    /// Pending updates are dequeued, the buffers are dropped and their bytes
    /// returned to the budget. An empty slot is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if the handle was already released.
    pub fn release(&mut self, entry: &mut Option<EntryHandle>) {
        let Some(handle) = entry.take() else {
            return;
        };
        assert!(
            self.entries.contains(handle),
            "skin cache entry released twice"
        );
        self.dequeue(handle);
        self.pending_clears.retain(|pending| *pending != handle);
        if let Some(mut removed) = self.entries.remove(handle) {
            removed.state = EntryState::Released;
            log::debug!(
                "CacheContext: released {:?} of {} ({} bytes)",
                handle,
                removed.owner,
                removed.buffers.footprint_bytes()
            );
        }
    }

    /// Replaces the weight streams of every section and re-derives their
    /// influence modes. Pending updates are dequeued.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle or a LOD other than the entry's.
    pub fn update_skin_weights(
        &mut self,
        handle: EntryHandle,
        lod: &MeshLod,
    ) -> Result<(), SkinCacheError> {
        let entry = self.entries.get(handle).ok_or(SkinCacheError::StaleHandle)?;
        if entry.lod != lod.lod || entry.sections.len() != lod.sections.len() {
            return Err(SkinCacheError::InvalidLod { lod: lod.lod });
        }
        self.dequeue(handle);
        if let Some(entry) = self.entries.get_mut(handle) {
            for (section, desc) in entry.sections.iter_mut().zip(&lod.sections) {
                section.desc.streams = desc.streams.clone();
                section.refresh_influence();
            }
        }
        Ok(())
    }

    /// Forgets every section's source so the next request sets it up again.
    /// Pending updates are dequeued.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle.
    pub fn reset_source(&mut self, handle: EntryHandle) -> Result<(), SkinCacheError> {
        if !self.entries.contains(handle) {
            return Err(SkinCacheError::StaleHandle);
        }
        self.dequeue(handle);
        if let Some(entry) = self.entries.get_mut(handle) {
            for section in &mut entry.sections {
                section.setup_factory = None;
                section.source = None;
            }
        }
        Ok(())
    }

    /// Installs the callback invoked when the entry's work is aborted.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle.
    pub fn set_fallback(
        &mut self,
        handle: EntryHandle,
        fallback: FallbackFn,
    ) -> Result<(), SkinCacheError> {
        let entry = self
            .entries
            .get_mut(handle)
            .ok_or(SkinCacheError::StaleHandle)?;
        entry.fallback = Some(fallback);
        Ok(())
    }

    fn assert_output_readable(&self) {
        assert!(
            !self.gate.async_in_flight || self.gate.wait_added,
            "skin cache output read before the async compute wait was added"
        );
    }

    /// A section that has been submitted since its entry was set up.
    fn section_state(&self, handle: EntryHandle, section: u32) -> Option<(&CacheEntry, &SectionState)> {
        let entry = self.entries.get(handle)?;
        let state = entry.sections.get(section as usize)?;
        state.source.as_ref()?;
        Some((entry, state))
    }

    /// Buffer holding this frame's skinned positions of `section`.
    ///
    /// `None` for a section that was never submitted, so the caller falls
    /// back to the unskinned mesh.
    ///
    /// # Panics
    ///
    /// Panics when the frame runs on the async pipe and the graphics timeline
    /// has not waited for it yet.
    pub fn position_buffer(&self, handle: EntryHandle, section: u32) -> Option<Arc<Buffer>> {
        self.assert_output_readable();
        let (entry, state) = self.section_state(handle, section)?;
        entry
            .buffers
            .position(state.current_slot)
            .map(|tracked| Arc::clone(tracked.buffer()))
    }

    /// Buffer holding last frame's positions of `section`. The current
    /// buffer for single-buffered entries.
    ///
    /// # Panics
    ///
    /// Same contract as [`position_buffer`](Self::position_buffer).
    pub fn previous_position_buffer(
        &self,
        handle: EntryHandle,
        section: u32,
    ) -> Option<Arc<Buffer>> {
        self.assert_output_readable();
        let (entry, state) = self.section_state(handle, section)?;
        let slot = if entry.buffers.has_previous_buffer() {
            state.previous_slot
        } else {
            state.current_slot
        };
        entry
            .buffers
            .position(slot)
            .map(|tracked| Arc::clone(tracked.buffer()))
    }

    /// Buffer holding the final tangents of `section`.
    ///
    /// # Panics
    ///
    /// Same contract as [`position_buffer`](Self::position_buffer).
    pub fn tangent_buffer(&self, handle: EntryHandle, section: u32) -> Option<Arc<Buffer>> {
        self.assert_output_readable();
        let (entry, _) = self.section_state(handle, section)?;
        Some(Arc::clone(entry.buffers.tangents().buffer()))
    }

    /// Queues a CPU copy of a section's output.
    ///
    /// The copy is recorded on the next dispatched frame and `callback` runs
    /// from [`poll_readbacks`](Self::poll_readbacks) once it completes.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle or an out-of-range section, and with
    /// [`SkinCacheError::NotCached`] for a section never submitted.
    pub fn request_readback(
        &mut self,
        handle: EntryHandle,
        section: u32,
        kind: ReadbackKind,
        callback: ReadbackCallback,
    ) -> Result<(), SkinCacheError> {
        let entry = self.entries.get(handle).ok_or(SkinCacheError::StaleHandle)?;
        let state = entry
            .sections
            .get(section as usize)
            .ok_or(SkinCacheError::InvalidSection {
                section,
                count: entry.sections.len() as u32,
            })?;
        if state.source.is_none() {
            return Err(SkinCacheError::NotCached);
        }
        let source = match kind {
            ReadbackKind::Positions => entry
                .buffers
                .position(state.current_slot)
                .ok_or(SkinCacheError::NotCached)?,
            ReadbackKind::Tangents => entry.buffers.tangents(),
        };
        self.readbacks.request(
            entry.owner,
            handle,
            section,
            kind,
            Arc::clone(source.buffer()),
            state.desc.base_vertex,
            state.desc.num_vertices,
            callback,
        );
        Ok(())
    }

    /// Runs callbacks of completed readbacks. Never blocks.
    pub fn poll_readbacks(&mut self) -> usize {
        self.readbacks.poll()
    }

    /// Returns and resets the bytes rejected since the last call, logging
    /// the memory summary as configured.
    pub fn take_extra_required_memory(&mut self) -> u64 {
        let extra = self.budget.extra_required_bytes();
        match self.config.memory_summary {
            MemorySummaryMode::Off => {}
            MemorySummaryMode::OnOverflow => {
                if extra > 0 {
                    log::warn!("{}", self.memory_summary());
                }
            }
            MemorySummaryMode::EveryFrame => log::info!("{}", self.memory_summary()),
        }
        self.budget.take_extra_required()
    }

    /// Per-entry footprints and totals.
    ///
    /// # Panics
    ///
    /// Panics if the entry footprints disagree with the budget.
    pub fn memory_summary(&self) -> MemorySummary {
        let mut entries: Vec<EntrySummary> = self
            .entries
            .iter()
            .map(|(handle, entry)| EntrySummary {
                entry: handle,
                owner: entry.owner,
                lod: entry.lod,
                mode: entry.mode,
                state: entry.state,
                sections: entry.sections.len(),
                num_vertices: entry.buffers.layout().num_vertices,
                bytes: entry.buffers.footprint_bytes(),
            })
            .collect();
        entries.sort_by(|a, b| b.bytes.cmp(&a.bytes));

        let total_bytes: u64 = entries.iter().map(|e| e.bytes).sum();
        assert_eq!(
            total_bytes,
            self.budget.used_bytes(),
            "skin cache memory accounting out of sync"
        );
        MemorySummary {
            entries,
            total_bytes,
            used_bytes: self.budget.used_bytes(),
            limit_bytes: self.budget.limit_bytes(),
            staging_bytes: self.staging.total_bytes(),
            extra_required_bytes: self.budget.extra_required_bytes(),
        }
    }

    /// Bytes charged to the budget.
    pub fn used_memory_bytes(&self) -> u64 {
        self.budget.used_bytes()
    }

    /// The budget.
    pub fn budget(&self) -> &MemoryBudget {
        &self.budget
    }

    /// Lifecycle state of `handle`. Released for handles that no longer resolve.
    pub fn entry_state(&self, handle: EntryHandle) -> EntryState {
        self.entries
            .get(handle)
            .map_or(EntryState::Released, |entry| entry.state)
    }

    /// Looks up a live entry.
    pub fn entry(&self, handle: EntryHandle) -> Option<&CacheEntry> {
        self.entries.get(handle)
    }

    /// Number of live entries.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Updates queued for the next dispatch, in submission order.
    pub fn queued_updates(&self) -> &[BatchItem] {
        self.batch.items()
    }

    /// Drains the ray-tracing entries whose geometry changed.
    pub fn take_pending_ray_tracing_updates(&mut self) -> Vec<EntryHandle> {
        std::mem::take(&mut self.pending_ray_tracing)
    }

    /// Counters of the last dispatched frame.
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Bytes held by the tangent staging pool.
    pub fn staging_bytes(&self) -> u64 {
        self.staging.total_bytes()
    }

    pub(crate) fn begin_frame_gate(&mut self, async_compute: bool) {
        self.gate = FrameGate {
            async_in_flight: async_compute,
            wait_added: false,
        };
    }

    pub(crate) fn mark_async_wait_added(&mut self) {
        self.gate.wait_added = true;
    }

    pub(crate) fn end_frame_gate(&mut self) -> FrameGate {
        std::mem::take(&mut self.gate)
    }
}

impl std::fmt::Debug for CacheContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheContext")
            .field("device", &self.device.name())
            .field("entries", &self.entries.len())
            .field("used_bytes", &self.budget.used_bytes())
            .field("queued", &self.batch.len())
            .field("readbacks", &self.readbacks.pending_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_signal_shared() {
        let signal = FlushSignal::new();
        let clone = signal.clone();
        clone.flush();
        clone.flush();
        assert_eq!(signal.epoch(), 2);
    }

    #[test]
    fn test_apply_config_requests_flush() {
        let device = GraphicsDevice::new("test", Default::default());
        let mut cache = CacheContext::new(
            device,
            Arc::new(ProgramLibrary::new()),
            SkinCacheConfig::default(),
        );
        let signal = cache.flush_signal();

        cache.apply_config(SkinCacheConfig::default().with_async_compute(true));
        assert_eq!(signal.epoch(), 0);

        cache.apply_config(SkinCacheConfig::default().with_memory_limit_mb(64.0));
        assert_eq!(signal.epoch(), 1);
        assert_eq!(cache.budget().limit_bytes(), 64 * 1024 * 1024);
    }

    #[test]
    fn test_empty_summary() {
        let device = GraphicsDevice::new("test", Default::default());
        let cache = CacheContext::new(
            device,
            Arc::new(ProgramLibrary::new()),
            SkinCacheConfig::default(),
        );
        let summary = cache.memory_summary();
        assert!(summary.entries.is_empty());
        assert_eq!(summary.total_bytes, 0);
    }
}
