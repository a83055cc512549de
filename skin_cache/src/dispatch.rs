//! Per-frame dispatch: setup resolves revisions and sorts the batch, execute
//! records the GPU work.
//!
//! Recording order within a frame:
//! 1. clears of newly created accumulation buffers
//! 2. transitions of every skinning output to writable
//! 3. skinning dispatches, sorted by program variant
//! 4. transitions of skinned outputs read by tangent passes
//! 5. tangent passes, interleaved or parallel
//! 6. one transition per written buffer to readable
//! 7. readback copies

use skincache_core::profiling::{profile_plot, profile_scope};
use skincache_graphics::{
    BufferAccess, CommandRecorder, ComputeDispatch, ProgramId, Transition,
};

use crate::batch::{BatchItem, SkinTarget, SortedDispatch, coalesce_streams, sort_dispatches};
use crate::buffer_set::{BufferRole, BufferSet, TrackedBuffer};
use crate::config::MB;
use crate::context::CacheContext;
use crate::entry::{
    CacheEntry, DispatchPlan, EntryHandle, EntryMode, FallbackEvent, FallbackReason,
    PositionWrites, SectionState,
};
use crate::error::SkinCacheError;
use crate::mesh::{SkinType, SkinningSource};
use crate::revision::PositionSlot;
use crate::summary::FrameStats;
use crate::tangents::TangentScheduling;
use crate::variant::{tangent_triangle_program, tangent_vertex_program};

/// A section scheduled for this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedSection {
    /// Entry owning the section.
    pub entry: EntryHandle,
    /// Section index.
    pub section: u32,
    /// Work to record.
    pub plan: DispatchPlan,
}

/// Output of [`CacheContext::setup_frame`], consumed by
/// [`CacheContext::execute_frame`].
#[derive(Debug, Default)]
pub struct FrameSetup {
    sections: Vec<PlannedSection>,
    dispatches: Vec<SortedDispatch>,
    aborted_entries: u32,
    revision_hits: u32,
}

impl FrameSetup {
    /// Sections scheduled, in batch order.
    pub fn sections(&self) -> &[PlannedSection] {
        &self.sections
    }

    /// Skinning dispatches in recording order.
    pub fn dispatches(&self) -> &[SortedDispatch] {
        &self.dispatches
    }

    /// Returns true if nothing will be recorded.
    pub fn is_empty(&self) -> bool {
        self.dispatches.is_empty() && !self.sections.iter().any(|s| s.plan.recompute_tangents)
    }
}

/// Moves `buffer` to `after` unless it is already there.
fn push_transition(buffer: Option<&mut TrackedBuffer>, after: BufferAccess, out: &mut Vec<Transition>) {
    if let Some(buffer) = buffer {
        if buffer.access() != after {
            out.push(buffer.transition_to(after));
        }
    }
}

/// Tangent buffer the skinning pass writes.
///
/// Masked sections skin into the intermediate buffer so the vertex pass can
/// blend the skinned and recomputed tangents into the final one.
fn skinned_tangent_role(section: &SectionState, buffers: &BufferSet) -> BufferRole {
    if section.plan.recompute_tangents
        && section.desc.tangent_mask_channel.is_some()
        && buffers.intermediate_tangents().is_some()
    {
        BufferRole::IntermediateTangents
    } else {
        BufferRole::Tangents
    }
}

/// Resolves which slots to read and write from the revision tags.
fn plan_section(section: &mut SectionState, source: &SkinningSource, double_buffered: bool) -> DispatchPlan {
    let mut positions = PositionWrites::None;
    if double_buffered {
        let current = section
            .tracker
            .find(source.current.handle, source.current.revision);
        let previous = section
            .tracker
            .find(source.previous.handle, source.previous.revision);

        let current_slot = match current {
            Some(slot) if current != previous => slot,
            _ => {
                positions = positions.with_current();
                section.tracker.allocate_unused(
                    source.current.handle,
                    source.current.revision,
                    previous,
                )
            }
        };
        let previous_slot = match previous {
            Some(slot) => slot,
            None => {
                positions = positions.with_previous();
                section.tracker.allocate_unused(
                    source.previous.handle,
                    source.previous.revision,
                    Some(current_slot),
                )
            }
        };
        section.current_slot = current_slot;
        section.previous_slot = previous_slot;
    } else {
        positions = PositionWrites::Current;
        section.current_slot = PositionSlot::First;
        section.previous_slot = PositionSlot::First;
    }

    DispatchPlan {
        positions,
        recompute_tangents: positions.writes_current()
            && section.recompute_tangents
            && source.streams.indices.is_some(),
    }
}

/// Every program the section may bind this frame.
fn required_programs(entry: &CacheEntry, section: &SectionState) -> Vec<ProgramId> {
    let mut programs: Vec<ProgramId> = coalesce_streams(&section.desc.streams, section.skin_type)
        .iter()
        .map(|group| group.variant.program())
        .collect();
    if section.recompute_tangents {
        programs.push(tangent_triangle_program(
            entry.full_precision_uvs,
            section.desc.duplicated_vertices,
        ));
        programs.push(tangent_vertex_program(
            section.desc.tangent_mask_channel.is_some(),
        ));
    }
    programs
}

fn skinning_dispatch(
    entry: &CacheEntry,
    section: &SectionState,
    source: &SkinningSource,
    dispatch: &SortedDispatch,
    thread_group_size: u32,
) -> Option<ComputeDispatch> {
    let group = &dispatch.group;
    let (slot, bones) = match dispatch.target {
        SkinTarget::Current => (section.current_slot, &source.current),
        SkinTarget::Previous => (section.previous_slot, &source.previous),
    };
    let position = entry.buffers.position(slot)?;
    let start = section.desc.base_vertex + group.first_vertex;

    let mut compute = ComputeDispatch::new(
        group.variant.program(),
        group.num_vertices.div_ceil(thread_group_size),
    )
    .constant("SkinCacheStart", start)
    .constant("InputStreamStart", start)
    .constant("NumVertices", group.num_vertices)
    .bind("BoneMatrices", &bones.buffer, BufferAccess::ShaderRead)
    .bind("PositionInputBuffer", &source.streams.positions, BufferAccess::ShaderRead)
    .bind("InputWeightStream", &source.streams.weights, BufferAccess::ShaderRead)
    .bind("PositionBufferUAV", position.buffer(), BufferAccess::StorageWrite);

    if dispatch.target == SkinTarget::Current {
        let tangents = entry
            .buffers
            .get(skinned_tangent_role(section, &entry.buffers))?;
        compute = compute
            .bind("TangentInputBuffer", &source.streams.tangents, BufferAccess::ShaderRead)
            .bind("TangentBufferUAV", tangents.buffer(), BufferAccess::StorageWrite);
    }

    match (&section.morph, &section.cloth) {
        (_, Some(cloth)) => {
            compute = compute
                .bind("ClothBuffer", &cloth.mapping, BufferAccess::ShaderRead)
                .bind("ClothPositionsAndNormalsBuffer", &cloth.simulated, BufferAccess::ShaderRead)
                .constant("ClothBlendWeight", cloth.blend_weight.to_bits());
        }
        (Some(morph), None) if section.skin_type == SkinType::Morph => {
            compute = compute.bind("MorphBuffer", &morph.buffer, BufferAccess::ShaderRead);
        }
        _ => {}
    }
    Some(compute)
}

fn triangle_dispatch(
    entry: &CacheEntry,
    section: &SectionState,
    accumulator: &TrackedBuffer,
    accumulator_offset: u32,
    thread_group_size: u32,
) -> Option<ComputeDispatch> {
    let source = section.source.as_ref()?;
    let indices = source.streams.indices.as_ref()?;
    let positions = entry.buffers.position(section.current_slot)?;
    let tangents = entry.buffers.get(skinned_tangent_role(section, &entry.buffers))?;
    let program = tangent_triangle_program(entry.full_precision_uvs, section.desc.duplicated_vertices);

    Some(
        ComputeDispatch::new(program, section.desc.num_triangles.div_ceil(thread_group_size))
            .constant("NumTriangles", section.desc.num_triangles)
            .constant("IndexBufferOffset", section.desc.base_index)
            .constant("InputStreamStart", section.desc.base_vertex)
            .constant("SkinCacheStart", section.desc.base_vertex)
            .constant("IntermediateAccumBufferOffset", accumulator_offset)
            .bind("GPUPositionCacheBuffer", positions.buffer(), BufferAccess::ShaderRead)
            .bind("GPUTangentCacheBuffer", tangents.buffer(), BufferAccess::ShaderRead)
            .bind("IndexBuffer", indices, BufferAccess::ShaderRead)
            .bind("UVsInputBuffer", &source.streams.uvs, BufferAccess::ShaderRead)
            .bind("IntermediateAccumBufferUAV", accumulator.buffer(), BufferAccess::StorageReadWrite),
    )
}

fn vertex_dispatch(
    entry: &CacheEntry,
    section: &SectionState,
    accumulator: &TrackedBuffer,
    accumulator_offset: u32,
    thread_group_size: u32,
) -> ComputeDispatch {
    let mask = section.desc.tangent_mask_channel;
    let mut compute = ComputeDispatch::new(
        tangent_vertex_program(mask.is_some()),
        section.desc.num_vertices.div_ceil(thread_group_size),
    )
    .constant("NumVertices", section.desc.num_vertices)
    .constant("SkinCacheStart", section.desc.base_vertex)
    .constant("IntermediateAccumBufferOffset", accumulator_offset)
    .bind("IntermediateAccumBufferUAV", accumulator.buffer(), BufferAccess::StorageReadWrite)
    .bind("TangentBufferUAV", entry.buffers.tangents().buffer(), BufferAccess::StorageWrite);

    if let Some(channel) = mask {
        if let Some(intermediate) = entry.buffers.intermediate_tangents() {
            compute = compute
                .constant("VertexColorChannel", channel.index())
                .bind("IntermediateTangentBuffer", intermediate.buffer(), BufferAccess::ShaderRead);
        }
        if let Some(colors) = section.source.as_ref().and_then(|s| s.streams.colors.as_ref()) {
            compute = compute.bind("ColorInputBuffer", colors, BufferAccess::ShaderRead);
        }
    }
    compute
}

/// Binds `program` unless it is already bound.
fn bind_program(recorder: &mut dyn CommandRecorder, bound: &mut Option<ProgramId>, program: ProgramId) {
    if *bound != Some(program) {
        recorder.set_program(program);
        *bound = Some(program);
    }
}

impl CacheContext {
    /// Resolves this frame's work from the queued updates.
    ///
    /// Entries needing a program that is still compiling are skipped, their
    /// fallback is called, and their updates stay queued for the next frame.
    pub fn setup_frame(&mut self) -> FrameSetup {
        profile_scope!("skin_cache_setup");
        let items: Vec<BatchItem> = self.batch.items().to_vec();
        self.batch.clear();

        let mut aborted: Vec<(EntryHandle, ProgramId)> = Vec::new();
        for item in &items {
            if aborted.iter().any(|(handle, _)| *handle == item.entry) {
                continue;
            }
            let Some(entry) = self.entries.get(item.entry) else {
                continue;
            };
            let Some(section) = entry.sections.get(item.section as usize) else {
                continue;
            };
            let unready = required_programs(entry, section)
                .into_iter()
                .find(|program| !self.programs.is_ready(program));
            if let Some(program) = unready {
                aborted.push((item.entry, program));
            }
        }
        for (handle, program) in &aborted {
            if let Some(entry) = self.entries.get_mut(*handle) {
                let owner = entry.owner;
                log::debug!("CacheContext: {owner} waits for {program}, using fallback");
                entry.report_fallback(FallbackEvent {
                    entry: *handle,
                    owner,
                    reason: FallbackReason::ProgramNotReady(*program),
                });
            }
        }

        let mut setup = FrameSetup {
            aborted_entries: aborted.len() as u32,
            ..Default::default()
        };

        for item in items {
            if aborted.iter().any(|(handle, _)| *handle == item.entry) {
                // Retried next frame.
                self.batch.push(item);
                continue;
            }
            let Some(entry) = self.entries.get_mut(item.entry) else {
                continue;
            };
            let double_buffered = entry.buffers.has_previous_buffer();
            entry.queued = false;
            let Some(section) = entry.sections.get_mut(item.section as usize) else {
                continue;
            };
            section.queued_revision = None;
            let Some(source) = section.source.clone() else {
                continue;
            };

            let plan = plan_section(section, &source, double_buffered);
            section.plan = plan;
            if plan.is_empty() {
                setup.revision_hits += 1;
                continue;
            }

            let batch_index = setup.sections.len() as u32;
            for group in coalesce_streams(&section.desc.streams, section.skin_type) {
                let key = group.variant.key();
                if plan.positions.writes_current() {
                    setup.dispatches.push(SortedDispatch {
                        key,
                        batch_index,
                        group,
                        target: SkinTarget::Current,
                    });
                }
                if plan.positions.writes_previous() {
                    setup.dispatches.push(SortedDispatch {
                        key,
                        batch_index,
                        group,
                        target: SkinTarget::Previous,
                    });
                }
            }
            setup.sections.push(PlannedSection {
                entry: item.entry,
                section: item.section,
                plan,
            });
        }
        sort_dispatches(&mut setup.dispatches);

        log::trace!(
            "CacheContext: setup {} sections, {} dispatches, {} hits, {} aborted",
            setup.sections.len(),
            setup.dispatches.len(),
            setup.revision_hits,
            setup.aborted_entries
        );
        setup
    }

    /// Records the work resolved by [`setup_frame`](Self::setup_frame).
    ///
    /// Entries released since setup are skipped.
    ///
    /// # Errors
    ///
    /// Fails if a tangent staging buffer cannot be created. Slots chosen for
    /// this frame are then untagged so the next frame skins them again.
    pub fn execute_frame(
        &mut self,
        setup: FrameSetup,
        recorder: &mut dyn CommandRecorder,
    ) -> Result<FrameStats, SkinCacheError> {
        profile_scope!("skin_cache_execute");
        recorder.push_marker("SkinCache");

        self.record_clears(recorder);
        // Resolved at record time: entries released after setup are skipped.
        let skinning = self.skinning_transitions(&setup.sections);
        recorder.transition(&skinning);

        let mut bound: Option<ProgramId> = None;
        let mut skinning_dispatches = 0;
        let mut program_switches = 0;
        for dispatch in &setup.dispatches {
            let planned = setup.sections[dispatch.batch_index as usize];
            let Some(entry) = self.entries.get(planned.entry) else {
                continue;
            };
            let section = &entry.sections[planned.section as usize];
            let Some(source) = section.source.as_ref() else {
                continue;
            };
            let Some(compute) =
                skinning_dispatch(entry, section, source, dispatch, self.config.thread_group_size)
            else {
                continue;
            };
            if bound != Some(compute.program) {
                program_switches += 1;
            }
            bind_program(recorder, &mut bound, compute.program);
            recorder.dispatch(compute);
            skinning_dispatches += 1;
        }

        let recompute = self.recompute_transitions(&setup.sections);
        recorder.transition(&recompute);
        let tangent_sections = match self.record_tangent_passes(&setup, recorder) {
            Ok(count) => count,
            Err(err) => {
                recorder.pop_marker();
                for planned in &setup.sections {
                    if let Some(entry) = self.entries.get_mut(planned.entry) {
                        entry.sections[planned.section as usize].tracker.discard_pending();
                    }
                }
                log::error!("CacheContext: tangent pass failed: {err}");
                return Err(err);
            }
        };

        self.record_final_transitions(&setup, recorder);
        self.readbacks.record(recorder);
        recorder.pop_marker();

        let mut ray_tracing: Vec<EntryHandle> = Vec::new();
        for planned in &setup.sections {
            if let Some(entry) = self.entries.get_mut(planned.entry) {
                entry.sections[planned.section as usize].tracker.commit_pending();
                if entry.mode == EntryMode::RayTracing && !ray_tracing.contains(&planned.entry) {
                    ray_tracing.push(planned.entry);
                }
            }
        }

        self.stats = FrameStats {
            dispatched_sections: setup.sections.len() as u32,
            skinning_dispatches,
            program_switches,
            tangent_sections,
            revision_hits: setup.revision_hits,
            aborted_entries: setup.aborted_entries,
            ray_tracing_entries: ray_tracing.len() as u32,
            entries: self.entries.len() as u32,
            used_bytes: self.budget.used_bytes(),
        };
        profile_plot!("skin_cache_used_mb", self.stats.used_bytes as f64 / MB);
        profile_plot!("skin_cache_dispatches", self.stats.skinning_dispatches);
        profile_plot!("skin_cache_entries", self.stats.entries);
        Ok(self.stats)
    }

    /// Runs setup and execute back to back on the calling thread.
    ///
    /// # Errors
    ///
    /// See [`execute_frame`](Self::execute_frame).
    pub fn dispatch_now(
        &mut self,
        recorder: &mut dyn CommandRecorder,
    ) -> Result<FrameStats, SkinCacheError> {
        let setup = self.setup_frame();
        self.execute_frame(setup, recorder)
    }

    /// Moves every skinning output of live planned sections to writable.
    fn skinning_transitions(&mut self, sections: &[PlannedSection]) -> Vec<Transition> {
        let mut out = Vec::new();
        for planned in sections {
            let Some(entry) = self.entries.get_mut(planned.entry) else {
                continue;
            };
            let Some(section) = entry.sections.get(planned.section as usize) else {
                continue;
            };
            let writes = planned.plan.positions;
            if writes.writes_current() {
                let role = skinned_tangent_role(section, &entry.buffers);
                let slot = section.current_slot;
                push_transition(entry.buffers.get_mut(BufferRole::Position(slot)), BufferAccess::StorageWrite, &mut out);
                push_transition(entry.buffers.get_mut(role), BufferAccess::StorageWrite, &mut out);
            }
            if writes.writes_previous() {
                let slot = section.previous_slot;
                push_transition(entry.buffers.get_mut(BufferRole::Position(slot)), BufferAccess::StorageWrite, &mut out);
            }
        }
        out
    }

    /// Moves the skinned outputs read by tangent passes to readable.
    fn recompute_transitions(&mut self, sections: &[PlannedSection]) -> Vec<Transition> {
        let mut out = Vec::new();
        for planned in sections.iter().filter(|p| p.plan.recompute_tangents) {
            let Some(entry) = self.entries.get_mut(planned.entry) else {
                continue;
            };
            let Some(section) = entry.sections.get(planned.section as usize) else {
                continue;
            };
            let role = skinned_tangent_role(section, &entry.buffers);
            let slot = section.current_slot;
            push_transition(entry.buffers.get_mut(BufferRole::Position(slot)), BufferAccess::ShaderRead, &mut out);
            push_transition(entry.buffers.get_mut(role), BufferAccess::ShaderRead, &mut out);
        }
        out
    }

    fn record_clears(&mut self, recorder: &mut dyn CommandRecorder) {
        let pending = std::mem::take(&mut self.pending_clears);
        for handle in pending {
            let Some(entry) = self.entries.get_mut(handle) else {
                continue;
            };
            if let Some(buffer) = entry.buffers.get_mut(BufferRole::AccumulatedTangents) {
                let transition = buffer.transition_to(BufferAccess::TransferWrite);
                recorder.transition(&[transition]);
                recorder.clear_buffer(buffer.buffer(), 0);
            }
        }
    }

    fn record_tangent_passes(
        &mut self,
        setup: &FrameSetup,
        recorder: &mut dyn CommandRecorder,
    ) -> Result<u32, SkinCacheError> {
        let planned: Vec<PlannedSection> = setup
            .sections
            .iter()
            .filter(|p| p.plan.recompute_tangents)
            .copied()
            .collect();
        if planned.is_empty() {
            return Ok(0);
        }
        profile_scope!("skin_cache_recompute_tangents");
        let group_size = self.config.tangent_thread_group_size;
        let mut bound: Option<ProgramId> = None;
        let mut recorded = 0;

        match TangentScheduling::from_config(&self.config) {
            TangentScheduling::Interleaved { .. } => {
                for planned in &planned {
                    let Some(entry) = self.entries.get_mut(planned.entry) else {
                        continue;
                    };
                    let num_vertices = entry.sections[planned.section as usize].desc.num_vertices;
                    let lease = self.staging.acquire(&self.device, num_vertices)?;
                    if lease.needs_clear {
                        let transition = lease.buffer.transition_to(BufferAccess::TransferWrite);
                        recorder.transition(&[transition]);
                        recorder.clear_buffer(lease.buffer.buffer(), 0);
                    }
                    let mut before = Vec::new();
                    push_transition(Some(&mut *lease.buffer), BufferAccess::StorageReadWrite, &mut before);
                    recorder.transition(&before);

                    let section = &entry.sections[planned.section as usize];
                    let Some(triangles) = triangle_dispatch(entry, section, lease.buffer, 0, group_size)
                    else {
                        continue;
                    };
                    bind_program(recorder, &mut bound, triangles.program);
                    recorder.dispatch(triangles);

                    let mut between = vec![Transition::new(
                        lease.buffer.buffer(),
                        BufferAccess::StorageReadWrite,
                        BufferAccess::StorageReadWrite,
                    )];
                    push_transition(
                        entry.buffers.get_mut(BufferRole::Tangents),
                        BufferAccess::StorageWrite,
                        &mut between,
                    );
                    recorder.transition(&between);

                    let section = &entry.sections[planned.section as usize];
                    let vertices = vertex_dispatch(entry, section, lease.buffer, 0, group_size);
                    bind_program(recorder, &mut bound, vertices.program);
                    recorder.dispatch(vertices);
                    recorded += 1;
                }
            }
            TangentScheduling::Parallel => {
                let mut before = Vec::new();
                for planned in &planned {
                    if let Some(entry) = self.entries.get_mut(planned.entry) {
                        push_transition(
                            entry.buffers.get_mut(BufferRole::AccumulatedTangents),
                            BufferAccess::StorageReadWrite,
                            &mut before,
                        );
                    }
                }
                recorder.transition(&before);

                let mut ready: Vec<PlannedSection> = Vec::with_capacity(planned.len());
                for planned in &planned {
                    let Some(entry) = self.entries.get(planned.entry) else {
                        continue;
                    };
                    let section = &entry.sections[planned.section as usize];
                    let (Some(accumulator), Some(offset)) =
                        (entry.buffers.accumulated_tangents(), section.accumulation_offset)
                    else {
                        continue;
                    };
                    let Some(triangles) =
                        triangle_dispatch(entry, section, accumulator, offset, group_size)
                    else {
                        continue;
                    };
                    bind_program(recorder, &mut bound, triangles.program);
                    recorder.dispatch(triangles);
                    ready.push(*planned);
                }

                let mut between = Vec::new();
                let mut barriers = Vec::new();
                for planned in &ready {
                    let Some(entry) = self.entries.get_mut(planned.entry) else {
                        continue;
                    };
                    if let Some(accumulator) = entry.buffers.accumulated_tangents() {
                        if !barriers.contains(&accumulator.id()) {
                            barriers.push(accumulator.id());
                            between.push(Transition::new(
                                accumulator.buffer(),
                                BufferAccess::StorageReadWrite,
                                BufferAccess::StorageReadWrite,
                            ));
                        }
                    }
                    push_transition(
                        entry.buffers.get_mut(BufferRole::Tangents),
                        BufferAccess::StorageWrite,
                        &mut between,
                    );
                }
                recorder.transition(&between);

                for planned in &ready {
                    let Some(entry) = self.entries.get(planned.entry) else {
                        continue;
                    };
                    let section = &entry.sections[planned.section as usize];
                    let (Some(accumulator), Some(offset)) =
                        (entry.buffers.accumulated_tangents(), section.accumulation_offset)
                    else {
                        continue;
                    };
                    let vertices = vertex_dispatch(entry, section, accumulator, offset, group_size);
                    bind_program(recorder, &mut bound, vertices.program);
                    recorder.dispatch(vertices);
                    recorded += 1;
                }
            }
        }
        Ok(recorded)
    }

    /// Moves every buffer written this frame to readable, once per buffer.
    fn record_final_transitions(&mut self, setup: &FrameSetup, recorder: &mut dyn CommandRecorder) {
        self.transition_fence += 1;
        let fence = self.transition_fence;
        let mut finals = Vec::new();

        for planned in &setup.sections {
            let Some(entry) = self.entries.get_mut(planned.entry) else {
                continue;
            };
            let section = &entry.sections[planned.section as usize];
            let writes = planned.plan.positions;
            let mut roles = Vec::with_capacity(3);
            if writes.writes_current() {
                roles.push(BufferRole::Position(section.current_slot));
                roles.push(BufferRole::Tangents);
            }
            if writes.writes_previous() {
                roles.push(BufferRole::Position(section.previous_slot));
            }
            for role in roles {
                if let Some(buffer) = entry.buffers.get_mut(role) {
                    if buffer.update_fence(fence) && buffer.access() != BufferAccess::ShaderRead {
                        finals.push(buffer.transition_to(BufferAccess::ShaderRead));
                    }
                }
            }
        }
        recorder.transition(&finals);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skincache_core::Handle;
    use std::sync::Arc;

    use crate::mesh::{BoneBinding, SectionDesc, SkinWeightLayout, SourceStreams};
    use skincache_graphics::{BufferDescriptor, BufferUsage, GraphicsDevice};

    fn source(device: &Arc<GraphicsDevice>, current: u32, previous: u32) -> SkinningSource {
        let buffer = || {
            device
                .create_buffer(&BufferDescriptor::new(64, BufferUsage::SHADER_READ))
                .unwrap()
        };
        let bones = buffer();
        let binding = |revision| BoneBinding {
            handle: Handle::from_raw_parts(0, 0),
            revision,
            buffer: Arc::clone(&bones),
        };
        SkinningSource {
            factory: Handle::from_raw_parts(0, 0),
            streams: Arc::new(SourceStreams {
                positions: buffer(),
                tangents: buffer(),
                uvs: buffer(),
                weights: buffer(),
                indices: Some(buffer()),
                colors: None,
            }),
            current: binding(current),
            previous: binding(previous),
        }
    }

    fn section() -> SectionState {
        SectionState::new(SectionDesc::new(0, 10, SkinWeightLayout::default()), true)
    }

    #[test]
    fn test_first_frame_writes_both_slots() {
        let device = GraphicsDevice::new("test", Default::default());
        let mut state = section();
        let plan = plan_section(&mut state, &source(&device, 2, 1), true);
        assert_eq!(plan.positions, PositionWrites::Both);
        assert!(plan.recompute_tangents);
        assert_ne!(state.current_slot, state.previous_slot);
    }

    #[test]
    fn test_advancing_revision_reuses_previous() {
        let device = GraphicsDevice::new("test", Default::default());
        let mut state = section();
        plan_section(&mut state, &source(&device, 2, 1), true);
        state.tracker.commit_pending();
        let written = state.current_slot;

        let plan = plan_section(&mut state, &source(&device, 3, 2), true);
        assert_eq!(plan.positions, PositionWrites::Current);
        assert_eq!(state.previous_slot, written);
        assert_ne!(state.current_slot, written);
    }

    #[test]
    fn test_same_revisions_hit() {
        let device = GraphicsDevice::new("test", Default::default());
        let mut state = section();
        plan_section(&mut state, &source(&device, 2, 1), true);
        state.tracker.commit_pending();

        let plan = plan_section(&mut state, &source(&device, 2, 1), true);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_single_buffer_always_writes_slot_zero() {
        let device = GraphicsDevice::new("test", Default::default());
        let mut state = section();
        for _ in 0..2 {
            let plan = plan_section(&mut state, &source(&device, 5, 5), false);
            assert_eq!(plan.positions, PositionWrites::Current);
            assert_eq!(state.current_slot, PositionSlot::First);
            assert_eq!(state.previous_slot, PositionSlot::First);
        }
    }
}
