//! Descriptions of the skinned meshes and bone data a producer submits.
//!
//! The cache never owns mesh data. A producer describes each LOD once with a
//! [`MeshLod`] and, every frame, hands over a [`SkinningSource`] naming the
//! bone buffers to skin from. Bone buffers and source factories are
//! identified by generational handles issued by a [`SourceRegistry`], so a
//! recreated buffer never aliases the one it replaced.

use std::sync::Arc;

use skincache_core::{Arena, Handle};
use skincache_graphics::{Buffer, PixelFormat};

use crate::error::SkinCacheError;

/// Influences a single weight stream can hold per vertex.
pub const MAX_INFLUENCES_PER_STREAM: u32 = 4;

/// A producer-owned bone matrix buffer.
#[derive(Debug)]
pub struct BoneBuffer {
    /// Debug label.
    pub label: String,
    /// GPU buffer holding the matrices.
    pub buffer: Arc<Buffer>,
}

/// A producer-owned source vertex factory: the rest-pose streams of one LOD.
#[derive(Debug)]
pub struct SourceFactory {
    /// Debug label.
    pub label: String,
    /// Input streams.
    pub streams: Arc<SourceStreams>,
}

/// Handle to a registered [`BoneBuffer`].
pub type BoneBufferHandle = Handle<BoneBuffer>;

/// Handle to a registered [`SourceFactory`].
pub type SourceFactoryHandle = Handle<SourceFactory>;

/// Issues handles for bone buffers and source factories.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    bone_buffers: Arena<BoneBuffer>,
    factories: Arena<SourceFactory>,
}

impl SourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bone buffer.
    pub fn register_bone_buffer(&mut self, bone_buffer: BoneBuffer) -> BoneBufferHandle {
        self.bone_buffers.insert(bone_buffer)
    }

    /// Look up a bone buffer.
    pub fn bone_buffer(&self, handle: BoneBufferHandle) -> Option<&BoneBuffer> {
        self.bone_buffers.get(handle)
    }

    /// Unregister a bone buffer. Its handle never resolves again.
    pub fn release_bone_buffer(&mut self, handle: BoneBufferHandle) -> Option<BoneBuffer> {
        self.bone_buffers.remove(handle)
    }

    /// Register a source factory.
    pub fn register_factory(&mut self, factory: SourceFactory) -> SourceFactoryHandle {
        self.factories.insert(factory)
    }

    /// Look up a source factory.
    pub fn factory(&self, handle: SourceFactoryHandle) -> Option<&SourceFactory> {
        self.factories.get(handle)
    }

    /// Unregister a source factory.
    pub fn release_factory(&mut self, handle: SourceFactoryHandle) -> Option<SourceFactory> {
        self.factories.remove(handle)
    }

    /// Builds the binding for `handle` at `revision`.
    pub fn bind(&self, handle: BoneBufferHandle, revision: u32) -> Option<BoneBinding> {
        self.bone_buffer(handle).map(|bone_buffer| BoneBinding {
            handle,
            revision,
            buffer: Arc::clone(&bone_buffer.buffer),
        })
    }

    /// Builds a source skinning `factory` from `bones`, with last frame's
    /// bones taken from the same buffer at `previous_revision`.
    ///
    /// Returns `None` if either handle is stale.
    pub fn source(
        &self,
        factory: SourceFactoryHandle,
        bones: BoneBufferHandle,
        revision: u32,
        previous_revision: u32,
    ) -> Option<SkinningSource> {
        let streams = Arc::clone(&self.factory(factory)?.streams);
        Some(SkinningSource {
            factory,
            streams,
            current: self.bind(bones, revision)?,
            previous: self.bind(bones, previous_revision)?,
        })
    }
}

/// Rest-pose input streams of a source factory.
#[derive(Debug, Clone)]
pub struct SourceStreams {
    /// Rest positions.
    pub positions: Arc<Buffer>,
    /// Rest tangent frames. Also the default for zero-weight vertices.
    pub tangents: Arc<Buffer>,
    /// Texture coordinates, read by the tangent triangle pass.
    pub uvs: Arc<Buffer>,
    /// Packed bone indices and weights.
    pub weights: Arc<Buffer>,
    /// Triangle indices. Required to recompute tangents.
    pub indices: Option<Arc<Buffer>>,
    /// Vertex colors. Required for masked tangent blending.
    pub colors: Option<Arc<Buffer>>,
}

/// Bone-influence mode of a weight layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum InfluenceType {
    /// Up to [`MAX_INFLUENCES_PER_STREAM`] influences per vertex.
    #[default]
    Default,
    /// More than [`MAX_INFLUENCES_PER_STREAM`], at a fixed count per vertex.
    Extra,
    /// Variable count per vertex, read through a lookup stream.
    Unlimited,
}

impl InfluenceType {
    /// Index used in program variant keys.
    pub fn index(self) -> u32 {
        match self {
            Self::Default => 0,
            Self::Extra => 1,
            Self::Unlimited => 2,
        }
    }
}

/// Skinning input kind of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum SkinType {
    /// Bones only.
    #[default]
    Normal,
    /// Bones plus morph target deltas.
    Morph,
    /// Bones blended with simulated cloth.
    Cloth,
}

impl SkinType {
    /// Index used in program variant keys.
    pub fn index(self) -> u32 {
        match self {
            Self::Normal => 0,
            Self::Morph => 1,
            Self::Cloth => 2,
        }
    }
}

/// Encoding of the bone weights of a vertex range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SkinWeightLayout {
    /// Bone indices are 16-bit (8-bit otherwise).
    pub bone_index_16: bool,
    /// Bone weights are 16-bit (8-bit otherwise).
    pub bone_weight_16: bool,
    /// Largest influence count of any vertex.
    pub max_influences: u32,
    /// Influence counts vary per vertex.
    pub unlimited: bool,
}

impl Default for SkinWeightLayout {
    fn default() -> Self {
        Self {
            bone_index_16: false,
            bone_weight_16: false,
            max_influences: MAX_INFLUENCES_PER_STREAM,
            unlimited: false,
        }
    }
}

impl SkinWeightLayout {
    /// Layout with `max_influences` 8-bit influences per vertex.
    pub fn with_influences(max_influences: u32) -> Self {
        Self {
            max_influences,
            ..Default::default()
        }
    }

    /// Classifies the layout.
    pub fn influence_type(&self) -> InfluenceType {
        if self.unlimited {
            InfluenceType::Unlimited
        } else if self.max_influences > MAX_INFLUENCES_PER_STREAM {
            InfluenceType::Extra
        } else {
            InfluenceType::Default
        }
    }

    /// Bytes per vertex in the weight stream. Zero for unlimited layouts,
    /// which are addressed through a lookup stream instead.
    pub fn vertex_stride(&self) -> u32 {
        if self.unlimited {
            return 0;
        }
        let index_bytes = if self.bone_index_16 { 2 } else { 1 };
        let weight_bytes = if self.bone_weight_16 { 2 } else { 1 };
        self.max_influences * (index_bytes + weight_bytes)
    }
}

/// A contiguous vertex range of a section sharing one weight layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkinStream {
    /// First vertex of the range, relative to the section.
    pub first_vertex: u32,
    /// Vertices in the range.
    pub num_vertices: u32,
    /// Weight encoding of the range.
    pub weights: SkinWeightLayout,
}

/// Vertex color channel used as a blend mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexColorChannel {
    /// Red.
    Red,
    /// Green.
    Green,
    /// Blue.
    Blue,
    /// Alpha.
    Alpha,
}

impl VertexColorChannel {
    /// Channel index.
    pub fn index(self) -> u32 {
        match self {
            Self::Red => 0,
            Self::Green => 1,
            Self::Blue => 2,
            Self::Alpha => 3,
        }
    }
}

/// One render section of a LOD.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionDesc {
    /// First vertex in the LOD's vertex buffers.
    pub base_vertex: u32,
    /// Vertex count.
    pub num_vertices: u32,
    /// First index in the LOD's index buffer.
    pub base_index: u32,
    /// Triangle count.
    pub num_triangles: u32,
    /// Weight streams covering the section's vertices, in vertex order.
    pub streams: Vec<SkinStream>,
    /// Section opts into tangent recomputation.
    pub recompute_tangents: bool,
    /// Blend recomputed tangents with the originals by this vertex color channel.
    pub tangent_mask_channel: Option<VertexColorChannel>,
    /// Section ships a duplicated-vertex table for seam-aware tangents.
    pub duplicated_vertices: bool,
}

impl SectionDesc {
    /// A section whose vertices all share `weights`.
    pub fn new(base_vertex: u32, num_vertices: u32, weights: SkinWeightLayout) -> Self {
        Self {
            base_vertex,
            num_vertices,
            base_index: 0,
            num_triangles: 0,
            streams: vec![SkinStream {
                first_vertex: 0,
                num_vertices,
                weights,
            }],
            recompute_tangents: false,
            tangent_mask_channel: None,
            duplicated_vertices: false,
        }
    }

    /// Set the triangle range.
    pub fn with_triangles(mut self, base_index: u32, num_triangles: u32) -> Self {
        self.base_index = base_index;
        self.num_triangles = num_triangles;
        self
    }

    /// Opt into tangent recomputation.
    pub fn with_recompute_tangents(mut self) -> Self {
        self.recompute_tangents = true;
        self
    }

    /// Blend recomputed tangents by a vertex color channel.
    pub fn with_tangent_mask(mut self, channel: VertexColorChannel) -> Self {
        self.tangent_mask_channel = Some(channel);
        self
    }

    /// Replace the weight streams.
    pub fn with_streams(mut self, streams: Vec<SkinStream>) -> Self {
        self.streams = streams;
        self
    }

    /// Checks that the streams tile the section exactly.
    pub fn validate(&self) -> Result<(), SkinCacheError> {
        if self.num_vertices == 0 {
            return Err(SkinCacheError::InvalidDescriptor(
                "section has no vertices".to_string(),
            ));
        }
        if self.streams.is_empty() {
            return Err(SkinCacheError::InvalidDescriptor(
                "section has no weight streams".to_string(),
            ));
        }
        let mut next = 0;
        for stream in &self.streams {
            if stream.first_vertex != next || stream.num_vertices == 0 {
                return Err(SkinCacheError::InvalidDescriptor(format!(
                    "weight stream at vertex {} does not continue at {}",
                    stream.first_vertex, next
                )));
            }
            next += stream.num_vertices;
        }
        if next != self.num_vertices {
            return Err(SkinCacheError::InvalidDescriptor(format!(
                "weight streams cover {} of {} vertices",
                next, self.num_vertices
            )));
        }
        Ok(())
    }
}

/// Render data of one mesh LOD.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshLod {
    /// LOD index.
    pub lod: u32,
    /// Vertices across all sections.
    pub num_vertices: u32,
    /// Sections in draw order.
    pub sections: Vec<SectionDesc>,
    /// Tangent format of the vertex factory that renders the skinned output.
    pub target_tangent_format: PixelFormat,
    /// The LOD has an index buffer the tangent passes can read.
    pub has_index_buffer: bool,
    /// UVs are stored as 32-bit floats (16-bit otherwise).
    pub full_precision_uvs: bool,
}

impl MeshLod {
    /// A LOD whose vertex count is the sum of its sections.
    pub fn new(lod: u32, sections: Vec<SectionDesc>) -> Self {
        let num_vertices = sections
            .iter()
            .map(|s| s.base_vertex + s.num_vertices)
            .max()
            .unwrap_or(0);
        Self {
            lod,
            num_vertices,
            sections,
            target_tangent_format: PixelFormat::Rgba8Snorm,
            has_index_buffer: true,
            full_precision_uvs: false,
        }
    }

    /// Set the target tangent format.
    pub fn with_target_tangent_format(mut self, format: PixelFormat) -> Self {
        self.target_tangent_format = format;
        self
    }

    /// Section `index`, or an error naming the section count.
    pub fn section(&self, index: u32) -> Result<&SectionDesc, SkinCacheError> {
        self.sections
            .get(index as usize)
            .ok_or(SkinCacheError::InvalidSection {
                section: index,
                count: self.sections.len() as u32,
            })
    }
}

/// A bone buffer bound at a specific revision.
#[derive(Debug, Clone)]
pub struct BoneBinding {
    /// Identity of the bone buffer.
    pub handle: BoneBufferHandle,
    /// Revision of its contents.
    pub revision: u32,
    /// GPU buffer to bind.
    pub buffer: Arc<Buffer>,
}

/// Everything a section is skinned from this frame.
#[derive(Debug, Clone)]
pub struct SkinningSource {
    /// Source vertex factory.
    pub factory: SourceFactoryHandle,
    /// Its input streams.
    pub streams: Arc<SourceStreams>,
    /// Bones for this frame.
    pub current: BoneBinding,
    /// Bones for the previous frame. Equal to `current` when there is no history.
    pub previous: BoneBinding,
}

/// Morph target deltas for a LOD.
#[derive(Debug, Clone)]
pub struct MorphInput {
    /// Delta buffer.
    pub buffer: Arc<Buffer>,
    /// Sections the deltas apply to.
    pub sections: Vec<u32>,
}

/// Simulated cloth to blend into a section.
#[derive(Debug, Clone)]
pub struct ClothInput {
    /// Deformer mapping buffer.
    pub mapping: Arc<Buffer>,
    /// Simulated positions and normals.
    pub simulated: Arc<Buffer>,
    /// Blend factor between skinned and simulated results.
    pub blend_weight: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_influence_classification() {
        assert_eq!(
            SkinWeightLayout::with_influences(4).influence_type(),
            InfluenceType::Default
        );
        assert_eq!(
            SkinWeightLayout::with_influences(8).influence_type(),
            InfluenceType::Extra
        );
        let unlimited = SkinWeightLayout {
            unlimited: true,
            ..SkinWeightLayout::with_influences(12)
        };
        assert_eq!(unlimited.influence_type(), InfluenceType::Unlimited);
        assert_eq!(unlimited.vertex_stride(), 0);
    }

    #[test]
    fn test_vertex_stride() {
        let layout = SkinWeightLayout {
            bone_index_16: true,
            ..SkinWeightLayout::with_influences(4)
        };
        assert_eq!(layout.vertex_stride(), 12);
    }

    #[test]
    fn test_section_validation() {
        let layout = SkinWeightLayout::default();
        assert!(SectionDesc::new(0, 10, layout).validate().is_ok());
        assert!(SectionDesc::new(0, 0, layout).validate().is_err());

        let split = SectionDesc::new(0, 10, layout).with_streams(vec![
            SkinStream {
                first_vertex: 0,
                num_vertices: 4,
                weights: layout,
            },
            SkinStream {
                first_vertex: 4,
                num_vertices: 6,
                weights: SkinWeightLayout::with_influences(8),
            },
        ]);
        assert!(split.validate().is_ok());

        let gap = SectionDesc::new(0, 10, layout).with_streams(vec![SkinStream {
            first_vertex: 2,
            num_vertices: 8,
            weights: layout,
        }]);
        assert!(matches!(
            gap.validate(),
            Err(SkinCacheError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn test_lod_section_lookup() {
        let lod = MeshLod::new(0, vec![SectionDesc::new(0, 8, SkinWeightLayout::default())]);
        assert_eq!(lod.num_vertices, 8);
        assert!(lod.section(0).is_ok());
        assert_eq!(
            lod.section(3).unwrap_err(),
            SkinCacheError::InvalidSection { section: 3, count: 1 }
        );
    }
}
