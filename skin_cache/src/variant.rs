//! Compute program variants used by the cache.

use skincache_graphics::ProgramId;

use crate::mesh::{InfluenceType, SkinType, SkinWeightLayout};

/// Skinning program family.
pub const SKINNING_PROGRAM: &str = "SkinCacheCS";
/// Tangent triangle-pass program family.
pub const TANGENT_TRIANGLE_PROGRAM: &str = "RecomputeTangentsPerTriangleCS";
/// Tangent vertex-pass program family.
pub const TANGENT_VERTEX_PROGRAM: &str = "RecomputeTangentsPerVertexCS";

/// Permutation of the skinning program.
///
/// Unlimited-influence layouts pass their index and weight widths as shader
/// constants, so they always use the 8-bit permutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SkinningVariant {
    /// 16-bit bone weights.
    pub bone_weight_16: bool,
    /// 16-bit bone indices.
    pub bone_index_16: bool,
    /// Influence mode.
    pub influence: InfluenceType,
    /// Skin type.
    pub skin_type: SkinType,
}

impl SkinningVariant {
    /// Variant for a weight layout and skin type.
    pub fn new(weights: &SkinWeightLayout, skin_type: SkinType) -> Self {
        let influence = weights.influence_type();
        let unlimited = influence == InfluenceType::Unlimited;
        Self {
            bone_weight_16: weights.bone_weight_16 && !unlimited,
            bone_index_16: weights.bone_index_16 && !unlimited,
            influence,
            skin_type,
        }
    }

    /// Sort key: `weight16 * 32 + index16 * 16 + influence * 4 + skin_type`.
    pub fn key(&self) -> u32 {
        u32::from(self.bone_weight_16) * 32
            + u32::from(self.bone_index_16) * 16
            + self.influence.index() * 4
            + self.skin_type.index()
    }

    /// Program to bind for this variant.
    pub fn program(&self) -> ProgramId {
        ProgramId::new(SKINNING_PROGRAM, self.key())
    }

    /// Every variant the cache can select.
    pub fn all() -> impl Iterator<Item = SkinningVariant> {
        const SKIN_TYPES: [SkinType; 3] = [SkinType::Normal, SkinType::Morph, SkinType::Cloth];
        let widths = [(false, false), (false, true), (true, false), (true, true)];
        let bounded = widths.into_iter().flat_map(|(weight16, index16)| {
            [InfluenceType::Default, InfluenceType::Extra]
                .into_iter()
                .flat_map(move |influence| {
                    SKIN_TYPES.into_iter().map(move |skin_type| SkinningVariant {
                        bone_weight_16: weight16,
                        bone_index_16: index16,
                        influence,
                        skin_type,
                    })
                })
        });
        let unlimited = SKIN_TYPES.into_iter().map(|skin_type| SkinningVariant {
            bone_weight_16: false,
            bone_index_16: false,
            influence: InfluenceType::Unlimited,
            skin_type,
        });
        bounded.chain(unlimited)
    }
}

/// Triangle-pass program: bit 0 full-precision UVs, bit 1 duplicated vertices.
pub fn tangent_triangle_program(full_precision_uvs: bool, duplicated_vertices: bool) -> ProgramId {
    ProgramId::new(
        TANGENT_TRIANGLE_PROGRAM,
        u32::from(full_precision_uvs) | u32::from(duplicated_vertices) << 1,
    )
}

/// Vertex-pass program: permutation 1 blends by a vertex color mask.
pub fn tangent_vertex_program(masked: bool) -> ProgramId {
    ProgramId::new(TANGENT_VERTEX_PROGRAM, u32::from(masked))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_key_formula() {
        let variant = SkinningVariant {
            bone_weight_16: true,
            bone_index_16: false,
            influence: InfluenceType::Extra,
            skin_type: SkinType::Cloth,
        };
        assert_eq!(variant.key(), 32 + 4 + 2);
        assert_eq!(variant.program(), ProgramId::new(SKINNING_PROGRAM, 38));
    }

    #[test]
    fn test_unlimited_forces_8bit() {
        let weights = SkinWeightLayout {
            bone_index_16: true,
            bone_weight_16: true,
            max_influences: 12,
            unlimited: true,
        };
        let variant = SkinningVariant::new(&weights, SkinType::Normal);
        assert!(!variant.bone_index_16);
        assert!(!variant.bone_weight_16);
        assert_eq!(variant.key(), 8);
    }

    #[test]
    fn test_all_variants_unique() {
        let keys: HashSet<u32> = SkinningVariant::all().map(|v| v.key()).collect();
        assert_eq!(keys.len(), SkinningVariant::all().count());
        assert_eq!(keys.len(), 27);
        assert!(keys.iter().all(|&k| k < 64));
    }

    #[test]
    fn test_tangent_programs() {
        assert_eq!(tangent_triangle_program(true, true).permutation, 3);
        assert_eq!(tangent_triangle_program(false, true).permutation, 2);
        assert_eq!(tangent_vertex_program(true).permutation, 1);
    }
}
