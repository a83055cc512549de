//! Element formats for typed buffers.

/// Element format of a typed GPU buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// 32-bit float, one channel. Skinned positions are stored as three of these per vertex.
    #[default]
    R32Float,
    /// 32-bit signed integer, one channel. Fixed-point accumulators.
    R32Sint,
    /// 8-bit RGBA, signed normalized.
    Rgba8Snorm,
    /// 16-bit RGBA, signed normalized.
    Rgba16Snorm,
    /// 16-bit RGBA, signed integer. Packed fallback where 16-bit SNORM is not writable.
    Rgba16Sint,
    /// 16-bit RGBA, float.
    Rgba16Float,
}

impl PixelFormat {
    /// Size of one element in bytes.
    pub fn block_bytes(&self) -> u32 {
        match self {
            Self::R32Float | Self::R32Sint | Self::Rgba8Snorm => 4,
            Self::Rgba16Snorm | Self::Rgba16Sint | Self::Rgba16Float => 8,
        }
    }

    /// Returns true for signed-normalized formats.
    pub fn is_snorm(&self) -> bool {
        matches!(self, Self::Rgba8Snorm | Self::Rgba16Snorm)
    }

    /// Short upper-case name used in logs and memory summaries.
    pub fn name(&self) -> &'static str {
        match self {
            Self::R32Float => "R32_FLOAT",
            Self::R32Sint => "R32_SINT",
            Self::Rgba8Snorm => "R8G8B8A8_SNORM",
            Self::Rgba16Snorm => "R16G16B16A16_SNORM",
            Self::Rgba16Sint => "R16G16B16A16_SINT",
            Self::Rgba16Float => "R16G16B16A16_FLOAT",
        }
    }
}
