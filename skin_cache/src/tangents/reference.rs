//! CPU reference of the tangent recomputation kernels.
//!
//! The GPU passes accumulate into `i32` slots with atomic adds, so the
//! reference does the same arithmetic in the same fixed-point encoding:
//!
//! 1. [`TangentAccumulator::scatter_triangle`] adds each triangle's face
//!    normal, UV tangent and handedness into its three vertices, weighted by
//!    the corner angle.
//! 2. [`TangentAccumulator::normalize_vertex`] turns a vertex's sums back
//!    into an orthonormal frame and zeroes its slot for the next frame.

use skincache_core::math::{self, Vec2, Vec3};
use skincache_graphics::PixelFormat;

use crate::buffer_set::ACCUMULATOR_INTS_PER_VERTEX;

const SLOT: usize = ACCUMULATOR_INTS_PER_VERTEX as usize;
const EPSILON: f32 = 1e-8;

/// An orthonormal tangent frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TangentFrame {
    /// Tangent along increasing U.
    pub tangent_x: Vec3,
    /// Normal.
    pub tangent_z: Vec3,
    /// Handedness of the bitangent, +1 or -1.
    pub orientation: f32,
}

impl Default for TangentFrame {
    fn default() -> Self {
        Self {
            tangent_x: Vec3::x(),
            tangent_z: Vec3::z(),
            orientation: 1.0,
        }
    }
}

impl TangentFrame {
    /// Bitangent implied by the frame.
    pub fn tangent_y(&self) -> Vec3 {
        self.tangent_z.cross(&self.tangent_x) * self.orientation
    }

    /// Blends toward `other` by `weight` in `[0, 1]` and re-orthonormalizes.
    pub fn blend(&self, other: &TangentFrame, weight: f32) -> TangentFrame {
        let weight = weight.clamp(0.0, 1.0);
        let z = self.tangent_z.lerp(&other.tangent_z, weight);
        let x = self.tangent_x.lerp(&other.tangent_x, weight);
        let tangent_z = math::try_normalize(z, EPSILON).unwrap_or(self.tangent_z);
        let tangent_x = math::try_normalize(x - tangent_z * tangent_z.dot(&x), EPSILON)
            .unwrap_or(self.tangent_x);
        let orientation = if weight < 0.5 {
            self.orientation
        } else {
            other.orientation
        };
        TangentFrame {
            tangent_x,
            tangent_z,
            orientation,
        }
    }
}

/// Fixed-point accumulation buffer, [`ACCUMULATOR_INTS_PER_VERTEX`] ints per vertex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TangentAccumulator {
    data: Vec<i32>,
}

impl TangentAccumulator {
    /// A zeroed accumulator for `num_vertices` vertices.
    pub fn new(num_vertices: usize) -> Self {
        Self {
            data: vec![0; num_vertices * SLOT],
        }
    }

    /// Vertices covered.
    pub fn num_vertices(&self) -> usize {
        self.data.len() / SLOT
    }

    /// Raw accumulator contents.
    pub fn as_slice(&self) -> &[i32] {
        &self.data
    }

    /// Accumulator slot of `vertex`.
    pub fn slot(&self, vertex: usize) -> &[i32] {
        &self.data[vertex * SLOT..(vertex + 1) * SLOT]
    }

    /// Returns true if every slot is zero.
    pub fn is_zeroed(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }

    /// Triangle pass for one triangle.
    ///
    /// Degenerate triangles contribute nothing.
    pub fn scatter_triangle(&mut self, positions: &[Vec3], uvs: &[Vec2], triangle: [u32; 3]) {
        let [i0, i1, i2] = triangle.map(|i| i as usize);
        let p = [positions[i0], positions[i1], positions[i2]];
        let uv = [uvs[i0], uvs[i1], uvs[i2]];

        let e1 = p[1] - p[0];
        let e2 = p[2] - p[0];
        let Some(normal) = math::try_normalize(e1.cross(&e2), EPSILON) else {
            return;
        };

        let duv1 = uv[1] - uv[0];
        let duv2 = uv[2] - uv[0];
        let det = duv1.x * duv2.y - duv2.x * duv1.y;
        let (tangent, bitangent) = if det.abs() > EPSILON {
            let r = 1.0 / det;
            ((e1 * duv2.y - e2 * duv1.y) * r, (e2 * duv1.x - e1 * duv2.x) * r)
        } else {
            // No UV gradient: any tangent in the plane will do.
            (e1, normal.cross(&e1))
        };
        let tangent = math::try_normalize(tangent, EPSILON)
            .or_else(|| math::try_normalize(e1, EPSILON))
            .unwrap_or_else(Vec3::x);
        let orientation = if normal.cross(&tangent).dot(&bitangent) < 0.0 {
            -1.0
        } else {
            1.0
        };

        for corner in 0..3 {
            let a = p[corner];
            let b = p[(corner + 1) % 3];
            let c = p[(corner + 2) % 3];
            let angle = math::corner_angle(b - a, c - a);
            let vertex = triangle[corner] as usize;
            let slot = &mut self.data[vertex * SLOT..(vertex + 1) * SLOT];
            let weighted_n = normal * angle;
            let weighted_t = tangent * angle;
            let contributions = [
                weighted_n.x,
                weighted_n.y,
                weighted_n.z,
                weighted_t.x,
                weighted_t.y,
                weighted_t.z,
                orientation * angle,
            ];
            for (acc, value) in slot.iter_mut().zip(contributions) {
                *acc = acc.wrapping_add(math::to_fixed(value));
            }
        }
    }

    /// Vertex pass for one vertex. Zeroes the vertex's slot.
    ///
    /// A vertex no triangle touched keeps `default`.
    pub fn normalize_vertex(&mut self, vertex: usize, default: &TangentFrame) -> TangentFrame {
        let slot = &mut self.data[vertex * SLOT..(vertex + 1) * SLOT];
        let mut sums = [0i32; SLOT];
        sums.copy_from_slice(slot);
        slot.fill(0);

        if sums[..7].iter().all(|&v| v == 0) {
            return *default;
        }

        let n = Vec3::new(
            math::from_fixed(sums[0]),
            math::from_fixed(sums[1]),
            math::from_fixed(sums[2]),
        );
        let t = Vec3::new(
            math::from_fixed(sums[3]),
            math::from_fixed(sums[4]),
            math::from_fixed(sums[5]),
        );
        let tangent_z = math::try_normalize(n, EPSILON).unwrap_or(default.tangent_z);
        let tangent_x = math::try_normalize(t - tangent_z * tangent_z.dot(&t), EPSILON)
            .unwrap_or(default.tangent_x);
        let orientation = if sums[6] < 0 { -1.0 } else { 1.0 };
        TangentFrame {
            tangent_x,
            tangent_z,
            orientation,
        }
    }
}

/// Runs both passes over an indexed mesh.
///
/// `defaults` holds the rest-pose frames, one per vertex.
pub fn recompute_tangents(
    positions: &[Vec3],
    uvs: &[Vec2],
    indices: &[u32],
    defaults: &[TangentFrame],
) -> Vec<TangentFrame> {
    let mut accumulator = TangentAccumulator::new(positions.len());
    for triangle in indices.chunks_exact(3) {
        accumulator.scatter_triangle(positions, uvs, [triangle[0], triangle[1], triangle[2]]);
    }
    (0..positions.len())
        .map(|vertex| {
            let default = defaults.get(vertex).copied().unwrap_or_default();
            accumulator.normalize_vertex(vertex, &default)
        })
        .collect()
}

/// Encodes a frame as two texels of `format` (tangent X, then tangent Z with
/// the orientation in W).
///
/// # Panics
///
/// Panics if `format` is not a tangent format.
pub fn encode_tangent_frame(frame: &TangentFrame, format: PixelFormat) -> Vec<u8> {
    let x = frame.tangent_x;
    let z = frame.tangent_z;
    let texels = [[x.x, x.y, x.z, 0.0], [z.x, z.y, z.z, frame.orientation]];
    match format {
        PixelFormat::Rgba8Snorm => texels
            .iter()
            .flatten()
            .map(|&v| math::encode_snorm8(v) as u8)
            .collect(),
        PixelFormat::Rgba16Snorm | PixelFormat::Rgba16Sint => {
            let packed: Vec<i16> = texels
                .iter()
                .flatten()
                .map(|&v| math::encode_snorm16(v))
                .collect();
            bytemuck::cast_slice(&packed).to_vec()
        }
        other => panic!("unsupported tangent format {}", other.name()),
    }
}

/// Decodes frames written by [`encode_tangent_frame`].
///
/// # Panics
///
/// Panics if `format` is not a tangent format.
pub fn decode_tangent_frames(bytes: &[u8], format: PixelFormat) -> Vec<TangentFrame> {
    let texel_bytes = format.block_bytes() as usize;
    let decode_texel = |chunk: &[u8]| -> [f32; 4] {
        match format {
            PixelFormat::Rgba8Snorm => {
                let texel: [i8; 4] = bytemuck::pod_read_unaligned(chunk);
                texel.map(math::decode_snorm8)
            }
            PixelFormat::Rgba16Snorm | PixelFormat::Rgba16Sint => {
                let texel: [i16; 4] = bytemuck::pod_read_unaligned(chunk);
                texel.map(math::decode_snorm16)
            }
            other => panic!("unsupported tangent format {}", other.name()),
        }
    };
    bytes
        .chunks_exact(texel_bytes * 2)
        .map(|frame| {
            let x = decode_texel(&frame[..texel_bytes]);
            let z = decode_texel(&frame[texel_bytes..]);
            TangentFrame {
                tangent_x: Vec3::new(x[0], x[1], x[2]),
                tangent_z: Vec3::new(z[0], z[1], z[2]),
                orientation: if z[3] < 0.0 { -1.0 } else { 1.0 },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> (Vec<Vec3>, Vec<Vec2>, Vec<u32>) {
        let positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        let uvs = positions.iter().map(|p| Vec2::new(p.x, p.y)).collect();
        (positions, uvs, vec![0, 1, 2, 0, 2, 3])
    }

    #[test]
    fn test_quad_round_trip() {
        let (positions, uvs, indices) = quad();
        let frames = recompute_tangents(&positions, &uvs, &indices, &[]);
        for frame in frames {
            assert!((frame.tangent_x - Vec3::x()).norm() < 1e-4);
            assert!((frame.tangent_z - Vec3::z()).norm() < 1e-4);
            assert_eq!(frame.orientation, 1.0);
        }
    }

    #[test]
    fn test_mirrored_uvs_flip_orientation() {
        let (positions, mut uvs, indices) = quad();
        for uv in &mut uvs {
            uv.y = 1.0 - uv.y;
        }
        let frames = recompute_tangents(&positions, &uvs, &indices, &[]);
        assert!(frames.iter().all(|f| f.orientation == -1.0));
    }

    #[test]
    fn test_vertex_pass_zeroes_slot() {
        let (positions, uvs, _) = quad();
        let mut accumulator = TangentAccumulator::new(4);
        accumulator.scatter_triangle(&positions, &uvs, [0, 1, 2]);
        assert!(!accumulator.is_zeroed());
        assert_eq!(accumulator.slot(3), &[0; 8]);

        for vertex in 0..4 {
            accumulator.normalize_vertex(vertex, &TangentFrame::default());
        }
        assert!(accumulator.is_zeroed());
    }

    #[test]
    fn test_untouched_vertex_keeps_default() {
        let (positions, uvs, _) = quad();
        let default = TangentFrame {
            tangent_x: Vec3::y(),
            tangent_z: -Vec3::z(),
            orientation: -1.0,
        };
        let mut accumulator = TangentAccumulator::new(4);
        accumulator.scatter_triangle(&positions, &uvs, [0, 1, 2]);
        assert_eq!(accumulator.normalize_vertex(3, &default), default);
    }

    #[test]
    fn test_degenerate_triangle_ignored() {
        let positions = vec![Vec3::zeros(), Vec3::x(), Vec3::x() * 2.0];
        let uvs = vec![Vec2::zeros(); 3];
        let mut accumulator = TangentAccumulator::new(3);
        accumulator.scatter_triangle(&positions, &uvs, [0, 1, 2]);
        assert!(accumulator.is_zeroed());
    }

    #[test]
    fn test_encode_decode_formats() {
        let frame = TangentFrame {
            tangent_x: Vec3::x(),
            tangent_z: Vec3::z(),
            orientation: -1.0,
        };
        for format in [
            PixelFormat::Rgba8Snorm,
            PixelFormat::Rgba16Snorm,
            PixelFormat::Rgba16Sint,
        ] {
            let bytes = encode_tangent_frame(&frame, format);
            assert_eq!(bytes.len(), format.block_bytes() as usize * 2);
            let decoded = decode_tangent_frames(&bytes, format);
            assert_eq!(decoded.len(), 1);
            assert!((decoded[0].tangent_x - frame.tangent_x).norm() < 1e-2);
            assert_eq!(decoded[0].orientation, -1.0);
        }
    }

    #[test]
    #[should_panic(expected = "unsupported tangent format")]
    fn test_encode_rejects_position_format() {
        encode_tangent_frame(&TangentFrame::default(), PixelFormat::R32Float);
    }

    #[test]
    fn test_blend_endpoints() {
        let a = TangentFrame::default();
        let b = TangentFrame {
            tangent_x: Vec3::y(),
            tangent_z: Vec3::z(),
            orientation: -1.0,
        };
        assert_eq!(a.blend(&b, 0.0), a);
        let full = a.blend(&b, 1.0);
        assert!((full.tangent_x - Vec3::y()).norm() < 1e-6);
        assert_eq!(full.orientation, -1.0);
    }
}
