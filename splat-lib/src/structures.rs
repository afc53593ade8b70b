use zerocopy::byteorder::little_endian::F32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::common::unquantize_unit;

pub const SPLAT_RECORD_SIZE: usize = 32;

/// One raw Gaussian as stored in the source PLY.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: [f32; 3],
    /// Natural log of the per-axis scale.
    pub log_scale: [f32; 3],
    /// Unnormalized quaternion in file order (rot_0..rot_3).
    pub rotation: [f32; 4],
    /// Spherical harmonic DC coefficients.
    pub color_dc: [f32; 3],
    /// Opacity logit.
    pub opacity: f32,
}

/// Vertices in file order.
#[derive(Debug, Default, Clone)]
pub struct PointCloud {
    pub vertices: Vec<Vertex>,
}

impl PointCloud {
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// A single 32 byte `.splat` record.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct SplatRecord {
    pub position: [F32; 3],
    pub scale: [F32; 3],
    pub color: [u8; 4],
    pub rotation: [u8; 4],
}

impl SplatRecord {
    pub fn position(&self) -> [f32; 3] {
        self.position.map(|v| v.get())
    }

    pub fn scale(&self) -> [f32; 3] {
        self.scale.map(|v| v.get())
    }

    /// Rotation decoded back into [-1, 1] components.
    pub fn rotation(&self) -> [f32; 4] {
        self.rotation.map(unquantize_unit)
    }

    /// Color and opacity as [0, 1] floats.
    pub fn color(&self) -> [f32; 4] {
        self.color.map(|c| c as f32 / 255.0)
    }
}

const _: () = assert!(size_of::<SplatRecord>() == SPLAT_RECORD_SIZE);
