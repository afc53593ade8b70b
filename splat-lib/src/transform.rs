use rayon::prelude::*;
use zerocopy::byteorder::little_endian::F32;
use zerocopy::FromZeros;

use crate::common::{normalize_quat, quantize_channel, quantize_unit, quat_norm, sigmoid, SH_C0};
use crate::error::SplatError;
use crate::structures::{PointCloud, SplatRecord, Vertex};

/// What to do with a rotation quaternion whose norm is zero or not finite.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DegenerateRotation {
    /// Abort the conversion with [`SplatError::NumericDegeneracy`].
    #[default]
    Reject,
    /// Substitute the identity rotation (rot_0 = 1).
    Identity,
}

const IDENTITY_ROTATION: [f32; 4] = [1.0, 0.0, 0.0, 0.0];

/// Converts one raw vertex into its renderer-ready record.
///
/// `index` is the vertex position in the source file and only shows up in
/// errors.
pub fn transform_vertex(
    v: &Vertex,
    index: usize,
    policy: DegenerateRotation,
) -> Result<SplatRecord, SplatError> {
    let rotation = match (normalize_quat(v.rotation), policy) {
        (Some(q), _) => q,
        (None, DegenerateRotation::Identity) => {
            tracing::debug!(index, "Substituting identity for degenerate rotation");
            IDENTITY_ROTATION
        }
        (None, DegenerateRotation::Reject) => {
            return Err(SplatError::NumericDegeneracy {
                index,
                norm: quat_norm(v.rotation),
            })
        }
    };

    let color = [
        0.5 + SH_C0 * v.color_dc[0],
        0.5 + SH_C0 * v.color_dc[1],
        0.5 + SH_C0 * v.color_dc[2],
        sigmoid(v.opacity),
    ];

    Ok(SplatRecord {
        position: v.position.map(F32::new),
        scale: v.log_scale.map(|s| F32::new(s.exp())),
        color: color.map(quantize_channel),
        rotation: rotation.map(quantize_unit),
    })
}

/// Transforms `cloud` in the given visiting order.
///
/// Records are computed in parallel straight into their final slot, so the
/// output order always matches `order`. Every entry of `order` must index
/// into `cloud`.
pub fn transform_sorted(
    cloud: &PointCloud,
    order: &[usize],
    policy: DegenerateRotation,
) -> Result<Vec<SplatRecord>, SplatError> {
    let _span = tracing::trace_span!("transform_sorted").entered();

    let mut records = vec![SplatRecord::new_zeroed(); order.len()];
    records
        .par_iter_mut()
        .zip(order.par_iter())
        .try_for_each(|(slot, &idx)| {
            *slot = transform_vertex(&cloud.vertices[idx], idx, policy)?;
            Ok::<(), SplatError>(())
        })?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn worked_example() -> Vertex {
        Vertex {
            position: [1.0, 2.0, 3.0],
            log_scale: [0.0, 0.0, 0.0],
            rotation: [1.0, 0.0, 0.0, 0.0],
            color_dc: [0.0, 0.0, 0.0],
            opacity: 0.0,
        }
    }

    #[test]
    fn test_worked_example() {
        let rec = transform_vertex(&worked_example(), 0, DegenerateRotation::Reject).unwrap();
        assert_eq!(rec.position(), [1.0, 2.0, 3.0]);
        assert_eq!(rec.scale(), [1.0, 1.0, 1.0]);
        assert_eq!(rec.color, [128, 128, 128, 128]);
        assert_eq!(rec.rotation, [255, 128, 128, 128]);
    }

    #[test]
    fn test_scale_is_exponentiated() {
        let v = Vertex {
            log_scale: [1.0, -2.0, 0.5],
            ..worked_example()
        };
        let rec = transform_vertex(&v, 0, DegenerateRotation::Reject).unwrap();
        assert_eq!(rec.scale(), [1.0f32.exp(), (-2.0f32).exp(), 0.5f32.exp()]);
    }

    #[test]
    fn test_color_saturates() {
        let v = Vertex {
            color_dc: [100.0, -100.0, 1.0],
            opacity: 50.0,
            ..worked_example()
        };
        let rec = transform_vertex(&v, 0, DegenerateRotation::Reject).unwrap();
        let g = ((0.5 + SH_C0) * 255.0).round() as u8;
        assert_eq!(rec.color, [255, 0, g, 255]);

        let v = Vertex {
            opacity: -50.0,
            ..worked_example()
        };
        let rec = transform_vertex(&v, 0, DegenerateRotation::Reject).unwrap();
        assert_eq!(rec.color[3], 0);
    }

    #[test]
    fn test_rotation_is_normalized() {
        let q = [0.3f32, -1.7, 0.9, 2.2];
        let v = Vertex {
            rotation: q,
            ..worked_example()
        };
        let rec = transform_vertex(&v, 0, DegenerateRotation::Reject).unwrap();
        let norm = quat_norm(q);
        for (decoded, raw) in rec.rotation().iter().zip(q) {
            assert_approx_eq!(*decoded, raw / norm, 1.0 / 128.0);
        }
    }

    #[test]
    fn test_degenerate_rotation_rejected() {
        let v = Vertex {
            rotation: [0.0; 4],
            ..worked_example()
        };
        match transform_vertex(&v, 7, DegenerateRotation::Reject) {
            Err(SplatError::NumericDegeneracy { index, norm }) => {
                assert_eq!(index, 7);
                assert_eq!(norm, 0.0);
            }
            other => panic!("expected a degeneracy error, got {:?}", other),
        }
    }

    #[test]
    fn test_huge_rotation_is_not_degenerate() {
        let v = Vertex {
            rotation: [1e20, 0.0, 0.0, 1e20],
            ..worked_example()
        };
        let rec = transform_vertex(&v, 0, DegenerateRotation::Reject).unwrap();
        assert_eq!(rec.rotation, [219, 128, 128, 219]);
    }

    #[test]
    fn test_degenerate_rotation_identity() {
        let v = Vertex {
            rotation: [0.0; 4],
            ..worked_example()
        };
        let rec = transform_vertex(&v, 0, DegenerateRotation::Identity).unwrap();
        assert_eq!(rec.rotation, [255, 128, 128, 128]);
    }

    #[test]
    fn test_transform_sorted_follows_order() {
        let cloud = PointCloud {
            vertices: (0..500)
                .map(|i| Vertex {
                    position: [i as f32, 0.0, 0.0],
                    ..worked_example()
                })
                .collect(),
        };
        let order: Vec<usize> = (0..500).rev().collect();
        let records = transform_sorted(&cloud, &order, DegenerateRotation::Reject).unwrap();
        assert_eq!(records.len(), 500);
        for (rec, &idx) in records.iter().zip(&order) {
            assert_eq!(
                *rec,
                transform_vertex(&cloud.vertices[idx], idx, DegenerateRotation::Reject).unwrap()
            );
        }
    }

    #[test]
    fn test_transform_sorted_propagates_degeneracy() {
        let mut cloud = PointCloud {
            vertices: vec![worked_example(); 16],
        };
        cloud.vertices[5].rotation = [0.0; 4];
        let order: Vec<usize> = (0..16).collect();
        let err = transform_sorted(&cloud, &order, DegenerateRotation::Reject).unwrap_err();
        assert!(matches!(err, SplatError::NumericDegeneracy { index: 5, .. }));
    }
}
