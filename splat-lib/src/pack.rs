use zerocopy::{FromBytes, IntoBytes};

use crate::error::SplatError;
use crate::structures::{SplatRecord, SPLAT_RECORD_SIZE};

/// Serializes records back to back: no header, no padding.
pub fn pack_records(records: &[SplatRecord], output: &mut Vec<u8>) {
    let _span = tracing::trace_span!("pack_records").entered();

    output.clear();
    output.reserve_exact(records.len() * SPLAT_RECORD_SIZE);
    output.extend_from_slice(records.as_bytes());
}

/// Views a `.splat` buffer as records without copying.
pub fn records_from_bytes(data: &[u8]) -> Result<&[SplatRecord], SplatError> {
    if data.len() % SPLAT_RECORD_SIZE != 0 {
        return Err(SplatError::DecodeSplat(format!(
            "length {} is not a multiple of {}",
            data.len(),
            SPLAT_RECORD_SIZE
        )));
    }
    <[SplatRecord]>::ref_from_bytes(data).map_err(|_| {
        SplatError::DecodeSplat(format!("cannot view {} bytes as splat records", data.len()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::byteorder::little_endian::F32;

    fn record(seed: u8) -> SplatRecord {
        SplatRecord {
            position: [1.0, 2.0, 3.0].map(|v: f32| F32::new(v + seed as f32)),
            scale: [0.5, 0.25, 4.0].map(F32::new),
            color: [seed, 1, 2, 3],
            rotation: [255, 128, 0, seed],
        }
    }

    #[test]
    fn test_layout() {
        let mut out = Vec::new();
        pack_records(&[record(9)], &mut out);
        assert_eq!(out.len(), SPLAT_RECORD_SIZE);
        assert_eq!(&out[0..4], &10.0f32.to_le_bytes());
        assert_eq!(&out[4..8], &11.0f32.to_le_bytes());
        assert_eq!(&out[8..12], &12.0f32.to_le_bytes());
        assert_eq!(&out[12..16], &0.5f32.to_le_bytes());
        assert_eq!(&out[16..20], &0.25f32.to_le_bytes());
        assert_eq!(&out[20..24], &4.0f32.to_le_bytes());
        assert_eq!(&out[24..28], &[9u8, 1, 2, 3]);
        assert_eq!(&out[28..32], &[255u8, 128, 0, 9]);
    }

    #[test]
    fn test_pack_preserves_order_and_size() {
        let records: Vec<SplatRecord> = (0..10).map(record).collect();
        let mut out = vec![0xAA; 3];
        pack_records(&records, &mut out);
        assert_eq!(out.len(), 10 * SPLAT_RECORD_SIZE);

        let decoded = records_from_bytes(&out).unwrap();
        assert_eq!(decoded, &records[..]);
    }

    #[test]
    fn test_empty() {
        let mut out = Vec::new();
        pack_records(&[], &mut out);
        assert!(out.is_empty());
        assert!(records_from_bytes(&out).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_partial_record() {
        assert!(matches!(
            records_from_bytes(&[0; 33]),
            Err(SplatError::DecodeSplat(_))
        ));
    }
}
