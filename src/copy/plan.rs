//! Plan selection for the copy engine (C2 step 2): decides `SINGLE` vs.
//! `MULTIPART` and, for multipart, tiles `[0, size)` into parts.

use crate::error::{MirrorError, Result};
use crate::model::PartSpec;

/// Hard S3-family limit: no single multipart upload may have more parts
/// than this, regardless of part size.
pub const MAX_PARTS: u32 = 10_000;

/// Hard S3-family limit: no single part may exceed this size.
pub const MAX_PART_SIZE_BYTES: u64 = 5 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanKind {
    Single,
    Multipart(Vec<PartSpec>),
}

/// Chooses a plan for an object of `size` bytes given the configured
/// `single_copy_ceiling` and starting `part_size`.
///
/// When the starting `part_size` would need more than [`MAX_PARTS`] parts,
/// it is doubled until it fits (§4.2 step 2). If even [`MAX_PARTS`] parts
/// at [`MAX_PART_SIZE_BYTES`] each cannot cover `size`, the object is
/// unrepresentable and this fails with `OBJECT_TOO_LARGE`.
pub fn select_plan(
    key: &str,
    size: u64,
    single_copy_ceiling: u64,
    part_size: u64,
) -> Result<PlanKind> {
    if size < single_copy_ceiling {
        return Ok(PlanKind::Single);
    }
    Ok(PlanKind::Multipart(build_parts(key, size, part_size)?))
}

/// Tiles `[0, size)` into contiguous, non-overlapping parts starting from
/// `part_size`, doubling as needed to respect [`MAX_PARTS`].
pub fn build_parts(key: &str, size: u64, part_size: u64) -> Result<Vec<PartSpec>> {
    let minimum_viable_part_size = size.div_ceil(u64::from(MAX_PARTS)).max(1);
    if minimum_viable_part_size > MAX_PART_SIZE_BYTES {
        return Err(MirrorError::ObjectTooLarge {
            key: key.to_string(),
            size,
        });
    }

    let mut effective = part_size.max(1);
    while size.div_ceil(effective) > u64::from(MAX_PARTS) {
        effective = effective.saturating_mul(2);
    }
    effective = effective.min(MAX_PART_SIZE_BYTES).max(minimum_viable_part_size);

    let mut parts = Vec::new();
    let mut offset = 0u64;
    let mut number = 1u32;
    while offset < size {
        let end = (offset + effective).min(size);
        parts.push(PartSpec {
            number,
            range: (offset, end),
        });
        offset = end;
        number += 1;
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1024 * 1024 * 1024;
    const MIB: u64 = 1024 * 1024;

    #[test]
    fn small_object_is_single() {
        let plan = select_plan("k", 10, 5 * GIB, 64 * MIB).unwrap();
        assert_eq!(plan, PlanKind::Single);
    }

    #[test]
    fn seven_gib_tiles_into_112_parts_with_short_final_part() {
        // S2: 7 GiB at 64 MiB parts -> 112 parts, last one short.
        let size = 7_516_192_768u64;
        let plan = select_plan("big.bin", size, 5 * GIB, 64 * MIB).unwrap();
        let PlanKind::Multipart(parts) = plan else {
            panic!("expected multipart");
        };
        assert_eq!(parts.len(), 112);
        assert_eq!(parts[0].range, (0, 64 * MIB));
        let total: u64 = parts.iter().map(|p| p.len()).sum();
        assert_eq!(total, size);
        assert!(parts.last().unwrap().len() <= 64 * MIB);
    }

    #[test]
    fn parts_tile_coverage_exactly_and_are_contiguous() {
        let size = 300 * MIB + 7;
        let PlanKind::Multipart(parts) =
            select_plan("k", size, 5 * GIB, 64 * MIB).unwrap()
        else {
            panic!("expected multipart");
        };
        let mut expected_offset = 0u64;
        for (i, part) in parts.iter().enumerate() {
            assert_eq!(part.number, i as u32 + 1);
            assert_eq!(part.range.0, expected_offset);
            assert!(part.range.1 > part.range.0);
            assert!(part.len() <= MAX_PART_SIZE_BYTES);
            expected_offset = part.range.1;
        }
        assert_eq!(expected_offset, size);
        assert!(parts.len() as u32 <= MAX_PARTS);
    }

    #[test]
    fn part_size_doubles_to_respect_max_parts() {
        // A tiny part_size against a huge object must still respect MAX_PARTS
        // by doubling the part size rather than exceeding 10_000 parts.
        let size = 500 * GIB;
        let PlanKind::Multipart(parts) = select_plan("k", size, 5 * GIB, MIB).unwrap()
        else {
            panic!("expected multipart");
        };
        assert!(parts.len() as u32 <= MAX_PARTS);
    }

    #[test]
    fn unrepresentable_size_fails_object_too_large() {
        // Even MAX_PARTS parts at MAX_PART_SIZE_BYTES each cannot cover this.
        let size = MAX_PART_SIZE_BYTES * u64::from(MAX_PARTS) + 1;
        let err = select_plan("huge", size, 5 * GIB, 64 * MIB).unwrap_err();
        assert!(matches!(err, MirrorError::ObjectTooLarge { .. }));
    }
}
