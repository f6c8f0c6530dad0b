//! Copy engine (C2): size-aware object copy, including parallel multipart
//! for large objects.

mod engine;
pub mod plan;

pub use engine::{copy, ENTITY_TOO_LARGE_MARKER};
pub use plan::{build_parts, select_plan, PlanKind, MAX_PARTS, MAX_PART_SIZE_BYTES};
