use glam::{IVec3, Vec3};
use thiserror::Error;

/// Why a build was rejected before any pass ran, or aborted between passes.
///
/// Every variant is detected before the corresponding allocation or write,
/// so a failed build never leaves a partially filled structure behind. Host
/// allocation failure itself is not represented here; it aborts the process
/// like any other Rust out-of-memory condition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    /// The window has `hi < lo` on at least one axis.
    #[error("window is empty: lo {lo:?} exceeds hi {hi:?} on some axis")]
    EmptyWindow { lo: IVec3, hi: IVec3 },

    /// A cell-size component is zero, negative, or non-finite.
    #[error("inverse cell size must be positive and finite, got {inv_cell_size:?}")]
    BadCellSize { inv_cell_size: Vec3 },

    /// The window spans more cells than a u32 linear index can address.
    #[error("window spans {cells} cells, which exceeds u32 cell indexing")]
    TooManyCells { cells: u128 },

    /// More particles than a u32 particle index can address.
    #[error("{count} particles exceed u32 particle indexing")]
    TooManyParticles { count: usize },

    /// The counting pass accepted more total pairs than u32 offsets can
    /// span. Detected from the exact u64 total before the flat array is
    /// allocated; nothing wraps.
    #[error("neighbor list needs {required} entries, which exceeds u32 offsets")]
    NeighborCapacity { required: u64 },
}
