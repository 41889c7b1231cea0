//! Input-side types: the particle position capability, the domain geometry,
//! and the bin-space window a build works over.

use glam::{IVec3, Vec3, Vec3A};

/// Minimal capability a particle type needs: expose a 3-D position.
///
/// Implemented for plain vectors, arrays, and tuples so raw point clouds can
/// be passed directly; simulation particle structs implement it by returning
/// their position field. Nothing else about the particle is interpreted:
/// species, radius, velocity and the rest stay opaque and reachable only
/// through the acceptance predicate.
pub trait PositionLike {
    fn x(&self) -> f32;
    fn y(&self) -> f32;
    fn z(&self) -> f32;

    /// Position as a packed vector.
    #[inline]
    fn position(&self) -> Vec3 {
        Vec3::new(self.x(), self.y(), self.z())
    }
}

impl PositionLike for Vec3 {
    #[inline(always)]
    fn x(&self) -> f32 {
        self.x
    }

    #[inline(always)]
    fn y(&self) -> f32 {
        self.y
    }

    #[inline(always)]
    fn z(&self) -> f32 {
        self.z
    }

    #[inline(always)]
    fn position(&self) -> Vec3 {
        *self
    }
}

impl PositionLike for Vec3A {
    #[inline(always)]
    fn x(&self) -> f32 {
        self.x
    }

    #[inline(always)]
    fn y(&self) -> f32 {
        self.y
    }

    #[inline(always)]
    fn z(&self) -> f32 {
        self.z
    }

    #[inline(always)]
    fn position(&self) -> Vec3 {
        Vec3::from(*self)
    }
}

impl PositionLike for [f32; 3] {
    #[inline(always)]
    fn x(&self) -> f32 {
        self[0]
    }

    #[inline(always)]
    fn y(&self) -> f32 {
        self[1]
    }

    #[inline(always)]
    fn z(&self) -> f32 {
        self[2]
    }
}

impl PositionLike for (f32, f32, f32) {
    #[inline(always)]
    fn x(&self) -> f32 {
        self.0
    }

    #[inline(always)]
    fn y(&self) -> f32 {
        self.1
    }

    #[inline(always)]
    fn z(&self) -> f32 {
        self.2
    }
}

/// Domain geometry: the position of bin `(0,0,0)`'s lower corner and the
/// per-axis inverse cell size.
///
/// The inverse is what binning multiplies by, so it is what gets stored;
/// [`Geometry::with_cell_size`] is the usual way to construct one. Values
/// are validated when a build starts, not here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub origin: Vec3,
    pub inv_cell_size: Vec3,
}

impl Geometry {
    /// Geometry with a uniform cell edge length.
    pub fn with_cell_size(origin: Vec3, cell_size: f32) -> Self {
        Self::with_cell_sizes(origin, Vec3::splat(cell_size))
    }

    /// Geometry with a per-axis cell edge length.
    pub fn with_cell_sizes(origin: Vec3, cell_size: Vec3) -> Self {
        Geometry {
            origin,
            inv_cell_size: cell_size.recip(),
        }
    }

    /// Unclamped global bin coordinates of a position.
    #[inline]
    pub fn bin_of(&self, pos: Vec3) -> IVec3 {
        ((pos - self.origin) * self.inv_cell_size).floor().as_ivec3()
    }
}

/// Inclusive bin-space bounds of the grid a build covers: the local domain
/// plus however much halo the caller padded in.
///
/// Positions binning outside the window are clamped into its boundary cells
/// rather than rejected, so the halo must be wide enough that a clamped
/// particle can never be a real interaction partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub lo: IVec3,
    pub hi: IVec3,
}

impl Window {
    pub fn new(lo: IVec3, hi: IVec3) -> Self {
        Window { lo, hi }
    }

    /// Smallest window whose bins cover `[bounds_lo, bounds_hi]` in position
    /// space.
    pub fn covering(geometry: &Geometry, bounds_lo: Vec3, bounds_hi: Vec3) -> Self {
        Window {
            lo: geometry.bin_of(bounds_lo),
            hi: geometry.bin_of(bounds_hi),
        }
    }

    /// Bins per axis. Meaningful only when `hi >= lo` on every axis, which a
    /// build checks first.
    #[inline]
    pub fn dims(&self) -> IVec3 {
        self.hi - self.lo + IVec3::ONE
    }
}

/// Ready-made acceptance predicate: true when two particles lie within
/// `cutoff` of each other (compared on squared distance).
pub fn within_cutoff<P: PositionLike>(cutoff: f32) -> impl Fn(&P, &P) -> bool {
    let cutoff_sq = cutoff * cutoff;
    move |a, b| a.position().distance_squared(b.position()) <= cutoff_sq
}
