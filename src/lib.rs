//! Cell-list neighbor search for particle simulations.
//!
//! Builds a [`NeighborList`] for a set of particles in three steps:
//!
//! - Bin particles into a regular grid of cells over a caller-supplied
//!   window, in CSR form.
//! - Count, per particle, the candidates in the surrounding stencil of
//!   cells that a caller-supplied predicate accepts.
//! - Fill a flat neighbor array sized exactly by those counts.
//!
//! Positions that bin outside the window clamp into its boundary cells, so
//! every particle gets a list; size the window with enough halo that
//! clamped particles cannot be real interaction partners. The predicate
//! runs twice per candidate pair (count pass and fill pass) and must be
//! pure and deterministic.
//!
//! ```
//! use glam::Vec3;
//! use nblist::{build, within_cutoff, Geometry, Window};
//!
//! let particles = vec![
//!     Vec3::new(0.5, 0.5, 0.5),
//!     Vec3::new(1.2, 0.5, 0.5),
//!     Vec3::new(4.5, 0.5, 0.5),
//! ];
//! let geometry = Geometry::with_cell_size(Vec3::ZERO, 1.0);
//! let window = Window::covering(&geometry, Vec3::ZERO, Vec3::splat(5.0));
//!
//! let list = build(&particles, window, geometry, within_cutoff(1.0)).unwrap();
//! assert_eq!(list.particle_count(), 3);
//! assert_eq!(list.neighbors_of(0).collect::<Vec<_>>(), vec![1]);
//! assert_eq!(list.neighbors_of(2).count(), 0);
//! ```

use std::time::Instant;

mod bin_grid;
mod error;
mod exec;
mod list;
mod pair_scan;
mod types;

pub use bin_grid::{BinGrid, GridStats};
pub use error::BuildError;
pub use list::{ListStats, NeighborList, Neighbors};
pub use types::{within_cutoff, Geometry, PositionLike, Window};

use exec::{Backend, Serial, Threaded};

/// Build options. Construct with [`Default`] and override fields.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Run the build phases on the rayon pool. The serial path visits
    /// particles in index order and is the deterministic reference.
    pub parallel: bool,
    /// Cells scanned around each home cell per axis. The default of 1 scans
    /// the 27-cell block; pair it with cells at least as large as the
    /// interaction range. Larger radii trade scan cost for smaller cells;
    /// a radius past the window scans the whole window.
    pub stencil_radius: usize,
    _private: (),
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            parallel: true,
            stencil_radius: 1,
            _private: (),
        }
    }
}

/// Build a neighbor list with the default configuration.
///
/// `window` gives the inclusive bin bounds of the grid and `geometry` maps
/// positions to bins. `accept` decides each candidate pair; it sees the
/// scanning particle first and never sees a particle paired with itself.
/// It must be pure and deterministic, and for the usual symmetric cutoff
/// the result lists each interacting pair in both directions. A predicate
/// that answers differently across the two build passes yields unspecified
/// list contents, never an out-of-bounds write.
pub fn build<P, F>(
    particles: &[P],
    window: Window,
    geometry: Geometry,
    accept: F,
) -> Result<NeighborList, BuildError>
where
    P: PositionLike + Sync,
    F: Fn(&P, &P) -> bool + Sync,
{
    build_with(particles, window, geometry, accept, &BuildConfig::default())
}

/// Build a neighbor list with explicit options.
pub fn build_with<P, F>(
    particles: &[P],
    window: Window,
    geometry: Geometry,
    accept: F,
    config: &BuildConfig,
) -> Result<NeighborList, BuildError>
where
    P: PositionLike + Sync,
    F: Fn(&P, &P) -> bool + Sync,
{
    if config.parallel {
        build_impl(particles, window, geometry, &accept, config, &Threaded)
    } else {
        build_impl(particles, window, geometry, &accept, config, &Serial)
    }
}

fn build_impl<P, F, B>(
    particles: &[P],
    window: Window,
    geometry: Geometry,
    accept: &F,
    config: &BuildConfig,
    backend: &B,
) -> Result<NeighborList, BuildError>
where
    P: PositionLike + Sync,
    F: Fn(&P, &P) -> bool + Sync,
    B: Backend,
{
    let radius = config.stencil_radius.min(i32::MAX as usize) as i32;

    let start = Instant::now();
    let bins = BinGrid::build(particles, window, geometry, backend)?;
    log::debug!(
        "binned {} particles into {} cells in {:.1?}",
        bins.particle_count(),
        bins.num_cells(),
        start.elapsed()
    );

    let start = Instant::now();
    let counts = pair_scan::count_neighbors(&bins, particles, radius, accept, backend);
    let (offsets, total) = pair_scan::neighbor_offsets(&counts, backend)?;
    log::debug!("counted {total} accepted pairs in {:.1?}", start.elapsed());

    let start = Instant::now();
    let neighbors =
        pair_scan::fill_neighbors(&bins, particles, radius, accept, &offsets, total, backend);
    log::debug!("filled neighbor array in {:.1?}", start.elapsed());

    Ok(NeighborList::from_parts(bins, counts, offsets, neighbors))
}
