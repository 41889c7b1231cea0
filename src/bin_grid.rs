//! Regular 3-D bin grid over a window of cells, with particles bucketized
//! into a CSR layout by counting sort.
//!
//! The build is race-free under any execution order: the only cross-task
//! writes are two atomic counters (per-cell population, then per-cell
//! scatter cursor); everything else is a disjoint write or a read of a
//! fully built array. Intra-cell particle order is whatever the schedule
//! produced and is not part of the contract.

use std::sync::atomic::{AtomicU32, Ordering};

use glam::{IVec3, Vec3};

use crate::error::BuildError;
use crate::exec::{Backend, DisjointSlice};
use crate::types::{Geometry, PositionLike, Window};

/// Particles bucketized by cell: CSR offsets over cells plus a permutation
/// of particle indices grouped by cell.
pub struct BinGrid {
    geometry: Geometry,
    window: Window,
    dims: IVec3,
    /// Cell index per particle. Length: particle count.
    particle_cells: Vec<u32>,
    /// Start index into `permutation` for each cell, plus final length.
    /// Length: num_cells + 1.
    cell_offsets: Vec<u32>,
    /// Particle indices grouped by cell. Length: particle count.
    permutation: Vec<u32>,
}

/// Occupancy summary of a built grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridStats {
    pub num_cells: usize,
    pub occupied_cells: usize,
    pub max_per_cell: u32,
    pub mean_per_occupied_cell: f32,
}

fn validate(window: Window, geometry: Geometry) -> Result<(), BuildError> {
    let inv = geometry.inv_cell_size;
    if !inv.is_finite() || inv.cmple(Vec3::ZERO).any() {
        return Err(BuildError::BadCellSize { inv_cell_size: inv });
    }
    if window.hi.cmplt(window.lo).any() {
        return Err(BuildError::EmptyWindow {
            lo: window.lo,
            hi: window.hi,
        });
    }
    let dx = i64::from(window.hi.x) - i64::from(window.lo.x) + 1;
    let dy = i64::from(window.hi.y) - i64::from(window.lo.y) + 1;
    let dz = i64::from(window.hi.z) - i64::from(window.lo.z) + 1;
    let cells = dx as u128 * dy as u128 * dz as u128;
    let axis_limit = i64::from(i32::MAX);
    if cells > u128::from(u32::MAX) || dx > axis_limit || dy > axis_limit || dz > axis_limit {
        return Err(BuildError::TooManyCells { cells });
    }
    Ok(())
}

impl BinGrid {
    /// Bucketize `particles` into the window's cells.
    ///
    /// Positions binning outside the window clamp into its boundary cells;
    /// sizing the halo so that clamped particles cannot matter is the
    /// caller's job.
    pub(crate) fn build<P, B>(
        particles: &[P],
        window: Window,
        geometry: Geometry,
        backend: &B,
    ) -> Result<Self, BuildError>
    where
        P: PositionLike + Sync,
        B: Backend,
    {
        validate(window, geometry)?;
        let n = particles.len();
        if n > u32::MAX as usize {
            return Err(BuildError::TooManyParticles { count: n });
        }
        let dims = window.dims();
        let num_cells = dims.x as usize * dims.y as usize * dims.z as usize;

        // Pass 1: bin every particle and count cell populations. The counter
        // increment is the only shared write; the cell record is disjoint
        // per particle.
        let counts: Vec<AtomicU32> = (0..num_cells).map(|_| AtomicU32::new(0)).collect();
        let mut particle_cells = vec![0u32; n];
        {
            let cells_out = DisjointSlice::new(&mut particle_cells);
            backend.for_each(n, |i| {
                let bin = clamped_bin(geometry, window, particles[i].position());
                let cell = linearize(dims, bin);
                unsafe { cells_out.write(i, cell) };
                counts[cell as usize].fetch_add(1, Ordering::Relaxed);
            });
        }

        // Pass 2: prefix-sum the populations into CSR offsets.
        let counts: Vec<u32> = counts.into_iter().map(AtomicU32::into_inner).collect();
        let (cell_offsets, total) = backend.exclusive_scan(&counts);
        debug_assert_eq!(total, n as u64);

        // Pass 3: scatter particle indices to their cells. The cursor
        // fetch_add hands out each slot exactly once, so the writes are
        // disjoint.
        let cursors: Vec<AtomicU32> = cell_offsets[..num_cells]
            .iter()
            .map(|&offset| AtomicU32::new(offset))
            .collect();
        let mut permutation = vec![0u32; n];
        {
            let perm_out = DisjointSlice::new(&mut permutation);
            let particle_cells = &particle_cells;
            backend.for_each(n, |i| {
                let cell = particle_cells[i] as usize;
                let slot = cursors[cell].fetch_add(1, Ordering::Relaxed) as usize;
                unsafe { perm_out.write(slot, i as u32) };
            });
        }

        Ok(BinGrid {
            geometry,
            window,
            dims,
            particle_cells,
            cell_offsets,
            permutation,
        })
    }

    /// Bins per axis.
    #[inline]
    pub fn dims(&self) -> IVec3 {
        self.dims
    }

    #[inline]
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    #[inline]
    pub fn window(&self) -> Window {
        self.window
    }

    #[inline]
    pub fn num_cells(&self) -> usize {
        self.cell_offsets.len() - 1
    }

    #[inline]
    pub fn particle_count(&self) -> usize {
        self.particle_cells.len()
    }

    /// Cell a position bins into, with the same clamping as the build.
    #[inline]
    pub fn cell_containing(&self, pos: Vec3) -> u32 {
        linearize(self.dims, clamped_bin(self.geometry, self.window, pos))
    }

    /// Cell particle `i` was binned into.
    #[inline]
    pub fn cell_of(&self, i: usize) -> u32 {
        self.particle_cells[i]
    }

    /// Cell index per particle, in input order.
    #[inline]
    pub fn particle_cells(&self) -> &[u32] {
        &self.particle_cells
    }

    /// CSR offsets into [`BinGrid::permutation`], length `num_cells() + 1`.
    #[inline]
    pub fn cell_offsets(&self) -> &[u32] {
        &self.cell_offsets
    }

    /// Particle indices grouped by cell; a bijection on `[0, particle_count)`.
    #[inline]
    pub fn permutation(&self) -> &[u32] {
        &self.permutation
    }

    /// Particle indices binned into `cell`.
    #[inline]
    pub fn cell_particles(&self, cell: u32) -> &[u32] {
        let start = self.cell_offsets[cell as usize] as usize;
        let end = self.cell_offsets[cell as usize + 1] as usize;
        &self.permutation[start..end]
    }

    /// Linear index of window-local bin coordinates (debug-asserted in
    /// range).
    #[inline]
    pub fn cell_index(&self, bin: IVec3) -> u32 {
        debug_assert!(bin.cmpge(IVec3::ZERO).all() && bin.cmplt(self.dims).all());
        linearize(self.dims, bin)
    }

    /// Window-local bin coordinates of a linear cell index.
    #[inline]
    pub fn cell_bin(&self, cell: u32) -> IVec3 {
        let ny = self.dims.y as u32;
        let nz = self.dims.z as u32;
        let z = cell % nz;
        let rest = cell / nz;
        let y = rest % ny;
        let x = rest / ny;
        IVec3::new(x as i32, y as i32, z as i32)
    }

    pub fn stats(&self) -> GridStats {
        let mut occupied = 0usize;
        let mut max = 0u32;
        for pair in self.cell_offsets.windows(2) {
            let len = pair[1] - pair[0];
            if len > 0 {
                occupied += 1;
                max = max.max(len);
            }
        }
        let mean = if occupied == 0 {
            0.0
        } else {
            self.particle_count() as f32 / occupied as f32
        };
        GridStats {
            num_cells: self.num_cells(),
            occupied_cells: occupied,
            max_per_cell: max,
            mean_per_occupied_cell: mean,
        }
    }
}

/// Window-local bin of a position, clamped into `[0, dims)` per axis.
/// Non-finite coordinates saturate through the float cast and end up
/// clamped like any other out-of-window position. Clamping happens before
/// the shift to window-local coordinates so a saturated global bin cannot
/// overflow the subtraction.
#[inline]
fn clamped_bin(geometry: Geometry, window: Window, pos: Vec3) -> IVec3 {
    geometry.bin_of(pos).clamp(window.lo, window.hi) - window.lo
}

/// `(x*ny + y)*nz + z`, x-major with z fastest. Computed in u32: the
/// validated window guarantees the result and every intermediate fit.
#[inline]
fn linearize(dims: IVec3, bin: IVec3) -> u32 {
    let (ny, nz) = (dims.y as u32, dims.z as u32);
    (bin.x as u32 * ny + bin.y as u32) * nz + bin.z as u32
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::exec::{Serial, Threaded};

    fn unit_grid(extent: i32) -> (Geometry, Window) {
        let geometry = Geometry::with_cell_size(Vec3::ZERO, 1.0);
        let window = Window::new(IVec3::ZERO, IVec3::splat(extent - 1));
        (geometry, window)
    }

    fn scattered(n: usize, edge: f32, seed: u64) -> Vec<Vec3> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                Vec3::new(
                    rng.gen_range(0.0..edge),
                    rng.gen_range(0.0..edge),
                    rng.gen_range(0.0..edge),
                )
            })
            .collect()
    }

    #[test]
    fn linearization_is_x_major_z_fastest() {
        let (geometry, window) = unit_grid(4);
        let grid = BinGrid::build::<Vec3, _>(&[], window, geometry, &Serial).unwrap();
        // dims 4x4x4: (1,2,3) -> (1*4 + 2)*4 + 3
        assert_eq!(grid.cell_index(IVec3::new(1, 2, 3)), 27);
        assert_eq!(grid.cell_bin(27), IVec3::new(1, 2, 3));
        for cell in 0..grid.num_cells() as u32 {
            assert_eq!(grid.cell_index(grid.cell_bin(cell)), cell);
        }
    }

    #[test]
    fn positions_bin_into_their_cells() {
        let (geometry, window) = unit_grid(4);
        let particles = vec![
            Vec3::new(0.5, 0.5, 0.5),
            Vec3::new(3.9, 0.1, 2.5),
            Vec3::new(1.0, 1.0, 1.0),
        ];
        let grid = BinGrid::build(&particles, window, geometry, &Serial).unwrap();
        assert_eq!(grid.cell_of(0), grid.cell_index(IVec3::new(0, 0, 0)));
        assert_eq!(grid.cell_of(1), grid.cell_index(IVec3::new(3, 0, 2)));
        assert_eq!(grid.cell_of(2), grid.cell_index(IVec3::new(1, 1, 1)));
    }

    #[test]
    fn window_offset_shifts_local_bins() {
        let geometry = Geometry::with_cell_size(Vec3::ZERO, 1.0);
        let window = Window::new(IVec3::new(-2, -2, -2), IVec3::new(1, 1, 1));
        let particles = vec![Vec3::new(-1.5, -0.5, 0.5)];
        let grid = BinGrid::build(&particles, window, geometry, &Serial).unwrap();
        assert_eq!(grid.cell_of(0), grid.cell_index(IVec3::new(0, 1, 2)));
    }

    #[test]
    fn out_of_window_positions_clamp_to_boundary_cells() {
        let (geometry, window) = unit_grid(4);
        let particles = vec![
            Vec3::new(-10.0, 2.5, 2.5),
            Vec3::new(99.0, 99.0, 99.0),
            Vec3::new(4.0, 0.0, 0.0), // exactly past the last bin edge
            Vec3::new(f32::NAN, 0.5, 0.5),
        ];
        let grid = BinGrid::build(&particles, window, geometry, &Serial).unwrap();
        assert_eq!(grid.cell_of(0), grid.cell_index(IVec3::new(0, 2, 2)));
        assert_eq!(grid.cell_of(1), grid.cell_index(IVec3::new(3, 3, 3)));
        assert_eq!(grid.cell_of(2), grid.cell_index(IVec3::new(3, 0, 0)));
        assert_eq!(grid.cell_of(3), grid.cell_index(IVec3::new(0, 0, 0)));
        for (i, p) in particles.iter().enumerate() {
            assert_eq!(grid.cell_containing(*p), grid.cell_of(i));
        }
    }

    #[test]
    fn every_particle_lands_in_its_cell_slice() {
        let (geometry, window) = unit_grid(8);
        let particles = scattered(500, 8.0, 42);
        let grid = BinGrid::build(&particles, window, geometry, &Serial).unwrap();

        let mut seen = 0usize;
        for cell in 0..grid.num_cells() as u32 {
            for &i in grid.cell_particles(cell) {
                assert_eq!(grid.cell_of(i as usize), cell);
                seen += 1;
            }
        }
        assert_eq!(seen, particles.len());
    }

    #[test]
    fn permutation_is_a_bijection() {
        let (geometry, window) = unit_grid(8);
        let particles = scattered(1000, 8.0, 7);
        for parallel in [false, true] {
            let grid = if parallel {
                BinGrid::build(&particles, window, geometry, &Threaded).unwrap()
            } else {
                BinGrid::build(&particles, window, geometry, &Serial).unwrap()
            };
            let mut perm = grid.permutation().to_vec();
            perm.sort_unstable();
            assert!(perm.iter().enumerate().all(|(i, &p)| p == i as u32));
        }
    }

    #[test]
    fn offsets_match_recounted_populations() {
        let (geometry, window) = unit_grid(6);
        let particles = scattered(400, 6.0, 99);
        let grid = BinGrid::build(&particles, window, geometry, &Threaded).unwrap();

        let mut recount = vec![0u32; grid.num_cells()];
        for &cell in grid.particle_cells() {
            recount[cell as usize] += 1;
        }
        for (cell, pair) in grid.cell_offsets().windows(2).enumerate() {
            assert_eq!(pair[1] - pair[0], recount[cell]);
        }
        assert_eq!(*grid.cell_offsets().last().unwrap() as usize, particles.len());
    }

    #[test]
    fn threaded_build_matches_serial_up_to_cell_order() {
        let (geometry, window) = unit_grid(8);
        let particles = scattered(800, 8.0, 3);
        let serial = BinGrid::build(&particles, window, geometry, &Serial).unwrap();
        let threaded = BinGrid::build(&particles, window, geometry, &Threaded).unwrap();

        assert_eq!(serial.particle_cells(), threaded.particle_cells());
        assert_eq!(serial.cell_offsets(), threaded.cell_offsets());
        for cell in 0..serial.num_cells() as u32 {
            let mut a = serial.cell_particles(cell).to_vec();
            let mut b = threaded.cell_particles(cell).to_vec();
            a.sort_unstable();
            b.sort_unstable();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn empty_input_builds_an_empty_grid() {
        let (geometry, window) = unit_grid(4);
        let grid = BinGrid::build::<Vec3, _>(&[], window, geometry, &Serial).unwrap();
        assert_eq!(grid.particle_count(), 0);
        assert_eq!(grid.num_cells(), 64);
        assert!(grid.cell_offsets().iter().all(|&o| o == 0));
    }

    #[test]
    fn stats_summarize_occupancy() {
        let (geometry, window) = unit_grid(4);
        let particles = vec![
            Vec3::new(0.5, 0.5, 0.5),
            Vec3::new(0.6, 0.5, 0.5),
            Vec3::new(2.5, 2.5, 2.5),
        ];
        let grid = BinGrid::build(&particles, window, geometry, &Serial).unwrap();
        let stats = grid.stats();
        assert_eq!(stats.num_cells, 64);
        assert_eq!(stats.occupied_cells, 2);
        assert_eq!(stats.max_per_cell, 2);
        assert!((stats.mean_per_occupied_cell - 1.5).abs() < 1e-6);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let geometry = Geometry::with_cell_size(Vec3::ZERO, 1.0);
        let window = Window::new(IVec3::ZERO, IVec3::new(3, -1, 3));
        let result = BinGrid::build::<Vec3, _>(&[], window, geometry, &Serial);
        assert!(matches!(result, Err(BuildError::EmptyWindow { .. })));

        let window = Window::new(IVec3::ZERO, IVec3::splat(3));
        for bad in [0.0f32, -1.0, f32::NAN, f32::INFINITY] {
            let geometry = Geometry::with_cell_size(Vec3::ZERO, bad);
            let result = BinGrid::build::<Vec3, _>(&[], window, geometry, &Serial);
            assert!(matches!(result, Err(BuildError::BadCellSize { .. })), "cell size {bad}");
        }

        let geometry = Geometry::with_cell_size(Vec3::ZERO, 1.0);
        let window = Window::new(IVec3::ZERO, IVec3::splat(2_000));
        let result = BinGrid::build::<Vec3, _>(&[], window, geometry, &Serial);
        assert!(matches!(result, Err(BuildError::TooManyCells { .. })));
    }
}
