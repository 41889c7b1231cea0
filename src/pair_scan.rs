//! Stencil scan over neighboring cells, run twice per build: once to count
//! accepted pairs per particle, once to fill the flat neighbor array.
//!
//! Both passes walk candidates through the same [`scan_stencil`] routine,
//! so a deterministic predicate sees an identical candidate sequence and
//! the fill lands exactly on the counted capacity. The fill never writes
//! past that capacity either way: a predicate that answers differently
//! across the passes corrupts results, not memory. Neither pass takes a
//! lock or touches an atomic; the fill writes through per-particle cursors
//! into slots the count pass already reserved.

use glam::IVec3;

use crate::bin_grid::BinGrid;
use crate::error::BuildError;
use crate::exec::{Backend, DisjointSlice};
use crate::types::PositionLike;

/// Visit every accepted neighbor of particle `i` within `radius` cells of
/// its home cell. The stencil clamps at window edges and never wraps, and
/// an oversized radius saturates to the whole window; particle `i` itself
/// is skipped by index, so a self-accepting predicate still yields no self
/// pair.
#[inline]
fn scan_stencil<P, F, H>(
    grid: &BinGrid,
    particles: &[P],
    i: usize,
    radius: i32,
    accept: &F,
    mut hit: H,
) where
    P: PositionLike,
    F: Fn(&P, &P) -> bool,
    H: FnMut(u32),
{
    let dims = grid.dims();
    let home = grid.cell_bin(grid.cell_of(i));
    let lo = home.saturating_sub(IVec3::splat(radius)).max(IVec3::ZERO);
    let hi = home.saturating_add(IVec3::splat(radius)).min(dims - IVec3::ONE);
    let pi = &particles[i];

    for x in lo.x..=hi.x {
        for y in lo.y..=hi.y {
            for z in lo.z..=hi.z {
                let cell = grid.cell_index(IVec3::new(x, y, z));
                for &j in grid.cell_particles(cell) {
                    if j as usize == i {
                        continue;
                    }
                    if accept(pi, &particles[j as usize]) {
                        hit(j);
                    }
                }
            }
        }
    }
}

/// Accepted-pair count per particle.
pub(crate) fn count_neighbors<P, F, B>(
    grid: &BinGrid,
    particles: &[P],
    radius: i32,
    accept: &F,
    backend: &B,
) -> Vec<u32>
where
    P: PositionLike + Sync,
    F: Fn(&P, &P) -> bool + Sync,
    B: Backend,
{
    backend.map_u32(particles.len(), |i| {
        let mut count = 0u32;
        scan_stencil(grid, particles, i, radius, accept, |_| count += 1);
        count
    })
}

/// CSR offsets over per-particle counts, rejecting totals past u32 indexing.
pub(crate) fn neighbor_offsets<B: Backend>(
    counts: &[u32],
    backend: &B,
) -> Result<(Vec<u32>, usize), BuildError> {
    let (offsets, total) = backend.exclusive_scan(counts);
    if total > u64::from(u32::MAX) {
        return Err(BuildError::NeighborCapacity { required: total });
    }
    Ok((offsets, total as usize))
}

/// Re-scan and scatter neighbor indices into a flat array sized by the
/// count pass. Each particle writes its own offset range, so no two tasks
/// share a slot. Acceptances past a particle's reserved range are dropped;
/// only a deterministic predicate fills every range exactly.
pub(crate) fn fill_neighbors<P, F, B>(
    grid: &BinGrid,
    particles: &[P],
    radius: i32,
    accept: &F,
    offsets: &[u32],
    total: usize,
    backend: &B,
) -> Vec<u32>
where
    P: PositionLike + Sync,
    F: Fn(&P, &P) -> bool + Sync,
    B: Backend,
{
    let mut neighbors = vec![0u32; total];
    {
        let out = DisjointSlice::new(&mut neighbors);
        backend.for_each(particles.len(), |i| {
            let mut cursor = offsets[i] as usize;
            let end = offsets[i + 1] as usize;
            scan_stencil(grid, particles, i, radius, accept, |j| {
                // The bound holds even if the predicate accepts more pairs
                // than the count pass reserved.
                if cursor < end {
                    unsafe { out.write(cursor, j) };
                    cursor += 1;
                }
            });
            debug_assert_eq!(
                cursor, end,
                "predicate accepted fewer pairs than the count pass; \
                 predicates must be deterministic"
            );
        });
    }
    neighbors
}
