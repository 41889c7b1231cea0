//! The built neighbor list: flat CSR storage over particles, plus read-only
//! views for iterating a particle's neighbors.

use std::io;

use crate::bin_grid::BinGrid;

/// Neighbor indices per particle in CSR form, together with the bin grid
/// they were derived from.
///
/// All storage is owned and immutable after the build; shared reads from
/// any number of threads are fine.
pub struct NeighborList {
    bins: BinGrid,
    /// Accepted-pair count per particle. Redundant with `neighbor_offsets`
    /// differences, kept so callers can read counts without subtracting.
    neighbor_counts: Vec<u32>,
    /// Start index into `neighbors` for each particle, plus final length.
    /// Length: particle count + 1.
    neighbor_offsets: Vec<u32>,
    /// Neighbor particle indices, grouped by source particle.
    neighbors: Vec<u32>,
}

/// Size summary of a built list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListStats {
    pub total_neighbors: usize,
    pub max_per_particle: u32,
    pub mean_per_particle: f32,
}

impl NeighborList {
    pub(crate) fn from_parts(
        bins: BinGrid,
        neighbor_counts: Vec<u32>,
        neighbor_offsets: Vec<u32>,
        neighbors: Vec<u32>,
    ) -> Self {
        debug_assert_eq!(neighbor_offsets.len(), neighbor_counts.len() + 1);
        debug_assert_eq!(neighbor_offsets.len(), bins.particle_count() + 1);
        debug_assert_eq!(*neighbor_offsets.last().unwrap_or(&0) as usize, neighbors.len());
        NeighborList {
            bins,
            neighbor_counts,
            neighbor_offsets,
            neighbors,
        }
    }

    #[inline]
    pub fn particle_count(&self) -> usize {
        self.neighbor_offsets.len() - 1
    }

    #[inline]
    pub fn total_neighbors(&self) -> usize {
        self.neighbors.len()
    }

    /// The bin grid the list was built over.
    #[inline]
    pub fn bins(&self) -> &BinGrid {
        &self.bins
    }

    /// CSR offsets into [`NeighborList::flat_indices`], length
    /// `particle_count() + 1`.
    #[inline]
    pub fn offsets(&self) -> &[u32] {
        &self.neighbor_offsets
    }

    /// All neighbor indices, grouped by source particle.
    #[inline]
    pub fn flat_indices(&self) -> &[u32] {
        &self.neighbors
    }

    #[inline]
    pub fn neighbor_counts(&self) -> &[u32] {
        &self.neighbor_counts
    }

    #[inline]
    pub fn neighbor_count(&self, i: usize) -> u32 {
        self.neighbor_counts[i]
    }

    /// Neighbor indices of particle `i` as a slice of the flat storage.
    #[inline]
    pub fn neighbor_indices(&self, i: usize) -> &[u32] {
        let start = self.neighbor_offsets[i] as usize;
        let end = self.neighbor_offsets[i + 1] as usize;
        &self.neighbors[start..end]
    }

    /// Iterate the neighbor indices of particle `i` as `usize`.
    #[inline]
    pub fn neighbors_of(&self, i: usize) -> Neighbors<'_> {
        Neighbors {
            inner: self.neighbor_indices(i).iter(),
        }
    }

    /// Iterate the neighbors of particle `i` as references into `particles`,
    /// which must be the slice the list was built from.
    #[inline]
    pub fn neighbor_particles<'a, P>(
        &'a self,
        i: usize,
        particles: &'a [P],
    ) -> impl Iterator<Item = &'a P> + 'a {
        self.neighbors_of(i).map(move |j| &particles[j])
    }

    pub fn stats(&self) -> ListStats {
        let max = self.neighbor_counts.iter().copied().max().unwrap_or(0);
        let mean = if self.particle_count() == 0 {
            0.0
        } else {
            self.total_neighbors() as f32 / self.particle_count() as f32
        };
        ListStats {
            total_neighbors: self.total_neighbors(),
            max_per_particle: max,
            mean_per_particle: mean,
        }
    }

    /// Write one line per particle: the particle index, a colon, then its
    /// neighbor indices separated by spaces.
    pub fn dump<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        for i in 0..self.particle_count() {
            write!(writer, "{i}:")?;
            for &j in self.neighbor_indices(i) {
                write!(writer, " {j}")?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}

/// Iterator over one particle's neighbor indices.
pub struct Neighbors<'a> {
    inner: std::slice::Iter<'a, u32>,
}

impl Iterator for Neighbors<'_> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        self.inner.next().map(|&j| j as usize)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Neighbors<'_> {}
impl std::iter::FusedIterator for Neighbors<'_> {}

#[cfg(test)]
mod tests {
    use glam::{IVec3, Vec3};

    use super::*;
    use crate::exec::Serial;
    use crate::types::{Geometry, Window};

    fn three_particle_list() -> NeighborList {
        // 0 and 1 adjacent, 2 alone; hand-built CSR: 0 -> [1, 2], 1 -> [],
        // 2 -> [0].
        let geometry = Geometry::with_cell_size(Vec3::ZERO, 1.0);
        let window = Window::new(IVec3::ZERO, IVec3::splat(3));
        let particles = vec![
            Vec3::splat(0.5),
            Vec3::splat(1.5),
            Vec3::splat(3.5),
        ];
        let bins = BinGrid::build(&particles, window, geometry, &Serial).unwrap();
        NeighborList::from_parts(bins, vec![2, 0, 1], vec![0, 2, 2, 3], vec![1, 2, 0])
    }

    #[test]
    fn slices_follow_offsets() {
        let list = three_particle_list();
        assert_eq!(list.particle_count(), 3);
        assert_eq!(list.total_neighbors(), 3);
        assert_eq!(list.neighbor_indices(0), &[1, 2]);
        assert_eq!(list.neighbor_indices(1), &[]);
        assert_eq!(list.neighbor_indices(2), &[0]);
        assert_eq!(list.neighbor_count(0), 2);
    }

    #[test]
    fn iterator_yields_usize_indices_with_exact_size() {
        let list = three_particle_list();
        let neighbors = list.neighbors_of(0);
        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors.collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(list.neighbors_of(1).count(), 0);
    }

    #[test]
    fn particle_view_derefs_into_the_source_slice() {
        let list = three_particle_list();
        let particles = vec![
            Vec3::splat(0.5),
            Vec3::splat(1.5),
            Vec3::splat(3.5),
        ];
        let seen: Vec<Vec3> = list.neighbor_particles(0, &particles).copied().collect();
        assert_eq!(seen, vec![Vec3::splat(1.5), Vec3::splat(3.5)]);
    }

    #[test]
    fn dump_writes_one_line_per_particle() {
        let list = three_particle_list();
        let mut out = Vec::new();
        list.dump(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "0: 1 2\n1:\n2: 0\n");
    }

    #[test]
    fn stats_summarize_the_list() {
        let list = three_particle_list();
        let stats = list.stats();
        assert_eq!(stats.total_neighbors, 3);
        assert_eq!(stats.max_per_particle, 2);
        assert!((stats.mean_per_particle - 1.0).abs() < 1e-6);
    }
}
