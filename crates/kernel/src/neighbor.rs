//! Uniform-grid spatial hash built by a parallel counting sort.
//!
//! Uses sorted-assignment + cell-offset arrays rather than `HashMap` so the
//! data layout maps directly to GPU buffers (no pointer chasing). A rebuild
//! runs four passes, each a barrier:
//!
//! 1. discretize every particle into a cell and bump that cell's histogram
//!    counter,
//! 2. exclusive-scan the histogram,
//! 3. claim a slot per particle from the scanned write heads and scatter,
//! 4. mark the start and length of every occupied cell's run.

use std::ops::Range;

use rayon::prelude::*;

use crate::bounds::Aabb;
use crate::counter::AtomicCounters;
use crate::scan;

/// `CellOffset::start` for a cell no particle landed in.
pub const EMPTY_CELL: i32 = -1;

/// Which cell one particle belongs to this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellAssignment {
    /// Index into the particle arrays.
    pub particle_index: u32,
    /// Integer cell coordinates, each in `[0, cells_per_axis)`.
    pub cell: [u32; 3],
    /// Row-major key `i + j*W + k*W*H`.
    pub key: u32,
}

/// Contiguous run of one cell inside the sorted assignment array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellOffset {
    /// First sorted index of the run, or [`EMPTY_CELL`].
    pub start: i32,
    /// Number of particles in the run.
    pub length: u32,
}

impl CellOffset {
    /// Offset of an unoccupied cell.
    pub const EMPTY: CellOffset = CellOffset {
        start: EMPTY_CELL,
        length: 0,
    };

    /// Whether no particle landed in this cell.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == EMPTY_CELL
    }

    /// Sorted-array range covered by this cell, `None` when empty.
    #[inline]
    pub fn range(&self) -> Option<Range<usize>> {
        if self.is_empty() {
            None
        } else {
            let start = self.start as usize;
            Some(start..start + self.length as usize)
        }
    }
}

/// Geometry of the grid for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    /// Domain minimum corner the grid is anchored at.
    pub origin: [f32; 3],
    /// Cell edge lengths, `extent / cells_per_axis`.
    pub cell_size: [f32; 3],
    /// Cells per axis (W, H, D).
    pub dims: [u32; 3],
    /// Stencil half-width per axis. One unless a cell is narrower than the
    /// smoothing radius.
    pub reach: [u32; 3],
}

impl GridLayout {
    /// Layout covering `domain` with `dims` cells, searched with radius `h`.
    pub fn new(domain: &Aabb, dims: [u32; 3], h: f32) -> Self {
        let extent = domain.extent();
        let mut cell_size = [0.0f32; 3];
        let mut reach = [1u32; 3];
        for axis in 0..3 {
            let cells = dims[axis].max(1);
            cell_size[axis] = extent[axis] / cells as f32;
            let needed = (h / cell_size[axis]).ceil();
            if needed.is_finite() && needed > 1.0 {
                reach[axis] = (needed as u32).min(cells);
            }
        }
        Self {
            origin: domain.min,
            cell_size,
            dims: [dims[0].max(1), dims[1].max(1), dims[2].max(1)],
            reach,
        }
    }

    /// Total number of cells.
    pub fn cell_count(&self) -> usize {
        self.dims[0] as usize * self.dims[1] as usize * self.dims[2] as usize
    }

    /// Cell containing `(x, y, z)`, clamped into the grid.
    #[inline]
    pub fn cell_of(&self, x: f32, y: f32, z: f32) -> [u32; 3] {
        let p = [x, y, z];
        let mut cell = [0u32; 3];
        for axis in 0..3 {
            let f = ((p[axis] - self.origin[axis]) / self.cell_size[axis]).floor();
            // NaN casts to 0
            cell[axis] = (f.max(0.0) as u32).min(self.dims[axis] - 1);
        }
        cell
    }

    /// Row-major linear key of `cell`.
    #[inline]
    pub fn key(&self, cell: [u32; 3]) -> u32 {
        cell[0] + cell[1] * self.dims[0] + cell[2] * self.dims[0] * self.dims[1]
    }
}

/// Spatial hash grid rebuilt once per frame.
#[derive(Debug)]
pub struct SpatialHashGrid {
    layout: GridLayout,
    unsorted: Vec<CellAssignment>,
    sorted: Vec<CellAssignment>,
    histogram: AtomicCounters,
    histogram_values: Vec<u32>,
    prefix_sums: Vec<u32>,
    write_heads: AtomicCounters,
    sorted_slots: AtomicCounters,
    offsets: Vec<CellOffset>,
}

impl SpatialHashGrid {
    /// Empty grid over `domain`. Call [`SpatialHashGrid::rebuild`] before
    /// querying.
    pub fn new(domain: &Aabb, dims: [u32; 3], h: f32) -> Self {
        let layout = GridLayout::new(domain, dims, h);
        let cells = layout.cell_count();
        Self {
            layout,
            unsorted: Vec::new(),
            sorted: Vec::new(),
            histogram: AtomicCounters::zeroed(cells),
            histogram_values: vec![0; cells],
            prefix_sums: vec![0; cells],
            write_heads: AtomicCounters::zeroed(cells),
            sorted_slots: AtomicCounters::zeroed(0),
            offsets: vec![CellOffset::EMPTY; cells],
        }
    }

    /// Rebuild the grid from positions `(x, y, z)` inside `domain`.
    ///
    /// The three slices must all have the same length (one entry per particle).
    pub fn rebuild(&mut self, x: &[f32], y: &[f32], z: &[f32], domain: &Aabb, dims: [u32; 3], h: f32) {
        let n = x.len();
        debug_assert_eq!(n, y.len());
        debug_assert_eq!(n, z.len());

        self.layout = GridLayout::new(domain, dims, h);
        let layout = self.layout;
        let cells = layout.cell_count();

        // --- 1. Discretize + histogram ---
        self.histogram.reset(cells);
        let histogram = &self.histogram;
        (0..n)
            .into_par_iter()
            .map(|i| {
                let cell = layout.cell_of(x[i], y[i], z[i]);
                let key = layout.key(cell);
                histogram.increment(key as usize);
                CellAssignment {
                    particle_index: i as u32,
                    cell,
                    key,
                }
            })
            .collect_into_vec(&mut self.unsorted);
        self.histogram_values = self.histogram.snapshot();

        // --- 2. Scan ---
        scan::exclusive_scan_into(&self.histogram_values, &mut self.prefix_sums);

        // --- 3. Counting sort ---
        self.write_heads.load_from(&self.prefix_sums);
        self.sorted_slots.reset(n);
        let heads = &self.write_heads;
        let slots = &self.sorted_slots;
        self.unsorted.par_iter().for_each(|a| {
            let slot = heads.increment(a.key as usize);
            slots.store(slot as usize, a.particle_index);
        });
        let unsorted = &self.unsorted;
        (0..n)
            .into_par_iter()
            .map(|s| unsorted[slots.get(s) as usize])
            .collect_into_vec(&mut self.sorted);

        // --- 4. Bin lookup ---
        self.offsets.clear();
        self.offsets.resize(cells, CellOffset::EMPTY);
        let sorted = &self.sorted;
        let starts: Vec<(usize, CellOffset)> = (0..n)
            .into_par_iter()
            .filter(|&s| s == 0 || sorted[s].key != sorted[s - 1].key)
            .map(|s| {
                let key = sorted[s].key;
                let mut end = s + 1;
                while end < n && sorted[end].key == key {
                    end += 1;
                }
                (
                    key as usize,
                    CellOffset {
                        start: s as i32,
                        length: (end - s) as u32,
                    },
                )
            })
            .collect();
        for (key, offset) in starts {
            self.offsets[key] = offset;
        }
    }

    /// Current layout.
    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    /// Assignments in particle order.
    pub fn unsorted(&self) -> &[CellAssignment] {
        &self.unsorted
    }

    /// Assignments sorted by ascending key.
    pub fn sorted(&self) -> &[CellAssignment] {
        &self.sorted
    }

    /// Per-cell occupancy counts.
    pub fn histogram(&self) -> &[u32] {
        &self.histogram_values
    }

    /// Exclusive prefix sums of the histogram.
    pub fn prefix_sums(&self) -> &[u32] {
        &self.prefix_sums
    }

    /// Per-cell runs in the sorted array.
    pub fn offsets(&self) -> &[CellOffset] {
        &self.offsets
    }

    /// Number of cells holding at least one particle.
    pub fn occupied_cells(&self) -> usize {
        self.offsets.iter().filter(|o| !o.is_empty()).count()
    }

    /// Visit every particle in the stencil around particle `i`'s cell,
    /// including `i` itself. Candidates are not filtered by distance.
    #[inline]
    pub fn for_each_candidate<F>(&self, i: usize, mut f: F)
    where
        F: FnMut(usize),
    {
        let cell = self.unsorted[i].cell;
        let dims = self.layout.dims;
        let reach = self.layout.reach;

        let range = |axis: usize| {
            let lo = cell[axis].saturating_sub(reach[axis]);
            let hi = (cell[axis] + reach[axis]).min(dims[axis] - 1);
            lo..=hi
        };

        for k in range(2) {
            for j in range(1) {
                for ci in range(0) {
                    let key = self.layout.key([ci, j, k]) as usize;
                    if let Some(run) = self.offsets[key].range() {
                        for s in run {
                            f(self.sorted[s].particle_index as usize);
                        }
                    }
                }
            }
        }
    }

    /// Visit every particle within `radius` of particle `i` (itself included),
    /// passing the neighbor index, the displacement `p_i - p_j`, and the
    /// squared distance.
    #[inline]
    pub fn for_each_neighbor<F>(&self, i: usize, x: &[f32], y: &[f32], z: &[f32], radius: f32, mut f: F)
    where
        F: FnMut(usize, [f32; 3], f32),
    {
        let (xi, yi, zi) = (x[i], y[i], z[i]);
        let radius_sq = radius * radius;
        self.for_each_candidate(i, |j| {
            let d = [xi - x[j], yi - y[j], zi - z[j]];
            let r_sq = d[0] * d[0] + d[1] * d[1] + d[2] * d[2];
            if r_sq <= radius_sq {
                f(j, d, r_sq);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> Aabb {
        Aabb::new([0.0; 3], [1.0; 3])
    }

    fn build(x: &[f32], y: &[f32], z: &[f32], dims: u32, h: f32) -> SpatialHashGrid {
        let mut grid = SpatialHashGrid::new(&unit(), [dims; 3], h);
        grid.rebuild(x, y, z, &unit(), [dims; 3], h);
        grid
    }

    fn neighbors_of(grid: &SpatialHashGrid, i: usize, x: &[f32], y: &[f32], z: &[f32], h: f32) -> Vec<usize> {
        let mut out = Vec::new();
        grid.for_each_neighbor(i, x, y, z, h, |j, _, _| {
            if j != i {
                out.push(j)
            }
        });
        out.sort_unstable();
        out
    }

    #[test]
    fn empty_grid() {
        let grid = build(&[], &[], &[], 5, 0.2);
        assert_eq!(grid.layout().cell_count(), 125);
        assert!(grid.sorted().is_empty());
        assert!(grid.offsets().iter().all(CellOffset::is_empty));
    }

    #[test]
    fn single_particle_sees_only_itself() {
        let (x, y, z) = ([0.5], [0.5], [0.5]);
        let grid = build(&x, &y, &z, 5, 0.2);
        let mut seen = Vec::new();
        grid.for_each_neighbor(0, &x, &y, &z, 0.2, |j, _, r_sq| seen.push((j, r_sq)));
        assert_eq!(seen, vec![(0, 0.0)]);
        assert_eq!(grid.occupied_cells(), 1);
    }

    #[test]
    fn two_close_particles() {
        let (x, y, z) = ([0.5, 0.51], [0.5, 0.5], [0.5, 0.5]);
        let grid = build(&x, &y, &z, 5, 0.2);
        assert_eq!(neighbors_of(&grid, 0, &x, &y, &z, 0.2), vec![1]);
        assert_eq!(neighbors_of(&grid, 1, &x, &y, &z, 0.2), vec![0]);
    }

    #[test]
    fn two_far_particles() {
        let (x, y, z) = ([0.1, 0.9], [0.1, 0.9], [0.1, 0.9]);
        let grid = build(&x, &y, &z, 5, 0.2);
        assert!(neighbors_of(&grid, 0, &x, &y, &z, 0.2).is_empty());
    }

    #[test]
    fn particles_across_cell_boundary() {
        let (x, y, z) = ([0.19, 0.21], [0.5, 0.5], [0.5, 0.5]);
        let grid = build(&x, &y, &z, 5, 0.2);
        assert_ne!(grid.unsorted()[0].key, grid.unsorted()[1].key);
        assert_eq!(neighbors_of(&grid, 0, &x, &y, &z, 0.2), vec![1]);
    }

    #[test]
    fn out_of_domain_positions_clamp_to_edge_cells() {
        let (x, y, z) = ([-3.0, 7.0], [0.5, 0.5], [0.5, f32::NAN]);
        let grid = build(&x, &y, &z, 4, 0.25);
        assert_eq!(grid.unsorted()[0].cell, [0, 2, 2]);
        assert_eq!(grid.unsorted()[1].cell, [3, 2, 0]);
    }

    #[test]
    fn offsets_describe_sorted_runs() {
        let x = [0.9, 0.1, 0.12, 0.5, 0.91];
        let y = [0.1; 5];
        let z = [0.1; 5];
        let grid = build(&x, &y, &z, 4, 0.25);

        let keys: Vec<u32> = grid.sorted().iter().map(|a| a.key).collect();
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(grid.histogram().iter().sum::<u32>(), 5);
        assert_eq!(grid.prefix_sums()[0], 0);

        // keys 3, 0, 0, 2, 3 sort to 0, 0, 2, 3, 3
        assert_eq!(grid.offsets()[0], CellOffset { start: 0, length: 2 });
        assert!(grid.offsets()[1].is_empty());
        assert_eq!(grid.offsets()[2], CellOffset { start: 2, length: 1 });
        assert_eq!(grid.offsets()[3], CellOffset { start: 3, length: 2 });
        assert!(grid.offsets()[4].is_empty());
        assert_eq!(grid.offsets()[2].range(), Some(2..3));
    }

    #[test]
    fn narrow_cells_widen_stencil() {
        // 10 cells of 0.1 with h = 0.25 needs three cells of reach
        let layout = GridLayout::new(&unit(), [10, 10, 10], 0.25);
        assert_eq!(layout.reach, [3, 3, 3]);
        let (x, y, z) = ([0.1, 0.34], [0.5, 0.5], [0.5, 0.5]);
        let grid = build(&x, &y, &z, 10, 0.25);
        assert_eq!(neighbors_of(&grid, 0, &x, &y, &z, 0.25), vec![1]);
    }

    #[test]
    fn many_particles_in_cluster() {
        let n = 10;
        let x: Vec<f32> = (0..n).map(|i| 0.5 + (i as f32) * 0.01).collect();
        let y = vec![0.5; n];
        let z = vec![0.5; n];
        let grid = build(&x, &y, &z, 5, 0.2);
        assert_eq!(neighbors_of(&grid, 0, &x, &y, &z, 0.2).len(), n - 1);
    }
}
