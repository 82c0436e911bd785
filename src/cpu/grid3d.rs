// Uniform spatial hash grid: hash particles into cells, sort the (hash, index)
// pairs, then bin and reorder the particle arrays so every cell maps to a
// contiguous slot range of the sorted buffers.
use glam::{UVec3, Vec3, Vec4};

use crate::params::SimulationParameters;
use crate::sort::{KeyValueSorter, SENTINEL_KEY, SortPair, round_up_pow2};

/// Half-open slot range [begin, end) into the sorted particle buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cell {
    pub begin: u32,
    pub end: u32,
}

impl Cell {
    pub const EMPTY: Self = Self { begin: 0, end: 0 };

    #[inline]
    pub fn len(&self) -> u32 {
        self.end - self.begin
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }
}

/// Integer cell coordinate of a position. Out-of-bounds positions collapse to
/// the boundary cell per axis, they are never dropped.
#[inline]
pub fn cell_coord(pos: Vec3, params: &SimulationParameters) -> UVec3 {
    let rel = (pos - params.world_origin) / params.cell_size;
    let grid = params.grid_size;
    UVec3::new(
        (rel.x.floor().max(0.0) as u32).min(grid.x - 1),
        (rel.y.floor().max(0.0) as u32).min(grid.y - 1),
        (rel.z.floor().max(0.0) as u32).min(grid.z - 1),
    )
}

#[inline]
pub fn cell_hash(coord: UVec3, grid: UVec3) -> u32 {
    coord.x + coord.y * grid.x + coord.z * grid.x * grid.y
}

/// Visits the hashes of the 3x3x3 cell block around `coord`, clipped at the
/// grid border (no wraparound, no duplicates). Cell width is 2h, so this
/// block covers every neighbor within the smoothing length.
#[inline]
pub fn for_each_neighbor_cell(coord: UVec3, grid: UVec3, mut f: impl FnMut(u32)) {
    let x0 = coord.x.saturating_sub(1);
    let y0 = coord.y.saturating_sub(1);
    let z0 = coord.z.saturating_sub(1);
    for z in z0..=(coord.z + 1).min(grid.z - 1) {
        for y in y0..=(coord.y + 1).min(grid.y - 1) {
            for x in x0..=(coord.x + 1).min(grid.x - 1) {
                f(cell_hash(UVec3::new(x, y, z), grid));
            }
        }
    }
}

/// Borrowed views of the four particle SoA arrays, in source (read) and
/// destination (scatter target) form.
pub struct ParticleArrays<'a> {
    pub pos_press: &'a [Vec4],
    pub vel_rho: &'a [Vec4],
    pub force_vol: &'a [Vec4],
    pub tgrm: &'a [Vec4],
}

pub struct ParticleArraysMut<'a> {
    pub pos_press: &'a mut [Vec4],
    pub vel_rho: &'a mut [Vec4],
    pub force_vol: &'a mut [Vec4],
    pub tgrm: &'a mut [Vec4],
}

pub struct SpatialGrid {
    cells: Vec<Cell>,
    sort_data: Vec<SortPair>,
}

impl SpatialGrid {
    pub fn new(num_cells: usize, max_particles: usize) -> Self {
        Self {
            cells: vec![Cell::EMPTY; num_cells],
            sort_data: vec![SortPair::SENTINEL; round_up_pow2(max_particles)],
        }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, hash: u32) -> Cell {
        self.cells[hash as usize]
    }

    /// Sorted (hash, original index) pairs of the last build; slots past the
    /// live count hold sentinel keys.
    pub fn sort_data(&self) -> &[SortPair] {
        &self.sort_data
    }

    /// Rebuilds the index for the current particle set and scatters all four
    /// arrays into `dst` in cell-sorted order. An empty particle set leaves
    /// every cell empty and touches nothing else.
    pub fn build(
        &mut self,
        params: &SimulationParameters,
        sorter: &dyn KeyValueSorter,
        src: ParticleArrays<'_>,
        dst: ParticleArraysMut<'_>,
    ) {
        let num_cells = params.num_cells as usize;
        if self.cells.len() != num_cells {
            self.cells.resize(num_cells, Cell::EMPTY);
        }
        self.cells.fill(Cell::EMPTY);

        let n = params.num_particles as usize;
        if n == 0 {
            return;
        }

        // (hash, index) pairs, padded to the sorter's power-of-two size with
        // sentinel maximal keys
        let padded = round_up_pow2(n);
        if self.sort_data.len() < padded {
            self.sort_data.resize(padded, SortPair::SENTINEL);
        }
        let pairs = &mut self.sort_data[..padded];
        for (i, pair) in pairs.iter_mut().enumerate() {
            *pair = if i < n {
                let coord = cell_coord(src.pos_press[i].truncate(), params);
                SortPair {
                    key: cell_hash(coord, params.grid_size),
                    index: i as u32,
                }
            } else {
                SortPair::SENTINEL
            };
        }

        sorter.sort_pairs(pairs);

        // begin/end boundaries wherever the sorted hash changes
        for i in 0..n {
            let hash = pairs[i].key as usize;
            debug_assert!((pairs[i].key) != SENTINEL_KEY);
            if i == 0 || pairs[i - 1].key != pairs[i].key {
                self.cells[hash].begin = i as u32;
            }
            if i + 1 == n || pairs[i + 1].key != pairs[i].key {
                self.cells[hash].end = (i + 1) as u32;
            }
        }

        // scatter full particle state into cell-sorted order
        for slot in 0..n {
            let from = pairs[slot].index as usize;
            dst.pos_press[slot] = src.pos_press[from];
            dst.vel_rho[slot] = src.vel_rho[from];
            dst.force_vol[slot] = src.force_vol[from];
            dst.tgrm[slot] = src.tgrm[from];
        }
    }
}
