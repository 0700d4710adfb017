use core::ops::Range;

use crate::octant::Octant;

/// Identifier for a Cartesian axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];
}

/// A simple rectilinear structured mesh: a physical box divided into
/// `size` cells, partitioned into equal rectangular chunks. Chunks are the
/// unit of sweep-task parallelism; cells within a chunk are visited by a
/// single task.
#[derive(Clone, Debug)]
pub struct Mesh {
    /// Physical extent of the box on each axis.
    pub extent: (f64, f64, f64),
    /// Number of cells on each axis.
    pub size: (usize, usize, usize),
    /// Cells per chunk on each axis. Must divide `size` evenly.
    pub chunk: (usize, usize, usize),
}

impl Mesh {
    pub fn new(extent: (f64, f64, f64), size: (usize, usize, usize), chunk: (usize, usize, usize)) -> Self {
        assert!(size.0 > 0 && size.1 > 0 && size.2 > 0, "mesh has zero cells");
        assert!(
            size.0 % chunk.0 == 0 && size.1 % chunk.1 == 0 && size.2 % chunk.2 == 0,
            "chunk shape {:?} does not divide mesh shape {:?}",
            chunk,
            size
        );
        Self { extent, size, chunk }
    }

    pub fn cell_spacing(&self) -> (f64, f64, f64) {
        (
            self.extent.0 / self.size.0 as f64,
            self.extent.1 / self.size.1 as f64,
            self.extent.2 / self.size.2 as f64,
        )
    }

    /// The diamond-difference geometry factors `(hi, hj, hk) = 2 / d`.
    pub fn geometry_factors(&self) -> (f64, f64, f64) {
        let (dx, dy, dz) = self.cell_spacing();
        (2.0 / dx, 2.0 / dy, 2.0 / dz)
    }

    pub fn num_cells(&self) -> usize {
        self.size.0 * self.size.1 * self.size.2
    }

    /// Number of chunks on each axis.
    pub fn chunk_grid(&self) -> (usize, usize, usize) {
        (
            self.size.0 / self.chunk.0,
            self.size.1 / self.chunk.1,
            self.size.2 / self.chunk.2,
        )
    }

    pub fn num_chunks(&self) -> usize {
        let (cx, cy, cz) = self.chunk_grid();
        cx * cy * cz
    }

    /// Number of chunk diagonals a single octant sweeps through.
    pub fn num_wavefronts(&self) -> usize {
        let (cx, cy, cz) = self.chunk_grid();
        cx + cy + cz - 2
    }

    /// Enumerate every chunk in the decomposition.
    pub fn chunks(&self) -> impl Iterator<Item = ChunkId> {
        let (cx, cy, cz) = self.chunk_grid();
        (0..cz).flat_map(move |z| {
            (0..cy).flat_map(move |y| (0..cx).map(move |x| ChunkId { x, y, z }))
        })
    }

    /// The global cell ranges covered by a chunk.
    pub fn chunk_ranges(&self, id: ChunkId) -> (Range<usize>, Range<usize>, Range<usize>) {
        let (cx, cy, cz) = self.chunk_grid();
        assert!(id.x < cx && id.y < cy && id.z < cz, "chunk {:?} out of range", id);
        (
            id.x * self.chunk.0..(id.x + 1) * self.chunk.0,
            id.y * self.chunk.1..(id.y + 1) * self.chunk.1,
            id.z * self.chunk.2..(id.z + 1) * self.chunk.2,
        )
    }

    /// The diagonal this chunk sits on when swept from the given octant:
    /// the number of upstream chunk layers crossed before reaching it.
    pub fn wavefront(&self, id: ChunkId, octant: Octant) -> usize {
        let (cx, cy, cz) = self.chunk_grid();
        let u = if octant.stride_positive(Axis::X) { id.x } else { cx - 1 - id.x };
        let v = if octant.stride_positive(Axis::Y) { id.y } else { cy - 1 - id.y };
        let w = if octant.stride_positive(Axis::Z) { id.z } else { cz - 1 - id.z };
        u + v + w
    }

    /// The chunk that feeds this one along `axis` for the given octant, if
    /// it exists (`None` at the domain boundary).
    pub fn upstream(&self, id: ChunkId, octant: Octant, axis: Axis) -> Option<ChunkId> {
        self.neighbor(id, axis, !octant.stride_positive(axis))
    }

    /// The chunk this one feeds along `axis` for the given octant, if it
    /// exists.
    pub fn downstream(&self, id: ChunkId, octant: Octant, axis: Axis) -> Option<ChunkId> {
        self.neighbor(id, axis, octant.stride_positive(axis))
    }

    fn neighbor(&self, id: ChunkId, axis: Axis, increasing: bool) -> Option<ChunkId> {
        let (cx, cy, cz) = self.chunk_grid();
        let (coord, limit) = match axis {
            Axis::X => (id.x, cx),
            Axis::Y => (id.y, cy),
            Axis::Z => (id.z, cz),
        };
        let next = if increasing {
            if coord + 1 >= limit {
                return None;
            }
            coord + 1
        } else {
            coord.checked_sub(1)?
        };
        let mut out = id;
        match axis {
            Axis::X => out.x = next,
            Axis::Y => out.y = next,
            Axis::Z => out.z = next,
        }
        Some(out)
    }
}

/// Coordinates of a chunk within the chunk grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkId {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}
