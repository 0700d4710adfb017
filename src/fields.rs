use std::sync::atomic::{AtomicU64, Ordering};

use crate::mesh::{Axis, ChunkId, Mesh};
use crate::moments::{MomentQuad, MomentTriple};
use crate::reduce::{QuadReduction, SumReduction};

/// A dense cell-indexed array over the whole mesh, x fastest.
#[derive(Clone, Debug, serde::Serialize)]
pub struct CellArray<T> {
    size: (usize, usize, usize),
    data: Vec<T>,
}

impl<T: Copy + Default> CellArray<T> {
    pub fn zeros(size: (usize, usize, usize)) -> Self {
        Self { size, data: vec![T::default(); size.0 * size.1 * size.2] }
    }

    pub fn from_fn<F>(size: (usize, usize, usize), mut f: F) -> Self
    where
        F: FnMut((usize, usize, usize)) -> T,
    {
        let mut data = Vec::with_capacity(size.0 * size.1 * size.2);
        for k in 0..size.2 {
            for j in 0..size.1 {
                for i in 0..size.0 {
                    data.push(f((i, j, k)));
                }
            }
        }
        Self { size, data }
    }

    pub fn size(&self) -> (usize, usize, usize) {
        self.size
    }

    fn offset(&self, (i, j, k): (usize, usize, usize)) -> usize {
        assert!(
            i < self.size.0 && j < self.size.1 && k < self.size.2,
            "cell ({}, {}, {}) outside mesh {:?}",
            i,
            j,
            k,
            self.size
        );
        (k * self.size.1 + j) * self.size.0 + i
    }

    pub fn get(&self, cell: (usize, usize, usize)) -> T {
        self.data[self.offset(cell)]
    }

    pub fn set(&mut self, cell: (usize, usize, usize), value: T) {
        let at = self.offset(cell);
        self.data[at] = value;
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }

    /// Visit every cell index in storage order.
    pub fn indexes(&self) -> impl Iterator<Item = (usize, usize, usize)> {
        let size = self.size;
        (0..size.2).flat_map(move |k| {
            (0..size.1).flat_map(move |j| (0..size.0).map(move |i| (i, j, k)))
        })
    }
}

/// A cell-indexed array with `num_angles` doubles per cell.
#[derive(Clone, Debug)]
pub struct AngleArray {
    size: (usize, usize, usize),
    num_angles: usize,
    data: Vec<f64>,
}

impl AngleArray {
    pub fn zeros(size: (usize, usize, usize), num_angles: usize) -> Self {
        Self {
            size,
            num_angles,
            data: vec![0.0; size.0 * size.1 * size.2 * num_angles],
        }
    }

    fn offset(&self, (i, j, k): (usize, usize, usize)) -> usize {
        assert!(
            i < self.size.0 && j < self.size.1 && k < self.size.2,
            "cell ({}, {}, {}) outside array {:?}",
            i,
            j,
            k,
            self.size
        );
        ((k * self.size.1 + j) * self.size.0 + i) * self.num_angles
    }

    pub fn slice(&self, cell: (usize, usize, usize)) -> &[f64] {
        let at = self.offset(cell);
        &self.data[at..at + self.num_angles]
    }

    pub fn slice_mut(&mut self, cell: (usize, usize, usize)) -> &mut [f64] {
        let at = self.offset(cell);
        &mut self.data[at..at + self.num_angles]
    }

    pub fn num_angles(&self) -> usize {
        self.num_angles
    }

    pub fn scale(&mut self, factor: f64) {
        for value in &mut self.data {
            *value *= factor;
        }
    }
}

/// A shared scalar reduction target: one `f64` bit pattern per cell, folded
/// into concurrently by sweep tasks.
pub struct AtomicCellArray {
    size: (usize, usize, usize),
    data: Vec<AtomicU64>,
}

impl AtomicCellArray {
    pub fn zeros(size: (usize, usize, usize)) -> Self {
        let len = size.0 * size.1 * size.2;
        Self { size, data: (0..len).map(|_| AtomicU64::new(0)).collect() }
    }

    fn offset(&self, (i, j, k): (usize, usize, usize)) -> usize {
        assert!(
            i < self.size.0 && j < self.size.1 && k < self.size.2,
            "cell ({}, {}, {}) outside array {:?}",
            i,
            j,
            k,
            self.size
        );
        (k * self.size.1 + j) * self.size.0 + i
    }

    pub fn fold(&self, cell: (usize, usize, usize), value: f64) {
        SumReduction::fold(&self.data[self.offset(cell)], value);
    }

    pub fn get(&self, cell: (usize, usize, usize)) -> f64 {
        f64::from_bits(self.data[self.offset(cell)].load(Ordering::Relaxed))
    }

    pub fn zero(&self) {
        for slot in &self.data {
            slot.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> CellArray<f64> {
        CellArray {
            size: self.size,
            data: self
                .data
                .iter()
                .map(|slot| f64::from_bits(slot.load(Ordering::Relaxed)))
                .collect(),
        }
    }
}

/// A shared moment reduction target: `width` `f64` slots per cell.
pub struct AtomicMomentArray {
    size: (usize, usize, usize),
    width: usize,
    data: Vec<AtomicU64>,
}

impl AtomicMomentArray {
    pub fn zeros(size: (usize, usize, usize), width: usize) -> Self {
        let len = size.0 * size.1 * size.2 * width;
        Self { size, width, data: (0..len).map(|_| AtomicU64::new(0)).collect() }
    }

    fn offset(&self, (i, j, k): (usize, usize, usize)) -> usize {
        assert!(
            i < self.size.0 && j < self.size.1 && k < self.size.2,
            "cell ({}, {}, {}) outside array {:?}",
            i,
            j,
            k,
            self.size
        );
        ((k * self.size.1 + j) * self.size.0 + i) * self.width
    }

    pub fn fold(&self, cell: (usize, usize, usize), value: MomentTriple) {
        let at = self.offset(cell);
        QuadReduction::fold(&self.data[at..at + self.width], value);
    }

    pub fn get(&self, cell: (usize, usize, usize)) -> MomentTriple {
        let at = self.offset(cell);
        let mut out = MomentTriple::new();
        for l in 0..self.width {
            out[l] = f64::from_bits(self.data[at + l].load(Ordering::Relaxed));
        }
        out
    }

    pub fn zero(&self) {
        for slot in &self.data {
            slot.store(0, Ordering::Relaxed);
        }
    }
}

/// A shared array of angle vectors, one per slot cell: the storage behind
/// ghost faces and the outgoing temporal flux. Writes are plain atomic
/// stores; the sweep task graph guarantees each slot has exactly one writer
/// per pass, and the executor's completion channel orders writes before
/// downstream reads.
pub struct AtomicAngleArray {
    size: (usize, usize, usize),
    num_angles: usize,
    data: Vec<AtomicU64>,
}

impl AtomicAngleArray {
    pub fn zeros(size: (usize, usize, usize), num_angles: usize) -> Self {
        let len = size.0 * size.1 * size.2 * num_angles;
        Self { size, num_angles, data: (0..len).map(|_| AtomicU64::new(0)).collect() }
    }

    fn offset(&self, (i, j, k): (usize, usize, usize)) -> usize {
        assert!(
            i < self.size.0 && j < self.size.1 && k < self.size.2,
            "slot ({}, {}, {}) outside array {:?}",
            i,
            j,
            k,
            self.size
        );
        ((k * self.size.1 + j) * self.size.0 + i) * self.num_angles
    }

    pub fn write(&self, slot: (usize, usize, usize), values: &[f64]) {
        assert_eq!(values.len(), self.num_angles);
        let at = self.offset(slot);
        for (a, &v) in values.iter().enumerate() {
            self.data[at + a].store(v.to_bits(), Ordering::Relaxed);
        }
    }

    pub fn read_into(&self, slot: (usize, usize, usize), out: &mut [f64]) {
        assert_eq!(out.len(), self.num_angles);
        let at = self.offset(slot);
        for (a, v) in out.iter_mut().enumerate() {
            *v = f64::from_bits(self.data[at + a].load(Ordering::Relaxed));
        }
    }

    pub fn snapshot(&self) -> AngleArray {
        AngleArray {
            size: self.size,
            num_angles: self.num_angles,
            data: self
                .data
                .iter()
                .map(|slot| f64::from_bits(slot.load(Ordering::Relaxed)))
                .collect(),
        }
    }
}

/// The incoming-face flux buffers of one (group, corner): per axis, two
/// parity copies of a face array, with the parity flipping once per outer
/// iteration. Slots are keyed by the receiving chunk's coordinate on the
/// swept axis plus the global coordinates of the face cell, so every
/// producer writes a slot no other task touches in the same sweep pass.
/// Domain-boundary slots are never written and stay zero, which is the
/// vacuum boundary condition.
pub struct GhostBuffers {
    x: [AtomicAngleArray; 2],
    y: [AtomicAngleArray; 2],
    z: [AtomicAngleArray; 2],
}

impl GhostBuffers {
    pub fn new(mesh: &Mesh, num_angles: usize) -> Self {
        let (nx, ny, nz) = mesh.size;
        let (cx, cy, cz) = mesh.chunk_grid();
        let make = |size| [AtomicAngleArray::zeros(size, num_angles), AtomicAngleArray::zeros(size, num_angles)];
        Self {
            x: make((cx, ny, nz)),
            y: make((cy, nx, nz)),
            z: make((cz, nx, ny)),
        }
    }

    pub fn face(&self, axis: Axis, parity: usize) -> &AtomicAngleArray {
        match axis {
            Axis::X => &self.x[parity & 1],
            Axis::Y => &self.y[parity & 1],
            Axis::Z => &self.z[parity & 1],
        }
    }

    /// The slot a chunk reads its incoming face flux from, for the cell at
    /// global coordinates `(i, j, k)`.
    pub fn incoming_slot(chunk: ChunkId, axis: Axis, cell: (usize, usize, usize)) -> (usize, usize, usize) {
        match axis {
            Axis::X => (chunk.x, cell.1, cell.2),
            Axis::Y => (chunk.y, cell.0, cell.2),
            Axis::Z => (chunk.z, cell.0, cell.1),
        }
    }
}

/// Everything the iteration owns: per-group cell fields, shared reduction
/// targets, ghost buffers, and the temporal flux pair. Allocated once at
/// setup; the precomputed members (`dinv`, `t_xs`, `s_xs`, `mat`) are
/// filled by the expansion passes and never change afterwards.
pub struct FieldStore {
    pub num_groups: usize,
    pub num_corners: usize,
    pub num_angles: usize,
    /// Scalar flux, the primary output; write-shared across corner sweeps.
    pub flux: Vec<AtomicCellArray>,
    /// Higher flux moments (`num_moments - 1` per cell).
    pub fluxm: Vec<AtomicMomentArray>,
    /// Snapshot of `flux` at the top of each outer iteration.
    pub flux_prev_outer: Vec<CellArray<f64>>,
    /// Snapshot of `flux` at the top of each inner iteration.
    pub flux_prev_inner: Vec<CellArray<f64>>,
    /// Total within-group source, rebuilt by every inner iteration.
    pub qtot: Vec<CellArray<MomentQuad>>,
    /// Fixed inhomogeneous source.
    pub qi: Vec<CellArray<f64>>,
    /// Outer scattering source, zeroth moment.
    pub qo: Vec<CellArray<f64>>,
    /// Outer scattering source, higher moments.
    pub qom: Vec<CellArray<MomentTriple>>,
    /// Manufactured-solution angular source per (group, corner); empty for
    /// fixed-source runs.
    pub qim: Vec<Vec<AngleArray>>,
    /// Precomputed per-angle inverse denominators, per group.
    pub dinv: Vec<AngleArray>,
    /// Expanded total cross section, per group.
    pub t_xs: Vec<CellArray<f64>>,
    /// Expanded within-group scattering moments, per group.
    pub s_xs: Vec<CellArray<MomentQuad>>,
    /// Material index per cell.
    pub mat: CellArray<usize>,
    /// Time-absorption coefficient per group; zero for steady runs.
    pub vdelt: Vec<f64>,
    /// Temporal angular flux entering the current time step, per
    /// (group, corner).
    pub time_flux_in: Vec<Vec<AngleArray>>,
    /// Temporal angular flux produced by the current time step.
    pub time_flux_out: Vec<Vec<AtomicAngleArray>>,
    /// Face-flux exchange buffers per (group, corner).
    pub ghost: Vec<Vec<GhostBuffers>>,
}

impl FieldStore {
    pub fn new(mesh: &Mesh, num_groups: usize, num_corners: usize, num_angles: usize, num_moments: usize) -> Self {
        let size = mesh.size;
        let width = num_moments - 1;
        let per_group = |f: &dyn Fn() -> CellArray<f64>| (0..num_groups).map(|_| f()).collect::<Vec<_>>();
        let per_corner_angles =
            |_g: usize| (0..num_corners).map(|_| AngleArray::zeros(size, num_angles)).collect::<Vec<_>>();

        Self {
            num_groups,
            num_corners,
            num_angles,
            flux: (0..num_groups).map(|_| AtomicCellArray::zeros(size)).collect(),
            fluxm: (0..num_groups).map(|_| AtomicMomentArray::zeros(size, width)).collect(),
            flux_prev_outer: per_group(&|| CellArray::zeros(size)),
            flux_prev_inner: per_group(&|| CellArray::zeros(size)),
            qtot: (0..num_groups).map(|_| CellArray::zeros(size)).collect(),
            qi: per_group(&|| CellArray::zeros(size)),
            qo: per_group(&|| CellArray::zeros(size)),
            qom: (0..num_groups).map(|_| CellArray::zeros(size)).collect(),
            qim: Vec::new(),
            dinv: (0..num_groups).map(|_| AngleArray::zeros(size, num_angles)).collect(),
            t_xs: per_group(&|| CellArray::zeros(size)),
            s_xs: (0..num_groups).map(|_| CellArray::zeros(size)).collect(),
            mat: CellArray::zeros(size),
            vdelt: vec![0.0; num_groups],
            time_flux_in: (0..num_groups).map(per_corner_angles).collect(),
            time_flux_out: (0..num_groups)
                .map(|_| (0..num_corners).map(|_| AtomicAngleArray::zeros(size, num_angles)).collect())
                .collect(),
            ghost: (0..num_groups)
                .map(|_| (0..num_corners).map(|_| GhostBuffers::new(mesh, num_angles)).collect())
                .collect(),
        }
    }

    /// Reset the reduction targets of one group ahead of a sweep pass.
    pub fn zero_flux(&self, group: usize) {
        self.flux[group].zero();
        self.fluxm[group].zero();
    }

    /// Carry the temporal flux of the finished step into the next one:
    /// `time_flux_in` of step `n + 1` becomes exactly `time_flux_out` of
    /// step `n`.
    pub fn rotate_time_flux(&mut self) {
        for g in 0..self.num_groups {
            for c in 0..self.num_corners {
                self.time_flux_in[g][c] = self.time_flux_out[g][c].snapshot();
            }
        }
    }
}
