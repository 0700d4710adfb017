use crate::fields::{FieldStore, GhostBuffers};
use crate::mesh::{Axis, ChunkId, Mesh};
use crate::moments::MomentTriple;
use crate::octant::Octant;
use crate::quadrature::Quadrature;
use crate::schedule::Task;

const TOLR: f64 = 1.0e-12;

/// Read-only state shared by every chunk task of one sweep pass. The
/// present-or-absent decisions (fixup, manufactured source, time term,
/// higher moments) are resolved here once and never change mid-sweep.
pub struct SweepContext<'a> {
    pub mesh: &'a Mesh,
    pub quad: &'a Quadrature,
    pub fields: &'a FieldStore,
    /// Outer-iteration index; its parity selects which ghost buffer this
    /// pass reads and writes.
    pub iteration: usize,
    pub fixup: bool,
    pub mms_source: bool,
}

/// Identity of one chunk sweep within a pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SweepKey {
    pub group: usize,
    pub octant: Octant,
    pub chunk: ChunkId,
}

/// One unit of sweep work: visit every cell of `chunk` in the diagonal
/// order imposed by `octant`, apply the cell kernel, and exchange face
/// fluxes with neighboring chunks through the ghost buffers.
pub struct ChunkSweep<'a> {
    ctx: &'a SweepContext<'a>,
    group: usize,
    octant: Octant,
    chunk: ChunkId,
    wavefront: usize,
}

impl<'a> ChunkSweep<'a> {
    pub fn new(ctx: &'a SweepContext<'a>, group: usize, octant: Octant, chunk: ChunkId) -> Self {
        let wavefront = ctx.mesh.wavefront(chunk, octant);
        Self { ctx, group, octant, chunk, wavefront }
    }

    pub fn wavefront(&self) -> usize {
        self.wavefront
    }

    fn sweep(&self) {
        let ctx = self.ctx;
        let quad = ctx.quad;
        let fields = ctx.fields;
        let na = quad.num_angles;
        let num_moments = quad.num_moments;
        let multi_moment = num_moments > 1;
        let (hi, hj, hk) = ctx.mesh.geometry_factors();
        let vdelt = fields.vdelt[self.group];
        let time_dep = vdelt != 0.0;
        let corner_block = self.octant.id() * num_moments * na;

        let qtot = &fields.qtot[self.group];
        let dinv = &fields.dinv[self.group];
        let t_xs = &fields.t_xs[self.group];
        let ghost = &fields.ghost[self.group][self.octant.id()];
        let time_in = &fields.time_flux_in[self.group][self.octant.id()];
        let time_out = &fields.time_flux_out[self.group][self.octant.id()];
        // One parity per outer iteration: every wavefront of this pass
        // shares the buffer, and the task DAG orders upstream writes
        // before downstream reads.
        let parity = ctx.iteration % 2;

        let (xs, ys, zs) = ctx.mesh.chunk_ranges(self.chunk);
        let x_range = xs.len();
        let y_range = ys.len();
        let z_range = zs.len();

        // Angle-length working vectors, allocated once per task.
        let mut psi = vec![0.0; na];
        let mut pc = vec![0.0; na];
        let mut psii = vec![0.0; na];
        let mut psij = vec![0.0; na];
        let mut psik = vec![0.0; na];
        let mut tf_in = vec![0.0; na];
        let mut tf_out = vec![0.0; na];
        let mut hv = Fixup::new(na);

        // Face fluxes carried between cells of this chunk: psii rides along
        // in its own vector between consecutive x iterations, the y faces
        // live in a pencil of x-columns, the z faces in a full xy plane.
        let mut yflux_pencil = vec![0.0; x_range * na];
        let mut zflux_plane = vec![0.0; y_range * x_range * na];

        for z in 0..z_range {
            for y in 0..y_range {
                for x in 0..x_range {
                    let cell = (
                        if self.octant.stride_positive(Axis::X) { xs.start + x } else { xs.end - 1 - x },
                        if self.octant.stride_positive(Axis::Y) { ys.start + y } else { ys.end - 1 - y },
                        if self.octant.stride_positive(Axis::Z) { zs.start + z } else { zs.end - 1 - z },
                    );

                    // Angular source from the total-source moments, plus the
                    // manufactured term when active.
                    let q = qtot.get(cell);
                    for a in 0..na {
                        psi[a] = q[0];
                    }
                    if multi_moment {
                        for l in 1..num_moments {
                            let offset = corner_block + l * na;
                            for a in 0..na {
                                psi[a] += quad.ec[offset + a] * q[l];
                            }
                        }
                    }
                    if ctx.mms_source {
                        let qim = fields.qim[self.group][self.octant.id()].slice(cell);
                        for a in 0..na {
                            psi[a] += qim[a];
                        }
                    }

                    // Incoming face fluxes: the first cell along each axis
                    // reads the ghost face its upstream chunk published;
                    // deeper cells consume the pencil/plane scratch (or, for
                    // x, the value left in psii by the previous iteration).
                    if x == 0 {
                        let slot = GhostBuffers::incoming_slot(self.chunk, Axis::X, cell);
                        ghost.face(Axis::X, parity).read_into(slot, &mut psii);
                    }
                    if y == 0 {
                        let slot = GhostBuffers::incoming_slot(self.chunk, Axis::Y, cell);
                        ghost.face(Axis::Y, parity).read_into(slot, &mut psij);
                    } else {
                        psij.copy_from_slice(&yflux_pencil[x * na..(x + 1) * na]);
                    }
                    if z == 0 {
                        let slot = GhostBuffers::incoming_slot(self.chunk, Axis::Z, cell);
                        ghost.face(Axis::Z, parity).read_into(slot, &mut psik);
                    } else {
                        let offset = (y * x_range + x) * na;
                        psik.copy_from_slice(&zflux_plane[offset..offset + na]);
                    }

                    // Initial diamond-difference solution.
                    for a in 0..na {
                        pc[a] = psi[a]
                            + psii[a] * quad.mu[a] * hi
                            + psij[a] * quad.eta[a] * hj
                            + psik[a] * quad.xi[a] * hk;
                    }
                    if time_dep {
                        tf_in.copy_from_slice(time_in.slice(cell));
                        for a in 0..na {
                            pc[a] += vdelt * tf_in[a];
                        }
                    }
                    let d = dinv.slice(cell);
                    for a in 0..na {
                        pc[a] *= d[a];
                    }

                    if ctx.fixup {
                        self.fixup_cell(
                            &mut hv,
                            &psi,
                            &mut pc,
                            &mut psii,
                            &mut psij,
                            &mut psik,
                            &tf_in,
                            &mut tf_out,
                            t_xs.get(cell),
                            vdelt,
                            (hi, hj, hk),
                        );
                        if time_dep {
                            time_out.write(cell, &tf_out);
                        }
                    } else {
                        for a in 0..na {
                            psii[a] = 2.0 * pc[a] - psii[a];
                        }
                        for a in 0..na {
                            psij[a] = 2.0 * pc[a] - psij[a];
                        }
                        for a in 0..na {
                            psik[a] = 2.0 * pc[a] - psik[a];
                        }
                        if time_dep {
                            for a in 0..na {
                                tf_out[a] = 2.0 * pc[a] - tf_in[a];
                            }
                            time_out.write(cell, &tf_out);
                        }
                    }

                    // Outgoing faces: the last cell along an axis publishes
                    // to the downstream chunk's ghost slot (nothing at the
                    // domain boundary); interior cells write back into the
                    // local scratch.
                    if x == x_range - 1 {
                        if let Some(down) = ctx.mesh.downstream(self.chunk, self.octant, Axis::X) {
                            let slot = GhostBuffers::incoming_slot(down, Axis::X, cell);
                            ghost.face(Axis::X, parity).write(slot, &psii);
                        }
                    }
                    if y == y_range - 1 {
                        if let Some(down) = ctx.mesh.downstream(self.chunk, self.octant, Axis::Y) {
                            let slot = GhostBuffers::incoming_slot(down, Axis::Y, cell);
                            ghost.face(Axis::Y, parity).write(slot, &psij);
                        }
                    } else {
                        yflux_pencil[x * na..(x + 1) * na].copy_from_slice(&psij);
                    }
                    if z == z_range - 1 {
                        if let Some(down) = ctx.mesh.downstream(self.chunk, self.octant, Axis::Z) {
                            let slot = GhostBuffers::incoming_slot(down, Axis::Z, cell);
                            ghost.face(Axis::Z, parity).write(slot, &psik);
                        }
                    } else {
                        let offset = (y * x_range + x) * na;
                        zflux_plane[offset..offset + na].copy_from_slice(&psik);
                    }

                    // Weighted reductions into the shared flux fields.
                    let mut total = 0.0;
                    for a in 0..na {
                        psi[a] = quad.w[a] * pc[a];
                        total += psi[a];
                    }
                    fields.flux[self.group].fold(cell, total);
                    if multi_moment {
                        let mut moments = MomentTriple::new();
                        for l in 1..num_moments {
                            let offset = corner_block + l * na;
                            let mut sum = 0.0;
                            for a in 0..na {
                                sum += quad.ec[offset + a] * psi[a];
                            }
                            moments[l - 1] = sum;
                        }
                        fields.fluxm[self.group].fold(cell, moments);
                    }
                }
            }
        }
    }

    /// Rebalance a cell whose provisional update produced negative outgoing
    /// fluxes: zero the offending faces and re-solve until the negative
    /// count stops changing, then emit the clipped faces.
    #[allow(clippy::too_many_arguments)]
    fn fixup_cell(
        &self,
        hv: &mut Fixup,
        psi: &[f64],
        pc: &mut [f64],
        psii: &mut [f64],
        psij: &mut [f64],
        psik: &mut [f64],
        tf_in: &[f64],
        tf_out: &mut [f64],
        t_xs: f64,
        vdelt: f64,
        (hi, hj, hk): (f64, f64, f64),
    ) {
        let quad = self.ctx.quad;
        let na = quad.num_angles;
        let time_dep = vdelt != 0.0;

        hv.reset();
        let mut old_negative = 0usize;
        loop {
            let mut negative = 0usize;
            for a in 0..na {
                hv.fx_x[a] = 2.0 * pc[a] - psii[a];
                if hv.fx_x[a] < 0.0 {
                    hv.hv_x[a] = 0.0;
                    negative += 1;
                }
            }
            for a in 0..na {
                hv.fx_y[a] = 2.0 * pc[a] - psij[a];
                if hv.fx_y[a] < 0.0 {
                    hv.hv_y[a] = 0.0;
                    negative += 1;
                }
            }
            for a in 0..na {
                hv.fx_z[a] = 2.0 * pc[a] - psik[a];
                if hv.fx_z[a] < 0.0 {
                    hv.hv_z[a] = 0.0;
                    negative += 1;
                }
            }
            if time_dep {
                for a in 0..na {
                    hv.fx_t[a] = 2.0 * pc[a] - tf_in[a];
                    if hv.fx_t[a] < 0.0 {
                        hv.hv_t[a] = 0.0;
                        negative += 1;
                    }
                }
            }
            if negative == old_negative {
                break;
            }
            old_negative = negative;

            for a in 0..na {
                let mut numer = psii[a] * quad.mu[a] * hi * (1.0 + hv.hv_x[a])
                    + psij[a] * quad.eta[a] * hj * (1.0 + hv.hv_y[a])
                    + psik[a] * quad.xi[a] * hk * (1.0 + hv.hv_z[a]);
                if time_dep {
                    numer += tf_in[a] * vdelt * (1.0 + hv.hv_t[a]);
                }
                let value = psi[a] + 0.5 * numer;
                let den = if value <= 0.0 {
                    0.0
                } else {
                    let mut den = t_xs
                        + quad.mu[a] * hi * hv.hv_x[a]
                        + quad.eta[a] * hj * hv.hv_y[a]
                        + quad.xi[a] * hk * hv.hv_z[a];
                    if time_dep {
                        den += vdelt * hv.hv_t[a];
                    }
                    den
                };
                pc[a] = if den < TOLR { 0.0 } else { value / den };
            }
        }

        for a in 0..na {
            psii[a] = hv.fx_x[a] * hv.hv_x[a];
        }
        for a in 0..na {
            psij[a] = hv.fx_y[a] * hv.hv_y[a];
        }
        for a in 0..na {
            psik[a] = hv.fx_z[a] * hv.hv_z[a];
        }
        if time_dep {
            for a in 0..na {
                tf_out[a] = hv.fx_t[a] * hv.hv_t[a];
            }
        }
    }
}

/// Scratch for the fixup loop: the trial face fluxes and their 0/1 clip
/// masks, one pair per axis plus the time term.
struct Fixup {
    hv_x: Vec<f64>,
    hv_y: Vec<f64>,
    hv_z: Vec<f64>,
    hv_t: Vec<f64>,
    fx_x: Vec<f64>,
    fx_y: Vec<f64>,
    fx_z: Vec<f64>,
    fx_t: Vec<f64>,
}

impl Fixup {
    fn new(na: usize) -> Self {
        Self {
            hv_x: vec![1.0; na],
            hv_y: vec![1.0; na],
            hv_z: vec![1.0; na],
            hv_t: vec![1.0; na],
            fx_x: vec![0.0; na],
            fx_y: vec![0.0; na],
            fx_z: vec![0.0; na],
            fx_t: vec![0.0; na],
        }
    }

    fn reset(&mut self) {
        self.hv_x.fill(1.0);
        self.hv_y.fill(1.0);
        self.hv_z.fill(1.0);
        self.hv_t.fill(1.0);
    }
}

impl<'a> Task for ChunkSweep<'a> {
    type Key = SweepKey;

    fn key(&self) -> SweepKey {
        SweepKey { group: self.group, octant: self.octant, chunk: self.chunk }
    }

    fn downstream(&self) -> Vec<SweepKey> {
        Axis::ALL
            .iter()
            .filter_map(|&axis| self.ctx.mesh.downstream(self.chunk, self.octant, axis))
            .map(|chunk| SweepKey { group: self.group, octant: self.octant, chunk })
            .collect()
    }

    fn run(&self) {
        self.sweep();
    }
}

/// Plan one full sweep pass: every chunk, for every octant, for every
/// group. The keys form the dependency graph the scheduler executes.
pub fn plan_sweep<'a>(ctx: &'a SweepContext<'a>) -> Vec<ChunkSweep<'a>> {
    let mut tasks = Vec::with_capacity(
        ctx.fields.num_groups * ctx.fields.num_corners * ctx.mesh.num_chunks(),
    );
    for group in 0..ctx.fields.num_groups {
        for octant in Octant::all(ctx.fields.num_corners) {
            for chunk in ctx.mesh.chunks() {
                tasks.push(ChunkSweep::new(ctx, group, octant, chunk));
            }
        }
    }
    tasks
}

#[cfg(test)]
mod test {
    use super::{plan_sweep, ChunkSweep, SweepContext};
    use crate::config::MaterialTable;
    use crate::expand::{expand_cross_section, geometry_param, material_map};
    use crate::fields::FieldStore;
    use crate::mesh::{ChunkId, Mesh};
    use crate::moments::MomentQuad;
    use crate::octant::Octant;
    use crate::quadrature::Quadrature;
    use crate::schedule::Task;

    fn single_material(sigt: f64, groups: usize) -> MaterialTable {
        MaterialTable {
            sigt: vec![vec![sigt; groups]],
            slgg: vec![vec![vec![MomentQuad::from_scalar(0.0); groups]; groups]],
        }
    }

    fn setup(mesh: &Mesh, quad: &Quadrature, sigt: f64, q0: f64) -> FieldStore {
        let mats = single_material(sigt, 1);
        let map = material_map(mesh, Default::default());
        let mut fields = FieldStore::new(mesh, 1, quad.num_corners, quad.num_angles, quad.num_moments);
        fields.t_xs[0] = expand_cross_section(&mats, &map, 0);
        fields.dinv[0] = geometry_param(mesh, quad, &fields.t_xs[0], 0.0);
        fields.qtot[0].fill(MomentQuad::from_scalar(q0));
        fields.mat = map;
        fields
    }

    #[test]
    fn single_cell_kernel_matches_the_closed_form() {
        let mesh = Mesh::new((1.0, 1.0, 1.0), (1, 1, 1), (1, 1, 1));
        let quad = Quadrature::build(3, 2, 1);
        let fields = setup(&mesh, &quad, 1.0, 1.0);
        let ctx = SweepContext { mesh: &mesh, quad: &quad, fields: &fields, iteration: 0, fixup: false, mms_source: false };

        ChunkSweep::new(&ctx, 0, Octant::new(7), ChunkId { x: 0, y: 0, z: 0 }).run();

        // With no incoming flux the cell value is qtot * dinv per angle.
        let mut expect = 0.0;
        for a in 0..quad.num_angles {
            expect += quad.w[a] * fields.dinv[0].slice((0, 0, 0))[a];
        }
        let got = fields.flux[0].get((0, 0, 0));
        assert!((got - expect).abs() < 1e-15, "{} vs {}", got, expect);
    }

    #[test]
    fn fixup_clamps_a_negative_source_to_zero_flux() {
        let mesh = Mesh::new((1.0, 1.0, 1.0), (1, 1, 1), (1, 1, 1));
        let quad = Quadrature::build(3, 4, 1);
        let fields = setup(&mesh, &quad, 1.0, -1.0);
        let ctx = SweepContext { mesh: &mesh, quad: &quad, fields: &fields, iteration: 0, fixup: true, mms_source: false };

        for octant in Octant::all(quad.num_corners) {
            ChunkSweep::new(&ctx, 0, octant, ChunkId { x: 0, y: 0, z: 0 }).run();
        }
        assert_eq!(fields.flux[0].get((0, 0, 0)), 0.0);
    }

    #[test]
    fn downstream_flux_grows_along_the_sweep_direction() {
        let mesh = Mesh::new((1.0, 1.0, 1.0), (2, 1, 1), (1, 1, 1));
        let quad = Quadrature::build(1, 2, 1);
        let fields = setup(&mesh, &quad, 1.0, 1.0);
        let ctx = SweepContext { mesh: &mesh, quad: &quad, fields: &fields, iteration: 0, fixup: false, mms_source: false };

        // Only the +x octant: the second chunk consumes the ghost flux the
        // first one published.
        let plus_x = Octant::new(1);
        ChunkSweep::new(&ctx, 0, plus_x, ChunkId { x: 0, y: 0, z: 0 }).run();
        ChunkSweep::new(&ctx, 0, plus_x, ChunkId { x: 1, y: 0, z: 0 }).run();

        let upwind = fields.flux[0].get((0, 0, 0));
        let downwind = fields.flux[0].get((1, 0, 0));
        assert!(upwind > 0.0);
        assert!(downwind > upwind, "{} vs {}", downwind, upwind);
    }

    #[test]
    fn a_full_pass_covers_every_task_once() {
        let mesh = Mesh::new((1.0, 1.0, 1.0), (4, 4, 4), (2, 2, 2));
        let quad = Quadrature::build(3, 2, 2);
        let fields = FieldStore::new(&mesh, 2, quad.num_corners, quad.num_angles, quad.num_moments);
        let ctx = SweepContext { mesh: &mesh, quad: &quad, fields: &fields, iteration: 0, fixup: false, mms_source: false };
        let tasks = plan_sweep(&ctx);
        assert_eq!(tasks.len(), 2 * 8 * 8);
        let seeds = tasks.iter().filter(|t| t.wavefront() == 0).count();
        assert_eq!(seeds, 2 * 8);
    }
}
