//! Method-of-manufactured-solutions diagnostics: a separable sine/cosine
//! reference flux, the angular source that makes it an exact solution of
//! the transport equation, and the comparison reduction the driver reports.

use std::f64::consts::PI;

use crate::config::MaterialTable;
use crate::fields::{AngleArray, CellArray, FieldStore};
use crate::mesh::{Axis, Mesh};
use crate::moments::MomentTriple;
use crate::octant::Octant;
use crate::quadrature::Quadrature;

/// Cell averages of `sin(d x)` over `[bounds[i], bounds[i+1]]`, written as
/// the cosine difference divided by `d * del`.
fn trig_integral_cos(d: f64, del: f64, bounds: &[f64], out: &mut [f64]) {
    let denom = d * del;
    for i in 0..out.len() {
        out[i] = ((d * bounds[i]).cos() - (d * bounds[i + 1]).cos()) / denom;
    }
}

/// Cell averages of `d cos(d x)`, written as the sine difference divided
/// by `del`.
fn trig_integral_sin(d: f64, del: f64, bounds: &[f64], out: &mut [f64]) {
    for i in 0..out.len() {
        out[i] = ((d * bounds[i + 1]).sin() - (d * bounds[i]).sin()) / del;
    }
}

fn cell_bounds(count: usize, del: f64) -> Vec<f64> {
    (0..=count).map(|i| i as f64 * del).collect()
}

/// The separable trigonometric tables of one run: per axis, the cell
/// averages of the sine factor (`t*`) and of its derivative factor (`s*`).
/// Axes the problem does not sweep collapse to one and zero.
struct TrigTables {
    cx: Vec<f64>,
    sx: Vec<f64>,
    cy: Vec<f64>,
    sy: Vec<f64>,
    cz: Vec<f64>,
    sz: Vec<f64>,
}

impl TrigTables {
    fn build(mesh: &Mesh, num_dims: usize) -> Self {
        let (nx, ny, nz) = mesh.size;
        let (dx, dy, dz) = mesh.cell_spacing();
        let a = PI / mesh.extent.0;
        let b = PI / mesh.extent.1;
        let c = PI / mesh.extent.2;

        let mut tables = Self {
            cx: vec![0.0; nx],
            sx: vec![0.0; nx],
            cy: vec![1.0; ny],
            sy: vec![0.0; ny],
            cz: vec![1.0; nz],
            sz: vec![0.0; nz],
        };
        let ib = cell_bounds(nx, dx);
        trig_integral_cos(a, dx, &ib, &mut tables.cx);
        trig_integral_sin(a, dx, &ib, &mut tables.sx);
        if num_dims > 1 {
            let jb = cell_bounds(ny, dy);
            trig_integral_cos(b, dy, &jb, &mut tables.cy);
            trig_integral_sin(b, dy, &jb, &mut tables.sy);
        }
        if num_dims > 2 {
            let kb = cell_bounds(nz, dz);
            trig_integral_cos(c, dz, &kb, &mut tables.cz);
            trig_integral_sin(c, dz, &kb, &mut tables.sz);
        }
        tables
    }
}

/// Build the reference scalar flux and its higher moments. The flux of
/// group `g` is `(g + 1) * tx[i] * ty[j] * tz[k]`; each stored moment is
/// the flux scaled by the quadrature-weighted expansion coefficient summed
/// over every corner.
pub fn init_reference(
    mesh: &Mesh,
    quad: &Quadrature,
    num_groups: usize,
    num_dims: usize,
) -> (Vec<CellArray<f64>>, Vec<CellArray<MomentTriple>>) {
    let tables = TrigTables::build(mesh, num_dims);

    let ref_flux: Vec<CellArray<f64>> = (0..num_groups)
        .map(|g| {
            CellArray::from_fn(mesh.size, |(i, j, k)| {
                (g + 1) as f64 * tables.cx[i] * tables.cy[j] * tables.cz[k]
            })
        })
        .collect();

    let mut p = MomentTriple::new();
    for corner in Octant::all(quad.num_corners) {
        for l in 1..quad.num_moments {
            let offset = quad.moment_offset(corner, l);
            for a in 0..quad.num_angles {
                p[l - 1] += quad.w[a] * quad.ec[offset + a];
            }
        }
    }

    let ref_fluxm = ref_flux
        .iter()
        .map(|flux| {
            CellArray::from_fn(mesh.size, |cell| {
                let mut m = MomentTriple::new();
                for l in 0..3 {
                    m[l] = p[l] * flux.get(cell);
                }
                m
            })
        })
        .collect();

    (ref_flux, ref_fluxm)
}

/// Build the per-corner angular source that makes the reference flux an
/// exact solution: streaming plus collision minus every scattering
/// contribution the iteration will add back.
pub fn init_source(
    fields: &mut FieldStore,
    mesh: &Mesh,
    quad: &Quadrature,
    mats: &MaterialTable,
    ref_flux: &[CellArray<f64>],
    ref_fluxm: &[CellArray<MomentTriple>],
    num_dims: usize,
) {
    let tables = TrigTables::build(mesh, num_dims);
    let num_groups = ref_flux.len();
    let na = quad.num_angles;

    fields.qim = (0..num_groups)
        .map(|_| (0..quad.num_corners).map(|_| AngleArray::zeros(mesh.size, na)).collect())
        .collect();

    for corner in Octant::all(quad.num_corners) {
        let is = corner.sign(Axis::X);
        let js = corner.sign(Axis::Y);
        let ks = corner.sign(Axis::Z);
        for g in 0..num_groups {
            let scale = (g + 1) as f64;
            for cell in ref_flux[g].indexes() {
                let (i, j, k) = cell;
                let mat = fields.mat.get(cell);
                let sigt = mats.sigt[mat][g];
                let collision = sigt * ref_flux[g].get(cell);

                let out = fields.qim[g][corner.id()].slice_mut(cell);
                for (a, slot) in out.iter_mut().enumerate() {
                    let mut value = collision
                        + scale * is * quad.mu[a] * tables.sx[i] * tables.cy[j] * tables.cz[k];
                    if num_dims > 1 {
                        value +=
                            scale * js * quad.eta[a] * tables.cx[i] * tables.sy[j] * tables.cz[k];
                    }
                    if num_dims > 2 {
                        value +=
                            scale * ks * quad.xi[a] * tables.cx[i] * tables.cy[j] * tables.sz[k];
                    }
                    for g2 in 0..num_groups {
                        let scat = mats.slgg[mat][g][g2];
                        value -= scat[0] * ref_flux[g2].get(cell);
                        let fluxm = ref_fluxm[g2].get(cell);
                        let mut lm = 1;
                        for l in 1..quad.num_moments {
                            for _ in 0..quad.lma[l] {
                                value -= quad.ec_at(corner, lm, a) * scat[l] * fluxm[lm - 1];
                                lm += 1;
                            }
                        }
                    }
                    *slot = value;
                }
            }
        }
    }
}

/// Convert a steady manufactured problem into the time-dependent one whose
/// flux grows linearly in time: the fixed source carries the time
/// derivative, and the reference flux is rescaled to the final comparison
/// time.
pub fn init_time_dependent(
    velocity: f64,
    t_scale: f64,
    ref_flux: &mut CellArray<f64>,
    qi: &mut CellArray<f64>,
) {
    for cell in ref_flux.indexes() {
        let reference = ref_flux.get(cell);
        qi.set(cell, reference / velocity);
        ref_flux.set(cell, reference * t_scale);
    }
}

/// Rescale a manufactured angular source in place.
pub fn scale_source(qim: &mut AngleArray, factor: f64) {
    qim.scale(factor);
}
