use log::{debug, info, warn};

use crate::config::{ConfigError, MaterialTable, Problem, SourceLayout};
use crate::expand::{expand_cross_section, expand_scattering, geometry_param, material_map};
use crate::fields::{CellArray, FieldStore};
use crate::mesh::Mesh;
use crate::mms;
use crate::moments::MomentTriple;
use crate::quadrature::Quadrature;
use crate::schedule;
use crate::source::{inner_source, outer_source};
use crate::sweep::{plan_sweep, SweepContext};

const TOLR: f64 = 1.0e-12;

/// How sweep tasks are executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// One task at a time, in dependency order.
    Serial,
    /// The crate's own worker pool with the given thread count.
    Pool(usize),
    /// The Rayon global pool.
    Rayon,
}

/// Outcome of one full run.
#[derive(Clone, Copy, Debug)]
pub struct RunReport {
    /// Whether every time step's outer iteration converged.
    pub converged: bool,
    /// Outer iterations spent in the final time step.
    pub outer_iterations: usize,
    /// Manufactured-solution (max, min, sum) relative error, when the
    /// problem ran with the MMS layout.
    pub mms_error: Option<MomentTriple>,
}

/// The assembled problem: mesh, quadrature, cross sections, and fields,
/// plus the iteration state. Construction performs every precomputation;
/// `run` executes the time steps.
pub struct Simulation {
    problem: Problem,
    mesh: Mesh,
    quad: Quadrature,
    mats: MaterialTable,
    fields: FieldStore,
    strategy: Strategy,
    ref_flux: Vec<CellArray<f64>>,
    qim_scale: f64,
    last_outer_iterations: usize,
}

impl Simulation {
    pub fn new(problem: Problem, strategy: Strategy) -> Result<Self, ConfigError> {
        problem.validate()?;

        let mesh = Mesh::new(
            (problem.lx, problem.ly, problem.lz),
            (problem.nx, problem.ny, problem.nz),
            (problem.nx_per_chunk, problem.ny_per_chunk, problem.nz_per_chunk),
        );
        let quad = Quadrature::build(problem.num_dims, problem.num_angles, problem.num_moments);
        let mats = MaterialTable::from_problem(&problem);

        let mut fields = FieldStore::new(
            &mesh,
            problem.num_groups,
            problem.num_corners(),
            problem.num_angles,
            problem.num_moments,
        );
        fields.mat = material_map(&mesh, problem.material_layout);
        for g in 0..problem.num_groups {
            if problem.time_dependent() {
                fields.vdelt[g] = 2.0 / (problem.dt * problem.velocity(g));
            }
            fields.t_xs[g] = expand_cross_section(&mats, &fields.mat, g);
            fields.s_xs[g] = expand_scattering(&mats, &fields.mat, g);
            fields.dinv[g] = geometry_param(&mesh, &quad, &fields.t_xs[g], fields.vdelt[g]);
        }

        let mut sim = Self {
            problem,
            mesh,
            quad,
            mats,
            fields,
            strategy,
            ref_flux: Vec::new(),
            qim_scale: 1.0,
            last_outer_iterations: 0,
        };
        sim.init_source();
        Ok(sim)
    }

    fn init_source(&mut self) {
        match self.problem.source_layout {
            SourceLayout::Fixed => {
                for g in 0..self.problem.num_groups {
                    self.fields.qi[g].fill(self.problem.fixed_source);
                }
            }
            SourceLayout::Mms => {
                let (ref_flux, ref_fluxm) = mms::init_reference(&self.mesh, &self.quad, self.problem.num_groups, self.problem.num_dims);
                mms::init_source(
                    &mut self.fields,
                    &self.mesh,
                    &self.quad,
                    &self.mats,
                    &ref_flux,
                    &ref_fluxm,
                    self.problem.num_dims,
                );
                self.ref_flux = ref_flux;
                if self.problem.time_dependent() {
                    let t_scale = self.problem.total_sim_time - 0.5 * self.problem.dt;
                    for g in 0..self.problem.num_groups {
                        mms::init_time_dependent(
                            self.problem.velocity(g),
                            t_scale,
                            &mut self.ref_flux[g],
                            &mut self.fields.qi[g],
                        );
                    }
                }
            }
        }
    }

    pub fn fields(&self) -> &FieldStore {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut FieldStore {
        &mut self.fields
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn last_outer_iterations(&self) -> usize {
        self.last_outer_iterations
    }

    /// Run every time step. Returns the overall report; `converged` is
    /// false if any step hit the outer iteration cap.
    pub fn run(&mut self) -> RunReport {
        let steps = self.problem.num_steps();
        let mut converged = true;
        for step in 0..steps {
            converged &= self.run_step(step);
        }
        let mms_error = (self.problem.source_layout == SourceLayout::Mms).then(|| self.compare_mms());
        RunReport {
            converged,
            outer_iterations: self.last_outer_iterations,
            mms_error,
        }
    }

    /// Run one time step: rotate the temporal flux into place, rescale the
    /// manufactured source to the step midpoint, and drive the outer
    /// iteration. Public so tests and the driver can observe per-step
    /// state.
    pub fn run_step(&mut self, step: usize) -> bool {
        if step > 0 {
            self.fields.rotate_time_flux();
        }
        if self.problem.source_layout == SourceLayout::Mms && self.problem.time_dependent() {
            // The manufactured flux grows linearly in time, so the angular
            // source tracks the step midpoint.
            let midpoint = (step as f64 + 0.5) * self.problem.dt;
            let factor = midpoint / self.qim_scale;
            for g in 0..self.problem.num_groups {
                for c in 0..self.fields.num_corners {
                    mms::scale_source(&mut self.fields.qim[g][c], factor);
                }
            }
            self.qim_scale = midpoint;
        }

        let converged = self.outer_loop(step);
        if converged {
            info!(
                "time step {} converged after {} outer iterations",
                step, self.last_outer_iterations
            );
        } else {
            warn!(
                "time step {} failed to converge within {} outer iterations",
                step, self.problem.max_outer_iters
            );
        }
        converged
    }

    fn outer_loop(&mut self, step: usize) -> bool {
        for outer in 0..self.problem.max_outer_iters {
            outer_source(&mut self.fields, &self.mats, &self.quad);
            for g in 0..self.problem.num_groups {
                self.fields.flux_prev_outer[g] = self.fields.flux[g].snapshot();
            }

            let inner_converged = self.inner_loop(outer);

            // An unconverged inner poisons the outer test.
            let outer_converged = inner_converged
                && (0..self.problem.num_groups).all(|g| {
                    flux_converged(
                        &self.fields.flux[g].snapshot(),
                        &self.fields.flux_prev_outer[g],
                        self.problem.epsi(),
                    )
                });
            debug!(
                "step {} outer {}: inner_converged={} outer_converged={}",
                step, outer, inner_converged, outer_converged
            );
            if outer_converged {
                self.last_outer_iterations = outer + 1;
                return true;
            }
        }
        self.last_outer_iterations = self.problem.max_outer_iters;
        false
    }

    fn inner_loop(&mut self, outer: usize) -> bool {
        for inner in 0..self.problem.max_inner_iters {
            for g in 0..self.problem.num_groups {
                self.fields.flux_prev_inner[g] = self.fields.flux[g].snapshot();
                inner_source(&mut self.fields, &self.quad, g);
                self.fields.zero_flux(g);
            }

            self.sweep_pass(outer);

            let converged = (0..self.problem.num_groups).all(|g| {
                flux_converged(
                    &self.fields.flux[g].snapshot(),
                    &self.fields.flux_prev_inner[g],
                    self.problem.epsi(),
                )
            });
            debug!("inner {}: converged={}", inner, converged);
            if converged {
                return true;
            }
        }
        false
    }

    /// One full sweep: all wavefronts of all octants for all groups. The
    /// outer-iteration index fixes the ghost-buffer parity for the pass.
    fn sweep_pass(&mut self, iteration: usize) {
        let ctx = SweepContext {
            mesh: &self.mesh,
            quad: &self.quad,
            fields: &self.fields,
            iteration,
            fixup: self.problem.flux_fixup,
            mms_source: self.problem.source_layout == SourceLayout::Mms,
        };
        let tasks = plan_sweep(&ctx);
        debug!("sweep pass over {} chunk tasks", tasks.len());
        match self.strategy {
            Strategy::Serial => schedule::execute(tasks),
            Strategy::Pool(threads) => schedule::execute_pool(tasks, threads),
            Strategy::Rayon => schedule::execute_rayon(tasks),
        }
    }

    /// Reduce the pointwise relative error of the scalar flux against the
    /// manufactured reference over every group and cell.
    pub fn compare_mms(&self) -> MomentTriple {
        let mut acc = crate::reduce::MmsReduction::identity();
        for g in 0..self.problem.num_groups {
            for cell in self.fields.mat.indexes() {
                let flux = self.fields.flux[g].get(cell);
                let mut ref_flux = self.ref_flux[g].get(cell);
                let mut df = 1.0;
                if ref_flux < TOLR {
                    ref_flux = 1.0;
                    df = 0.0;
                }
                df = (flux / ref_flux - df).abs();
                crate::reduce::MmsReduction::apply(&mut acc, MomentTriple::from([df, df, df]));
            }
        }
        acc
    }
}

/// The shared pointwise convergence test: relative change per cell unless
/// the previous iterate was effectively zero, in which case the absolute
/// value stands in.
pub fn flux_converged(flux: &CellArray<f64>, prev: &CellArray<f64>, epsi: f64) -> bool {
    for cell in flux.indexes() {
        let mut flux_prev = prev.get(cell);
        let mut df = 1.0;
        if flux_prev.abs() < TOLR {
            flux_prev = 1.0;
            df = 0.0;
        }
        df = (flux.get(cell) / flux_prev - df).abs();
        if df > epsi {
            return false;
        }
    }
    true
}
