use std::error;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::moments::{MomentQuad, MAX_MOMENTS};

/// How the inhomogeneous source is laid out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLayout {
    /// A flat fixed source of strength `fixed_source` in every cell.
    #[default]
    Fixed,
    /// The manufactured-solution angular source; the reference flux is known
    /// analytically and the run ends with a comparison.
    Mms,
}

/// How materials are assigned to cells.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialLayout {
    /// Material 0 everywhere.
    #[default]
    Uniform,
    /// Material 1 in a box covering the middle half of each axis, material 0
    /// outside it.
    CenteredBox,
}

/// Cross sections for one material, as read from the problem file: the
/// total cross section per group, and the group-to-group scattering moments
/// `slgg[g_dst][g_src]` as a four-entry expansion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaterialSpec {
    pub sigt: Vec<f64>,
    pub slgg: Vec<Vec<[f64; MAX_MOMENTS]>>,
}

/// The full problem definition, deserialized from a JSON problem file.
/// Immutable after `validate` passes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Problem {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub nx_per_chunk: usize,
    pub ny_per_chunk: usize,
    pub nz_per_chunk: usize,
    pub num_groups: usize,
    pub num_angles: usize,
    pub num_moments: usize,
    pub num_dims: usize,
    pub lx: f64,
    pub ly: f64,
    pub lz: f64,
    #[serde(default)]
    pub dt: f64,
    #[serde(default)]
    pub total_sim_time: f64,
    pub convergence_eps: f64,
    pub max_inner_iters: usize,
    pub max_outer_iters: usize,
    #[serde(default)]
    pub flux_fixup: bool,
    #[serde(default)]
    pub source_layout: SourceLayout,
    #[serde(default)]
    pub material_layout: MaterialLayout,
    /// Explicit material tables; when empty, a built-in set is generated.
    #[serde(default)]
    pub materials: Vec<MaterialSpec>,
    /// Neutron speed per group, used by the time-absorption term. Defaults
    /// to 1.0 for every group.
    #[serde(default)]
    pub group_velocities: Vec<f64>,
    #[serde(default = "default_fixed_source")]
    pub fixed_source: f64,
}

fn default_fixed_source() -> f64 {
    1.0
}

impl Problem {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=3).contains(&self.num_dims) {
            return Err(ConfigError::BadDimensionCount(self.num_dims));
        }
        if self.num_dims < 3 && (self.nz != 1 || self.nz_per_chunk != 1) {
            return Err(ConfigError::FlatAxisNotUnit("z"));
        }
        if self.num_dims < 2 && (self.ny != 1 || self.ny_per_chunk != 1) {
            return Err(ConfigError::FlatAxisNotUnit("y"));
        }
        for (n, per_chunk, name) in [
            (self.nx, self.nx_per_chunk, "x"),
            (self.ny, self.ny_per_chunk, "y"),
            (self.nz, self.nz_per_chunk, "z"),
        ] {
            if n == 0 || per_chunk == 0 || n % per_chunk != 0 {
                return Err(ConfigError::BadChunkShape { axis: name, cells: n, per_chunk });
            }
        }
        if self.num_groups == 0 {
            return Err(ConfigError::NoGroups);
        }
        if self.num_angles == 0 {
            return Err(ConfigError::NoAngles);
        }
        if !(1..=MAX_MOMENTS).contains(&self.num_moments) {
            return Err(ConfigError::BadMomentCount(self.num_moments));
        }
        if self.lx <= 0.0 || self.ly <= 0.0 || self.lz <= 0.0 {
            return Err(ConfigError::NonPositiveExtent);
        }
        if self.total_sim_time > 0.0 && self.dt <= 0.0 {
            return Err(ConfigError::BadTimeStep(self.dt));
        }
        if self.convergence_eps <= 0.0 {
            return Err(ConfigError::BadEpsilon(self.convergence_eps));
        }
        if self.max_inner_iters == 0 || self.max_outer_iters == 0 {
            return Err(ConfigError::ZeroIterationCap);
        }
        if !self.group_velocities.is_empty() && self.group_velocities.len() != self.num_groups {
            return Err(ConfigError::BadVelocityCount {
                found: self.group_velocities.len(),
                groups: self.num_groups,
            });
        }
        if !self.materials.is_empty() {
            if self.materials.len() < self.num_materials() {
                return Err(ConfigError::MissingMaterials {
                    found: self.materials.len(),
                    needed: self.num_materials(),
                });
            }
            for (m, spec) in self.materials.iter().enumerate() {
                let square = spec.slgg.len() == self.num_groups
                    && spec.slgg.iter().all(|row| row.len() == self.num_groups);
                if spec.sigt.len() != self.num_groups || !square {
                    return Err(ConfigError::BadMaterialShape { material: m });
                }
            }
        }
        Ok(())
    }

    /// Corners in play: two per swept dimension.
    pub fn num_corners(&self) -> usize {
        1 << self.num_dims
    }

    pub fn num_materials(&self) -> usize {
        match self.material_layout {
            MaterialLayout::Uniform => 1,
            MaterialLayout::CenteredBox => 2,
        }
    }

    pub fn time_dependent(&self) -> bool {
        self.total_sim_time > 0.0 && self.dt > 0.0
    }

    pub fn num_steps(&self) -> usize {
        if self.time_dependent() {
            ((self.total_sim_time / self.dt).round() as usize).max(1)
        } else {
            1
        }
    }

    pub fn velocity(&self, group: usize) -> f64 {
        self.group_velocities.get(group).copied().unwrap_or(1.0)
    }

    /// The shared inner/outer convergence threshold.
    pub fn epsi(&self) -> f64 {
        100.0 * self.convergence_eps
    }
}

/// Cross-section tables resolved from the problem file (or generated),
/// indexed by material.
#[derive(Clone, Debug)]
pub struct MaterialTable {
    /// `sigt[mat][g]`
    pub sigt: Vec<Vec<f64>>,
    /// `slgg[mat][g_dst][g_src]`
    pub slgg: Vec<Vec<Vec<MomentQuad>>>,
}

impl MaterialTable {
    pub fn from_problem(problem: &Problem) -> Self {
        if problem.materials.is_empty() {
            Self::generate(problem.num_materials(), problem.num_groups)
        } else {
            let sigt = problem.materials.iter().map(|m| m.sigt.clone()).collect();
            let slgg = problem
                .materials
                .iter()
                .map(|m| {
                    m.slgg
                        .iter()
                        .map(|row| row.iter().map(|&q| MomentQuad::from(q)).collect())
                        .collect()
                })
                .collect();
            Self { sigt, slgg }
        }
    }

    /// The built-in cross sections: total cross section rising slowly with
    /// group index, scattering dominated by within-group and down-scatter
    /// terms, higher moments halved per order. Kept sub-critical so source
    /// iteration always contracts.
    fn generate(num_materials: usize, num_groups: usize) -> Self {
        let mut sigt = Vec::with_capacity(num_materials);
        let mut slgg = Vec::with_capacity(num_materials);
        for mat in 0..num_materials {
            let base = 1.0 + mat as f64 * 0.5;
            let totals: Vec<f64> = (0..num_groups).map(|g| base + g as f64 * 0.01).collect();
            let mut rows = Vec::with_capacity(num_groups);
            for g1 in 0..num_groups {
                let mut row = Vec::with_capacity(num_groups);
                for g2 in 0..num_groups {
                    let s0 = if g1 == g2 {
                        0.2 * totals[g1]
                    } else if g2 < g1 {
                        0.1 / num_groups as f64
                    } else {
                        0.02 / num_groups as f64
                    };
                    let mut quad = MomentQuad::from_scalar(s0);
                    for l in 1..MAX_MOMENTS {
                        quad[l] = quad[l - 1] * 0.5;
                    }
                    row.push(quad);
                }
                rows.push(row);
            }
            sigt.push(totals);
            slgg.push(rows);
        }
        Self { sigt, slgg }
    }
}

/// A rejected problem definition.
#[derive(Debug)]
pub enum ConfigError {
    BadDimensionCount(usize),
    FlatAxisNotUnit(&'static str),
    BadChunkShape { axis: &'static str, cells: usize, per_chunk: usize },
    NoGroups,
    NoAngles,
    BadMomentCount(usize),
    NonPositiveExtent,
    BadTimeStep(f64),
    BadEpsilon(f64),
    ZeroIterationCap,
    BadVelocityCount { found: usize, groups: usize },
    MissingMaterials { found: usize, needed: usize },
    BadMaterialShape { material: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        use ConfigError::*;

        match self {
            BadDimensionCount(n) => write!(fmt, "num_dims must be 1, 2, or 3, got {}", n),
            FlatAxisNotUnit(axis) => {
                write!(fmt, "the {} axis must have one cell below this dimension count", axis)
            }
            BadChunkShape { axis, cells, per_chunk } => write!(
                fmt,
                "chunk size {} does not divide {} cells on the {} axis",
                per_chunk, cells, axis
            ),
            NoGroups => write!(fmt, "at least one energy group is required"),
            NoAngles => write!(fmt, "at least one angle per octant is required"),
            BadMomentCount(n) => {
                write!(fmt, "num_moments must lie in 1..={}, got {}", MAX_MOMENTS, n)
            }
            NonPositiveExtent => write!(fmt, "physical extents must be positive"),
            BadTimeStep(dt) => write!(fmt, "time-dependent run needs dt > 0, got {}", dt),
            BadEpsilon(eps) => write!(fmt, "convergence_eps must be positive, got {}", eps),
            ZeroIterationCap => write!(fmt, "iteration caps must be at least 1"),
            BadVelocityCount { found, groups } => write!(
                fmt,
                "group_velocities has {} entries but the problem has {} groups",
                found, groups
            ),
            MissingMaterials { found, needed } => write!(
                fmt,
                "material layout needs {} materials but only {} were given",
                needed, found
            ),
            BadMaterialShape { material } => write!(
                fmt,
                "material {} tables do not match the group count",
                material
            ),
        }
    }
}

impl error::Error for ConfigError {}

#[cfg(test)]
mod test {
    use super::{ConfigError, MaterialTable, Problem, SourceLayout};

    pub fn base_problem() -> Problem {
        Problem {
            nx: 4,
            ny: 4,
            nz: 4,
            nx_per_chunk: 2,
            ny_per_chunk: 2,
            nz_per_chunk: 2,
            num_groups: 2,
            num_angles: 4,
            num_moments: 2,
            num_dims: 3,
            lx: 1.0,
            ly: 1.0,
            lz: 1.0,
            dt: 0.0,
            total_sim_time: 0.0,
            convergence_eps: 1.0e-4,
            max_inner_iters: 5,
            max_outer_iters: 10,
            flux_fixup: false,
            source_layout: SourceLayout::Fixed,
            material_layout: Default::default(),
            materials: Vec::new(),
            group_velocities: Vec::new(),
            fixed_source: 1.0,
        }
    }

    #[test]
    fn base_problem_validates() {
        assert!(base_problem().validate().is_ok());
    }

    #[test]
    fn chunk_shape_must_divide_the_mesh() {
        let mut p = base_problem();
        p.nx_per_chunk = 3;
        assert!(matches!(p.validate(), Err(ConfigError::BadChunkShape { axis: "x", .. })));
    }

    #[test]
    fn one_dimensional_problems_need_flat_y_and_z() {
        let mut p = base_problem();
        p.num_dims = 1;
        assert!(matches!(p.validate(), Err(ConfigError::FlatAxisNotUnit(_))));
        p.ny = 1;
        p.ny_per_chunk = 1;
        p.nz = 1;
        p.nz_per_chunk = 1;
        assert!(p.validate().is_ok());
        assert_eq!(p.num_corners(), 2);
    }

    #[test]
    fn time_dependent_run_requires_a_step() {
        let mut p = base_problem();
        p.total_sim_time = 1.0;
        assert!(matches!(p.validate(), Err(ConfigError::BadTimeStep(_))));
        p.dt = 0.25;
        assert!(p.validate().is_ok());
        assert_eq!(p.num_steps(), 4);
    }

    #[test]
    fn generated_materials_are_subcritical() {
        let p = base_problem();
        let mats = MaterialTable::from_problem(&p);
        for g in 0..p.num_groups {
            let scatter: f64 = (0..p.num_groups).map(|g2| mats.slgg[0][g][g2][0]).sum();
            assert!(scatter < mats.sigt[0][g]);
        }
    }

    #[test]
    fn problem_round_trips_through_json() {
        let p = base_problem();
        let text = serde_json::to_string(&p).unwrap();
        let back: Problem = serde_json::from_str(&text).unwrap();
        assert_eq!(back.nx, p.nx);
        assert_eq!(back.source_layout, p.source_layout);
    }
}
