use crate::config::MaterialTable;
use crate::fields::FieldStore;
use crate::moments::{MomentQuad, MomentTriple};
use crate::quadrature::Quadrature;
use crate::reduce::QuadReduction;

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Build the outer (group-to-group) scattering source for every group:
/// `qo[g1] = qi[g1] + sum over g2 != g1 of slgg[mat][g1][g2][0] * flux[g2]`,
/// and for multi-moment problems the corresponding `qom` from the higher
/// scattering moments and `fluxm`. Self-scattering is excluded; the inner
/// source applies it. Reads the converged flux of the previous outer
/// iterate directly from the reduction targets.
///
/// The x loop runs in strips of `gcd(nx, 32)` cells so the per-group flux
/// loads stay cache-resident while every destination group consumes them.
pub fn outer_source(fields: &mut FieldStore, mats: &MaterialTable, quad: &Quadrature) {
    let num_groups = fields.num_groups;
    let (nx, ny, nz) = fields.mat.size();
    let strip_size = gcd(nx, 32);
    let mut flux_strip = vec![0.0; num_groups * strip_size];

    for z in 0..nz {
        for y in 0..ny {
            for x in (0..nx).step_by(strip_size) {
                for g in 0..num_groups {
                    for i in 0..strip_size {
                        flux_strip[g * strip_size + i] = fields.flux[g].get((x + i, y, z));
                    }
                }
                for g1 in 0..num_groups {
                    for i in 0..strip_size {
                        let cell = (x + i, y, z);
                        let mat = fields.mat.get(cell);
                        let mut qo0 = fields.qi[g1].get(cell);
                        for g2 in 0..num_groups {
                            if g1 == g2 {
                                continue;
                            }
                            let cs = mats.slgg[mat][g1][g2];
                            qo0 += cs[0] * flux_strip[g2 * strip_size + i];
                        }
                        fields.qo[g1].set(cell, qo0);
                    }
                }
            }
        }
    }

    if quad.num_moments > 1 {
        let mut fluxm_strip = vec![MomentTriple::new(); num_groups * strip_size];
        for z in 0..nz {
            for y in 0..ny {
                for x in (0..nx).step_by(strip_size) {
                    for g in 0..num_groups {
                        for i in 0..strip_size {
                            fluxm_strip[g * strip_size + i] = fields.fluxm[g].get((x + i, y, z));
                        }
                    }
                    for g1 in 0..num_groups {
                        for i in 0..strip_size {
                            let cell = (x + i, y, z);
                            let mat = fields.mat.get(cell);
                            let mut qom = QuadReduction::identity();
                            for g2 in 0..num_groups {
                                if g1 == g2 {
                                    continue;
                                }
                                let scat = mats.slgg[mat][g1][g2];
                                let mut csm = MomentTriple::new();
                                let mut moment = 0;
                                for l in 1..quad.num_moments {
                                    for j in 0..quad.lma[l] {
                                        csm[moment + j] = scat[l];
                                    }
                                    moment += quad.lma[l];
                                }
                                let fluxm = fluxm_strip[g2 * strip_size + i];
                                let mut scattered = MomentTriple::new();
                                for l in 0..quad.num_moments - 1 {
                                    scattered[l] = csm[l] * fluxm[l];
                                }
                                QuadReduction::apply(&mut qom, scattered);
                            }
                            fields.qom[g1].set(cell, qom);
                        }
                    }
                }
            }
        }
    }
}

/// Build the total within-group source of one group for the next sweep:
/// the outer source plus self-scattering against the current flux iterate,
/// using the expanded per-cell scattering moments.
pub fn inner_source(fields: &mut FieldStore, quad: &Quadrature, group: usize) {
    let cells: Vec<_> = fields.mat.indexes().collect();
    for cell in cells {
        let s_xs = fields.s_xs[group].get(cell);
        let mut qtot = MomentQuad::from_scalar(
            fields.qo[group].get(cell) + s_xs[0] * fields.flux_prev_inner[group].get(cell),
        );
        if quad.num_moments > 1 {
            let qom = fields.qom[group].get(cell);
            let fluxm = fields.fluxm[group].get(cell);
            for l in 1..quad.num_moments {
                qtot[l] = qom[l - 1] + s_xs[l] * fluxm[l - 1];
            }
        }
        fields.qtot[group].set(cell, qtot);
    }
}

#[cfg(test)]
mod test {
    use super::{gcd, inner_source, outer_source};
    use crate::config::MaterialTable;
    use crate::fields::FieldStore;
    use crate::mesh::Mesh;
    use crate::moments::{MomentQuad, MomentTriple};
    use crate::quadrature::Quadrature;

    #[test]
    fn gcd_picks_the_strip_size() {
        assert_eq!(gcd(32, 32), 32);
        assert_eq!(gcd(48, 32), 16);
        assert_eq!(gcd(6, 32), 2);
        assert_eq!(gcd(5, 32), 1);
    }

    fn two_group_store(mesh: &Mesh, quad: &Quadrature) -> (FieldStore, MaterialTable) {
        let mats = MaterialTable {
            sigt: vec![vec![1.0, 1.0]],
            slgg: vec![vec![
                // Destination group 0: self-scatter only.
                vec![MomentQuad::from_scalar(0.3), MomentQuad::from_scalar(0.0)],
                // Destination group 1: fed by group 0.
                vec![MomentQuad::from_scalar(0.1), MomentQuad::from_scalar(0.2)],
            ]],
        };
        let fields = FieldStore::new(mesh, 2, quad.num_corners, quad.num_angles, quad.num_moments);
        (fields, mats)
    }

    #[test]
    fn outer_source_excludes_the_diagonal() {
        let mesh = Mesh::new((1.0, 1.0, 1.0), (6, 1, 1), (6, 1, 1));
        let quad = Quadrature::build(1, 2, 1);
        let (mut fields, mats) = two_group_store(&mesh, &quad);
        for cell in [(0, 0, 0), (3, 0, 0)] {
            fields.flux[0].fold(cell, 2.0);
            fields.flux[1].fold(cell, 1.0);
        }
        fields.qi[0].fill(1.0);

        outer_source(&mut fields, &mats, &quad);

        // Group 0 receives nothing from itself despite slgg[0][0] = 0.3.
        assert_eq!(fields.qo[0].get((0, 0, 0)), 1.0);
        assert_eq!(fields.qo[0].get((1, 0, 0)), 1.0);
        // Group 1 picks up 0.1 * flux[0].
        assert!((fields.qo[1].get((3, 0, 0)) - 0.2).abs() < 1e-15);
        assert_eq!(fields.qo[1].get((1, 0, 0)), 0.0);
    }

    #[test]
    fn outer_source_accumulates_scattering_moments() {
        let mesh = Mesh::new((1.0, 1.0, 1.0), (2, 1, 1), (2, 1, 1));
        let quad = Quadrature::build(1, 2, 2);
        let mut from_group0 = MomentQuad::from_scalar(0.1);
        from_group0[1] = 0.05;
        let mats = MaterialTable {
            sigt: vec![vec![1.0, 1.0]],
            slgg: vec![vec![
                vec![MomentQuad::from_scalar(0.3), MomentQuad::from_scalar(0.0)],
                vec![from_group0, MomentQuad::from_scalar(0.2)],
            ]],
        };
        let mut fields = FieldStore::new(&mesh, 2, quad.num_corners, quad.num_angles, quad.num_moments);
        let cell = (1, 0, 0);
        fields.fluxm[0].fold(cell, MomentTriple::from([2.0, 0.0, 0.0]));

        outer_source(&mut fields, &mats, &quad);

        // Group 1 picks up the first-order scattering moment of group 0's
        // flux moment; nothing feeds group 0.
        assert!((fields.qom[1].get(cell)[0] - 0.05 * 2.0).abs() < 1e-15);
        assert_eq!(fields.qom[0].get(cell)[0], 0.0);
    }

    #[test]
    fn inner_source_adds_self_scatter_to_the_outer_source() {
        let mesh = Mesh::new((1.0, 1.0, 1.0), (2, 1, 1), (2, 1, 1));
        let quad = Quadrature::build(1, 2, 1);
        let (mut fields, _) = two_group_store(&mesh, &quad);
        fields.qo[0].fill(0.5);
        fields.s_xs[0].fill(MomentQuad::from_scalar(0.3));
        fields.flux_prev_inner[0].fill(2.0);

        inner_source(&mut fields, &quad, 0);

        let q = fields.qtot[0].get((1, 0, 0));
        assert!((q[0] - (0.5 + 0.3 * 2.0)).abs() < 1e-15);
    }
}
