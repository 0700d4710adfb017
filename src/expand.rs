use crate::config::{MaterialLayout, MaterialTable};
use crate::fields::{AngleArray, CellArray};
use crate::mesh::Mesh;
use crate::moments::MomentQuad;
use crate::quadrature::Quadrature;

/// Assign a material index to every cell.
pub fn material_map(mesh: &Mesh, layout: MaterialLayout) -> CellArray<usize> {
    match layout {
        MaterialLayout::Uniform => CellArray::zeros(mesh.size),
        MaterialLayout::CenteredBox => {
            let inside = |n: usize, i: usize| {
                let lo = n / 4;
                let hi = n - n / 4;
                i >= lo && i < hi
            };
            let (nx, ny, nz) = mesh.size;
            CellArray::from_fn(mesh.size, |(i, j, k)| {
                usize::from(inside(nx, i) && inside(ny, j) && inside(nz, k))
            })
        }
    }
}

/// Expand the per-material total cross section of one group onto cells.
pub fn expand_cross_section(mats: &MaterialTable, map: &CellArray<usize>, group: usize) -> CellArray<f64> {
    CellArray::from_fn(map.size(), |cell| mats.sigt[map.get(cell)][group])
}

/// Expand the within-group scattering moments of one group onto cells.
pub fn expand_scattering(mats: &MaterialTable, map: &CellArray<usize>, group: usize) -> CellArray<MomentQuad> {
    CellArray::from_fn(map.size(), |cell| mats.slgg[map.get(cell)][group][group])
}

/// Precompute the per-angle inverse denominator of the diamond-difference
/// update for one group. Pure in its inputs; the sweep never recomputes or
/// modifies it.
pub fn geometry_param(
    mesh: &Mesh,
    quad: &Quadrature,
    t_xs: &CellArray<f64>,
    vdelt: f64,
) -> AngleArray {
    let (hi, hj, hk) = mesh.geometry_factors();
    let mut dinv = AngleArray::zeros(mesh.size, quad.num_angles);
    for cell in t_xs.indexes() {
        let total = t_xs.get(cell);
        let out = dinv.slice_mut(cell);
        for a in 0..quad.num_angles {
            out[a] = 1.0
                / (total + quad.mu[a] * hi + quad.eta[a] * hj + quad.xi[a] * hk + vdelt);
        }
    }
    dinv
}

#[cfg(test)]
mod test {
    use super::{expand_cross_section, expand_scattering, geometry_param, material_map};
    use crate::config::{MaterialLayout, MaterialTable};
    use crate::mesh::Mesh;
    use crate::moments::MomentQuad;
    use crate::quadrature::Quadrature;

    fn two_materials() -> MaterialTable {
        MaterialTable {
            sigt: vec![vec![1.0], vec![2.0]],
            slgg: vec![
                vec![vec![MomentQuad::from_scalar(0.1)]],
                vec![vec![MomentQuad::from_scalar(0.4)]],
            ],
        }
    }

    #[test]
    fn centered_box_covers_the_middle_half() {
        let mesh = Mesh::new((1.0, 1.0, 1.0), (4, 4, 4), (4, 4, 4));
        let map = material_map(&mesh, MaterialLayout::CenteredBox);
        assert_eq!(map.get((0, 0, 0)), 0);
        assert_eq!(map.get((1, 1, 1)), 1);
        assert_eq!(map.get((2, 2, 2)), 1);
        assert_eq!(map.get((3, 2, 2)), 0);
    }

    #[test]
    fn expansion_follows_the_material_map() {
        let mesh = Mesh::new((1.0, 1.0, 1.0), (4, 4, 4), (4, 4, 4));
        let map = material_map(&mesh, MaterialLayout::CenteredBox);
        let mats = two_materials();
        let t_xs = expand_cross_section(&mats, &map, 0);
        let s_xs = expand_scattering(&mats, &map, 0);
        assert_eq!(t_xs.get((0, 0, 0)), 1.0);
        assert_eq!(t_xs.get((2, 2, 2)), 2.0);
        assert_eq!(s_xs.get((0, 0, 0))[0], 0.1);
        assert_eq!(s_xs.get((2, 2, 2))[0], 0.4);
    }

    #[test]
    fn dinv_inverts_the_streaming_denominator() {
        let mesh = Mesh::new((2.0, 2.0, 2.0), (2, 2, 2), (2, 2, 2));
        let quad = Quadrature::build(3, 2, 1);
        let map = material_map(&mesh, MaterialLayout::Uniform);
        let mats = MaterialTable {
            sigt: vec![vec![1.5]],
            slgg: vec![vec![vec![MomentQuad::from_scalar(0.0)]]],
        };
        let t_xs = expand_cross_section(&mats, &map, 0);
        let dinv = geometry_param(&mesh, &quad, &t_xs, 0.5);
        let (hi, hj, hk) = mesh.geometry_factors();
        let a = 1;
        let expect = 1.0 / (1.5 + quad.mu[a] * hi + quad.eta[a] * hj + quad.xi[a] * hk + 0.5);
        assert_eq!(dinv.slice((0, 0, 0))[a], expect);
    }
}
