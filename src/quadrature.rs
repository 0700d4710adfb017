use crate::mesh::Axis;
use crate::moments::MAX_MOMENTS;
use crate::octant::Octant;

/// The direction set of the problem: per-octant direction cosines, weights,
/// and the moment expansion coefficients used to project angular fluxes onto
/// spherical-harmonic moments. Built once at setup and immutable afterwards;
/// passed by reference into every kernel rather than held in a global.
#[derive(Clone, Debug)]
pub struct Quadrature {
    pub num_angles: usize,
    pub num_moments: usize,
    pub num_corners: usize,
    /// Direction cosines against x, one per angle, positive; octant signs
    /// are applied through the expansion coefficients and sweep strides.
    pub mu: Vec<f64>,
    /// Direction cosines against y (zero below 2D).
    pub eta: Vec<f64>,
    /// Direction cosines against z (zero below 3D).
    pub xi: Vec<f64>,
    /// Quadrature weights, one per angle, uniform.
    pub w: Vec<f64>,
    /// Moment expansion coefficients laid out as
    /// `ec[corner * num_moments * num_angles + l * num_angles + angle]`.
    pub ec: Vec<f64>,
    /// Sub-moment counts per expansion order.
    pub lma: [usize; MAX_MOMENTS],
}

impl Quadrature {
    /// Build the dummy evenly-spaced quadrature: `num_angles` directions per
    /// octant with cosines at interval midpoints, a flat weight normalized so
    /// the full sphere integrates to one, and first-order expansion
    /// coefficients equal to the octant-signed cosines.
    pub fn build(num_dims: usize, num_angles: usize, num_moments: usize) -> Self {
        assert!((1..=3).contains(&num_dims), "unsupported dimension count {}", num_dims);
        assert!(num_angles > 0, "quadrature needs at least one angle");
        assert!(
            (1..=MAX_MOMENTS).contains(&num_moments),
            "moment count {} outside 1..={}",
            num_moments,
            MAX_MOMENTS
        );
        let num_corners = 1 << num_dims;

        let dm = 1.0 / num_angles as f64;
        let mut mu = vec![0.0; num_angles];
        let mut eta = vec![0.0; num_angles];
        let mut xi = vec![0.0; num_angles];
        for a in 0..num_angles {
            mu[a] = (a as f64 + 0.5) * dm;
        }
        if num_dims > 1 {
            for a in 0..num_angles {
                eta[a] = 1.0 - (a as f64 + 0.5) * dm;
            }
        }
        if num_dims > 2 {
            for a in 0..num_angles {
                let rest = 1.0 - mu[a] * mu[a] - eta[a] * eta[a];
                xi[a] = rest.max(0.0).sqrt();
            }
        }

        let weight = match num_dims {
            1 => 0.5,
            2 => 0.25,
            _ => 0.125,
        } / num_angles as f64;
        let w = vec![weight; num_angles];

        let mut quad = Self {
            num_angles,
            num_moments,
            num_corners,
            mu,
            eta,
            xi,
            w,
            ec: vec![0.0; num_corners * num_moments * num_angles],
            lma: [1; MAX_MOMENTS],
        };
        quad.fill_expansion();
        quad
    }

    // The zeroth moment is isotropic; orders 1..=3 carry the signed
    // direction cosines of x, y, z respectively (zero where the problem
    // has no such axis).
    fn fill_expansion(&mut self) {
        for corner in Octant::all(self.num_corners) {
            for l in 0..self.num_moments {
                let offset = self.moment_offset(corner, l);
                for a in 0..self.num_angles {
                    self.ec[offset + a] = match l {
                        0 => 1.0,
                        1 => corner.sign(Axis::X) * self.mu[a],
                        2 => corner.sign(Axis::Y) * self.eta[a],
                        _ => corner.sign(Axis::Z) * self.xi[a],
                    };
                }
            }
        }
    }

    /// Offset of the `(corner, l)` block within `ec`.
    pub fn moment_offset(&self, corner: Octant, l: usize) -> usize {
        assert!(l < self.num_moments, "moment order {} out of range", l);
        assert!(corner.id() < self.num_corners, "corner {} out of range", corner.id());
        corner.id() * self.num_moments * self.num_angles + l * self.num_angles
    }

    pub fn ec_at(&self, corner: Octant, l: usize, angle: usize) -> f64 {
        self.ec[self.moment_offset(corner, l) + angle]
    }
}

#[cfg(test)]
mod test {
    use super::Quadrature;
    use crate::octant::Octant;

    #[test]
    fn weights_integrate_the_sphere_to_one() {
        for dims in 1..=3 {
            let quad = Quadrature::build(dims, 6, 1);
            let total: f64 = (0..quad.num_corners)
                .flat_map(|_| quad.w.iter())
                .sum();
            assert!((total - 1.0).abs() < 1e-14, "{} dims: total {}", dims, total);
        }
    }

    #[test]
    fn cosines_stay_inside_the_unit_interval() {
        let quad = Quadrature::build(3, 8, 1);
        for a in 0..8 {
            assert!(quad.mu[a] > 0.0 && quad.mu[a] < 1.0);
            assert!(quad.eta[a] > 0.0 && quad.eta[a] < 1.0);
            assert!(quad.xi[a] >= 0.0 && quad.xi[a] <= 1.0);
        }
    }

    #[test]
    fn first_order_coefficients_carry_the_octant_sign() {
        let quad = Quadrature::build(3, 4, 2);
        let plus = Octant::new(0b001);
        let minus = Octant::new(0b000);
        for a in 0..4 {
            assert_eq!(quad.ec_at(plus, 0, a), 1.0);
            assert_eq!(quad.ec_at(plus, 1, a), quad.mu[a]);
            assert_eq!(quad.ec_at(minus, 1, a), -quad.mu[a]);
        }
    }

    #[test]
    fn lower_dimensional_cosines_vanish() {
        let quad = Quadrature::build(1, 4, 1);
        assert!(quad.eta.iter().all(|&e| e == 0.0));
        assert!(quad.xi.iter().all(|&x| x == 0.0));
        assert_eq!(quad.num_corners, 2);
    }
}
