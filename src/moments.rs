use core::ops::{Index, IndexMut};

/// The largest spherical-harmonic expansion order the moment containers can
/// hold. Source terms carry up to `MAX_MOMENTS` entries; flux moments carry
/// one fewer because the zeroth moment is stored separately as the scalar
/// flux.
pub const MAX_MOMENTS: usize = 4;

/// A per-cell source expansion: the zeroth moment plus up to three higher
/// moments, stored inline so a whole field of them stays contiguous.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MomentQuad([f64; MAX_MOMENTS]);

impl MomentQuad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_scalar(q0: f64) -> Self {
        let mut quad = Self::default();
        quad[0] = q0;
        quad
    }
}

impl Index<usize> for MomentQuad {
    type Output = f64;

    fn index(&self, l: usize) -> &f64 {
        &self.0[l]
    }
}

impl IndexMut<usize> for MomentQuad {
    fn index_mut(&mut self, l: usize) -> &mut f64 {
        &mut self.0[l]
    }
}

impl From<[f64; MAX_MOMENTS]> for MomentQuad {
    fn from(data: [f64; MAX_MOMENTS]) -> Self {
        Self(data)
    }
}

/// The higher flux moments of one cell (orders `1..num_moments`), and also
/// the (max, min, sum) accumulator used by the manufactured-solution
/// comparison.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MomentTriple([f64; MAX_MOMENTS - 1]);

impl MomentTriple {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Index<usize> for MomentTriple {
    type Output = f64;

    fn index(&self, l: usize) -> &f64 {
        &self.0[l]
    }
}

impl IndexMut<usize> for MomentTriple {
    fn index_mut(&mut self, l: usize) -> &mut f64 {
        &mut self.0[l]
    }
}

impl From<[f64; MAX_MOMENTS - 1]> for MomentTriple {
    fn from(data: [f64; MAX_MOMENTS - 1]) -> Self {
        Self(data)
    }
}
