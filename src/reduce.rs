use std::sync::atomic::{AtomicU64, Ordering};

use crate::moments::MomentTriple;

/// Add `value` into an `f64` stored as its bit pattern in an `AtomicU64`,
/// with a compare-exchange retry loop. This is the primitive every sweep
/// task uses to contribute to shared reduction targets without locks.
#[inline]
pub fn atomic_add(slot: &AtomicU64, value: f64) {
    let mut old = slot.load(Ordering::Relaxed);
    loop {
        let new = (f64::from_bits(old) + value).to_bits();
        match slot.compare_exchange_weak(old, new, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(found) => old = found,
        }
    }
}

#[inline]
pub fn atomic_max(slot: &AtomicU64, value: f64) {
    let mut old = slot.load(Ordering::Relaxed);
    loop {
        let new = f64::from_bits(old).max(value).to_bits();
        match slot.compare_exchange_weak(old, new, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(found) => old = found,
        }
    }
}

#[inline]
pub fn atomic_min(slot: &AtomicU64, value: f64) {
    let mut old = slot.load(Ordering::Relaxed);
    loop {
        let new = f64::from_bits(old).min(value).to_bits();
        match slot.compare_exchange_weak(old, new, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(found) => old = found,
        }
    }
}

/// Scalar-flux reduction: commutative, associative addition with identity
/// zero. `apply` is the single-threaded form, `fold` the concurrent one.
pub struct SumReduction;

impl SumReduction {
    pub const IDENTITY: f64 = 0.0;

    #[inline]
    pub fn apply(lhs: &mut f64, rhs: f64) {
        *lhs += rhs;
    }

    #[inline]
    pub fn fold(slot: &AtomicU64, rhs: f64) {
        atomic_add(slot, rhs);
    }
}

/// Flux-moment reduction: elementwise addition over the stored higher
/// moments of one cell.
pub struct QuadReduction;

impl QuadReduction {
    pub fn identity() -> MomentTriple {
        MomentTriple::new()
    }

    #[inline]
    pub fn apply(lhs: &mut MomentTriple, rhs: MomentTriple) {
        for l in 0..3 {
            lhs[l] += rhs[l];
        }
    }

    /// Fold a moment contribution into a cell's slots, each slot an `f64`
    /// bit pattern.
    #[inline]
    pub fn fold(slots: &[AtomicU64], rhs: MomentTriple) {
        for (l, slot) in slots.iter().enumerate() {
            atomic_add(slot, rhs[l]);
        }
    }
}

/// The manufactured-solution diagnostic reduction over (max, min, sum)
/// triples of the pointwise relative error.
pub struct MmsReduction;

impl MmsReduction {
    pub fn identity() -> MomentTriple {
        MomentTriple::from([f64::NEG_INFINITY, f64::INFINITY, 0.0])
    }

    pub fn apply(lhs: &mut MomentTriple, rhs: MomentTriple) {
        if rhs[0] > lhs[0] {
            lhs[0] = rhs[0];
        }
        if rhs[1] < lhs[1] {
            lhs[1] = rhs[1];
        }
        lhs[2] += rhs[2];
    }

    pub fn fold(slots: &[AtomicU64; 3], rhs: MomentTriple) {
        atomic_max(&slots[0], rhs[0]);
        atomic_min(&slots[1], rhs[1]);
        atomic_add(&slots[2], rhs[2]);
    }
}
