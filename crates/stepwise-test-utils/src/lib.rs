//! Fixture ODEs and mock modules for Stepwise development.
//!
//! - [`odes`]: small systems with known solutions or known structure.
//! - [`fixtures`]: mock modules for pipeline and solver tests.
//! - [`seeded_bag`] / [`root_keys`]: the solver's per-step seed, for
//!   driving a module by hand.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;
pub mod odes;

use stepwise_core::{Key, KeySet, PropertyBag};

pub use fixtures::{ConstantModule, FailingModule, RecordingModule};
pub use odes::{
    Decay, ExplodingOde, FailingOde, Growth, HarmonicOscillator, ProtheroRobinson, VanDerPol,
};

/// Keys the solver seeds into every step's bag.
pub fn root_keys() -> KeySet {
    KeySet::from([
        Key::InitialTime,
        Key::FinalTime,
        Key::StepSize,
        Key::InitialValues,
    ])
}

/// A bag seeded the way the solver seeds it for a step `t0 → t0 + h`.
pub fn seeded_bag(t0: f64, h: f64, y0: &[f64]) -> PropertyBag {
    let mut bag = PropertyBag::new();
    bag.insert(Key::InitialTime, t0);
    bag.insert(Key::FinalTime, t0 + h);
    bag.insert(Key::StepSize, h);
    bag.insert(Key::InitialValues, y0);
    bag
}

/// Approximate equality with an absolute tolerance.
pub fn assert_close(got: f64, want: f64, tol: f64) {
    assert!(
        (got - want).abs() <= tol,
        "got {got}, want {want} (tolerance {tol})"
    );
}
