use nalgebra::DVector;
use serde::Serialize;
use std::fmt;

/// Aggregate state of a phase.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Liquid,
    Vapor,
    Solid,
}

/// Composition and non-ideality of a single phase.
#[derive(Clone, Debug)]
pub struct PhaseState {
    pub phase: Phase,
    /// mole fractions
    pub molefracs: DVector<f64>,
    /// activity coefficients of a liquid or fugacity corrections of a vapor
    pub coefficients: DVector<f64>,
    /// amount of the phase relative to the feed
    pub phase_fraction: f64,
}

impl PhaseState {
    pub fn new(
        phase: Phase,
        molefracs: DVector<f64>,
        coefficients: DVector<f64>,
        phase_fraction: f64,
    ) -> Self {
        Self {
            phase,
            molefracs,
            coefficients,
            phase_fraction,
        }
    }

    pub fn liquid(molefracs: DVector<f64>, activity_coefficients: DVector<f64>) -> Self {
        Self::new(Phase::Liquid, molefracs, activity_coefficients, 1.0)
    }

    pub fn vapor(molefracs: DVector<f64>, fugacity_corrections: DVector<f64>) -> Self {
        Self::new(Phase::Vapor, molefracs, fugacity_corrections, 1.0)
    }

    pub fn with_phase_fraction(mut self, phase_fraction: f64) -> Self {
        self.phase_fraction = phase_fraction;
        self
    }

    /// Activities `x_i γ_i`.
    pub fn activities(&self) -> DVector<f64> {
        self.molefracs.component_mul(&self.coefficients)
    }
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} phase: x = {}, coefficients = {}, fraction = {:.5}",
            self.phase,
            format_vector(&self.molefracs),
            format_vector(&self.coefficients),
            self.phase_fraction
        )
    }
}

/// Compact single-line representation used in iteration logs.
pub(crate) fn format_vector(v: &DVector<f64>) -> String {
    let entries: Vec<_> = v.iter().map(|x| format!("{x:.5}")).collect();
    format!("[{}]", entries.join(", "))
}
