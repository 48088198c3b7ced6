use crate::state::{Phase, PhaseState};
use nalgebra::DVector;
use quantity::{Pressure, Temperature};
use serde::Serialize;
use std::fmt;

mod bubble_dew;
mod extraction;
mod lle_flash;
mod phase_diagram_binary;
mod sle;
mod sle_diagram;
mod stability_analysis;
mod ternary_diagram;
mod tp_flash;

pub use bubble_dew::TemperatureOrPressure;
pub use extraction::{Extraction, ExtractionTarget, kremser_recovery, kremser_stages};
pub use phase_diagram_binary::{PhaseDiagramBinary, TraceFailure, VlePoint, VleTrace};
pub use sle::{CrystallizationResult, SleEquation, SolubilityResult};
pub use sle_diagram::{
    BinarySleDiagram, EutecticPoint, LiquidusBranch, LiquidusPoint, SlePhaseLabel, TernarySleMap,
    TernarySlePoint,
};
pub use ternary_diagram::{TernaryLleDiagram, TieLine, project_ternary};

/// States of an iterative point solver.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SolverStatus {
    Initialized,
    Iterating,
    Converged,
    NonConverged,
    Diverged,
}

/// Convergence metadata of a point solver.
#[derive(Clone, Debug)]
pub struct Convergence {
    pub status: SolverStatus,
    pub iterations: usize,
    pub residual: f64,
    pub warnings: Vec<String>,
}

impl Default for Convergence {
    fn default() -> Self {
        Self::new()
    }
}

impl Convergence {
    pub fn new() -> Self {
        Self {
            status: SolverStatus::Initialized,
            iterations: 0,
            residual: f64::INFINITY,
            warnings: Vec::new(),
        }
    }

    /// Record one iteration. Non-finite residuals end the iteration as diverged.
    pub fn step(&mut self, residual: f64) {
        self.iterations += 1;
        self.residual = residual;
        self.status = if residual.is_finite() {
            SolverStatus::Iterating
        } else {
            SolverStatus::Diverged
        };
    }

    pub fn is_diverged(&self) -> bool {
        self.status == SolverStatus::Diverged
    }

    /// Close the iteration by comparing the last residual with the tolerance.
    pub fn finish(&mut self, tol: f64) {
        if self.status != SolverStatus::Diverged {
            self.status = if self.residual < tol {
                SolverStatus::Converged
            } else {
                SolverStatus::NonConverged
            };
        }
    }

    /// Mark a result as converged without iterating, e.g. a detected single phase.
    pub fn converged(residual: f64, iterations: usize) -> Self {
        Self {
            status: SolverStatus::Converged,
            iterations,
            residual,
            warnings: Vec::new(),
        }
    }

    pub fn is_converged(&self) -> bool {
        self.status == SolverStatus::Converged
    }

    pub fn warn<S: Into<String>>(&mut self, warning: S) {
        self.warnings.push(warning.into());
    }

    /// All warnings in a single message.
    pub fn warning(&self) -> Option<String> {
        (!self.warnings.is_empty()).then(|| self.warnings.join(" "))
    }
}

/// A thermodynamic equilibrium between `P` phases.
///
/// For two phases, the first phase is the vapor (VLE) or the phase
/// richer in the first component (LLE).
///
/// ## Contents
///
/// + [Bubble and dew point calculations](#bubble-and-dew-point-calculations)
/// + [Flash calculations](#flash-calculations)
/// + [Liquid-liquid equilibria](#liquid-liquid-equilibria)
#[derive(Clone, Debug)]
pub struct PhaseEquilibrium<const P: usize> {
    pub temperature: Temperature,
    pub pressure: Option<Pressure>,
    pub phases: [PhaseState; P],
    /// Whether the phases are genuinely distinct.
    pub two_phase: bool,
    pub convergence: Convergence,
}

impl<const P: usize> fmt::Display for PhaseEquilibrium<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "T = {:.5}", self.temperature)?;
        if let Some(p) = self.pressure {
            writeln!(f, "p = {p:.5}")?;
        }
        for (i, s) in self.phases.iter().enumerate() {
            writeln!(f, "phase {}: {s}", i + 1)?;
        }
        write!(
            f,
            "{:?} after {} iteration(s), residual {:.3e}",
            self.convergence.status, self.convergence.iterations, self.convergence.residual
        )
    }
}

impl<const P: usize> PhaseEquilibrium<P> {
    pub fn converged(&self) -> bool {
        self.convergence.is_converged()
    }
}

impl PhaseEquilibrium<2> {
    pub fn vapor(&self) -> &PhaseState {
        &self.phases[0]
    }

    pub fn liquid(&self) -> &PhaseState {
        &self.phases[1]
    }

    /// First liquid phase (LLE).
    pub fn phase_i(&self) -> &PhaseState {
        &self.phases[0]
    }

    /// Second liquid phase (LLE).
    pub fn phase_ii(&self) -> &PhaseState {
        &self.phases[1]
    }

    /// Amount of the second phase relative to the feed.
    pub fn beta(&self) -> f64 {
        self.phases[1].phase_fraction
    }

    /// Distribution ratios between the phases.
    ///
    /// For a vapor-liquid equilibrium `K_i = y_i / x_i`, otherwise
    /// `K_i = x_i^(2) / x_i^(1)` between the second and the first liquid.
    pub fn k_values(&self) -> DVector<f64> {
        let [first, second] = &self.phases;
        if first.phase == Phase::Vapor {
            first.molefracs.component_div(&second.molefracs)
        } else {
            second.molefracs.component_div(&first.molefracs)
        }
    }

    /// Deviation of the lever rule from the feed.
    pub fn material_balance_residual(&self, feed: &DVector<f64>) -> f64 {
        let beta = self.beta();
        let mix = self.phases[0].molefracs.scale(1.0 - beta) + self.phases[1].molefracs.scale(beta);
        (mix - feed).amax()
    }

    /// Whether both phases are liquids.
    pub fn is_liquid_liquid(&self) -> bool {
        self.phases.iter().all(|s| s.phase == Phase::Liquid)
    }
}

/// Normalize a composition to unit sum.
pub(crate) fn normalize(x: DVector<f64>) -> DVector<f64> {
    let sum = x.sum();
    x / sum
}

const TRIVIAL_REL_DEVIATION: f64 = 1e-5;

/// Whether two compositions describe the same phase.
pub(crate) fn is_trivial_solution(x1: &DVector<f64>, x2: &DVector<f64>) -> bool {
    x1.iter()
        .zip(x2.iter())
        .all(|(&a, &b)| (a - b).abs() <= TRIVIAL_REL_DEVIATION * a.abs().max(b.abs()).max(1e-10))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::dvector;
    use quantity::KELVIN;

    fn equilibrium(first: PhaseState, second: PhaseState) -> PhaseEquilibrium<2> {
        PhaseEquilibrium {
            temperature: 300.0 * KELVIN,
            pressure: None,
            phases: [first, second],
            two_phase: true,
            convergence: Convergence::converged(0.0, 0),
        }
    }

    #[test]
    fn k_values_orientation() {
        let ones = dvector![1.0, 1.0];
        let vle = equilibrium(
            PhaseState::vapor(dvector![0.8, 0.2], ones.clone()),
            PhaseState::liquid(dvector![0.4, 0.6], ones.clone()),
        );
        assert_relative_eq!(vle.k_values(), dvector![2.0, 1.0 / 3.0], epsilon = 1e-14);

        let lle = equilibrium(
            PhaseState::liquid(dvector![0.9, 0.1], ones.clone()),
            PhaseState::liquid(dvector![0.3, 0.7], ones),
        );
        assert_relative_eq!(lle.k_values(), dvector![1.0 / 3.0, 7.0], epsilon = 1e-12);
    }
}
