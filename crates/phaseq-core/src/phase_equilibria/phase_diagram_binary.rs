use super::{PhaseEquilibrium, TemperatureOrPressure};
use crate::activity::ActivityModel;
use crate::equilibrium_system::EquilibriumSystem;
use crate::errors::{PhaseqError, PhaseqResult};
use crate::SolverOptions;
use nalgebra::dvector;
use ndarray::Array1;
use std::fmt;

const DEFAULT_POINTS: usize = 51;

/// Converged point of a binary bubble or dew curve.
#[derive(Clone, Debug)]
pub struct VlePoint {
    /// Mole fraction of the first component in the specified phase.
    pub x1: f64,
    pub equilibrium: PhaseEquilibrium<2>,
}

/// Sample point of a sweep that did not yield a converged equilibrium.
#[derive(Clone, Debug, PartialEq)]
pub struct TraceFailure {
    pub index: usize,
    pub x1: f64,
    pub reason: String,
}

impl fmt::Display for TraceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "point {} (x1 = {:.4}): {}", self.index, self.x1, self.reason)
    }
}

/// Lazy sweep over the composition of a binary mixture.
///
/// Every item is the result of a single bubble or dew point calculation,
/// initialized with the last converged point. Failed points are yielded
/// as [TraceFailure] and do not end the sweep.
pub struct VleTrace<'a, A, TP: TemperatureOrPressure> {
    system: &'a EquilibriumSystem<A>,
    temperature_or_pressure: TP,
    compositions: Array1<f64>,
    bubble: bool,
    options: SolverOptions,
    index: usize,
    tp_old: Option<TP::Other>,
}

impl<A, TP: TemperatureOrPressure> Clone for VleTrace<'_, A, TP> {
    fn clone(&self) -> Self {
        Self {
            system: self.system,
            temperature_or_pressure: self.temperature_or_pressure,
            compositions: self.compositions.clone(),
            bubble: self.bubble,
            options: self.options,
            index: self.index,
            tp_old: self.tp_old,
        }
    }
}

impl<'a, A: ActivityModel, TP: TemperatureOrPressure> VleTrace<'a, A, TP> {
    fn new(
        system: &'a EquilibriumSystem<A>,
        temperature_or_pressure: TP,
        npoints: Option<usize>,
        bubble: bool,
        options: SolverOptions,
    ) -> PhaseqResult<Self> {
        if system.components() != 2 {
            return Err(PhaseqError::UnsupportedSystemSize {
                calculation: "binary VLE diagram".into(),
                expected: "2".into(),
                found: system.components(),
            });
        }
        let npoints = npoints.unwrap_or(DEFAULT_POINTS).max(2);
        Ok(Self {
            system,
            temperature_or_pressure,
            compositions: Array1::linspace(0.0, 1.0, npoints),
            bubble,
            options,
            index: 0,
            tp_old: None,
        })
    }

    /// Bubble points for liquid compositions between 0 and 1.
    pub fn bubble(
        system: &'a EquilibriumSystem<A>,
        temperature_or_pressure: TP,
        npoints: Option<usize>,
        options: SolverOptions,
    ) -> PhaseqResult<Self> {
        Self::new(system, temperature_or_pressure, npoints, true, options)
    }

    /// Dew points for vapor compositions between 0 and 1.
    pub fn dew(
        system: &'a EquilibriumSystem<A>,
        temperature_or_pressure: TP,
        npoints: Option<usize>,
        options: SolverOptions,
    ) -> PhaseqResult<Self> {
        Self::new(system, temperature_or_pressure, npoints, false, options)
    }

    /// Start the sweep again from the first point.
    pub fn restart(&self) -> Self {
        Self {
            index: 0,
            tp_old: None,
            ..self.clone()
        }
    }
}

impl<A: ActivityModel, TP: TemperatureOrPressure> Iterator for VleTrace<'_, A, TP> {
    type Item = Result<VlePoint, TraceFailure>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.index;
        let x1 = *self.compositions.get(index)?;
        self.index += 1;
        let molefracs = dvector![x1, 1.0 - x1];
        let vle = if self.bubble {
            PhaseEquilibrium::bubble_point(
                self.system,
                self.temperature_or_pressure,
                &molefracs,
                self.tp_old,
                self.options,
            )
        } else {
            PhaseEquilibrium::dew_point(
                self.system,
                self.temperature_or_pressure,
                &molefracs,
                self.tp_old,
                self.options,
            )
        };
        let failure = |reason: String| TraceFailure { index, x1, reason };
        Some(match vle {
            Ok(vle) if vle.converged() => {
                self.tp_old = TP::from_equilibrium(&vle);
                Ok(VlePoint {
                    x1,
                    equilibrium: vle,
                })
            }
            Ok(vle) => {
                self.tp_old = None;
                Err(failure(
                    vle.convergence
                        .warning()
                        .unwrap_or_else(|| "not converged".into()),
                ))
            }
            Err(e) => {
                self.tp_old = None;
                Err(failure(e.to_string()))
            }
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = self.compositions.len().saturating_sub(self.index);
        (rest, Some(rest))
    }
}

/// Isothermal (p-x-y) or isobaric (T-x-y) phase diagram of a binary mixture.
#[derive(Clone, Debug)]
pub struct PhaseDiagramBinary {
    pub bubble: Vec<VlePoint>,
    pub dew: Vec<VlePoint>,
    pub bubble_failures: Vec<TraceFailure>,
    pub dew_failures: Vec<TraceFailure>,
}

impl PhaseDiagramBinary {
    /// Trace bubble and dew curves at constant temperature or pressure.
    pub fn new<A: ActivityModel, TP: TemperatureOrPressure>(
        system: &EquilibriumSystem<A>,
        temperature_or_pressure: TP,
        npoints: Option<usize>,
        options: SolverOptions,
    ) -> PhaseqResult<Self> {
        let (bubble, bubble_failures) =
            collect(VleTrace::bubble(system, temperature_or_pressure, npoints, options)?);
        let (dew, dew_failures) =
            collect(VleTrace::dew(system, temperature_or_pressure, npoints, options)?);
        Ok(Self {
            bubble,
            dew,
            bubble_failures,
            dew_failures,
        })
    }

    /// Total number of points that did not converge.
    pub fn failures(&self) -> usize {
        self.bubble_failures.len() + self.dew_failures.len()
    }

    /// Liquid mole fractions of the first component along the bubble curve.
    pub fn bubble_x1(&self) -> Vec<f64> {
        self.bubble.iter().map(|p| p.x1).collect()
    }

    /// Vapor mole fractions of the first component along the bubble curve.
    pub fn bubble_y1(&self) -> Vec<f64> {
        self.bubble
            .iter()
            .map(|p| p.equilibrium.vapor().molefracs[0])
            .collect()
    }

    /// Vapor mole fractions of the first component along the dew curve.
    pub fn dew_y1(&self) -> Vec<f64> {
        self.dew.iter().map(|p| p.x1).collect()
    }
}

fn collect<I: Iterator<Item = Result<VlePoint, TraceFailure>>>(
    trace: I,
) -> (Vec<VlePoint>, Vec<TraceFailure>) {
    let mut points = Vec::new();
    let mut failures = Vec::new();
    for point in trace {
        match point {
            Ok(p) => points.push(p),
            Err(f) => failures.push(f),
        }
    }
    (points, failures)
}
