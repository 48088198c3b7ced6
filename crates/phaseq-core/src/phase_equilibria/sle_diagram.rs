use super::sle::SleEquation;
use super::{Convergence, TraceFailure};
use crate::activity::ActivityModel;
use crate::equilibrium_system::EquilibriumSystem;
use crate::errors::{PhaseqError, PhaseqResult};
use crate::parameter::FusionRecord;
use crate::{SolverOptions, Verbosity};
use arrayvec::ArrayVec;
use nalgebra::{DVector, dvector};
use ndarray::Array1;
use num_dual::{Dual64, DualNum, first_derivative};
use quantity::{KELVIN, Temperature};
#[cfg(feature = "rayon")]
use rayon::{ThreadPool, prelude::*};
use serde::Serialize;

const DEFAULT_POINTS: usize = 41;
const DEFAULT_GRID: usize = 20;
const MAX_ITER_EUTECTIC: usize = 60;
const TOL_EUTECTIC: f64 = 1e-6;
const X_EDGE: f64 = 1e-6;
/// Smallest slope of the liquid activity of a stable liquid.
const MIN_STABILITY: f64 = 1e-8;

/// A point on a liquidus line.
#[derive(Clone, Debug)]
pub struct LiquidusPoint {
    pub x1: f64,
    pub temperature: Temperature,
}

/// Liquidus line of a single solid component.
#[derive(Clone, Debug)]
pub struct LiquidusBranch {
    /// Index of the crystallizing component.
    pub solid: usize,
    pub points: Vec<LiquidusPoint>,
}

impl LiquidusBranch {
    pub fn x1(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.x1).collect()
    }

    pub fn temperatures(&self) -> Vec<f64> {
        self.points
            .iter()
            .map(|p| p.temperature.convert_into(KELVIN))
            .collect()
    }
}

/// Intersection of both liquidus lines.
#[derive(Clone, Debug)]
pub struct EutecticPoint {
    pub x1: f64,
    pub temperature: Temperature,
    pub converged: bool,
}

/// Solid-liquid T-x diagram of a binary mixture with a simple eutectic.
#[derive(Clone, Debug)]
pub struct BinarySleDiagram {
    pub equation: SleEquation,
    pub eutectic: EutecticPoint,
    /// Liquidus of the second component, between pure component 2 and the eutectic.
    pub left: LiquidusBranch,
    /// Liquidus of the first component, between the eutectic and pure component 1.
    pub right: LiquidusBranch,
    /// Range of `x1` where the liquid at the liquidus is unstable
    /// and splits into two liquids.
    pub unstable_region: Option<(f64, f64)>,
    pub failures: Vec<TraceFailure>,
}

impl BinarySleDiagram {
    /// Calculate the liquidus lines of both components and their eutectic point.
    pub fn new<A: ActivityModel>(
        system: &EquilibriumSystem<A>,
        npoints: Option<usize>,
        equation: SleEquation,
        options: SolverOptions,
    ) -> PhaseqResult<Self> {
        if system.components() != 2 {
            return Err(PhaseqError::UnsupportedSystemSize {
                calculation: "binary SLE diagram".into(),
                expected: "2".into(),
                found: system.components(),
            });
        }
        let npoints = npoints.unwrap_or(DEFAULT_POINTS).max(2);
        let fusion = [system.fusion(0)?, system.fusion(1)?];
        let silent = SolverOptions {
            verbosity: Verbosity::None,
            ..options
        };
        let eutectic = eutectic_point(system, &fusion, equation, silent);
        log_result!(
            options.verbosity,
            "Eutectic point: x1 = {:.6}, T = {:.3} K, converged: {}\n",
            eutectic.x1,
            eutectic.temperature.convert_into(KELVIN),
            eutectic.converged
        );

        let mut failures = Vec::new();
        let mut unstable = Vec::new();
        let t_e = eutectic.temperature.convert_into(KELVIN);
        let mut branch = |solid: usize| {
            let points = liquidus_branch(
                system,
                solid,
                &fusion[solid],
                t_e,
                npoints,
                equation,
                silent,
                &mut failures,
                &mut unstable,
            );
            LiquidusBranch { solid, points }
        };
        let left = branch(1);
        let right = branch(0);

        // liquids on the liquidus between the branch points
        for x1 in Array1::linspace(X_EDGE, 1.0 - X_EDGE, 2 * npoints) {
            let solid = if x1 >= eutectic.x1 { 0 } else { 1 };
            let (t, _) = liquidus(system, solid, &fusion[solid], x1, equation, silent);
            if t > 0.0 && !is_stable_liquid(system, t, x1) {
                unstable.push(x1);
            }
        }

        let unstable_region = unstable
            .iter()
            .copied()
            .fold(None, |acc: Option<(f64, f64)>, x| match acc {
                None => Some((x, x)),
                Some((a, b)) => Some((a.min(x), b.max(x))),
            });
        if let Some((a, b)) = unstable_region {
            log_result!(
                options.verbosity,
                "Liquid-liquid immiscibility between x1 = {:.4} and x1 = {:.4}\n",
                a,
                b
            );
        }
        Ok(Self {
            equation,
            eutectic,
            left,
            right,
            unstable_region,
            failures,
        })
    }

    pub fn has_liquid_liquid_gap(&self) -> bool {
        self.unstable_region.is_some()
    }
}

/// Liquidus temperature of component `i` at `x1`, 0 if it does not crystallize.
fn liquidus<A: ActivityModel>(
    system: &EquilibriumSystem<A>,
    i: usize,
    fusion: &FusionRecord,
    x1: f64,
    equation: SleEquation,
    options: SolverOptions,
) -> (f64, Convergence) {
    let (max_iter, tol, verbosity) = options.unwrap_or(100, 1e-10);
    let (t, convergence) = system.liquidus_temperature(
        i,
        fusion,
        &dvector![x1, 1.0 - x1],
        equation,
        max_iter,
        tol,
        verbosity,
    );
    (t.unwrap_or(0.0), convergence)
}

fn eutectic_point<A: ActivityModel>(
    system: &EquilibriumSystem<A>,
    fusion: &[FusionRecord; 2],
    equation: SleEquation,
    options: SolverOptions,
) -> EutecticPoint {
    // T0 rises and T1 falls with x1
    let difference = |x1: f64| {
        let (t0, _) = liquidus(system, 0, &fusion[0], x1, equation, options);
        let (t1, _) = liquidus(system, 1, &fusion[1], x1, equation, options);
        (t0 - t1, t0.max(t1))
    };
    let (mut x_min, mut x_max) = (X_EDGE, 1.0 - X_EDGE);
    let mut x1 = 0.5;
    let (mut diff, mut t) = difference(x1);
    for _ in 0..MAX_ITER_EUTECTIC {
        if diff.abs() < TOL_EUTECTIC {
            break;
        }
        if diff > 0.0 {
            x_max = x1;
        } else {
            x_min = x1;
        }
        x1 = 0.5 * (x_min + x_max);
        (diff, t) = difference(x1);
    }
    EutecticPoint {
        x1,
        temperature: t * KELVIN,
        converged: diff.abs() < TOL_EUTECTIC,
    }
}

/// Solubility of `solid` for temperatures between the eutectic and its melting point.
#[expect(clippy::too_many_arguments)]
fn liquidus_branch<A: ActivityModel>(
    system: &EquilibriumSystem<A>,
    solid: usize,
    fusion: &FusionRecord,
    eutectic_temperature: f64,
    npoints: usize,
    equation: SleEquation,
    options: SolverOptions,
    failures: &mut Vec<TraceFailure>,
    unstable: &mut Vec<f64>,
) -> Vec<LiquidusPoint> {
    let (max_iter, tol, verbosity) = options.unwrap_or(100, 1e-10);
    let tm = fusion.melting_temperature;
    let temperatures = Array1::linspace(eutectic_temperature.min(tm), tm, npoints);
    let mut points = Vec::with_capacity(npoints);
    for (index, &t) in temperatures.iter().enumerate() {
        let x_solid = if index == npoints - 1 {
            1.0
        } else {
            let ln_ideal = fusion.ln_ideal_solubility(t, equation);
            let (ln_x, convergence) =
                system.solve_solubility(t, solid, ln_ideal, max_iter, tol, verbosity);
            let x1 = if solid == 0 { ln_x.exp() } else { 1.0 - ln_x.exp() };
            if !convergence.is_converged() {
                failures.push(TraceFailure {
                    index,
                    x1,
                    reason: convergence
                        .warning()
                        .unwrap_or_else(|| "not converged".into()),
                });
                continue;
            }
            ln_x.exp()
        };
        let x1 = if solid == 0 { x_solid } else { 1.0 - x_solid };
        if !is_stable_liquid(system, t, x1) {
            unstable.push(x1);
            continue;
        }
        points.push(LiquidusPoint {
            x1,
            temperature: t * KELVIN,
        });
    }
    // order by composition
    if solid == 1 {
        points.reverse();
    }
    points
}

/// A binary liquid is stable if the activity of the first component
/// increases with its mole fraction.
fn is_stable_liquid<A: ActivityModel>(
    system: &EquilibriumSystem<A>,
    temperature: f64,
    x1: f64,
) -> bool {
    if x1 <= X_EDGE || x1 >= 1.0 - X_EDGE {
        return true;
    }
    let t = Dual64::from(temperature);
    let (_, slope) = first_derivative(
        |x1: Dual64| {
            let x = DVector::from_vec(vec![x1, -x1 + 1.0]);
            x1.ln() + system.model.ln_gamma(t, &x)[0]
        },
        x1,
    );
    slope > MIN_STABILITY
}

/// Classification of a liquid by the number of saturated solids.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlePhaseLabel {
    Liquid,
    SolidLiquid,
    Eutectic,
}

/// Grid point of a ternary solid-liquid map.
#[derive(Clone, Debug)]
pub struct TernarySlePoint {
    pub molefracs: DVector<f64>,
    /// Components that are supersaturated in the liquid.
    pub solids: ArrayVec<usize, 3>,
    pub label: SlePhaseLabel,
}

/// Solid-liquid phase map of a ternary system at constant temperature.
#[derive(Clone, Debug)]
pub struct TernarySleMap {
    pub temperature: Temperature,
    pub equation: SleEquation,
    pub points: Vec<TernarySlePoint>,
}

impl TernarySleMap {
    fn grid(grid: Option<usize>) -> Vec<DVector<f64>> {
        let n = grid.unwrap_or(DEFAULT_GRID).max(1);
        let mut points = Vec::with_capacity((n + 1) * (n + 2) / 2);
        for i in 0..=n {
            for j in 0..=n - i {
                let (x1, x2) = (i as f64 / n as f64, j as f64 / n as f64);
                points.push(dvector![x1, x2, (1.0 - x1 - x2).max(0.0)]);
            }
        }
        points
    }

    fn check<A: ActivityModel>(system: &EquilibriumSystem<A>) -> PhaseqResult<[FusionRecord; 3]> {
        if system.components() != 3 {
            return Err(PhaseqError::UnsupportedSystemSize {
                calculation: "ternary SLE map".into(),
                expected: "3".into(),
                found: system.components(),
            });
        }
        Ok([system.fusion(0)?, system.fusion(1)?, system.fusion(2)?])
    }

    fn classify<A: ActivityModel>(
        system: &EquilibriumSystem<A>,
        fusion: &[FusionRecord; 3],
        temperature: f64,
        equation: SleEquation,
        molefracs: DVector<f64>,
    ) -> TernarySlePoint {
        let ln_gamma = system.model.ln_gamma(temperature, &molefracs);
        let solids: ArrayVec<usize, 3> = (0..3)
            .filter(|&i| {
                molefracs[i] > 0.0
                    && temperature < fusion[i].melting_temperature
                    && molefracs[i].ln() + ln_gamma[i]
                        >= fusion[i].ln_ideal_solubility(temperature, equation)
            })
            .collect();
        let label = match solids.len() {
            0 => SlePhaseLabel::Liquid,
            1 => SlePhaseLabel::SolidLiquid,
            _ => SlePhaseLabel::Eutectic,
        };
        TernarySlePoint {
            molefracs,
            solids,
            label,
        }
    }

    /// Classify the points of a triangular grid with `grid` intervals per side.
    pub fn new<A: ActivityModel>(
        system: &EquilibriumSystem<A>,
        temperature: Temperature,
        grid: Option<usize>,
        equation: SleEquation,
    ) -> PhaseqResult<Self> {
        let fusion = Self::check(system)?;
        let t = temperature.convert_into(KELVIN);
        let points = Self::grid(grid)
            .into_iter()
            .map(|x| Self::classify(system, &fusion, t, equation, x))
            .collect();
        Ok(Self {
            temperature,
            equation,
            points,
        })
    }

    /// Number of grid points with the label `label`.
    pub fn count(&self, label: SlePhaseLabel) -> usize {
        self.points.iter().filter(|p| p.label == label).count()
    }
}

#[cfg(feature = "rayon")]
impl TernarySleMap {
    /// Classify the grid points in parallel on the thread pool `thread_pool`.
    pub fn par_new<A: ActivityModel + Sync>(
        system: &EquilibriumSystem<A>,
        temperature: Temperature,
        grid: Option<usize>,
        equation: SleEquation,
        thread_pool: ThreadPool,
    ) -> PhaseqResult<Self> {
        let fusion = Self::check(system)?;
        let t = temperature.convert_into(KELVIN);
        let points = thread_pool.install(|| {
            Self::grid(grid)
                .into_par_iter()
                .map(|x| Self::classify(system, &fusion, t, equation, x))
                .collect()
        });
        Ok(Self {
            temperature,
            equation,
            points,
        })
    }
}
