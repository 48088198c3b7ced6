use super::{Convergence, PhaseEquilibrium, normalize};
use crate::activity::ActivityModel;
use crate::equilibrium_system::{EquilibriumSystem, Saturation};
use crate::errors::{PhaseqError, PhaseqResult};
use crate::state::{PhaseState, format_vector};
use crate::{SolverOptions, Verbosity};
use nalgebra::DVector;
use num_dual::{Dual64, DualNum, first_derivative};
use quantity::{KELVIN, PASCAL, Pressure, Quantity, SIUnit, Temperature};
use typenum::{N1, N2, P1, Z0};

const MAX_ITER_BUBBLE_DEW: usize = 100;
const TOL_BUBBLE_DEW: f64 = 1e-8;

const MAX_TSTEP: f64 = 20.0;
const TEMPERATURE_BRACKET: f64 = 100.0;

/// Trait that enables functions to be generic over their input unit.
pub trait TemperatureOrPressure: Copy {
    type Other: Copy;

    const IDENTIFIER: &'static str;

    fn temperature_pressure(
        &self,
        tp_init: Option<Self::Other>,
    ) -> (Option<Temperature>, Option<Pressure>, bool);

    /// The variable that is solved for, taken from an equilibrium.
    fn from_equilibrium(vle: &PhaseEquilibrium<2>) -> Option<Self::Other>;
}

impl TemperatureOrPressure for Temperature {
    type Other = Pressure;
    const IDENTIFIER: &'static str = "temperature";

    fn temperature_pressure(
        &self,
        tp_init: Option<Self::Other>,
    ) -> (Option<Temperature>, Option<Pressure>, bool) {
        (Some(*self), tp_init, true)
    }

    fn from_equilibrium(vle: &PhaseEquilibrium<2>) -> Option<Self::Other> {
        vle.pressure
    }
}

// For some inexplicable reason this does not compile if the `Pressure` type is
// used instead of the explicit unit. Maybe the type is too complicated for the
// compiler?
impl TemperatureOrPressure for Quantity<f64, SIUnit<N2, N1, P1, Z0, Z0, Z0, Z0>> {
    type Other = Temperature;
    const IDENTIFIER: &'static str = "pressure";

    fn temperature_pressure(
        &self,
        tp_init: Option<Self::Other>,
    ) -> (Option<Temperature>, Option<Pressure>, bool) {
        (tp_init, Some(*self), false)
    }

    fn from_equilibrium(vle: &PhaseEquilibrium<2>) -> Option<Self::Other> {
        Some(vle.temperature)
    }
}

/// # Bubble and dew point calculations
impl PhaseEquilibrium<2> {
    /// Calculate a phase equilibrium for a given temperature
    /// or pressure and composition of the liquid phase.
    ///
    /// The vapor phase of the result is the incipient bubble with
    /// phase fraction zero.
    pub fn bubble_point<A: ActivityModel, TP: TemperatureOrPressure>(
        system: &EquilibriumSystem<A>,
        temperature_or_pressure: TP,
        liquid_molefracs: &DVector<f64>,
        tp_init: Option<TP::Other>,
        options: SolverOptions,
    ) -> PhaseqResult<Self> {
        system.validate_molefracs(liquid_molefracs)?;
        let x = normalize(liquid_molefracs.clone());
        let saturation = system.saturation()?;
        match temperature_or_pressure.temperature_pressure(tp_init) {
            (Some(t), _, true) => {
                bubble_pressure(system, &saturation, t.convert_into(KELVIN), &x, options)
            }
            (t_init, Some(p), false) => bubble_temperature(
                system,
                &saturation,
                p.convert_into(PASCAL),
                &x,
                t_init.map(|t| t.convert_into(KELVIN)),
                options,
            ),
            _ => Err(PhaseqError::Error(format!(
                "bubble point requires a {}",
                TP::IDENTIFIER
            ))),
        }
    }

    /// Calculate a phase equilibrium for a given temperature
    /// or pressure and composition of the vapor phase.
    ///
    /// The liquid phase of the result is the incipient droplet with
    /// phase fraction zero.
    pub fn dew_point<A: ActivityModel, TP: TemperatureOrPressure>(
        system: &EquilibriumSystem<A>,
        temperature_or_pressure: TP,
        vapor_molefracs: &DVector<f64>,
        tp_init: Option<TP::Other>,
        options: SolverOptions,
    ) -> PhaseqResult<Self> {
        system.validate_molefracs(vapor_molefracs)?;
        let y = normalize(vapor_molefracs.clone());
        let saturation = system.saturation()?;
        match temperature_or_pressure.temperature_pressure(tp_init) {
            (Some(t), _, true) => {
                dew_pressure(system, &saturation, t.convert_into(KELVIN), &y, options)
            }
            (t_init, Some(p), false) => dew_temperature(
                system,
                &saturation,
                p.convert_into(PASCAL),
                &y,
                t_init.map(|t| t.convert_into(KELVIN)),
                options,
            ),
            _ => Err(PhaseqError::Error(format!(
                "dew point requires a {}",
                TP::IDENTIFIER
            ))),
        }
    }
}

fn coexistence(
    temperature: f64,
    pressure: f64,
    vapor: PhaseState,
    liquid: PhaseState,
    convergence: Convergence,
) -> PhaseEquilibrium<2> {
    PhaseEquilibrium {
        temperature: temperature * KELVIN,
        pressure: Some(pressure * PASCAL),
        phases: [vapor, liquid],
        two_phase: true,
        convergence,
    }
}

fn finish(convergence: &mut Convergence, tol: f64, verbosity: Verbosity, name: &str) {
    convergence.finish(tol);
    if !convergence.is_converged() {
        convergence.warn(format!("{name} did not converge."));
    }
    log_result!(
        verbosity,
        "{}: {:?} in {} step(s), residual {:.3e}\n",
        name,
        convergence.status,
        convergence.iterations,
        convergence.residual
    );
}

fn bubble_pressure<A: ActivityModel>(
    system: &EquilibriumSystem<A>,
    saturation: &Saturation,
    temperature: f64,
    x: &DVector<f64>,
    options: SolverOptions,
) -> PhaseqResult<PhaseEquilibrium<2>> {
    let (max_iter, tol, verbosity) = options.unwrap_or(MAX_ITER_BUBBLE_DEW, TOL_BUBBLE_DEW);
    let psat = saturation.vapor_pressures(temperature);
    let gamma = system.activity_coefficients(temperature, x);
    let partial_ideal = x.component_mul(&gamma).component_mul(&psat);
    let mut pressure = partial_ideal.sum();
    let mut y = &partial_ideal / pressure;
    let mut ln_phi = DVector::zeros(x.len());
    let mut convergence = Convergence::new();

    log_iter!(verbosity, " iter |    residual    |    pressure    |  vapor mole fractions");
    log_iter!(verbosity, "{:-<70}", "");
    for _ in 0..max_iter {
        ln_phi = saturation.ln_correction(temperature, pressure, &y, &psat);
        let partial = partial_ideal.component_div(&ln_phi.map(f64::exp));
        let p_new = partial.sum();
        let res = ((p_new - pressure) / p_new).abs();
        pressure = p_new;
        y = partial / p_new;
        convergence.step(res);
        log_iter!(
            verbosity,
            " {:4} | {:14.8e} | {:14.4} | {}",
            convergence.iterations,
            res,
            pressure,
            format_vector(&y)
        );
        if res < tol || convergence.is_diverged() {
            break;
        }
    }
    finish(&mut convergence, tol, verbosity, "Bubble pressure");

    Ok(coexistence(
        temperature,
        pressure,
        PhaseState::vapor(y, ln_phi.map(f64::exp)).with_phase_fraction(0.0),
        PhaseState::liquid(x.clone(), gamma),
        convergence,
    ))
}

fn bubble_temperature<A: ActivityModel>(
    system: &EquilibriumSystem<A>,
    saturation: &Saturation,
    pressure: f64,
    x: &DVector<f64>,
    t_init: Option<f64>,
    options: SolverOptions,
) -> PhaseqResult<PhaseEquilibrium<2>> {
    let (max_iter, tol, verbosity) = options.unwrap_or(MAX_ITER_BUBBLE_DEW, TOL_BUBBLE_DEW);
    let n = x.len();
    let tsat = saturation.saturation_temperatures(pressure);
    let mut t_min = (tsat.min() - TEMPERATURE_BRACKET).max(1.0);
    let mut t_max = tsat.max() + TEMPERATURE_BRACKET;
    let mut temperature = t_init
        .unwrap_or_else(|| x.dot(&tsat))
        .clamp(t_min + 1.0, t_max - 1.0);
    let x_dual = x.map(Dual64::from);
    let mut convergence = Convergence::new();
    let mut state = None;

    log_iter!(verbosity, " iter |    residual    |  temperature  |  vapor mole fractions");
    log_iter!(verbosity, "{:-<70}", "");
    for _ in 0..max_iter {
        let psat = saturation.vapor_pressures(temperature);
        let gamma = system.activity_coefficients(temperature, x);
        let y_ideal = normalize(x.component_mul(&gamma).component_mul(&psat));
        let ln_phi = saturation.ln_correction(temperature, pressure, &y_ideal, &psat);
        let y = normalize(y_ideal.component_div(&ln_phi.map(f64::exp)));

        // ln Σ x_i γ_i p_sat,i / (Φ_i p) is increasing in T
        let (f, df) = first_derivative(
            |t: Dual64| {
                let ln_gamma = system.model.ln_gamma(t, &x_dual);
                let ln_psat = saturation.ln_vapor_pressures(t);
                let sum = (0..n).filter(|&i| x[i] > 0.0).fold(Dual64::from(0.0), |acc, i| {
                    acc + (ln_gamma[i] + ln_psat[i] - ln_phi[i]).exp() * x[i]
                });
                sum.ln() - pressure.ln()
            },
            temperature,
        );
        convergence.step(f.abs());
        log_iter!(
            verbosity,
            " {:4} | {:14.8e} | {:13.5} | {}",
            convergence.iterations,
            f.abs(),
            temperature,
            format_vector(&y)
        );
        state = Some((temperature, y, ln_phi, gamma));
        if f.abs() < tol || convergence.is_diverged() {
            break;
        }

        if f > 0.0 {
            t_max = temperature;
        } else {
            t_min = temperature;
        }
        temperature = newton_step(temperature, f, df, t_min, t_max);
    }
    finish(&mut convergence, tol, verbosity, "Bubble temperature");

    let (temperature, y, ln_phi, gamma) = state.ok_or_else(|| {
        PhaseqError::InvalidState("bubble temperature".into(), "max_iter".into(), 0.0)
    })?;
    Ok(coexistence(
        temperature,
        pressure,
        PhaseState::vapor(y, ln_phi.map(f64::exp)).with_phase_fraction(0.0),
        PhaseState::liquid(x.clone(), gamma),
        convergence,
    ))
}

fn dew_pressure<A: ActivityModel>(
    system: &EquilibriumSystem<A>,
    saturation: &Saturation,
    temperature: f64,
    y: &DVector<f64>,
    options: SolverOptions,
) -> PhaseqResult<PhaseEquilibrium<2>> {
    let (max_iter, tol, verbosity) = options.unwrap_or(MAX_ITER_BUBBLE_DEW, TOL_BUBBLE_DEW);
    let psat = saturation.vapor_pressures(temperature);
    let mut pressure = y.component_div(&psat).sum().recip();
    let mut x = y.component_div(&psat) * pressure;
    let mut gamma = DVector::from_element(y.len(), 1.0);
    let mut ln_phi = DVector::zeros(y.len());
    let mut convergence = Convergence::new();

    log_iter!(verbosity, " iter |    residual    |    pressure    |  liquid mole fractions");
    log_iter!(verbosity, "{:-<70}", "");
    for _ in 0..max_iter {
        gamma = system.activity_coefficients(temperature, &x);
        ln_phi = saturation.ln_correction(temperature, pressure, y, &psat);
        let denominator = y
            .component_mul(&ln_phi.map(f64::exp))
            .component_div(&gamma.component_mul(&psat));
        let p_new = denominator.sum().recip();
        let x_new = denominator * p_new;
        let res = ((p_new - pressure) / p_new).abs() + (&x_new - &x).amax();
        pressure = p_new;
        x = x_new;
        convergence.step(res);
        log_iter!(
            verbosity,
            " {:4} | {:14.8e} | {:14.4} | {}",
            convergence.iterations,
            res,
            pressure,
            format_vector(&x)
        );
        if res < tol || convergence.is_diverged() {
            break;
        }
    }
    finish(&mut convergence, tol, verbosity, "Dew pressure");

    Ok(coexistence(
        temperature,
        pressure,
        PhaseState::vapor(y.clone(), ln_phi.map(f64::exp)),
        PhaseState::liquid(x, gamma).with_phase_fraction(0.0),
        convergence,
    ))
}

fn dew_temperature<A: ActivityModel>(
    system: &EquilibriumSystem<A>,
    saturation: &Saturation,
    pressure: f64,
    y: &DVector<f64>,
    t_init: Option<f64>,
    options: SolverOptions,
) -> PhaseqResult<PhaseEquilibrium<2>> {
    let (max_iter, tol, verbosity) = options.unwrap_or(MAX_ITER_BUBBLE_DEW, TOL_BUBBLE_DEW);
    let n = y.len();
    let tsat = saturation.saturation_temperatures(pressure);
    let mut t_min = (tsat.min() - TEMPERATURE_BRACKET).max(1.0);
    let mut t_max = tsat.max() + TEMPERATURE_BRACKET;
    let mut temperature = t_init
        .unwrap_or_else(|| y.dot(&tsat))
        .clamp(t_min + 1.0, t_max - 1.0);
    let mut x = y.clone();
    let mut convergence = Convergence::new();
    let mut state = None;

    log_iter!(verbosity, " iter |    residual    |  temperature  |  liquid mole fractions");
    log_iter!(verbosity, "{:-<70}", "");
    for _ in 0..max_iter {
        let psat = saturation.vapor_pressures(temperature);
        let gamma = system.activity_coefficients(temperature, &x);
        let ln_phi = saturation.ln_correction(temperature, pressure, y, &psat);
        let x_new = normalize(
            y.component_mul(&ln_phi.map(f64::exp))
                .component_div(&gamma.component_mul(&psat)),
        );
        let dx = (&x_new - &x).amax();
        x = x_new;

        // ln Σ y_i Φ_i p / (γ_i p_sat,i) is decreasing in T
        let x_dual = x.map(Dual64::from);
        let (f, df) = first_derivative(
            |t: Dual64| {
                let ln_gamma = system.model.ln_gamma(t, &x_dual);
                let ln_psat = saturation.ln_vapor_pressures(t);
                let sum = (0..n).filter(|&i| y[i] > 0.0).fold(Dual64::from(0.0), |acc, i| {
                    acc + (-ln_gamma[i] - ln_psat[i] + ln_phi[i]).exp() * y[i]
                });
                sum.ln() + pressure.ln()
            },
            temperature,
        );
        let res = f.abs() + dx;
        convergence.step(res);
        log_iter!(
            verbosity,
            " {:4} | {:14.8e} | {:13.5} | {}",
            convergence.iterations,
            res,
            temperature,
            format_vector(&x)
        );
        state = Some((temperature, x.clone(), ln_phi, gamma));
        if res < tol || convergence.is_diverged() {
            break;
        }

        if f > 0.0 {
            t_min = temperature;
        } else {
            t_max = temperature;
        }
        temperature = newton_step(temperature, f, df, t_min, t_max);
    }
    finish(&mut convergence, tol, verbosity, "Dew temperature");

    let (temperature, x, ln_phi, gamma) = state.ok_or_else(|| {
        PhaseqError::InvalidState("dew temperature".into(), "max_iter".into(), 0.0)
    })?;
    Ok(coexistence(
        temperature,
        pressure,
        PhaseState::vapor(y.clone(), ln_phi.map(f64::exp)),
        PhaseState::liquid(x, gamma).with_phase_fraction(0.0),
        convergence,
    ))
}

/// Newton step with limited step size that falls back to bisection
/// whenever the step leaves the bracket.
pub(super) fn newton_step(x: f64, f: f64, df: f64, x_min: f64, x_max: f64) -> f64 {
    let step = (-f / df).clamp(-MAX_TSTEP, MAX_TSTEP);
    let x_new = x + step;
    if !x_new.is_finite() || x_new <= x_min || x_new >= x_max {
        0.5 * (x_min + x_max)
    } else {
        x_new
    }
}
