use super::bubble_dew::newton_step;
use super::Convergence;
use crate::activity::ActivityModel;
use crate::equilibrium_system::EquilibriumSystem;
use crate::errors::{PhaseqError, PhaseqResult};
use crate::parameter::FusionRecord;
use crate::{RGAS, SolverOptions, Verbosity};
use nalgebra::DVector;
use num_dual::{Dual64, DualNum, first_derivative};
use quantity::{KELVIN, Temperature};
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_ITER_SLE: usize = 100;
const TOL_SLE: f64 = 1e-10;

/// Bound of the logarithmic fugacity ratio of solid and liquid.
const LN_RATIO_BOUND: f64 = 50.0;
const LN_X_MIN: f64 = -200.0;
const T_MIN_FACTOR: f64 = 0.2;

/// Form of the solid-liquid equilibrium condition.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SleEquation {
    /// Enthalpy of fusion only.
    #[default]
    Simplified,
    /// Enthalpy of fusion and heat capacity difference at the triple point.
    Complete,
}

impl fmt::Display for SleEquation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simplified => write!(f, "simplified"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

impl FusionRecord {
    /// Logarithm of the ideal solubility `ln(x_i γ_i)` of the pure solid.
    ///
    /// Above the melting temperature the ideal solubility is 1.
    pub fn ln_ideal_solubility<D: DualNum<f64> + Copy>(
        &self,
        temperature: D,
        equation: SleEquation,
    ) -> D {
        let tm = self.melting_temperature;
        if temperature.re() >= tm {
            return D::zero();
        }
        let h = self.enthalpy_of_fusion / RGAS;
        let ln_ratio = match equation {
            SleEquation::Simplified => (temperature.recip() - tm.recip()) * (-h),
            SleEquation::Complete => {
                let tt = self.triple_temperature.filter(|&t| t > 0.0).unwrap_or(tm);
                let cp = self.delta_cp / RGAS;
                let t_ratio = temperature.recip() * tt;
                (temperature.recip() - tt.recip()) * (-h) - (t_ratio - 1.0) * cp
                    + t_ratio.ln() * cp
            }
        };
        if ln_ratio.re() < -LN_RATIO_BOUND {
            D::from(-LN_RATIO_BOUND)
        } else if ln_ratio.re() > LN_RATIO_BOUND {
            D::from(LN_RATIO_BOUND)
        } else {
            ln_ratio
        }
    }

    pub fn ideal_solubility(&self, temperature: f64, equation: SleEquation) -> f64 {
        self.ln_ideal_solubility(temperature, equation).exp()
    }
}

/// Composition of a liquid saturated with a single solid.
#[derive(Clone, Debug)]
pub struct SolubilityResult {
    pub temperature: Temperature,
    pub equation: SleEquation,
    /// Index of the dissolving solid, `None` if all components are liquid.
    pub solute: Option<usize>,
    pub molefracs: DVector<f64>,
    pub activity_coefficients: DVector<f64>,
    /// Ideal solubility of every component.
    pub ideal_solubility: DVector<f64>,
    /// Whether the pure component is solid at the temperature.
    pub solid: Vec<bool>,
    pub convergence: Convergence,
}

impl SolubilityResult {
    /// Mole fraction of the solute in the saturated liquid.
    pub fn solubility(&self) -> Option<f64> {
        self.solute.map(|i| self.molefracs[i])
    }
}

impl fmt::Display for SolubilityResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T = {:.5}, {} equation", self.temperature, self.equation)?;
        if let Some(i) = self.solute {
            write!(f, ", x_{} = {:.6e}", i + 1, self.molefracs[i])?;
        }
        write!(f, ", {:?}", self.convergence.status)
    }
}

/// Temperature at which a liquid of given composition starts to crystallize.
#[derive(Clone, Debug)]
pub struct CrystallizationResult {
    pub equation: SleEquation,
    pub molefracs: DVector<f64>,
    /// Liquidus temperature of every component, `None` if the component
    /// can not crystallize from the liquid.
    pub liquidus_temperatures: Vec<Option<Temperature>>,
    /// Highest liquidus temperature.
    pub temperature: Option<Temperature>,
    pub crystallizing_component: Option<usize>,
    pub activity_coefficients: Option<DVector<f64>>,
    pub convergence: Convergence,
}

/// # Solid-liquid equilibria
impl<A: ActivityModel> EquilibriumSystem<A> {
    /// Solubility of a solid at temperature `temperature`.
    ///
    /// If no solute is given, the solid component with the highest
    /// melting temperature is used. The remaining components share the
    /// rest of the liquid equally. Components without fusion data are
    /// treated as liquids that do not crystallize.
    pub fn solubility(
        &self,
        temperature: Temperature,
        solute: Option<usize>,
        equation: SleEquation,
        options: SolverOptions,
    ) -> PhaseqResult<SolubilityResult> {
        let n = self.components();
        let t = temperature.convert_into(KELVIN);
        if let Some(i) = solute
            && i >= n
        {
            return Err(PhaseqError::InvalidState(
                "solubility".into(),
                "solute".into(),
                i as f64,
            ));
        }
        let fusion: Vec<_> = (0..n).map(|i| self.fusion(i).ok()).collect();
        match solute {
            Some(i) => {
                self.fusion(i)?;
            }
            None if fusion.iter().all(Option::is_none) => {
                self.fusion(0)?;
            }
            None => (),
        }
        let solid: Vec<_> = fusion
            .iter()
            .map(|f| f.is_some_and(|f| t < f.melting_temperature))
            .collect();
        let ideal_solubility = DVector::from_iterator(
            n,
            fusion
                .iter()
                .map(|f| f.map_or(f64::NAN, |f| f.ideal_solubility(t, equation))),
        );

        let solute = solute.or_else(|| {
            (0..n).filter(|&i| solid[i]).max_by(|&i, &j| {
                let tm = |k: usize| fusion[k].map_or(0.0, |f| f.melting_temperature);
                tm(i).total_cmp(&tm(j))
            })
        });
        let single_liquid = |molefracs: DVector<f64>, solute: Option<usize>, warning: &str| {
            let mut convergence = Convergence::converged(0.0, 0);
            convergence.warn(warning);
            SolubilityResult {
                temperature,
                equation,
                solute,
                activity_coefficients: self.activity_coefficients(t, &molefracs),
                molefracs,
                ideal_solubility: ideal_solubility.clone(),
                solid: solid.clone(),
                convergence,
            }
        };
        let (solute, fusion) = match solute.map(|i| (i, fusion[i])) {
            Some((i, Some(f))) if solid[i] => (i, f),
            Some((i, _)) => {
                // the molten solute is miscible with the solvents in any ratio
                let molefracs = DVector::from_fn(n, |k, _| if k == i { 1.0 } else { 0.0 });
                return Ok(single_liquid(
                    molefracs,
                    Some(i),
                    "Solute is above its melting temperature (single liquid phase).",
                ));
            }
            None => {
                let molefracs = DVector::from_element(n, 1.0 / n as f64);
                return Ok(single_liquid(
                    molefracs,
                    None,
                    "No solid phase at this temperature (single liquid phase).",
                ));
            }
        };

        let (max_iter, tol, verbosity) = options.unwrap_or(MAX_ITER_SLE, TOL_SLE);
        let (ln_x, convergence) = self.solve_solubility(
            t,
            solute,
            fusion.ln_ideal_solubility(t, equation),
            max_iter,
            tol,
            verbosity,
        );
        let molefracs = saturated_liquid(n, solute, ln_x.exp());
        Ok(SolubilityResult {
            temperature,
            equation,
            solute: Some(solute),
            activity_coefficients: self.activity_coefficients(t, &molefracs),
            molefracs,
            ideal_solubility,
            solid,
            convergence,
        })
    }

    /// Newton iteration for the logarithmic mole fraction of the solute.
    pub(super) fn solve_solubility(
        &self,
        temperature: f64,
        solute: usize,
        ln_ideal: f64,
        max_iter: usize,
        tol: f64,
        verbosity: Verbosity,
    ) -> (f64, Convergence) {
        let n = self.components();
        let t = Dual64::from(temperature);
        let mut ln_x = ln_ideal.min(-1e-3);
        let (mut ln_x_min, mut ln_x_max) = (LN_X_MIN, 0.0);
        let mut convergence = Convergence::new();

        log_iter!(verbosity, " iter |    residual    |     ln x     ");
        log_iter!(verbosity, "{:-<38}", "");
        for _ in 0..max_iter {
            let (f, df) = first_derivative(
                |ln_x: Dual64| {
                    let x = saturated_liquid(n, solute, ln_x.exp());
                    ln_x + self.model.ln_gamma(t, &x)[solute] - ln_ideal
                },
                ln_x,
            );
            convergence.step(f.abs());
            log_iter!(
                verbosity,
                " {:4} | {:14.8e} | {:12.8}",
                convergence.iterations,
                f.abs(),
                ln_x
            );
            if f.abs() < tol || convergence.is_diverged() {
                break;
            }
            if f > 0.0 {
                ln_x_max = ln_x;
            } else {
                ln_x_min = ln_x;
            }
            ln_x = newton_step(ln_x, f, df, ln_x_min, ln_x_max);
        }
        convergence.finish(tol);
        if !convergence.is_converged() {
            convergence.warn("Solubility did not converge.");
        }
        log_result!(
            verbosity,
            "Solubility: {:?} in {} step(s), residual {:.3e}\n",
            convergence.status,
            convergence.iterations,
            convergence.residual
        );
        (ln_x, convergence)
    }

    /// Crystallization temperature of a liquid with composition `molefracs`.
    ///
    /// Every component with fusion data is checked. The component with the
    /// highest liquidus temperature crystallizes first.
    pub fn crystallization_temperature(
        &self,
        molefracs: &DVector<f64>,
        equation: SleEquation,
        options: SolverOptions,
    ) -> PhaseqResult<CrystallizationResult> {
        self.validate_molefracs(molefracs)?;
        let n = self.components();
        let (max_iter, tol, verbosity) = options.unwrap_or(MAX_ITER_SLE, TOL_SLE);
        let mut convergence = Convergence::converged(0.0, 0);
        if (0..n).all(|i| self.fusion(i).is_err()) {
            self.fusion(0)?;
        }
        let mut liquidus_temperatures = Vec::with_capacity(n);
        for i in 0..n {
            let Ok(fusion) = self.fusion(i) else {
                liquidus_temperatures.push(None);
                continue;
            };
            let (t, c) = self.liquidus_temperature(
                i,
                &fusion,
                molefracs,
                equation,
                max_iter,
                tol,
                verbosity,
            );
            convergence.iterations += c.iterations;
            if t.is_some() && !c.is_converged() {
                convergence.status = c.status;
                convergence.residual = c.residual;
                convergence.warnings.extend(c.warnings);
            }
            liquidus_temperatures.push(t.map(|t| t * KELVIN));
        }

        let crystallizing_component = (0..n)
            .filter(|&i| liquidus_temperatures[i].is_some())
            .max_by(|&i, &j| {
                let ti = liquidus_temperatures[i].map_or(0.0, |t| t.convert_into(KELVIN));
                let tj = liquidus_temperatures[j].map_or(0.0, |t| t.convert_into(KELVIN));
                ti.total_cmp(&tj)
            });
        let temperature = crystallizing_component.and_then(|i| liquidus_temperatures[i]);
        if temperature.is_none() {
            convergence.warn("No component crystallizes from this liquid.");
        }
        Ok(CrystallizationResult {
            equation,
            molefracs: molefracs.clone(),
            activity_coefficients: temperature
                .map(|t| self.activity_coefficients(t.convert_into(KELVIN), molefracs)),
            liquidus_temperatures,
            temperature,
            crystallizing_component,
            convergence,
        })
    }

    /// Temperature at which component `i` is saturated in a liquid of
    /// fixed composition. Returns `None` if the component does not
    /// crystallize above `0.2 T_m`.
    #[expect(clippy::too_many_arguments)]
    pub(super) fn liquidus_temperature(
        &self,
        i: usize,
        fusion: &FusionRecord,
        molefracs: &DVector<f64>,
        equation: SleEquation,
        max_iter: usize,
        tol: f64,
        verbosity: Verbosity,
    ) -> (Option<f64>, Convergence) {
        let mut convergence = Convergence::new();
        let tm = fusion.melting_temperature;
        if molefracs[i] <= 0.0 {
            convergence.finish(f64::INFINITY);
            return (None, convergence);
        }
        let x = molefracs.map(Dual64::from);
        let residual = |t: Dual64| {
            let ln_gamma = self.model.ln_gamma(t, &x);
            ln_gamma[i] + molefracs[i].ln() - fusion.ln_ideal_solubility(t, equation)
        };

        // the residual decreases with temperature
        let (mut t_min, mut t_max) = (T_MIN_FACTOR * tm, tm);
        if residual(Dual64::from(t_max)).re >= 0.0 {
            return (Some(tm), Convergence::converged(0.0, 0));
        }
        if residual(Dual64::from(t_min)).re <= 0.0 {
            convergence.finish(f64::INFINITY);
            return (None, convergence);
        }

        let mut t = tm * (1.0 - 1e-3);
        for _ in 0..max_iter {
            let (f, df) = first_derivative(residual, t);
            convergence.step(f.abs());
            log_iter!(
                verbosity,
                " {:4} | {:14.8e} | {:12.5}",
                convergence.iterations,
                f.abs(),
                t
            );
            if f.abs() < tol || convergence.is_diverged() {
                break;
            }
            if f > 0.0 {
                t_min = t;
            } else {
                t_max = t;
            }
            t = newton_step(t, f, df, t_min, t_max);
        }
        convergence.finish(tol);
        if !convergence.is_converged() {
            convergence.warn(format!(
                "Liquidus temperature of component {} did not converge.",
                i + 1
            ));
        }
        log_result!(
            verbosity,
            "Liquidus temperature of component {}: {:?} in {} step(s), residual {:.3e}\n",
            i + 1,
            convergence.status,
            convergence.iterations,
            convergence.residual
        );
        (Some(t), convergence)
    }
}

/// Liquid with solute mole fraction `x` and the solvents sharing the rest.
pub(super) fn saturated_liquid<D: DualNum<f64> + Copy>(
    n: usize,
    solute: usize,
    x: D,
) -> DVector<D> {
    let rest = (-x + 1.0) / (n - 1) as f64;
    DVector::from_fn(n, |i, _| if i == solute { x } else { rest })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::utils::Margules;
    use crate::parameter::{ComponentRecord, Identifier};
    use approx::assert_relative_eq;

    fn naphthalene_benzene(a: f64) -> EquilibriumSystem<Margules> {
        let components = vec![
            ComponentRecord::new(Identifier::from_name("Naphthalene"), 128.17)
                .with_fusion(FusionRecord::new(353.35, 19_060.0)),
            ComponentRecord::new(Identifier::from_name("Benzene"), 78.11)
                .with_fusion(FusionRecord::new(278.68, 9_870.0)),
        ];
        EquilibriumSystem::new(Margules::binary(a), components).expect("consistent system")
    }

    #[test]
    fn ideal_solubility_of_naphthalene() {
        let fusion = FusionRecord::new(353.35, 19_060.0);
        let x = fusion.ideal_solubility(298.15, SleEquation::Simplified);
        let expected = (-19_060.0 / RGAS * (1.0 / 298.15 - 1.0 / 353.35)).exp();
        assert_relative_eq!(x, expected, max_relative = 1e-12);
        assert_relative_eq!(fusion.ideal_solubility(360.0, SleEquation::Simplified), 1.0);
        // without heat capacity data both forms agree
        assert_relative_eq!(
            fusion.ideal_solubility(298.15, SleEquation::Complete),
            x,
            max_relative = 1e-12
        );
    }

    #[test]
    fn heat_capacity_raises_solubility() {
        let mut fusion = FusionRecord::new(353.35, 19_060.0);
        let simplified = fusion.ideal_solubility(298.15, SleEquation::Simplified);
        fusion.delta_cp = 20.0;
        assert!(fusion.ideal_solubility(298.15, SleEquation::Complete) > simplified);
    }

    #[test]
    fn ideal_solution_solubility() -> PhaseqResult<()> {
        let system = naphthalene_benzene(0.0);
        let res = system.solubility(
            298.15 * KELVIN,
            None,
            SleEquation::Simplified,
            SolverOptions::default(),
        )?;
        assert!(res.convergence.is_converged());
        assert_eq!(res.solute, Some(0));
        assert_eq!(res.solid, vec![true, false]);
        assert_relative_eq!(
            res.solubility().unwrap_or(0.0),
            res.ideal_solubility[0],
            max_relative = 1e-8
        );
        Ok(())
    }

    #[test]
    fn positive_deviation_lowers_solubility() -> PhaseqResult<()> {
        let ideal = naphthalene_benzene(0.0).solubility(
            298.15 * KELVIN,
            None,
            SleEquation::Simplified,
            SolverOptions::default(),
        )?;
        let res = naphthalene_benzene(200.0).solubility(
            298.15 * KELVIN,
            None,
            SleEquation::Simplified,
            SolverOptions::default(),
        )?;
        assert!(res.convergence.is_converged());
        let x = res.solubility().unwrap_or(1.0);
        assert!(x < ideal.solubility().unwrap_or(0.0));
        // x γ equals the ideal solubility
        assert_relative_eq!(
            x * res.activity_coefficients[0],
            res.ideal_solubility[0],
            max_relative = 1e-8
        );
        Ok(())
    }

    #[test]
    fn liquid_mixture_has_no_solute() -> PhaseqResult<()> {
        let res = naphthalene_benzene(0.0).solubility(
            400.0 * KELVIN,
            None,
            SleEquation::Simplified,
            SolverOptions::default(),
        )?;
        assert!(res.solute.is_none());
        assert!(res.convergence.warning().is_some());
        Ok(())
    }

    #[test]
    fn crystallization_inverts_solubility() -> PhaseqResult<()> {
        let system = naphthalene_benzene(150.0);
        let t = 300.0;
        let sol = system.solubility(
            t * KELVIN,
            Some(0),
            SleEquation::Simplified,
            SolverOptions::default(),
        )?;
        let cryst = system.crystallization_temperature(
            &sol.molefracs,
            SleEquation::Simplified,
            SolverOptions::default(),
        )?;
        assert!(cryst.convergence.is_converged());
        assert_eq!(cryst.crystallizing_component, Some(0));
        assert_relative_eq!(
            cryst.temperature.map_or(0.0, |t| t.convert_into(KELVIN)),
            t,
            max_relative = 1e-8
        );
        Ok(())
    }

    #[test]
    fn named_liquid_solute_is_kept() -> PhaseqResult<()> {
        let res = naphthalene_benzene(0.0).solubility(
            298.15 * KELVIN,
            Some(1),
            SleEquation::Simplified,
            SolverOptions::default(),
        )?;
        assert_eq!(res.solute, Some(1));
        assert_eq!(res.solid, vec![true, false]);
        assert_eq!(res.solubility(), Some(1.0));
        assert!(res.convergence.warning().is_some());
        Ok(())
    }

    fn solid_in_plain_solvent() -> EquilibriumSystem<Margules> {
        let components = vec![
            ComponentRecord::new(Identifier::from_name("A"), 0.0)
                .with_fusion(FusionRecord::new(300.0, 10_000.0)),
            ComponentRecord::new(Identifier::from_name("B"), 0.0),
        ];
        EquilibriumSystem::new(Margules::binary(0.0), components).expect("consistent system")
    }

    #[test]
    fn solvent_without_fusion_data() -> PhaseqResult<()> {
        let system = solid_in_plain_solvent();
        for solute in [None, Some(0)] {
            let res = system.solubility(
                250.0 * KELVIN,
                solute,
                SleEquation::Simplified,
                SolverOptions::default(),
            )?;
            assert!(res.convergence.is_converged());
            assert_eq!(res.solute, Some(0));
            assert_eq!(res.solid, vec![true, false]);
            assert!(res.ideal_solubility[1].is_nan());
            assert_relative_eq!(
                res.solubility().unwrap_or(0.0),
                res.ideal_solubility[0],
                max_relative = 1e-8
            );
        }

        let cryst = system.crystallization_temperature(
            &DVector::from_vec(vec![0.5, 0.5]),
            SleEquation::Simplified,
            SolverOptions::default(),
        )?;
        assert_eq!(cryst.crystallizing_component, Some(0));
        assert!(cryst.liquidus_temperatures[1].is_none());
        Ok(())
    }

    #[test]
    fn missing_fusion_data() {
        let system = solid_in_plain_solvent();
        let res = system.solubility(
            250.0 * KELVIN,
            Some(1),
            SleEquation::Simplified,
            SolverOptions::default(),
        );
        assert!(matches!(res, Err(PhaseqError::MissingProperty { .. })));

        let components = vec![
            ComponentRecord::new(Identifier::from_name("A"), 0.0),
            ComponentRecord::new(Identifier::from_name("B"), 0.0),
        ];
        let system =
            EquilibriumSystem::new(Margules::binary(0.0), components).expect("consistent system");
        let res = system.solubility(
            250.0 * KELVIN,
            None,
            SleEquation::Simplified,
            SolverOptions::default(),
        );
        assert!(matches!(res, Err(PhaseqError::MissingProperty { .. })));
    }
}
