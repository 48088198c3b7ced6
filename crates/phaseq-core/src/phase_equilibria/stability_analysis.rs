use super::is_trivial_solution;
use crate::activity::ActivityModel;
use crate::equilibrium_system::EquilibriumSystem;
use crate::errors::{PhaseqError, PhaseqResult};
use crate::{SolverOptions, Verbosity};
use nalgebra::{DMatrix, DVector};
use quantity::{KELVIN, Temperature};

const X_DOMINANT: f64 = 0.99;
const X_PAIR: f64 = 0.49;
const MINIMIZE_TOL: f64 = 1E-06;
const MIN_EIGENVAL: f64 = 1E-03;
const ETA_STEP: f64 = 0.25;
const MINIMIZE_KMAX: usize = 100;
const ZERO_TPD: f64 = -1E-08;

/// # Stability analysis
impl<A: ActivityModel> EquilibriumSystem<A> {
    /// Determine if a liquid of composition `molefracs` is stable, i.e.
    /// if no liquid-liquid phase split should occur.
    pub fn is_stable(
        &self,
        temperature: Temperature,
        molefracs: &DVector<f64>,
        options: SolverOptions,
    ) -> PhaseqResult<bool> {
        Ok(self
            .stability_analysis(temperature, molefracs, options)?
            .is_empty())
    }

    /// Perform a stability analysis of a liquid phase. The result is a list of
    /// compositions with negative tangent plane distance (i.e. lower Gibbs energy)
    /// that can be used as initial estimates for a liquid-liquid equilibrium.
    pub fn stability_analysis(
        &self,
        temperature: Temperature,
        molefracs: &DVector<f64>,
        options: SolverOptions,
    ) -> PhaseqResult<Vec<DVector<f64>>> {
        self.validate_molefracs(molefracs)?;
        let t = temperature.convert_into(KELVIN);
        let mut result: Vec<DVector<f64>> = Vec::new();
        for (label, mut trial) in self.trial_states(molefracs) {
            let msg = match self.minimize_tpd(t, molefracs, &mut trial, options) {
                Ok((Some(tpd), i)) if tpd < ZERO_TPD => {
                    let x = &trial / trial.sum();
                    if result.iter().any(|s| is_trivial_solution(s, &x)) {
                        format!("Found already identified minimum in {i} step(s)")
                    } else {
                        result.push(x);
                        format!("Found candidate in {i} step(s)")
                    }
                }
                Ok((Some(_), i)) => format!("Found minimum > 0 in {i} step(s)"),
                Ok((None, i)) => format!("Found trivial solution in {i} step(s)"),
                Err(e) => format!("{e}"),
            };
            log_result!(options.verbosity, "{}: {}\n", label, msg);
        }
        Ok(result)
    }

    /// Nearly pure phases of every component followed by
    /// equimolar mixtures of every pair of components.
    fn trial_states(&self, molefracs: &DVector<f64>) -> Vec<(String, DVector<f64>)> {
        let n = self.components();
        let mut trials = Vec::new();
        for i in 0..n {
            let rest = molefracs.sum() - molefracs[i];
            let x = if rest > 0.0 {
                let factor = (1.0 - X_DOMINANT) / rest;
                DVector::from_fn(n, |k, _| {
                    if k == i {
                        X_DOMINANT
                    } else {
                        molefracs[k] * factor
                    }
                })
            } else {
                DVector::from_fn(n, |k, _| {
                    if k == i {
                        X_DOMINANT
                    } else {
                        (1.0 - X_DOMINANT) / (n - 1) as f64
                    }
                })
            };
            trials.push((format!("Liquid phase {}", i + 1), x));
        }
        if n > 2 {
            let rest = (1.0 - 2.0 * X_PAIR) / (n - 2) as f64;
            for i in 0..n {
                for j in i + 1..n {
                    let x =
                        DVector::from_fn(n, |k, _| if k == i || k == j { X_PAIR } else { rest });
                    trials.push((format!("Liquid phase {}/{}", i + 1, j + 1), x));
                }
            }
        }
        trials
    }

    fn minimize_tpd(
        &self,
        temperature: f64,
        molefracs: &DVector<f64>,
        trial: &mut DVector<f64>,
        options: SolverOptions,
    ) -> PhaseqResult<(Option<f64>, usize)> {
        let (max_iter, tol, verbosity) = options.unwrap_or(MINIMIZE_KMAX, MINIMIZE_TOL);
        let mut newton = false;
        let mut scaled_tol = tol;
        let mut tpd = 1E10;
        let ln_gamma = self.model.ln_gamma(temperature, molefracs);
        let di = DVector::from_fn(molefracs.len(), |i, _| {
            if molefracs[i] > 0.0 {
                molefracs[i].ln() + ln_gamma[i]
            } else {
                f64::NEG_INFINITY
            }
        });

        log_iter!(verbosity, " iter |    residual    |     tpd     | Newton");
        log_iter!(verbosity, "{:-<46}", "");

        for i in 1..=max_iter {
            let error = if !newton {
                // case: direct substitution
                let x = &*trial / trial.sum();
                let y = (&di - self.model.ln_gamma(temperature, &x)).map(f64::exp);
                let tpd_old = tpd;
                tpd = 1.0 - y.sum();
                let error = (&y / y.sum() - x).abs().sum();

                *trial = y;
                if (i > 4 && error > scaled_tol) || (tpd > tpd_old + 1E-05 && i > 2) {
                    newton = true; // switch to newton scheme
                }
                error
            } else {
                // case: newton step
                self.stability_newton_step(temperature, &di, trial, &mut tpd)?
            };
            log_iter!(
                verbosity,
                " {:4} | {:14.8e} | {:11.8} | {}",
                i,
                error,
                tpd,
                newton
            );
            if !error.is_finite() || trial.sum() <= 0.0 {
                return Err(PhaseqError::IterationFailed(String::from(
                    "stability analysis",
                )));
            }
            if is_trivial_solution(molefracs, &(&*trial / trial.sum())) {
                return Ok((None, i));
            }
            if tpd < -1E-02 {
                scaled_tol = tol * 1E01
            }
            if tpd < -1E-01 {
                scaled_tol = tol * 1E02
            }
            if tpd < -1E-01 && i > 5 {
                scaled_tol = tol * 1E03
            }
            if error < scaled_tol {
                return Ok((Some(tpd), i));
            }
        }
        Err(PhaseqError::NotConverged(String::from("stability analysis")))
    }

    fn stability_newton_step(
        &self,
        temperature: f64,
        di: &DVector<f64>,
        trial: &mut DVector<f64>,
        tpd: &mut f64,
    ) -> PhaseqResult<f64> {
        let n = self.components();
        // save old values
        let tpd_old = *tpd;

        // calculate residual and ideal hesse matrix
        let y = trial.clone();
        let mut hesse = self.model.dln_gamma_dnj(temperature, &y) * y.sum();
        let ln_gamma = self.model.ln_gamma(temperature, &(&y / y.sum()));
        let ln_y = y.map(|y| if y > f64::EPSILON { y.ln() } else { 0.0 });
        let sq_y = y.map(f64::sqrt);
        let gradient = DVector::from_fn(n, |i, _| {
            if di[i].is_finite() {
                (ln_y[i] + ln_gamma[i] - di[i]) * sq_y[i]
            } else {
                0.0
            }
        });

        let hesse_ig = DMatrix::identity(n, n);
        for i in 0..n {
            for j in 0..n {
                hesse[(i, j)] *= sq_y[i] * sq_y[j];
            }
            if y[i] > f64::EPSILON && di[i].is_finite() {
                hesse[(i, i)] += ln_y[i] + ln_gamma[i] - di[i];
            }
        }

        // Murray's method: add a multiple of the unity matrix to the Hessian, if
        // (1) it is not positive definite
        // (2) the step size is too large
        // (3) the tpd does not descent
        let mut eta_h = 1.0;
        loop {
            let hessian = &hesse + &hesse_ig * eta_h;

            let min_eigenval = hessian.clone().symmetric_eigen().eigenvalues.min();
            if min_eigenval < MIN_EIGENVAL && eta_h < 20.0 {
                eta_h += 2.0 * ETA_STEP;
                continue;
            }

            // solve: hessian * delta_y = gradient
            let delta_y = hessian.lu().solve(&gradient).ok_or_else(|| {
                PhaseqError::IterationFailed(String::from("stability analysis"))
            })?;
            if delta_y
                .iter()
                .zip(y.iter())
                .any(|(dy, y)| ((0.5 * dy).powi(2) / y).abs() > 5.0)
                && eta_h < 30.0
            {
                eta_h += 2.0 * ETA_STEP;
                continue;
            }

            let y_new = (&sq_y - delta_y / 2.0).map(|v| v.powi(2));
            let ln_y_new = y_new.map(|y| if y > f64::EPSILON { y.ln() } else { 0.0 });
            let finite_di = di.map(|d| if d.is_finite() { d } else { 0.0 });
            *tpd = 1.0
                + y_new
                    .component_mul(&(ln_y_new + &ln_gamma - finite_di).add_scalar(-1.0))
                    .sum();
            if *tpd > tpd_old && eta_h < 30.0 {
                eta_h += ETA_STEP;
                continue;
            }

            // accept step
            *trial = y_new;
            break;
        }
        Ok(gradient.abs().sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::utils::Margules;
    use crate::parameter::{ComponentRecord, Identifier};

    fn system(a: f64) -> EquilibriumSystem<Margules> {
        let components = vec![
            ComponentRecord::new(Identifier::from_name("A"), 0.0),
            ComponentRecord::new(Identifier::from_name("B"), 0.0),
        ];
        EquilibriumSystem::new(Margules::binary(a), components).expect("consistent system")
    }

    #[test]
    fn ideal_liquid_is_stable() -> PhaseqResult<()> {
        let x = DVector::from_vec(vec![0.5, 0.5]);
        assert!(system(0.0).is_stable(300.0 * KELVIN, &x, SolverOptions::default())?);
        Ok(())
    }

    #[test]
    fn immiscible_liquid_is_unstable() -> PhaseqResult<()> {
        // a / T = 3 gives a wide miscibility gap around the equimolar mixture
        let system = system(900.0);
        let x = DVector::from_vec(vec![0.5, 0.5]);
        let candidates = system.stability_analysis(300.0 * KELVIN, &x, SolverOptions::default())?;
        assert!(!candidates.is_empty());
        assert!(candidates.iter().all(|c| (c[0] - 0.5).abs() > 0.1));
        Ok(())
    }

    #[test]
    fn outside_of_gap_is_stable() -> PhaseqResult<()> {
        // the binodal of a / T = 3 lies at x = 0.0707
        let x = DVector::from_vec(vec![0.03, 0.97]);
        assert!(system(900.0).is_stable(300.0 * KELVIN, &x, SolverOptions::default())?);
        Ok(())
    }
}
