use super::{Convergence, PhaseEquilibrium, normalize};
use crate::activity::ActivityModel;
use crate::equilibrium_system::{EquilibriumSystem, Saturation};
use crate::errors::{PhaseqError, PhaseqResult};
use crate::state::{PhaseState, format_vector};
use crate::{SolverOptions, Verbosity};
use nalgebra::{DVector, Matrix3, Matrix4xX};
use num_dual::{Dual, DualNum, first_derivative};
use quantity::{KELVIN, PASCAL, Pressure, Temperature};

const MAX_ITER_TP: usize = 400;
const TOL_TP: f64 = 1e-8;

/// Non-ideality of the two phases of a split.
///
/// The logarithmic fugacity of component `i` in phase `k` is
/// `ln x_i + ln_phi_k(x)_i`, so that `K_i = exp(ln_phi_1 - ln_phi_2)`.
pub(super) trait SplitModel {
    fn ln_phi_1(&self, molefracs: &DVector<f64>) -> DVector<f64>;
    fn ln_phi_2(&self, molefracs: &DVector<f64>) -> DVector<f64>;
}

/// Two phases built from a feed and a set of K values.
///
/// The second phase has composition `K_i x_i` and the phase fraction `beta`.
#[derive(Clone, Debug)]
pub(super) struct Split {
    pub x1: DVector<f64>,
    pub x2: DVector<f64>,
    pub beta: f64,
    pub ln_phi_1: DVector<f64>,
    pub ln_phi_2: DVector<f64>,
    ln_k: DVector<f64>,
}

impl Split {
    /// Distribute the feed according to `k`. Feeds outside the two-phase
    /// region end up completely in one of the phases.
    pub fn new<S: SplitModel>(
        model: &S,
        feed: &DVector<f64>,
        k: &DVector<f64>,
        beta: Option<f64>,
    ) -> PhaseqResult<Self> {
        let (beta, x1, x2) = if feed.dot(k) <= 1.0 {
            (0.0, feed.clone(), normalize(feed.component_mul(k)))
        } else if feed.component_div(k).sum() <= 1.0 {
            (1.0, normalize(feed.component_div(k)), feed.clone())
        } else {
            let beta = rachford_rice(feed, k, beta)?;
            let x1 = feed.zip_map(k, |z, k| z / (1.0 - beta + beta * k));
            let x2 = x1.component_mul(k);
            (beta, normalize(x1), normalize(x2))
        };
        Ok(Self {
            ln_phi_1: model.ln_phi_1(&x1),
            ln_phi_2: model.ln_phi_2(&x2),
            x1,
            x2,
            beta,
            ln_k: k.map(f64::ln),
        })
    }

    /// Logarithmic K values implied by the current phase compositions.
    pub fn ln_k(&self) -> DVector<f64> {
        &self.ln_phi_1 - &self.ln_phi_2
    }

    /// Change of the K values from the previous step.
    pub fn residual(&self) -> f64 {
        (self.ln_k() - &self.ln_k).norm()
    }

    /// Whether all of the feed is in one phase.
    pub fn is_single_phase(&self) -> bool {
        self.beta <= 0.0 || self.beta >= 1.0
    }

    /// Total Gibbs energy of both phases divided by RT.
    pub fn gibbs_energy(&self) -> f64 {
        let g = |x: &DVector<f64>, ln_phi: &DVector<f64>| -> f64 {
            x.iter()
                .zip(ln_phi.iter())
                .filter(|&(&x, _)| x > 0.0)
                .map(|(&x, &l)| x * (x.ln() + l))
                .sum()
        };
        (1.0 - self.beta) * g(&self.x1, &self.ln_phi_1) + self.beta * g(&self.x2, &self.ln_phi_2)
    }
}

#[expect(clippy::too_many_arguments)]
pub(super) fn successive_substitution<S: SplitModel>(
    model: &S,
    feed: &DVector<f64>,
    split: &mut Split,
    iterations: usize,
    convergence: &mut Convergence,
    max_iter: usize,
    ln_k_vec: &mut Option<&mut Matrix4xX<f64>>,
    tol: f64,
    verbosity: Verbosity,
) -> PhaseqResult<bool> {
    for i in 0..iterations {
        let res = split.residual();
        convergence.step(res);
        log_iter!(
            verbosity,
            " {:4} | {:14.8e} | {} | {}",
            convergence.iterations,
            res,
            format_vector(&split.x1),
            format_vector(&split.x2),
        );
        if res < tol {
            return Ok(true);
        }
        if convergence.is_diverged() || convergence.iterations >= max_iter {
            return Ok(false);
        }

        let ln_k = split.ln_k();
        *split = Split::new(model, feed, &ln_k.map(f64::exp), Some(split.beta))?;
        if let Some(ln_k_vec) = ln_k_vec
            && i + 4 >= iterations
        {
            ln_k_vec.set_row(i + 4 - iterations, &ln_k.transpose());
        }
    }
    Ok(false)
}

/// Successive substitution accelerated by the dominant eigenvalue method.
///
/// Extrapolated K values are only accepted if they lower the Gibbs energy.
pub(super) fn accelerated_successive_substitution<S: SplitModel>(
    model: &S,
    feed: &DVector<f64>,
    split: &mut Split,
    convergence: &mut Convergence,
    max_iter: usize,
    tol: f64,
    verbosity: Verbosity,
) -> PhaseqResult<bool> {
    while convergence.iterations < max_iter {
        // do 5 successive substitution steps and check for convergence
        let mut ln_k_vec = Matrix4xX::zeros(feed.len());
        if successive_substitution(
            model,
            feed,
            split,
            5,
            convergence,
            max_iter,
            &mut Some(&mut ln_k_vec),
            tol,
            verbosity,
        )? {
            return Ok(true);
        }
        if convergence.is_diverged() || convergence.iterations >= max_iter {
            break;
        }

        // calculate total Gibbs energy before the extrapolation
        let gibbs = split.gibbs_energy();

        // extrapolate K values
        let delta_vec = ln_k_vec.rows_range(1..) - ln_k_vec.rows_range(..3);
        let delta = Matrix3::from_fn(|i, j| delta_vec.row(i).dot(&delta_vec.row(j)));
        let d = delta[(0, 1)] * delta[(0, 1)] - delta[(0, 0)] * delta[(1, 1)];
        let a = (delta[(0, 2)] * delta[(0, 1)] - delta[(1, 2)] * delta[(0, 0)]) / d;
        let b = (delta[(1, 2)] * delta[(0, 1)] - delta[(0, 2)] * delta[(1, 1)]) / d;

        let k = (ln_k_vec.row(3)
            + ((b * delta_vec.row(1) + (a + b) * delta_vec.row(2)) / (1.0 - a - b)))
            .map(f64::exp)
            .transpose();
        if !k.iter().all(|k| k.is_finite()) {
            continue;
        }

        if let Ok(trial) = Split::new(model, feed, &k, Some(split.beta))
            && trial.gibbs_energy() < gibbs
        {
            *split = trial;
        }
    }
    Ok(false)
}

struct VaporLiquid<'a, A> {
    system: &'a EquilibriumSystem<A>,
    saturation: Saturation,
    temperature: f64,
    pressure: f64,
    psat: DVector<f64>,
}

impl<A: ActivityModel> SplitModel for VaporLiquid<'_, A> {
    fn ln_phi_1(&self, molefracs: &DVector<f64>) -> DVector<f64> {
        self.system.model.ln_gamma(self.temperature, molefracs) + self.psat.map(f64::ln)
    }

    fn ln_phi_2(&self, molefracs: &DVector<f64>) -> DVector<f64> {
        self.saturation
            .ln_correction(self.temperature, self.pressure, molefracs, &self.psat)
            .add_scalar(self.pressure.ln())
    }
}

/// # Flash calculations
impl PhaseEquilibrium<2> {
    /// Perform a Tp-flash calculation. If no initial values are
    /// given, the K values are initialized with the modified
    /// Raoult's law at the feed composition.
    ///
    /// Feeds below the bubble point or above the dew point are
    /// returned as a single phase with `two_phase = false`.
    pub fn tp_flash<A: ActivityModel>(
        system: &EquilibriumSystem<A>,
        temperature: Temperature,
        pressure: Pressure,
        feed: &DVector<f64>,
        initial_state: Option<&PhaseEquilibrium<2>>,
        options: SolverOptions,
    ) -> PhaseqResult<Self> {
        system.validate_molefracs(feed)?;
        let feed = normalize(feed.clone());
        let (max_iter, tol, verbosity) = options.unwrap_or(MAX_ITER_TP, TOL_TP);
        let t = temperature.convert_into(KELVIN);
        let p = pressure.convert_into(PASCAL);
        let saturation = system.saturation()?;
        let model = VaporLiquid {
            system,
            psat: saturation.vapor_pressures(t),
            saturation,
            temperature: t,
            pressure: p,
        };

        let k = initial_state
            .map(|vle| vle.vapor().molefracs.component_div(&vle.liquid().molefracs))
            .filter(|k| k.iter().all(|k| k.is_finite() && *k > 0.0))
            .unwrap_or_else(|| (model.ln_phi_1(&feed) - model.ln_phi_2(&feed)).map(f64::exp));
        let beta = initial_state.map(|vle| vle.vapor().phase_fraction);
        let mut split = Split::new(&model, &feed, &k, beta)?;

        log_iter!(
            verbosity,
            " iter |    residual    |  liquid mole fractions  |  vapor mole fractions  "
        );
        log_iter!(verbosity, "{:-<77}", "");
        let mut convergence = Convergence::new();
        if !successive_substitution(
            &model,
            &feed,
            &mut split,
            3,
            &mut convergence,
            max_iter,
            &mut None,
            tol,
            verbosity,
        )? {
            accelerated_successive_substitution(
                &model,
                &feed,
                &mut split,
                &mut convergence,
                max_iter,
                tol,
                verbosity,
            )?;
        }
        convergence.finish(tol);
        if !convergence.is_converged() {
            convergence.warn("Tp flash did not converge.");
        }
        if split.beta <= 0.0 {
            convergence.warn("Feed is a subcooled liquid (single phase).");
        } else if split.beta >= 1.0 {
            convergence.warn("Feed is a superheated vapor (single phase).");
        }
        log_result!(
            verbosity,
            "Tp flash: {:?} in {} step(s), vapor fraction {:.5}\n",
            convergence.status,
            convergence.iterations,
            split.beta
        );

        let gamma = system.activity_coefficients(t, &split.x1);
        let phi = model
            .saturation
            .ln_correction(t, p, &split.x2, &model.psat)
            .map(f64::exp);
        Ok(Self {
            temperature,
            pressure: Some(pressure),
            two_phase: !split.is_single_phase(),
            phases: [
                PhaseState::vapor(split.x2, phi).with_phase_fraction(split.beta),
                PhaseState::liquid(split.x1, gamma).with_phase_fraction(1.0 - split.beta),
            ],
            convergence,
        })
    }
}

pub(super) fn rachford_rice(
    feed: &DVector<f64>,
    k: &DVector<f64>,
    beta_in: Option<f64>,
) -> PhaseqResult<f64> {
    const MAX_ITER: usize = 10;
    const ABS_TOL: f64 = 1e-6;

    // check if solution exists
    let (mut beta_min, mut beta_max) = if feed.dot(k) > 1.0
        && feed
            .component_div(k)
            .iter()
            .filter(|x| !x.is_nan())
            .sum::<f64>()
            > 1.0
    {
        (0.0, 1.0)
    } else {
        return Err(PhaseqError::IterationFailed(String::from("rachford_rice")));
    };

    // look for tighter bounds
    for (&k, &f) in k.iter().zip(feed.iter()) {
        if k > 1.0 {
            let b = (k * f - 1.0) / (k - 1.0);
            if b > beta_min {
                beta_min = b;
            }
        }
        if k < 1.0 {
            let b = (1.0 - f) / (1.0 - k);
            if b < beta_max {
                beta_max = b;
            }
        }
    }

    // initialize
    let mut beta = 0.5 * (beta_min + beta_max);
    if let Some(b) = beta_in
        && b > beta_min
        && b < beta_max
    {
        beta = b;
    }
    let g = feed.dot(&k.map(|k| (k - 1.0) / (1.0 - beta + beta * k)));
    if g > 0.0 {
        beta_min = beta
    } else {
        beta_max = beta
    }

    // iterate
    for _ in 0..MAX_ITER {
        let (g, dg) = first_derivative(
            |beta| {
                let frac = k.map(|k| (-beta + beta * k + 1.0).recip() * (k - 1.0));
                feed.map(Dual::from).dot(&frac)
            },
            beta,
        );
        if g > 0.0 {
            beta_min = beta;
        } else {
            beta_max = beta;
        }

        let dbeta = g / dg;
        beta -= dbeta;

        if beta < beta_min || beta > beta_max {
            beta = 0.5 * (beta_min + beta_max);
        }
        if dbeta.abs() < ABS_TOL {
            return Ok(beta);
        }
    }

    Ok(beta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::utils::Margules;
    use crate::parameter::{ComponentRecord, Identifier};
    use crate::vapor_pressure::AntoineRecord;
    use approx::assert_relative_eq;

    fn benzene_toluene() -> EquilibriumSystem<Margules> {
        let components = vec![
            ComponentRecord::new(Identifier::from_name("Benzene"), 78.11)
                .with_antoine(AntoineRecord::new(6.90565, 1211.033, -52.36)),
            ComponentRecord::new(Identifier::from_name("Toluene"), 92.14)
                .with_antoine(AntoineRecord::new(6.95464, 1344.8, -53.67)),
        ];
        EquilibriumSystem::new(Margules::binary(100.0), components).expect("consistent system")
    }

    #[test]
    fn rachford_rice_binary() -> PhaseqResult<()> {
        let feed = DVector::from_vec(vec![0.5, 0.5]);
        let k = DVector::from_vec(vec![2.0, 0.5]);
        let beta = rachford_rice(&feed, &k, None)?;
        assert_relative_eq!(beta, 0.5, epsilon = 1e-6);
        let k = DVector::from_vec(vec![0.9, 0.5]);
        assert!(rachford_rice(&feed, &k, None).is_err());
        Ok(())
    }

    #[test]
    fn two_phase_flash() -> PhaseqResult<()> {
        let system = benzene_toluene();
        let t = 365.0 * KELVIN;
        let feed = DVector::from_vec(vec![0.5, 0.5]);
        let bubble =
            PhaseEquilibrium::bubble_point(&system, t, &feed, None, SolverOptions::default())?;
        let dew = PhaseEquilibrium::dew_point(&system, t, &feed, None, SolverOptions::default())?;
        let pb = bubble.pressure.map(|p| p.convert_into(PASCAL)).unwrap_or(0.0);
        let pd = dew.pressure.map(|p| p.convert_into(PASCAL)).unwrap_or(0.0);
        let p = 0.5 * (pb + pd) * PASCAL;

        let vle = PhaseEquilibrium::tp_flash(&system, t, p, &feed, None, SolverOptions::default())?;
        assert!(vle.converged());
        assert!(vle.two_phase);
        assert!(vle.beta() > 0.0 && vle.beta() < 1.0);
        // first phase is the vapor, its fraction is beta
        let beta_v = vle.vapor().phase_fraction;
        let mix = vle.vapor().molefracs.scale(beta_v) + vle.liquid().molefracs.scale(1.0 - beta_v);
        assert_relative_eq!(mix, feed, epsilon = 1e-8);
        let res = system.vle_residual(
            365.0,
            p.convert_into(PASCAL),
            &vle.liquid().molefracs,
            &vle.vapor().molefracs,
        )?;
        assert!(res.amax() < 1e-6);
        Ok(())
    }

    #[test]
    fn subcooled_liquid() -> PhaseqResult<()> {
        let system = benzene_toluene();
        let feed = DVector::from_vec(vec![0.5, 0.5]);
        let vle = PhaseEquilibrium::tp_flash(
            &system,
            330.0 * KELVIN,
            500000.0 * PASCAL,
            &feed,
            None,
            SolverOptions::default(),
        )?;
        assert!(vle.converged());
        assert!(!vle.two_phase);
        assert_eq!(vle.liquid().phase_fraction, 1.0);
        assert_relative_eq!(vle.liquid().molefracs, feed, epsilon = 1e-12);
        Ok(())
    }
}
