use super::tp_flash::{
    Split, SplitModel, accelerated_successive_substitution, successive_substitution,
};
use super::{Convergence, PhaseEquilibrium, is_trivial_solution, normalize};
use crate::activity::ActivityModel;
use crate::equilibrium_system::EquilibriumSystem;
use crate::errors::PhaseqResult;
use crate::state::PhaseState;
use crate::{SolverOptions, Verbosity};
use itertools::Itertools;
use nalgebra::DVector;
use quantity::{KELVIN, Temperature};
use std::fmt;

const MAX_ITER_LLE: usize = 300;
const TOL_LLE: f64 = 1e-10;
const X_SEED: f64 = 0.9;
const MIN_GIBBS_DECREASE: f64 = 1e-10;
const MATERIAL_BALANCE_TOL: f64 = 1e-4;

/// Source of the K values that start a single flash attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SeedStrategy {
    InitialState,
    Stability(usize),
    DominantPair(usize, usize),
}

impl fmt::Display for SeedStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitialState => write!(f, "initial state"),
            Self::Stability(i) => write!(f, "stability candidate {}", i + 1),
            Self::DominantPair(i, j) => write!(f, "components {}/{}", i + 1, j + 1),
        }
    }
}

/// Outcome of a single attempt.
enum Attempt {
    Split(Split, Convergence),
    NotConverged(Split, Convergence),
    Trivial(usize),
    NoGibbsDecrease(usize),
}

struct LiquidLiquid<'a, A> {
    model: &'a A,
    temperature: f64,
}

impl<A: ActivityModel> SplitModel for LiquidLiquid<'_, A> {
    fn ln_phi_1(&self, molefracs: &DVector<f64>) -> DVector<f64> {
        self.model.ln_gamma(self.temperature, molefracs)
    }

    fn ln_phi_2(&self, molefracs: &DVector<f64>) -> DVector<f64> {
        self.model.ln_gamma(self.temperature, molefracs)
    }
}

/// # Liquid-liquid equilibria
impl PhaseEquilibrium<2> {
    /// Perform a liquid-liquid flash at temperature `temperature`.
    ///
    /// Attempts are started from the initial state (if given), from the
    /// candidates of a stability analysis of the feed and from nearly
    /// pure pairs of components. The first attempt that converges to a
    /// split with lower Gibbs energy than the feed is returned.
    /// If none does, the feed is reported as a single liquid phase
    /// with `two_phase = false`.
    ///
    /// The first phase is the phase richer in the first component, the
    /// phase fraction `beta` refers to the second phase.
    pub fn lle_flash<A: ActivityModel>(
        system: &EquilibriumSystem<A>,
        temperature: Temperature,
        feed: &DVector<f64>,
        initial_state: Option<&PhaseEquilibrium<2>>,
        options: SolverOptions,
    ) -> PhaseqResult<Self> {
        system.validate_molefracs(feed)?;
        let feed = normalize(feed.clone());
        let (max_iter, tol, verbosity) = options.unwrap_or(MAX_ITER_LLE, TOL_LLE);
        let t = temperature.convert_into(KELVIN);
        let model = LiquidLiquid {
            model: &system.model,
            temperature: t,
        };
        let gibbs_feed = system.model.gibbs_energy_of_mixing(t, &feed);

        let seeds = lle_seeds(system, temperature, &feed, initial_state, options)?;
        let mut iterations = 0;
        let mut best: Option<(Split, Convergence)> = None;
        for (strategy, k) in seeds {
            let attempt = lle_attempt(&model, &feed, &k, gibbs_feed, max_iter, tol, verbosity)?;
            let msg = match attempt {
                Attempt::Split(split, mut convergence) => {
                    log_result!(
                        verbosity,
                        "LLE flash ({}): {:?} in {} step(s), residual {:.3e}\n",
                        strategy,
                        convergence.status,
                        convergence.iterations,
                        convergence.residual
                    );
                    convergence.iterations += iterations;
                    return Ok(Self::from_split(system, temperature, &feed, split, convergence));
                }
                Attempt::NotConverged(split, convergence) => {
                    iterations += convergence.iterations;
                    let msg = format!("not converged in {} step(s)", convergence.iterations);
                    if best
                        .as_ref()
                        .is_none_or(|(_, c)| convergence.residual < c.residual)
                    {
                        best = Some((split, convergence));
                    }
                    msg
                }
                Attempt::Trivial(i) => {
                    iterations += i;
                    format!("trivial solution in {i} step(s)")
                }
                Attempt::NoGibbsDecrease(i) => {
                    iterations += i;
                    format!("no decrease of the Gibbs energy in {i} step(s)")
                }
            };
            log_result!(verbosity, "LLE flash ({}): {}\n", strategy, msg);
        }

        if let Some((split, mut convergence)) = best {
            convergence.iterations = iterations;
            convergence.warn("Flash did not converge.");
            return Ok(Self::from_split(system, temperature, &feed, split, convergence));
        }

        log_result!(verbosity, "LLE flash: single liquid phase\n");
        let mut convergence = Convergence::converged(0.0, iterations);
        convergence.warn("System completely miscible (1 stable phase).");
        let gamma = system.activity_coefficients(t, &feed);
        Ok(Self {
            temperature,
            pressure: None,
            phases: [
                PhaseState::liquid(feed.clone(), gamma.clone()),
                PhaseState::liquid(feed, gamma).with_phase_fraction(0.0),
            ],
            two_phase: false,
            convergence,
        })
    }

    fn from_split<A: ActivityModel>(
        system: &EquilibriumSystem<A>,
        temperature: Temperature,
        feed: &DVector<f64>,
        split: Split,
        mut convergence: Convergence,
    ) -> Self {
        let t = temperature.convert_into(KELVIN);
        let (x1, x2, beta) = if split.x2[0] > split.x1[0] {
            (split.x2, split.x1, 1.0 - split.beta)
        } else {
            (split.x1, split.x2, split.beta)
        };
        convergence.residual = system.lle_residual(t, &x1, &x2).amax();
        let mut vle = Self {
            temperature,
            pressure: None,
            phases: [
                PhaseState::liquid(x1.clone(), system.activity_coefficients(t, &x1))
                    .with_phase_fraction(1.0 - beta),
                PhaseState::liquid(x2.clone(), system.activity_coefficients(t, &x2))
                    .with_phase_fraction(beta),
            ],
            two_phase: true,
            convergence,
        };
        let balance = vle.material_balance_residual(feed);
        if balance > MATERIAL_BALANCE_TOL {
            vle.convergence
                .warn(format!("Material balance violated by {balance:.2e}."));
        }
        vle
    }
}

/// Initial K values of all attempts in the order in which they are tried.
fn lle_seeds<A: ActivityModel>(
    system: &EquilibriumSystem<A>,
    temperature: Temperature,
    feed: &DVector<f64>,
    initial_state: Option<&PhaseEquilibrium<2>>,
    options: SolverOptions,
) -> PhaseqResult<Vec<(SeedStrategy, DVector<f64>)>> {
    let n = feed.len();
    let mut seeds = Vec::new();
    if let Some(state) = initial_state {
        seeds.push((SeedStrategy::InitialState, state.k_values()));
    }

    let candidates = system.stability_analysis(
        temperature,
        feed,
        SolverOptions::new().verbosity(options.verbosity),
    )?;
    for (i, w) in candidates.iter().enumerate() {
        seeds.push((SeedStrategy::Stability(i), w.component_div(feed)));
    }
    if let [w1, w2] = &candidates[..] {
        seeds.push((SeedStrategy::Stability(2), w2.component_div(w1)));
    }

    for (i, j) in (0..n).tuple_combinations() {
        let rich = |k: usize| {
            normalize(DVector::from_fn(n, |l, _| {
                if l == k {
                    X_SEED
                } else {
                    (1.0 - X_SEED) / (n - 1) as f64
                }
            }))
        };
        seeds.push((SeedStrategy::DominantPair(i, j), rich(j).component_div(&rich(i))));
    }

    Ok(seeds
        .into_iter()
        .map(|(s, k)| (s, k.map(|k| if k.is_finite() && k > 0.0 { k } else { 1.0 })))
        .collect())
}

fn lle_attempt<A: ActivityModel>(
    model: &LiquidLiquid<A>,
    feed: &DVector<f64>,
    k: &DVector<f64>,
    gibbs_feed: f64,
    max_iter: usize,
    tol: f64,
    verbosity: Verbosity,
) -> PhaseqResult<Attempt> {
    let Ok(mut split) = Split::new(model, feed, k, None) else {
        return Ok(Attempt::Trivial(0));
    };
    let mut convergence = Convergence::new();
    log_iter!(
        verbosity,
        " iter |    residual    |  phase I mole fractions |  phase II mole fractions "
    );
    log_iter!(verbosity, "{:-<77}", "");
    if !successive_substitution(
        model,
        feed,
        &mut split,
        3,
        &mut convergence,
        max_iter,
        &mut None,
        tol,
        verbosity,
    )? {
        accelerated_successive_substitution(
            model,
            feed,
            &mut split,
            &mut convergence,
            max_iter,
            tol,
            verbosity,
        )?;
    }
    convergence.finish(tol);

    let iterations = convergence.iterations;
    if split.is_single_phase() || is_trivial_solution(&split.x1, &split.x2) {
        return Ok(Attempt::Trivial(iterations));
    }
    if convergence.is_diverged() {
        return Ok(Attempt::Trivial(iterations));
    }
    if split.gibbs_energy() > gibbs_feed - MIN_GIBBS_DECREASE {
        return Ok(Attempt::NoGibbsDecrease(iterations));
    }
    Ok(if convergence.is_converged() {
        Attempt::Split(split, convergence)
    } else {
        Attempt::NotConverged(split, convergence)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::utils::Margules;
    use crate::parameter::{ComponentRecord, Identifier};
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    fn components(n: usize) -> Vec<ComponentRecord> {
        (0..n)
            .map(|i| ComponentRecord::new(Identifier::from_name(&format!("C{}", i + 1)), 0.0))
            .collect()
    }

    #[test]
    fn symmetric_binary_gap() -> PhaseqResult<()> {
        let system = EquilibriumSystem::new(Margules::binary(900.0), components(2))?;
        let feed = DVector::from_vec(vec![0.4, 0.6]);
        let lle = PhaseEquilibrium::lle_flash(
            &system,
            300.0 * KELVIN,
            &feed,
            None,
            SolverOptions::default(),
        )?;
        assert!(lle.converged());
        assert!(lle.two_phase);
        // ln((1 - x) / x) = 3 (1 - 2x)
        assert_relative_eq!(lle.phase_i().molefracs[0], 1.0 - 0.070_7, epsilon = 1e-3);
        assert_relative_eq!(lle.phase_ii().molefracs[0], 0.070_7, epsilon = 1e-3);
        assert!(lle.material_balance_residual(&feed) < 1e-4);
        Ok(())
    }

    #[test]
    fn ternary_split_satisfies_isoactivity() -> PhaseqResult<()> {
        let a = DMatrix::from_row_slice(
            3,
            3,
            &[0.0, 900.0, 100.0, 900.0, 0.0, 100.0, 100.0, 100.0, 0.0],
        );
        let system = EquilibriumSystem::new(Margules::new(a), components(3))?;
        let feed = DVector::from_vec(vec![0.4, 0.4, 0.2]);
        let lle = PhaseEquilibrium::lle_flash(
            &system,
            300.0 * KELVIN,
            &feed,
            None,
            SolverOptions::default(),
        )?;
        assert!(lle.converged());
        assert!(lle.two_phase);
        assert!(lle.beta() > 0.0 && lle.beta() < 1.0);
        assert!(lle.phase_i().molefracs[0] > lle.phase_ii().molefracs[0]);
        assert!(lle.material_balance_residual(&feed) < 1e-4);
        let res = system.lle_residual(300.0, &lle.phase_i().molefracs, &lle.phase_ii().molefracs);
        assert!(res.amax() < 1e-6);
        assert!(lle.convergence.warning().is_none());
        Ok(())
    }

    #[test]
    fn miscible_feed_is_single_phase() -> PhaseqResult<()> {
        let system = EquilibriumSystem::new(Margules::binary(900.0), components(2))?;
        let feed = DVector::from_vec(vec![0.03, 0.97]);
        let lle = PhaseEquilibrium::lle_flash(
            &system,
            300.0 * KELVIN,
            &feed,
            None,
            SolverOptions::default(),
        )?;
        assert!(lle.converged());
        assert!(!lle.two_phase);
        assert_eq!(
            lle.convergence.warning().as_deref(),
            Some("System completely miscible (1 stable phase).")
        );
        assert_relative_eq!(lle.phase_i().molefracs, feed, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn initial_state_is_used() -> PhaseqResult<()> {
        let system = EquilibriumSystem::new(Margules::binary(900.0), components(2))?;
        let feed = DVector::from_vec(vec![0.5, 0.5]);
        let t = 300.0 * KELVIN;
        let lle = PhaseEquilibrium::lle_flash(&system, t, &feed, None, SolverOptions::default())?;
        let feed2 = DVector::from_vec(vec![0.3, 0.7]);
        let lle2 =
            PhaseEquilibrium::lle_flash(&system, t, &feed2, Some(&lle), SolverOptions::default())?;
        assert!(lle2.two_phase);
        assert_relative_eq!(
            lle.phase_i().molefracs,
            lle2.phase_i().molefracs,
            epsilon = 1e-6
        );
        assert!(lle2.beta() > lle.beta());
        Ok(())
    }
}
