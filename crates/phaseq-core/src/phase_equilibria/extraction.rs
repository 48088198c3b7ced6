use super::{PhaseEquilibrium, SolverStatus, normalize};
use crate::activity::ActivityModel;
use crate::equilibrium_system::EquilibriumSystem;
use crate::errors::{PhaseqError, PhaseqResult};
use crate::state::PhaseState;
use crate::SolverOptions;
use nalgebra::DVector;
use quantity::Temperature;
use serde::{Deserialize, Serialize};

const SOLVENT_FREE: f64 = 1e-6;
const MIN_EXTRACTION_FACTOR: f64 = 0.5;
const UNIT_EXTRACTION_FACTOR: f64 = 1e-6;

/// Design specification of a countercurrent extraction cascade.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionTarget {
    /// Fraction of the solute that is transferred to the extract.
    Recovery(f64),
    /// Number of real stages.
    Stages(usize),
}

/// Number of theoretical stages that achieve the recovery `recovery`
/// with extraction factor `extraction_factor` (Kremser-Souders-Brown).
///
/// Returns `None` if the recovery can not be reached with any number of stages.
pub fn kremser_stages(extraction_factor: f64, recovery: f64) -> Option<f64> {
    let e = extraction_factor;
    if recovery <= 0.0 {
        return Some(0.0);
    }
    if recovery >= 1.0 || e <= 0.0 {
        return None;
    }
    if (e - 1.0).abs() < UNIT_EXTRACTION_FACTOR {
        return Some(recovery / (1.0 - recovery));
    }
    if e < 1.0 && recovery >= e {
        return None;
    }
    let arg = (1.0 - 1.0 / e) / (1.0 - recovery) + 1.0 / e;
    Some(arg.ln() / e.ln())
}

/// Fraction of the solute recovered in `stages` theoretical stages.
pub fn kremser_recovery(extraction_factor: f64, stages: f64) -> f64 {
    let e = extraction_factor;
    if (e - 1.0).abs() < UNIT_EXTRACTION_FACTOR {
        return stages / (stages + 1.0);
    }
    let e_n = e.powf(stages + 1.0);
    ((e_n - e) / (e_n - 1.0)).clamp(0.0, 1.0)
}

/// Liquid-liquid extraction of a solute from a feed with a pure solvent.
///
/// The phase split is calculated at the mixing point of feed and solvent.
/// The extract is the phase richer in solvent.
#[derive(Clone, Debug)]
pub struct Extraction {
    pub feed: DVector<f64>,
    pub solvent_to_feed: f64,
    pub efficiency: f64,
    pub target: ExtractionTarget,
    pub solvent: usize,
    /// Most abundant component of the feed.
    pub diluent: usize,
    pub solute: Option<usize>,
    pub mixing_point: DVector<f64>,
    pub equilibrium: PhaseEquilibrium<2>,
    extract_phase: usize,
    /// Ratio of the solute mole fractions in extract and raffinate.
    pub distribution_coefficient: Option<f64>,
    pub extraction_factor: Option<f64>,
    pub theoretical_stages: Option<f64>,
    /// Theoretical stages divided by the stage efficiency.
    pub actual_stages: Option<f64>,
    pub rounded_stages: Option<usize>,
    /// Recovery of the rounded design.
    pub recovery: Option<f64>,
}

impl Extraction {
    /// Design an extraction cascade at temperature `temperature`.
    ///
    /// The solvent is the component absent from the feed. If no solute is
    /// given, the component (other than solvent and diluent) with the lowest
    /// distribution coefficient is used.
    #[expect(clippy::too_many_arguments)]
    pub fn new<A: ActivityModel>(
        system: &EquilibriumSystem<A>,
        temperature: Temperature,
        feed: &DVector<f64>,
        solvent_to_feed: f64,
        efficiency: f64,
        target: ExtractionTarget,
        solute: Option<usize>,
        options: SolverOptions,
    ) -> PhaseqResult<Self> {
        system.validate_molefracs(feed)?;
        let n = system.components();
        if !(solvent_to_feed > 0.0 && solvent_to_feed.is_finite()) {
            return Err(PhaseqError::InvalidState(
                "extraction".into(),
                "solvent to feed ratio".into(),
                solvent_to_feed,
            ));
        }
        if !(efficiency > 0.0 && efficiency <= 1.0) {
            return Err(PhaseqError::InvalidState(
                "extraction".into(),
                "stage efficiency".into(),
                efficiency,
            ));
        }
        if let ExtractionTarget::Recovery(r) = target
            && !(r > 0.0 && r < 1.0)
        {
            return Err(PhaseqError::InvalidState(
                "extraction".into(),
                "target recovery".into(),
                r,
            ));
        }
        if let Some(i) = solute
            && i >= n
        {
            return Err(PhaseqError::InvalidState(
                "extraction".into(),
                "solute".into(),
                i as f64,
            ));
        }

        let feed = normalize(feed.clone());
        let least_abundant = feed.argmin().0;
        let solvent = (0..n).find(|&i| feed[i] < SOLVENT_FREE);
        let diluent = feed.argmax().0;
        let mut warnings = Vec::new();
        let solvent = solvent.unwrap_or_else(|| {
            warnings.push(format!(
                "The feed contains no pure solvent, component {} is used as solvent.",
                least_abundant + 1
            ));
            least_abundant
        });

        let mut mixing_point = feed.clone();
        mixing_point[solvent] += solvent_to_feed;
        let mixing_point = mixing_point / (1.0 + solvent_to_feed);

        let mut equilibrium =
            PhaseEquilibrium::lle_flash(system, temperature, &mixing_point, None, options)?;
        equilibrium.convergence.warnings.extend(warnings);
        let extract_phase =
            if equilibrium.phases[1].molefracs[solvent] > equilibrium.phases[0].molefracs[solvent] {
                1
            } else {
                0
            };
        let mut res = Self {
            feed,
            solvent_to_feed,
            efficiency,
            target,
            solvent,
            diluent,
            solute,
            mixing_point,
            equilibrium,
            extract_phase,
            distribution_coefficient: None,
            extraction_factor: None,
            theoretical_stages: None,
            actual_stages: None,
            rounded_stages: None,
            recovery: None,
        };

        if !res.equilibrium.two_phase {
            res.fail("System remains miscible after solvent addition.");
            return Ok(res);
        }

        let k = res.extract().molefracs.component_div(&res.raffinate().molefracs);
        let solute = solute.or_else(|| {
            (0..n)
                .filter(|&i| i != solvent && i != diluent && k[i].is_finite())
                .min_by(|&i, &j| k[i].total_cmp(&k[j]))
        });
        let Some(solute) = solute else {
            res.fail("No solute besides solvent and diluent.");
            return Ok(res);
        };
        res.solute = Some(solute);
        let k = k[solute];
        let e = k * solvent_to_feed;
        res.distribution_coefficient = Some(k);
        res.extraction_factor = Some(e);

        if e < MIN_EXTRACTION_FACTOR {
            res.fail(format!(
                "Extraction infeasible: extraction factor E = {e:.4} is below {MIN_EXTRACTION_FACTOR} (K = {k:.4})."
            ));
            return Ok(res);
        }
        if e < 1.0 {
            res.equilibrium
                .convergence
                .warn(format!("Unfavorable extraction factor E = {e:.4} < 1."));
        }

        match target {
            ExtractionTarget::Recovery(r) => {
                let Some(stages) = kremser_stages(e, r) else {
                    res.fail(format!(
                        "A recovery of {r} can not be reached with extraction factor E = {e:.4}."
                    ));
                    return Ok(res);
                };
                let actual = stages / efficiency;
                let rounded = actual.ceil().max(1.0) as usize;
                res.theoretical_stages = Some(stages);
                res.actual_stages = Some(actual);
                res.rounded_stages = Some(rounded);
                res.recovery = Some(kremser_recovery(e, rounded as f64 * efficiency));
            }
            ExtractionTarget::Stages(stages) => {
                let theoretical = stages as f64 * efficiency;
                res.theoretical_stages = Some(theoretical);
                res.actual_stages = Some(stages as f64);
                res.rounded_stages = Some(stages);
                res.recovery = Some(kremser_recovery(e, theoretical));
            }
        }
        Ok(res)
    }

    fn fail<S: Into<String>>(&mut self, warning: S) {
        let convergence = &mut self.equilibrium.convergence;
        if convergence.status == SolverStatus::Converged {
            convergence.status = SolverStatus::NonConverged;
        }
        convergence.warn(warning);
    }

    /// Whether the phase split converged and a feasible cascade was found.
    pub fn converged(&self) -> bool {
        self.equilibrium.converged()
    }

    pub fn two_phase(&self) -> bool {
        self.equilibrium.two_phase
    }

    pub fn extract(&self) -> &PhaseState {
        &self.equilibrium.phases[self.extract_phase]
    }

    pub fn raffinate(&self) -> &PhaseState {
        &self.equilibrium.phases[1 - self.extract_phase]
    }

    pub fn warning(&self) -> Option<String> {
        self.equilibrium.convergence.warning()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::utils::Margules;
    use crate::parameter::{ComponentRecord, Identifier};
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;
    use quantity::KELVIN;

    #[test]
    fn kremser_limits() {
        // one theoretical stage with E = 1 recovers half of the solute
        assert_relative_eq!(kremser_recovery(1.0, 1.0), 0.5);
        assert_relative_eq!(kremser_stages(1.0, 0.5).unwrap_or(0.0), 1.0);
        // unreachable recovery for E < 1
        assert!(kremser_stages(0.8, 0.85).is_none());
        assert!(kremser_stages(2.0, 1.0).is_none());
    }

    #[test]
    fn kremser_stages_invert_recovery() {
        for e in [0.7, 1.5, 3.0] {
            for n in [1.0, 2.5, 6.0] {
                let r = kremser_recovery(e, n);
                assert_relative_eq!(kremser_stages(e, r).unwrap_or(0.0), n, max_relative = 1e-10);
            }
        }
    }

    #[test]
    fn stages_increase_with_recovery() {
        let mut last = 0.0;
        for r in [0.5, 0.7, 0.9, 0.95, 0.99, 0.999] {
            let n = kremser_stages(1.8, r).unwrap_or(f64::INFINITY);
            assert!(n >= last);
            last = n;
        }
    }

    fn system() -> EquilibriumSystem<Margules> {
        // diluent, solute, solvent
        let a = DMatrix::from_row_slice(
            3,
            3,
            &[0.0, 300.0, 900.0, 300.0, 0.0, 0.0, 900.0, 0.0, 0.0],
        );
        let components = ["Diluent", "Solute", "Solvent"]
            .iter()
            .map(|n| ComponentRecord::new(Identifier::from_name(n), 0.0))
            .collect();
        EquilibriumSystem::new(Margules::new(a), components).expect("consistent system")
    }

    #[test]
    fn extraction_with_target_recovery() -> PhaseqResult<()> {
        let feed = DVector::from_vec(vec![0.7, 0.3, 0.0]);
        let res = Extraction::new(
            &system(),
            300.0 * KELVIN,
            &feed,
            1.0,
            0.8,
            ExtractionTarget::Recovery(0.95),
            None,
            SolverOptions::default(),
        )?;
        assert!(res.converged());
        assert!(res.two_phase());
        assert_eq!(res.solvent, 2);
        assert_eq!(res.diluent, 0);
        assert_eq!(res.solute, Some(1));
        assert!(res.extract().molefracs[2] > res.raffinate().molefracs[2]);
        let k = res.distribution_coefficient.unwrap_or(0.0);
        assert!(k > 1.0);
        let theoretical = res.theoretical_stages.unwrap_or(0.0);
        let actual = res.actual_stages.unwrap_or(0.0);
        assert_relative_eq!(actual, theoretical / 0.8);
        assert!(res.rounded_stages.unwrap_or(0) as f64 >= actual);
        assert!(res.recovery.unwrap_or(0.0) >= 0.95);
        Ok(())
    }

    #[test]
    fn extraction_with_fixed_stages() -> PhaseqResult<()> {
        let feed = DVector::from_vec(vec![0.7, 0.3, 0.0]);
        let res = Extraction::new(
            &system(),
            300.0 * KELVIN,
            &feed,
            1.0,
            1.0,
            ExtractionTarget::Stages(3),
            Some(1),
            SolverOptions::default(),
        )?;
        let e = res.extraction_factor.unwrap_or(0.0);
        assert_relative_eq!(res.recovery.unwrap_or(0.0), kremser_recovery(e, 3.0));
        Ok(())
    }

    #[test]
    fn invalid_efficiency() {
        let feed = DVector::from_vec(vec![0.7, 0.3, 0.0]);
        let res = Extraction::new(
            &system(),
            300.0 * KELVIN,
            &feed,
            1.0,
            1.5,
            ExtractionTarget::Stages(3),
            None,
            SolverOptions::default(),
        );
        assert!(res.is_err());
    }
}
