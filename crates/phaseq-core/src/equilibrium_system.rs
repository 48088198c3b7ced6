use crate::activity::ActivityModel;
use crate::errors::{PhaseqError, PhaseqResult};
use crate::parameter::{ComponentRecord, CriticalRecord, FusionRecord};
use crate::vapor_pressure::{
    AntoineRecord, VaporPhase, ln_vapor_correction, second_virial_coefficients,
};
use nalgebra::DVector;
use num_dual::DualNum;

/// Largest tolerated deviation of a supplied composition from unity.
pub(crate) const COMPOSITION_TOL: f64 = 1e-3;

/// An activity coefficient model together with the pure component
/// properties required to formulate phase equilibrium conditions.
pub struct EquilibriumSystem<A> {
    pub model: A,
    pub components: Vec<ComponentRecord>,
    pub vapor_phase: VaporPhase,
}

impl<A: ActivityModel> EquilibriumSystem<A> {
    /// Combine a model with component records in the same order.
    pub fn new(model: A, components: Vec<ComponentRecord>) -> PhaseqResult<Self> {
        if model.components() != components.len() {
            return Err(PhaseqError::IncompatibleComponents(
                model.components(),
                components.len(),
            ));
        }
        Ok(Self {
            model,
            components,
            vapor_phase: VaporPhase::default(),
        })
    }

    pub fn with_vapor_phase(mut self, vapor_phase: VaporPhase) -> Self {
        self.vapor_phase = vapor_phase;
        self
    }

    pub fn components(&self) -> usize {
        self.components.len()
    }

    pub fn names(&self) -> Vec<String> {
        self.components.iter().map(ComponentRecord::name).collect()
    }

    /// Antoine coefficients of all components.
    pub fn antoine(&self) -> PhaseqResult<Vec<AntoineRecord>> {
        self.components
            .iter()
            .map(|c| c.antoine.ok_or_else(|| missing(c, "Antoine coefficients")))
            .collect()
    }

    /// Critical data of all components.
    pub fn critical(&self) -> PhaseqResult<Vec<CriticalRecord>> {
        self.components
            .iter()
            .map(|c| c.critical.ok_or_else(|| missing(c, "critical data")))
            .collect()
    }

    /// Fusion data of component `i`.
    pub fn fusion(&self, i: usize) -> PhaseqResult<FusionRecord> {
        self.components[i]
            .fusion
            .ok_or_else(|| missing(&self.components[i], "fusion data"))
    }

    /// Vapor pressures in Pa.
    pub fn vapor_pressures(&self, temperature: f64) -> PhaseqResult<DVector<f64>> {
        Ok(self.saturation()?.vapor_pressures(temperature))
    }

    /// Check the length, sign and normalization of a composition.
    pub fn validate_molefracs(&self, molefracs: &DVector<f64>) -> PhaseqResult<()> {
        if molefracs.len() != self.components() {
            return Err(PhaseqError::IncompatibleComponents(
                self.components(),
                molefracs.len(),
            ));
        }
        validate_composition(molefracs.as_slice())
    }

    pub fn activity_coefficients(
        &self,
        temperature: f64,
        molefracs: &DVector<f64>,
    ) -> DVector<f64> {
        self.model.activity_coefficients(temperature, molefracs)
    }

    /// Residuals `ln(x_i γ_i p_sat,i) - ln(y_i Φ_i p)` of the isofugacity conditions.
    pub fn vle_residual(
        &self,
        temperature: f64,
        pressure: f64,
        liquid_molefracs: &DVector<f64>,
        vapor_molefracs: &DVector<f64>,
    ) -> PhaseqResult<DVector<f64>> {
        let saturation = self.saturation()?;
        let psat = saturation.vapor_pressures(temperature);
        let ln_phi = saturation.ln_correction(temperature, pressure, vapor_molefracs, &psat);
        let ln_gamma = self.model.ln_gamma(temperature, liquid_molefracs);
        Ok(DVector::from_fn(self.components(), |i, _| {
            (liquid_molefracs[i] * psat[i]).ln() + ln_gamma[i]
                - (vapor_molefracs[i] * pressure).ln()
                - ln_phi[i]
        }))
    }

    /// Residuals `ln(x_i^I γ_i^I) - ln(x_i^II γ_i^II)` of the isoactivity conditions.
    pub fn lle_residual(
        &self,
        temperature: f64,
        molefracs_1: &DVector<f64>,
        molefracs_2: &DVector<f64>,
    ) -> DVector<f64> {
        let ln_gamma_1 = self.model.ln_gamma(temperature, molefracs_1);
        let ln_gamma_2 = self.model.ln_gamma(temperature, molefracs_2);
        DVector::from_fn(self.components(), |i, _| {
            molefracs_1[i].ln() + ln_gamma_1[i] - molefracs_2[i].ln() - ln_gamma_2[i]
        })
    }

    pub(crate) fn saturation(&self) -> PhaseqResult<Saturation> {
        let critical = match self.vapor_phase {
            VaporPhase::Ideal => None,
            VaporPhase::Virial => Some(self.critical()?),
        };
        Ok(Saturation {
            antoine: self.antoine()?,
            critical,
        })
    }
}

fn missing(component: &ComponentRecord, property: &str) -> PhaseqError {
    PhaseqError::MissingProperty {
        component: component.name(),
        property: property.into(),
    }
}

/// Check that mole fractions are non-negative and sum to one within `1e-3`.
pub fn validate_composition(molefracs: &[f64]) -> PhaseqResult<()> {
    if let Some(x) = molefracs.iter().find(|x| !x.is_finite() || **x < 0.0) {
        return Err(PhaseqError::InvalidComposition(format!(
            "mole fractions must be non-negative, got {x}"
        )));
    }
    let sum: f64 = molefracs.iter().sum();
    if (sum - 1.0).abs() > COMPOSITION_TOL {
        return Err(PhaseqError::InvalidComposition(format!(
            "mole fractions sum to {sum:.6} instead of 1"
        )));
    }
    Ok(())
}

/// Vapor pressures and vapor phase corrections of all components,
/// checked once before an iteration starts.
pub(crate) struct Saturation {
    pub antoine: Vec<AntoineRecord>,
    critical: Option<Vec<CriticalRecord>>,
}

impl Saturation {
    pub fn vapor_pressures(&self, temperature: f64) -> DVector<f64> {
        DVector::from_iterator(
            self.antoine.len(),
            self.antoine.iter().map(|a| a.vapor_pressure(temperature)),
        )
    }

    pub fn ln_vapor_pressures<D: DualNum<f64> + Copy>(&self, temperature: D) -> DVector<D> {
        DVector::from_iterator(
            self.antoine.len(),
            self.antoine.iter().map(|a| a.ln_vapor_pressure(temperature)),
        )
    }

    pub fn saturation_temperatures(&self, pressure: f64) -> DVector<f64> {
        DVector::from_iterator(
            self.antoine.len(),
            self.antoine.iter().map(|a| a.saturation_temperature(pressure)),
        )
    }

    pub fn is_ideal(&self) -> bool {
        self.critical.is_none()
    }

    /// `ln Φ_i`, zero for an ideal vapor phase.
    pub fn ln_correction(
        &self,
        temperature: f64,
        pressure: f64,
        vapor_molefracs: &DVector<f64>,
        vapor_pressures: &DVector<f64>,
    ) -> DVector<f64> {
        match &self.critical {
            None => DVector::zeros(vapor_molefracs.len()),
            Some(critical) => {
                let b = second_virial_coefficients(temperature, critical);
                ln_vapor_correction(temperature, pressure, vapor_molefracs, vapor_pressures, &b)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::utils::Margules;
    use crate::parameter::Identifier;

    fn system() -> EquilibriumSystem<Margules> {
        let components = vec![
            ComponentRecord::new(Identifier::from_name("A"), 0.0)
                .with_antoine(AntoineRecord::new(6.90565, 1211.033, -52.36)),
            ComponentRecord::new(Identifier::from_name("B"), 0.0),
        ];
        EquilibriumSystem::new(Margules::binary(300.0), components).expect("consistent system")
    }

    #[test]
    fn missing_antoine_is_reported() {
        match system().vapor_pressures(300.0) {
            Err(PhaseqError::MissingProperty { component, .. }) => assert_eq!(component, "B"),
            _ => panic!("expected missing property"),
        }
    }

    #[test]
    fn composition_validation() {
        let s = system();
        assert!(s.validate_molefracs(&DVector::from_vec(vec![0.4, 0.6005])).is_ok());
        assert!(matches!(
            s.validate_molefracs(&DVector::from_vec(vec![0.4, 0.7])),
            Err(PhaseqError::InvalidComposition(_))
        ));
        assert!(matches!(
            s.validate_molefracs(&DVector::from_vec(vec![-0.1, 1.1])),
            Err(PhaseqError::InvalidComposition(_))
        ));
        assert!(matches!(
            s.validate_molefracs(&DVector::from_vec(vec![0.2, 0.3, 0.5])),
            Err(PhaseqError::IncompatibleComponents(2, 3))
        ));
    }

    #[test]
    fn incompatible_model() {
        let result = EquilibriumSystem::new(Margules::binary(300.0), vec![]);
        assert!(matches!(
            result,
            Err(PhaseqError::IncompatibleComponents(2, 0))
        ));
    }
}
