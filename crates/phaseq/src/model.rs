use crate::ideal::Ideal;
use crate::nrtl::Nrtl;
use crate::unifac::Unifac;
use crate::uniquac::Uniquac;
use nalgebra::DVector;
use num_dual::DualNum;
use phaseq_core::{ActivityModel, PhaseqError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Activity coefficient models that can be selected by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    Ideal,
    #[serde(rename = "NRTL")]
    Nrtl,
    #[serde(rename = "UNIQUAC")]
    Uniquac,
    #[serde(rename = "UNIFAC")]
    Unifac,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [Self::Ideal, Self::Nrtl, Self::Uniquac, Self::Unifac];

    /// Group contribution models only require the structure of the components.
    pub fn is_predictive(self) -> bool {
        matches!(self, Self::Ideal | Self::Unifac)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ideal => write!(f, "Ideal"),
            Self::Nrtl => write!(f, "NRTL"),
            Self::Uniquac => write!(f, "UNIQUAC"),
            Self::Unifac => write!(f, "UNIFAC"),
        }
    }
}

impl FromStr for ModelKind {
    type Err = PhaseqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ideal" => Ok(Self::Ideal),
            "nrtl" => Ok(Self::Nrtl),
            "uniquac" => Ok(Self::Uniquac),
            "unifac" => Ok(Self::Unifac),
            _ => Err(PhaseqError::UnknownModel(s.into())),
        }
    }
}

/// Collection of all activity coefficient models.
pub enum ActivityCoefficientModel {
    Ideal(Ideal),
    Nrtl(Nrtl),
    Uniquac(Uniquac),
    Unifac(Unifac),
}

impl ActivityCoefficientModel {
    pub fn kind(&self) -> ModelKind {
        match self {
            Self::Ideal(_) => ModelKind::Ideal,
            Self::Nrtl(_) => ModelKind::Nrtl,
            Self::Uniquac(_) => ModelKind::Uniquac,
            Self::Unifac(_) => ModelKind::Unifac,
        }
    }
}

impl From<Ideal> for ActivityCoefficientModel {
    fn from(model: Ideal) -> Self {
        Self::Ideal(model)
    }
}

impl From<Nrtl> for ActivityCoefficientModel {
    fn from(model: Nrtl) -> Self {
        Self::Nrtl(model)
    }
}

impl From<Uniquac> for ActivityCoefficientModel {
    fn from(model: Uniquac) -> Self {
        Self::Uniquac(model)
    }
}

impl From<Unifac> for ActivityCoefficientModel {
    fn from(model: Unifac) -> Self {
        Self::Unifac(model)
    }
}

impl ActivityModel for ActivityCoefficientModel {
    fn components(&self) -> usize {
        match self {
            Self::Ideal(m) => m.components(),
            Self::Nrtl(m) => m.components(),
            Self::Uniquac(m) => m.components(),
            Self::Unifac(m) => m.components(),
        }
    }

    fn ln_gamma<D: DualNum<f64> + Copy>(
        &self,
        temperature: D,
        molefracs: &DVector<D>,
    ) -> DVector<D> {
        match self {
            Self::Ideal(m) => m.ln_gamma(temperature, molefracs),
            Self::Nrtl(m) => m.ln_gamma(temperature, molefracs),
            Self::Uniquac(m) => m.ln_gamma(temperature, molefracs),
            Self::Unifac(m) => m.ln_gamma(temperature, molefracs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_model_names() {
        assert_eq!("nrtl".parse::<ModelKind>().unwrap(), ModelKind::Nrtl);
        assert_eq!(" UNIQUAC ".parse::<ModelKind>().unwrap(), ModelKind::Uniquac);
        assert_eq!("Unifac".parse::<ModelKind>().unwrap(), ModelKind::Unifac);
        for kind in ModelKind::ALL {
            assert_eq!(kind.to_string().parse::<ModelKind>().unwrap(), kind);
        }
        assert!(matches!(
            "Wilson".parse::<ModelKind>(),
            Err(PhaseqError::UnknownModel(m)) if m == "Wilson"
        ));
        assert_eq!(serde_json::to_string(&ModelKind::Nrtl).unwrap(), "\"NRTL\"");
    }
}
