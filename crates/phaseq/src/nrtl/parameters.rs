use num_traits::Zero;
use phaseq_core::parameter::{Parameters, ReversibleRecord};
use serde::{Deserialize, Serialize};

/// NRTL parameters of a binary pair.
///
/// $\tau_{ij} = a_{ij} + \frac{b_{ij}}{T}$, $G_{ij} = \exp(-\alpha_{ij}\tau_{ij})$
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct NrtlBinaryRecord {
    /// dimensionless part of $\tau_{12}$
    #[serde(default)]
    #[serde(skip_serializing_if = "f64::is_zero")]
    pub a12: f64,
    /// dimensionless part of $\tau_{21}$
    #[serde(default)]
    #[serde(skip_serializing_if = "f64::is_zero")]
    pub a21: f64,
    /// temperature dependent part of $\tau_{12}$ in K
    #[serde(default)]
    #[serde(skip_serializing_if = "f64::is_zero")]
    pub b12: f64,
    /// temperature dependent part of $\tau_{21}$ in K
    #[serde(default)]
    #[serde(skip_serializing_if = "f64::is_zero")]
    pub b21: f64,
    /// non-randomness parameter
    pub alpha: f64,
}

impl NrtlBinaryRecord {
    pub fn new(a12: f64, a21: f64, b12: f64, b21: f64, alpha: f64) -> Self {
        Self {
            a12,
            a21,
            b12,
            b21,
            alpha,
        }
    }

    /// Parameters with temperature-dependent interactions only.
    pub fn from_energies(b12: f64, b21: f64, alpha: f64) -> Self {
        Self::new(0.0, 0.0, b12, b21, alpha)
    }
}

impl ReversibleRecord for NrtlBinaryRecord {
    fn reversed(&self) -> Self {
        Self::new(self.a21, self.a12, self.b21, self.b12, self.alpha)
    }
}

/// Parameter set required for the NRTL model.
pub type NrtlParameters = Parameters<(), NrtlBinaryRecord>;
