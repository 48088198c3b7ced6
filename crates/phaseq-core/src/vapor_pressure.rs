use crate::RGAS;
use crate::parameter::CriticalRecord;
use nalgebra::{DMatrix, DVector};
use num_dual::DualNum;
use serde::{Deserialize, Serialize};
use std::f64::consts::LN_10;

/// 1 mmHg in Pa.
const MMHG: f64 = 133.322368;

/// Coefficients of the Antoine equation
/// `log10(p_sat / mmHg) = a - b / (T / K + c)`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct AntoineRecord {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl AntoineRecord {
    pub fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    /// Natural logarithm of the vapor pressure in Pa.
    pub fn ln_vapor_pressure<D: DualNum<f64> + Copy>(&self, temperature: D) -> D {
        (-(temperature + self.c).recip() * self.b + self.a) * LN_10 + MMHG.ln()
    }

    /// Vapor pressure in Pa.
    pub fn vapor_pressure<D: DualNum<f64> + Copy>(&self, temperature: D) -> D {
        self.ln_vapor_pressure(temperature).exp()
    }

    /// Temperature in K at which the vapor pressure equals `pressure` (in Pa).
    pub fn saturation_temperature(&self, pressure: f64) -> f64 {
        self.b / (self.a - (pressure / MMHG).log10()) - self.c
    }
}

/// Model for the non-ideality of the vapor phase.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VaporPhase {
    /// Ideal gas, all fugacity coefficients are unity.
    #[default]
    Ideal,
    /// Virial equation truncated after the second coefficient.
    Virial,
}

/// Second virial coefficients in m³/mol from the
/// Pitzer correlation with the Abbott functions.
pub fn second_virial_coefficients(temperature: f64, critical: &[CriticalRecord]) -> DMatrix<f64> {
    let n = critical.len();
    DMatrix::from_fn(n, n, |i, j| {
        let (ci, cj) = (critical[i], critical[j]);
        let tc = (ci.tc * cj.tc).sqrt();
        let pc = 0.5 * (ci.pc + cj.pc);
        let omega = 0.5 * (ci.acentric_factor + cj.acentric_factor);
        let tr = temperature / tc;
        let b0 = 0.083 - 0.422 / tr.powf(1.6);
        let b1 = 0.139 - 0.172 / tr.powf(4.2);
        RGAS * tc / pc * (b0 + omega * b1)
    })
}

/// Logarithm of the correction `Φ_i = φ_i(T, p, y) / φ_i^sat(T)`
/// that enters `y_i Φ_i p = x_i γ_i p_sat,i`.
pub fn ln_vapor_correction(
    temperature: f64,
    pressure: f64,
    vapor_molefracs: &DVector<f64>,
    vapor_pressures: &DVector<f64>,
    second_virial: &DMatrix<f64>,
) -> DVector<f64> {
    let rt = RGAS * temperature;
    let by = second_virial * vapor_molefracs;
    let b_mix = vapor_molefracs.dot(&by);
    DVector::from_fn(vapor_molefracs.len(), |i, _| {
        ((2.0 * by[i] - b_mix) * pressure - second_virial[(i, i)] * vapor_pressures[i]) / rt
    })
}
