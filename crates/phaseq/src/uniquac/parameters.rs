use phaseq_core::parameter::{Parameters, ReversibleRecord};
use serde::{Deserialize, Serialize};

/// UNIQUAC size parameters of a pure substance.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct UniquacRecord {
    /// relative van der Waals volume
    pub r: f64,
    /// relative van der Waals surface area
    pub q: f64,
}

impl UniquacRecord {
    pub fn new(r: f64, q: f64) -> Self {
        Self { r, q }
    }
}

/// UNIQUAC interaction parameters of a binary pair in K.
///
/// $\tau_{ij} = \exp\left(-\frac{a_{ij}}{T}\right)$
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct UniquacBinaryRecord {
    pub a12: f64,
    pub a21: f64,
}

impl UniquacBinaryRecord {
    pub fn new(a12: f64, a21: f64) -> Self {
        Self { a12, a21 }
    }
}

impl ReversibleRecord for UniquacBinaryRecord {
    fn reversed(&self) -> Self {
        Self::new(self.a21, self.a12)
    }
}

/// Parameter set required for the UNIQUAC model.
pub type UniquacParameters = Parameters<UniquacRecord, UniquacBinaryRecord>;
