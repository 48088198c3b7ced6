//! Ideal liquid mixture.
use nalgebra::DVector;
use num_dual::DualNum;
use phaseq_core::ActivityModel;

/// Ideal solution, all activity coefficients are unity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ideal {
    components: usize,
}

impl Ideal {
    pub fn new(components: usize) -> Self {
        Self { components }
    }
}

impl ActivityModel for Ideal {
    fn components(&self) -> usize {
        self.components
    }

    fn ln_gamma<D: DualNum<f64> + Copy>(&self, _: D, molefracs: &DVector<D>) -> DVector<D> {
        DVector::from_element(molefracs.len(), D::from(0.0))
    }
}
