//! Non-random two-liquid (NRTL) model of
//! [Renon and Prausnitz, 1968](https://doi.org/10.1002/aic.690140124).
use nalgebra::{DMatrix, DVector};
use num_dual::DualNum;
use phaseq_core::ActivityModel;

mod parameters;
pub use parameters::{NrtlBinaryRecord, NrtlParameters};

/// NRTL excess Gibbs energy model.
pub struct Nrtl {
    pub parameters: NrtlParameters,
    pub a: DMatrix<f64>,
    pub b: DMatrix<f64>,
    pub alpha: DMatrix<f64>,
}

impl Nrtl {
    pub fn new(parameters: NrtlParameters) -> Self {
        let [a, b, alpha] = parameters.collate_binary(|br| {
            [
                (br.a12, br.a21),
                (br.b12, br.b21),
                (br.alpha, br.alpha),
            ]
        });
        Self {
            parameters,
            a,
            b,
            alpha,
        }
    }
}

impl ActivityModel for Nrtl {
    fn components(&self) -> usize {
        self.parameters.components()
    }

    fn ln_gamma<D: DualNum<f64> + Copy>(
        &self,
        temperature: D,
        molefracs: &DVector<D>,
    ) -> DVector<D> {
        let n = self.components();
        let t_inv = temperature.recip();
        let tau = DMatrix::from_fn(n, n, |i, j| t_inv * self.b[(i, j)] + self.a[(i, j)]);
        let g = DMatrix::from_fn(n, n, |i, j| (-tau[(i, j)] * self.alpha[(i, j)]).exp());

        // Σ_k x_k G_kj and Σ_k x_k τ_kj G_kj / Σ_k x_k G_kj
        let xg = DVector::from_fn(n, |j, _| {
            (0..n).fold(D::from(0.0), |acc, k| acc + molefracs[k] * g[(k, j)])
        });
        let eps = DVector::from_fn(n, |j, _| {
            (0..n).fold(D::from(0.0), |acc, k| {
                acc + molefracs[k] * g[(k, j)] * tau[(k, j)]
            }) / xg[j]
        });

        DVector::from_fn(n, |i, _| {
            (0..n).fold(eps[i], |acc, j| {
                acc + molefracs[j] * g[(i, j)] / xg[j] * (tau[(i, j)] - eps[j])
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::dvector;
    use phaseq_core::parameter::{BinaryRecord, Identifier, PureRecord};

    fn parameters(records: &[(usize, usize, NrtlBinaryRecord)], n: usize) -> NrtlParameters {
        let pure = (0..n)
            .map(|i| PureRecord::new(Identifier::from_name(&format!("{i}")), 0.0, ()))
            .collect();
        let binary = records
            .iter()
            .map(|&(i, j, r)| BinaryRecord::new(i, j, Some(r)))
            .collect();
        NrtlParameters::new(pure, binary).unwrap()
    }

    fn methanol_water() -> Nrtl {
        Nrtl::new(parameters(
            &[(0, 1, NrtlBinaryRecord::from_energies(-39.56, 196.24, 0.3))],
            2,
        ))
    }

    #[test]
    fn binary_reference_values() {
        let nrtl = methanol_water();
        let gamma = nrtl.activity_coefficients(298.15, &dvector![0.3, 0.7]);
        assert_relative_eq!(gamma[0], 1.2436479110100132, max_relative = 1e-10);
        assert_relative_eq!(gamma[1], 1.052268191312935, max_relative = 1e-10);
    }

    #[test]
    fn infinite_dilution() {
        let nrtl = methanol_water();
        let t = 320.0;
        let ln_gamma = nrtl.ln_gamma(t, &dvector![0.0, 1.0]);
        // ln γ_1^∞ = τ_21 + τ_12 G_12
        let tau12 = -39.56 / t;
        let tau21 = 196.24 / t;
        assert_relative_eq!(
            ln_gamma[0],
            tau21 + tau12 * (-0.3 * tau12).exp(),
            max_relative = 1e-12
        );
        assert_relative_eq!(ln_gamma[1], 0.0, epsilon = 1e-14);
    }

    #[test]
    fn gibbs_duhem() {
        let nrtl = Nrtl::new(parameters(
            &[
                (0, 1, NrtlBinaryRecord::from_energies(1486.53, 778.88, 0.3)),
                (0, 2, NrtlBinaryRecord::from_energies(-94.78, 548.15, 0.3)),
                (1, 2, NrtlBinaryRecord::new(0.1, -0.2, 212.89, -48.34, 0.3)),
            ],
            3,
        ));
        let x = dvector![0.3, 0.4, 0.3];
        let jac = nrtl.dln_gamma_dnj(298.15, &x);
        for j in 0..3 {
            let sum: f64 = (0..3).map(|i| x[i] * jac[(i, j)]).sum();
            assert_relative_eq!(sum, 0.0, epsilon = 1e-12);
        }
        assert_relative_eq!(jac[(0, 2)], jac[(2, 0)], max_relative = 1e-10);
        let gamma = nrtl.activity_coefficients(298.15, &x);
        assert!(gamma.iter().all(|&g| g > 0.0));
    }
}
