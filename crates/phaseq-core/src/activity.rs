use nalgebra::{DMatrix, DVector};
use num_dual::{Dual64, DualNum, first_derivative};

/// Excess Gibbs energy models that provide activity coefficients.
///
/// Implementors only provide the logarithmic activity coefficients as
/// a generic function of temperature and composition. Derivatives with
/// respect to temperature and mole numbers are obtained with dual numbers.
pub trait ActivityModel {
    /// Number of components of the mixture.
    fn components(&self) -> usize;

    /// Logarithm of the activity coefficients.
    fn ln_gamma<D: DualNum<f64> + Copy>(&self, temperature: D, molefracs: &DVector<D>)
    -> DVector<D>;

    /// Activity coefficients at temperature `temperature` (in K).
    fn activity_coefficients(&self, temperature: f64, molefracs: &DVector<f64>) -> DVector<f64> {
        self.ln_gamma(temperature, molefracs).map(f64::exp)
    }

    /// Derivative of the logarithmic activity coefficients with respect to mole numbers.
    ///
    /// The element `(i, j)` is `∂ln γ_i / ∂n_j` at constant temperature and `n_k≠j`.
    /// The argument does not need to be normalized.
    fn dln_gamma_dnj(&self, temperature: f64, moles: &DVector<f64>) -> DMatrix<f64> {
        let n = self.components();
        let t = Dual64::from(temperature);
        let mut jacobian = DMatrix::zeros(n, n);
        for j in 0..n {
            let moles = DVector::from_fn(n, |i, _| {
                Dual64::new(moles[i], if i == j { 1.0 } else { 0.0 })
            });
            let total = moles.sum();
            let molefracs = moles.map(|m| m / total);
            let ln_gamma = self.ln_gamma(t, &molefracs);
            jacobian.set_column(j, &ln_gamma.map(|g| g.eps));
        }
        jacobian
    }

    /// Derivative of the logarithmic activity coefficients with respect to temperature.
    fn dln_gamma_dt(&self, temperature: f64, molefracs: &DVector<f64>) -> DVector<f64> {
        DVector::from_fn(self.components(), |i, _| {
            first_derivative(
                |t: Dual64| self.ln_gamma(t, &molefracs.map(Dual64::from))[i],
                temperature,
            )
            .1
        })
    }

    /// Molar Gibbs energy of mixing divided by RT.
    fn gibbs_energy_of_mixing(&self, temperature: f64, molefracs: &DVector<f64>) -> f64 {
        let ln_gamma = self.ln_gamma(temperature, molefracs);
        molefracs
            .iter()
            .zip(ln_gamma.iter())
            .filter(|&(&x, _)| x > 0.0)
            .map(|(&x, &g)| x * (x.ln() + g))
            .sum()
    }
}

#[cfg(test)]
pub mod utils {
    use super::*;

    /// Two-suffix Margules model `g^E / RT = Σ_ij x_i x_j a_ij / (2T)` with symmetric `a_ij` in K.
    pub struct Margules {
        pub a: DMatrix<f64>,
    }

    impl Margules {
        pub fn new(a: DMatrix<f64>) -> Self {
            Self { a }
        }

        /// Binary system that splits into two liquids below `T = a / 2`.
        pub fn binary(a: f64) -> Self {
            Self::new(DMatrix::from_row_slice(2, 2, &[0.0, a, a, 0.0]))
        }
    }

    impl ActivityModel for Margules {
        fn components(&self) -> usize {
            self.a.nrows()
        }

        fn ln_gamma<D: DualNum<f64> + Copy>(
            &self,
            temperature: D,
            molefracs: &DVector<D>,
        ) -> DVector<D> {
            let n = self.components();
            let t_inv = temperature.recip();
            let ax = DVector::from_fn(n, |i, _| {
                (0..n).fold(D::from(0.0), |acc, j| acc + molefracs[j] * self.a[(i, j)])
            });
            let xax = (0..n).fold(D::from(0.0), |acc, i| acc + molefracs[i] * ax[i]);
            DVector::from_fn(n, |i, _| (ax[i] - xax * 0.5) * t_inv)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::utils::Margules;
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn margules_binary_limits() {
        let model = Margules::binary(600.0);
        let x = DVector::from_vec(vec![1e-12, 1.0 - 1e-12]);
        let ln_gamma = model.ln_gamma(300.0, &x);
        assert_relative_eq!(ln_gamma[0], 2.0, max_relative = 1e-9);
        assert_relative_eq!(ln_gamma[1], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn gibbs_duhem() {
        let model = Margules::new(DMatrix::from_row_slice(
            3,
            3,
            &[0.0, 500.0, 200.0, 500.0, 0.0, -150.0, 200.0, -150.0, 0.0],
        ));
        let x = DVector::from_vec(vec![0.2, 0.5, 0.3]);
        let jac = model.dln_gamma_dnj(320.0, &x);
        for j in 0..3 {
            let sum: f64 = (0..3).map(|i| x[i] * jac[(i, j)]).sum();
            assert_relative_eq!(sum, 0.0, epsilon = 1e-12);
        }
        // symmetric for models derived from a Gibbs energy
        assert_relative_eq!(jac[(0, 1)], jac[(1, 0)], max_relative = 1e-10);
    }

    #[test]
    fn temperature_derivative() {
        let model = Margules::binary(600.0);
        let x = DVector::from_vec(vec![0.3, 0.7]);
        let dt = model.dln_gamma_dt(300.0, &x);
        let ln_gamma = model.ln_gamma(300.0, &x);
        assert_relative_eq!(dt[0], -ln_gamma[0] / 300.0, max_relative = 1e-12);
    }

    #[test]
    fn ideal_gibbs_energy_of_mixing() {
        let model = Margules::binary(0.0);
        let x = DVector::from_vec(vec![0.5, 0.5]);
        assert_relative_eq!(
            model.gibbs_energy_of_mixing(300.0, &x),
            -std::f64::consts::LN_2,
            max_relative = 1e-14
        );
    }
}
