//! Original UNIFAC group contribution method of
//! [Fredenslund et al., 1975](https://doi.org/10.1002/aic.690210607).
use nalgebra::{DMatrix, DVector};
use num_dual::DualNum;
use phaseq_core::ActivityModel;

mod parameters;
pub use parameters::{UnifacBinaryRecord, UnifacGroupRecord, UnifacParameters, check_groups};

/// UNIFAC excess Gibbs energy model.
pub struct Unifac {
    pub parameters: UnifacParameters,
    /// component volume parameters $r_i = \sum_k \nu_{ki} R_k$
    r: DVector<f64>,
    /// component surface parameters $q_i = \sum_k \nu_{ki} Q_k$
    q: DVector<f64>,
}

impl Unifac {
    pub fn new(parameters: UnifacParameters) -> Self {
        let r = &parameters.counts * &parameters.r;
        let q = &parameters.counts * &parameters.q;
        Self { parameters, r, q }
    }

    /// Group activity coefficients $\ln\Gamma_k$ in a mixture of composition `molefracs`.
    fn ln_group_gamma<D: DualNum<f64> + Copy>(
        &self,
        psi: &DMatrix<D>,
        molefracs: &DVector<D>,
    ) -> DVector<D> {
        let p = &self.parameters;
        let k = p.groups.len();
        let groups = DVector::from_fn(k, |g, _| {
            (0..molefracs.len()).fold(D::from(0.0), |acc, i| {
                acc + molefracs[i] * p.counts[(i, g)]
            })
        });
        let qx = (0..k).fold(D::from(0.0), |acc, g| acc + groups[g] * p.q[g]);
        let theta = DVector::from_fn(k, |g, _| groups[g] * p.q[g] / qx);
        let theta_psi = DVector::from_fn(k, |n, _| {
            (0..k).fold(D::from(0.0), |acc, m| acc + theta[m] * psi[(m, n)])
        });
        DVector::from_fn(k, |g, _| {
            (-theta_psi[g].ln()
                - (0..k).fold(D::from(0.0), |acc, m| {
                    acc + theta[m] * psi[(g, m)] / theta_psi[m]
                })
                + 1.0)
                * p.q[g]
        })
    }
}

impl ActivityModel for Unifac {
    fn components(&self) -> usize {
        self.parameters.components()
    }

    fn ln_gamma<D: DualNum<f64> + Copy>(
        &self,
        temperature: D,
        molefracs: &DVector<D>,
    ) -> DVector<D> {
        let n = self.components();
        let k = self.parameters.groups.len();
        let t_inv = temperature.recip();
        let psi = DMatrix::from_fn(k, k, |m, l| (-t_inv * self.parameters.a[(m, l)]).exp());

        // combinatorial part
        let rx = (0..n).fold(D::from(0.0), |acc, i| acc + molefracs[i] * self.r[i]);
        let qx = (0..n).fold(D::from(0.0), |acc, i| acc + molefracs[i] * self.q[i]);

        // residual part relative to the pure components
        let ln_group = self.ln_group_gamma(&psi, molefracs);

        DVector::from_fn(n, |i, _| {
            let v = rx.recip() * self.r[i];
            let f = qx.recip() * self.q[i];
            let vf = v / f;
            let combinatorial =
                -v + v.ln() + 1.0 - (-vf + vf.ln() + 1.0) * (5.0 * self.q[i]);

            let pure = DVector::from_fn(n, |j, _| D::from(if i == j { 1.0 } else { 0.0 }));
            let ln_group_pure = self.ln_group_gamma(&psi, &pure);
            let residual = (0..k)
                .filter(|&g| self.parameters.counts[(i, g)] > 0.0)
                .fold(D::from(0.0), |acc, g| {
                    acc + (ln_group[g] - ln_group_pure[g]) * self.parameters.counts[(i, g)]
                });
            combinatorial + residual
        })
    }
}
