//! Universal quasichemical (UNIQUAC) model of
//! [Abrams and Prausnitz, 1975](https://doi.org/10.1002/aic.690210115).
use nalgebra::{DMatrix, DVector};
use num_dual::DualNum;
use phaseq_core::ActivityModel;

mod parameters;
pub use parameters::{UniquacBinaryRecord, UniquacParameters, UniquacRecord};

/// Lattice coordination number.
const Z: f64 = 10.0;

/// UNIQUAC excess Gibbs energy model.
pub struct Uniquac {
    pub parameters: UniquacParameters,
    pub r: DVector<f64>,
    pub q: DVector<f64>,
    /// bulk factor $l_i = \frac{z}{2}(r_i - q_i) - (r_i - 1)$
    pub l: DVector<f64>,
    pub a: DMatrix<f64>,
}

impl Uniquac {
    pub fn new(parameters: UniquacParameters) -> Self {
        let [r, q] = parameters.collate(|pr| [pr.r, pr.q]);
        let [a] = parameters.collate_binary(|br| [(br.a12, br.a21)]);
        let l = DVector::from_fn(r.len(), |i, _| 0.5 * Z * (r[i] - q[i]) - (r[i] - 1.0));
        Self {
            parameters,
            r,
            q,
            l,
            a,
        }
    }
}

impl ActivityModel for Uniquac {
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
        let tau = DMatrix::from_fn(n, n, |i, j| (-t_inv * self.a[(i, j)]).exp());

        let weighted = |p: &DVector<f64>| {
            (0..n).fold(D::from(0.0), |acc, i| acc + molefracs[i] * p[i])
        };
        let rx = weighted(&self.r);
        let qx = weighted(&self.q);
        let lx = weighted(&self.l);
        let theta = DVector::from_fn(n, |i, _| molefracs[i] * self.q[i] / qx);
        let theta_tau = DVector::from_fn(n, |j, _| {
            (0..n).fold(D::from(0.0), |acc, k| acc + theta[k] * tau[(k, j)])
        });

        DVector::from_fn(n, |i, _| {
            // combinatorial part in terms of Φ_i / x_i and θ_i / Φ_i
            let phi_x = rx.recip() * self.r[i];
            let theta_phi = qx.recip() * self.q[i] / phi_x;
            let combinatorial = phi_x.ln() + theta_phi.ln() * (0.5 * Z * self.q[i]) + self.l[i]
                - phi_x * lx;
            let residual = (-theta_tau[i].ln()
                - (0..n).fold(D::from(0.0), |acc, j| {
                    acc + theta[j] * tau[(i, j)] / theta_tau[j]
                })
                + 1.0)
                * self.q[i];
            combinatorial + residual
        })
    }
}
