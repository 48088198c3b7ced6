use approx::assert_relative_eq;
use nalgebra::{DVector, dvector};
use num_dual::DualNum;
use phaseq_core::parameter::{ComponentRecord, Identifier};
use phaseq_core::{
    ActivityModel, AntoineRecord, EquilibriumSystem, PhaseDiagramBinary, PhaseEquilibrium,
    PhaseqResult, SolverOptions,
};
use quantity::*;

/// Raoult's law.
struct Ideal(usize);

impl ActivityModel for Ideal {
    fn components(&self) -> usize {
        self.0
    }

    fn ln_gamma<D: DualNum<f64> + Copy>(&self, _: D, molefracs: &DVector<D>) -> DVector<D> {
        DVector::from_element(molefracs.len(), D::from(0.0))
    }
}

fn benzene_toluene() -> PhaseqResult<EquilibriumSystem<Ideal>> {
    let components = vec![
        ComponentRecord::new(Identifier::from_name("Benzene"), 78.11)
            .with_antoine(AntoineRecord::new(6.90565, 1211.033, -52.36)),
        ComponentRecord::new(Identifier::from_name("Toluene"), 92.14)
            .with_antoine(AntoineRecord::new(6.95464, 1344.8, -53.67)),
    ];
    EquilibriumSystem::new(Ideal(2), components)
}

#[test]
fn relative_volatility_is_constant() -> PhaseqResult<()> {
    let system = benzene_toluene()?;
    let t = 353.15 * KELVIN;
    let mut alpha = Vec::new();
    for x1 in [0.1, 0.3, 0.5, 0.7, 0.9] {
        let vle = PhaseEquilibrium::bubble_point(
            &system,
            t,
            &dvector![x1, 1.0 - x1],
            None,
            SolverOptions::default(),
        )?;
        assert!(vle.converged());
        let y1 = vle.vapor().molefracs[0];
        assert!(y1 > x1);
        alpha.push((y1 / x1) / ((1.0 - y1) / (1.0 - x1)));
    }
    for a in &alpha {
        assert_relative_eq!(*a, alpha[0], max_relative = 1e-8);
    }
    let psat = system.vapor_pressures(353.15)?;
    assert_relative_eq!(alpha[0], psat[0] / psat[1], max_relative = 1e-8);
    Ok(())
}

#[test]
fn bubble_and_dew_point_on_one_isotherm() -> PhaseqResult<()> {
    let system = benzene_toluene()?;
    let t = 353.15 * KELVIN;
    let options = SolverOptions::new().tol(1e-12);
    let bubble = PhaseEquilibrium::bubble_point(&system, t, &dvector![0.4, 0.6], None, options)?;
    let y = bubble.vapor().molefracs.clone();
    let dew = PhaseEquilibrium::dew_point(&system, t, &y, None, options)?;
    assert!(dew.converged());
    assert_relative_eq!(dew.liquid().molefracs[0], 0.4, max_relative = 1e-6);
    let (pb, pd) = (bubble.pressure, dew.pressure);
    assert_relative_eq!(
        pb.map(|p| p.convert_into(PASCAL)).unwrap_or(0.0),
        pd.map(|p| p.convert_into(PASCAL)).unwrap_or(f64::NAN),
        max_relative = 1e-6
    );
    Ok(())
}

#[test]
fn isobaric_bubble_temperature_is_between_boiling_points() -> PhaseqResult<()> {
    let system = benzene_toluene()?;
    let p = 101.325 * KILO * PASCAL;
    let vle = PhaseEquilibrium::bubble_point(
        &system,
        p,
        &dvector![0.5, 0.5],
        None,
        SolverOptions::default(),
    )?;
    let t = vle.temperature.convert_into(KELVIN);
    assert!(t > 353.0 && t < 383.9);
    let psat = system.vapor_pressures(t)?;
    assert_relative_eq!(0.5 * psat[0] + 0.5 * psat[1], 101_325.0, max_relative = 1e-6);
    Ok(())
}

#[test]
fn flash_between_bubble_and_dew_point() -> PhaseqResult<()> {
    let system = benzene_toluene()?;
    let t = 353.15 * KELVIN;
    let feed = dvector![0.5, 0.5];
    let options = SolverOptions::default();
    let bubble = PhaseEquilibrium::bubble_point(&system, t, &feed, None, options)?;
    let dew = PhaseEquilibrium::dew_point(&system, t, &feed, None, options)?;
    let (Some(pb), Some(pd)) = (bubble.pressure, dew.pressure) else {
        panic!("bubble and dew point have a pressure");
    };
    let p = 0.5 * (pb + pd);
    let vle = PhaseEquilibrium::tp_flash(&system, t, p, &feed, None, options)?;
    assert!(vle.converged());
    assert!(vle.two_phase);
    assert!(vle.beta() > 0.0 && vle.beta() < 1.0);
    assert!(vle.material_balance_residual(&feed) < 1e-8);
    let psat = system.vapor_pressures(353.15)?;
    let k = vle.k_values();
    assert_relative_eq!(k[0], psat[0] / p.convert_into(PASCAL), max_relative = 1e-6);
    Ok(())
}

#[test]
fn pxy_diagram_has_no_failures() -> PhaseqResult<()> {
    let system = benzene_toluene()?;
    let diagram =
        PhaseDiagramBinary::new(&system, 353.15 * KELVIN, Some(21), SolverOptions::default())?;
    assert_eq!(diagram.failures(), 0);
    assert_eq!(diagram.bubble.len(), 21);
    assert_eq!(diagram.dew.len(), 21);
    // dew curve lies below the bubble curve
    for (b, d) in diagram.bubble.iter().zip(&diagram.dew).skip(1).take(19) {
        let (Some(pb), Some(pd)) = (b.equilibrium.pressure, d.equilibrium.pressure) else {
            panic!("isothermal diagram has pressures");
        };
        assert!(pb.convert_into(PASCAL) > pd.convert_into(PASCAL));
    }
    Ok(())
}
