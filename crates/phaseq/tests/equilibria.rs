use approx::assert_relative_eq;
use nalgebra::dvector;
use phaseq::{ActivityCoefficientModel, ComponentStore, EquilibriumKind, ModelKind};
use phaseq_core::{
    BinarySleDiagram, EquilibriumSystem, PhaseDiagramBinary, PhaseEquilibrium, PhaseqResult,
    SleEquation, SolverOptions,
};
use quantity::{KELVIN, KILO, PASCAL};
use std::error::Error;

fn system(
    components: &[&str],
    kind: ModelKind,
    equilibrium: EquilibriumKind,
) -> PhaseqResult<EquilibriumSystem<ActivityCoefficientModel>> {
    let store = ComponentStore::bundled()?;
    let components = store.components(components)?;
    let setup = store.model(kind, equilibrium, &components, Some(298.15))?;
    EquilibriumSystem::new(setup.model, components)
}

#[test]
fn test_lle_flash_nrtl() -> Result<(), Box<dyn Error>> {
    let system = system(
        &["Water", "1,1,2-Trichloroethane", "Acetone"],
        ModelKind::Nrtl,
        EquilibriumKind::Lle,
    )?;
    let feed = dvector![0.3, 0.4, 0.3];
    let lle = PhaseEquilibrium::lle_flash(
        &system,
        298.15 * KELVIN,
        &feed,
        None,
        SolverOptions::default(),
    )?;
    println!("{lle}");
    assert!(lle.converged());
    assert!(lle.two_phase);
    assert!(lle.beta() > 0.0 && lle.beta() < 1.0);
    assert!(lle.material_balance_residual(&feed) < 1e-4);

    // equal activities in both liquids
    let a1 = lle.phase_i().molefracs.component_mul(&lle.phase_i().coefficients);
    let a2 = lle.phase_ii().molefracs.component_mul(&lle.phase_ii().coefficients);
    assert_relative_eq!(a1, a2, max_relative = 1e-4);
    Ok(())
}

#[test]
fn test_lle_flash_uniquac() -> Result<(), Box<dyn Error>> {
    let system = system(
        &["Water", "Chloroform", "Acetic Acid"],
        ModelKind::Uniquac,
        EquilibriumKind::Lle,
    )?;
    let feed = dvector![0.7, 0.25, 0.05];
    let lle = PhaseEquilibrium::lle_flash(
        &system,
        298.15 * KELVIN,
        &feed,
        None,
        SolverOptions::default(),
    )?;
    assert!(lle.converged());
    assert!(lle.two_phase);
    assert!(lle.material_balance_residual(&feed) < 1e-4);
    Ok(())
}

#[test]
fn test_ideal_relative_volatility() -> Result<(), Box<dyn Error>> {
    let system = system(&["Benzene", "Toluene"], ModelKind::Ideal, EquilibriumKind::Vle)?;
    let t = 353.15 * KELVIN;
    let alpha = [0.2, 0.5, 0.8]
        .into_iter()
        .map(|x1| {
            let vle = PhaseEquilibrium::bubble_point(
                &system,
                t,
                &dvector![x1, 1.0 - x1],
                None,
                SolverOptions::default(),
            )?;
            let k = vle.vapor().molefracs.component_div(&vle.liquid().molefracs);
            Ok(k[0] / k[1])
        })
        .collect::<PhaseqResult<Vec<_>>>()?;
    let p_sat = system.vapor_pressures(353.15)?;
    for a in alpha {
        assert_relative_eq!(a, p_sat[0] / p_sat[1], max_relative = 1e-6);
    }
    Ok(())
}

#[test]
fn test_bubble_dew_consistency() -> Result<(), Box<dyn Error>> {
    let system = system(&["Ethanol", "Water"], ModelKind::Nrtl, EquilibriumKind::Vle)?;
    let p = 101.325 * KILO * PASCAL;
    let bubble = PhaseEquilibrium::bubble_point(
        &system,
        p,
        &dvector![0.3, 0.7],
        None,
        SolverOptions::default(),
    )?;
    assert!(bubble.converged());
    let y = bubble.vapor().molefracs.clone();
    let dew = PhaseEquilibrium::dew_point(&system, p, &y, None, SolverOptions::default())?;
    assert_relative_eq!(
        dew.temperature.convert_into(KELVIN),
        bubble.temperature.convert_into(KELVIN),
        max_relative = 1e-6
    );
    assert_relative_eq!(dew.liquid().molefracs[0], 0.3, epsilon = 1e-5);
    Ok(())
}

#[test]
fn test_txy_diagram() -> Result<(), Box<dyn Error>> {
    let system = system(&["Benzene", "Toluene"], ModelKind::Nrtl, EquilibriumKind::Vle)?;
    let diagram = PhaseDiagramBinary::new(
        &system,
        101.325 * KILO * PASCAL,
        Some(21),
        SolverOptions::default(),
    )?;
    assert_eq!(diagram.failures(), 0);
    // benzene is the light component
    for (x1, y1) in diagram.bubble_x1().into_iter().zip(diagram.bubble_y1()) {
        assert!(y1 >= x1 - 1e-10);
    }
    Ok(())
}

#[test]
fn test_ideal_solubility() -> Result<(), Box<dyn Error>> {
    let system = system(&["Naphthalene", "Benzene"], ModelKind::Ideal, EquilibriumKind::Sle)?;
    let sle = system.solubility(
        298.15 * KELVIN,
        Some(0),
        SleEquation::Simplified,
        SolverOptions::default(),
    )?;
    assert!(sle.convergence.is_converged());
    let x = sle.solubility().ok_or("no solubility")?;
    assert_relative_eq!(x, sle.ideal_solubility[0], max_relative = 1e-6);
    assert_relative_eq!(x, 0.3007, max_relative = 2e-3);
    Ok(())
}

#[test]
fn test_binary_sle_eutectic() -> Result<(), Box<dyn Error>> {
    let system = system(&["Naphthalene", "Benzene"], ModelKind::Ideal, EquilibriumKind::Sle)?;
    let diagram = BinarySleDiagram::new(
        &system,
        Some(31),
        SleEquation::Simplified,
        SolverOptions::default(),
    )?;
    assert!(diagram.eutectic.converged);
    let t_e = diagram.eutectic.temperature.convert_into(KELVIN);
    assert!(t_e < 278.64);
    assert!(diagram.eutectic.x1 > 0.0 && diagram.eutectic.x1 < 1.0);
    assert!(!diagram.has_liquid_liquid_gap());
    Ok(())
}
