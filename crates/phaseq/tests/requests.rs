use approx::assert_relative_eq;
use phaseq::advisory::{Strategy, recommend};
use phaseq::calculation::{CalculationResult, PressureInput, TemperatureInput};
use phaseq::{
    Calculation, ComponentStore, EquilibriumKind, EquilibriumRequest, ModelKind, Response,
    calculate,
};
use phaseq_core::{ExtractionTarget, PhaseqError, PressureUnit, TemperatureUnit};
use std::error::Error;

fn celsius(value: f64) -> TemperatureInput {
    TemperatureInput::new(value, TemperatureUnit::Celsius)
}

#[test]
fn test_lle_flash_request() -> Result<(), Box<dyn Error>> {
    let store = ComponentStore::bundled()?;
    let request = EquilibriumRequest::new(
        ["Water", "1,1,2-Trichloroethane", "Acetone"],
        "nrtl",
        Calculation::LleFlash {
            temperature: celsius(25.0),
            composition: vec![0.3, 0.4, 0.3],
        },
    );
    let response = calculate(&store, &request)?;
    let solution = response.solution().ok_or("calculation failed")?;
    assert_eq!(solution.model, ModelKind::Nrtl);
    assert_eq!(solution.components[0], "Water");
    let CalculationResult::LleFlash(lle) = &solution.result else {
        panic!("wrong result type");
    };
    assert!(lle.two_phase && lle.converged);
    assert_relative_eq!(lle.temperature_k, 298.15, epsilon = 1e-10);
    for i in 0..3 {
        let z = (1.0 - lle.beta) * lle.x_l1[i] + lle.beta * lle.x_l2[i];
        assert_relative_eq!(z, lle.z[i], epsilon = 1e-4);
    }

    let json = serde_json::to_value(&response)?;
    assert_eq!(json["status"], "success");
    assert_eq!(json["result"]["type"], "lle_flash");
    assert!(json["result"]["x_L1"].is_array());
    Ok(())
}

#[test]
fn test_bubble_temperature_request() -> Result<(), Box<dyn Error>> {
    let store = ComponentStore::bundled()?;
    let request: EquilibriumRequest = serde_json::from_str(
        r#"{
            "components": ["Benzene", "Toluene"],
            "model": "Ideal",
            "calculation": {
                "type": "bubble_temperature",
                "pressure": {"value": 101.325, "unit": "kPa"},
                "composition": [0.5, 0.5]
            }
        }"#,
    )?;
    let response = calculate(&store, &request)?;
    let solution = response.solution().ok_or("calculation failed")?;
    let CalculationResult::BubbleTemperature(point) = &solution.result else {
        panic!("wrong result type");
    };
    assert!(point.converged);
    assert_relative_eq!(point.pressure_kpa, 101.325, max_relative = 1e-6);
    // between the normal boiling points of benzene and toluene
    assert!(point.temperature_c > 80.0 && point.temperature_c < 110.6);
    assert_relative_eq!(point.y.iter().sum::<f64>(), 1.0, epsilon = 1e-8);
    Ok(())
}

#[test]
fn test_extraction_request() -> Result<(), Box<dyn Error>> {
    let store = ComponentStore::bundled()?;
    let request = EquilibriumRequest::new(
        ["Water", "1,1,2-Trichloroethane", "Acetone"],
        "NRTL",
        Calculation::Extraction {
            temperature: celsius(25.0),
            composition: vec![0.7, 0.0, 0.3],
            solvent_to_feed: 1.0,
            efficiency: 1.0,
            target: ExtractionTarget::Recovery(0.95),
            solute: Some("Acetone".into()),
        },
    );
    let response = calculate(&store, &request)?;
    let solution = response.solution().ok_or("calculation failed")?;
    let CalculationResult::Extraction(design) = &solution.result else {
        panic!("wrong result type");
    };
    assert_eq!(design.solvent, "1,1,2-Trichloroethane");
    assert_eq!(design.diluent, "Water");
    assert_eq!(design.solute.as_deref(), Some("Acetone"));
    Ok(())
}

#[test]
fn test_malformed_requests() -> Result<(), Box<dyn Error>> {
    let store = ComponentStore::bundled()?;
    let lle = Calculation::LleFlash {
        temperature: celsius(25.0),
        composition: vec![0.3, 0.4, 0.3],
    };

    let request = EquilibriumRequest::new(["Water", "Toluene", "Aniline"], "Wilson", lle.clone());
    assert!(matches!(
        calculate(&store, &request),
        Err(PhaseqError::UnknownModel(_))
    ));

    let request = EquilibriumRequest::new(
        ["Benzene", "Toluene", "p-Xylene"],
        "NRTL",
        Calculation::Txy {
            pressure: PressureInput::new(1.0, PressureUnit::Bar),
            points: None,
        },
    );
    assert!(matches!(
        calculate(&store, &request),
        Err(PhaseqError::UnsupportedSystemSize { found: 3, .. })
    ));

    let request = EquilibriumRequest::new(
        ["Water", "Toluene", "Aniline"],
        "NRTL",
        Calculation::LleFlash {
            temperature: celsius(25.0),
            composition: vec![0.5, -0.1, 0.6],
        },
    );
    assert!(matches!(
        calculate(&store, &request),
        Err(PhaseqError::InvalidComposition(_))
    ));
    Ok(())
}

#[test]
fn test_missing_data_is_reported() -> Result<(), Box<dyn Error>> {
    let store = ComponentStore::bundled()?;
    let request = EquilibriumRequest::new(
        ["Water", "Naphthalene"],
        "NRTL",
        Calculation::BubblePressure {
            temperature: celsius(80.0),
            composition: vec![0.9, 0.1],
        },
    );
    let response = calculate(&store, &request)?;
    let Response::Failure {
        error,
        missing_data,
    } = response
    else {
        panic!("calculation should fail");
    };
    assert!(missing_data);
    assert!(error.contains("Water") && error.contains("Naphthalene"));

    let request = EquilibriumRequest::new(
        ["Water", "Kryptonite"],
        "Ideal",
        Calculation::BubblePressure {
            temperature: celsius(80.0),
            composition: vec![0.9, 0.1],
        },
    );
    let response = calculate(&store, &request)?;
    assert!(!response.is_success());
    Ok(())
}

#[test]
fn test_recommendation() -> Result<(), Box<dyn Error>> {
    let store = ComponentStore::bundled()?;
    let recommendation = recommend(&store, &["Toluene", "Benzene"], EquilibriumKind::Vle)?;
    assert_eq!(recommendation.strategy, Strategy::KnownSystem);
    assert_eq!(recommendation.prefill.composition.len(), 2);

    let recommendation = recommend(&store, &["n-Hexane", "n-Heptane"], EquilibriumKind::Vle)?;
    assert_eq!(recommendation.model, ModelKind::Ideal);
    assert!(
        recommendation.temperature_range.0 < recommendation.temperature_range.1,
        "empty temperature range"
    );
    Ok(())
}
