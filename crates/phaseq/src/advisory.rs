//! Recommendation of activity coefficient models and operating conditions.
//!
//! The advice is read-only: it never changes which models can be used, it
//! only suggests one of the models that the [ComponentStore] can build for
//! the requested components.
use crate::model::ModelKind;
use crate::store::{ComponentStore, EquilibriumKind};
use phaseq_core::parameter::{ComponentRecord, IdentifierOption};
use phaseq_core::{PhaseqResult, RGAS};
use serde::Serialize;

const WATER: &str = "7732-18-5";

/// How a recommendation was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// The component set is a well-documented literature system.
    KnownSystem,
    /// Derived from the melting properties of the components.
    PropertyBased,
    /// Derived from the chemical classes of the components.
    RuleBased,
}

/// Suggested input values in the order of the requested components.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Prefill {
    /// temperature in °C
    pub temperature: f64,
    /// pressure in kPa
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    pub composition: Vec<f64>,
}

/// Recommended model and conditions for a set of components.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Recommendation {
    pub model: ModelKind,
    pub strategy: Strategy,
    pub reason: String,
    /// further models that can be used for the system
    pub alternatives: Vec<ModelKind>,
    /// typical temperature range in °C
    pub temperature_range: (f64, f64),
    /// typical pressure range in kPa
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure_range: Option<(f64, f64)>,
    pub prefill: Prefill,
}

struct KnownSystem {
    equilibrium: EquilibriumKind,
    cas: &'static [&'static str],
    models: &'static [ModelKind],
    reason: &'static str,
    temperature_range: (f64, f64),
    pressure_range: Option<(f64, f64)>,
    temperature: f64,
    pressure: Option<f64>,
    composition: &'static [f64],
}

const KNOWN_SYSTEMS: [KnownSystem; 9] = [
    KnownSystem {
        equilibrium: EquilibriumKind::Vle,
        cas: &["64-17-5", WATER],
        models: &[ModelKind::Nrtl, ModelKind::Uniquac],
        reason: "Ethanol and water form a minimum-boiling azeotrope. NRTL reproduces the strong positive deviation.",
        temperature_range: (70.0, 90.0),
        pressure_range: Some((90.0, 110.0)),
        temperature: 78.0,
        pressure: Some(101.325),
        composition: &[0.5, 0.5],
    },
    KnownSystem {
        equilibrium: EquilibriumKind::Vle,
        cas: &["71-43-2", "108-88-3"],
        models: &[ModelKind::Ideal, ModelKind::Uniquac],
        reason: "Benzene and toluene are chemically similar aromatics that follow Raoult's law closely.",
        temperature_range: (80.0, 120.0),
        pressure_range: Some((80.0, 150.0)),
        temperature: 100.0,
        pressure: Some(101.325),
        composition: &[0.5, 0.5],
    },
    KnownSystem {
        equilibrium: EquilibriumKind::Vle,
        cas: &["67-64-1", "67-66-3"],
        models: &[ModelKind::Uniquac, ModelKind::Nrtl],
        reason: "Hydrogen bonding between acetone and chloroform causes a negative deviation and a maximum-boiling azeotrope.",
        temperature_range: (50.0, 90.0),
        pressure_range: Some((80.0, 120.0)),
        temperature: 60.0,
        pressure: Some(101.325),
        composition: &[0.5, 0.5],
    },
    KnownSystem {
        equilibrium: EquilibriumKind::Lle,
        cas: &[WATER, "79-00-5", "67-64-1"],
        models: &[ModelKind::Nrtl],
        reason: "Classical extraction system with validated NRTL parameters (Bender and Block, 1975). Water and 1,1,2-trichloroethane are partially miscible.",
        temperature_range: (20.0, 30.0),
        pressure_range: None,
        temperature: 25.0,
        pressure: None,
        composition: &[0.3, 0.4, 0.3],
    },
    KnownSystem {
        equilibrium: EquilibriumKind::Lle,
        cas: &["71-43-2", WATER, "64-17-5"],
        models: &[ModelKind::Uniquac, ModelKind::Nrtl],
        reason: "Benzene and water are immiscible while ethanol acts as mutual solvent.",
        temperature_range: (20.0, 30.0),
        pressure_range: None,
        temperature: 25.0,
        pressure: None,
        composition: &[0.35, 0.3, 0.35],
    },
    KnownSystem {
        equilibrium: EquilibriumKind::Sle,
        cas: &["91-20-3", "71-43-2"],
        models: &[ModelKind::Ideal, ModelKind::Uniquac],
        reason: "Simple eutectic system of similar aromatics, close to ideal solubility.",
        temperature_range: (-12.0, 80.0),
        pressure_range: None,
        temperature: 25.0,
        pressure: None,
        composition: &[0.5, 0.5],
    },
    KnownSystem {
        equilibrium: EquilibriumKind::Sle,
        cas: &["108-95-2", WATER],
        models: &[ModelKind::Nrtl, ModelKind::Uniquac],
        reason: "Strong hydrogen bonding between phenol and water, NRTL captures the local interactions.",
        temperature_range: (20.0, 80.0),
        pressure_range: None,
        temperature: 40.0,
        pressure: None,
        composition: &[0.5, 0.5],
    },
    KnownSystem {
        equilibrium: EquilibriumKind::Sle,
        cas: &["92-52-4", "91-20-3"],
        models: &[ModelKind::Ideal],
        reason: "Similar aromatics with an ideal eutectic near 39 °C.",
        temperature_range: (20.0, 80.0),
        pressure_range: None,
        temperature: 40.0,
        pressure: None,
        composition: &[0.5, 0.5],
    },
    KnownSystem {
        equilibrium: EquilibriumKind::Sle,
        cas: &["65-85-0", "108-88-3"],
        models: &[ModelKind::Uniquac, ModelKind::Nrtl],
        reason: "Carboxylic acid in an aromatic solvent with moderate non-ideality.",
        temperature_range: (20.0, 100.0),
        pressure_range: None,
        temperature: 60.0,
        pressure: None,
        composition: &[0.4, 0.6],
    },
];

impl KnownSystem {
    /// Position of every requested component in the knowledge base entry.
    fn matches(&self, equilibrium: EquilibriumKind, cas: &[Option<&str>]) -> Option<Vec<usize>> {
        if self.equilibrium != equilibrium || self.cas.len() != cas.len() {
            return None;
        }
        cas.iter()
            .map(|c| c.and_then(|c| self.cas.iter().position(|&k| k == c)))
            .collect()
    }
}

/// Chemical classes relevant for the choice of a model.
struct Classes {
    water: bool,
    hydrocarbons: usize,
    polar: usize,
}

impl Classes {
    fn new(components: &[ComponentRecord]) -> Self {
        let mut classes = Self {
            water: false,
            hydrocarbons: 0,
            polar: 0,
        };
        for c in components {
            let elements = c
                .identifier
                .formula
                .as_deref()
                .map(elements)
                .unwrap_or_default();
            if c.identifier.as_str(IdentifierOption::Cas) == Some(WATER) {
                classes.water = true;
                classes.polar += 1;
            } else if !elements.is_empty() && elements.iter().all(|&e| e == "C" || e == "H") {
                classes.hydrocarbons += 1;
            } else if elements.iter().any(|&e| e == "O" || e == "N") {
                classes.polar += 1;
            }
        }
        classes
    }
}

/// Element symbols of a molecular formula.
fn elements(formula: &str) -> Vec<&str> {
    formula
        .char_indices()
        .filter(|(_, c)| c.is_ascii_uppercase())
        .map(|(i, _)| {
            let len = formula[i + 1..]
                .chars()
                .take_while(char::is_ascii_lowercase)
                .count();
            &formula[i..i + 1 + len]
        })
        .collect()
}

/// Recommend a model for the components and the type of equilibrium.
///
/// Only models for which the store holds a complete parameter set are recommended,
/// so that the result can be used directly for a calculation.
pub fn recommend<S: AsRef<str>>(
    store: &ComponentStore,
    components: &[S],
    equilibrium: EquilibriumKind,
) -> PhaseqResult<Recommendation> {
    let records = store.components(components)?;
    let available = store.available_models(components, equilibrium);
    let n = records.len();
    let cas: Vec<_> = records
        .iter()
        .map(|c| c.identifier.as_str(IdentifierOption::Cas))
        .collect();

    if let Some((system, order)) = KNOWN_SYSTEMS
        .iter()
        .find_map(|s| s.matches(equilibrium, &cas).map(|o| (s, o)))
    {
        if let Some(&model) = system.models.iter().find(|m| available.contains(m)) {
            return Ok(Recommendation {
                model,
                strategy: Strategy::KnownSystem,
                reason: system.reason.into(),
                alternatives: alternatives(model, &available),
                temperature_range: system.temperature_range,
                pressure_range: system.pressure_range,
                prefill: Prefill {
                    temperature: system.temperature,
                    pressure: system.pressure,
                    composition: order.iter().map(|&i| system.composition[i]).collect(),
                },
            });
        }
    }

    let classes = Classes::new(&records);
    let uniform = vec![1.0 / n as f64; n];
    if equilibrium == EquilibriumKind::Sle {
        if let Some(recommendation) = from_fusion_properties(&records, &classes, &available) {
            return Ok(recommendation);
        }
    }

    let (preferred, reason) = if equilibrium == EquilibriumKind::Lle
        && classes.water
        && classes.hydrocarbons > 0
    {
        (
            ModelKind::Nrtl,
            "Water and hydrocarbons are largely immiscible, NRTL describes the liquid-liquid split.",
        )
    } else if classes.polar > 0 {
        (
            ModelKind::Nrtl,
            "Polar or associating components cause strong deviations from ideality.",
        )
    } else if classes.hydrocarbons == n {
        (
            ModelKind::Ideal,
            "Mixtures of similar hydrocarbons are close to ideal.",
        )
    } else {
        (
            ModelKind::Unifac,
            "No specific interactions identified, UNIFAC predicts the mixture from its structural groups.",
        )
    };
    let (model, reason) = restrict(preferred, reason, &available);
    let (temperature_range, pressure_range, prefill) = match equilibrium {
        EquilibriumKind::Vle => (
            (40.0, 120.0),
            Some((50.0, 200.0)),
            Prefill {
                temperature: 80.0,
                pressure: Some(101.325),
                composition: uniform,
            },
        ),
        EquilibriumKind::Lle => (
            (20.0, 40.0),
            None,
            Prefill {
                temperature: 25.0,
                pressure: None,
                composition: uniform,
            },
        ),
        EquilibriumKind::Sle => (
            (0.0, 100.0),
            None,
            Prefill {
                temperature: 25.0,
                pressure: None,
                composition: uniform,
            },
        ),
    };
    Ok(Recommendation {
        model,
        strategy: Strategy::RuleBased,
        reason,
        alternatives: alternatives(model, &available),
        temperature_range,
        pressure_range,
        prefill,
    })
}

/// Solid-liquid advice from melting temperatures and enthalpies of fusion.
fn from_fusion_properties(
    records: &[ComponentRecord],
    classes: &Classes,
    available: &[ModelKind],
) -> Option<Recommendation> {
    let fusion: Vec<_> = records.iter().map(|c| c.fusion).collect::<Option<_>>()?;
    let tm: Vec<_> = fusion.iter().map(|f| f.melting_temperature).collect();
    let t_min = tm.iter().copied().fold(f64::INFINITY, f64::min);
    let t_max = tm.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let t_avg = tm.iter().sum::<f64>() / tm.len() as f64;
    let h = fusion.iter().map(|f| f.enthalpy_of_fusion * 1e-3);
    let h_range = h.clone().fold(f64::NEG_INFINITY, f64::max) - h.fold(f64::INFINITY, f64::min);

    let (preferred, reason) = if (t_max - t_min) / t_avg < 0.2 && classes.polar == 0 {
        (
            ModelKind::Ideal,
            format!(
                "Similar melting temperatures (ΔTm = {:.1} K) of non-polar components suggest nearly ideal solubility.",
                t_max - t_min
            ),
        )
    } else if classes.water {
        (
            ModelKind::Nrtl,
            "Aqueous system with hydrogen bonding, NRTL captures the specific local interactions."
                .into(),
        )
    } else {
        (
            ModelKind::Uniquac,
            format!(
                "Different melting properties (ΔTm = {:.1} K, ΔHfus = {:.1} kJ/mol), UNIQUAC separates size and energy effects.",
                t_max - t_min,
                h_range
            ),
        )
    };
    let (model, reason) = restrict(preferred, &reason, available);
    let celsius = |t: f64| t - 273.15;
    // ideal eutectic estimate as lower bound of the temperature range
    let lowest = fusion
        .iter()
        .map(|f| {
            let tm = f.melting_temperature;
            tm / (1.0 + RGAS * tm / f.enthalpy_of_fusion * 2f64.ln())
        })
        .fold(f64::INFINITY, f64::min);
    Some(Recommendation {
        model,
        strategy: Strategy::PropertyBased,
        reason,
        alternatives: alternatives(model, available),
        temperature_range: (celsius(lowest.min(t_min - 20.0)), celsius(t_max + 20.0)),
        pressure_range: None,
        prefill: Prefill {
            temperature: celsius(t_avg - 10.0),
            pressure: None,
            composition: vec![1.0 / records.len() as f64; records.len()],
        },
    })
}

/// Fall back to the next model that can be built for the system.
fn restrict(preferred: ModelKind, reason: &str, available: &[ModelKind]) -> (ModelKind, String) {
    if available.contains(&preferred) {
        return (preferred, reason.into());
    }
    let model = [
        ModelKind::Nrtl,
        ModelKind::Uniquac,
        ModelKind::Unifac,
        ModelKind::Ideal,
    ]
    .into_iter()
    .find(|m| available.contains(m))
    .unwrap_or(ModelKind::Ideal);
    (
        model,
        format!("{reason} No {preferred} parameters are available for this system, {model} is used instead."),
    )
}

fn alternatives(model: ModelKind, available: &[ModelKind]) -> Vec<ModelKind> {
    available.iter().copied().filter(|&m| m != model).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_system_in_any_order() {
        let store = ComponentStore::bundled().unwrap();
        let r = recommend(
            &store,
            &["Acetone", "Water", "1,1,2-Trichloroethane"],
            EquilibriumKind::Lle,
        )
        .unwrap();
        assert_eq!(r.model, ModelKind::Nrtl);
        assert_eq!(r.strategy, Strategy::KnownSystem);
        assert_eq!(r.prefill.composition, vec![0.3, 0.3, 0.4]);
        assert_eq!(r.temperature_range, (20.0, 30.0));
    }

    #[test]
    fn hydrocarbons_are_ideal() {
        let store = ComponentStore::bundled().unwrap();
        let r = recommend(&store, &["n-Hexane", "n-Heptane"], EquilibriumKind::Vle).unwrap();
        assert_eq!(r.model, ModelKind::Ideal);
        assert_eq!(r.strategy, Strategy::RuleBased);
        assert_eq!(r.pressure_range, Some((50.0, 200.0)));
    }

    #[test]
    fn formula_elements() {
        assert_eq!(elements("C2H3Cl3"), ["C", "H", "Cl"]);
        assert_eq!(elements("H2O"), ["H", "O"]);
    }
}
