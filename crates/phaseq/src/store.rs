use crate::ideal::Ideal;
use crate::model::{ActivityCoefficientModel, ModelKind};
use crate::nrtl::{Nrtl, NrtlBinaryRecord, NrtlParameters};
use crate::unifac::{
    Unifac, UnifacBinaryRecord, UnifacGroupRecord, UnifacParameters, check_groups,
};
use crate::uniquac::{Uniquac, UniquacBinaryRecord, UniquacParameters, UniquacRecord};
use itertools::Itertools;
use phaseq_core::parameter::{
    BinaryRecord, BinarySegmentRecord, ComponentRecord, Identifier, IdentifierOption,
    PureRecord, ReversibleRecord, SegmentRecord,
};
use phaseq_core::{PhaseqError, PhaseqResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Maximum deviation from the temperature of a parameter set before a warning is raised.
const TEMPERATURE_TOLERANCE: f64 = 0.1;

/// Type of phase equilibrium a parameter set was regressed for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EquilibriumKind {
    Vle,
    Lle,
    Sle,
}

impl fmt::Display for EquilibriumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vle => write!(f, "VLE"),
            Self::Lle => write!(f, "LLE"),
            Self::Sle => write!(f, "SLE"),
        }
    }
}

/// Interaction parameters of one literature source.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ParameterSet<P, B> {
    pub name: String,
    pub equilibrium: EquilibriumKind,
    /// temperature (in K) the parameters were validated at
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// CAS numbers of a closed (ternary) system
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<String>>,
    #[serde(default = "Vec::new")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pure_records: Vec<PureRecord<P>>,
    pub binary_records: Vec<BinaryRecord<Identifier, B>>,
}

impl<P, B: ReversibleRecord> ParameterSet<P, B> {
    /// The binary record of a pair, reversed if it is stored in the opposite order.
    fn binary_record(&self, cas1: &str, cas2: &str) -> Option<BinaryRecord<Identifier, B>> {
        self.binary_records.iter().find_map(|br| {
            let id1 = br.id1.as_str(IdentifierOption::Cas)?;
            let id2 = br.id2.as_str(IdentifierOption::Cas)?;
            br.model_record.as_ref()?;
            if (id1, id2) == (cas1, cas2) {
                Some(br.clone())
            } else if (id2, id1) == (cas1, cas2) {
                Some(br.reversed())
            } else {
                None
            }
        })
    }

    fn contains(&self, cas: &str) -> bool {
        self.binary_records.iter().any(|br| {
            br.id1.as_str(IdentifierOption::Cas) == Some(cas)
                || br.id2.as_str(IdentifierOption::Cas) == Some(cas)
        })
    }

    /// Whether the set is a closed system of exactly the given components.
    fn is_closed_system(&self, cas: &[&str]) -> bool {
        self.components.as_ref().is_some_and(|c| {
            c.len() == cas.len() && cas.iter().all(|&id| c.iter().any(|s| s == id))
        })
    }
}

/// An activity coefficient model built for a set of components.
pub struct ModelSetup {
    pub model: ActivityCoefficientModel,
    /// names of the parameter sets the model was built from
    pub parameter_sets: Vec<String>,
    pub references: Vec<String>,
    pub warnings: Vec<String>,
}

impl ModelSetup {
    fn new(model: ActivityCoefficientModel) -> Self {
        Self {
            model,
            parameter_sets: Vec::new(),
            references: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// All warnings joined into a single message.
    pub fn warning(&self) -> Option<String> {
        (!self.warnings.is_empty()).then(|| self.warnings.join(" "))
    }
}

/// Read-only collection of component data and model parameters.
///
/// The store is never modified after it is loaded, so a single instance
/// can be shared between threads.
#[derive(Clone, Debug)]
pub struct ComponentStore {
    components: Vec<ComponentRecord>,
    nrtl: Vec<ParameterSet<(), NrtlBinaryRecord>>,
    uniquac: Vec<ParameterSet<UniquacRecord, UniquacBinaryRecord>>,
    unifac_groups: Vec<SegmentRecord<UnifacGroupRecord>>,
    unifac_interactions: Vec<BinarySegmentRecord<UnifacBinaryRecord>>,
}

fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> PhaseqResult<T> {
    Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
}

impl ComponentStore {
    /// Store with the component data and parameters shipped with the crate.
    pub fn bundled() -> PhaseqResult<Self> {
        Ok(Self {
            components: serde_json::from_str(include_str!("../data/components.json"))?,
            nrtl: serde_json::from_str(include_str!("../data/nrtl.json"))?,
            uniquac: serde_json::from_str(include_str!("../data/uniquac.json"))?,
            unifac_groups: serde_json::from_str(include_str!("../data/unifac_groups.json"))?,
            unifac_interactions: serde_json::from_str(include_str!(
                "../data/unifac_interactions.json"
            ))?,
        })
    }

    /// Store from user supplied json files in the same format as the bundled data.
    pub fn from_json<P: AsRef<Path>>(
        file_components: P,
        file_nrtl: P,
        file_uniquac: P,
        file_unifac_groups: P,
        file_unifac_interactions: P,
    ) -> PhaseqResult<Self> {
        Ok(Self {
            components: read_json(file_components)?,
            nrtl: read_json(file_nrtl)?,
            uniquac: read_json(file_uniquac)?,
            unifac_groups: read_json(file_unifac_groups)?,
            unifac_interactions: read_json(file_unifac_interactions)?,
        })
    }

    pub fn records(&self) -> &[ComponentRecord] {
        &self.components
    }

    pub fn nrtl_sets(&self) -> &[ParameterSet<(), NrtlBinaryRecord>] {
        &self.nrtl
    }

    pub fn uniquac_sets(&self) -> &[ParameterSet<UniquacRecord, UniquacBinaryRecord>] {
        &self.uniquac
    }

    /// Look up a component by CAS number, name or localized name (case-insensitive).
    pub fn component(&self, query: &str) -> PhaseqResult<&ComponentRecord> {
        self.components
            .iter()
            .find(|c| c.identifier.matches(query))
            .ok_or_else(|| PhaseqError::ComponentsNotFound(query.into()))
    }

    /// Look up several components, preserving the order of the query.
    pub fn components<S: AsRef<str>>(&self, queries: &[S]) -> PhaseqResult<Vec<ComponentRecord>> {
        let (found, missing): (Vec<_>, Vec<_>) = queries
            .iter()
            .map(|q| self.component(q.as_ref()).map_err(|_| q.as_ref()))
            .partition(Result::is_ok);
        if !missing.is_empty() {
            let missing = missing.into_iter().filter_map(Result::err).join(", ");
            return Err(PhaseqError::ComponentsNotFound(missing));
        }
        Ok(found.into_iter().flatten().cloned().collect())
    }

    /// Build an activity coefficient model for the components.
    ///
    /// Missing parameters are reported before any calculation is started.
    /// `temperature` (in K) is only used to check the validity range of the
    /// parameter sets.
    pub fn model(
        &self,
        kind: ModelKind,
        equilibrium: EquilibriumKind,
        components: &[ComponentRecord],
        temperature: Option<f64>,
    ) -> PhaseqResult<ModelSetup> {
        match kind {
            ModelKind::Ideal => Ok(ModelSetup::new(Ideal::new(components.len()).into())),
            ModelKind::Unifac => {
                let parameters = UnifacParameters::new(
                    components,
                    &self.unifac_groups,
                    &self.unifac_interactions,
                )?;
                let mut setup = ModelSetup::new(Unifac::new(parameters).into());
                setup.parameter_sets.push("UNIFAC".into());
                setup
                    .references
                    .push("Fredenslund, Jones and Prausnitz, AIChE J. 21 (1975) 1086".into());
                Ok(setup)
            }
            ModelKind::Nrtl => {
                let pure = components
                    .iter()
                    .map(|c| PureRecord::new(c.identifier.clone(), c.molarweight, ()))
                    .collect();
                let (binary, sets) = select(&self.nrtl, equilibrium, components)?;
                let parameters = NrtlParameters::from_complete_records(
                    pure,
                    &binary,
                    IdentifierOption::Cas,
                    "NRTL",
                )?;
                Ok(finish(Nrtl::new(parameters).into(), &sets, temperature))
            }
            ModelKind::Uniquac => {
                let pure: Vec<_> = components
                    .iter()
                    .map(|c| {
                        self.uniquac_record(c).map(|record| {
                            PureRecord::new(c.identifier.clone(), c.molarweight, record)
                        })
                    })
                    .collect::<PhaseqResult<_>>()?;
                let (binary, sets) = select(&self.uniquac, equilibrium, components)?;
                let parameters = UniquacParameters::from_complete_records(
                    pure,
                    &binary,
                    IdentifierOption::Cas,
                    "UNIQUAC",
                )?;
                Ok(finish(Uniquac::new(parameters).into(), &sets, temperature))
            }
        }
    }

    fn uniquac_record(&self, component: &ComponentRecord) -> PhaseqResult<UniquacRecord> {
        let cas = component.identifier.as_str(IdentifierOption::Cas);
        self.uniquac
            .iter()
            .flat_map(|set| &set.pure_records)
            .find(|pr| cas.is_some() && pr.identifier.as_str(IdentifierOption::Cas) == cas)
            .map(|pr| pr.model_record)
            .ok_or_else(|| PhaseqError::MissingProperty {
                component: component.name(),
                property: "UNIQUAC r and q".into(),
            })
    }

    /// Whether a model can describe the component in the given type of equilibrium.
    pub fn has_parameters(
        &self,
        component: &ComponentRecord,
        kind: ModelKind,
        equilibrium: EquilibriumKind,
    ) -> bool {
        let Some(cas) = component.identifier.as_str(IdentifierOption::Cas) else {
            return kind == ModelKind::Ideal;
        };
        match kind {
            ModelKind::Ideal => true,
            ModelKind::Unifac => check_groups(component, &self.unifac_groups).is_ok(),
            ModelKind::Nrtl => pool(&self.nrtl, equilibrium).any(|s| s.contains(cas)),
            ModelKind::Uniquac => {
                self.uniquac_record(component).is_ok()
                    && pool(&self.uniquac, equilibrium).any(|s| s.contains(cas))
            }
        }
    }

    /// All components that a model can describe in the given type of equilibrium.
    pub fn available_components(
        &self,
        kind: ModelKind,
        equilibrium: EquilibriumKind,
    ) -> Vec<&ComponentRecord> {
        self.components
            .iter()
            .filter(|c| self.has_parameters(c, kind, equilibrium))
            .collect()
    }

    /// Check that a complete set of parameters exists for the components.
    pub fn check_system<S: AsRef<str>>(
        &self,
        components: &[S],
        kind: ModelKind,
        equilibrium: EquilibriumKind,
    ) -> PhaseqResult<()> {
        let components = self.components(components)?;
        self.model(kind, equilibrium, &components, None).map(|_| ())
    }

    /// Models with a complete set of parameters for the components.
    pub fn available_models<S: AsRef<str>>(
        &self,
        components: &[S],
        equilibrium: EquilibriumKind,
    ) -> Vec<ModelKind> {
        ModelKind::ALL
            .into_iter()
            .filter(|&kind| self.check_system(components, kind, equilibrium).is_ok())
            .collect()
    }
}

/// Parameter sets that are applicable to a type of equilibrium in the order of priority.
///
/// Liquid phase parameters from VLE data are used for SLE if no dedicated set exists.
fn pool<P, B>(
    sets: &[ParameterSet<P, B>],
    equilibrium: EquilibriumKind,
) -> impl Iterator<Item = &ParameterSet<P, B>> {
    let fallback = match equilibrium {
        EquilibriumKind::Sle => Some(EquilibriumKind::Vle),
        _ => None,
    };
    let primary = sets.iter().filter(move |s| s.equilibrium == equilibrium);
    let secondary = sets
        .iter()
        .filter(move |s| fallback.is_some_and(|f| s.equilibrium == f));
    primary.chain(secondary)
}

type Selection<'a, P, B> = (Vec<BinaryRecord<Identifier, B>>, Vec<&'a ParameterSet<P, B>>);

/// Collect one binary record for every pair of components.
///
/// LLE parameters are only consistent within a closed ternary set. Missing pairs
/// are left out, so that building the parameters reports the first missing pair.
fn select<'a, P, B: ReversibleRecord>(
    sets: &'a [ParameterSet<P, B>],
    equilibrium: EquilibriumKind,
    components: &[ComponentRecord],
) -> PhaseqResult<Selection<'a, P, B>> {
    let cas = components
        .iter()
        .map(|c| {
            c.identifier
                .as_str(IdentifierOption::Cas)
                .ok_or_else(|| PhaseqError::MissingProperty {
                    component: c.name(),
                    property: "CAS number".into(),
                })
        })
        .collect::<PhaseqResult<Vec<_>>>()?;

    let mut binary = Vec::new();
    let mut used: Vec<&ParameterSet<P, B>> = Vec::new();
    if equilibrium == EquilibriumKind::Lle {
        if let Some(set) = pool(sets, equilibrium).find(|s| s.is_closed_system(&cas)) {
            for (c1, c2) in cas.iter().tuple_combinations() {
                binary.extend(set.binary_record(c1, c2));
            }
            used.push(set);
        } else {
            // name a pair that is missing completely before complaining about the set
            for (c1, c2) in cas.iter().tuple_combinations() {
                binary.extend(pool(sets, equilibrium).find_map(|s| s.binary_record(c1, c2)));
            }
            if binary.len() == cas.len() * (cas.len() - 1) / 2 {
                let names = components.iter().map(ComponentRecord::name).join(" / ");
                return Err(PhaseqError::MissingParameters(format!(
                    "no closed LLE parameter set for {names}"
                )));
            }
        }
        return Ok((binary, used));
    }

    for (c1, c2) in cas.iter().tuple_combinations() {
        if let Some((set, record)) =
            pool(sets, equilibrium).find_map(|s| s.binary_record(c1, c2).map(|r| (s, r)))
        {
            binary.push(record);
            if !used.iter().any(|u| std::ptr::eq(*u, set)) {
                used.push(set);
            }
        }
    }
    Ok((binary, used))
}

fn finish<P, B>(
    model: ActivityCoefficientModel,
    sets: &[&ParameterSet<P, B>],
    temperature: Option<f64>,
) -> ModelSetup {
    let mut setup = ModelSetup::new(model);
    for set in sets {
        setup.parameter_sets.push(set.name.clone());
        if let Some(reference) = &set.reference {
            if !setup.references.contains(reference) {
                setup.references.push(reference.clone());
            }
        }
        if let (Some(t), Some(t_set)) = (temperature, set.temperature) {
            if (t - t_set).abs() > TEMPERATURE_TOLERANCE {
                setup.warnings.push(format!(
                    "Parameter set '{}' was determined at {:.2} K, the calculation is performed at {:.2} K.",
                    set.name, t_set, t
                ));
            }
        }
    }
    setup
}
