//! Requests and responses of equilibrium calculations.
//!
//! A request names the components, the model and one calculation with its
//! conditions in unit-tagged form. Requests that are malformed (composition,
//! number of components, model name) are rejected with an error. Missing
//! component data and failed iterations are reported as a [Response::Failure]
//! so that a caller can display them next to successful results.
use crate::model::{ActivityCoefficientModel, ModelKind};
use crate::store::{ComponentStore, EquilibriumKind};
use nalgebra::DVector;
use phaseq_core::{
    BinarySleDiagram, EquilibriumSystem, Extraction, ExtractionTarget, PhaseDiagramBinary,
    PhaseEquilibrium, PhaseqError, PhaseqResult, PressureUnit, SleEquation, SlePhaseLabel,
    SolverOptions, TemperatureUnit, TernaryLleDiagram, TernarySleMap, VaporPhase,
    validate_composition,
};
use quantity::{KELVIN, Pressure, Temperature};
use serde::{Deserialize, Serialize};

/// A temperature together with its unit.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct TemperatureInput {
    pub value: f64,
    #[serde(default)]
    pub unit: TemperatureUnit,
}

impl TemperatureInput {
    pub fn new(value: f64, unit: TemperatureUnit) -> Self {
        Self { value, unit }
    }

    pub fn quantity(self) -> Temperature {
        self.unit.quantity(self.value)
    }
}

/// A pressure together with its unit.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct PressureInput {
    pub value: f64,
    #[serde(default)]
    pub unit: PressureUnit,
}

impl PressureInput {
    pub fn new(value: f64, unit: PressureUnit) -> Self {
        Self { value, unit }
    }

    pub fn quantity(self) -> Pressure {
        self.unit.quantity(self.value)
    }
}

fn unit_efficiency() -> f64 {
    1.0
}

/// Calculation type and its conditions.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Calculation {
    BubblePressure {
        temperature: TemperatureInput,
        composition: Vec<f64>,
    },
    BubbleTemperature {
        pressure: PressureInput,
        composition: Vec<f64>,
    },
    DewPressure {
        temperature: TemperatureInput,
        composition: Vec<f64>,
    },
    DewTemperature {
        pressure: PressureInput,
        composition: Vec<f64>,
    },
    VleFlash {
        temperature: TemperatureInput,
        pressure: PressureInput,
        composition: Vec<f64>,
    },
    LleFlash {
        temperature: TemperatureInput,
        composition: Vec<f64>,
    },
    Extraction {
        temperature: TemperatureInput,
        composition: Vec<f64>,
        solvent_to_feed: f64,
        #[serde(default = "unit_efficiency")]
        efficiency: f64,
        target: ExtractionTarget,
        /// name of the solute, detected automatically if omitted
        #[serde(default)]
        solute: Option<String>,
    },
    Solubility {
        temperature: TemperatureInput,
        #[serde(default)]
        solute: Option<String>,
        #[serde(default)]
        equation: SleEquation,
    },
    Crystallization {
        composition: Vec<f64>,
        #[serde(default)]
        equation: SleEquation,
    },
    Pxy {
        temperature: TemperatureInput,
        #[serde(default)]
        points: Option<usize>,
    },
    Txy {
        pressure: PressureInput,
        #[serde(default)]
        points: Option<usize>,
    },
    TernaryLle {
        temperature: TemperatureInput,
        #[serde(default)]
        tie_lines: Option<usize>,
    },
    BinarySle {
        #[serde(default)]
        points: Option<usize>,
        #[serde(default)]
        equation: SleEquation,
    },
    TernarySle {
        temperature: TemperatureInput,
        #[serde(default)]
        grid: Option<usize>,
        #[serde(default)]
        equation: SleEquation,
    },
}

impl Calculation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BubblePressure { .. } => "bubble pressure",
            Self::BubbleTemperature { .. } => "bubble temperature",
            Self::DewPressure { .. } => "dew pressure",
            Self::DewTemperature { .. } => "dew temperature",
            Self::VleFlash { .. } => "VLE flash",
            Self::LleFlash { .. } => "LLE flash",
            Self::Extraction { .. } => "extraction",
            Self::Solubility { .. } => "solubility",
            Self::Crystallization { .. } => "crystallization temperature",
            Self::Pxy { .. } => "P-x-y diagram",
            Self::Txy { .. } => "T-x-y diagram",
            Self::TernaryLle { .. } => "ternary LLE diagram",
            Self::BinarySle { .. } => "binary SLE diagram",
            Self::TernarySle { .. } => "ternary SLE map",
        }
    }

    /// Type of equilibrium, which determines the parameter sets that are used.
    pub fn equilibrium(&self) -> EquilibriumKind {
        match self {
            Self::BubblePressure { .. }
            | Self::BubbleTemperature { .. }
            | Self::DewPressure { .. }
            | Self::DewTemperature { .. }
            | Self::VleFlash { .. }
            | Self::Pxy { .. }
            | Self::Txy { .. } => EquilibriumKind::Vle,
            Self::LleFlash { .. } | Self::Extraction { .. } | Self::TernaryLle { .. } => {
                EquilibriumKind::Lle
            }
            Self::Solubility { .. }
            | Self::Crystallization { .. }
            | Self::BinarySle { .. }
            | Self::TernarySle { .. } => EquilibriumKind::Sle,
        }
    }

    /// Smallest and largest number of components.
    pub fn system_size(&self) -> (usize, usize) {
        match self {
            Self::Pxy { .. } | Self::Txy { .. } | Self::BinarySle { .. } => (2, 2),
            Self::LleFlash { .. }
            | Self::Extraction { .. }
            | Self::TernaryLle { .. }
            | Self::TernarySle { .. } => (3, 3),
            _ => (2, 4),
        }
    }

    pub fn composition(&self) -> Option<&[f64]> {
        match self {
            Self::BubblePressure { composition, .. }
            | Self::BubbleTemperature { composition, .. }
            | Self::DewPressure { composition, .. }
            | Self::DewTemperature { composition, .. }
            | Self::VleFlash { composition, .. }
            | Self::LleFlash { composition, .. }
            | Self::Extraction { composition, .. }
            | Self::Crystallization { composition, .. } => Some(composition),
            _ => None,
        }
    }

    /// Specified temperature in K, if any.
    pub fn temperature(&self) -> Option<f64> {
        match self {
            Self::BubblePressure { temperature, .. }
            | Self::DewPressure { temperature, .. }
            | Self::VleFlash { temperature, .. }
            | Self::LleFlash { temperature, .. }
            | Self::Extraction { temperature, .. }
            | Self::Solubility { temperature, .. }
            | Self::Pxy { temperature, .. }
            | Self::TernaryLle { temperature, .. }
            | Self::TernarySle { temperature, .. } => {
                Some(temperature.quantity().convert_into(KELVIN))
            }
            _ => None,
        }
    }

    /// Check the shape of the request.
    pub fn validate(&self, components: usize) -> PhaseqResult<()> {
        let (min, max) = self.system_size();
        if components < min || components > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{min} to {max}")
            };
            return Err(PhaseqError::UnsupportedSystemSize {
                calculation: self.name().into(),
                expected,
                found: components,
            });
        }
        if let Some(composition) = self.composition() {
            if composition.len() != components {
                return Err(PhaseqError::InvalidComposition(format!(
                    "{} mole fractions given for {} components",
                    composition.len(),
                    components
                )));
            }
            validate_composition(composition)?;
        }
        Ok(())
    }
}

/// Complete specification of an equilibrium calculation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EquilibriumRequest {
    pub components: Vec<String>,
    pub model: String,
    #[serde(default)]
    pub vapor_phase: VaporPhase,
    pub calculation: Calculation,
}

impl EquilibriumRequest {
    pub fn new<S: Into<String>>(
        components: impl IntoIterator<Item = S>,
        model: &str,
        calculation: Calculation,
    ) -> Self {
        Self {
            components: components.into_iter().map(Into::into).collect(),
            model: model.into(),
            vapor_phase: VaporPhase::default(),
            calculation,
        }
    }

    pub fn with_vapor_phase(mut self, vapor_phase: VaporPhase) -> Self {
        self.vapor_phase = vapor_phase;
        self
    }
}

/// Bubble or dew point.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SaturationPoint {
    #[serde(rename = "T_C")]
    pub temperature_c: f64,
    #[serde(rename = "T_K")]
    pub temperature_k: f64,
    #[serde(rename = "P_kPa")]
    pub pressure_kpa: f64,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    #[serde(rename = "K")]
    pub k: Vec<f64>,
    pub gamma: Vec<f64>,
    pub converged: bool,
    pub residual: f64,
    pub iterations: usize,
    pub warning: Option<String>,
}

/// Isothermal-isobaric vapor-liquid flash.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct VleFlash {
    #[serde(rename = "T_C")]
    pub temperature_c: f64,
    #[serde(rename = "T_K")]
    pub temperature_k: f64,
    #[serde(rename = "P_kPa")]
    pub pressure_kpa: f64,
    pub z: Vec<f64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    #[serde(rename = "K")]
    pub k: Vec<f64>,
    pub gamma: Vec<f64>,
    /// vapor fraction
    pub beta: f64,
    pub two_phase: bool,
    pub converged: bool,
    pub residual: f64,
    pub iterations: usize,
    pub warning: Option<String>,
}

/// Liquid-liquid flash.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct LleFlash {
    #[serde(rename = "T_C")]
    pub temperature_c: f64,
    #[serde(rename = "T_K")]
    pub temperature_k: f64,
    pub z: Vec<f64>,
    #[serde(rename = "x_L1")]
    pub x_l1: Vec<f64>,
    #[serde(rename = "x_L2")]
    pub x_l2: Vec<f64>,
    #[serde(rename = "gamma_L1")]
    pub gamma_l1: Vec<f64>,
    #[serde(rename = "gamma_L2")]
    pub gamma_l2: Vec<f64>,
    /// distribution ratios between the second and the first liquid
    #[serde(rename = "K")]
    pub k: Vec<f64>,
    /// fraction of the second liquid
    pub beta: f64,
    pub two_phase: bool,
    pub converged: bool,
    pub residual: f64,
    pub iterations: usize,
    pub warning: Option<String>,
}

/// Design of a countercurrent extraction.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ExtractionDesign {
    #[serde(rename = "T_C")]
    pub temperature_c: f64,
    #[serde(rename = "T_K")]
    pub temperature_k: f64,
    pub solvent: String,
    pub diluent: String,
    pub solute: Option<String>,
    pub mixing_point: Vec<f64>,
    pub x_raffinate: Vec<f64>,
    pub x_extract: Vec<f64>,
    pub gamma_raffinate: Vec<f64>,
    pub gamma_extract: Vec<f64>,
    #[serde(rename = "K")]
    pub k: Option<f64>,
    pub extraction_factor: Option<f64>,
    pub theoretical_stages: Option<f64>,
    pub actual_stages: Option<f64>,
    pub rounded_stages: Option<usize>,
    pub recovery: Option<f64>,
    pub two_phase: bool,
    pub converged: bool,
    pub warning: Option<String>,
}

/// Solubility of a solid at fixed temperature.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Solubility {
    #[serde(rename = "T_C")]
    pub temperature_c: f64,
    #[serde(rename = "T_K")]
    pub temperature_k: f64,
    pub equation: SleEquation,
    pub solute: Option<String>,
    pub solubility: Option<f64>,
    pub x: Vec<f64>,
    pub gamma: Vec<f64>,
    pub ideal_solubility: Vec<f64>,
    pub solid: Vec<bool>,
    pub converged: bool,
    pub residual: f64,
    pub warning: Option<String>,
}

/// Temperature at which a liquid starts to crystallize.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Crystallization {
    pub equation: SleEquation,
    pub x: Vec<f64>,
    #[serde(rename = "T_C")]
    pub temperature_c: Option<f64>,
    #[serde(rename = "T_K")]
    pub temperature_k: Option<f64>,
    #[serde(rename = "liquidus_T_C")]
    pub liquidus_t_c: Vec<Option<f64>>,
    pub crystallizing_component: Option<String>,
    pub gamma: Option<Vec<f64>>,
    pub converged: bool,
    pub residual: f64,
    pub warning: Option<String>,
}

/// Isothermal vapor-liquid diagram of a binary mixture.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct PxyDiagram {
    #[serde(rename = "T_C")]
    pub temperature_c: f64,
    #[serde(rename = "T_K")]
    pub temperature_k: f64,
    pub x1: Vec<f64>,
    pub y1: Vec<f64>,
    #[serde(rename = "P_bubble_kPa")]
    pub p_bubble_kpa: Vec<f64>,
    pub dew_y1: Vec<f64>,
    #[serde(rename = "P_dew_kPa")]
    pub p_dew_kpa: Vec<f64>,
    pub failures: usize,
    pub converged: bool,
    pub warning: Option<String>,
}

/// Isobaric vapor-liquid diagram of a binary mixture.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct TxyDiagram {
    #[serde(rename = "P_kPa")]
    pub pressure_kpa: f64,
    pub x1: Vec<f64>,
    pub y1: Vec<f64>,
    #[serde(rename = "T_bubble_C")]
    pub t_bubble_c: Vec<f64>,
    pub dew_y1: Vec<f64>,
    #[serde(rename = "T_dew_C")]
    pub t_dew_c: Vec<f64>,
    pub failures: usize,
    pub converged: bool,
    pub warning: Option<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct TieLineOutput {
    #[serde(rename = "x_L1")]
    pub x_l1: Vec<f64>,
    #[serde(rename = "x_L2")]
    pub x_l2: Vec<f64>,
    pub beta: f64,
}

/// Binodal curve and tie-lines of a ternary system.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct TernaryLle {
    #[serde(rename = "T_C")]
    pub temperature_c: f64,
    #[serde(rename = "T_K")]
    pub temperature_k: f64,
    pub tie_lines: Vec<TieLineOutput>,
    pub binodal: Vec<Vec<f64>>,
    pub immiscible_pair: Option<(String, String)>,
    pub flashes: usize,
    pub failures: usize,
    pub converged: bool,
    pub warning: Option<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct LiquidusOutput {
    pub solid: String,
    pub x1: Vec<f64>,
    #[serde(rename = "T_C")]
    pub temperature_c: Vec<f64>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct EutecticOutput {
    pub x1: f64,
    #[serde(rename = "T_C")]
    pub temperature_c: f64,
    #[serde(rename = "T_K")]
    pub temperature_k: f64,
    pub converged: bool,
}

/// Solid-liquid T-x diagram of a binary mixture.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct BinarySle {
    pub equation: SleEquation,
    pub eutectic: EutecticOutput,
    pub left: LiquidusOutput,
    pub right: LiquidusOutput,
    pub unstable_region: Option<(f64, f64)>,
    pub failures: usize,
    pub converged: bool,
    pub warning: Option<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SlePointOutput {
    pub x: Vec<f64>,
    pub solids: Vec<String>,
    pub label: SlePhaseLabel,
}

/// Solid-liquid phase map of a ternary system.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct TernarySle {
    #[serde(rename = "T_C")]
    pub temperature_c: f64,
    #[serde(rename = "T_K")]
    pub temperature_k: f64,
    pub equation: SleEquation,
    pub points: Vec<SlePointOutput>,
    pub liquid: usize,
    pub solid_liquid: usize,
    pub eutectic: usize,
}

/// Result of a calculation, tagged with the calculation type.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CalculationResult {
    BubblePressure(SaturationPoint),
    BubbleTemperature(SaturationPoint),
    DewPressure(SaturationPoint),
    DewTemperature(SaturationPoint),
    VleFlash(VleFlash),
    LleFlash(LleFlash),
    Extraction(ExtractionDesign),
    Solubility(Solubility),
    Crystallization(Crystallization),
    Pxy(PxyDiagram),
    Txy(TxyDiagram),
    TernaryLle(TernaryLle),
    BinarySle(BinarySle),
    TernarySle(TernarySle),
}

/// Successful calculation with the provenance of the parameters.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Solution {
    pub model: ModelKind,
    pub components: Vec<String>,
    pub parameter_sets: Vec<String>,
    pub references: Vec<String>,
    /// warnings that concern the parameters rather than the calculation
    pub parameter_warning: Option<String>,
    pub result: CalculationResult,
}

/// Outcome of a request.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Success(Box<Solution>),
    Failure {
        error: String,
        /// whether component data or parameters are missing
        missing_data: bool,
    },
}

impl Response {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn solution(&self) -> Option<&Solution> {
        match self {
            Self::Success(s) => Some(s),
            Self::Failure { .. } => None,
        }
    }
}

/// Validate a request, build the model and perform the calculation.
pub fn calculate(store: &ComponentStore, request: &EquilibriumRequest) -> PhaseqResult<Response> {
    let kind: ModelKind = request.model.parse()?;
    let calculation = &request.calculation;
    calculation.validate(request.components.len())?;

    let solution = store
        .components(&request.components)
        .and_then(|components| {
            let setup = store.model(
                kind,
                calculation.equilibrium(),
                &components,
                calculation.temperature(),
            )?;
            let parameter_warning = setup.warning();
            let system = EquilibriumSystem::new(setup.model, components)?
                .with_vapor_phase(request.vapor_phase);
            let result = dispatch(&system, calculation)?;
            Ok(Solution {
                model: kind,
                components: system.names(),
                parameter_sets: setup.parameter_sets,
                references: setup.references,
                parameter_warning,
                result,
            })
        });
    match solution {
        Ok(s) => Ok(Response::Success(Box::new(s))),
        Err(e) if e.is_data_error() => Ok(Response::Failure {
            error: e.to_string(),
            missing_data: true,
        }),
        Err(
            e @ (PhaseqError::NotConverged(_)
            | PhaseqError::IterationFailed(_)
            | PhaseqError::TrivialSolution
            | PhaseqError::NoPhaseSplit),
        ) => Ok(Response::Failure {
            error: e.to_string(),
            missing_data: false,
        }),
        Err(e) => Err(e),
    }
}

fn vec(v: &DVector<f64>) -> Vec<f64> {
    v.iter().copied().collect()
}

fn celsius(t: Temperature) -> f64 {
    TemperatureUnit::Celsius.value(t)
}

fn kilopascal(p: Pressure) -> f64 {
    PressureUnit::KiloPascal.value(p)
}

/// Index of a component given by name, CAS number or position in the request.
fn component_index(
    system: &EquilibriumSystem<ActivityCoefficientModel>,
    query: &str,
) -> PhaseqResult<usize> {
    system
        .components
        .iter()
        .position(|c| c.identifier.matches(query))
        .ok_or_else(|| PhaseqError::ComponentsNotFound(query.into()))
}

fn saturation_point(vle: &PhaseEquilibrium<2>) -> SaturationPoint {
    let (liquid, vapor) = (vle.liquid(), vle.vapor());
    SaturationPoint {
        temperature_c: celsius(vle.temperature),
        temperature_k: vle.temperature.convert_into(KELVIN),
        pressure_kpa: vle.pressure.map_or(f64::NAN, kilopascal),
        x: vec(&liquid.molefracs),
        y: vec(&vapor.molefracs),
        k: vec(&vle.k_values()),
        gamma: vec(&liquid.coefficients),
        converged: vle.converged(),
        residual: vle.convergence.residual,
        iterations: vle.convergence.iterations,
        warning: vle.convergence.warning(),
    }
}

fn dispatch(
    system: &EquilibriumSystem<ActivityCoefficientModel>,
    calculation: &Calculation,
) -> PhaseqResult<CalculationResult> {
    let options = SolverOptions::default();
    let names = system.names();
    let name = |i: usize| names[i].clone();
    Ok(match calculation {
        Calculation::BubblePressure {
            temperature,
            composition,
        } => {
            let x = DVector::from_column_slice(composition);
            let vle =
                PhaseEquilibrium::bubble_point(system, temperature.quantity(), &x, None, options)?;
            CalculationResult::BubblePressure(saturation_point(&vle))
        }
        Calculation::BubbleTemperature {
            pressure,
            composition,
        } => {
            let x = DVector::from_column_slice(composition);
            let vle =
                PhaseEquilibrium::bubble_point(system, pressure.quantity(), &x, None, options)?;
            CalculationResult::BubbleTemperature(saturation_point(&vle))
        }
        Calculation::DewPressure {
            temperature,
            composition,
        } => {
            let y = DVector::from_column_slice(composition);
            let vle =
                PhaseEquilibrium::dew_point(system, temperature.quantity(), &y, None, options)?;
            CalculationResult::DewPressure(saturation_point(&vle))
        }
        Calculation::DewTemperature {
            pressure,
            composition,
        } => {
            let y = DVector::from_column_slice(composition);
            let vle = PhaseEquilibrium::dew_point(system, pressure.quantity(), &y, None, options)?;
            CalculationResult::DewTemperature(saturation_point(&vle))
        }
        Calculation::VleFlash {
            temperature,
            pressure,
            composition,
        } => {
            let z = DVector::from_column_slice(composition);
            let vle = PhaseEquilibrium::tp_flash(
                system,
                temperature.quantity(),
                pressure.quantity(),
                &z,
                None,
                options,
            )?;
            let (liquid, vapor) = (vle.liquid(), vle.vapor());
            CalculationResult::VleFlash(VleFlash {
                temperature_c: celsius(vle.temperature),
                temperature_k: vle.temperature.convert_into(KELVIN),
                pressure_kpa: kilopascal(pressure.quantity()),
                z: composition.clone(),
                x: vec(&liquid.molefracs),
                y: vec(&vapor.molefracs),
                k: vec(&vle.k_values()),
                gamma: vec(&liquid.coefficients),
                beta: vapor.phase_fraction,
                two_phase: vle.two_phase,
                converged: vle.converged(),
                residual: vle.convergence.residual,
                iterations: vle.convergence.iterations,
                warning: vle.convergence.warning(),
            })
        }
        Calculation::LleFlash {
            temperature,
            composition,
        } => {
            let z = DVector::from_column_slice(composition);
            let lle =
                PhaseEquilibrium::lle_flash(system, temperature.quantity(), &z, None, options)?;
            let (l1, l2) = (lle.phase_i(), lle.phase_ii());
            CalculationResult::LleFlash(LleFlash {
                temperature_c: celsius(lle.temperature),
                temperature_k: lle.temperature.convert_into(KELVIN),
                z: composition.clone(),
                x_l1: vec(&l1.molefracs),
                x_l2: vec(&l2.molefracs),
                gamma_l1: vec(&l1.coefficients),
                gamma_l2: vec(&l2.coefficients),
                k: vec(&lle.k_values()),
                beta: lle.beta(),
                two_phase: lle.two_phase,
                converged: lle.converged(),
                residual: lle.convergence.residual,
                iterations: lle.convergence.iterations,
                warning: lle.convergence.warning(),
            })
        }
        Calculation::Extraction {
            temperature,
            composition,
            solvent_to_feed,
            efficiency,
            target,
            solute,
        } => {
            let z = DVector::from_column_slice(composition);
            let solute = solute
                .as_deref()
                .map(|s| component_index(system, s))
                .transpose()?;
            let design = Extraction::new(
                system,
                temperature.quantity(),
                &z,
                *solvent_to_feed,
                *efficiency,
                *target,
                solute,
                options,
            )?;
            let t = design.equilibrium.temperature;
            CalculationResult::Extraction(ExtractionDesign {
                temperature_c: celsius(t),
                temperature_k: t.convert_into(KELVIN),
                solvent: name(design.solvent),
                diluent: name(design.diluent),
                solute: design.solute.map(name),
                mixing_point: vec(&design.mixing_point),
                x_raffinate: vec(&design.raffinate().molefracs),
                x_extract: vec(&design.extract().molefracs),
                gamma_raffinate: vec(&design.raffinate().coefficients),
                gamma_extract: vec(&design.extract().coefficients),
                k: design.distribution_coefficient,
                extraction_factor: design.extraction_factor,
                theoretical_stages: design.theoretical_stages,
                actual_stages: design.actual_stages,
                rounded_stages: design.rounded_stages,
                recovery: design.recovery,
                two_phase: design.two_phase(),
                converged: design.converged(),
                warning: design.warning(),
            })
        }
        Calculation::Solubility {
            temperature,
            solute,
            equation,
        } => {
            let solute = solute
                .as_deref()
                .map(|s| component_index(system, s))
                .transpose()?;
            let sle = system.solubility(temperature.quantity(), solute, *equation, options)?;
            CalculationResult::Solubility(Solubility {
                temperature_c: celsius(sle.temperature),
                temperature_k: sle.temperature.convert_into(KELVIN),
                equation: sle.equation,
                solute: sle.solute.map(name),
                solubility: sle.solubility(),
                x: vec(&sle.molefracs),
                gamma: vec(&sle.activity_coefficients),
                ideal_solubility: vec(&sle.ideal_solubility),
                solid: sle.solid.clone(),
                converged: sle.convergence.is_converged(),
                residual: sle.convergence.residual,
                warning: sle.convergence.warning(),
            })
        }
        Calculation::Crystallization {
            composition,
            equation,
        } => {
            let x = DVector::from_column_slice(composition);
            let sle = system.crystallization_temperature(&x, *equation, options)?;
            CalculationResult::Crystallization(Crystallization {
                equation: sle.equation,
                x: composition.clone(),
                temperature_c: sle.temperature.map(celsius),
                temperature_k: sle.temperature.map(|t| t.convert_into(KELVIN)),
                liquidus_t_c: sle
                    .liquidus_temperatures
                    .iter()
                    .map(|t| t.map(celsius))
                    .collect(),
                crystallizing_component: sle.crystallizing_component.map(name),
                gamma: sle.activity_coefficients.as_ref().map(vec),
                converged: sle.convergence.is_converged(),
                residual: sle.convergence.residual,
                warning: sle.convergence.warning(),
            })
        }
        Calculation::Pxy {
            temperature,
            points,
        } => {
            let t = temperature.quantity();
            let diagram = PhaseDiagramBinary::new(system, t, *points, options)?;
            CalculationResult::Pxy(PxyDiagram {
                temperature_c: celsius(t),
                temperature_k: t.convert_into(KELVIN),
                x1: diagram.bubble_x1(),
                y1: diagram.bubble_y1(),
                p_bubble_kpa: pressures(&diagram.bubble),
                dew_y1: diagram.dew_y1(),
                p_dew_kpa: pressures(&diagram.dew),
                failures: diagram.failures(),
                converged: diagram.failures() == 0,
                warning: trace_warning(&diagram),
            })
        }
        Calculation::Txy { pressure, points } => {
            let p = pressure.quantity();
            let diagram = PhaseDiagramBinary::new(system, p, *points, options)?;
            let temperatures = |points: &[phaseq_core::VlePoint]| -> Vec<f64> {
                points
                    .iter()
                    .map(|p| celsius(p.equilibrium.temperature))
                    .collect()
            };
            CalculationResult::Txy(TxyDiagram {
                pressure_kpa: kilopascal(p),
                x1: diagram.bubble_x1(),
                y1: diagram.bubble_y1(),
                t_bubble_c: temperatures(&diagram.bubble),
                dew_y1: diagram.dew_y1(),
                t_dew_c: temperatures(&diagram.dew),
                failures: diagram.failures(),
                converged: diagram.failures() == 0,
                warning: trace_warning(&diagram),
            })
        }
        Calculation::TernaryLle {
            temperature,
            tie_lines,
        } => {
            let t = temperature.quantity();
            let diagram = TernaryLleDiagram::new(system, t, *tie_lines, options)?;
            let warning = if diagram.tie_lines.is_empty() {
                Some("No two-phase region found at this temperature.".to_string())
            } else if !diagram.failures.is_empty() {
                Some(format!(
                    "{} of {} flash calculations failed.",
                    diagram.failures.len(),
                    diagram.flashes
                ))
            } else {
                None
            };
            CalculationResult::TernaryLle(TernaryLle {
                temperature_c: celsius(t),
                temperature_k: t.convert_into(KELVIN),
                tie_lines: diagram
                    .tie_lines
                    .iter()
                    .map(|tl| TieLineOutput {
                        x_l1: vec(&tl.phase_i),
                        x_l2: vec(&tl.phase_ii),
                        beta: tl.beta,
                    })
                    .collect(),
                binodal: diagram.binodal.iter().map(vec).collect(),
                immiscible_pair: diagram.immiscible_pair.map(|(i, j)| (name(i), name(j))),
                flashes: diagram.flashes,
                failures: diagram.failures.len(),
                converged: diagram.failures.is_empty(),
                warning,
            })
        }
        Calculation::BinarySle { points, equation } => {
            let diagram = BinarySleDiagram::new(system, *points, *equation, options)?;
            let liquidus = |branch: &phaseq_core::LiquidusBranch| LiquidusOutput {
                solid: name(branch.solid),
                x1: branch.x1(),
                temperature_c: branch.points.iter().map(|p| celsius(p.temperature)).collect(),
            };
            let warning = diagram.unstable_region.map(|(a, b)| {
                format!("Liquid-liquid immiscibility between x1 = {a:.3} and x1 = {b:.3}.")
            });
            CalculationResult::BinarySle(BinarySle {
                equation: diagram.equation,
                eutectic: EutecticOutput {
                    x1: diagram.eutectic.x1,
                    temperature_c: celsius(diagram.eutectic.temperature),
                    temperature_k: diagram.eutectic.temperature.convert_into(KELVIN),
                    converged: diagram.eutectic.converged,
                },
                left: liquidus(&diagram.left),
                right: liquidus(&diagram.right),
                unstable_region: diagram.unstable_region,
                failures: diagram.failures.len(),
                converged: diagram.eutectic.converged && diagram.failures.is_empty(),
                warning,
            })
        }
        Calculation::TernarySle {
            temperature,
            grid,
            equation,
        } => {
            let t = temperature.quantity();
            let map = TernarySleMap::new(system, t, *grid, *equation)?;
            CalculationResult::TernarySle(TernarySle {
                temperature_c: celsius(t),
                temperature_k: t.convert_into(KELVIN),
                equation: map.equation,
                points: map
                    .points
                    .iter()
                    .map(|p| SlePointOutput {
                        x: vec(&p.molefracs),
                        solids: p.solids.iter().map(|&i| name(i)).collect(),
                        label: p.label,
                    })
                    .collect(),
                liquid: map.count(SlePhaseLabel::Liquid),
                solid_liquid: map.count(SlePhaseLabel::SolidLiquid),
                eutectic: map.count(SlePhaseLabel::Eutectic),
            })
        }
    })
}

fn pressures(points: &[phaseq_core::VlePoint]) -> Vec<f64> {
    points
        .iter()
        .map(|p| p.equilibrium.pressure.map_or(f64::NAN, kilopascal))
        .collect()
}

fn trace_warning(diagram: &PhaseDiagramBinary) -> Option<String> {
    let failures = diagram
        .bubble_failures
        .iter()
        .chain(&diagram.dew_failures)
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    (!failures.is_empty()).then(|| failures.join(" "))
}
