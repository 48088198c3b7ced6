use super::Identifier;
use crate::vapor_pressure::AntoineRecord;
use indexmap::IndexMap;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

/// Critical point and acentric factor of a pure substance.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct CriticalRecord {
    /// critical temperature in K
    pub tc: f64,
    /// critical pressure in Pa
    pub pc: f64,
    /// acentric factor
    pub acentric_factor: f64,
}

/// Melting properties of a pure substance.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct FusionRecord {
    /// melting temperature in K
    pub melting_temperature: f64,
    /// enthalpy of fusion in J/mol
    pub enthalpy_of_fusion: f64,
    /// triple point temperature in K, defaults to the melting temperature
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triple_temperature: Option<f64>,
    /// heat capacity difference between liquid and solid in J/(mol K)
    #[serde(default)]
    #[serde(skip_serializing_if = "f64::is_zero")]
    pub delta_cp: f64,
}

impl FusionRecord {
    pub fn new(melting_temperature: f64, enthalpy_of_fusion: f64) -> Self {
        Self {
            melting_temperature,
            enthalpy_of_fusion,
            triple_temperature: None,
            delta_cp: 0.0,
        }
    }
}

/// Everything known about a pure substance.
///
/// Component records are immutable once loaded and are
/// copied into the systems that use them.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ComponentRecord {
    pub identifier: Identifier,
    /// molar mass in g/mol
    #[serde(default)]
    #[serde(skip_serializing_if = "f64::is_zero")]
    pub molarweight: f64,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical: Option<CriticalRecord>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub antoine: Option<AntoineRecord>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fusion: Option<FusionRecord>,
    /// UNIFAC subgroups and their number of occurences
    #[serde(default)]
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub groups: IndexMap<String, f64>,
}

impl ComponentRecord {
    /// Record that only carries an identifier.
    pub fn new(identifier: Identifier, molarweight: f64) -> Self {
        Self {
            identifier,
            molarweight,
            critical: None,
            antoine: None,
            fusion: None,
            groups: IndexMap::new(),
        }
    }

    pub fn with_antoine(mut self, antoine: AntoineRecord) -> Self {
        self.antoine = Some(antoine);
        self
    }

    pub fn with_critical(mut self, critical: CriticalRecord) -> Self {
        self.critical = Some(critical);
        self
    }

    pub fn with_fusion(mut self, fusion: FusionRecord) -> Self {
        self.fusion = Some(fusion);
        self
    }

    pub fn with_groups<S: Into<String>>(
        mut self,
        groups: impl IntoIterator<Item = (S, f64)>,
    ) -> Self {
        self.groups = groups.into_iter().map(|(g, n)| (g.into(), n)).collect();
        self
    }

    pub fn name(&self) -> String {
        self.identifier.label()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_component() {
        let r = r#"
        {
            "identifier": {
                "cas": "71-43-2",
                "name": "Benzene",
                "localized_name": "Benceno",
                "formula": "C6H6"
            },
            "molarweight": 78.11,
            "critical": {"tc": 562.05, "pc": 4895000.0, "acentric_factor": 0.21},
            "antoine": {"a": 6.90565, "b": 1211.033, "c": -52.36},
            "fusion": {"melting_temperature": 278.68, "enthalpy_of_fusion": 9870.0},
            "groups": {"ACH": 6}
        }
        "#;
        let record: ComponentRecord = serde_json::from_str(r).expect("Unable to parse json.");
        assert_eq!(record.name(), "Benzene");
        assert_eq!(record.groups["ACH"], 6.0);
        assert_eq!(record.fusion.map(|f| f.delta_cp), Some(0.0));
        assert!(record.antoine.is_some());
    }

    #[test]
    fn missing_properties_default_to_none() {
        let r = r#"{"identifier": {"name": "Sulfolane"}}"#;
        let record: ComponentRecord = serde_json::from_str(r).expect("Unable to parse json.");
        assert!(record.antoine.is_none());
        assert!(record.critical.is_none());
        assert!(record.groups.is_empty());
    }
}
