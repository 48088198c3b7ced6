use super::Identifier;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A collection of parameters with an arbitrary identifier.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Record<I, M> {
    pub identifier: I,
    #[serde(skip_serializing_if = "f64::is_zero")]
    #[serde(default)]
    pub molarweight: f64,
    #[serde(flatten)]
    pub model_record: M,
}

/// A collection of parameters of a pure substance.
pub type PureRecord<M> = Record<Identifier, M>;

/// Parameters describing an individual functional group of a molecule.
pub type SegmentRecord<M> = Record<String, M>;

impl<I, M> Record<I, M> {
    /// Create a new `Record`.
    pub fn new(identifier: I, molarweight: f64, model_record: M) -> Self {
        Self {
            identifier,
            molarweight,
            model_record,
        }
    }
}

/// Binary parameters whose values depend on the order of the two components.
///
/// Looking up a pair in reversed order has to swap the
/// parameters, e.g. `a12` and `a21` in NRTL.
pub trait ReversibleRecord: Clone {
    /// The same interaction seen from the other component.
    fn reversed(&self) -> Self;
}

impl ReversibleRecord for () {
    fn reversed(&self) -> Self {}
}

/// A collection of parameters that model interactions between two substances.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BinaryRecord<I, B> {
    /// Identifier of the first component
    pub id1: I,
    /// Identifier of the second component
    pub id2: I,
    /// Binary interaction parameter(s)
    #[serde(flatten)]
    pub model_record: Option<B>,
}

/// A collection of parameters that model interactions between two groups.
pub type BinarySegmentRecord<B> = BinaryRecord<String, B>;

impl<I, B> BinaryRecord<I, B> {
    /// Crates a new `BinaryRecord`.
    pub fn new(id1: I, id2: I, model_record: Option<B>) -> Self {
        Self {
            id1,
            id2,
            model_record,
        }
    }
}

impl<I: Clone, B: ReversibleRecord> BinaryRecord<I, B> {
    /// The record with swapped components.
    pub fn reversed(&self) -> Self {
        Self::new(
            self.id2.clone(),
            self.id1.clone(),
            self.model_record.as_ref().map(B::reversed),
        )
    }
}

fn compact_json<T: Serialize>(value: &T) -> Result<String, fmt::Error> {
    let s = serde_json::to_string(value)
        .map_err(|_| fmt::Error)?
        .replace("\"", "");
    Ok(s.replace(",", ", ").replace(":", ": "))
}

impl<M: Serialize> fmt::Display for PureRecord<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = compact_json(self)?;
        write!(f, "PureRecord({})", &s[1..s.len() - 1])
    }
}

impl<M: Serialize> fmt::Display for SegmentRecord<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = compact_json(self)?;
        write!(f, "SegmentRecord({})", &s[1..s.len() - 1])
    }
}

impl<I: Serialize, B: Serialize> fmt::Display for BinaryRecord<I, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = compact_json(self)?;
        write!(f, "BinaryRecord({})", &s[1..s.len() - 1])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Serialize, Deserialize, Debug, Default, Clone)]
    struct TestModelRecord {
        r: f64,
    }

    #[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
    struct TestBinaryRecord {
        a12: f64,
        a21: f64,
    }

    impl ReversibleRecord for TestBinaryRecord {
        fn reversed(&self) -> Self {
            Self {
                a12: self.a21,
                a21: self.a12,
            }
        }
    }

    #[test]
    fn deserialize() {
        let r = r#"
        {
            "identifier": {
                "cas": "64-17-5",
                "name": "Ethanol"
            },
            "molarweight": 46.07,
            "r": 2.1055
        }
        "#;
        let record: PureRecord<TestModelRecord> =
            serde_json::from_str(r).expect("Unable to parse json.");
        assert_eq!(record.identifier.cas, Some("64-17-5".into()));
        assert_eq!(record.model_record.r, 2.1055);
    }

    #[test]
    fn deserialize_list() {
        let r = r#"
        [
            {
                "identifier": {
                    "name": "CH3"
                },
                "r": 0.9011
            },
            {
                "identifier": {
                    "name": "CH2"
                },
                "r": 0.6744
            }
        ]"#;
        let records: Vec<PureRecord<TestModelRecord>> =
            serde_json::from_str(r).expect("Unable to parse json.");
        assert_eq!(records[0].identifier.name, Some("CH3".into()));
        assert_eq!(records[1].identifier.name, Some("CH2".into()))
    }

    #[test]
    fn reverse_binary() {
        let r = r#"
        {
            "id1": "Water",
            "id2": "Ethanol",
            "a12": 670.4,
            "a21": -55.2
        }
        "#;
        let record: BinaryRecord<String, TestBinaryRecord> =
            serde_json::from_str(r).expect("Unable to parse json.");
        let reversed = record.reversed();
        assert_eq!(reversed.id1, "Ethanol");
        assert_eq!(
            reversed.model_record,
            Some(TestBinaryRecord {
                a12: -55.2,
                a21: 670.4
            })
        );
    }
}
