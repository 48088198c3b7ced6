//! Structures and traits that can be used to build model parameters for activity coefficient models.
use crate::errors::*;
use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use std::array;
use std::collections::HashMap;

mod component;
mod identifier;
mod model_record;

pub use component::{ComponentRecord, CriticalRecord, FusionRecord};
pub use identifier::{Identifier, IdentifierOption};
pub use model_record::{
    BinaryRecord, BinarySegmentRecord, PureRecord, Record, ReversibleRecord, SegmentRecord,
};

#[derive(Clone, Debug)]
pub struct Pure<M> {
    pub model_record: M,
    pub component_index: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct Binary<B> {
    pub id1: usize,
    pub id2: usize,
    pub model_record: B,
}

impl<B> Binary<B> {
    pub fn new(id1: usize, id2: usize, model_record: B) -> Self {
        Self {
            id1,
            id2,
            model_record,
        }
    }
}

/// Pure and binary parameters of a mixture in the order of its components.
#[derive(Clone, Debug)]
pub struct Parameters<P, B> {
    pub pure: Vec<Pure<P>>,
    pub binary: Vec<Binary<B>>,
    pub identifiers: Vec<Identifier>,
}

impl<P: Clone, B: Clone> Parameters<P, B> {
    pub fn new(
        pure_records: Vec<PureRecord<P>>,
        binary_records: Vec<BinaryRecord<usize, B>>,
    ) -> PhaseqResult<Self> {
        let n = pure_records.len();
        if let Some(br) = binary_records
            .iter()
            .find(|br| br.id1 >= n || br.id2 >= n || br.id1 == br.id2)
        {
            return Err(PhaseqError::IncompatibleParameters(format!(
                "binary record ({}, {}) does not fit a system of {n} components",
                br.id1, br.id2
            )));
        }
        let (identifiers, pure): (Vec<_>, Vec<_>) = pure_records
            .into_iter()
            .enumerate()
            .map(|(i, pr)| {
                (
                    pr.identifier,
                    Pure {
                        model_record: pr.model_record,
                        component_index: i,
                    },
                )
            })
            .unzip();
        let binary = binary_records
            .into_iter()
            .filter_map(|br| br.model_record.map(|m| Binary::new(br.id1, br.id2, m)))
            .collect();
        Ok(Self {
            pure,
            binary,
            identifiers,
        })
    }

    pub fn components(&self) -> usize {
        self.pure.len()
    }

    /// Readable names of all components.
    pub fn names(&self) -> Vec<String> {
        self.identifiers.iter().map(Identifier::label).collect()
    }

    pub fn collate<F, const N: usize>(&self, f: F) -> [DVector<f64>; N]
    where
        F: Fn(&P) -> [f64; N],
    {
        array::from_fn(|i| {
            DVector::from_iterator(
                self.pure.len(),
                self.pure.iter().map(|pr| f(&pr.model_record)[i]),
            )
        })
    }

    /// Collect binary parameters into (generally asymmetric) matrices.
    ///
    /// The closure returns the pair `(p_12, p_21)` for each parameter,
    /// the diagonal is zero.
    pub fn collate_binary<F, const N: usize>(&self, f: F) -> [DMatrix<f64>; N]
    where
        F: Fn(&B) -> [(f64, f64); N],
    {
        array::from_fn(|i| {
            let mut b_mat = DMatrix::zeros(self.pure.len(), self.pure.len());
            for br in &self.binary {
                let (b12, b21) = f(&br.model_record)[i];
                b_mat[(br.id1, br.id2)] = b12;
                b_mat[(br.id2, br.id1)] = b21;
            }
            b_mat
        })
    }
}

impl<P: Clone, B: ReversibleRecord> Parameters<P, B> {
    /// Creates parameters that are guaranteed to contain a binary record
    /// for every pair of components.
    pub fn from_complete_records(
        pure_records: Vec<PureRecord<P>>,
        binary_records: &[BinaryRecord<Identifier, B>],
        identifier_option: IdentifierOption,
        model: &str,
    ) -> PhaseqResult<Self> {
        let binary_matrix =
            Self::binary_matrix_from_records(&pure_records, binary_records, identifier_option)?;
        let pairs = pure_records.iter().enumerate().array_combinations();
        for [(i, p1), (j, p2)] in pairs {
            if !binary_matrix
                .iter()
                .any(|br| br.id1 == i && br.id2 == j && br.model_record.is_some())
            {
                return Err(PhaseqError::ParameterMissing {
                    model: model.into(),
                    component1: p1.identifier.label(),
                    component2: p2.identifier.label(),
                });
            }
        }
        Self::new(pure_records, binary_matrix)
    }

    /// Helper function to build matrix from list of records in correct order.
    ///
    /// Records that are stored in reversed order are reversed on the fly.
    pub fn binary_matrix_from_records(
        pure_records: &[PureRecord<P>],
        binary_records: &[BinaryRecord<Identifier, B>],
        identifier_option: IdentifierOption,
    ) -> PhaseqResult<Vec<BinaryRecord<usize, B>>> {
        // Build Hashmap (id, id) -> BinaryRecord
        let binary_map: HashMap<_, _> = binary_records
            .iter()
            .filter_map(|br| {
                let id1 = br.id1.as_str(identifier_option);
                let id2 = br.id2.as_str(identifier_option);
                id1.and_then(|id1| id2.map(|id2| ((id1, id2), &br.model_record)))
            })
            .collect();

        // look up pure records in Hashmap
        pure_records
            .iter()
            .enumerate()
            .array_combinations()
            .map(|[(i1, p1), (i2, p2)]| {
                let Some(id1) = p1.identifier.as_str(identifier_option) else {
                    return Err(PhaseqError::MissingParameters(format!(
                        "No {} for pure record {} ({}).",
                        identifier_option, i1, p1.identifier
                    )));
                };
                let Some(id2) = p2.identifier.as_str(identifier_option) else {
                    return Err(PhaseqError::MissingParameters(format!(
                        "No {} for pure record {} ({}).",
                        identifier_option, i2, p2.identifier
                    )));
                };
                Ok([(i1, id1), (i2, id2)])
            })
            .filter_map(|x| {
                x.map(|[(i1, id1), (i2, id2)]| {
                    let record = if let Some(&b) = binary_map.get(&(id1, id2)) {
                        b.clone()
                    } else if let Some(&b) = binary_map.get(&(id2, id1)) {
                        b.as_ref().map(B::reversed)
                    } else {
                        None
                    };
                    record.map(|b| BinaryRecord::new(i1, i2, Some(b)))
                })
                .transpose()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Debug, Clone)]
    struct Size {
        r: f64,
    }

    #[derive(Serialize, Deserialize, Debug, Clone)]
    struct Energy {
        a12: f64,
        a21: f64,
    }

    impl ReversibleRecord for Energy {
        fn reversed(&self) -> Self {
            Self {
                a12: self.a21,
                a21: self.a12,
            }
        }
    }

    fn pure_records() -> Vec<PureRecord<Size>> {
        ["Water", "Ethanol", "Benzene"]
            .iter()
            .zip([0.92, 2.1055, 3.1878])
            .map(|(name, r)| PureRecord::new(Identifier::from_name(name), 0.0, Size { r }))
            .collect()
    }

    fn binary(id1: &str, id2: &str, a12: f64, a21: f64) -> BinaryRecord<Identifier, Energy> {
        BinaryRecord::new(
            Identifier::from_name(id1),
            Identifier::from_name(id2),
            Some(Energy { a12, a21 }),
        )
    }

    #[test]
    fn reversed_records_are_swapped() {
        let binary_records = vec![
            binary("Ethanol", "Water", 1.0, 2.0),
            binary("Water", "Benzene", 3.0, 4.0),
            binary("Ethanol", "Benzene", 5.0, 6.0),
        ];
        let parameters: Parameters<Size, Energy> = Parameters::from_complete_records(
            pure_records(),
            &binary_records,
            IdentifierOption::Name,
            "NRTL",
        )
        .expect("valid parameters");
        let [a] = parameters.collate_binary(|b| [(b.a12, b.a21)]);
        assert_eq!(a[(0, 1)], 2.0);
        assert_eq!(a[(1, 0)], 1.0);
        assert_eq!(a[(0, 2)], 3.0);
        assert_eq!(a[(2, 0)], 4.0);
        assert_eq!(a[(1, 2)], 5.0);
        assert_eq!(a[(2, 1)], 6.0);
        assert_eq!(a[(1, 1)], 0.0);
        let [r] = parameters.collate(|pr| [pr.r]);
        assert_eq!(r[1], 2.1055);
    }

    #[test]
    fn missing_pair_is_named() {
        let binary_records = vec![
            binary("Water", "Ethanol", 1.0, 2.0),
            binary("Water", "Benzene", 3.0, 4.0),
        ];
        let result: PhaseqResult<Parameters<Size, Energy>> = Parameters::from_complete_records(
            pure_records(),
            &binary_records,
            IdentifierOption::Name,
            "NRTL",
        );
        match result {
            Err(PhaseqError::ParameterMissing {
                model,
                component1,
                component2,
            }) => {
                assert_eq!(model, "NRTL");
                assert_eq!(component1, "Ethanol");
                assert_eq!(component2, "Benzene");
            }
            _ => panic!("expected a missing parameter error"),
        }
    }
}
