use indexmap::IndexSet;
use nalgebra::{DMatrix, DVector};
use phaseq_core::parameter::{
    BinarySegmentRecord, ComponentRecord, Identifier, ReversibleRecord, SegmentRecord,
};
use phaseq_core::{PhaseqError, PhaseqResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// UNIFAC parameters of a subgroup.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UnifacGroupRecord {
    /// main group that determines the interactions of the subgroup
    pub main_group: String,
    /// relative van der Waals volume
    pub r: f64,
    /// relative van der Waals surface area
    pub q: f64,
}

impl UnifacGroupRecord {
    pub fn new(main_group: String, r: f64, q: f64) -> Self {
        Self { main_group, r, q }
    }
}

/// Interaction parameters between two main groups in K.
///
/// $\Psi_{mn} = \exp\left(-\frac{a_{mn}}{T}\right)$
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct UnifacBinaryRecord {
    pub a12: f64,
    pub a21: f64,
}

impl UnifacBinaryRecord {
    pub fn new(a12: f64, a21: f64) -> Self {
        Self { a12, a21 }
    }
}

impl ReversibleRecord for UnifacBinaryRecord {
    fn reversed(&self) -> Self {
        Self::new(self.a21, self.a12)
    }
}

/// Group decomposition of a mixture together with the group parameters.
#[derive(Clone, Debug)]
pub struct UnifacParameters {
    pub identifiers: Vec<Identifier>,
    /// subgroups that occur in the mixture
    pub groups: Vec<String>,
    pub main_groups: Vec<String>,
    /// number of occurences of every subgroup in every component
    pub counts: DMatrix<f64>,
    pub r: DVector<f64>,
    pub q: DVector<f64>,
    /// interaction parameters between subgroups, zero within a main group
    pub a: DMatrix<f64>,
}

impl UnifacParameters {
    /// Build the parameters of a mixture from the group decompositions of its components.
    ///
    /// Pairs of main groups without an interaction record do not interact (`a_mn = 0`).
    pub fn new(
        components: &[ComponentRecord],
        group_records: &[SegmentRecord<UnifacGroupRecord>],
        interaction_records: &[BinarySegmentRecord<UnifacBinaryRecord>],
    ) -> PhaseqResult<Self> {
        for c in components {
            check_groups(c, group_records)?;
        }
        let table: HashMap<_, _> = group_records
            .iter()
            .map(|g| (g.identifier.as_str(), &g.model_record))
            .collect();
        let groups: IndexSet<&str> = components
            .iter()
            .flat_map(|c| c.groups.keys().map(String::as_str))
            .collect();
        let records: Vec<_> = groups.iter().map(|g| table[g]).collect();

        let counts = DMatrix::from_fn(components.len(), groups.len(), |i, g| {
            components[i].groups.get(groups[g]).copied().unwrap_or(0.0)
        });
        let r = DVector::from_iterator(records.len(), records.iter().map(|g| g.r));
        let q = DVector::from_iterator(records.len(), records.iter().map(|g| g.q));

        let mut interactions = HashMap::new();
        for br in interaction_records {
            if let Some(b) = &br.model_record {
                interactions.insert((br.id1.as_str(), br.id2.as_str()), b.a12);
                interactions.insert((br.id2.as_str(), br.id1.as_str()), b.a21);
            }
        }
        let a = DMatrix::from_fn(records.len(), records.len(), |m, n| {
            let (mm, mn) = (records[m].main_group.as_str(), records[n].main_group.as_str());
            if mm == mn {
                0.0
            } else {
                interactions.get(&(mm, mn)).copied().unwrap_or(0.0)
            }
        });

        Ok(Self {
            identifiers: components.iter().map(|c| c.identifier.clone()).collect(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            main_groups: records.iter().map(|g| g.main_group.clone()).collect(),
            counts,
            r,
            q,
            a,
        })
    }

    /// Read the group and interaction tables from json files.
    pub fn from_json<P: AsRef<Path>>(
        components: &[ComponentRecord],
        file_groups: P,
        file_interactions: P,
    ) -> PhaseqResult<Self> {
        let group_records: Vec<SegmentRecord<UnifacGroupRecord>> =
            serde_json::from_reader(BufReader::new(File::open(file_groups)?))?;
        let interaction_records: Vec<BinarySegmentRecord<UnifacBinaryRecord>> =
            serde_json::from_reader(BufReader::new(File::open(file_interactions)?))?;
        Self::new(components, &group_records, &interaction_records)
    }

    pub fn components(&self) -> usize {
        self.identifiers.len()
    }
}

/// Check that every group of a component is contained in the group table.
pub fn check_groups(
    component: &ComponentRecord,
    group_records: &[SegmentRecord<UnifacGroupRecord>],
) -> PhaseqResult<()> {
    if component.groups.is_empty() {
        return Err(PhaseqError::MissingProperty {
            component: component.name(),
            property: "UNIFAC group decomposition".into(),
        });
    }
    match component
        .groups
        .keys()
        .find(|&g| !group_records.iter().any(|r| &r.identifier == g))
    {
        Some(g) => Err(PhaseqError::MissingProperty {
            component: component.name(),
            property: format!("UNIFAC parameters of group {g}"),
        }),
        None => Ok(()),
    }
}
