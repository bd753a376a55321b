use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::domain::{HumId, HumVersionId, version_number};
use crate::model::HumVersion;

/// One hum version listing a dataset version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub hum_id: HumId,
    pub hum_version_id: HumVersionId,
}

/// A dataset version claimed by more than one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipConflict {
    pub dataset_id: String,
    pub version: String,
    pub claims: Vec<Claim>,
}

/// Owners of a dataset changing between two consecutive versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipDrift {
    pub dataset_id: String,
    pub from_version: String,
    pub to_version: String,
    pub from_owners: Vec<HumId>,
    pub to_owners: Vec<HumId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OwnershipReport {
    pub conflicts: Vec<OwnershipConflict>,
    pub drifts: Vec<OwnershipDrift>,
}

impl OwnershipReport {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty() && self.drifts.is_empty()
    }
}

/// Numeric versions first in numeric order, then anything else
/// lexicographically.
fn version_sort_key(label: &str) -> (u8, u32, String) {
    match version_number(label) {
        Some(number) => (0, number, String::new()),
        None => (1, 0, label.to_string()),
    }
}

pub fn reconcile(versions: &[HumVersion]) -> OwnershipReport {
    let mut claims: BTreeMap<(String, String), BTreeSet<Claim>> = BTreeMap::new();
    for version in versions {
        for dataset in &version.datasets {
            claims
                .entry((dataset.dataset_id.clone(), dataset.version.clone()))
                .or_default()
                .insert(Claim {
                    hum_id: version.hum_id.clone(),
                    hum_version_id: version.hum_version_id.clone(),
                });
        }
    }

    let mut report = OwnershipReport::default();
    let mut by_dataset: BTreeMap<&str, Vec<(&str, BTreeSet<HumId>)>> = BTreeMap::new();
    for ((dataset_id, version), claimants) in &claims {
        let owners = claimants
            .iter()
            .map(|claim| claim.hum_id.clone())
            .collect::<BTreeSet<_>>();
        if owners.len() > 1 {
            tracing::warn!(dataset_id = %dataset_id, version = %version, owners = owners.len(), "ownership conflict");
            report.conflicts.push(OwnershipConflict {
                dataset_id: dataset_id.clone(),
                version: version.clone(),
                claims: claimants.iter().cloned().collect(),
            });
        }
        by_dataset
            .entry(dataset_id)
            .or_default()
            .push((version, owners));
    }

    for (dataset_id, mut entries) in by_dataset {
        entries.sort_by_key(|(version, _)| version_sort_key(version));
        for pair in entries.windows(2) {
            let (from_version, from_owners) = &pair[0];
            let (to_version, to_owners) = &pair[1];
            if from_owners != to_owners {
                report.drifts.push(OwnershipDrift {
                    dataset_id: dataset_id.to_string(),
                    from_version: from_version.to_string(),
                    to_version: to_version.to_string(),
                    from_owners: from_owners.iter().cloned().collect(),
                    to_owners: to_owners.iter().cloned().collect(),
                });
            }
        }
    }
    report
}
