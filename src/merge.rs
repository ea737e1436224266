// 🔗 Union Merger - full outer join of both registries by trimmed name
//
// Used for the offline export; the interactive connection store never reads it.

use crate::connections::CONNECTION_HEADER;
use crate::error::{MappingError, Result};
use crate::records::NamedCode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// One row of the union view. Both name fields carry the same trimmed name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedRecord {
    pub hosp_name: String,
    pub hosp_code: String,
    pub lg_name: String,
    pub lg_code: String,
}

impl MergedRecord {
    pub fn in_both(&self) -> bool {
        !self.hosp_code.is_empty() && !self.lg_code.is_empty()
    }
}

/// Trimmed name → code. Later duplicates overwrite earlier ones.
fn index_by_name(records: &[NamedCode]) -> HashMap<&str, &str> {
    let mut index = HashMap::new();
    for record in records {
        if record.key().is_empty() {
            continue;
        }
        index.insert(record.key(), record.code.as_str());
    }
    index
}

/// Merge two registries into one record per distinct name, sorted by name.
pub fn merge(hospital: &[NamedCode], company: &[NamedCode]) -> Vec<MergedRecord> {
    let hosp_index = index_by_name(hospital);
    let lg_index = index_by_name(company);

    let names: BTreeSet<&str> = hosp_index.keys().chain(lg_index.keys()).copied().collect();

    names
        .into_iter()
        .map(|name| MergedRecord {
            hosp_name: name.to_string(),
            hosp_code: hosp_index.get(name).map(|c| c.to_string()).unwrap_or_default(),
            lg_name: name.to_string(),
            lg_code: lg_index.get(name).map(|c| c.to_string()).unwrap_or_default(),
        })
        .collect()
}

/// Counts of names found in one registry only vs. both
pub fn merge_stats(merged: &[MergedRecord]) -> BTreeMap<&'static str, usize> {
    let mut stats = BTreeMap::new();
    for record in merged {
        let bucket = match (record.hosp_code.is_empty(), record.lg_code.is_empty()) {
            (false, false) => "both",
            (false, true) => "hospital_only",
            (true, false) => "company_only",
            (true, true) => "no_code",
        };
        *stats.entry(bucket).or_insert(0) += 1;
    }
    stats
}

/// Export the union view as CSV with the connections-file header
pub fn write_merged(path: &Path, merged: &[MergedRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| MappingError::persistence(path, e))?;

    writer
        .write_record(CONNECTION_HEADER)
        .map_err(|e| MappingError::persistence(path, e))?;
    for record in merged {
        writer
            .write_record([
                &record.hosp_name,
                &record.hosp_code,
                &record.lg_name,
                &record.lg_code,
            ])
            .map_err(|e| MappingError::persistence(path, e))?;
    }
    writer.flush().map_err(|e| MappingError::persistence(path, e))?;

    log::info!("Wrote {} merged records to {}", merged.len(), path.display());
    Ok(())
}
