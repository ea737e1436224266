// 🤝 Connection Store - curator-confirmed hospital ↔ company links
//
// Ordered by confirmation. Duplicates are allowed and removed independently.
// Every mutation is all-or-nothing.

use crate::error::{MappingError, Result};
use crate::records::NamedCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Header row of the connections file and the merge export
pub const CONNECTION_HEADER: [&str; 4] = [
    "hospital name",
    "hospital code",
    "company name",
    "company code",
];

// ============================================================================
// CONNECTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub hosp_name: String,
    pub hosp_code: String,
    pub lg_name: String,
    pub lg_code: String,
}

impl Connection {
    pub fn new(
        hosp_name: impl Into<String>,
        hosp_code: impl Into<String>,
        lg_name: impl Into<String>,
        lg_code: impl Into<String>,
    ) -> Self {
        Connection {
            hosp_name: hosp_name.into(),
            hosp_code: hosp_code.into(),
            lg_name: lg_name.into(),
            lg_code: lg_code.into(),
        }
    }

    /// Build from the two selected registry rows, text copied as displayed
    pub fn between(hospital: &NamedCode, company: &NamedCode) -> Self {
        Connection::new(
            hospital.name.clone(),
            hospital.code.clone(),
            company.name.clone(),
            company.code.clone(),
        )
    }

    /// Build from a positional file row; missing trailing cells are blank
    pub fn from_cells<'a>(cells: impl IntoIterator<Item = &'a str>) -> Self {
        let mut cells = cells.into_iter().map(str::to_string);
        Connection {
            hosp_name: cells.next().unwrap_or_default(),
            hosp_code: cells.next().unwrap_or_default(),
            lg_name: cells.next().unwrap_or_default(),
            lg_code: cells.next().unwrap_or_default(),
        }
    }

    pub fn cells(&self) -> [&str; 4] {
        [&self.hosp_name, &self.hosp_code, &self.lg_name, &self.lg_code]
    }
}

// ============================================================================
// CONNECTION STORE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ConnectionStore {
    connections: Vec<Connection>,
}

impl ConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a link between the selected rows. Returns its position.
    pub fn confirm(
        &mut self,
        hospital: Option<&NamedCode>,
        company: Option<&NamedCode>,
    ) -> Result<usize> {
        let hospital = hospital
            .ok_or_else(|| MappingError::NoSelection("select a row in the hospital registry".into()))?;
        let company = company
            .ok_or_else(|| MappingError::NoSelection("select a row in the company registry".into()))?;

        self.connections.push(Connection::between(hospital, company));
        let position = self.connections.len() - 1;

        log::debug!(
            "Confirmed connection #{}: {} ({}) ↔ {} ({})",
            position,
            hospital.name,
            hospital.code,
            company.name,
            company.code
        );

        Ok(position)
    }

    /// Remove the connections at the given current positions.
    ///
    /// Every position is validated before anything is removed; removal then
    /// runs from the highest index down so earlier positions stay valid.
    /// Returns the removed connections in ascending position order.
    pub fn revoke(&mut self, positions: &BTreeSet<usize>) -> Result<Vec<Connection>> {
        if positions.is_empty() {
            return Err(MappingError::NoSelection(
                "select the connection rows to remove".into(),
            ));
        }

        if let Some(&last) = positions.iter().next_back() {
            if last >= self.connections.len() {
                return Err(MappingError::NoSelection(format!(
                    "connection row {} does not exist ({} rows)",
                    last,
                    self.connections.len()
                )));
            }
        }

        let mut removed: Vec<Connection> = positions
            .iter()
            .rev()
            .map(|&position| self.connections.remove(position))
            .collect();
        removed.reverse();

        log::debug!("Revoked {} connection(s) at {:?}", removed.len(), positions);

        Ok(removed)
    }

    /// Discard the current sequence and install `connections`
    pub fn replace_all(&mut self, connections: Vec<Connection>) {
        self.connections = connections;
    }

    /// Read-only copy of the current sequence
    pub fn snapshot(&self) -> Vec<Connection> {
        self.connections.clone()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions(items: &[usize]) -> BTreeSet<usize> {
        items.iter().copied().collect()
    }

    fn store_with(n: usize) -> ConnectionStore {
        let mut store = ConnectionStore::new();
        for i in 0..n {
            let hosp = NamedCode::new(format!("Hosp {}", i), format!("H{}", i));
            let lg = NamedCode::new(format!("Company {}", i), format!("L{}", i));
            store.confirm(Some(&hosp), Some(&lg)).unwrap();
        }
        store
    }

    #[test]
    fn test_confirm_appends_in_order() {
        let store = store_with(3);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0], Connection::new("Hosp 0", "H0", "Company 0", "L0"));
        assert_eq!(snapshot[2].lg_code, "L2");
    }

    #[test]
    fn test_confirm_requires_both_selections() {
        let mut store = store_with(1);
        let hosp = NamedCode::new("Alpha", "H1");

        let err = store.confirm(Some(&hosp), None).unwrap_err();
        assert!(matches!(err, MappingError::NoSelection(_)));

        let err = store.confirm(None, Some(&hosp)).unwrap_err();
        assert!(matches!(err, MappingError::NoSelection(_)));

        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_confirm_allows_blank_fields_and_duplicates() {
        let mut store = ConnectionStore::new();
        let hosp = NamedCode::new("Alpha", "");
        let lg = NamedCode::new("", "L1");

        assert_eq!(store.confirm(Some(&hosp), Some(&lg)).unwrap(), 0);
        assert_eq!(store.confirm(Some(&hosp), Some(&lg)).unwrap(), 1);

        let snapshot = store.snapshot();
        assert_eq!(snapshot[0], snapshot[1]);
        assert_eq!(snapshot[0], Connection::new("Alpha", "", "", "L1"));
    }

    #[test]
    fn test_revoke_keeps_survivor_order() {
        let mut store = store_with(3);

        let removed = store.revoke(&positions(&[0, 2])).unwrap();

        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].hosp_code, "H0");
        assert_eq!(removed[1].hosp_code, "H2");

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].hosp_code, "H1");
    }

    #[test]
    fn test_revoke_duplicate_independently() {
        let mut store = ConnectionStore::new();
        let hosp = NamedCode::new("Alpha", "H1");
        let lg = NamedCode::new("Beta", "L2");
        store.confirm(Some(&hosp), Some(&lg)).unwrap();
        store.confirm(Some(&hosp), Some(&lg)).unwrap();

        store.revoke(&positions(&[1])).unwrap();

        assert_eq!(store.snapshot(), vec![Connection::between(&hosp, &lg)]);
    }

    #[test]
    fn test_revoke_empty_selection_is_noop() {
        let mut store = store_with(2);

        let err = store.revoke(&BTreeSet::new()).unwrap_err();

        assert!(matches!(err, MappingError::NoSelection(_)));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_revoke_out_of_range_removes_nothing() {
        let mut store = store_with(3);
        let before = store.snapshot();

        let err = store.revoke(&positions(&[0, 5])).unwrap_err();

        assert!(matches!(err, MappingError::NoSelection(_)));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_confirm_revoke_sequence_net_effect() {
        let mut store = store_with(4); // H0 H1 H2 H3
        store.revoke(&positions(&[1])).unwrap(); // H0 H2 H3
        let hosp = NamedCode::new("Hosp 9", "H9");
        let lg = NamedCode::new("Company 9", "L9");
        store.confirm(Some(&hosp), Some(&lg)).unwrap(); // H0 H2 H3 H9
        store.revoke(&positions(&[0, 2])).unwrap(); // H2 H9

        let codes: Vec<String> = store.snapshot().into_iter().map(|c| c.hosp_code).collect();
        assert_eq!(codes, vec!["H2", "H9"]);
        assert_eq!(store.len(), 5 - 3);
    }

    #[test]
    fn test_replace_all() {
        let mut store = store_with(3);

        store.replace_all(vec![Connection::new("A", "1", "B", "2")]);

        assert_eq!(store.len(), 1);
        assert_eq!(store.connections()[0].hosp_name, "A");

        store.replace_all(Vec::new());
        assert!(store.is_empty());
    }

    #[test]
    fn test_from_cells_pads_missing_columns() {
        let connection = Connection::from_cells(["Alpha", "H1"]);
        assert_eq!(connection, Connection::new("Alpha", "H1", "", ""));

        let connection = Connection::from_cells(["a", "b", "c", "d", "extra"]);
        assert_eq!(connection.cells(), ["a", "b", "c", "d"]);
    }
}
