// 🎯 Coverage Highlighter - which registry rows are already linked?
//
// A code is covered when its trimmed form equals the trimmed code on the
// matching side of at least one connection. Blank codes are never covered.

use crate::connections::Connection;
use crate::records::{NamedCode, Side};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Confirmed codes per side, built from one connection snapshot
#[derive(Debug, Clone, Default)]
pub struct CoverageIndex {
    hospital: HashSet<String>,
    company: HashSet<String>,
}

impl CoverageIndex {
    pub fn from_connections(connections: &[Connection]) -> Self {
        let mut index = CoverageIndex::default();

        for connection in connections {
            let hosp_code = connection.hosp_code.trim();
            if !hosp_code.is_empty() {
                index.hospital.insert(hosp_code.to_string());
            }

            let lg_code = connection.lg_code.trim();
            if !lg_code.is_empty() {
                index.company.insert(lg_code.to_string());
            }
        }

        index
    }

    fn codes(&self, side: Side) -> &HashSet<String> {
        match side {
            Side::Hospital => &self.hospital,
            Side::Company => &self.company,
        }
    }

    pub fn is_covered(&self, code: &str, side: Side) -> bool {
        let code = code.trim();
        !code.is_empty() && self.codes(side).contains(code)
    }

    /// One flag per record, in record order
    pub fn coverage_map(&self, records: &[NamedCode], side: Side) -> Vec<bool> {
        records
            .iter()
            .map(|record| self.is_covered(&record.code, side))
            .collect()
    }

    pub fn summary(&self, records: &[NamedCode], side: Side) -> CoverageSummary {
        let covered = self
            .coverage_map(records, side)
            .into_iter()
            .filter(|&flag| flag)
            .count();

        CoverageSummary {
            side,
            total: records.len(),
            covered,
        }
    }
}

/// One-off query against a snapshot without keeping an index around
pub fn is_covered(connections: &[Connection], code: &str, side: Side) -> bool {
    CoverageIndex::from_connections(connections).is_covered(code, side)
}

pub fn coverage_map(connections: &[Connection], records: &[NamedCode], side: Side) -> Vec<bool> {
    CoverageIndex::from_connections(connections).coverage_map(records, side)
}

// ============================================================================
// COVERAGE SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub side: Side,
    pub total: usize,
    pub covered: usize,
}

impl CoverageSummary {
    pub fn uncovered(&self) -> usize {
        self.total - self.covered
    }

    /// Covered fraction in 0.0..=1.0; an empty registry counts as fully covered
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.covered as f64 / self.total as f64
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} registry: {}/{} rows linked ({:.1}%), {} unlinked",
            self.side.name(),
            self.covered,
            self.total,
            self.ratio() * 100.0,
            self.uncovered()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(hosp_code: &str, lg_code: &str) -> Connection {
        Connection::new("Hosp", hosp_code, "Company", lg_code)
    }

    #[test]
    fn test_confirmed_code_is_covered() {
        let connections = vec![Connection::between(
            &NamedCode::new("Alpha", "H1"),
            &NamedCode::new("Beta", "L2"),
        )];

        assert!(is_covered(&connections, "H1", Side::Hospital));
        assert!(!is_covered(&connections, "H2", Side::Hospital));
        assert!(is_covered(&connections, "L2", Side::Company));
    }

    #[test]
    fn test_sides_are_independent() {
        let connections = vec![connection("X1", "Y1")];

        assert!(!is_covered(&connections, "Y1", Side::Hospital));
        assert!(!is_covered(&connections, "X1", Side::Company));
    }

    #[test]
    fn test_comparison_trims_both_sides() {
        let connections = vec![connection("  H1 ", "L1\t")];

        assert!(is_covered(&connections, "H1", Side::Hospital));
        assert!(is_covered(&connections, " L1 ", Side::Company));
    }

    #[test]
    fn test_blank_never_covered() {
        let connections = vec![connection("", " ")];

        assert!(!is_covered(&connections, "", Side::Hospital));
        assert!(!is_covered(&connections, "  ", Side::Company));
    }

    #[test]
    fn test_coverage_map_aligned_with_records() {
        let connections = vec![connection("H1", "L1"), connection("H3", "L9")];
        let records = vec![
            NamedCode::new("Alpha", "H1"),
            NamedCode::new("Beta", "H2"),
            NamedCode::new("Blank", ""),
            NamedCode::new("Gamma", " H3"),
        ];

        let flags = coverage_map(&connections, &records, Side::Hospital);

        assert_eq!(flags, vec![true, false, false, true]);
    }

    #[test]
    fn test_summary() {
        let index = CoverageIndex::from_connections(&[connection("H1", "L1")]);
        let records = vec![NamedCode::new("Alpha", "H1"), NamedCode::new("Beta", "H2")];

        let summary = index.summary(&records, Side::Hospital);

        assert_eq!(summary.total, 2);
        assert_eq!(summary.covered, 1);
        assert_eq!(summary.uncovered(), 1);
        assert!((summary.ratio() - 0.5).abs() < f64::EPSILON);
        assert_eq!(
            summary.summary(),
            "Hospital registry: 1/2 rows linked (50.0%), 1 unlinked"
        );

        let empty = index.summary(&[], Side::Company);
        assert_eq!(empty.ratio(), 1.0);
    }
}
