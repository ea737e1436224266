// 📂 Record Loader - two-row registry sheets → ordered (name, code) records
//
// Registry layout (one entity per column):
//   row 1: names   e.g.  "Alpha Clinic","Beta Hospital",...
//   row 2: codes   e.g.  "H001","H002",...
// Anything below row 2 is ignored.

use crate::error::{MappingError, Result};
use csv::{Position, ReaderBuilder};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

// ============================================================================
// CORE TYPES
// ============================================================================

/// Side - which registry a record or code belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Hospital,
    Company,
}

impl Side {
    /// Human-readable name for display
    pub fn name(&self) -> &str {
        match self {
            Side::Hospital => "Hospital",
            Side::Company => "Company",
        }
    }
}

/// NamedCode - one registry column, cell text kept as read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCode {
    pub name: String,
    pub code: String,
}

impl NamedCode {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        NamedCode {
            name: name.into(),
            code: code.into(),
        }
    }

    /// Trimmed name, used as the join key
    pub fn key(&self) -> &str {
        self.name.trim()
    }

    /// Trimmed code, used for coverage comparison
    pub fn code_key(&self) -> &str {
        self.code.trim()
    }

    /// Both fields blank after trimming
    pub fn is_blank(&self) -> bool {
        self.key().is_empty() && self.code_key().is_empty()
    }
}

// ============================================================================
// LOADING
// ============================================================================

/// Load a registry CSV file
pub fn load_registry(path: &Path) -> Result<Vec<NamedCode>> {
    let file = File::open(path).map_err(|e| MappingError::source_read(path, e))?;
    let records = records_from_reader(file, path)?;

    log::info!(
        "Loaded {} records from registry {}",
        records.len(),
        path.display()
    );

    Ok(records)
}

/// Parse registry rows from any reader. `origin` is only used for error messages.
///
/// Rows are placed by source line, so a blank name row or a blank code row
/// still counts as that row.
pub fn records_from_reader<R: Read>(mut reader: R, origin: &Path) -> Result<Vec<NamedCode>> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| MappingError::source_read(origin, e))?;

    let lines = line_count(&bytes);
    if lines < 2 {
        return Err(MappingError::source_read(
            origin,
            format!("expected a name row and a code row, found {} row(s)", lines),
        ));
    }

    // csv skips empty lines, so each record's source line decides which row it is
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes.as_slice());

    let mut names: Vec<String> = Vec::new();
    let mut codes: Vec<String> = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| MappingError::source_read(origin, e))?;
        let cells = || record.iter().map(|cell| cell.to_string()).collect();
        match record.position().map(|pos| source_line(&bytes, pos)) {
            Some(1) => names = cells(),
            Some(2) => codes = cells(),
            _ => break,
        }
    }

    Ok(records_from_rows(&names, &codes))
}

/// Line a record's text starts on. The reader stamps a record with the
/// position where it started looking, before any blank lines it skipped.
fn source_line(bytes: &[u8], position: &Position) -> u64 {
    let start = usize::try_from(position.byte()).unwrap_or(usize::MAX);
    let skipped = bytes
        .get(start..)
        .unwrap_or_default()
        .iter()
        .take_while(|&&b| b == b'\r' || b == b'\n')
        .filter(|&&b| b == b'\n')
        .count();
    position.line() + skipped as u64
}

/// Lines in the source, counting a final line without a terminator
fn line_count(bytes: &[u8]) -> usize {
    let terminated = bytes.iter().filter(|&&b| b == b'\n').count();
    if bytes.is_empty() || bytes.ends_with(b"\n") {
        terminated
    } else {
        terminated + 1
    }
}

/// Pair names with codes column by column, padding the shorter row with blanks
/// and dropping columns where both cells are blank.
pub fn records_from_rows(names: &[String], codes: &[String]) -> Vec<NamedCode> {
    let columns = names.len().max(codes.len());

    (0..columns)
        .map(|i| {
            NamedCode::new(
                names.get(i).cloned().unwrap_or_default(),
                codes.get(i).cloned().unwrap_or_default(),
            )
        })
        .filter(|record| !record.is_blank())
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
