// 💾 Persistence Adapter - connections file load/save
//
// File format (CSV, UTF-8):
//   hospital name,hospital code,company name,company code
//   <one row per connection, store order>
//
// A missing file, an empty file and a header-only file all mean "no connections".

use crate::connections::{Connection, CONNECTION_HEADER};
use crate::error::{MappingError, Result};
use csv::ReaderBuilder;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// Where a session's connections live between runs
pub trait ConnectionPersistence: Send {
    /// Load the saved connections, or an empty list when nothing was saved yet
    fn load(&self) -> Result<Vec<Connection>>;

    /// Replace the saved connections with `connections`
    fn save(&self, connections: &[Connection]) -> Result<()>;

    /// Short description for log lines and status messages
    fn location(&self) -> String;
}

// ============================================================================
// CSV FILE
// ============================================================================

#[derive(Debug, Clone)]
pub struct CsvConnectionFile {
    path: PathBuf,
}

impl CsvConnectionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvConnectionFile { path: path.into() }
    }

    fn err(&self, reason: impl ToString) -> MappingError {
        MappingError::persistence(&self.path, reason)
    }
}

impl ConnectionPersistence for CsvConnectionFile {
    fn load(&self) -> Result<Vec<Connection>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::info!("{} does not exist yet, starting empty", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.err(e)),
        };

        let connections = read_connections(file).map_err(|e| self.err(e))?;

        log::info!(
            "Loaded {} connections from {}",
            connections.len(),
            self.path.display()
        );
        Ok(connections)
    }

    fn save(&self, connections: &[Connection]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        // Write beside the target, then rename over it: the old file survives any failure
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| self.err(e))?;
        write_connections(tmp.as_file_mut(), connections).map_err(|e| self.err(e))?;
        tmp.as_file().sync_all().map_err(|e| self.err(e))?;
        tmp.persist(&self.path).map_err(|e| self.err(e.error))?;

        log::info!(
            "Saved {} connections to {}",
            connections.len(),
            self.path.display()
        );
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Parse connection rows, skipping the header row
pub fn read_connections<R: io::Read>(reader: R) -> csv::Result<Vec<Connection>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut connections = Vec::new();
    for result in reader.records().skip(1) {
        let record = result?;
        connections.push(Connection::from_cells(record.iter()));
    }

    Ok(connections)
}

/// Write the header row and one row per connection
pub fn write_connections<W: Write>(writer: W, connections: &[Connection]) -> csv::Result<()> {
    let mut writer = csv::WriterBuilder::new().flexible(false).from_writer(writer);

    writer.write_record(CONNECTION_HEADER)?;
    for connection in connections {
        writer.write_record(connection.cells())?;
    }
    writer.flush()?;

    Ok(())
}

// ============================================================================
// IN-MEMORY (tests, embedding)
// ============================================================================

/// Keeps the "saved" connections in memory; clones share the same storage
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    saved: Arc<Mutex<Option<Vec<Connection>>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_saved(connections: Vec<Connection>) -> Self {
        MemoryPersistence {
            saved: Arc::new(Mutex::new(Some(connections))),
        }
    }

    /// What was last saved, if anything
    pub fn saved(&self) -> Option<Vec<Connection>> {
        self.saved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ConnectionPersistence for MemoryPersistence {
    fn load(&self) -> Result<Vec<Connection>> {
        Ok(self.saved().unwrap_or_default())
    }

    fn save(&self, connections: &[Connection]) -> Result<()> {
        *self
            .saved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(connections.to_vec());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
