// Code Mapping - Core Library
// Hospital ↔ company code reconciliation, used by the CLI, TUI and API server

pub mod config;
pub mod connections;
pub mod coverage;
pub mod error;
pub mod merge;
pub mod persistence;
pub mod records;
pub mod session;

// Re-export commonly used types
pub use config::MappingConfig;
pub use connections::{Connection, ConnectionStore, CONNECTION_HEADER};
pub use coverage::{coverage_map, is_covered, CoverageIndex, CoverageSummary};
pub use error::{MappingError, Result};
pub use merge::{merge, merge_stats, write_merged, MergedRecord};
pub use persistence::{ConnectionPersistence, CsvConnectionFile, MemoryPersistence};
pub use records::{load_registry, records_from_reader, NamedCode, Side};
pub use session::{
    ChannelObserver, MappingSession, RegistryRow, SessionEvent, SessionEventKind,
    SessionObserver, SessionSnapshot, SessionUpdate,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
