// 🧭 Mapping Session - one curator session over two registries
//
// Owns the connection store. Every event (confirm, revoke, load, save) is
// processed to completion, coverage is recomputed, and an immutable snapshot
// is pushed to observers. Renderers read snapshots and never touch the store.

use crate::config::MappingConfig;
use crate::connections::{Connection, ConnectionStore};
use crate::coverage::{CoverageIndex, CoverageSummary};
use crate::error::Result;
use crate::merge::{merge, MergedRecord};
use crate::persistence::{ConnectionPersistence, CsvConnectionFile};
use crate::records::{load_registry, NamedCode, Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::mpsc::Sender;

// ============================================================================
// EVENTS + SNAPSHOTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEventKind {
    Confirmed { position: usize, connection: Connection },
    Revoked { removed: Vec<Connection> },
    Loaded { count: usize, location: String },
    LoadFailed { reason: String },
    Saved { count: usize, location: String },
}

/// Record of one processed curator event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: SessionEventKind,
}

impl SessionEvent {
    pub fn new(kind: SessionEventKind) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
        }
    }

    /// One-line status message for the curator
    pub fn describe(&self) -> String {
        match &self.kind {
            SessionEventKind::Confirmed { position, connection } => format!(
                "Linked {} ({}) ↔ {} ({}) as row {}",
                connection.hosp_name,
                connection.hosp_code,
                connection.lg_name,
                connection.lg_code,
                position
            ),
            SessionEventKind::Revoked { removed } => {
                format!("Removed {} connection(s)", removed.len())
            }
            SessionEventKind::Loaded { count, location } => {
                format!("Loaded {} connection(s) from {}", count, location)
            }
            SessionEventKind::LoadFailed { reason } => {
                format!("Could not load connections, starting empty: {}", reason)
            }
            SessionEventKind::Saved { count, location } => {
                format!("Saved {} connection(s) to {}", count, location)
            }
        }
    }
}

/// A registry row as presented: the record plus its coverage flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRow {
    pub name: String,
    pub code: String,
    pub covered: bool,
}

/// Immutable view of the whole session after an event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub hospital: Vec<RegistryRow>,
    pub company: Vec<RegistryRow>,
    pub connections: Vec<Connection>,
}

impl SessionSnapshot {
    pub fn rows(&self, side: Side) -> &[RegistryRow] {
        match side {
            Side::Hospital => &self.hospital,
            Side::Company => &self.company,
        }
    }
}

/// Receives every processed event together with the resulting snapshot
pub trait SessionObserver: Send {
    fn on_update(&mut self, event: &SessionEvent, snapshot: &SessionSnapshot);
}

/// Message sent by `ChannelObserver`
#[derive(Debug, Clone)]
pub struct SessionUpdate {
    pub event: SessionEvent,
    pub snapshot: SessionSnapshot,
}

/// Forwards updates over an mpsc channel; a dropped receiver is ignored
pub struct ChannelObserver {
    sender: Sender<SessionUpdate>,
}

impl ChannelObserver {
    pub fn new(sender: Sender<SessionUpdate>) -> Self {
        ChannelObserver { sender }
    }
}

impl SessionObserver for ChannelObserver {
    fn on_update(&mut self, event: &SessionEvent, snapshot: &SessionSnapshot) {
        let _ = self.sender.send(SessionUpdate {
            event: event.clone(),
            snapshot: snapshot.clone(),
        });
    }
}

// ============================================================================
// SESSION
// ============================================================================

pub struct MappingSession {
    hospital: Vec<NamedCode>,
    company: Vec<NamedCode>,
    store: ConnectionStore,
    coverage: CoverageIndex,
    persistence: Box<dyn ConnectionPersistence>,
    observers: Vec<Box<dyn SessionObserver>>,
}

impl MappingSession {
    /// Build a session from its three data sources. The store starts empty;
    /// call `load_connections` to pick up saved state.
    pub fn new(
        hospital: Vec<NamedCode>,
        company: Vec<NamedCode>,
        persistence: Box<dyn ConnectionPersistence>,
    ) -> Self {
        MappingSession {
            hospital,
            company,
            store: ConnectionStore::new(),
            coverage: CoverageIndex::default(),
            persistence,
            observers: Vec::new(),
        }
    }

    /// Read both registries named in the config. Either registry failing to
    /// load is fatal; the connections file is not touched here.
    pub fn from_config(config: &MappingConfig) -> Result<Self> {
        let hospital = load_registry(&config.hospital_registry)?;
        let company = load_registry(&config.company_registry)?;
        let persistence = CsvConnectionFile::new(&config.connections_file);

        Ok(Self::new(hospital, company, Box::new(persistence)))
    }

    pub fn subscribe(&mut self, observer: Box<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    pub fn records(&self, side: Side) -> &[NamedCode] {
        match side {
            Side::Hospital => &self.hospital,
            Side::Company => &self.company,
        }
    }

    pub fn connections(&self) -> &[Connection] {
        self.store.connections()
    }

    pub fn persistence_location(&self) -> String {
        self.persistence.location()
    }

    // ------------------------------------------------------------------------
    // Curator events
    // ------------------------------------------------------------------------

    /// Link the selected hospital row with the selected company row.
    /// `None` (or a row that does not exist) on either side is a NoSelection error.
    pub fn confirm(
        &mut self,
        hospital_row: Option<usize>,
        company_row: Option<usize>,
    ) -> Result<SessionEvent> {
        let hospital = hospital_row.and_then(|row| self.hospital.get(row));
        let company = company_row.and_then(|row| self.company.get(row));

        let position = self.store.confirm(hospital, company)?;
        let connection = self.store.connections()[position].clone();

        Ok(self.publish(SessionEventKind::Confirmed { position, connection }))
    }

    /// Remove the connection rows marked for removal
    pub fn revoke(&mut self, positions: &BTreeSet<usize>) -> Result<SessionEvent> {
        let removed = self.store.revoke(positions)?;
        Ok(self.publish(SessionEventKind::Revoked { removed }))
    }

    /// Replace the store with the persisted connections.
    /// On failure the store falls back to empty and the error is returned.
    pub fn load_connections(&mut self) -> Result<SessionEvent> {
        match self.persistence.load() {
            Ok(connections) => {
                let count = connections.len();
                self.store.replace_all(connections);
                Ok(self.publish(SessionEventKind::Loaded {
                    count,
                    location: self.persistence.location(),
                }))
            }
            Err(e) => {
                log::warn!("Falling back to an empty connection list: {}", e);
                self.store.replace_all(Vec::new());
                self.publish(SessionEventKind::LoadFailed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Persist the current connections. The store is unchanged either way.
    pub fn save_connections(&mut self) -> Result<SessionEvent> {
        let connections = self.store.snapshot();
        self.persistence.save(&connections)?;

        Ok(self.publish(SessionEventKind::Saved {
            count: connections.len(),
            location: self.persistence.location(),
        }))
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn is_covered(&self, code: &str, side: Side) -> bool {
        self.coverage.is_covered(code, side)
    }

    pub fn coverage_map(&self, side: Side) -> Vec<bool> {
        self.coverage.coverage_map(self.records(side), side)
    }

    pub fn coverage_summary(&self, side: Side) -> CoverageSummary {
        self.coverage.summary(self.records(side), side)
    }

    /// Union view of both registries
    pub fn merge(&self) -> Vec<MergedRecord> {
        merge(&self.hospital, &self.company)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            hospital: self.rows(Side::Hospital),
            company: self.rows(Side::Company),
            connections: self.store.snapshot(),
        }
    }

    fn rows(&self, side: Side) -> Vec<RegistryRow> {
        self.records(side)
            .iter()
            .zip(self.coverage_map(side))
            .map(|(record, covered)| RegistryRow {
                name: record.name.clone(),
                code: record.code.clone(),
                covered,
            })
            .collect()
    }

    /// Recompute coverage, then hand the event and snapshot to every observer
    fn publish(&mut self, kind: SessionEventKind) -> SessionEvent {
        self.coverage = CoverageIndex::from_connections(self.store.connections());

        let event = SessionEvent::new(kind);
        if !self.observers.is_empty() {
            let snapshot = self.snapshot();
            for observer in self.observers.iter_mut() {
                observer.on_update(&event, &snapshot);
            }
        }

        log::debug!("{}", event.describe());
        event
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MappingError;
    use crate::persistence::MemoryPersistence;
    use std::sync::mpsc;

    struct FailingPersistence;

    impl ConnectionPersistence for FailingPersistence {
        fn load(&self) -> Result<Vec<Connection>> {
            Err(MappingError::persistence(
                std::path::Path::new("broken.csv"),
                "unreadable",
            ))
        }

        fn save(&self, _connections: &[Connection]) -> Result<()> {
            Err(MappingError::persistence(
                std::path::Path::new("broken.csv"),
                "read-only",
            ))
        }

        fn location(&self) -> String {
            "broken.csv".to_string()
        }
    }

    fn hospital() -> Vec<NamedCode> {
        vec![NamedCode::new("Alpha", "H1"), NamedCode::new("Beta", "H2")]
    }

    fn company() -> Vec<NamedCode> {
        vec![NamedCode::new("Beta", "L2"), NamedCode::new("Gamma", "L3")]
    }

    fn session_with(persistence: MemoryPersistence) -> MappingSession {
        MappingSession::new(hospital(), company(), Box::new(persistence))
    }

    #[test]
    fn test_confirm_updates_coverage() {
        let mut session = session_with(MemoryPersistence::new());

        session.confirm(Some(0), Some(0)).unwrap();

        assert!(session.is_covered("H1", Side::Hospital));
        assert!(!session.is_covered("H2", Side::Hospital));
        assert_eq!(session.coverage_map(Side::Hospital), vec![true, false]);
        assert_eq!(session.coverage_map(Side::Company), vec![true, false]);
        assert_eq!(
            session.connections(),
            &[Connection::new("Alpha", "H1", "Beta", "L2")]
        );
    }

    #[test]
    fn test_confirm_without_selection() {
        let mut session = session_with(MemoryPersistence::new());

        let err = session.confirm(Some(0), None).unwrap_err();
        assert!(matches!(err, MappingError::NoSelection(_)));

        // row past the end of the registry counts as no selection
        let err = session.confirm(Some(7), Some(0)).unwrap_err();
        assert!(matches!(err, MappingError::NoSelection(_)));

        assert!(session.connections().is_empty());
    }

    #[test]
    fn test_revoke_recomputes_coverage() {
        let mut session = session_with(MemoryPersistence::new());
        session.confirm(Some(0), Some(0)).unwrap();
        session.confirm(Some(1), Some(1)).unwrap();

        let event = session.revoke(&[0].into_iter().collect()).unwrap();

        assert!(matches!(event.kind, SessionEventKind::Revoked { ref removed } if removed.len() == 1));
        assert_eq!(session.coverage_map(Side::Hospital), vec![false, true]);
    }

    #[test]
    fn test_load_missing_state_is_empty() {
        let mut session = session_with(MemoryPersistence::new());

        let event = session.load_connections().unwrap();

        assert!(matches!(event.kind, SessionEventKind::Loaded { count: 0, .. }));
        assert!(session.connections().is_empty());
    }

    #[test]
    fn test_load_replaces_store_and_coverage() {
        let saved = vec![Connection::new("Beta", "H2", "Gamma", "L3")];
        let mut session = session_with(MemoryPersistence::with_saved(saved.clone()));
        session.confirm(Some(0), Some(0)).unwrap();

        session.load_connections().unwrap();

        assert_eq!(session.connections(), saved.as_slice());
        assert_eq!(session.coverage_map(Side::Hospital), vec![false, true]);
        assert_eq!(session.coverage_map(Side::Company), vec![false, true]);
    }

    #[test]
    fn test_load_failure_falls_back_to_empty() {
        let mut session = MappingSession::new(hospital(), company(), Box::new(FailingPersistence));
        session.confirm(Some(0), Some(0)).unwrap();

        let err = session.load_connections().unwrap_err();

        assert!(matches!(err, MappingError::Persistence { .. }));
        assert!(session.connections().is_empty());
        assert!(!session.is_covered("H1", Side::Hospital));
    }

    #[test]
    fn test_save_failure_leaves_store() {
        let mut session = MappingSession::new(hospital(), company(), Box::new(FailingPersistence));
        session.confirm(Some(0), Some(0)).unwrap();

        assert!(session.save_connections().is_err());
        assert_eq!(session.connections().len(), 1);
    }

    #[test]
    fn test_save_and_reload() {
        let memory = MemoryPersistence::new();
        let mut session = session_with(memory.clone());
        session.confirm(Some(0), Some(0)).unwrap();
        session.confirm(Some(0), Some(0)).unwrap();

        let event = session.save_connections().unwrap();
        assert!(matches!(event.kind, SessionEventKind::Saved { count: 2, .. }));

        let mut reopened = session_with(memory);
        reopened.load_connections().unwrap();
        assert_eq!(reopened.connections(), session.connections());
    }

    #[test]
    fn test_observers_receive_snapshots_in_order() {
        let (tx, rx) = mpsc::channel();
        let mut session = session_with(MemoryPersistence::new());
        session.subscribe(Box::new(ChannelObserver::new(tx)));

        session.confirm(Some(0), Some(0)).unwrap();
        session.confirm(Some(1), None).unwrap_err();
        session.revoke(&[0].into_iter().collect()).unwrap();

        let updates: Vec<SessionUpdate> = rx.try_iter().collect();
        assert_eq!(updates.len(), 2);

        assert!(matches!(updates[0].event.kind, SessionEventKind::Confirmed { position: 0, .. }));
        assert!(updates[0].snapshot.hospital[0].covered);
        assert_eq!(updates[0].snapshot.connections.len(), 1);

        assert!(matches!(updates[1].event.kind, SessionEventKind::Revoked { .. }));
        assert!(!updates[1].snapshot.rows(Side::Hospital)[0].covered);
        assert!(updates[1].snapshot.connections.is_empty());
    }

    #[test]
    fn test_merge_uses_session_registries() {
        let session = session_with(MemoryPersistence::new());

        let merged = session.merge();

        let names: Vec<&str> = merged.iter().map(|r| r.hosp_name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Beta", "Gamma"]);
    }

    #[test]
    fn test_from_config_requires_registries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("h.csv"), "Alpha,Beta\nH1,H2\n").unwrap();
        std::fs::write(dir.path().join("c.csv"), "Beta\n").unwrap();

        let config = MappingConfig {
            hospital_registry: dir.path().join("h.csv"),
            company_registry: dir.path().join("c.csv"),
            connections_file: dir.path().join("links.csv"),
            merged_output: dir.path().join("merged.csv"),
        };

        let err = MappingSession::from_config(&config).err().unwrap();
        assert!(matches!(err, MappingError::SourceRead { .. }));

        std::fs::write(dir.path().join("c.csv"), "Beta\nL2\n").unwrap();
        let mut session = MappingSession::from_config(&config).unwrap();
        session.load_connections().unwrap();
        assert_eq!(session.records(Side::Hospital).len(), 2);
        assert_eq!(session.records(Side::Company).len(), 1);

        println!("✅ Session opened: {}", session.coverage_summary(Side::Hospital).summary());
    }
}
