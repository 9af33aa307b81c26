//! Lap store.
//!
//! Sessions, their laps and telemetry blobs, and the personal-best flags.
//! Personal-best flags only change inside
//! [`LapStore::transact_personal_best`], which serialises all writers of one
//! (driver, track, car) key and applies their flag writes all-or-nothing.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{trace, warn};

use crate::jobs::SessionRecord;
use crate::metadata::TrackId;
use crate::pipeline::{LapRecord, TelemetryBlob};
use crate::{GarageError, LapTime, Result};

pub type SessionId = u64;

/// Identity a personal best is tracked for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PbKey {
    pub driver: String,
    pub track: TrackId,
    pub car: String,
}

impl fmt::Display for PbKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} / {}", self.driver, self.track, self.car)
    }
}

/// A lap as seen inside a personal-best transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PbCandidate {
    pub session: SessionId,
    pub lap_number: u32,
    pub lap_time: LapTime,
    pub is_valid: bool,
    pub is_personal_best: bool,
}

impl PbCandidate {
    /// Valid, timed and not an out-lap.
    pub fn is_eligible(&self) -> bool {
        self.is_valid && self.lap_time > LapTime::ZERO && self.lap_number != 0
    }
}

/// Snapshot of one key's laps plus staged flag writes.
#[derive(Debug)]
pub struct PbTransaction {
    key: PbKey,
    laps: Vec<PbCandidate>,
    staged: BTreeMap<(SessionId, u32), bool>,
}

impl PbTransaction {
    pub fn new(key: PbKey, laps: Vec<PbCandidate>) -> Self {
        Self { key, laps, staged: BTreeMap::new() }
    }

    pub fn key(&self) -> &PbKey {
        &self.key
    }

    /// Every lap of every session for the key, with staged flags applied.
    pub fn laps(&self) -> impl Iterator<Item = PbCandidate> + '_ {
        self.laps.iter().map(|lap| PbCandidate {
            is_personal_best: self
                .staged
                .get(&(lap.session, lap.lap_number))
                .copied()
                .unwrap_or(lap.is_personal_best),
            ..*lap
        })
    }

    /// Stage a flag write. Writes that match the stored flag are dropped.
    pub fn set_personal_best(&mut self, session: SessionId, lap_number: u32, flag: bool) {
        let stored = self
            .laps
            .iter()
            .find(|l| l.session == session && l.lap_number == lap_number)
            .map(|l| l.is_personal_best);
        if stored == Some(flag) {
            self.staged.remove(&(session, lap_number));
        } else {
            self.staged.insert((session, lap_number), flag);
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.staged.is_empty()
    }

    pub fn into_writes(self) -> BTreeMap<(SessionId, u32), bool> {
        self.staged
    }
}

/// Persistence for sessions, laps and personal-best flags.
pub trait LapStore: Send + Sync {
    /// Store a new session record and return its id.
    fn insert_session(&self, record: SessionRecord) -> Result<SessionId>;

    fn session(&self, id: SessionId) -> Result<SessionRecord>;

    /// Modify a session record in place; nothing is written if `update` fails.
    fn update_session(
        &self,
        id: SessionId,
        update: &mut dyn FnMut(&mut SessionRecord) -> Result<()>,
    ) -> Result<SessionRecord>;

    /// Replace a session's laps and their telemetry blobs.
    fn replace_laps(
        &self,
        session: SessionId,
        laps: Vec<LapRecord>,
        blobs: Vec<TelemetryBlob>,
    ) -> Result<()>;

    fn laps(&self, session: SessionId) -> Result<Vec<LapRecord>>;

    fn telemetry(&self, session: SessionId, lap_number: u32) -> Result<Option<TelemetryBlob>>;

    /// Run `body` against a snapshot of every lap for `key`.
    ///
    /// Transactions on the same key run one at a time. Flag writes staged by
    /// `body` are committed together when it returns `Ok` and discarded when
    /// it returns `Err`.
    fn transact_personal_best(
        &self,
        key: &PbKey,
        body: &mut dyn FnMut(&mut PbTransaction) -> Result<()>,
    ) -> Result<()>;
}

#[derive(Debug, Default)]
struct StoredSession {
    record: SessionRecord,
    laps: Vec<LapRecord>,
    blobs: BTreeMap<u32, TelemetryBlob>,
}

/// Thread-safe in-memory [`LapStore`].
#[derive(Debug, Default)]
pub struct MemoryLapStore {
    sessions: RwLock<BTreeMap<SessionId, StoredSession>>,
    key_locks: Mutex<HashMap<PbKey, Arc<Mutex<()>>>>,
    next_id: AtomicU64,
}

impl MemoryLapStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Laps flagged as personal best for `key`.
    pub fn personal_bests(&self, key: &PbKey) -> Result<Vec<(SessionId, LapRecord)>> {
        let sessions = self.read()?;
        Ok(sessions
            .iter()
            .filter(|(_, s)| s.record.pb_key().as_ref() == Some(key))
            .flat_map(|(id, s)| {
                s.laps.iter().filter(|l| l.is_personal_best).map(move |l| (*id, l.clone()))
            })
            .collect())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<SessionId, StoredSession>>> {
        self.sessions.read().map_err(|_| GarageError::store("read", "session lock poisoned"))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<SessionId, StoredSession>>> {
        self.sessions.write().map_err(|_| GarageError::store("write", "session lock poisoned"))
    }

    fn key_lock(&self, key: &PbKey) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .key_locks
            .lock()
            .map_err(|_| GarageError::store("personal best", "key lock table poisoned"))?;
        Ok(Arc::clone(locks.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(())))))
    }
}

impl LapStore for MemoryLapStore {
    fn insert_session(&self, mut record: SessionRecord) -> Result<SessionId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        record.id = id;
        self.write()?.insert(id, StoredSession { record, ..Default::default() });
        Ok(id)
    }

    fn session(&self, id: SessionId) -> Result<SessionRecord> {
        self.read()?
            .get(&id)
            .map(|s| s.record.clone())
            .ok_or(GarageError::SessionNotFound { session: id })
    }

    fn update_session(
        &self,
        id: SessionId,
        update: &mut dyn FnMut(&mut SessionRecord) -> Result<()>,
    ) -> Result<SessionRecord> {
        let mut sessions = self.write()?;
        let stored = sessions.get_mut(&id).ok_or(GarageError::SessionNotFound { session: id })?;
        let mut record = stored.record.clone();
        update(&mut record)?;
        stored.record = record.clone();
        Ok(record)
    }

    fn replace_laps(
        &self,
        session: SessionId,
        laps: Vec<LapRecord>,
        blobs: Vec<TelemetryBlob>,
    ) -> Result<()> {
        if laps.len() != blobs.len() {
            return Err(GarageError::store(
                "replace laps",
                format!("{} laps but {} telemetry blobs", laps.len(), blobs.len()),
            ));
        }
        let mut sessions = self.write()?;
        let stored =
            sessions.get_mut(&session).ok_or(GarageError::SessionNotFound { session })?;
        stored.blobs = laps.iter().map(|l| l.lap_number).zip(blobs).collect();
        stored.laps = laps;
        trace!(session, laps = stored.laps.len(), "Stored laps");
        Ok(())
    }

    fn laps(&self, session: SessionId) -> Result<Vec<LapRecord>> {
        self.read()?
            .get(&session)
            .map(|s| s.laps.clone())
            .ok_or(GarageError::SessionNotFound { session })
    }

    fn telemetry(&self, session: SessionId, lap_number: u32) -> Result<Option<TelemetryBlob>> {
        self.read()?
            .get(&session)
            .map(|s| s.blobs.get(&lap_number).cloned())
            .ok_or(GarageError::SessionNotFound { session })
    }

    fn transact_personal_best(
        &self,
        key: &PbKey,
        body: &mut dyn FnMut(&mut PbTransaction) -> Result<()>,
    ) -> Result<()> {
        let lock = self.key_lock(key)?;
        let _guard = lock
            .lock()
            .map_err(|_| GarageError::store("personal best", format!("lock for {} poisoned", key)))?;

        let snapshot = {
            let sessions = self.read()?;
            sessions
                .iter()
                .filter(|(_, s)| s.record.pb_key().as_ref() == Some(key))
                .flat_map(|(id, s)| {
                    s.laps.iter().map(move |l| PbCandidate {
                        session: *id,
                        lap_number: l.lap_number,
                        lap_time: l.lap_time,
                        is_valid: l.is_valid,
                        is_personal_best: l.is_personal_best,
                    })
                })
                .collect()
        };

        let mut transaction = PbTransaction::new(key.clone(), snapshot);
        body(&mut transaction)?;
        if !transaction.has_changes() {
            return Ok(());
        }

        let mut sessions = self.write()?;
        for ((session, lap_number), flag) in transaction.into_writes() {
            let lap = sessions
                .get_mut(&session)
                .and_then(|s| s.laps.iter_mut().find(|l| l.lap_number == lap_number));
            match lap {
                Some(lap) => lap.is_personal_best = flag,
                None => warn!(session, lap = lap_number, "Personal best write for a removed lap"),
            }
        }
        Ok(())
    }
}
