//! # Session Store
//!
//! Arena of sessions keyed by id, shared by every task of a gateway.
//!
//! The lock is `parking_lot`, not `tokio::sync`: it is only held inside the
//! synchronous closures below and never across an `.await`. Callers that
//! suspend (network, bridge calls) snapshot the session first and commit
//! with [`SessionStore::update_if`] against the snapshot's revision.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use satp_core::{ErrorTag, SatpError, SessionId, Timestamp};

use crate::session::SessionData;

/// Cloneable handle to the shared session map.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, SessionData>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new session. Fails with `DuplicateSession` if the id exists.
    pub fn create(&self, initial: SessionData) -> Result<SessionData, SatpError> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&initial.session_id) {
            return Err(SatpError::DuplicateSession {
                tag: ErrorTag::new("SessionStore::create"),
                session_id: initial.session_id.to_string(),
            });
        }
        sessions.insert(initial.session_id.clone(), initial.clone());
        Ok(initial)
    }

    /// Snapshot of a session. Fails with `SessionUndefined` if absent.
    pub fn get(&self, id: &SessionId) -> Result<SessionData, SatpError> {
        self.sessions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| undefined(id, "SessionStore::get"))
    }

    /// Apply `f` atomically. `f` works on a copy; the copy replaces the
    /// stored session only if `f` succeeds, so a failed mutation leaves no
    /// partial writes. Each committed update bumps `revision`.
    pub fn update<R>(
        &self,
        id: &SessionId,
        f: impl FnOnce(&mut SessionData) -> Result<R, SatpError>,
    ) -> Result<R, SatpError> {
        let mut sessions = self.sessions.write();
        let current = sessions
            .get_mut(id)
            .ok_or_else(|| undefined(id, "SessionStore::update"))?;
        let mut draft = current.clone();
        let out = f(&mut draft)?;
        draft.revision = current.revision + 1;
        draft.updated_at = Timestamp::now();
        *current = draft;
        Ok(out)
    }

    /// Compare-and-swap variant of [`update`](Self::update): fails with
    /// `ConcurrentModification` if the stored revision is not `expected`.
    pub fn update_if<R>(
        &self,
        id: &SessionId,
        expected: u64,
        f: impl FnOnce(&mut SessionData) -> Result<R, SatpError>,
    ) -> Result<R, SatpError> {
        self.update(id, |session| {
            if session.revision != expected {
                return Err(SatpError::ConcurrentModification {
                    tag: ErrorTag::new("SessionStore::update_if"),
                    session_id: id.to_string(),
                    expected,
                    found: session.revision,
                });
            }
            f(session)
        })
    }

    /// Remove a session that has reached a terminal status, returning it for
    /// archival. Live sessions are refused with `SessionActive`.
    pub fn delete(&self, id: &SessionId) -> Result<SessionData, SatpError> {
        let mut sessions = self.sessions.write();
        let status = sessions
            .get(id)
            .map(|s| s.status)
            .ok_or_else(|| undefined(id, "SessionStore::delete"))?;
        if !status.is_terminal() {
            return Err(SatpError::SessionActive {
                tag: ErrorTag::new("SessionStore::delete"),
                session_id: id.to_string(),
                status: status.name().to_string(),
            });
        }
        sessions
            .remove(id)
            .ok_or_else(|| undefined(id, "SessionStore::delete"))
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.read().contains_key(id)
    }

    pub fn list(&self) -> Vec<SessionData> {
        self.sessions.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

fn undefined(id: &SessionId, origin: &str) -> SatpError {
    SatpError::SessionUndefined {
        tag: ErrorTag::new(origin),
        session_id: id.to_string(),
    }
}
