//! In-memory session tracking for authenticated principals.
//!
//! Sessions bind an [`Identity`] to an opaque id with an inactivity
//! timeout. Reading a session refreshes its activity timestamp; reading an
//! expired session invalidates it in place. Invalidated records are
//! retained for audit until [`SessionManager::cleanup_expired_sessions`]
//! garbage-collects the expired ones.
//!
//! The table is owned by this component; callers only ever receive cloned
//! snapshots of session records.

use crate::domain::{Identity, SessionId};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Default session timeout (1 hour).
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 60 * 60 * 1000;

/// One tracked session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub identity: Identity,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
    pub is_active: bool,
}

/// Session table with inactivity-based expiry.
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Session>>,
    timeout: Duration,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("SessionManager")
            .field("session_count", &sessions.len())
            .field("timeout_ms", &self.timeout.num_milliseconds())
            .finish()
    }
}

impl SessionManager {
    /// Create a manager with the given inactivity timeout.
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            timeout: Duration::milliseconds(timeout_ms as i64),
        }
    }

    /// Allocate a session for an identity. Returns a snapshot of the record.
    pub fn create_session(
        &self,
        identity: Identity,
        metadata: HashMap<String, String>,
    ) -> Session {
        let now = Utc::now();
        let session = Session {
            id: SessionId::new(),
            identity,
            created_at: now,
            last_activity: now,
            expires_at: now + self.timeout,
            metadata,
            is_active: true,
        };

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(session.id.clone(), session.clone());
        debug!(session_id = %session.id, "Session created");
        session
    }

    /// Fetch a live session, refreshing its activity timestamp.
    ///
    /// Returns `None` for unknown ids and for expired or invalidated
    /// records; an expired record is invalidated in place so a later
    /// cleanup pass can collect it.
    pub fn get_session(&self, id: &SessionId) -> Option<Session> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let session = sessions.get_mut(id)?;

        if !session.is_active {
            return None;
        }
        if now >= session.expires_at {
            session.is_active = false;
            debug!(session_id = %id, "Session expired on access");
            return None;
        }

        session.last_activity = now;
        Some(session.clone())
    }

    /// Refresh both the activity timestamp and the expiry deadline.
    ///
    /// Returns the refreshed snapshot, or `None` if the session is unknown,
    /// expired, or invalidated.
    pub fn extend_session(&self, id: &SessionId) -> Option<Session> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let session = sessions.get_mut(id)?;

        if !session.is_active || now >= session.expires_at {
            return None;
        }

        session.last_activity = now;
        session.expires_at = now + self.timeout;
        Some(session.clone())
    }

    /// Mark a session inactive, retaining the record for audit.
    pub fn invalidate_session(&self, id: &SessionId) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        match sessions.get_mut(id) {
            Some(session) => {
                session.is_active = false;
                debug!(session_id = %id, "Session invalidated");
                true
            }
            None => false,
        }
    }

    /// Garbage-collect expired records. Returns how many were removed.
    ///
    /// Expired records are first marked inactive, then dropped; invalidated
    /// records that have not yet expired stay available for audit.
    pub fn cleanup_expired_sessions(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);

        for session in sessions.values_mut() {
            if now >= session.expires_at {
                session.is_active = false;
            }
        }

        let before = sessions.len();
        sessions.retain(|_, session| session.is_active || now < session.expires_at);
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, "Garbage-collected expired sessions");
        }
        removed
    }

    /// Number of records currently held, including invalidated ones.
    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;

    fn identity() -> Identity {
        Identity::new("tester", [Role::Reader], "acme")
    }

    #[test]
    fn test_create_and_get() {
        let manager = SessionManager::new(DEFAULT_SESSION_TIMEOUT_MS);
        let created = manager.create_session(identity(), HashMap::new());

        let fetched = manager.get_session(&created.id).unwrap();
        assert_eq!(fetched.identity, created.identity);
        assert!(fetched.is_active);
        assert!(fetched.last_activity >= created.last_activity);
    }

    #[test]
    fn test_unknown_session_is_none() {
        let manager = SessionManager::new(DEFAULT_SESSION_TIMEOUT_MS);
        assert!(manager.get_session(&SessionId::new()).is_none());
    }

    #[test]
    fn test_expired_session_is_invalidated_on_access() {
        let manager = SessionManager::new(0);
        let created = manager.create_session(identity(), HashMap::new());

        assert!(manager.get_session(&created.id).is_none());
        // The record is retained, flagged inactive, until cleanup runs.
        assert_eq!(manager.session_count(), 1);
    }

    #[test]
    fn test_extend_session_pushes_expiry() {
        let manager = SessionManager::new(DEFAULT_SESSION_TIMEOUT_MS);
        let created = manager.create_session(identity(), HashMap::new());

        let extended = manager.extend_session(&created.id).unwrap();
        assert!(extended.expires_at >= created.expires_at);
    }

    #[test]
    fn test_invalidate_retains_record() {
        let manager = SessionManager::new(DEFAULT_SESSION_TIMEOUT_MS);
        let created = manager.create_session(identity(), HashMap::new());

        assert!(manager.invalidate_session(&created.id));
        assert!(manager.get_session(&created.id).is_none());
        assert_eq!(manager.session_count(), 1);

        // Not yet expired, so cleanup keeps it for audit.
        assert_eq!(manager.cleanup_expired_sessions(), 0);
        assert_eq!(manager.session_count(), 1);
    }

    #[test]
    fn test_cleanup_removes_expired() {
        let manager = SessionManager::new(0);
        manager.create_session(identity(), HashMap::new());
        manager.create_session(identity(), HashMap::new());

        assert_eq!(manager.cleanup_expired_sessions(), 2);
        assert_eq!(manager.session_count(), 0);
    }

    #[test]
    fn test_metadata_round_trip() {
        let manager = SessionManager::new(DEFAULT_SESSION_TIMEOUT_MS);
        let mut metadata = HashMap::new();
        metadata.insert("client".to_string(), "cli".to_string());

        let created = manager.create_session(identity(), metadata);
        let fetched = manager.get_session(&created.id).unwrap();
        assert_eq!(fetched.metadata.get("client").unwrap(), "cli");
    }
}
