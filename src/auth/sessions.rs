//! Session lifecycle and credential lookup

#[cfg(feature = "sqlite")]
use super::database::DatabaseSessionStore;
use super::{hash_secret, verify_secret, StoreError};
use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Length of generated session identifiers
const SESSION_ID_LEN: usize = 22;
/// Length of generated session keys
const SESSION_KEY_LEN: usize = 32;

/// A persisted session record.
///
/// Only the Argon2 hash of the key is stored; the raw key exists solely in
/// the `CreatedSession` handed back from `create` and is never logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque store-generated identifier
    pub id: String,
    /// Argon2 hash of the session key
    #[serde(skip_serializing)]
    pub key_hash: String,
    /// Owning user id (non-owning reference)
    pub user_id: String,
    /// Origin address, informational
    pub origin: String,
    /// Client label, informational
    pub user_agent: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last-access timestamp
    pub last_active: DateTime<Utc>,
}

/// A freshly created session together with its one-time-visible raw key
#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub session: Session,
    pub key: String,
}

/// Generate colon-free alphanumeric credential material
fn generate_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Session store supporting both in-memory and database storage
#[derive(Debug, Clone)]
pub enum SessionStore {
    /// In-memory storage (for development and testing)
    Memory {
        sessions: Arc<RwLock<HashMap<String, Session>>>,
    },
    /// Database storage (for production)
    #[cfg(feature = "sqlite")]
    Database(DatabaseSessionStore),
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::memory()
    }
}

impl SessionStore {
    /// Create in-memory session store
    pub fn memory() -> Self {
        Self::Memory {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create database session store
    #[cfg(feature = "sqlite")]
    pub fn database(store: DatabaseSessionStore) -> Self {
        Self::Database(store)
    }

    async fn insert(&self, session: Session) -> Result<(), StoreError> {
        match self {
            Self::Memory { sessions } => {
                let mut sessions = sessions.write().unwrap();
                sessions.insert(session.id.clone(), session);
                Ok(())
            }
            #[cfg(feature = "sqlite")]
            Self::Database(store) => store.insert(&session).await,
        }
    }

    async fn get(&self, id: &str) -> Option<Session> {
        match self {
            Self::Memory { sessions } => {
                let sessions = sessions.read().unwrap();
                sessions.get(id).cloned()
            }
            #[cfg(feature = "sqlite")]
            Self::Database(store) => store.get(id).await.unwrap_or(None),
        }
    }

    async fn touch(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        match self {
            Self::Memory { sessions } => {
                let mut sessions = sessions.write().unwrap();
                if let Some(session) = sessions.get_mut(id) {
                    session.last_active = at;
                }
                Ok(())
            }
            #[cfg(feature = "sqlite")]
            Self::Database(store) => store.touch(id, at).await,
        }
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        match self {
            Self::Memory { sessions } => {
                let mut sessions = sessions.write().unwrap();
                sessions.remove(id);
                Ok(())
            }
            #[cfg(feature = "sqlite")]
            Self::Database(store) => store.remove(id).await,
        }
    }

    async fn remove_for_user(&self, user_id: &str) -> Result<(), StoreError> {
        match self {
            Self::Memory { sessions } => {
                let mut sessions = sessions.write().unwrap();
                sessions.retain(|_, session| session.user_id != user_id);
                Ok(())
            }
            #[cfg(feature = "sqlite")]
            Self::Database(store) => store.remove_for_user(user_id).await,
        }
    }
}

/// Service wrapping the session store
#[derive(Debug, Clone, Default)]
pub struct SessionService {
    store: SessionStore,
}

impl SessionService {
    /// Create new session service with custom store
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    /// Create a session bound to a user, returning the raw key exactly once
    pub async fn create(
        &self,
        user_id: &str,
        origin: &str,
        user_agent: &str,
    ) -> Result<CreatedSession, StoreError> {
        let key = generate_token(SESSION_KEY_LEN);
        let now = Utc::now();

        let session = Session {
            id: generate_token(SESSION_ID_LEN),
            key_hash: hash_secret(&key)?,
            user_id: user_id.to_string(),
            origin: origin.to_string(),
            user_agent: user_agent.to_string(),
            created_at: now,
            last_active: now,
        };

        self.store.insert(session.clone()).await?;
        debug!("Created session {} for user {}", session.id, user_id);

        Ok(CreatedSession { session, key })
    }

    /// Look up a session by its full credential.
    ///
    /// Both halves must match the same record. `None` covers an unknown id
    /// and a key mismatch alike; callers cannot tell which half failed.
    pub async fn find_by_credential(&self, id: &str, key: &str) -> Option<Session> {
        let session = self.store.get(id).await?;

        if verify_secret(key, &session.key_hash) {
            Some(session)
        } else {
            None
        }
    }

    /// Best-effort bump of the last-access timestamp; failures are swallowed
    pub async fn update_access(&self, id: &str) {
        if let Err(e) = self.store.touch(id, Utc::now()).await {
            debug!("Failed to update session access time for {}: {}", id, e);
        }
    }

    /// Invalidate a single session
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.store.remove(id).await
    }

    /// Invalidate every session belonging to a user
    pub async fn delete_for_user(&self, user_id: &str) -> Result<(), StoreError> {
        self.store.remove_for_user(user_id).await
    }
}
