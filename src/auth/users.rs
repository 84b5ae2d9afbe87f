//! User identities and credential verification

#[cfg(feature = "sqlite")]
use super::database::DatabaseUserStore;
use super::{hash_secret, verify_secret, StoreError};
use super::roles::{RoleRef, RoleScope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Persisted role references on a user: at most one per role name.
///
/// The `name` halves are denormalized snapshots taken at link time and may
/// drift from the role holder's current display name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleRefs {
    pub admin: Option<RoleRef>,
    pub account: Option<RoleRef>,
}

/// Internal user data with password hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserData {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub roles: RoleRefs,
    /// Set once at creation for the reserved system root identity
    pub is_system_root: bool,
    pub created_at: DateTime<Utc>,
}

impl UserData {
    /// Create new user with hashed password
    pub fn new(
        username: &str,
        password: &str,
        email: &str,
        is_system_root: bool,
    ) -> Result<Self, StoreError> {
        let password_hash = hash_secret(password)?;

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            roles: RoleRefs::default(),
            is_system_root,
            created_at: Utc::now(),
        })
    }

    /// Verify password
    pub fn verify_password(&self, password: &str) -> bool {
        verify_secret(password, &self.password_hash)
    }

    /// Convert to public user info
    pub fn to_user_info(&self) -> UserInfo {
        UserInfo {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            roles: self.roles.clone(),
            is_system_root: self.is_system_root,
            created_at: self.created_at,
        }
    }
}

/// Public user information, safe to serialize in responses
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: String,
    pub roles: RoleRefs,
    pub is_system_root: bool,
    pub created_at: DateTime<Utc>,
}

/// User store supporting both in-memory and database storage
#[derive(Debug, Clone)]
pub enum UserStore {
    /// In-memory storage (for development and testing)
    Memory {
        users: Arc<RwLock<HashMap<String, UserData>>>,
        users_by_username: Arc<RwLock<HashMap<String, String>>>, // username -> user_id
    },
    /// Database storage (for production)
    #[cfg(feature = "sqlite")]
    Database(DatabaseUserStore),
}

impl Default for UserStore {
    fn default() -> Self {
        Self::memory()
    }
}

impl UserStore {
    /// Create in-memory user store
    pub fn memory() -> Self {
        Self::Memory {
            users: Arc::new(RwLock::new(HashMap::new())),
            users_by_username: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create database user store
    #[cfg(feature = "sqlite")]
    pub fn database(store: DatabaseUserStore) -> Self {
        Self::Database(store)
    }
}

/// Service wrapping the user store
#[derive(Debug, Clone, Default)]
pub struct UserService {
    store: UserStore,
}

impl UserService {
    /// Create new user service with custom store
    pub fn new(store: UserStore) -> Self {
        Self { store }
    }

    /// Create a user identity; usernames are unique
    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        email: &str,
        is_system_root: bool,
    ) -> Result<UserData, StoreError> {
        let user = UserData::new(username, password, email, is_system_root)?;

        match &self.store {
            UserStore::Memory {
                users,
                users_by_username,
            } => {
                let mut users = users.write().unwrap();
                let mut users_by_username = users_by_username.write().unwrap();

                if users_by_username.contains_key(username) {
                    return Err(StoreError::Conflict(format!("username {}", username)));
                }

                users_by_username.insert(user.username.clone(), user.id.clone());
                users.insert(user.id.clone(), user.clone());

                debug!("Created user: {}", user.username);
                Ok(user)
            }
            #[cfg(feature = "sqlite")]
            UserStore::Database(store) => {
                store.insert_user(&user).await?;
                debug!("Created user: {}", user.username);
                Ok(user)
            }
        }
    }

    /// Verify a username/password pair, returning the user on success
    pub async fn authenticate(&self, username: &str, password: &str) -> Option<UserData> {
        let user = self.get_user_by_username(username).await?;

        if user.verify_password(password) {
            Some(user)
        } else {
            warn!("Invalid password for user: {}", username);
            None
        }
    }

    /// Get user by ID
    pub async fn get_user_by_id(&self, user_id: &str) -> Option<UserData> {
        match &self.store {
            UserStore::Memory { users, .. } => {
                let users = users.read().unwrap();
                users.get(user_id).cloned()
            }
            #[cfg(feature = "sqlite")]
            UserStore::Database(store) => store.get_user_by_id(user_id).await.unwrap_or(None),
        }
    }

    /// Get user by username
    pub async fn get_user_by_username(&self, username: &str) -> Option<UserData> {
        match &self.store {
            UserStore::Memory {
                users,
                users_by_username,
            } => {
                let user_id = {
                    let users_by_username = users_by_username.read().unwrap();
                    users_by_username.get(username).cloned()?
                };
                let users = users.read().unwrap();
                users.get(&user_id).cloned()
            }
            #[cfg(feature = "sqlite")]
            UserStore::Database(store) => {
                store.get_user_by_username(username).await.unwrap_or(None)
            }
        }
    }

    /// Set the role reference for one role name on a user
    pub async fn assign_role(
        &self,
        user_id: &str,
        scope: RoleScope,
        role: RoleRef,
    ) -> Result<UserData, StoreError> {
        match &self.store {
            UserStore::Memory { users, .. } => {
                let mut users = users.write().unwrap();
                let user = users
                    .get_mut(user_id)
                    .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;

                match scope {
                    RoleScope::Admin => user.roles.admin = Some(role),
                    RoleScope::Account => user.roles.account = Some(role),
                }

                Ok(user.clone())
            }
            #[cfg(feature = "sqlite")]
            UserStore::Database(store) => store.assign_role(user_id, scope, &role).await,
        }
    }

    /// List all users
    pub async fn list_users(&self) -> Vec<UserInfo> {
        match &self.store {
            UserStore::Memory { users, .. } => {
                let users = users.read().unwrap();
                let mut infos: Vec<UserInfo> = users.values().map(UserData::to_user_info).collect();
                infos.sort_by(|a, b| a.username.cmp(&b.username));
                infos
            }
            #[cfg(feature = "sqlite")]
            UserStore::Database(store) => store.list_users().await.unwrap_or_default(),
        }
    }
}
