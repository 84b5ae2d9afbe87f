//! Role holders: admins (with named groups) and accounts
//!
//! Role holders are independent records cross-linked to exactly one user via
//! mutual `RoleRef` back-references. Both sides store a denormalized
//! `{id, name}` snapshot, so the `name` halves may drift from the current
//! display names; that staleness is accepted and never resynchronized.

#[cfg(feature = "sqlite")]
use super::database::DatabaseRoleStore;
use super::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Named capability slots a user can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleScope {
    Admin,
    Account,
}

impl std::fmt::Display for RoleScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoleScope::Admin => write!(f, "admin"),
            RoleScope::Account => write!(f, "account"),
        }
    }
}

/// Denormalized `{id, name}` pointer between a user and a role holder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRef {
    pub id: String,
    pub name: String,
}

/// An admin role as it appears on a resolved principal: the role holder's
/// id and name plus its group mapping, snapshotted at resolution time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminRole {
    pub id: String,
    pub name: String,
    /// slug -> display name
    pub groups: BTreeMap<String, String>,
}

impl AdminRole {
    /// Check membership against one or more candidate group display names.
    ///
    /// Candidates are slugified with the same transform used at provisioning
    /// time, so matching is case and punctuation insensitive.
    pub fn is_member_of<I, S>(&self, groups: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        groups
            .into_iter()
            .any(|group| self.groups.contains_key(&slugify(group.as_ref())))
    }
}

/// Admin role holder record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminData {
    pub id: String,
    pub name: String,
    /// slug -> display name; keys are unique, insertion order irrelevant
    pub groups: BTreeMap<String, String>,
    /// Back-reference to the owning user
    pub user: Option<RoleRef>,
}

/// Account role holder record; no group concept
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountData {
    pub id: String,
    pub name: String,
    /// Back-reference to the owning user
    pub user: Option<RoleRef>,
}

/// Derive the stable map key for a group display name.
///
/// Deterministic: lower-cased, with runs of non-alphanumeric characters
/// collapsed to a single dash. Two differently-cased spellings of the same
/// group collide into one key; last write wins for the stored display form.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Build a group mapping from display names, slugifying each key
pub fn group_map<I, S>(groups: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    groups
        .into_iter()
        .map(|group| (slugify(group.as_ref()), group.as_ref().to_string()))
        .collect()
}

/// Role holder store supporting both in-memory and database storage
#[derive(Debug, Clone)]
pub enum RoleStore {
    /// In-memory storage (for development and testing)
    Memory {
        admins: Arc<RwLock<HashMap<String, AdminData>>>,
        accounts: Arc<RwLock<HashMap<String, AccountData>>>,
    },
    /// Database storage (for production)
    #[cfg(feature = "sqlite")]
    Database(DatabaseRoleStore),
}

impl Default for RoleStore {
    fn default() -> Self {
        Self::memory()
    }
}

impl RoleStore {
    /// Create in-memory role store
    pub fn memory() -> Self {
        Self::Memory {
            admins: Arc::new(RwLock::new(HashMap::new())),
            accounts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create database role store
    #[cfg(feature = "sqlite")]
    pub fn database(store: DatabaseRoleStore) -> Self {
        Self::Database(store)
    }
}

/// Service wrapping the role holder store
#[derive(Debug, Clone, Default)]
pub struct RoleService {
    store: RoleStore,
}

impl RoleService {
    /// Create new role service with custom store
    pub fn new(store: RoleStore) -> Self {
        Self { store }
    }

    /// Create an admin role holder with an empty group mapping
    pub async fn create_admin(&self, name: &str) -> Result<AdminData, StoreError> {
        let admin = AdminData {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            groups: BTreeMap::new(),
            user: None,
        };

        match &self.store {
            RoleStore::Memory { admins, .. } => {
                let mut admins = admins.write().unwrap();
                admins.insert(admin.id.clone(), admin.clone());
                Ok(admin)
            }
            #[cfg(feature = "sqlite")]
            RoleStore::Database(store) => {
                store.insert_admin(&admin).await?;
                Ok(admin)
            }
        }
    }

    /// Create an account role holder
    pub async fn create_account(&self, name: &str) -> Result<AccountData, StoreError> {
        let account = AccountData {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            user: None,
        };

        match &self.store {
            RoleStore::Memory { accounts, .. } => {
                let mut accounts = accounts.write().unwrap();
                accounts.insert(account.id.clone(), account.clone());
                Ok(account)
            }
            #[cfg(feature = "sqlite")]
            RoleStore::Database(store) => {
                store.insert_account(&account).await?;
                Ok(account)
            }
        }
    }

    /// Look up an admin role holder by id
    pub async fn get_admin(&self, id: &str) -> Option<AdminData> {
        match &self.store {
            RoleStore::Memory { admins, .. } => {
                let admins = admins.read().unwrap();
                admins.get(id).cloned()
            }
            #[cfg(feature = "sqlite")]
            RoleStore::Database(store) => store.get_admin(id).await.unwrap_or(None),
        }
    }

    /// Look up an account role holder by id
    pub async fn get_account(&self, id: &str) -> Option<AccountData> {
        match &self.store {
            RoleStore::Memory { accounts, .. } => {
                let accounts = accounts.read().unwrap();
                accounts.get(id).cloned()
            }
            #[cfg(feature = "sqlite")]
            RoleStore::Database(store) => store.get_account(id).await.unwrap_or(None),
        }
    }

    /// Set an admin's group mapping and user back-reference in one update
    pub async fn link_admin(
        &self,
        id: &str,
        groups: BTreeMap<String, String>,
        user: RoleRef,
    ) -> Result<AdminData, StoreError> {
        match &self.store {
            RoleStore::Memory { admins, .. } => {
                let mut admins = admins.write().unwrap();
                let admin = admins
                    .get_mut(id)
                    .ok_or_else(|| StoreError::NotFound(format!("admin {}", id)))?;
                admin.groups = groups;
                admin.user = Some(user);
                Ok(admin.clone())
            }
            #[cfg(feature = "sqlite")]
            RoleStore::Database(store) => store.link_admin(id, &groups, &user).await,
        }
    }

    /// Set an account's user back-reference
    pub async fn link_account(&self, id: &str, user: RoleRef) -> Result<AccountData, StoreError> {
        match &self.store {
            RoleStore::Memory { accounts, .. } => {
                let mut accounts = accounts.write().unwrap();
                let account = accounts
                    .get_mut(id)
                    .ok_or_else(|| StoreError::NotFound(format!("account {}", id)))?;
                account.user = Some(user);
                Ok(account.clone())
            }
            #[cfg(feature = "sqlite")]
            RoleStore::Database(store) => store.link_account(id, &user).await,
        }
    }
}
