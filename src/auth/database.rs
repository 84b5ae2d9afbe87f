//! Database-backed storage for sessions, users, and role holders

use super::roles::{AccountData, AdminData, RoleRef, RoleScope};
use super::sessions::Session;
use super::users::{RoleRefs, UserData, UserInfo};
use super::StoreError;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use tracing::{debug, error, info};

/// Create the backing tables
pub async fn create_tables(pool: &SqlitePool) -> Result<(), StoreError> {
    let query = r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            key_hash TEXT NOT NULL,
            user_id TEXT NOT NULL,
            origin TEXT NOT NULL,
            user_agent TEXT NOT NULL,
            created_at TEXT NOT NULL,
            last_active TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT UNIQUE NOT NULL,
            email TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            roles TEXT NOT NULL DEFAULT '{}',
            is_system_root BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);

        CREATE TABLE IF NOT EXISTS admins (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            groups_json TEXT NOT NULL DEFAULT '{}',
            user_ref TEXT
        );

        CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            user_ref TEXT
        );
    "#;

    sqlx::query(query).execute(pool).await.map_err(|e| {
        error!("Failed to create tables: {}", e);
        StoreError::Database(e.to_string())
    })?;

    info!("Auth tables created successfully");
    Ok(())
}

fn db_err(e: sqlx::Error) -> StoreError {
    if e.as_database_error()
        .map(|d| d.is_unique_violation())
        .unwrap_or(false)
    {
        StoreError::Conflict(e.to_string())
    } else {
        StoreError::Database(e.to_string())
    }
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, StoreError> {
    value
        .parse()
        .map_err(|e| StoreError::Database(format!("bad timestamp {}: {}", value, e)))
}

fn parse_json<T: serde::de::DeserializeOwned>(value: &str) -> Result<T, StoreError> {
    serde_json::from_str(value).map_err(|e| StoreError::Database(e.to_string()))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Database(e.to_string()))
}

/// Database-backed session store
#[derive(Debug, Clone)]
pub struct DatabaseSessionStore {
    pool: SqlitePool,
}

impl DatabaseSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, key_hash, user_id, origin, user_agent, created_at, last_active)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.key_hash)
        .bind(&session.user_id)
        .bind(&session.origin)
        .bind(&session.user_agent)
        .bind(session.created_at.to_rfc3339())
        .bind(session.last_active.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!("Session inserted: {}", session.id);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Session {
            id: row.get("id"),
            key_hash: row.get("key_hash"),
            user_id: row.get("user_id"),
            origin: row.get("origin"),
            user_agent: row.get("user_agent"),
            created_at: parse_time(&row.get::<String, _>("created_at"))?,
            last_active: parse_time(&row.get::<String, _>("last_active"))?,
        }))
    }

    pub async fn touch(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE sessions SET last_active = ? WHERE id = ?")
            .bind(at.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn remove(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn remove_for_user(&self, user_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

/// Database-backed user store
#[derive(Debug, Clone)]
pub struct DatabaseUserStore {
    pool: SqlitePool,
}

impl DatabaseUserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<UserData, StoreError> {
        Ok(UserData {
            id: row.get("id"),
            username: row.get("username"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            roles: parse_json(&row.get::<String, _>("roles"))?,
            is_system_root: row.get("is_system_root"),
            created_at: parse_time(&row.get::<String, _>("created_at"))?,
        })
    }

    pub async fn insert_user(&self, user: &UserData) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, roles, is_system_root, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(to_json(&user.roles)?)
        .bind(user.is_system_root)
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!("User inserted: {}", user.username);
        Ok(())
    }

    pub async fn get_user_by_id(&self, user_id: &str) -> Result<Option<UserData>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    pub async fn get_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserData>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    pub async fn assign_role(
        &self,
        user_id: &str,
        scope: RoleScope,
        role: &RoleRef,
    ) -> Result<UserData, StoreError> {
        let mut user = self
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;

        match scope {
            RoleScope::Admin => user.roles.admin = Some(role.clone()),
            RoleScope::Account => user.roles.account = Some(role.clone()),
        }

        sqlx::query("UPDATE users SET roles = ? WHERE id = ?")
            .bind(to_json(&user.roles)?)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(user)
    }

    pub async fn list_users(&self) -> Result<Vec<UserInfo>, StoreError> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY username")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter()
            .map(|row| Self::row_to_user(row).map(|user| user.to_user_info()))
            .collect()
    }
}

/// Database-backed role holder store
#[derive(Debug, Clone)]
pub struct DatabaseRoleStore {
    pool: SqlitePool,
}

impl DatabaseRoleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert_admin(&self, admin: &AdminData) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO admins (id, name, groups_json, user_ref) VALUES (?, ?, ?, ?)")
            .bind(&admin.id)
            .bind(&admin.name)
            .bind(to_json(&admin.groups)?)
            .bind(admin.user.as_ref().map(to_json).transpose()?)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn insert_account(&self, account: &AccountData) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO accounts (id, name, user_ref) VALUES (?, ?, ?)")
            .bind(&account.id)
            .bind(&account.name)
            .bind(account.user.as_ref().map(to_json).transpose()?)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn get_admin(&self, id: &str) -> Result<Option<AdminData>, StoreError> {
        let row = sqlx::query("SELECT * FROM admins WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(AdminData {
            id: row.get("id"),
            name: row.get("name"),
            groups: parse_json(&row.get::<String, _>("groups_json"))?,
            user: row
                .get::<Option<String>, _>("user_ref")
                .as_deref()
                .map(parse_json)
                .transpose()?,
        }))
    }

    pub async fn get_account(&self, id: &str) -> Result<Option<AccountData>, StoreError> {
        let row = sqlx::query("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(AccountData {
            id: row.get("id"),
            name: row.get("name"),
            user: row
                .get::<Option<String>, _>("user_ref")
                .as_deref()
                .map(parse_json)
                .transpose()?,
        }))
    }

    pub async fn link_admin(
        &self,
        id: &str,
        groups: &BTreeMap<String, String>,
        user: &RoleRef,
    ) -> Result<AdminData, StoreError> {
        let result = sqlx::query("UPDATE admins SET groups_json = ?, user_ref = ? WHERE id = ?")
            .bind(to_json(groups)?)
            .bind(to_json(user)?)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("admin {}", id)));
        }

        self.get_admin(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("admin {}", id)))
    }

    pub async fn link_account(&self, id: &str, user: &RoleRef) -> Result<AccountData, StoreError> {
        let result = sqlx::query("UPDATE accounts SET user_ref = ? WHERE id = ?")
            .bind(to_json(user)?)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("account {}", id)));
        }

        self.get_account(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("account {}", id)))
    }
}
