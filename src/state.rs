//! Application state wiring the auth services together

use crate::auth::{
    roles::{RoleService, RoleStore},
    sessions::{SessionService, SessionStore},
    users::{UserService, UserStore},
};
use crate::{AppConfig, AppResult};
use tracing::info;

#[cfg(feature = "sqlite")]
use crate::auth::database::{DatabaseRoleStore, DatabaseSessionStore, DatabaseUserStore};
#[cfg(feature = "sqlite")]
use crate::AppError;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration
    pub config: AppConfig,
    /// User identities
    pub users: UserService,
    /// Sessions
    pub sessions: SessionService,
    /// Role holders (admins and accounts)
    pub roles: RoleService,
}

impl AppState {
    /// Create a new application state.
    ///
    /// A configured database URL selects the sqlite-backed stores; otherwise
    /// everything lives in memory, which is what the tests use.
    pub async fn new(config: AppConfig) -> AppResult<Self> {
        #[cfg(feature = "sqlite")]
        if let Some(database_url) = &config.database_url {
            let pool = sqlx::sqlite::SqlitePoolOptions::new()
                .connect(database_url)
                .await
                .map_err(|e| AppError::Config(format!("Failed to connect to database: {}", e)))?;

            crate::auth::database::create_tables(&pool).await?;

            let state = Self {
                config: config.clone(),
                users: UserService::new(UserStore::database(DatabaseUserStore::new(pool.clone()))),
                sessions: SessionService::new(SessionStore::database(DatabaseSessionStore::new(
                    pool.clone(),
                ))),
                roles: RoleService::new(RoleStore::database(DatabaseRoleStore::new(pool))),
            };

            info!("Application state initialized with database stores");
            return Ok(state);
        }

        let state = Self {
            config,
            users: UserService::default(),
            sessions: SessionService::default(),
            roles: RoleService::default(),
        };

        info!("Application state initialized with memory stores");
        Ok(state)
    }
}
