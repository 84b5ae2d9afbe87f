//! Provisioning helpers
//!
//! One-call constructors that create a user identity and a role holder,
//! cross-link the two, open a session, and hand back a ready-to-use
//! authorization header. Used by the scenario tests and by the `seed` CLI
//! subcommand. The user identity and the role holder are created
//! concurrently (neither depends on the other); the cross-linking updates
//! and the session wait for both.
//!
//! Any store failure aborts the flow and surfaces verbatim; no rollback of
//! earlier steps is attempted.

use super::credentials::encode_basic;
use super::roles::{group_map, AccountData, AdminData, RoleRef, RoleScope};
use super::sessions::CreatedSession;
use super::users::UserData;
use super::StoreError;
use crate::AppState;
use tracing::info;

/// Reserved username for the system root identity
pub const ROOT_USERNAME: &str = "root";

/// Fixed origin/label pair for seeded sessions
const SEED_ORIGIN: &str = "127.0.0.1";
const SEED_USER_AGENT: &str = "Lab";

/// Everything a provisioning call created
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub user: UserData,
    pub admin: Option<AdminData>,
    pub account: Option<AccountData>,
    pub session: CreatedSession,
    /// Ready-to-use authorization header value
    pub auth_header: String,
}

/// Errors from a provisioning flow
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Create the system root identity: admin role, group `Root`, username and
/// password both `root`. The `is_system_root` marker is set here, once, at
/// creation.
pub async fn create_root_admin_user(state: &AppState) -> Result<Provisioned, ProvisionError> {
    let (admin, user) = tokio::join!(
        state.roles.create_admin("Root Admin"),
        state
            .users
            .create_user(ROOT_USERNAME, "root", "root@example.com", true),
    );
    let (admin, user) = (admin?, user?);

    finish_admin(state, admin, user, &["Root"]).await
}

/// Create an admin user with the given groups (display names; normalization
/// happens here, not at the call site)
pub async fn create_admin_user(
    state: &AppState,
    name: &str,
    username: &str,
    password: &str,
    email: &str,
    groups: &[&str],
) -> Result<Provisioned, ProvisionError> {
    let (admin, user) = tokio::join!(
        state.roles.create_admin(name),
        state.users.create_user(username, password, email, false),
    );
    let (admin, user) = (admin?, user?);

    finish_admin(state, admin, user, groups).await
}

/// Create an account user
pub async fn create_account_user(
    state: &AppState,
    name: &str,
    username: &str,
    password: &str,
    email: &str,
) -> Result<Provisioned, ProvisionError> {
    let (account, user) = tokio::join!(
        state.roles.create_account(name),
        state.users.create_user(username, password, email, false),
    );
    let (account, user) = (account?, user?);

    let session = state
        .sessions
        .create(&user.id, SEED_ORIGIN, SEED_USER_AGENT)
        .await?;

    let (account, user) = tokio::join!(
        state.roles.link_account(
            &account.id,
            RoleRef {
                id: user.id.clone(),
                name: user.username.clone(),
            },
        ),
        state.users.assign_role(
            &user.id,
            RoleScope::Account,
            RoleRef {
                id: account.id.clone(),
                name: account.name.clone(),
            },
        ),
    );
    let (account, user) = (account?, user?);

    let auth_header = encode_basic(&session.session.id, &session.key);
    info!("Provisioned account user: {}", user.username);

    Ok(Provisioned {
        user,
        admin: None,
        account: Some(account),
        session,
        auth_header,
    })
}

/// Shared fan-in for the admin flows: open the session, cross-link both
/// back-references, encode the header
async fn finish_admin(
    state: &AppState,
    admin: AdminData,
    user: UserData,
    groups: &[&str],
) -> Result<Provisioned, ProvisionError> {
    let session = state
        .sessions
        .create(&user.id, SEED_ORIGIN, SEED_USER_AGENT)
        .await?;

    let (admin, user) = tokio::join!(
        state.roles.link_admin(
            &admin.id,
            group_map(groups.iter().copied()),
            RoleRef {
                id: user.id.clone(),
                name: user.username.clone(),
            },
        ),
        state.users.assign_role(
            &user.id,
            RoleScope::Admin,
            RoleRef {
                id: admin.id.clone(),
                name: admin.name.clone(),
            },
        ),
    );
    let (admin, user) = (admin?, user?);

    let auth_header = encode_basic(&session.session.id, &session.key);
    info!("Provisioned admin user: {}", user.username);

    Ok(Provisioned {
        user,
        admin: Some(admin),
        account: None,
        session,
        auth_header,
    })
}
