//! Session tools
//!
//! Sign in and out, and report who is signed in.

use serde::Serialize;

use crate::auth::{verify_password, AuthError, Session};
use crate::db::Database;
use crate::models::{GrantDetail, User};

/// Summary of the signed-in user
#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub user_id: i64,
    pub username: String,
    pub is_admin: bool,
    pub restaurant_ids: Vec<i64>,
}

impl SessionInfo {
    fn from_session(session: &Session) -> Self {
        Self {
            user_id: session.user_id,
            username: session.username.clone(),
            is_admin: session.is_admin,
            restaurant_ids: session.grants.iter().map(|g| g.restaurant_id).collect(),
        }
    }
}

/// Response for my_roles
#[derive(Debug, Serialize)]
pub struct MyRolesResponse {
    pub username: String,
    pub is_admin: bool,
    pub roles: Vec<GrantDetail>,
}

/// Check credentials and build a session
pub fn sign_in(db: &Database, username: &str, password: &str) -> Result<(Session, SessionInfo), String> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AuthError::InvalidCredentials.to_string());
    }

    let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;

    let user = User::get_by_username(&conn, username)
        .map_err(|e| format!("Failed to look up user: {}", e))?;
    let user = match user {
        Some(user) if verify_password(password, &user.password_hash) => user,
        _ => {
            tracing::warn!(username, "Rejected sign-in");
            return Err(AuthError::InvalidCredentials.to_string());
        }
    };
    if !user.is_active {
        return Err(AuthError::Inactive.to_string());
    }

    let grants = User::grants(&conn, user.id).map_err(|e| format!("Failed to load roles: {}", e))?;
    let session = Session {
        user_id: user.id,
        username: user.username,
        is_admin: user.is_admin,
        grants,
    };

    tracing::info!(username = %session.username, "Signed in");
    let info = SessionInfo::from_session(&session);
    Ok((session, info))
}

/// Reload a session's account flags and grants so that changes made by an
/// administrator apply without signing in again
pub fn refresh_session(db: &Database, session: &Session) -> Result<Session, String> {
    let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;

    let user = User::get_by_id(&conn, session.user_id)
        .map_err(|e| format!("Failed to look up user: {}", e))?
        .ok_or_else(|| AuthError::NotSignedIn.to_string())?;
    if !user.is_active {
        return Err(AuthError::Inactive.to_string());
    }

    let grants = User::grants(&conn, user.id).map_err(|e| format!("Failed to load roles: {}", e))?;
    Ok(Session {
        user_id: user.id,
        username: user.username,
        is_admin: user.is_admin,
        grants,
    })
}

/// Describe the current session
pub fn whoami(session: Option<&Session>) -> Result<SessionInfo, String> {
    session
        .map(SessionInfo::from_session)
        .ok_or_else(|| AuthError::NotSignedIn.to_string())
}

/// Restaurants and roles of the signed-in user
pub fn my_roles(db: &Database, session: &Session) -> Result<MyRolesResponse, String> {
    let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;
    let roles = User::grant_details(&conn, session.user_id)
        .map_err(|e| format!("Failed to load roles: {}", e))?;

    Ok(MyRolesResponse {
        username: session.username.clone(),
        is_admin: session.is_admin,
        roles,
    })
}
