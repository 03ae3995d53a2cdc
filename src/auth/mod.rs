//! Authentication and authorization
//!
//! Provides:
//! - Salted password hashing
//! - Per-restaurant roles
//! - The signed-in `Session` and its permission checks

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Authorization errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Not signed in")]
    NotSignedIn,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("User account is inactive")]
    Inactive,

    #[error("Permission denied: {0}")]
    Forbidden(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Role a user holds on one restaurant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Administrador,
    Master,
    Redator,
    UsuarioComum,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrador => "administrador",
            Role::Master => "master",
            Role::Redator => "redator",
            Role::UsuarioComum => "usuario_comum",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "administrador" | "admin" => Some(Role::Administrador),
            "master" => Some(Role::Master),
            "redator" | "editor" => Some(Role::Redator),
            "usuario_comum" | "usuario" | "comum" | "user" => Some(Role::UsuarioComum),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::Administrador => "Administrador",
            Role::Master => "Master",
            Role::Redator => "Redator",
            Role::UsuarioComum => "Usuário Comum",
        }
    }

    fn edits_catalog(&self) -> bool {
        matches!(self, Role::Administrador | Role::Master | Role::Redator)
    }

    fn manages_restaurant(&self) -> bool {
        matches!(self, Role::Administrador | Role::Master)
    }

    /// Redatores may be linked to several restaurants at once
    pub fn allows_multiple_restaurants(&self) -> bool {
        matches!(self, Role::Redator)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User × restaurant → role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub restaurant_id: i64,
    pub role: Role,
}

/// The signed-in user, passed explicitly to every tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: i64,
    pub username: String,
    pub is_admin: bool,
    pub grants: Vec<RoleGrant>,
}

impl Session {
    /// Role held on a restaurant, if any
    pub fn role_for(&self, restaurant_id: i64) -> Option<Role> {
        self.grants
            .iter()
            .find(|g| g.restaurant_id == restaurant_id)
            .map(|g| g.role)
    }

    /// Label recorded in the activity log
    pub fn role_label(&self, restaurant_id: Option<i64>) -> String {
        match restaurant_id.and_then(|id| self.role_for(id)) {
            Some(role) => role.as_str().to_string(),
            None if self.is_admin => Role::Administrador.as_str().to_string(),
            None => String::new(),
        }
    }

    /// Restaurants whose data this session may read; `None` means all of them
    pub fn visible_restaurants(&self) -> Option<Vec<i64>> {
        if self.is_admin {
            None
        } else {
            Some(self.grants.iter().map(|g| g.restaurant_id).collect())
        }
    }

    pub fn can_view(&self, restaurant_id: i64) -> bool {
        self.is_admin || self.role_for(restaurant_id).is_some()
    }

    pub fn can_edit_catalog(&self, restaurant_id: i64) -> bool {
        self.is_admin || self.role_for(restaurant_id).map_or(false, |r| r.edits_catalog())
    }

    pub fn can_edit_restaurant(&self, restaurant_id: i64) -> bool {
        self.is_admin
            || self
                .role_for(restaurant_id)
                .map_or(false, |r| r.manages_restaurant())
    }

    pub fn can_see_costs(&self, restaurant_id: i64) -> bool {
        self.can_edit_restaurant(restaurant_id)
    }

    pub fn require_view(&self, restaurant_id: i64) -> AuthResult<()> {
        if self.can_view(restaurant_id) {
            Ok(())
        } else {
            Err(AuthError::Forbidden(format!(
                "no access to restaurant {}",
                restaurant_id
            )))
        }
    }

    pub fn require_edit_catalog(&self, restaurant_id: i64) -> AuthResult<()> {
        if self.can_edit_catalog(restaurant_id) {
            Ok(())
        } else {
            Err(AuthError::Forbidden(format!(
                "cannot edit the catalog of restaurant {}",
                restaurant_id
            )))
        }
    }

    pub fn require_edit_restaurant(&self, restaurant_id: i64) -> AuthResult<()> {
        if self.can_edit_restaurant(restaurant_id) {
            Ok(())
        } else {
            Err(AuthError::Forbidden(format!(
                "cannot edit restaurant {}",
                restaurant_id
            )))
        }
    }

    pub fn require_admin(&self) -> AuthResult<()> {
        if self.is_admin {
            Ok(())
        } else {
            Err(AuthError::Forbidden("administrators only".to_string()))
        }
    }
}

/// Unwrap an optional session, failing when nobody is signed in
pub fn require_session(session: Option<&Session>) -> AuthResult<&Session> {
    session.ok_or(AuthError::NotSignedIn)
}

fn digest(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash a password for storage as `salt_hex$hash_hex`
pub fn hash_password(password: &str) -> String {
    let salt: [u8; 16] = rand::random();
    format!("{}${}", hex::encode(salt), digest(&salt, password))
}

/// Check a password against a stored hash
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, hash_hex)) = stored.split_once('$') else {
        return false;
    };
    match hex::decode(salt_hex) {
        Ok(salt) => digest(&salt, password) == hash_hex,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(is_admin: bool, grants: &[(i64, Role)]) -> Session {
        Session {
            user_id: 1,
            username: "ana".to_string(),
            is_admin,
            grants: grants
                .iter()
                .map(|&(restaurant_id, role)| RoleGrant { restaurant_id, role })
                .collect(),
        }
    }

    #[test]
    fn test_password_round_trip() {
        let stored = hash_password("s3nha");
        assert!(verify_password("s3nha", &stored));
        assert!(!verify_password("senha", &stored));
        assert!(!verify_password("s3nha", "garbage"));
    }

    #[test]
    fn test_same_password_hashes_differently() {
        assert_ne!(hash_password("x"), hash_password("x"));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!(Role::from_str("Master"), Some(Role::Master));
        assert_eq!(Role::from_str("usuario_comum"), Some(Role::UsuarioComum));
        assert_eq!(Role::from_str("chef"), None);
        assert_eq!(Role::Redator.as_str(), "redator");
    }

    #[test]
    fn test_redator_edits_but_sees_no_costs() {
        let s = session(false, &[(7, Role::Redator)]);
        assert!(s.can_view(7));
        assert!(s.can_edit_catalog(7));
        assert!(!s.can_see_costs(7));
        assert!(!s.can_edit_restaurant(7));
    }

    #[test]
    fn test_usuario_comum_is_read_only() {
        let s = session(false, &[(7, Role::UsuarioComum)]);
        assert!(s.can_view(7));
        assert!(s.require_edit_catalog(7).is_err());
        assert!(!s.can_see_costs(7));
    }

    #[test]
    fn test_master_manages_own_restaurant_only() {
        let s = session(false, &[(7, Role::Master)]);
        assert!(s.can_see_costs(7));
        assert!(s.can_edit_restaurant(7));
        assert!(!s.can_view(8));
        assert!(s.require_admin().is_err());
    }

    #[test]
    fn test_admin_sees_everything() {
        let s = session(true, &[]);
        assert!(s.can_view(99));
        assert!(s.can_see_costs(99));
        assert_eq!(s.visible_restaurants(), None);
        assert_eq!(s.role_label(Some(99)), "administrador");
    }

    #[test]
    fn test_require_session() {
        assert_eq!(require_session(None).unwrap_err(), AuthError::NotSignedIn);
    }
}
