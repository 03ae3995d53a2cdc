//! User administration tools
//!
//! Administrator-only management of accounts and their restaurant roles.

use rusqlite::Connection;
use serde::Serialize;

use crate::auth::{Role, Session};
use crate::db::{Database, DbError, DbResult};
use crate::models::{ActivityAction, EntityKind, GrantDetail, Restaurant, User, UserCreate, UserUpdate};

use super::log_activity;

/// User with its restaurant roles
#[derive(Debug, Serialize)]
pub struct UserView {
    #[serde(flatten)]
    pub user: User,
    pub roles: Vec<GrantDetail>,
}

/// Response for list_users
#[derive(Debug, Serialize)]
pub struct ListUsersResponse {
    pub users: Vec<UserView>,
    pub total: usize,
}

/// Response for delete_user
#[derive(Debug, Serialize)]
pub struct DeleteUserResponse {
    pub success: bool,
    pub deleted_id: i64,
}

/// Role assignment requested for a user
#[derive(Debug, Clone)]
pub struct RoleAssignment {
    pub role: Role,
    pub restaurant_ids: Vec<i64>,
}

fn user_view(conn: &Connection, user: User) -> DbResult<UserView> {
    let roles = User::grant_details(conn, user.id)?;
    Ok(UserView { user, roles })
}

fn check_assignment(assignment: &RoleAssignment) -> Result<(), String> {
    if assignment.restaurant_ids.len() > 1 && !assignment.role.allows_multiple_restaurants() {
        return Err(format!(
            "Role {} can be linked to a single restaurant only",
            assignment.role.label()
        ));
    }
    Ok(())
}

fn apply_assignment(conn: &Connection, user_id: i64, assignment: &RoleAssignment) -> DbResult<()> {
    for restaurant_id in &assignment.restaurant_ids {
        if Restaurant::get_by_id(conn, *restaurant_id)?.is_none() {
            return Err(DbError::Constraint(format!(
                "Restaurant not found with id: {}",
                restaurant_id
            )));
        }
    }
    User::set_grants(conn, user_id, assignment.role, &assignment.restaurant_ids)
}

/// Create a user, optionally with a role on one or more restaurants
pub fn create_user(
    db: &Database,
    session: &Session,
    mut data: UserCreate,
    assignment: Option<RoleAssignment>,
) -> Result<UserView, String> {
    session.require_admin().map_err(|e| e.to_string())?;

    data.username = data.username.trim().to_string();
    if data.username.is_empty() {
        return Err("Username cannot be empty".to_string());
    }
    if data.password.is_empty() {
        return Err("Password cannot be empty".to_string());
    }
    if let Some(ref assignment) = assignment {
        check_assignment(assignment)?;
    }

    let view = db
        .with_transaction(|tx| {
            if User::get_by_username(tx, &data.username)?.is_some() {
                return Err(DbError::Constraint(format!(
                    "Username '{}' is already taken",
                    data.username
                )));
            }
            let user = User::create(tx, &data)?;
            if let Some(ref assignment) = assignment {
                apply_assignment(tx, user.id, assignment)?;
            }
            log_activity(
                tx,
                session,
                None,
                EntityKind::Usuario,
                ActivityAction::Criado,
                &user.username,
                assignment
                    .as_ref()
                    .map(|a| a.role.label().to_string())
                    .unwrap_or_default(),
            )
            .map_err(DbError::Constraint)?;
            user_view(tx, user)
        })
        .map_err(|e| format!("Failed to create user: {}", e))?;

    tracing::info!(username = %view.user.username, "Created user");
    Ok(view)
}

/// List users, optionally only those linked to a restaurant
pub fn list_users(db: &Database, session: &Session, restaurant_id: Option<i64>) -> Result<ListUsersResponse, String> {
    session.require_admin().map_err(|e| e.to_string())?;

    let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;
    let users = User::list(&conn, restaurant_id).map_err(|e| format!("Failed to list users: {}", e))?;

    let users = users
        .into_iter()
        .map(|user| user_view(&conn, user))
        .collect::<DbResult<Vec<_>>>()
        .map_err(|e| format!("Failed to load roles: {}", e))?;

    Ok(ListUsersResponse {
        total: users.len(),
        users,
    })
}

/// Update a user's account fields and, when given, replace its roles
pub fn update_user(
    db: &Database,
    session: &Session,
    id: i64,
    data: UserUpdate,
    assignment: Option<RoleAssignment>,
) -> Result<UserView, String> {
    session.require_admin().map_err(|e| e.to_string())?;

    if id == session.user_id && (data.is_admin == Some(false) || data.is_active == Some(false)) {
        return Err("You cannot remove your own administrator access".to_string());
    }
    if data.password.as_deref().is_some_and(str::is_empty) {
        return Err("Password cannot be empty".to_string());
    }
    if let Some(ref assignment) = assignment {
        check_assignment(assignment)?;
    }

    db.with_transaction(|tx| {
        let user = User::update(tx, id, &data)?
            .ok_or_else(|| DbError::Constraint(format!("User not found with id: {}", id)))?;
        if let Some(ref assignment) = assignment {
            apply_assignment(tx, id, assignment)?;
        }
        log_activity(
            tx,
            session,
            None,
            EntityKind::Usuario,
            ActivityAction::Editado,
            &user.username,
            String::new(),
        )
        .map_err(DbError::Constraint)?;
        user_view(tx, user)
    })
    .map_err(|e| format!("Failed to update user: {}", e))
}

/// Delete a user and its roles
pub fn delete_user(db: &Database, session: &Session, id: i64) -> Result<DeleteUserResponse, String> {
    session.require_admin().map_err(|e| e.to_string())?;
    if id == session.user_id {
        return Err("You cannot delete your own account".to_string());
    }

    db.with_transaction(|tx| {
        let user = User::get_by_id(tx, id)?
            .ok_or_else(|| DbError::Constraint(format!("User not found with id: {}", id)))?;
        User::delete(tx, id)?;
        log_activity(
            tx,
            session,
            None,
            EntityKind::Usuario,
            ActivityAction::Excluido,
            &user.username,
            String::new(),
        )
        .map_err(DbError::Constraint)?;
        Ok(())
    })
    .map_err(|e| format!("Failed to delete user: {}", e))?;

    tracing::info!(id, "Deleted user");
    Ok(DeleteUserResponse {
        success: true,
        deleted_id: id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::session::sign_in;
    use crate::tools::test_support::fixture;

    fn new_user(username: &str) -> UserCreate {
        UserCreate {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password: "segredo".to_string(),
            is_admin: false,
        }
    }

    #[test]
    fn test_admin_creates_redator_on_two_restaurants() {
        let fx = fixture();
        let assignment = RoleAssignment {
            role: Role::Redator,
            restaurant_ids: vec![fx.restaurant_id, fx.other_restaurant_id],
        };
        let view = create_user(&fx.db, &fx.admin, new_user("bia"), Some(assignment)).unwrap();
        assert_eq!(view.roles.len(), 2);

        let (session, _) = sign_in(&fx.db, "bia", "segredo").unwrap();
        assert!(session.can_edit_catalog(fx.other_restaurant_id));
        assert!(!session.can_see_costs(fx.restaurant_id));
    }

    #[test]
    fn test_single_restaurant_roles() {
        let fx = fixture();
        let assignment = RoleAssignment {
            role: Role::Master,
            restaurant_ids: vec![fx.restaurant_id, fx.other_restaurant_id],
        };
        assert!(create_user(&fx.db, &fx.admin, new_user("caio"), Some(assignment)).is_err());

        let missing = RoleAssignment {
            role: Role::Master,
            restaurant_ids: vec![9999],
        };
        assert!(create_user(&fx.db, &fx.admin, new_user("caio"), Some(missing)).is_err());
    }

    #[test]
    fn test_non_admins_cannot_manage_users() {
        let fx = fixture();
        let master = fx.member("m", Role::Master);
        assert!(create_user(&fx.db, &master, new_user("x"), None).is_err());
        assert!(list_users(&fx.db, &master, None).is_err());
    }

    #[test]
    fn test_update_and_delete() {
        let fx = fixture();
        let view = create_user(&fx.db, &fx.admin, new_user("dora"), None).unwrap();
        assert!(create_user(&fx.db, &fx.admin, new_user("dora"), None).is_err());

        let update = UserUpdate {
            email: Some("dora@bistro.com".to_string()),
            ..Default::default()
        };
        let assignment = RoleAssignment {
            role: Role::UsuarioComum,
            restaurant_ids: vec![fx.restaurant_id],
        };
        let updated = update_user(&fx.db, &fx.admin, view.user.id, update, Some(assignment)).unwrap();
        assert_eq!(updated.user.email, "dora@bistro.com");
        assert_eq!(updated.roles[0].role, Role::UsuarioComum);

        let listed = list_users(&fx.db, &fx.admin, Some(fx.restaurant_id)).unwrap();
        assert_eq!(listed.total, 1);

        assert!(delete_user(&fx.db, &fx.admin, fx.admin.user_id).is_err());
        assert!(delete_user(&fx.db, &fx.admin, view.user.id).unwrap().success);
        assert_eq!(fx.activity_count(), 3);
    }
}
