//! FichaPro Tools module
//!
//! MCP tool implementations. Every tool takes the signed-in `Session`
//! explicitly and returns `Result<_, String>`.

pub mod activity;
pub mod categories;
pub mod dashboard;
pub mod ingredients;
pub mod recipes;
pub mod restaurants;
pub mod session;
pub mod status;
pub mod technical_sheets;
pub mod users;

use rusqlite::Connection;

use crate::auth::Session;
use crate::models::{ActivityAction, ActivityEntry, EntityKind, NewActivity};

/// Record one activity entry on behalf of the session's user
pub(crate) fn log_activity(
    conn: &Connection,
    session: &Session,
    restaurant_id: Option<i64>,
    kind: EntityKind,
    action: ActivityAction,
    name: &str,
    description: String,
) -> Result<(), String> {
    ActivityEntry::record(
        conn,
        &NewActivity {
            user_id: Some(session.user_id),
            restaurant_id,
            role: session.role_label(restaurant_id),
            kind,
            action,
            name: name.to_string(),
            description,
        },
    )
    .map(|_| ())
    .map_err(|e| format!("Failed to record activity: {}", e))
}

/// Pass a cost figure through only when the session may see it
pub(crate) fn visible_cost(session: &Session, restaurant_id: i64, value: Option<f64>) -> Option<f64> {
    if session.can_see_costs(restaurant_id) {
        value
    } else {
        None
    }
}

/// Clamp list paging parameters
pub(crate) fn paging(limit: i64, offset: i64) -> (i64, i64) {
    (limit.clamp(1, 200), offset.max(0))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::auth::{Role, RoleGrant, Session};
    use crate::db::{test_support::temp_database, Database};
    use crate::models::{Restaurant, RestaurantCreate, User, UserCreate};

    pub struct Fixture {
        pub _dir: tempfile::TempDir,
        pub db: Database,
        pub admin: Session,
        pub restaurant_id: i64,
        pub other_restaurant_id: i64,
    }

    impl Fixture {
        /// Session for a new user holding `role` on the fixture restaurant
        pub fn member(&self, username: &str, role: Role) -> Session {
            let user = self
                .db
                .with_conn(|conn| {
                    let user = User::create(
                        conn,
                        &UserCreate {
                            username: username.to_string(),
                            password: "senha".to_string(),
                            ..Default::default()
                        },
                    )?;
                    User::set_grants(conn, user.id, role, &[self.restaurant_id])?;
                    Ok(user)
                })
                .unwrap();
            Session {
                user_id: user.id,
                username: user.username,
                is_admin: false,
                grants: vec![RoleGrant {
                    restaurant_id: self.restaurant_id,
                    role,
                }],
            }
        }

        pub fn activity_count(&self) -> i64 {
            self.db
                .with_conn(|conn| {
                    Ok(conn.query_row("SELECT COUNT(*) FROM activity_log", [], |r| r.get(0))?)
                })
                .unwrap()
        }
    }

    pub fn fixture() -> Fixture {
        let (dir, db) = temp_database();
        let (admin_user, restaurant_id, other_restaurant_id) = db
            .with_conn(|conn| {
                let admin = User::create(
                    conn,
                    &UserCreate {
                        username: "admin".to_string(),
                        password: "admin".to_string(),
                        is_admin: true,
                        ..Default::default()
                    },
                )?;
                let r = Restaurant::create(
                    conn,
                    &RestaurantCreate {
                        name: "Bistrô".to_string(),
                        cnpj: "11.111.111/0001-11".to_string(),
                        markup_factor: Some(1.5),
                        ..Default::default()
                    },
                )?;
                let other = Restaurant::create(
                    conn,
                    &RestaurantCreate {
                        name: "Cantina".to_string(),
                        cnpj: "22.222.222/0001-22".to_string(),
                        ..Default::default()
                    },
                )?;
                Ok((admin, r.id, other.id))
            })
            .unwrap();

        Fixture {
            _dir: dir,
            db,
            admin: Session {
                user_id: admin_user.id,
                username: admin_user.username,
                is_admin: true,
                grants: Vec::new(),
            },
            restaurant_id,
            other_restaurant_id,
        }
    }
}
