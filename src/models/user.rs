//! User model and role grants

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::auth::{hash_password, Role, RoleGrant};
use crate::db::{DbError, DbResult};


/// A back-office user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub date_joined: String,
}

/// Data for creating a user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserCreate {
    pub username: String,
    #[serde(default)]
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
}

/// Data for updating a user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub password: Option<String>,
    pub is_admin: Option<bool>,
    pub is_active: Option<bool>,
}

/// A role grant with the restaurant name resolved
#[derive(Debug, Clone, Serialize)]
pub struct GrantDetail {
    pub restaurant_id: i64,
    pub restaurant_name: String,
    pub role: Role,
    pub role_label: &'static str,
}

impl User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            email: row.get("email")?,
            password_hash: row.get("password_hash")?,
            is_admin: row.get::<_, i32>("is_admin")? != 0,
            is_active: row.get::<_, i32>("is_active")? != 0,
            date_joined: row.get("date_joined")?,
        })
    }

    /// Insert a new user, hashing the password
    pub fn create(conn: &Connection, data: &UserCreate) -> DbResult<Self> {
        conn.execute(
            "INSERT INTO users (username, email, password_hash, is_admin) VALUES (?1, ?2, ?3, ?4)",
            params![
                data.username,
                data.email,
                hash_password(&data.password),
                data.is_admin as i32,
            ],
        )?;

        let id = conn.last_insert_rowid();
        Self::get_by_id(conn, id)?
            .ok_or_else(|| DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    pub fn get_by_id(conn: &Connection, id: i64) -> DbResult<Option<Self>> {
        let mut stmt = conn.prepare("SELECT * FROM users WHERE id = ?1")?;

        match stmt.query_row([id], Self::from_row) {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_by_username(conn: &Connection, username: &str) -> DbResult<Option<Self>> {
        let mut stmt = conn.prepare("SELECT * FROM users WHERE username = ?1")?;

        match stmt.query_row([username], Self::from_row) {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List users, optionally only those linked to one restaurant
    pub fn list(conn: &Connection, restaurant_id: Option<i64>) -> DbResult<Vec<Self>> {
        let users = match restaurant_id {
            Some(restaurant_id) => {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT * FROM users
                    WHERE id IN (SELECT user_id FROM role_grants WHERE restaurant_id = ?1)
                    ORDER BY username ASC
                    "#,
                )?;
                let rows = stmt
                    .query_map([restaurant_id], Self::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare("SELECT * FROM users ORDER BY username ASC")?;
                let rows = stmt
                    .query_map([], Self::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(users)
    }

    pub fn count(conn: &Connection) -> DbResult<i64> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Update a user
    pub fn update(conn: &Connection, id: i64, data: &UserUpdate) -> DbResult<Option<Self>> {
        let mut updates = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref email) = data.email {
            updates.push(format!("email = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(email.clone()));
        }
        if let Some(ref password) = data.password {
            updates.push(format!("password_hash = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(hash_password(password)));
        }
        if let Some(is_admin) = data.is_admin {
            updates.push(format!("is_admin = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(is_admin as i32));
        }
        if let Some(is_active) = data.is_active {
            updates.push(format!("is_active = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(is_active as i32));
        }

        if updates.is_empty() {
            return Self::get_by_id(conn, id);
        }

        let sql = format!(
            "UPDATE users SET {} WHERE id = ?{}",
            updates.join(", "),
            params_vec.len() + 1
        );
        params_vec.push(Box::new(id));

        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        conn.execute(&sql, params_refs.as_slice())?;

        Self::get_by_id(conn, id)
    }

    pub fn delete(conn: &Connection, id: i64) -> DbResult<bool> {
        let rows = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
        Ok(rows > 0)
    }

    /// Role grants of a user
    pub fn grants(conn: &Connection, user_id: i64) -> DbResult<Vec<RoleGrant>> {
        Ok(Self::grant_details(conn, user_id)?
            .into_iter()
            .map(|g| RoleGrant {
                restaurant_id: g.restaurant_id,
                role: g.role,
            })
            .collect())
    }

    /// Role grants with restaurant names
    pub fn grant_details(conn: &Connection, user_id: i64) -> DbResult<Vec<GrantDetail>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT g.restaurant_id, r.name AS restaurant_name, g.role
            FROM role_grants g
            INNER JOIN restaurants r ON r.id = g.restaurant_id
            WHERE g.user_id = ?1
            ORDER BY r.name ASC
            "#,
        )?;

        let rows = stmt
            .query_map([user_id], |row| {
                Ok((
                    row.get::<_, i64>("restaurant_id")?,
                    row.get::<_, String>("restaurant_name")?,
                    row.get::<_, String>("role")?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        // The CHECK constraint keeps unknown roles out; skip them if one slips through
        Ok(rows
            .into_iter()
            .filter_map(|(restaurant_id, restaurant_name, role)| {
                Role::from_str(&role).map(|role| GrantDetail {
                    restaurant_id,
                    restaurant_name,
                    role,
                    role_label: role.label(),
                })
            })
            .collect())
    }

    /// Replace all grants of a user with one role on the given restaurants
    pub fn set_grants(conn: &Connection, user_id: i64, role: Role, restaurant_ids: &[i64]) -> DbResult<()> {
        conn.execute("DELETE FROM role_grants WHERE user_id = ?1", [user_id])?;
        let mut stmt = conn.prepare(
            "INSERT OR IGNORE INTO role_grants (user_id, restaurant_id, role) VALUES (?1, ?2, ?3)",
        )?;
        for restaurant_id in restaurant_ids {
            stmt.execute(params![user_id, restaurant_id, role.as_str()])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verify_password;
    use crate::db::migrations::run_migrations;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO restaurants (id, name, cnpj) VALUES (1, 'Bistrô', '1'), (2, 'Cantina', '2');",
        )
        .unwrap();
        conn
    }

    fn ana() -> UserCreate {
        UserCreate {
            username: "ana".to_string(),
            email: "ana@example.com".to_string(),
            password: "s3nha".to_string(),
            is_admin: false,
        }
    }

    #[test]
    fn test_password_is_hashed() {
        let conn = setup();
        let user = User::create(&conn, &ana()).unwrap();
        assert_ne!(user.password_hash, "s3nha");
        assert!(verify_password("s3nha", &user.password_hash));
        assert!(user.is_active);

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
    }

    #[test]
    fn test_grants_are_replaced() {
        let conn = setup();
        let user = User::create(&conn, &ana()).unwrap();
        User::set_grants(&conn, user.id, Role::Redator, &[1, 2]).unwrap();
        assert_eq!(User::grants(&conn, user.id).unwrap().len(), 2);

        User::set_grants(&conn, user.id, Role::Master, &[2]).unwrap();
        let details = User::grant_details(&conn, user.id).unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].restaurant_name, "Cantina");
        assert_eq!(details[0].role, Role::Master);
        assert_eq!(User::list(&conn, Some(1)).unwrap().len(), 0);
        assert_eq!(User::list(&conn, None).unwrap().len(), 1);
    }

    #[test]
    fn test_update_password_and_deactivate() {
        let conn = setup();
        let user = User::create(&conn, &ana()).unwrap();
        let updated = User::update(
            &conn,
            user.id,
            &UserUpdate {
                password: Some("nova".to_string()),
                is_active: Some(false),
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();
        assert!(verify_password("nova", &updated.password_hash));
        assert!(!updated.is_active);
    }
}
