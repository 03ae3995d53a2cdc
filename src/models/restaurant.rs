//! Restaurant model
//!
//! Tenants. Every catalog row belongs to exactly one restaurant.

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::db::{DbError, DbResult};

/// A restaurant (tenant)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: i64,
    pub name: String,
    pub cnpj: String,
    pub email: String,
    pub phone: String,
    pub cep: String,
    pub street: String,
    pub number: String,
    pub complement: String,
    pub district: String,
    pub city: String,
    pub state: String,
    pub markup_factor: f64,
    pub created_at: String,
    pub updated_at: String,
}

/// Data for creating a restaurant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestaurantCreate {
    pub name: String,
    pub cnpj: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub cep: String,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub complement: String,
    #[serde(default)]
    pub district: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    pub markup_factor: Option<f64>,
}

/// Data for updating a restaurant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestaurantUpdate {
    pub name: Option<String>,
    pub cnpj: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub cep: Option<String>,
    pub street: Option<String>,
    pub number: Option<String>,
    pub complement: Option<String>,
    pub district: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub markup_factor: Option<f64>,
}

/// SQL fragment restricting `column` to a set of ids
pub(crate) fn id_filter(column: &str, ids: &[i64]) -> String {
    if ids.is_empty() {
        return "0".to_string();
    }
    let ids_str = ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("{} IN ({})", column, ids_str)
}

impl Restaurant {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            cnpj: row.get("cnpj")?,
            email: row.get("email")?,
            phone: row.get("phone")?,
            cep: row.get("cep")?,
            street: row.get("street")?,
            number: row.get("number")?,
            complement: row.get("complement")?,
            district: row.get("district")?,
            city: row.get("city")?,
            state: row.get("state")?,
            markup_factor: row.get("markup_factor")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// Insert a new restaurant
    pub fn create(conn: &Connection, data: &RestaurantCreate) -> DbResult<Self> {
        conn.execute(
            r#"
            INSERT INTO restaurants (
                name, cnpj, email, phone,
                cep, street, number, complement, district, city, state,
                markup_factor
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                data.name,
                data.cnpj,
                data.email,
                data.phone,
                data.cep,
                data.street,
                data.number,
                data.complement,
                data.district,
                data.city,
                data.state,
                data.markup_factor.unwrap_or(1.0),
            ],
        )?;

        let id = conn.last_insert_rowid();
        Self::get_by_id(conn, id)?
            .ok_or_else(|| DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    /// Get a restaurant by ID
    pub fn get_by_id(conn: &Connection, id: i64) -> DbResult<Option<Self>> {
        let mut stmt = conn.prepare("SELECT * FROM restaurants WHERE id = ?1")?;

        match stmt.query_row([id], Self::from_row) {
            Ok(restaurant) => Ok(Some(restaurant)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether another restaurant already uses this CNPJ
    pub fn cnpj_taken(conn: &Connection, cnpj: &str, except_id: Option<i64>) -> DbResult<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM restaurants WHERE cnpj = ?1 AND id != ?2",
            params![cnpj, except_id.unwrap_or(-1)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// List restaurants, optionally restricted to a set of ids
    pub fn list(
        conn: &Connection,
        only_ids: Option<&[i64]>,
        query: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<Self>> {
        let mut conditions = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ids) = only_ids {
            conditions.push(id_filter("id", ids));
        }
        if let Some(q) = query {
            params_vec.push(Box::new(format!("%{}%", q)));
            conditions.push(format!(
                "(name LIKE ?{n} OR cnpj LIKE ?{n} OR city LIKE ?{n})",
                n = params_vec.len()
            ));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT * FROM restaurants {} ORDER BY name ASC LIMIT ?{} OFFSET ?{}",
            where_clause,
            params_vec.len() + 1,
            params_vec.len() + 2
        );
        params_vec.push(Box::new(limit));
        params_vec.push(Box::new(offset));

        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let restaurants = stmt
            .query_map(params_refs.as_slice(), Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(restaurants)
    }

    /// Count restaurants, optionally restricted to a set of ids
    pub fn count(conn: &Connection, only_ids: Option<&[i64]>) -> DbResult<i64> {
        let sql = match only_ids {
            Some(ids) => format!("SELECT COUNT(*) FROM restaurants WHERE {}", id_filter("id", ids)),
            None => "SELECT COUNT(*) FROM restaurants".to_string(),
        };
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count)
    }

    /// Update a restaurant
    pub fn update(conn: &Connection, id: i64, data: &RestaurantUpdate) -> DbResult<Option<Self>> {
        let mut updates = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        let text_fields = [
            ("name", &data.name),
            ("cnpj", &data.cnpj),
            ("email", &data.email),
            ("phone", &data.phone),
            ("cep", &data.cep),
            ("street", &data.street),
            ("number", &data.number),
            ("complement", &data.complement),
            ("district", &data.district),
            ("city", &data.city),
            ("state", &data.state),
        ];
        for (column, value) in text_fields {
            if let Some(value) = value {
                updates.push(format!("{} = ?{}", column, params_vec.len() + 1));
                params_vec.push(Box::new(value.clone()));
            }
        }
        if let Some(factor) = data.markup_factor {
            updates.push(format!("markup_factor = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(factor));
        }

        if updates.is_empty() {
            return Self::get_by_id(conn, id);
        }

        updates.push("updated_at = datetime('now')".to_string());

        let sql = format!(
            "UPDATE restaurants SET {} WHERE id = ?{}",
            updates.join(", "),
            params_vec.len() + 1
        );
        params_vec.push(Box::new(id));

        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        conn.execute(&sql, params_refs.as_slice())?;

        Self::get_by_id(conn, id)
    }

    /// Delete a restaurant and everything it owns
    pub fn delete(conn: &Connection, id: i64) -> DbResult<bool> {
        // Line items restrict deletes of their sources, so clear them first
        conn.execute(
            "DELETE FROM technical_sheet_items WHERE sheet_id IN (SELECT id FROM technical_sheets WHERE restaurant_id = ?1)",
            [id],
        )?;
        conn.execute(
            "DELETE FROM recipe_items WHERE recipe_id IN (SELECT id FROM recipes WHERE restaurant_id = ?1)",
            [id],
        )?;
        let rows = conn.execute("DELETE FROM restaurants WHERE id = ?1", [id])?;
        Ok(rows > 0)
    }
}
