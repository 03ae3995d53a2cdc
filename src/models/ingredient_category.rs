//! Ingredient category model

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::db::{DbError, DbResult};

/// A named group of ingredients within one restaurant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngredientCategory {
    pub id: i64,
    pub restaurant_id: i64,
    pub name: String,
}

impl IngredientCategory {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            restaurant_id: row.get("restaurant_id")?,
            name: row.get("name")?,
        })
    }

    pub fn create(conn: &Connection, restaurant_id: i64, name: &str) -> DbResult<Self> {
        conn.execute(
            "INSERT INTO ingredient_categories (restaurant_id, name) VALUES (?1, ?2)",
            params![restaurant_id, name],
        )?;

        let id = conn.last_insert_rowid();
        Self::get_by_id(conn, id)?
            .ok_or_else(|| DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    pub fn get_by_id(conn: &Connection, id: i64) -> DbResult<Option<Self>> {
        let mut stmt = conn.prepare("SELECT * FROM ingredient_categories WHERE id = ?1")?;

        match stmt.query_row([id], Self::from_row) {
            Ok(category) => Ok(Some(category)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Case-insensitive lookup by name
    pub fn find_by_name(conn: &Connection, restaurant_id: i64, name: &str) -> DbResult<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT * FROM ingredient_categories WHERE restaurant_id = ?1 AND LOWER(name) = LOWER(?2)",
        )?;

        match stmt.query_row(params![restaurant_id, name], Self::from_row) {
            Ok(category) => Ok(Some(category)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_for_restaurant(conn: &Connection, restaurant_id: i64) -> DbResult<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT * FROM ingredient_categories WHERE restaurant_id = ?1 ORDER BY name ASC",
        )?;

        let categories = stmt
            .query_map([restaurant_id], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(categories)
    }

    /// Number of ingredients filed under a category
    pub fn ingredient_count(conn: &Connection, id: i64) -> DbResult<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM ingredients WHERE category_id = ?1",
            [id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Delete a category; its ingredients become uncategorised
    pub fn delete(conn: &Connection, id: i64) -> DbResult<bool> {
        let rows = conn.execute("DELETE FROM ingredient_categories WHERE id = ?1", [id])?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_migrations;

    #[test]
    fn test_delete_uncategorises_ingredients() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        conn.execute("INSERT INTO restaurants (name, cnpj) VALUES ('R', '1')", []).unwrap();

        let cat = IngredientCategory::create(&conn, 1, "Laticínios").unwrap();
        conn.execute(
            "INSERT INTO ingredients (restaurant_id, category_id, name, reference_weight, unit, reference_price)
             VALUES (1, ?1, 'Leite', 1000, 'ml', 5)",
            [cat.id],
        )
        .unwrap();
        assert_eq!(IngredientCategory::ingredient_count(&conn, cat.id).unwrap(), 1);
        assert!(IngredientCategory::find_by_name(&conn, 1, "laticínios").unwrap().is_some());

        assert!(IngredientCategory::delete(&conn, cat.id).unwrap());
        let category_id: Option<i64> = conn
            .query_row("SELECT category_id FROM ingredients WHERE name = 'Leite'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(category_id, None);
    }

    #[test]
    fn test_names_unique_per_restaurant() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute("INSERT INTO restaurants (name, cnpj) VALUES ('R', '1')", []).unwrap();
        conn.execute("INSERT INTO restaurants (name, cnpj) VALUES ('S', '2')", []).unwrap();

        IngredientCategory::create(&conn, 1, "Carnes").unwrap();
        assert!(IngredientCategory::create(&conn, 1, "Carnes").is_err());
        assert!(IngredientCategory::create(&conn, 2, "Carnes").is_ok());
        assert_eq!(IngredientCategory::list_for_restaurant(&conn, 1).unwrap().len(), 1);
    }
}
