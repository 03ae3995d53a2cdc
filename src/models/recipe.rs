//! Recipe model
//!
//! A recipe with its cached cost aggregates. Items live in `recipe_items`
//! (see `line_item`).

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::db::{DbError, DbResult};

use super::restaurant::id_filter;

/// A recipe with cached totals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub id: i64,
    pub restaurant_id: i64,
    pub name: String,
    pub prep_time_minutes: i64,
    pub portion_size: f64,
    pub method: String,
    pub yield_note: Option<String>,
    pub final_weight: Option<f64>,
    pub total_cost: Option<f64>,
    pub yield_portions: Option<f64>,
    pub restaurant_price: Option<f64>,
    pub delivery_price: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

/// Editable fields of a recipe
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipeFields {
    pub name: String,
    #[serde(default)]
    pub prep_time_minutes: i64,
    #[serde(default)]
    pub portion_size: f64,
    #[serde(default)]
    pub method: String,
    pub yield_note: Option<String>,
}

/// Aggregates written after every calculation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StoredCosts {
    pub final_weight: f64,
    pub total_cost: f64,
    /// Recipes only
    pub yield_portions: Option<f64>,
    pub restaurant_price: f64,
    pub delivery_price: f64,
}

impl Recipe {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            restaurant_id: row.get("restaurant_id")?,
            name: row.get("name")?,
            prep_time_minutes: row.get("prep_time_minutes")?,
            portion_size: row.get("portion_size")?,
            method: row.get("method")?,
            yield_note: row.get("yield_note")?,
            final_weight: row.get("final_weight")?,
            total_cost: row.get("total_cost")?,
            yield_portions: row.get("yield_portions")?,
            restaurant_price: row.get("restaurant_price")?,
            delivery_price: row.get("delivery_price")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// Insert a new recipe (without items)
    pub fn create(conn: &Connection, restaurant_id: i64, data: &RecipeFields) -> DbResult<Self> {
        conn.execute(
            r#"
            INSERT INTO recipes (restaurant_id, name, prep_time_minutes, portion_size, method, yield_note)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                restaurant_id,
                data.name,
                data.prep_time_minutes,
                data.portion_size,
                data.method,
                data.yield_note,
            ],
        )?;

        let id = conn.last_insert_rowid();
        Self::get_by_id(conn, id)?
            .ok_or_else(|| DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    /// Get a recipe by ID
    pub fn get_by_id(conn: &Connection, id: i64) -> DbResult<Option<Self>> {
        let mut stmt = conn.prepare("SELECT * FROM recipes WHERE id = ?1")?;

        match stmt.query_row([id], Self::from_row) {
            Ok(recipe) => Ok(Some(recipe)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All recipes of a restaurant
    pub fn list_for_restaurant(conn: &Connection, restaurant_id: i64) -> DbResult<Vec<Self>> {
        let mut stmt =
            conn.prepare("SELECT * FROM recipes WHERE restaurant_id = ?1 ORDER BY name ASC")?;
        let recipes = stmt
            .query_map([restaurant_id], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipes)
    }

    fn filter_clause(
        restaurant_id: Option<i64>,
        visible: Option<&[i64]>,
        query: Option<&str>,
        params_vec: &mut Vec<Box<dyn rusqlite::ToSql>>,
    ) -> String {
        let mut conditions = Vec::new();
        if let Some(ids) = visible {
            conditions.push(id_filter("restaurant_id", ids));
        }
        if let Some(restaurant_id) = restaurant_id {
            params_vec.push(Box::new(restaurant_id));
            conditions.push(format!("restaurant_id = ?{}", params_vec.len()));
        }
        if let Some(q) = query.filter(|q| !q.trim().is_empty()) {
            params_vec.push(Box::new(format!("%{}%", q.trim())));
            conditions.push(format!("name LIKE ?{}", params_vec.len()));
        }
        if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        }
    }

    /// List recipes with optional filtering
    pub fn list(
        conn: &Connection,
        restaurant_id: Option<i64>,
        visible: Option<&[i64]>,
        query: Option<&str>,
        sort_by: &str,
        sort_order: &str,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<Self>> {
        let order = if sort_order.to_lowercase() == "desc" { "DESC" } else { "ASC" };
        let sort_col = match sort_by.to_lowercase().as_str() {
            "created_at" => "created_at",
            "updated_at" => "updated_at",
            "total_cost" | "cost" => "COALESCE(total_cost, 0)",
            _ => "name",
        };

        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        let where_clause = Self::filter_clause(restaurant_id, visible, query, &mut params_vec);
        let sql = format!(
            "SELECT * FROM recipes {} ORDER BY {} {}, id ASC LIMIT ?{} OFFSET ?{}",
            where_clause,
            sort_col,
            order,
            params_vec.len() + 1,
            params_vec.len() + 2
        );
        params_vec.push(Box::new(limit));
        params_vec.push(Box::new(offset));

        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let recipes = stmt
            .query_map(params_refs.as_slice(), Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(recipes)
    }

    /// Count recipes
    pub fn count(
        conn: &Connection,
        restaurant_id: Option<i64>,
        visible: Option<&[i64]>,
        query: Option<&str>,
    ) -> DbResult<i64> {
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        let where_clause = Self::filter_clause(restaurant_id, visible, query, &mut params_vec);
        let sql = format!("SELECT COUNT(*) FROM recipes {}", where_clause);

        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let count: i64 = conn.query_row(&sql, params_refs.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    /// Average stored cost across recipes that have one
    pub fn average_cost(conn: &Connection, visible: Option<&[i64]>) -> DbResult<Option<f64>> {
        let sql = match visible {
            Some(ids) => format!(
                "SELECT AVG(total_cost) FROM recipes WHERE total_cost > 0 AND {}",
                id_filter("restaurant_id", ids)
            ),
            None => "SELECT AVG(total_cost) FROM recipes WHERE total_cost > 0".to_string(),
        };
        let avg: Option<f64> = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(avg)
    }

    /// Overwrite the editable fields
    pub fn update_fields(conn: &Connection, id: i64, data: &RecipeFields) -> DbResult<Option<Self>> {
        conn.execute(
            r#"
            UPDATE recipes SET
                name = ?1,
                prep_time_minutes = ?2,
                portion_size = ?3,
                method = ?4,
                yield_note = ?5,
                updated_at = datetime('now')
            WHERE id = ?6
            "#,
            params![
                data.name,
                data.prep_time_minutes,
                data.portion_size,
                data.method,
                data.yield_note,
                id,
            ],
        )?;

        Self::get_by_id(conn, id)
    }

    /// Write calculated aggregates
    pub fn store_costs(conn: &Connection, id: i64, costs: &StoredCosts) -> DbResult<()> {
        conn.execute(
            r#"
            UPDATE recipes SET
                final_weight = ?1,
                total_cost = ?2,
                yield_portions = ?3,
                restaurant_price = ?4,
                delivery_price = ?5
            WHERE id = ?6
            "#,
            params![
                costs.final_weight,
                costs.total_cost,
                costs.yield_portions,
                costs.restaurant_price,
                costs.delivery_price,
                id,
            ],
        )?;
        Ok(())
    }

    /// Number of recipes and technical sheets using a recipe as an item
    pub fn usage_count(conn: &Connection, id: i64) -> DbResult<i64> {
        let count: i64 = conn.query_row(
            r#"
            SELECT
                (SELECT COUNT(*) FROM recipe_items WHERE sub_recipe_id = ?1) +
                (SELECT COUNT(*) FROM technical_sheet_items WHERE recipe_id = ?1)
            "#,
            [id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Delete a recipe; its items cascade, uses elsewhere block the delete
    pub fn delete(conn: &Connection, id: i64) -> DbResult<bool> {
        let rows = conn.execute("DELETE FROM recipes WHERE id = ?1", [id])?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_migrations;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        conn.execute("INSERT INTO restaurants (name, cnpj) VALUES ('R', '1')", []).unwrap();
        conn
    }

    fn fields(name: &str) -> RecipeFields {
        RecipeFields {
            name: name.to_string(),
            portion_size: 250.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_create_has_no_costs_yet() {
        let conn = setup();
        let recipe = Recipe::create(&conn, 1, &fields("Molho")).unwrap();
        assert_eq!(recipe.total_cost, None);
        assert_eq!(recipe.portion_size, 250.0);
    }

    #[test]
    fn test_store_costs_and_average() {
        let conn = setup();
        let a = Recipe::create(&conn, 1, &fields("A")).unwrap();
        let b = Recipe::create(&conn, 1, &fields("B")).unwrap();
        Recipe::create(&conn, 1, &fields("C")).unwrap();

        let costs = StoredCosts {
            final_weight: 1000.0,
            total_cost: 10.0,
            yield_portions: Some(4.0),
            restaurant_price: 10.0,
            delivery_price: 11.2,
        };
        Recipe::store_costs(&conn, a.id, &costs).unwrap();
        Recipe::store_costs(&conn, b.id, &StoredCosts { total_cost: 20.0, ..costs }).unwrap();

        let stored = Recipe::get_by_id(&conn, a.id).unwrap().unwrap();
        assert_eq!(stored.yield_portions, Some(4.0));
        assert_eq!(Recipe::average_cost(&conn, None).unwrap(), Some(15.0));
        assert_eq!(Recipe::average_cost(&conn, Some(&[])).unwrap(), None);
    }

    #[test]
    fn test_list_sorted_by_cost() {
        let conn = setup();
        let a = Recipe::create(&conn, 1, &fields("A")).unwrap();
        Recipe::create(&conn, 1, &fields("B")).unwrap();
        Recipe::store_costs(
            &conn,
            a.id,
            &StoredCosts {
                total_cost: 5.0,
                ..Default::default()
            },
        )
        .unwrap();

        let listed = Recipe::list(&conn, Some(1), None, None, "cost", "desc", 10, 0).unwrap();
        assert_eq!(listed[0].name, "A");
        assert_eq!(Recipe::count(&conn, Some(1), None, Some("b")).unwrap(), 1);
    }
}
