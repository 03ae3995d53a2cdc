//! Ingredient (insumo) model
//!
//! A purchasable input with a reference price for a reference weight.

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::costing::{CatalogIngredient, Unit};
use crate::db::{DbError, DbResult};

use super::restaurant::id_filter;

const SELECT_INGREDIENT: &str = r#"
    SELECT i.*, c.name AS category_name
    FROM ingredients i
    LEFT JOIN ingredient_categories c ON c.id = i.category_id
"#;

/// An ingredient with its category name resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: i64,
    pub restaurant_id: i64,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub name: String,
    pub reference_weight: f64,
    pub unit: Unit,
    pub reference_price: f64,
    pub created_at: String,
    pub updated_at: String,
}

/// Data for creating an ingredient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngredientCreate {
    pub restaurant_id: i64,
    pub category_id: Option<i64>,
    pub name: String,
    pub reference_weight: f64,
    pub unit: Unit,
    pub reference_price: f64,
}

/// Data for updating an ingredient
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngredientUpdate {
    /// `Some(None)` clears the category
    pub category_id: Option<Option<i64>>,
    pub name: Option<String>,
    pub reference_weight: Option<f64>,
    pub unit: Option<Unit>,
    pub reference_price: Option<f64>,
}

/// Filters and ordering for ingredient listings
#[derive(Debug, Clone, Default)]
pub struct IngredientFilter {
    pub restaurant_id: Option<i64>,
    /// Restrict to these restaurants (`None` = no restriction)
    pub visible_restaurants: Option<Vec<i64>>,
    pub category_id: Option<i64>,
    pub query: Option<String>,
    pub sort_by: String,
    pub sort_order: String,
}

impl IngredientFilter {
    fn where_clause(&self, params_vec: &mut Vec<Box<dyn rusqlite::ToSql>>) -> String {
        let mut conditions = Vec::new();

        if let Some(ids) = &self.visible_restaurants {
            conditions.push(id_filter("i.restaurant_id", ids));
        }
        if let Some(restaurant_id) = self.restaurant_id {
            params_vec.push(Box::new(restaurant_id));
            conditions.push(format!("i.restaurant_id = ?{}", params_vec.len()));
        }
        if let Some(category_id) = self.category_id {
            params_vec.push(Box::new(category_id));
            conditions.push(format!("i.category_id = ?{}", params_vec.len()));
        }
        if let Some(q) = self.query.as_deref().filter(|q| !q.trim().is_empty()) {
            params_vec.push(Box::new(format!("%{}%", q.trim())));
            conditions.push(format!("i.name LIKE ?{}", params_vec.len()));
        }

        if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        }
    }

    fn order_clause(&self) -> String {
        let order = if self.sort_order.to_lowercase() == "desc" { "DESC" } else { "ASC" };
        let sort_col = match self.sort_by.to_lowercase().as_str() {
            "price" | "reference_price" => "i.reference_price",
            "unit_cost" => {
                "i.reference_price / (CASE WHEN i.reference_weight = 0 THEN 1 ELSE i.reference_weight END)"
            }
            "category" => "COALESCE(c.name, '')",
            "created_at" => "i.created_at",
            _ => "i.name",
        };
        format!("ORDER BY {} {}, i.id ASC", sort_col, order)
    }
}

impl Ingredient {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let unit: String = row.get("unit")?;
        Ok(Self {
            id: row.get("id")?,
            restaurant_id: row.get("restaurant_id")?,
            category_id: row.get("category_id")?,
            category_name: row.get("category_name")?,
            name: row.get("name")?,
            reference_weight: row.get("reference_weight")?,
            unit: Unit::from_str(&unit),
            reference_price: row.get("reference_price")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// Price per unit of weight; a zero reference weight counts as one
    pub fn unit_cost(&self) -> f64 {
        let weight = if self.reference_weight == 0.0 { 1.0 } else { self.reference_weight };
        self.reference_price / weight
    }

    pub fn to_catalog(&self) -> CatalogIngredient {
        CatalogIngredient {
            id: self.id,
            name: self.name.clone(),
            reference_weight: self.reference_weight,
            reference_price: self.reference_price,
            unit: self.unit,
        }
    }

    /// Insert a new ingredient
    pub fn create(conn: &Connection, data: &IngredientCreate) -> DbResult<Self> {
        conn.execute(
            r#"
            INSERT INTO ingredients (
                restaurant_id, category_id, name, reference_weight, unit, reference_price
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                data.restaurant_id,
                data.category_id,
                data.name,
                data.reference_weight,
                data.unit.as_str(),
                data.reference_price,
            ],
        )?;

        let id = conn.last_insert_rowid();
        Self::get_by_id(conn, id)?
            .ok_or_else(|| DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    /// Get an ingredient by ID
    pub fn get_by_id(conn: &Connection, id: i64) -> DbResult<Option<Self>> {
        let sql = format!("{} WHERE i.id = ?1", SELECT_INGREDIENT);
        let mut stmt = conn.prepare(&sql)?;

        match stmt.query_row([id], Self::from_row) {
            Ok(ingredient) => Ok(Some(ingredient)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All ingredients of a restaurant
    pub fn list_for_restaurant(conn: &Connection, restaurant_id: i64) -> DbResult<Vec<Self>> {
        let sql = format!("{} WHERE i.restaurant_id = ?1 ORDER BY i.name ASC", SELECT_INGREDIENT);
        let mut stmt = conn.prepare(&sql)?;
        let ingredients = stmt
            .query_map([restaurant_id], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ingredients)
    }

    /// List ingredients with filtering and sorting
    pub fn list(
        conn: &Connection,
        filter: &IngredientFilter,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<Self>> {
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        let where_clause = filter.where_clause(&mut params_vec);

        let sql = format!(
            "{} {} {} LIMIT ?{} OFFSET ?{}",
            SELECT_INGREDIENT,
            where_clause,
            filter.order_clause(),
            params_vec.len() + 1,
            params_vec.len() + 2
        );
        params_vec.push(Box::new(limit));
        params_vec.push(Box::new(offset));

        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let ingredients = stmt
            .query_map(params_refs.as_slice(), Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ingredients)
    }

    /// Count ingredients matching a filter
    pub fn count(conn: &Connection, filter: &IngredientFilter) -> DbResult<i64> {
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        let where_clause = filter.where_clause(&mut params_vec);
        let sql = format!(
            "SELECT COUNT(*) FROM ingredients i LEFT JOIN ingredient_categories c ON c.id = i.category_id {}",
            where_clause
        );

        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let count: i64 = conn.query_row(&sql, params_refs.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    /// Update an ingredient
    pub fn update(conn: &Connection, id: i64, data: &IngredientUpdate) -> DbResult<Option<Self>> {
        let mut updates = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(category_id) = data.category_id {
            updates.push(format!("category_id = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(category_id));
        }
        if let Some(ref name) = data.name {
            updates.push(format!("name = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(name.clone()));
        }
        if let Some(weight) = data.reference_weight {
            updates.push(format!("reference_weight = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(weight));
        }
        if let Some(unit) = data.unit {
            updates.push(format!("unit = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(unit.as_str()));
        }
        if let Some(price) = data.reference_price {
            updates.push(format!("reference_price = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(price));
        }

        if updates.is_empty() {
            return Self::get_by_id(conn, id);
        }

        updates.push("updated_at = datetime('now')".to_string());

        let sql = format!(
            "UPDATE ingredients SET {} WHERE id = ?{}",
            updates.join(", "),
            params_vec.len() + 1
        );
        params_vec.push(Box::new(id));

        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        conn.execute(&sql, params_refs.as_slice())?;

        Self::get_by_id(conn, id)
    }

    /// Number of recipe and technical sheet items using an ingredient
    pub fn usage_count(conn: &Connection, id: i64) -> DbResult<i64> {
        let count: i64 = conn.query_row(
            r#"
            SELECT
                (SELECT COUNT(*) FROM recipe_items WHERE ingredient_id = ?1) +
                (SELECT COUNT(*) FROM technical_sheet_items WHERE ingredient_id = ?1)
            "#,
            [id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Delete an ingredient (fails while line items still use it)
    pub fn delete(conn: &Connection, id: i64) -> DbResult<bool> {
        let rows = conn.execute("DELETE FROM ingredients WHERE id = ?1", [id])?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_migrations;
    use crate::models::IngredientCategory;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        conn.execute("INSERT INTO restaurants (name, cnpj) VALUES ('R', '1')", []).unwrap();
        conn.execute("INSERT INTO restaurants (name, cnpj) VALUES ('S', '2')", []).unwrap();
        conn
    }

    fn create(conn: &Connection, restaurant_id: i64, name: &str, weight: f64, price: f64) -> Ingredient {
        Ingredient::create(
            conn,
            &IngredientCreate {
                restaurant_id,
                category_id: None,
                name: name.to_string(),
                reference_weight: weight,
                unit: Unit::Grams,
                reference_price: price,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let conn = setup();
        let flour = create(&conn, 1, "Farinha", 1000.0, 10.0);
        let fetched = Ingredient::get_by_id(&conn, flour.id).unwrap().unwrap();
        assert_eq!(fetched.name, "Farinha");
        assert_eq!(fetched.unit, Unit::Grams);
        assert!((fetched.unit_cost() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_list_filters_and_sorts_by_unit_cost() {
        let conn = setup();
        create(&conn, 1, "Açafrão", 10.0, 30.0); // 3.00 / g
        create(&conn, 1, "Farinha", 1000.0, 10.0); // 0.01 / g
        create(&conn, 1, "Queijo", 500.0, 25.0); // 0.05 / g
        create(&conn, 2, "Outro", 1.0, 1.0);

        let filter = IngredientFilter {
            restaurant_id: Some(1),
            sort_by: "unit_cost".to_string(),
            sort_order: "desc".to_string(),
            ..Default::default()
        };
        let names: Vec<String> = Ingredient::list(&conn, &filter, 50, 0)
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["Açafrão", "Queijo", "Farinha"]);
        assert_eq!(Ingredient::count(&conn, &filter).unwrap(), 3);

        let visible = IngredientFilter {
            visible_restaurants: Some(vec![2]),
            ..Default::default()
        };
        assert_eq!(Ingredient::count(&conn, &visible).unwrap(), 1);
    }

    #[test]
    fn test_category_filter_and_clear() {
        let conn = setup();
        let cat = IngredientCategory::create(&conn, 1, "Secos").unwrap();
        let flour = create(&conn, 1, "Farinha", 1000.0, 10.0);
        create(&conn, 1, "Leite", 1000.0, 5.0);

        let updated = Ingredient::update(
            &conn,
            flour.id,
            &IngredientUpdate {
                category_id: Some(Some(cat.id)),
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();
        assert_eq!(updated.category_name.as_deref(), Some("Secos"));

        let filter = IngredientFilter {
            category_id: Some(cat.id),
            ..Default::default()
        };
        assert_eq!(Ingredient::count(&conn, &filter).unwrap(), 1);

        let cleared = Ingredient::update(
            &conn,
            flour.id,
            &IngredientUpdate {
                category_id: Some(None),
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();
        assert_eq!(cleared.category_id, None);
    }
}
