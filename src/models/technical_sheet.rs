//! Technical sheet (ficha técnica) model

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::db::{DbError, DbResult};

use super::recipe::StoredCosts;
use super::restaurant::id_filter;

/// A technical sheet with cached totals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalSheet {
    pub id: i64,
    pub restaurant_id: i64,
    pub name: String,
    pub yield_description: String,
    pub method: String,
    pub final_weight: Option<f64>,
    pub total_cost: Option<f64>,
    pub restaurant_price: Option<f64>,
    pub delivery_price: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

/// Editable fields of a technical sheet
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SheetFields {
    pub name: String,
    #[serde(default)]
    pub yield_description: String,
    #[serde(default)]
    pub method: String,
}

impl TechnicalSheet {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            restaurant_id: row.get("restaurant_id")?,
            name: row.get("name")?,
            yield_description: row.get("yield_description")?,
            method: row.get("method")?,
            final_weight: row.get("final_weight")?,
            total_cost: row.get("total_cost")?,
            restaurant_price: row.get("restaurant_price")?,
            delivery_price: row.get("delivery_price")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn create(conn: &Connection, restaurant_id: i64, data: &SheetFields) -> DbResult<Self> {
        conn.execute(
            r#"
            INSERT INTO technical_sheets (restaurant_id, name, yield_description, method)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![restaurant_id, data.name, data.yield_description, data.method],
        )?;

        let id = conn.last_insert_rowid();
        Self::get_by_id(conn, id)?
            .ok_or_else(|| DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    pub fn get_by_id(conn: &Connection, id: i64) -> DbResult<Option<Self>> {
        let mut stmt = conn.prepare("SELECT * FROM technical_sheets WHERE id = ?1")?;

        match stmt.query_row([id], Self::from_row) {
            Ok(sheet) => Ok(Some(sheet)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Ids of every sheet of a restaurant
    pub fn ids_for_restaurant(conn: &Connection, restaurant_id: i64) -> DbResult<Vec<i64>> {
        let mut stmt = conn.prepare("SELECT id FROM technical_sheets WHERE restaurant_id = ?1")?;
        let ids = stmt
            .query_map([restaurant_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// List sheets, newest first by default
    pub fn list(
        conn: &Connection,
        restaurant_id: Option<i64>,
        visible: Option<&[i64]>,
        query: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<Self>> {
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        let where_clause = Self::filter_clause(restaurant_id, visible, query, &mut params_vec);
        let sql = format!(
            "SELECT * FROM technical_sheets {} ORDER BY name ASC, id ASC LIMIT ?{} OFFSET ?{}",
            where_clause,
            params_vec.len() + 1,
            params_vec.len() + 2
        );
        params_vec.push(Box::new(limit));
        params_vec.push(Box::new(offset));

        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let sheets = stmt
            .query_map(params_refs.as_slice(), Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sheets)
    }

    pub fn count(
        conn: &Connection,
        restaurant_id: Option<i64>,
        visible: Option<&[i64]>,
        query: Option<&str>,
    ) -> DbResult<i64> {
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        let where_clause = Self::filter_clause(restaurant_id, visible, query, &mut params_vec);
        let sql = format!("SELECT COUNT(*) FROM technical_sheets {}", where_clause);

        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let count: i64 = conn.query_row(&sql, params_refs.as_slice(), |row| row.get(0))?;
        Ok(count)
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

    pub fn update_fields(conn: &Connection, id: i64, data: &SheetFields) -> DbResult<Option<Self>> {
        conn.execute(
            r#"
            UPDATE technical_sheets SET
                name = ?1,
                yield_description = ?2,
                method = ?3,
                updated_at = datetime('now')
            WHERE id = ?4
            "#,
            params![data.name, data.yield_description, data.method, id],
        )?;

        Self::get_by_id(conn, id)
    }

    /// Write calculated aggregates; sheets have no portion yield
    pub fn store_costs(conn: &Connection, id: i64, costs: &StoredCosts) -> DbResult<()> {
        conn.execute(
            r#"
            UPDATE technical_sheets SET
                final_weight = ?1,
                total_cost = ?2,
                restaurant_price = ?3,
                delivery_price = ?4
            WHERE id = ?5
            "#,
            params![
                costs.final_weight,
                costs.total_cost,
                costs.restaurant_price,
                costs.delivery_price,
                id,
            ],
        )?;
        Ok(())
    }

    pub fn delete(conn: &Connection, id: i64) -> DbResult<bool> {
        let rows = conn.execute("DELETE FROM technical_sheets WHERE id = ?1", [id])?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_migrations;

    #[test]
    fn test_sheet_lifecycle() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        conn.execute("INSERT INTO restaurants (name, cnpj) VALUES ('R', '1')", []).unwrap();

        let sheet = TechnicalSheet::create(
            &conn,
            1,
            &SheetFields {
                name: "Lasanha".to_string(),
                yield_description: "8 porções".to_string(),
                method: String::new(),
            },
        )
        .unwrap();
        assert_eq!(sheet.total_cost, None);

        TechnicalSheet::store_costs(
            &conn,
            sheet.id,
            &StoredCosts {
                final_weight: 2000.0,
                total_cost: 40.0,
                yield_portions: Some(8.0),
                restaurant_price: 60.0,
                delivery_price: 67.2,
            },
        )
        .unwrap();
        let stored = TechnicalSheet::get_by_id(&conn, sheet.id).unwrap().unwrap();
        assert_eq!(stored.total_cost, Some(40.0));
        assert_eq!(stored.delivery_price, Some(67.2));

        assert_eq!(TechnicalSheet::count(&conn, Some(1), None, Some("lasa")).unwrap(), 1);
        assert_eq!(TechnicalSheet::ids_for_restaurant(&conn, 1).unwrap(), vec![sheet.id]);
        assert!(TechnicalSheet::delete(&conn, sheet.id).unwrap());
        assert!(TechnicalSheet::get_by_id(&conn, sheet.id).unwrap().is_none());
    }
}
