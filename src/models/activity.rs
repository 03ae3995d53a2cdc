//! Activity log model
//!
//! One row per create, edit or delete performed through the tools.

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::db::DbResult;

use super::restaurant::id_filter;

/// Kind of record an entry is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Restaurante,
    Insumo,
    Categoria,
    Receita,
    FichaTecnica,
    Usuario,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Restaurante => "restaurante",
            EntityKind::Insumo => "insumo",
            EntityKind::Categoria => "categoria",
            EntityKind::Receita => "receita",
            EntityKind::FichaTecnica => "ficha_tecnica",
            EntityKind::Usuario => "usuario",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "restaurante" | "restaurant" => Some(EntityKind::Restaurante),
            "insumo" | "ingredient" => Some(EntityKind::Insumo),
            "categoria" | "category" => Some(EntityKind::Categoria),
            "receita" | "recipe" => Some(EntityKind::Receita),
            "ficha_tecnica" | "ficha" | "technical_sheet" => Some(EntityKind::FichaTecnica),
            "usuario" | "user" => Some(EntityKind::Usuario),
            _ => None,
        }
    }
}

/// What happened to the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityAction {
    Criado,
    Editado,
    Excluido,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::Criado => "criado",
            ActivityAction::Editado => "editado",
            ActivityAction::Excluido => "excluido",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "criado" | "created" | "create" => Some(ActivityAction::Criado),
            "editado" | "edited" | "update" | "updated" => Some(ActivityAction::Editado),
            "excluido" | "excluído" | "deleted" | "delete" => Some(ActivityAction::Excluido),
            _ => None,
        }
    }
}

/// A stored activity entry with user and restaurant names
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub id: i64,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub restaurant_id: Option<i64>,
    pub restaurant_name: Option<String>,
    pub role: String,
    pub kind: String,
    pub action: String,
    pub name: String,
    pub description: String,
    pub occurred_at: String,
}

/// Data for recording an entry
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub user_id: Option<i64>,
    pub restaurant_id: Option<i64>,
    pub role: String,
    pub kind: EntityKind,
    pub action: ActivityAction,
    pub name: String,
    pub description: String,
}

/// Filters for listing entries
#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    /// Restrict to these restaurants (`None` = everything, including global entries)
    pub visible_restaurants: Option<Vec<i64>>,
    pub restaurant_id: Option<i64>,
    pub kind: Option<EntityKind>,
    pub action: Option<ActivityAction>,
    /// Inclusive `YYYY-MM-DD` bounds
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

impl ActivityFilter {
    fn where_clause(&self, params_vec: &mut Vec<Box<dyn rusqlite::ToSql>>) -> String {
        let mut conditions = Vec::new();

        if let Some(ids) = &self.visible_restaurants {
            conditions.push(id_filter("a.restaurant_id", ids));
        }
        if let Some(restaurant_id) = self.restaurant_id {
            params_vec.push(Box::new(restaurant_id));
            conditions.push(format!("a.restaurant_id = ?{}", params_vec.len()));
        }
        if let Some(kind) = self.kind {
            params_vec.push(Box::new(kind.as_str()));
            conditions.push(format!("a.kind = ?{}", params_vec.len()));
        }
        if let Some(action) = self.action {
            params_vec.push(Box::new(action.as_str()));
            conditions.push(format!("a.action = ?{}", params_vec.len()));
        }
        if let Some(ref from) = self.date_from {
            params_vec.push(Box::new(from.clone()));
            conditions.push(format!("date(a.occurred_at) >= ?{}", params_vec.len()));
        }
        if let Some(ref to) = self.date_to {
            params_vec.push(Box::new(to.clone()));
            conditions.push(format!("date(a.occurred_at) <= ?{}", params_vec.len()));
        }

        if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        }
    }
}

impl ActivityEntry {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            username: row.get("username")?,
            restaurant_id: row.get("restaurant_id")?,
            restaurant_name: row.get("restaurant_name")?,
            role: row.get("role")?,
            kind: row.get("kind")?,
            action: row.get("action")?,
            name: row.get("name")?,
            description: row.get("description")?,
            occurred_at: row.get("occurred_at")?,
        })
    }

    /// Record an entry
    pub fn record(conn: &Connection, entry: &NewActivity) -> DbResult<i64> {
        conn.execute(
            r#"
            INSERT INTO activity_log (user_id, restaurant_id, role, kind, action, name, description)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                entry.user_id,
                entry.restaurant_id,
                entry.role,
                entry.kind.as_str(),
                entry.action.as_str(),
                entry.name,
                entry.description,
            ],
        )?;
        tracing::debug!(
            kind = entry.kind.as_str(),
            action = entry.action.as_str(),
            name = %entry.name,
            "Recorded activity"
        );
        Ok(conn.last_insert_rowid())
    }

    /// List entries, newest first
    pub fn list(conn: &Connection, filter: &ActivityFilter, limit: i64, offset: i64) -> DbResult<Vec<Self>> {
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        let where_clause = filter.where_clause(&mut params_vec);
        let sql = format!(
            r#"
            SELECT a.*, u.username AS username, r.name AS restaurant_name
            FROM activity_log a
            LEFT JOIN users u ON u.id = a.user_id
            LEFT JOIN restaurants r ON r.id = a.restaurant_id
            {}
            ORDER BY a.occurred_at DESC, a.id DESC
            LIMIT ?{} OFFSET ?{}
            "#,
            where_clause,
            params_vec.len() + 1,
            params_vec.len() + 2
        );
        params_vec.push(Box::new(limit));
        params_vec.push(Box::new(offset));

        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params_refs.as_slice(), Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn count(conn: &Connection, filter: &ActivityFilter) -> DbResult<i64> {
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        let where_clause = filter.where_clause(&mut params_vec);
        let sql = format!("SELECT COUNT(*) FROM activity_log a {}", where_clause);

        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let count: i64 = conn.query_row(&sql, params_refs.as_slice(), |row| row.get(0))?;
        Ok(count)
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
        conn.execute_batch(
            "INSERT INTO restaurants (id, name, cnpj) VALUES (1, 'Bistrô', '1'), (2, 'Cantina', '2');",
        )
        .unwrap();
        conn
    }

    fn entry(restaurant_id: Option<i64>, kind: EntityKind, action: ActivityAction) -> NewActivity {
        NewActivity {
            user_id: None,
            restaurant_id,
            role: "master".to_string(),
            kind,
            action,
            name: "Molho".to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn test_visibility_and_filters() {
        let conn = setup();
        ActivityEntry::record(&conn, &entry(Some(1), EntityKind::Receita, ActivityAction::Criado)).unwrap();
        ActivityEntry::record(&conn, &entry(Some(1), EntityKind::Insumo, ActivityAction::Editado)).unwrap();
        ActivityEntry::record(&conn, &entry(Some(2), EntityKind::Receita, ActivityAction::Excluido)).unwrap();
        ActivityEntry::record(&conn, &entry(None, EntityKind::Usuario, ActivityAction::Criado)).unwrap();

        assert_eq!(ActivityEntry::count(&conn, &ActivityFilter::default()).unwrap(), 4);

        let member = ActivityFilter {
            visible_restaurants: Some(vec![1]),
            ..Default::default()
        };
        let listed = ActivityEntry::list(&conn, &member, 50, 0).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|e| e.restaurant_name.as_deref() == Some("Bistrô")));

        let recipes = ActivityFilter {
            kind: Some(EntityKind::Receita),
            action: Some(ActivityAction::Excluido),
            ..Default::default()
        };
        assert_eq!(ActivityEntry::count(&conn, &recipes).unwrap(), 1);
    }

    #[test]
    fn test_date_range() {
        let conn = setup();
        ActivityEntry::record(&conn, &entry(Some(1), EntityKind::Receita, ActivityAction::Criado)).unwrap();
        conn.execute(
            "UPDATE activity_log SET occurred_at = '2024-01-15 10:00:00'",
            [],
        )
        .unwrap();

        let january = ActivityFilter {
            date_from: Some("2024-01-01".to_string()),
            date_to: Some("2024-01-31".to_string()),
            ..Default::default()
        };
        assert_eq!(ActivityEntry::count(&conn, &january).unwrap(), 1);

        let february = ActivityFilter {
            date_from: Some("2024-02-01".to_string()),
            ..Default::default()
        };
        assert_eq!(ActivityEntry::count(&conn, &february).unwrap(), 0);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(EntityKind::from_str("ficha"), Some(EntityKind::FichaTecnica));
        assert_eq!(ActivityAction::from_str("excluído"), Some(ActivityAction::Excluido));
        assert_eq!(EntityKind::from_str("???"), None);
    }
}
