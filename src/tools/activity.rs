//! Activity log tools

use chrono::NaiveDate;
use serde::Serialize;

use crate::auth::Session;
use crate::db::Database;
use crate::models::{ActivityAction, ActivityEntry, ActivityFilter, EntityKind};

use super::paging;

/// Response for list_activity
#[derive(Debug, Serialize)]
pub struct ListActivityResponse {
    pub entries: Vec<ActivityEntry>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Raw filter values as received from a tool call
#[derive(Debug, Clone, Default)]
pub struct ActivityQuery {
    pub restaurant_id: Option<i64>,
    pub kind: Option<String>,
    pub action: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

fn parse_date(field: &str, value: Option<String>) -> Result<Option<String>, String> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(|d| Some(d.format("%Y-%m-%d").to_string()))
            .map_err(|_| format!("Invalid {} '{}'. Use YYYY-MM-DD", field, s)),
    }
}

impl ActivityQuery {
    fn into_filter(self, session: &Session) -> Result<ActivityFilter, String> {
        if let Some(restaurant_id) = self.restaurant_id {
            session.require_view(restaurant_id).map_err(|e| e.to_string())?;
        }

        let kind = match self.kind.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(k) => Some(EntityKind::from_str(k).ok_or_else(|| {
                format!(
                    "Invalid kind '{}'. Use restaurante, insumo, categoria, receita, ficha_tecnica or usuario",
                    k
                )
            })?),
        };
        let action = match self.action.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(a) => Some(
                ActivityAction::from_str(a)
                    .ok_or_else(|| format!("Invalid action '{}'. Use criado, editado or excluido", a))?,
            ),
        };

        let date_from = parse_date("date_from", self.date_from)?;
        let date_to = parse_date("date_to", self.date_to)?;
        if let (Some(from), Some(to)) = (&date_from, &date_to) {
            if from > to {
                return Err("date_from must not be after date_to".to_string());
            }
        }

        Ok(ActivityFilter {
            visible_restaurants: session.visible_restaurants(),
            restaurant_id: self.restaurant_id,
            kind,
            action,
            date_from,
            date_to,
        })
    }
}

/// List activity entries, newest first
pub fn list_activity(
    db: &Database,
    session: &Session,
    query: ActivityQuery,
    limit: i64,
    offset: i64,
) -> Result<ListActivityResponse, String> {
    let (limit, offset) = paging(limit, offset);
    let filter = query.into_filter(session)?;

    let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;
    let entries = ActivityEntry::list(&conn, &filter, limit, offset)
        .map_err(|e| format!("Failed to list activity: {}", e))?;
    let total = ActivityEntry::count(&conn, &filter).map_err(|e| format!("Failed to count activity: {}", e))?;

    Ok(ListActivityResponse {
        entries,
        total,
        limit,
        offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::tools::categories::create_ingredient_category;
    use crate::tools::test_support::fixture;

    #[test]
    fn test_filters_and_visibility() {
        let fx = fixture();
        create_ingredient_category(&fx.db, &fx.admin, fx.restaurant_id, "Laticínios").unwrap();
        create_ingredient_category(&fx.db, &fx.admin, fx.other_restaurant_id, "Grãos").unwrap();

        let all = list_activity(&fx.db, &fx.admin, ActivityQuery::default(), 50, 0).unwrap();
        assert_eq!(all.total, 2);

        let user = fx.member("u", Role::UsuarioComum);
        let mine = list_activity(&fx.db, &user, ActivityQuery::default(), 50, 0).unwrap();
        assert_eq!(mine.total, 1);
        assert_eq!(mine.entries[0].name, "Laticínios");

        let query = ActivityQuery {
            kind: Some("categoria".to_string()),
            action: Some("excluido".to_string()),
            ..Default::default()
        };
        assert_eq!(list_activity(&fx.db, &fx.admin, query, 50, 0).unwrap().total, 0);
    }

    #[test]
    fn test_rejects_bad_filters() {
        let fx = fixture();
        let bad_date = ActivityQuery {
            date_from: Some("17/10/2026".to_string()),
            ..Default::default()
        };
        assert!(list_activity(&fx.db, &fx.admin, bad_date, 50, 0).is_err());

        let inverted = ActivityQuery {
            date_from: Some("2026-10-17".to_string()),
            date_to: Some("2026-10-01".to_string()),
            ..Default::default()
        };
        assert!(list_activity(&fx.db, &fx.admin, inverted, 50, 0).is_err());

        let bad_kind = ActivityQuery {
            kind: Some("pedido".to_string()),
            ..Default::default()
        };
        assert!(list_activity(&fx.db, &fx.admin, bad_kind, 50, 0).is_err());
    }
}
