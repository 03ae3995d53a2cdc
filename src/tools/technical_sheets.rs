//! Technical sheet MCP Tools
//!
//! Tools for technical sheets (fichas técnicas). Sheets compose ingredients
//! and recipes like a recipe does, but nothing nests a sheet, so a save never
//! cascades.

use rusqlite::Connection;
use serde::Serialize;

use crate::auth::Session;
use crate::costing::{breakdown, LineItem};
use crate::db::{Database, DbError, DbResult};
use crate::models::line_item::{load_item_details, replace_items, validate_items};
use crate::models::{
    compute_sheet_costs, load_catalog, recalculate_sheet_costs, ActivityAction, EntityKind,
    ItemOwner, SheetFields, TechnicalSheet,
};

use super::recipes::{item_views, restaurant_markup, CostPreview, ItemView};
use super::{log_activity, paging, visible_cost};

/// Technical sheet as returned by the tools
#[derive(Debug, Serialize)]
pub struct SheetView {
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

impl SheetView {
    pub fn new(session: &Session, sheet: TechnicalSheet) -> Self {
        let rid = sheet.restaurant_id;
        Self {
            id: sheet.id,
            restaurant_id: rid,
            name: sheet.name,
            yield_description: sheet.yield_description,
            method: sheet.method,
            final_weight: sheet.final_weight,
            total_cost: visible_cost(session, rid, sheet.total_cost),
            restaurant_price: visible_cost(session, rid, sheet.restaurant_price),
            delivery_price: visible_cost(session, rid, sheet.delivery_price),
            created_at: sheet.created_at,
            updated_at: sheet.updated_at,
        }
    }
}

/// Full technical sheet with its items
#[derive(Debug, Serialize)]
pub struct SheetDetail {
    #[serde(flatten)]
    pub sheet: SheetView,
    pub items: Vec<ItemView>,
}

/// Response for list_technical_sheets
#[derive(Debug, Serialize)]
pub struct ListSheetsResponse {
    pub technical_sheets: Vec<SheetView>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Response for save_technical_sheet
#[derive(Debug, Serialize)]
pub struct SaveSheetResponse {
    pub created: bool,
    pub technical_sheet: SheetDetail,
}

/// Response for delete_technical_sheet
#[derive(Debug, Serialize)]
pub struct DeleteSheetResponse {
    pub success: bool,
    pub deleted_id: i64,
}

fn sheet_detail(conn: &Connection, session: &Session, sheet: TechnicalSheet) -> DbResult<SheetDetail> {
    let catalog = load_catalog(conn, sheet.restaurant_id)?;
    let details = load_item_details(conn, ItemOwner::Sheet(sheet.id))?;
    let items: Vec<LineItem> = details.iter().map(|d| d.item.clone()).collect();
    let result = breakdown(None, &items, &catalog)?;
    let restaurant_id = sheet.restaurant_id;

    Ok(SheetDetail {
        sheet: SheetView::new(session, sheet),
        items: item_views(session, restaurant_id, details, &result),
    })
}

/// Create a technical sheet (`id` absent) or replace an existing one
pub fn save_technical_sheet(
    db: &Database,
    session: &Session,
    id: Option<i64>,
    restaurant_id: Option<i64>,
    mut fields: SheetFields,
    items: Vec<LineItem>,
) -> Result<SaveSheetResponse, String> {
    fields.name = fields.name.trim().to_string();
    if fields.name.is_empty() {
        return Err("Technical sheet name cannot be empty".to_string());
    }

    let restaurant_id = match id {
        Some(id) => {
            let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;
            let existing = TechnicalSheet::get_by_id(&conn, id)
                .map_err(|e| format!("Database error: {}", e))?
                .ok_or_else(|| format!("Technical sheet not found with id: {}", id))?;
            if restaurant_id.is_some_and(|r| r != existing.restaurant_id) {
                return Err("A technical sheet cannot be moved to another restaurant".to_string());
            }
            existing.restaurant_id
        }
        None => restaurant_id.ok_or("restaurant_id is required to create a technical sheet")?,
    };
    session
        .require_edit_catalog(restaurant_id)
        .map_err(|e| e.to_string())?;

    let sheet_id = db
        .with_transaction(|tx| {
            let sheet = match id {
                Some(id) => TechnicalSheet::update_fields(tx, id, &fields)?.ok_or_else(|| {
                    DbError::Constraint(format!("Technical sheet not found with id: {}", id))
                })?,
                None => TechnicalSheet::create(tx, restaurant_id, &fields)?,
            };
            let owner = ItemOwner::Sheet(sheet.id);
            validate_items(tx, owner, restaurant_id, &items)?;
            replace_items(tx, owner, &items)?;
            recalculate_sheet_costs(tx, sheet.id)?;

            log_activity(
                tx,
                session,
                Some(restaurant_id),
                EntityKind::FichaTecnica,
                if id.is_some() { ActivityAction::Editado } else { ActivityAction::Criado },
                &sheet.name,
                format!("{} item(s)", items.len()),
            )
            .map_err(DbError::Constraint)?;
            Ok(sheet.id)
        })
        .map_err(|e| format!("Failed to save technical sheet: {}", e))?;

    tracing::info!(sheet_id, created = id.is_none(), "Saved technical sheet");

    let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;
    let sheet = TechnicalSheet::get_by_id(&conn, sheet_id)
        .map_err(|e| format!("Failed to get technical sheet: {}", e))?
        .ok_or_else(|| format!("Technical sheet not found with id: {}", sheet_id))?;
    let detail = sheet_detail(&conn, session, sheet)
        .map_err(|e| format!("Failed to get technical sheet: {}", e))?;

    Ok(SaveSheetResponse {
        created: id.is_none(),
        technical_sheet: detail,
    })
}

/// Get a technical sheet with its items
pub fn get_technical_sheet(db: &Database, session: &Session, id: i64) -> Result<Option<SheetDetail>, String> {
    let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;

    let sheet = TechnicalSheet::get_by_id(&conn, id)
        .map_err(|e| format!("Failed to get technical sheet: {}", e))?;
    let Some(sheet) = sheet else {
        return Ok(None);
    };
    session.require_view(sheet.restaurant_id).map_err(|e| e.to_string())?;

    sheet_detail(&conn, session, sheet)
        .map(Some)
        .map_err(|e| format!("Failed to get technical sheet: {}", e))
}

/// List technical sheets
pub fn list_technical_sheets(
    db: &Database,
    session: &Session,
    restaurant_id: Option<i64>,
    query: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<ListSheetsResponse, String> {
    let (limit, offset) = paging(limit, offset);
    if let Some(restaurant_id) = restaurant_id {
        session.require_view(restaurant_id).map_err(|e| e.to_string())?;
    }
    let visible = session.visible_restaurants();

    let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;

    let sheets = TechnicalSheet::list(&conn, restaurant_id, visible.as_deref(), query, limit, offset)
        .map_err(|e| format!("Failed to list technical sheets: {}", e))?;
    let total = TechnicalSheet::count(&conn, restaurant_id, visible.as_deref(), query)
        .map_err(|e| format!("Failed to count technical sheets: {}", e))?;

    Ok(ListSheetsResponse {
        technical_sheets: sheets.into_iter().map(|s| SheetView::new(session, s)).collect(),
        total,
        limit,
        offset,
    })
}

/// Delete a technical sheet with its items
pub fn delete_technical_sheet(db: &Database, session: &Session, id: i64) -> Result<DeleteSheetResponse, String> {
    let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;
    let sheet = TechnicalSheet::get_by_id(&conn, id)
        .map_err(|e| format!("Database error: {}", e))?
        .ok_or_else(|| format!("Technical sheet not found with id: {}", id))?;
    drop(conn);
    session
        .require_edit_catalog(sheet.restaurant_id)
        .map_err(|e| e.to_string())?;

    db.with_transaction(|tx| {
        TechnicalSheet::delete(tx, id)?;
        log_activity(
            tx,
            session,
            Some(sheet.restaurant_id),
            EntityKind::FichaTecnica,
            ActivityAction::Excluido,
            &sheet.name,
            String::new(),
        )
        .map_err(DbError::Constraint)?;
        Ok(())
    })
    .map_err(|e| format!("Failed to delete technical sheet: {}", e))?;

    Ok(DeleteSheetResponse {
        success: true,
        deleted_id: id,
    })
}

/// Run the calculator over an unsaved technical sheet
pub fn preview_technical_sheet_costs(
    db: &Database,
    session: &Session,
    restaurant_id: i64,
    items: Vec<LineItem>,
) -> Result<CostPreview, String> {
    session.require_view(restaurant_id).map_err(|e| e.to_string())?;

    let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;
    let markup = restaurant_markup(&conn, restaurant_id)
        .map_err(|e| format!("Database error: {}", e))?
        .ok_or_else(|| format!("Restaurant not found with id: {}", restaurant_id))?;
    let catalog = load_catalog(&conn, restaurant_id).map_err(|e| format!("Failed to load catalog: {}", e))?;

    let (result, costs) = compute_sheet_costs(&items, Some(markup), &catalog)
        .map_err(|e| format!("Failed to preview costs: {}", e))?;

    Ok(CostPreview::new(session, restaurant_id, result, costs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::costing::Unit;
    use crate::models::{Ingredient, IngredientCreate, IngredientUpdate, RecipeFields};
    use crate::tools::ingredients::update_ingredient;
    use crate::tools::recipes::{delete_recipe, save_recipe};
    use crate::tools::test_support::{fixture, Fixture};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.005
    }

    fn add_ingredient(fx: &Fixture, name: &str, weight: f64, price: f64) -> i64 {
        fx.db
            .with_conn(|conn| {
                Ingredient::create(
                    conn,
                    &IngredientCreate {
                        restaurant_id: fx.restaurant_id,
                        category_id: None,
                        name: name.to_string(),
                        reference_weight: weight,
                        unit: Unit::Grams,
                        reference_price: price,
                    },
                )
            })
            .unwrap()
            .id
    }

    fn sheet_fields(name: &str) -> SheetFields {
        SheetFields {
            name: name.to_string(),
            yield_description: "4 porções".to_string(),
            method: String::new(),
        }
    }

    #[test]
    fn test_sheet_with_ingredient_and_nested_recipe() {
        let fx = fixture();
        let flour = add_ingredient(&fx, "Farinha", 1000.0, 10.0);
        let sauce = save_recipe(
            &fx.db,
            &fx.admin,
            None,
            Some(fx.restaurant_id),
            RecipeFields {
                name: "Molho".to_string(),
                ..Default::default()
            },
            vec![LineItem::ingredient(flour, 400.0)],
        )
        .unwrap()
        .recipe
        .recipe
        .id;

        let saved = save_technical_sheet(
            &fx.db,
            &fx.admin,
            None,
            Some(fx.restaurant_id),
            sheet_fields("Pizza"),
            vec![LineItem::ingredient(flour, 100.0), LineItem::recipe(sauce, 200.0)],
        )
        .unwrap();

        // 1.00 from flour, half of the 4.00 sauce
        let sheet = &saved.technical_sheet.sheet;
        assert!(approx(sheet.total_cost.unwrap(), 3.0));
        assert!(approx(sheet.final_weight.unwrap(), 300.0));
        assert_eq!(sheet.restaurant_price, Some(4.5));
        assert_eq!(sheet.delivery_price, Some(5.04));
        assert_eq!(saved.technical_sheet.items.len(), 2);

        // the sauce is now in use
        assert!(delete_recipe(&fx.db, &fx.admin, sauce).unwrap().is_err());

        let update = IngredientUpdate {
            reference_price: Some(20.0),
            ..Default::default()
        };
        let cascade = update_ingredient(&fx.db, &fx.admin, flour, update).unwrap();
        assert_eq!(cascade.sheets_recalculated, 1);

        let sheet = get_technical_sheet(&fx.db, &fx.admin, saved.technical_sheet.sheet.id)
            .unwrap()
            .unwrap();
        assert!(approx(sheet.sheet.total_cost.unwrap(), 6.0));
    }

    #[test]
    fn test_usuario_comum_reads_without_costs() {
        let fx = fixture();
        let flour = add_ingredient(&fx, "Farinha", 1000.0, 10.0);
        let saved = save_technical_sheet(
            &fx.db,
            &fx.admin,
            None,
            Some(fx.restaurant_id),
            sheet_fields("Pão"),
            vec![LineItem::ingredient(flour, 100.0)],
        )
        .unwrap();
        let id = saved.technical_sheet.sheet.id;

        let user = fx.member("u", Role::UsuarioComum);
        let seen = get_technical_sheet(&fx.db, &user, id).unwrap().unwrap();
        assert_eq!(seen.sheet.total_cost, None);
        assert!(delete_technical_sheet(&fx.db, &user, id).is_err());

        let listed = list_technical_sheets(&fx.db, &user, None, None, 50, 0).unwrap();
        assert_eq!(listed.total, 1);
        assert_eq!(listed.technical_sheets[0].restaurant_price, None);
    }

    #[test]
    fn test_preview_and_delete() {
        let fx = fixture();
        let flour = add_ingredient(&fx, "Farinha", 1000.0, 10.0);
        let preview = preview_technical_sheet_costs(
            &fx.db,
            &fx.admin,
            fx.restaurant_id,
            vec![LineItem::ingredient(flour, 100.0), LineItem::ingredient(9999, 50.0)],
        )
        .unwrap();
        assert!(approx(preview.total_cost.unwrap(), 1.0));
        assert!(approx(preview.final_weight, 150.0));
        assert_eq!(preview.yield_portions, None);

        let saved = save_technical_sheet(
            &fx.db,
            &fx.admin,
            None,
            Some(fx.restaurant_id),
            sheet_fields("Pão"),
            vec![LineItem::ingredient(flour, 100.0)],
        )
        .unwrap();
        let id = saved.technical_sheet.sheet.id;
        assert!(delete_technical_sheet(&fx.db, &fx.admin, id).unwrap().success);
        assert!(get_technical_sheet(&fx.db, &fx.admin, id).unwrap().is_none());
        assert_eq!(fx.activity_count(), 2);
    }
}
