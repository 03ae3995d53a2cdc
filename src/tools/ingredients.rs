//! Ingredient MCP Tools
//!
//! Tools for managing ingredients (insumos). Price or weight changes are
//! cascaded into every recipe and technical sheet using the ingredient.

use serde::Serialize;

use crate::auth::Session;
use crate::costing::Unit;
use crate::db::{Database, DbError};
use crate::models::{
    cascade_from_ingredient, ActivityAction, EntityKind, Ingredient, IngredientCategory,
    IngredientCreate, IngredientFilter, IngredientUpdate,
};

use super::{log_activity, paging};

/// Ingredient as returned by the tools
#[derive(Debug, Serialize)]
pub struct IngredientView {
    pub id: i64,
    pub restaurant_id: i64,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub name: String,
    pub reference_weight: f64,
    pub unit: Unit,
    pub unit_label: &'static str,
    pub reference_price: f64,
    pub unit_cost: f64,
    pub usage_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl IngredientView {
    fn new(ingredient: Ingredient, usage_count: i64) -> Self {
        let unit_cost = ingredient.unit_cost();
        Self {
            id: ingredient.id,
            restaurant_id: ingredient.restaurant_id,
            category_id: ingredient.category_id,
            category_name: ingredient.category_name,
            name: ingredient.name,
            reference_weight: ingredient.reference_weight,
            unit: ingredient.unit,
            unit_label: ingredient.unit.label(),
            reference_price: ingredient.reference_price,
            unit_cost,
            usage_count,
            created_at: ingredient.created_at,
            updated_at: ingredient.updated_at,
        }
    }
}

/// Response for list_ingredients
#[derive(Debug, Serialize)]
pub struct ListIngredientsResponse {
    pub ingredients: Vec<IngredientView>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Response for update_ingredient
#[derive(Debug, Serialize)]
pub struct UpdateIngredientResponse {
    pub ingredient: IngredientView,
    pub recipes_recalculated: i64,
    pub sheets_recalculated: i64,
}

/// Response for delete blocked
#[derive(Debug, Serialize)]
pub struct IngredientDeleteBlockedResponse {
    pub error: String,
    pub usage_count: i64,
}

/// Response for successful delete
#[derive(Debug, Serialize)]
pub struct IngredientDeleteSuccessResponse {
    pub success: bool,
    pub deleted_id: i64,
}

/// Parse a unit tag from tool input
pub fn parse_unit(unit: &str) -> Result<Unit, String> {
    Unit::parse(unit).ok_or_else(|| format!("Invalid unit '{}'. Use g, ml or un", unit))
}

fn validate_amounts(weight: Option<f64>, price: Option<f64>) -> Result<(), String> {
    if let Some(w) = weight {
        if !w.is_finite() || w <= 0.0 {
            return Err("reference_weight must be greater than 0".to_string());
        }
    }
    if let Some(p) = price {
        if !p.is_finite() || p < 0.0 {
            return Err("reference_price cannot be negative".to_string());
        }
    }
    Ok(())
}

fn check_category(
    conn: &rusqlite::Connection,
    restaurant_id: i64,
    category_id: Option<i64>,
) -> Result<(), DbError> {
    if let Some(category_id) = category_id {
        match IngredientCategory::get_by_id(conn, category_id)? {
            Some(c) if c.restaurant_id == restaurant_id => {}
            _ => {
                return Err(DbError::Constraint(format!(
                    "Category {} does not belong to restaurant {}",
                    category_id, restaurant_id
                )))
            }
        }
    }
    Ok(())
}

/// Create an ingredient
pub fn create_ingredient(
    db: &Database,
    session: &Session,
    mut data: IngredientCreate,
) -> Result<IngredientView, String> {
    session
        .require_edit_catalog(data.restaurant_id)
        .map_err(|e| e.to_string())?;

    data.name = data.name.trim().to_string();
    if data.name.is_empty() {
        return Err("Ingredient name cannot be empty".to_string());
    }
    validate_amounts(Some(data.reference_weight), Some(data.reference_price))?;

    let ingredient = db
        .with_transaction(|tx| {
            check_category(tx, data.restaurant_id, data.category_id)?;
            let ingredient = Ingredient::create(tx, &data)?;
            log_activity(
                tx,
                session,
                Some(ingredient.restaurant_id),
                EntityKind::Insumo,
                ActivityAction::Criado,
                &ingredient.name,
                format!(
                    "{} {} por R$ {:.2}",
                    ingredient.reference_weight, ingredient.unit, ingredient.reference_price
                ),
            )
            .map_err(DbError::Constraint)?;
            Ok(ingredient)
        })
        .map_err(|e| format!("Failed to create ingredient: {}", e))?;

    tracing::info!(id = ingredient.id, name = %ingredient.name, "Created ingredient");
    Ok(IngredientView::new(ingredient, 0))
}

/// Get an ingredient
pub fn get_ingredient(db: &Database, session: &Session, id: i64) -> Result<Option<IngredientView>, String> {
    let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;

    let ingredient = Ingredient::get_by_id(&conn, id)
        .map_err(|e| format!("Failed to get ingredient: {}", e))?;
    let Some(ingredient) = ingredient else {
        return Ok(None);
    };
    session
        .require_view(ingredient.restaurant_id)
        .map_err(|e| e.to_string())?;

    let usage_count = Ingredient::usage_count(&conn, id)
        .map_err(|e| format!("Failed to check usage: {}", e))?;
    Ok(Some(IngredientView::new(ingredient, usage_count)))
}

/// List ingredients with filters
pub fn list_ingredients(
    db: &Database,
    session: &Session,
    mut filter: IngredientFilter,
    limit: i64,
    offset: i64,
) -> Result<ListIngredientsResponse, String> {
    let (limit, offset) = paging(limit, offset);
    if let Some(restaurant_id) = filter.restaurant_id {
        session.require_view(restaurant_id).map_err(|e| e.to_string())?;
    }
    filter.visible_restaurants = session.visible_restaurants();

    let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;

    let ingredients = Ingredient::list(&conn, &filter, limit, offset)
        .map_err(|e| format!("Failed to list ingredients: {}", e))?;
    let total = Ingredient::count(&conn, &filter)
        .map_err(|e| format!("Failed to count ingredients: {}", e))?;

    let mut views = Vec::with_capacity(ingredients.len());
    for ingredient in ingredients {
        let usage_count = Ingredient::usage_count(&conn, ingredient.id)
            .map_err(|e| format!("Failed to check usage: {}", e))?;
        views.push(IngredientView::new(ingredient, usage_count));
    }

    Ok(ListIngredientsResponse {
        ingredients: views,
        total,
        limit,
        offset,
    })
}

/// Update an ingredient and reprice everything using it
pub fn update_ingredient(
    db: &Database,
    session: &Session,
    id: i64,
    mut data: IngredientUpdate,
) -> Result<UpdateIngredientResponse, String> {
    validate_amounts(data.reference_weight, data.reference_price)?;
    if let Some(name) = data.name.as_mut() {
        *name = name.trim().to_string();
        if name.is_empty() {
            return Err("Ingredient name cannot be empty".to_string());
        }
    }

    let (ingredient, cascade, usage_count) = db
        .with_transaction(|tx| {
            let before = Ingredient::get_by_id(tx, id)?
                .ok_or_else(|| DbError::Constraint(format!("Ingredient not found with id: {}", id)))?;
            session
                .require_edit_catalog(before.restaurant_id)
                .map_err(|e| DbError::Constraint(e.to_string()))?;
            check_category(tx, before.restaurant_id, data.category_id.flatten())?;

            let ingredient = Ingredient::update(tx, id, &data)?
                .ok_or_else(|| DbError::Constraint(format!("Ingredient not found with id: {}", id)))?;

            let cost_changed = ingredient.reference_price != before.reference_price
                || ingredient.reference_weight != before.reference_weight;
            let cascade = if cost_changed {
                cascade_from_ingredient(tx, id)?
            } else {
                Default::default()
            };

            let description = if cost_changed {
                format!(
                    "preço R$ {:.2} / {} {} → R$ {:.2} / {} {}",
                    before.reference_price,
                    before.reference_weight,
                    before.unit,
                    ingredient.reference_price,
                    ingredient.reference_weight,
                    ingredient.unit
                )
            } else {
                String::new()
            };
            log_activity(
                tx,
                session,
                Some(ingredient.restaurant_id),
                EntityKind::Insumo,
                ActivityAction::Editado,
                &ingredient.name,
                description,
            )
            .map_err(DbError::Constraint)?;

            let usage_count = Ingredient::usage_count(tx, id)?;
            Ok((ingredient, cascade, usage_count))
        })
        .map_err(|e| format!("Failed to update ingredient: {}", e))?;

    Ok(UpdateIngredientResponse {
        ingredient: IngredientView::new(ingredient, usage_count),
        recipes_recalculated: cascade.recipes_recalculated,
        sheets_recalculated: cascade.sheets_recalculated,
    })
}

/// Delete an ingredient (blocked while recipes or sheets use it)
pub fn delete_ingredient(
    db: &Database,
    session: &Session,
    id: i64,
) -> Result<Result<IngredientDeleteSuccessResponse, IngredientDeleteBlockedResponse>, String> {
    let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;

    let ingredient = Ingredient::get_by_id(&conn, id)
        .map_err(|e| format!("Database error: {}", e))?
        .ok_or_else(|| format!("Ingredient not found with id: {}", id))?;
    session
        .require_edit_catalog(ingredient.restaurant_id)
        .map_err(|e| e.to_string())?;

    let usage_count = Ingredient::usage_count(&conn, id)
        .map_err(|e| format!("Failed to check usage: {}", e))?;
    if usage_count > 0 {
        return Ok(Err(IngredientDeleteBlockedResponse {
            error: format!(
                "Cannot delete ingredient: used by {} recipe or technical sheet item(s)",
                usage_count
            ),
            usage_count,
        }));
    }
    drop(conn);

    db.with_transaction(|tx| {
        Ingredient::delete(tx, id)?;
        log_activity(
            tx,
            session,
            Some(ingredient.restaurant_id),
            EntityKind::Insumo,
            ActivityAction::Excluido,
            &ingredient.name,
            String::new(),
        )
        .map_err(DbError::Constraint)?;
        Ok(())
    })
    .map_err(|e| format!("Failed to delete ingredient: {}", e))?;

    Ok(Ok(IngredientDeleteSuccessResponse {
        success: true,
        deleted_id: id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::tools::test_support::fixture;

    fn flour(restaurant_id: i64) -> IngredientCreate {
        IngredientCreate {
            restaurant_id,
            category_id: None,
            name: "Farinha".to_string(),
            reference_weight: 1000.0,
            unit: Unit::Grams,
            reference_price: 10.0,
        }
    }

    #[test]
    fn test_redator_creates_ingredient() {
        let fx = fixture();
        let redator = fx.member("r", Role::Redator);
        let view = create_ingredient(&fx.db, &redator, flour(fx.restaurant_id)).unwrap();
        assert!((view.unit_cost - 0.01).abs() < 1e-12);
        assert_eq!(fx.activity_count(), 1);
    }

    #[test]
    fn test_validation() {
        let fx = fixture();
        let mut bad = flour(fx.restaurant_id);
        bad.reference_weight = 0.0;
        assert!(create_ingredient(&fx.db, &fx.admin, bad).is_err());

        let mut unnamed = flour(fx.restaurant_id);
        unnamed.name = "  ".to_string();
        assert!(create_ingredient(&fx.db, &fx.admin, unnamed).is_err());

        assert!(parse_unit("kg").is_err());
        assert_eq!(parse_unit("ml").unwrap(), Unit::Millilitres);
    }

    #[test]
    fn test_foreign_category_rejected() {
        let fx = fixture();
        let other_cat = fx
            .db
            .with_conn(|conn| IngredientCategory::create(conn, fx.other_restaurant_id, "Outra"))
            .unwrap();
        let mut data = flour(fx.restaurant_id);
        data.category_id = Some(other_cat.id);
        assert!(create_ingredient(&fx.db, &fx.admin, data).is_err());
    }

    #[test]
    fn test_usuario_comum_cannot_edit_and_outsiders_cannot_list() {
        let fx = fixture();
        let user = fx.member("u", Role::UsuarioComum);
        assert!(create_ingredient(&fx.db, &user, flour(fx.restaurant_id)).is_err());

        create_ingredient(&fx.db, &fx.admin, flour(fx.other_restaurant_id)).unwrap();
        let filter = IngredientFilter {
            restaurant_id: Some(fx.other_restaurant_id),
            ..Default::default()
        };
        assert!(list_ingredients(&fx.db, &user, filter, 50, 0).is_err());

        let everything = list_ingredients(&fx.db, &user, IngredientFilter::default(), 50, 0).unwrap();
        assert_eq!(everything.total, 0);
    }

    #[test]
    fn test_unused_ingredient_can_be_deleted() {
        let fx = fixture();
        let view = create_ingredient(&fx.db, &fx.admin, flour(fx.restaurant_id)).unwrap();
        let result = delete_ingredient(&fx.db, &fx.admin, view.id).unwrap();
        assert!(result.is_ok());
        assert!(get_ingredient(&fx.db, &fx.admin, view.id).unwrap().is_none());
    }
}
