//! Ingredient category MCP Tools

use serde::Serialize;

use crate::auth::Session;
use crate::db::{Database, DbError};
use crate::models::{ActivityAction, EntityKind, IngredientCategory};

use super::log_activity;

/// Category with the number of ingredients filed under it
#[derive(Debug, Serialize)]
pub struct CategorySummary {
    pub id: i64,
    pub name: String,
    pub ingredient_count: i64,
}

/// Response for list_ingredient_categories
#[derive(Debug, Serialize)]
pub struct ListCategoriesResponse {
    pub restaurant_id: i64,
    pub categories: Vec<CategorySummary>,
}

/// Response for delete_ingredient_category
#[derive(Debug, Serialize)]
pub struct DeleteCategoryResponse {
    pub success: bool,
    pub deleted_id: i64,
    pub ingredients_uncategorised: i64,
}

/// Create a category
pub fn create_ingredient_category(
    db: &Database,
    session: &Session,
    restaurant_id: i64,
    name: &str,
) -> Result<IngredientCategory, String> {
    session.require_edit_catalog(restaurant_id).map_err(|e| e.to_string())?;

    let name = name.trim();
    if name.is_empty() {
        return Err("Category name cannot be empty".to_string());
    }

    db.with_transaction(|tx| {
        if IngredientCategory::find_by_name(tx, restaurant_id, name)?.is_some() {
            return Err(DbError::Constraint(format!("Category '{}' already exists", name)));
        }
        let category = IngredientCategory::create(tx, restaurant_id, name)?;
        log_activity(
            tx,
            session,
            Some(restaurant_id),
            EntityKind::Categoria,
            ActivityAction::Criado,
            &category.name,
            String::new(),
        )
        .map_err(DbError::Constraint)?;
        Ok(category)
    })
    .map_err(|e| format!("Failed to create category: {}", e))
}

/// List the categories of a restaurant
pub fn list_ingredient_categories(
    db: &Database,
    session: &Session,
    restaurant_id: i64,
) -> Result<ListCategoriesResponse, String> {
    session.require_view(restaurant_id).map_err(|e| e.to_string())?;

    let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;
    let categories = IngredientCategory::list_for_restaurant(&conn, restaurant_id)
        .map_err(|e| format!("Failed to list categories: {}", e))?;

    let mut summaries = Vec::with_capacity(categories.len());
    for category in categories {
        let ingredient_count = IngredientCategory::ingredient_count(&conn, category.id)
            .map_err(|e| format!("Failed to count ingredients: {}", e))?;
        summaries.push(CategorySummary {
            id: category.id,
            name: category.name,
            ingredient_count,
        });
    }

    Ok(ListCategoriesResponse {
        restaurant_id,
        categories: summaries,
    })
}

/// Delete a category; its ingredients stay, uncategorised
pub fn delete_ingredient_category(
    db: &Database,
    session: &Session,
    id: i64,
) -> Result<DeleteCategoryResponse, String> {
    let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;
    let category = IngredientCategory::get_by_id(&conn, id)
        .map_err(|e| format!("Database error: {}", e))?
        .ok_or_else(|| format!("Category not found with id: {}", id))?;
    drop(conn);

    session
        .require_edit_catalog(category.restaurant_id)
        .map_err(|e| e.to_string())?;

    let ingredients_uncategorised = db
        .with_transaction(|tx| {
            let count = IngredientCategory::ingredient_count(tx, id)?;
            IngredientCategory::delete(tx, id)?;
            log_activity(
                tx,
                session,
                Some(category.restaurant_id),
                EntityKind::Categoria,
                ActivityAction::Excluido,
                &category.name,
                String::new(),
            )
            .map_err(DbError::Constraint)?;
            Ok(count)
        })
        .map_err(|e| format!("Failed to delete category: {}", e))?;

    Ok(DeleteCategoryResponse {
        success: true,
        deleted_id: id,
        ingredients_uncategorised,
    })
}
