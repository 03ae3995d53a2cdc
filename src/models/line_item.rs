//! Line items of recipes and technical sheets
//!
//! Both parents store items the same way, in `recipe_items` and
//! `technical_sheet_items`. Items are always replaced wholesale.

use std::collections::HashSet;

use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::costing::calculator::MAX_INDEX;
use crate::costing::{CookingDirection, ItemSource, LineItem, Unit};
use crate::db::{DbError, DbResult};

/// Parent of a set of line items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOwner {
    Recipe(i64),
    Sheet(i64),
}

impl ItemOwner {
    fn table(&self) -> &'static str {
        match self {
            ItemOwner::Recipe(_) => "recipe_items",
            ItemOwner::Sheet(_) => "technical_sheet_items",
        }
    }

    fn owner_column(&self) -> &'static str {
        match self {
            ItemOwner::Recipe(_) => "recipe_id",
            ItemOwner::Sheet(_) => "sheet_id",
        }
    }

    /// Column holding the nested recipe reference
    fn nested_column(&self) -> &'static str {
        match self {
            ItemOwner::Recipe(_) => "sub_recipe_id",
            ItemOwner::Sheet(_) => "recipe_id",
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            ItemOwner::Recipe(id) | ItemOwner::Sheet(id) => *id,
        }
    }
}

/// A stored line item with the name of what it draws from
#[derive(Debug, Clone, Serialize)]
pub struct LineItemDetail {
    pub id: i64,
    pub position: i64,
    pub source_name: Option<String>,
    #[serde(flatten)]
    pub item: LineItem,
}

fn line_item_from_row(row: &Row) -> rusqlite::Result<LineItem> {
    let ingredient_id: Option<i64> = row.get("ingredient_id")?;
    let nested_recipe_id: Option<i64> = row.get("nested_recipe_id")?;
    let source = match (ingredient_id, nested_recipe_id) {
        (Some(id), _) => ItemSource::Ingredient(id),
        (None, Some(id)) => ItemSource::Recipe(id),
        (None, None) => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Null,
                "line item has no source".into(),
            ))
        }
    };
    let unit: String = row.get("unit")?;
    let direction: String = row.get("cooking_direction")?;

    Ok(LineItem {
        source,
        quantity_used: row.get("quantity_used")?,
        unit: Unit::from_str(&unit),
        cooking_index: row.get("cooking_index")?,
        cooking_direction: CookingDirection::from_str(&direction),
        edible_index: row.get("edible_index")?,
        apply_adjustment: row.get::<_, i32>("apply_adjustment")? != 0,
    })
}

fn select_items_sql(owner: ItemOwner) -> String {
    format!(
        r#"
        SELECT li.id, li.position, li.ingredient_id, li.{nested} AS nested_recipe_id,
               li.quantity_used, li.unit, li.cooking_index, li.cooking_direction,
               li.edible_index, li.apply_adjustment,
               COALESCE(i.name, r.name) AS source_name
        FROM {table} li
        LEFT JOIN ingredients i ON i.id = li.ingredient_id
        LEFT JOIN recipes r ON r.id = li.{nested}
        WHERE li.{owner} = ?1
        ORDER BY li.position, li.id
        "#,
        nested = owner.nested_column(),
        table = owner.table(),
        owner = owner.owner_column(),
    )
}

/// Items of a recipe or sheet, in order
pub fn load_items(conn: &Connection, owner: ItemOwner) -> DbResult<Vec<LineItem>> {
    let mut stmt = conn.prepare(&select_items_sql(owner))?;
    let items = stmt
        .query_map([owner.id()], line_item_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

/// Items with their ids and source names
pub fn load_item_details(conn: &Connection, owner: ItemOwner) -> DbResult<Vec<LineItemDetail>> {
    let mut stmt = conn.prepare(&select_items_sql(owner))?;
    let details = stmt
        .query_map([owner.id()], |row| {
            Ok(LineItemDetail {
                id: row.get("id")?,
                position: row.get("position")?,
                source_name: row.get("source_name")?,
                item: line_item_from_row(row)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(details)
}

/// Delete every item of the owner and insert the given list in its place
pub fn replace_items(conn: &Connection, owner: ItemOwner, items: &[LineItem]) -> DbResult<()> {
    conn.execute(
        &format!("DELETE FROM {} WHERE {} = ?1", owner.table(), owner.owner_column()),
        [owner.id()],
    )?;

    let sql = format!(
        r#"
        INSERT INTO {} (
            {}, position, ingredient_id, {}, quantity_used, unit,
            cooking_index, cooking_direction, edible_index, apply_adjustment
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        owner.table(),
        owner.owner_column(),
        owner.nested_column()
    );
    let mut stmt = conn.prepare(&sql)?;

    for (position, item) in items.iter().enumerate() {
        let (ingredient_id, nested_recipe_id) = match item.source {
            ItemSource::Ingredient(id) => (Some(id), None),
            ItemSource::Recipe(id) => (None, Some(id)),
        };
        stmt.execute(params![
            owner.id(),
            position as i64,
            ingredient_id,
            nested_recipe_id,
            item.quantity_used,
            item.unit.as_str(),
            item.cooking_index,
            item.cooking_direction.as_str(),
            item.edible_index,
            item.apply_adjustment as i32,
        ])?;
    }

    tracing::debug!(owner = ?owner, count = items.len(), "Replaced line items");
    Ok(())
}

fn check_amounts(position: usize, item: &LineItem) -> DbResult<()> {
    if item.quantity_used <= 0.0 || !item.quantity_used.is_finite() {
        return Err(DbError::Constraint(format!(
            "item {}: quantity used must be greater than zero",
            position + 1
        )));
    }
    for (label, value) in [("IC", item.cooking_index), ("IPC", item.edible_index)] {
        if !(0.0..=MAX_INDEX).contains(&value) {
            return Err(DbError::Constraint(format!(
                "item {}: {} must be between 0 and {}, got {}",
                position + 1,
                label,
                MAX_INDEX,
                value
            )));
        }
    }
    Ok(())
}

/// Check that every item has a positive quantity and indices in range,
/// references a record of the same restaurant, and that no recipe ends up
/// containing itself
pub fn validate_items(
    conn: &Connection,
    owner: ItemOwner,
    restaurant_id: i64,
    items: &[LineItem],
) -> DbResult<()> {
    for (position, item) in items.iter().enumerate() {
        check_amounts(position, item)?;

        let (table, label) = match item.source {
            ItemSource::Ingredient(_) => ("ingredients", "ingredient"),
            ItemSource::Recipe(_) => ("recipes", "recipe"),
        };
        let id = item.source.id();

        let owner_restaurant: Option<i64> = match conn.query_row(
            &format!("SELECT restaurant_id FROM {} WHERE id = ?1", table),
            [id],
            |row| row.get(0),
        ) {
            Ok(restaurant) => Some(restaurant),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };

        match owner_restaurant {
            None => {
                return Err(DbError::Constraint(format!(
                    "item {}: {} {} does not exist",
                    position + 1,
                    label,
                    id
                )))
            }
            Some(r) if r != restaurant_id => {
                return Err(DbError::Constraint(format!(
                    "item {}: {} {} belongs to another restaurant",
                    position + 1,
                    label,
                    id
                )))
            }
            Some(_) => {}
        }

        if let (ItemOwner::Recipe(recipe_id), ItemSource::Recipe(sub_id)) = (owner, item.source) {
            if would_create_cycle(conn, recipe_id, sub_id)? {
                return Err(DbError::Constraint(format!(
                    "item {}: using recipe {} here would make recipe {} contain itself",
                    position + 1,
                    sub_id,
                    recipe_id
                )));
            }
        }
    }
    Ok(())
}

/// Direct sub-recipes of a recipe
pub fn sub_recipe_ids(conn: &Connection, recipe_id: i64) -> DbResult<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT sub_recipe_id FROM recipe_items WHERE recipe_id = ?1 AND sub_recipe_id IS NOT NULL",
    )?;
    let ids = stmt
        .query_map([recipe_id], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

/// Recipes that use a recipe as an item
pub fn parent_recipe_ids(conn: &Connection, sub_recipe_id: i64) -> DbResult<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT DISTINCT recipe_id FROM recipe_items WHERE sub_recipe_id = ?1")?;
    let ids = stmt
        .query_map([sub_recipe_id], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

/// Recipes with an item drawing directly from an ingredient
pub fn recipes_using_ingredient(conn: &Connection, ingredient_id: i64) -> DbResult<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT DISTINCT recipe_id FROM recipe_items WHERE ingredient_id = ?1")?;
    let ids = stmt
        .query_map([ingredient_id], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

/// Technical sheets using an ingredient or any of the given recipes
pub fn sheets_using(
    conn: &Connection,
    ingredient_id: Option<i64>,
    recipe_ids: &[i64],
) -> DbResult<Vec<i64>> {
    let recipe_filter = super::restaurant::id_filter("recipe_id", recipe_ids);
    let sql = format!(
        "SELECT DISTINCT sheet_id FROM technical_sheet_items WHERE ingredient_id = ?1 OR {}",
        recipe_filter
    );
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map([ingredient_id.unwrap_or(-1)], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

/// Whether adding `sub_recipe_id` as an item of `recipe_id` would create a cycle
pub fn would_create_cycle(conn: &Connection, recipe_id: i64, sub_recipe_id: i64) -> DbResult<bool> {
    // recipe_id must not be reachable from sub_recipe_id
    let mut visited = HashSet::new();
    let mut to_check = vec![sub_recipe_id];

    while let Some(current) = to_check.pop() {
        if current == recipe_id {
            return Ok(true);
        }
        if !visited.insert(current) {
            continue;
        }
        to_check.extend(sub_recipe_ids(conn, current)?);
    }

    Ok(false)
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
            r#"
            INSERT INTO restaurants (id, name, cnpj) VALUES (1, 'R', '1'), (2, 'S', '2');
            INSERT INTO ingredients (id, restaurant_id, name, reference_weight, unit, reference_price)
                VALUES (1, 1, 'Farinha', 1000, 'g', 10), (2, 2, 'Alheio', 1, 'g', 1);
            INSERT INTO recipes (id, restaurant_id, name) VALUES (10, 1, 'A'), (11, 1, 'B'), (12, 1, 'C');
            INSERT INTO technical_sheets (id, restaurant_id, name) VALUES (20, 1, 'Ficha');
            "#,
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_replace_items_keeps_order_and_fields() {
        let conn = setup();
        let items = vec![
            LineItem::ingredient(1, 200.0).with_indices(80.0, 90.0, CookingDirection::Mais),
            LineItem::recipe(11, 50.0).without_adjustment(),
        ];
        replace_items(&conn, ItemOwner::Recipe(10), &items).unwrap();
        assert_eq!(load_items(&conn, ItemOwner::Recipe(10)).unwrap(), items);

        replace_items(&conn, ItemOwner::Recipe(10), &items[1..]).unwrap();
        let details = load_item_details(&conn, ItemOwner::Recipe(10)).unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].source_name.as_deref(), Some("B"));
    }

    #[test]
    fn test_sheet_items_use_recipe_column() {
        let conn = setup();
        let items = vec![LineItem::recipe(10, 100.0), LineItem::ingredient(1, 5.0)];
        replace_items(&conn, ItemOwner::Sheet(20), &items).unwrap();
        assert_eq!(load_items(&conn, ItemOwner::Sheet(20)).unwrap(), items);
        assert_eq!(sheets_using(&conn, None, &[10]).unwrap(), vec![20]);
        assert_eq!(sheets_using(&conn, Some(1), &[]).unwrap(), vec![20]);
    }

    #[test]
    fn test_cycle_detection() {
        let conn = setup();
        replace_items(&conn, ItemOwner::Recipe(10), &[LineItem::recipe(11, 1.0)]).unwrap();
        replace_items(&conn, ItemOwner::Recipe(11), &[LineItem::recipe(12, 1.0)]).unwrap();

        assert!(would_create_cycle(&conn, 12, 10).unwrap());
        assert!(would_create_cycle(&conn, 10, 10).unwrap());
        assert!(!would_create_cycle(&conn, 10, 12).unwrap());

        let err = validate_items(&conn, ItemOwner::Recipe(12), 1, &[LineItem::recipe(10, 1.0)]);
        assert!(matches!(err, Err(DbError::Constraint(_))));
    }

    #[test]
    fn test_foreign_restaurant_items_are_rejected() {
        let conn = setup();
        let err = validate_items(&conn, ItemOwner::Sheet(20), 1, &[LineItem::ingredient(2, 1.0)]);
        assert!(matches!(err, Err(DbError::Constraint(_))));
        let missing = validate_items(&conn, ItemOwner::Sheet(20), 1, &[LineItem::ingredient(99, 1.0)]);
        assert!(matches!(missing, Err(DbError::Constraint(_))));
        assert!(validate_items(&conn, ItemOwner::Sheet(20), 1, &[LineItem::ingredient(1, 1.0)]).is_ok());
    }

    #[test]
    fn test_out_of_range_amounts_are_rejected() {
        let conn = setup();
        let check = |item: LineItem| validate_items(&conn, ItemOwner::Recipe(10), 1, &[item]);

        assert!(check(LineItem::ingredient(1, 100.0).with_indices(5000.0, 90.0, CookingDirection::Menos)).is_err());
        assert!(check(LineItem::ingredient(1, 100.0).with_indices(100.0, -30.0, CookingDirection::Menos)).is_err());
        assert!(check(LineItem::ingredient(1, 0.0)).is_err());
        assert!(check(LineItem::ingredient(1, -5.0)).is_err());
        assert!(check(LineItem::ingredient(1, 100.0).with_indices(0.0, 999.99, CookingDirection::Mais)).is_ok());

        let raw = conn.execute(
            "INSERT INTO recipe_items (recipe_id, ingredient_id, quantity_used, cooking_index) VALUES (10, 1, 10, 1200)",
            [],
        );
        assert!(raw.is_err());
    }

    #[test]
    fn test_dependency_queries() {
        let conn = setup();
        replace_items(
            &conn,
            ItemOwner::Recipe(10),
            &[LineItem::recipe(11, 1.0), LineItem::ingredient(1, 1.0)],
        )
        .unwrap();
        assert_eq!(sub_recipe_ids(&conn, 10).unwrap(), vec![11]);
        assert_eq!(parent_recipe_ids(&conn, 11).unwrap(), vec![10]);
        assert_eq!(recipes_using_ingredient(&conn, 1).unwrap(), vec![10]);
    }
}
