use sqlx::{Pool, Postgres};

use crate::{
    error::QueryError,
    export::ShoppingListExport,
    jwt::SessionData,
    permissions::ActionType,
    schema::ShoppingListRow,
};

/// Consolidated ingredient totals over the session user's shopping list.
/// An empty list yields an export with no lines.
pub async fn export_shopping_list(
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<ShoppingListExport, potion::Error> {
    session.authenticate(ActionType::ManageOwnShoppingList)?;

    let rows: Vec<ShoppingListRow> = sqlx::query_as(
        "
        SELECT i.name, i.measurement_unit, ri.amount
        FROM shopping_list sl
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = sl.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE sl.user_id = $1
    ",
    )
    .bind(session.user_id)
    .fetch_all(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    let export = ShoppingListExport::consolidate(rows);
    log::debug!(
        "Shopping list of {} consolidated into {} lines",
        session.username,
        export.lines.len()
    );

    Ok(export)
}
