use std::collections::HashSet;

use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{map_write_error, ErrorKind, QueryError, ViolationKind},
    jwt::SessionData,
    permissions::ActionType,
    schema::{Id, RecipeMinified},
};

use super::recipes::{get_recipe_minified, recipe_exists};

/// Per-user recipe sets sharing one contract. They differ only in the
/// relation they guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MembershipSet {
    Favorites,
    ShoppingList,
}

impl MembershipSet {
    pub fn table(&self) -> &'static str {
        match self {
            MembershipSet::Favorites => "favorites",
            MembershipSet::ShoppingList => "shopping_list",
        }
    }

    fn action(&self) -> ActionType {
        match self {
            MembershipSet::Favorites => ActionType::ManageOwnFavorites,
            MembershipSet::ShoppingList => ActionType::ManageOwnShoppingList,
        }
    }

    fn already_member(&self) -> &'static str {
        match self {
            MembershipSet::Favorites => "Recipe is already in favorites.",
            MembershipSet::ShoppingList => "Recipe is already in the shopping list.",
        }
    }

    fn not_member(&self) -> &'static str {
        match self {
            MembershipSet::Favorites => "Recipe is not in favorites.",
            MembershipSet::ShoppingList => "Recipe is not in the shopping list.",
        }
    }
}

/// Inserts (user, recipe) relying on the primary key: a second add of the
/// same pair touches no row and is reported as a conflict.
pub async fn add_to_set(
    set: MembershipSet,
    session: &SessionData,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<RecipeMinified, potion::Error> {
    session.authenticate(set.action())?;

    let result = sqlx::query(&format!(
        "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        set.table()
    ))
    .bind(session.user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(|e| {
        map_write_error(e, |violation| match violation.kind {
            ViolationKind::ForeignKey => Some(ErrorKind::NotFound.on("recipe", "No recipe exists with specified id")),
            _ => None,
        })
    })?;

    if result.rows_affected() == 0 {
        return Err(ErrorKind::Conflict.on("recipe", set.already_member()).into());
    }

    get_recipe_minified(recipe_id, pool)
        .await?
        .ok_or_else(|| ErrorKind::NotFound.on("recipe", "No recipe exists with specified id").into())
}

pub async fn remove_from_set(
    set: MembershipSet,
    session: &SessionData,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), potion::Error> {
    session.authenticate(set.action())?;

    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
        set.table()
    ))
    .bind(session.user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    if result.rows_affected() > 0 {
        return Ok(());
    }

    if !recipe_exists(recipe_id, pool).await? {
        return Err(ErrorKind::NotFound.on("recipe", "No recipe exists with specified id").into());
    }

    Err(ErrorKind::Validation.on("recipe", set.not_member()).into())
}

pub async fn is_in_set(
    set: MembershipSet,
    user_id: Id,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, potion::Error> {
    let row: Option<(Id,)> = sqlx::query_as(&format!(
        "SELECT recipe_id FROM {} WHERE user_id = $1 AND recipe_id = $2",
        set.table()
    ))
    .bind(user_id)
    .bind(recipe_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(row.is_some())
}

/// Which of `recipe_ids` are in the viewer's set. Always empty for an
/// anonymous viewer.
pub(crate) async fn members_among(
    set: MembershipSet,
    viewer: Option<Id>,
    recipe_ids: &[Id],
    conn: &mut PgConnection,
) -> Result<HashSet<Id>, potion::Error> {
    let Some(user_id) = viewer else {
        return Ok(HashSet::new());
    };

    let rows: Vec<(Id,)> = sqlx::query_as(&format!(
        "SELECT recipe_id FROM {} WHERE user_id = $1 AND recipe_id = ANY($2)",
        set.table()
    ))
    .bind(user_id)
    .bind(recipe_ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(rows.into_iter().map(|row| row.0).collect())
}

pub async fn add_to_favorites(
    session: &SessionData,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<RecipeMinified, potion::Error> {
    add_to_set(MembershipSet::Favorites, session, recipe_id, pool).await
}

pub async fn remove_from_favorites(
    session: &SessionData,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), potion::Error> {
    remove_from_set(MembershipSet::Favorites, session, recipe_id, pool).await
}

pub async fn add_to_shopping_list(
    session: &SessionData,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<RecipeMinified, potion::Error> {
    add_to_set(MembershipSet::ShoppingList, session, recipe_id, pool).await
}

pub async fn remove_from_shopping_list(
    session: &SessionData,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), potion::Error> {
    remove_from_set(MembershipSet::ShoppingList, session, recipe_id, pool).await
}
