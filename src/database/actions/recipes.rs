use std::collections::{HashMap, HashSet};

use sqlx::{PgConnection, Pool, Postgres, QueryBuilder, Transaction};

use crate::{
    constants::{RECIPE_COUNT_PER_PAGE, RECIPE_IMAGE_DIR},
    draft::{ensure_known, RecipeDraft},
    error::{map_write_error, ConstraintViolation, ErrorKind, FieldError, QueryError, ViolationKind},
    form::{as_integer, Form},
    image::{MediaStorage, StoredImage},
    jwt::SessionData,
    pagination::{PageContext, PageRequest},
    permissions::{authorize_recipe_owner, ActionType},
    schema::{
        Id, RecipeIngredientRow, RecipeMinified, RecipeRow, RecipeTagRow, RecipeView, UserProfile,
    },
};

use super::{
    catalog::{existing_ingredient_ids, existing_tag_ids},
    media::release_media,
    membership::{members_among, MembershipSet},
    users::profiles_for,
};

const RECIPE_COLUMNS: &str = "r.id, r.author_id, r.name, r.text, r.image, r.cooking_time, r.pub_date";

#[derive(Debug, Clone, PartialEq)]
pub struct RecipeFilter {
    /// Tag slugs; a recipe matches when it carries any of them.
    pub tags: Vec<String>,
    pub author: Option<Id>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub page: PageRequest,
}

impl Default for RecipeFilter {
    fn default() -> Self {
        Self {
            tags: vec![],
            author: None,
            is_favorited: false,
            is_in_shopping_cart: false,
            page: PageRequest::new(None, None, RECIPE_COUNT_PER_PAGE),
        }
    }
}

impl RecipeFilter {
    /// Builds the filter from decoded query pairs; `tags` may repeat.
    pub fn from_query(pairs: &[(String, String)]) -> Result<Self, FieldError> {
        let mut filter = Self::default();
        let mut offset = None;
        let mut limit = None;

        for (key, value) in pairs {
            let integer = || {
                as_integer(&serde_json::Value::String(value.to_owned()))
                    .ok_or_else(|| ErrorKind::Validation.on(key, "A valid integer is required."))
            };

            match key.as_str() {
                "tags" => filter.tags.push(value.to_owned()),
                "author" => {
                    filter.author = Some(
                        Id::try_from(integer()?)
                            .map_err(|_| ErrorKind::Validation.on(key, "A valid integer is required."))?,
                    )
                }
                "is_favorited" => filter.is_favorited = parse_flag(key, value)?,
                "is_in_shopping_cart" => filter.is_in_shopping_cart = parse_flag(key, value)?,
                "offset" => offset = Some(integer()?),
                "limit" => limit = Some(integer()?),
                _ => {}
            }
        }

        filter.page = PageRequest::new(offset, limit, RECIPE_COUNT_PER_PAGE);
        Ok(filter)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, FieldError> {
    match value {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(ErrorKind::Validation.on(key, "Expected 0 or 1.")),
    }
}

#[derive(sqlx::FromRow)]
struct RecipeRowCounted {
    #[sqlx(flatten)]
    recipe: RecipeRow,
    count: i64,
}

pub(crate) async fn recipe_exists(id: Id, pool: &Pool<Postgres>) -> Result<bool, potion::Error> {
    Ok(get_recipe(id, pool).await?.is_some())
}

pub async fn get_recipe(id: Id, pool: &Pool<Postgres>) -> Result<Option<RecipeRow>, potion::Error> {
    let row: Option<RecipeRow> =
        sqlx::query_as(&format!("SELECT {RECIPE_COLUMNS} FROM recipes r WHERE r.id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| QueryError::from(e).into())?;

    Ok(row)
}

pub async fn get_recipe_minified(
    id: Id,
    pool: &Pool<Postgres>,
) -> Result<Option<RecipeMinified>, potion::Error> {
    let row: Option<RecipeMinified> =
        sqlx::query_as("SELECT id, name, image, cooking_time FROM recipes WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| QueryError::from(e).into())?;

    Ok(row)
}

/// Locks the recipe row for the rest of the transaction and checks that the
/// session may modify it.
async fn get_recipe_mut(
    id: Id,
    session: &SessionData,
    conn: &mut PgConnection,
) -> Result<RecipeRow, potion::Error> {
    let recipe: Option<RecipeRow> = sqlx::query_as(&format!(
        "SELECT {RECIPE_COLUMNS} FROM recipes r WHERE r.id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    match recipe {
        Some(recipe) => {
            authorize_recipe_owner(session, recipe.author_id).map_err(|e| e.into())?;
            Ok(recipe)
        }
        None => Err(ErrorKind::NotFound.on("recipe", "No recipe exists with specified id").into()),
    }
}

/// Read-only transaction in which every relation of a projection is read
/// from the same snapshot.
async fn begin_snapshot(pool: &Pool<Postgres>) -> Result<Transaction<'_, Postgres>, potion::Error> {
    let mut tx = pool.begin().await.map_err(|e| QueryError::from(e).into())?;

    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
        .execute(&mut *tx)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(tx)
}

/// Joins the recipe rows with their batched relations. Recipes keep their
/// input order, tags arrive ordered by name and ingredients in insertion
/// order.
pub fn assemble_recipes(
    rows: Vec<RecipeRow>,
    authors: HashMap<Id, UserProfile>,
    tags: Vec<RecipeTagRow>,
    ingredients: Vec<RecipeIngredientRow>,
    favorites: &HashSet<Id>,
    shopping_list: &HashSet<Id>,
) -> Vec<RecipeView> {
    let mut tags_by_recipe: HashMap<Id, Vec<RecipeTagRow>> = HashMap::new();
    for tag in tags {
        tags_by_recipe.entry(tag.recipe_id).or_default().push(tag);
    }

    let mut ingredients_by_recipe: HashMap<Id, Vec<RecipeIngredientRow>> = HashMap::new();
    for ingredient in ingredients {
        ingredients_by_recipe
            .entry(ingredient.recipe_id)
            .or_default()
            .push(ingredient);
    }

    rows.into_iter()
        .filter_map(|row| {
            let author = match authors.get(&row.author_id) {
                Some(author) => author.clone(),
                None => {
                    log::error!("Recipe {} references missing author {}", row.id, row.author_id);
                    return None;
                }
            };

            Some(RecipeView {
                id: row.id,
                tags: tags_by_recipe
                    .remove(&row.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|tag| tag.into())
                    .collect(),
                author,
                ingredients: ingredients_by_recipe
                    .remove(&row.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|ingredient| ingredient.into())
                    .collect(),
                is_favorited: favorites.contains(&row.id),
                is_in_shopping_cart: shopping_list.contains(&row.id),
                name: row.name,
                image: row.image,
                text: row.text,
                cooking_time: row.cooking_time,
                pub_date: row.pub_date,
            })
        })
        .collect()
}

async fn load_views(
    viewer: Option<Id>,
    rows: Vec<RecipeRow>,
    conn: &mut PgConnection,
) -> Result<Vec<RecipeView>, potion::Error> {
    if rows.is_empty() {
        return Ok(vec![]);
    }

    let recipe_ids: Vec<Id> = rows.iter().map(|row| row.id).collect();
    let author_ids: Vec<Id> = rows
        .iter()
        .map(|row| row.author_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let tags: Vec<RecipeTagRow> = sqlx::query_as(
        "
        SELECT rt.recipe_id, t.id, t.name, t.slug
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY t.name
    ",
    )
    .bind(&recipe_ids[..])
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    let ingredients: Vec<RecipeIngredientRow> = sqlx::query_as(
        "
        SELECT ri.recipe_id, i.id, i.name, i.measurement_unit, ri.amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY ri.id
    ",
    )
    .bind(&recipe_ids[..])
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    let authors = profiles_for(viewer, &author_ids, &mut *conn).await?;
    let favorites = members_among(MembershipSet::Favorites, viewer, &recipe_ids, &mut *conn).await?;
    let shopping_list =
        members_among(MembershipSet::ShoppingList, viewer, &recipe_ids, &mut *conn).await?;

    Ok(assemble_recipes(
        rows,
        authors,
        tags,
        ingredients,
        &favorites,
        &shopping_list,
    ))
}

/// Full projection of one recipe for `viewer`.
pub async fn get_recipe_view(
    viewer: Option<&SessionData>,
    id: Id,
    pool: &Pool<Postgres>,
) -> Result<RecipeView, potion::Error> {
    let mut tx = begin_snapshot(pool).await?;

    let row: Option<RecipeRow> =
        sqlx::query_as(&format!("SELECT {RECIPE_COLUMNS} FROM recipes r WHERE r.id = $1"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| QueryError::from(e).into())?;

    let Some(row) = row else {
        return Err(ErrorKind::NotFound.on("recipe", "No recipe exists with specified id").into());
    };

    let view: Result<RecipeView, potion::Error> = load_views(viewer.map(|s| s.user_id), vec![row], &mut tx)
        .await?
        .pop()
        .ok_or_else(|| ErrorKind::NotFound.on("recipe", "No recipe exists with specified id").into());

    tx.commit().await.map_err(|e| QueryError::from(e).into())?;

    view
}

fn push_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &RecipeFilter, viewer_id: Option<Id>) {
    if let Some(author) = filter.author {
        query.push(" AND r.author_id = ").push_bind(author);
    }
    if !filter.tags.is_empty() {
        query
            .push(" AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id WHERE rt.recipe_id = r.id AND t.slug = ANY(")
            .push_bind(filter.tags.clone())
            .push("))");
    }
    for (enabled, set) in [
        (filter.is_favorited, MembershipSet::Favorites),
        (filter.is_in_shopping_cart, MembershipSet::ShoppingList),
    ] {
        if enabled {
            query
                .push(format!(
                    " AND EXISTS (SELECT 1 FROM {} m WHERE m.recipe_id = r.id AND m.user_id = ",
                    set.table()
                ))
                .push_bind(viewer_id)
                .push(")");
        }
    }
}

pub async fn list_recipes(
    viewer: Option<&SessionData>,
    filter: &RecipeFilter,
    pool: &Pool<Postgres>,
) -> Result<PageContext<RecipeView>, potion::Error> {
    let viewer_id = viewer.map(|s| s.user_id);
    if viewer_id.is_none() && (filter.is_favorited || filter.is_in_shopping_cart) {
        return Ok(PageContext::no_rows());
    }

    let mut query = QueryBuilder::<Postgres>::new(format!(
        "SELECT {RECIPE_COLUMNS}, COUNT(*) OVER() AS count FROM recipes r WHERE TRUE"
    ));
    push_filters(&mut query, filter, viewer_id);

    query
        .push(" ORDER BY r.pub_date DESC, r.id DESC LIMIT ")
        .push_bind(filter.page.limit)
        .push(" OFFSET ")
        .push_bind(filter.page.offset);

    let mut tx = begin_snapshot(pool).await?;

    let rows: Vec<RecipeRowCounted> = query
        .build_query_as()
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    let total_count = match rows.first() {
        Some(row) => row.count,
        // Past the last page the window count has no row to ride on.
        None if filter.page.offset > 0 => {
            let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM recipes r WHERE TRUE");
            push_filters(&mut count, filter, viewer_id);

            let total: (i64,) = count
                .build_query_as()
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| QueryError::from(e).into())?;
            total.0
        }
        None => 0,
    };
    let rows = rows.into_iter().map(|row| row.recipe).collect();
    let views = load_views(viewer_id, rows, &mut tx).await?;

    tx.commit().await.map_err(|e| QueryError::from(e).into())?;

    Ok(PageContext::from_rows(views, total_count, filter.page))
}

/// Checks every tag and ingredient id of the draft with one query each.
async fn resolve_catalog(draft: &RecipeDraft, pool: &Pool<Postgres>) -> Result<(), potion::Error> {
    let mut conn = pool.acquire().await.map_err(|e| QueryError::from(e).into())?;

    let found = existing_tag_ids(&draft.tags, &mut conn).await?;
    ensure_known("tags", &draft.tags, &found).map_err(|e| e.into())?;

    let requested = draft.ingredient_ids();
    let found = existing_ingredient_ids(&requested, &mut conn).await?;
    ensure_known("ingredients", &requested, &found).map_err(|e| e.into())?;

    Ok(())
}

fn recipe_violation(violation: &ConstraintViolation) -> Option<FieldError> {
    let constraint = violation.constraint.as_deref().unwrap_or("");

    match violation.kind {
        ViolationKind::Unique if constraint == "recipes_name_key" => Some(
            ErrorKind::Conflict.on("name", "A recipe with this name already exists."),
        ),
        ViolationKind::Unique => Some(ErrorKind::Conflict.on(
            "non_field_errors",
            "The recipe contains duplicate entries.",
        )),
        ViolationKind::ForeignKey if constraint.starts_with("recipe_tags") => {
            Some(ErrorKind::Validation.on("tags", "Unknown tag."))
        }
        ViolationKind::ForeignKey if constraint.starts_with("recipe_ingredients") => {
            Some(ErrorKind::Validation.on("ingredients", "Unknown ingredient."))
        }
        ViolationKind::Check => Some(ErrorKind::Validation.on(
            "non_field_errors",
            "A value is out of the allowed range.",
        )),
        _ => None,
    }
}

/// Clears and re-inserts the tag set and the ingredient list.
async fn write_associations(
    recipe_id: Id,
    draft: &RecipeDraft,
    conn: &mut PgConnection,
) -> Result<(), potion::Error> {
    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    let mut query = QueryBuilder::<Postgres>::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");
    query.push_values(&draft.tags, |mut b, tag_id| {
        b.push_bind(recipe_id).push_bind(*tag_id);
    });
    query
        .build()
        .execute(&mut *conn)
        .await
        .map_err(|e| map_write_error(e, recipe_violation))?;

    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    let mut query = QueryBuilder::<Postgres>::new(
        "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ",
    );
    query.push_values(&draft.ingredients, |mut b, item| {
        b.push_bind(recipe_id).push_bind(item.id).push_bind(item.amount);
    });
    query
        .build()
        .execute(&mut *conn)
        .await
        .map_err(|e| map_write_error(e, recipe_violation))?;

    Ok(())
}

async fn persist_new_recipe(
    author_id: Id,
    draft: &RecipeDraft,
    image: &StoredImage,
    pool: &Pool<Postgres>,
) -> Result<Id, potion::Error> {
    let mut tx = pool.begin().await.map_err(|e| QueryError::from(e).into())?;

    let recipe: (Id,) = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, text, image, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ",
    )
    .bind(author_id)
    .bind(&draft.name)
    .bind(&draft.text)
    .bind(&image.reference)
    .bind(draft.cooking_time)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| map_write_error(e, recipe_violation))?;

    write_associations(recipe.0, draft, &mut tx).await?;

    tx.commit().await.map_err(|e| QueryError::from(e).into())?;

    Ok(recipe.0)
}

/// Creates the whole aggregate from a JSON payload. Either the recipe with
/// all its tags and ingredients becomes visible or nothing does.
pub async fn create_recipe(
    session: &SessionData,
    body: &str,
    pool: &Pool<Postgres>,
    storage: &MediaStorage,
) -> Result<RecipeView, potion::Error> {
    session.authenticate(ActionType::CreateRecipes)?;

    let form = Form::from_json(body).map_err(|e| e.into())?;
    let mut draft = RecipeDraft::from_form(&form, true).map_err(|e| e.into())?;
    resolve_catalog(&draft, pool).await?;

    let Some(image) = draft.image.take() else {
        return Err(ErrorKind::Validation.on("image", "This field is required.").into());
    };
    let image = storage.store(RECIPE_IMAGE_DIR, image).await?;

    let recipe_id = match persist_new_recipe(session.user_id, &draft, &image, pool).await {
        Ok(recipe_id) => recipe_id,
        Err(e) => {
            storage.discard(&image).await;
            return Err(e);
        }
    };

    log::info!(
        "Recipe {recipe_id} created by {} with {} ingredients",
        session.username,
        draft.ingredients.len()
    );

    get_recipe_view(Some(session), recipe_id, pool).await
}

/// Returns the image reference the recipe had before the update.
async fn persist_recipe_update(
    recipe_id: Id,
    session: &SessionData,
    draft: &RecipeDraft,
    image: Option<&StoredImage>,
    pool: &Pool<Postgres>,
) -> Result<String, potion::Error> {
    let mut tx = pool.begin().await.map_err(|e| QueryError::from(e).into())?;

    let previous = get_recipe_mut(recipe_id, session, &mut tx).await?;

    sqlx::query(
        "
        UPDATE recipes
        SET name = $2, text = $3, cooking_time = $4, image = COALESCE($5, image)
        WHERE id = $1
    ",
    )
    .bind(recipe_id)
    .bind(&draft.name)
    .bind(&draft.text)
    .bind(draft.cooking_time)
    .bind(image.map(|image| image.reference.to_owned()))
    .execute(&mut *tx)
    .await
    .map_err(|e| map_write_error(e, recipe_violation))?;

    write_associations(recipe_id, draft, &mut tx).await?;

    tx.commit().await.map_err(|e| QueryError::from(e).into())?;

    Ok(previous.image)
}

/// Replaces the recipe fields, its tag set and its ingredient list in one
/// transaction. Without an `image` the stored one is kept.
pub async fn update_recipe(
    session: &SessionData,
    recipe_id: Id,
    body: &str,
    pool: &Pool<Postgres>,
    storage: &MediaStorage,
) -> Result<RecipeView, potion::Error> {
    session.authenticate(ActionType::ManageOwnRecipes)?;

    match get_recipe(recipe_id, pool).await? {
        Some(recipe) => authorize_recipe_owner(session, recipe.author_id).map_err(|e| e.into())?,
        None => {
            return Err(ErrorKind::NotFound.on("recipe", "No recipe exists with specified id").into())
        }
    }

    let form = Form::from_json(body).map_err(|e| e.into())?;
    let mut draft = RecipeDraft::from_form(&form, false).map_err(|e| e.into())?;
    resolve_catalog(&draft, pool).await?;

    let image = match draft.image.take() {
        Some(image) => Some(storage.store(RECIPE_IMAGE_DIR, image).await?),
        None => None,
    };

    let previous_image =
        match persist_recipe_update(recipe_id, session, &draft, image.as_ref(), pool).await {
            Ok(previous_image) => previous_image,
            Err(e) => {
                if let Some(image) = &image {
                    storage.discard(image).await;
                }
                return Err(e);
            }
        };

    if let Some(image) = &image {
        if image.reference != previous_image {
            release_media(RECIPE_IMAGE_DIR, &previous_image, pool, storage).await;
        }
    }

    log::info!("Recipe {recipe_id} updated by {}", session.username);

    get_recipe_view(Some(session), recipe_id, pool).await
}

/// Deletes the recipe; tags, ingredients, favorites and cart entries go
/// with it.
pub async fn delete_recipe(
    session: &SessionData,
    recipe_id: Id,
    pool: &Pool<Postgres>,
    storage: &MediaStorage,
) -> Result<(), potion::Error> {
    session.authenticate(ActionType::ManageOwnRecipes)?;

    let mut tx = pool.begin().await.map_err(|e| QueryError::from(e).into())?;

    let recipe = get_recipe_mut(recipe_id, session, &mut tx).await?;

    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(recipe_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    tx.commit().await.map_err(|e| QueryError::from(e).into())?;

    release_media(RECIPE_IMAGE_DIR, &recipe.image, pool, storage).await;

    log::info!("Recipe {recipe_id} deleted by {}", session.username);

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn recipe(id: Id, author_id: Id) -> RecipeRow {
        RecipeRow {
            id,
            author_id,
            name: format!("Recipe {id}"),
            text: String::from("Cook it."),
            image: format!("/media/recipes/images/{id}.png"),
            cooking_time: 15,
            pub_date: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    fn author(id: Id) -> (Id, UserProfile) {
        (
            id,
            UserProfile {
                id,
                email: format!("cook{id}@example.com"),
                username: format!("cook{id}"),
                first_name: String::from("Ada"),
                last_name: String::from("Cook"),
                avatar: None,
                is_subscribed: false,
            },
        )
    }

    fn tag(recipe_id: Id, id: Id, name: &str) -> RecipeTagRow {
        RecipeTagRow {
            recipe_id,
            id,
            name: name.to_string(),
            slug: name.to_lowercase(),
        }
    }

    fn ingredient(recipe_id: Id, id: Id, name: &str, amount: i32) -> RecipeIngredientRow {
        RecipeIngredientRow {
            recipe_id,
            id,
            name: name.to_string(),
            measurement_unit: String::from("g"),
            amount,
        }
    }

    #[test]
    fn relations_are_attached_to_their_recipe() {
        let views = assemble_recipes(
            vec![recipe(2, 10), recipe(1, 11)],
            HashMap::from([author(10), author(11)]),
            vec![tag(1, 3, "Breakfast"), tag(2, 4, "Dinner"), tag(1, 5, "Lunch")],
            vec![
                ingredient(2, 7, "Rice", 100),
                ingredient(1, 8, "Flour", 200),
                ingredient(1, 9, "Eggs", 2),
            ],
            &HashSet::new(),
            &HashSet::new(),
        );

        assert_eq!(views.iter().map(|v| v.id).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(views[0].author.id, 10);
        assert_eq!(
            views[1].tags.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            vec!["Breakfast", "Lunch"]
        );
        assert_eq!(
            views[1]
                .ingredients
                .iter()
                .map(|i| (i.id, i.amount))
                .collect::<Vec<_>>(),
            vec![(8, 200), (9, 2)]
        );
        assert_eq!(views[0].ingredients[0].measurement_unit, "g");
    }

    #[test]
    fn viewer_flags_come_from_membership_sets() {
        let views = assemble_recipes(
            vec![recipe(1, 10), recipe(2, 10)],
            HashMap::from([author(10)]),
            vec![],
            vec![],
            &HashSet::from([1]),
            &HashSet::from([2]),
        );

        assert!(views[0].is_favorited);
        assert!(!views[0].is_in_shopping_cart);
        assert!(!views[1].is_favorited);
        assert!(views[1].is_in_shopping_cart);
    }

    #[test]
    fn anonymous_viewer_sees_no_flags() {
        // An anonymous viewer never has membership rows to look up.
        let views = assemble_recipes(
            vec![recipe(1, 10)],
            HashMap::from([author(10)]),
            vec![],
            vec![],
            &HashSet::new(),
            &HashSet::new(),
        );

        assert!(!views[0].is_favorited);
        assert!(!views[0].is_in_shopping_cart);
        assert!(!views[0].author.is_subscribed);
    }

    #[test]
    fn recipes_without_author_are_dropped() {
        let views = assemble_recipes(
            vec![recipe(1, 99)],
            HashMap::new(),
            vec![],
            vec![],
            &HashSet::new(),
            &HashSet::new(),
        );

        assert!(views.is_empty());
    }

    fn pairs(values: &[(&str, &str)]) -> Vec<(String, String)> {
        values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn filter_reads_repeated_tags_and_flags() {
        let filter = RecipeFilter::from_query(&pairs(&[
            ("tags", "breakfast"),
            ("tags", "lunch"),
            ("author", "3"),
            ("is_favorited", "1"),
            ("is_in_shopping_cart", "0"),
            ("limit", "2"),
            ("offset", "4"),
        ]))
        .unwrap();

        assert_eq!(filter.tags, vec!["breakfast", "lunch"]);
        assert_eq!(filter.author, Some(3));
        assert!(filter.is_favorited);
        assert!(!filter.is_in_shopping_cart);
        assert_eq!(filter.page, PageRequest { offset: 4, limit: 2 });
    }

    #[test]
    fn filter_rejects_malformed_values() {
        let error = RecipeFilter::from_query(&pairs(&[("author", "me")])).unwrap_err();
        assert_eq!(error.field, "author");

        let error = RecipeFilter::from_query(&pairs(&[("is_favorited", "yes")])).unwrap_err();
        assert_eq!(error.field, "is_favorited");
    }

    #[test]
    fn author_outside_the_id_range_is_rejected() {
        let error = RecipeFilter::from_query(&pairs(&[("author", "4294967297")])).unwrap_err();

        assert_eq!(error.kind, ErrorKind::Validation);
        assert_eq!(error.field, "author");
    }

    #[test]
    fn empty_query_is_the_default_filter() {
        assert_eq!(RecipeFilter::from_query(&[]).unwrap(), RecipeFilter::default());
    }

    #[test]
    fn constraint_violations_point_at_fields() {
        let violation = |kind, constraint: &str| ConstraintViolation {
            kind,
            constraint: Some(constraint.to_string()),
        };

        let error = recipe_violation(&violation(ViolationKind::Unique, "recipes_name_key")).unwrap();
        assert_eq!((error.kind, error.field.as_str()), (ErrorKind::Conflict, "name"));

        let error = recipe_violation(&violation(
            ViolationKind::ForeignKey,
            "recipe_ingredients_ingredient_id_fkey",
        ))
        .unwrap();
        assert_eq!(error.field, "ingredients");

        let error =
            recipe_violation(&violation(ViolationKind::ForeignKey, "recipe_tags_tag_id_fkey")).unwrap();
        assert_eq!(error.field, "tags");

        assert!(recipe_violation(&violation(ViolationKind::ForeignKey, "recipes_author_id_fkey")).is_none());
    }
}
