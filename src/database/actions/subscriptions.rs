use std::collections::HashMap;

use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    constants::SUBSCRIPTION_COUNT_PER_PAGE,
    error::{map_write_error, ErrorKind, FieldError, QueryError, ViolationKind},
    form::as_integer,
    jwt::SessionData,
    pagination::{PageContext, PageRequest},
    permissions::ActionType,
    schema::{AuthorRecipeSample, Id, RecipeMinified, SubscribedAuthorRow, SubscriptionCard, UserProfile},
};

use super::users::get_user_by_id;

/// `None` keeps every recipe in the sample.
pub fn parse_recipes_limit(raw: Option<&str>) -> Result<Option<i64>, FieldError> {
    let Some(raw) = raw else {
        return Ok(None);
    };

    match as_integer(&serde_json::Value::String(raw.to_owned())) {
        Some(limit) if limit >= 0 => Ok(Some(limit)),
        _ => Err(ErrorKind::Validation.on(
            "recipes_limit",
            "Ensure this value is a non-negative integer.",
        )),
    }
}

pub fn subscription_page(offset: Option<i64>, limit: Option<i64>) -> PageRequest {
    PageRequest::new(offset, limit, SUBSCRIPTION_COUNT_PER_PAGE)
}

/// Pairs every followed author with their recipe sample. Samples arrive
/// newest first per author; authors keep their input order.
pub fn group_cards(
    authors: Vec<SubscribedAuthorRow>,
    samples: Vec<AuthorRecipeSample>,
) -> Vec<SubscriptionCard> {
    let mut samples_by_author: HashMap<Id, Vec<RecipeMinified>> = HashMap::new();
    for sample in samples {
        samples_by_author
            .entry(sample.author_id)
            .or_default()
            .push(sample.into());
    }

    authors
        .into_iter()
        .map(|author| SubscriptionCard {
            recipes: samples_by_author.remove(&author.id).unwrap_or_default(),
            recipes_count: author.recipes_count,
            author: UserProfile {
                id: author.id,
                email: author.email,
                username: author.username,
                first_name: author.first_name,
                last_name: author.last_name,
                avatar: author.avatar,
                is_subscribed: true,
            },
        })
        .collect()
}

async fn recipe_samples(
    author_ids: &[Id],
    recipes_limit: Option<i64>,
    conn: &mut PgConnection,
) -> Result<Vec<AuthorRecipeSample>, potion::Error> {
    if author_ids.is_empty() {
        return Ok(vec![]);
    }

    let rows: Vec<AuthorRecipeSample> = sqlx::query_as(
        "
        SELECT author_id, id, name, image, cooking_time
        FROM (
            SELECT r.author_id, r.id, r.name, r.image, r.cooking_time,
                ROW_NUMBER() OVER (PARTITION BY r.author_id ORDER BY r.pub_date DESC, r.id DESC) AS position
            FROM recipes r
            WHERE r.author_id = ANY($1)
        ) sample
        WHERE $2::BIGINT IS NULL OR position <= $2
        ORDER BY author_id, position
    ",
    )
    .bind(author_ids)
    .bind(recipes_limit)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(rows)
}

async fn subscription_card(
    author_id: Id,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<SubscriptionCard, potion::Error> {
    let mut conn = pool.acquire().await.map_err(|e| QueryError::from(e).into())?;

    let author: Option<SubscribedAuthorRow> = sqlx::query_as(
        "
        SELECT u.id, u.email, u.username, u.first_name, u.last_name, u.avatar,
            (SELECT COUNT(*) FROM recipes r WHERE r.author_id = u.id) AS recipes_count,
            1::BIGINT AS count
        FROM users u
        WHERE u.id = $1
    ",
    )
    .bind(author_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    let Some(author) = author else {
        return Err(ErrorKind::NotFound.on("user", "No user exists with specified id").into());
    };

    let samples = recipe_samples(&[author_id], recipes_limit, &mut conn).await?;

    group_cards(vec![author], samples)
        .pop()
        .ok_or_else(|| ErrorKind::NotFound.on("user", "No user exists with specified id").into())
}

/// Adds the directed edge session user -> `author_id`.
pub async fn subscribe(
    session: &SessionData,
    author_id: Id,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<SubscriptionCard, potion::Error> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;

    if author_id == session.user_id {
        return Err(ErrorKind::Conflict.on("author", "You cannot subscribe to yourself.").into());
    }

    let result = sqlx::query(
        "INSERT INTO subscriptions (user_id, author_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(session.user_id)
    .bind(author_id)
    .execute(pool)
    .await
    .map_err(|e| {
        map_write_error(e, |violation| match violation.kind {
            ViolationKind::ForeignKey => {
                Some(ErrorKind::NotFound.on("user", "No user exists with specified id"))
            }
            ViolationKind::Check => {
                Some(ErrorKind::Conflict.on("author", "You cannot subscribe to yourself."))
            }
            _ => None,
        })
    })?;

    if result.rows_affected() == 0 {
        return Err(ErrorKind::Conflict.on("author", "You are already subscribed to this user.").into());
    }

    log::debug!("{} subscribed to {author_id}", session.username);

    subscription_card(author_id, recipes_limit, pool).await
}

pub async fn unsubscribe(
    session: &SessionData,
    author_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), potion::Error> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;

    let result = sqlx::query("DELETE FROM subscriptions WHERE user_id = $1 AND author_id = $2")
        .bind(session.user_id)
        .bind(author_id)
        .execute(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    if result.rows_affected() > 0 {
        return Ok(());
    }

    if get_user_by_id(author_id, pool).await?.is_none() {
        return Err(ErrorKind::NotFound.on("user", "No user exists with specified id").into());
    }

    Err(ErrorKind::Validation.on("author", "You are not subscribed to this user.").into())
}

pub async fn is_subscribed(
    viewer: Option<&SessionData>,
    author_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, potion::Error> {
    let Some(viewer) = viewer else {
        return Ok(false);
    };

    let row: Option<(Id,)> =
        sqlx::query_as("SELECT author_id FROM subscriptions WHERE user_id = $1 AND author_id = $2")
            .bind(viewer.user_id)
            .bind(author_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| QueryError::from(e).into())?;

    Ok(row.is_some())
}

/// Authors the session user follows, each with a recipe count and a
/// newest-first sample of at most `recipes_limit` recipes.
pub async fn list_subscriptions(
    session: &SessionData,
    recipes_limit: Option<i64>,
    page: PageRequest,
    pool: &Pool<Postgres>,
) -> Result<PageContext<SubscriptionCard>, potion::Error> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;

    let mut conn = pool.acquire().await.map_err(|e| QueryError::from(e).into())?;

    let authors: Vec<SubscribedAuthorRow> = sqlx::query_as(
        "
        SELECT u.id, u.email, u.username, u.first_name, u.last_name, u.avatar,
            (SELECT COUNT(*) FROM recipes r WHERE r.author_id = u.id) AS recipes_count,
            COUNT(*) OVER() AS count
        FROM subscriptions s
        INNER JOIN users u ON u.id = s.author_id
        WHERE s.user_id = $1
        ORDER BY u.username, u.id
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(session.user_id)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    let total_count = match authors.first() {
        Some(row) => row.count,
        None if page.offset > 0 => {
            let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM subscriptions WHERE user_id = $1")
                .bind(session.user_id)
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| QueryError::from(e).into())?;
            total.0
        }
        None => 0,
    };
    let author_ids: Vec<Id> = authors.iter().map(|row| row.id).collect();
    let samples = recipe_samples(&author_ids, recipes_limit, &mut conn).await?;

    Ok(PageContext::from_rows(
        group_cards(authors, samples),
        total_count,
        page,
    ))
}
