use redis::aio::MultiplexedConnection;
use serde::Deserialize;
use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

use crate::{
    cache::cache::{invalidate_catalog, CacheKeyType, RedisValue},
    error::{ErrorKind, FieldError, QueryError},
    jwt::SessionData,
    permissions::ActionType,
    schema::{Id, Ingredient, Tag},
};

pub async fn list_tags(pool: &Pool<Postgres>) -> Result<Vec<Tag>, potion::Error> {
    let list: Vec<Tag> = sqlx::query_as("SELECT id, name, slug FROM tags ORDER BY name")
        .fetch_all(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(list)
}

pub async fn get_tag(id: Id, pool: &Pool<Postgres>) -> Result<Option<Tag>, potion::Error> {
    let tag: Option<Tag> = sqlx::query_as("SELECT id, name, slug FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(tag)
}

/// Ingredients whose name starts with `name_prefix`, case-insensitively.
pub async fn list_ingredients(
    name_prefix: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, potion::Error> {
    let pattern = like_prefix(name_prefix.unwrap_or(""));

    let list: Vec<Ingredient> = sqlx::query_as(
        "SELECT id, name, measurement_unit FROM ingredients WHERE name ILIKE $1 ORDER BY name, measurement_unit",
    )
    .bind(pattern)
    .fetch_all(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(list)
}

pub async fn get_ingredient(
    id: Id,
    pool: &Pool<Postgres>,
) -> Result<Option<Ingredient>, potion::Error> {
    let ingredient: Option<Ingredient> =
        sqlx::query_as("SELECT id, name, measurement_unit FROM ingredients WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| QueryError::from(e).into())?;

    Ok(ingredient)
}

pub async fn cached_tags(
    pool: &Pool<Postgres>,
    cache: &mut MultiplexedConnection,
) -> Result<Vec<Tag>, potion::Error> {
    RedisValue::get_or(CacheKeyType::Tags.new("all"), cache, || list_tags(pool)).await
}

pub async fn cached_ingredients(
    name_prefix: Option<&str>,
    pool: &Pool<Postgres>,
    cache: &mut MultiplexedConnection,
) -> Result<Vec<Ingredient>, potion::Error> {
    let key = CacheKeyType::Ingredients.new(name_prefix.unwrap_or(""));

    RedisValue::get_or(key, cache, || list_ingredients(name_prefix, pool)).await
}

/// Subset of `ids` that exists in `tags`, one query for the whole list.
pub(crate) async fn existing_tag_ids(
    ids: &[Id],
    conn: &mut PgConnection,
) -> Result<Vec<Id>, potion::Error> {
    let rows: Vec<(Id,)> = sqlx::query_as("SELECT id FROM tags WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(rows.into_iter().map(|row| row.0).collect())
}

pub(crate) async fn existing_ingredient_ids(
    ids: &[Id],
    conn: &mut PgConnection,
) -> Result<Vec<Id>, potion::Error> {
    let rows: Vec<(Id,)> = sqlx::query_as("SELECT id FROM ingredients WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(rows.into_iter().map(|row| row.0).collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewIngredient {
    pub name: String,
    pub measurement_unit: String,
}

/// Parses a catalog dump of `[{"name", "measurement_unit"}]`.
pub fn parse_ingredient_import(data: &str) -> Result<Vec<NewIngredient>, FieldError> {
    let rows: Vec<NewIngredient> = serde_json::from_str(data).map_err(|e| {
        ErrorKind::Validation.on("non_field_errors", &format!("Invalid ingredient data: {e}"))
    })?;

    rows.into_iter()
        .map(|row| {
            let name = capitalize(row.name.trim());
            let measurement_unit = row.measurement_unit.trim().to_string();
            if name.is_empty() || measurement_unit.is_empty() {
                return Err(ErrorKind::Validation.on(
                    "non_field_errors",
                    "Ingredient name and measurement unit are required.",
                ));
            }

            Ok(NewIngredient {
                name,
                measurement_unit,
            })
        })
        .collect()
}

/// Loads a catalog dump in one transaction. Known (name, unit) pairs are
/// skipped; returns how many rows were inserted.
pub async fn import_ingredients(
    session: &SessionData,
    data: &str,
    pool: &Pool<Postgres>,
    cache: &mut MultiplexedConnection,
) -> Result<u64, potion::Error> {
    session.authenticate(ActionType::ManageCatalog)?;
    let rows = parse_ingredient_import(data).map_err(|e| e.into())?;
    if rows.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await.map_err(|e| QueryError::from(e).into())?;

    let mut inserted = 0;
    // Stay well below the bind parameter limit per statement.
    for chunk in rows.chunks(1000) {
        let mut query = QueryBuilder::<Postgres>::new("INSERT INTO ingredients (name, measurement_unit) ");
        query.push_values(chunk, |mut b, row| {
            b.push_bind(&row.name).push_bind(&row.measurement_unit);
        });
        query.push(" ON CONFLICT DO NOTHING");

        inserted += query
            .build()
            .execute(&mut *tx)
            .await
            .map_err(|e| QueryError::from(e).into())?
            .rows_affected();
    }

    tx.commit().await.map_err(|e| QueryError::from(e).into())?;

    invalidate_catalog(cache).await?;
    log::info!("Imported {inserted} ingredients ({} submitted)", rows.len());

    Ok(inserted)
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn like_prefix(prefix: &str) -> String {
    let escaped = prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");

    format!("{escaped}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_capitalizes_names_like_the_catalog() {
        let rows = parse_ingredient_import(
            r#"[{"name": "абрикосовое ПЮРЕ", "measurement_unit": "г"}, {"name": " flour", "measurement_unit": "g "}]"#,
        )
        .unwrap();

        assert_eq!(
            rows,
            vec![
                NewIngredient {
                    name: String::from("Абрикосовое пюре"),
                    measurement_unit: String::from("г"),
                },
                NewIngredient {
                    name: String::from("Flour"),
                    measurement_unit: String::from("g"),
                },
            ]
        );
    }

    #[test]
    fn import_rejects_blank_rows_and_bad_json() {
        assert!(parse_ingredient_import(r#"[{"name": "", "measurement_unit": "g"}]"#).is_err());
        assert!(parse_ingredient_import(r#"{"name": "salt"}"#).is_err());
    }

    #[test]
    fn prefix_search_escapes_wildcards() {
        assert_eq!(like_prefix("fl"), "fl%");
        assert_eq!(like_prefix("50%_"), "50\\%\\_%");
        assert_eq!(like_prefix(""), "%");
    }
}
