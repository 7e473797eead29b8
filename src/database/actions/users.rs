use std::collections::HashMap;

use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    constants::AVATAR_IMAGE_DIR,
    error::{ErrorKind, FieldError, QueryError},
    form::Form,
    image::{ImageSource, MediaStorage},
    jwt::SessionData,
    permissions::ActionType,
    schema::{Id, User, UserProfile},
};

use super::media::release_media;

pub async fn get_user_by_id(user_id: Id, pool: &Pool<Postgres>) -> Result<Option<User>, potion::Error> {
    let row: Option<User> = sqlx::query_as(
        "SELECT id, email, username, first_name, last_name, role, avatar FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(row)
}

/// Profiles of `user_ids` as seen by `viewer`, keyed by id.
pub(crate) async fn profiles_for(
    viewer: Option<Id>,
    user_ids: &[Id],
    conn: &mut PgConnection,
) -> Result<HashMap<Id, UserProfile>, potion::Error> {
    let rows: Vec<UserProfile> = sqlx::query_as(
        "
        SELECT u.id, u.email, u.username, u.first_name, u.last_name, u.avatar,
            EXISTS (
                SELECT 1 FROM subscriptions s WHERE s.user_id = $2 AND s.author_id = u.id
            ) AS is_subscribed
        FROM users u
        WHERE u.id = ANY($1)
    ",
    )
    .bind(user_ids)
    .bind(viewer)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(rows.into_iter().map(|profile| (profile.id, profile)).collect())
}

pub async fn get_profile(
    viewer: Option<&SessionData>,
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<UserProfile, potion::Error> {
    let mut conn = pool.acquire().await.map_err(|e| QueryError::from(e).into())?;

    profiles_for(viewer.map(|s| s.user_id), &[user_id], &mut conn)
        .await?
        .remove(&user_id)
        .ok_or_else(|| ErrorKind::NotFound.on("user", "No user exists with specified id").into())
}

/// Avatars are uploads or external URLs; files already kept in the media
/// storage belong to somebody else.
pub fn parse_avatar(raw: &str, storage: &MediaStorage) -> Result<ImageSource, FieldError> {
    match ImageSource::parse("avatar", raw)? {
        ImageSource::Reference(reference) if storage.is_local(&reference) => Err(
            ErrorKind::Validation.on("avatar", "Upload the image instead of referencing stored media."),
        ),
        image => Ok(image),
    }
}

/// Replaces the session user's avatar with the `avatar` field of `body`.
pub async fn set_avatar(
    session: &SessionData,
    body: &str,
    pool: &Pool<Postgres>,
    storage: &MediaStorage,
) -> Result<String, potion::Error> {
    session.authenticate(ActionType::ManageOwnProfile)?;

    let form = Form::from_json(body).map_err(|e| e.into())?;
    let raw = form.get_str("avatar").map_err(|e| e.into())?;
    let image = parse_avatar(&raw, storage).map_err(|e| e.into())?;

    let stored = storage.store(AVATAR_IMAGE_DIR, image).await?;

    let previous: Option<(Option<String>,)> = match sqlx::query_as(
        "
        UPDATE users u SET avatar = $1
        FROM users old
        WHERE u.id = old.id AND u.id = $2
        RETURNING old.avatar
    ",
    )
    .bind(&stored.reference)
    .bind(session.user_id)
    .fetch_optional(pool)
    .await
    {
        Ok(previous) => previous,
        Err(e) => {
            storage.discard(&stored).await;
            return Err(QueryError::from(e).into());
        }
    };

    let Some((previous,)) = previous else {
        storage.discard(&stored).await;
        return Err(ErrorKind::NotFound.on("user", "No user exists with specified id").into());
    };

    if let Some(previous) = previous.filter(|previous| previous != &stored.reference) {
        release_media(AVATAR_IMAGE_DIR, &previous, pool, storage).await;
    }

    Ok(stored.reference)
}

pub async fn delete_avatar(
    session: &SessionData,
    pool: &Pool<Postgres>,
    storage: &MediaStorage,
) -> Result<(), potion::Error> {
    session.authenticate(ActionType::ManageOwnProfile)?;

    let previous: Option<(Option<String>,)> = sqlx::query_as(
        "
        UPDATE users u SET avatar = NULL
        FROM users old
        WHERE u.id = old.id AND u.id = $1
        RETURNING old.avatar
    ",
    )
    .bind(session.user_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    match previous {
        Some((Some(previous),)) => {
            release_media(AVATAR_IMAGE_DIR, &previous, pool, storage).await;
            Ok(())
        }
        Some((None,)) => Ok(()),
        None => Err(ErrorKind::NotFound.on("user", "No user exists with specified id").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avatars_cannot_point_at_stored_media() {
        let storage = MediaStorage::new("/srv/media", "/media/");

        for raw in ["/media/recipes/images/a.png", "/media/users/b.png"] {
            let error = parse_avatar(raw, &storage).unwrap_err();
            assert_eq!(error.kind, ErrorKind::Validation);
            assert_eq!(error.field, "avatar");
        }
    }

    #[test]
    fn avatars_accept_uploads_and_external_urls() {
        let storage = MediaStorage::new("/srv/media", "/media/");

        assert_eq!(
            parse_avatar("https://cdn.example.com/me.png", &storage),
            Ok(ImageSource::Reference(String::from("https://cdn.example.com/me.png")))
        );
        assert!(matches!(
            parse_avatar("data:image/png;base64,AAAA", &storage),
            Ok(ImageSource::Upload { .. })
        ));
    }
}
