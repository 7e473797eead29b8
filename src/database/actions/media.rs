use sqlx::{Pool, Postgres};

use crate::image::MediaStorage;

/// Removes a stored file once nothing points at it any more. Only files kept
/// under `dir` are touched; a recipe image is never removed through an
/// avatar and the other way around.
pub(crate) async fn release_media(
    dir: &str,
    reference: &str,
    pool: &Pool<Postgres>,
    storage: &MediaStorage,
) {
    if !storage.stored_under(dir, reference) {
        log::trace!("> Keeping {reference}, not stored under {dir}");
        return;
    }

    let in_use: Result<(bool,), sqlx::Error> = sqlx::query_as(
        "
        SELECT EXISTS (SELECT 1 FROM recipes WHERE image = $1)
            OR EXISTS (SELECT 1 FROM users WHERE avatar = $1)
    ",
    )
    .bind(reference)
    .fetch_one(pool)
    .await;

    match in_use {
        Ok((false,)) => {
            if let Err(e) = storage.remove(reference).await {
                log::warn!("Failed to remove image {reference}: {:?}", e.info);
            }
        }
        Ok((true,)) => log::trace!("> Image {reference} is still referenced"),
        Err(e) => log::warn!("Skipped removing image {reference}: {e}"),
    }
}
