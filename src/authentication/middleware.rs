use std::sync::Arc;

use warp::{
    reject::{self, Rejection},
    Filter,
};

use crate::constants::SESSION_COOKIE;

use super::jwt::{verify_jwt_session, SessionData};

#[derive(Debug)]
pub struct Unauthorized;

impl reject::Reject for Unauthorized {}

fn bearer(header: Option<String>) -> Option<String> {
    header.and_then(|value| {
        value
            .strip_prefix("Bearer ")
            .map(|token| token.trim().to_string())
    })
}

/// Viewer identity from the `session` cookie or an `Authorization: Bearer`
/// header. Anything missing or invalid is an anonymous viewer.
pub fn with_possible_session(
    secret: Arc<str>,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Rejection> + Clone {
    warp::cookie::optional::<String>(SESSION_COOKIE)
        .and(warp::header::optional::<String>("authorization"))
        .map(move |cookie: Option<String>, authorization: Option<String>| -> Option<SessionData> {
            let token = cookie.or_else(|| bearer(authorization))?;

            verify_jwt_session(&token, &secret)
                .map(|data| data.into())
                .ok()
        })
}

pub fn with_session(
    secret: Arc<str>,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    with_possible_session(secret).and_then(|session: Option<SessionData>| async move {
        session.ok_or_else(|| warp::reject::custom(Unauthorized))
    })
}
