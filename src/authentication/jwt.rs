use chrono::Duration;
use chrono::Local;
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use potion::HtmlError;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::error::ErrorKind;
use crate::permissions::ActionType;
use crate::schema::{Id, UserRole};

/// Claims of the session token issued by the identity provider.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(id: Id, username: String, role: UserRole, lifetime: Duration) -> Self {
        let now = Local::now();
        let iat = now.timestamp();
        let exp = (now + lifetime).timestamp();

        Self {
            user_id: id,
            username,
            role,
            iat,
            exp,
        }
    }
}

/// The authenticated viewer, passed explicitly into every operation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
}

impl SessionData {
    pub fn authenticate(&self, action: ActionType) -> Result<(), potion::Error> {
        if !action.authenticate(&self) {
            return Err(ErrorKind::Forbidden
                .on("detail", "You don't have permission to perform this action.")
                .into());
        }
        Ok(())
    }
}

impl Into<SessionData> for JwtSessionData {
    fn into(self) -> SessionData {
        SessionData {
            user_id: self.user_id,
            username: self.username,
            role: self.role,
        }
    }
}

fn signing_key(secret: &str) -> Result<Hmac<Sha256>, potion::Error> {
    Hmac::new_from_slice(secret.as_bytes())
        .map_err(|_| HtmlError::InternalServerError.new("Invalid session signing key"))
}

pub fn sign_jwt_session(claims: &JwtSessionData, secret: &str) -> Result<String, potion::Error> {
    let key = signing_key(secret)?;

    claims
        .sign_with_key(&key)
        .map_err(|_| HtmlError::InternalServerError.new("Failed to sign session"))
}

pub fn verify_jwt_session(token: &str, secret: &str) -> Result<JwtSessionData, potion::Error> {
    let key = signing_key(secret)?;

    let session: JwtSessionData = token
        .verify_with_key(&key)
        .map_err(|_| HtmlError::InvalidSession.new("Invalid Session; Invalid token"))?;

    let now = Local::now().timestamp();
    if (session.exp - now).is_negative() {
        return Err(HtmlError::InvalidSession.new("Invalid session; Token expired"));
    }

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_sessions_verify_with_the_same_secret() {
        let claims = JwtSessionData::new(4, String::from("cook"), UserRole::User, Duration::hours(1));
        let token = sign_jwt_session(&claims, "s3cret").ok().unwrap();

        let session: SessionData = verify_jwt_session(&token, "s3cret").ok().unwrap().into();
        assert_eq!(session.user_id, 4);
        assert_eq!(session.role, UserRole::User);

        assert!(verify_jwt_session(&token, "other").is_err());
    }

    #[test]
    fn expired_sessions_are_rejected() {
        let claims = JwtSessionData::new(4, String::from("cook"), UserRole::User, Duration::hours(-1));
        let token = sign_jwt_session(&claims, "s3cret").ok().unwrap();

        assert!(verify_jwt_session(&token, "s3cret").is_err());
    }

    #[test]
    fn missing_permissions_are_forbidden() {
        let session = SessionData {
            user_id: 4,
            username: String::from("cook"),
            role: UserRole::User,
        };

        assert!(session.authenticate(ActionType::CreateRecipes).is_ok());
        let error = session.authenticate(ActionType::ManageCatalog).err().unwrap();
        assert_eq!(error.code, 403);
    }
}
