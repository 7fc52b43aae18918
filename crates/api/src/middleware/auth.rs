//! Request extractors for the caller's identity.
//!
//! [`AuthUser`] accepts any valid bearer token; [`RequireAdmin`] further
//! demands the `admin` role. Both reject before the handler body runs.

use atelier_core::error::CoreError;
use atelier_core::roles::ROLE_ADMIN;
use atelier_core::types::DbId;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::error::AppError;
use crate::state::AppState;

fn unauthorized(message: &str) -> AppError {
    AppError::Core(CoreError::Unauthorized(message.to_string()))
}

/// The token from an `Authorization: Bearer <token>` header. The scheme is
/// matched case-insensitively.
fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| unauthorized("Malformed Authorization header"))?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(unauthorized("Expected a Bearer token")),
    }
}

/// Caller identity taken from a verified access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: DbId,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    /// Owners and admins pass; anyone else gets 403 naming `what`.
    pub fn ensure_can_access(&self, owner_id: DbId, what: &str) -> Result<(), AppError> {
        if owner_id == self.user_id || self.is_admin() {
            return Ok(());
        }
        tracing::debug!(user_id = self.user_id, owner_id, what, "Cross-user access denied");
        Err(AppError::Core(CoreError::Forbidden(format!(
            "Cannot access another user's {what}"
        ))))
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        let claims = state
            .tokens
            .verify(token)
            .map_err(|_| unauthorized("Invalid or expired token"))?;
        Ok(AuthUser {
            user_id: claims.sub,
            role: claims.role,
        })
    }
}

/// An [`AuthUser`] holding the `admin` role.
pub struct RequireAdmin(pub AuthUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            tracing::info!(user_id = user.user_id, path = %parts.uri.path(), "Admin route refused");
            return Err(AppError::Core(CoreError::Forbidden("Admin role required".into())));
        }
        Ok(RequireAdmin(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert_eq!(bearer_token(&headers("Bearer abc")).unwrap(), "abc");
        assert_eq!(bearer_token(&headers("bearer abc")).unwrap(), "abc");
    }

    #[test]
    fn other_schemes_and_empty_tokens_are_rejected() {
        assert_matches!(
            bearer_token(&headers("Basic dXNlcjpwYXNz")),
            Err(AppError::Core(CoreError::Unauthorized(_)))
        );
        assert!(bearer_token(&headers("Bearer  ")).is_err());
        assert!(bearer_token(&HeaderMap::new()).is_err());
    }

    #[test]
    fn owners_and_admins_may_access() {
        let user = AuthUser {
            user_id: 1,
            role: "user".into(),
        };
        let admin = AuthUser {
            user_id: 2,
            role: ROLE_ADMIN.into(),
        };
        assert!(user.ensure_can_access(1, "job").is_ok());
        assert!(admin.ensure_can_access(1, "job").is_ok());
        assert_matches!(
            user.ensure_can_access(2, "image"),
            Err(AppError::Core(CoreError::Forbidden(msg))) if msg == "Cannot access another user's image"
        );
    }
}
