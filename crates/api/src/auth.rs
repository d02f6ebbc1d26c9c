//! Caller identity, as asserted by the upstream gateway.
//!
//! The gateway authenticates the caller and forwards `x-user-id` (and
//! `x-user-role: admin` for administrators). Requests without the id header
//! are guests.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use store::UserId;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
const ADMIN_ROLE: &str = "admin";

fn user_id(parts: &Parts) -> Result<Option<UserId>, ApiError> {
    let Some(value) = parts.headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.parse::<UserId>().ok())
        .map(Some)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid {USER_ID_HEADER} header")))
}

fn is_admin(parts: &Parts) -> bool {
    parts
        .headers
        .get(USER_ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|role| role.trim().eq_ignore_ascii_case(ADMIN_ROLE))
}

/// The caller, if any. Never rejects a request without identity.
#[derive(Debug, Clone, Copy)]
pub struct Viewer(pub Option<UserId>);

impl<S: Send + Sync> FromRequestParts<S> for Viewer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Viewer(user_id(parts)?))
    }
}

/// An authenticated caller. Rejects guests with 401.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        user_id(parts)?.map(AuthUser).ok_or(ApiError::Unauthenticated)
    }
}

/// An authenticated administrator. Rejects guests with 401 and other users with 403.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = user_id(parts)?.ok_or(ApiError::Unauthenticated)?;
        if !is_admin(parts) {
            tracing::warn!(user_id = %user, "admin route refused");
            return Err(ApiError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_guest_viewer() {
        let Viewer(viewer) = Viewer::from_request_parts(&mut parts(&[]), &()).await.unwrap();
        assert_eq!(viewer, None);
    }

    #[tokio::test]
    async fn test_user_id_is_parsed() {
        let AuthUser(user) = AuthUser::from_request_parts(&mut parts(&[("x-user-id", " 42 ")]), &())
            .await
            .unwrap();
        assert_eq!(user, UserId::new(42));
    }

    #[tokio::test]
    async fn test_malformed_id_is_bad_request() {
        let err = Viewer::from_request_parts(&mut parts(&[("x-user-id", "abc")]), &())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_admin_requires_role() {
        let err = AdminUser::from_request_parts(&mut parts(&[]), &())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated));

        let err = AdminUser::from_request_parts(&mut parts(&[("x-user-id", "1")]), &())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));

        let admin = AdminUser::from_request_parts(
            &mut parts(&[("x-user-id", "1"), ("x-user-role", "Admin")]),
            &(),
        )
        .await;
        assert!(admin.is_ok());
    }
}
