use std::marker::PhantomData;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::{debug, warn};

use super::{
    error::AuthError,
    jwt::JwtKeys,
    repo::CredentialStore,
    repo_types::{Role, User},
};
use crate::state::AppState;

/// Token from an `Authorization: Bearer <token>` header, if well-formed.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = auth
        .strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

/// A valid token is necessary but not sufficient: the subject must still
/// exist and be active.
pub async fn authenticate(
    keys: &JwtKeys,
    store: &dyn CredentialStore,
    token: &str,
) -> Result<User, AuthError> {
    let claims = keys.verify(token).map_err(|e| {
        debug!(error = %e, "bearer token rejected");
        e
    })?;

    let user = store
        .find_by_username(&claims.sub)
        .await?
        .ok_or(AuthError::Unauthenticated)?;

    if !user.is_active {
        warn!(user_id = %user.id, "inactive user presented a valid token");
        return Err(AuthError::Unauthenticated);
    }
    Ok(user)
}

pub fn require_role(user: User, allowed: &[Role]) -> Result<User, AuthError> {
    if allowed.contains(&user.role) {
        Ok(user)
    } else {
        warn!(user_id = %user.id, role = %user.role, ?allowed, "role not allowed");
        Err(AuthError::Forbidden)
    }
}

/// The authenticated caller.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AuthError::MissingToken)?;
        let user = authenticate(&state.keys, state.credentials.as_ref(), token).await?;
        Ok(CurrentUser(user))
    }
}

/// Roles a route accepts.
pub trait RolePolicy: Send + Sync + 'static {
    const ALLOWED: &'static [Role];
}

pub struct AdminOnly;

impl RolePolicy for AdminOnly {
    const ALLOWED: &'static [Role] = &[Role::Admin];
}

/// Admins and teachers.
pub struct Staff;

impl RolePolicy for Staff {
    const ALLOWED: &'static [Role] = &[Role::Admin, Role::Teacher];
}

/// The authenticated caller, already checked against `P::ALLOWED`.
pub struct RequireRole<P: RolePolicy>(pub User, pub PhantomData<P>);

#[async_trait]
impl<P: RolePolicy> FromRequestParts<AppState> for RequireRole<P> {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        Ok(RequireRole(require_role(user, P::ALLOWED)?, PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        memory::MemoryCredentialStore,
        repo_types::NewUser,
    };
    use crate::config::{JwtConfig, ACCESS_TOKEN_TTL_MINUTES};
    use axum::http::HeaderValue;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn keys() -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: "guard-secret".into(),
            issuer: "iss".into(),
            audience: "aud".into(),
            ttl_minutes: ACCESS_TOKEN_TTL_MINUTES,
        })
    }

    fn user_with_role(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            username: "u".into(),
            email: "u@x.com".into(),
            password_hash: String::new(),
            role,
            is_active: true,
            created_at: OffsetDateTime::now_utc(),
            oauth_provider: None,
            oauth_id: None,
        }
    }

    async fn store_with(username: &str) -> MemoryCredentialStore {
        let store = MemoryCredentialStore::new();
        store
            .create(NewUser {
                username: username.into(),
                email: format!("{username}@x.com"),
                password_hash: "$argon2id$stub".into(),
                role: Role::Student,
            })
            .await
            .unwrap();
        store
    }

    #[test]
    fn require_role_has_no_implicit_hierarchy() {
        assert!(matches!(
            require_role(user_with_role(Role::Teacher), &[Role::Admin]),
            Err(AuthError::Forbidden)
        ));
        assert!(require_role(user_with_role(Role::Admin), &[Role::Admin, Role::Teacher]).is_ok());
        assert!(matches!(
            require_role(user_with_role(Role::Admin), &[Role::Student]),
            Err(AuthError::Forbidden)
        ));
        assert!(matches!(
            require_role(user_with_role(Role::Student), Staff::ALLOWED),
            Err(AuthError::Forbidden)
        ));
    }

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn authenticate_resolves_active_user() {
        let store = store_with("ada").await;
        let keys = keys();
        let token = keys.issue_access("ada").unwrap();
        let user = authenticate(&keys, &store, &token).await.unwrap();
        assert_eq!(user.username, "ada");
    }

    #[tokio::test]
    async fn authenticate_rejects_inactive_user_with_valid_token() {
        let store = store_with("ada").await;
        let keys = keys();
        let token = keys.issue_access("ada").unwrap();
        store.set_active("ada", false).await;
        assert!(matches!(
            authenticate(&keys, &store, &token).await,
            Err(AuthError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn authenticate_rejects_unknown_subject() {
        let store = store_with("ada").await;
        let keys = keys();
        let token = keys.issue_access("ghost").unwrap();
        assert!(matches!(
            authenticate(&keys, &store, &token).await,
            Err(AuthError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn authenticate_passes_token_errors_through() {
        let store = store_with("ada").await;
        let keys = keys();
        let token = keys.issue("ada", time::Duration::seconds(-1)).unwrap();
        assert!(matches!(
            authenticate(&keys, &store, &token).await,
            Err(AuthError::Expired)
        ));
    }
}
