use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Redirect,
    routing::{get, post},
    Form, Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{RegisterRequest, RegisterResponse, TokenForm, TokenResponse},
        error::AuthError,
        extractors::{authenticate, bearer_token, CurrentUser},
        oauth::CallbackParams,
        repo_types::{Role, User},
        services::{self, Registration},
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/token", post(token))
        .route("/login/:provider", get(oauth_login))
        .route("/auth/callback", get(oauth_callback))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/users/me", get(get_me))
}

#[instrument(skip(state, headers, payload))]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, AuthError> {
    let role = match payload.role.as_deref() {
        Some(r) => r.trim().parse::<Role>()?,
        None => Role::Student,
    };

    // Optional caller identity, only consulted for privileged roles.
    let caller = match bearer_token(&headers) {
        Some(token) if role != Role::Student => {
            Some(authenticate(&state.keys, state.credentials.as_ref(), token).await?)
        }
        _ => None,
    };
    services::check_registration_role(role, caller.as_ref())?;

    let user = services::register_user(
        state.credentials.as_ref(),
        Registration {
            username: payload.username,
            email: payload.email,
            password: payload.password,
            role,
        },
    )
    .await?;

    Ok(Json(RegisterResponse {
        message: "User registered successfully".into(),
        user_id: user.id,
    }))
}

#[instrument(skip(state, form))]
pub async fn token(
    State(state): State<AppState>,
    Form(form): Form<TokenForm>,
) -> Result<Json<TokenResponse>, AuthError> {
    let user = services::login(state.credentials.as_ref(), &form.username, &form.password).await?;
    let access_token = state.keys.issue_access(&user.username)?;
    Ok(Json(TokenResponse::bearer(access_token)))
}

#[instrument(skip(state))]
pub async fn oauth_login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Redirect, AuthError> {
    let url = state.oauth.begin(&provider).await?;
    Ok(Redirect::temporary(&url))
}

#[instrument(skip(state, params))]
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<TokenResponse>, AuthError> {
    let (provider, payload) = state.oauth.complete(&params).await?;
    let user = services::complete_oauth_login(
        state.credentials.as_ref(),
        state.config.oauth_default_role,
        &provider,
        &payload,
    )
    .await?;
    let access_token = state.keys.issue_access(&user.username)?;
    info!(user_id = %user.id, provider = %provider, "oauth token issued");
    Ok(Json(TokenResponse::bearer(access_token)))
}

#[instrument(skip_all)]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}
