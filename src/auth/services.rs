use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use super::{
    error::AuthError,
    password::{hash_password, verify_password},
    repo::{CredentialStore, StoreError},
    repo_types::{NewUser, OAuthProfile, Role, User},
};
use crate::config::BootstrapAdmin;

pub const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validated input for a password-based account.
#[derive(Debug)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// Anyone may register a student; other roles need an admin caller.
pub fn check_registration_role(requested: Role, caller: Option<&User>) -> Result<(), AuthError> {
    if requested == Role::Student {
        return Ok(());
    }
    match caller {
        Some(u) if u.role == Role::Admin => Ok(()),
        _ => Err(AuthError::Forbidden),
    }
}

pub async fn register_user(
    store: &dyn CredentialStore,
    reg: Registration,
) -> Result<User, AuthError> {
    let username = reg.username.trim().to_string();
    let email = normalize_email(&reg.email);

    if username.is_empty() {
        return Err(AuthError::BadRequest("Username must not be empty".into()));
    }
    if username.contains('@') {
        return Err(AuthError::BadRequest("Username must not contain '@'".into()));
    }
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AuthError::BadRequest("Invalid email".into()));
    }
    if reg.password.chars().count() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(AuthError::BadRequest("Password too short".into()));
    }

    let password_hash = hash_password(&reg.password)?;
    let user = store
        .create(NewUser {
            username,
            email,
            password_hash,
            role: reg.role,
        })
        .await
        .map_err(|e| {
            if let StoreError::Duplicate(field) = &e {
                warn!(field, "registration conflict");
            }
            AuthError::from(e)
        })?;

    info!(user_id = %user.id, role = %user.role, "user registered");
    Ok(user)
}

/// Username (or email) and password check. Every failure looks the same to
/// the caller.
pub async fn login(
    store: &dyn CredentialStore,
    username: &str,
    password: &str,
) -> Result<User, AuthError> {
    let username = username.trim();
    let found = if username.contains('@') {
        match store.find_by_email(&normalize_email(username)).await? {
            Some(u) => Some(u),
            None => store.find_by_username(username).await?,
        }
    } else {
        store.find_by_username(username).await?
    };
    let user = match found {
        Some(u) => u,
        None => {
            warn!("login unknown username");
            return Err(AuthError::InvalidCredentials);
        }
    };

    if !user.is_active || !user.has_password() {
        warn!(user_id = %user.id, "login for inactive or password-less account");
        return Err(AuthError::InvalidCredentials);
    }

    if !verify_password(password, &user.password_hash) {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AuthError::InvalidCredentials);
    }

    info!(user_id = %user.id, "user logged in");
    Ok(user)
}

fn claim_str(payload: &Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Pulls the identity out of a provider's userinfo payload.
pub fn extract_profile(provider: &str, payload: &Value) -> Result<OAuthProfile, AuthError> {
    let external_id = claim_str(payload, "sub")
        .or_else(|| claim_str(payload, "id"))
        .ok_or(AuthError::OAuthClaimMissing("sub"))?;
    let email = claim_str(payload, "email")
        .map(|e| normalize_email(&e))
        .ok_or(AuthError::OAuthClaimMissing("email"))?;
    let display_name = claim_str(payload, "name").unwrap_or_else(|| email.clone());

    Ok(OAuthProfile {
        provider: provider.to_string(),
        external_id,
        email,
        display_name,
    })
}

/// Resolves a completed provider login to a local, active user.
pub async fn complete_oauth_login(
    store: &dyn CredentialStore,
    default_role: Role,
    provider: &str,
    payload: &Value,
) -> Result<User, AuthError> {
    let profile = extract_profile(provider, payload)?;
    let user = store.find_or_create_oauth(&profile, default_role).await?;
    if !user.is_active {
        warn!(user_id = %user.id, provider, "oauth login for inactive user");
        return Err(AuthError::Unauthenticated);
    }
    info!(user_id = %user.id, provider, "oauth login");
    Ok(user)
}

/// Creates the configured admin account unless it already exists.
pub async fn ensure_bootstrap_admin(
    store: &dyn CredentialStore,
    admin: &BootstrapAdmin,
) -> anyhow::Result<()> {
    if store.find_by_username(admin.username.trim()).await?.is_some() {
        return Ok(());
    }
    let reg = Registration {
        username: admin.username.clone(),
        email: admin.email.clone(),
        password: admin.password.clone(),
        role: Role::Admin,
    };
    match register_user(store, reg).await {
        Ok(user) => {
            info!(user_id = %user.id, "bootstrap admin created");
            Ok(())
        }
        Err(AuthError::DuplicateIdentity(field)) => {
            warn!(field, "bootstrap admin conflicts with an existing account");
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("bootstrap admin: {e}")),
    }
}
