use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, warn};

use super::error::AuthError;
use crate::auth::repo_types::{NewUser, OAuthProfile, Role, User, UserRow};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} already taken")]
    Duplicate(&'static str),

    #[error("corrupt user row: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(field) => AuthError::DuplicateIdentity(field),
            other => AuthError::Internal(anyhow!(other)),
        }
    }
}

/// Durable home of every identity. Implementations own the uniqueness rules
/// on username, email and the `(provider, external id)` pair.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Idempotent on `(profile.provider, profile.external_id)`.
    async fn find_or_create_oauth(
        &self,
        profile: &OAuthProfile,
        role: Role,
    ) -> Result<User, StoreError>;

    async fn create(&self, new_user: NewUser) -> Result<User, StoreError>;
}

/// Maps a unique-constraint violation onto the field it protects.
fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let field = match db.constraint() {
                Some("users_username_key") => "username",
                Some("users_email_key") => "email",
                Some("users_oauth_identity_key") => "oauth identity",
                _ => "identity",
            };
            return StoreError::Duplicate(field);
        }
    }
    StoreError::Database(err)
}

fn into_user(row: UserRow) -> Result<User, StoreError> {
    User::try_from(row).map_err(|e| StoreError::Corrupt(e.to_string()))
}

#[derive(Clone)]
pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn find_by_oauth(&self, provider: &str, external_id: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, password_hash, role, is_active, created_at,
                   oauth_provider, oauth_id
            FROM users
            WHERE oauth_provider = $1 AND oauth_id = $2
            "#,
        )
        .bind(provider)
        .bind(external_id)
        .fetch_optional(&self.db)
        .await?;
        row.map(into_user).transpose()
    }

    async fn insert_oauth(
        &self,
        username: &str,
        profile: &OAuthProfile,
        role: Role,
    ) -> Result<User, StoreError> {
        // A concurrent first login for the same identity lands on the conflict arm.
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (username, email, password_hash, role, oauth_provider, oauth_id)
            VALUES ($1, $2, '', $3, $4, $5)
            ON CONFLICT ON CONSTRAINT users_oauth_identity_key
            DO UPDATE SET oauth_id = EXCLUDED.oauth_id
            RETURNING id, username, email, password_hash, role, is_active, created_at,
                      oauth_provider, oauth_id
            "#,
        )
        .bind(username)
        .bind(&profile.email)
        .bind(role.as_str())
        .bind(&profile.provider)
        .bind(&profile.external_id)
        .fetch_one(&self.db)
        .await
        .map_err(classify)?;
        into_user(row)
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, password_hash, role, is_active, created_at,
                   oauth_provider, oauth_id
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        row.map(into_user).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, password_hash, role, is_active, created_at,
                   oauth_provider, oauth_id
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        row.map(into_user).transpose()
    }

    async fn find_or_create_oauth(
        &self,
        profile: &OAuthProfile,
        role: Role,
    ) -> Result<User, StoreError> {
        if let Some(user) = self
            .find_by_oauth(&profile.provider, &profile.external_id)
            .await?
        {
            return Ok(user);
        }

        let mut last = StoreError::Duplicate("username");
        for username in profile.username_candidates() {
            match self.insert_oauth(username, profile, role).await {
                Ok(user) => {
                    debug!(user_id = %user.id, provider = %profile.provider, "oauth user resolved");
                    return Ok(user);
                }
                Err(StoreError::Duplicate(field)) => {
                    // The row may have been created by a racing login in the meantime.
                    if let Some(user) = self
                        .find_by_oauth(&profile.provider, &profile.external_id)
                        .await?
                    {
                        return Ok(user);
                    }
                    warn!(field, provider = %profile.provider, "oauth user insert conflicted");
                    if field != "username" {
                        return Err(StoreError::Duplicate(field));
                    }
                    last = StoreError::Duplicate(field);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last)
    }

    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (username, email, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, email, password_hash, role, is_active, created_at,
                      oauth_provider, oauth_id
            "#,
        )
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(new_user.role.as_str())
        .fetch_one(&self.db)
        .await
        .map_err(classify)?;
        into_user(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn google(ext: &str, email: &str, name: &str) -> OAuthProfile {
        OAuthProfile {
            provider: "google".into(),
            external_id: ext.into(),
            email: email.into(),
            display_name: name.into(),
        }
    }

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password_hash: "$argon2id$stub".into(),
            role: Role::Student,
        }
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn oauth_upsert_is_idempotent(pool: PgPool) {
        let store = PgCredentialStore::new(pool);
        let profile = google("ext-1", "a@x.com", "A");
        let first = store
            .find_or_create_oauth(&profile, Role::Student)
            .await
            .unwrap();
        let second = store
            .find_or_create_oauth(&profile, Role::Student)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&store.db)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn unique_violations_name_the_clashing_field(pool: PgPool) {
        let store = PgCredentialStore::new(pool);
        store.create(new_user("ada", "a@x.com")).await.unwrap();

        let err = store.create(new_user("ada", "b@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate("username")));

        let err = store.create(new_user("bob", "a@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate("email")));
    }
}
