use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::repo::{CredentialStore, StoreError};
use super::repo_types::{NewUser, OAuthProfile, Role, User};

/// Process-local credential store. Every check-then-insert runs under one
/// lock, which gives it the same uniqueness guarantees as the Postgres schema.
#[derive(Default)]
pub struct MemoryCredentialStore {
    users: Mutex<Vec<User>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.users.lock().await.len()
    }

    /// Flips `is_active`; returns false when no such user exists.
    #[cfg(test)]
    pub async fn set_active(&self, username: &str, active: bool) -> bool {
        let mut users = self.users.lock().await;
        match users.iter_mut().find(|u| u.username == username) {
            Some(u) => {
                u.is_active = active;
                true
            }
            None => false,
        }
    }
}

fn conflict(users: &[User], username: &str, email: &str) -> Option<&'static str> {
    if users.iter().any(|u| u.username == username) {
        Some("username")
    } else if users.iter().any(|u| u.email == email) {
        Some("email")
    } else {
        None
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().await;
        Ok(users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().await;
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_or_create_oauth(
        &self,
        profile: &OAuthProfile,
        role: Role,
    ) -> Result<User, StoreError> {
        let mut users = self.users.lock().await;
        if let Some(existing) = users.iter().find(|u| {
            u.oauth_provider.as_deref() == Some(profile.provider.as_str())
                && u.oauth_id.as_deref() == Some(profile.external_id.as_str())
        }) {
            return Ok(existing.clone());
        }

        if users.iter().any(|u| u.email == profile.email) {
            return Err(StoreError::Duplicate("email"));
        }
        let username = profile
            .username_candidates()
            .into_iter()
            .find(|name| !users.iter().any(|u| u.username == *name))
            .ok_or(StoreError::Duplicate("username"))?;

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: profile.email.clone(),
            password_hash: String::new(),
            role,
            is_active: true,
            created_at: OffsetDateTime::now_utc(),
            oauth_provider: Some(profile.provider.clone()),
            oauth_id: Some(profile.external_id.clone()),
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.lock().await;
        if let Some(field) = conflict(&users, &new_user.username, &new_user.email) {
            return Err(StoreError::Duplicate(field));
        }
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            role: new_user.role,
            is_active: true,
            created_at: OffsetDateTime::now_utc(),
            oauth_provider: None,
            oauth_id: None,
        };
        users.push(user.clone());
        Ok(user)
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

    #[tokio::test]
    async fn find_or_create_oauth_is_idempotent() {
        let store = MemoryCredentialStore::new();
        let first = store
            .find_or_create_oauth(&google("ext-1", "a@x.com", "A"), Role::Student)
            .await
            .unwrap();
        let second = store
            .find_or_create_oauth(&google("ext-1", "a@x.com", "A"), Role::Student)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.len().await, 1);
        assert_eq!(first.role, Role::Student);
        assert!(!first.has_password());
        assert_eq!(first.oauth_id.as_deref(), Some("ext-1"));
    }

    #[tokio::test]
    async fn concurrent_oauth_first_logins_converge() {
        let store = std::sync::Arc::new(MemoryCredentialStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .find_or_create_oauth(&google("ext-9", "z@x.com", "Z"), Role::Student)
                    .await
                    .unwrap()
                    .id
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn oauth_username_falls_back_to_email_when_taken() {
        let store = MemoryCredentialStore::new();
        store.create(new_user("A", "other@x.com")).await.unwrap();
        let user = store
            .find_or_create_oauth(&google("ext-2", "a@x.com", "A"), Role::Student)
            .await
            .unwrap();
        assert_eq!(user.username, "a@x.com");
    }

    #[tokio::test]
    async fn oauth_rejects_email_owned_by_other_account() {
        let store = MemoryCredentialStore::new();
        store.create(new_user("ada", "a@x.com")).await.unwrap();
        let err = store
            .find_or_create_oauth(&google("ext-3", "a@x.com", "Ada"), Role::Student)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate("email")));
    }

    #[tokio::test]
    async fn create_enforces_unique_username_and_email() {
        let store = MemoryCredentialStore::new();
        store.create(new_user("ada", "a@x.com")).await.unwrap();
        assert!(matches!(
            store.create(new_user("ada", "b@x.com")).await,
            Err(StoreError::Duplicate("username"))
        ));
        assert!(matches!(
            store.create(new_user("bob", "a@x.com")).await,
            Err(StoreError::Duplicate("email"))
        ));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn set_active_toggles_flag() {
        let store = MemoryCredentialStore::new();
        store.create(new_user("ada", "a@x.com")).await.unwrap();
        assert!(store.set_active("ada", false).await);
        let user = store.find_by_username("ada").await.unwrap().unwrap();
        assert!(!user.is_active);
        assert!(!store.set_active("nobody", false).await);
    }
}
