//! OAuth handshake plumbing.
//!
//! The protocol itself (authorization URL, PKCE, code exchange) is delegated to
//! the `oauth2` crate. This module only keeps the short-lived CSRF state between
//! the redirect and the callback, and hands the provider's userinfo JSON to the
//! bridge in [`super::services`].

use std::{collections::HashMap, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope,
    TokenResponse, TokenUrl,
};
use serde::Deserialize;
use time::{Duration as TimeDuration, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::error::AuthError;
use crate::config::GoogleOAuthConfig;

const PENDING_TTL_MINUTES: i64 = 10;

/// Start of a handshake: where to send the browser, plus the secrets the
/// callback needs.
pub struct Authorization {
    pub url: String,
    pub csrf_state: String,
    pub pkce_verifier: String,
}

/// One external identity provider.
#[async_trait]
pub trait OAuthHandshake: Send + Sync {
    fn authorize(&self) -> Authorization;

    /// Exchanges the code and returns the provider's userinfo payload.
    async fn exchange(&self, code: &str, pkce_verifier: String)
        -> anyhow::Result<serde_json::Value>;
}

/// Query string of the provider's redirect back to `/auth/callback`.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

struct Pending {
    provider: String,
    pkce_verifier: String,
    expires_at: OffsetDateTime,
}

/// Registered providers and the handshakes currently awaiting a callback.
#[derive(Default)]
pub struct HandshakeRegistry {
    providers: HashMap<String, Arc<dyn OAuthHandshake>>,
    pending: Mutex<HashMap<String, Pending>>,
}

impl HandshakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: &str, handshake: Arc<dyn OAuthHandshake>) -> Self {
        self.providers.insert(name.to_string(), handshake);
        self
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Returns the provider's authorization URL and remembers the CSRF state.
    pub async fn begin(&self, provider: &str) -> Result<String, AuthError> {
        let handshake = self
            .providers
            .get(provider)
            .ok_or_else(|| AuthError::UnknownProvider(provider.to_string()))?;

        let auth = handshake.authorize();
        let now = OffsetDateTime::now_utc();
        let mut pending = self.pending.lock().await;
        pending.retain(|_, p| p.expires_at > now);
        pending.insert(
            auth.csrf_state,
            Pending {
                provider: provider.to_string(),
                pkce_verifier: auth.pkce_verifier,
                expires_at: now + TimeDuration::minutes(PENDING_TTL_MINUTES),
            },
        );
        debug!(provider, "oauth handshake started");
        Ok(auth.url)
    }

    /// Consumes the callback's state (single use) and exchanges the code.
    pub async fn complete(
        &self,
        params: &CallbackParams,
    ) -> Result<(String, serde_json::Value), AuthError> {
        if let Some(err) = &params.error {
            return Err(AuthError::Handshake(format!("provider returned error: {err}")));
        }
        let state = params
            .state
            .as_deref()
            .ok_or_else(|| AuthError::Handshake("missing state".into()))?;
        let code = params
            .code
            .as_deref()
            .ok_or_else(|| AuthError::Handshake("missing code".into()))?;

        let pending = self
            .pending
            .lock()
            .await
            .remove(state)
            .filter(|p| p.expires_at > OffsetDateTime::now_utc())
            .ok_or_else(|| AuthError::Handshake("unknown or expired state".into()))?;

        let handshake = self
            .providers
            .get(&pending.provider)
            .ok_or_else(|| AuthError::UnknownProvider(pending.provider.clone()))?;

        let payload = handshake
            .exchange(code, pending.pkce_verifier)
            .await
            .map_err(|e| {
                warn!(error = %e, provider = %pending.provider, "oauth code exchange failed");
                AuthError::Handshake(e.to_string())
            })?;
        Ok((pending.provider, payload))
    }
}

/// `oauth2` client with auth and token endpoints set.
type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Google authorization-code flow with PKCE.
pub struct GoogleHandshake {
    client: ConfiguredClient,
    http: reqwest::Client,
}

impl GoogleHandshake {
    pub fn new(cfg: &GoogleOAuthConfig) -> anyhow::Result<Self> {
        let client = BasicClient::new(ClientId::new(cfg.client_id.clone()))
            .set_client_secret(ClientSecret::new(cfg.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(GOOGLE_AUTH_URL.to_string())?)
            .set_token_uri(TokenUrl::new(GOOGLE_TOKEN_URL.to_string())?)
            .set_redirect_uri(
                RedirectUrl::new(cfg.redirect_url.clone()).context("OAUTH_REDIRECT_URL")?,
            );

        // The token endpoint must not be allowed to redirect us elsewhere.
        let http = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("build oauth http client")?;

        Ok(Self { client, http })
    }
}

#[async_trait]
impl OAuthHandshake for GoogleHandshake {
    fn authorize(&self) -> Authorization {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (url, csrf_state) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("openid".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .set_pkce_challenge(pkce_challenge)
            .url();

        Authorization {
            url: url.to_string(),
            csrf_state: csrf_state.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        }
    }

    async fn exchange(
        &self,
        code: &str,
        pkce_verifier: String,
    ) -> anyhow::Result<serde_json::Value> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
            .request_async(&self.http)
            .await
            .context("token exchange failed")?;

        let userinfo = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(token.access_token().secret())
            .send()
            .await
            .context("userinfo request")?
            .error_for_status()
            .context("userinfo status")?
            .json::<serde_json::Value>()
            .await
            .context("userinfo body")?;
        Ok(userinfo)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Provider double that hands back a fixed payload.
    pub(crate) struct StaticHandshake {
        pub payload: serde_json::Value,
    }

    #[async_trait]
    impl OAuthHandshake for StaticHandshake {
        fn authorize(&self) -> Authorization {
            let state = CsrfToken::new_random().secret().clone();
            Authorization {
                url: format!("https://idp.test/authorize?state={state}"),
                csrf_state: state,
                pkce_verifier: "verifier".into(),
            }
        }

        async fn exchange(
            &self,
            code: &str,
            pkce_verifier: String,
        ) -> anyhow::Result<serde_json::Value> {
            anyhow::ensure!(code == "good-code", "bad code");
            anyhow::ensure!(pkce_verifier == "verifier", "bad verifier");
            Ok(self.payload.clone())
        }
    }

    fn registry() -> HandshakeRegistry {
        HandshakeRegistry::new().register(
            "test",
            Arc::new(StaticHandshake {
                payload: json!({ "sub": "ext-1", "email": "a@x.com" }),
            }),
        )
    }

    fn state_of(url: &str) -> String {
        url.split("state=").nth(1).unwrap().to_string()
    }

    #[tokio::test]
    async fn begin_rejects_unknown_provider() {
        let err = registry().begin("github").await.unwrap_err();
        assert!(matches!(err, AuthError::UnknownProvider(p) if p == "github"));
    }

    #[tokio::test]
    async fn complete_consumes_state_once() {
        let reg = registry();
        let url = reg.begin("test").await.unwrap();
        let params = CallbackParams {
            code: Some("good-code".into()),
            state: Some(state_of(&url)),
            error: None,
        };

        let (provider, payload) = reg.complete(&params).await.unwrap();
        assert_eq!(provider, "test");
        assert_eq!(payload["sub"], "ext-1");

        assert!(matches!(
            reg.complete(&params).await,
            Err(AuthError::Handshake(_))
        ));
    }

    #[tokio::test]
    async fn complete_rejects_bad_callbacks() {
        let reg = registry();
        let url = reg.begin("test").await.unwrap();

        let forged = CallbackParams {
            code: Some("good-code".into()),
            state: Some("forged".into()),
            error: None,
        };
        assert!(matches!(reg.complete(&forged).await, Err(AuthError::Handshake(_))));

        let denied = CallbackParams {
            error: Some("access_denied".into()),
            ..Default::default()
        };
        assert!(matches!(reg.complete(&denied).await, Err(AuthError::Handshake(_))));

        let bad_code = CallbackParams {
            code: Some("bad-code".into()),
            state: Some(state_of(&url)),
            error: None,
        };
        assert!(matches!(reg.complete(&bad_code).await, Err(AuthError::Handshake(_))));
    }

    #[test]
    fn google_authorize_url_carries_pkce_and_scopes() {
        let google = GoogleHandshake::new(&GoogleOAuthConfig {
            client_id: "cid".into(),
            client_secret: "secret".into(),
            redirect_url: "http://localhost:8080/auth/callback".into(),
        })
        .unwrap();
        let auth = google.authorize();
        assert!(auth.url.starts_with(GOOGLE_AUTH_URL));
        assert!(auth.url.contains("code_challenge_method=S256"));
        assert!(auth.url.contains("client_id=cid"));
        assert!(auth.url.contains(&format!("state={}", auth.csrf_state)));
        assert!(!auth.pkce_verifier.is_empty());
    }
}
