use std::str::FromStr;

use anyhow::Context;

use crate::auth::repo_types::Role;

/// Lifetime of every access token, for password and OAuth logins alike.
pub const ACCESS_TOKEN_TTL_MINUTES: i64 = 30;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialBackend {
    Postgres,
    Memory,
}

impl FromStr for CredentialBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => anyhow::bail!("unknown CREDENTIAL_STORE: {other}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub credential_backend: CredentialBackend,
    pub oauth_default_role: Role,
    pub google: Option<GoogleOAuthConfig>,
    pub llm: Option<LlmConfig>,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

fn optional_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET not set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "collegehub".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "collegehub-users".into()),
            ttl_minutes: ACCESS_TOKEN_TTL_MINUTES,
        };

        let credential_backend = match optional_var("CREDENTIAL_STORE") {
            Some(v) => v.parse()?,
            None => CredentialBackend::Postgres,
        };

        let oauth_default_role = match optional_var("OAUTH_DEFAULT_ROLE") {
            Some(v) => v
                .parse::<Role>()
                .map_err(|e| anyhow::anyhow!("OAUTH_DEFAULT_ROLE: {e}"))?,
            None => Role::Student,
        };

        let google = match (optional_var("GOOGLE_CLIENT_ID"), optional_var("GOOGLE_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(GoogleOAuthConfig {
                client_id,
                client_secret,
                redirect_url: optional_var("OAUTH_REDIRECT_URL")
                    .unwrap_or_else(|| "http://localhost:8080/auth/callback".into()),
            }),
            _ => None,
        };

        let llm = optional_var("GOOGLE_API_KEY").map(|api_key| LlmConfig {
            api_key,
            model: optional_var("GEMINI_MODEL").unwrap_or_else(|| "gemini-1.5-flash".into()),
        });

        let bootstrap_admin = match (
            optional_var("BOOTSTRAP_ADMIN_USERNAME"),
            optional_var("BOOTSTRAP_ADMIN_EMAIL"),
            optional_var("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Some(username), Some(email), Some(password)) => Some(BootstrapAdmin {
                username,
                email,
                password,
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            jwt,
            credential_backend,
            oauth_default_role,
            google,
            llm,
            bootstrap_admin,
        })
    }
}
