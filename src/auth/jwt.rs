use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use super::error::AuthError;
use crate::config::JwtConfig;

/// Fixed signing algorithm.
pub const ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // username
    pub exp: usize,
    pub iat: usize,
    pub iss: String,
    pub aud: String,
}

/// Signing and verification keys, built once from [`JwtConfig`].
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: TimeDuration,
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: TimeDuration::minutes(cfg.ttl_minutes),
        }
    }

    pub fn issue(&self, subject: &str, ttl: TimeDuration) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + ttl;
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp().max(0) as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(ALGORITHM), &claims, &self.encoding)?;
        debug!(subject = %subject, "jwt signed");
        Ok(token)
    }

    pub fn issue_access(&self, subject: &str) -> anyhow::Result<String> {
        self.issue(subject, self.access_ttl)
    }

    /// Signature is checked before expiry, so a genuine but stale token is `Expired`.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    AuthError::InvalidSignature
                }
                _ => AuthError::MalformedClaims,
            }
        })?;

        if data.claims.sub.trim().is_empty() {
            return Err(AuthError::MalformedClaims);
        }
        debug!(subject = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: crate::config::ACCESS_TOKEN_TTL_MINUTES,
        })
    }

    #[test]
    fn issue_and_verify_roundtrip() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud");
        let token = keys.issue_access("ada").expect("sign access");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, "ada");
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.exp - claims.iat, 30 * 60);
    }

    #[test]
    fn expired_token_is_expired_not_invalid_signature() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let token = keys
            .issue("ada", TimeDuration::seconds(-5))
            .expect("sign access");
        assert!(matches!(keys.verify(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn verify_rejects_foreign_signature() {
        let good = make_keys("secret-a", "iss", "aud");
        let other = make_keys("secret-b", "iss", "aud");
        let token = other.issue_access("ada").unwrap();
        assert!(matches!(good.verify(&token), Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good = make_keys("same-secret", "good-iss", "good-aud");
        let token = good.issue_access("ada").unwrap();

        let other_issuer = make_keys("same-secret", "bad-iss", "good-aud");
        assert!(matches!(
            other_issuer.verify(&token),
            Err(AuthError::MalformedClaims)
        ));
        let other_audience = make_keys("same-secret", "good-iss", "bad-aud");
        assert!(matches!(
            other_audience.verify(&token),
            Err(AuthError::MalformedClaims)
        ));
    }

    #[test]
    fn missing_subject_is_malformed() {
        #[derive(Serialize)]
        struct NoSubject {
            exp: usize,
            iat: usize,
            iss: String,
            aud: String,
        }
        let keys = make_keys("dev-secret", "iss", "aud");
        let now = OffsetDateTime::now_utc().unix_timestamp() as usize;
        let token = encode(
            &Header::new(ALGORITHM),
            &NoSubject {
                exp: now + 600,
                iat: now,
                iss: "iss".into(),
                aud: "aud".into(),
            },
            &EncodingKey::from_secret(b"dev-secret"),
        )
        .unwrap();
        assert!(matches!(keys.verify(&token), Err(AuthError::MalformedClaims)));
    }

    #[test]
    fn empty_subject_is_malformed() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let token = keys.issue_access("").unwrap();
        assert!(matches!(keys.verify(&token), Err(AuthError::MalformedClaims)));
    }

    #[test]
    fn garbage_is_malformed() {
        let keys = make_keys("dev-secret", "iss", "aud");
        assert!(matches!(
            keys.verify("not.a.jwt"),
            Err(AuthError::MalformedClaims)
        ));
    }
}
