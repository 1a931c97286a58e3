use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::Claims;
use crate::config::JwtConfig;

/// Why an access token was rejected. Only logged; callers see a generic
/// authentication failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token has expired")]
    Expired,
    #[error("token failed validation: {0}")]
    Invalid(String),
}

/// Signs and verifies HS256 access tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl TokenService {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::minutes(cfg.ttl_minutes),
        }
    }

    pub fn issue_access_token(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.issue_at(user_id, OffsetDateTime::now_utc())
    }

    fn issue_at(&self, user_id: Uuid, now: OffsetDateTime) -> anyhow::Result<String> {
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp(),
            exp: (now + self.ttl).unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "jwt signed");
        Ok(token)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, TokenError> {
        if token.trim().is_empty() {
            return Err(TokenError::Malformed);
        }
        let mut validation = Validation::default();
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.set_required_spec_claims(&["sub", "exp", "iat", "iss", "aud"]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                    TokenError::Malformed
                }
                _ => TokenError::Invalid(e.to_string()),
            }
        })?;
        debug!(user_id = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(secret: &str, issuer: &str, audience: &str) -> TokenService {
        TokenService::new(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: 5,
        })
    }

    #[test]
    fn sign_and_verify_access_token() {
        let tokens = service("dev-secret", "test-issuer", "test-aud");
        let user_id = Uuid::new_v4();
        let token = tokens.issue_access_token(user_id).expect("sign access");
        let claims = tokens.verify_access_token(&token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert!(claims.iat <= OffsetDateTime::now_utc().unix_timestamp());
        assert_eq!(claims.exp - claims.iat, 5 * 60);
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good = service("same-secret", "good-iss", "good-aud");
        let bad = service("same-secret", "bad-iss", "bad-aud");
        let token = good.issue_access_token(Uuid::new_v4()).expect("sign access");
        assert!(matches!(bad.verify_access_token(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn verify_rejects_foreign_signature() {
        let ours = service("secret-a", "iss", "aud");
        let theirs = service("secret-b", "iss", "aud");
        let token = theirs.issue_access_token(Uuid::new_v4()).unwrap();
        assert!(matches!(ours.verify_access_token(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn verify_reports_expiry() {
        let tokens = service("dev-secret", "iss", "aud");
        let long_ago = OffsetDateTime::now_utc() - Duration::hours(1);
        let token = tokens.issue_at(Uuid::new_v4(), long_ago).unwrap();
        assert_eq!(tokens.verify_access_token(&token), Err(TokenError::Expired));
    }

    #[test]
    fn verify_handles_garbage_without_panicking() {
        let tokens = service("dev-secret", "iss", "aud");
        assert_eq!(tokens.verify_access_token(""), Err(TokenError::Malformed));
        assert_eq!(tokens.verify_access_token("not.a.jwt"), Err(TokenError::Malformed));
        assert_eq!(tokens.verify_access_token("garbage"), Err(TokenError::Malformed));
    }
}
