//! Token issuer - HS256 session tokens and their cookie transport

use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::domain::result::{AuthFailure, Error, Result};
use crate::domain::{Claims, SessionCookie, User, TOKEN_ISSUER};
use crate::ports::Clock;

pub const DEFAULT_TOKEN_EXPIRY_HOURS: i64 = 24;

/// Mints and verifies session tokens
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    secure_cookie: bool,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: Duration, secure_cookie: bool, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
            secure_cookie,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a fresh token for `user`
    pub fn issue(&self, user: &User) -> Result<(String, Claims)> {
        let now = self.clock.now();
        let expires = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| Error::internal("token expiry out of range"))?;
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            role: user.role,
            iss: TOKEN_ISSUER.to_string(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| Error::internal(format!("Token creation failed: {}", e)))?;
        Ok((token, claims))
    }

    /// Check signature, algorithm, issuer and expiry.
    ///
    /// Expiry is judged against the injected clock with no leeway; every
    /// other failure is `TokenInvalid`.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss"]);

        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                JwtErrorKind::ExpiredSignature => Error::Authentication(AuthFailure::TokenExpired),
                _ => Error::Authentication(AuthFailure::TokenInvalid),
            })?;

        if claims.user_id().is_none() {
            return Err(Error::Authentication(AuthFailure::TokenInvalid));
        }
        if self.clock.now().timestamp() >= claims.exp {
            return Err(Error::Authentication(AuthFailure::TokenExpired));
        }
        Ok(claims)
    }

    /// Cookie mirroring `token` for the lifetime of the session
    pub fn cookie(&self, token: &str) -> SessionCookie {
        SessionCookie::new(token, self.ttl.num_seconds(), self.secure_cookie)
    }

    /// Cookie that ends the session on logout
    pub fn cleared_cookie(&self) -> SessionCookie {
        SessionCookie::cleared(self.secure_cookie)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;
    use crate::ports::ManualClock;
    use base64::Engine;
    use chrono::Utc;

    const SECRET: &str = "unit-test-jwt-secret-with-enough-length";

    fn issuer(clock: Arc<ManualClock>) -> TokenIssuer {
        TokenIssuer::new(SECRET, Duration::hours(24), true, clock)
    }

    fn user() -> User {
        User::new("thandi", "thandi@example.com", "x", Utc::now())
    }

    #[test]
    fn test_issue_and_verify() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let issuer = issuer(clock);
        let user = user();
        let (token, issued) = issuer.issue(&user).unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims, issued);
        assert_eq!(claims.user_id(), Some(user.id));
        assert_eq!(claims.role, Role::Customer);
        assert_eq!(claims.iss, "remit");
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn test_unique_token_ids() {
        let issuer = issuer(Arc::new(ManualClock::new(Utc::now())));
        let user = user();
        let (_, a) = issuer.issue(&user).unwrap();
        let (_, b) = issuer.issue(&user).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_expired_token() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let issuer = issuer(clock.clone());
        let (token, _) = issuer.issue(&user()).unwrap();
        clock.advance(Duration::hours(24));
        assert!(matches!(
            issuer.verify(&token),
            Err(Error::Authentication(AuthFailure::TokenExpired))
        ));
    }

    #[test]
    fn test_tampered_token() {
        let issuer = issuer(Arc::new(ManualClock::new(Utc::now())));
        let (token, _) = issuer.issue(&user()).unwrap();

        // Swap the payload for one claiming admin
        let parts: Vec<&str> = token.split('.').collect();
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let payload = String::from_utf8(engine.decode(parts[1]).unwrap()).unwrap();
        let forged = engine.encode(payload.replace("\"customer\"", "\"admin\""));
        let tampered = format!("{}.{}.{}", parts[0], forged, parts[2]);

        assert!(matches!(
            issuer.verify(&tampered),
            Err(Error::Authentication(AuthFailure::TokenInvalid))
        ));
        assert!(matches!(
            issuer.verify("garbage"),
            Err(Error::Authentication(AuthFailure::TokenInvalid))
        ));
    }

    #[test]
    fn test_foreign_secret_rejected() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let other = TokenIssuer::new("a-completely-different-secret-value", Duration::hours(1), false, clock.clone());
        let (token, _) = other.issue(&user()).unwrap();
        assert!(matches!(
            issuer(clock).verify(&token),
            Err(Error::Authentication(AuthFailure::TokenInvalid))
        ));
    }

    #[test]
    fn test_cookies() {
        let issuer = issuer(Arc::new(ManualClock::new(Utc::now())));
        let cookie = issuer.cookie("tok").to_string();
        assert!(cookie.contains("Max-Age=86400"));
        assert!(cookie.contains("; Secure"));
        assert!(issuer.cleared_cookie().to_string().contains("Max-Age=0"));
    }
}
