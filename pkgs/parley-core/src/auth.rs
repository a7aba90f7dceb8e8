//! Handshake authentication
//!
//! A connection presents one bearer credential when it opens. The engine
//! only needs the verified user identity back; [`TokenAuthenticator`] checks
//! HS256-signed JSON web tokens whose `sub` claim is the user id.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use parley_store::UserId;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{ChatError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Turns a bearer credential into a verified user identity
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, credential: &str) -> Result<UserId>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default)]
    typ: String,
}

/// Claims carried by a token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    /// Expiry in seconds since the Unix epoch
    pub exp: i64,
    pub iat: i64,
}

/// HS256 token verifier and issuer
pub struct TokenAuthenticator {
    secret: Vec<u8>,
}

impl TokenAuthenticator {
    pub const MIN_SECRET_LEN: usize = 32;

    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self> {
        let secret = secret.as_ref();
        if secret.len() < Self::MIN_SECRET_LEN {
            return Err(ChatError::InvalidArgument(format!(
                "token secret must be at least {} bytes",
                Self::MIN_SECRET_LEN
            )));
        }
        Ok(Self {
            secret: secret.to_vec(),
        })
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| ChatError::InvalidArgument("HMAC key error".into()))
    }

    /// Issue a token for `user` valid for `ttl`
    pub fn issue(&self, user: &UserId, ttl: Duration) -> Result<String> {
        let now = Utc::now();
        let header = Header {
            alg: "HS256".into(),
            typ: "JWT".into(),
        };
        let claims = Claims {
            sub: user.as_str().to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };

        let header = serde_json::to_vec(&header)
            .map_err(|e| ChatError::InvalidArgument(format!("bad token header: {}", e)))?;
        let claims = serde_json::to_vec(&claims)
            .map_err(|e| ChatError::InvalidArgument(format!("bad token claims: {}", e)))?;
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(claims)
        );

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", signing_input, signature))
    }

    /// Verify a token and return its claims
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let token = token.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token);

        let (signing_input, signature) = token
            .rsplit_once('.')
            .ok_or_else(|| unauthenticated("malformed token"))?;
        let (header, claims) = signing_input
            .split_once('.')
            .filter(|(_, claims)| !claims.contains('.'))
            .ok_or_else(|| unauthenticated("malformed token"))?;

        let header: Header = decode_json(header)?;
        if header.alg != "HS256" {
            return Err(unauthenticated("unsupported token algorithm"));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| unauthenticated("malformed token signature"))?;
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| unauthenticated("invalid token signature"))?;

        let claims: Claims = decode_json(claims)?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(unauthenticated("token expired"));
        }
        if claims.sub.trim().is_empty() {
            return Err(unauthenticated("token has no subject"));
        }
        Ok(claims)
    }
}

impl Authenticator for TokenAuthenticator {
    fn authenticate(&self, credential: &str) -> Result<UserId> {
        let claims = self.verify(credential)?;
        Ok(UserId::new(claims.sub))
    }
}

fn unauthenticated(reason: &str) -> ChatError {
    ChatError::Unauthenticated(reason.to_string())
}

fn decode_json<T: serde::de::DeserializeOwned>(part: &str) -> Result<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|_| unauthenticated("malformed token"))?;
    serde_json::from_slice(&bytes).map_err(|_| unauthenticated("malformed token"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_issue_and_verify() {
        let auth = TokenAuthenticator::new(SECRET).unwrap();
        let token = auth.issue(&UserId::from("alice"), Duration::hours(1)).unwrap();

        assert_eq!(auth.authenticate(&token).unwrap(), UserId::from("alice"));
        let bearer = format!("Bearer {}", token);
        assert_eq!(auth.authenticate(&bearer).unwrap(), UserId::from("alice"));
    }

    #[test]
    fn test_short_secret_rejected() {
        let err = TokenAuthenticator::new("short").err().unwrap();
        assert!(matches!(err, ChatError::InvalidArgument(_)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = TokenAuthenticator::new(SECRET).unwrap();
        let verifier = TokenAuthenticator::new("fedcba9876543210fedcba9876543210").unwrap();
        let token = issuer.issue(&UserId::from("alice"), Duration::hours(1)).unwrap();

        let err = verifier.authenticate(&token).unwrap_err();
        assert!(matches!(err, ChatError::Unauthenticated(_)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let auth = TokenAuthenticator::new(SECRET).unwrap();
        let token = auth
            .issue(&UserId::from("alice"), Duration::seconds(-10))
            .unwrap();

        let err = auth.authenticate(&token).unwrap_err();
        assert!(matches!(err, ChatError::Unauthenticated(ref r) if r == "token expired"));
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let auth = TokenAuthenticator::new(SECRET).unwrap();
        let token = auth.issue(&UserId::from("alice"), Duration::hours(1)).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let forged = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&Claims {
                sub: "mallory".into(),
                exp: Utc::now().timestamp() + 3600,
                iat: Utc::now().timestamp(),
            })
            .unwrap(),
        );
        let tampered = format!("{}.{}.{}", parts[0], forged, parts[2]);

        assert!(auth.authenticate(&tampered).is_err());
        assert!(auth.authenticate("not-a-token").is_err());
        assert!(auth.authenticate("").is_err());
    }
}
