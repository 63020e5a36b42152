//! Token creation and verification.
//!
//! Tokens are HS256 JWTs carrying `{sub, type, iat, exp}`. The `type` claim
//! is part of the signed payload, so a refresh token cannot be relabelled
//! as an access token; checking it is the caller's job.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::JwtConfig;

const ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// JWT Claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user email)
    pub sub: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
}

/// Why a token was refused. Each failure is reported as its own kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("unsupported algorithm")]
    UnsupportedAlgorithm,
    #[error("could not sign token: {0}")]
    Signing(String),
}

/// Signs and verifies tokens with the single process-wide HMAC secret.
///
/// Verification is a pure computation: signature check plus a clock
/// comparison, no I/O and no shared mutable state.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    pub fn new(config: &JwtConfig) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            access_ttl: config.access_token_ttl,
            refresh_ttl: config.refresh_token_ttl,
        }
    }

    /// Configured lifetime for tokens of `kind`.
    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    pub fn issue(&self, subject: &str, kind: TokenKind, ttl: Duration) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            kind,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        encode(&Header::new(ALGORITHM), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Issue a token of `kind` with its configured lifetime.
    pub fn issue_kind(&self, subject: &str, kind: TokenKind) -> Result<String, TokenError> {
        self.issue(subject, kind, self.ttl(kind))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| classify(token, e.kind()))
    }
}

fn classify(token: &str, kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName | ErrorKind::MissingAlgorithm => {
            TokenError::UnsupportedAlgorithm
        }
        // Headers naming an algorithm the library does not know (e.g. "none")
        // fail to parse; report them by algorithm rather than as garbage.
        _ => match header_algorithm(token) {
            Some(alg) if alg != "HS256" => TokenError::UnsupportedAlgorithm,
            _ => TokenError::Malformed,
        },
    }
}

fn header_algorithm(token: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct RawHeader {
        alg: String,
    }

    let header = token.split('.').next()?;
    let bytes = URL_SAFE_NO_PAD.decode(header).ok()?;
    serde_json::from_slice::<RawHeader>(&bytes)
        .ok()
        .map(|h| h.alg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::TEST_SECRET;

    fn test_config() -> JwtConfig {
        JwtConfig {
            secret: TEST_SECRET.to_string(),
            access_token_ttl: Duration::seconds(900),
            refresh_token_ttl: Duration::seconds(604_800),
        }
    }

    fn codec() -> TokenCodec {
        TokenCodec::new(&test_config())
    }

    const B64URL: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

    fn flip(c: u8) -> u8 {
        if c == b'A' {
            b'B'
        } else {
            b'A'
        }
    }

    #[test]
    fn test_create_and_validate_token() {
        let codec = codec();
        for kind in [TokenKind::Access, TokenKind::Refresh] {
            let token = codec
                .issue("test@example.com", kind, Duration::seconds(60))
                .expect("should create token");

            let claims = codec.verify(&token).expect("should validate token");
            assert_eq!(claims.sub, "test@example.com");
            assert_eq!(claims.kind, kind);
            assert_eq!(claims.exp - claims.iat, 60);
        }
    }

    #[test]
    fn test_configured_ttls() {
        let codec = codec();
        assert_eq!(codec.ttl(TokenKind::Access), Duration::seconds(900));
        assert_eq!(codec.ttl(TokenKind::Refresh), Duration::seconds(604_800));

        let token = codec.issue_kind("a@x.com", TokenKind::Refresh).unwrap();
        let claims = codec.verify(&token).unwrap();
        assert_eq!(claims.exp - claims.iat, 604_800);
    }

    #[test]
    fn test_expired_token_rejected() {
        let codec = codec();
        let token = codec
            .issue("test@example.com", TokenKind::Access, Duration::seconds(-1))
            .unwrap();

        assert_eq!(codec.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_invalid_token_rejected() {
        let codec = codec();
        for token in ["invalid-token", "", "not.a.token", "too.many.parts.in.token"] {
            assert_eq!(codec.verify(token), Err(TokenError::Malformed), "{token}");
        }
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = codec()
            .issue("test@example.com", TokenKind::Access, Duration::seconds(60))
            .unwrap();

        let mut other = test_config();
        other.secret = "another-secret-key-for-testing-only-98765".to_string();
        assert_eq!(
            TokenCodec::new(&other).verify(&token),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_every_payload_byte_is_covered_by_signature() {
        let codec = codec();
        let token = codec
            .issue("test@example.com", TokenKind::Refresh, Duration::seconds(60))
            .unwrap();
        let header_len = token.find('.').unwrap() + 1;

        for i in header_len..token.len() {
            let mut bytes = token.clone().into_bytes();
            if bytes[i] == b'.' {
                continue;
            }
            assert!(B64URL.contains(&bytes[i]));
            bytes[i] = flip(bytes[i]);
            let tampered = String::from_utf8(bytes).unwrap();

            assert_eq!(
                codec.verify(&tampered),
                Err(TokenError::InvalidSignature),
                "byte {i} flipped"
            );
        }
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let claims = Claims {
            sub: "test@example.com".to_string(),
            kind: TokenKind::Access,
            iat: Utc::now().timestamp(),
            exp: (Utc::now() + Duration::seconds(60)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(codec().verify(&token), Err(TokenError::UnsupportedAlgorithm));
    }

    #[test]
    fn test_alg_none_rejected() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            format!(
                r#"{{"sub":"test@example.com","type":"access","iat":0,"exp":{}}}"#,
                Utc::now().timestamp() + 60
            )
            .as_bytes(),
        );
        let token = format!("{header}.{payload}.");

        assert_eq!(codec().verify(&token), Err(TokenError::UnsupportedAlgorithm));
    }

    #[test]
    fn test_unknown_type_claim_is_malformed() {
        #[derive(Serialize)]
        struct Loose<'a> {
            sub: &'a str,
            #[serde(rename = "type")]
            kind: &'a str,
            iat: i64,
            exp: i64,
        }

        let now = Utc::now().timestamp();
        let token = encode(
            &Header::new(ALGORITHM),
            &Loose {
                sub: "test@example.com",
                kind: "admin",
                iat: now,
                exp: now + 60,
            },
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(codec().verify(&token), Err(TokenError::Malformed));
    }

    #[test]
    fn test_type_claim_is_serialized_as_type() {
        let token = codec()
            .issue("a@x.com", TokenKind::Refresh, Duration::seconds(60))
            .unwrap();
        let payload = token.split('.').nth(1).unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();
        assert_eq!(json["type"], "refresh");
        assert_eq!(json["sub"], "a@x.com");
    }
}
