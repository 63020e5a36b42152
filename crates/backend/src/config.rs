//! Process configuration, read once at startup.
//!
//! Nothing in the auth core reads the environment after [`AppConfig`] has
//! been built; each component receives the slice it needs at construction.

use anyhow::{bail, Context, Result};
use chrono::Duration;
use cookie::SameSite;

/// Path the refresh-token cookie is scoped to. Browsers only send it to the
/// refresh endpoint, and only a clear on this exact path removes it.
pub const REFRESH_COOKIE_PATH: &str = "/api/auth/refresh";
pub const ACCESS_COOKIE_PATH: &str = "/";
pub const REFRESH_COOKIE_SUFFIX: &str = "_refresh";

const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub app_base_url: String,
    pub jwt: JwtConfig,
    pub cookie: CookieConfig,
    pub oauth: OAuthConfig,
    pub verification: VerificationConfig,
}

#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .finish()
    }
}

/// Flags applied uniformly to every auth cookie.
#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub name: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl CookieConfig {
    pub fn refresh_name(&self) -> String {
        format!("{}{}", self.name, REFRESH_COOKIE_SUFFIX)
    }
}

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub google: Option<GoogleClientConfig>,
    /// Where the browser lands after a successful provider login.
    pub authorized_redirect_uri: String,
    /// Where the browser lands when the provider flow fails for any reason.
    pub failure_redirect_uri: String,
}

#[derive(Clone)]
pub struct GoogleClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl std::fmt::Debug for GoogleClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct VerificationConfig {
    pub token_ttl: Duration,
    pub resend_token_ttl: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Required:
    /// - `JWT_SECRET`: HMAC key for signing tokens, at least 32 bytes
    ///
    /// Everything else falls back to a default suitable for local development.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup("JWT_SECRET").context("JWT_SECRET must be set")?;
        if secret.len() < MIN_SECRET_LEN {
            bail!("JWT_SECRET must be at least {} bytes", MIN_SECRET_LEN);
        }

        let jwt = JwtConfig {
            secret,
            access_token_ttl: Duration::seconds(parse_or(
                &lookup,
                "JWT_ACCESS_TOKEN_TTL_SECS",
                900,
            )?),
            refresh_token_ttl: Duration::seconds(parse_or(
                &lookup,
                "JWT_REFRESH_TOKEN_TTL_SECS",
                604_800,
            )?),
        };
        if jwt.access_token_ttl <= Duration::zero() || jwt.refresh_token_ttl <= Duration::zero() {
            bail!("token TTLs must be positive");
        }

        let cookie = CookieConfig {
            name: lookup("JWT_COOKIE_NAME").unwrap_or_else(|| "vista_token".to_string()),
            secure: parse_or(&lookup, "JWT_COOKIE_SECURE", true)?,
            http_only: parse_or(&lookup, "JWT_COOKIE_HTTP_ONLY", true)?,
            same_site: match lookup("JWT_COOKIE_SAME_SITE") {
                Some(value) => parse_same_site(&value)?,
                None => SameSite::Lax,
            },
        };

        let google = match (
            lookup("GOOGLE_CLIENT_ID"),
            lookup("GOOGLE_CLIENT_SECRET"),
            lookup("GOOGLE_REDIRECT_URI"),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => {
                Some(GoogleClientConfig {
                    client_id,
                    client_secret,
                    redirect_uri,
                })
            }
            (None, None, None) => None,
            _ => bail!(
                "GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET and GOOGLE_REDIRECT_URI must be set together"
            ),
        };
        let authorized_redirect_uri = lookup("OAUTH2_AUTHORIZED_REDIRECT_URI")
            .unwrap_or_else(|| "http://localhost:3000/oauth2/redirect".to_string());
        let failure_redirect_uri = lookup("OAUTH2_FAILURE_REDIRECT_URI")
            .unwrap_or_else(|| authorized_redirect_uri.clone());

        let verification = VerificationConfig {
            token_ttl: Duration::hours(parse_or(&lookup, "VERIFICATION_TOKEN_TTL_HOURS", 24)?),
            resend_token_ttl: Duration::hours(parse_or(
                &lookup,
                "RESEND_VERIFICATION_TOKEN_TTL_HOURS",
                1,
            )?),
        };

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS").map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        Ok(Self {
            port: parse_or(&lookup, "PORT", 8080)?,
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            cors_allowed_origins,
            app_base_url: lookup("APP_BASE_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            jwt,
            cookie,
            oauth: OAuthConfig {
                google,
                authorized_redirect_uri,
                failure_redirect_uri,
            },
            verification,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        None => Ok(default),
    }
}

fn parse_same_site(value: &str) -> Result<SameSite> {
    match value.to_ascii_lowercase().as_str() {
        "strict" => Ok(SameSite::Strict),
        "lax" => Ok(SameSite::Lax),
        "none" => Ok(SameSite::None),
        other => bail!("JWT_COOKIE_SAME_SITE must be Strict, Lax or None, got {}", other),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    pub(crate) const TEST_SECRET: &str = "test-secret-key-for-testing-only-0123456789";

    pub(crate) fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    pub(crate) fn test_config() -> AppConfig {
        AppConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", TEST_SECRET),
            ("JWT_COOKIE_NAME", "vista_token"),
            ("JWT_COOKIE_SECURE", "false"),
            ("OAUTH2_AUTHORIZED_REDIRECT_URI", "http://app.test/oauth2/redirect"),
            ("OAUTH2_FAILURE_REDIRECT_URI", "http://app.test/login"),
        ]))
        .expect("test config should load")
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&[("JWT_SECRET", TEST_SECRET)])).unwrap();

        assert_eq!(config.jwt.access_token_ttl, Duration::seconds(900));
        assert_eq!(config.jwt.refresh_token_ttl, Duration::seconds(604_800));
        assert_eq!(config.cookie.name, "vista_token");
        assert_eq!(config.cookie.refresh_name(), "vista_token_refresh");
        assert!(config.cookie.secure);
        assert!(config.cookie.http_only);
        assert_eq!(config.cookie.same_site, SameSite::Lax);
        assert!(config.oauth.google.is_none());
        assert_eq!(
            config.oauth.failure_redirect_uri,
            config.oauth.authorized_redirect_uri
        );
        assert_eq!(config.verification.token_ttl, Duration::hours(24));
        assert_eq!(config.verification.resend_token_ttl, Duration::hours(1));
        assert!(config.database_url.is_none());
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_missing_secret_is_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn test_short_secret_is_rejected() {
        assert!(AppConfig::from_lookup(lookup_from(&[("JWT_SECRET", "short")])).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", TEST_SECRET),
            ("JWT_ACCESS_TOKEN_TTL_SECS", "60"),
            ("JWT_COOKIE_SAME_SITE", "Strict"),
            ("JWT_COOKIE_HTTP_ONLY", "false"),
            ("CORS_ALLOWED_ORIGINS", "http://a.test, http://b.test,"),
        ]))
        .unwrap();

        assert_eq!(config.jwt.access_token_ttl, Duration::seconds(60));
        assert_eq!(config.cookie.same_site, SameSite::Strict);
        assert!(!config.cookie.http_only);
        assert_eq!(
            config.cors_allowed_origins,
            Some(vec!["http://a.test".to_string(), "http://b.test".to_string()])
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(AppConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", TEST_SECRET),
            ("JWT_COOKIE_SAME_SITE", "sometimes"),
        ]))
        .is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", TEST_SECRET),
            ("JWT_ACCESS_TOKEN_TTL_SECS", "soon"),
        ]))
        .is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", TEST_SECRET),
            ("JWT_REFRESH_TOKEN_TTL_SECS", "0"),
        ]))
        .is_err());
    }

    #[test]
    fn test_partial_google_config_is_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", TEST_SECRET),
            ("GOOGLE_CLIENT_ID", "id"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("GOOGLE_CLIENT_ID"));
    }
}
