//! Mapping between tokens and HTTP cookies.
//!
//! The access and refresh cookies always travel as a pair: the access cookie
//! on `/`, the refresh cookie under the same base name with a `_refresh`
//! suffix on the refresh endpoint's path. A cookie is only removed by a
//! clear on the exact path it was set with.

use axum::{
    http::{header, HeaderMap, HeaderValue},
    response::Response,
};
use chrono::Duration;
use cookie::Cookie;

use crate::config::{CookieConfig, ACCESS_COOKIE_PATH, REFRESH_COOKIE_PATH};

#[derive(Debug, Clone)]
pub struct CookieAdapter {
    config: CookieConfig,
    access_max_age: Duration,
    refresh_max_age: Duration,
}

impl CookieAdapter {
    pub fn new(config: CookieConfig, access_max_age: Duration, refresh_max_age: Duration) -> Self {
        Self {
            config,
            access_max_age,
            refresh_max_age,
        }
    }

    pub fn access_name(&self) -> &str {
        &self.config.name
    }

    pub fn refresh_name(&self) -> String {
        self.config.refresh_name()
    }

    /// Append a `Set-Cookie` for `name=value` with the configured flags.
    pub fn write(&self, response: &mut Response, name: &str, value: &str, max_age: Duration, path: &str) {
        let cookie = self.build(name, value, max_age, path);
        append_set_cookie(response, &cookie);
    }

    /// Expire `name` on `path`: empty value, max-age zero.
    pub fn clear(&self, response: &mut Response, name: &str, path: &str) {
        let cookie = self.build(name, "", Duration::zero(), path);
        append_set_cookie(response, &cookie);
    }

    pub fn write_access(&self, response: &mut Response, token: &str) {
        self.write(
            response,
            &self.config.name,
            token,
            self.access_max_age,
            ACCESS_COOKIE_PATH,
        );
    }

    pub fn write_refresh(&self, response: &mut Response, token: &str) {
        self.write(
            response,
            &self.refresh_name(),
            token,
            self.refresh_max_age,
            REFRESH_COOKIE_PATH,
        );
    }

    pub fn write_pair(&self, response: &mut Response, access_token: &str, refresh_token: &str) {
        self.write_access(response, access_token);
        self.write_refresh(response, refresh_token);
    }

    pub fn clear_pair(&self, response: &mut Response) {
        self.clear(response, &self.config.name, ACCESS_COOKIE_PATH);
        self.clear(response, &self.refresh_name(), REFRESH_COOKIE_PATH);
    }

    pub fn read_access(&self, headers: &HeaderMap) -> Option<String> {
        read_cookie(headers, &self.config.name)
    }

    pub fn read_refresh(&self, headers: &HeaderMap) -> Option<String> {
        read_cookie(headers, &self.refresh_name())
    }

    fn build(&self, name: &str, value: &str, max_age: Duration, path: &str) -> Cookie<'static> {
        Cookie::build((name.to_string(), value.to_string()))
            .path(path.to_string())
            .http_only(self.config.http_only)
            .secure(self.config.secure)
            .same_site(self.config.same_site)
            .max_age(cookie::time::Duration::seconds(max_age.num_seconds()))
            .build()
    }
}

/// First cookie called `name` across every `Cookie` header of the request.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| Cookie::split_parse(raw.to_string()))
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
}

fn append_set_cookie(response: &mut Response, cookie: &Cookie<'_>) {
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::error!("Refusing to emit unrepresentable cookie {}: {}", cookie.name(), e),
    }
}
