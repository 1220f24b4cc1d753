//! Session cookies shared with the browser-side identity SDK.
//!
//! The SDK reads both cookies from script, so they are not `HttpOnly`.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::config::Config;
use crate::identity::{SessionTokens, SESSION_COOKIE, SESSION_JWT_COOKIE};

/// Cookie attributes that follow the deployment.
#[derive(Debug, Clone, Copy)]
pub struct CookieSettings {
    pub secure: bool,
    /// Matches the lifetime of the sessions the identity client mints.
    pub max_age: time::Duration,
}

impl CookieSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            secure: config.is_production(),
            max_age: time::Duration::minutes(i64::from(config.session_duration_minutes)),
        }
    }
}

fn session_cookie(name: &'static str, value: String, settings: CookieSettings) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(false)
        .secure(settings.secure)
        .same_site(SameSite::Lax)
        .max_age(settings.max_age)
        .build()
}

pub fn set_session(jar: CookieJar, tokens: &SessionTokens, settings: CookieSettings) -> CookieJar {
    jar.add(session_cookie(
        SESSION_COOKIE,
        tokens.session_token.clone(),
        settings,
    ))
    .add(session_cookie(
        SESSION_JWT_COOKIE,
        tokens.session_jwt.clone(),
        settings,
    ))
}

pub fn clear_session(jar: CookieJar) -> CookieJar {
    let expired = |name: &'static str| {
        Cookie::build((name, ""))
            .path("/")
            .max_age(time::Duration::ZERO)
            .build()
    };
    jar.add(expired(SESSION_COOKIE)).add(expired(SESSION_JWT_COOKIE))
}

pub fn session_token(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

pub fn session_jwt(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_JWT_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}
