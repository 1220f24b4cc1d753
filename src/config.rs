use anyhow::{Context, Result};

/// Application configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // ── Server ──────────────────────────────────────────────────────────
    pub host: String,
    pub port: u16,
    /// Public origin of the web app; magic links and OAuth land back here.
    pub base_url: String,
    /// `production` turns on `Secure` session cookies.
    pub app_env: String,
    /// Where a successful sign-in goes when no usable `return_to` was given.
    pub default_redirect: String,

    // ── Stytch ──────────────────────────────────────────────────────────
    pub stytch_project_id: String,
    pub stytch_secret: String,
    /// Needed only for building OAuth start URLs.
    pub stytch_public_token: Option<String>,
    /// Explicit API origin; derived from the project id when unset.
    pub stytch_api_url: Option<String>,
    pub session_duration_minutes: u32,

    // ── Legacy backend (API Gateway) ────────────────────────────────────
    pub legacy_api_url: String,
    pub legacy_api_key: Option<String>,

    // ── Credential ledger ───────────────────────────────────────────────
    /// PostgreSQL connection string; the ledger is kept in memory without it.
    pub database_url: Option<String>,
    /// 32-byte base64-encoded key for encrypting ledger API keys.
    pub master_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        let master_key = std::env::var("MASTER_KEY").ok().filter(|s| !s.is_empty());
        if database_url.is_some() && master_key.is_none() {
            anyhow::bail!("MASTER_KEY is required when DATABASE_URL is set (32 bytes, base64)");
        }

        Ok(Config {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8430".into())
                .parse()
                .context("Invalid PORT")?,
            base_url: std::env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into())
                .trim_end_matches('/')
                .to_string(),
            app_env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".into()),
            default_redirect: std::env::var("DEFAULT_REDIRECT")
                .unwrap_or_else(|_| "/dashboard".into()),

            stytch_project_id: std::env::var("STYTCH_PROJECT_ID")
                .context("STYTCH_PROJECT_ID is required")?,
            stytch_secret: std::env::var("STYTCH_SECRET")
                .context("STYTCH_SECRET is required")?,
            stytch_public_token: std::env::var("STYTCH_PUBLIC_TOKEN").ok(),
            stytch_api_url: std::env::var("STYTCH_API_URL").ok(),
            session_duration_minutes: std::env::var("SESSION_DURATION_MINUTES")
                .unwrap_or_else(|_| "60".into())
                .parse()
                .context("Invalid SESSION_DURATION_MINUTES")?,

            legacy_api_url: std::env::var("LEGACY_API_URL")
                .context("LEGACY_API_URL is required (legacy backend base URL)")?
                .trim_end_matches('/')
                .to_string(),
            legacy_api_key: std::env::var("LEGACY_API_KEY").ok(),

            database_url,
            master_key,
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    /// Stytch API origin for this project.
    pub fn stytch_base_url(&self) -> String {
        match &self.stytch_api_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None if self.stytch_project_id.starts_with("project-live-") => {
                "https://api.stytch.com".into()
            }
            None => "https://test.stytch.com".into(),
        }
    }

    /// Landing page for discovery magic links and OAuth callbacks.
    pub fn authenticate_url(&self) -> String {
        format!("{}/authenticate", self.base_url)
    }

    /// Configuration used by unit tests; points every upstream at localhost.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            host: "127.0.0.1".into(),
            port: 0,
            base_url: "http://localhost:3000".into(),
            app_env: "development".into(),
            default_redirect: "/dashboard".into(),
            stytch_project_id: "project-test-123".into(),
            stytch_secret: "secret-test".into(),
            stytch_public_token: Some("public-token-test".into()),
            stytch_api_url: None,
            session_duration_minutes: 60,
            legacy_api_url: "http://localhost:9".into(),
            legacy_api_key: None,
            database_url: None,
            master_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stytch_url_follows_project_environment() {
        let mut config = Config::for_tests();
        assert_eq!(config.stytch_base_url(), "https://test.stytch.com");

        config.stytch_project_id = "project-live-abc".into();
        assert_eq!(config.stytch_base_url(), "https://api.stytch.com");

        config.stytch_api_url = Some("http://127.0.0.1:4010/".into());
        assert_eq!(config.stytch_base_url(), "http://127.0.0.1:4010");
    }

    #[test]
    fn production_flag_is_case_insensitive() {
        let mut config = Config::for_tests();
        assert!(!config.is_production());
        config.app_env = "Production".into();
        assert!(config.is_production());
    }
}
