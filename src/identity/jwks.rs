//! Local verification of Stytch session JWTs against the project's JWKS.
//!
//! Keys are cached for an hour; an unknown `kid` forces one refresh before the
//! token is rejected (Stytch rotates keys without notice).

use std::time::{Duration, Instant};

use base64::Engine as _;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::AuthError;

#[derive(Debug, Deserialize, Clone)]
struct JwksResponse {
    keys: Vec<JwkKey>,
}

#[derive(Debug, Deserialize, Clone)]
struct JwkKey {
    kid: String,
    kty: String,
    n: String, // RSA modulus
    e: String, // RSA exponent
}

struct JwksCache {
    keys: Vec<JwkKey>,
    fetched_at: Instant,
}

/// Thread-safe JWKS key cache for one Stytch project.
pub struct JwksKeyStore {
    cache: RwLock<Option<JwksCache>>,
    jwks_url: String,
    project_id: String,
    cache_ttl: Duration,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SessionClaimBlock {
    id: String,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct OrganizationClaimBlock {
    organization_id: String,
    #[serde(default)]
    slug: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StytchJwtPayload {
    sub: String,
    #[serde(rename = "https://stytch.com/session")]
    session: SessionClaimBlock,
    #[serde(rename = "https://stytch.com/organization")]
    organization: OrganizationClaimBlock,
}

#[derive(Debug, Deserialize)]
struct JwtHeader {
    kid: Option<String>,
    alg: Option<String>,
}

/// What a verified session JWT tells us without a network round-trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifiedSession {
    pub member_id: String,
    pub organization_id: String,
    pub organization_slug: Option<String>,
    pub member_session_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl JwksKeyStore {
    pub fn new(stytch_base_url: &str, project_id: &str) -> Self {
        Self {
            cache: RwLock::new(None),
            jwks_url: format!(
                "{}/v1/b2b/sessions/jwks/{}",
                stytch_base_url.trim_end_matches('/'),
                project_id
            ),
            project_id: project_id.to_string(),
            cache_ttl: Duration::from_secs(3600),
            http: reqwest::Client::new(),
        }
    }

    async fn get_decoding_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        {
            let cache = self.cache.read().await;
            if let Some(ref cached) = *cache {
                if cached.fetched_at.elapsed() < self.cache_ttl {
                    if let Some(key) = cached.keys.iter().find(|k| k.kid == kid) {
                        return Self::jwk_to_decoding_key(key);
                    }
                }
            }
        }

        self.refresh_keys().await?;

        let cache = self.cache.read().await;
        if let Some(ref cached) = *cache {
            if let Some(key) = cached.keys.iter().find(|k| k.kid == kid) {
                return Self::jwk_to_decoding_key(key);
            }
        }

        tracing::debug!("no JWKS key found for kid '{kid}'");
        Err(AuthError::Unauthorized)
    }

    async fn refresh_keys(&self) -> Result<(), AuthError> {
        tracing::info!("Fetching JWKS keys from {}", self.jwks_url);

        let resp = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::Internal(format!("JWKS fetch failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AuthError::Internal(format!(
                "JWKS fetch failed with status {}",
                resp.status()
            )));
        }

        let jwks: JwksResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::Internal(format!("JWKS parse failed: {e}")))?;

        tracing::info!("Cached {} JWKS keys", jwks.keys.len());

        let mut cache = self.cache.write().await;
        *cache = Some(JwksCache {
            keys: jwks.keys,
            fetched_at: Instant::now(),
        });

        Ok(())
    }

    fn jwk_to_decoding_key(key: &JwkKey) -> Result<DecodingKey, AuthError> {
        if key.kty != "RSA" {
            tracing::warn!("unsupported JWKS key type: {}", key.kty);
            return Err(AuthError::Unauthorized);
        }

        DecodingKey::from_rsa_components(&key.n, &key.e)
            .map_err(|e| AuthError::Internal(format!("invalid RSA key components: {e}")))
    }

    /// Pre-warm the cache on startup.
    pub async fn warm_cache(&self) -> Result<(), AuthError> {
        self.refresh_keys().await
    }

    /// Verify signature, issuer, audience and expiry of a session JWT.
    ///
    /// Any token problem is `Unauthorized`; `Internal` means the key set
    /// itself could not be loaded.
    pub async fn verify(&self, session_jwt: &str) -> Result<VerifiedSession, AuthError> {
        let parts: Vec<&str> = session_jwt.split('.').collect();
        if parts.len() != 3 {
            return Err(AuthError::Unauthorized);
        }

        let header_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(parts[0])
            .map_err(|_| AuthError::Unauthorized)?;
        let header: JwtHeader =
            serde_json::from_slice(&header_bytes).map_err(|_| AuthError::Unauthorized)?;

        if let Some(ref alg) = header.alg {
            if alg != "RS256" {
                tracing::debug!("rejecting session JWT with alg {alg}");
                return Err(AuthError::Unauthorized);
            }
        }
        let kid = header.kid.ok_or(AuthError::Unauthorized)?;

        let decoding_key = self.get_decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[format!("stytch.com/{}", self.project_id)]);
        validation.set_audience(&[self.project_id.as_str()]);
        validation.validate_exp = true;

        let token_data = decode::<StytchJwtPayload>(session_jwt, &decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!("session JWT rejected: {e}");
                AuthError::Unauthorized
            })?;

        let claims = token_data.claims;
        Ok(VerifiedSession {
            member_id: claims.sub,
            organization_id: claims.organization.organization_id,
            organization_slug: claims.organization.slug,
            member_session_id: claims.session.id,
            started_at: claims.session.started_at,
            expires_at: claims.session.expires_at,
        })
    }
}
