//! PostgreSQL-backed credential ledger.
//!
//! Tables:
//! - `legacy_credentials`: one row per Stytch member, API key encrypted at rest

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use super::ledger::{as_returning, CredentialLedger};
use crate::crypto::CryptoEngine;
use crate::error::AuthError;
use crate::legacy::LegacyCredential;

pub struct PgLedger {
    pool: PgPool,
    crypto: CryptoEngine,
}

impl PgLedger {
    pub async fn new(db_url: &str, crypto: CryptoEngine) -> Result<Self, AuthError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(db_url)
            .await
            .map_err(|e| AuthError::Database(format!("Failed to connect to PostgreSQL: {e}")))?;

        Ok(Self { pool, crypto })
    }

    /// Run schema migrations.
    pub async fn migrate(&self) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS legacy_credentials (
                member_id              TEXT PRIMARY KEY,
                organization_id        TEXT,
                user_id                TEXT NOT NULL,
                api_key_encrypted      TEXT NOT NULL,
                email                  TEXT NOT NULL,
                name                   TEXT NOT NULL DEFAULT '',
                is_enterprise          BOOLEAN,
                legacy_organization_id TEXT,
                role                   TEXT,
                created_at             TIMESTAMPTZ DEFAULT NOW(),
                last_synced_at         TIMESTAMPTZ DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_legacy_credentials_user ON legacy_credentials(user_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_credential(&self, row: &sqlx::postgres::PgRow) -> Result<LegacyCredential, AuthError> {
        let encrypted: String = row.get("api_key_encrypted");
        Ok(LegacyCredential {
            user_id: row.get("user_id"),
            api_key: self.crypto.decrypt(&encrypted)?,
            email: row.get("email"),
            name: row.get("name"),
            is_new_user: false,
            migrated: false,
            is_enterprise: row.try_get("is_enterprise").ok().flatten(),
            organization_id: row.try_get("legacy_organization_id").ok().flatten(),
            role: row.try_get("role").ok().flatten(),
        })
    }
}

#[async_trait]
impl CredentialLedger for PgLedger {
    async fn claim(
        &self,
        member_id: &str,
        stytch_organization_id: Option<&str>,
        credential: &LegacyCredential,
    ) -> Result<LegacyCredential, AuthError> {
        let encrypted = self.crypto.encrypt(&credential.api_key)?;

        // Conflict keeps the recorded account and only takes the new key when the
        // backend answered with that same account; xmax = 0 only for a fresh insert.
        let row = sqlx::query(
            r#"
            INSERT INTO legacy_credentials
                (member_id, organization_id, user_id, api_key_encrypted, email, name,
                 is_enterprise, legacy_organization_id, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (member_id) DO UPDATE SET
                last_synced_at = NOW(),
                api_key_encrypted = CASE
                    WHEN legacy_credentials.user_id = EXCLUDED.user_id
                        THEN EXCLUDED.api_key_encrypted
                    ELSE legacy_credentials.api_key_encrypted
                END
            RETURNING user_id, api_key_encrypted, email, name,
                      is_enterprise, legacy_organization_id, role,
                      (xmax = 0) AS inserted
            "#,
        )
        .bind(member_id)
        .bind(stytch_organization_id)
        .bind(&credential.user_id)
        .bind(&encrypted)
        .bind(&credential.email)
        .bind(&credential.name)
        .bind(credential.is_enterprise)
        .bind(&credential.organization_id)
        .bind(&credential.role)
        .fetch_one(&self.pool)
        .await?;

        let inserted: bool = row.get("inserted");
        if inserted {
            Ok(credential.clone())
        } else {
            tracing::debug!(member_id, "ledger already holds a credential for this member");
            self.row_to_credential(&row).map(as_returning)
        }
    }
}
