//! Credential ledger: one legacy credential per Stytch member.
//!
//! PostgreSQL when `DATABASE_URL` is configured, in-memory otherwise.

pub mod db;
pub mod ledger;

pub use db::PgLedger;
pub use ledger::{CredentialLedger, MemoryLedger};
