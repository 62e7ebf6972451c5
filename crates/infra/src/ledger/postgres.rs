//! Postgres-backed refresh ledger (`refresh_tokens` table).
//!
//! ## Atomic rotation
//!
//! `rotate` runs in one transaction: a conditional update of the presented
//! row, then the insert of its replacement.
//!
//! ```sql
//! UPDATE refresh_tokens SET revoked = TRUE WHERE token = $1 AND revoked = FALSE RETURNING id
//! ```
//!
//! Postgres row locking serializes concurrent updates of the same row; the
//! second writer re-evaluates `revoked = FALSE` after the first commits and
//! matches nothing. If the insert fails the transaction rolls back and the
//! presented row stays active.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use credo_auth::Nonce;
use credo_core::{AccountId, LedgerEntryId};

use super::{LedgerEntry, NewLedgerEntry, RefreshLedger};
use crate::db::map_sqlx_error;
use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct PostgresRefreshLedger {
    pool: Arc<PgPool>,
}

impl PostgresRefreshLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl RefreshLedger for PostgresRefreshLedger {
    #[instrument(skip(self, nonce), fields(account_id = %account_id), err)]
    async fn record(
        &self,
        account_id: AccountId,
        nonce: &Nonce,
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Result<LedgerEntry, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO refresh_tokens (account_id, token, expires_at, created_at, revoked)
            VALUES ($1, $2, $3, $4, FALSE)
            RETURNING id, account_id, token, expires_at, created_at, revoked
            "#,
        )
        .bind(account_id.get())
        .bind(nonce.as_str())
        .bind(expires_at)
        .bind(created_at)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("record_refresh_token", e))?;

        entry_from_row(&row)
    }

    #[instrument(skip(self, nonce), err)]
    async fn lookup_active(&self, nonce: &Nonce) -> Result<Option<LedgerEntry>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, token, expires_at, created_at, revoked
            FROM refresh_tokens
            WHERE token = $1 AND revoked = FALSE
            "#,
        )
        .bind(nonce.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("lookup_active_refresh_token", e))?;

        row.map(|r| entry_from_row(&r)).transpose()
    }

    #[instrument(skip(self, nonce), err)]
    async fn revoke(&self, nonce: &Nonce) -> Result<(), StoreError> {
        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE token = $1 AND revoked = FALSE")
            .bind(nonce.as_str())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("revoke_refresh_token", e))?;
        Ok(())
    }

    #[instrument(skip(self, presented, replacement), fields(account_id = %replacement.account_id), err)]
    async fn rotate(
        &self,
        presented: &Nonce,
        replacement: &NewLedgerEntry,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("rotate_refresh_token_begin", e))?;

        let consumed = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE WHERE token = $1 AND revoked = FALSE RETURNING id",
        )
        .bind(presented.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("rotate_refresh_token_consume", e))?;

        if consumed.is_none() {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rotate_refresh_token_rollback", e))?;
            return Ok(None);
        }

        let row = sqlx::query(
            r#"
            INSERT INTO refresh_tokens (account_id, token, expires_at, created_at, revoked)
            VALUES ($1, $2, $3, $4, FALSE)
            RETURNING id, account_id, token, expires_at, created_at, revoked
            "#,
        )
        .bind(replacement.account_id.get())
        .bind(replacement.nonce.as_str())
        .bind(replacement.expires_at)
        .bind(replacement.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("rotate_refresh_token_record", e))?;

        let entry = entry_from_row(&row)?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("rotate_refresh_token_commit", e))?;

        Ok(Some(entry))
    }
}

fn entry_from_row(row: &sqlx::postgres::PgRow) -> Result<LedgerEntry, StoreError> {
    let decode =
        |e: sqlx::Error| StoreError::Unavailable(format!("failed to decode refresh_tokens row: {e}"));

    Ok(LedgerEntry {
        id: LedgerEntryId::from_raw(row.try_get("id").map_err(decode)?),
        account_id: AccountId::from_raw(row.try_get("account_id").map_err(decode)?),
        nonce: Nonce::from_string(row.try_get::<String, _>("token").map_err(decode)?),
        expires_at: row.try_get("expires_at").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        revoked: row.try_get("revoked").map_err(decode)?,
    })
}
