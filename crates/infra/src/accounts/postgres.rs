//! Postgres-backed account store.
//!
//! Uniqueness of `email` and `external_id` is enforced by the schema
//! (`crates/infra/migrations`). Unique violations (`23505`) are reported as
//! `StoreError::Conflict`; everything else is `StoreError::Unavailable`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use credo_core::{AccountId, Email};

use super::{Account, AccountStore, NewAccount};
use crate::db::map_sqlx_error;
use crate::error::StoreError;

const ACCOUNT_COLUMNS: &str =
    "id, email, display_name, password_hash, external_id, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PostgresAccountStore {
    pool: Arc<PgPool>,
}

impl PostgresAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn fetch_one_where(
        &self,
        operation: &str,
        clause: &str,
        bind: BindValue<'_>,
    ) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {clause}");
        let query = sqlx::query(&sql);
        let query = match bind {
            BindValue::Id(id) => query.bind(id),
            BindValue::Text(text) => query.bind(text),
        };

        let row = query
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;

        row.map(|r| account_from_row(&r)).transpose()
    }
}

enum BindValue<'a> {
    Id(i64),
    Text(&'a str),
}

#[async_trait]
impl AccountStore for PostgresAccountStore {
    #[instrument(skip(self, account), fields(email = %account.email), err)]
    async fn create(&self, account: NewAccount) -> Result<Account, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO accounts (email, display_name, password_hash, external_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(account.email.as_str())
            .bind(&account.display_name)
            .bind(account.password_hash.as_deref())
            .bind(account.external_id.as_deref())
            .bind(account.created_at)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("create_account", e))?;

        account_from_row(&row)
    }

    #[instrument(skip(self), err)]
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        self.fetch_one_where("find_account_by_id", "id = $1", BindValue::Id(id.get()))
            .await
    }

    #[instrument(skip(self), fields(email = %email), err)]
    async fn find_by_email(&self, email: &Email) -> Result<Option<Account>, StoreError> {
        self.fetch_one_where(
            "find_account_by_email",
            "email = $1",
            BindValue::Text(email.as_str()),
        )
        .await
    }

    #[instrument(skip(self, external_id), err)]
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Account>, StoreError> {
        self.fetch_one_where(
            "find_account_by_external_id",
            "external_id = $1",
            BindValue::Text(external_id),
        )
        .await
    }

    #[instrument(skip(self, external_id), fields(account_id = %id), err)]
    async fn link_external_id(
        &self,
        id: AccountId,
        external_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        // The conditional update leaves an existing, different key untouched;
        // the unique index rejects a key already held by another row.
        let sql = format!(
            r#"
            UPDATE accounts
            SET external_id = $2, updated_at = $3
            WHERE id = $1 AND (external_id IS NULL OR external_id = $2)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(id.get())
            .bind(external_id)
            .bind(now)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("link_external_id", e))?;

        match row {
            Some(row) => account_from_row(&row),
            None => match self.find_by_id(id).await? {
                Some(_) => Err(StoreError::Conflict(
                    "account already linked to a different external identity".to_string(),
                )),
                None => Err(StoreError::NotFound(format!("account {id}"))),
            },
        }
    }
}

fn account_from_row(row: &sqlx::postgres::PgRow) -> Result<Account, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Unavailable(format!("failed to decode account row: {e}"));

    let email: String = row.try_get("email").map_err(decode)?;
    let email = Email::parse(&email)
        .map_err(|e| StoreError::Unavailable(format!("stored email is invalid: {e}")))?;

    Ok(Account {
        id: AccountId::from_raw(row.try_get("id").map_err(decode)?),
        email,
        display_name: row.try_get("display_name").map_err(decode)?,
        password_hash: row.try_get("password_hash").map_err(decode)?,
        external_id: row.try_get("external_id").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}
