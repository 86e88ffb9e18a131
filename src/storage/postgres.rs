use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::domain::AllocationBreakdown;
use crate::rpt::{RptSigner, RptToken};

use super::traits::{AppendedAllocation, ChainScope, LedgerDraft, LedgerEntry, LedgerStore};

/// PostgreSQL implementation of the LedgerStore trait.
///
/// Appends take a transaction-scoped advisory lock keyed on the chain scope,
/// so concurrent writers to one chain serialize inside the database.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgresStore with a connection pool.
    pub async fn connect(
        database_url: &str,
        min_connections: u32,
        max_connections: u32,
    ) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(min_connections)
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const UPSERT_ENTRY: &str = r#"
    INSERT INTO ledger_entries (
        id, org_id, transaction_id, rule_id, policy_hash, allocation, rpt_hash, created_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (transaction_id)
    DO UPDATE SET
        org_id = EXCLUDED.org_id,
        rule_id = EXCLUDED.rule_id,
        policy_hash = EXCLUDED.policy_hash,
        allocation = EXCLUDED.allocation,
        rpt_hash = EXCLUDED.rpt_hash
    RETURNING id, org_id, transaction_id, rule_id, policy_hash, allocation, rpt_hash, created_at
"#;

fn entry_from_row(row: &PgRow) -> anyhow::Result<LedgerEntry> {
    let allocation: Json<Vec<AllocationBreakdown>> = row.try_get("allocation")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(LedgerEntry {
        id: row.try_get("id")?,
        org_id: row.try_get("org_id")?,
        transaction_id: row.try_get("transaction_id")?,
        rule_id: row.try_get("rule_id")?,
        policy_hash: row.try_get("policy_hash")?,
        allocation: allocation.0,
        rpt_hash: row.try_get("rpt_hash")?,
        created_at,
    })
}

async fn upsert_in(
    tx: &mut Transaction<'_, Postgres>,
    entry: &LedgerEntry,
) -> anyhow::Result<LedgerEntry> {
    let row = sqlx::query(UPSERT_ENTRY)
        .bind(entry.id)
        .bind(&entry.org_id)
        .bind(&entry.transaction_id)
        .bind(&entry.rule_id)
        .bind(&entry.policy_hash)
        .bind(Json(&entry.allocation))
        .bind(&entry.rpt_hash)
        .bind(entry.created_at)
        .fetch_one(&mut **tx)
        .await?;

    entry_from_row(&row)
}

#[async_trait]
impl LedgerStore for PostgresStore {
    async fn append_allocation(
        &self,
        scope: &ChainScope,
        draft: LedgerDraft,
        signer: &RptSigner,
    ) -> anyhow::Result<AppendedAllocation> {
        let key = scope.key();
        let mut tx = self.pool.begin().await?;

        // Held until commit or rollback
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&key)
            .execute(&mut *tx)
            .await?;

        let prev_hash: Option<String> = sqlx::query_scalar(
            r#"
            SELECT hash
            FROM rpt_tokens
            WHERE chain_scope = $1
            ORDER BY seq DESC
            LIMIT 1
            "#,
        )
        .bind(&key)
        .fetch_optional(&mut *tx)
        .await?;

        let token = signer.create_token(draft.token_params(prev_hash)?)?;

        sqlx::query(
            r#"
            INSERT INTO rpt_tokens (id, chain_scope, hash, prev_hash, token)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&key)
        .bind(&token.hash)
        .bind(&token.prev_hash)
        .bind(Json(&token))
        .execute(&mut *tx)
        .await?;

        let entry = upsert_in(&mut tx, &draft.into_entry(token.hash.clone())).await?;

        tx.commit().await?;

        debug!(scope = %key, hash = %token.hash, "Appended RPT");

        Ok(AppendedAllocation { entry, token })
    }

    async fn upsert_ledger_entry(&self, entry: &LedgerEntry) -> anyhow::Result<LedgerEntry> {
        let mut tx = self.pool.begin().await?;
        let stored = upsert_in(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn ledger_entry(&self, transaction_id: &str) -> anyhow::Result<Option<LedgerEntry>> {
        let row = sqlx::query(
            r#"
            SELECT id, org_id, transaction_id, rule_id, policy_hash, allocation, rpt_hash, created_at
            FROM ledger_entries
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn last_token(&self, scope: &ChainScope) -> anyhow::Result<Option<RptToken>> {
        let token: Option<Json<RptToken>> = sqlx::query_scalar(
            r#"
            SELECT token
            FROM rpt_tokens
            WHERE chain_scope = $1
            ORDER BY seq DESC
            LIMIT 1
            "#,
        )
        .bind(scope.key())
        .fetch_optional(&self.pool)
        .await?;

        Ok(token.map(|t| t.0))
    }

    async fn chain(&self, scope: &ChainScope) -> anyhow::Result<Vec<RptToken>> {
        let tokens: Vec<Json<RptToken>> = sqlx::query_scalar(
            r#"
            SELECT token
            FROM rpt_tokens
            WHERE chain_scope = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(scope.key())
        .fetch_all(&self.pool)
        .await?;

        Ok(tokens.into_iter().map(|t| t.0).collect())
    }
}
