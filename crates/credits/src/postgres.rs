//! Postgres store implementation
//!
//! Runtime sqlx queries against the `entitlements` and
//! `checkout_transactions` tables. `complete` performs the status
//! compare-and-set and the token grant inside one transaction, so a
//! redelivered or concurrently-delivered completion event can never grant
//! twice: only the UPDATE that catches the row in `pending` returns it.

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::checkout::{CheckoutStatus, CheckoutTransaction};
use crate::entitlement::EntitlementRecord;
use crate::error::{CreditsError, CreditsResult};
use crate::store::{CheckoutLedger, CompletionOutcome, EntitlementStore};

#[derive(Debug, sqlx::FromRow)]
struct EntitlementRow {
    id: Uuid,
    device_id: String,
    tokens_total: i64,
    tokens_used: i64,
    free_trial_used: bool,
    last_payment_id: Option<String>,
    last_product_sku: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<EntitlementRow> for EntitlementRecord {
    fn from(row: EntitlementRow) -> Self {
        EntitlementRecord {
            id: row.id,
            device_id: row.device_id,
            tokens_total: row.tokens_total,
            tokens_used: row.tokens_used,
            free_trial_used: row.free_trial_used,
            last_payment_id: row.last_payment_id,
            last_product_sku: row.last_product_sku,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    checkout_id: String,
    device_id: String,
    product_sku: String,
    amount_cents: i64,
    currency: String,
    status: String,
    creem_order_id: Option<String>,
    webhook_payload: Option<serde_json::Value>,
    created_at: OffsetDateTime,
    completed_at: Option<OffsetDateTime>,
}

impl TryFrom<TransactionRow> for CheckoutTransaction {
    type Error = CreditsError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let status = CheckoutStatus::parse(&row.status).ok_or_else(|| {
            CreditsError::Internal(format!("unknown checkout status in database: {}", row.status))
        })?;
        Ok(CheckoutTransaction {
            id: row.id,
            checkout_id: row.checkout_id,
            device_id: row.device_id,
            product_sku: row.product_sku,
            amount_cents: row.amount_cents,
            currency: row.currency,
            status,
            creem_order_id: row.creem_order_id,
            webhook_payload: row.webhook_payload,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

const GRANT_SQL: &str = r#"
    INSERT INTO entitlements (device_id, tokens_total, last_payment_id, last_product_sku)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (device_id) DO UPDATE SET
        tokens_total = entitlements.tokens_total + EXCLUDED.tokens_total,
        last_payment_id = EXCLUDED.last_payment_id,
        last_product_sku = EXCLUDED.last_product_sku,
        updated_at = NOW()
    RETURNING id, device_id, tokens_total, tokens_used, free_trial_used,
              last_payment_id, last_product_sku, created_at, updated_at
"#;

/// sqlx-backed implementation of both store traits
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntitlementStore for PostgresStore {
    async fn find(&self, device_id: &str) -> CreditsResult<Option<EntitlementRecord>> {
        let row: Option<EntitlementRow> = sqlx::query_as(
            r#"
            SELECT id, device_id, tokens_total, tokens_used, free_trial_used,
                   last_payment_id, last_product_sku, created_at, updated_at
            FROM entitlements
            WHERE device_id = $1
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(EntitlementRecord::from))
    }

    async fn create(&self, device_id: &str) -> CreditsResult<EntitlementRecord> {
        // ON CONFLICT DO NOTHING keeps a create/create race benign: the
        // loser re-reads the row the winner inserted.
        let inserted: Option<EntitlementRow> = sqlx::query_as(
            r#"
            INSERT INTO entitlements (device_id)
            VALUES ($1)
            ON CONFLICT (device_id) DO NOTHING
            RETURNING id, device_id, tokens_total, tokens_used, free_trial_used,
                      last_payment_id, last_product_sku, created_at, updated_at
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(row.into());
        }

        EntitlementStore::find(self, device_id).await?.ok_or_else(|| {
            CreditsError::Internal(format!("entitlement row vanished for device {device_id}"))
        })
    }

    async fn set_trial_used(&self, device_id: &str) -> CreditsResult<()> {
        sqlx::query(
            "UPDATE entitlements SET free_trial_used = TRUE, updated_at = NOW() WHERE device_id = $1",
        )
        .bind(device_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn increment_used(&self, device_id: &str) -> CreditsResult<()> {
        sqlx::query(
            "UPDATE entitlements SET tokens_used = tokens_used + 1, updated_at = NOW() WHERE device_id = $1",
        )
        .bind(device_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn grant(
        &self,
        device_id: &str,
        quantity: i64,
        grant_reference: &str,
        product_sku: &str,
    ) -> CreditsResult<EntitlementRecord> {
        let row: EntitlementRow = sqlx::query_as(GRANT_SQL)
            .bind(device_id)
            .bind(quantity)
            .bind(grant_reference)
            .bind(product_sku)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }
}

#[async_trait]
impl CheckoutLedger for PostgresStore {
    async fn insert(&self, transaction: &CheckoutTransaction) -> CreditsResult<()> {
        sqlx::query(
            r#"
            INSERT INTO checkout_transactions
                (id, checkout_id, device_id, product_sku, amount_cents, currency, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(transaction.id)
        .bind(&transaction.checkout_id)
        .bind(&transaction.device_id)
        .bind(&transaction.product_sku)
        .bind(transaction.amount_cents)
        .bind(&transaction.currency)
        .bind(transaction.status.as_str())
        .bind(transaction.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, checkout_id: &str) -> CreditsResult<Option<CheckoutTransaction>> {
        let row: Option<TransactionRow> = sqlx::query_as(
            r#"
            SELECT id, checkout_id, device_id, product_sku, amount_cents, currency, status,
                   creem_order_id, webhook_payload, created_at, completed_at
            FROM checkout_transactions
            WHERE checkout_id = $1
            "#,
        )
        .bind(checkout_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CheckoutTransaction::try_from).transpose()
    }

    async fn complete(
        &self,
        checkout_id: &str,
        creem_order_id: Option<&str>,
        payload: &serde_json::Value,
        tokens: i64,
    ) -> CreditsResult<CompletionOutcome> {
        let mut tx = self.pool.begin().await?;

        // Compare-and-set: only the delivery that catches the row in
        // `pending` gets it back and proceeds to the grant.
        let claimed: Option<TransactionRow> = sqlx::query_as(
            r#"
            UPDATE checkout_transactions
            SET status = 'completed',
                completed_at = NOW(),
                creem_order_id = $2,
                webhook_payload = $3
            WHERE checkout_id = $1 AND status = 'pending'
            RETURNING id, checkout_id, device_id, product_sku, amount_cents, currency, status,
                      creem_order_id, webhook_payload, created_at, completed_at
            "#,
        )
        .bind(checkout_id)
        .bind(creem_order_id)
        .bind(payload)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = claimed else {
            let exists: Option<(String,)> =
                sqlx::query_as("SELECT status FROM checkout_transactions WHERE checkout_id = $1")
                    .bind(checkout_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return Ok(match exists {
                Some(_) => CompletionOutcome::AlreadyProcessed,
                None => CompletionOutcome::NotFound,
            });
        };

        let transaction = CheckoutTransaction::try_from(row)?;
        let grant_reference = transaction.id.to_string();

        let entitlement: EntitlementRow = sqlx::query_as(GRANT_SQL)
            .bind(&transaction.device_id)
            .bind(tokens)
            .bind(&grant_reference)
            .bind(&transaction.product_sku)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(CompletionOutcome::Granted {
            transaction,
            entitlement: entitlement.into(),
        })
    }
}
