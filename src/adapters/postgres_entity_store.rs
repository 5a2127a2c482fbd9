//! Postgres implementation of EntityStore.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::domain::{
    AlertDraft, FraudAlert, InvestigationStatus, Merchant, RiskProfile, StatusChange, Transaction,
    User,
};
use crate::ports::{
    AnalysisCommit, CommitOutcome, EntityStore, StatsQuery, StoreError, StoreResult, TimeWindow,
    TransactionStats,
};

const TRANSACTION_COLUMNS: &str = "transaction_id, user_id, merchant_id, amount, currency, \
    transaction_type, location_country, location_city, latitude, longitude, ip_address, \
    user_agent, timestamp, processing_time_ms, is_fraud, fraud_score, fraud_reason, created_at";

const ALERT_COLUMNS: &str = "id, transaction_id, alert_type, severity, confidence_score, \
    triggered_rules, investigation_status, false_positive, created_at, updated_at, resolved_at, \
    resolved_by";

/// Postgres-backed entity store.
#[derive(Clone)]
pub struct PostgresEntityStore {
    pool: PgPool,
}

impl PostgresEntityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn upsert_alert<'e, E>(executor: E, draft: &AlertDraft, now: DateTime<Utc>) -> StoreResult<FraudAlert>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        r#"
        INSERT INTO fraud_alerts (
            id, transaction_id, alert_type, severity, confidence_score, triggered_rules,
            investigation_status, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, 'PENDING', $7, $7)
        ON CONFLICT (transaction_id) DO UPDATE SET
            alert_type = EXCLUDED.alert_type,
            severity = EXCLUDED.severity,
            confidence_score = EXCLUDED.confidence_score,
            triggered_rules = EXCLUDED.triggered_rules,
            updated_at = EXCLUDED.updated_at
        RETURNING {}
        "#,
        ALERT_COLUMNS
    );
    let row = sqlx::query_as::<_, AlertRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(&draft.transaction_id)
        .bind(&draft.alert_type)
        .bind(draft.severity.as_str())
        .bind(draft.confidence_score)
        .bind(&draft.triggered_rules)
        .bind(now)
        .fetch_one(executor)
        .await?;
    row.into_domain()
}

#[async_trait]
impl EntityStore for PostgresEntityStore {
    async fn get_user(&self, user_id: &str) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?
            .into_domain()
    }

    async fn save_user(&self, user: &User) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (
                user_id, name, email, phone, registration_date, risk_profile,
                lifetime_value, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (user_id) DO UPDATE SET
                name = EXCLUDED.name,
                email = EXCLUDED.email,
                phone = EXCLUDED.phone,
                registration_date = EXCLUDED.registration_date,
                risk_profile = EXCLUDED.risk_profile,
                lifetime_value = EXCLUDED.lifetime_value,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(&user.user_id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(user.registration_date)
        .bind(user.risk_profile.as_str())
        .bind(&user.lifetime_value)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.pool)
        .await?;

        row.into_domain()
    }

    async fn update_user_risk_profile(&self, user_id: &str, profile: RiskProfile) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(
            "UPDATE users SET risk_profile = $2, updated_at = NOW() WHERE user_id = $1 RETURNING *",
        )
        .bind(user_id)
        .bind(profile.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?
            .into_domain()
    }

    async fn get_merchant(&self, merchant_id: &str) -> StoreResult<Merchant> {
        let row = sqlx::query_as::<_, MerchantRow>("SELECT * FROM merchants WHERE merchant_id = $1")
            .bind(merchant_id)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| StoreError::NotFound(format!("merchant {}", merchant_id)))?
            .into_domain()
    }

    async fn save_merchant(&self, merchant: &Merchant) -> StoreResult<Merchant> {
        let row = sqlx::query_as::<_, MerchantRow>(
            r#"
            INSERT INTO merchants (
                merchant_id, name, category, risk_level, country,
                avg_transaction_amount, transaction_count, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (merchant_id) DO UPDATE SET
                name = EXCLUDED.name,
                category = EXCLUDED.category,
                risk_level = EXCLUDED.risk_level,
                country = EXCLUDED.country,
                avg_transaction_amount = EXCLUDED.avg_transaction_amount,
                transaction_count = EXCLUDED.transaction_count
            RETURNING *
            "#,
        )
        .bind(&merchant.merchant_id)
        .bind(&merchant.name)
        .bind(&merchant.category)
        .bind(merchant.risk_level.as_str())
        .bind(&merchant.country)
        .bind(&merchant.avg_transaction_amount)
        .bind(merchant.transaction_count)
        .bind(merchant.created_at)
        .fetch_one(&self.pool)
        .await?;

        row.into_domain()
    }

    async fn get_transaction(&self, transaction_id: &str) -> StoreResult<Transaction> {
        let sql = format!("SELECT {} FROM transactions WHERE transaction_id = $1", TRANSACTION_COLUMNS);
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_domain())
            .ok_or_else(|| StoreError::NotFound(format!("transaction {}", transaction_id)))
    }

    async fn get_recent_transactions(
        &self,
        user_id: &str,
        window: TimeWindow,
    ) -> StoreResult<Vec<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions \
             WHERE user_id = $1 AND timestamp >= $2 AND timestamp <= $3 \
             ORDER BY timestamp DESC, transaction_id",
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(user_id)
            .bind(window.start)
            .bind(window.end)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    async fn save_transaction(&self, tx: &Transaction) -> StoreResult<Transaction> {
        let sql = format!(
            r#"
            INSERT INTO transactions ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (transaction_id) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                merchant_id = EXCLUDED.merchant_id,
                amount = EXCLUDED.amount,
                currency = EXCLUDED.currency,
                transaction_type = EXCLUDED.transaction_type,
                location_country = EXCLUDED.location_country,
                location_city = EXCLUDED.location_city,
                latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                ip_address = EXCLUDED.ip_address,
                user_agent = EXCLUDED.user_agent,
                timestamp = EXCLUDED.timestamp,
                processing_time_ms = EXCLUDED.processing_time_ms,
                is_fraud = EXCLUDED.is_fraud,
                fraud_score = EXCLUDED.fraud_score,
                fraud_reason = EXCLUDED.fraud_reason
            RETURNING {cols}
            "#,
            cols = TRANSACTION_COLUMNS
        );
        let row = bind_transaction(sqlx::query_as::<_, TransactionRow>(&sql), tx)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into_domain())
    }

    async fn set_fraud_label(&self, transaction_id: &str, is_fraud: bool) -> StoreResult<Transaction> {
        let sql = format!(
            "UPDATE transactions SET is_fraud = $2 WHERE transaction_id = $1 RETURNING {}",
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(transaction_id)
            .bind(is_fraud)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_domain())
            .ok_or_else(|| StoreError::NotFound(format!("transaction {}", transaction_id)))
    }

    async fn get_alert(&self, alert_id: Uuid) -> StoreResult<FraudAlert> {
        let sql = format!("SELECT {} FROM fraud_alerts WHERE id = $1", ALERT_COLUMNS);
        let row = sqlx::query_as::<_, AlertRow>(&sql)
            .bind(alert_id)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| StoreError::NotFound(format!("alert {}", alert_id)))?
            .into_domain()
    }

    async fn get_alert_by_transaction(&self, transaction_id: &str) -> StoreResult<Option<FraudAlert>> {
        let sql = format!("SELECT {} FROM fraud_alerts WHERE transaction_id = $1", ALERT_COLUMNS);
        let row = sqlx::query_as::<_, AlertRow>(&sql)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(AlertRow::into_domain).transpose()
    }

    async fn save_alert(&self, draft: &AlertDraft) -> StoreResult<FraudAlert> {
        upsert_alert(&self.pool, draft, Utc::now()).await
    }

    async fn update_alert_status(
        &self,
        alert_id: Uuid,
        expected: InvestigationStatus,
        change: &StatusChange,
        at: DateTime<Utc>,
    ) -> StoreResult<FraudAlert> {
        expected
            .validate_transition(change.target())
            .map_err(|e| StoreError::Conflict(e.to_string()))?;

        let (false_positive, resolved_by, resolved_at) = match change {
            StatusChange::Resolve(resolution) => (
                Some(resolution.false_positive),
                Some(resolution.resolved_by.clone()),
                Some(at),
            ),
            StatusChange::BeginReview => (None, None, None),
        };

        let sql = format!(
            r#"
            UPDATE fraud_alerts SET
                investigation_status = $3,
                false_positive = COALESCE($4, false_positive),
                resolved_by = COALESCE($5, resolved_by),
                resolved_at = COALESCE($6, resolved_at),
                updated_at = $7
            WHERE id = $1 AND investigation_status = $2
            RETURNING {}
            "#,
            ALERT_COLUMNS
        );
        let row = sqlx::query_as::<_, AlertRow>(&sql)
            .bind(alert_id)
            .bind(expected.as_str())
            .bind(change.target().as_str())
            .bind(false_positive)
            .bind(resolved_by)
            .bind(resolved_at)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row.into_domain(),
            None => {
                // distinguish a lost race from a missing alert
                let current = self.get_alert(alert_id).await?;
                Err(StoreError::Conflict(format!(
                    "alert {} is {}, expected {}",
                    alert_id, current.investigation_status, expected
                )))
            }
        }
    }

    async fn commit_analysis(&self, commit: AnalysisCommit) -> StoreResult<CommitOutcome> {
        let now = Utc::now();
        let mut db_tx = self.pool.begin().await?;

        // Re-scoring keeps the recorded facts and the operator label; reasons
        // are appended in order without duplicates.
        let sql = format!(
            r#"
            INSERT INTO transactions ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (transaction_id) DO UPDATE SET
                fraud_score = EXCLUDED.fraud_score,
                processing_time_ms = EXCLUDED.processing_time_ms,
                fraud_reason = transactions.fraud_reason || ARRAY(
                    SELECT r FROM unnest(EXCLUDED.fraud_reason) WITH ORDINALITY AS n(r, i)
                    WHERE NOT (r = ANY(transactions.fraud_reason))
                    ORDER BY i
                )
            RETURNING {cols}, (xmax = 0) AS inserted
            "#,
            cols = TRANSACTION_COLUMNS
        );
        let row = bind_transaction(sqlx::query_as::<_, CommittedRow>(&sql), &commit.transaction)
            .fetch_one(&mut *db_tx)
            .await?;
        let inserted = row.inserted;
        let transaction = row.transaction.into_domain();

        if inserted {
            if let Some(merchant_id) = &transaction.merchant_id {
                sqlx::query(
                    r#"
                    UPDATE merchants SET
                        avg_transaction_amount = CASE
                            WHEN avg_transaction_amount IS NULL OR transaction_count <= 0 THEN $2
                            ELSE avg_transaction_amount
                                + ($2 - avg_transaction_amount) / (transaction_count + 1)
                        END,
                        transaction_count = GREATEST(transaction_count, 0) + 1
                    WHERE merchant_id = $1
                    "#,
                )
                .bind(merchant_id)
                .bind(&transaction.amount)
                .execute(&mut *db_tx)
                .await?;
            }
            if let (Some(user_id), Some(credit)) = (&transaction.user_id, &commit.lifetime_credit) {
                sqlx::query(
                    "UPDATE users SET lifetime_value = lifetime_value + $2, updated_at = $3 WHERE user_id = $1",
                )
                .bind(user_id)
                .bind(credit)
                .bind(now)
                .execute(&mut *db_tx)
                .await?;
            }
        }

        let alert = match &commit.alert {
            Some(draft) => Some(upsert_alert(&mut *db_tx, draft, now).await?),
            None => None,
        };

        db_tx.commit().await?;

        Ok(CommitOutcome {
            transaction,
            alert,
            inserted,
        })
    }

    async fn recent_alerts(&self, limit: i64) -> StoreResult<Vec<FraudAlert>> {
        let sql = format!(
            "SELECT {} FROM fraud_alerts ORDER BY created_at DESC, id LIMIT $1",
            ALERT_COLUMNS
        );
        let rows = sqlx::query_as::<_, AlertRow>(&sql)
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(AlertRow::into_domain).collect()
    }

    async fn transaction_stats(&self, query: StatsQuery) -> StoreResult<TransactionStats> {
        let window = TimeWindow::ending_at(query.now, query.lookback);
        let row = sqlx::query_as::<_, StatsRow>(
            r#"
            SELECT
                COUNT(*) AS total_transactions,
                COUNT(*) FILTER (WHERE is_fraud) AS fraud_count,
                COUNT(*) FILTER (WHERE fraud_score >= $3) AS flagged_count,
                COALESCE(AVG(fraud_score), 0) AS avg_fraud_score,
                COUNT(*) FILTER (WHERE timestamp >= $4) AS last_hour,
                COUNT(*) FILTER (WHERE timestamp >= $5) AS last_day
            FROM transactions
            WHERE timestamp >= $1 AND timestamp <= $2
            "#,
        )
        .bind(window.start)
        .bind(window.end)
        .bind(query.flag_threshold)
        .bind(query.now - Duration::hours(1))
        .bind(query.now - Duration::days(1))
        .fetch_one(&self.pool)
        .await?;

        Ok(TransactionStats {
            total_transactions: row.total_transactions,
            fraud_count: row.fraud_count,
            flagged_count: row.flagged_count,
            avg_fraud_score: row.avg_fraud_score,
            last_hour: row.last_hour,
            last_day: row.last_day,
        })
    }
}

type PgQueryAs<'q, O> = sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments>;

fn bind_transaction<'q, O>(query: PgQueryAs<'q, O>, tx: &'q Transaction) -> PgQueryAs<'q, O> {
    query
        .bind(&tx.transaction_id)
        .bind(&tx.user_id)
        .bind(&tx.merchant_id)
        .bind(&tx.amount)
        .bind(&tx.currency)
        .bind(&tx.transaction_type)
        .bind(&tx.location_country)
        .bind(&tx.location_city)
        .bind(tx.latitude)
        .bind(tx.longitude)
        .bind(&tx.ip_address)
        .bind(&tx.user_agent)
        .bind(tx.timestamp)
        .bind(tx.processing_time_ms)
        .bind(tx.is_fraud)
        .bind(tx.fraud_score)
        .bind(&tx.fraud_reason)
        .bind(tx.created_at)
}

fn corrupt(column: &str, value: &str) -> StoreError {
    StoreError::Database(format!("unexpected {} value '{}'", column, value))
}

/// Internal row types for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    user_id: String,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    registration_date: Option<NaiveDate>,
    risk_profile: String,
    lifetime_value: BigDecimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_domain(self) -> StoreResult<User> {
        Ok(User {
            risk_profile: self
                .risk_profile
                .parse()
                .map_err(|_| corrupt("risk_profile", &self.risk_profile))?,
            user_id: self.user_id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            registration_date: self.registration_date,
            lifetime_value: self.lifetime_value,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MerchantRow {
    merchant_id: String,
    name: String,
    category: Option<String>,
    risk_level: String,
    country: Option<String>,
    avg_transaction_amount: Option<BigDecimal>,
    transaction_count: i64,
    created_at: DateTime<Utc>,
}

impl MerchantRow {
    fn into_domain(self) -> StoreResult<Merchant> {
        Ok(Merchant {
            risk_level: self
                .risk_level
                .parse()
                .map_err(|_| corrupt("risk_level", &self.risk_level))?,
            merchant_id: self.merchant_id,
            name: self.name,
            category: self.category,
            country: self.country,
            avg_transaction_amount: self.avg_transaction_amount,
            transaction_count: self.transaction_count,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    transaction_id: String,
    user_id: Option<String>,
    merchant_id: Option<String>,
    amount: BigDecimal,
    currency: String,
    transaction_type: Option<String>,
    location_country: Option<String>,
    location_city: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    timestamp: DateTime<Utc>,
    processing_time_ms: Option<i64>,
    is_fraud: bool,
    fraud_score: f64,
    fraud_reason: Vec<String>,
    created_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> Transaction {
        Transaction {
            transaction_id: self.transaction_id,
            user_id: self.user_id,
            merchant_id: self.merchant_id,
            amount: self.amount,
            currency: self.currency,
            transaction_type: self.transaction_type,
            location_country: self.location_country,
            location_city: self.location_city,
            latitude: self.latitude,
            longitude: self.longitude,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            timestamp: self.timestamp,
            processing_time_ms: self.processing_time_ms,
            is_fraud: self.is_fraud,
            fraud_score: self.fraud_score,
            fraud_reason: self.fraud_reason,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CommittedRow {
    #[sqlx(flatten)]
    transaction: TransactionRow,
    inserted: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct AlertRow {
    id: Uuid,
    transaction_id: String,
    alert_type: String,
    severity: String,
    confidence_score: f64,
    triggered_rules: Vec<String>,
    investigation_status: String,
    false_positive: Option<bool>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<String>,
}

impl AlertRow {
    fn into_domain(self) -> StoreResult<FraudAlert> {
        Ok(FraudAlert {
            severity: self
                .severity
                .parse()
                .map_err(|_| corrupt("severity", &self.severity))?,
            investigation_status: self
                .investigation_status
                .parse()
                .map_err(|_| corrupt("investigation_status", &self.investigation_status))?,
            id: self.id,
            transaction_id: self.transaction_id,
            alert_type: self.alert_type,
            confidence_score: self.confidence_score,
            triggered_rules: self.triggered_rules,
            false_positive: self.false_positive,
            created_at: self.created_at,
            updated_at: self.updated_at,
            resolved_at: self.resolved_at,
            resolved_by: self.resolved_by,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StatsRow {
    total_transactions: i64,
    fraud_count: i64,
    flagged_count: i64,
    avg_fraud_score: f64,
    last_hour: i64,
    last_day: i64,
}
