use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::db::store::LedgerStore;
use crate::ledger::error::{LedgerError, ValidationError};
use crate::ledger::model::{
    Balance, BalanceDelta, BankDetails, NewWithdrawal, Transition, WithdrawalRequest,
    WithdrawalStatus,
};

const WITHDRAWAL_COLUMNS: &str = "id, user_id, requested_amount, fee, net_amount, status, \
     bank_details, gateway_reference, failure_reason, created_at, updated_at, resolved_at";

const ONE_ACTIVE_PER_USER: &str = "withdrawals_one_active_per_user";
const CHECK_VIOLATION: &str = "23514";
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, FromRow)]
struct WithdrawalRow {
    id: Uuid,
    user_id: String,
    requested_amount: Decimal,
    fee: Decimal,
    net_amount: Decimal,
    status: String,
    bank_details: Json<BankDetails>,
    gateway_reference: Option<String>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<WithdrawalRow> for WithdrawalRequest {
    type Error = LedgerError;

    fn try_from(row: WithdrawalRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<WithdrawalStatus>()
            .map_err(|e| LedgerError::CorruptRecord(format!("withdrawal {}: {}", row.id, e)))?;

        Ok(WithdrawalRequest {
            id: row.id,
            user_id: row.user_id,
            requested_amount: row.requested_amount,
            fee: row.fee,
            net_amount: row.net_amount,
            status,
            bank_details: row.bank_details.0,
            gateway_reference: row.gateway_reference,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
            resolved_at: row.resolved_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct BalanceRow {
    available: Decimal,
    pending: Decimal,
    total: Decimal,
}

impl From<BalanceRow> for Balance {
    fn from(row: BalanceRow) -> Self {
        Balance::new(row.available, row.pending, row.total)
    }
}

/// Maps constraint violations onto ledger errors; everything else stays a database error.
fn map_db_error(user_id: &str, err: sqlx::Error) -> LedgerError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some(CHECK_VIOLATION) => return LedgerError::BalanceInvariant(user_id.to_string()),
            Some(UNIQUE_VIOLATION) if db_err.constraint() == Some(ONE_ACTIVE_PER_USER) => {
                return LedgerError::WithdrawalInProgress
            }
            _ => {}
        }
    }
    LedgerError::Database(err)
}

/// PostgreSQL-backed ledger.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn apply_delta(
        conn: &mut PgConnection,
        user_id: &str,
        delta: BalanceDelta,
    ) -> Result<Balance, LedgerError> {
        let row = sqlx::query_as::<_, BalanceRow>(
            r#"
            UPDATE balances
            SET available = available + $2,
                pending = pending + $3,
                total = total + $4,
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING available, pending, total
            "#,
        )
        .bind(user_id)
        .bind(delta.available)
        .bind(delta.pending)
        .bind(delta.total)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_db_error(user_id, e))?;

        row.map(Balance::from)
            .ok_or_else(|| LedgerError::BalanceInvariant(user_id.to_string()))
    }

    async fn lock_withdrawal(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<WithdrawalRequest, LedgerError> {
        let sql = format!(
            "SELECT {} FROM withdrawals WHERE id = $1 FOR UPDATE",
            WITHDRAWAL_COLUMNS
        );
        let row = sqlx::query_as::<_, WithdrawalRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        row.ok_or(LedgerError::NotFound(id))?.try_into()
    }

    async fn fetch_one_where(
        &self,
        condition: &str,
        value: &str,
    ) -> Result<Option<WithdrawalRequest>, LedgerError> {
        let sql = format!(
            "SELECT {} FROM withdrawals WHERE {} LIMIT 1",
            WITHDRAWAL_COLUMNS, condition
        );
        sqlx::query_as::<_, WithdrawalRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?
            .map(WithdrawalRequest::try_from)
            .transpose()
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn balance(&self, user_id: &str) -> Result<Balance, LedgerError> {
        let row = sqlx::query_as::<_, BalanceRow>(
            "SELECT available, pending, total FROM balances WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Balance::from).unwrap_or_default())
    }

    async fn credit(&self, user_id: &str, amount: Decimal) -> Result<Balance, LedgerError> {
        let row = sqlx::query_as::<_, BalanceRow>(
            r#"
            INSERT INTO balances (user_id, available, pending, total)
            VALUES ($1, $2, 0, $2)
            ON CONFLICT (user_id) DO UPDATE
            SET available = balances.available + EXCLUDED.available,
                total = balances.total + EXCLUDED.total,
                updated_at = NOW()
            RETURNING available, pending, total
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_error(user_id, e))?;

        Ok(row.into())
    }

    async fn bank_details(&self, user_id: &str) -> Result<Option<BankDetails>, LedgerError> {
        let details = sqlx::query_as::<_, BankDetails>(
            r#"
            SELECT account_number, ifsc_code, account_holder_name, bank_name
            FROM bank_details
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(details)
    }

    async fn save_bank_details(
        &self,
        user_id: &str,
        details: &BankDetails,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO bank_details (user_id, account_number, ifsc_code, account_holder_name, bank_name)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE
            SET account_number = EXCLUDED.account_number,
                ifsc_code = EXCLUDED.ifsc_code,
                account_holder_name = EXCLUDED.account_holder_name,
                bank_name = EXCLUDED.bank_name,
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(&details.account_number)
        .bind(&details.ifsc_code)
        .bind(&details.account_holder_name)
        .bind(&details.bank_name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn open_withdrawal(&self, new: NewWithdrawal) -> Result<WithdrawalRequest, LedgerError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO balances (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(&new.user_id)
            .execute(&mut *tx)
            .await?;

        // Row lock serialises concurrent requests from the same user.
        let balance: Balance = sqlx::query_as::<_, BalanceRow>(
            "SELECT available, pending, total FROM balances WHERE user_id = $1 FOR UPDATE",
        )
        .bind(&new.user_id)
        .fetch_one(&mut *tx)
        .await?
        .into();

        let active: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM withdrawals
            WHERE user_id = $1 AND status IN ('pending', 'processing')
            LIMIT 1
            "#,
        )
        .bind(&new.user_id)
        .fetch_optional(&mut *tx)
        .await?;
        if active.is_some() {
            return Err(LedgerError::WithdrawalInProgress);
        }

        if balance.available < new.amount {
            return Err(ValidationError::InsufficientBalance {
                requested: new.amount,
                available: balance.available,
            }
            .into());
        }

        Self::apply_delta(&mut tx, &new.user_id, BalanceDelta::hold(new.amount)).await?;

        let sql = format!(
            r#"
            INSERT INTO withdrawals
                (id, user_id, requested_amount, fee, net_amount, status, bank_details)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6)
            RETURNING {}
            "#,
            WITHDRAWAL_COLUMNS
        );
        let row = sqlx::query_as::<_, WithdrawalRow>(&sql)
            .bind(new.id)
            .bind(&new.user_id)
            .bind(new.amount)
            .bind(new.fee)
            .bind(new.net_amount)
            .bind(Json(&new.bank_details))
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_db_error(&new.user_id, e))?;

        tx.commit().await?;
        row.try_into()
    }

    async fn transition(&self, transition: Transition) -> Result<WithdrawalRequest, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let current = Self::lock_withdrawal(&mut tx, transition.id).await?;
        if current.status != transition.from || !transition.is_allowed() {
            return Err(LedgerError::InvalidTransition {
                from: current.status,
                to: transition.to,
            });
        }

        let delta = BalanceDelta::for_status(transition.to, current.requested_amount);
        if !delta.is_zero() {
            Self::apply_delta(&mut tx, &current.user_id, delta).await?;
        }

        let sql = format!(
            r#"
            UPDATE withdrawals
            SET status = $2,
                gateway_reference = COALESCE($3, gateway_reference),
                failure_reason = COALESCE($4, failure_reason),
                updated_at = NOW(),
                resolved_at = CASE WHEN $5 THEN NOW() ELSE resolved_at END
            WHERE id = $1
            RETURNING {}
            "#,
            WITHDRAWAL_COLUMNS
        );
        let row = sqlx::query_as::<_, WithdrawalRow>(&sql)
            .bind(transition.id)
            .bind(transition.to.as_str())
            .bind(transition.gateway_reference.as_deref())
            .bind(transition.failure_reason.as_deref())
            .bind(transition.to.is_terminal())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn record_gateway_reference(
        &self,
        id: Uuid,
        reference: &str,
    ) -> Result<WithdrawalRequest, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let current = Self::lock_withdrawal(&mut tx, id).await?;
        if current.status != WithdrawalStatus::Processing {
            return Err(LedgerError::InvalidTransition {
                from: current.status,
                to: WithdrawalStatus::Processing,
            });
        }

        let sql = format!(
            "UPDATE withdrawals SET gateway_reference = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            WITHDRAWAL_COLUMNS
        );
        let row = sqlx::query_as::<_, WithdrawalRow>(&sql)
            .bind(id)
            .bind(reference)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn attach_bank_details(
        &self,
        id: Uuid,
        details: &BankDetails,
    ) -> Result<WithdrawalRequest, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let current = Self::lock_withdrawal(&mut tx, id).await?;
        if current.status != WithdrawalStatus::Pending || current.bank_details.is_complete() {
            return Err(LedgerError::SnapshotLocked(id));
        }

        let sql = format!(
            "UPDATE withdrawals SET bank_details = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            WITHDRAWAL_COLUMNS
        );
        let row = sqlx::query_as::<_, WithdrawalRow>(&sql)
            .bind(id)
            .bind(Json(details))
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn withdrawal(&self, id: Uuid) -> Result<Option<WithdrawalRequest>, LedgerError> {
        let sql = format!("SELECT {} FROM withdrawals WHERE id = $1", WITHDRAWAL_COLUMNS);
        sqlx::query_as::<_, WithdrawalRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(WithdrawalRequest::try_from)
            .transpose()
    }

    async fn withdrawal_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<WithdrawalRequest>, LedgerError> {
        self.fetch_one_where("gateway_reference = $1", reference)
            .await
    }

    async fn active_withdrawal(
        &self,
        user_id: &str,
    ) -> Result<Option<WithdrawalRequest>, LedgerError> {
        self.fetch_one_where(
            "user_id = $1 AND status IN ('pending', 'processing')",
            user_id,
        )
        .await
    }

    async fn withdrawals_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<WithdrawalRequest>, LedgerError> {
        let sql = format!(
            "SELECT {} FROM withdrawals WHERE user_id = $1 ORDER BY created_at DESC, id",
            WITHDRAWAL_COLUMNS
        );
        sqlx::query_as::<_, WithdrawalRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(WithdrawalRequest::try_from)
            .collect()
    }

    async fn stale_processing(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<WithdrawalRequest>, LedgerError> {
        let sql = format!(
            r#"
            SELECT {} FROM withdrawals
            WHERE status = 'processing' AND updated_at < $1
            ORDER BY updated_at
            LIMIT $2
            "#,
            WITHDRAWAL_COLUMNS
        );
        sqlx::query_as::<_, WithdrawalRow>(&sql)
            .bind(older_than)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(WithdrawalRequest::try_from)
            .collect()
    }
}
