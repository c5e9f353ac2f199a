//! PostgreSQL ledger store.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use ledgerbank_common::{
    Account, AccountId, AccountNumber, Currency, CurrencyPair, ExchangeRate, RateId,
    StorageError, Timestamp, Transaction, TransactionId, TransactionType, Transfer, TransferId,
};

use crate::store::{LedgerStore, StoreResult};

const UNIQUE_VIOLATION: &str = "23505";

fn db_error(err: sqlx::Error) -> StorageError {
    match err {
        sqlx::Error::RowNotFound => StorageError::NotFound("row not found".into()),
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StorageError::Conflict(db.message().to_string())
        }
        other => StorageError::Database(other.to_string()),
    }
}

#[derive(FromRow)]
struct AccountRow {
    account_uuid: Uuid,
    account_number: String,
    account_name: String,
    currency: String,
    current_balance: Decimal,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: AccountId::from_uuid(row.account_uuid),
            account_number: AccountNumber::new(row.account_number),
            name: row.account_name,
            currency: Currency::new(row.currency.trim()),
            balance: row.current_balance,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct TransactionRow {
    transaction_uuid: Uuid,
    account_uuid: Uuid,
    transaction_timestamp: Timestamp,
    amount: Decimal,
    transaction_type: String,
    notes: Option<String>,
    transfer_uuid: Option<Uuid>,
}

impl From<TransactionRow> for Transaction {
    fn from(row: TransactionRow) -> Self {
        Transaction {
            id: TransactionId::from_uuid(row.transaction_uuid),
            account_id: AccountId::from_uuid(row.account_uuid),
            transaction_type: row
                .transaction_type
                .parse()
                .unwrap_or(TransactionType::Unknown),
            amount: row.amount,
            timestamp: row.transaction_timestamp,
            notes: row.notes,
            transfer_id: row.transfer_uuid.map(TransferId::from_uuid),
        }
    }
}

#[derive(FromRow)]
struct TransferRow {
    transfer_uuid: Uuid,
    from_account_uuid: Uuid,
    to_account_uuid: Uuid,
    currency: String,
    amount: Decimal,
    transfer_timestamp: Timestamp,
    transfer_success: bool,
}

impl From<TransferRow> for Transfer {
    fn from(row: TransferRow) -> Self {
        Transfer {
            id: TransferId::from_uuid(row.transfer_uuid),
            from_account_id: AccountId::from_uuid(row.from_account_uuid),
            to_account_id: AccountId::from_uuid(row.to_account_uuid),
            currency: Currency::new(row.currency.trim()),
            amount: row.amount,
            timestamp: row.transfer_timestamp,
            success: row.transfer_success,
        }
    }
}

#[derive(FromRow)]
struct ExchangeRateRow {
    exchange_rate_uuid: Uuid,
    from_currency: String,
    to_currency: String,
    rate: Decimal,
    valid_from_timestamp: Timestamp,
    valid_to_timestamp: Timestamp,
    created_at: Timestamp,
}

impl From<ExchangeRateRow> for ExchangeRate {
    fn from(row: ExchangeRateRow) -> Self {
        ExchangeRate {
            id: RateId::from_uuid(row.exchange_rate_uuid),
            pair: CurrencyPair::new(row.from_currency.trim(), row.to_currency.trim()),
            rate: row.rate,
            valid_from: row.valid_from_timestamp,
            valid_to: row.valid_to_timestamp,
            created_at: row.created_at,
        }
    }
}

/// Ledger store backed by PostgreSQL.
///
/// Multi-write operations run inside a single database transaction. Balances
/// are updated with `current_balance = current_balance + delta`, never by
/// writing back a value computed from a previously read row.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Connect to the database.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(db_error)?;

        info!(max_connections, "Connected to ledger database");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;
        info!("Ledger schema up to date");
        Ok(())
    }

    /// Insert an account.
    pub async fn open_account(&self, account: &Account) -> StoreResult<AccountId> {
        sqlx::query(
            "INSERT INTO bank_accounts \
             (account_uuid, account_number, account_name, currency, current_balance, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(account.id.as_uuid())
        .bind(account.account_number.as_str())
        .bind(&account.name)
        .bind(account.currency.code())
        .bind(account.balance)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(account.id)
    }

    async fn post(
        conn: &mut PgConnection,
        account_id: AccountId,
        transaction: &Transaction,
    ) -> StoreResult<()> {
        let delta = transaction
            .transaction_type
            .signed(transaction.amount)
            .ok_or_else(|| StorageError::Conflict("unknown transaction type".into()))?;
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO bank_transactions \
             (transaction_uuid, account_uuid, transaction_timestamp, amount, transaction_type, notes, transfer_uuid, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)",
        )
        .bind(transaction.id.as_uuid())
        .bind(account_id.as_uuid())
        .bind(transaction.timestamp)
        .bind(transaction.amount)
        .bind(transaction.transaction_type.as_str())
        .bind(transaction.notes.as_deref())
        .bind(transaction.transfer_id.map(|id| *id.as_uuid()))
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;

        let updated = sqlx::query(
            "UPDATE bank_accounts \
             SET current_balance = current_balance + $1, updated_at = $2 \
             WHERE account_uuid = $3",
        )
        .bind(delta)
        .bind(now)
        .bind(account_id.as_uuid())
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;

        if updated.rows_affected() != 1 {
            return Err(StorageError::NotFound(format!("account {account_id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn find_account(&self, account_number: &AccountNumber) -> StoreResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT account_uuid, account_number, account_name, currency, current_balance, created_at, updated_at \
             FROM bank_accounts WHERE account_number = $1",
        )
        .bind(account_number.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.map(Account::from))
    }

    async fn insert_exchange_rate(&self, rate: &ExchangeRate) -> StoreResult<RateId> {
        sqlx::query(
            "INSERT INTO bank_exchange_rates \
             (exchange_rate_uuid, from_currency, to_currency, rate, valid_from_timestamp, valid_to_timestamp, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7)",
        )
        .bind(rate.id.as_uuid())
        .bind(rate.pair.from.code())
        .bind(rate.pair.to.code())
        .bind(rate.rate)
        .bind(rate.valid_from)
        .bind(rate.valid_to)
        .bind(rate.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rate.id)
    }

    async fn find_exchange_rate(
        &self,
        pair: &CurrencyPair,
        at: Timestamp,
    ) -> StoreResult<Option<ExchangeRate>> {
        let row = sqlx::query_as::<_, ExchangeRateRow>(
            "SELECT exchange_rate_uuid, from_currency, to_currency, rate, valid_from_timestamp, valid_to_timestamp, created_at \
             FROM bank_exchange_rates \
             WHERE from_currency = $1 AND to_currency = $2 \
               AND $3 BETWEEN valid_from_timestamp AND valid_to_timestamp \
             ORDER BY created_at DESC, exchange_rate_uuid DESC \
             LIMIT 1",
        )
        .bind(pair.from.code())
        .bind(pair.to.code())
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.map(ExchangeRate::from))
    }

    #[instrument(skip(self, account, transaction), fields(transaction_id = %transaction.id))]
    async fn insert_transaction_and_update_balance(
        &self,
        account: &Account,
        transaction: &Transaction,
    ) -> StoreResult<TransactionId> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        Self::post(&mut *tx, account.id, transaction).await?;
        tx.commit().await.map_err(db_error)?;

        debug!("Transaction committed");
        Ok(transaction.id)
    }

    async fn insert_transfer(&self, transfer: &Transfer) -> StoreResult<TransferId> {
        sqlx::query(
            "INSERT INTO bank_transfers \
             (transfer_uuid, from_account_uuid, to_account_uuid, currency, amount, transfer_timestamp, transfer_success, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)",
        )
        .bind(transfer.id.as_uuid())
        .bind(transfer.from_account_id.as_uuid())
        .bind(transfer.to_account_id.as_uuid())
        .bind(transfer.currency.code())
        .bind(transfer.amount)
        .bind(transfer.timestamp)
        .bind(transfer.success)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(transfer.id)
    }

    #[instrument(skip_all, fields(out_leg = %out_leg.id, in_leg = %in_leg.id))]
    async fn insert_transfer_legs_and_update_balances(
        &self,
        from: &Account,
        to: &Account,
        out_leg: &Transaction,
        in_leg: &Transaction,
    ) -> StoreResult<()> {
        // Dropping `tx` without commit rolls back.
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        Self::post(&mut *tx, from.id, out_leg).await?;
        Self::post(&mut *tx, to.id, in_leg).await?;
        tx.commit().await.map_err(db_error)?;

        debug!("Transfer legs committed");
        Ok(())
    }

    async fn update_transfer_status(&self, transfer: &Transfer, success: bool) -> StoreResult<()> {
        let updated = sqlx::query(
            "UPDATE bank_transfers SET transfer_success = $1, updated_at = $2 WHERE transfer_uuid = $3",
        )
        .bind(success)
        .bind(Utc::now())
        .bind(transfer.id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if updated.rows_affected() != 1 {
            return Err(StorageError::NotFound(format!("transfer {}", transfer.id)));
        }
        Ok(())
    }

    async fn find_transfer(&self, id: TransferId) -> StoreResult<Option<Transfer>> {
        let row = sqlx::query_as::<_, TransferRow>(
            "SELECT transfer_uuid, from_account_uuid, to_account_uuid, currency, amount, transfer_timestamp, transfer_success \
             FROM bank_transfers WHERE transfer_uuid = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.map(Transfer::from))
    }

    async fn list_transactions(&self, account_id: AccountId) -> StoreResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            "SELECT transaction_uuid, account_uuid, transaction_timestamp, amount, transaction_type, notes, transfer_uuid \
             FROM bank_transactions WHERE account_uuid = $1 \
             ORDER BY created_at, transaction_uuid",
        )
        .bind(account_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(Transaction::from).collect())
    }
}
