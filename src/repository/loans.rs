//! Loan store: persistence of loan records

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::loan::{Loan, LoanStatus},
};

/// Storage of loans, keyed by loan id with lookups by user and device
#[async_trait]
pub trait LoanStore: Send + Sync {
    async fn list(&self) -> AppResult<Vec<Loan>>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Loan>>;

    async fn get_by_user_id(&self, user_id: &str) -> AppResult<Vec<Loan>>;

    async fn get_by_device_id(&self, device_id: &str) -> AppResult<Vec<Loan>>;

    /// Insert or update by id. Refuses a second active loan for a device.
    async fn save(&self, loan: &Loan) -> AppResult<Loan>;

    async fn delete(&self, id: Uuid) -> AppResult<()>;

    /// Write `loan` only if the stored record still has status `expected`.
    /// Returns false when the record changed underneath or is gone.
    async fn save_if_status(&self, loan: &Loan, expected: LoanStatus) -> AppResult<bool>;

    /// Delete only if the stored record still has status `expected`
    async fn delete_if_status(&self, id: Uuid, expected: LoanStatus) -> AppResult<bool>;
}

fn active_loan_conflict(device_id: &str) -> AppError {
    AppError::Conflict(format!(
        "Device {} is already reserved or on loan",
        device_id
    ))
}

/// In-memory loan store
#[derive(Default)]
pub struct MemoryLoansRepository {
    loans: RwLock<Vec<Loan>>,
}

impl MemoryLoansRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoanStore for MemoryLoansRepository {
    async fn list(&self) -> AppResult<Vec<Loan>> {
        Ok(self.loans.read().await.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Loan>> {
        Ok(self.loans.read().await.iter().find(|l| l.id == id).cloned())
    }

    async fn get_by_user_id(&self, user_id: &str) -> AppResult<Vec<Loan>> {
        Ok(self
            .loans
            .read()
            .await
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_by_device_id(&self, device_id: &str) -> AppResult<Vec<Loan>> {
        Ok(self
            .loans
            .read()
            .await
            .iter()
            .filter(|l| l.device_id == device_id)
            .cloned()
            .collect())
    }

    async fn save(&self, loan: &Loan) -> AppResult<Loan> {
        let mut loans = self.loans.write().await;

        if loan.is_active()
            && loans
                .iter()
                .any(|l| l.id != loan.id && l.device_id == loan.device_id && l.is_active())
        {
            return Err(active_loan_conflict(&loan.device_id));
        }

        match loans.iter_mut().find(|l| l.id == loan.id) {
            Some(existing) => *existing = loan.clone(),
            None => loans.push(loan.clone()),
        }

        Ok(loan.clone())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.loans.write().await.retain(|l| l.id != id);
        Ok(())
    }

    async fn save_if_status(&self, loan: &Loan, expected: LoanStatus) -> AppResult<bool> {
        let mut loans = self.loans.write().await;
        match loans.iter_mut().find(|l| l.id == loan.id) {
            Some(existing) if existing.status == expected => {
                *existing = loan.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_if_status(&self, id: Uuid, expected: LoanStatus) -> AppResult<bool> {
        let mut loans = self.loans.write().await;
        let before = loans.len();
        loans.retain(|l| !(l.id == id && l.status == expected));
        Ok(loans.len() < before)
    }
}

/// Postgres loan store
#[derive(Clone)]
pub struct PgLoansRepository {
    pool: Pool<Postgres>,
}

impl PgLoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoanStore for PgLoansRepository {
    async fn list(&self) -> AppResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>("SELECT * FROM loans ORDER BY reserved_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(loans)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(loan)
    }

    async fn get_by_user_id(&self, user_id: &str) -> AppResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(
            "SELECT * FROM loans WHERE user_id = $1 ORDER BY reserved_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }

    async fn get_by_device_id(&self, device_id: &str) -> AppResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(
            "SELECT * FROM loans WHERE device_id = $1 ORDER BY reserved_at DESC",
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }

    async fn save(&self, loan: &Loan) -> AppResult<Loan> {
        let saved = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (
                id, user_id, device_id, device_model, reserved_at,
                collected_at, returned_at, due_date, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                collected_at = EXCLUDED.collected_at,
                returned_at = EXCLUDED.returned_at,
                status = EXCLUDED.status
            RETURNING *
            "#,
        )
        .bind(loan.id)
        .bind(&loan.user_id)
        .bind(&loan.device_id)
        .bind(&loan.device_model)
        .bind(loan.reserved_at)
        .bind(loan.collected_at)
        .bind(loan.returned_at)
        .bind(loan.due_date)
        .bind(loan.status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            // uq_loans_active_device
            let unique = e
                .as_database_error()
                .map_or(false, |db| db.is_unique_violation());
            if unique {
                active_loan_conflict(&loan.device_id)
            } else {
                AppError::Database(e)
            }
        })?;

        Ok(saved)
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM loans WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_if_status(&self, loan: &Loan, expected: LoanStatus) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE loans
            SET collected_at = $2, returned_at = $3, status = $4
            WHERE id = $1 AND status = $5
            "#,
        )
        .bind(loan.id)
        .bind(loan.collected_at)
        .bind(loan.returned_at)
        .bind(loan.status)
        .bind(expected)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_if_status(&self, id: Uuid, expected: LoanStatus) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM loans WHERE id = $1 AND status = $2")
            .bind(id)
            .bind(expected)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
