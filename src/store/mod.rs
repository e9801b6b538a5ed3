// src/store/mod.rs

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    access_card::{AccessCard, CardReissue, CardStatus, CardSummary, CardUsage, NewAccessCard},
    admin::Admin,
    result::{
        Cohort, CreateResultRequest, Placement, ResultFilter, ResultRecord, UpdateResultRequest,
    },
    student::{CreateStudentRequest, Student, UpdateStudentRequest},
};

/// Persistence-layer failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A unique constraint rejected the write.
    #[error("{0}")]
    Conflict(String),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Lookup and maintenance of enrolled students.
#[async_trait]
pub trait StudentDirectory: Send + Sync {
    /// Find a student by admission number.
    async fn find_student(&self, student_id: &str) -> StoreResult<Option<Student>>;

    /// List students, optionally restricted to one class.
    async fn list_students(&self, class_name: Option<&str>) -> StoreResult<Vec<Student>>;

    async fn create_student(
        &self,
        student: &CreateStudentRequest,
        created_at: DateTime<Utc>,
    ) -> StoreResult<Student>;

    /// Returns `None` when no student has this admission number.
    async fn update_student(
        &self,
        student_id: &str,
        patch: &UpdateStudentRequest,
    ) -> StoreResult<Option<Student>>;

    /// Returns whether a row was removed.
    async fn delete_student(&self, student_id: &str) -> StoreResult<bool>;
}

/// Scratch-card records.
#[async_trait]
pub trait AccessCardStore: Send + Sync {
    /// Insert a generated batch. Either every card is stored or none is.
    async fn insert_cards(&self, cards: &[NewAccessCard]) -> StoreResult<Vec<AccessCard>>;

    async fn find_card_by_pin(&self, pin: &str) -> StoreResult<Option<AccessCard>>;

    async fn find_card_by_serial(&self, serial_number: &str) -> StoreResult<Option<AccessCard>>;

    async fn get_card(&self, id: i64) -> StoreResult<Option<AccessCard>>;

    /// List cards, newest first.
    async fn list_cards(&self, status: Option<CardStatus>) -> StoreResult<Vec<AccessCard>>;

    async fn card_summary(&self) -> StoreResult<CardSummary>;

    /// Move an unused or used card to `expired`. Deactivated cards are left alone.
    async fn mark_card_expired(&self, id: i64) -> StoreResult<()>;

    /// Record one successful verification.
    ///
    /// Applies only while the stored usage count still equals
    /// `expected_usage_count`, the card is not expired or deactivated, and the
    /// card is unbound or bound to `usage.student_id`. Binds the card on first
    /// use and marks it `used` once the limit is reached. Returns whether the
    /// update was applied.
    async fn record_card_usage(
        &self,
        id: i64,
        expected_usage_count: i32,
        usage: &CardUsage,
    ) -> StoreResult<bool>;

    /// Replace the PIN and reset usage, binding and status.
    async fn reissue_card(&self, id: i64, reissue: &CardReissue)
    -> StoreResult<Option<AccessCard>>;

    async fn set_card_status(&self, id: i64, status: CardStatus)
    -> StoreResult<Option<AccessCard>>;

    async fn delete_card(&self, id: i64) -> StoreResult<bool>;
}

/// Academic results and their class positions.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn create_result(
        &self,
        result: &CreateResultRequest,
        created_at: DateTime<Utc>,
    ) -> StoreResult<ResultRecord>;

    async fn get_result(&self, id: i64) -> StoreResult<Option<ResultRecord>>;

    async fn list_results(&self, filter: &ResultFilter) -> StoreResult<Vec<ResultRecord>>;

    async fn list_results_for_student(&self, student_id: &str) -> StoreResult<Vec<ResultRecord>>;

    async fn update_result(
        &self,
        id: i64,
        patch: &UpdateResultRequest,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Option<ResultRecord>>;

    /// Returns the removed row so its cohort can be re-ranked.
    async fn delete_result(&self, id: i64) -> StoreResult<Option<ResultRecord>>;

    /// Every result of a cohort in natural load order (ascending id).
    async fn list_cohort(&self, cohort: &Cohort) -> StoreResult<Vec<ResultRecord>>;

    /// Write positions for a whole cohort in one transaction.
    async fn apply_placements(&self, placements: &[Placement]) -> StoreResult<()>;
}

/// Back-office accounts.
#[async_trait]
pub trait AdminDirectory: Send + Sync {
    async fn find_admin(&self, username: &str) -> StoreResult<Option<Admin>>;

    async fn create_admin(&self, username: &str, password_hash: &str) -> StoreResult<Admin>;
}

/// Combined store used by the application state.
#[async_trait]
pub trait SchoolStore:
    StudentDirectory + AccessCardStore + ResultStore + AdminDirectory + Send + Sync
{
    /// Check store connectivity.
    async fn health_check(&self) -> StoreResult<()>;
}
