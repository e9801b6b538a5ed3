// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, types::Json};

use super::{
    AccessCardStore, AdminDirectory, ResultStore, SchoolStore, StoreError, StoreResult,
    StudentDirectory,
};
use crate::models::{
    access_card::{AccessCard, CardReissue, CardStatus, CardSummary, CardUsage, NewAccessCard},
    admin::Admin,
    result::{
        Cohort, CreateResultRequest, Placement, ResultFilter, ResultRecord, UpdateResultRequest,
    },
    student::{CreateStudentRequest, Student, UpdateStudentRequest},
};

/// `SchoolStore` over a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded migrations in `migrations/`.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Maps unique-constraint violations to `StoreError::Conflict`.
fn unique_violation(err: sqlx::Error, message: impl FnOnce() -> String) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err
        && db_err.is_unique_violation()
    {
        return StoreError::Conflict(message());
    }
    StoreError::Database(err)
}

#[async_trait]
impl StudentDirectory for PgStore {
    async fn find_student(&self, student_id: &str) -> StoreResult<Option<Student>> {
        let row = sqlx::query_as::<_, Student>("SELECT * FROM students WHERE student_id = $1")
            .bind(student_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_students(&self, class_name: Option<&str>) -> StoreResult<Vec<Student>> {
        let rows = sqlx::query_as::<_, Student>(
            r#"
            SELECT * FROM students
            WHERE ($1::TEXT IS NULL OR class_name = $1)
            ORDER BY class_name, full_name, id
            "#,
        )
        .bind(class_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn create_student(
        &self,
        student: &CreateStudentRequest,
        created_at: DateTime<Utc>,
    ) -> StoreResult<Student> {
        sqlx::query_as::<_, Student>(
            r#"
            INSERT INTO students (student_id, full_name, class_name, gender, photo_url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&student.student_id)
        .bind(&student.full_name)
        .bind(&student.class_name)
        .bind(&student.gender)
        .bind(&student.photo_url)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            unique_violation(e, || {
                format!("Student '{}' already exists", student.student_id)
            })
        })
    }

    async fn update_student(
        &self,
        student_id: &str,
        patch: &UpdateStudentRequest,
    ) -> StoreResult<Option<Student>> {
        if patch.is_empty() {
            return self.find_student(student_id).await;
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE students SET ");
        let mut separated = builder.separated(", ");

        if let Some(full_name) = &patch.full_name {
            separated.push("full_name = ");
            separated.push_bind_unseparated(full_name.clone());
        }

        if let Some(class_name) = &patch.class_name {
            separated.push("class_name = ");
            separated.push_bind_unseparated(class_name.clone());
        }

        if let Some(gender) = &patch.gender {
            separated.push("gender = ");
            separated.push_bind_unseparated(gender.clone());
        }

        if let Some(photo_url) = &patch.photo_url {
            separated.push("photo_url = ");
            separated.push_bind_unseparated(photo_url.clone());
        }

        builder.push(" WHERE student_id = ");
        builder.push_bind(student_id.to_string());
        builder.push(" RETURNING *");

        let row = builder
            .build_query_as::<Student>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn delete_student(&self, student_id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM students WHERE student_id = $1")
            .bind(student_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AccessCardStore for PgStore {
    async fn insert_cards(&self, cards: &[NewAccessCard]) -> StoreResult<Vec<AccessCard>> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(cards.len());

        for card in cards {
            let row = sqlx::query_as::<_, AccessCard>(
                r#"
                INSERT INTO access_cards
                    (serial_number, pin, pin_hash, status, expiry_date, usage_limit, usage_count, created_at)
                VALUES ($1, $2, $3, 'unused', $4, $5, 0, $6)
                RETURNING *
                "#,
            )
            .bind(&card.serial_number)
            .bind(&card.pin)
            .bind(&card.pin_hash)
            .bind(card.expiry_date)
            .bind(card.usage_limit)
            .bind(card.created_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                unique_violation(e, || {
                    format!("Card '{}' collides with an existing card", card.serial_number)
                })
            })?;
            inserted.push(row);
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn find_card_by_pin(&self, pin: &str) -> StoreResult<Option<AccessCard>> {
        let row = sqlx::query_as::<_, AccessCard>("SELECT * FROM access_cards WHERE pin = $1")
            .bind(pin)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_card_by_serial(&self, serial_number: &str) -> StoreResult<Option<AccessCard>> {
        let row =
            sqlx::query_as::<_, AccessCard>("SELECT * FROM access_cards WHERE serial_number = $1")
                .bind(serial_number)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    async fn get_card(&self, id: i64) -> StoreResult<Option<AccessCard>> {
        let row = sqlx::query_as::<_, AccessCard>("SELECT * FROM access_cards WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_cards(&self, status: Option<CardStatus>) -> StoreResult<Vec<AccessCard>> {
        let rows = sqlx::query_as::<_, AccessCard>(
            r#"
            SELECT * FROM access_cards
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY id DESC
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn card_summary(&self) -> StoreResult<CardSummary> {
        let counts = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM access_cards GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut summary = CardSummary::default();
        for (status, count) in counts {
            match status.parse::<CardStatus>() {
                Ok(status) => summary.add(status, count),
                Err(e) => tracing::warn!("Skipping card count: {}", e),
            }
        }
        Ok(summary)
    }

    async fn mark_card_expired(&self, id: i64) -> StoreResult<()> {
        sqlx::query(
            "UPDATE access_cards SET status = 'expired' WHERE id = $1 AND status IN ('unused', 'used')",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_card_usage(
        &self,
        id: i64,
        expected_usage_count: i32,
        usage: &CardUsage,
    ) -> StoreResult<bool> {
        // SET expressions read the pre-update row, so the guard and the
        // increment see the same usage_count.
        let result = sqlx::query(
            r#"
            UPDATE access_cards
            SET usage_count = usage_count + 1,
                used_at = $2,
                used_by = $3,
                bound_student_id = COALESCE(bound_student_id, $3),
                status = CASE WHEN usage_count + 1 >= usage_limit THEN 'used' ELSE status END
            WHERE id = $1
              AND usage_count = $4
              AND status IN ('unused', 'used')
              AND (bound_student_id IS NULL OR bound_student_id = $3)
            "#,
        )
        .bind(id)
        .bind(usage.used_at)
        .bind(&usage.student_id)
        .bind(expected_usage_count)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn reissue_card(
        &self,
        id: i64,
        reissue: &CardReissue,
    ) -> StoreResult<Option<AccessCard>> {
        sqlx::query_as::<_, AccessCard>(
            r#"
            UPDATE access_cards
            SET pin = $2,
                pin_hash = $3,
                expiry_date = $4,
                usage_limit = $5,
                usage_count = 0,
                status = 'unused',
                bound_student_id = NULL,
                used_at = NULL,
                used_by = NULL
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&reissue.pin)
        .bind(&reissue.pin_hash)
        .bind(reissue.expiry_date)
        .bind(reissue.usage_limit)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unique_violation(e, || "PIN collides with an existing card".to_string()))
    }

    async fn set_card_status(
        &self,
        id: i64,
        status: CardStatus,
    ) -> StoreResult<Option<AccessCard>> {
        let row = sqlx::query_as::<_, AccessCard>(
            "UPDATE access_cards SET status = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_card(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM access_cards WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ResultStore for PgStore {
    async fn create_result(
        &self,
        result: &CreateResultRequest,
        created_at: DateTime<Utc>,
    ) -> StoreResult<ResultRecord> {
        let row = sqlx::query_as::<_, ResultRecord>(
            r#"
            INSERT INTO results
                (student_id, session, term, class_name, subjects, total_score, average, gpa,
                 teacher_remark, principal_remark, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING *
            "#,
        )
        .bind(&result.student_id)
        .bind(&result.session)
        .bind(&result.term)
        .bind(&result.class_name)
        .bind(Json(result.subjects.clone()))
        .bind(result.total_score)
        .bind(result.average)
        .bind(result.gpa)
        .bind(&result.teacher_remark)
        .bind(&result.principal_remark)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_result(&self, id: i64) -> StoreResult<Option<ResultRecord>> {
        let row = sqlx::query_as::<_, ResultRecord>("SELECT * FROM results WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_results(&self, filter: &ResultFilter) -> StoreResult<Vec<ResultRecord>> {
        let rows = sqlx::query_as::<_, ResultRecord>(
            r#"
            SELECT * FROM results
            WHERE ($1::TEXT IS NULL OR student_id = $1)
              AND ($2::TEXT IS NULL OR class_name = $2)
              AND ($3::TEXT IS NULL OR session = $3)
              AND ($4::TEXT IS NULL OR term = $4)
            ORDER BY id
            "#,
        )
        .bind(&filter.student_id)
        .bind(&filter.class_name)
        .bind(&filter.session)
        .bind(&filter.term)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_results_for_student(&self, student_id: &str) -> StoreResult<Vec<ResultRecord>> {
        let rows = sqlx::query_as::<_, ResultRecord>(
            "SELECT * FROM results WHERE student_id = $1 ORDER BY id",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update_result(
        &self,
        id: i64,
        patch: &UpdateResultRequest,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Option<ResultRecord>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE results SET ");
        let mut separated = builder.separated(", ");

        separated.push("updated_at = ");
        separated.push_bind_unseparated(updated_at);

        if let Some(student_id) = &patch.student_id {
            separated.push("student_id = ");
            separated.push_bind_unseparated(student_id.clone());
        }

        if let Some(session) = &patch.session {
            separated.push("session = ");
            separated.push_bind_unseparated(session.clone());
        }

        if let Some(term) = &patch.term {
            separated.push("term = ");
            separated.push_bind_unseparated(term.clone());
        }

        if let Some(class_name) = &patch.class_name {
            separated.push("class_name = ");
            separated.push_bind_unseparated(class_name.clone());
        }

        if let Some(subjects) = &patch.subjects {
            separated.push("subjects = ");
            separated.push_bind_unseparated(Json(subjects.clone()));
        }

        if let Some(total_score) = patch.total_score {
            separated.push("total_score = ");
            separated.push_bind_unseparated(total_score);
        }

        if let Some(average) = patch.average {
            separated.push("average = ");
            separated.push_bind_unseparated(average);
        }

        if let Some(gpa) = patch.gpa {
            separated.push("gpa = ");
            separated.push_bind_unseparated(gpa);
        }

        if let Some(remark) = &patch.teacher_remark {
            separated.push("teacher_remark = ");
            separated.push_bind_unseparated(remark.clone());
        }

        if let Some(remark) = &patch.principal_remark {
            separated.push("principal_remark = ");
            separated.push_bind_unseparated(remark.clone());
        }

        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(" RETURNING *");

        let row = builder
            .build_query_as::<ResultRecord>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn delete_result(&self, id: i64) -> StoreResult<Option<ResultRecord>> {
        let row =
            sqlx::query_as::<_, ResultRecord>("DELETE FROM results WHERE id = $1 RETURNING *")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    async fn list_cohort(&self, cohort: &Cohort) -> StoreResult<Vec<ResultRecord>> {
        let rows = sqlx::query_as::<_, ResultRecord>(
            r#"
            SELECT * FROM results
            WHERE class_name = $1 AND session = $2 AND term = $3
            ORDER BY id
            "#,
        )
        .bind(&cohort.class_name)
        .bind(&cohort.session)
        .bind(&cohort.term)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn apply_placements(&self, placements: &[Placement]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        for placement in placements {
            sqlx::query("UPDATE results SET position = $1, out_of = $2 WHERE id = $3")
                .bind(placement.position)
                .bind(placement.out_of)
                .bind(placement.result_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl AdminDirectory for PgStore {
    async fn find_admin(&self, username: &str) -> StoreResult<Option<Admin>> {
        let row = sqlx::query_as::<_, Admin>("SELECT * FROM admins WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn create_admin(&self, username: &str, password_hash: &str) -> StoreResult<Admin> {
        sqlx::query_as::<_, Admin>(
            "INSERT INTO admins (username, password) VALUES ($1, $2) RETURNING *",
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, || format!("Username '{}' already exists", username)))
    }
}

#[async_trait]
impl SchoolStore for PgStore {
    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
