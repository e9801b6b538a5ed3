// src/store/memory.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use tokio::sync::Mutex;

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

#[derive(Default)]
struct Tables {
    last_id: i64,
    // Rows are kept in insertion order, which is also ascending id order.
    students: Vec<Student>,
    cards: Vec<AccessCard>,
    results: Vec<ResultRecord>,
    admins: Vec<Admin>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

/// Memory-backed `SchoolStore`. Every operation holds a single lock, so each
/// call is atomic with respect to the others.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StudentDirectory for MemoryStore {
    async fn find_student(&self, student_id: &str) -> StoreResult<Option<Student>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .students
            .iter()
            .find(|s| s.student_id == student_id)
            .cloned())
    }

    async fn list_students(&self, class_name: Option<&str>) -> StoreResult<Vec<Student>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .students
            .iter()
            .filter(|s| class_name.is_none_or(|c| s.class_name == c))
            .cloned()
            .collect())
    }

    async fn create_student(
        &self,
        student: &CreateStudentRequest,
        created_at: DateTime<Utc>,
    ) -> StoreResult<Student> {
        let mut tables = self.tables.lock().await;
        if tables
            .students
            .iter()
            .any(|s| s.student_id == student.student_id)
        {
            return Err(StoreError::Conflict(format!(
                "Student '{}' already exists",
                student.student_id
            )));
        }

        let row = Student {
            id: tables.next_id(),
            student_id: student.student_id.clone(),
            full_name: student.full_name.clone(),
            class_name: student.class_name.clone(),
            gender: student.gender.clone(),
            photo_url: student.photo_url.clone(),
            created_at,
        };
        tables.students.push(row.clone());
        Ok(row)
    }

    async fn update_student(
        &self,
        student_id: &str,
        patch: &UpdateStudentRequest,
    ) -> StoreResult<Option<Student>> {
        let mut tables = self.tables.lock().await;
        let Some(row) = tables
            .students
            .iter_mut()
            .find(|s| s.student_id == student_id)
        else {
            return Ok(None);
        };

        if let Some(full_name) = &patch.full_name {
            row.full_name = full_name.clone();
        }
        if let Some(class_name) = &patch.class_name {
            row.class_name = class_name.clone();
        }
        if let Some(gender) = &patch.gender {
            row.gender = Some(gender.clone());
        }
        if let Some(photo_url) = &patch.photo_url {
            row.photo_url = Some(photo_url.clone());
        }
        Ok(Some(row.clone()))
    }

    async fn delete_student(&self, student_id: &str) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        let before = tables.students.len();
        tables.students.retain(|s| s.student_id != student_id);
        Ok(tables.students.len() < before)
    }
}

#[async_trait]
impl AccessCardStore for MemoryStore {
    async fn insert_cards(&self, cards: &[NewAccessCard]) -> StoreResult<Vec<AccessCard>> {
        let mut tables = self.tables.lock().await;

        for (i, card) in cards.iter().enumerate() {
            let clashes_stored = tables
                .cards
                .iter()
                .any(|c| c.serial_number == card.serial_number || c.pin == card.pin);
            let clashes_batch = cards[..i]
                .iter()
                .any(|c| c.serial_number == card.serial_number || c.pin == card.pin);
            if clashes_stored || clashes_batch {
                return Err(StoreError::Conflict(format!(
                    "Card '{}' collides with an existing card",
                    card.serial_number
                )));
            }
        }

        let mut inserted = Vec::with_capacity(cards.len());
        for card in cards {
            let row = AccessCard {
                id: tables.next_id(),
                serial_number: card.serial_number.clone(),
                pin: card.pin.clone(),
                pin_hash: card.pin_hash.clone(),
                bound_student_id: None,
                status: CardStatus::Unused,
                expiry_date: card.expiry_date,
                usage_limit: card.usage_limit,
                usage_count: 0,
                used_at: None,
                used_by: None,
                created_at: card.created_at,
            };
            tables.cards.push(row.clone());
            inserted.push(row);
        }
        Ok(inserted)
    }

    async fn find_card_by_pin(&self, pin: &str) -> StoreResult<Option<AccessCard>> {
        let tables = self.tables.lock().await;
        Ok(tables.cards.iter().find(|c| c.pin == pin).cloned())
    }

    async fn find_card_by_serial(&self, serial_number: &str) -> StoreResult<Option<AccessCard>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .cards
            .iter()
            .find(|c| c.serial_number == serial_number)
            .cloned())
    }

    async fn get_card(&self, id: i64) -> StoreResult<Option<AccessCard>> {
        let tables = self.tables.lock().await;
        Ok(tables.cards.iter().find(|c| c.id == id).cloned())
    }

    async fn list_cards(&self, status: Option<CardStatus>) -> StoreResult<Vec<AccessCard>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .cards
            .iter()
            .rev()
            .filter(|c| status.is_none_or(|s| c.status == s))
            .cloned()
            .collect())
    }

    async fn card_summary(&self) -> StoreResult<CardSummary> {
        let tables = self.tables.lock().await;
        let mut summary = CardSummary::default();
        for card in &tables.cards {
            summary.add(card.status, 1);
        }
        Ok(summary)
    }

    async fn mark_card_expired(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        if let Some(card) = tables.cards.iter_mut().find(|c| c.id == id)
            && matches!(card.status, CardStatus::Unused | CardStatus::Used)
        {
            card.status = CardStatus::Expired;
        }
        Ok(())
    }

    async fn record_card_usage(
        &self,
        id: i64,
        expected_usage_count: i32,
        usage: &CardUsage,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        let Some(card) = tables.cards.iter_mut().find(|c| c.id == id) else {
            return Ok(false);
        };

        let bound_elsewhere = card
            .bound_student_id
            .as_deref()
            .is_some_and(|bound| bound != usage.student_id);
        if card.usage_count != expected_usage_count || card.status.is_terminal() || bound_elsewhere
        {
            return Ok(false);
        }

        card.usage_count = expected_usage_count + 1;
        card.used_at = Some(usage.used_at);
        card.used_by = Some(usage.student_id.clone());
        if card.bound_student_id.is_none() {
            card.bound_student_id = Some(usage.student_id.clone());
        }
        if card.usage_count >= card.usage_limit {
            card.status = CardStatus::Used;
        }
        Ok(true)
    }

    async fn reissue_card(
        &self,
        id: i64,
        reissue: &CardReissue,
    ) -> StoreResult<Option<AccessCard>> {
        let mut tables = self.tables.lock().await;
        if tables
            .cards
            .iter()
            .any(|c| c.id != id && c.pin == reissue.pin)
        {
            return Err(StoreError::Conflict("PIN collides with an existing card".to_string()));
        }

        let Some(card) = tables.cards.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        card.pin = reissue.pin.clone();
        card.pin_hash = reissue.pin_hash.clone();
        card.expiry_date = reissue.expiry_date;
        card.usage_limit = reissue.usage_limit;
        card.usage_count = 0;
        card.status = CardStatus::Unused;
        card.bound_student_id = None;
        card.used_at = None;
        card.used_by = None;
        Ok(Some(card.clone()))
    }

    async fn set_card_status(
        &self,
        id: i64,
        status: CardStatus,
    ) -> StoreResult<Option<AccessCard>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.cards.iter_mut().find(|c| c.id == id).map(|card| {
            card.status = status;
            card.clone()
        }))
    }

    async fn delete_card(&self, id: i64) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        let before = tables.cards.len();
        tables.cards.retain(|c| c.id != id);
        Ok(tables.cards.len() < before)
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn create_result(
        &self,
        result: &CreateResultRequest,
        created_at: DateTime<Utc>,
    ) -> StoreResult<ResultRecord> {
        let mut tables = self.tables.lock().await;
        let row = ResultRecord {
            id: tables.next_id(),
            student_id: result.student_id.clone(),
            session: result.session.clone(),
            term: result.term.clone(),
            class_name: result.class_name.clone(),
            subjects: Json(result.subjects.clone()),
            total_score: result.total_score,
            average: result.average,
            gpa: result.gpa,
            position: None,
            out_of: None,
            teacher_remark: result.teacher_remark.clone(),
            principal_remark: result.principal_remark.clone(),
            created_at,
            updated_at: created_at,
        };
        tables.results.push(row.clone());
        Ok(row)
    }

    async fn get_result(&self, id: i64) -> StoreResult<Option<ResultRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables.results.iter().find(|r| r.id == id).cloned())
    }

    async fn list_results(&self, filter: &ResultFilter) -> StoreResult<Vec<ResultRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .results
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn list_results_for_student(&self, student_id: &str) -> StoreResult<Vec<ResultRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .results
            .iter()
            .filter(|r| r.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn update_result(
        &self,
        id: i64,
        patch: &UpdateResultRequest,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Option<ResultRecord>> {
        let mut tables = self.tables.lock().await;
        let Some(row) = tables.results.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };

        if let Some(student_id) = &patch.student_id {
            row.student_id = student_id.clone();
        }
        if let Some(session) = &patch.session {
            row.session = session.clone();
        }
        if let Some(term) = &patch.term {
            row.term = term.clone();
        }
        if let Some(class_name) = &patch.class_name {
            row.class_name = class_name.clone();
        }
        if let Some(subjects) = &patch.subjects {
            row.subjects = Json(subjects.clone());
        }
        if patch.total_score.is_some() {
            row.total_score = patch.total_score;
        }
        if patch.average.is_some() {
            row.average = patch.average;
        }
        if patch.gpa.is_some() {
            row.gpa = patch.gpa;
        }
        if let Some(remark) = &patch.teacher_remark {
            row.teacher_remark = Some(remark.clone());
        }
        if let Some(remark) = &patch.principal_remark {
            row.principal_remark = Some(remark.clone());
        }
        row.updated_at = updated_at;
        Ok(Some(row.clone()))
    }

    async fn delete_result(&self, id: i64) -> StoreResult<Option<ResultRecord>> {
        let mut tables = self.tables.lock().await;
        let position = tables.results.iter().position(|r| r.id == id);
        Ok(position.map(|index| tables.results.remove(index)))
    }

    async fn list_cohort(&self, cohort: &Cohort) -> StoreResult<Vec<ResultRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .results
            .iter()
            .filter(|r| cohort.contains(r))
            .cloned()
            .collect())
    }

    async fn apply_placements(&self, placements: &[Placement]) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        for placement in placements {
            if let Some(row) = tables
                .results
                .iter_mut()
                .find(|r| r.id == placement.result_id)
            {
                row.position = Some(placement.position);
                row.out_of = Some(placement.out_of);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AdminDirectory for MemoryStore {
    async fn find_admin(&self, username: &str) -> StoreResult<Option<Admin>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .admins
            .iter()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn create_admin(&self, username: &str, password_hash: &str) -> StoreResult<Admin> {
        let mut tables = self.tables.lock().await;
        if tables.admins.iter().any(|a| a.username == username) {
            return Err(StoreError::Conflict(format!(
                "Username '{}' already exists",
                username
            )));
        }
        let admin = Admin {
            id: tables.next_id(),
            username: username.to_string(),
            password: password_hash.to_string(),
            created_at: Utc::now(),
        };
        tables.admins.push(admin.clone());
        Ok(admin)
    }
}

#[async_trait]
impl SchoolStore for MemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn one_card(store: &MemoryStore, usage_limit: i32) -> AccessCard {
        store
            .insert_cards(&[NewAccessCard {
                serial_number: "SC24100000000001".to_string(),
                pin: "123456789012".to_string(),
                pin_hash: "unused-in-store".to_string(),
                expiry_date: Utc::now() + Duration::days(1),
                usage_limit,
                created_at: Utc::now(),
            }])
            .await
            .unwrap()
            .remove(0)
    }

    fn usage(student_id: &str) -> CardUsage {
        CardUsage {
            student_id: student_id.to_string(),
            used_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_usage_requires_expected_count() {
        let store = MemoryStore::new();
        let card = one_card(&store, 3).await;

        assert!(store.record_card_usage(card.id, 0, &usage("S1")).await.unwrap());
        // A writer that read the old count loses.
        assert!(!store.record_card_usage(card.id, 0, &usage("S1")).await.unwrap());
        // Another student cannot use a bound card.
        assert!(!store.record_card_usage(card.id, 1, &usage("S2")).await.unwrap());

        let stored = store.get_card(card.id).await.unwrap().unwrap();
        assert_eq!(stored.usage_count, 1);
        assert_eq!(stored.bound_student_id.as_deref(), Some("S1"));
    }

    #[tokio::test]
    async fn test_usage_refused_on_terminal_status() {
        let store = MemoryStore::new();
        let card = one_card(&store, 3).await;
        store
            .set_card_status(card.id, CardStatus::Deactivated)
            .await
            .unwrap();

        assert!(!store.record_card_usage(card.id, 0, &usage("S1")).await.unwrap());
        store.mark_card_expired(card.id).await.unwrap();
        let stored = store.get_card(card.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CardStatus::Deactivated);
    }

    #[tokio::test]
    async fn test_duplicate_pin_rejected() {
        let store = MemoryStore::new();
        one_card(&store, 1).await;

        let err = store
            .insert_cards(&[NewAccessCard {
                serial_number: "SC24100000000002".to_string(),
                pin: "123456789012".to_string(),
                pin_hash: String::new(),
                expiry_date: Utc::now(),
                usage_limit: 1,
                created_at: Utc::now(),
            }])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.list_cards(None).await.unwrap().len(), 1);
    }
}
