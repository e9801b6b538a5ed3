// src/models/result.rs

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

/// Academic sessions are written as consecutive years, e.g. "2024/2025".
static SESSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}/\d{4}$").expect("session pattern compiles"));

/// One subject line on a result sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectScore {
    pub subject: String,
    /// 0 to 100.
    pub score: f64,
    #[serde(default)]
    pub grade: String,
    #[serde(default)]
    pub remark: String,
}

/// Represents the 'results' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub id: i64,
    pub student_id: String,
    pub session: String,
    pub term: String,

    #[serde(rename = "class")]
    pub class_name: String,

    /// Stored as a JSON array in the database.
    pub subjects: Json<Vec<SubjectScore>>,

    /// Aggregates are computed by the client before saving.
    pub total_score: Option<f64>,
    pub average: Option<f64>,
    pub gpa: Option<f64>,

    /// Rank inside the (class, session, term) cohort. Written only by recalculation.
    pub position: Option<i32>,
    pub out_of: Option<i32>,

    pub teacher_remark: Option<String>,
    pub principal_remark: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResultRecord {
    pub fn cohort(&self) -> Cohort {
        Cohort {
            class_name: self.class_name.clone(),
            session: self.session.clone(),
            term: self.term.clone(),
        }
    }

    /// Average used for ranking; missing or non-numeric averages rank as 0.
    pub fn ranking_average(&self) -> f64 {
        match self.average {
            Some(avg) if avg.is_finite() => avg,
            _ => 0.0,
        }
    }
}

/// Grouping key for class positions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Validate)]
pub struct Cohort {
    #[serde(rename = "class")]
    #[validate(length(min = 1, max = 50))]
    pub class_name: String,
    #[validate(length(min = 1, max = 20))]
    pub session: String,
    #[validate(length(min = 1, max = 30))]
    pub term: String,
}

impl Cohort {
    pub fn contains(&self, result: &ResultRecord) -> bool {
        result.class_name == self.class_name
            && result.session == self.session
            && result.term == self.term
    }
}

/// Rank assignment for a single result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub result_id: i64,
    pub position: i32,
    pub out_of: i32,
}

/// DTO for entering a result.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateResultRequest {
    #[validate(length(min = 1, max = 50))]
    pub student_id: String,
    #[validate(regex(path = *SESSION_RE, message = "Session must look like 2024/2025."))]
    pub session: String,
    #[validate(length(min = 1, max = 30))]
    pub term: String,
    #[serde(rename = "class")]
    #[validate(length(min = 1, max = 50))]
    pub class_name: String,
    #[validate(custom(function = validate_subjects))]
    pub subjects: Vec<SubjectScore>,
    pub total_score: Option<f64>,
    pub average: Option<f64>,
    pub gpa: Option<f64>,
    #[validate(length(max = 1000))]
    pub teacher_remark: Option<String>,
    #[validate(length(max = 1000))]
    pub principal_remark: Option<String>,
}

/// DTO for updating a result. Fields are optional; positions are never accepted.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResultRequest {
    #[validate(length(min = 1, max = 50))]
    pub student_id: Option<String>,
    #[validate(regex(path = *SESSION_RE, message = "Session must look like 2024/2025."))]
    pub session: Option<String>,
    #[validate(length(min = 1, max = 30))]
    pub term: Option<String>,
    #[serde(rename = "class")]
    #[validate(length(min = 1, max = 50))]
    pub class_name: Option<String>,
    pub subjects: Option<Vec<SubjectScore>>,
    pub total_score: Option<f64>,
    pub average: Option<f64>,
    pub gpa: Option<f64>,
    #[validate(length(max = 1000))]
    pub teacher_remark: Option<String>,
    #[validate(length(max = 1000))]
    pub principal_remark: Option<String>,
}

impl UpdateResultRequest {
    /// Whether the update can move the result into another cohort.
    pub fn touches_cohort(&self) -> bool {
        self.class_name.is_some() || self.session.is_some() || self.term.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.touches_cohort()
            && self.student_id.is_none()
            && self.subjects.is_none()
            && self.total_score.is_none()
            && self.average.is_none()
            && self.gpa.is_none()
            && self.teacher_remark.is_none()
            && self.principal_remark.is_none()
    }
}

/// Query parameters for listing results.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultFilter {
    pub student_id: Option<String>,
    #[serde(rename = "class")]
    pub class_name: Option<String>,
    pub session: Option<String>,
    pub term: Option<String>,
}

impl ResultFilter {
    pub fn matches(&self, result: &ResultRecord) -> bool {
        fn eq(filter: &Option<String>, value: &str) -> bool {
            filter.as_deref().is_none_or(|f| f == value)
        }
        eq(&self.student_id, &result.student_id)
            && eq(&self.class_name, &result.class_name)
            && eq(&self.session, &result.session)
            && eq(&self.term, &result.term)
    }
}

/// Every result needs at least one subject, each scored 0 to 100.
pub fn validate_subjects(subjects: &[SubjectScore]) -> Result<(), validator::ValidationError> {
    if subjects.is_empty() {
        return Err(validator::ValidationError::new("subjects_cannot_be_empty"));
    }
    for line in subjects {
        if line.subject.trim().is_empty() || line.subject.len() > 100 {
            return Err(validator::ValidationError::new("invalid_subject_name"));
        }
        if !(0.0..=100.0).contains(&line.score) {
            return Err(validator::ValidationError::new("score_out_of_range"));
        }
        if line.grade.len() > 5 || line.remark.len() > 200 {
            return Err(validator::ValidationError::new("subject_text_too_long"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(score: f64) -> SubjectScore {
        SubjectScore {
            subject: "Mathematics".to_string(),
            score,
            grade: "A".to_string(),
            remark: "Excellent".to_string(),
        }
    }

    #[test]
    fn test_validate_subjects() {
        assert!(validate_subjects(&[subject(75.0), subject(100.0), subject(0.0)]).is_ok());
        assert!(validate_subjects(&[]).is_err());
        assert!(validate_subjects(&[subject(101.0)]).is_err());
        assert!(validate_subjects(&[subject(-1.0)]).is_err());
    }

    #[test]
    fn test_session_format_enforced() {
        let mut req = CreateResultRequest {
            student_id: "S1".to_string(),
            session: "2024/2025".to_string(),
            term: "First Term".to_string(),
            class_name: "JSS 1".to_string(),
            subjects: vec![subject(70.0)],
            total_score: Some(70.0),
            average: Some(70.0),
            gpa: None,
            teacher_remark: None,
            principal_remark: None,
        };
        assert!(req.validate().is_ok());

        req.session = "2024-25".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_touches_cohort() {
        let remark_only = UpdateResultRequest {
            teacher_remark: Some("Good".to_string()),
            ..Default::default()
        };
        assert!(!remark_only.touches_cohort());
        assert!(!remark_only.is_empty());

        let moved = UpdateResultRequest {
            term: Some("Second Term".to_string()),
            ..Default::default()
        };
        assert!(moved.touches_cohort());
    }
}
