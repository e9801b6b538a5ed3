// src/models/student.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use url::Url;
use validator::Validate;

/// Represents the 'students' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,

    /// Admission number typed into the result checker.
    pub student_id: String,

    pub full_name: String,

    #[serde(rename = "class")]
    pub class_name: String,

    pub gender: Option<String>,

    /// Absolute URL of the passport photograph in external storage.
    pub photo_url: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// DTO for registering a student.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudentRequest {
    #[validate(length(min = 1, max = 50, message = "Student ID must be 1 to 50 characters."))]
    pub student_id: String,
    #[validate(length(min = 1, max = 150))]
    pub full_name: String,
    #[serde(rename = "class")]
    #[validate(length(min = 1, max = 50))]
    pub class_name: String,
    #[validate(length(max = 20))]
    pub gender: Option<String>,
    #[validate(length(max = 500))]
    pub photo_url: Option<String>,
}

/// DTO for updating a student. Fields are optional.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStudentRequest {
    #[validate(length(min = 1, max = 150))]
    pub full_name: Option<String>,
    #[serde(rename = "class")]
    #[validate(length(min = 1, max = 50))]
    pub class_name: Option<String>,
    #[validate(length(max = 20))]
    pub gender: Option<String>,
    #[validate(length(max = 500))]
    pub photo_url: Option<String>,
}

impl UpdateStudentRequest {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.class_name.is_none()
            && self.gender.is_none()
            && self.photo_url.is_none()
    }
}

/// Query parameters for listing students.
#[derive(Debug, Deserialize)]
pub struct StudentListParams {
    #[serde(rename = "class")]
    pub class_name: Option<String>,
}

/// Validates that a photo reference is an absolute http(s) URL.
pub fn validate_photo_url(url: &str) -> Result<(), validator::ValidationError> {
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(validator::ValidationError::new("invalid_url")),
    }
}
