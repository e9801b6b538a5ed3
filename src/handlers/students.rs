// src/handlers/students.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    error::AppError,
    models::student::{
        CreateStudentRequest, StudentListParams, UpdateStudentRequest, validate_photo_url,
    },
    state::SharedStore,
};

/// Lists students, optionally for one class (`?class=JSS 1`).
/// Admin only.
pub async fn list_students(
    State(store): State<SharedStore>,
    Query(params): Query<StudentListParams>,
) -> Result<impl IntoResponse, AppError> {
    let class_name = params.class_name.as_deref().filter(|c| !c.is_empty());
    Ok(Json(store.list_students(class_name).await?))
}

pub async fn get_student(
    State(store): State<SharedStore>,
    Path(student_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let student = store
        .find_student(&student_id)
        .await?
        .ok_or(AppError::NotFound("Student not found".to_string()))?;
    Ok(Json(student))
}

/// Registers a student. Returns 201 Created.
pub async fn create_student(
    State(store): State<SharedStore>,
    Json(payload): Json<CreateStudentRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    check_photo_url(payload.photo_url.as_deref())?;

    let student = store.create_student(&payload, Utc::now()).await?;
    tracing::info!("Registered student {}", student.student_id);

    Ok((StatusCode::CREATED, Json(student)))
}

pub async fn update_student(
    State(store): State<SharedStore>,
    Path(student_id): Path<String>,
    Json(payload): Json<UpdateStudentRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if payload.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }
    check_photo_url(payload.photo_url.as_deref())?;

    let student = store
        .update_student(&student_id, &payload)
        .await?
        .ok_or(AppError::NotFound("Student not found".to_string()))?;

    Ok(Json(student))
}

/// Removes a student. Their results and card bindings are left in place.
pub async fn delete_student(
    State(store): State<SharedStore>,
    Path(student_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !store.delete_student(&student_id).await? {
        return Err(AppError::NotFound("Student not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

fn check_photo_url(photo_url: Option<&str>) -> Result<(), AppError> {
    match photo_url.filter(|url| !url.is_empty()) {
        Some(url) => validate_photo_url(url)
            .map_err(|_| AppError::BadRequest("Photo URL must be an http(s) URL".to_string())),
        None => Ok(()),
    }
}
