// src/handlers/results.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::result::{
        Cohort, CreateResultRequest, ResultFilter, SubjectScore, UpdateResultRequest,
        validate_subjects,
    },
    services::ranking,
    state::SharedStore,
    utils::html::{clean_html, clean_optional},
};

/// Lists results. Filters: `studentId`, `class`, `session`, `term`.
/// Admin only.
pub async fn list_results(
    State(store): State<SharedStore>,
    Query(filter): Query<ResultFilter>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(store.list_results(&filter).await?))
}

pub async fn get_result(
    State(store): State<SharedStore>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = store
        .get_result(id)
        .await?
        .ok_or(AppError::NotFound("Result not found".to_string()))?;
    Ok(Json(result))
}

/// Records a result and re-ranks its cohort.
///
/// Returns 201 Created with the stored result, positions included.
pub async fn create_result(
    State(store): State<SharedStore>,
    State(config): State<Config>,
    Json(mut payload): Json<CreateResultRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if store.find_student(&payload.student_id).await?.is_none() {
        return Err(AppError::NotFound(format!(
            "Student '{}' not found",
            payload.student_id
        )));
    }

    payload.teacher_remark = clean_optional(payload.teacher_remark);
    payload.principal_remark = clean_optional(payload.principal_remark);
    clean_subject_remarks(&mut payload.subjects);

    let created = store.create_result(&payload, Utc::now()).await?;
    ranking::recalculate_best_effort(store.as_ref(), &created.cohort(), config.tie_break).await;

    let result = store.get_result(created.id).await?.unwrap_or(created);
    Ok((StatusCode::CREATED, Json(result)))
}

/// Partially updates a result.
///
/// Moving the result to another class, session or term re-ranks both the old
/// and the new cohort.
pub async fn update_result(
    State(store): State<SharedStore>,
    State(config): State<Config>,
    Path(id): Path<i64>,
    Json(mut payload): Json<UpdateResultRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if payload.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }
    if let Some(subjects) = &mut payload.subjects {
        validate_subjects(subjects).map_err(|e| AppError::BadRequest(e.to_string()))?;
        clean_subject_remarks(subjects);
    }
    if let Some(student_id) = &payload.student_id
        && store.find_student(student_id).await?.is_none()
    {
        return Err(AppError::NotFound(format!("Student '{}' not found", student_id)));
    }

    payload.teacher_remark = clean_optional(payload.teacher_remark);
    payload.principal_remark = clean_optional(payload.principal_remark);

    let previous = store
        .get_result(id)
        .await?
        .ok_or(AppError::NotFound("Result not found".to_string()))?;

    let updated = store
        .update_result(id, &payload, Utc::now())
        .await?
        .ok_or(AppError::NotFound("Result not found".to_string()))?;

    if payload.touches_cohort() {
        let cohort = updated.cohort();
        ranking::recalculate_best_effort(store.as_ref(), &cohort, config.tie_break).await;

        let previous_cohort = previous.cohort();
        if previous_cohort != cohort {
            ranking::recalculate_best_effort(store.as_ref(), &previous_cohort, config.tie_break)
                .await;
        }
    }

    let result = store.get_result(id).await?.unwrap_or(updated);
    Ok(Json(result))
}

/// Deletes a result and re-ranks what is left of its cohort.
pub async fn delete_result(
    State(store): State<SharedStore>,
    State(config): State<Config>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = store
        .delete_result(id)
        .await?
        .ok_or(AppError::NotFound("Result not found".to_string()))?;

    ranking::recalculate_best_effort(store.as_ref(), &deleted.cohort(), config.tie_break).await;

    Ok(StatusCode::NO_CONTENT)
}

/// Re-ranks one cohort on demand. Unlike the automatic re-ranking, failures
/// are reported to the caller.
pub async fn recalculate_positions(
    State(store): State<SharedStore>,
    State(config): State<Config>,
    Json(cohort): Json<Cohort>,
) -> Result<impl IntoResponse, AppError> {
    cohort.validate()?;

    let updated = ranking::recalculate(store.as_ref(), &cohort, config.tie_break).await?;

    Ok(Json(json!({
        "message": format!("Positions recalculated for {} results", updated),
        "updated": updated,
    })))
}

fn clean_subject_remarks(subjects: &mut [SubjectScore]) {
    for line in subjects {
        line.remark = clean_html(&line.remark);
    }
}
