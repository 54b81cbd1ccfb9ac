use axum::extract::{Path, State};
use axum::Json;
use serde_derive::{Deserialize, Serialize};

use mentor_common::types::UserId;

use super::app::AppState;
use super::error::ApiError;

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct AssignmentResponse {
    student_id: UserId,
    mentor_id: UserId,
}

pub async fn assign(
    State(state): State<AppState>,
    Path(student_id): Path<UserId>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    let mentor = state.allocator.assign(student_id).await?;

    Ok(Json(AssignmentResponse {
        student_id,
        mentor_id: mentor.mentor_id,
    }))
}

/// Unlink a student from their mentor, returning the mentor they had.
pub async fn release(
    State(state): State<AppState>,
    Path(student_id): Path<UserId>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    let mentor = state.allocator.release(student_id).await?;

    Ok(Json(AssignmentResponse {
        student_id,
        mentor_id: mentor.mentor_id,
    }))
}
