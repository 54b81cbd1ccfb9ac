use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_derive::Deserialize;
use tracing::info;

use mentor_common::types::{MentorCapacity, UserId};

use super::app::AppState;
use super::error::ApiError;

#[derive(Deserialize, Debug, Default)]
pub struct InitializeCapacityRequest {
    max_students: Option<i32>,
}

#[derive(Deserialize, Debug)]
pub struct UpdateCapacityRequest {
    max_students: i32,
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<MentorCapacity>>, ApiError> {
    Ok(Json(state.store.list().await?))
}

/// Create a mentor's capacity record.
/// A request without a JSON body gets the default ceiling, a body that does not parse is rejected.
pub async fn initialize(
    State(state): State<AppState>,
    Path(mentor_id): Path<UserId>,
    payload: Result<Json<InitializeCapacityRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MentorCapacity>), ApiError> {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(JsonRejection::MissingJsonContentType(_)) => InitializeCapacityRequest::default(),
        Err(rejection) => return Err(rejection.into()),
    };
    let max_students = payload.max_students.unwrap_or(state.default_max_students);

    let record = state.store.initialize(mentor_id, max_students).await?;
    info!(mentor_id, max_students, "initialized mentor capacity");

    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(mentor_id): Path<UserId>,
    Json(payload): Json<UpdateCapacityRequest>,
) -> Result<Json<MentorCapacity>, ApiError> {
    let record = state
        .store
        .set_max_students(mentor_id, payload.max_students)
        .await?;
    info!(
        mentor_id,
        max_students = record.max_students,
        current_students = record.current_students,
        "updated mentor capacity"
    );

    Ok(Json(record))
}
