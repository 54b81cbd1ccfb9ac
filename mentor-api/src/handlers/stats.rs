use axum::extract::{Path, State};
use axum::Json;

use mentor_common::stats::{CapacitySummary, MentorStats};
use mentor_common::types::UserId;

use super::app::AppState;
use super::error::ApiError;

pub async fn summary(State(state): State<AppState>) -> Result<Json<CapacitySummary>, ApiError> {
    Ok(Json(state.stats.summary().await?))
}

pub async fn mentor(
    State(state): State<AppState>,
    Path(mentor_id): Path<UserId>,
) -> Result<Json<MentorStats>, ApiError> {
    Ok(Json(state.stats.mentor_stats(mentor_id).await?))
}
