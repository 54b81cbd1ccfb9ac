use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use mentor_common::registration::Registration;
use mentor_common::types::NewUser;

use super::app::AppState;
use super::error::ApiError;

pub async fn post(
    State(state): State<AppState>,
    Json(payload): Json<NewUser>,
) -> Result<(StatusCode, Json<Registration>), ApiError> {
    let registration = state.registration.register(payload).await?;

    Ok((StatusCode::CREATED, Json(registration)))
}
