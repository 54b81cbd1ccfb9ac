use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_derive::Serialize;
use thiserror::Error;
use tracing::error;

use mentor_common::error::{AssignmentError, CapacityError, DatabaseError, RegistrationError};

#[derive(Serialize)]
pub struct ErrorResponse {
    error: String,
}

/// Errors returned by handlers, rendered as `{"error": ...}` with a status matching the cause.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Capacity(#[from] CapacityError),
    #[error(transparent)]
    Assignment(#[from] AssignmentError),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    InvalidBody(#[from] JsonRejection),
}

fn capacity_status(error: &CapacityError) -> StatusCode {
    match error {
        CapacityError::NotFound(_) | CapacityError::NotAMentor(_) => StatusCode::NOT_FOUND,
        CapacityError::AlreadyExists(_) => StatusCode::CONFLICT,
        CapacityError::InvalidMaxStudents(_) => StatusCode::BAD_REQUEST,
        // Consumed by the allocator, only reachable through a bug.
        CapacityError::CapacityExceeded(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CapacityError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn assignment_status(error: &AssignmentError) -> StatusCode {
    match error {
        AssignmentError::NoMentorsAvailable => StatusCode::SERVICE_UNAVAILABLE,
        AssignmentError::StudentNotFound(_) => StatusCode::NOT_FOUND,
        AssignmentError::AlreadyAssigned(_) | AssignmentError::NotAssigned(_) => {
            StatusCode::CONFLICT
        }
        AssignmentError::Capacity(error) => capacity_status(error),
        AssignmentError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Capacity(error) => capacity_status(error),
            ApiError::Assignment(error) => assignment_status(error),
            ApiError::Registration(RegistrationError::UserAlreadyExists(_)) => StatusCode::CONFLICT,
            ApiError::Registration(RegistrationError::Capacity(error)) => capacity_status(error),
            ApiError::Registration(RegistrationError::Assignment(error)) => {
                assignment_status(error)
            }
            ApiError::Registration(RegistrationError::Database(_)) | ApiError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::InvalidBody(rejection) => rejection.status(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!("internal error: {}", self);
        }

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
