use thiserror::Error;

use crate::types::UserId;

/// Enumeration of database-related errors.
/// Errors that can originate from sqlx and are wrapped by us to provide additional context.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("pool creation failed with: {error}")]
    PoolCreationError { error: sqlx::Error },
    #[error("connection failed with: {error}")]
    ConnectionError { error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
    #[error("transaction {command} failed with: {error}")]
    TransactionError { command: String, error: sqlx::Error },
}

impl DatabaseError {
    /// Build a closure wrapping a sqlx::Error into a `QueryError` for `command`, for use with `map_err`.
    pub fn query(command: &'static str) -> impl FnOnce(sqlx::Error) -> DatabaseError {
        move |error| DatabaseError::QueryError {
            command: command.to_owned(),
            error,
        }
    }

    /// Build a closure wrapping a sqlx::Error into a `TransactionError` for `command`, for use with `map_err`.
    pub fn transaction(command: &'static str) -> impl FnOnce(sqlx::Error) -> DatabaseError {
        move |error| DatabaseError::TransactionError {
            command: command.to_owned(),
            error,
        }
    }
}

/// Enumeration of errors for operations on mentor capacity records.
#[derive(Error, Debug)]
pub enum CapacityError {
    #[error("mentor {0} has no capacity record")]
    NotFound(UserId),
    #[error("user {0} is not a mentor")]
    NotAMentor(UserId),
    #[error("mentor {0} already has a capacity record")]
    AlreadyExists(UserId),
    #[error("mentor {0} has no room for another student")]
    CapacityExceeded(UserId),
    #[error("{0} is not a valid max_students, it must be positive")]
    InvalidMaxStudents(i32),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Enumeration of errors for assigning students to mentors and releasing them.
#[derive(Error, Debug)]
pub enum AssignmentError {
    #[error("no mentors available")]
    NoMentorsAvailable,
    #[error("student {0} not found")]
    StudentNotFound(UserId),
    #[error("student {0} already has a mentor")]
    AlreadyAssigned(UserId),
    #[error("student {0} has no mentor")]
    NotAssigned(UserId),
    #[error(transparent)]
    Capacity(#[from] CapacityError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Enumeration of errors that abort a registration.
/// Running out of mentors is not one of them: students are registered unassigned instead.
#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("a user with email {0} already exists")]
    UserAlreadyExists(String),
    #[error(transparent)]
    Capacity(#[from] CapacityError),
    #[error(transparent)]
    Assignment(#[from] AssignmentError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}
