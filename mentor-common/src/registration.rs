//! # Registration
//!
//! Creates accounts and gets them ready for mentoring in the same transaction: mentors get a
//! capacity record, students get a mentor if one has room.
use serde::Serialize;
use sqlx::postgres::{PgConnection, PgPool};
use tracing::{info, warn};

use crate::allocator::MentorAllocator;
use crate::capacity;
use crate::error::{AssignmentError, CapacityError, DatabaseError, RegistrationError};
use crate::metrics::REGISTRATIONS_TOTAL;
use crate::types::{NewUser, User, UserId, UserRole};

/// The outcome of a registration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Registration {
    pub user: User,
    /// The mentor assigned to a new student, if any had room.
    pub mentor_id: Option<UserId>,
}

async fn insert_user(
    conn: &mut PgConnection,
    new_user: &NewUser,
) -> Result<User, RegistrationError> {
    let base_query = r#"
INSERT INTO users
    (email, name, role, created_at, updated_at)
VALUES
    ($1, $2, $3, NOW(), NOW())
RETURNING
    id, email, name, role, mentor_id, created_at
    "#;

    sqlx::query_as(base_query)
        .bind(&new_user.email)
        .bind(&new_user.name)
        .bind(new_user.role)
        .fetch_one(&mut *conn)
        .await
        .map_err(|error| match error {
            sqlx::Error::Database(ref db_error) if db_error.is_unique_violation() => {
                RegistrationError::UserAlreadyExists(new_user.email.clone())
            }
            error => DatabaseError::QueryError {
                command: "INSERT".to_owned(),
                error,
            }
            .into(),
        })
}

/// Runs account creation together with capacity setup and mentor assignment.
#[derive(Clone)]
pub struct RegistrationCoordinator {
    pool: PgPool,
    allocator: MentorAllocator,
    default_max_students: i32,
}

impl RegistrationCoordinator {
    pub fn new(pool: PgPool, allocator: MentorAllocator, default_max_students: i32) -> Self {
        Self {
            pool,
            allocator,
            default_max_students,
        }
    }

    /// Register a new user.
    ///
    /// A mentor that cannot get a capacity record is not registered at all. A student that cannot
    /// get a mentor is still registered, unassigned.
    pub async fn register(&self, new_user: NewUser) -> Result<Registration, RegistrationError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(DatabaseError::transaction("BEGIN"))?;

        let mut user = insert_user(&mut tx, &new_user).await?;

        let mentor_id = match user.role {
            UserRole::Mentor => {
                match capacity::initialize(&mut *tx, user.id, self.default_max_students).await {
                    Ok(_) | Err(CapacityError::AlreadyExists(_)) => None,
                    Err(error) => return Err(error.into()),
                }
            }
            UserRole::Student => match self.allocator.assign_in(&mut tx, user.id).await {
                Ok(mentor) => Some(mentor.mentor_id),
                Err(AssignmentError::NoMentorsAvailable) => {
                    warn!(
                        student_id = user.id,
                        "no mentors available, student registered without a mentor"
                    );
                    None
                }
                Err(error) => return Err(error.into()),
            },
            UserRole::Admin => None,
        };

        tx.commit()
            .await
            .map_err(DatabaseError::transaction("COMMIT"))?;

        let role = match user.role {
            UserRole::Student => "student",
            UserRole::Mentor => "mentor",
            UserRole::Admin => "admin",
        };
        metrics::counter!(REGISTRATIONS_TOTAL, &[("role", role)]).increment(1);
        info!(user_id = user.id, role, ?mentor_id, "registered user");

        user.mentor_id = mentor_id;
        Ok(Registration { user, mentor_id })
    }
}
