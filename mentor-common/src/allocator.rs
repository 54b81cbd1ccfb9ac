//! # Allocator
//!
//! Assigns students to the least loaded mentor with room, and releases them.
//!
//! Taking a mentor's slot and linking the student happen in one transaction: if the link cannot be
//! written, or the caller goes away before commit, the transaction is dropped and the slot is
//! rolled back with it.
use std::time::Instant;

use sqlx::postgres::{PgConnection, PgPool};
use sqlx::Connection;
use tracing::{debug, info, warn};

use crate::capacity;
use crate::error::{AssignmentError, CapacityError, DatabaseError};
use crate::metrics::{
    ASSIGNMENTS_TOTAL, ASSIGNMENT_DURATION_SECONDS, ASSIGNMENT_RETRIES_TOTAL, RELEASES_TOTAL,
};
use crate::retry::RetryPolicy;
use crate::types::{MentorCapacity, UserId};

/// Lock a student row and return its current mentor.
/// Returns `StudentNotFound` if there is no student with this id.
async fn lock_student(
    conn: &mut PgConnection,
    student_id: UserId,
) -> Result<Option<UserId>, AssignmentError> {
    let base_query = r#"
SELECT
    mentor_id
FROM
    users
WHERE
    id = $1
    AND role = 'student'
FOR UPDATE
    "#;

    let row: Option<(Option<UserId>,)> = sqlx::query_as(base_query)
        .bind(student_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(DatabaseError::query("SELECT"))?;

    match row {
        Some((mentor_id,)) => Ok(mentor_id),
        None => Err(AssignmentError::StudentNotFound(student_id)),
    }
}

async fn set_student_mentor(
    conn: &mut PgConnection,
    student_id: UserId,
    mentor_id: Option<UserId>,
) -> Result<(), AssignmentError> {
    let base_query = r#"
UPDATE
    users
SET
    mentor_id = $1,
    updated_at = NOW()
WHERE
    id = $2
    "#;

    sqlx::query(base_query)
        .bind(mentor_id)
        .bind(student_id)
        .execute(&mut *conn)
        .await
        .map_err(DatabaseError::query("UPDATE"))?;

    Ok(())
}

/// Picks mentors for students, one transaction per assignment.
#[derive(Clone)]
pub struct MentorAllocator {
    pool: PgPool,
    retry_policy: RetryPolicy,
}

impl MentorAllocator {
    pub fn new(pool: PgPool, retry_policy: RetryPolicy) -> Self {
        Self { pool, retry_policy }
    }

    /// Assign a mentor to a student in a transaction of its own.
    /// Returns the mentor's capacity record after taking the student's slot.
    pub async fn assign(&self, student_id: UserId) -> Result<MentorCapacity, AssignmentError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|error| DatabaseError::ConnectionError { error })?;

        self.assign_in(&mut conn, student_id).await
    }

    /// Assign a mentor to a student as part of the caller's connection.
    ///
    /// If the connection is already in a transaction, the assignment runs in a savepoint: a failed
    /// assignment is undone without aborting the caller's transaction, and a successful one only
    /// becomes visible when the caller commits.
    pub async fn assign_in(
        &self,
        conn: &mut PgConnection,
        student_id: UserId,
    ) -> Result<MentorCapacity, AssignmentError> {
        let start = Instant::now();
        let result = self.try_assign(conn, student_id).await;

        let outcome = match &result {
            Ok(_) => "assigned",
            Err(AssignmentError::NoMentorsAvailable) => "no_mentors_available",
            Err(AssignmentError::StudentNotFound(_)) => "student_not_found",
            Err(AssignmentError::AlreadyAssigned(_)) => "already_assigned",
            Err(_) => "error",
        };
        metrics::counter!(ASSIGNMENTS_TOTAL, &[("outcome", outcome)]).increment(1);
        metrics::histogram!(ASSIGNMENT_DURATION_SECONDS).record(start.elapsed().as_secs_f64());

        result
    }

    async fn try_assign(
        &self,
        conn: &mut PgConnection,
        student_id: UserId,
    ) -> Result<MentorCapacity, AssignmentError> {
        let mut tx = conn
            .begin()
            .await
            .map_err(DatabaseError::transaction("BEGIN"))?;

        if lock_student(&mut tx, student_id).await?.is_some() {
            return Err(AssignmentError::AlreadyAssigned(student_id));
        }

        let mentor = self.take_slot(&mut tx).await?;
        set_student_mentor(&mut tx, student_id, Some(mentor.mentor_id)).await?;

        tx.commit()
            .await
            .map_err(DatabaseError::transaction("COMMIT"))?;

        info!(
            student_id,
            mentor_id = mentor.mentor_id,
            current_students = mentor.current_students,
            max_students = mentor.max_students,
            "assigned mentor to student"
        );

        Ok(mentor)
    }

    /// Select the least loaded mentor and take one of their slots.
    /// A mentor filling up between selection and increment is retried with a fresh selection.
    async fn take_slot(&self, conn: &mut PgConnection) -> Result<MentorCapacity, AssignmentError> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let candidate = capacity::find_least_loaded_available(&mut *conn)
                .await?
                .ok_or(AssignmentError::NoMentorsAvailable)?;

            match capacity::increment_load(conn, candidate.mentor_id).await {
                Ok(mentor) => return Ok(mentor),
                Err(CapacityError::CapacityExceeded(mentor_id)) => {
                    metrics::counter!(ASSIGNMENT_RETRIES_TOTAL).increment(1);

                    if !self.retry_policy.should_retry(attempt) {
                        warn!(attempt, mentor_id, "exhausted attempts to take a mentor slot");
                        return Err(AssignmentError::NoMentorsAvailable);
                    }

                    let wait = self.retry_policy.time_until_next_retry(attempt);
                    debug!(attempt, mentor_id, ?wait, "mentor filled up, selecting again");
                    tokio::time::sleep(wait).await;
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    /// Unlink a student from their mentor and give the slot back.
    /// Returns the former mentor's capacity record.
    pub async fn release(&self, student_id: UserId) -> Result<MentorCapacity, AssignmentError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(DatabaseError::transaction("BEGIN"))?;

        let mentor_id = lock_student(&mut tx, student_id)
            .await?
            .ok_or(AssignmentError::NotAssigned(student_id))?;

        set_student_mentor(&mut tx, student_id, None).await?;
        let mentor = capacity::decrement_load(&mut *tx, mentor_id).await?;

        tx.commit()
            .await
            .map_err(DatabaseError::transaction("COMMIT"))?;

        metrics::counter!(RELEASES_TOTAL).increment(1);
        info!(student_id, mentor_id, "released student from mentor");

        Ok(mentor)
    }
}
