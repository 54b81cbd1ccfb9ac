use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Users are keyed by the `users.id` BIGSERIAL.
pub type UserId = i64;

/// Ceiling given to mentors that register without an explicit one.
pub const DEFAULT_MAX_STUDENTS: i32 = 5;

/// Enumeration of user roles, mapped to the `user_role` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role")]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Student,
    Mentor,
    Admin,
}

/// A row of `mentor_capacity`.
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Serialize)]
pub struct MentorCapacity {
    /// The mentor this record belongs to.
    pub mentor_id: UserId,
    /// Number of students currently linked to this mentor.
    pub current_students: i32,
    /// Ceiling on `current_students` enforced when assigning.
    pub max_students: i32,
    /// When this record was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl MentorCapacity {
    /// Return true if this mentor can take at least one more student.
    pub fn has_room(&self) -> bool {
        self.current_students < self.max_students
    }

    /// Return true if the ceiling was lowered below the current load.
    pub fn is_over_capacity(&self) -> bool {
        self.current_students > self.max_students
    }
}

/// A row of `users`, without anything authentication related.
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub mentor_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// An account to be created by the registration flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub role: UserRole,
}
