use std::sync::atomic::{AtomicU64, Ordering};

use sqlx::PgPool;

use crate::types::{UserId, UserRole};

static NEXT_USER: AtomicU64 = AtomicU64::new(1);

/// Insert a user with a unique email and return its id.
pub async fn insert_user(pool: &PgPool, role: UserRole) -> UserId {
    let n = NEXT_USER.fetch_add(1, Ordering::Relaxed);

    sqlx::query_scalar("INSERT INTO users (email, name, role) VALUES ($1, $2, $3) RETURNING id")
        .bind(format!("user-{n}@example.com"))
        .bind(format!("User {n}"))
        .bind(role)
        .fetch_one(pool)
        .await
        .expect("failed to insert user")
}

pub async fn insert_student(pool: &PgPool) -> UserId {
    insert_user(pool, UserRole::Student).await
}

/// Insert a mentor and a capacity record with the given load, bypassing the allocator.
pub async fn insert_mentor(pool: &PgPool, current_students: i32, max_students: i32) -> UserId {
    let mentor_id = insert_user(pool, UserRole::Mentor).await;

    sqlx::query(
        "INSERT INTO mentor_capacity (mentor_id, current_students, max_students) VALUES ($1, $2, $3)",
    )
    .bind(mentor_id)
    .bind(current_students)
    .bind(max_students)
    .execute(pool)
    .await
    .expect("failed to insert mentor capacity");

    mentor_id
}

pub async fn insert_project(pool: &PgPool, student_id: UserId, mentor_id: UserId, status: &str) {
    sqlx::query(
        "INSERT INTO projects (student_id, mentor_id, title, status) VALUES ($1, $2, $3, $4)",
    )
    .bind(student_id)
    .bind(mentor_id)
    .bind("a project")
    .bind(status)
    .execute(pool)
    .await
    .expect("failed to insert project");
}

pub async fn student_mentor(pool: &PgPool, student_id: UserId) -> Option<UserId> {
    sqlx::query_scalar("SELECT mentor_id FROM users WHERE id = $1")
        .bind(student_id)
        .fetch_one(pool)
        .await
        .expect("failed to fetch student")
}

/// Sum of `current_students` over every mentor.
pub async fn total_load(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COALESCE(SUM(current_students), 0)::BIGINT FROM mentor_capacity")
        .fetch_one(pool)
        .await
        .expect("failed to sum mentor load")
}

/// Number of students linked to a mentor.
pub async fn assigned_student_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM users WHERE role = 'student' AND mentor_id IS NOT NULL",
    )
    .fetch_one(pool)
    .await
    .expect("failed to count assigned students")
}
