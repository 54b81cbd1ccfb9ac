//! # Stats
//!
//! Read only projections over mentor capacity for dashboards. Every query is a single statement,
//! so each result is read from one snapshot without taking locks.
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::postgres::PgPool;

use crate::error::{CapacityError, DatabaseError};
use crate::types::UserId;

/// Review counts for a mentor, as kept by the project ledger.
#[derive(sqlx::FromRow, Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProjectCounts {
    pub total_projects: i64,
    pub pending_projects: i64,
}

/// Source of project review counts. Projects are owned elsewhere; we only read them.
#[async_trait]
pub trait ProjectLedger: Send + Sync {
    async fn project_counts(&self, mentor_id: UserId) -> Result<ProjectCounts, DatabaseError>;
}

/// A `ProjectLedger` reading the `projects` table.
pub struct PgProjectLedger {
    pool: PgPool,
}

impl PgProjectLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectLedger for PgProjectLedger {
    async fn project_counts(&self, mentor_id: UserId) -> Result<ProjectCounts, DatabaseError> {
        let base_query = r#"
SELECT
    COUNT(*) AS total_projects,
    COUNT(*) FILTER (WHERE status = 'pending') AS pending_projects
FROM
    projects
WHERE
    mentor_id = $1
        "#;

        sqlx::query_as(base_query)
            .bind(mentor_id)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::query("SELECT"))
    }
}

/// Load and workload of a single mentor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MentorStats {
    pub mentor_id: UserId,
    pub name: String,
    pub email: String,
    pub current_students: i32,
    pub max_students: i32,
    /// Students currently linked to this mentor.
    pub total_students: i64,
    pub pending_projects: i64,
    pub total_projects: i64,
    /// Set when the ceiling was lowered below the current load.
    pub over_capacity: bool,
}

#[derive(sqlx::FromRow)]
struct MentorRow {
    mentor_id: UserId,
    name: String,
    email: String,
    current_students: i32,
    max_students: i32,
    total_students: i64,
}

/// Load across every mentor.
/// `total_load` and `assigned_students` are equal while the counters are consistent.
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacitySummary {
    pub mentors: i64,
    pub mentors_at_capacity: i64,
    pub total_capacity: i64,
    pub total_load: i64,
    pub assigned_students: i64,
    pub unassigned_students: i64,
}

#[derive(Clone)]
pub struct StatsReporter {
    pool: PgPool,
    projects: Arc<dyn ProjectLedger>,
}

impl StatsReporter {
    pub fn new(pool: PgPool, projects: Arc<dyn ProjectLedger>) -> Self {
        Self { pool, projects }
    }

    pub async fn mentor_stats(&self, mentor_id: UserId) -> Result<MentorStats, CapacityError> {
        let base_query = r#"
SELECT
    mc.mentor_id,
    u.name,
    u.email,
    mc.current_students,
    mc.max_students,
    (SELECT COUNT(*) FROM users s WHERE s.mentor_id = mc.mentor_id AND s.role = 'student')
        AS total_students
FROM
    mentor_capacity mc
    JOIN users u ON u.id = mc.mentor_id
WHERE
    mc.mentor_id = $1
        "#;

        let row: MentorRow = sqlx::query_as(base_query)
            .bind(mentor_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::query("SELECT"))?
            .ok_or(CapacityError::NotFound(mentor_id))?;

        let projects = self.projects.project_counts(row.mentor_id).await?;

        Ok(MentorStats {
            mentor_id: row.mentor_id,
            name: row.name,
            email: row.email,
            current_students: row.current_students,
            max_students: row.max_students,
            total_students: row.total_students,
            pending_projects: projects.pending_projects,
            total_projects: projects.total_projects,
            over_capacity: row.current_students > row.max_students,
        })
    }

    pub async fn summary(&self) -> Result<CapacitySummary, DatabaseError> {
        let base_query = r#"
SELECT
    (SELECT COUNT(*) FROM mentor_capacity) AS mentors,
    (SELECT COUNT(*) FROM mentor_capacity WHERE current_students >= max_students) AS mentors_at_capacity,
    (SELECT COALESCE(SUM(max_students), 0)::BIGINT FROM mentor_capacity) AS total_capacity,
    (SELECT COALESCE(SUM(current_students), 0)::BIGINT FROM mentor_capacity) AS total_load,
    (SELECT COUNT(*) FROM users WHERE role = 'student' AND mentor_id IS NOT NULL) AS assigned_students,
    (SELECT COUNT(*) FROM users WHERE role = 'student' AND mentor_id IS NULL) AS unassigned_students
        "#;

        sqlx::query_as(base_query)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::query("SELECT"))
    }
}
