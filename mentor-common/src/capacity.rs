//! # Capacity store
//!
//! Mentor capacity records backed by the `mentor_capacity` PostgreSQL table.
//!
//! Operations are free functions accepting any executor, so they can be composed inside a caller's
//! transaction. `CapacityStore` wraps them over a `PgPool` for standalone use.
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};

use crate::error::{CapacityError, DatabaseError};
use crate::types::{MentorCapacity, UserId, UserRole};

fn validate_max_students(max_students: i32) -> Result<(), CapacityError> {
    if max_students <= 0 {
        return Err(CapacityError::InvalidMaxStudents(max_students));
    }
    Ok(())
}

/// Create a capacity record for a mentor with no students.
/// An existing record is left untouched and reported as `AlreadyExists`. Only users with the
/// mentor role can hold a record.
pub async fn initialize(
    conn: &mut PgConnection,
    mentor_id: UserId,
    max_students: i32,
) -> Result<MentorCapacity, CapacityError> {
    validate_max_students(max_students)?;

    let base_query = r#"
INSERT INTO mentor_capacity
    (mentor_id, current_students, max_students, updated_at)
SELECT
    id, 0, $2, NOW()
FROM
    users
WHERE
    id = $1
    AND role = 'mentor'
ON CONFLICT (mentor_id) DO NOTHING
RETURNING
    mentor_id, current_students, max_students, updated_at
    "#;

    let record: Option<MentorCapacity> = sqlx::query_as(base_query)
        .bind(mentor_id)
        .bind(max_students)
        .fetch_optional(&mut *conn)
        .await
        .map_err(DatabaseError::query("INSERT"))?;

    if let Some(record) = record {
        return Ok(record);
    }

    // Nothing was inserted: tell an existing record apart from a user that is not a mentor.
    let role: Option<UserRole> = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
        .bind(mentor_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(DatabaseError::query("SELECT"))?;

    match role {
        Some(UserRole::Mentor) => Err(CapacityError::AlreadyExists(mentor_id)),
        Some(_) => Err(CapacityError::NotAMentor(mentor_id)),
        None => Err(CapacityError::NotFound(mentor_id)),
    }
}

/// Change a mentor's ceiling.
/// The new ceiling may be lower than the current load: nothing is unassigned, the record simply
/// reports as over capacity until enough students are released.
pub async fn set_max_students<'c, E>(
    executor: E,
    mentor_id: UserId,
    max_students: i32,
) -> Result<MentorCapacity, CapacityError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    validate_max_students(max_students)?;

    let base_query = r#"
UPDATE
    mentor_capacity
SET
    max_students = $2,
    updated_at = NOW()
WHERE
    mentor_id = $1
RETURNING
    mentor_id, current_students, max_students, updated_at
    "#;

    let record: Option<MentorCapacity> = sqlx::query_as(base_query)
        .bind(mentor_id)
        .bind(max_students)
        .fetch_optional(executor)
        .await
        .map_err(DatabaseError::query("UPDATE"))?;

    record.ok_or(CapacityError::NotFound(mentor_id))
}

/// Find the mentor with the fewest students among those with room for one more.
/// Ties go to the lowest mentor id. Returns `None` if every mentor is full or there are no mentors.
pub async fn find_least_loaded_available<'c, E>(
    executor: E,
) -> Result<Option<MentorCapacity>, CapacityError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    let base_query = r#"
SELECT
    mc.mentor_id, mc.current_students, mc.max_students, mc.updated_at
FROM
    mentor_capacity mc
    JOIN users u ON u.id = mc.mentor_id
WHERE
    u.role = 'mentor'
    AND mc.current_students < mc.max_students
ORDER BY
    mc.current_students ASC,
    mc.mentor_id ASC
LIMIT 1
    "#;

    let record = sqlx::query_as(base_query)
        .fetch_optional(executor)
        .await
        .map_err(DatabaseError::query("SELECT"))?;

    Ok(record)
}

/// Take one slot from a mentor.
///
/// This is a single conditional UPDATE: a concurrent increment on the same row waits for the row
/// lock and re-checks `current_students < max_students` against the committed value, so no more
/// than `max_students` increments can ever succeed. A full mentor yields `CapacityExceeded`.
pub async fn increment_load(
    conn: &mut PgConnection,
    mentor_id: UserId,
) -> Result<MentorCapacity, CapacityError> {
    let base_query = r#"
UPDATE
    mentor_capacity
SET
    current_students = current_students + 1,
    updated_at = NOW()
WHERE
    mentor_id = $1
    AND current_students < max_students
RETURNING
    mentor_id, current_students, max_students, updated_at
    "#;

    let record: Option<MentorCapacity> = sqlx::query_as(base_query)
        .bind(mentor_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(DatabaseError::query("UPDATE"))?;

    match record {
        Some(record) => Ok(record),
        None => {
            // Nothing was updated: tell a full mentor apart from a missing one.
            get(&mut *conn, mentor_id).await?;
            Err(CapacityError::CapacityExceeded(mentor_id))
        }
    }
}

/// Give one slot back to a mentor, never going below zero.
pub async fn decrement_load<'c, E>(
    executor: E,
    mentor_id: UserId,
) -> Result<MentorCapacity, CapacityError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    let base_query = r#"
UPDATE
    mentor_capacity
SET
    current_students = GREATEST(current_students - 1, 0),
    updated_at = NOW()
WHERE
    mentor_id = $1
RETURNING
    mentor_id, current_students, max_students, updated_at
    "#;

    let record: Option<MentorCapacity> = sqlx::query_as(base_query)
        .bind(mentor_id)
        .fetch_optional(executor)
        .await
        .map_err(DatabaseError::query("UPDATE"))?;

    record.ok_or(CapacityError::NotFound(mentor_id))
}

/// Read a single capacity record.
pub async fn get<'c, E>(executor: E, mentor_id: UserId) -> Result<MentorCapacity, CapacityError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    let base_query = r#"
SELECT
    mentor_id, current_students, max_students, updated_at
FROM
    mentor_capacity
WHERE
    mentor_id = $1
    "#;

    let record: Option<MentorCapacity> = sqlx::query_as(base_query)
        .bind(mentor_id)
        .fetch_optional(executor)
        .await
        .map_err(DatabaseError::query("SELECT"))?;

    record.ok_or(CapacityError::NotFound(mentor_id))
}

/// Read every capacity record, ordered by mentor id.
pub async fn list<'c, E>(executor: E) -> Result<Vec<MentorCapacity>, CapacityError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    let base_query = r#"
SELECT
    mentor_id, current_students, max_students, updated_at
FROM
    mentor_capacity
ORDER BY
    mentor_id ASC
    "#;

    let records = sqlx::query_as(base_query)
        .fetch_all(executor)
        .await
        .map_err(DatabaseError::query("SELECT"))?;

    Ok(records)
}

/// Capacity records behind a connection pool.
#[derive(Clone)]
pub struct CapacityStore {
    pool: PgPool,
}

impl CapacityStore {
    /// Initialize a new CapacityStore connected to the database at `url`.
    pub async fn new(url: &str, max_connections: u32) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|error| DatabaseError::PoolCreationError { error })?;

        Ok(Self { pool })
    }

    /// Initialize a new CapacityStore from an existing pool.
    pub fn new_from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn initialize(
        &self,
        mentor_id: UserId,
        max_students: i32,
    ) -> Result<MentorCapacity, CapacityError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|error| DatabaseError::ConnectionError { error })?;
        initialize(&mut conn, mentor_id, max_students).await
    }

    pub async fn set_max_students(
        &self,
        mentor_id: UserId,
        max_students: i32,
    ) -> Result<MentorCapacity, CapacityError> {
        set_max_students(&self.pool, mentor_id, max_students).await
    }

    pub async fn find_least_loaded_available(
        &self,
    ) -> Result<Option<MentorCapacity>, CapacityError> {
        find_least_loaded_available(&self.pool).await
    }

    pub async fn increment_load(&self, mentor_id: UserId) -> Result<MentorCapacity, CapacityError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|error| DatabaseError::ConnectionError { error })?;
        increment_load(&mut conn, mentor_id).await
    }

    pub async fn decrement_load(&self, mentor_id: UserId) -> Result<MentorCapacity, CapacityError> {
        decrement_load(&self.pool, mentor_id).await
    }

    pub async fn get(&self, mentor_id: UserId) -> Result<MentorCapacity, CapacityError> {
        get(&self.pool, mentor_id).await
    }

    pub async fn list(&self) -> Result<Vec<MentorCapacity>, CapacityError> {
        list(&self.pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{insert_mentor, insert_user};
    use crate::types::{UserRole, DEFAULT_MAX_STUDENTS};

    #[sqlx::test(migrations = "../migrations")]
    async fn test_initialize_creates_empty_record(db: PgPool) {
        let store = CapacityStore::new_from_pool(db.clone());
        let mentor_id = insert_user(&db, UserRole::Mentor).await;

        let record = store
            .initialize(mentor_id, DEFAULT_MAX_STUDENTS)
            .await
            .expect("failed to initialize capacity");

        assert_eq!(record.mentor_id, mentor_id);
        assert_eq!(record.current_students, 0);
        assert_eq!(record.max_students, 5);
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_initialize_twice_leaves_record_unchanged(db: PgPool) {
        let store = CapacityStore::new_from_pool(db.clone());
        let mentor_id = insert_user(&db, UserRole::Mentor).await;

        let first = store.initialize(mentor_id, 3).await.unwrap();
        store.increment_load(mentor_id).await.unwrap();

        let second = store.initialize(mentor_id, 10).await;
        assert!(matches!(second, Err(CapacityError::AlreadyExists(id)) if id == mentor_id));

        let record = store.get(mentor_id).await.unwrap();
        assert_eq!(record.max_students, first.max_students);
        assert_eq!(record.current_students, 1);
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_initialize_rejects_non_positive_ceiling(db: PgPool) {
        let store = CapacityStore::new_from_pool(db.clone());
        let mentor_id = insert_user(&db, UserRole::Mentor).await;

        let result = store.initialize(mentor_id, 0).await;

        assert!(matches!(result, Err(CapacityError::InvalidMaxStudents(0))));
        assert!(matches!(
            store.get(mentor_id).await,
            Err(CapacityError::NotFound(_))
        ));
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_initialize_unknown_user(db: PgPool) {
        let store = CapacityStore::new_from_pool(db);

        let result = store.initialize(31337, DEFAULT_MAX_STUDENTS).await;

        assert!(matches!(result, Err(CapacityError::NotFound(31337))));
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_initialize_rejects_students_and_admins(db: PgPool) {
        let store = CapacityStore::new_from_pool(db.clone());
        let student = insert_user(&db, UserRole::Student).await;
        let admin = insert_user(&db, UserRole::Admin).await;

        for user_id in [student, admin] {
            assert!(matches!(
                store.initialize(user_id, DEFAULT_MAX_STUDENTS).await,
                Err(CapacityError::NotAMentor(id)) if id == user_id
            ));
        }
        assert!(store.list().await.unwrap().is_empty());
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_find_least_loaded_skips_non_mentor_records(db: PgPool) {
        let store = CapacityStore::new_from_pool(db.clone());
        let student = insert_user(&db, UserRole::Student).await;
        sqlx::query(
            "INSERT INTO mentor_capacity (mentor_id, current_students, max_students) VALUES ($1, 0, 5)",
        )
        .bind(student)
        .execute(&db)
        .await
        .unwrap();

        assert!(store.find_least_loaded_available().await.unwrap().is_none());

        let mentor_id = insert_mentor(&db, 3, 5).await;
        let record = store.find_least_loaded_available().await.unwrap().unwrap();
        assert_eq!(record.mentor_id, mentor_id);
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_set_max_students_missing_mentor(db: PgPool) {
        let store = CapacityStore::new_from_pool(db);

        let result = store.set_max_students(42, 3).await;

        assert!(matches!(result, Err(CapacityError::NotFound(42))));
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_set_max_students_below_current_load_is_kept(db: PgPool) {
        let store = CapacityStore::new_from_pool(db.clone());
        let mentor_id = insert_mentor(&db, 4, 5).await;

        let record = store.set_max_students(mentor_id, 2).await.unwrap();

        assert_eq!(record.current_students, 4);
        assert_eq!(record.max_students, 2);
        assert!(record.is_over_capacity());
        assert!(store.find_least_loaded_available().await.unwrap().is_none());
        assert!(matches!(
            store.increment_load(mentor_id).await,
            Err(CapacityError::CapacityExceeded(_))
        ));
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_find_least_loaded_orders_by_load_then_id(db: PgPool) {
        let store = CapacityStore::new_from_pool(db.clone());
        let busy = insert_mentor(&db, 3, 5).await;
        let first_idle = insert_mentor(&db, 1, 5).await;
        let second_idle = insert_mentor(&db, 1, 5).await;
        let _full = insert_mentor(&db, 1, 1).await;

        for _ in 0..3 {
            let record = store.find_least_loaded_available().await.unwrap().unwrap();
            assert_eq!(record.mentor_id, first_idle);
        }

        store.increment_load(first_idle).await.unwrap();
        let record = store.find_least_loaded_available().await.unwrap().unwrap();
        assert_eq!(record.mentor_id, second_idle);

        store.set_max_students(first_idle, 2).await.unwrap();
        store.set_max_students(second_idle, 1).await.unwrap();
        let record = store.find_least_loaded_available().await.unwrap().unwrap();
        assert_eq!(record.mentor_id, busy);
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_find_least_loaded_with_no_mentors(db: PgPool) {
        let store = CapacityStore::new_from_pool(db);

        assert!(store.find_least_loaded_available().await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_increment_load_stops_at_ceiling(db: PgPool) {
        let store = CapacityStore::new_from_pool(db.clone());
        let mentor_id = insert_mentor(&db, 0, 2).await;

        assert_eq!(store.increment_load(mentor_id).await.unwrap().current_students, 1);
        assert_eq!(store.increment_load(mentor_id).await.unwrap().current_students, 2);
        assert!(matches!(
            store.increment_load(mentor_id).await,
            Err(CapacityError::CapacityExceeded(id)) if id == mentor_id
        ));
        let record = store.get(mentor_id).await.unwrap();
        assert_eq!(record.current_students, 2);
        assert!(!record.has_room());
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_increment_load_missing_mentor(db: PgPool) {
        let store = CapacityStore::new_from_pool(db);

        assert!(matches!(
            store.increment_load(7).await,
            Err(CapacityError::NotFound(7))
        ));
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_decrement_load_floors_at_zero(db: PgPool) {
        let store = CapacityStore::new_from_pool(db.clone());
        let mentor_id = insert_mentor(&db, 1, 5).await;

        assert_eq!(store.decrement_load(mentor_id).await.unwrap().current_students, 0);
        assert_eq!(store.decrement_load(mentor_id).await.unwrap().current_students, 0);
        assert!(matches!(
            store.decrement_load(mentor_id + 1000).await,
            Err(CapacityError::NotFound(_))
        ));
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_list_is_ordered_by_mentor(db: PgPool) {
        let store = CapacityStore::new_from_pool(db.clone());
        let first = insert_mentor(&db, 2, 5).await;
        let second = insert_mentor(&db, 0, 3).await;

        let records = store.list().await.unwrap();

        let ids: Vec<UserId> = records.iter().map(|r| r.mentor_id).collect();
        assert_eq!(ids, vec![first, second]);
        assert_eq!(records[1].max_students, 3);
    }
}
