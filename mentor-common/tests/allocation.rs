use futures::future::join_all;
use sqlx::PgPool;

use mentor_common::allocator::MentorAllocator;
use mentor_common::capacity::CapacityStore;
use mentor_common::error::AssignmentError;
use mentor_common::retry::RetryPolicy;
use mentor_common::test_utils::{
    assigned_student_count, insert_mentor, insert_student, student_mentor, total_load,
};
use mentor_common::types::UserId;

async fn assign_concurrently(
    allocator: &MentorAllocator,
    students: &[UserId],
) -> Vec<Result<UserId, AssignmentError>> {
    let handles = students.iter().map(|&student_id| {
        let allocator = allocator.clone();
        tokio::spawn(async move {
            allocator
                .assign(student_id)
                .await
                .map(|mentor| mentor.mentor_id)
        })
    });

    join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("assignment task panicked"))
        .collect()
}

#[sqlx::test(migrations = "../migrations")]
async fn test_concurrent_assignments_never_exceed_capacity(db: PgPool) {
    let max_students = 5;
    let extra = 3;
    let mentor_id = insert_mentor(&db, 0, max_students).await;
    let mut students = Vec::new();
    for _ in 0..(max_students + extra) {
        students.push(insert_student(&db).await);
    }
    let allocator = MentorAllocator::new(db.clone(), RetryPolicy::default());

    let results = assign_concurrently(&allocator, &students).await;

    let assigned = results
        .iter()
        .filter(|r| matches!(r, Ok(id) if *id == mentor_id))
        .count();
    let unavailable = results
        .iter()
        .filter(|r| matches!(r, Err(AssignmentError::NoMentorsAvailable)))
        .count();
    assert_eq!(assigned, max_students as usize);
    assert_eq!(unavailable, extra as usize);

    let store = CapacityStore::new_from_pool(db.clone());
    let record = store.get(mentor_id).await.unwrap();
    assert_eq!(record.current_students, max_students);
    assert_eq!(total_load(&db).await, assigned_student_count(&db).await);
}

#[sqlx::test(migrations = "../migrations")]
async fn test_two_racing_assignments_for_last_slot(db: PgPool) {
    let mentor_id = insert_mentor(&db, 4, 5).await;
    let s3 = insert_student(&db).await;
    let s4 = insert_student(&db).await;
    let allocator = MentorAllocator::new(db.clone(), RetryPolicy::default());

    let results = assign_concurrently(&allocator, &[s3, s4]).await;

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let unavailable = results
        .iter()
        .filter(|r| matches!(r, Err(AssignmentError::NoMentorsAvailable)))
        .count();
    assert_eq!(succeeded, 1);
    assert_eq!(unavailable, 1);

    let record = CapacityStore::new_from_pool(db.clone())
        .get(mentor_id)
        .await
        .unwrap();
    assert_eq!(record.current_students, 5);

    let linked = [student_mentor(&db, s3).await, student_mentor(&db, s4).await];
    assert_eq!(linked.iter().filter(|m| **m == Some(mentor_id)).count(), 1);
    assert_eq!(linked.iter().filter(|m| m.is_none()).count(), 1);
}

#[sqlx::test(migrations = "../migrations")]
async fn test_concurrent_assignments_across_mentors_stay_consistent(db: PgPool) {
    let mentors = [
        insert_mentor(&db, 0, 2).await,
        insert_mentor(&db, 0, 3).await,
        insert_mentor(&db, 0, 1).await,
    ];
    let mut students = Vec::new();
    for _ in 0..8 {
        students.push(insert_student(&db).await);
    }
    let allocator = MentorAllocator::new(db.clone(), RetryPolicy::default());

    let results = assign_concurrently(&allocator, &students).await;

    let store = CapacityStore::new_from_pool(db.clone());
    for record in store.list().await.unwrap() {
        assert!(mentors.contains(&record.mentor_id));
        assert!(record.current_students >= 0);
        assert!(record.current_students <= record.max_students);
    }

    let assigned = results.iter().filter(|r| r.is_ok()).count() as i64;
    assert!(assigned <= 6);
    assert_eq!(total_load(&db).await, assigned);
    assert_eq!(assigned_student_count(&db).await, assigned);
}
