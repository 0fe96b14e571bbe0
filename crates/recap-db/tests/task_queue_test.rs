//! Integration tests for the Postgres task repository.
//!
//! Requires a running Postgres with the pgvector extension. Run with:
//! `cargo test -p recap-db -- --ignored`

use recap_core::{TaskConfig, TaskRepository, TaskResults, TaskStatus, TaskUpdate};
use recap_db::test_fixtures::TestDatabase;
use uuid::Uuid;

async fn setup() -> TestDatabase {
    dotenvy::dotenv().ok();
    TestDatabase::new().await
}

fn config(model_l: &str, model_r: &str) -> TaskConfig {
    TaskConfig {
        model_l: Some(model_l.to_string()),
        model_r: Some(model_r.to_string()),
        prompt_summary: Some("Summarize.".to_string()),
        prompt_meta: Some("Extract metadata.".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with pgvector
async fn test_enqueue_and_get() {
    let test_db = setup().await;
    let doc_id = Uuid::now_v7();

    let task = test_db
        .db
        .tasks
        .enqueue(doc_id, &config("alpha", "beta"))
        .await
        .unwrap();

    assert_eq!(task.status, TaskStatus::Created);
    assert_eq!(task.config.model_l.as_deref(), Some("alpha"));
    assert_eq!(task.results, TaskResults::default());

    let fetched = test_db.db.tasks.get(doc_id).await.unwrap().unwrap();
    assert_eq!(fetched.doc_id, doc_id);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with pgvector
async fn test_reenqueue_resets_status_keeps_results() {
    let test_db = setup().await;
    let doc_id = Uuid::now_v7();

    test_db
        .db
        .tasks
        .enqueue(doc_id, &config("alpha", "beta"))
        .await
        .unwrap();

    test_db
        .db
        .tasks
        .update(
            doc_id,
            &TaskUpdate::status(TaskStatus::Done).with_results(TaskResults {
                sum_l: Some("old summary".to_string()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

    let task = test_db
        .db
        .tasks
        .enqueue(doc_id, &config("gamma", "delta"))
        .await
        .unwrap();

    assert_eq!(task.status, TaskStatus::Created);
    assert_eq!(task.config.model_l.as_deref(), Some("gamma"));
    // Stale results survive until the next run overwrites them.
    assert_eq!(task.results.sum_l.as_deref(), Some("old summary"));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with pgvector
async fn test_update_merges_results_jsonb() {
    let test_db = setup().await;
    let doc_id = Uuid::now_v7();

    test_db
        .db
        .tasks
        .enqueue(doc_id, &config("alpha", "beta"))
        .await
        .unwrap();

    test_db
        .db
        .tasks
        .update(
            doc_id,
            &TaskUpdate::default().with_results(TaskResults {
                sum_l: Some("left".to_string()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

    let task = test_db
        .db
        .tasks
        .update(
            doc_id,
            &TaskUpdate::status(TaskStatus::Done).with_results(TaskResults {
                sum_r: Some("right".to_string()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

    assert_eq!(task.status, TaskStatus::Done);
    assert_eq!(task.results.sum_l.as_deref(), Some("left"));
    assert_eq!(task.results.sum_r.as_deref(), Some("right"));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with pgvector
async fn test_list_by_status_fifo() {
    let test_db = setup().await;
    let ids: Vec<Uuid> = (0..3).map(|_| Uuid::now_v7()).collect();

    for id in &ids {
        test_db
            .db
            .tasks
            .enqueue(*id, &config("alpha", "beta"))
            .await
            .unwrap();
        test_db
            .db
            .tasks
            .update(*id, &TaskUpdate::status(TaskStatus::Queued))
            .await
            .unwrap();
        // Distinct created_at values for a deterministic order.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let queued = test_db
        .db
        .tasks
        .list_by_status(TaskStatus::Queued)
        .await
        .unwrap();
    let listed: Vec<Uuid> = queued.iter().map(|t| t.doc_id).collect();
    assert_eq!(listed, ids);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with pgvector
async fn test_configure_created_releases_to_queue() {
    let test_db = setup().await;
    let created_a = Uuid::now_v7();
    let created_b = Uuid::now_v7();
    let done = Uuid::now_v7();

    for id in [created_a, created_b, done] {
        test_db
            .db
            .tasks
            .enqueue(id, &TaskConfig::default())
            .await
            .unwrap();
    }
    test_db
        .db
        .tasks
        .update(done, &TaskUpdate::status(TaskStatus::Done))
        .await
        .unwrap();

    let released = test_db
        .db
        .tasks
        .configure_created(&config("alpha", "beta"))
        .await
        .unwrap();
    assert_eq!(released, 2);

    let task = test_db.db.tasks.get(created_a).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Queued);
    assert_eq!(task.config.model_r.as_deref(), Some("beta"));

    let untouched = test_db.db.tasks.get(done).await.unwrap().unwrap();
    assert_eq!(untouched.status, TaskStatus::Done);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with pgvector
async fn test_delete_task() {
    let test_db = setup().await;
    let doc_id = Uuid::now_v7();

    test_db
        .db
        .tasks
        .enqueue(doc_id, &TaskConfig::default())
        .await
        .unwrap();

    assert!(test_db.db.tasks.delete(doc_id).await.unwrap());
    assert!(!test_db.db.tasks.delete(doc_id).await.unwrap());
    assert!(test_db.db.tasks.get(doc_id).await.unwrap().is_none());

    test_db.cleanup().await;
}
