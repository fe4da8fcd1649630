use super::{new_job, open_db};
use crate::types::{JobInfo, JobResult, JobStatus};

#[tokio::test]
async fn test_insert_and_get_job() {
    let (db, _file) = open_db().await;
    let job = new_job(1, 10);

    db.insert_job(&job).await.unwrap();
    let row = db.get_job(job.id).await.unwrap().expect("job should exist");

    assert_eq!(row.job_id().unwrap(), job.id);
    assert_eq!(row.status(), JobStatus::Queued);
    assert_eq!(row.pages_done, 0);
    assert_eq!(row.pages_total, 10);
    assert_eq!(row.message, "Queued");
    assert!(row.completed_at.is_none());
    assert!(row.batch_id.is_none());

    let info = JobInfo::try_from(row).unwrap();
    assert_eq!(info.id, job.id);
    assert_eq!(info.range().page_count(), 10);
    assert!(info.result.is_none());

    db.close().await;
}

#[tokio::test]
async fn test_get_missing_job_returns_none() {
    let (db, _file) = open_db().await;
    let row = db.get_job(crate::types::JobId::new()).await.unwrap();
    assert!(row.is_none());
}

#[tokio::test]
async fn mark_running_only_applies_to_queued_jobs() {
    let (db, _file) = open_db().await;
    let job = new_job(1, 3);
    db.insert_job(&job).await.unwrap();

    assert!(db.mark_job_running(job.id).await.unwrap());
    assert!(
        !db.mark_job_running(job.id).await.unwrap(),
        "second start must not match"
    );

    let row = db.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(row.status(), JobStatus::Running);
    assert!(row.started_at.is_some());
}

#[tokio::test]
async fn progress_never_moves_backwards() {
    let (db, _file) = open_db().await;
    let job = new_job(1, 10);
    db.insert_job(&job).await.unwrap();
    db.mark_job_running(job.id).await.unwrap();

    db.update_job_progress(job.id, 4, "Downloaded 0004.jpg")
        .await
        .unwrap();
    db.update_job_progress(job.id, 2, "Downloaded 0002.jpg")
        .await
        .unwrap();

    let row = db.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(row.pages_done, 4);
    assert_eq!(row.message, "Downloaded 0004.jpg", "stale message is dropped too");
}

#[tokio::test]
async fn progress_is_ignored_unless_running() {
    let (db, _file) = open_db().await;
    let job = new_job(1, 10);
    db.insert_job(&job).await.unwrap();

    db.update_job_progress(job.id, 3, "early").await.unwrap();
    let row = db.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(row.pages_done, 0);
}

#[tokio::test]
async fn complete_job_records_result_and_flags_once() {
    let (db, _file) = open_db().await;
    let job = new_job(1, 10);
    db.insert_job(&job).await.unwrap();
    db.mark_job_running(job.id).await.unwrap();
    db.update_job_progress(job.id, 10, "Page 10 not available upstream")
        .await
        .unwrap();

    let result = JobResult {
        total_available: 7,
        downloaded: 7,
        skipped: 3,
        errors: vec![],
    };
    assert!(db.complete_job(job.id, &result, true, false).await.unwrap());
    assert!(
        !db.fail_job(job.id, "late failure").await.unwrap(),
        "terminal state is absorbing"
    );

    let info = JobInfo::try_from(db.get_job(job.id).await.unwrap().unwrap()).unwrap();
    assert_eq!(info.status, JobStatus::Completed);
    assert_eq!(info.result, Some(result));
    assert!(info.archive_available);
    assert!(!info.document_available);
    assert!(info.error.is_none());
    assert!(info.completed_at.is_some());
    assert_eq!(info.message, "Job completed");
}

#[tokio::test]
async fn fail_job_freezes_pages_done() {
    let (db, _file) = open_db().await;
    let job = new_job(1, 10);
    db.insert_job(&job).await.unwrap();
    db.mark_job_running(job.id).await.unwrap();
    db.update_job_progress(job.id, 5, "Downloaded 0005.jpg")
        .await
        .unwrap();

    assert!(db.fail_job(job.id, "invalid catalog: no record").await.unwrap());
    let completed_at = db.get_job(job.id).await.unwrap().unwrap().completed_at;

    assert!(
        !db.complete_job(job.id, &JobResult::default(), true, true)
            .await
            .unwrap()
    );
    db.update_job_progress(job.id, 9, "ignored").await.unwrap();

    let row = db.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(row.status(), JobStatus::Failed);
    assert_eq!(row.pages_done, 5);
    assert_eq!(row.error.as_deref(), Some("invalid catalog: no record"));
    assert_eq!(row.message, "Job failed: invalid catalog: no record");
    assert_eq!(row.completed_at, completed_at, "completed_at is stamped once");
    assert!(!row.archive_available);
}

#[tokio::test]
async fn released_jobs_are_orphaned_and_terminal_jobs_left_alone() {
    let (db, _file) = open_db().await;
    let queued = new_job(1, 2);
    let running = new_job(1, 2);
    let done = new_job(1, 2);
    for job in [&queued, &running, &done] {
        db.insert_job(job).await.unwrap();
    }
    db.mark_job_running(running.id).await.unwrap();
    db.mark_job_running(done.id).await.unwrap();
    db.complete_job(done.id, &JobResult::default(), false, false)
        .await
        .unwrap();

    let released = db
        .release_jobs(&[queued.id, running.id, done.id])
        .await
        .unwrap();
    assert_eq!(released, 2, "terminal jobs have nothing to release");

    let stale_before = chrono::Utc::now().timestamp() - 60;
    let mut failed = db.fail_orphaned_jobs("interrupted", stale_before).await.unwrap();
    failed.sort();
    let mut expected = vec![queued.id, running.id];
    expected.sort();
    assert_eq!(failed, expected);

    let row = db.get_job(done.id).await.unwrap().unwrap();
    assert_eq!(row.status(), JobStatus::Completed);
}

#[tokio::test]
async fn jobs_with_a_fresh_heartbeat_are_not_orphaned() {
    let (db, _file) = open_db().await;
    let live = new_job(1, 2);
    let stale = new_job(1, 2);
    for job in [&live, &stale] {
        db.insert_job(job).await.unwrap();
        db.mark_job_running(job.id).await.unwrap();
    }
    let now = chrono::Utc::now().timestamp();
    sqlx::query("UPDATE jobs SET heartbeat_at = ? WHERE id = ?")
        .bind(now - 600)
        .bind(stale.id.to_string())
        .execute(db.pool())
        .await
        .unwrap();

    let failed = db.fail_orphaned_jobs("interrupted", now - 60).await.unwrap();
    assert_eq!(failed, vec![stale.id]);
    let row = db.get_job(live.id).await.unwrap().unwrap();
    assert_eq!(row.status(), JobStatus::Running);
}

#[tokio::test]
async fn touch_refreshes_only_unfinished_jobs() {
    let (db, _file) = open_db().await;
    let running = new_job(1, 2);
    let done = new_job(1, 2);
    for job in [&running, &done] {
        db.insert_job(job).await.unwrap();
        db.mark_job_running(job.id).await.unwrap();
    }
    db.complete_job(done.id, &JobResult::default(), false, false)
        .await
        .unwrap();

    let later = chrono::Utc::now().timestamp() + 3600;
    assert_eq!(db.touch_jobs(&[running.id, done.id], later).await.unwrap(), 1);
    assert_eq!(db.touch_jobs(&[], later).await.unwrap(), 0);

    let row = db.get_job(running.id).await.unwrap().unwrap();
    assert_eq!(row.heartbeat_at, Some(later));
}

#[tokio::test]
async fn progress_on_a_finished_job_reports_no_update() {
    let (db, _file) = open_db().await;
    let job = new_job(1, 10);
    db.insert_job(&job).await.unwrap();
    db.mark_job_running(job.id).await.unwrap();

    assert!(db.update_job_progress(job.id, 1, "Downloaded 0001.jpg").await.unwrap());
    db.fail_job(job.id, "interrupted").await.unwrap();
    assert!(!db.update_job_progress(job.id, 2, "Downloaded 0002.jpg").await.unwrap());
}

#[tokio::test]
async fn standalone_listing_excludes_batch_jobs() {
    let (db, _file) = open_db().await;
    let standalone = new_job(1, 5);
    db.insert_job(&standalone).await.unwrap();

    let batch = crate::db::NewBatch {
        id: crate::types::BatchId::new(),
        catalog_id: standalone.catalog_id.clone(),
    };
    db.insert_batch(&batch, &[super::batch_job(batch.id, 0, 1, 2)])
        .await
        .unwrap();

    let rows = db.list_standalone_jobs().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].job_id().unwrap(), standalone.id);
    assert_eq!(db.count_jobs().await.unwrap(), 2);
}

#[tokio::test]
async fn delete_job_removes_row() {
    let (db, _file) = open_db().await;
    let job = new_job(1, 1);
    db.insert_job(&job).await.unwrap();

    assert!(db.delete_job(job.id).await.unwrap());
    assert!(!db.delete_job(job.id).await.unwrap());
    assert!(db.get_job(job.id).await.unwrap().is_none());
}
