use super::{batch_job, open_db};
use crate::db::NewBatch;
use crate::types::{BatchId, JobStatus};

fn new_batch() -> NewBatch {
    NewBatch {
        id: BatchId::new(),
        catalog_id: "https://catalog.archives.gov/id/12345".to_string(),
    }
}

#[tokio::test]
async fn insert_batch_creates_jobs_in_range_order() {
    let (db, _file) = open_db().await;
    let batch = new_batch();
    let jobs = vec![
        batch_job(batch.id, 0, 400, 420),
        batch_job(batch.id, 1, 1, 20),
        batch_job(batch.id, 2, 50, 50),
    ];

    db.insert_batch(&batch, &jobs).await.unwrap();

    let row = db.get_batch(batch.id).await.unwrap().expect("batch exists");
    assert_eq!(row.batch_id().unwrap(), batch.id);
    assert!(!row.assembly_claimed);
    assert!(!row.combined_document_available);
    assert!(row.completed_at.is_none());

    let rows = db.list_batch_jobs(batch.id).await.unwrap();
    let ids: Vec<_> = rows.iter().map(|r| r.job_id().unwrap()).collect();
    assert_eq!(ids, jobs.iter().map(|j| j.id).collect::<Vec<_>>());
    assert_eq!(rows[0].start_page, 400, "range order is input order, not page order");
    assert_eq!(rows[0].pages_total, 21);
    assert!(rows.iter().all(|r| r.status() == JobStatus::Queued));
}

#[tokio::test]
async fn failed_batch_insert_creates_nothing() {
    let (db, _file) = open_db().await;
    let batch = new_batch();
    let duplicate = batch_job(batch.id, 0, 1, 2);
    let jobs = vec![duplicate.clone(), duplicate];

    assert!(db.insert_batch(&batch, &jobs).await.is_err());
    assert!(db.get_batch(batch.id).await.unwrap().is_none());
    assert_eq!(db.count_jobs().await.unwrap(), 0);
}

#[tokio::test]
async fn assembly_claim_succeeds_exactly_once() {
    let (db, _file) = open_db().await;
    let batch = new_batch();
    db.insert_batch(&batch, &[batch_job(batch.id, 0, 1, 1)])
        .await
        .unwrap();

    assert!(db.claim_batch_assembly(batch.id).await.unwrap());
    assert!(!db.claim_batch_assembly(batch.id).await.unwrap());

    let row = db.get_batch(batch.id).await.unwrap().unwrap();
    assert!(row.assembly_claimed);
    assert!(row.completed_at.is_none(), "claiming does not finish the batch");
}

#[tokio::test]
async fn concurrent_claims_have_a_single_winner() {
    let (db, _file) = open_db().await;
    let db = std::sync::Arc::new(db);
    let batch = new_batch();
    db.insert_batch(&batch, &[batch_job(batch.id, 0, 1, 1)])
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            db.claim_batch_assembly(batch.id).await.unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn only_stale_claims_can_be_taken_over() {
    let (db, _file) = open_db().await;
    let unclaimed = new_batch();
    let fresh = new_batch();
    let stale = new_batch();
    for batch in [&unclaimed, &fresh, &stale] {
        db.insert_batch(batch, &[batch_job(batch.id, 0, 1, 1)])
            .await
            .unwrap();
    }
    db.claim_batch_assembly(fresh.id).await.unwrap();
    db.claim_batch_assembly(stale.id).await.unwrap();
    let now = chrono::Utc::now().timestamp();
    sqlx::query("UPDATE batches SET assembly_claimed_at = ? WHERE id = ?")
        .bind(now - 600)
        .bind(stale.id.to_string())
        .execute(db.pool())
        .await
        .unwrap();

    let stale_before = now - 60;
    assert!(db.claim_abandoned_assembly(unclaimed.id, stale_before).await.unwrap());
    assert!(!db.claim_abandoned_assembly(fresh.id, stale_before).await.unwrap());
    assert!(db.claim_abandoned_assembly(stale.id, stale_before).await.unwrap());
    assert!(
        !db.claim_abandoned_assembly(stale.id, stale_before).await.unwrap(),
        "a takeover refreshes the claim"
    );

    db.finish_batch_assembly(unclaimed.id, false).await.unwrap();
    assert!(
        !db.claim_abandoned_assembly(unclaimed.id, now + 60).await.unwrap(),
        "finished batches are never reclaimed"
    );
}

#[tokio::test]
async fn finishing_assembly_settles_the_batch() {
    let (db, _file) = open_db().await;
    let first = new_batch();
    let second = new_batch();
    db.insert_batch(&first, &[batch_job(first.id, 0, 1, 1)])
        .await
        .unwrap();
    db.insert_batch(&second, &[batch_job(second.id, 0, 1, 1)])
        .await
        .unwrap();

    db.claim_batch_assembly(first.id).await.unwrap();
    assert_eq!(db.list_unfinished_batches().await.unwrap().len(), 2);

    db.finish_batch_assembly(first.id, true).await.unwrap();

    let unfinished = db.list_unfinished_batches().await.unwrap();
    assert_eq!(unfinished.len(), 1);
    assert_eq!(unfinished[0].batch_id().unwrap(), second.id);

    let row = db.get_batch(first.id).await.unwrap().unwrap();
    assert!(row.combined_document_available);
    assert!(row.completed_at.is_some());
    assert_eq!(db.list_batches().await.unwrap().len(), 2);
}

#[tokio::test]
async fn finishing_requires_a_claim() {
    let (db, _file) = open_db().await;
    let batch = new_batch();
    db.insert_batch(&batch, &[batch_job(batch.id, 0, 1, 1)])
        .await
        .unwrap();

    db.finish_batch_assembly(batch.id, true).await.unwrap();

    let row = db.get_batch(batch.id).await.unwrap().unwrap();
    assert!(row.completed_at.is_none());
    assert!(!row.combined_document_available);
}

#[tokio::test]
async fn deleting_batch_cascades_to_jobs() {
    let (db, _file) = open_db().await;
    let batch = new_batch();
    db.insert_batch(
        &batch,
        &[batch_job(batch.id, 0, 1, 2), batch_job(batch.id, 1, 3, 4)],
    )
    .await
    .unwrap();
    assert_eq!(db.count_jobs().await.unwrap(), 2);

    assert!(db.delete_batch(batch.id).await.unwrap());
    assert_eq!(db.count_jobs().await.unwrap(), 0);
    assert!(db.get_batch(batch.id).await.unwrap().is_none());
}
