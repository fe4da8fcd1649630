use super::*;
use std::collections::HashSet;

fn pdf_page_count(path: &std::path::Path) -> usize {
    lopdf::Document::load(path).unwrap().get_pages().len()
}

/// Page number behind each page of a composed document, in document order
///
/// Each page's image stream is matched back to the JPEG served for one of
/// `candidates`.
fn composed_page_numbers(path: &std::path::Path, candidates: &[u32]) -> Vec<u32> {
    let doc = lopdf::Document::load(path).unwrap();
    doc.get_pages()
        .values()
        .map(|&page_id| {
            let page = doc.get_dictionary(page_id).unwrap();
            let resources_id = page.get(b"Resources").unwrap().as_reference().unwrap();
            let resources = doc.get_dictionary(resources_id).unwrap();
            let image_id = resources
                .get(b"XObject")
                .unwrap()
                .as_dict()
                .unwrap()
                .get(b"Im1")
                .unwrap()
                .as_reference()
                .unwrap();
            let stream = doc.get_object(image_id).unwrap().as_stream().unwrap();
            *candidates
                .iter()
                .find(|&&n| page_jpeg(n) == stream.content)
                .expect("page image matches no served page")
        })
        .collect()
}

async fn wait_for_batch(downloader: &CatalogDownloader, id: crate::types::BatchId) -> crate::types::BatchInfo {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let batch = downloader.batch(id).await.unwrap();
        if batch.completed_at.is_some() {
            return batch;
        }
        assert!(tokio::time::Instant::now() < deadline, "batch {id} never finished");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn failed_range_is_left_out_of_the_combined_document() {
    let fetcher = Arc::new(MockFetcher {
        total_pages: 500,
        fatal_page: Some(410),
        ..MockFetcher::default()
    });
    let (downloader, _dir) = create_test_downloader(fetcher).await;

    let ranges = [PageRange::new(1, 20), PageRange::new(400, 420)];
    let created = downloader.create_batch(CATALOG, &ranges).await.unwrap();
    assert_eq!(created.jobs.len(), 2);
    assert_eq!(created.jobs[1].range_index, 1);

    let batch = wait_for_batch(&downloader, created.batch_id).await;

    assert_eq!(batch.status, BatchStatus::CompletedWithErrors);
    assert_eq!(batch.jobs[0].status, JobStatus::Completed);
    assert_eq!(batch.jobs[0].pages_done, 20);
    assert_eq!(batch.jobs[1].status, JobStatus::Failed);
    assert_eq!(batch.jobs[1].pages_done, 10);
    assert!(batch.combined_document_available);

    let path = downloader.storage.combined_document_path(created.batch_id);
    assert_eq!(pdf_page_count(&path), 20);
}

#[tokio::test]
async fn batch_jobs_are_listed_in_range_order() {
    let (downloader, _dir) = create_test_downloader(Arc::new(MockFetcher::with_pages(50))).await;

    let ranges = [
        PageRange::new(30, 31),
        PageRange::new(1, 3),
        PageRange::new(10, 10),
    ];
    let created = downloader.create_batch(CATALOG, &ranges).await.unwrap();
    let batch = wait_for_batch(&downloader, created.batch_id).await;

    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(batch.job_ids(), created.jobs.iter().map(|j| j.job_id).collect::<Vec<_>>());
    let listed: Vec<PageRange> = batch.jobs.iter().map(JobInfo::range).collect();
    assert_eq!(listed, ranges);
    for (index, job) in batch.jobs.iter().enumerate() {
        assert_eq!(job.batch_id, Some(created.batch_id));
        assert_eq!(job.batch_index, Some(index as u32));
    }

    let path = downloader.storage.combined_document_path(created.batch_id);
    assert_eq!(pdf_page_count(&path), 6);
}

#[tokio::test]
async fn combined_document_follows_range_order_not_completion_order() {
    let fetcher = Arc::new(MockFetcher {
        total_pages: 20,
        page_latency: Some(Duration::from_millis(30)),
        ..MockFetcher::default()
    });
    let (downloader, _dir) = create_test_downloader(fetcher).await;

    // The single-page range finishes first, the first range last
    let ranges = [
        PageRange::new(7, 9),
        PageRange::new(1, 2),
        PageRange::new(15, 15),
    ];
    let created = downloader.create_batch(CATALOG, &ranges).await.unwrap();
    let batch = wait_for_batch(&downloader, created.batch_id).await;
    assert_eq!(batch.status, BatchStatus::Completed);
    assert!(batch.combined_document_available);

    let path = downloader.storage.combined_document_path(created.batch_id);
    let served = [1, 2, 7, 8, 9, 15];
    assert_eq!(composed_page_numbers(&path, &served), [7, 8, 9, 1, 2, 15]);
}

#[tokio::test]
async fn undecodable_page_does_not_cost_the_combined_document() {
    let fetcher = Arc::new(MockFetcher {
        total_pages: 10,
        garbage_pages: HashSet::from([6]),
        ..MockFetcher::default()
    });
    let (downloader, _dir) = create_test_downloader(fetcher).await;

    let ranges = [PageRange::new(1, 3), PageRange::new(5, 7)];
    let created = downloader.create_batch(CATALOG, &ranges).await.unwrap();
    let batch = wait_for_batch(&downloader, created.batch_id).await;

    assert_eq!(batch.status, BatchStatus::Completed);
    assert!(batch.combined_document_available);
    assert!(batch.jobs[1].document_available);

    let path = downloader.storage.combined_document_path(created.batch_id);
    let served = [1, 2, 3, 5, 7];
    assert_eq!(composed_page_numbers(&path, &served), [1, 2, 3, 5, 7]);
}

#[tokio::test]
async fn batch_is_running_until_every_job_finishes() {
    let fetcher = Arc::new(MockFetcher {
        total_pages: 10,
        page_latency: Some(Duration::from_millis(50)),
        ..MockFetcher::default()
    });
    let (downloader, _dir) = create_test_downloader(fetcher).await;

    let ranges = [PageRange::new(1, 1), PageRange::new(2, 6)];
    let created = downloader.create_batch(CATALOG, &ranges).await.unwrap();

    let first = downloader
        .wait_for_job(created.jobs[0].job_id, WAIT)
        .await
        .unwrap();
    assert_eq!(first.status, JobStatus::Completed);

    let batch = downloader.batch(created.batch_id).await.unwrap();
    assert_eq!(batch.status, BatchStatus::Running);
    assert!(batch.completed_at.is_none());
    assert!(!batch.combined_document_available);

    let batch = wait_for_batch(&downloader, created.batch_id).await;
    assert_eq!(batch.status, BatchStatus::Completed);
}

#[tokio::test]
async fn assembly_happens_once() {
    let (downloader, _dir) = create_test_downloader(Arc::new(MockFetcher::with_pages(4))).await;

    let ranges = [PageRange::new(1, 2), PageRange::new(3, 4)];
    let created = downloader.create_batch(CATALOG, &ranges).await.unwrap();
    let batch = wait_for_batch(&downloader, created.batch_id).await;
    let finished_at = batch.completed_at;

    let path = downloader.storage.combined_document_path(created.batch_id);
    let modified = std::fs::metadata(&path).unwrap().modified().unwrap();

    // Late notifications find the claim taken and change nothing
    let notifications = (0..4).map(|_| downloader.on_batch_job_finished(created.batch_id));
    for outcome in futures::future::join_all(notifications).await {
        outcome.unwrap();
    }

    let again = downloader.batch(created.batch_id).await.unwrap();
    assert_eq!(again.completed_at, finished_at);
    assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), modified);
}

#[tokio::test]
async fn batch_of_failed_jobs_has_no_combined_document() {
    let fetcher = Arc::new(MockFetcher {
        invalid_record: true,
        ..MockFetcher::default()
    });
    let (downloader, _dir) = create_test_downloader(fetcher).await;

    let ranges = [PageRange::new(1, 2), PageRange::new(5, 6)];
    let created = downloader.create_batch(CATALOG, &ranges).await.unwrap();
    let batch = wait_for_batch(&downloader, created.batch_id).await;

    assert_eq!(batch.status, BatchStatus::CompletedWithErrors);
    assert!(!batch.combined_document_available);
    assert!(batch.jobs.iter().all(|job| job.status == JobStatus::Failed));
}

#[tokio::test]
async fn unknown_batch_is_not_found() {
    let (downloader, _dir) = create_test_downloader(Arc::new(MockFetcher::with_pages(1))).await;

    let err = downloader
        .batch(crate::types::BatchId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Job(JobError::BatchNotFound { .. })));
}
