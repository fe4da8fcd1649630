use super::*;

async fn assert_rejected(downloader: &CatalogDownloader, catalog: &str, ranges: &[PageRange]) -> String {
    let err = downloader.create_batch(catalog, ranges).await.unwrap_err();
    let Error::Validation(message) = err else {
        panic!("expected a validation error, got {err:?}");
    };
    assert_eq!(downloader.db.count_jobs().await.unwrap(), 0);
    assert!(downloader.db.list_batches().await.unwrap().is_empty());
    message
}

#[tokio::test]
async fn too_many_pages_creates_nothing() {
    let (downloader, _dir) = create_test_downloader(Arc::new(MockFetcher::with_pages(1000))).await;

    let message = assert_rejected(
        &downloader,
        CATALOG,
        &[PageRange::new(1, 500), PageRange::new(501, 801)],
    )
    .await;
    assert!(message.contains("801"), "{message}");

    let err = downloader.create_job(CATALOG, 1, 801).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(downloader.db.count_jobs().await.unwrap(), 0);
}

#[tokio::test]
async fn limits_are_inclusive() {
    let (downloader, _dir) = create_test_downloader(Arc::new(MockFetcher::with_pages(0))).await;

    let ranges: Vec<PageRange> = (0..10).map(|i| PageRange::new(i * 80 + 1, i * 80 + 80)).collect();
    let created = downloader.create_batch(CATALOG, &ranges).await.unwrap();
    assert_eq!(created.jobs.len(), 10);
}

#[tokio::test]
async fn too_many_ranges_creates_nothing() {
    let (downloader, _dir) = create_test_downloader(Arc::new(MockFetcher::with_pages(20))).await;

    let ranges: Vec<PageRange> = (1..=11).map(|page| PageRange::new(page, page)).collect();
    let message = assert_rejected(&downloader, CATALOG, &ranges).await;
    assert!(message.contains("too many ranges"), "{message}");
}

#[tokio::test]
async fn malformed_ranges_are_rejected() {
    let (downloader, _dir) = create_test_downloader(Arc::new(MockFetcher::with_pages(20))).await;

    assert_rejected(&downloader, CATALOG, &[]).await;
    assert_rejected(&downloader, CATALOG, &[PageRange::new(0, 3)]).await;
    let message = assert_rejected(
        &downloader,
        CATALOG,
        &[PageRange::new(1, 2), PageRange::new(9, 4)],
    )
    .await;
    assert!(message.contains("end page is before start page"), "{message}");
}

#[tokio::test]
async fn bad_catalog_identifier_is_rejected_up_front() {
    let fetcher = Arc::new(MockFetcher::with_pages(20));
    let (downloader, _dir) = create_test_downloader(fetcher.clone()).await;

    let message = assert_rejected(
        &downloader,
        "https://example.com/not-a-record",
        &[PageRange::new(1, 2)],
    )
    .await;
    assert!(message.contains("record ID"), "{message}");
    assert_eq!(fetcher.calls(), 0);
}
