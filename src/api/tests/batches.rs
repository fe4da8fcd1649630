use super::*;

#[tokio::test]
async fn create_poll_and_download_a_batch() {
    let app = TestApp::new(MockFetcher {
        total_pages: 500,
        fatal_page: Some(410),
        ..MockFetcher::default()
    })
    .await;

    let response = app
        .post_json(
            "/batches",
            json!({
                "catalog_url": CATALOG,
                "ranges": [
                    {"start_page": 1, "end_page": 20},
                    {"start_page": 400, "end_page": 420}
                ]
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    let jobs = created["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0]["range_index"], 0);
    assert_eq!(jobs[1]["range_index"], 1);
    let status_url = created["status_url"].as_str().unwrap();

    let batch = app
        .poll_until(status_url, |batch| !batch["completed_at"].is_null())
        .await;
    assert_eq!(batch["status"], "completed_with_errors");
    assert_eq!(batch["combined_pdf_available"], true);
    assert_eq!(batch["jobs"][0]["id"], jobs[0]["job_id"]);
    assert_eq!(batch["jobs"][0]["status"], "completed");
    assert_eq!(batch["jobs"][1]["status"], "failed");

    let response = app.get(&format!("{status_url}/download.pdf")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(response.headers(), "content-type"), "application/pdf");
    assert!(
        header(response.headers(), "content-disposition").starts_with("attachment; filename=\"nara-")
    );
    let bytes = body_bytes(response).await;
    let document = lopdf::Document::load_mem(&bytes).unwrap();
    assert_eq!(document.get_pages().len(), 20);
}

#[tokio::test]
async fn too_many_ranges_is_rejected() {
    let app = TestApp::new(MockFetcher::with_pages(20)).await;

    let ranges: Vec<Value> = (1..=11)
        .map(|page| json!({"start_page": page, "end_page": page}))
        .collect();
    let response = app
        .post_json("/batches", json!({"catalog_url": CATALOG, "ranges": ranges}))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["code"], "validation_error");
    assert!(app.downloader.db.list_batches().await.unwrap().is_empty());
}

#[tokio::test]
async fn combined_document_waits_for_every_job() {
    let app = TestApp::new(MockFetcher {
        total_pages: 10,
        page_latency: Some(Duration::from_millis(100)),
        ..MockFetcher::default()
    })
    .await;

    let created = json_body(
        app.post_json(
            "/batches",
            json!({"catalog_url": CATALOG, "ranges": [{"start_page": 1, "end_page": 5}]}),
        )
        .await,
    )
    .await;

    let response = app
        .get(&format!("{}/download.pdf", created["status_url"].as_str().unwrap()))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["error"]["code"], "artifact_not_ready");
}

#[tokio::test]
async fn unknown_batch_is_not_found() {
    let app = TestApp::new(MockFetcher::with_pages(1)).await;

    for uri in [
        "/batches/3f1c9d2e-0000-4000-8000-000000000000",
        "/batches/nope/download.pdf",
    ] {
        let response = app.get(uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(json_body(response).await["error"]["code"], "batch_not_found");
    }
}
