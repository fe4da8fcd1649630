//! A catalog.archives.gov stand-in served by wiremock

use image::{ImageBuffer, ImageFormat, Rgb};
use std::io::Cursor;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Record URL every fixture answers for
pub const RECORD_URL: &str = "https://catalog.archives.gov/id/178788901";

/// NAID in [`RECORD_URL`]
pub const NAID: &str = "178788901";

/// A small JPEG page scan
pub fn jpeg(page: u32) -> Vec<u8> {
    let shade = (page * 7 % 256) as u8;
    let img = ImageBuffer::from_pixel(4, 6, Rgb([shade, 200, 255 - shade]));
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::Jpeg)
        .expect("encode test jpeg");
    bytes.into_inner()
}

/// How the stand-in serves one page image
#[derive(Clone, Copy, Debug)]
pub enum PageFixture {
    /// 200 with a JPEG body
    Ok,
    /// 200 after a delay
    Slow(Duration),
    /// The record lists the page but the image is gone
    Missing,
    /// The image host keeps failing
    ServerError,
}

/// Start a catalog serving one record whose pages behave as given
pub async fn start_catalog(pages: &[PageFixture]) -> MockServer {
    let server = MockServer::start().await;

    let objects: Vec<_> = (1..=pages.len())
        .map(|n| serde_json::json!({ "objectUrl": format!("{}/media/{n}.jpg", server.uri()) }))
        .collect();
    Mock::given(method("GET"))
        .and(path("/proxy/records/search"))
        .and(query_param("naId", NAID))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "body": { "hits": { "hits": [
                { "_source": { "record": { "digitalObjects": objects } } }
            ] } }
        })))
        .mount(&server)
        .await;

    for (index, fixture) in pages.iter().enumerate() {
        let page = index as u32 + 1;
        let ok = ResponseTemplate::new(200)
            .insert_header("content-type", "image/jpeg")
            .set_body_bytes(jpeg(page));
        let response = match *fixture {
            PageFixture::Ok => ok,
            PageFixture::Slow(delay) => ok.set_delay(delay),
            PageFixture::Missing => ResponseTemplate::new(404),
            PageFixture::ServerError => ResponseTemplate::new(503),
        };
        Mock::given(method("GET"))
            .and(path(format!("/media/{page}.jpg")))
            .respond_with(response)
            .mount(&server)
            .await;
    }

    server
}

/// Catalog with `count` healthy pages
pub async fn start_healthy_catalog(count: usize) -> MockServer {
    start_catalog(&vec![PageFixture::Ok; count]).await
}
