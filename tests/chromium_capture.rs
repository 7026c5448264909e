//! End-to-end captures against a real Chromium. Run with `cargo test -- --ignored`.

use pagesnap_lib::{Config, PageSummarizer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const PAGE: &str = r#"<!doctype html>
<html>
  <head><title>fixture</title></head>
  <body>
    <h1>Fixture</h1>
    <a href="/about">About us</a>
    <img src="/pixel.png" alt="">
  </body>
</html>"#;

const POSTING_PAGE: &str = r#"<!doctype html>
<html>
  <body>
    <script>fetch("/submit", { method: "POST", body: "name=pagesnap&id=7" });</script>
  </body>
</html>"#;

fn pixel_png() -> Vec<u8> {
    let image = image::DynamicImage::ImageRgb8(image::RgbImage::new(1, 1));
    let mut bytes = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageOutputFormat::Png)
        .unwrap();
    bytes.into_inner()
}

/// Serves the fixture page and its image until the test ends.
async fn serve_fixture() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let png = pixel_png();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let png = png.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]);
                let path = request.split_whitespace().nth(1).unwrap_or("/");

                let (status, content_type, body) = match path {
                    "/" => ("200 OK", "text/html", PAGE.as_bytes().to_vec()),
                    "/pixel.png" => ("200 OK", "image/png", png),
                    "/post" => ("200 OK", "text/html", POSTING_PAGE.as_bytes().to_vec()),
                    "/submit" => ("200 OK", "text/plain", b"ok".to_vec()),
                    _ => ("404 Not Found", "text/plain", b"not found".to_vec()),
                };
                let head = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}/")
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a local Chrome/Chromium"]
async fn summarizes_a_static_page() {
    let url = serve_fixture().await;
    let summarizer = PageSummarizer::from_config(&Config::default()).unwrap();
    let cancel = CancellationToken::new();

    let summary = summarizer.capture_summary(&url, &cancel).await.unwrap();

    assert!(summary.html.contains("Fixture"));
    assert_eq!(summary.links.len(), 1);
    assert_eq!(summary.links[0].href, format!("{url}about"));
    assert_eq!(summary.links[0].text, "About us");
    assert!(!summary.network_activity.is_empty());
    assert!(summary
        .network_activity
        .iter()
        .any(|activity| activity.request.url == url && activity.response.status == 200));
    assert!(!summary.screenshot.is_empty());

    summarizer.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a local Chrome/Chromium"]
async fn reuses_the_engine_across_captures() {
    let url = serve_fixture().await;
    let summarizer = PageSummarizer::from_config(&Config::default()).unwrap();
    let cancel = CancellationToken::new();

    let markup = summarizer.get_markup(&url, &cancel).await.unwrap();
    let screenshot = summarizer.get_screenshot(&url, false, &cancel).await.unwrap();

    assert!(markup.contains("About us"));
    assert!(screenshot.starts_with(&[0x89, b'P', b'N', b'G']));
    assert_eq!(summarizer.pool().manager().launch_count(), 1);

    summarizer.shutdown().await.unwrap();
    assert!(!summarizer.pool().manager().is_running());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a local Chrome/Chromium"]
async fn records_the_body_of_posted_requests() {
    let url = serve_fixture().await;
    let summarizer = PageSummarizer::from_config(&Config::default()).unwrap();
    let cancel = CancellationToken::new();

    let summary = summarizer
        .capture_summary(&format!("{url}post"), &cancel)
        .await
        .unwrap();

    let submit = summary
        .network_activity
        .iter()
        .find(|activity| activity.request.url == format!("{url}submit"))
        .expect("submit request captured");
    assert_eq!(submit.request.method, "POST");
    assert_eq!(submit.request.body.as_deref(), Some("name=pagesnap&id=7"));
    assert_eq!(submit.response.body.as_deref(), Some("ok"));

    summarizer.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a local Chrome/Chromium"]
async fn evaluates_scripts_in_the_loaded_page() {
    let url = serve_fixture().await;
    let summarizer = PageSummarizer::from_config(&Config::default()).unwrap();
    let cancel = CancellationToken::new();

    let title = summarizer
        .evaluate(&url, "document.title", &cancel)
        .await
        .unwrap();
    let links = summarizer
        .evaluate(&url, "document.querySelectorAll('a').length", &cancel)
        .await
        .unwrap();

    assert_eq!(title, serde_json::json!("fixture"));
    assert_eq!(links, serde_json::json!(1));

    summarizer.shutdown().await.unwrap();
}
