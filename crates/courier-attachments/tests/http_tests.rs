// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `HttpFileSource` against a local wiremock server.

use std::sync::Arc;
use std::time::Duration;

use courier_attachments::{AttachmentLimits, AttachmentPipeline, BufferPool, HttpFileSource};
use courier_config::model::AttachmentConfig;
use courier_core::types::AttachmentDescriptor;
use courier_core::{Backoff, ChatPlatform, CourierError, RemoteFileSource};
use courier_test_utils::{ManualScheduler, MockChatPlatform};
use futures::StreamExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01";

fn loopback_allowed() -> AttachmentConfig {
    AttachmentConfig {
        allowed_private_ips: vec!["127.0.0.1".into()],
        ..AttachmentConfig::default()
    }
}

fn download_message(err: CourierError) -> String {
    match err {
        CourierError::Download { message, .. } => message,
        other => panic!("expected a download error, got {other:?}"),
    }
}

async fn serve_png(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/a.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG))
        .mount(server)
        .await;
}

#[tokio::test]
async fn loopback_is_refused_by_default() {
    let server = MockServer::start().await;
    serve_png(&server).await;

    let source = HttpFileSource::new(&AttachmentConfig::default()).unwrap();
    let err = source
        .fetch(&format!("{}/a.png", server.uri()))
        .await
        .unwrap_err();
    assert!(download_message(err).contains("private IP"));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn allowlisted_loopback_is_fetched() {
    let server = MockServer::start().await;
    serve_png(&server).await;

    let source = HttpFileSource::new(&loopback_allowed()).unwrap();
    let file = source
        .fetch(&format!("{}/a.png", server.uri()))
        .await
        .unwrap();
    assert_eq!(file.content_length, Some(PNG.len() as u64));

    let mut body = Vec::new();
    let mut stream = file.body;
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(body, PNG);
}

#[tokio::test]
async fn non_http_schemes_are_refused() {
    let source = HttpFileSource::new(&AttachmentConfig::default()).unwrap();
    for url in ["file:///etc/passwd", "ftp://example.com/a.png", "not a url"] {
        assert!(matches!(
            source.fetch(url).await,
            Err(CourierError::Download { .. })
        ));
    }
}

#[tokio::test]
async fn error_status_is_a_download_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let source = HttpFileSource::new(&loopback_allowed()).unwrap();
    let err = source
        .fetch(&format!("{}/gone.png", server.uri()))
        .await
        .unwrap_err();
    assert!(!err.is_transient());
    assert_eq!(download_message(err), "HTTP 404 Not Found");
}

#[tokio::test]
async fn server_errors_and_rate_limits_are_retryable() {
    let server = MockServer::start().await;
    for (route, status) in [("/busy.png", 503), ("/slow-down.png", 429)] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
    }

    let source = HttpFileSource::new(&loopback_allowed()).unwrap();
    for route in ["/busy.png", "/slow-down.png"] {
        let err = source
            .fetch(&format!("{}{route}", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::Download { retryable: true, .. }));
    }
}

#[tokio::test]
async fn refused_urls_are_not_retryable() {
    let server = MockServer::start().await;
    serve_png(&server).await;

    let source = HttpFileSource::new(&AttachmentConfig::default()).unwrap();
    for url in [format!("{}/a.png", server.uri()), "file:///etc/passwd".to_string()] {
        let err = source.fetch(&url).await.unwrap_err();
        assert!(matches!(err, CourierError::Download { retryable: false, .. }));
    }
}

#[tokio::test]
async fn redirect_to_private_address_is_refused() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hop.png"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", "http://10.0.0.1/secret.png"),
        )
        .mount(&server)
        .await;

    let source = HttpFileSource::new(&loopback_allowed()).unwrap();
    let err = source
        .fetch(&format!("{}/hop.png", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, CourierError::Download { .. }));
}

#[tokio::test]
async fn redirect_within_allowed_hosts_is_followed() {
    let server = MockServer::start().await;
    serve_png(&server).await;
    Mock::given(method("GET"))
        .and(path("/hop.png"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", format!("{}/a.png", server.uri())),
        )
        .mount(&server)
        .await;

    let source = HttpFileSource::new(&loopback_allowed()).unwrap();
    let file = source
        .fetch(&format!("{}/hop.png", server.uri()))
        .await
        .unwrap();
    let chunks: Vec<_> = file.body.collect().await;
    assert!(chunks.iter().all(Result::is_ok));
}

#[tokio::test]
async fn end_to_end_batch_over_http() {
    let server = MockServer::start().await;
    serve_png(&server).await;

    let config = loopback_allowed();
    let chat = MockChatPlatform::new();
    chat.add_thread("th-1").await;
    let thread = chat.fetch_thread("th-1").await.unwrap().unwrap();
    let pipeline = AttachmentPipeline::new(
        Arc::new(HttpFileSource::new(&config).unwrap()),
        Arc::new(chat.clone()),
        Arc::new(ManualScheduler::new()),
        Arc::new(BufferPool::from_config(&config)),
        AttachmentLimits::from_config(&config),
        Backoff::new(Duration::from_millis(100), Duration::from_secs(1)),
    );

    let batch = [
        AttachmentDescriptor {
            url: format!("{}/a.png", server.uri()),
            declared_mime: Some("image/png".into()),
            declared_size: Some(PNG.len() as u64),
            filename: "Screenshot 2026.png".into(),
        },
        AttachmentDescriptor {
            url: format!("{}/missing.png", server.uri()),
            declared_mime: None,
            declared_size: None,
            filename: "missing.png".into(),
        },
    ];
    let report = pipeline.process(&thread, &batch, None).await.unwrap();

    assert_eq!(report.accepted.len(), 1);
    assert_eq!(report.accepted[0].filename, "Screenshot_2026.png");
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(chat.sent().await[0].message.files[0].data, PNG);
}
