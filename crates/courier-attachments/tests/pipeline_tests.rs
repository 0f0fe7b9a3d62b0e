// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pipeline behaviour against mock downloads and a mock chat platform.

use std::sync::Arc;
use std::time::Duration;

use courier_attachments::{AttachmentLimits, AttachmentPipeline, BufferPool, RejectionReason};
use courier_core::types::{AttachmentDescriptor, ChannelKind, ThreadHandle};
use courier_core::{Backoff, ChatPlatform, CourierError};
use courier_test_utils::{ManualScheduler, MockChatPlatform, MockFile, MockFileSource};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
const JPEG: &[u8] = b"\xff\xd8\xff\xe0\0\x10JFIF";
const GIF: &[u8] = b"GIF89a\x01\0\x01\0";

fn image(header: &[u8], size: usize) -> Vec<u8> {
    let mut data = header.to_vec();
    data.resize(size.max(header.len()), 0);
    data
}

fn descriptor(url: &str, filename: &str, mime: Option<&str>) -> AttachmentDescriptor {
    AttachmentDescriptor {
        url: url.to_string(),
        declared_mime: mime.map(str::to_string),
        declared_size: None,
        filename: filename.to_string(),
    }
}

fn limits() -> AttachmentLimits {
    AttachmentLimits {
        max_file_bytes: 20_000,
        max_files_per_batch: 4,
        max_batch_bytes: 50_000,
        concurrency: 2,
        download_timeout: Duration::from_secs(5),
        upload_timeout: Duration::from_secs(5),
        upload_attempts: 3,
    }
}

struct Fixture {
    files: MockFileSource,
    chat: MockChatPlatform,
    clock: ManualScheduler,
    pool: Arc<BufferPool>,
    pipeline: AttachmentPipeline,
    thread: ThreadHandle,
}

async fn fixture_with(limits: AttachmentLimits, pool: BufferPool) -> Fixture {
    let files = MockFileSource::new();
    let chat = MockChatPlatform::new();
    let clock = ManualScheduler::new();
    let pool = Arc::new(pool);
    chat.add_thread("th-1").await;
    let thread = chat.fetch_thread("th-1").await.unwrap().unwrap();
    let pipeline = AttachmentPipeline::new(
        Arc::new(files.clone()),
        Arc::new(chat.clone()),
        Arc::new(clock.clone()),
        Arc::clone(&pool),
        limits,
        Backoff::new(Duration::from_millis(200), Duration::from_secs(5)),
    );
    Fixture {
        files,
        chat,
        clock,
        pool,
        pipeline,
        thread,
    }
}

async fn fixture() -> Fixture {
    fixture_with(limits(), BufferPool::new(4, 1 << 20)).await
}

#[tokio::test]
async fn valid_images_are_uploaded_in_one_message() {
    let f = fixture().await;
    f.files.serve("https://cdn/a", image(PNG, 1_000)).await;
    f.files.serve("https://cdn/b", image(JPEG, 2_000)).await;

    let batch = [
        descriptor("https://cdn/a", "screen shot.png", Some("image/png")),
        descriptor("https://cdn/b", "photo.jpeg", Some("image/jpeg")),
    ];
    let report = f
        .pipeline
        .process(&f.thread, &batch, Some("from customer".into()))
        .await
        .unwrap();

    assert!(report.rejected.is_empty());
    assert_eq!(report.accepted.len(), 2);
    assert_eq!(report.accepted_bytes(), 3_000);
    assert!(report.message_id.is_some());

    let sent = f.chat.sent().await;
    assert_eq!(sent.len(), 1);
    let files = &sent[0].message.files;
    assert_eq!(files[0].filename, "screen_shot.png");
    assert_eq!(files[0].mime_type, "image/png");
    assert_eq!(files[1].filename, "photo.jpeg");
    assert_eq!(sent[0].message.content.as_deref(), Some("from customer"));
}

#[tokio::test]
async fn mime_mismatch_is_rejected_and_the_rest_continue() {
    let f = fixture().await;
    f.files.serve("https://cdn/a", image(PNG, 500)).await;
    f.files.serve("https://cdn/b", image(GIF, 500)).await;

    let batch = [
        descriptor("https://cdn/a", "a.png", Some("image/jpeg")),
        descriptor("https://cdn/b", "b.gif", Some("image/gif")),
    ];
    let report = f.pipeline.process(&f.thread, &batch, None).await.unwrap();

    assert_eq!(report.accepted.len(), 1);
    assert_eq!(report.accepted[0].index, 1);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(
        report.rejected[0].reason,
        RejectionReason::MimeMismatch {
            declared: "image/jpeg".into(),
            detected: "image/png",
        }
    );
    assert_eq!(f.chat.sent().await[0].message.files.len(), 1);
}

#[tokio::test]
async fn extension_is_corrected_to_the_sniffed_format() {
    let f = fixture().await;
    f.files.serve("https://cdn/a", image(PNG, 100)).await;

    let batch = [descriptor("https://cdn/a", "../../invoice.exe", None)];
    let report = f.pipeline.process(&f.thread, &batch, None).await.unwrap();
    assert_eq!(report.accepted[0].filename, "invoice.png");
}

#[tokio::test]
async fn non_image_content_is_unsupported() {
    let f = fixture().await;
    f.files.serve("https://cdn/a", b"%PDF-1.7 not an image".to_vec()).await;

    let batch = [descriptor("https://cdn/a", "doc.png", Some("image/png"))];
    let report = f.pipeline.process(&f.thread, &batch, None).await.unwrap();
    assert_eq!(report.rejected[0].reason, RejectionReason::UnsupportedFormat);
    assert!(report.message_id.is_none());
    assert_eq!(f.chat.send_calls(), 0);
}

#[tokio::test]
async fn declared_oversize_is_never_downloaded() {
    let f = fixture().await;
    f.files.serve("https://cdn/big", image(PNG, 100)).await;

    let mut big = descriptor("https://cdn/big", "big.png", None);
    big.declared_size = Some(1_000_000);
    let report = f.pipeline.process(&f.thread, &[big], None).await.unwrap();

    assert_eq!(
        report.rejected[0].reason,
        RejectionReason::DeclaredTooLarge {
            declared: 1_000_000,
            limit: 20_000,
        }
    );
    assert!(f.files.fetched().await.is_empty());
}

#[tokio::test]
async fn lying_content_length_is_cut_off_mid_stream() {
    let f = fixture().await;
    f.files
        .serve_with(
            "https://cdn/liar",
            MockFile::lying(image(PNG, 100_000), Some(1_000)),
        )
        .await;

    let batch = [descriptor("https://cdn/liar", "small.png", None)];
    let report = f.pipeline.process(&f.thread, &batch, None).await.unwrap();

    assert_eq!(
        report.rejected[0].reason,
        RejectionReason::TooLarge { limit: 20_000 }
    );
    let served = f.files.bytes_served();
    assert!(served > 20_000, "served {served}");
    assert!(served < 100_000, "served {served}");
}

#[tokio::test]
async fn advertised_oversize_is_refused_before_reading() {
    let f = fixture().await;
    f.files.serve("https://cdn/big", image(PNG, 30_000)).await;

    let batch = [descriptor("https://cdn/big", "big.png", None)];
    let report = f.pipeline.process(&f.thread, &batch, None).await.unwrap();
    assert_eq!(
        report.rejected[0].reason,
        RejectionReason::TooLarge { limit: 20_000 }
    );
    assert_eq!(f.files.bytes_served(), 0);
}

#[tokio::test]
async fn files_beyond_the_count_limit_are_rejected() {
    let f = fixture().await;
    let mut batch = Vec::new();
    for i in 0..6 {
        let url = format!("https://cdn/{i}");
        f.files.serve(&url, image(PNG, 100)).await;
        batch.push(descriptor(&url, &format!("{i}.png"), None));
    }

    let report = f.pipeline.process(&f.thread, &batch, None).await.unwrap();
    assert_eq!(report.accepted.len(), 4);
    let rejected: Vec<usize> = report.rejected.iter().map(|r| r.index).collect();
    assert_eq!(rejected, vec![4, 5]);
    assert!(
        report
            .rejected
            .iter()
            .all(|r| r.reason == RejectionReason::TooManyFiles { limit: 4 })
    );
    assert_eq!(f.files.fetched().await.len(), 4);
}

#[tokio::test]
async fn batch_byte_cap_admits_in_input_order() {
    let f = fixture().await;
    for (i, size) in [18_000usize, 18_000, 18_000, 5_000].iter().enumerate() {
        f.files
            .serve(&format!("https://cdn/{i}"), image(PNG, *size))
            .await;
    }
    let batch: Vec<_> = (0..4)
        .map(|i| descriptor(&format!("https://cdn/{i}"), "x.png", None))
        .collect();

    let report = f.pipeline.process(&f.thread, &batch, None).await.unwrap();
    let accepted: Vec<usize> = report.accepted.iter().map(|a| a.index).collect();
    assert_eq!(accepted, vec![0, 1, 3]);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].index, 2);
    assert!(matches!(
        report.rejected[0].reason,
        RejectionReason::ExceedsBatchLimit {
            size: 18_000,
            limit: 50_000
        }
    ));
    assert!(report.accepted_bytes() <= 50_000);
}

#[tokio::test]
async fn permanent_download_failures_are_reported_per_file() {
    let f = fixture().await;
    f.files.serve("https://cdn/ok", image(PNG, 100)).await;
    f.files
        .serve_with("https://cdn/gone", MockFile::Fail("HTTP 410 Gone".into()))
        .await;

    let batch = [
        descriptor("https://cdn/missing", "a.png", None),
        descriptor("https://cdn/gone", "b.png", None),
        descriptor("https://cdn/ok", "c.png", None),
    ];
    let report = f.pipeline.process(&f.thread, &batch, None).await.unwrap();

    assert_eq!(report.accepted.len(), 1);
    assert!(report.message_id.is_some());
    assert_eq!(
        report.rejected[0].reason,
        RejectionReason::DownloadFailed {
            message: "HTTP 404 Not Found".into(),
            retryable: false,
        }
    );
    assert_eq!(
        report.rejected[1].reason,
        RejectionReason::DownloadFailed {
            message: "HTTP 410 Gone".into(),
            retryable: false,
        }
    );
}

#[tokio::test]
async fn transient_download_failure_holds_the_batch_back() {
    let f = fixture().await;
    f.files.serve("https://cdn/ok", image(PNG, 100)).await;
    f.files
        .serve_with(
            "https://cdn/reset",
            MockFile::FailMidway {
                chunks: vec![bytes::Bytes::from_static(PNG)],
                message: "connection reset".into(),
            },
        )
        .await;
    f.files
        .serve_with("https://cdn/busy", MockFile::Unavailable("HTTP 503".into()))
        .await;

    let batch = [
        descriptor("https://cdn/ok", "a.png", None),
        descriptor("https://cdn/reset", "b.png", None),
    ];
    let err = f.pipeline.process(&f.thread, &batch, None).await.unwrap_err();
    assert!(err.is_transient());
    assert!(matches!(
        err,
        CourierError::Download { ref url, retryable: true, .. } if url == "https://cdn/reset"
    ));
    assert_eq!(f.chat.send_calls(), 0);

    let batch = [descriptor("https://cdn/busy", "c.png", None)];
    let err = f.pipeline.process(&f.thread, &batch, None).await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(f.chat.send_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn stalled_download_times_out_and_is_retried_later() {
    let f = fixture().await;
    f.files.serve_with("https://cdn/stall", MockFile::Stall).await;
    f.files.serve("https://cdn/ok", image(GIF, 100)).await;

    let batch = [
        descriptor("https://cdn/stall", "a.png", None),
        descriptor("https://cdn/ok", "b.gif", None),
    ];
    let validated = f.pipeline.validate(&batch).await;
    assert_eq!(
        validated.rejected[0].reason,
        RejectionReason::DownloadTimeout(Duration::from_secs(5))
    );
    assert_eq!(validated.accepted.len(), 1);

    let err = f.pipeline.process(&f.thread, &batch, None).await.unwrap_err();
    assert!(matches!(
        err,
        CourierError::Timeout { duration } if duration == Duration::from_secs(5)
    ));
    assert_eq!(f.chat.send_calls(), 0);
    assert_eq!(f.files.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn downloads_never_exceed_the_concurrency_limit() {
    let f = fixture_with(
        AttachmentLimits {
            max_files_per_batch: 10,
            concurrency: 3,
            ..limits()
        },
        BufferPool::new(4, 1 << 20),
    )
    .await;
    let mut batch = Vec::new();
    for i in 0..10 {
        let url = format!("https://cdn/slow-{i}");
        f.files.serve_with(&url, MockFile::Stall).await;
        batch.push(descriptor(&url, "a.png", None));
    }

    let validated = f.pipeline.validate(&batch).await;

    assert_eq!(validated.rejected.len(), 10);
    assert_eq!(f.files.fetched().await.len(), 10);
    assert_eq!(f.files.peak_in_flight(), 3);
    assert_eq!(f.files.in_flight(), 0);
}

#[tokio::test]
async fn upload_is_retried_then_reported() {
    let f = fixture().await;
    f.files.serve("https://cdn/a", image(PNG, 100)).await;
    let batch = [descriptor("https://cdn/a", "a.png", None)];

    f.chat.fail_next_sends(2, true).await;
    let report = f.pipeline.process(&f.thread, &batch, None).await.unwrap();
    assert!(report.message_id.is_some());
    assert_eq!(f.chat.send_calls(), 3);
    assert_eq!(f.clock.delays().len(), 2);

    f.clock.clear_delays();
    f.chat.fail_next_sends(3, true).await;
    let err = f.pipeline.process(&f.thread, &batch, None).await.unwrap_err();
    assert!(matches!(err, CourierError::Upload { .. }));
    assert!(err.is_transient());
    assert_eq!(f.chat.send_calls(), 6);
}

#[tokio::test]
async fn permanent_upload_failure_is_not_retried() {
    let f = fixture().await;
    f.files.serve("https://cdn/a", image(PNG, 100)).await;
    let batch = [descriptor("https://cdn/a", "a.png", None)];

    f.chat.fail_next_sends(1, false).await;
    let err = f.pipeline.process(&f.thread, &batch, None).await.unwrap_err();
    assert!(matches!(err, CourierError::Chat { retryable: false, .. }));
    assert_eq!(f.chat.send_calls(), 1);
    assert!(f.clock.delays().is_empty());
}

#[tokio::test]
async fn unknown_thread_fails_without_retry() {
    let f = fixture().await;
    f.files.serve("https://cdn/a", image(PNG, 100)).await;
    let batch = [descriptor("https://cdn/a", "a.png", None)];
    let ghost = ThreadHandle {
        id: "gone".into(),
        name: None,
        kind: ChannelKind::PublicThread,
    };
    assert!(f.pipeline.process(&ghost, &batch, None).await.is_err());
    assert_eq!(f.chat.send_calls(), 1);
}

#[tokio::test]
async fn buffers_are_pooled_and_trimmed() {
    let f = fixture_with(limits(), BufferPool::new(4, 10_000)).await;
    f.files.serve("https://cdn/small", image(PNG, 1_000)).await;
    f.files.serve("https://cdn/large", image(PNG, 15_000)).await;

    f.pipeline
        .process(&f.thread, &[descriptor("https://cdn/small", "s.png", None)], None)
        .await
        .unwrap();
    assert_eq!(f.pool.retained_buffers(), 1);

    f.pipeline
        .process(&f.thread, &[descriptor("https://cdn/large", "l.png", None)], None)
        .await
        .unwrap();
    // The large buffer pushed retained capacity over the threshold.
    assert_eq!(f.pool.retained_buffers(), 0);
    assert_eq!(f.pool.retained_bytes(), 0);
}
