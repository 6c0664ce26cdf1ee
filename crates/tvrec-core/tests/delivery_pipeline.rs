//! Integration tests for the delivery pipeline: splitting, single-flight,
//! the transfer gate, retries and notifier cadence.

mod common;

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::fakes::{FakeMedia, FakeStore, RecordingSink, BYTES_PER_SEC};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;
use tvrec_core::capture::Artifact;
use tvrec_core::config::DeliveryConfig;
use tvrec_core::delivery::{DeliveryError, DeliveryPipeline};
use tvrec_core::job::ChatId;
use tvrec_core::retry::RetryPolicy;
use tvrec_core::status::StatusHandle;

fn delivery_config(max_unit_bytes: u64) -> DeliveryConfig {
    DeliveryConfig {
        max_unit_bytes,
        safety_margin_bytes: 0,
        chunk_bytes: 10,
        log_interval_ms: 50,
        speed_sample_ms: 10,
        notify_interval_secs: 0.25,
        transfer_timeout_secs: 30,
        store_chat: 0,
    }
}

fn quick_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
    }
}

fn artifact(dir: &Path, name: &str, bytes: u64) -> Artifact {
    let path = dir.join(name);
    std::fs::write(&path, vec![0u8; bytes as usize]).unwrap();
    Artifact::from_path(path, bytes, bytes as f64 / BYTES_PER_SEC as f64)
}

fn pipeline(store: Arc<FakeStore>, cfg: DeliveryConfig, policy: RetryPolicy) -> DeliveryPipeline {
    DeliveryPipeline::new(store, Arc::new(FakeMedia::default()), cfg, policy)
}

fn status(sink: &Arc<RecordingSink>) -> Arc<StatusHandle> {
    Arc::new(StatusHandle::new(sink.clone(), ChatId(7), None))
}

#[tokio::test]
async fn oversized_artifact_is_delivered_in_ordered_parts() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FakeStore::default());
    let pipe = pipeline(store.clone(), delivery_config(200), quick_retry(3));
    let sink = Arc::new(RecordingSink::default());
    let art = artifact(dir.path(), "big.mkv", 250);

    let report = pipe
        .deliver(&art, "Big capture", &status(&sink), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.units.len(), 2);
    let uploads = store.uploads();
    assert_eq!(uploads.len(), 2);
    assert_eq!(uploads[0].caption, "Big capture (Part 1/2)");
    assert_eq!(uploads[1].caption, "Big capture (Part 2/2)");
    assert!(uploads[0].file_name.contains("part000"));
    assert!(uploads[1].file_name.contains("part001"));
    assert!(uploads.iter().all(|u| u.bytes <= 200));
    assert_eq!(uploads.iter().map(|u| u.bytes).sum::<u64>(), 250);

    // Parts are cleaned up; the source stays with the caller.
    assert_eq!(common::files_in(dir.path()), vec!["big.mkv".to_string()]);
    assert!(pipe.in_flight().is_empty());
}

#[tokio::test]
async fn concurrent_delivery_of_same_path_is_rejected() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FakeStore::with_latency(Duration::from_millis(20)));
    let pipe = pipeline(store.clone(), delivery_config(10_000), quick_retry(3));
    let sink = Arc::new(RecordingSink::default());
    let art = artifact(dir.path(), "same.mkv", 100);
    let token = CancellationToken::new();
    let handle = status(&sink);

    let (a, b) = tokio::join!(
        pipe.deliver(&art, "one", &handle, &token),
        pipe.deliver(&art, "two", &handle, &token),
    );
    let results = [a, b];
    let ok = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(DeliveryError::AlreadyInFlight(_))))
        .count();
    assert_eq!((ok, rejected), (1, 1));
    assert_eq!(store.uploads().len(), 1);
    assert!(pipe.in_flight().is_empty());
}

#[tokio::test]
async fn transfers_are_serialized_by_the_gate() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FakeStore::with_latency(Duration::from_millis(10)));
    let pipe = pipeline(store.clone(), delivery_config(10_000), quick_retry(3));
    let sink = Arc::new(RecordingSink::default());
    let one = artifact(dir.path(), "one.mkv", 100);
    let two = artifact(dir.path(), "two.mkv", 100);
    let token = CancellationToken::new();
    let (h1, h2) = (status(&sink), status(&sink));

    let (a, b) = tokio::join!(
        pipe.deliver(&one, "one", &h1, &token),
        pipe.deliver(&two, "two", &h2, &token),
    );
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(store.uploads().len(), 2);
    assert_eq!(store.max_active.load(Ordering::SeqCst), 1);
    // The waiting transfer still narrated while queued.
    assert_eq!(sink.count_containing("UPLOAD QUEUED"), 2);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FakeStore::failing(2));
    let pipe = pipeline(store.clone(), delivery_config(10_000), quick_retry(3));
    let sink = Arc::new(RecordingSink::default());
    let art = artifact(dir.path(), "flaky.mkv", 50);

    let report = pipe
        .deliver(&art, "flaky", &status(&sink), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.units[0].attempts, 3);
    assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(sink.count_containing("Uploaded Successfully"), 1);
}

#[tokio::test]
async fn retries_are_bounded() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FakeStore::failing(10));
    let pipe = pipeline(store.clone(), delivery_config(10_000), quick_retry(3));
    let sink = Arc::new(RecordingSink::default());
    let art = artifact(dir.path(), "dead.mkv", 50);

    let err = pipe
        .deliver(&art, "dead", &status(&sink), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::Transfer { attempts: 3, .. }));
    assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(sink.count_containing("Upload Failed"), 1);
    assert!(pipe.in_flight().is_empty());
}

#[tokio::test]
async fn notifier_cadence_does_not_follow_chunk_count() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FakeStore::with_latency(Duration::from_millis(5)));
    let mut cfg = delivery_config(10_000);
    cfg.chunk_bytes = 1;
    let notify = cfg.notify_interval();
    let pipe = pipeline(store.clone(), cfg, quick_retry(1));
    let sink = Arc::new(RecordingSink::default());
    let art = artifact(dir.path(), "slow.mkv", 200);

    let started = Instant::now();
    pipe.deliver(&art, "slow", &status(&sink), &CancellationToken::new())
        .await
        .unwrap();
    let elapsed = started.elapsed().as_secs_f64();

    let renders = sink.count_containing("**UPLOADING**");
    let bound = (elapsed / notify.as_secs_f64()).floor() as usize + 2;
    assert!(renders >= 1, "no progress render at all");
    assert!(renders <= bound, "{} renders for {:.2}s (bound {})", renders, elapsed, bound);
    assert!(renders < 200);
}

#[tokio::test]
async fn cancellation_releases_the_single_flight_claim() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FakeStore::with_latency(Duration::from_millis(50)));
    let pipe = pipeline(store.clone(), delivery_config(10_000), quick_retry(3));
    let sink = Arc::new(RecordingSink::default());
    let art = artifact(dir.path(), "stop.mkv", 100);
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(120)).await;
        canceller.cancel();
    });
    let err = pipe
        .deliver(&art, "stop", &status(&sink), &token)
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::Cancelled));
    assert!(pipe.in_flight().is_empty());
    assert!(store.uploads().is_empty());
    assert_eq!(store.aborted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn uploads_to_store_chat_are_forwarded_to_requester() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FakeStore::default());
    let mut cfg = delivery_config(10_000);
    cfg.store_chat = -100;
    let pipe = pipeline(store.clone(), cfg, quick_retry(3));
    let sink = Arc::new(RecordingSink::default());
    let art = artifact(dir.path(), "fwd.mkv", 30);

    let report = pipe
        .deliver(&art, "fwd", &status(&sink), &CancellationToken::new())
        .await
        .unwrap();
    let unit = &report.units[0];
    assert_eq!(unit.stored.chat, ChatId(-100));
    assert_eq!(unit.forwarded.as_ref().map(|r| r.chat), Some(ChatId(7)));
    let forwards = store.forwards.lock().unwrap().clone();
    assert_eq!(forwards.len(), 1);
    assert_eq!(forwards[0].1, ChatId(7));
}

#[tokio::test]
async fn missing_artifact_is_reported() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FakeStore::default());
    let pipe = pipeline(store, delivery_config(10_000), quick_retry(3));
    let sink = Arc::new(RecordingSink::default());
    let art = Artifact::from_path(dir.path().join("gone.mkv"), 10, 1.0);

    let err = pipe
        .deliver(&art, "gone", &status(&sink), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::MissingFile { .. }));
    assert!(pipe.in_flight().is_empty());
}

#[tokio::test]
async fn timed_out_attempt_stops_before_its_retry_starts() {
    let dir = tempdir().unwrap();
    // 30 chunks at 100 ms each: every attempt outlives the 1 s transfer timeout.
    let store = Arc::new(FakeStore::with_latency(Duration::from_millis(100)));
    let mut cfg = delivery_config(10_000);
    cfg.transfer_timeout_secs = 1;
    let pipe = pipeline(store.clone(), cfg, quick_retry(2));
    let sink = Arc::new(RecordingSink::default());
    let art = artifact(dir.path(), "stuck.mkv", 300);

    let err = pipe
        .deliver(&art, "stuck", &status(&sink), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::Transfer { attempts: 2, .. }), "got {:?}", err);
    assert_eq!(store.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(store.aborted.load(Ordering::SeqCst), 2);
    assert_eq!(store.max_active.load(Ordering::SeqCst), 1);
    assert!(store.uploads().is_empty());
}

#[tokio::test]
async fn cancelled_transfer_keeps_the_gate_until_the_store_stops() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FakeStore::with_latency(Duration::from_millis(100)));
    let pipe = pipeline(store.clone(), delivery_config(10_000), quick_retry(3));
    let sink = Arc::new(RecordingSink::default());
    let first = artifact(dir.path(), "first.mkv", 100);
    let second = artifact(dir.path(), "second.mkv", 50);
    let (first_token, second_token) = (CancellationToken::new(), CancellationToken::new());
    let (h1, h2) = (status(&sink), status(&sink));

    let canceller = first_token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        canceller.cancel();
    });
    let (a, b) = tokio::join!(pipe.deliver(&first, "first", &h1, &first_token), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        pipe.deliver(&second, "second", &h2, &second_token).await
    });
    assert!(matches!(a, Err(DeliveryError::Cancelled)));
    assert!(b.is_ok());
    assert_eq!(store.aborted.load(Ordering::SeqCst), 1);
    assert_eq!(store.max_active.load(Ordering::SeqCst), 1);
    let uploads = store.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].file_name, "second.mkv");
}

#[tokio::test]
async fn thumbnail_travels_with_the_upload() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FakeStore::default());
    let pipe = pipeline(store.clone(), delivery_config(10_000), quick_retry(3));
    let sink = Arc::new(RecordingSink::default());
    let mut art = artifact(dir.path(), "cover.mkv", 40);
    let thumb = dir.path().join("cover.mkv.jpg");
    std::fs::write(&thumb, b"jpeg").unwrap();
    art.thumbnail = Some(thumb);

    pipe.deliver(&art, "cover", &status(&sink), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(store.uploads()[0].thumbnail.as_deref(), Some(&b"jpeg"[..]));
}
