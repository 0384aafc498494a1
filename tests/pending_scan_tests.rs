//! Pending-record scans over a real SQLite store

mod common;

use bgblast::{ImageFile, ImageRecord, PendingWorker, RecordStore};
use common::{decode_rgba, memory_store, pipeline, png_file, FixedMatteBackend};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn test_pass_processes_most_recent_first() {
    let store = memory_store();
    let first = store.insert(png_file("1.png", 4, 4, [1, 1, 1, 255])).unwrap();
    let second = store.insert(png_file("2.png", 4, 4, [2, 2, 2, 255])).unwrap();
    let third = store.insert(png_file("3.png", 4, 4, [3, 3, 3, 255])).unwrap();

    let worker = PendingWorker::new(Arc::new(pipeline(FixedMatteBackend::new(1.0))), store.clone());
    let report = worker.process_pending().await.unwrap();

    assert_eq!(report.attempted, 3);
    assert_eq!(report.succeeded, vec![third, second, first]);
    assert!(report.is_clean());
    assert!(store.pending_most_recent_first().unwrap().is_empty());
}

#[tokio::test]
async fn test_uniform_scenario_through_the_store() {
    let store = memory_store();
    let id = store
        .insert(png_file("portrait.png", 100, 100, [10, 20, 30, 255]))
        .unwrap();

    let worker = PendingWorker::new(
        Arc::new(pipeline(FixedMatteBackend::new(128.0 / 255.0))),
        store.clone(),
    );
    worker.process_pending().await.unwrap();

    let record = store.get(id).unwrap().unwrap();
    assert!(!record.is_pending());
    assert!(record.processed_at.is_some());
    let processed = record.processed.unwrap();
    assert_eq!(processed.name, "portrait-bg-blasted.png");

    let output = decode_rgba(&processed);
    assert_eq!(output.dimensions(), (100, 100));
    assert!(output.pixels().all(|p| p.0 == [10, 20, 30, 128]));
}

#[tokio::test]
async fn test_second_pass_does_not_reprocess() {
    let store = memory_store();
    store.insert(png_file("a.png", 4, 4, [0, 0, 0, 255])).unwrap();
    store.insert(png_file("b.png", 4, 4, [0, 0, 0, 255])).unwrap();

    let backend = FixedMatteBackend::new(1.0);
    let calls = backend.call_counter();
    let worker = PendingWorker::new(Arc::new(pipeline(backend)), store.clone());

    worker.process_pending().await.unwrap();
    let before = store.list_most_recent_first().unwrap();

    let report = worker.process_pending().await.unwrap();
    assert_eq!(report.attempted, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.list_most_recent_first().unwrap(), before);
}

#[tokio::test]
async fn test_failed_record_stays_pending_and_is_retried() {
    let store = memory_store();
    let id = store.insert(png_file("flaky.png", 6, 6, [5, 5, 5, 255])).unwrap();

    let backend = FixedMatteBackend::new(1.0);
    let switch = backend.failure_switch();
    let worker = PendingWorker::new(Arc::new(pipeline(backend)), store.clone());

    switch.store(true, Ordering::SeqCst);
    let report = worker.process_pending().await.unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, id);
    assert!(store.get(id).unwrap().unwrap().is_pending());

    switch.store(false, Ordering::SeqCst);
    let report = worker.process_pending().await.unwrap();
    assert_eq!(report.succeeded, vec![id]);
    assert!(!store.get(id).unwrap().unwrap().is_pending());
}

#[tokio::test]
async fn test_undecodable_record_does_not_block_others() {
    let store = memory_store();
    let good_old = store.insert(png_file("old.png", 3, 3, [1, 2, 3, 255])).unwrap();
    let broken = store
        .insert(ImageFile::new("broken.png", "image/png", vec![0xde, 0xad, 0xbe, 0xef]))
        .unwrap();
    let good_new = store.insert(png_file("new.png", 3, 3, [4, 5, 6, 255])).unwrap();

    let worker = PendingWorker::new(Arc::new(pipeline(FixedMatteBackend::new(1.0))), store.clone());
    let report = worker.process_pending().await.unwrap();

    assert_eq!(report.succeeded, vec![good_new, good_old]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, broken);

    let pending: Vec<_> = store
        .pending_most_recent_first()
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(pending, vec![broken]);
}

#[tokio::test]
async fn test_subscribers_see_processing_results() {
    let store = memory_store();
    let id = store.insert(png_file("a.png", 2, 2, [0, 0, 0, 255])).unwrap();

    let seen: Arc<Mutex<Vec<usize>>> = Arc::default();
    let sink = Arc::clone(&seen);
    store.subscribe(Box::new(move |records: &[ImageRecord]| {
        let pending = records.iter().filter(|r| r.is_pending()).count();
        sink.lock().unwrap().push(pending);
    }));

    let worker = PendingWorker::new(Arc::new(pipeline(FixedMatteBackend::new(1.0))), store.clone());
    worker.process_pending().await.unwrap();

    assert!(!store.get(id).unwrap().unwrap().is_pending());
    assert_eq!(*seen.lock().unwrap(), vec![0]);
}
