//! Job queue integration tests: deduplication under concurrency, crash
//! recovery, and the worker pool draining the queue.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{FakeEncoder, TestHarness};
use tokio_util::sync::CancellationToken;
use vodforge::transcode::WorkerPool;
use vodforge_core::{Error, JobState, RenditionState, Resolution, VideoId, VideoStatus};
use vodforge_db::queries::transcode_jobs::{self, RecoveryOutcome};
use vodforge_db::queries::{renditions, videos};

// ---------------------------------------------------------------------------
// Enqueue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_enqueue_creates_exactly_one_job() {
    let harness = TestHarness::new();
    let video = harness.create_video("race");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let queue = Arc::clone(&harness.queue);
        handles.push(tokio::task::spawn_blocking(move || queue.enqueue(video.id)));
    }

    let mut created = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(Error::DuplicateActiveJob { video_id }) => {
                assert_eq!(video_id, video.id);
                duplicates += 1;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(duplicates, 7);
    assert_eq!(
        harness.queue.list_jobs(Some(JobState::Queued), 0, 100).unwrap().len(),
        1
    );
}

#[tokio::test]
async fn enqueue_is_allowed_again_after_a_terminal_state() {
    let harness = TestHarness::new();
    let video = harness.create_video("twice");

    harness.queue.enqueue(video.id).unwrap();
    let job = transcode_jobs::dequeue_next(&harness.conn(), "w").unwrap().unwrap();
    assert_matches!(
        harness.queue.enqueue(video.id),
        Err(Error::DuplicateActiveJob { .. })
    );

    transcode_jobs::finish_job(&harness.conn(), job.id, JobState::Succeeded, None).unwrap();
    let second = harness.queue.enqueue(video.id).unwrap();
    assert_ne!(second.id, job.id);
    assert_eq!(second.resolutions, harness.config.transcode.resolutions);
}

#[tokio::test]
async fn enqueue_unknown_video_is_not_found() {
    let harness = TestHarness::new();
    assert_matches!(
        harness.queue.enqueue(VideoId::from(4242)),
        Err(Error::NotFound { .. })
    );
}

// ---------------------------------------------------------------------------
// Crash recovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn crashed_job_is_requeued_once_then_abandoned() {
    let harness = TestHarness::new();
    let video = harness.create_video("crashy");
    let job = harness.queue.enqueue(video.id).unwrap();
    assert_eq!(job.max_requeues, 1);

    // First crash: claimed, one rendition mid-encode.
    let claimed = transcode_jobs::dequeue_next(&harness.conn(), "w").unwrap().unwrap();
    renditions::reset_for_job(&harness.conn(), claimed.id, video.id, Resolution::P480, "m", "d")
        .unwrap();
    renditions::mark_encoding(&harness.conn(), claimed.id, video.id, Resolution::P480).unwrap();

    let recovered = harness.queue.recover_orphans().unwrap();
    assert_eq!(recovered.len(), 1);
    assert_eq!(
        recovered[0].outcome,
        RecoveryOutcome::Requeued { requeue_count: 1 }
    );
    let requeued = harness.queue.get_job(job.id).unwrap();
    assert_eq!(requeued.state, JobState::Queued);
    assert_eq!(requeued.requeue_count, 1);
    let rendition = renditions::get_rendition(&harness.conn(), video.id, Resolution::P480)
        .unwrap()
        .unwrap();
    assert_eq!(rendition.state, RenditionState::Pending);

    // Second crash: budget exhausted.
    transcode_jobs::dequeue_next(&harness.conn(), "w").unwrap().unwrap();
    let recovered = harness.queue.recover_orphans().unwrap();
    assert_eq!(recovered[0].outcome, RecoveryOutcome::Abandoned);

    let abandoned = harness.queue.get_job(job.id).unwrap();
    assert_eq!(abandoned.state, JobState::Failed);
    assert!(abandoned.error.is_some());
    let video = videos::get_video(&harness.conn(), video.id).unwrap().unwrap();
    assert_eq!(video.status, VideoStatus::Failed);
}

#[tokio::test]
async fn requeued_job_runs_to_completion() {
    let harness = TestHarness::new();
    let video = harness.create_video("second-chance");
    let job = harness.queue.enqueue(video.id).unwrap();

    // Crash mid-encode, leaving partial output in staging.
    let claimed = transcode_jobs::dequeue_next(&harness.conn(), "w").unwrap().unwrap();
    renditions::reset_for_job(&harness.conn(), claimed.id, video.id, Resolution::P720, "m", "d")
        .unwrap();
    renditions::mark_encoding(&harness.conn(), claimed.id, video.id, Resolution::P720).unwrap();
    let staging = harness.layout.staging_path(video.id, Resolution::P720);
    std::fs::create_dir_all(&staging).unwrap();
    std::fs::write(staging.join("000.ts"), b"torn").unwrap();

    let recovered = harness.queue.recover_orphans().unwrap();
    assert_eq!(
        recovered[0].outcome,
        RecoveryOutcome::Requeued { requeue_count: 1 }
    );

    let retry = transcode_jobs::dequeue_next(&harness.conn(), "w").unwrap().unwrap();
    assert_eq!(retry.id, job.id);
    let state = harness
        .runner(Arc::new(FakeEncoder::new()))
        .run(retry)
        .await
        .unwrap();
    assert_eq!(state, JobState::Succeeded);

    let finished = harness.queue.get_job(job.id).unwrap();
    assert_eq!(finished.state, JobState::Succeeded);
    assert_eq!(finished.requeue_count, 1);
    let video = videos::get_video(&harness.conn(), video.id).unwrap().unwrap();
    assert_eq!(video.status, VideoStatus::Ready);
    for r in Resolution::ALL {
        let rendition = renditions::get_rendition(&harness.conn(), video.id, r)
            .unwrap()
            .unwrap();
        assert_eq!(rendition.state, RenditionState::Ready);
        assert!(!harness.layout.staging_path(video.id, r).exists());
    }
    let first = std::fs::read(harness.layout.base_path(video.id, Resolution::P720).join("000.ts"))
        .unwrap();
    assert_eq!(first.len(), 188);

    // A finished job is not touched by a later recovery pass.
    assert!(harness.queue.recover_orphans().unwrap().is_empty());
}

#[tokio::test]
async fn recovery_leaves_queued_and_finished_jobs_alone() {
    let harness = TestHarness::new();
    let queued = harness.create_video("waiting");
    harness.queue.enqueue(queued.id).unwrap();

    assert!(harness.queue.recover_orphans().unwrap().is_empty());
    let job = harness.queue.active_job_for(queued.id).unwrap().unwrap();
    assert_eq!(job.state, JobState::Queued);
    assert_eq!(job.requeue_count, 0);
}

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

async fn wait_until_idle(harness: &TestHarness) {
    for _ in 0..100 {
        let active = harness.queue.list_jobs(Some(JobState::Queued), 0, 100).unwrap().len()
            + harness.queue.list_jobs(Some(JobState::Running), 0, 100).unwrap().len();
        if active == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("jobs did not finish in time");
}

#[tokio::test]
async fn worker_pool_drains_the_queue() {
    let harness = TestHarness::new();
    let first = harness.create_video("first");
    let second = harness.create_video("second");

    let runner = Arc::new(harness.runner(Arc::new(
        FakeEncoder::new().failing(Resolution::P1080),
    )));
    let pool = WorkerPool::new(
        harness.db.clone(),
        runner,
        Arc::clone(&harness.events),
        harness.queue.notifier(),
        2,
        Duration::from_millis(50),
    );
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(pool.run(cancel.clone()));

    harness.queue.enqueue(first.id).unwrap();
    harness.queue.enqueue(second.id).unwrap();
    wait_until_idle(&harness).await;

    for video_id in [first.id, second.id] {
        let video = videos::get_video(&harness.conn(), video_id).unwrap().unwrap();
        assert_eq!(video.status, VideoStatus::Degraded);
    }
    let finished = harness
        .queue
        .list_jobs(Some(JobState::PartiallySucceeded), 0, 100)
        .unwrap();
    assert_eq!(finished.len(), 2);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("pool did not stop")
        .unwrap();
}

#[tokio::test]
async fn cancelled_pool_leaves_inflight_job_for_recovery() {
    let harness = TestHarness::new();
    let video = harness.create_video("interrupted");

    let runner = Arc::new(harness.runner(Arc::new(
        FakeEncoder::new().with_delay(Duration::from_secs(30)),
    )));
    let pool = WorkerPool::new(
        harness.db.clone(),
        runner,
        Arc::clone(&harness.events),
        harness.queue.notifier(),
        1,
        Duration::from_millis(50),
    );
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(pool.run(cancel.clone()));

    let job = harness.queue.enqueue(video.id).unwrap();
    for _ in 0..100 {
        if harness.queue.get_job(job.id).unwrap().state == JobState::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("pool did not stop")
        .unwrap();

    assert_eq!(harness.queue.get_job(job.id).unwrap().state, JobState::Running);
    let recovered = harness.queue.recover_orphans().unwrap();
    assert_eq!(
        recovered[0].outcome,
        RecoveryOutcome::Requeued { requeue_count: 1 }
    );
}
