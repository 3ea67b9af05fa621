//! Bounded pool of transcode workers.
//!
//! Each worker loops: claim the oldest queued job, run it to a terminal
//! state, repeat. Idle workers sleep until an enqueue wakes them or the poll
//! interval elapses. The pool size caps the number of jobs in flight.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use vodforge_core::events::{EventBus, EventPayload};
use vodforge_db::pool::{get_conn, DbPool};
use vodforge_db::queries::transcode_jobs;

use super::job::JobRunner;

pub struct WorkerPool {
    db: DbPool,
    runner: Arc<JobRunner>,
    events: Arc<EventBus>,
    notify: Arc<Notify>,
    size: usize,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn new(
        db: DbPool,
        runner: Arc<JobRunner>,
        events: Arc<EventBus>,
        notify: Arc<Notify>,
        size: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            db,
            runner,
            events,
            notify,
            size: size.max(1),
            poll_interval,
        }
    }

    /// Spawn the workers and wait until all of them exit on `cancel`.
    ///
    /// A job still running at cancellation is dropped (its encoder process
    /// is killed) and stays `running` in the database, where crash recovery
    /// finds it on the next start.
    pub async fn run(self, cancel: CancellationToken) {
        let mut workers = JoinSet::new();
        for n in 0..self.size {
            let worker = Worker {
                name: format!("worker-{n}"),
                db: self.db.clone(),
                runner: Arc::clone(&self.runner),
                events: Arc::clone(&self.events),
                notify: Arc::clone(&self.notify),
                poll_interval: self.poll_interval,
            };
            workers.spawn(worker.run(cancel.clone()));
        }
        tracing::info!(workers = self.size, "Transcode worker pool started");

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Transcode worker panicked");
            }
        }
        tracing::info!("Transcode worker pool stopped");
    }
}

struct Worker {
    name: String,
    db: DbPool,
    runner: Arc<JobRunner>,
    events: Arc<EventBus>,
    notify: Arc<Notify>,
    poll_interval: Duration,
}

impl Worker {
    async fn run(self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let claimed = get_conn(&self.db)
                .and_then(|conn| transcode_jobs::dequeue_next(&conn, &self.name));

            match claimed {
                Ok(Some(job)) => {
                    let job_id = job.id;
                    let video_id = job.video_id;
                    tracing::info!(worker = %self.name, job_id = %job_id, video_id = %video_id, "Processing transcode job");
                    self.events.broadcast(EventPayload::JobStarted {
                        job_id,
                        video_id,
                        worker: self.name.clone(),
                    });

                    tokio::select! {
                        _ = cancel.cancelled() => {
                            tracing::warn!(worker = %self.name, job_id = %job_id, "Shutdown during job; left for recovery");
                            break;
                        }
                        result = self.runner.run(job) => {
                            if let Err(e) = result {
                                tracing::error!(worker = %self.name, job_id = %job_id, video_id = %video_id, error = %e, "Failed to record job outcome");
                            }
                        }
                    }
                }
                Ok(None) => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
                Err(e) => {
                    tracing::error!(worker = %self.name, error = %e, "Failed to poll transcode queue");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
            }
        }
    }
}
