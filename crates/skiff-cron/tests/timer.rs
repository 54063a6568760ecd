// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The timer notices jobs admitted by another process through the shared
//! store, without being restarted or notified.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use skiff_config::model::{CronConfig, StorageConfig};
use skiff_core::{SkiffError, StorageAdapter};
use skiff_cron::{CronJob, CronPayload, CronSchedule, CronService, JobHandler, JobSpec, RunStatus};
use skiff_storage::SqliteStorage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Forward(mpsc::UnboundedSender<String>);

#[async_trait]
impl JobHandler for Forward {
    async fn on_job(&self, job: &CronJob) -> Result<Option<String>, SkiffError> {
        let _ = self.0.send(job.id.clone());
        Ok(None)
    }
}

struct Setup {
    scheduler: Arc<CronService>,
    external: CronService,
    ran: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
    timer: tokio::task::JoinHandle<()>,
    _dir: tempfile::TempDir,
}

async fn open(path: &str) -> Arc<dyn StorageAdapter> {
    let storage = SqliteStorage::new(StorageConfig {
        database_path: path.to_string(),
        wal_mode: true,
    });
    storage.initialize().await.unwrap();
    Arc::new(storage)
}

async fn setup() -> Setup {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cron.db").display().to_string();
    let config = CronConfig {
        enabled: true,
        poll_when_empty_secs: 1,
    };

    // Two services over two connections: the second stands in for the CLI.
    let scheduler = Arc::new(
        CronService::new(open(&path).await, &config).with_poll_interval(Duration::from_millis(200)),
    );
    let external = CronService::new(open(&path).await, &config);

    let (tx, ran) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let timer = tokio::spawn(
        scheduler
            .clone()
            .start(Arc::new(Forward(tx)), cancel.clone()),
    );
    Setup {
        scheduler,
        external,
        ran,
        cancel,
        timer,
        _dir: dir,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn externally_added_job_runs_on_empty_store() {
    let mut s = setup().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(s.scheduler.status().await.unwrap().running);

    let job = s
        .external
        .add_job(JobSpec::new(
            "tick",
            CronSchedule::Every { every_secs: 1 },
            CronPayload::new("tick"),
        ))
        .await
        .unwrap();

    let ran = tokio::time::timeout(Duration::from_secs(5), s.ran.recv())
        .await
        .expect("job admitted elsewhere must run")
        .unwrap();
    assert_eq!(ran, job.id);

    s.cancel.cancel();
    s.timer.await.unwrap();
    assert!(!s.scheduler.status().await.unwrap().running);

    let after = s.external.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(after.state.last_status, Some(RunStatus::Ok));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn externally_triggered_job_runs_within_poll() {
    let mut s = setup().await;

    let job = s
        .external
        .add_job(JobSpec::new(
            "half-minute",
            CronSchedule::Every { every_secs: 30 },
            CronPayload::new("check"),
        ))
        .await
        .unwrap();
    assert!(s.external.trigger(&job.id).await.unwrap());

    let ran = tokio::time::timeout(Duration::from_secs(2), s.ran.recv())
        .await
        .expect("triggered job must run within the poll interval")
        .unwrap();
    assert_eq!(ran, job.id);

    // Rescheduled thirty seconds out, so nothing else runs meanwhile.
    let extra = tokio::time::timeout(Duration::from_millis(500), s.ran.recv()).await;
    assert!(extra.is_err());

    s.cancel.cancel();
    s.timer.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn job_removed_elsewhere_never_runs() {
    let mut s = setup().await;
    let job = s
        .external
        .add_job(JobSpec::new(
            "gone",
            CronSchedule::Every { every_secs: 1 },
            CronPayload::new("x"),
        ))
        .await
        .unwrap();
    assert!(s.external.remove_job(&job.id).await.unwrap());

    let ran = tokio::time::timeout(Duration::from_millis(1500), s.ran.recv()).await;
    assert!(ran.is_err());

    s.cancel.cancel();
    s.timer.await.unwrap();
}

/// Wall time that moves with tokio's clock, so paused tests can skip ahead.
fn tokio_clock() -> impl Fn() -> DateTime<Utc> + Clone + Send + Sync + 'static {
    let origin = Utc::now();
    let started = tokio::time::Instant::now();
    move || origin + TimeDelta::from_std(started.elapsed()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn every_thirty_seconds_job_admitted_elsewhere_runs_within_poll() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cron.db").display().to_string();
    let config = CronConfig {
        enabled: true,
        poll_when_empty_secs: 5,
    };
    let clock = tokio_clock();
    let scheduler = Arc::new(CronService::new(open(&path).await, &config).with_clock(clock.clone()));
    let external = CronService::new(open(&path).await, &config).with_clock(clock.clone());

    let (tx, mut ran) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let timer = tokio::spawn(
        scheduler
            .clone()
            .start(Arc::new(Forward(tx)), cancel.clone()),
    );

    let job = external
        .add_job(JobSpec::new(
            "half-minute",
            CronSchedule::Every { every_secs: 30 },
            CronPayload::new("check"),
        ))
        .await
        .unwrap();
    let due = job.state.next_run_at.unwrap();

    // Step in small increments; a timeout here would fire during store I/O.
    let limit = due + TimeDelta::seconds(config.poll_when_empty_secs as i64 + 5);
    let id = loop {
        if let Ok(id) = ran.try_recv() {
            break id;
        }
        assert!(clock() < limit, "job did not run within the poll interval");
        tokio::time::sleep(Duration::from_millis(100)).await;
    };
    assert_eq!(id, job.id);

    let after = external.get_job(&job.id).await.unwrap().unwrap();
    let ran_at = after.state.last_run_at.unwrap();
    assert!(ran_at >= due);
    assert!(ran_at - due <= TimeDelta::seconds(config.poll_when_empty_secs as i64));
    assert_eq!(
        after.state.next_run_at,
        Some(after.updated_at + TimeDelta::seconds(30))
    );

    cancel.cancel();
    timer.await.unwrap();
}
