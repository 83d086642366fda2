//! Reacts to fatal append-log faults.
//!
//! The writer thread never exits the process itself. It reports a
//! [`StorageFault`](eventlog_ingest::StorageFault) and stops accepting
//! records; the supervisor then either restarts it (within the configured
//! budget) or asks the server to shut down.

use std::sync::Arc;
use std::time::Duration;

use eventlog_ingest::AppendLog;
use tokio::sync::watch;
use tracing::{error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// What to do when the writer reports a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultPolicy {
    /// Restarts allowed over the process lifetime.
    pub max_restarts: u32,
    /// Delay before each restart.
    pub backoff: Duration,
}

/// Why [`supervise`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// Shutdown was requested elsewhere.
    Shutdown,
    /// The writer could not be kept alive; shutdown was requested.
    StorageFailed,
}

/// Watch `writer` for faults until shutdown.
///
/// Sets `shutdown` to `true` when the restart budget is exhausted.
pub async fn supervise(
    writer: Arc<AppendLog>,
    policy: FaultPolicy,
    shutdown: Arc<watch::Sender<bool>>,
) -> SupervisorExit {
    let faults = writer.faults();
    let mut stop = shutdown.subscribe();
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let mut restarts = 0u32;

    loop {
        if *stop.borrow_and_update() {
            return SupervisorExit::Shutdown;
        }

        tokio::select! {
            _ = stop.changed() => continue,
            _ = ticker.tick() => {}
        }

        let Ok(fault) = faults.try_recv() else {
            continue;
        };
        error!(
            path = ?fault.path,
            discarded = fault.discarded,
            at = %fault.at,
            "append-log writer failed: {}",
            fault.message
        );

        if restarts >= policy.max_restarts {
            error!(restarts, "writer restart budget exhausted, shutting down");
            shutdown.send_replace(true);
            return SupervisorExit::StorageFailed;
        }

        restarts += 1;
        warn!(
            attempt = restarts,
            max = policy.max_restarts,
            "restarting writer in {:?}",
            policy.backoff
        );
        tokio::time::sleep(policy.backoff).await;

        if let Err(e) = writer.restart() {
            error!(error = %e, "could not restart writer, shutting down");
            shutdown.send_replace(true);
            return SupervisorExit::StorageFailed;
        }
        info!("writer restarted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventlog_core::{Clock, EventRegistry, ManualClock};
    use eventlog_ingest::{AppendLogConfig, Ingestor, MemoryCountIndex, WriterHealth};
    use std::path::PathBuf;
    use tempfile::TempDir;

    // Field order matters: the writer must be gone before the temp dir.
    struct Fixture {
        ingestor: Ingestor,
        writer: Arc<AppendLog>,
        blocker: PathBuf,
        _tmp: TempDir,
    }

    /// A writer whose year directory is taken by a regular file, so the
    /// first record faults.
    fn faulty() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("2023");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_secs(1_700_000_000));
        let writer = Arc::new(
            AppendLog::start(
                AppendLogConfig {
                    data_dir: tmp.path().to_path_buf(),
                    ..Default::default()
                },
                clock.clone(),
            )
            .unwrap(),
        );
        let registry = EventRegistry::new(["link_clicked"]).unwrap();
        let ingestor = Ingestor::new(
            registry,
            Arc::clone(&writer),
            Arc::new(MemoryCountIndex::new()),
            clock,
        );
        Fixture {
            ingestor,
            writer,
            blocker,
            _tmp: tmp,
        }
    }

    #[tokio::test]
    async fn test_fault_triggers_shutdown() {
        let fx = faulty();
        let (tx, rx) = watch::channel(false);
        let shutdown = Arc::new(tx);

        fx.ingestor
            .submit("link_clicked", Default::default())
            .unwrap();

        let policy = FaultPolicy {
            max_restarts: 0,
            backoff: Duration::ZERO,
        };
        let exit = tokio::time::timeout(
            Duration::from_secs(5),
            supervise(Arc::clone(&fx.writer), policy, shutdown),
        )
        .await
        .unwrap();

        assert_eq!(exit, SupervisorExit::StorageFailed);
        assert!(*rx.borrow());
        assert_eq!(fx.writer.health(), WriterHealth::Failed);
    }

    #[tokio::test]
    async fn test_fault_restarts_writer() {
        let fx = faulty();
        let (tx, _rx) = watch::channel(false);
        let shutdown = Arc::new(tx);

        let policy = FaultPolicy {
            max_restarts: 1,
            backoff: Duration::from_millis(10),
        };
        let task = tokio::spawn(supervise(
            Arc::clone(&fx.writer),
            policy,
            Arc::clone(&shutdown),
        ));

        fx.ingestor
            .submit("link_clicked", Default::default())
            .unwrap();

        // the writer fails, the blocker goes away, the supervisor brings it back
        tokio::time::timeout(Duration::from_secs(5), async {
            while fx.writer.health() != WriterHealth::Failed {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            std::fs::remove_file(&fx.blocker).unwrap();
            while fx.writer.health() != WriterHealth::Healthy {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        fx.ingestor
            .submit("link_clicked", Default::default())
            .unwrap();

        shutdown.send_replace(true);
        let exit = task.await.unwrap();
        assert_eq!(exit, SupervisorExit::Shutdown);

        let stats = fx.writer.stop().unwrap();
        assert_eq!(stats.records_written, 1);
    }

    #[tokio::test]
    async fn test_external_shutdown() {
        let tmp = TempDir::new().unwrap();
        let writer = Arc::new(
            AppendLog::start(
                AppendLogConfig {
                    data_dir: tmp.path().to_path_buf(),
                    ..Default::default()
                },
                Arc::new(ManualClock::at_secs(0)),
            )
            .unwrap(),
        );
        let (tx, _rx) = watch::channel(false);
        let shutdown = Arc::new(tx);

        let task = tokio::spawn(supervise(
            Arc::clone(&writer),
            FaultPolicy {
                max_restarts: 0,
                backoff: Duration::ZERO,
            },
            Arc::clone(&shutdown),
        ));
        shutdown.send_replace(true);

        let exit = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, SupervisorExit::Shutdown);
        writer.stop().unwrap();
    }
}
