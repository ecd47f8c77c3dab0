use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use spec_writer_core::{
    process_scan, RegistryError, Registry, ScanOutcome, ScanReport, ScanTimestamp, WriterConfig,
};
use tracing::{debug, info, warn};

/// Reports kept for `status_snapshot`.
const RECENT_REPORTS: usize = 64;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceStatus {
    pub running: bool,
    pub scans_seen: u64,
    pub scans_written: u64,
    pub scans_skipped: u64,
    pub scans_abandoned: u64,
    pub last_report: Option<ScanReport>,
    pub recent_reports: Vec<ScanReport>,
}

#[derive(Debug, Default)]
struct ServiceStats {
    scans_seen: u64,
    scans_written: u64,
    scans_skipped: u64,
    scans_abandoned: u64,
    reports: VecDeque<ScanReport>,
}

impl ServiceStats {
    fn record(&mut self, report: ScanReport) {
        match report.outcome {
            ScanOutcome::Written => self.scans_written += 1,
            ScanOutcome::Skipped => self.scans_skipped += 1,
            ScanOutcome::Abandoned { .. } => self.scans_abandoned += 1,
        }
        if self.reports.len() == RECENT_REPORTS {
            self.reports.pop_front();
        }
        self.reports.push_back(report);
    }
}

/// Waits for scans announced by the registry and writes them one at a time.
pub struct SpecWriterService {
    registry: Arc<dyn Registry>,
    config: WriterConfig,
    running: Arc<AtomicBool>,
    stats: Mutex<ServiceStats>,
}

impl SpecWriterService {
    pub fn new(registry: Arc<dyn Registry>, config: WriterConfig) -> Self {
        Self {
            registry,
            config,
            running: Arc::new(AtomicBool::new(false)),
            stats: Mutex::new(ServiceStats::default()),
        }
    }

    /// Blocking discovery loop, run by `ServiceHandle` on its own thread.
    /// Returns once `stop` has been called; a scan being written is always
    /// finished first.
    fn serve(&self) -> Result<()> {
        info!("spec writer running");

        let timeout = self.config.next_scan_timeout();
        let mut since: Option<ScanTimestamp> = None;
        while self.running.load(Ordering::SeqCst) {
            debug!("waiting for scan");
            match self.registry.next_scan(since, timeout) {
                Ok((stamp, key)) => {
                    since = Some(stamp);
                    if let Err(err) = self.handle_scan(&key) {
                        warn!("failed to record scan {}: {}", key, err);
                    }
                }
                Err(RegistryError::TimedOut(_)) => continue,
                Err(err) => {
                    warn!("scan registry failed: {}", err);
                    thread::sleep(self.config.poll_interval());
                }
            }
        }

        info!("spec writer stopped");
        Ok(())
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> String {
        if self.is_running() {
            "SpecWriter is RUNNING".to_string()
        } else {
            "SpecWriter is STOPPED".to_string()
        }
    }

    pub fn status_snapshot(&self) -> Result<ServiceStatus> {
        let stats = self.lock_stats()?;
        Ok(ServiceStatus {
            running: self.is_running(),
            scans_seen: stats.scans_seen,
            scans_written: stats.scans_written,
            scans_skipped: stats.scans_skipped,
            scans_abandoned: stats.scans_abandoned,
            last_report: stats.reports.back().cloned(),
            recent_reports: stats.reports.iter().cloned().collect(),
        })
    }

    fn handle_scan(&self, key: &str) -> Result<()> {
        self.lock_stats()?.scans_seen += 1;
        let report = match self.registry.load_scan(key) {
            Ok(mut scan) => process_scan(scan.as_mut(), &self.config),
            Err(err) => {
                warn!("failed to load scan {}: {}", key, err);
                ScanReport {
                    key: key.to_string(),
                    outcome: ScanOutcome::Abandoned {
                        reason: err.to_string(),
                    },
                    output_path: None,
                    rows_written: 0,
                    drains: 0,
                    dropped_points: 0,
                    elapsed_ms: 0,
                }
            }
        };
        info!(
            "scan {} done: {:?}, {} rows",
            report.key, report.outcome, report.rows_written
        );
        self.lock_stats()?.record(report);
        Ok(())
    }

    fn lock_stats(&self) -> Result<MutexGuard<'_, ServiceStats>> {
        self.stats
            .lock()
            .map_err(|_| anyhow!("service stats lock poisoned"))
    }
}

/// The service running on its own thread: the start/stop/status surface.
pub struct ServiceHandle {
    service: Arc<SpecWriterService>,
    worker: Option<JoinHandle<Result<()>>>,
}

impl ServiceHandle {
    pub fn start(service: Arc<SpecWriterService>) -> Result<Self> {
        if service.is_running() {
            return Err(anyhow!("spec writer is already running"));
        }
        // Flag is raised before spawning so `status` is accurate immediately.
        service.running.store(true, Ordering::SeqCst);
        let worker_service = Arc::clone(&service);
        let worker = thread::Builder::new()
            .name("spec-writer".to_string())
            .spawn(move || worker_service.serve())
            .context("failed to spawn spec writer thread")?;
        Ok(Self {
            service,
            worker: Some(worker),
        })
    }

    pub fn service(&self) -> &Arc<SpecWriterService> {
        &self.service
    }

    pub fn status(&self) -> String {
        self.service.status()
    }

    pub fn status_snapshot(&self) -> Result<ServiceStatus> {
        self.service.status_snapshot()
    }

    /// Asks the loop to stop and waits for the current scan to finish.
    pub fn stop(mut self) -> Result<ServiceStatus> {
        self.shutdown()?;
        self.service.status_snapshot()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.service.stop();
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| anyhow!("spec writer thread panicked"))?,
            None => Ok(()),
        }
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!("spec writer shutdown failed: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use spec_writer_core::{MemoryStore, ScanInfo, ScanOutcome, WriterConfig};

    use super::{ServiceHandle, SpecWriterService};

    fn config() -> WriterConfig {
        WriterConfig {
            next_scan_timeout_secs: 1,
            max_write_interval_ms: 0,
            poll_interval_ms: 1,
            refresh_timeout_ms: 20,
            ..WriterConfig::default()
        }
    }

    #[test]
    fn status_follows_start_and_stop() {
        let store = MemoryStore::new(Duration::from_millis(20));
        let service = Arc::new(SpecWriterService::new(Arc::new(store), config()));
        assert_eq!(service.status(), "SpecWriter is STOPPED");

        let handle = ServiceHandle::start(Arc::clone(&service)).expect("service starts");
        assert_eq!(handle.status(), "SpecWriter is RUNNING");
        assert!(ServiceHandle::start(Arc::clone(&service)).is_err());

        let status = handle.stop().expect("service stops");
        assert!(!status.running);
        assert_eq!(service.status(), "SpecWriter is STOPPED");
    }

    #[test]
    fn bookkeeping_failure_does_not_end_the_loop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = MemoryStore::new(Duration::from_millis(20));
        let service = Arc::new(SpecWriterService::new(Arc::new(store.clone()), config()));
        let poisoner = Arc::clone(&service);
        let _ = thread::spawn(move || {
            let _stats = poisoner.stats.lock();
            panic!("poison the stats lock");
        })
        .join();

        let mut handle = ServiceHandle::start(Arc::clone(&service)).expect("service starts");
        for scan_nb in 1..=2 {
            let info = ScanInfo {
                title: Some("ct 1".to_string()),
                scan_nb: Some(scan_nb),
                start_time: Some("T0".to_string()),
                filename: Some(dir.path().join("run.h5")),
                ..ScanInfo::default()
            };
            let publisher = store.create_scan(info).expect("scan");
            publisher.prepare().expect("prepare");
            publisher.close().expect("close");
        }
        thread::sleep(Duration::from_millis(200));
        assert!(handle.service().is_running());

        handle.shutdown().expect("loop exits cleanly");
        assert!(service.status_snapshot().is_err());
    }

    #[test]
    fn unwritable_scans_are_counted_as_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = MemoryStore::new(Duration::from_millis(20));
        let service = Arc::new(SpecWriterService::new(Arc::new(store.clone()), config()));
        let handle = ServiceHandle::start(Arc::clone(&service)).expect("service starts");

        let info = ScanInfo {
            title: Some("ct 1".to_string()),
            scan_nb: Some(1),
            start_time: Some("T0".to_string()),
            filename: Some(dir.path().join("run.h5")),
            ..ScanInfo::default()
        };
        let publisher = store.create_scan(info).expect("scan");
        publisher.prepare().expect("prepare");
        publisher.stop().expect("stop");
        publisher.close().expect("close");

        let started = Instant::now();
        while service.status_snapshot().expect("status").scans_skipped == 0 {
            assert!(started.elapsed() < Duration::from_secs(10));
            thread::sleep(Duration::from_millis(5));
        }

        let status = handle.stop().expect("service stops");
        assert_eq!(status.scans_seen, 1);
        let report = status.last_report.expect("report");
        assert_eq!(report.key, publisher.key());
        assert_eq!(report.outcome, ScanOutcome::Skipped);
    }
}
