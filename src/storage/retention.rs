//! File retention.
//!
//! # Responsibilities
//! - Periodically walk the raw, preprocessed and output roots
//! - Delete files whose modification time is older than the retention age
//!
//! # Design Decisions
//! - Per-file failures are counted and logged, never fatal
//! - Symlinks are removed as entries, never followed
//! - The walk is blocking filesystem work and runs on `spawn_blocking`

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::broadcast;
use tokio::time;

use crate::config::{RetentionConfig, StorageConfig};
use crate::observability::metrics;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    roots: Vec<PathBuf>,
    max_age: Option<Duration>,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn from_config(storage: &StorageConfig, retention: &RetentionConfig) -> Self {
        let max_age = (retention.hours > 0).then(|| Duration::from_secs(retention.hours * 3600));
        Self {
            roots: vec![
                PathBuf::from(&storage.raw_path),
                PathBuf::from(&storage.preprocessed_path),
                PathBuf::from(&storage.output_path),
            ],
            max_age,
            interval: Duration::from_secs(retention.sweep_interval_secs.max(1)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_age.is_some()
    }

    /// Delete everything last modified before `now - max_age`.
    pub fn sweep_once(&self, now: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();
        let Some(cutoff) = self.max_age.and_then(|age| now.checked_sub(age)) else {
            return report;
        };

        for root in &self.roots {
            if let Err(e) = sweep_dir(root, cutoff, &mut report) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::debug!(root = %root.display(), error = %e, "Retention sweep could not read root");
                    report.failed += 1;
                }
            }
        }
        report
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.is_enabled() {
            tracing::info!("File retention disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            max_age_hours = self.max_age.map(|a| a.as_secs() / 3600).unwrap_or_default(),
            "Retention sweeper starting"
        );

        let mut ticker = time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let sweeper = self.clone();
                    match tokio::task::spawn_blocking(move || sweeper.sweep_once(SystemTime::now())).await {
                        Ok(report) => {
                            metrics::record_retention_sweep(report.removed, report.failed);
                            if report.removed > 0 || report.failed > 0 {
                                tracing::info!(
                                    removed = report.removed,
                                    failed = report.failed,
                                    "Retention sweep finished"
                                );
                            }
                        }
                        Err(e) => tracing::error!(error = %e, "Retention sweep task failed"),
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Retention sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

fn sweep_dir(dir: &Path, cutoff: SystemTime, report: &mut SweepReport) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "Unreadable directory entry");
                report.failed += 1;
                continue;
            }
        };
        let path = entry.path();

        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Could not stat file");
                report.failed += 1;
                continue;
            }
        };

        if metadata.is_dir() {
            if let Err(e) = sweep_dir(&path, cutoff, report) {
                tracing::debug!(path = %path.display(), error = %e, "Could not read directory");
                report.failed += 1;
            }
            continue;
        }

        let expired = metadata.modified().map(|m| m < cutoff).unwrap_or(false);
        if !expired {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => report.removed += 1,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Could not remove expired file");
                report.failed += 1;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn sweeper(root: &Path, hours: u64) -> RetentionSweeper {
        let storage = StorageConfig {
            raw_path: root.join("raw").display().to_string(),
            preprocessed_path: root.join("pre").display().to_string(),
            output_path: root.join("out").display().to_string(),
        };
        RetentionSweeper::from_config(
            &storage,
            &RetentionConfig {
                hours,
                sweep_interval_secs: 3600,
            },
        )
    }

    fn touch(path: &Path, modified: SystemTime) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(modified)
            .unwrap();
    }

    #[test]
    fn test_removes_only_expired_files() {
        let tmp = tempfile::tempdir().unwrap();
        let now = SystemTime::now();

        let old_raw = tmp.path().join("raw/lighton/old.pdf");
        let old_page = tmp.path().join("pre/lighton/old_page_1.png");
        let fresh = tmp.path().join("out/lighton/fresh.md");
        touch(&old_raw, now - 100 * HOUR);
        touch(&old_page, now - 73 * HOUR);
        touch(&fresh, now - HOUR);

        let report = sweeper(tmp.path(), 72).sweep_once(now);

        assert_eq!(report, SweepReport { removed: 2, failed: 0 });
        assert!(!old_raw.exists());
        assert!(!old_page.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn test_missing_roots_are_not_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let report = sweeper(tmp.path(), 72).sweep_once(SystemTime::now());
        assert_eq!(report, SweepReport::default());
    }

    #[test]
    fn test_zero_hours_disables() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("raw/x.png");
        touch(&file, SystemTime::now() - 1000 * HOUR);

        let sweeper = sweeper(tmp.path(), 0);
        assert!(!sweeper.is_enabled());
        assert_eq!(sweeper.sweep_once(SystemTime::now()).removed, 0);
        assert!(file.exists());
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown() {
        let tmp = tempfile::tempdir().unwrap();
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(sweeper(tmp.path(), 72).run(rx));

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper should stop")
            .unwrap();
    }
}
