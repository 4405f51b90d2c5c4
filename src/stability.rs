//! Download stability detection
//!
//! After a generation signals completion and the download is triggered, the
//! detector decides which file in the watched directory is the resulting
//! artifact and whether it is fully written.
//!
//! The core correctness rule: a candidate is **stable** only once its size is
//! identical across two consecutive polls spaced at least one poll interval
//! apart. A single size reading cannot distinguish "finished" from "still
//! writing", so the detector never declares completion from one observation.

use crate::config::DetectorConfig;
use crate::error::{Error, Result};
use regex::RegexSet;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, trace, warn};

/// Size history for one download candidate, kept for a single attempt
#[derive(Debug, Clone)]
struct DownloadObservation {
    size_bytes: u64,
    first_seen_at: Instant,
    last_size_change_at: Instant,
}

/// Polls the download directory and reports the first stable new file
///
/// One detector is built per run and reused across attempts; all per-attempt
/// state lives inside [`StabilityDetector::wait_for_stable`].
pub struct StabilityDetector {
    download_dir: PathBuf,
    poll_interval: Duration,
    download_timeout: Duration,
    transient: RegexSet,
}

impl StabilityDetector {
    /// Create a detector for `download_dir` with the configured polling
    /// interval, deadline, and transient-name patterns
    ///
    /// # Errors
    /// Returns a configuration error if a transient-name pattern does not
    /// compile.
    pub fn new(download_dir: impl Into<PathBuf>, config: &DetectorConfig) -> Result<Self> {
        Ok(Self {
            download_dir: download_dir.into(),
            poll_interval: config.poll_interval,
            download_timeout: config.download_timeout,
            transient: config.compile_transient_patterns()?,
        })
    }

    /// Whether a filename looks like an in-progress or temporary download
    fn is_transient(&self, name: &str) -> bool {
        self.transient.is_match(name)
    }

    /// Wait for a stable download produced at or after `run_started_at`
    ///
    /// Polls the download directory at the configured interval. Candidates
    /// are regular files whose modification time is at or after
    /// `run_started_at` and whose name matches no transient pattern. The
    /// first candidate whose nonzero size is unchanged across two
    /// consecutive polls is returned; ties are broken by earliest first
    /// sighting.
    ///
    /// # Errors
    /// Returns [`Error::DownloadTimeout`] if no stable candidate appears
    /// before the configured deadline.
    pub async fn wait_for_stable(&self, run_started_at: SystemTime) -> Result<PathBuf> {
        let started = Instant::now();
        let mut observations: HashMap<PathBuf, DownloadObservation> = HashMap::new();

        debug!(
            dir = %self.download_dir.display(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            timeout_ms = self.download_timeout.as_millis() as u64,
            "watching for a stable download"
        );

        loop {
            if started.elapsed() >= self.download_timeout {
                return Err(Error::DownloadTimeout {
                    timeout: self.download_timeout,
                });
            }

            tokio::time::sleep(self.poll_interval).await;

            let now = Instant::now();
            let mut seen: Vec<PathBuf> = Vec::new();
            let mut stable: Vec<(PathBuf, Instant)> = Vec::new();

            match self.scan(run_started_at).await {
                Ok(candidates) => {
                    for (path, size) in candidates {
                        seen.push(path.clone());
                        match observations.get_mut(&path) {
                            Some(obs) => {
                                if obs.size_bytes == size {
                                    // Unchanged since the previous poll
                                    if size > 0 {
                                        stable.push((path, obs.first_seen_at));
                                    }
                                } else {
                                    trace!(
                                        path = %path.display(),
                                        previous = obs.size_bytes,
                                        current = size,
                                        "candidate still growing"
                                    );
                                    obs.size_bytes = size;
                                    obs.last_size_change_at = now;
                                }
                            }
                            None => {
                                observations.insert(
                                    path,
                                    DownloadObservation {
                                        size_bytes: size,
                                        first_seen_at: now,
                                        last_size_change_at: now,
                                    },
                                );
                            }
                        }
                    }
                }
                Err(e) => {
                    // A transient scan failure only costs one poll; the
                    // deadline still bounds the wait.
                    warn!(error = %e, "failed to scan download directory");
                    continue;
                }
            }

            // Forget files that vanished between polls
            observations.retain(|path, _| seen.contains(path));

            if let Some((path, _)) = stable.into_iter().min_by_key(|(_, first_seen)| *first_seen) {
                if let Some(obs) = observations.get(&path) {
                    debug!(
                        path = %path.display(),
                        size_bytes = obs.size_bytes,
                        quiet_ms = now.duration_since(obs.last_size_change_at).as_millis() as u64,
                        "download is stable"
                    );
                }
                return Ok(path);
            }
        }
    }

    /// One pass over the download directory, returning candidate files and
    /// their current sizes
    async fn scan(&self, run_started_at: SystemTime) -> Result<Vec<(PathBuf, u64)>> {
        let mut candidates = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.download_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if self.is_transient(&name) {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    // The file may have been renamed away mid-scan
                    trace!(path = %path.display(), error = %e, "failed to stat candidate");
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }
            if let Ok(modified) = metadata.modified()
                && modified < run_started_at
            {
                continue;
            }

            candidates.push((path, metadata.len()));
        }

        Ok(candidates)
    }
}
