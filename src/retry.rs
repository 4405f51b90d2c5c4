//! Per-artifact retry control
//!
//! Executes one artifact's full attempt pipeline (select mode, send prompt,
//! wait for completion, detect the download, organize the output) with
//! bounded, classified retry. Retryable errors never escape this module;
//! the orchestration loop only ever sees a terminal
//! [`ProcessingResult`](crate::types::ProcessingResult) per artifact.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::organizer::{FileOrganizer, OverwritePolicy};
use crate::session::SessionManager;
use crate::stability::StabilityDetector;
use crate::types::{ArtifactSpec, AttemptOutcome, AttemptRecord, Event, ProcessingResult};
use chrono::Utc;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Subdirectory of the artifact store holding failure diagnostics
const DIAGNOSTICS_DIR: &str = "diagnostics";

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (a generation or download deadline elapsing, a
/// recoverable automation fault) should return `true`. Failures that more
/// attempts cannot fix (login timeout, bad configuration, filesystem
/// problems) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // The platform may simply have been slow or flaky this time
            Error::GenerationTimeout { .. } | Error::DownloadTimeout { .. } => true,
            // The driver reported a fault it considers recoverable
            Error::SessionFault(_) => true,
            // Login never completed; more attempts would wait on the same human
            Error::LoginTimeout { .. } => false,
            // Malformed input and bad configuration abort before retries exist
            Error::Parse(_) | Error::Config { .. } => false,
            // Regenerating the artifact would not fix a filesystem problem;
            // the organize step already gets one retry inside the attempt
            Error::Organize(_) => false,
            Error::Io(_) => false,
            Error::Serialization(_) => false,
            // Shutdown requested
            Error::Cancelled => false,
            Error::Other(_) => false,
        }
    }
}

/// Everything one attempt needs, borrowed from the orchestrator
pub(crate) struct AttemptContext<'a> {
    pub(crate) config: &'a Arc<Config>,
    pub(crate) sessions: &'a mut SessionManager,
    pub(crate) detector: &'a StabilityDetector,
    pub(crate) organizer: &'a FileOrganizer,
    pub(crate) event_tx: &'a broadcast::Sender<Event>,
    pub(crate) cancel: &'a CancellationToken,
}

/// Drive one artifact to a terminal outcome, retrying retryable failures up
/// to the configured attempt budget
///
/// Every attempt, success or failure, is appended to the returned attempt
/// log. A login timeout during session acquisition consumes no attempt slot.
/// On final exhaustion a diagnostic capture is attempted best-effort and the
/// last error's code is preserved in the result.
pub(crate) async fn process_artifact(
    artifact: &ArtifactSpec,
    ctx: &mut AttemptContext<'_>,
) -> (ProcessingResult, Vec<AttemptRecord>) {
    let max_attempts = ctx.config.retry.max_attempts;
    let policy = if ctx.config.generation.skip_existing {
        OverwritePolicy::SkipExisting
    } else {
        OverwritePolicy::ForceRegenerate
    };

    let mut records: Vec<AttemptRecord> = Vec::new();

    for attempt in 1..=max_attempts {
        let started_at = Utc::now();
        ctx.event_tx
            .send(Event::AttemptStarted {
                artifact: artifact.name.clone(),
                attempt,
            })
            .ok();
        info!(
            artifact = %artifact.name,
            provider = %artifact.provider,
            attempt,
            max_attempts,
            "starting generation attempt"
        );

        match run_attempt(artifact, policy, ctx).await {
            Ok(path) => {
                records.push(AttemptRecord {
                    artifact: artifact.name.clone(),
                    attempt_number: attempt,
                    started_at,
                    outcome: AttemptOutcome::Success,
                    diagnostic_path: None,
                });
                ctx.sessions.release(artifact.provider, true);
                return (ProcessingResult::Success { path }, records);
            }
            Err(Error::LoginTimeout { provider }) => {
                // Acquisition failed; no generation work happened, so no
                // attempt slot is consumed.
                warn!(
                    artifact = %artifact.name,
                    %provider,
                    "provider unavailable for this run"
                );
                return (
                    ProcessingResult::Failed {
                        error: Error::LoginTimeout { provider }.code().to_string(),
                        attempts: records.len() as u32,
                    },
                    records,
                );
            }
            Err(e) => {
                let code = e.code().to_string();
                let retryable = e.is_retryable();
                let terminal = !retryable || attempt == max_attempts;

                ctx.event_tx
                    .send(Event::AttemptFailed {
                        artifact: artifact.name.clone(),
                        attempt,
                        error: code.clone(),
                    })
                    .ok();
                warn!(
                    artifact = %artifact.name,
                    attempt,
                    error = %e,
                    retryable,
                    "generation attempt failed"
                );

                let mut record = AttemptRecord {
                    artifact: artifact.name.clone(),
                    attempt_number: attempt,
                    started_at,
                    outcome: if retryable {
                        AttemptOutcome::RetryableFailure { error: code.clone() }
                    } else {
                        AttemptOutcome::FatalFailure { error: code.clone() }
                    },
                    diagnostic_path: None,
                };
                if terminal {
                    record.diagnostic_path = capture_diagnostic(artifact, attempt, ctx).await;
                }
                records.push(record);

                // Leave the session in a known state before the next attempt:
                // a reported fault gets probed on the next acquire, timeouts
                // hand the session back as-is.
                let usable = !matches!(e, Error::SessionFault(_));
                ctx.sessions.release(artifact.provider, usable);

                if terminal {
                    return (
                        ProcessingResult::Failed {
                            error: code,
                            attempts: records.len() as u32,
                        },
                        records,
                    );
                }

                let delay = retry_delay(ctx.config);
                info!(
                    artifact = %artifact.name,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after delay"
                );
                tokio::select! {
                    _ = ctx.cancel.cancelled() => {
                        return (
                            ProcessingResult::Failed {
                                error: Error::Cancelled.code().to_string(),
                                attempts: records.len() as u32,
                            },
                            records,
                        );
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    // max_attempts >= 1 is enforced by Config::validate, so the loop always
    // returns; this satisfies the compiler for the zero case.
    (
        ProcessingResult::Failed {
            error: "internal_error".to_string(),
            attempts: records.len() as u32,
        },
        records,
    )
}

/// One pass through the attempt pipeline
async fn run_attempt(
    artifact: &ArtifactSpec,
    policy: OverwritePolicy,
    ctx: &mut AttemptContext<'_>,
) -> Result<PathBuf> {
    let session = ctx.sessions.acquire(artifact.provider, ctx.cancel).await?;

    // Stale downloads from a previous attempt must not be mistaken for the
    // new output
    if let Err(e) = ctx.organizer.clear_download_dir().await {
        warn!(error = %e, "failed to clear download directory");
    }

    let run_started_at = SystemTime::now();
    let driver = session.driver_mut();

    driver.select_mode(artifact.kind).await?;
    driver.send_prompt(&artifact.prompt).await?;

    let generation_timeout = ctx.config.generation.generation_timeout;
    match driver.wait_for_completion(generation_timeout).await? {
        crate::driver::CompletionSignal::Completed => {}
        crate::driver::CompletionSignal::TimedOut => {
            return Err(Error::GenerationTimeout {
                timeout: generation_timeout,
            });
        }
    }

    driver.trigger_download().await?;

    let download = ctx.detector.wait_for_stable(run_started_at).await?;
    ctx.event_tx
        .send(Event::DownloadDetected {
            artifact: artifact.name.clone(),
            path: download.clone(),
        })
        .ok();

    // One organize retry: a filesystem hiccup does not warrant regenerating
    // the artifact
    match ctx.organizer.organize(&download, artifact, policy).await {
        Ok(path) => Ok(path),
        Err(first) => {
            warn!(
                artifact = %artifact.name,
                error = %first,
                "organize failed, retrying once"
            );
            ctx.organizer.organize(&download, artifact, policy).await
        }
    }
}

/// Best-effort diagnostic capture while the attempt still holds the session
///
/// Its own failure is logged and never masks the original error.
async fn capture_diagnostic(
    artifact: &ArtifactSpec,
    attempt: u32,
    ctx: &mut AttemptContext<'_>,
) -> Option<PathBuf> {
    let session = ctx.sessions.session_mut(artifact.provider)?;

    let dir = ctx.organizer.artifacts_dir().join(DIAGNOSTICS_DIR);
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        warn!(error = %e, "failed to create diagnostics directory");
        return None;
    }

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let dest = dir.join(format!(
        "{}_attempt{}_{}.png",
        artifact.output_name, attempt, timestamp
    ));

    match session.driver_mut().capture_diagnostic(&dest).await {
        Ok(()) => {
            info!(path = %dest.display(), "captured failure diagnostic");
            Some(dest)
        }
        Err(e) => {
            warn!(error = %e, "diagnostic capture failed");
            None
        }
    }
}

/// The configured inter-attempt delay, optionally jittered
fn retry_delay(config: &Config) -> Duration {
    let delay = config.retry.delay;
    if config.retry.jitter {
        add_jitter(delay)
    } else {
        delay
    }
}

/// Add random jitter to a delay
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// actual delay is between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
