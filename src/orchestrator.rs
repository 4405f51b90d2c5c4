//! Top-level orchestration loop
//!
//! The only component with a global view of a run. Builds the processing
//! queue from the parsed artifact list, lazily acquires provider sessions,
//! delegates each artifact through the retry controller, and produces the
//! final [`RunSummary`].
//!
//! # Example
//!
//! ```no_run
//! use artifact_forge::{
//!     ArtifactKind, ArtifactSpec, Config, DriverFactory, Orchestrator, Provider, QueueFilter,
//! };
//! use std::sync::Arc;
//!
//! # async fn example(factory: Arc<dyn DriverFactory>) -> Result<(), Box<dyn std::error::Error>> {
//! let artifacts = vec![
//!     ArtifactSpec::new("Company Logo", ArtifactKind::Image, Provider::Gemini, "a logo", 0),
//!     ArtifactSpec::new("Release Notes", ArtifactKind::Text, Provider::Claude, "notes", 1),
//! ];
//!
//! let mut orchestrator = Orchestrator::new(Config::default(), factory).await?;
//!
//! // Observe progress
//! let mut events = orchestrator.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         tracing::info!(?event, "run event");
//!     }
//! });
//!
//! let summary = orchestrator.run(artifacts, &QueueFilter::default()).await?;
//! println!("{}", summary.render());
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use crate::driver::DriverFactory;
use crate::error::{Error, Result};
use crate::organizer::FileOrganizer;
use crate::retry::{AttemptContext, process_artifact};
use crate::session::SessionManager;
use crate::stability::StabilityDetector;
use crate::types::{
    ArtifactKind, ArtifactSpec, Event, ProcessingResult, Provider, RunSummary, SkipReason,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Buffer size for the run event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Pure, order-preserving predicates applied before the queue is built
#[derive(Clone, Copy, Debug, Default)]
pub struct QueueFilter {
    /// Only process artifacts for this provider
    pub provider: Option<Provider>,
    /// Only process artifacts of this kind
    pub kind: Option<ArtifactKind>,
}

impl QueueFilter {
    /// Whether an artifact passes both predicates
    pub fn matches(&self, artifact: &ArtifactSpec) -> bool {
        if let Some(provider) = self.provider
            && artifact.provider != provider
        {
            return false;
        }
        if let Some(kind) = self.kind
            && artifact.kind != kind
        {
            return false;
        }
        true
    }
}

/// Drives a whole run: queue construction, per-artifact delegation, summary
pub struct Orchestrator {
    config: Arc<Config>,
    sessions: SessionManager,
    organizer: FileOrganizer,
    detector: StabilityDetector,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Validate the configuration and prepare the run environment
    ///
    /// Creates the download and artifact directories. Any failure here is
    /// run-level fatal and happens before any artifact is attempted.
    pub async fn new(config: Config, factory: Arc<dyn DriverFactory>) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let organizer = FileOrganizer::new(
            config.download_dir().clone(),
            config.artifacts_dir().clone(),
        )
        .await?;
        let detector = StabilityDetector::new(config.download_dir().clone(), &config.detector)?;

        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let sessions = SessionManager::new(config.clone(), factory, event_tx.clone());

        Ok(Self {
            config,
            sessions,
            organizer,
            detector,
            event_tx,
            cancel: CancellationToken::new(),
        })
    }

    /// Subscribe to run events
    ///
    /// Multiple subscribers are supported; events are dropped for subscribers
    /// that fall behind the channel capacity.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that cancels the run when triggered
    ///
    /// Cancellation stops before the next artifact starts, lets the in-flight
    /// attempt conclude naturally, closes all sessions, and still produces a
    /// summary for everything resolved so far.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The configuration this orchestrator was built with
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Process the artifact list to completion and return the summary
    ///
    /// Artifacts are resolved strictly in declaration order, one at a time.
    /// Per-artifact failures are contained and recorded; only queue-build
    /// problems ([`Error::Parse`]) abort the run.
    pub async fn run(
        &mut self,
        artifacts: Vec<ArtifactSpec>,
        filter: &QueueFilter,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::new();

        let (queue, skipped) = match build_queue(artifacts, filter, &self.config, &self.organizer) {
            Ok(parts) => parts,
            Err(e) => {
                // Nothing was started, but sessions may exist from an earlier
                // run() call on the same orchestrator
                self.sessions.close_all().await;
                return Err(e);
            }
        };

        for (name, reason) in skipped {
            info!(artifact = %name, %reason, "artifact skipped");
            self.event_tx
                .send(Event::ArtifactSkipped {
                    artifact: name.clone(),
                    reason,
                })
                .ok();
            summary.record(name, ProcessingResult::Skipped { reason });
        }

        let total = queue.len();
        info!(total, "starting run");

        for (index, artifact) in queue.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!("cancellation requested, stopping before the next artifact");
                summary.cancelled = true;
                break;
            }

            info!(
                artifact = %artifact.name,
                provider = %artifact.provider,
                kind = %artifact.kind,
                position = index + 1,
                total,
                "processing artifact"
            );
            self.event_tx
                .send(Event::Queued {
                    artifact: artifact.name.clone(),
                    provider: artifact.provider,
                    kind: artifact.kind,
                })
                .ok();

            let mut ctx = AttemptContext {
                config: &self.config,
                sessions: &mut self.sessions,
                detector: &self.detector,
                organizer: &self.organizer,
                event_tx: &self.event_tx,
                cancel: &self.cancel,
            };
            let (result, records) = process_artifact(artifact, &mut ctx).await;
            summary.attempts.extend(records);

            match &result {
                ProcessingResult::Success { path } => {
                    info!(artifact = %artifact.name, path = %path.display(), "artifact complete");
                    self.event_tx
                        .send(Event::ArtifactComplete {
                            artifact: artifact.name.clone(),
                            path: path.clone(),
                        })
                        .ok();
                }
                ProcessingResult::Failed { error, attempts } => {
                    warn!(
                        artifact = %artifact.name,
                        error = %error,
                        attempts,
                        "artifact failed"
                    );
                    self.event_tx
                        .send(Event::ArtifactFailed {
                            artifact: artifact.name.clone(),
                            error: error.clone(),
                            attempts: *attempts,
                        })
                        .ok();
                }
                ProcessingResult::Skipped { .. } => {}
            }
            summary.record(artifact.name.clone(), result);

            // Pace the platforms; skipped after the last artifact
            if index + 1 < total {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.config.generation.inter_artifact_delay) => {}
                }
            }
        }

        if self.cancel.is_cancelled() {
            summary.cancelled = true;
        }

        self.sessions.close_all().await;
        summary.finish();

        self.event_tx
            .send(Event::RunComplete {
                succeeded: summary.succeeded(),
                failed: summary.failed(),
                skipped: summary.skipped(),
            })
            .ok();
        info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            skipped = summary.skipped(),
            cancelled = summary.cancelled,
            "run complete"
        );

        Ok(summary)
    }
}

/// Build the processing queue from the full artifact list
///
/// Validates every spec (a malformed one aborts the run before any session
/// work), applies the filters, then excludes artifacts whose provider is
/// disabled or whose destination already exists under skip-existing. Order
/// follows `source_order`.
fn build_queue(
    mut artifacts: Vec<ArtifactSpec>,
    filter: &QueueFilter,
    config: &Config,
    organizer: &FileOrganizer,
) -> Result<(Vec<ArtifactSpec>, Vec<(String, SkipReason)>)> {
    let mut names = HashSet::new();
    for artifact in &artifacts {
        artifact.validate()?;
        if !names.insert(artifact.name.clone()) {
            return Err(Error::Parse(format!(
                "duplicate artifact name: {}",
                artifact.name
            )));
        }
    }

    artifacts.sort_by_key(|a| a.source_order);

    let mut queue = Vec::new();
    let mut skipped = Vec::new();

    for artifact in artifacts {
        if !filter.matches(&artifact) {
            continue;
        }
        if !config.session.providers.is_enabled(artifact.provider) {
            skipped.push((artifact.name, SkipReason::ProviderDisabled));
            continue;
        }
        if config.generation.skip_existing && organizer.artifact_exists(&artifact) {
            skipped.push((artifact.name, SkipReason::OutputExists));
            continue;
        }
        queue.push(artifact);
    }

    Ok((queue, skipped))
}
