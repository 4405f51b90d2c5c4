//! # artifact-forge
//!
//! Batch artifact generation orchestrator for browser-automated AI platforms.
//!
//! ## Design Philosophy
//!
//! artifact-forge is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Driver-agnostic** - Platform UI automation lives behind a trait;
//!   the core only sequences capability calls and classifies outcomes
//! - **Idempotent** - Re-running a queue skips artifacts that already exist
//! - **Event-driven** - Consumers subscribe to run events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use artifact_forge::{
//!     ArtifactKind, ArtifactSpec, Config, DriverFactory, Orchestrator, Provider, QueueFilter,
//! };
//! use std::sync::Arc;
//!
//! # async fn example(factory: Arc<dyn DriverFactory>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//!
//! // Artifact specs come from an external definition parser
//! let artifacts = vec![
//!     ArtifactSpec::new("Company Logo", ArtifactKind::Image, Provider::Gemini, "a logo", 0),
//!     ArtifactSpec::new("Release Notes", ArtifactKind::Text, Provider::Claude, "notes", 1),
//! ];
//!
//! let mut orchestrator = Orchestrator::new(config, factory).await?;
//! let summary = orchestrator.run(artifacts, &QueueFilter::default()).await?;
//!
//! println!("{}", summary.render());
//! std::process::exit(if summary.is_success() { 0 } else { 1 })
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Capability-set boundary to the external UI-automation layer
pub mod driver;
/// Error types
pub mod error;
/// Top-level orchestration loop
pub mod orchestrator;
/// File organization for completed downloads
pub mod organizer;
/// Per-artifact retry control
pub mod retry;
/// Provider session lifecycle management
pub mod session;
/// Download stability detection
pub mod stability;
/// Core types and events
pub mod types;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::{
    Config, DetectorConfig, GenerationConfig, PathsConfig, ProviderFlags, RetryConfig,
    SessionConfig,
};
pub use driver::{CompletionSignal, DriverFactory, ProviderDriver};
pub use error::{Error, OrganizeError, Result};
pub use orchestrator::{Orchestrator, QueueFilter};
pub use organizer::{ArtifactStoreStats, FileOrganizer, OverwritePolicy};
pub use retry::IsRetryable;
pub use session::{ProviderSession, SessionManager, SessionState};
pub use stability::StabilityDetector;
pub use types::{
    ArtifactKind, ArtifactSpec, AttemptOutcome, AttemptRecord, Event, ProcessingResult, Provider,
    RunSummary, SkipReason,
};

/// Helper function to run a queue with graceful signal handling.
///
/// Spawns a signal listener that cancels the run, then drives the
/// orchestrator to completion. The in-flight attempt finishes naturally,
/// sessions are closed, and the partial summary is returned.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal
///   registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use artifact_forge::{Config, DriverFactory, Orchestrator, QueueFilter, run_with_shutdown};
/// use std::sync::Arc;
///
/// # async fn example(factory: Arc<dyn DriverFactory>) -> Result<(), Box<dyn std::error::Error>> {
/// let mut orchestrator = Orchestrator::new(Config::default(), factory).await?;
/// let summary = run_with_shutdown(&mut orchestrator, vec![], &QueueFilter::default()).await?;
/// println!("{}", summary.render());
/// # Ok(())
/// # }
/// ```
pub async fn run_with_shutdown(
    orchestrator: &mut Orchestrator,
    artifacts: Vec<ArtifactSpec>,
    filter: &QueueFilter,
) -> Result<RunSummary> {
    let cancel = orchestrator.cancellation_token();
    let signal_task = tokio::spawn(async move {
        wait_for_signal().await;
        cancel.cancel();
    });

    let summary = orchestrator.run(artifacts, filter).await;
    signal_task.abort();
    summary
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
