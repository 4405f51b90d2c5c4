//! Capability-set boundary to the external UI-automation layer
//!
//! The orchestration core never drives a browser itself. Each provider's
//! selectors, click/type sequences, and completion heuristics live behind the
//! [`ProviderDriver`] trait; the core only sequences calls to it and
//! interprets success/timeout/fault outcomes.
//!
//! Embedders supply a [`DriverFactory`] that builds one driver per provider.
//! A driver owns its automation context (browser profile, WebDriver session)
//! exclusively; the session lifecycle manager guarantees `close` is called on
//! every exit path so the context is never leaked.
//!
//! # Example
//!
//! ```no_run
//! use artifact_forge::{
//!     ArtifactKind, CompletionSignal, DriverFactory, Provider, ProviderDriver, Result,
//! };
//! use async_trait::async_trait;
//! use std::path::Path;
//! use std::time::Duration;
//!
//! struct WebDriverSession { /* ... */ }
//!
//! #[async_trait]
//! impl ProviderDriver for WebDriverSession {
//!     async fn launch(&mut self, _headless: bool) -> Result<()> { Ok(()) }
//!     async fn is_authenticated(&mut self) -> Result<bool> { Ok(true) }
//!     async fn select_mode(&mut self, _kind: ArtifactKind) -> Result<()> { Ok(()) }
//!     async fn send_prompt(&mut self, _prompt: &str) -> Result<()> { Ok(()) }
//!     async fn wait_for_completion(&mut self, _deadline: Duration) -> Result<CompletionSignal> {
//!         Ok(CompletionSignal::Completed)
//!     }
//!     async fn trigger_download(&mut self) -> Result<()> { Ok(()) }
//!     async fn capture_diagnostic(&mut self, _destination: &Path) -> Result<()> { Ok(()) }
//!     async fn close(&mut self) -> Result<()> { Ok(()) }
//!     fn provider(&self) -> Provider { Provider::Gemini }
//! }
//! ```

use crate::error::Result;
use crate::types::{ArtifactKind, Provider};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Outcome of waiting for a generation to finish
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionSignal {
    /// The platform signaled that generation finished
    Completed,
    /// The deadline elapsed without a completion signal
    TimedOut,
}

/// One provider's UI-automation capability set
///
/// Implementations are expected to report failures through the crate error
/// taxonomy: transient automation faults as
/// [`Error::SessionFault`](crate::Error::SessionFault) so the retry
/// controller can retry them, anything unrecoverable as another variant.
///
/// All methods take `&mut self`: a driver is a serially-reusable resource
/// operated by at most one in-flight attempt.
#[async_trait]
pub trait ProviderDriver: Send + Sync {
    /// Open the persistent automation context (browser window/profile)
    ///
    /// Called once per session, before any other method.
    async fn launch(&mut self, headless: bool) -> Result<()>;

    /// Probe the platform-specific "logged in" signal
    ///
    /// Polled by the session manager while awaiting a manual login. Must be
    /// cheap and side-effect free.
    async fn is_authenticated(&mut self) -> Result<bool>;

    /// Put the platform UI into the right generation mode for `kind`
    async fn select_mode(&mut self, kind: ArtifactKind) -> Result<()>;

    /// Type and submit the prompt
    async fn send_prompt(&mut self, prompt: &str) -> Result<()>;

    /// Wait until the platform signals generation is finished
    ///
    /// Must return [`CompletionSignal::TimedOut`] rather than blocking past
    /// `deadline`.
    async fn wait_for_completion(&mut self, deadline: Duration) -> Result<CompletionSignal>;

    /// Trigger the platform's download action for the generated output
    ///
    /// The resulting file lands in the download directory the driver was
    /// created with; locating it is the stability detector's job.
    async fn trigger_download(&mut self) -> Result<()>;

    /// Capture a diagnostic artifact (screenshot) to `destination`
    ///
    /// Best-effort: callers log failures and never let them mask the
    /// original error.
    async fn capture_diagnostic(&mut self, destination: &Path) -> Result<()>;

    /// Close the automation context, releasing the browser/profile
    ///
    /// Must be safe to call more than once.
    async fn close(&mut self) -> Result<()>;

    /// The provider this driver automates
    fn provider(&self) -> Provider;
}

/// Builds drivers on demand, one per provider
///
/// Called lazily by the session manager on the first artifact that needs a
/// provider. Each call must return an independently owned automation context
/// (no shared browser state between providers).
pub trait DriverFactory: Send + Sync {
    /// Create an unlaunched driver for `provider`, configured to download
    /// into `download_dir`
    fn create(&self, provider: Provider, download_dir: &Path) -> Result<Box<dyn ProviderDriver>>;
}
