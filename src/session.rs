//! Session lifecycle management
//!
//! One long-lived automation session per provider, created lazily on the
//! first artifact that needs it and reused across all artifacts for that
//! provider within a run.
//!
//! State machine:
//!
//! ```text
//! Uninitialized -> Launching -> AwaitingManualLogin -> Ready <-> Busy
//!                                                        ^        |
//!                                                        |        v
//!                                                        +--- Degraded -> Closed
//! ```
//!
//! `AwaitingManualLogin` is entered only when no authenticated state is
//! detected after launch; the manager blocks there, polling the driver's
//! logged-in signal, until success or the login deadline elapses. A login
//! timeout is fatal for that provider for the rest of the run. A `Degraded`
//! session gets one self-recovery probe on the next acquire; if the probe
//! fails the session is closed and recreated lazily.

use crate::config::Config;
use crate::driver::{DriverFactory, ProviderDriver};
use crate::error::{Error, Result};
use crate::types::{Event, Provider};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle state of one provider session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No automation context exists yet
    Uninitialized,
    /// The automation context is being opened
    Launching,
    /// Blocked polling for the platform's logged-in signal
    AwaitingManualLogin,
    /// Authenticated and idle, ready for hand-off
    Ready,
    /// Held by the single in-flight attempt
    Busy,
    /// A mid-generation fault was reported; eligible for one recovery probe
    Degraded,
    /// The automation context has been torn down
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Launching => "launching",
            SessionState::AwaitingManualLogin => "awaiting_manual_login",
            SessionState::Ready => "ready",
            SessionState::Busy => "busy",
            SessionState::Degraded => "degraded",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// One provider's live automation session
///
/// Exclusively owned by the manager; only the single in-flight attempt
/// holding the `&mut` may operate on the driver.
pub struct ProviderSession {
    provider: Provider,
    state: SessionState,
    created_at: DateTime<Utc>,
    last_used_at: DateTime<Utc>,
    driver: Box<dyn ProviderDriver>,
}

impl ProviderSession {
    /// The provider this session automates
    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// When the session was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the session was last handed to an attempt
    pub fn last_used_at(&self) -> DateTime<Utc> {
        self.last_used_at
    }

    /// Mutable access to the underlying capability set
    pub fn driver_mut(&mut self) -> &mut dyn ProviderDriver {
        self.driver.as_mut()
    }
}

/// Provides, per provider, exactly one live automation session
pub struct SessionManager {
    config: Arc<Config>,
    factory: Arc<dyn DriverFactory>,
    sessions: HashMap<Provider, ProviderSession>,
    failed_logins: HashSet<Provider>,
    event_tx: broadcast::Sender<Event>,
}

impl SessionManager {
    /// Create a manager; no sessions are opened until first acquire
    pub fn new(
        config: Arc<Config>,
        factory: Arc<dyn DriverFactory>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            config,
            factory,
            sessions: HashMap::new(),
            failed_logins: HashSet::new(),
            event_tx,
        }
    }

    /// Acquire the session for `provider`, creating it if absent
    ///
    /// The returned session is guaranteed `Ready` at hand-off and is marked
    /// `Busy` for the caller. Callers must pair every successful acquire
    /// with [`SessionManager::release`].
    ///
    /// # Errors
    /// - [`Error::LoginTimeout`] when the manual login deadline elapsed,
    ///   now or earlier in the run (the provider stays blocked)
    /// - [`Error::Cancelled`] when the run is cancelled during the login wait
    /// - driver launch errors, passed through
    pub async fn acquire(
        &mut self,
        provider: Provider,
        cancel: &CancellationToken,
    ) -> Result<&mut ProviderSession> {
        if self.failed_logins.contains(&provider) {
            return Err(Error::LoginTimeout { provider });
        }

        let mut recreate = false;
        if let Some(session) = self.sessions.get_mut(&provider) {
            match session.state {
                SessionState::Ready => {}
                SessionState::Degraded => {
                    // One self-recovery probe before giving up on the context
                    match session.driver.is_authenticated().await {
                        Ok(true) => {
                            info!(%provider, "degraded session recovered");
                            session.state = SessionState::Ready;
                        }
                        Ok(false) | Err(_) => {
                            warn!(%provider, "degraded session did not recover, recreating");
                            recreate = true;
                        }
                    }
                }
                SessionState::Closed => recreate = true,
                state => {
                    // Busy/Launching at acquire means a caller leaked a session
                    return Err(Error::SessionFault(format!(
                        "session for {provider} unexpectedly {state} at acquire"
                    )));
                }
            }
        }

        if recreate {
            self.close_session(provider).await;
        }

        if !self.sessions.contains_key(&provider) {
            let session = self.create_session(provider, cancel).await?;
            self.sessions.insert(provider, session);
        }

        let session = self
            .sessions
            .get_mut(&provider)
            .ok_or_else(|| Error::Other("session vanished after creation".to_string()))?;
        session.state = SessionState::Busy;
        session.last_used_at = Utc::now();
        Ok(session)
    }

    /// Return a session after an attempt
    ///
    /// `usable = true` puts it back to `Ready` for reuse; `usable = false`
    /// marks it `Degraded` so the next acquire probes it before reuse.
    /// A release for a provider with no live session is a no-op.
    pub fn release(&mut self, provider: Provider, usable: bool) {
        if let Some(session) = self.sessions.get_mut(&provider)
            && session.state == SessionState::Busy
        {
            session.state = if usable {
                SessionState::Ready
            } else {
                SessionState::Degraded
            };
            debug!(%provider, state = %session.state, "session released");
        }
    }

    /// Mutable access to a live session without a state transition
    ///
    /// Used for best-effort diagnostics while the attempt still holds the
    /// session.
    pub fn session_mut(&mut self, provider: Provider) -> Option<&mut ProviderSession> {
        self.sessions.get_mut(&provider)
    }

    /// Whether login already timed out for this provider in this run
    pub fn is_login_blocked(&self, provider: Provider) -> bool {
        self.failed_logins.contains(&provider)
    }

    /// Number of live sessions
    pub fn live_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Close every live session, best-effort
    ///
    /// Called at the end of a run and on cancellation so no automation
    /// context outlives the process.
    pub async fn close_all(&mut self) {
        let providers: Vec<Provider> = self.sessions.keys().copied().collect();
        for provider in providers {
            self.close_session(provider).await;
        }
    }

    /// Launch a session and walk it to `Ready`, blocking on manual login if
    /// required
    async fn create_session(
        &mut self,
        provider: Provider,
        cancel: &CancellationToken,
    ) -> Result<ProviderSession> {
        info!(%provider, "launching session");
        self.event_tx.send(Event::SessionLaunching { provider }).ok();

        let now = Utc::now();
        let driver = self
            .factory
            .create(provider, self.config.download_dir())?;
        let mut session = ProviderSession {
            provider,
            state: SessionState::Launching,
            created_at: now,
            last_used_at: now,
            driver,
        };

        if let Err(e) = session.driver.launch(self.config.session.headless).await {
            if let Err(close_err) = session.driver.close().await {
                warn!(%provider, error = %close_err, "failed to close session after launch error");
            }
            return Err(e);
        }

        let deadline = Instant::now() + self.config.session.login_timeout;
        loop {
            match session.driver.is_authenticated().await {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => {
                    // Probe failures only cost one poll; the deadline bounds us
                    warn!(%provider, error = %e, "login probe failed");
                }
            }

            if session.state != SessionState::AwaitingManualLogin {
                session.state = SessionState::AwaitingManualLogin;
                info!(%provider, "no authenticated state detected, waiting for manual login");
                self.event_tx.send(Event::AwaitingLogin { provider }).ok();
            }

            if Instant::now() >= deadline {
                warn!(
                    %provider,
                    timeout_secs = self.config.session.login_timeout.as_secs(),
                    "manual login did not complete before the deadline"
                );
                if let Err(e) = session.driver.close().await {
                    warn!(%provider, error = %e, "failed to close session after login timeout");
                }
                self.failed_logins.insert(provider);
                return Err(Error::LoginTimeout { provider });
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(%provider, "login wait interrupted by cancellation");
                    if let Err(e) = session.driver.close().await {
                        warn!(%provider, error = %e, "failed to close session after cancellation");
                    }
                    return Err(Error::Cancelled);
                }
                _ = tokio::time::sleep(self.config.session.login_poll_interval) => {}
            }
        }

        session.state = SessionState::Ready;
        info!(%provider, "session ready");
        self.event_tx.send(Event::SessionReady { provider }).ok();
        Ok(session)
    }

    /// Tear down one session, best-effort
    async fn close_session(&mut self, provider: Provider) {
        if let Some(mut session) = self.sessions.remove(&provider) {
            if let Err(e) = session.driver.close().await {
                warn!(%provider, error = %e, "failed to close session");
            }
            session.state = SessionState::Closed;
            debug!(%provider, "session closed");
        }
    }
}
