//! Shared scripted mock driver for unit tests
//!
//! The mock factory hands out drivers whose per-attempt behavior is scripted
//! ahead of time. Attempt scripts live in the factory and are shared with
//! every driver created for a provider, so a recreated session continues the
//! same script.

use crate::driver::{CompletionSignal, DriverFactory, ProviderDriver};
use crate::error::{Error, Result};
use crate::types::{ArtifactKind, Provider};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What one generation attempt should do
#[derive(Clone, Debug)]
pub(crate) enum MockAttempt {
    /// Completion signals success and the download writes `file_name`
    Succeed {
        file_name: String,
        content: Vec<u8>,
    },
    /// Completion never arrives before the deadline
    GenerationTimeout,
    /// The session reports a transient automation fault
    SessionFault,
    /// Completion arrives but no file is ever written
    NoDownload,
}

/// How `is_authenticated` responds across polls
#[derive(Clone, Debug)]
pub(crate) enum AuthBehavior {
    /// Always logged in
    Always,
    /// Never logs in (forces a login timeout)
    Never,
    /// Scripted responses, shared across driver recreations; falls back to
    /// `true` once exhausted
    Script(Vec<bool>),
}

#[derive(Default)]
struct ProviderScript {
    attempts: Arc<Mutex<VecDeque<MockAttempt>>>,
    auth: Arc<Mutex<VecDeque<bool>>>,
    auth_default: bool,
    diagnostic_fails: bool,
}

/// Call counters shared between the factory and all drivers it creates
#[derive(Clone, Default)]
pub(crate) struct MockStats {
    pub launches: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    pub diagnostics: Arc<AtomicUsize>,
    pub prompts: Arc<Mutex<Vec<String>>>,
    pub modes: Arc<Mutex<Vec<ArtifactKind>>>,
}

/// Scripted driver factory
pub(crate) struct MockFactory {
    scripts: Mutex<HashMap<Provider, ProviderScript>>,
    /// Providers passed to `create`, in order
    pub created: Arc<Mutex<Vec<Provider>>>,
    pub stats: MockStats,
}

impl MockFactory {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            created: Arc::new(Mutex::new(Vec::new())),
            stats: MockStats::default(),
        }
    }

    /// Queue attempt behaviors for a provider
    pub fn script(&self, provider: Provider, attempts: Vec<MockAttempt>) {
        let mut scripts = self.scripts.lock().unwrap();
        let entry = scripts.entry(provider).or_insert_with(|| ProviderScript {
            auth_default: true,
            ..ProviderScript::default()
        });
        entry.attempts.lock().unwrap().extend(attempts);
    }

    /// Set the login behavior for a provider
    pub fn auth(&self, provider: Provider, behavior: AuthBehavior) {
        let mut scripts = self.scripts.lock().unwrap();
        let entry = scripts.entry(provider).or_insert_with(|| ProviderScript {
            auth_default: true,
            ..ProviderScript::default()
        });
        match behavior {
            AuthBehavior::Always => {
                entry.auth = Arc::new(Mutex::new(VecDeque::new()));
                entry.auth_default = true;
            }
            AuthBehavior::Never => {
                entry.auth = Arc::new(Mutex::new(VecDeque::new()));
                entry.auth_default = false;
            }
            AuthBehavior::Script(responses) => {
                entry.auth = Arc::new(Mutex::new(responses.into()));
                entry.auth_default = true;
            }
        }
    }

    /// Make diagnostic capture fail for a provider
    pub fn fail_diagnostics(&self, provider: Provider) {
        let mut scripts = self.scripts.lock().unwrap();
        let entry = scripts.entry(provider).or_insert_with(|| ProviderScript {
            auth_default: true,
            ..ProviderScript::default()
        });
        entry.diagnostic_fails = true;
    }

    /// Number of drivers created so far
    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

impl DriverFactory for MockFactory {
    fn create(&self, provider: Provider, download_dir: &Path) -> Result<Box<dyn ProviderDriver>> {
        self.created.lock().unwrap().push(provider);

        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts.entry(provider).or_insert_with(|| ProviderScript {
            auth_default: true,
            ..ProviderScript::default()
        });

        Ok(Box::new(MockDriver {
            provider,
            download_dir: download_dir.to_path_buf(),
            attempts: Arc::clone(&script.attempts),
            auth: Arc::clone(&script.auth),
            auth_default: script.auth_default,
            diagnostic_fails: script.diagnostic_fails,
            pending_download: None,
            stats: self.stats.clone(),
        }))
    }
}

/// Scripted driver created by [`MockFactory`]
pub(crate) struct MockDriver {
    provider: Provider,
    download_dir: PathBuf,
    attempts: Arc<Mutex<VecDeque<MockAttempt>>>,
    auth: Arc<Mutex<VecDeque<bool>>>,
    auth_default: bool,
    diagnostic_fails: bool,
    pending_download: Option<(String, Vec<u8>)>,
    stats: MockStats,
}

#[async_trait]
impl ProviderDriver for MockDriver {
    async fn launch(&mut self, _headless: bool) -> Result<()> {
        self.stats.launches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn is_authenticated(&mut self) -> Result<bool> {
        let next = self.auth.lock().unwrap().pop_front();
        Ok(next.unwrap_or(self.auth_default))
    }

    async fn select_mode(&mut self, kind: ArtifactKind) -> Result<()> {
        self.stats.modes.lock().unwrap().push(kind);
        Ok(())
    }

    async fn send_prompt(&mut self, prompt: &str) -> Result<()> {
        self.stats.prompts.lock().unwrap().push(prompt.to_string());
        Ok(())
    }

    async fn wait_for_completion(&mut self, _deadline: Duration) -> Result<CompletionSignal> {
        let attempt = self.attempts.lock().unwrap().pop_front();
        match attempt {
            Some(MockAttempt::Succeed { file_name, content }) => {
                self.pending_download = Some((file_name, content));
                Ok(CompletionSignal::Completed)
            }
            Some(MockAttempt::GenerationTimeout) => Ok(CompletionSignal::TimedOut),
            Some(MockAttempt::SessionFault) => {
                Err(Error::SessionFault("injected fault".to_string()))
            }
            Some(MockAttempt::NoDownload) => Ok(CompletionSignal::Completed),
            None => Err(Error::Other("mock attempt script exhausted".to_string())),
        }
    }

    async fn trigger_download(&mut self) -> Result<()> {
        if let Some((file_name, content)) = self.pending_download.take() {
            std::fs::write(self.download_dir.join(file_name), content)?;
        }
        Ok(())
    }

    async fn capture_diagnostic(&mut self, destination: &Path) -> Result<()> {
        if self.diagnostic_fails {
            return Err(Error::SessionFault("screenshot failed".to_string()));
        }
        std::fs::write(destination, b"mock-screenshot")?;
        self.stats.diagnostics.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn provider(&self) -> Provider {
        self.provider
    }
}
