//! Shared helpers for integration tests
//!
//! Provides a scripted driver implementing the public `ProviderDriver`
//! trait, exercising the crate exactly as an embedder would.

use artifact_forge::{
    ArtifactKind, CompletionSignal, Config, DriverFactory, Error, Provider, ProviderDriver, Result,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// What one generation attempt should do
#[derive(Clone, Debug)]
pub enum Step {
    /// Completion signals success and the download writes `file_name`
    Download { file_name: String, content: Vec<u8> },
    /// Completion never arrives before the deadline
    GenerationTimeout,
    /// Completion arrives but no file is ever written
    NoDownload,
}

#[derive(Default)]
struct ScriptState {
    steps: Arc<Mutex<VecDeque<Step>>>,
    logged_in: bool,
}

/// Scripted factory implementing the public driver boundary
pub struct ScriptedFactory {
    scripts: Mutex<HashMap<Provider, ScriptState>>,
    /// Number of drivers created, across all providers
    pub created: AtomicUsize,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            created: AtomicUsize::new(0),
        }
    }

    /// Queue generation steps for a provider (marks it logged in)
    pub fn script(&self, provider: Provider, steps: Vec<Step>) {
        let mut scripts = self.scripts.lock().unwrap();
        let entry = scripts.entry(provider).or_insert_with(|| ScriptState {
            logged_in: true,
            ..ScriptState::default()
        });
        entry.logged_in = true;
        entry.steps.lock().unwrap().extend(steps);
    }

    /// Make a provider never reach a logged-in state
    pub fn never_logs_in(&self, provider: Provider) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts
            .entry(provider)
            .or_insert_with(ScriptState::default)
            .logged_in = false;
    }
}

impl DriverFactory for ScriptedFactory {
    fn create(&self, provider: Provider, download_dir: &Path) -> Result<Box<dyn ProviderDriver>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts.entry(provider).or_insert_with(|| ScriptState {
            logged_in: true,
            ..ScriptState::default()
        });

        Ok(Box::new(ScriptedDriver {
            provider,
            download_dir: download_dir.to_path_buf(),
            steps: Arc::clone(&script.steps),
            logged_in: script.logged_in,
            pending: None,
        }))
    }
}

struct ScriptedDriver {
    provider: Provider,
    download_dir: PathBuf,
    steps: Arc<Mutex<VecDeque<Step>>>,
    logged_in: bool,
    pending: Option<(String, Vec<u8>)>,
}

#[async_trait]
impl ProviderDriver for ScriptedDriver {
    async fn launch(&mut self, _headless: bool) -> Result<()> {
        Ok(())
    }

    async fn is_authenticated(&mut self) -> Result<bool> {
        Ok(self.logged_in)
    }

    async fn select_mode(&mut self, _kind: ArtifactKind) -> Result<()> {
        Ok(())
    }

    async fn send_prompt(&mut self, _prompt: &str) -> Result<()> {
        Ok(())
    }

    async fn wait_for_completion(&mut self, _deadline: Duration) -> Result<CompletionSignal> {
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Download { file_name, content }) => {
                self.pending = Some((file_name, content));
                Ok(CompletionSignal::Completed)
            }
            Some(Step::GenerationTimeout) => Ok(CompletionSignal::TimedOut),
            Some(Step::NoDownload) => Ok(CompletionSignal::Completed),
            None => Err(Error::Other("scripted steps exhausted".to_string())),
        }
    }

    async fn trigger_download(&mut self) -> Result<()> {
        if let Some((file_name, content)) = self.pending.take() {
            std::fs::write(self.download_dir.join(file_name), content)?;
        }
        Ok(())
    }

    async fn capture_diagnostic(&mut self, destination: &Path) -> Result<()> {
        std::fs::write(destination, b"scripted-screenshot")?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn provider(&self) -> Provider {
        self.provider
    }
}

/// A config tuned for fast tests, rooted in a temp directory
pub fn fast_config(root: &TempDir) -> Config {
    let mut config = Config::default();
    config.paths.download_dir = root.path().join("downloads");
    config.paths.artifacts_dir = root.path().join("artifacts");
    config.session.login_timeout = Duration::from_millis(80);
    config.session.login_poll_interval = Duration::from_millis(15);
    config.detector.poll_interval = Duration::from_millis(30);
    config.detector.download_timeout = Duration::from_millis(250);
    config.retry.delay = Duration::from_millis(10);
    config.generation.inter_artifact_delay = Duration::from_millis(10);
    config
}
