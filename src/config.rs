//! Configuration types for artifact-forge
//!
//! Loading from disk (JSON/TOML file, environment) is the embedder's concern;
//! the structs here define the semantics and the defaults, and
//! [`Config::validate`] is run before any artifact is attempted.

use crate::error::{Error, Result};
use crate::types::Provider;
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Directory layout for a run
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory the browser downloads into (default: "downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Artifact store directory (default: "artifacts")
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            artifacts_dir: default_artifacts_dir(),
        }
    }
}

/// Per-provider enable flags
///
/// Artifacts for a disabled provider are reported as skipped instead of
/// being processed.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ProviderFlags {
    /// Enable Gemini sessions (default: true)
    #[serde(default = "default_true")]
    pub gemini: bool,

    /// Enable ChatGPT sessions (default: true)
    #[serde(default = "default_true")]
    pub chatgpt: bool,

    /// Enable Claude sessions (default: true)
    #[serde(default = "default_true")]
    pub claude: bool,
}

impl ProviderFlags {
    /// Whether the given provider is enabled for this run
    pub fn is_enabled(&self, provider: Provider) -> bool {
        match provider {
            Provider::Gemini => self.gemini,
            Provider::ChatGpt => self.chatgpt,
            Provider::Claude => self.claude,
        }
    }
}

impl Default for ProviderFlags {
    fn default() -> Self {
        Self {
            gemini: true,
            chatgpt: true,
            claude: true,
        }
    }
}

/// Session behavior configuration (browser mode, manual login window)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Run browsers headless (default: false, manual login needs a window)
    #[serde(default)]
    pub headless: bool,

    /// How long to wait for a manual login before the provider is considered
    /// unusable for the run (default: 180 seconds)
    #[serde(default = "default_login_timeout", with = "duration_serde")]
    pub login_timeout: Duration,

    /// Interval between logged-in checks while awaiting login (default: 2 seconds)
    #[serde(default = "default_login_poll_interval", with = "duration_serde")]
    pub login_poll_interval: Duration,

    /// Per-provider enable flags
    #[serde(default)]
    pub providers: ProviderFlags,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: false,
            login_timeout: default_login_timeout(),
            login_poll_interval: default_login_poll_interval(),
            providers: ProviderFlags::default(),
        }
    }
}

/// Generation pacing configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Deadline for one generation to signal completion (default: 300 seconds)
    #[serde(default = "default_generation_timeout", with = "duration_serde")]
    pub generation_timeout: Duration,

    /// Pause between consecutive artifacts (default: 5 seconds)
    #[serde(default = "default_inter_artifact_delay", with = "duration_serde")]
    pub inter_artifact_delay: Duration,

    /// Exclude artifacts whose destination file already exists (default: true)
    ///
    /// When disabled, existing destination files are backed up with a
    /// timestamp before being overwritten.
    #[serde(default = "default_true")]
    pub skip_existing: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            generation_timeout: default_generation_timeout(),
            inter_artifact_delay: default_inter_artifact_delay(),
            skip_existing: true,
        }
    }
}

/// Download stability detector configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Interval between download-directory polls (default: 1 second)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Deadline for a stable download to appear (default: 60 seconds)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub download_timeout: Duration,

    /// Regex patterns for in-progress/transient filenames to ignore
    #[serde(default = "default_transient_patterns")]
    pub transient_patterns: Vec<String>,
}

impl DetectorConfig {
    /// Compile the transient-name patterns, reporting which pattern is bad
    pub fn compile_transient_patterns(&self) -> Result<RegexSet> {
        RegexSet::new(&self.transient_patterns).map_err(|e| Error::Config {
            message: format!("invalid transient filename pattern: {e}"),
            key: Some("transient_patterns".to_string()),
        })
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            download_timeout: default_download_timeout(),
            transient_patterns: default_transient_patterns(),
        }
    }
}

/// Retry configuration for per-artifact attempts
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of generation attempts per artifact (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts (default: 10 seconds)
    #[serde(default = "default_retry_delay", with = "duration_serde")]
    pub delay: Duration,

    /// Add random jitter to the inter-attempt delay (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay: default_retry_delay(),
            jitter: false,
        }
    }
}

/// Main configuration for an orchestration run
///
/// Fields are organized into logical sub-configs:
/// - [`paths`](PathsConfig) — download and artifact store directories
/// - [`session`](SessionConfig) — browser mode, manual login window, provider flags
/// - [`generation`](GenerationConfig) — timeouts, pacing, skip-existing
/// - [`detector`](DetectorConfig) — download stability polling
/// - [`retry`](RetryConfig) — per-artifact attempt budget
///
/// All sub-config fields are flattened so the serialized form stays flat
/// (no nesting), and individual settings keep their original names.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Directory layout
    #[serde(flatten)]
    pub paths: PathsConfig,

    /// Session behavior
    #[serde(flatten)]
    pub session: SessionConfig,

    /// Generation pacing
    #[serde(flatten)]
    pub generation: GenerationConfig,

    /// Download stability detection
    #[serde(flatten)]
    pub detector: DetectorConfig,

    /// Per-artifact retry budget
    #[serde(flatten)]
    pub retry: RetryConfig,
}

// Convenience accessors — keep call sites short without reaching through
// the sub-config structs.
impl Config {
    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.paths.download_dir
    }

    /// Artifact store directory
    pub fn artifacts_dir(&self) -> &PathBuf {
        &self.paths.artifacts_dir
    }

    /// Check the configuration for values that would break the run
    ///
    /// Run-level fatal: a failure here aborts before any artifact is
    /// attempted.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::Config {
                message: "retry max_attempts must be at least 1".to_string(),
                key: Some("max_attempts".to_string()),
            });
        }
        if self.detector.poll_interval.is_zero() {
            return Err(Error::Config {
                message: "detector poll_interval must be greater than zero".to_string(),
                key: Some("poll_interval".to_string()),
            });
        }
        if self.detector.download_timeout < self.detector.poll_interval {
            return Err(Error::Config {
                message: "download_timeout must be at least one poll_interval".to_string(),
                key: Some("download_timeout".to_string()),
            });
        }
        if self.generation.generation_timeout.is_zero() {
            return Err(Error::Config {
                message: "generation_timeout must be greater than zero".to_string(),
                key: Some("generation_timeout".to_string()),
            });
        }
        if self.session.login_timeout.is_zero() {
            return Err(Error::Config {
                message: "login_timeout must be greater than zero".to_string(),
                key: Some("login_timeout".to_string()),
            });
        }
        if self.session.login_poll_interval.is_zero() {
            return Err(Error::Config {
                message: "login_poll_interval must be greater than zero".to_string(),
                key: Some("login_poll_interval".to_string()),
            });
        }
        self.detector.compile_transient_patterns()?;
        Ok(())
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_true() -> bool {
    true
}

fn default_login_timeout() -> Duration {
    Duration::from_secs(180)
}

fn default_login_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_generation_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_inter_artifact_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_transient_patterns() -> Vec<String> {
    vec![
        r"\.crdownload$".to_string(),
        r"\.tmp$".to_string(),
        r"\.part$".to_string(),
        r"^\.".to_string(),
    ]
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(10)
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
