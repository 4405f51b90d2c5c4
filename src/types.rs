//! Core types for artifact-forge

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// AI platform automated through its web UI
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google Gemini
    Gemini,
    /// OpenAI ChatGPT
    ChatGpt,
    /// Anthropic Claude
    Claude,
}

impl Provider {
    /// All known providers, in a fixed order
    pub const ALL: [Provider; 3] = [Provider::Gemini, Provider::ChatGpt, Provider::Claude];

    /// Lowercase name as used in artifact definitions and filters
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::ChatGpt => "chatgpt",
            Provider::Claude => "claude",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Provider::Gemini),
            "chatgpt" => Ok(Provider::ChatGpt),
            "claude" => Ok(Provider::Claude),
            other => Err(Error::Parse(format!("unknown provider: {other}"))),
        }
    }
}

/// Kind of artifact being generated
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Generated image
    Image,
    /// Generated prose
    Text,
    /// Generated source code
    Code,
    /// Anything else
    Other,
}

impl ArtifactKind {
    /// Lowercase name as used in artifact definitions and filters
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Image => "image",
            ArtifactKind::Text => "text",
            ArtifactKind::Code => "code",
            ArtifactKind::Other => "other",
        }
    }

    /// Default output extension for this kind (png for images, txt otherwise)
    pub fn default_extension(&self) -> &'static str {
        match self {
            ArtifactKind::Image => "png",
            ArtifactKind::Text | ArtifactKind::Code | ArtifactKind::Other => "txt",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(ArtifactKind::Image),
            "text" => Ok(ArtifactKind::Text),
            "code" => Ok(ArtifactKind::Code),
            "other" => Ok(ArtifactKind::Other),
            other => Err(Error::Parse(format!("unknown artifact kind: {other}"))),
        }
    }
}

/// One requested artifact, fully resolved before it reaches the orchestrator
///
/// Constructed once by the external artifact parser; immutable thereafter.
/// [`ArtifactSpec::new`] resolves the output name and extension defaults
/// eagerly so no unresolved defaults exist downstream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    /// Display name, unique within a run
    pub name: String,
    /// Kind of artifact to generate
    pub kind: ArtifactKind,
    /// Provider that generates it
    pub provider: Provider,
    /// Filename stem for the stored output
    pub output_name: String,
    /// Output file extension (without the dot)
    pub extension: String,
    /// Prompt body sent to the provider
    pub prompt: String,
    /// Declaration order in the source document
    pub source_order: usize,
}

impl ArtifactSpec {
    /// Create a spec with defaults resolved: `output_name` becomes a slug of
    /// `name`, `extension` follows [`ArtifactKind::default_extension`].
    pub fn new(
        name: impl Into<String>,
        kind: ArtifactKind,
        provider: Provider,
        prompt: impl Into<String>,
        source_order: usize,
    ) -> Self {
        let name = name.into();
        let output_name = slugify(&name);
        Self {
            name,
            kind,
            provider,
            output_name,
            extension: kind.default_extension().to_string(),
            prompt: prompt.into(),
            source_order,
        }
    }

    /// Override the output filename stem
    #[must_use]
    pub fn with_output_name(mut self, output_name: impl Into<String>) -> Self {
        self.output_name = output_name.into();
        self
    }

    /// Override the output extension
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Destination filename, `{output_name}.{extension}`
    pub fn filename(&self) -> String {
        format!("{}.{}", self.output_name, self.extension)
    }

    /// Reject specs with unresolved or empty fields
    ///
    /// Called at queue-build time; a failure here is a [`Error::Parse`] that
    /// aborts the run before any session work.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Parse("artifact name must not be empty".to_string()));
        }
        if self.prompt.trim().is_empty() {
            return Err(Error::Parse(format!(
                "artifact '{}' has an empty prompt",
                self.name
            )));
        }
        if self.output_name.trim().is_empty() {
            return Err(Error::Parse(format!(
                "artifact '{}' has an empty output name",
                self.name
            )));
        }
        if self.extension.trim().is_empty() {
            return Err(Error::Parse(format!(
                "artifact '{}' has an empty extension",
                self.name
            )));
        }
        Ok(())
    }
}

/// Derive a filesystem-safe stem from an artifact name
///
/// Lowercases, strips everything but alphanumerics/spaces/hyphens, and
/// collapses separator runs into single underscores.
fn slugify(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-' || *c == '_')
        .collect();

    let mut slug = String::with_capacity(cleaned.len());
    let mut pending_sep = false;
    for c in cleaned.chars() {
        if c.is_whitespace() || c == '-' || c == '_' {
            pending_sep = !slug.is_empty();
        } else {
            if pending_sep {
                slug.push('_');
                pending_sep = false;
            }
            slug.push(c);
        }
    }
    slug
}

/// Terminal classification of one generation attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The attempt produced a stored output file
    Success,
    /// The attempt failed with an error the retry controller may retry
    RetryableFailure {
        /// Machine-readable error code, see [`Error::code`]
        error: String,
    },
    /// The attempt failed with an error that ends processing for this artifact
    FatalFailure {
        /// Machine-readable error code, see [`Error::code`]
        error: String,
    },
}

/// One attempt at generating one artifact, kept for the run report
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Name of the artifact being attempted
    pub artifact: String,
    /// 1-based attempt number
    pub attempt_number: u32,
    /// When the attempt started
    pub started_at: DateTime<Utc>,
    /// How the attempt ended
    pub outcome: AttemptOutcome,
    /// Best-effort diagnostic capture (screenshot), if one was taken
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic_path: Option<PathBuf>,
}

/// Why an artifact was excluded from processing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Destination file already exists and skip-existing is enabled
    OutputExists,
    /// The artifact's provider is disabled in the configuration
    ProviderDisabled,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::OutputExists => f.write_str("output already exists"),
            SkipReason::ProviderDisabled => f.write_str("provider disabled"),
        }
    }
}

/// Final outcome for one queued artifact
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ProcessingResult {
    /// Output materialized at `path`
    Success {
        /// Final artifact path in the store
        path: PathBuf,
    },
    /// Excluded from processing at queue-build time
    Skipped {
        /// Why the artifact was excluded
        reason: SkipReason,
    },
    /// All attempts failed
    Failed {
        /// Machine-readable code of the last error, see [`Error::code`]
        error: String,
        /// Number of generation attempts consumed
        attempts: u32,
    },
}

/// Final report for a run: one terminal outcome per queued artifact, plus the
/// full attempt log
///
/// Built incrementally by the orchestration loop and immutable once the run
/// ends. Entry order follows queue order (skipped artifacts first, then the
/// processed sequence).
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    /// Per-artifact terminal outcomes, in recording order
    pub results: Vec<(String, ProcessingResult)>,
    /// Every attempt made during the run, success or failure
    pub attempts: Vec<AttemptRecord>,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
    /// Whether the run was cut short by operator cancellation
    pub cancelled: bool,
}

impl RunSummary {
    /// Create an empty summary stamped with the current time
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            results: Vec::new(),
            attempts: Vec::new(),
            started_at: now,
            finished_at: now,
            cancelled: false,
        }
    }

    /// Record the terminal outcome for one artifact
    pub fn record(&mut self, name: impl Into<String>, result: ProcessingResult) {
        self.results.push((name.into(), result));
    }

    /// Look up the outcome recorded for an artifact
    pub fn get(&self, name: &str) -> Option<&ProcessingResult> {
        self.results
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| r)
    }

    /// Stamp the end of the run
    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
    }

    /// Number of artifacts that produced an output
    pub fn succeeded(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, r)| matches!(r, ProcessingResult::Success { .. }))
            .count()
    }

    /// Number of artifacts that exhausted their attempts
    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, r)| matches!(r, ProcessingResult::Failed { .. }))
            .count()
    }

    /// Number of artifacts excluded at queue-build time
    pub fn skipped(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, r)| matches!(r, ProcessingResult::Skipped { .. }))
            .count()
    }

    /// True when no artifact failed (suitable for process exit status)
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Serialize the summary as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Render a console-friendly report
    pub fn render(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let _ = writeln!(out, "run complete: {} artifact(s)", self.results.len());
        let _ = writeln!(
            out,
            "  succeeded: {}  failed: {}  skipped: {}",
            self.succeeded(),
            self.failed(),
            self.skipped()
        );
        if self.cancelled {
            let _ = writeln!(out, "  (run cancelled before completing the queue)");
        }
        for (name, result) in &self.results {
            match result {
                ProcessingResult::Failed { error, attempts } => {
                    let _ = writeln!(out, "  FAILED {name}: {error} after {attempts} attempt(s)");
                }
                ProcessingResult::Skipped { reason } => {
                    let _ = writeln!(out, "  skipped {name}: {reason}");
                }
                ProcessingResult::Success { .. } => {}
            }
        }
        out
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

/// Event emitted during a run's lifecycle
///
/// Consumers subscribe via [`crate::Orchestrator::subscribe`]; events are
/// best-effort and dropped when no subscriber is listening.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Artifact accepted into the processing queue
    Queued {
        /// Artifact name
        artifact: String,
        /// Provider that will generate it
        provider: Provider,
        /// Kind of artifact
        kind: ArtifactKind,
    },

    /// A provider session is being launched
    SessionLaunching {
        /// Provider whose session is starting
        provider: Provider,
    },

    /// The session is blocked waiting for a manual login
    AwaitingLogin {
        /// Provider awaiting login
        provider: Provider,
    },

    /// The session reached the ready state
    SessionReady {
        /// Provider whose session is ready
        provider: Provider,
    },

    /// One generation attempt started
    AttemptStarted {
        /// Artifact name
        artifact: String,
        /// 1-based attempt number
        attempt: u32,
    },

    /// One generation attempt failed
    AttemptFailed {
        /// Artifact name
        artifact: String,
        /// 1-based attempt number
        attempt: u32,
        /// Machine-readable error code
        error: String,
    },

    /// A stable download was located for the in-flight attempt
    DownloadDetected {
        /// Artifact name
        artifact: String,
        /// Path of the stable download
        path: PathBuf,
    },

    /// Artifact fully materialized in the store
    ArtifactComplete {
        /// Artifact name
        artifact: String,
        /// Final output path
        path: PathBuf,
    },

    /// Artifact exhausted its attempts
    ArtifactFailed {
        /// Artifact name
        artifact: String,
        /// Machine-readable code of the last error
        error: String,
        /// Number of attempts consumed
        attempts: u32,
    },

    /// Artifact excluded at queue-build time
    ArtifactSkipped {
        /// Artifact name
        artifact: String,
        /// Why it was excluded
        reason: SkipReason,
    },

    /// The run finished and the summary is final
    RunComplete {
        /// Count of successful artifacts
        succeeded: usize,
        /// Count of failed artifacts
        failed: usize,
        /// Count of skipped artifacts
        skipped: usize,
    },
}
