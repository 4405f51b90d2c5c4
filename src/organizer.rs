//! File organization for completed downloads
//!
//! Takes a located, stable download and materializes it as the artifact's
//! durable output: `{artifacts_dir}/{output_name}.{extension}`. The move is
//! performed via a temporary file inside the destination directory followed
//! by an atomic rename, so the destination never observably contains a
//! partial file. Existing outputs are backed up with a timestamp before
//! being overwritten under the force-regeneration policy.

use crate::error::{Error, OrganizeError, Result};
use crate::types::ArtifactSpec;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Subdirectory of the artifact store holding timestamped backups
const BACKUP_DIR: &str = "backups";

/// Maximum number of suffix attempts when a backup name collides
const MAX_BACKUP_ATTEMPTS: u32 = 999;

/// What to do when the destination file already exists
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// The caller should never reach the organizer with an occupied
    /// destination; treat it as an error
    SkipExisting,
    /// Back up the existing file with a timestamp, then overwrite
    ForceRegenerate,
}

/// Aggregate information about the artifact store
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArtifactStoreStats {
    /// Number of stored artifacts (excluding backups)
    pub total_count: usize,
    /// Total size of stored artifacts in bytes
    pub total_size_bytes: u64,
    /// Artifact counts grouped by lowercase extension
    pub by_extension: HashMap<String, usize>,
}

/// Handles file operations for downloaded artifacts
pub struct FileOrganizer {
    download_dir: PathBuf,
    artifacts_dir: PathBuf,
}

impl FileOrganizer {
    /// Create an organizer, creating both directories if needed
    ///
    /// # Errors
    /// Returns an I/O error when either directory cannot be created; this is
    /// run-level fatal and happens before any artifact is attempted.
    pub async fn new(
        download_dir: impl Into<PathBuf>,
        artifacts_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let download_dir = download_dir.into();
        let artifacts_dir = artifacts_dir.into();

        tokio::fs::create_dir_all(&download_dir).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "failed to create download directory '{}': {}",
                    download_dir.display(),
                    e
                ),
            ))
        })?;
        tokio::fs::create_dir_all(&artifacts_dir).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "failed to create artifacts directory '{}': {}",
                    artifacts_dir.display(),
                    e
                ),
            ))
        })?;

        debug!(
            download_dir = %download_dir.display(),
            artifacts_dir = %artifacts_dir.display(),
            "file organizer ready"
        );

        Ok(Self {
            download_dir,
            artifacts_dir,
        })
    }

    /// The watched download directory
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// The artifact store directory
    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    /// Destination path for an artifact's output
    pub fn artifact_path(&self, spec: &ArtifactSpec) -> PathBuf {
        self.artifacts_dir.join(spec.filename())
    }

    /// Whether the artifact's destination file already exists
    pub fn artifact_exists(&self, spec: &ArtifactSpec) -> bool {
        self.artifact_path(spec).exists()
    }

    /// Materialize a stable download as the artifact's durable output
    ///
    /// Copies `source` to a hidden temporary path inside the destination
    /// directory, renames it into place, then removes the source. Under
    /// [`OverwritePolicy::ForceRegenerate`] an existing destination is first
    /// backed up to `backups/{stem}_{timestamp}.{ext}`.
    ///
    /// # Errors
    /// Returns [`OrganizeError`] variants for a missing source, a collision
    /// under the skip-existing policy, or backup/move failures.
    pub async fn organize(
        &self,
        source: &Path,
        spec: &ArtifactSpec,
        policy: OverwritePolicy,
    ) -> Result<PathBuf> {
        if !source.exists() {
            return Err(OrganizeError::SourceMissing {
                path: source.to_path_buf(),
            }
            .into());
        }

        let dest = self.artifact_path(spec);
        if dest.exists() {
            match policy {
                OverwritePolicy::SkipExisting => {
                    // Queue construction excludes existing outputs; reaching
                    // this point means the file appeared mid-run.
                    return Err(OrganizeError::Collision { path: dest }.into());
                }
                OverwritePolicy::ForceRegenerate => {
                    let backup = self.back_up_existing(&dest, spec).await?;
                    info!(
                        artifact = %spec.name,
                        backup = %backup.display(),
                        "backed up existing output"
                    );
                }
            }
        }

        // Stage inside the destination directory so the final rename is
        // atomic; the destination path never holds a partial file.
        let temp = self.artifacts_dir.join(format!(".{}.partial", spec.filename()));

        tokio::fs::copy(source, &temp)
            .await
            .map_err(|e| OrganizeError::MoveFailed {
                source_path: source.to_path_buf(),
                dest: dest.clone(),
                reason: format!("staging copy failed: {e}"),
            })?;

        if let Err(e) = tokio::fs::rename(&temp, &dest).await {
            // Leave no stray staging file behind
            if let Err(cleanup) = tokio::fs::remove_file(&temp).await {
                warn!(path = %temp.display(), error = %cleanup, "failed to remove staging file");
            }
            return Err(OrganizeError::MoveFailed {
                source_path: source.to_path_buf(),
                dest,
                reason: format!("rename failed: {e}"),
            }
            .into());
        }

        // The output is durable; a leftover download is only worth a warning
        if let Err(e) = tokio::fs::remove_file(source).await {
            warn!(path = %source.display(), error = %e, "failed to remove source download");
        }

        info!(artifact = %spec.name, path = %dest.display(), "artifact organized");
        Ok(dest)
    }

    /// Copy an existing output into the backup directory with a timestamped
    /// name, uniquified if necessary
    async fn back_up_existing(&self, existing: &Path, spec: &ArtifactSpec) -> Result<PathBuf> {
        let backup_dir = self.artifacts_dir.join(BACKUP_DIR);
        tokio::fs::create_dir_all(&backup_dir)
            .await
            .map_err(|e| OrganizeError::BackupFailed {
                path: existing.to_path_buf(),
                reason: format!("failed to create backup directory: {e}"),
            })?;

        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let stem = format!("{}_{}", spec.output_name, timestamp);
        let backup = unique_backup_path(&backup_dir, &stem, &spec.extension)?;

        tokio::fs::copy(existing, &backup)
            .await
            .map_err(|e| OrganizeError::BackupFailed {
                path: existing.to_path_buf(),
                reason: e.to_string(),
            })?;

        Ok(backup)
    }

    /// Remove all regular files from the download directory
    ///
    /// Called before each generation attempt so stale downloads cannot be
    /// mistaken for the new one. Subdirectories are left alone.
    pub async fn clear_download_dir(&self) -> Result<()> {
        let mut entries = tokio::fs::read_dir(&self.download_dir).await?;
        let mut removed = 0usize;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_file() {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %e, "failed to clear download");
                } else {
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            debug!(removed, "cleared download directory");
        }
        Ok(())
    }

    /// List stored artifact filenames, sorted (backups excluded)
    pub async fn list_artifacts(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.artifacts_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_file()
                && let Some(name) = path.file_name().and_then(|n| n.to_str())
                && !name.starts_with('.')
            {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    /// Aggregate counts and sizes for the artifact store
    pub async fn store_stats(&self) -> Result<ArtifactStoreStats> {
        let mut stats = ArtifactStoreStats::default();

        for name in self.list_artifacts().await? {
            let path = self.artifacts_dir.join(&name);
            let metadata = tokio::fs::metadata(&path).await?;

            stats.total_count += 1;
            stats.total_size_bytes += metadata.len();

            let ext = Path::new(&name)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_lowercase();
            *stats.by_extension.entry(ext).or_insert(0) += 1;
        }

        Ok(stats)
    }
}

/// Find an unused backup path, appending ` (1)`, ` (2)`, ... on collisions
fn unique_backup_path(dir: &Path, stem: &str, extension: &str) -> Result<PathBuf> {
    let candidate = dir.join(format!("{stem}.{extension}"));
    if !candidate.exists() {
        return Ok(candidate);
    }

    for i in 1..=MAX_BACKUP_ATTEMPTS {
        let candidate = dir.join(format!("{stem} ({i}).{extension}"));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(OrganizeError::BackupFailed {
        path: dir.join(format!("{stem}.{extension}")),
        reason: format!("no unique backup name after {MAX_BACKUP_ATTEMPTS} attempts"),
    }
    .into())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArtifactKind, Provider};
    use tempfile::TempDir;

    async fn organizer_in(root: &TempDir) -> FileOrganizer {
        FileOrganizer::new(root.path().join("downloads"), root.path().join("artifacts"))
            .await
            .unwrap()
    }

    fn image_spec(name: &str) -> ArtifactSpec {
        ArtifactSpec::new(name, ArtifactKind::Image, Provider::Gemini, "a prompt", 0)
    }

    #[tokio::test]
    async fn new_creates_both_directories() {
        let root = TempDir::new().unwrap();
        let organizer = organizer_in(&root).await;

        assert!(organizer.download_dir().is_dir());
        assert!(organizer.artifacts_dir().is_dir());
    }

    #[tokio::test]
    async fn organize_moves_download_into_store() {
        let root = TempDir::new().unwrap();
        let organizer = organizer_in(&root).await;
        let spec = image_spec("Company Logo");

        let source = organizer.download_dir().join("untitled-download.png");
        std::fs::write(&source, b"image-bytes").unwrap();

        let dest = organizer
            .organize(&source, &spec, OverwritePolicy::SkipExisting)
            .await
            .unwrap();

        assert_eq!(dest, organizer.artifacts_dir().join("company_logo.png"));
        assert_eq!(std::fs::read(&dest).unwrap(), b"image-bytes");
        assert!(!source.exists(), "source download should be cleaned up");
    }

    #[tokio::test]
    async fn organize_leaves_no_staging_file_behind() {
        let root = TempDir::new().unwrap();
        let organizer = organizer_in(&root).await;
        let spec = image_spec("Logo");

        let source = organizer.download_dir().join("dl.png");
        std::fs::write(&source, b"bytes").unwrap();

        organizer
            .organize(&source, &spec, OverwritePolicy::SkipExisting)
            .await
            .unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(organizer.artifacts_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with('.'))
            .collect();
        assert!(leftovers.is_empty(), "staging files left behind: {leftovers:?}");
    }

    #[tokio::test]
    async fn missing_source_is_reported() {
        let root = TempDir::new().unwrap();
        let organizer = organizer_in(&root).await;
        let spec = image_spec("Logo");

        let result = organizer
            .organize(
                &organizer.download_dir().join("never-downloaded.png"),
                &spec,
                OverwritePolicy::SkipExisting,
            )
            .await;

        assert!(matches!(
            result,
            Err(Error::Organize(OrganizeError::SourceMissing { .. }))
        ));
    }

    #[tokio::test]
    async fn collision_under_skip_policy_is_an_error() {
        let root = TempDir::new().unwrap();
        let organizer = organizer_in(&root).await;
        let spec = image_spec("Logo");

        std::fs::write(organizer.artifact_path(&spec), b"existing").unwrap();
        let source = organizer.download_dir().join("dl.png");
        std::fs::write(&source, b"new").unwrap();

        let result = organizer
            .organize(&source, &spec, OverwritePolicy::SkipExisting)
            .await;

        assert!(matches!(
            result,
            Err(Error::Organize(OrganizeError::Collision { .. }))
        ));
        // The existing output must be untouched
        assert_eq!(
            std::fs::read(organizer.artifact_path(&spec)).unwrap(),
            b"existing"
        );
    }

    #[tokio::test]
    async fn force_policy_backs_up_then_overwrites() {
        let root = TempDir::new().unwrap();
        let organizer = organizer_in(&root).await;
        let spec = image_spec("Logo");

        std::fs::write(organizer.artifact_path(&spec), b"old-version").unwrap();
        let source = organizer.download_dir().join("dl.png");
        std::fs::write(&source, b"new-version").unwrap();

        let dest = organizer
            .organize(&source, &spec, OverwritePolicy::ForceRegenerate)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"new-version");

        let backup_dir = organizer.artifacts_dir().join(BACKUP_DIR);
        let backups: Vec<_> = std::fs::read_dir(&backup_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(backups.len(), 1);
        assert!(
            backups[0].starts_with("logo_") && backups[0].ends_with(".png"),
            "unexpected backup name: {}",
            backups[0]
        );
        assert_eq!(
            std::fs::read(backup_dir.join(&backups[0])).unwrap(),
            b"old-version"
        );
    }

    #[tokio::test]
    async fn repeated_overwrites_keep_every_backup() {
        let root = TempDir::new().unwrap();
        let organizer = organizer_in(&root).await;
        let spec = image_spec("Logo");

        for generation in 0..3u8 {
            let source = organizer.download_dir().join("dl.png");
            std::fs::write(&source, [generation]).unwrap();
            organizer
                .organize(&source, &spec, OverwritePolicy::ForceRegenerate)
                .await
                .unwrap();
        }

        // First organize had no existing file; the next two each backed one up
        let backup_dir = organizer.artifacts_dir().join(BACKUP_DIR);
        let count = std::fs::read_dir(&backup_dir).unwrap().count();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn clear_download_dir_removes_files_only() {
        let root = TempDir::new().unwrap();
        let organizer = organizer_in(&root).await;

        std::fs::write(organizer.download_dir().join("a.png"), b"a").unwrap();
        std::fs::write(organizer.download_dir().join("b.tmp"), b"b").unwrap();
        std::fs::create_dir(organizer.download_dir().join("keep-me")).unwrap();

        organizer.clear_download_dir().await.unwrap();

        let remaining: Vec<_> = std::fs::read_dir(organizer.download_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(remaining, vec!["keep-me".to_string()]);
    }

    #[tokio::test]
    async fn list_artifacts_is_sorted_and_skips_hidden_files() {
        let root = TempDir::new().unwrap();
        let organizer = organizer_in(&root).await;

        std::fs::write(organizer.artifacts_dir().join("b.txt"), b"b").unwrap();
        std::fs::write(organizer.artifacts_dir().join("a.png"), b"a").unwrap();
        std::fs::write(organizer.artifacts_dir().join(".a.png.partial"), b"x").unwrap();

        let names = organizer.list_artifacts().await.unwrap();
        assert_eq!(names, vec!["a.png".to_string(), "b.txt".to_string()]);
    }

    #[tokio::test]
    async fn store_stats_counts_by_extension() {
        let root = TempDir::new().unwrap();
        let organizer = organizer_in(&root).await;

        std::fs::write(organizer.artifacts_dir().join("a.png"), b"1234").unwrap();
        std::fs::write(organizer.artifacts_dir().join("b.PNG"), b"12").unwrap();
        std::fs::write(organizer.artifacts_dir().join("c.txt"), b"1").unwrap();

        let stats = organizer.store_stats().await.unwrap();
        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.total_size_bytes, 7);
        assert_eq!(stats.by_extension.get("png"), Some(&2));
        assert_eq!(stats.by_extension.get("txt"), Some(&1));
    }

    #[test]
    fn unique_backup_path_appends_counter() {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("logo_20260101_000000.png"), b"x").unwrap();
        std::fs::write(root.path().join("logo_20260101_000000 (1).png"), b"x").unwrap();

        let path = unique_backup_path(root.path(), "logo_20260101_000000", "png").unwrap();
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "logo_20260101_000000 (2).png"
        );
    }
}
