//! Archive downloads for enabled mods
//!
//! Each enabled item's latest release is written to `<target>/<file_name>`.
//! Existing files are skipped, so re-running a batch only fetches what is
//! missing. Failures are collected per item and never stop sibling downloads.
//! With a [`DependencyResolver`] attached, required dependencies of the
//! enabled mods are resolved and downloaded in the same batch.

pub mod resolver;

pub use resolver::{DependencyResolver, Resolution, ResolvedRelease, UnresolvedDependency};

use crate::catalog::Catalog;
use crate::config::ServerCredentials;
use crate::error::{Result, SyncError};
use crate::registry::ReleaseRecord;
use async_trait::async_trait;
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Suffix for archives still being written.
const PART_SUFFIX: &str = ".part";

/// Writes one release archive to a local path.
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    /// Stream the archive for `release` into `dest`, returning bytes written.
    async fn fetch_archive(
        &self,
        release: &ReleaseRecord,
        credentials: &ServerCredentials,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64>;
}

/// What happened to one enabled mod.
#[derive(Debug)]
pub enum DownloadOutcome {
    Downloaded { bytes: u64 },
    Skipped { reason: String },
    Failed(SyncError),
}

#[derive(Debug)]
pub struct DownloadItemReport {
    pub name: String,
    pub file_name: String,
    /// Set for dependencies pulled in by another mod.
    pub required_by: Option<String>,
    pub outcome: DownloadOutcome,
}

/// Per-item results: enabled mods in catalog order, then dependencies.
/// Failures are `Download` errors wrapping their cause, or `Cancelled`.
#[derive(Debug, Default)]
pub struct DownloadReport {
    pub items: Vec<DownloadItemReport>,
}

impl DownloadReport {
    pub fn downloaded(&self) -> usize {
        self.count(|o| matches!(o, DownloadOutcome::Downloaded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, DownloadOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DownloadOutcome::Failed(_)))
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &SyncError)> {
        self.items.iter().filter_map(|item| match &item.outcome {
            DownloadOutcome::Failed(e) => Some((item.name.as_str(), e)),
            _ => None,
        })
    }

    fn count(&self, f: impl Fn(&DownloadOutcome) -> bool) -> usize {
        self.items.iter().filter(|item| f(&item.outcome)).count()
    }
}

/// Downloads the enabled part of a catalog through a bounded worker pool.
#[derive(Clone)]
pub struct Downloader {
    fetcher: Arc<dyn ArchiveFetcher>,
    resolver: Option<Arc<DependencyResolver>>,
    max_concurrent: usize,
    verify_sha1: bool,
}

/// Everything a worker needs for one item, owned so it can move into a task.
struct DownloadJob {
    name: String,
    release: ReleaseRecord,
    required_by: Option<String>,
}

impl Downloader {
    pub fn new(fetcher: Arc<dyn ArchiveFetcher>, max_concurrent: usize, verify_sha1: bool) -> Self {
        Self {
            fetcher,
            resolver: None,
            max_concurrent: max_concurrent.max(1),
            verify_sha1,
        }
    }

    /// Also download the required dependencies of every enabled mod.
    pub fn with_dependencies(mut self, resolver: DependencyResolver) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Download every enabled item in `catalog` into `target_dir`.
    ///
    /// Only a failure to create `target_dir`, or cancellation while resolving
    /// dependencies, is returned as an error; item failures end up in the report.
    pub async fn download_enabled(
        &self,
        catalog: &Catalog,
        target_dir: &Path,
        credentials: &ServerCredentials,
        cancel: &CancellationToken,
    ) -> Result<DownloadReport> {
        tokio::fs::create_dir_all(target_dir)
            .await
            .map_err(|e| SyncError::io(target_dir, e))?;

        let mut jobs: Vec<DownloadJob> = catalog
            .enabled()
            .map(|item| DownloadJob {
                name: item.name().to_string(),
                release: item.record.latest_release().clone(),
                required_by: None,
            })
            .collect();

        let mut unresolved = Vec::new();
        if let Some(resolver) = &self.resolver {
            let roots: Vec<(String, ReleaseRecord)> = jobs
                .iter()
                .map(|job| (job.name.clone(), job.release.clone()))
                .collect();
            let resolution = resolver.resolve(&roots, cancel).await?;
            if !resolution.releases.is_empty() {
                tracing::info!("Adding {} required dependencies", resolution.releases.len());
            }
            jobs.extend(resolution.releases.into_iter().map(|dep| DownloadJob {
                name: dep.name,
                release: dep.release,
                required_by: Some(dep.required_by),
            }));
            unresolved = resolution.unresolved;
        }

        tracing::info!(
            "Downloading {} mods to {} ({} at a time)",
            jobs.len(),
            target_dir.display(),
            self.max_concurrent
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(jobs.len());

        for job in jobs {
            let semaphore = Arc::clone(&semaphore);
            let worker = self.clone();
            let target_dir = target_dir.to_path_buf();
            let credentials = credentials.clone();
            let cancel = cancel.clone();
            let name = job.name.clone();
            let file_name = job.release.file_name.clone();
            let required_by = job.required_by.clone();

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(e) => return DownloadOutcome::Failed(SyncError::download(&job.name, e)),
                };
                worker
                    .download_one(&job, &target_dir, &credentials, &cancel)
                    .await
            });
            handles.push((name, file_name, required_by, handle));
        }

        let mut report = DownloadReport::default();
        for (name, file_name, required_by, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => DownloadOutcome::Failed(SyncError::download(&name, e)),
            };
            match &outcome {
                DownloadOutcome::Downloaded { bytes } => {
                    tracing::info!("Downloaded {} ({} bytes)", file_name, bytes)
                }
                DownloadOutcome::Skipped { reason } => {
                    tracing::debug!("Skipped {}: {}", name, reason)
                }
                DownloadOutcome::Failed(e) => tracing::error!("Failed to download {}: {}", name, e),
            }
            report.items.push(DownloadItemReport {
                name,
                file_name,
                required_by,
                outcome,
            });
        }

        for dep in unresolved {
            tracing::error!("Unresolved dependency {} of {}: {}", dep.name, dep.required_by, dep.error);
            report.items.push(DownloadItemReport {
                file_name: String::new(),
                outcome: DownloadOutcome::Failed(dep.error.into_download(&dep.name)),
                name: dep.name,
                required_by: Some(dep.required_by),
            });
        }

        tracing::info!(
            "Download batch finished: {} downloaded, {} skipped, {} failed",
            report.downloaded(),
            report.skipped(),
            report.failed()
        );
        Ok(report)
    }

    async fn download_one(
        &self,
        job: &DownloadJob,
        target_dir: &Path,
        credentials: &ServerCredentials,
        cancel: &CancellationToken,
    ) -> DownloadOutcome {
        if job.name == "base" {
            return DownloadOutcome::Skipped {
                reason: "ships with the game".to_string(),
            };
        }

        let dest = match archive_path(target_dir, &job.name, &job.release) {
            Ok(dest) => dest,
            Err(e) => return DownloadOutcome::Failed(e),
        };

        match tokio::fs::try_exists(&dest).await {
            Ok(true) => {
                return DownloadOutcome::Skipped {
                    reason: "already present".to_string(),
                }
            }
            Ok(false) => {}
            Err(e) => return DownloadOutcome::Failed(SyncError::io(&dest, e).into_download(&job.name)),
        }

        if cancel.is_cancelled() {
            return DownloadOutcome::Failed(SyncError::Cancelled);
        }

        let part = part_path(&dest);
        match self.fetch_and_commit(job, &part, &dest, credentials, cancel).await {
            Ok(bytes) => DownloadOutcome::Downloaded { bytes },
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                DownloadOutcome::Failed(e.into_download(&job.name))
            }
        }
    }

    async fn fetch_and_commit(
        &self,
        job: &DownloadJob,
        part: &Path,
        dest: &Path,
        credentials: &ServerCredentials,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let bytes = self
            .fetcher
            .fetch_archive(&job.release, credentials, part, cancel)
            .await?;

        if self.verify_sha1 && !job.release.sha1.is_empty() {
            let actual = sha1_file(part).await?;
            if !actual.eq_ignore_ascii_case(&job.release.sha1) {
                return Err(SyncError::download(
                    &job.name,
                    format!(
                        "SHA-1 mismatch for {}: expected {}, got {}",
                        job.release.file_name, job.release.sha1, actual
                    ),
                ));
            }
        }

        tokio::fs::rename(part, dest)
            .await
            .map_err(|e| SyncError::io(dest, e))?;
        Ok(bytes)
    }
}

/// `<target_dir>/<file_name>`, rejecting releases without a plain file name.
fn archive_path(target_dir: &Path, name: &str, release: &ReleaseRecord) -> Result<PathBuf> {
    if release.is_empty() {
        return Err(SyncError::download(name, "no release available"));
    }
    let file_name = Path::new(&release.file_name);
    if file_name.file_name() != Some(file_name.as_os_str()) {
        return Err(SyncError::download(
            name,
            format!("refusing unsafe file name '{}'", release.file_name),
        ));
    }
    Ok(target_dir.join(file_name))
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(PART_SUFFIX);
    dest.with_file_name(name)
}

/// Lowercase hex SHA-1 of a file.
pub async fn sha1_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| SyncError::io(path, e))?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await.map_err(|e| SyncError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Delete every `<name>_<version>.zip` in `target_dir`. Returns the removed paths.
///
/// A missing directory removes nothing.
pub async fn remove_archives(target_dir: &Path, name: &str) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(target_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(SyncError::io(target_dir, e)),
    };

    let mut removed = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| SyncError::io(target_dir, e))?
    {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if !is_archive_of(file_name, name) {
            continue;
        }
        let path = entry.path();
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| SyncError::io(&path, e))?;
        tracing::info!("Removed {}", path.display());
        removed.push(path);
    }

    removed.sort();
    Ok(removed)
}

/// `bobplates_1.1.5.zip` belongs to `bobplates`, not to `bob`.
fn is_archive_of(file_name: &str, name: &str) -> bool {
    file_name
        .strip_prefix(name)
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|rest| rest.strip_suffix(".zip"))
        .map(|version| {
            !version.is_empty() && version.chars().all(|c| c.is_ascii_digit() || c == '.')
        })
        .unwrap_or(false)
}
