//! Carrying out backups
//!
//! ```text
//! execute(strategy):
//!   resolve targets → measure → space check (free ≥ 2× size)
//!     → copy into backup_<id>/ → metadata.json → zip (optional)
//!     → one BackupRecord → retention sweep
//! ```
//!
//! Nothing is written to the destination before the space check passes.
//! Executions are serialized; a second `execute` waits for the first.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use super::space::SpaceProbe;
use super::{BackupRecord, BackupType, Strategy};
use crate::config::BackupConfig;
use crate::error::BackupError;
use crate::storage::StorageBackend;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const METADATA_FILE: &str = "metadata.json";

/// Result of one `execute` call. Both variants carry the persisted record.
#[derive(Debug)]
pub enum BackupOutcome {
    Succeeded { record: BackupRecord, pruned: usize },
    Failed { record: BackupRecord, error: BackupError },
}

impl BackupOutcome {
    pub fn record(&self) -> &BackupRecord {
        match self {
            BackupOutcome::Succeeded { record, .. } | BackupOutcome::Failed { record, .. } => record,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BackupOutcome::Succeeded { .. })
    }
}

#[derive(Debug, Serialize)]
struct BackupMetadata<'a> {
    backup_id: &'a str,
    timestamp: DateTime<Utc>,
    strategy: &'a Strategy,
    targets: &'a [PathBuf],
    total_files: usize,
    total_bytes: u64,
}

struct Artifact {
    path: PathBuf,
    bytes: u64,
}

pub struct BackupExecutor {
    storage: Arc<dyn StorageBackend>,
    probe: Arc<dyn SpaceProbe>,
    sources: Vec<PathBuf>,
    destination: PathBuf,
    retention_days: u32,
    lock: Mutex<()>,
}

impl BackupExecutor {
    pub fn new(
        config: &BackupConfig,
        storage: Arc<dyn StorageBackend>,
        probe: Arc<dyn SpaceProbe>,
    ) -> Self {
        Self {
            storage,
            probe,
            sources: config.sources.clone(),
            destination: config.destination.clone(),
            retention_days: config.retention_days,
            lock: Mutex::new(()),
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    #[instrument(skip_all, fields(backup_type = %strategy.backup_type))]
    pub async fn execute(&self, strategy: &Strategy) -> BackupOutcome {
        let _guard = self.lock.lock().await;

        let started_at = Utc::now();
        let clock = Instant::now();
        let id = started_at.format("%Y%m%d_%H%M%S_%6f").to_string();
        info!("starting {} backup {id}", strategy.backup_type);

        let mut record = BackupRecord {
            id: id.clone(),
            started_at,
            duration_secs: 0.0,
            backup_type: strategy.backup_type,
            targets: vec![],
            size_mb: 0.0,
            success: false,
            error: None,
            path: None,
        };

        let result = self.run(&id, started_at, strategy, &mut record).await;
        record.duration_secs = clock.elapsed().as_secs_f64();

        let failure = match result {
            Ok(artifact) => {
                record.success = true;
                record.size_mb = artifact.bytes as f64 / BYTES_PER_MB;
                record.path = Some(artifact.path);
                info!(
                    "backup {id} finished: {:.2}MB in {:.1}s",
                    record.size_mb, record.duration_secs
                );
                None
            }
            Err(e) => {
                warn!("backup {id} failed: {e}");
                record.error = Some(e.to_string());
                Some(e)
            }
        };

        if let Err(e) = self.storage.insert_backup_record(&record).await {
            error!("could not persist backup record {id}: {e}");
        }

        match failure {
            None => {
                let pruned = match self.apply_retention(Utc::now()).await {
                    Ok(pruned) => pruned,
                    Err(e) => {
                        warn!("retention sweep failed: {e}");
                        0
                    }
                };
                BackupOutcome::Succeeded { record, pruned }
            }
            Some(error) => BackupOutcome::Failed { record, error },
        }
    }

    async fn run(
        &self,
        id: &str,
        started_at: DateTime<Utc>,
        strategy: &Strategy,
        record: &mut BackupRecord,
    ) -> Result<Artifact, BackupError> {
        let targets = self.resolve_targets(strategy.backup_type).await?;
        record.targets = targets.clone();

        let destination = self.destination.clone();
        let (files, bytes) = {
            let targets = targets.clone();
            let destination = destination.clone();
            tokio::task::spawn_blocking(move || measure(&targets, &destination)).await??
        };

        let required_mb = 2.0 * bytes as f64 / BYTES_PER_MB;
        match self.probe.available_mb(&destination) {
            Some(available_mb) if available_mb < required_mb => {
                return Err(BackupError::Space {
                    required_mb,
                    available_mb,
                });
            }
            Some(_) => {}
            None => warn!("free space at {} is unknown", destination.display()),
        }
        debug!("{files} files, {bytes} bytes to back up");

        let backup_dir = destination.join(format!("backup_{id}"));
        let sources = self.sources.clone();
        let metadata = serde_json::to_vec_pretty(&BackupMetadata {
            backup_id: id,
            timestamp: started_at,
            strategy,
            targets: &targets,
            total_files: files,
            total_bytes: bytes,
        })
        .map_err(io::Error::other)?;

        let compress = strategy.compress;
        tokio::task::spawn_blocking(move || {
            let copied = copy_targets(&targets, &sources, &backup_dir, &destination)
                .and_then(|()| fs::write(backup_dir.join(METADATA_FILE), metadata));
            if let Err(e) = copied {
                // leave no half-written backup behind
                let _ = fs::remove_dir_all(&backup_dir);
                return Err(BackupError::from(e));
            }

            if compress {
                let archive = backup_dir.with_extension("zip");
                match zip_dir(&backup_dir, &archive) {
                    Ok(()) => {
                        fs::remove_dir_all(&backup_dir)?;
                        let bytes = fs::metadata(&archive)?.len();
                        return Ok(Artifact {
                            path: archive,
                            bytes,
                        });
                    }
                    Err(e) => {
                        warn!("compression failed, keeping uncompressed backup: {e}");
                        let _ = fs::remove_file(&archive);
                    }
                }
            }

            let bytes = dir_size(&backup_dir)?;
            Ok(Artifact {
                path: backup_dir,
                bytes,
            })
        })
        .await?
    }

    /// Paths to copy for a backup of the given type, sorted and deduplicated
    async fn resolve_targets(&self, backup_type: BackupType) -> Result<Vec<PathBuf>, BackupError> {
        let reference = match backup_type {
            BackupType::Full => None,
            BackupType::Incremental => self.storage.latest_successful_backup().await?,
            BackupType::Differential => self.storage.latest_full_backup().await?,
        };

        let Some(reference) = reference else {
            if backup_type != BackupType::Full {
                debug!("no reference backup for {backup_type}, copying the roots");
            }
            return Ok(self
                .sources
                .iter()
                .filter(|source| source.exists())
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect());
        };

        let since = SystemTime::from(reference.started_at);
        let sources = self.sources.clone();
        let destination = self.destination.clone();
        let targets = tokio::task::spawn_blocking(move || {
            let mut changed = BTreeSet::new();
            for source in &sources {
                collect_modified(source, since, &destination, &mut changed)?;
            }
            Ok::<_, io::Error>(changed)
        })
        .await??;

        debug!(
            "{} files changed since backup {}",
            targets.len(),
            reference.id
        );
        Ok(targets.into_iter().collect())
    }

    /// Delete successful backups past the retention horizon together with their artifacts
    #[instrument(skip(self))]
    pub async fn apply_retention(&self, now: DateTime<Utc>) -> Result<usize, BackupError> {
        let cutoff = now - TimeDelta::days(self.retention_days as i64);
        let expired = self.storage.successful_backups_older_than(cutoff).await?;

        for record in &expired {
            let Some(path) = &record.path else {
                continue;
            };
            let removed = if path.is_dir() {
                fs::remove_dir_all(path)
            } else {
                fs::remove_file(path)
            };
            match removed {
                Ok(()) => debug!("removed expired backup {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("could not remove {}: {e}", path.display()),
            }
        }

        let deleted = self.storage.delete_backup_records_older_than(cutoff).await?;
        if deleted > 0 {
            info!("retention removed {deleted} backup(s) older than {cutoff}");
        }
        Ok(deleted)
    }

    /// Restore a successful backup into `destination`
    #[instrument(skip(self, destination))]
    pub async fn restore(&self, backup_id: &str, destination: &Path) -> Result<usize, BackupError> {
        let record = self
            .storage
            .backup_record(backup_id)
            .await?
            .filter(|record| record.success)
            .ok_or_else(|| BackupError::NotFound(backup_id.to_string()))?;
        let artifact = record
            .path
            .filter(|path| path.exists())
            .ok_or_else(|| BackupError::NotFound(backup_id.to_string()))?;

        let destination = destination.to_path_buf();
        let restored = tokio::task::spawn_blocking(move || {
            fs::create_dir_all(&destination)?;
            if artifact.is_dir() {
                copy_dir(&artifact, &destination, None)
                    .map_err(BackupError::from)
            } else {
                unzip(&artifact, &destination)
            }
        })
        .await??;

        info!("restored {restored} file(s) from backup {backup_id}");
        Ok(restored)
    }
}

fn is_excluded(path: &Path, exclude: &Path) -> bool {
    match (path.canonicalize(), exclude.canonicalize()) {
        (Ok(path), Ok(exclude)) => path.starts_with(exclude),
        _ => false,
    }
}

/// Number of files and total bytes under the targets
fn measure(targets: &[PathBuf], exclude: &Path) -> io::Result<(usize, u64)> {
    let mut files = 0;
    let mut bytes = 0;
    for target in targets {
        walk(target, exclude, &mut |_, metadata| {
            files += 1;
            bytes += metadata.len();
            Ok(())
        })?;
    }
    Ok((files, bytes))
}

fn dir_size(dir: &Path) -> io::Result<u64> {
    let mut bytes = 0;
    walk(dir, Path::new(""), &mut |_, metadata| {
        bytes += metadata.len();
        Ok(())
    })?;
    Ok(bytes)
}

/// Visit every regular file below `path`. Symlinks are not followed.
fn walk(
    path: &Path,
    exclude: &Path,
    visit: &mut dyn FnMut(&Path, &fs::Metadata) -> io::Result<()>,
) -> io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_file() {
        return visit(path, &metadata);
    }
    if !metadata.is_dir() || is_excluded(path, exclude) {
        return Ok(());
    }

    for entry in fs::read_dir(path)? {
        walk(&entry?.path(), exclude, visit)?;
    }
    Ok(())
}

fn collect_modified(
    root: &Path,
    since: SystemTime,
    exclude: &Path,
    out: &mut BTreeSet<PathBuf>,
) -> io::Result<()> {
    if !root.exists() {
        return Ok(());
    }
    walk(root, exclude, &mut |path, metadata| {
        if metadata.modified()? > since {
            out.insert(path.to_path_buf());
        }
        Ok(())
    })
}

/// Location of `target` inside a backup: the root's own name followed by the
/// path relative to that root
fn relative_destination(target: &Path, sources: &[PathBuf]) -> PathBuf {
    let root = sources
        .iter()
        .filter(|source| target.starts_with(source))
        .max_by_key(|source| source.as_os_str().len());

    match root {
        Some(root) => {
            let name = root
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("root"));
            name.join(target.strip_prefix(root).unwrap_or(Path::new("")))
        }
        None => target
            .components()
            .filter(|component| matches!(component, Component::Normal(_)))
            .collect(),
    }
}

fn copy_targets(
    targets: &[PathBuf],
    sources: &[PathBuf],
    backup_dir: &Path,
    exclude: &Path,
) -> io::Result<()> {
    fs::create_dir_all(backup_dir)?;
    for target in targets {
        let destination = backup_dir.join(relative_destination(target, sources));
        if target.is_dir() {
            copy_dir(target, &destination, Some(exclude))?;
        } else {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(target, &destination)?;
        }
    }
    Ok(())
}

fn copy_dir(from: &Path, to: &Path, exclude: Option<&Path>) -> io::Result<usize> {
    let mut copied = 0;
    fs::create_dir_all(to)?;
    walk(from, exclude.unwrap_or(Path::new("")), &mut |path, _| {
        let relative = path.strip_prefix(from).map_err(io::Error::other)?;
        let destination = to.join(relative);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(path, destination)?;
        copied += 1;
        Ok(())
    })?;
    Ok(copied)
}

fn zip_dir(dir: &Path, archive: &Path) -> Result<(), BackupError> {
    let file = fs::File::create(archive)?;
    let mut writer = zip::ZipWriter::new(file);
    let options: zip::write::SimpleFileOptions = zip::write::FileOptions::default();

    let mut entries = vec![];
    walk(dir, Path::new(""), &mut |path, _| {
        entries.push(path.to_path_buf());
        Ok(())
    })?;

    for path in entries {
        let relative = path
            .strip_prefix(dir)
            .map_err(|e| BackupError::Archive(e.to_string()))?;
        let name = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        writer.start_file(name, options)?;
        let mut source = fs::File::open(&path)?;
        io::copy(&mut source, &mut writer)?;
    }

    writer.finish()?;
    Ok(())
}

fn unzip(archive: &Path, destination: &Path) -> Result<usize, BackupError> {
    let file = fs::File::open(archive)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut restored = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| BackupError::Archive(format!("unsafe entry path: {}", entry.name())))?;
        let outpath = destination.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = fs::File::create(&outpath)?;
        io::copy(&mut entry, &mut outfile)?;
        restored += 1;
    }

    Ok(restored)
}
