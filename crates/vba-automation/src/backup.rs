//! Backup manager (C9): timestamped copies of a container, kept in a
//! sibling directory alongside a durable JSON manifest.
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;

const BACKUP_ID_FORMAT: &[time::format_description::FormatItem] =
    format_description!("[year][month][day]_[hour][minute][second]");
use tracing::warn;

const MANIFEST_FILE: &str = "manifest.json";

/// One entry in the backup manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupEntry {
    /// Creation timestamp formatted `YYYYMMDD_HHMMSS`.
    pub backup_id: String,
    /// The backup file's name (not full path) inside the backup directory.
    pub filename: String,
    /// ISO-8601 creation timestamp.
    pub created_at: String,
    /// The original file's size in bytes at backup time.
    pub original_size: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    file: String,
    backups: Vec<BackupEntry>,
}

/// Manages backups for one container, keyed by its absolute path.
pub struct BackupManager {
    container: PathBuf,
    backup_dir: PathBuf,
}

impl BackupManager {
    /// `.backups/` sibling directory next to the container, created lazily.
    pub fn new(container: &Path) -> Self {
        let backup_dir = container
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(format!(
                ".{}_backups",
                container.file_stem().and_then(|s| s.to_str()).unwrap_or("container")
            ));
        Self {
            container: container.to_path_buf(),
            backup_dir,
        }
    }

    fn manifest_path(&self) -> PathBuf {
        self.backup_dir.join(MANIFEST_FILE)
    }

    /// Reads the manifest, recovering from a missing or half-written file
    /// by scanning the directory for backup files it doesn't know about.
    fn load_manifest(&self) -> Result<Manifest> {
        if !self.backup_dir.exists() {
            return Ok(Manifest {
                file: self.container.display().to_string(),
                backups: vec![],
            });
        }
        let path = self.manifest_path();
        let mut manifest = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "corrupt backup manifest, rebuilding from directory scan");
                Manifest {
                    file: self.container.display().to_string(),
                    backups: vec![],
                }
            })
        } else {
            Manifest {
                file: self.container.display().to_string(),
                backups: vec![],
            }
        };
        // Recover entries for files on disk that a crash between copy and
        // manifest-write left unrecorded.
        let known: std::collections::HashSet<&str> =
            manifest.backups.iter().map(|b| b.filename.as_str()).collect();
        if let Ok(entries) = fs::read_dir(&self.backup_dir) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().to_string();
                if name == MANIFEST_FILE || known.contains(name.as_str()) {
                    continue;
                }
                if let Some(id) = extract_backup_id(&name) {
                    let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                    manifest.backups.push(BackupEntry {
                        backup_id: id,
                        filename: name,
                        created_at: String::new(),
                        original_size: size,
                    });
                }
            }
        }
        Ok(manifest)
    }

    fn save_manifest(&self, manifest: &Manifest) -> Result<()> {
        fs::create_dir_all(&self.backup_dir)?;
        let raw = serde_json::to_string_pretty(manifest)?;
        let tmp = self.manifest_path().with_extension("json.tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, self.manifest_path())?;
        Ok(())
    }

    /// Copies the container into the backup directory and appends a
    /// manifest entry.
    pub fn create(&self) -> Result<BackupEntry> {
        fs::create_dir_all(&self.backup_dir)?;
        let now = OffsetDateTime::now_utc();
        let backup_id = now.format(BACKUP_ID_FORMAT).unwrap();
        let stem = self
            .container
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("container");
        let suffix = self
            .container
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| format!(".{s}"))
            .unwrap_or_default();
        let filename = format!("{stem}_backup_{backup_id}{suffix}");
        let dest = self.backup_dir.join(&filename);
        fs::copy(&self.container, &dest)?;
        let original_size = fs::metadata(&self.container)?.len();

        let mut manifest = self.load_manifest()?;
        let entry = BackupEntry {
            backup_id,
            filename,
            created_at: now.format(&time::format_description::well_known::Rfc3339).unwrap(),
            original_size,
        };
        manifest.backups.push(entry.clone());
        self.save_manifest(&manifest)?;
        Ok(entry)
    }

    /// Lists manifest entries, most-recent-first.
    pub fn list(&self) -> Result<Vec<BackupEntry>> {
        let mut manifest = self.load_manifest()?;
        manifest.backups.reverse();
        Ok(manifest.backups)
    }

    /// Restores `backup_id`: takes a safety copy of the current file first,
    /// then overwrites the container with the named backup.
    pub fn restore(&self, backup_id: &str) -> Result<()> {
        let manifest = self.load_manifest()?;
        let entry = manifest
            .backups
            .iter()
            .find(|b| b.backup_id == backup_id)
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no backup with id {backup_id}"),
                )
            })?;
        let backup_path = self.backup_dir.join(&entry.filename);
        if !backup_path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("backup file missing: {}", backup_path.display()),
            )
            .into());
        }
        self.create()?; // safety copy of current state before overwriting
        fs::copy(&backup_path, &self.container)?;
        Ok(())
    }

    /// Removes a backup file and its manifest entry.
    pub fn delete(&self, backup_id: &str) -> Result<()> {
        let mut manifest = self.load_manifest()?;
        if let Some(pos) = manifest.backups.iter().position(|b| b.backup_id == backup_id) {
            let entry = manifest.backups.remove(pos);
            let path = self.backup_dir.join(&entry.filename);
            if path.exists() {
                fs::remove_file(path)?;
            }
            self.save_manifest(&manifest)?;
        }
        Ok(())
    }
}

fn extract_backup_id(filename: &str) -> Option<String> {
    static RE: once_cell::sync::Lazy<regex::Regex> =
        once_cell::sync::Lazy::new(|| regex::Regex::new(r"_backup_(\d{8}_\d{6})").unwrap());
    RE.captures(filename).map(|c| c[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_list_restore_delete_roundtrip() {
        let dir = tempdir().unwrap();
        let container = dir.path().join("book.xlsm");
        fs::write(&container, b"original").unwrap();
        let mgr = BackupManager::new(&container);

        let entry = mgr.create().unwrap();
        assert_eq!(mgr.list().unwrap().len(), 1);

        fs::write(&container, b"mutated").unwrap();
        mgr.restore(&entry.backup_id).unwrap();
        assert_eq!(fs::read(&container).unwrap(), b"original");
        // restore takes its own safety copy, so two entries now exist
        assert_eq!(mgr.list().unwrap().len(), 2);

        mgr.delete(&entry.backup_id).unwrap();
        assert!(mgr.list().unwrap().iter().all(|b| b.backup_id != entry.backup_id));
    }

    #[test]
    fn restoring_a_missing_backup_id_errors() {
        let dir = tempdir().unwrap();
        let container = dir.path().join("book.xlsm");
        fs::write(&container, b"original").unwrap();
        let mgr = BackupManager::new(&container);
        assert!(mgr.restore("19700101_000000").is_err());
    }
}
