//! Checkpoint store.
//!
//! Each phase owns `checkpoints/<phase-name>/` under the instance working
//! directory: verbatim copies of the phase's outputs plus a hidden
//! `.manifest.json` recording size and SHA-256 of every file.
//!
//! Backups are assembled in a staging directory and published by rename.
//! Restores verify the whole checkpoint before touching the working
//! directory, copy into temporary siblings and only then rename into place.
//! Files being replaced are moved aside first and put back on failure.

use chrono::{DateTime, Utc};
use mdforge_common::Phase;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::errors::CheckpointError;

const MANIFEST: &str = ".manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub phase: Phase,
    pub created_at: DateTime<Utc>,
    pub files: Vec<ManifestEntry>,
}

impl Manifest {
    fn entry(&self, name: &str) -> Option<&ManifestEntry> {
        self.files.iter().find(|e| e.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    work_dir: PathBuf,
    root: PathBuf,
}

impl CheckpointStore {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        let work_dir = work_dir.into();
        let root = work_dir.join("checkpoints");
        Self { work_dir, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn phase_dir(&self, phase: Phase) -> PathBuf {
        self.root.join(phase.name())
    }

    pub fn has(&self, phase: Phase) -> bool {
        self.phase_dir(phase).join(MANIFEST).is_file()
    }

    /// Copy `files` from the working directory into the phase's checkpoint,
    /// replacing any previous checkpoint of that phase wholesale.
    pub fn backup(&self, phase: Phase, files: &[&str]) -> Result<PathBuf, CheckpointError> {
        for name in files {
            let src = self.work_dir.join(name);
            if !src.is_file() {
                return Err(CheckpointError::MissingOutput { phase, path: src });
            }
        }

        fs::create_dir_all(&self.root).map_err(|e| CheckpointError::io(&self.root, e))?;
        let staging = self.root.join(format!(".staging-{}", phase.name()));
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| CheckpointError::io(&staging, e))?;
        }
        fs::create_dir_all(&staging).map_err(|e| CheckpointError::io(&staging, e))?;

        let result = self.fill_staging(phase, files, &staging);
        if let Err(e) = result {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        let target = self.phase_dir(phase);
        if target.exists() {
            fs::remove_dir_all(&target).map_err(|e| CheckpointError::io(&target, e))?;
        }
        fs::rename(&staging, &target).map_err(|e| CheckpointError::io(&target, e))?;

        tracing::info!(phase = %phase, dir = %target.display(), files = files.len(), "checkpoint saved");
        Ok(target)
    }

    fn fill_staging(
        &self,
        phase: Phase,
        files: &[&str],
        staging: &Path,
    ) -> Result<(), CheckpointError> {
        let mut entries = Vec::with_capacity(files.len());
        for name in files {
            let src = self.work_dir.join(name);
            let dst = staging.join(name);
            let (size, sha256) = copy_hashed(&src, &dst)?;
            entries.push(ManifestEntry {
                name: name.to_string(),
                size,
                sha256,
            });
        }

        let manifest = Manifest {
            phase,
            created_at: Utc::now(),
            files: entries,
        };
        let path = staging.join(MANIFEST);
        let json = serde_json::to_string_pretty(&manifest).map_err(|e| CheckpointError::Manifest {
            path: path.clone(),
            source: e,
        })?;
        fs::write(&path, json).map_err(|e| CheckpointError::io(&path, e))
    }

    pub fn manifest(&self, phase: Phase) -> Result<Manifest, CheckpointError> {
        let dir = self.phase_dir(phase);
        if !dir.is_dir() {
            return Err(CheckpointError::Missing { phase, dir });
        }
        let path = dir.join(MANIFEST);
        if !path.is_file() {
            return Err(CheckpointError::MissingFile {
                phase,
                file: MANIFEST.to_string(),
            });
        }
        let content = fs::read_to_string(&path).map_err(|e| CheckpointError::io(&path, e))?;
        serde_json::from_str(&content).map_err(|e| CheckpointError::Manifest { path, source: e })
    }

    /// Copy `files` from the checkpoint back into the working directory.
    /// Either every file is restored or the working directory is untouched.
    pub fn restore(&self, phase: Phase, files: &[&str]) -> Result<(), CheckpointError> {
        let dir = self.phase_dir(phase);
        let manifest = self.manifest(phase)?;

        for name in files {
            let src = dir.join(name);
            if !src.is_file() {
                return Err(CheckpointError::MissingFile {
                    phase,
                    file: name.to_string(),
                });
            }
            let entry = manifest.entry(name).ok_or_else(|| CheckpointError::Corrupt {
                phase,
                file: name.to_string(),
            })?;
            let (size, sha256) = hash_file(&src)?;
            if size != entry.size || sha256 != entry.sha256 {
                return Err(CheckpointError::Corrupt {
                    phase,
                    file: name.to_string(),
                });
            }
        }

        for name in files {
            let dst = self.work_dir.join(name);
            if let Ok(meta) = fs::symlink_metadata(&dst)
                && !meta.is_file()
            {
                return Err(CheckpointError::Blocked { phase, path: dst });
            }
        }

        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(files.len());
        for name in files {
            let tmp = self.work_dir.join(format!(".{name}.restore"));
            if let Err(e) = copy_hashed(&dir.join(name), &tmp) {
                discard(&staged);
                let _ = fs::remove_file(&tmp);
                return Err(e);
            }
            staged.push((tmp, self.work_dir.join(name)));
        }

        if let Err(e) = publish(&self.work_dir, files, &staged) {
            discard(&staged);
            return Err(e);
        }

        tracing::info!(phase = %phase, files = files.len(), "checkpoint restored");
        Ok(())
    }

    /// Phase to file names for every checkpoint on disk.
    pub fn list(&self) -> Result<BTreeMap<Phase, Vec<String>>, CheckpointError> {
        let mut out = BTreeMap::new();
        for phase in Phase::ALL {
            let dir = self.phase_dir(phase);
            if !dir.is_dir() {
                continue;
            }
            let mut names = Vec::new();
            for entry in fs::read_dir(&dir).map_err(|e| CheckpointError::io(&dir, e))? {
                let entry = entry.map_err(|e| CheckpointError::io(&dir, e))?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if !name.starts_with('.') {
                    names.push(name);
                }
            }
            names.sort();
            out.insert(phase, names);
        }
        Ok(out)
    }
}

fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in staged {
        let _ = fs::remove_file(tmp);
    }
}

/// Swap staged copies into place. Current files are moved aside first and
/// put back if any rename fails, so the working directory ends up either
/// fully restored or as it was.
fn publish(
    work_dir: &Path,
    files: &[&str],
    staged: &[(PathBuf, PathBuf)],
) -> Result<(), CheckpointError> {
    let mut set_aside: Vec<(PathBuf, PathBuf)> = Vec::new();
    let mut placed: Vec<&Path> = Vec::new();
    let result = swap_in(work_dir, files, staged, &mut set_aside, &mut placed);

    match result {
        Ok(()) => {
            for (prev, _) in &set_aside {
                let _ = fs::remove_file(prev);
            }
            Ok(())
        }
        Err(e) => {
            for dst in placed {
                let _ = fs::remove_file(dst);
            }
            for (prev, dst) in &set_aside {
                if let Err(undo) = fs::rename(prev, dst) {
                    tracing::error!(path = %dst.display(), error = %undo, "failed to put file back after restore error");
                }
            }
            Err(e)
        }
    }
}

fn swap_in<'a>(
    work_dir: &Path,
    files: &[&str],
    staged: &'a [(PathBuf, PathBuf)],
    set_aside: &mut Vec<(PathBuf, PathBuf)>,
    placed: &mut Vec<&'a Path>,
) -> Result<(), CheckpointError> {
    for (name, (_, dst)) in files.iter().zip(staged) {
        if dst.exists() {
            let prev = work_dir.join(format!(".{name}.prev"));
            fs::rename(dst, &prev).map_err(|e| CheckpointError::io(dst, e))?;
            set_aside.push((prev, dst.clone()));
        }
    }
    for (tmp, dst) in staged {
        fs::rename(tmp, dst).map_err(|e| CheckpointError::io(dst, e))?;
        placed.push(dst.as_path());
    }
    Ok(())
}

/// Stream `src` into `dst`, returning size and hex SHA-256 of the bytes copied.
fn copy_hashed(src: &Path, dst: &Path) -> Result<(u64, String), CheckpointError> {
    let mut input = File::open(src).map_err(|e| CheckpointError::io(src, e))?;
    let mut output = File::create(dst).map_err(|e| CheckpointError::io(dst, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = input.read(&mut buf).map_err(|e| CheckpointError::io(src, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        output
            .write_all(&buf[..n])
            .map_err(|e| CheckpointError::io(dst, e))?;
        size += n as u64;
    }
    output.flush().map_err(|e| CheckpointError::io(dst, e))?;
    Ok((size, format!("{:x}", hasher.finalize())))
}

fn hash_file(path: &Path) -> Result<(u64, String), CheckpointError> {
    let mut input = File::open(path).map_err(|e| CheckpointError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = input.read(&mut buf).map_err(|e| CheckpointError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((size, format!("{:x}", hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const EM: &[&str] = &["em.gro", "em.edr", "em.log"];

    fn write_outputs(dir: &Path) {
        fs::write(dir.join("em.gro"), "minimized coordinates\n").unwrap();
        fs::write(dir.join("em.edr"), [0u8, 1, 2, 3, 255]).unwrap();
        fs::write(dir.join("em.log"), "Finished mdrun\n").unwrap();
    }

    #[test]
    fn test_backup_then_restore_is_byte_identical() {
        let dir = tempdir().unwrap();
        write_outputs(dir.path());
        let store = CheckpointStore::new(dir.path());

        let saved = store.backup(Phase::Minimization, EM).unwrap();
        assert_eq!(saved, dir.path().join("checkpoints/minimization"));
        assert!(store.has(Phase::Minimization));

        let originals: Vec<Vec<u8>> = EM.iter().map(|f| fs::read(dir.path().join(f)).unwrap()).collect();
        fs::write(dir.path().join("em.gro"), "clobbered").unwrap();
        fs::remove_file(dir.path().join("em.edr")).unwrap();

        store.restore(Phase::Minimization, EM).unwrap();
        for (name, original) in EM.iter().zip(originals) {
            assert_eq!(fs::read(dir.path().join(name)).unwrap(), original, "{name}");
        }
    }

    #[test]
    fn test_backup_with_missing_output_publishes_nothing() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("em.gro"), "x").unwrap();
        let store = CheckpointStore::new(dir.path());

        let err = store.backup(Phase::Minimization, EM).unwrap_err();
        assert!(matches!(err, CheckpointError::MissingOutput { .. }));
        assert!(!store.phase_dir(Phase::Minimization).exists());
    }

    #[test]
    fn test_rebackup_replaces_previous_checkpoint() {
        let dir = tempdir().unwrap();
        write_outputs(dir.path());
        fs::write(dir.path().join("extra.txt"), "old").unwrap();
        let store = CheckpointStore::new(dir.path());

        store
            .backup(Phase::Minimization, &["em.gro", "em.edr", "em.log", "extra.txt"])
            .unwrap();
        fs::write(dir.path().join("em.gro"), "second attempt\n").unwrap();
        store.backup(Phase::Minimization, EM).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(
            listed[&Phase::Minimization],
            vec!["em.edr", "em.gro", "em.log"]
        );
        assert_eq!(
            fs::read_to_string(store.phase_dir(Phase::Minimization).join("em.gro")).unwrap(),
            "second attempt\n"
        );
    }

    #[test]
    fn test_restore_without_checkpoint() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let err = store.restore(Phase::Production, &["md.gro"]).unwrap_err();
        assert!(matches!(err, CheckpointError::Missing { .. }));
    }

    #[test]
    fn test_incomplete_checkpoint_leaves_workdir_untouched() {
        let dir = tempdir().unwrap();
        write_outputs(dir.path());
        let store = CheckpointStore::new(dir.path());
        store.backup(Phase::Minimization, EM).unwrap();

        fs::remove_file(store.phase_dir(Phase::Minimization).join("em.log")).unwrap();
        fs::write(dir.path().join("em.gro"), "current").unwrap();

        let err = store.restore(Phase::Minimization, EM).unwrap_err();
        assert!(matches!(err, CheckpointError::MissingFile { ref file, .. } if file == "em.log"));
        assert_eq!(fs::read_to_string(dir.path().join("em.gro")).unwrap(), "current");
    }

    #[test]
    fn test_tampered_checkpoint_is_rejected() {
        let dir = tempdir().unwrap();
        write_outputs(dir.path());
        let store = CheckpointStore::new(dir.path());
        store.backup(Phase::Minimization, EM).unwrap();

        fs::write(store.phase_dir(Phase::Minimization).join("em.edr"), "tampered").unwrap();
        fs::write(dir.path().join("em.gro"), "current").unwrap();

        let err = store.restore(Phase::Minimization, EM).unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt { ref file, .. } if file == "em.edr"));
        assert_eq!(fs::read_to_string(dir.path().join("em.gro")).unwrap(), "current");
    }

    #[test]
    fn test_blocked_destination_leaves_workdir_untouched() {
        let dir = tempdir().unwrap();
        write_outputs(dir.path());
        let store = CheckpointStore::new(dir.path());
        store.backup(Phase::Minimization, EM).unwrap();

        fs::write(dir.path().join("em.gro"), "current gro").unwrap();
        fs::remove_file(dir.path().join("em.log")).unwrap();
        fs::create_dir(dir.path().join("em.log")).unwrap();
        fs::write(dir.path().join("em.log/inner.txt"), "x").unwrap();

        let err = store.restore(Phase::Minimization, EM).unwrap_err();
        assert!(matches!(err, CheckpointError::Blocked { ref path, .. } if path.ends_with("em.log")));
        assert_eq!(fs::read_to_string(dir.path().join("em.gro")).unwrap(), "current gro");
        assert!(dir.path().join("em.log/inner.txt").is_file());
    }

    #[test]
    fn test_publish_rolls_back_on_failed_rename() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("em.gro"), "current gro").unwrap();
        fs::write(dir.path().join(".em.gro.restore"), "orig gro").unwrap();
        // No staged copy for em.edr, so its rename fails after em.gro is in place.
        let staged = vec![
            (dir.path().join(".em.gro.restore"), dir.path().join("em.gro")),
            (dir.path().join(".em.edr.restore"), dir.path().join("em.edr")),
        ];

        let err = publish(dir.path(), &["em.gro", "em.edr"], &staged).unwrap_err();
        assert!(matches!(err, CheckpointError::Io { .. }));
        assert_eq!(fs::read_to_string(dir.path().join("em.gro")).unwrap(), "current gro");
        assert!(!dir.path().join("em.edr").exists());
        assert!(!dir.path().join(".em.gro.prev").exists());
    }

    #[test]
    fn test_restore_over_existing_files_leaves_no_leftovers() {
        let dir = tempdir().unwrap();
        write_outputs(dir.path());
        let store = CheckpointStore::new(dir.path());
        store.backup(Phase::Minimization, EM).unwrap();
        fs::write(dir.path().join("em.gro"), "clobbered").unwrap();

        store.restore(Phase::Minimization, EM).unwrap();
        let hidden: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".prev") || n.ends_with(".restore"))
            .collect();
        assert!(hidden.is_empty(), "{hidden:?}");
    }

    #[test]
    fn test_list_hides_manifest_and_staging() {
        let dir = tempdir().unwrap();
        write_outputs(dir.path());
        let store = CheckpointStore::new(dir.path());
        store.backup(Phase::Minimization, EM).unwrap();
        fs::create_dir_all(store.root().join(".staging-production")).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert!(!listed[&Phase::Minimization].iter().any(|f| f.starts_with('.')));

        let manifest = store.manifest(Phase::Minimization).unwrap();
        assert_eq!(manifest.files.len(), 3);
        assert_eq!(manifest.files[1].size, 5);
    }
}
