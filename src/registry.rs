//! Workflow metadata registry.
//!
//! One pretty-printed JSON document per pipeline instance under
//! `<workspace>/.mdforge/workflows/<id>.json`; the instance's working
//! directory is `<workspace>/<id>/`. Documents are replaced through a
//! temporary file and a rename, so readers never see a torn write.
//! Concurrent writers to the same record are last-write-wins.

use chrono::{DateTime, Utc};
use glob::{Pattern, glob};
use mdforge_common::{Phase, SimulationParams, WorkflowStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::checkpoint::CheckpointStore;
use crate::errors::RegistryError;

/// Persisted metadata for one pipeline instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub workflow_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub status: WorkflowStatus,
    #[serde(default)]
    pub params: Option<SimulationParams>,
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct WorkflowUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<WorkflowStatus>,
    pub params: Option<SimulationParams>,
}

impl WorkflowUpdate {
    pub fn status(status: WorkflowStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Fields carried over when importing an exported document.
#[derive(Debug, Deserialize)]
struct ImportedWorkflow {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    params: Option<SimulationParams>,
}

#[derive(Debug, Clone)]
pub struct Registry {
    workspace: PathBuf,
    docs_dir: PathBuf,
}

impl Registry {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        let docs_dir = workspace.join(".mdforge").join("workflows");
        Self {
            workspace,
            docs_dir,
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn docs_dir(&self) -> &Path {
        &self.docs_dir
    }

    pub fn document_path(&self, id: &str) -> PathBuf {
        self.docs_dir.join(format!("{id}.json"))
    }

    pub fn work_dir(&self, id: &str) -> PathBuf {
        self.workspace.join(id)
    }

    pub fn log_dir(&self, id: &str) -> PathBuf {
        self.work_dir(id).join("logs")
    }

    /// Ids are used as path components; anything that could escape the
    /// workspace cannot name a record.
    fn checked_path(&self, id: &str) -> Result<PathBuf, RegistryError> {
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return Err(RegistryError::NotFound { id: id.to_string() });
        }
        Ok(self.document_path(id))
    }

    pub fn create(
        &self,
        name: &str,
        description: &str,
        params: Option<SimulationParams>,
    ) -> Result<WorkflowRecord, RegistryError> {
        let now = Utc::now();
        let record = WorkflowRecord {
            workflow_id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: now,
            updated_at: now,
            status: WorkflowStatus::new(),
            params,
        };

        let log_dir = self.log_dir(&record.workflow_id);
        fs::create_dir_all(&log_dir).map_err(|e| RegistryError::io(&log_dir, e))?;
        self.write(&record)?;

        tracing::info!(id = %record.workflow_id, name = %record.name, "workflow created");
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Result<WorkflowRecord, RegistryError> {
        let path = self.checked_path(id)?;
        if !path.is_file() {
            return Err(RegistryError::NotFound { id: id.to_string() });
        }
        read_document(&path)
    }

    /// All readable records, newest first. Unreadable documents are skipped.
    pub fn list(&self) -> Result<Vec<WorkflowRecord>, RegistryError> {
        if !self.docs_dir.is_dir() {
            return Ok(Vec::new());
        }
        let pattern = format!(
            "{}/*.json",
            Pattern::escape(&self.docs_dir.to_string_lossy())
        );

        let mut records = Vec::new();
        let entries = glob(&pattern).map_err(|e| {
            RegistryError::io(&self.docs_dir, std::io::Error::other(e.to_string()))
        })?;
        for path in entries.filter_map(Result::ok) {
            match read_document(&path) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping workflow document"),
            }
        }
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    pub fn update(&self, id: &str, update: WorkflowUpdate) -> Result<WorkflowRecord, RegistryError> {
        let mut record = self.get(id)?;
        if let Some(name) = update.name {
            record.name = name;
        }
        if let Some(description) = update.description {
            record.description = description;
        }
        if let Some(status) = update.status {
            record.status = status;
        }
        if let Some(params) = update.params {
            record.params = Some(params);
        }
        record.updated_at = Utc::now();
        self.write(&record)?;
        Ok(record)
    }

    /// Remove the document and the instance's working directory.
    pub fn delete(&self, id: &str) -> Result<(), RegistryError> {
        let path = self.checked_path(id)?;
        if !path.is_file() {
            return Err(RegistryError::NotFound { id: id.to_string() });
        }
        fs::remove_file(&path).map_err(|e| RegistryError::io(&path, e))?;

        let work_dir = self.work_dir(id);
        if work_dir.exists() {
            fs::remove_dir_all(&work_dir).map_err(|e| RegistryError::io(&work_dir, e))?;
        }
        tracing::info!(id, "workflow deleted");
        Ok(())
    }

    pub fn export(&self, id: &str, dest: &Path) -> Result<(), RegistryError> {
        let record = self.get(id)?;
        let json = serde_json::to_string_pretty(&record).map_err(|e| RegistryError::Document {
            path: dest.to_path_buf(),
            source: e,
        })?;
        fs::write(dest, json).map_err(|e| RegistryError::io(dest, e))
    }

    /// Create a new instance from an exported document. Name, description
    /// and parameters carry over; id, timestamps and status start fresh.
    pub fn import(&self, src: &Path) -> Result<WorkflowRecord, RegistryError> {
        let content = fs::read_to_string(src).map_err(|e| RegistryError::io(src, e))?;
        let imported: ImportedWorkflow =
            serde_json::from_str(&content).map_err(|e| RegistryError::Document {
                path: src.to_path_buf(),
                source: e,
            })?;
        self.create(&imported.name, &imported.description, imported.params)
    }

    /// Lines of every log file under the instance's `logs/` directory, in
    /// file-name order.
    pub fn logs(&self, id: &str) -> Result<Vec<String>, RegistryError> {
        self.get(id)?;
        let log_dir = self.log_dir(id);
        if !log_dir.is_dir() {
            return Ok(Vec::new());
        }
        let pattern = format!("{}/*.log", Pattern::escape(&log_dir.to_string_lossy()));
        let mut files: Vec<PathBuf> = glob(&pattern)
            .map_err(|e| RegistryError::io(&log_dir, std::io::Error::other(e.to_string())))?
            .filter_map(Result::ok)
            .collect();
        files.sort();

        let mut lines = Vec::new();
        for file in files {
            let content = fs::read_to_string(&file).map_err(|e| RegistryError::io(&file, e))?;
            lines.extend(content.lines().map(str::to_string));
        }
        Ok(lines)
    }

    pub fn checkpoints(&self, id: &str) -> Result<BTreeMap<Phase, Vec<String>>, RegistryError> {
        self.get(id)?;
        Ok(CheckpointStore::new(self.work_dir(id)).list()?)
    }

    fn write(&self, record: &WorkflowRecord) -> Result<(), RegistryError> {
        fs::create_dir_all(&self.docs_dir).map_err(|e| RegistryError::io(&self.docs_dir, e))?;
        let path = self.document_path(&record.workflow_id);
        let tmp = self.docs_dir.join(format!(".{}.json.tmp", record.workflow_id));

        let json = serde_json::to_string_pretty(record).map_err(|e| RegistryError::Document {
            path: path.clone(),
            source: e,
        })?;
        fs::write(&tmp, json).map_err(|e| RegistryError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| RegistryError::io(&path, e))
    }
}

fn read_document(path: &Path) -> Result<WorkflowRecord, RegistryError> {
    let content = fs::read_to_string(path).map_err(|e| RegistryError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| RegistryError::Document {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_and_get() {
        let dir = tempdir().unwrap();
        let registry = Registry::new(dir.path());

        let created = registry
            .create("lysozyme", "in water", Some(SimulationParams::new("1aki.pdb")))
            .unwrap();
        assert!(Uuid::parse_str(&created.workflow_id).is_ok());
        assert!(registry.work_dir(&created.workflow_id).join("logs").is_dir());

        let loaded = registry.get(&created.workflow_id).unwrap();
        assert_eq!(loaded, created);
        assert!(loaded.status.completed_phases.is_empty());
    }

    #[test]
    fn test_get_unknown_and_hostile_ids() {
        let dir = tempdir().unwrap();
        let registry = Registry::new(dir.path());
        assert!(matches!(registry.get("nope"), Err(RegistryError::NotFound { .. })));
        assert!(matches!(registry.get("../etc"), Err(RegistryError::NotFound { .. })));
        assert!(matches!(registry.get(""), Err(RegistryError::NotFound { .. })));
    }

    #[test]
    fn test_update_status_persists() {
        let dir = tempdir().unwrap();
        let registry = Registry::new(dir.path());
        let record = registry.create("w", "", None).unwrap();

        let mut status = record.status.clone();
        status.begin(Phase::Preparation);
        status.record_success(Phase::Preparation);
        let updated = registry
            .update(&record.workflow_id, WorkflowUpdate::status(status))
            .unwrap();
        assert!(updated.updated_at >= record.updated_at);

        let reloaded = Registry::new(dir.path()).get(&record.workflow_id).unwrap();
        assert_eq!(reloaded.status.completed_phases, vec![Phase::Preparation]);
        assert_eq!(reloaded.name, "w");
    }

    #[test]
    fn test_list_skips_corrupt_documents() {
        let dir = tempdir().unwrap();
        let registry = Registry::new(dir.path());
        registry.create("first", "", None).unwrap();
        registry.create("second", "", None).unwrap();
        fs::write(registry.docs_dir().join("broken.json"), "{not json").unwrap();

        let listed = registry.list().unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[test]
    fn test_list_empty_workspace() {
        let dir = tempdir().unwrap();
        assert!(Registry::new(dir.path()).list().unwrap().is_empty());
    }

    #[test]
    fn test_delete_removes_document_and_workdir() {
        let dir = tempdir().unwrap();
        let registry = Registry::new(dir.path());
        let record = registry.create("w", "", None).unwrap();
        let id = record.workflow_id;

        registry.delete(&id).unwrap();
        assert!(!registry.document_path(&id).exists());
        assert!(!registry.work_dir(&id).exists());
        assert!(matches!(registry.delete(&id), Err(RegistryError::NotFound { .. })));
    }

    #[test]
    fn test_export_then_import_creates_fresh_instance() {
        let dir = tempdir().unwrap();
        let registry = Registry::new(dir.path());
        let mut params = SimulationParams::new("1aki.pdb");
        params.production.nsteps = 1000;
        let record = registry.create("original", "desc", Some(params.clone())).unwrap();

        let mut status = record.status.clone();
        status.begin(Phase::Preparation);
        status.record_failure(Phase::Preparation, "boom");
        registry
            .update(&record.workflow_id, WorkflowUpdate::status(status))
            .unwrap();

        let exported = dir.path().join("export.json");
        registry.export(&record.workflow_id, &exported).unwrap();

        let imported = registry.import(&exported).unwrap();
        assert_ne!(imported.workflow_id, record.workflow_id);
        assert_eq!(imported.name, "original");
        assert_eq!(imported.description, "desc");
        assert_eq!(imported.params, Some(params));
        assert!(imported.status.errors.is_empty());
        assert_eq!(registry.list().unwrap().len(), 2);
    }

    #[test]
    fn test_import_rejects_garbage() {
        let dir = tempdir().unwrap();
        let registry = Registry::new(dir.path());
        let src = dir.path().join("bad.json");
        fs::write(&src, "[]").unwrap();
        assert!(matches!(registry.import(&src), Err(RegistryError::Document { .. })));
    }

    #[test]
    fn test_logs_concatenates_in_order() {
        let dir = tempdir().unwrap();
        let registry = Registry::new(dir.path());
        let record = registry.create("w", "", None).unwrap();
        let logs = registry.log_dir(&record.workflow_id);
        fs::write(logs.join("pipeline-2.log"), "third\n").unwrap();
        fs::write(logs.join("pipeline-1.log"), "first\nsecond\n").unwrap();
        fs::write(logs.join("notes.txt"), "ignored\n").unwrap();

        assert_eq!(
            registry.logs(&record.workflow_id).unwrap(),
            vec!["first", "second", "third"]
        );
    }

    #[test]
    fn test_checkpoints_for_fresh_instance() {
        let dir = tempdir().unwrap();
        let registry = Registry::new(dir.path());
        let record = registry.create("w", "", None).unwrap();
        assert!(registry.checkpoints(&record.workflow_id).unwrap().is_empty());
    }
}
