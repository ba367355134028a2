//! Integration tests for the mdforge CLI
//!
//! These tests drive the binary against temporary workspaces. None of them
//! need GROMACS; pipeline runs against a stub engine live in
//! `pipeline_tests.rs`.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to create an mdforge Command
fn mdforge() -> Command {
    cargo_bin_cmd!("mdforge")
}

fn create_temp_workspace() -> TempDir {
    TempDir::new().unwrap()
}

fn init_workspace(dir: &TempDir) {
    mdforge()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();
}

/// Register a workflow for `protein.pdb` and return its id.
fn create_workflow(dir: &TempDir, name: &str) -> String {
    fs::write(dir.path().join("protein.pdb"), "ATOM      1  N   LYS A   1\n").unwrap();
    let output = mdforge()
        .current_dir(dir.path())
        .args(["create", "--name", name, "--structure", "protein.pdb"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");
    workflow_id(&String::from_utf8_lossy(&output.stdout))
}

fn workflow_id(stdout: &str) -> String {
    stdout
        .lines()
        .find(|l| l.contains("workflow"))
        .and_then(|l| l.split_whitespace().last())
        .unwrap()
        .to_string()
}

fn show(dir: &Path, id: &str) -> serde_json::Value {
    let output = mdforge()
        .current_dir(dir)
        .args(["show", id])
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");
    serde_json::from_slice(&output.stdout).unwrap()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_mdforge_help() {
        mdforge()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("run"))
            .stdout(predicate::str::contains("checkpoints"));
    }

    #[test]
    fn test_mdforge_version() {
        mdforge().arg("--version").assert().success();
    }

    #[test]
    fn test_init_creates_structure() {
        let dir = create_temp_workspace();

        mdforge()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized mdforge workspace"));

        assert!(dir.path().join(".mdforge/workflows").is_dir());
    }

    #[test]
    fn test_init_idempotent() {
        let dir = create_temp_workspace();
        init_workspace(&dir);

        mdforge()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("already initialized"));
    }

    #[test]
    fn test_init_creates_missing_workspace() {
        let dir = create_temp_workspace();
        let workspace = dir.path().join("nested/ws");

        mdforge()
            .arg("--workspace")
            .arg(&workspace)
            .arg("init")
            .assert()
            .success();

        assert!(workspace.join(".mdforge/workflows").is_dir());
    }

    #[test]
    fn test_list_requires_init() {
        let dir = create_temp_workspace();

        mdforge()
            .current_dir(dir.path())
            .arg("list")
            .assert()
            .failure()
            .stderr(predicate::str::contains("mdforge init"));
    }

    #[test]
    fn test_list_empty() {
        let dir = create_temp_workspace();
        init_workspace(&dir);

        mdforge()
            .current_dir(dir.path())
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("No workflows found"));
    }

    #[test]
    fn test_unknown_phase_is_rejected() {
        let dir = create_temp_workspace();
        init_workspace(&dir);
        let id = create_workflow(&dir, "lysozyme");

        mdforge()
            .current_dir(dir.path())
            .args(["run", &id, "--phase", "annealing"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown phase"));
    }

    #[test]
    fn test_phase_and_from_conflict() {
        mdforge()
            .args(["run", "abc", "--phase", "em", "--from", "nvt"])
            .assert()
            .failure();
    }
}

// =============================================================================
// Workflow Registry Tests
// =============================================================================

mod workflows {
    use super::*;

    #[test]
    fn test_create_and_list() {
        let dir = create_temp_workspace();
        init_workspace(&dir);
        let id = create_workflow(&dir, "lysozyme");

        assert!(dir.path().join(".mdforge/workflows").join(format!("{id}.json")).is_file());
        assert!(dir.path().join(&id).join("logs").is_dir());

        mdforge()
            .current_dir(dir.path())
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("lysozyme"))
            .stdout(predicate::str::contains(id.as_str()))
            .stdout(predicate::str::contains("at Preparation"));
    }

    #[test]
    fn test_create_missing_structure_fails() {
        let dir = create_temp_workspace();
        init_workspace(&dir);

        mdforge()
            .current_dir(dir.path())
            .args(["create", "--name", "ghost", "--structure", "absent.pdb"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Structure file not found"));
    }

    #[test]
    fn test_create_prints_parameter_warnings() {
        let dir = create_temp_workspace();
        init_workspace(&dir);
        fs::write(dir.path().join("protein.pdb"), "ATOM\n").unwrap();

        mdforge()
            .current_dir(dir.path())
            .args([
                "create",
                "--name",
                "odd",
                "--structure",
                "protein.pdb",
                "--water-model",
                "tip5p",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("Parameter warnings"))
            .stdout(predicate::str::contains("tip5p"));
    }

    #[test]
    fn test_create_with_params_file() {
        let dir = create_temp_workspace();
        init_workspace(&dir);
        fs::write(dir.path().join("protein.pdb"), "ATOM\n").unwrap();
        fs::write(
            dir.path().join("params.json"),
            r#"{"force_field": "charmm36", "production": {"nsteps": 1000000}}"#,
        )
        .unwrap();

        let output = mdforge()
            .current_dir(dir.path())
            .args([
                "create",
                "--name",
                "long",
                "--structure",
                "protein.pdb",
                "--params",
                "params.json",
            ])
            .output()
            .unwrap();
        assert!(output.status.success(), "{output:?}");
        let id = workflow_id(&String::from_utf8_lossy(&output.stdout));

        let record = show(dir.path(), &id);
        assert_eq!(record["params"]["force_field"], "charmm36");
        assert_eq!(record["params"]["production"]["nsteps"], 1_000_000);
        assert_eq!(record["params"]["production"]["dt"], 0.002);
        assert!(
            record["params"]["structure_file"]
                .as_str()
                .unwrap()
                .ends_with("protein.pdb")
        );
    }

    #[test]
    fn test_create_optimize_applies_recommended_set() {
        let dir = create_temp_workspace();
        init_workspace(&dir);
        fs::write(dir.path().join("protein.pdb"), "ATOM\n").unwrap();

        let output = mdforge()
            .current_dir(dir.path())
            .args([
                "create",
                "--name",
                "tuned",
                "--structure",
                "protein.pdb",
                "--water-model",
                "tip5p",
                "--optimize",
            ])
            .output()
            .unwrap();
        assert!(output.status.success(), "{output:?}");
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("Optimized parameters"), "{stdout}");
        assert!(stdout.contains("water_model: tip5p -> tip3p"), "{stdout}");
        assert!(!stdout.contains("Parameter warnings"), "{stdout}");

        let record = show(dir.path(), &workflow_id(&stdout));
        assert_eq!(record["params"]["water_model"], "tip3p");
    }

    #[test]
    fn test_show_and_status() {
        let dir = create_temp_workspace();
        init_workspace(&dir);
        let id = create_workflow(&dir, "lysozyme");

        let record = show(dir.path(), &id);
        assert_eq!(record["workflow_id"], id.as_str());
        assert_eq!(record["name"], "lysozyme");
        assert_eq!(record["status"]["completed_phases"], serde_json::json!([]));

        mdforge()
            .current_dir(dir.path())
            .args(["status", &id])
            .assert()
            .success()
            .stdout(predicate::str::contains("NVT-Equilibration"))
            .stdout(predicate::str::contains("Production"));
    }

    #[test]
    fn test_show_unknown_workflow() {
        let dir = create_temp_workspace();
        init_workspace(&dir);

        mdforge()
            .current_dir(dir.path())
            .args(["show", "no-such-id"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not found"));
    }

    #[test]
    fn test_delete_force() {
        let dir = create_temp_workspace();
        init_workspace(&dir);
        let id = create_workflow(&dir, "doomed");

        mdforge()
            .current_dir(dir.path())
            .args(["delete", &id, "--force"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Deleted workflow"));

        assert!(!dir.path().join(&id).exists());
        mdforge()
            .current_dir(dir.path())
            .args(["show", &id])
            .assert()
            .failure();
    }

    #[test]
    fn test_export_then_import() {
        let dir = create_temp_workspace();
        init_workspace(&dir);
        let id = create_workflow(&dir, "original");
        let exported = dir.path().join("export.json");

        mdforge()
            .current_dir(dir.path())
            .args(["export", &id])
            .arg(&exported)
            .assert()
            .success();
        assert!(exported.is_file());

        let output = mdforge()
            .current_dir(dir.path())
            .arg("import")
            .arg(&exported)
            .output()
            .unwrap();
        assert!(output.status.success(), "{output:?}");
        let copy = workflow_id(&String::from_utf8_lossy(&output.stdout));
        assert_ne!(copy, id);

        let original = show(dir.path(), &id);
        let imported = show(dir.path(), &copy);
        assert_eq!(imported["name"], "original");
        assert_eq!(imported["params"], original["params"]);
    }

    #[test]
    fn test_logs_and_checkpoints_empty() {
        let dir = create_temp_workspace();
        init_workspace(&dir);
        let id = create_workflow(&dir, "fresh");

        mdforge()
            .current_dir(dir.path())
            .args(["logs", &id])
            .assert()
            .success()
            .stdout(predicate::str::contains("No logs"));

        mdforge()
            .current_dir(dir.path())
            .args(["checkpoints", &id])
            .assert()
            .success()
            .stdout(predicate::str::contains("No checkpoints"));
    }

    #[test]
    fn test_restore_without_checkpoint_fails() {
        let dir = create_temp_workspace();
        init_workspace(&dir);
        let id = create_workflow(&dir, "fresh");

        mdforge()
            .current_dir(dir.path())
            .args(["restore", &id, "em"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to restore"));
    }
}

// =============================================================================
// Run Failure Tests
// =============================================================================

mod run_failures {
    use super::*;

    #[test]
    fn test_missing_engine_binary_records_error() {
        let dir = create_temp_workspace();
        init_workspace(&dir);
        let id = create_workflow(&dir, "no-engine");

        mdforge()
            .current_dir(dir.path())
            .env("MDFORGE_GMX", "/nonexistent/gmx")
            .args(["run", &id])
            .assert()
            .failure()
            .stderr(predicate::str::contains("halted"));

        let record = show(dir.path(), &id);
        let error = record["status"]["errors"]["system_preparation"]
            .as_str()
            .unwrap();
        assert!(error.contains("failed to launch"), "{error}");
        assert_eq!(record["status"]["completed_phases"], serde_json::json!([]));
    }

    #[test]
    fn test_out_of_order_phase_is_refused() {
        let dir = create_temp_workspace();
        init_workspace(&dir);
        let id = create_workflow(&dir, "eager");

        mdforge()
            .current_dir(dir.path())
            .env("MDFORGE_GMX", "/nonexistent/gmx")
            .args(["run", &id, "--phase", "nvt"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("cannot start before"));

        let record = show(dir.path(), &id);
        assert!(record["status"]["errors"]["nvt_equilibration"].is_string());
    }
}

// =============================================================================
// Configuration Tests
// =============================================================================

mod configuration {
    use super::*;

    #[test]
    fn test_config_show_defaults() {
        let dir = create_temp_workspace();

        mdforge()
            .current_dir(dir.path())
            .arg("config")
            .assert()
            .success()
            .stdout(predicate::str::contains("No mdforge.toml found"))
            .stdout(predicate::str::contains("Finished mdrun"));
    }

    #[test]
    fn test_config_show_env_override() {
        let dir = create_temp_workspace();

        mdforge()
            .current_dir(dir.path())
            .env("MDFORGE_GMX", "gmx_mpi")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("engine command = \"gmx_mpi\""));
    }

    #[test]
    fn test_config_init_then_validate() {
        let dir = create_temp_workspace();

        mdforge()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created mdforge.toml"));
        assert!(dir.path().join(".mdforge/mdforge.toml").is_file());

        mdforge()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid"));

        mdforge()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_config_validate_warnings() {
        let dir = create_temp_workspace();
        fs::create_dir_all(dir.path().join(".mdforge")).unwrap();
        fs::write(
            dir.path().join(".mdforge/mdforge.toml"),
            "[monitor]\ncompletion_marker = \"\"\n\n[mdp.annealing]\nnsteps = 5\n",
        )
        .unwrap();

        mdforge()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("completion_marker"))
            .stdout(predicate::str::contains("mdp.annealing"));
    }

    #[test]
    fn test_invalid_config_fails() {
        let dir = create_temp_workspace();
        fs::create_dir_all(dir.path().join(".mdforge")).unwrap();
        fs::write(dir.path().join(".mdforge/mdforge.toml"), "[engine\n").unwrap();

        mdforge()
            .current_dir(dir.path())
            .arg("list")
            .assert()
            .failure()
            .stderr(predicate::str::contains("mdforge.toml"));
    }
}

// =============================================================================
// Global Flags Tests
// =============================================================================

mod global_flags {
    use super::*;

    #[test]
    fn test_workspace_flag() {
        let dir = create_temp_workspace();
        init_workspace(&dir);

        mdforge()
            .arg("--workspace")
            .arg(dir.path())
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("No workflows found"));
    }

    #[test]
    fn test_json_log_format_accepted() {
        let dir = create_temp_workspace();
        init_workspace(&dir);

        mdforge()
            .current_dir(dir.path())
            .args(["--log-format", "json", "--verbose", "list"])
            .assert()
            .success();
    }

    #[test]
    fn test_invalid_log_format_rejected() {
        mdforge()
            .args(["--log-format", "xml", "list"])
            .assert()
            .failure();
    }
}
