//! GROMACS engine adapter.
//!
//! Turns a phase plus its parameter snapshot into a [`PhasePlan`]: the
//! configuration artifact to write, the prepare and run invocations, the log
//! the monitor should watch and the outputs that must exist afterwards.

pub mod mdp;

use mdforge_common::{Phase, PhaseConfig, ProcessInvocation, SimulationParams};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use mdp::MdpFile;

/// Files a phase must leave behind in the working directory.
pub fn required_outputs(phase: Phase) -> &'static [&'static str] {
    match phase {
        Phase::Preparation => &["solv_ions.gro", "topol.top"],
        Phase::Minimization => &["em.gro", "em.edr", "em.log"],
        Phase::NvtEquilibration => &["nvt.gro", "nvt.edr", "nvt.log", "nvt.cpt"],
        Phase::NptEquilibration => &["npt.gro", "npt.edr", "npt.log", "npt.cpt"],
        Phase::Production => &["md.gro", "md.edr", "md.log", "md.xtc", "md.cpt"],
    }
}

/// `-deffnm` base name of an mdrun phase. Preparation has none.
pub fn deffnm(phase: Phase) -> Option<&'static str> {
    match phase {
        Phase::Preparation => None,
        Phase::Minimization => Some("em"),
        Phase::NvtEquilibration => Some("nvt"),
        Phase::NptEquilibration => Some("npt"),
        Phase::Production => Some("md"),
    }
}

/// A file copied into the working directory before a phase starts.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedInput {
    pub source: PathBuf,
    pub name: String,
}

/// Everything the controller needs to execute one phase.
#[derive(Debug, Clone)]
pub struct PhasePlan {
    pub phase: Phase,
    pub config: PhaseConfig,
    pub mdp_name: &'static str,
    pub mdp: MdpFile,
    pub staged: Vec<StagedInput>,
    pub prepare: Vec<ProcessInvocation>,
    pub run: ProcessInvocation,
    /// Log watched by the progress monitor; `None` means completion is the
    /// run step's exit status alone.
    pub log_file: Option<String>,
    pub outputs: &'static [&'static str],
    pub energy_file: Option<String>,
}

impl PhasePlan {
    /// Files removed before the attempt so that only fresh output is observed.
    pub fn stale_files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = self.outputs.to_vec();
        if let Some(log) = self.log_file.as_deref()
            && !files.contains(&log)
        {
            files.push(log);
        }
        files
    }
}

/// Adapter settings resolved from project configuration.
#[derive(Debug, Clone)]
pub struct GromacsEngine {
    pub command: String,
    /// Invoke tools as standalone executables (`grompp …`) instead of `gmx grompp …`.
    pub legacy_commands: bool,
    pub prepare_timeout: Option<Duration>,
    pub run_timeout: Option<Duration>,
    pub mdp_overrides: BTreeMap<Phase, Vec<(String, String)>>,
}

impl Default for GromacsEngine {
    fn default() -> Self {
        Self {
            command: "gmx".to_string(),
            legacy_commands: false,
            prepare_timeout: None,
            run_timeout: None,
            mdp_overrides: BTreeMap::new(),
        }
    }
}

impl GromacsEngine {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Invocation of one engine tool in `dir`.
    pub fn tool(&self, subcommand: &str, dir: &Path) -> ProcessInvocation {
        if self.legacy_commands {
            ProcessInvocation::new(subcommand, dir)
        } else {
            ProcessInvocation::new(&self.command, dir).arg(subcommand)
        }
    }

    fn prepare_tool(&self, subcommand: &str, dir: &Path) -> ProcessInvocation {
        self.tool(subcommand, dir).timeout(self.prepare_timeout)
    }

    /// Render the configuration artifact, applying project overrides.
    pub fn render_mdp(&self, config: &PhaseConfig) -> MdpFile {
        let mut file = mdp::for_phase(config);
        if let Some(overrides) = self.mdp_overrides.get(&config.phase) {
            for (key, value) in overrides {
                file.set(key, value);
            }
        }
        file
    }

    pub fn plan(&self, phase: Phase, params: &SimulationParams, dir: &Path) -> PhasePlan {
        let config = params.phase_config(phase);
        let mdp = self.render_mdp(&config);
        let mdp_name = mdp::file_name(phase);

        let (staged, prepare, run) = match phase {
            Phase::Preparation => self.preparation_steps(params, dir, mdp_name),
            _ => {
                let grompp = self.grompp(phase, dir, mdp_name);
                // deffnm is always present past Preparation
                let name = deffnm(phase).unwrap_or("md");
                let run = self
                    .tool("mdrun", dir)
                    .timeout(self.run_timeout)
                    .args(["-v", "-deffnm", name]);
                (Vec::new(), vec![grompp], run)
            }
        };

        PhasePlan {
            phase,
            config,
            mdp_name,
            mdp,
            staged,
            prepare,
            run,
            log_file: deffnm(phase).map(|name| format!("{name}.log")),
            outputs: required_outputs(phase),
            energy_file: deffnm(phase).map(|name| format!("{name}.edr")),
        }
    }

    fn preparation_steps(
        &self,
        params: &SimulationParams,
        dir: &Path,
        mdp_name: &str,
    ) -> (Vec<StagedInput>, Vec<ProcessInvocation>, ProcessInvocation) {
        let structure_name = params
            .structure_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "structure.pdb".to_string());

        let mut staged = vec![StagedInput {
            source: params.structure_file.clone(),
            name: structure_name.clone(),
        }];
        let mut prepare = Vec::new();

        let boxed_from = match &params.topology_file {
            Some(topology) => {
                staged.push(StagedInput {
                    source: topology.clone(),
                    name: "topol.top".to_string(),
                });
                structure_name
            }
            None => {
                prepare.push(self.prepare_tool("pdb2gmx", dir).args([
                    "-f",
                    structure_name.as_str(),
                    "-o",
                    "processed.gro",
                    "-p",
                    "topol.top",
                    "-water",
                    params.water_model.as_str(),
                    "-ff",
                    params.force_field.as_str(),
                    "-ignh",
                ]));
                "processed.gro".to_string()
            }
        };

        prepare.push(self.prepare_tool("editconf", dir).args([
            "-f".to_string(),
            boxed_from,
            "-o".to_string(),
            "box.gro".to_string(),
            "-c".to_string(),
            "-d".to_string(),
            params.box_distance.to_string(),
            "-bt".to_string(),
            params.box_type.clone(),
        ]));
        prepare.push(self.prepare_tool("solvate", dir).args([
            "-cp",
            "box.gro",
            "-cs",
            "spc216.gro",
            "-o",
            "solv.gro",
            "-p",
            "topol.top",
        ]));
        prepare.push(self.prepare_tool("grompp", dir).args([
            "-f", mdp_name, "-c", "solv.gro", "-p", "topol.top", "-o", "ions.tpr",
        ]));

        // genion asks which group to replace with ions
        let run = self
            .prepare_tool("genion", dir)
            .args([
                "-s".to_string(),
                "ions.tpr".to_string(),
                "-o".to_string(),
                "solv_ions.gro".to_string(),
                "-p".to_string(),
                "topol.top".to_string(),
                "-pname".to_string(),
                "NA".to_string(),
                "-nname".to_string(),
                "CL".to_string(),
                "-neutral".to_string(),
                "-conc".to_string(),
                params.ions_concentration.to_string(),
            ])
            .stdin("SOL\n");

        (staged, prepare, run)
    }

    fn grompp(&self, phase: Phase, dir: &Path, mdp_name: &str) -> ProcessInvocation {
        let base = self.prepare_tool("grompp", dir).args(["-f", mdp_name]);
        let with_inputs = match phase {
            Phase::Minimization => base.args(["-c", "solv_ions.gro"]),
            Phase::NvtEquilibration => base.args(["-c", "em.gro", "-r", "em.gro"]),
            Phase::NptEquilibration => {
                base.args(["-c", "nvt.gro", "-r", "nvt.gro", "-t", "nvt.cpt"])
            }
            Phase::Production => base.args(["-c", "npt.gro", "-t", "npt.cpt"]),
            Phase::Preparation => base.args(["-c", "solv.gro"]),
        };
        let tpr = format!("{}.tpr", deffnm(phase).unwrap_or("ions"));
        with_inputs.args(["-p".to_string(), "topol.top".to_string(), "-o".to_string(), tpr])
    }

    /// Post-run energy extraction used as a sanity check. `None` for phases
    /// without an energy file.
    pub fn energy_check(
        &self,
        plan: &PhasePlan,
        dir: &Path,
        selection: &str,
    ) -> Option<ProcessInvocation> {
        let edr = plan.energy_file.as_deref()?;
        Some(
            self.prepare_tool("energy", dir)
                .args([
                    "-f".to_string(),
                    edr.to_string(),
                    "-o".to_string(),
                    format!("{}_energy.xvg", plan.phase.name()),
                ])
                .stdin(format!("{selection}\n\n")),
        )
    }
}
