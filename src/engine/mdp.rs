//! Phase configuration artifacts (`.mdp` files).
//!
//! A file is an ordered list of `key = value` parameters grouped under `;`
//! section comments. Rendering is deterministic: the same [`PhaseConfig`]
//! and overrides always produce byte-identical output.

use mdforge_common::{Phase, PhaseConfig};

#[derive(Debug, Clone, PartialEq)]
enum Line {
    Section(String),
    Param { key: String, value: String },
}

/// An ordered `.mdp` parameter file.
#[derive(Debug, Clone, PartialEq)]
pub struct MdpFile {
    header: String,
    lines: Vec<Line>,
}

impl MdpFile {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            lines: Vec::new(),
        }
    }

    /// Start a `; name` comment group.
    pub fn section(mut self, name: &str) -> Self {
        self.lines.push(Line::Section(name.to_string()));
        self
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    /// Replace the value of `key`, or append it when absent.
    pub fn set(&mut self, key: &str, value: impl ToString) {
        let value = value.to_string();
        for line in &mut self.lines {
            if let Line::Param { key: k, value: v } = line
                && normalize(k) == normalize(key)
            {
                *v = value;
                return;
            }
        }
        self.lines.push(Line::Param {
            key: key.to_string(),
            value,
        });
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            Line::Param { key: k, value } if normalize(k) == normalize(key) => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    /// Parameters in file order.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.lines.iter().filter_map(|line| match line {
            Line::Param { key, value } => Some((key.as_str(), value.as_str())),
            Line::Section(_) => None,
        })
    }

    pub fn render(&self) -> String {
        let mut out = format!("; {}\n", self.header);
        for line in &self.lines {
            match line {
                Line::Section(name) => {
                    out.push('\n');
                    out.push_str(&format!("; {name}\n"));
                }
                Line::Param { key, value } => {
                    out.push_str(&format!("{key:<24}= {value}\n"));
                }
            }
        }
        out
    }

    /// Parse rendered text back. The first comment line becomes the header,
    /// later comment lines become sections; trailing `; …` on a parameter
    /// line is dropped.
    pub fn parse(text: &str) -> Self {
        let mut file = MdpFile::new(String::new());
        let mut saw_header = false;
        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix(';') {
                let comment = comment.trim().to_string();
                if saw_header {
                    file.lines.push(Line::Section(comment));
                } else {
                    file.header = comment;
                    saw_header = true;
                }
                continue;
            }
            let body = line.split(';').next().unwrap_or_default();
            if let Some((key, value)) = body.split_once('=') {
                file.set(key.trim(), value.trim());
            }
        }
        file
    }
}

/// `.mdp` keys treat `-` and `_` as equivalent.
fn normalize(key: &str) -> String {
    key.trim().to_ascii_lowercase().replace('-', "_")
}

/// Artifact file name for a phase.
pub fn file_name(phase: Phase) -> &'static str {
    match phase {
        Phase::Preparation => "ions.mdp",
        Phase::Minimization => "em.mdp",
        Phase::NvtEquilibration => "nvt.mdp",
        Phase::NptEquilibration => "npt.mdp",
        Phase::Production => "md.mdp",
    }
}

/// Build the artifact for a phase from its snapshotted configuration.
pub fn for_phase(config: &PhaseConfig) -> MdpFile {
    let phase = config.phase;
    let mut mdp = MdpFile::new(format!("{} parameters", phase.label()))
        .section("run control")
        .param("integrator", &config.integrator)
        .param("nsteps", config.nsteps);
    if let Some(dt) = config.dt {
        mdp.set("dt", dt);
    }
    if let Some(emtol) = config.emtol {
        mdp.set("emtol", emtol);
    }
    if let Some(emstep) = config.emstep {
        mdp.set("emstep", emstep);
    }

    mdp = match phase {
        Phase::Preparation => mdp
            .section("neighbour searching")
            .param("nstlist", 1)
            .param("cutoff-scheme", "Verlet")
            .param("pbc", "xyz")
            .section("electrostatics and van der Waals")
            .param("coulombtype", "cutoff")
            .param("rcoulomb", 1.0)
            .param("rvdw", 1.0),
        Phase::Minimization => mdp
            .section("output control")
            .param("nstenergy", 500)
            .param("nstlog", 500)
            .section("constraints")
            .param("constraints", "none")
            .param("cutoff-scheme", "Verlet"),
        Phase::NvtEquilibration | Phase::NptEquilibration => mdp
            .section("output control")
            .param("nstxout", 500)
            .param("nstvout", 500)
            .param("nstenergy", 500)
            .param("nstlog", 500),
        Phase::Production => mdp
            .section("output control")
            .param("nstxout", 5000)
            .param("nstvout", 5000)
            .param("nstenergy", 5000)
            .param("nstlog", 5000)
            .param("nstxout-compressed", 5000),
    };

    if let Some(temperature) = config.temperature {
        mdp = mdp
            .section("temperature coupling")
            .param("tcoupl", "V-rescale")
            .param("tc-grps", "Protein Non-Protein")
            .param("tau_t", "0.1 0.1")
            .param("ref_t", format!("{temperature} {temperature}"));
    }

    if phase.index() >= Phase::NvtEquilibration.index() {
        mdp = mdp.section("pressure coupling");
        mdp = match config.pressure {
            Some(pressure) => mdp
                .param("pcoupl", "Parrinello-Rahman")
                .param("pcoupltype", "isotropic")
                .param("tau_p", 2.0)
                .param("ref_p", pressure)
                .param("compressibility", "4.5e-5"),
            None => mdp.param("pcoupl", "no"),
        };
        mdp = mdp
            .section("constraints")
            .param("constraints", "all-bonds")
            .param("constraint_algorithm", "lincs")
            .param("cutoff-scheme", "Verlet");
        if phase == Phase::NvtEquilibration {
            mdp = mdp
                .section("velocity generation")
                .param("gen_vel", "yes")
                .param("gen_temp", config.temperature.unwrap_or(300.0))
                .param("gen_seed", -1);
        } else {
            mdp = mdp.param("continuation", "yes");
        }
    }

    if phase != Phase::Preparation {
        mdp = mdp
            .section("van der Waals")
            .param("vdwtype", "Cut-off")
            .param("rvdw", 1.0)
            .param("rvdw-switch", 0.8)
            .section("electrostatics")
            .param("coulombtype", "PME")
            .param("rcoulomb", 1.0);
    }

    mdp
}
