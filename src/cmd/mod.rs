//! CLI command implementations.
//!
//! | Module     | Commands handled                                              |
//! |------------|---------------------------------------------------------------|
//! | `workflow` | `Init`, `Create`, `List`, `Show`, `Status`, `Delete`, `Logs`, `Export`, `Import` |
//! | `run`      | `Run`, `Restore`, `Checkpoints`                               |
//! | `config`   | `Config`                                                      |

pub mod config;
pub mod run;
pub mod workflow;

use anyhow::{Result, bail};
use mdforge::Phase;
use mdforge::config::Config;

pub use config::cmd_config;
pub use run::{cmd_checkpoints, cmd_restore, cmd_run};
pub use workflow::{
    CreateArgs, cmd_create, cmd_delete, cmd_export, cmd_import, cmd_init, cmd_list, cmd_logs,
    cmd_show, cmd_status,
};

fn require_init(config: &Config) -> Result<()> {
    if !config.is_initialized() {
        bail!(
            "No mdforge workspace at {}. Run 'mdforge init' first.",
            config.workspace.display()
        );
    }
    Ok(())
}

fn parse_phase(value: &str) -> Result<Phase> {
    Ok(value.parse::<Phase>()?)
}
