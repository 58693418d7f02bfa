use crate::error::ScheduleResult;
use crate::infrastructure::config::{ensure_default_configs, load_engine_config, EngineConfig};
use crate::infrastructure::storage::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub database_path: PathBuf,
    pub config: EngineConfig,
}

pub fn bootstrap_workspace(workspace_root: &Path) -> ScheduleResult<BootstrapResult> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let database_path = state_dir.join("schedule.sqlite");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;

    ensure_default_configs(&config_dir)?;
    let config = load_engine_config(&config_dir)?;
    initialize_database(&database_path)?;

    info!(
        workspace_root = %workspace_root.display(),
        database_path = %database_path.display(),
        "workspace ready"
    );
    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        database_path,
        config,
    })
}
