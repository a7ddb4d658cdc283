use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct MergePaths {
    pub merge_home: PathBuf,
    pub logs_dir: PathBuf,
    pub config_file: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<MergePaths> {
    let merge_home = match env::var("MERGE_HOME") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => required_home_dir()?.join(".archive-merger"),
    };

    let logs_dir = env_or_default_path("MERGE_LOGS_DIR", merge_home.join("logs"));
    let config_file = env_or_default_path("MERGE_CONFIG_PATH", merge_home.join("merge.toml"));

    Ok(MergePaths {
        merge_home,
        logs_dir,
        config_file,
    })
}
