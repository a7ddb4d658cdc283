use std::env;
use std::path::PathBuf;

include!(concat!(env!("OUT_DIR"), "/merge_env_allowlist.rs"));

fn fallback_dotenv_path(merge_home: Option<PathBuf>, home_dir: Option<PathBuf>) -> Option<PathBuf> {
    match merge_home {
        Some(home) => Some(home.join(".env")),
        None => Some(home_dir?.join(".archive-merger/.env")),
    }
}

pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("MERGE_HOME").map(PathBuf::from),
        dirs::home_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}

fn unknown_keys<I>(keys: I, allowlist: &[&str]) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out = keys
        .into_iter()
        .filter(|key| key.starts_with("MERGE_") && !allowlist.contains(&key.as_str()))
        .collect::<Vec<_>>();
    out.sort();
    out
}

/// `MERGE_*` variables set in the environment that nothing reads, usually typos.
pub fn unknown_merge_env_keys() -> Vec<String> {
    unknown_keys(env::vars().map(|(k, _)| k), GENERATED_MERGE_ENV_ALLOWLIST)
}
