use crate::merge::paths::MergePaths;
use crate::merge::util::is_safe_relative;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOutputConfig {
    #[serde(default = "default_true")]
    pub pretty_json: bool,
    #[serde(default = "default_true")]
    pub legacy_aliases: bool,
    #[serde(default = "default_true")]
    pub fill_tweet_defaults: bool,
    #[serde(default)]
    pub allow_existing: bool,
}

fn default_true() -> bool {
    true
}

fn default_viewer_entries() -> Vec<String> {
    vec!["Your archive.html".to_string(), "assets".to_string()]
}

impl Default for MergeOutputConfig {
    fn default() -> Self {
        Self {
            pretty_json: true,
            legacy_aliases: true,
            fill_tweet_defaults: true,
            allow_existing: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeViewerConfig {
    #[serde(default = "default_true")]
    pub copy_bundle: bool,
    #[serde(default = "default_viewer_entries")]
    pub entries: Vec<String>,
}

impl Default for MergeViewerConfig {
    fn default() -> Self {
        Self {
            copy_bundle: true,
            entries: default_viewer_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeMediaConfig {
    #[serde(default = "default_true")]
    pub check_free_space: bool,
}

impl Default for MergeMediaConfig {
    fn default() -> Self {
        Self {
            check_free_space: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MergeConfig {
    pub output: MergeOutputConfig,
    pub viewer: MergeViewerConfig,
    pub media: MergeMediaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialMergeConfig {
    output: Option<MergeOutputConfig>,
    viewer: Option<MergeViewerConfig>,
    media: Option<MergeMediaConfig>,
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => {
            let trimmed = v.trim();
            match trimmed {
                "1" | "true" | "TRUE" | "yes" | "on" => true,
                "0" | "false" | "FALSE" | "no" | "off" => false,
                _ => fallback,
            }
        }
        Err(_) => fallback,
    }
}

fn env_or_csv(var: &str, fallback: &[String]) -> Vec<String> {
    match env::var(var) {
        Ok(v) => {
            let out = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect::<Vec<_>>();
            if out.is_empty() {
                fallback.to_vec()
            } else {
                out
            }
        }
        Err(_) => fallback.to_vec(),
    }
}

pub fn validate(cfg: &MergeConfig) -> Result<()> {
    if cfg.viewer.copy_bundle && cfg.viewer.entries.is_empty() {
        return Err(anyhow!(
            "invalid viewer entries: copy_bundle is on but no entries are listed"
        ));
    }
    for entry in &cfg.viewer.entries {
        if !is_safe_relative(entry) {
            return Err(anyhow!(
                "invalid viewer entry `{entry}`: must be a relative path inside the archive"
            ));
        }
    }
    Ok(())
}

fn merge_file_config(base: &mut MergeConfig, paths: &MergePaths) -> Result<()> {
    let path = &paths.config_file;
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: PartialMergeConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse merge config {}: {err}", path.display()))?;
    if let Some(output) = parsed.output {
        base.output = output;
    }
    if let Some(viewer) = parsed.viewer {
        base.viewer = viewer;
    }
    if let Some(media) = parsed.media {
        base.media = media;
    }
    Ok(())
}

pub fn load_config(paths: &MergePaths) -> Result<MergeConfig> {
    let mut cfg = MergeConfig::default();
    merge_file_config(&mut cfg, paths)?;

    cfg.output.pretty_json = env_or_bool("MERGE_PRETTY_JSON", cfg.output.pretty_json);
    cfg.output.legacy_aliases = env_or_bool("MERGE_LEGACY_ALIASES", cfg.output.legacy_aliases);
    cfg.output.fill_tweet_defaults = env_or_bool(
        "MERGE_FILL_TWEET_DEFAULTS",
        cfg.output.fill_tweet_defaults,
    );
    cfg.output.allow_existing = env_or_bool("MERGE_ALLOW_EXISTING", cfg.output.allow_existing);
    cfg.viewer.copy_bundle = env_or_bool("MERGE_COPY_VIEWER", cfg.viewer.copy_bundle);
    cfg.viewer.entries = env_or_csv("MERGE_VIEWER_ENTRIES", &cfg.viewer.entries);
    cfg.media.check_free_space =
        env_or_bool("MERGE_CHECK_FREE_SPACE", cfg.media.check_free_space);

    validate(&cfg)?;
    Ok(cfg)
}
