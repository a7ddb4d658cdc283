use anyhow::Result;

use crate::commands::CommandReport;
use crate::env_loader::unknown_merge_env_keys;
use crate::merge::config::load_config;
use crate::merge::paths::resolve_paths;

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("config");

    report.detail(format!("merge_home={}", paths.merge_home.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    report.detail(format!(
        "config_file={} exists={}",
        paths.config_file.display(),
        paths.config_file.exists()
    ));

    match load_config(&paths) {
        Ok(cfg) => {
            report.detail(format!("output.pretty_json={}", cfg.output.pretty_json));
            report.detail(format!("output.legacy_aliases={}", cfg.output.legacy_aliases));
            report.detail(format!(
                "output.fill_tweet_defaults={}",
                cfg.output.fill_tweet_defaults
            ));
            report.detail(format!("output.allow_existing={}", cfg.output.allow_existing));
            report.detail(format!("viewer.copy_bundle={}", cfg.viewer.copy_bundle));
            report.detail(format!("viewer.entries={}", cfg.viewer.entries.join(",")));
            report.detail(format!("media.check_free_space={}", cfg.media.check_free_space));
        }
        Err(err) => report.issue(format!("config invalid: {err:#}")),
    }

    for key in unknown_merge_env_keys() {
        report.issue(format!("unknown env var {key} (not read by archive-merger)"));
    }

    Ok(report)
}
