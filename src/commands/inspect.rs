use anyhow::Result;
use chrono::SecondsFormat;
use std::path::PathBuf;

use crate::commands::CommandReport;
use crate::merge::loader::load_archive;
use crate::merge::normalize::normalize_archive;

#[derive(Debug, Clone)]
pub struct InspectOptions {
    pub source: PathBuf,
}

pub fn run(opts: &InspectOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("inspect");
    report.detail(format!("archive={}", opts.source.display()));

    let mut archive = match load_archive(&opts.source) {
        Ok(archive) => archive,
        Err(err) => {
            report.issue(err.to_string());
            return Ok(report);
        }
    };
    normalize_archive(&mut archive);

    report.detail(format!("user={}", archive.user_name()));
    report.detail(format!(
        "generated_at={}",
        archive.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    report.detail(format!("timestamp_source={:?}", archive.timestamp_source));
    report.detail(format!("legacy={}", archive.legacy));
    report.detail(format!("records={}", archive.record_count()));

    for (name, records) in &archive.records {
        let media = archive
            .media_dirs
            .get(name)
            .map(|dir| dir.source.as_str())
            .unwrap_or("none");
        report.detail(format!(
            "type={name} records={} media={media}",
            records.len()
        ));
    }
    for (name, dir) in &archive.media_dirs {
        if !archive.records.contains_key(name) {
            report.detail(format!("media_entry={name} dir={}", dir.source));
        }
    }
    for w in &archive.warnings {
        report.detail(format!("warning={} path={} {}", w.code.as_str(), w.path, w.message));
    }

    Ok(report)
}
