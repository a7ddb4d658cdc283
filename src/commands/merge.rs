use anyhow::Result;
use std::path::PathBuf;

use crate::commands::CommandReport;
use crate::merge::audit;
use crate::merge::config::load_config;
use crate::merge::orchestrator::{MergeOptions, MergeOrchestrator, MergeReport, MergeStage};
use crate::merge::paths::resolve_paths;
use crate::merge::progress::{NullObserver, ProgressEvent, ProgressObserver};
use crate::merge::warn;

#[derive(Debug, Clone)]
pub struct MergeCommandOptions {
    pub sources: Vec<PathBuf>,
    pub output: PathBuf,
    pub force: bool,
    pub quiet: bool,
}

/// Prints progress on stderr so stdout stays reserved for the report.
struct StderrObserver {
    stage: MergeStage,
}

impl ProgressObserver for StderrObserver {
    fn on_event(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::StageStarted { stage } => {
                self.stage = *stage;
                eprintln!("stage={stage}");
            }
            ProgressEvent::ArchiveLoaded {
                path,
                records,
                generated_at,
            } => eprintln!("  loaded {path} records={records} generated_at={generated_at}"),
            ProgressEvent::ArchiveSkipped { path, .. } => eprintln!("  skipped {path}"),
            ProgressEvent::TypeDeduplicated {
                data_type,
                kept,
                removed,
            } if *removed > 0 => eprintln!("  {data_type}: kept={kept} removed={removed}"),
            ProgressEvent::MediaConsolidated {
                directory,
                copied,
                renamed,
                already_present,
            } => eprintln!(
                "  {directory}: copied={copied} renamed={renamed} already_present={already_present}"
            ),
            ProgressEvent::Warning(warning) => warn::emit(self.stage.as_str(), warning),
            _ => {}
        }
    }
}

fn describe(report: &mut CommandReport, merged: &MergeReport) {
    report.detail(format!("output={}", merged.output));
    report.detail(format!("archives_loaded={}", merged.archives.len()));
    report.detail(format!("archives_skipped={}", merged.skipped.len()));
    for archive in &merged.archives {
        report.detail(format!(
            "archive={} user={} generated_at={} legacy={} records={}",
            archive.path, archive.user_name, archive.generated_at, archive.legacy, archive.records
        ));
    }
    for skipped in &merged.skipped {
        report.detail(format!("skipped={skipped}"));
    }
    for t in &merged.types {
        report.detail(format!(
            "type={} merged={} kept={} removed={}",
            t.data_type, t.merged, t.kept, t.removed
        ));
    }
    report.detail(format!("duplicates_removed={}", merged.duplicates_removed));
    report.detail(format!("snapshots_superseded={}", merged.snapshots_superseded));
    for (dir, m) in &merged.media {
        report.detail(format!(
            "media={dir} copied={} renamed={} already_present={} failed={}",
            m.copied, m.renamed, m.already_present, m.failed
        ));
    }
    match &merged.viewer_source {
        Some(source) => report.detail(format!("viewer_source={source}")),
        None => report.detail("viewer_source=none"),
    }
    report.detail(format!("warnings={}", merged.warnings.len()));
    for w in &merged.warnings {
        report.detail(format!("warning={} path={} {}", w.code.as_str(), w.path, w.message));
    }
}

pub fn run(opts: &MergeCommandOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config(&paths)?;
    let mut report = CommandReport::new("merge");

    let mut options = MergeOptions::from_config(&cfg);
    options.allow_existing |= opts.force;

    audit::append_event(
        &paths,
        "merge",
        "started",
        &format!(
            "sources={} output={}",
            opts.sources.len(),
            opts.output.display()
        ),
    )?;

    let mut orchestrator =
        MergeOrchestrator::new(opts.sources.clone(), opts.output.clone(), options);
    let result = if opts.quiet {
        orchestrator.run(&mut NullObserver)
    } else {
        orchestrator.run(&mut StderrObserver {
            stage: MergeStage::Idle,
        })
    };

    match result {
        Ok(merged) => {
            describe(&mut report, &merged);
            audit::append_event(
                &paths,
                "merge",
                "ok",
                &format!(
                    "archives={} duplicates_removed={} warnings={}",
                    merged.archives.len(),
                    merged.duplicates_removed,
                    merged.warnings.len()
                ),
            )?;
        }
        Err(err) => {
            report.issue(format!("merge failed: {err}"));
            audit::append_event(&paths, "merge", "failed", &err.to_string())?;
        }
    }

    Ok(report)
}
