use crate::error::{MergeError, MergeWarning, WarningCode};
use crate::merge::config::MergeConfig;
use crate::merge::datatype::DataType;
use crate::merge::dedup::deduplicate;
use crate::merge::loader::{Archive, TimestampSource, load_archive};
use crate::merge::manifest::{
    MANIFEST_FILE, ManifestContext, README_FILE, build_manifest, plan_data_files,
    render_assignment, render_manifest,
};
use crate::merge::media::{MediaDirSummary, check_free_space, consolidate_media, source_media_bytes};
use crate::merge::merger::RecordMerger;
use crate::merge::normalize::{fill_viewer_defaults, normalize_archive};
use crate::merge::progress::{ProgressEvent, ProgressObserver};
use crate::merge::util::is_safe_relative;
use chrono::{SecondsFormat, Utc};
use fs2::FileExt;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub const LOCK_FILE: &str = ".archive-merger.lock";
const VIEWER_ENTRY_PAGE: &str = "Your archive.html";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStage {
    Idle,
    Loading,
    Normalizing,
    Merging,
    Deduplicating,
    ConsolidatingMedia,
    WritingOutput,
    Done,
    Failed,
}

impl MergeStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Normalizing => "normalizing",
            Self::Merging => "merging",
            Self::Deduplicating => "deduplicating",
            Self::ConsolidatingMedia => "consolidating_media",
            Self::WritingOutput => "writing_output",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for MergeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cooperative cancellation, honoured at stage boundaries and before the manifest write.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    pub pretty_json: bool,
    pub legacy_aliases: bool,
    pub fill_tweet_defaults: bool,
    pub allow_existing: bool,
    pub copy_viewer: bool,
    pub viewer_entries: Vec<String>,
    pub check_free_space: bool,
}

impl MergeOptions {
    pub fn from_config(cfg: &MergeConfig) -> Self {
        Self {
            pretty_json: cfg.output.pretty_json,
            legacy_aliases: cfg.output.legacy_aliases,
            fill_tweet_defaults: cfg.output.fill_tweet_defaults,
            allow_existing: cfg.output.allow_existing,
            copy_viewer: cfg.viewer.copy_bundle,
            viewer_entries: cfg.viewer.entries.clone(),
            check_free_space: cfg.media.check_free_space,
        }
    }
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self::from_config(&MergeConfig::default())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveSummary {
    pub path: String,
    pub user_name: String,
    pub generated_at: String,
    pub timestamp_source: TimestampSource,
    pub legacy: bool,
    pub records: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeSummary {
    pub data_type: String,
    pub merged: usize,
    pub kept: usize,
    pub removed: usize,
    pub keyless: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    pub output: String,
    pub archives: Vec<ArchiveSummary>,
    pub skipped: Vec<String>,
    pub types: Vec<TypeSummary>,
    pub duplicates_removed: usize,
    pub snapshots_superseded: usize,
    pub media: BTreeMap<String, MediaDirSummary>,
    pub files_written: Vec<String>,
    pub viewer_source: Option<String>,
    pub warnings: Vec<MergeWarning>,
}

struct OutputLock {
    file: File,
    path: PathBuf,
}

impl OutputLock {
    fn acquire(output: &Path) -> Result<Self, MergeError> {
        let path = output.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|err| MergeError::output_write(&path, err))?;
        file.try_lock_exclusive()
            .map_err(|_| MergeError::OutputLocked {
                path: output.to_path_buf(),
            })?;
        Ok(Self { file, path })
    }
}

impl Drop for OutputLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        let _ = fs::remove_file(&self.path);
    }
}

pub struct MergeOrchestrator {
    sources: Vec<PathBuf>,
    output: PathBuf,
    options: MergeOptions,
    abort: AbortHandle,
    stage: MergeStage,
}

impl MergeOrchestrator {
    /// `sources` are taken in caller order; ties in generation time keep that order.
    pub fn new(sources: Vec<PathBuf>, output: PathBuf, options: MergeOptions) -> Self {
        Self {
            sources,
            output,
            options,
            abort: AbortHandle::new(),
            stage: MergeStage::Idle,
        }
    }

    #[cfg(test)]
    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    #[cfg(test)]
    pub fn stage(&self) -> MergeStage {
        self.stage
    }

    fn advance(
        &mut self,
        to: MergeStage,
        observer: &mut dyn ProgressObserver,
    ) -> Result<(), MergeError> {
        if self.abort.is_aborted() {
            return Err(MergeError::Aborted { stage: to });
        }
        if to <= self.stage || self.stage == MergeStage::Failed {
            return Err(MergeError::StageOrder {
                from: self.stage,
                to,
            });
        }
        self.stage = to;
        observer.on_event(&ProgressEvent::StageStarted { stage: to });
        Ok(())
    }

    pub fn run(&mut self, observer: &mut dyn ProgressObserver) -> Result<MergeReport, MergeError> {
        match self.run_stages(observer) {
            Ok(report) => Ok(report),
            Err(err) => {
                self.stage = MergeStage::Failed;
                observer.on_event(&ProgressEvent::Finished {
                    stage: MergeStage::Failed,
                });
                Err(err)
            }
        }
    }

    fn run_stages(
        &mut self,
        observer: &mut dyn ProgressObserver,
    ) -> Result<MergeReport, MergeError> {
        let mut report = MergeReport {
            output: self.output.display().to_string(),
            ..MergeReport::default()
        };
        ensure_output_usable(&self.output, self.options.allow_existing)?;

        self.advance(MergeStage::Loading, observer)?;
        let mut archives = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            match load_archive(source) {
                Ok(archive) => archives.push(archive),
                Err(err) if err.is_recoverable() => {
                    let path = source.display().to_string();
                    observer.on_event(&ProgressEvent::ArchiveSkipped {
                        path: path.clone(),
                        reason: err.to_string(),
                    });
                    report.skipped.push(path);
                    warn(&mut report, observer, err.into_warning());
                }
                Err(err) => return Err(err),
            }
        }
        if archives.is_empty() {
            return Err(MergeError::NoValidArchives {
                attempted: self.sources.len(),
            });
        }
        archives.sort_by_key(|a| a.generated_at);
        for archive in &mut archives {
            report.archives.push(ArchiveSummary {
                path: archive.root.display().to_string(),
                user_name: archive.user_name().to_string(),
                generated_at: archive.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                timestamp_source: archive.timestamp_source,
                legacy: archive.legacy,
                records: archive.record_count(),
            });
            observer.on_event(&ProgressEvent::ArchiveLoaded {
                path: archive.root.display().to_string(),
                records: archive.record_count(),
                generated_at: archive.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            });
            for warning in std::mem::take(&mut archive.warnings) {
                warn(&mut report, observer, warning);
            }
        }

        self.advance(MergeStage::Normalizing, observer)?;
        for archive in &mut archives {
            normalize_archive(archive);
        }

        self.advance(MergeStage::Merging, observer)?;
        let mut merger = RecordMerger::new();
        for archive in &mut archives {
            merger.absorb(archive);
        }
        for (data_type, records) in merger.counts() {
            observer.on_event(&ProgressEvent::TypeMerged {
                data_type: data_type.to_string(),
                records,
            });
        }

        self.advance(MergeStage::Deduplicating, observer)?;
        let mut dedup = deduplicate(merger.finish());
        report.duplicates_removed = dedup.duplicates_removed();
        report.snapshots_superseded = dedup.snapshots_superseded();
        for (data_type, summary) in &dedup.summaries {
            report.types.push(TypeSummary {
                data_type: data_type.to_string(),
                merged: summary.before,
                kept: summary.after,
                removed: summary.removed,
                keyless: summary.keyless,
            });
            observer.on_event(&ProgressEvent::TypeDeduplicated {
                data_type: data_type.to_string(),
                kept: summary.after,
                removed: summary.removed,
            });
        }
        let plans = plan_data_files(&dedup.records, self.options.legacy_aliases)?;

        self.advance(MergeStage::ConsolidatingMedia, observer)?;
        fs::create_dir_all(&self.output)
            .map_err(|err| MergeError::output_write(&self.output, err))?;
        let _lock = OutputLock::acquire(&self.output)?;
        if self.options.check_free_space {
            check_free_space(&self.output, source_media_bytes(&archives))?;
        }
        let mut media = consolidate_media(&archives, &self.output)?;
        for warning in std::mem::take(&mut media.warnings) {
            warn(&mut report, observer, warning);
        }
        for (directory, summary) in &media.dirs {
            observer.on_event(&ProgressEvent::MediaConsolidated {
                directory: directory.clone(),
                copied: summary.copied,
                renamed: summary.renamed,
                already_present: summary.already_present,
            });
        }
        report.media = media.dirs.clone();

        self.advance(MergeStage::WritingOutput, observer)?;
        if self.options.fill_tweet_defaults
            && let Some(tweets) = dedup.records.get_mut(&DataType::Tweets)
        {
            tweets.iter_mut().for_each(fill_viewer_defaults);
        }
        for plan in &plans {
            let values = dedup
                .records
                .get(&plan.data_type)
                .map(|bucket| bucket.iter().map(|r| r.to_value()).collect::<Vec<Value>>())
                .unwrap_or_default();
            let target = format!("window.{}", plan.global_name);
            let path = self.output.join(&plan.file_name);
            let rendered = render_assignment(&target, &values, self.options.pretty_json)
                .map_err(|err| MergeError::ManifestGeneration {
                    data_type: plan.entry_name.clone(),
                    reason: err.to_string(),
                })?;
            write_file(&path, rendered.as_bytes())?;
            self.written(&mut report, observer, &plan.file_name);
        }

        let viewer_archive = archives
            .iter()
            .find(|a| a.root.join(VIEWER_ENTRY_PAGE).is_file());
        let mut has_readme = false;
        match viewer_archive {
            Some(archive) => {
                report.viewer_source = Some(archive.root.display().to_string());
                if self.options.copy_viewer {
                    self.copy_viewer(archive, &mut report, observer)?;
                }
                let readme = archive.root.join(README_FILE);
                if readme.is_file() {
                    let target = self.output.join(README_FILE);
                    copy_file(&readme, &target)?;
                    has_readme = true;
                    self.written(&mut report, observer, README_FILE);
                }
            }
            None => warn(
                &mut report,
                observer,
                MergeWarning::new(
                    WarningCode::MissingViewer,
                    "",
                    format!("no source archive contains `{VIEWER_ENTRY_PAGE}`"),
                ),
            ),
        }

        let media_dirs = media
            .owners
            .keys()
            .filter_map(|dt| {
                media
                    .non_empty_dir(dt, &self.output)
                    .map(|dir| (dt.clone(), dir.to_string()))
            })
            .collect::<BTreeMap<_, _>>();
        let user_info = archives
            .last()
            .map(|a| a.user_info.clone())
            .unwrap_or(Value::Null);
        let manifest = build_manifest(
            &plans,
            &media_dirs,
            &ManifestContext {
                user_info: &user_info,
                size_bytes: tree_size(&self.output),
                generated_at: Utc::now(),
                has_readme,
                legacy_aliases: self.options.legacy_aliases,
            },
        );
        let rendered = render_manifest(&manifest, self.options.pretty_json)?;
        if self.abort.is_aborted() {
            return Err(MergeError::Aborted {
                stage: MergeStage::Done,
            });
        }
        write_atomic(&self.output.join(MANIFEST_FILE), rendered.as_bytes())?;
        self.written(&mut report, observer, MANIFEST_FILE);

        self.advance(MergeStage::Done, observer)?;
        observer.on_event(&ProgressEvent::Finished {
            stage: MergeStage::Done,
        });
        Ok(report)
    }

    fn copy_viewer(
        &self,
        archive: &Archive,
        report: &mut MergeReport,
        observer: &mut dyn ProgressObserver,
    ) -> Result<(), MergeError> {
        for entry in &self.options.viewer_entries {
            if !is_safe_relative(entry) {
                warn(
                    report,
                    observer,
                    MergeWarning::new(WarningCode::UnsafePath, entry.clone(), "viewer entry skipped"),
                );
                continue;
            }
            let source = archive.root.join(entry);
            let target = self.output.join(entry);
            if source.is_dir() {
                copy_tree(&source, &target)?;
            } else if source.is_file() {
                copy_file(&source, &target)?;
            } else {
                continue;
            }
            self.written(report, observer, entry);
        }
        Ok(())
    }

    fn written(&self, report: &mut MergeReport, observer: &mut dyn ProgressObserver, rel: &str) {
        report.files_written.push(rel.to_string());
        observer.on_event(&ProgressEvent::FileWritten {
            path: self.output.join(rel).display().to_string(),
        });
    }
}

fn warn(report: &mut MergeReport, observer: &mut dyn ProgressObserver, warning: MergeWarning) {
    observer.on_event(&ProgressEvent::Warning(warning.clone()));
    report.warnings.push(warning);
}

fn ensure_output_usable(output: &Path, allow_existing: bool) -> Result<(), MergeError> {
    match fs::read_dir(output) {
        Ok(mut entries) => {
            if !allow_existing && entries.next().is_some() {
                return Err(MergeError::OutputNotEmpty {
                    path: output.to_path_buf(),
                });
            }
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(MergeError::output_write(output, err)),
    }
}

fn ensure_parent(path: &Path) -> Result<(), MergeError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| MergeError::output_write(parent, err))?;
    }
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), MergeError> {
    ensure_parent(path)?;
    fs::write(path, bytes).map_err(|err| MergeError::output_write(path, err))
}

/// Write through a sibling temp file so readers never see a half-written file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), MergeError> {
    ensure_parent(path)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp =
        tempfile::NamedTempFile::new_in(dir).map_err(|err| MergeError::output_write(dir, err))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|err| MergeError::output_write(path, err))?;
    tmp.persist(path)
        .map_err(|err| MergeError::output_write(path, err.error))?;
    Ok(())
}

fn copy_file(source: &Path, target: &Path) -> Result<(), MergeError> {
    ensure_parent(target)?;
    fs::copy(source, target)
        .map(|_| ())
        .map_err(|err| MergeError::output_write(target, err))
}

fn copy_tree(source: &Path, target: &Path) -> Result<(), MergeError> {
    fs::create_dir_all(target).map_err(|err| MergeError::output_write(target, err))?;
    let entries = fs::read_dir(source).map_err(|err| MergeError::output_write(source, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| MergeError::output_write(source, err))?;
        let from = entry.path();
        let to = target.join(entry.file_name());
        if from.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            copy_file(&from, &to)?;
        }
    }
    Ok(())
}

fn tree_size(root: &Path) -> u64 {
    fn walk(dir: &Path) -> io::Result<u64> {
        let mut total = 0;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            total += if meta.is_dir() {
                walk(&entry.path())?
            } else {
                meta.len()
            };
        }
        Ok(total)
    }
    walk(root).unwrap_or(0)
}
