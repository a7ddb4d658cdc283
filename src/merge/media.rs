use crate::error::{MergeError, MergeWarning};
use crate::merge::datatype::DataType;
use crate::merge::loader::Archive;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MediaDirSummary {
    pub copied: usize,
    pub renamed: usize,
    pub already_present: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct MediaOutcome {
    pub dirs: BTreeMap<String, MediaDirSummary>,
    pub owners: BTreeMap<DataType, String>,
    pub warnings: Vec<MergeWarning>,
}

impl MediaOutcome {
    pub fn non_empty_dir(&self, data_type: &DataType, output_root: &Path) -> Option<&str> {
        let dir = self.owners.get(data_type)?;
        dir_has_files(&output_root.join(dir)).then_some(dir.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Copied(PathBuf),
    Renamed(PathBuf),
    AlreadyPresent(PathBuf),
}

fn dir_has_files(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.any(|e| e.is_ok_and(|e| e.path().is_file())))
        .unwrap_or(false)
}

fn media_read(path: &Path, err: impl ToString) -> MergeError {
    MergeError::MediaRead {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

fn collect_files(root: &Path, out: &mut Vec<PathBuf>, warnings: &mut Vec<MergeWarning>) {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) => {
            warnings.push(media_read(root, err).into_warning());
            return;
        }
    };
    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(err) => {
                warnings.push(media_read(root, err).into_warning());
                continue;
            }
        };
        if path.is_file() {
            out.push(path);
        } else if path.is_dir() {
            collect_files(&path, out, warnings);
        }
    }
}

pub fn candidate_name(file_name: &str, n: usize) -> String {
    if n == 0 {
        return file_name.to_string();
    }
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) => format!("{stem}_{n}.{ext}"),
        None => format!("{stem}_{n}"),
    }
}

fn modified_secs(meta: &Metadata) -> Option<u64> {
    meta.modified()
        .ok()?
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}

/// Same size and same modification second means the same asset. This is a heuristic:
/// distinct files can collide on both, and such a file is then treated as already present.
pub fn same_asset(existing: &Metadata, incoming: &Metadata) -> bool {
    existing.len() == incoming.len() && modified_secs(existing) == modified_secs(incoming)
}

/// Copy one media file into `target_dir`, resolving name collisions. Source read failures
/// are `MediaRead`; destination failures are fatal output errors.
pub fn place_file(source: &Path, target_dir: &Path) -> Result<Placement, MergeError> {
    let file_name = source
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| media_read(source, "file name is not valid UTF-8"))?;
    let source_meta = fs::metadata(source).map_err(|err| media_read(source, err))?;

    let mut n = 0usize;
    loop {
        let candidate = target_dir.join(candidate_name(file_name, n));
        match fs::metadata(&candidate) {
            Ok(existing) => {
                if same_asset(&existing, &source_meta) {
                    return Ok(Placement::AlreadyPresent(candidate));
                }
                n += 1;
                continue;
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(MergeError::output_write(candidate, err)),
        }

        // `create_new` makes the claim on a name atomic; losing the race re-checks it.
        let mut dest = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(MergeError::output_write(candidate, err)),
        };

        let copied = File::open(source).and_then(|mut src| io::copy(&mut src, &mut dest));
        if let Err(err) = copied {
            drop(dest);
            let _ = fs::remove_file(&candidate);
            if err.kind() == ErrorKind::StorageFull {
                return Err(MergeError::output_write(candidate, err));
            }
            return Err(media_read(source, err));
        }
        // Not every filesystem supports setting mtimes; the copy itself is still good.
        if let Ok(modified) = source_meta.modified() {
            let _ = dest.set_modified(modified);
        }

        return Ok(if n == 0 {
            Placement::Copied(candidate)
        } else {
            Placement::Renamed(candidate)
        });
    }
}

pub fn source_media_bytes(archives: &[Archive]) -> u64 {
    let mut total = 0u64;
    for archive in archives {
        let sources = archive
            .media_dirs
            .values()
            .map(|d| d.source.as_str())
            .collect::<BTreeSet<_>>();
        for source in sources {
            let mut files = Vec::new();
            collect_files(&archive.root.join(source), &mut files, &mut Vec::new());
            total += files
                .iter()
                .filter_map(|f| fs::metadata(f).ok())
                .map(|m| m.len())
                .sum::<u64>();
        }
    }
    total
}

pub fn check_free_space(output_root: &Path, needed_bytes: u64) -> Result<(), MergeError> {
    let available_bytes = fs2::available_space(output_root)
        .map_err(|err| MergeError::output_write(output_root, err))?;
    if available_bytes < needed_bytes {
        return Err(MergeError::InsufficientOutputSpace {
            path: output_root.to_path_buf(),
            needed_bytes,
            available_bytes,
        });
    }
    Ok(())
}

/// One output directory per data type, chosen by the newest archive that declares it.
/// Archives are copied oldest first.
pub fn consolidate_media(
    archives: &[Archive],
    output_root: &Path,
) -> Result<MediaOutcome, MergeError> {
    let mut out = MediaOutcome::default();

    // Later archives overwrite, so the newest declaration wins.
    for archive in archives {
        for (name, dir) in &archive.media_dirs {
            out.owners.insert(
                DataType::from_name(name).media_owner(),
                dir.target.clone(),
            );
        }
    }

    for archive in archives {
        let pairs = archive
            .media_dirs
            .iter()
            .filter_map(|(name, dir)| {
                let target = out.owners.get(&DataType::from_name(name).media_owner())?;
                let source = dir.source.trim().trim_start_matches("./").trim_end_matches('/');
                if source.is_empty() || source == "." {
                    return None;
                }
                Some((source.to_string(), target.clone()))
            })
            .collect::<BTreeSet<_>>();

        for (source, target) in pairs {
            let source_dir = archive.root.join(&source);
            if !source_dir.is_dir() {
                continue;
            }
            let target_dir = output_root.join(&target);
            fs::create_dir_all(&target_dir)
                .map_err(|err| MergeError::output_write(&target_dir, err))?;

            let mut files = Vec::new();
            let mut walk_warnings = Vec::new();
            collect_files(&source_dir, &mut files, &mut walk_warnings);
            files.sort();

            let summary = out.dirs.entry(target).or_default();
            summary.failed += walk_warnings.len();
            out.warnings.extend(walk_warnings);
            for file in files {
                match place_file(&file, &target_dir) {
                    Ok(Placement::Copied(_)) => summary.copied += 1,
                    Ok(Placement::Renamed(_)) => summary.renamed += 1,
                    Ok(Placement::AlreadyPresent(_)) => summary.already_present += 1,
                    Err(err) if err.is_recoverable() => {
                        summary.failed += 1;
                        out.warnings.push(err.into_warning());
                    }
                    Err(err) => return Err(err),
                }
            }
        }
    }

    Ok(out)
}
