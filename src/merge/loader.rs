use crate::error::{MergeError, MergeWarning, WarningCode};
use crate::merge::record::Record;
use crate::merge::util::{
    assignment_payload, assignment_target, is_safe_relative, modified_time, parse_payload,
};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const MANIFEST_CANDIDATES: [&str; 2] = ["data/manifest.js", "manifest.js"];
const MANIFEST_GLOBAL: &str = "__THAR_CONFIG";
const LEGACY_INDEX: &str = "data/js/tweet_index.js";
const LEGACY_TWEETS_DIR: &str = "data/js/tweets";
const LEGACY_USER_DETAILS: &str = "data/js/user_details.js";
const LEGACY_CREATED_AT: &str = "%Y-%m-%d %H:%M:%S %z";
const MODERN_CREATED_AT: &str = "%a %b %d %H:%M:%S %z %Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimestampSource {
    Manifest,
    LegacyIndex,
    FileModified,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDir {
    pub source: String,
    pub target: String,
}

impl MediaDir {
    pub fn new(dir: impl Into<String>) -> Self {
        let dir = dir.into();
        Self {
            source: dir.clone(),
            target: dir,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Archive {
    pub root: PathBuf,
    pub generated_at: DateTime<Utc>,
    pub timestamp_source: TimestampSource,
    pub legacy: bool,
    pub user_info: Value,
    pub records: BTreeMap<String, Vec<Record>>,
    pub media_dirs: BTreeMap<String, MediaDir>,
    pub warnings: Vec<MergeWarning>,
}

impl Archive {
    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn user_name(&self) -> &str {
        self.user_info
            .get("userName")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceManifest {
    #[serde(default)]
    user_info: Value,
    #[serde(default)]
    archive_info: SourceArchiveInfo,
    #[serde(default)]
    data_types: BTreeMap<String, SourceDataType>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceArchiveInfo {
    generation_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceDataType {
    #[serde(default)]
    files: Vec<SourceFile>,
    media_directory: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceFile {
    file_name: String,
}

#[derive(Debug, Deserialize)]
struct LegacyIndexEntry {
    file_name: String,
    #[serde(default)]
    year: i32,
    #[serde(default)]
    month: u32,
}

fn invalid(path: &Path, reason: impl Into<String>) -> MergeError {
    MergeError::InvalidArchive {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn malformed(path: &Path, reason: impl Into<String>) -> MergeError {
    MergeError::MalformedRecordFile {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

pub fn find_manifest(root: &Path) -> Option<PathBuf> {
    MANIFEST_CANDIDATES
        .iter()
        .map(|rel| root.join(rel))
        .find(|p| p.is_file())
}

pub fn is_legacy_archive(root: &Path) -> bool {
    root.join(LEGACY_INDEX).is_file() && root.join(LEGACY_TWEETS_DIR).is_dir()
}

/// Validate and load one source archive. Broken individual data files become warnings on
/// the returned archive; only a missing or unreadable manifest fails the whole archive.
pub fn load_archive(root: &Path) -> Result<Archive, MergeError> {
    if !root.is_dir() {
        return Err(invalid(root, "not a directory"));
    }
    if is_legacy_archive(root) {
        return load_legacy_archive(root);
    }

    let manifest_path = find_manifest(root).ok_or_else(|| invalid(root, "missing manifest.js"))?;
    if !root.join("data").is_dir() {
        return Err(invalid(root, "missing data directory"));
    }

    let raw = fs::read_to_string(&manifest_path)
        .map_err(|err| invalid(root, format!("unreadable manifest: {err}")))?;
    let target = assignment_target(&raw).unwrap_or_default();
    if !target.ends_with(MANIFEST_GLOBAL) {
        return Err(invalid(
            root,
            format!("manifest does not assign {MANIFEST_GLOBAL}"),
        ));
    }
    let payload =
        assignment_payload(&raw).ok_or_else(|| invalid(root, "manifest has no object payload"))?;
    let manifest: SourceManifest = parse_payload(payload)
        .map_err(|err| invalid(root, format!("unparseable manifest: {err:#}")))?;

    let (generated_at, timestamp_source) =
        generation_timestamp(manifest.archive_info.generation_date.as_deref(), &manifest_path);

    let mut archive = Archive {
        root: root.to_path_buf(),
        generated_at,
        timestamp_source,
        legacy: false,
        user_info: manifest.user_info,
        records: BTreeMap::new(),
        media_dirs: BTreeMap::new(),
        warnings: Vec::new(),
    };

    for (name, entry) in manifest.data_types {
        if let Some(dir) = entry.media_directory {
            if is_safe_relative(&dir) {
                archive.media_dirs.insert(name.clone(), MediaDir::new(dir));
            } else {
                archive.warnings.push(MergeWarning::new(
                    WarningCode::UnsafePath,
                    root.join(&dir).display().to_string(),
                    format!("media directory of `{name}` escapes the archive"),
                ));
            }
        }

        if entry.files.is_empty() {
            continue;
        }
        let bucket = archive.records.entry(name.clone()).or_default();
        for file in entry.files {
            if !is_safe_relative(&file.file_name) {
                archive.warnings.push(MergeWarning::new(
                    WarningCode::UnsafePath,
                    file.file_name.clone(),
                    format!("data file of `{name}` escapes the archive"),
                ));
                continue;
            }
            match load_data_file(&root.join(&file.file_name)) {
                Ok(records) => bucket.extend(records),
                Err(err) => archive.warnings.push(err.into_warning()),
            }
        }
    }

    Ok(archive)
}

fn generation_timestamp(
    declared: Option<&str>,
    manifest_path: &Path,
) -> (DateTime<Utc>, TimestampSource) {
    if let Some(parsed) = declared
        .map(str::trim)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    {
        return (parsed.with_timezone(&Utc), TimestampSource::Manifest);
    }
    match modified_time(manifest_path) {
        Some(modified) => (DateTime::<Utc>::from(modified), TimestampSource::FileModified),
        None => (DateTime::<Utc>::UNIX_EPOCH, TimestampSource::Unknown),
    }
}

pub fn load_data_file(path: &Path) -> Result<Vec<Record>, MergeError> {
    let raw = fs::read_to_string(path).map_err(|err| malformed(path, err.to_string()))?;
    let payload = assignment_payload(&raw).ok_or_else(|| malformed(path, "no script assignment"))?;
    let parsed: Value = parse_payload(payload).map_err(|err| malformed(path, format!("{err:#}")))?;
    let Value::Array(items) = parsed else {
        return Err(malformed(path, "payload is not an array"));
    };
    Ok(items.into_iter().map(Record::raw).collect())
}

fn load_legacy_archive(root: &Path) -> Result<Archive, MergeError> {
    let index_path = root.join(LEGACY_INDEX);
    let raw = fs::read_to_string(&index_path)
        .map_err(|err| invalid(root, format!("unreadable tweet_index.js: {err}")))?;
    let payload =
        assignment_payload(&raw).ok_or_else(|| invalid(root, "tweet_index.js has no payload"))?;
    let index: Vec<LegacyIndexEntry> = parse_payload(payload)
        .map_err(|err| invalid(root, format!("unparseable tweet_index.js: {err:#}")))?;

    let latest = index
        .iter()
        .filter(|e| (1..=12).contains(&e.month))
        .max_by_key(|e| (e.year, e.month));
    let generated_at = latest
        .and_then(|e| Utc.with_ymd_and_hms(e.year, e.month, 1, 0, 0, 0).single())
        .or_else(|| Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).single())
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let mut archive = Archive {
        root: root.to_path_buf(),
        generated_at,
        timestamp_source: TimestampSource::LegacyIndex,
        legacy: true,
        user_info: legacy_user_info(root),
        records: BTreeMap::new(),
        media_dirs: BTreeMap::new(),
        warnings: Vec::new(),
    };

    let mut tweets = Vec::new();
    for entry in &index {
        if !is_safe_relative(&entry.file_name) {
            archive.warnings.push(MergeWarning::new(
                WarningCode::UnsafePath,
                entry.file_name.clone(),
                "legacy tweet file escapes the archive",
            ));
            continue;
        }
        match load_legacy_tweet_file(&root.join(&entry.file_name)) {
            Ok(records) => tweets.extend(records),
            Err(err) => archive.warnings.push(err.into_warning()),
        }
    }
    archive.records.insert("tweets".to_string(), tweets);

    Ok(archive)
}

fn legacy_user_info(root: &Path) -> Value {
    let details = fs::read_to_string(root.join(LEGACY_USER_DETAILS))
        .ok()
        .and_then(|raw| {
            let payload = assignment_payload(&raw)?;
            parse_payload::<Value>(payload).ok()
        })
        .unwrap_or(Value::Null);
    let field = |key: &str| {
        details
            .get(key)
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| "unknown".to_string())
    };
    json!({
        "accountId": field("id"),
        "userName": field("screen_name"),
        "displayName": field("full_name"),
    })
}

fn load_legacy_tweet_file(path: &Path) -> Result<Vec<Record>, MergeError> {
    let raw = fs::read_to_string(path).map_err(|err| malformed(path, err.to_string()))?;
    let payload = assignment_payload(&raw).ok_or_else(|| malformed(path, "no script assignment"))?;
    let parsed: Vec<Value> =
        parse_payload(payload).map_err(|err| malformed(path, format!("{err:#}")))?;
    Ok(parsed
        .iter()
        .map(|old| Record::raw(convert_legacy_tweet(old)))
        .collect())
}

fn scalar_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Reshape a Grailbird tweet into the wrapped `{"tweet": {...}}` form of current exports.
pub fn convert_legacy_tweet(old: &Value) -> Value {
    let created_at = old.get("created_at").and_then(Value::as_str).unwrap_or("");
    let modern_created_at = DateTime::parse_from_str(created_at, LEGACY_CREATED_AT)
        .map(|dt| dt.format(MODERN_CREATED_AT).to_string())
        .unwrap_or_else(|_| created_at.to_string());

    let id = scalar_string(old.get("id"));
    let id_str = old
        .get("id_str")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| id.clone());

    let mut tweet = Map::new();
    tweet.insert("id_str".into(), Value::String(id_str));
    tweet.insert("id".into(), Value::String(id));
    tweet.insert(
        "full_text".into(),
        old.get("text").cloned().unwrap_or_else(|| json!("")),
    );
    tweet.insert("created_at".into(), Value::String(modern_created_at));
    tweet.insert(
        "source".into(),
        old.get("source").cloned().unwrap_or_else(|| json!("")),
    );
    tweet.insert(
        "entities".into(),
        old.get("entities").cloned().unwrap_or_else(|| json!({})),
    );
    for key in ["favorite_count", "retweet_count"] {
        let count = match old.get(key) {
            None | Some(Value::Null) => "0".to_string(),
            other => scalar_string(other),
        };
        tweet.insert(key.into(), Value::String(count));
    }

    let non_empty = |key: &str| {
        old.get(key)
            .filter(|v| !v.is_null() && v.as_str() != Some(""))
            .cloned()
    };
    if let Some(status) = non_empty("in_reply_to_status_id_str") {
        tweet.insert("in_reply_to_status_id_str".into(), status);
        tweet.insert(
            "in_reply_to_status_id".into(),
            Value::String(scalar_string(old.get("in_reply_to_status_id"))),
        );
    }
    if let Some(user) = non_empty("in_reply_to_user_id_str") {
        tweet.insert("in_reply_to_user_id_str".into(), user);
        tweet.insert(
            "in_reply_to_user_id".into(),
            Value::String(scalar_string(old.get("in_reply_to_user_id"))),
        );
    }
    if let Some(name) = non_empty("in_reply_to_screen_name") {
        tweet.insert("in_reply_to_screen_name".into(), name);
    }
    if old
        .get("retweeted_status")
        .is_some_and(|v| !v.is_null() && v != &json!({}))
    {
        tweet.insert("retweeted".into(), Value::Bool(true));
    }

    let mut outer = Map::new();
    outer.insert("tweet".into(), Value::Object(tweet));
    Value::Object(outer)
}
