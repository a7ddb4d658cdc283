use crate::error::MergeError;
use crate::merge::datatype::DataType;
use crate::merge::record::Record;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub const MANIFEST_FILE: &str = "data/manifest.js";
pub const README_FILE: &str = "data/README.txt";
const MANIFEST_TARGET: &str = "window.__THAR_CONFIG";
const MAX_PART_SIZE_BYTES: &str = "53687091200";
const LEGACY_TWEET_ENTRY: &str = "tweet";
const LEGACY_TWEET_FILE: &str = "data/tweet.js";
const LEGACY_TWEET_MEDIA_ENTRY: &str = "tweetMedia";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFilePlan {
    pub entry_name: String,
    pub data_type: DataType,
    pub file_name: String,
    pub global_name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub user_info: Value,
    pub archive_info: ArchiveInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readme_info: Option<ReadmeInfo>,
    pub data_types: BTreeMap<String, DataTypeEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveInfo {
    pub size_bytes: String,
    pub generation_date: String,
    pub is_partial_archive: bool,
    pub max_part_size_bytes: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadmeInfo {
    pub file_name: String,
    pub directory: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTypeEntry {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_directory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub file_name: String,
    pub global_name: String,
    pub count: String,
}

pub fn global_name_for(type_name: &str) -> String {
    format!("YTD.{}.part0", type_name.replace('-', "_"))
}

pub fn is_identifier_path(name: &str) -> bool {
    name.split('.').all(|segment| {
        let mut chars = segment.chars();
        let head_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$');
        head_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    })
}

fn plan_for(
    entry_name: &str,
    data_type: &DataType,
    file_name: String,
    global_name: String,
    count: usize,
) -> Result<DataFilePlan, MergeError> {
    if !is_identifier_path(&global_name) {
        return Err(MergeError::ManifestGeneration {
            data_type: entry_name.to_string(),
            reason: format!("`{global_name}` is not a valid global name"),
        });
    }
    Ok(DataFilePlan {
        entry_name: entry_name.to_string(),
        data_type: data_type.clone(),
        file_name,
        global_name,
        count,
    })
}

/// Resolve file and global names for every surviving data type. Runs before anything is
/// written so a type that cannot be named fails the run with an untouched output tree.
pub fn plan_data_files(
    records: &BTreeMap<DataType, Vec<Record>>,
    legacy_aliases: bool,
) -> Result<Vec<DataFilePlan>, MergeError> {
    let mut plans = Vec::with_capacity(records.len() + 1);
    for (data_type, bucket) in records {
        plans.push(plan_for(
            data_type.name(),
            data_type,
            data_type.output_file_name(),
            global_name_for(data_type.name()),
            bucket.len(),
        )?);
        if legacy_aliases && *data_type == DataType::Tweets {
            plans.push(plan_for(
                LEGACY_TWEET_ENTRY,
                data_type,
                LEGACY_TWEET_FILE.to_string(),
                global_name_for(LEGACY_TWEET_ENTRY),
                bucket.len(),
            )?);
        }
    }
    Ok(plans)
}

#[derive(Debug, Clone)]
pub struct ManifestContext<'a> {
    pub user_info: &'a Value,
    pub size_bytes: u64,
    pub generated_at: DateTime<Utc>,
    pub has_readme: bool,
    pub legacy_aliases: bool,
}

/// `media` maps each data type to its consolidated, non-empty output directory.
pub fn build_manifest(
    plans: &[DataFilePlan],
    media: &BTreeMap<DataType, String>,
    ctx: &ManifestContext<'_>,
) -> Manifest {
    let mut data_types: BTreeMap<String, DataTypeEntry> = BTreeMap::new();

    for plan in plans {
        let entry = data_types.entry(plan.entry_name.clone()).or_default();
        entry.files.push(FileEntry {
            file_name: plan.file_name.clone(),
            global_name: plan.global_name.clone(),
            count: plan.count.to_string(),
        });
        if let Some(dir) = media.get(&plan.data_type) {
            entry.media_directory = Some(dir.clone());
        }
    }

    for (data_type, dir) in media {
        let registry = if data_type.is_media_registry() {
            data_type.name().to_string()
        } else {
            data_type.media_registry_name()
        };
        data_types
            .entry(registry)
            .or_default()
            .media_directory = Some(dir.clone());
        if ctx.legacy_aliases && *data_type == DataType::Tweets {
            data_types
                .entry(LEGACY_TWEET_MEDIA_ENTRY.to_string())
                .or_default()
                .media_directory = Some(dir.clone());
        }
    }

    Manifest {
        user_info: ctx.user_info.clone(),
        archive_info: ArchiveInfo {
            size_bytes: ctx.size_bytes.to_string(),
            generation_date: ctx
                .generated_at
                .format("%Y-%m-%dT%H:%M:%S%.3fZ")
                .to_string(),
            is_partial_archive: false,
            max_part_size_bytes: MAX_PART_SIZE_BYTES.to_string(),
        },
        readme_info: ctx.has_readme.then(|| ReadmeInfo {
            file_name: README_FILE.to_string(),
            directory: "data/".to_string(),
            name: "README.txt".to_string(),
        }),
        data_types,
    }
}

pub fn render_assignment<T: Serialize + ?Sized>(
    target: &str,
    payload: &T,
    pretty: bool,
) -> Result<String, serde_json::Error> {
    let body = if pretty {
        serde_json::to_string_pretty(payload)?
    } else {
        serde_json::to_string(payload)?
    };
    Ok(format!("{target} = {body};"))
}

pub fn render_manifest(manifest: &Manifest, pretty: bool) -> Result<String, MergeError> {
    render_assignment(MANIFEST_TARGET, manifest, pretty).map_err(|err| {
        MergeError::ManifestGeneration {
            data_type: "manifest".to_string(),
            reason: err.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(entries: &[(DataType, usize)]) -> BTreeMap<DataType, Vec<Record>> {
        entries
            .iter()
            .map(|(dt, n)| {
                (
                    dt.clone(),
                    (0..*n).map(|i| Record::raw(json!({"i": i}))).collect(),
                )
            })
            .collect()
    }

    fn ctx(user_info: &Value, legacy_aliases: bool) -> ManifestContext<'_> {
        ManifestContext {
            user_info,
            size_bytes: 1234,
            generated_at: DateTime::<Utc>::UNIX_EPOCH,
            has_readme: false,
            legacy_aliases,
        }
    }

    #[test]
    fn global_names_follow_viewer_convention() {
        assert_eq!(global_name_for("tweets"), "YTD.tweets.part0");
        assert_eq!(global_name_for("direct-messages"), "YTD.direct_messages.part0");
        assert!(is_identifier_path("YTD.directMessagesGroup.part0"));
        assert!(!is_identifier_path("YTD.my type.part0"));
        assert!(!is_identifier_path("YTD..part0"));
        assert!(!is_identifier_path("YTD.9lives.part0"));
    }

    #[test]
    fn plan_adds_legacy_tweet_alias() {
        let plans = plan_data_files(&records(&[(DataType::Tweets, 2), (DataType::Like, 1)]), true)
            .expect("plan");
        let names = plans
            .iter()
            .map(|p| (p.entry_name.as_str(), p.file_name.as_str(), p.global_name.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                ("tweets", "data/tweets.js", "YTD.tweets.part0"),
                ("tweet", "data/tweet.js", "YTD.tweet.part0"),
                ("like", "data/like.js", "YTD.like.part0"),
            ]
        );
        assert!(plans.iter().all(|p| p.count > 0));
    }

    #[test]
    fn unnameable_type_fails_planning() {
        let err = plan_data_files(&records(&[(DataType::from_name("bad type"), 1)]), false)
            .expect_err("invalid global");
        assert!(matches!(err, MergeError::ManifestGeneration { .. }));
    }

    #[test]
    fn media_types_get_companion_entries() {
        let plans = plan_data_files(
            &records(&[(DataType::Tweets, 3), (DataType::Profile, 1)]),
            true,
        )
        .expect("plan");
        let mut media = BTreeMap::new();
        media.insert(DataType::Tweets, "data/tweets_media".to_string());
        media.insert(DataType::from_name("tweetsMedia"), "data/tweets_media".to_string());
        media.insert(DataType::Profile, "data/profile_media".to_string());

        let user = json!({"userName": "alice"});
        let manifest = build_manifest(&plans, &media, &ctx(&user, true));
        let value = serde_json::to_value(&manifest).expect("serialize");
        let types = &value["dataTypes"];

        assert_eq!(types["tweets"]["mediaDirectory"], "data/tweets_media");
        assert_eq!(types["tweets"]["files"][0]["count"], "3");
        assert_eq!(types["tweet"]["mediaDirectory"], "data/tweets_media");
        assert_eq!(types["tweetsMedia"], json!({"mediaDirectory": "data/tweets_media"}));
        assert_eq!(types["tweetMedia"], json!({"mediaDirectory": "data/tweets_media"}));
        assert_eq!(types["profileMedia"], json!({"mediaDirectory": "data/profile_media"}));
        assert_eq!(value["userInfo"]["userName"], "alice");
        assert_eq!(value["archiveInfo"]["sizeBytes"], "1234");
        assert_eq!(value["archiveInfo"]["generationDate"], "1970-01-01T00:00:00.000Z");
        assert_eq!(value["archiveInfo"]["maxPartSizeBytes"], "53687091200");
        assert!(value.get("readmeInfo").is_none());
    }

    #[test]
    fn no_legacy_entries_without_aliases() {
        let plans = plan_data_files(&records(&[(DataType::Tweets, 1)]), false).expect("plan");
        let mut media = BTreeMap::new();
        media.insert(DataType::Tweets, "data/tweets_media".to_string());
        let manifest = build_manifest(&plans, &media, &ctx(&Value::Null, false));
        assert!(!manifest.data_types.contains_key("tweet"));
        assert!(!manifest.data_types.contains_key("tweetMedia"));
        assert!(manifest.data_types.contains_key("tweetsMedia"));
    }

    #[test]
    fn manifest_renders_as_script_assignment() {
        let manifest = build_manifest(&[], &BTreeMap::new(), &ctx(&Value::Null, false));
        let rendered = render_manifest(&manifest, false).expect("render");
        assert!(rendered.starts_with("window.__THAR_CONFIG = {\"userInfo\":null,"));
        assert!(rendered.ends_with("\"dataTypes\":{}};"));
    }
}
