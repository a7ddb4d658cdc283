use crate::merge::datatype::DataType;
use crate::merge::loader::{Archive, MediaDir};
use crate::merge::record::Record;
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Legacy data-type name → current name.
const TYPE_RENAMES: [(&str, &str); 3] = [
    ("tweet", "tweets"),
    ("tweetHeader", "tweetHeaders"),
    ("tweetMedia", "tweetsMedia"),
];

const MEDIA_DIR_RENAMES: [(&str, &str); 1] = [("data/tweet_media", "data/tweets_media")];

pub fn canonical_type_name(name: &str) -> &str {
    TYPE_RENAMES
        .iter()
        .find(|(old, _)| *old == name)
        .map(|(_, new)| *new)
        .unwrap_or(name)
}

pub fn canonical_media_dir(dir: &str) -> String {
    let trimmed = dir.trim().trim_start_matches("./").trim_end_matches('/');
    MEDIA_DIR_RENAMES
        .iter()
        .find(|(old, _)| *old == trimmed)
        .map(|(_, new)| (*new).to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Rename data types and media directories to the current schema and flatten record
/// envelopes. Running it on an already-normalized archive changes nothing.
pub fn normalize_archive(archive: &mut Archive) {
    let records = std::mem::take(&mut archive.records);
    let mut renamed: BTreeMap<String, Vec<Record>> = BTreeMap::new();
    // BTreeMap iteration puts `tweet` before `tweets`, so legacy-named records come first.
    for (name, mut bucket) in records {
        let canonical = canonical_type_name(&name).to_string();
        let data_type = DataType::from_name(&canonical);
        for record in &mut bucket {
            normalize_record(&data_type, record);
        }
        renamed.entry(canonical).or_default().extend(bucket);
    }
    archive.records = renamed;

    let media_dirs = std::mem::take(&mut archive.media_dirs);
    archive.media_dirs = media_dirs
        .into_iter()
        .map(|(name, dir)| {
            let target = canonical_media_dir(&dir.target);
            (
                canonical_type_name(&name).to_string(),
                MediaDir {
                    source: dir.source,
                    target,
                },
            )
        })
        .collect();
}

pub fn normalize_record(data_type: &DataType, record: &mut Record) {
    record.flatten();
    if *data_type != DataType::Tweets {
        return;
    }
    let Some(fields) = record.fields_mut() else {
        return;
    };
    if !fields.contains_key("id_str")
        && let Some(id) = fields.get("id").cloned()
    {
        let id_str = match id {
            Value::Number(n) => Value::String(n.to_string()),
            other => other,
        };
        fields.insert("id_str".into(), id_str);
    }
    if !fields.contains_key("full_text")
        && let Some(text) = fields.get("text").cloned()
    {
        fields.insert("full_text".into(), text);
    }
}

pub fn fill_viewer_defaults(record: &mut Record) {
    let Some(tweet) = record.fields_mut() else {
        return;
    };
    let tweet_id = tweet
        .get("id_str")
        .or_else(|| tweet.get("id"))
        .cloned()
        .unwrap_or_else(|| json!("0"));
    let text_len = tweet
        .get("full_text")
        .and_then(Value::as_str)
        .map(|s| s.chars().count())
        .unwrap_or(0);

    tweet.entry("edit_info").or_insert_with(|| {
        json!({
            "initial": {
                "editTweetIds": [tweet_id],
                "editableUntil": "1970-01-01T00:00:00.000Z",
                "isEditEligible": false
            }
        })
    });
    tweet
        .entry("display_text_range")
        .or_insert_with(|| json!(["0", text_len.to_string()]));
    for flag in ["retweeted", "truncated", "possibly_sensitive", "favorited"] {
        tweet.entry(flag).or_insert(Value::Bool(false));
    }
    tweet.entry("entities").or_insert_with(|| {
        json!({
            "hashtags": [],
            "symbols": [],
            "user_mentions": [],
            "urls": []
        })
    });
    tweet.entry("lang").or_insert_with(|| json!("en"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::loader::TimestampSource;
    use chrono::{DateTime, Utc};
    use std::path::PathBuf;

    fn archive_with(records: Vec<(&str, Vec<Value>)>, media: Vec<(&str, &str)>) -> Archive {
        Archive {
            root: PathBuf::from("/a"),
            generated_at: DateTime::<Utc>::UNIX_EPOCH,
            timestamp_source: TimestampSource::Manifest,
            legacy: false,
            user_info: Value::Null,
            records: records
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.into_iter().map(Record::raw).collect()))
                .collect(),
            media_dirs: media
                .into_iter()
                .map(|(k, v)| (k.to_string(), MediaDir::new(v)))
                .collect(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn legacy_names_are_renamed_and_merged() {
        let mut archive = archive_with(
            vec![
                ("tweet", vec![json!({"tweet": {"id_str": "1"}})]),
                ("tweets", vec![json!({"tweet": {"id_str": "2"}})]),
            ],
            vec![("tweet", "data/tweet_media"), ("tweetMedia", "data/tweet_media/")],
        );
        normalize_archive(&mut archive);

        assert_eq!(archive.records.len(), 1);
        let tweets = &archive.records["tweets"];
        assert_eq!(tweets[0].field_str("id_str").as_deref(), Some("1"));
        assert_eq!(tweets[1].field_str("id_str").as_deref(), Some("2"));
        assert_eq!(archive.media_dirs["tweets"].target, "data/tweets_media");
        assert_eq!(archive.media_dirs["tweets"].source, "data/tweet_media");
        assert_eq!(archive.media_dirs["tweetsMedia"].target, "data/tweets_media");
        assert_eq!(archive.media_dirs["tweetsMedia"].source, "data/tweet_media/");
    }

    #[test]
    fn normalization_is_idempotent() {
        let mut archive = archive_with(
            vec![
                ("tweet", vec![json!({"tweet": {"id": 7, "text": "hi"}})]),
                ("profile", vec![json!({"profile": {"description": {"bio": "b"}}})]),
                ("block", vec![json!({"blocking": {"accountId": "3"}})]),
            ],
            vec![("profile", "data/profile_media")],
        );
        normalize_archive(&mut archive);
        let once_records = archive.records.clone();
        let once_media = archive.media_dirs.clone();

        normalize_archive(&mut archive);
        assert_eq!(archive.records, once_records);
        assert_eq!(archive.media_dirs, once_media);

        let tweet = &archive.records["tweets"][0];
        assert_eq!(tweet.field_str("id_str").as_deref(), Some("7"));
        assert_eq!(tweet.field_str("full_text").as_deref(), Some("hi"));
    }

    #[test]
    fn unknown_types_pass_through_unrenamed() {
        assert_eq!(canonical_type_name("mute"), "mute");
        assert_eq!(canonical_media_dir("data/profile_media"), "data/profile_media");
    }

    #[test]
    fn viewer_defaults_fill_only_missing_fields() {
        let mut record = Record::raw(json!({"tweet": {"id_str": "5", "full_text": "héllo", "lang": "fr"}}));
        record.flatten();
        fill_viewer_defaults(&mut record);
        let value = record.to_value();
        assert_eq!(value["tweet"]["lang"], "fr");
        assert_eq!(value["tweet"]["display_text_range"], json!(["0", "5"]));
        assert_eq!(value["tweet"]["edit_info"]["initial"]["editTweetIds"], json!(["5"]));
        assert_eq!(value["tweet"]["retweeted"], false);
        assert!(value["tweet"]["entities"]["urls"].is_array());

        let before = record.clone();
        fill_viewer_defaults(&mut record);
        assert_eq!(record, before);
    }
}
