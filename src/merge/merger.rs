use crate::merge::datatype::DataType;
use crate::merge::loader::Archive;
use crate::merge::record::Record;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct RecordMerger {
    merged: BTreeMap<DataType, Vec<Record>>,
}

impl RecordMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move one archive's records in. Callers absorb archives oldest-first.
    pub fn absorb(&mut self, archive: &mut Archive) {
        let records = std::mem::take(&mut archive.records);
        for (name, bucket) in records {
            let data_type = DataType::from_name(&name);
            if data_type.is_media_registry() && bucket.is_empty() {
                continue;
            }
            self.merged.entry(data_type).or_default().extend(bucket);
        }
    }

    pub fn counts(&self) -> BTreeMap<DataType, usize> {
        self.merged
            .iter()
            .map(|(k, v)| (k.clone(), v.len()))
            .collect()
    }

    pub fn finish(self) -> BTreeMap<DataType, Vec<Record>> {
        self.merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::loader::TimestampSource;
    use crate::merge::normalize::normalize_archive;
    use chrono::{DateTime, Utc};
    use serde_json::{Value, json};
    use std::path::PathBuf;

    fn archive(records: Vec<(&str, Vec<Value>)>) -> Archive {
        let mut archive = Archive {
            root: PathBuf::from("/a"),
            generated_at: DateTime::<Utc>::UNIX_EPOCH,
            timestamp_source: TimestampSource::Manifest,
            legacy: false,
            user_info: Value::Null,
            records: records
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.into_iter().map(Record::raw).collect()))
                .collect(),
            media_dirs: Default::default(),
            warnings: Vec::new(),
        };
        normalize_archive(&mut archive);
        archive
    }

    #[test]
    fn concatenates_in_archive_order() {
        let mut archives = vec![
            archive(vec![(
                "tweet",
                vec![json!({"tweet": {"id_str": "1"}}), json!({"tweet": {"id_str": "2"}})],
            )]),
            archive(vec![
                ("tweets", vec![json!({"tweet": {"id_str": "3"}})]),
                ("like", vec![json!({"like": {"tweetId": "9"}})]),
            ]),
        ];

        let mut merger = RecordMerger::new();
        for a in archives.iter_mut() {
            merger.absorb(a);
        }
        let merged = merger.finish();
        let ids = merged[&DataType::Tweets]
            .iter()
            .filter_map(|r| r.field_str("id_str"))
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(merged[&DataType::Like].len(), 1);
        assert!(archives.iter().all(|a| a.records.is_empty()));
    }

    #[test]
    fn media_only_entries_do_not_become_record_types() {
        let mut merger = RecordMerger::new();
        let mut a = archive(vec![("like", vec![json!({"like": {"tweetId": "1"}})])]);
        let mut b = archive(vec![
            ("like", vec![json!({"like": {"tweetId": "2"}})]),
            ("tweetsMedia", vec![]),
        ]);
        merger.absorb(&mut a);
        merger.absorb(&mut b);
        let counts = merger.counts();
        assert_eq!(counts[&DataType::Like], 2);
        assert!(!counts.contains_key(&DataType::from_name("tweetsMedia")));
    }
}
