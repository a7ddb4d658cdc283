use crate::merge::datatype::{DataType, RecordKind};
use crate::merge::record::Record;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DedupSummary {
    pub before: usize,
    pub after: usize,
    pub removed: usize,
    pub keyless: usize,
}

pub fn dedup_collection(data_type: &DataType, records: Vec<Record>) -> (Vec<Record>, DedupSummary) {
    let before = records.len();
    let mut seen = HashSet::with_capacity(before);
    let mut keyless = 0usize;
    let kept = records
        .into_iter()
        .filter(|record| match data_type.identity_key(record) {
            Some(key) => seen.insert(key),
            None => {
                keyless += 1;
                true
            }
        })
        .collect::<Vec<_>>();
    let after = kept.len();
    (
        kept,
        DedupSummary {
            before,
            after,
            removed: before - after,
            keyless,
        },
    )
}

pub fn dedup_singleton(records: Vec<Record>) -> (Vec<Record>, DedupSummary) {
    let before = records.len();
    let kept = records.into_iter().last().into_iter().collect::<Vec<_>>();
    let after = kept.len();
    (
        kept,
        DedupSummary {
            before,
            after,
            removed: before - after,
            keyless: 0,
        },
    )
}

pub fn dedup_type(data_type: &DataType, records: Vec<Record>) -> (Vec<Record>, DedupSummary) {
    match data_type.kind() {
        RecordKind::Collection => dedup_collection(data_type, records),
        RecordKind::Singleton => dedup_singleton(records),
        RecordKind::Passthrough => {
            let count = records.len();
            (
                records,
                DedupSummary {
                    before: count,
                    after: count,
                    removed: 0,
                    keyless: 0,
                },
            )
        }
    }
}

#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub records: BTreeMap<DataType, Vec<Record>>,
    pub summaries: BTreeMap<DataType, DedupSummary>,
}

impl DedupOutcome {
    fn removed_where(&self, kind: RecordKind) -> usize {
        self.summaries
            .iter()
            .filter(|(data_type, _)| data_type.kind() == kind)
            .map(|(_, s)| s.removed)
            .sum()
    }

    pub fn duplicates_removed(&self) -> usize {
        self.removed_where(RecordKind::Collection)
    }

    pub fn snapshots_superseded(&self) -> usize {
        self.removed_where(RecordKind::Singleton)
    }
}

pub fn deduplicate(merged: BTreeMap<DataType, Vec<Record>>) -> DedupOutcome {
    let mut out = DedupOutcome::default();
    for (data_type, records) in merged {
        let (kept, summary) = dedup_type(&data_type, records);
        out.summaries.insert(data_type.clone(), summary);
        if !kept.is_empty() {
            out.records.insert(data_type, kept);
        }
    }
    out
}
