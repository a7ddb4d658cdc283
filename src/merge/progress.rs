use crate::error::MergeWarning;
use crate::merge::orchestrator::MergeStage;
use serde::Serialize;
use std::sync::mpsc::Sender;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    StageStarted {
        stage: MergeStage,
    },
    ArchiveLoaded {
        path: String,
        records: usize,
        generated_at: String,
    },
    ArchiveSkipped {
        path: String,
        reason: String,
    },
    TypeMerged {
        data_type: String,
        records: usize,
    },
    TypeDeduplicated {
        data_type: String,
        kept: usize,
        removed: usize,
    },
    MediaConsolidated {
        directory: String,
        copied: usize,
        renamed: usize,
        already_present: usize,
    },
    FileWritten {
        path: String,
    },
    Warning(MergeWarning),
    Finished {
        stage: MergeStage,
    },
}

/// Receives progress from a running merge. The engine never depends on how it is shown.
pub trait ProgressObserver {
    fn on_event(&mut self, event: &ProgressEvent);
}

impl ProgressObserver for Vec<ProgressEvent> {
    fn on_event(&mut self, event: &ProgressEvent) {
        self.push(event.clone());
    }
}

impl ProgressObserver for Sender<ProgressEvent> {
    fn on_event(&mut self, event: &ProgressEvent) {
        // The receiving side may have gone away; the merge carries on regardless.
        let _ = self.send(event.clone());
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ProgressObserver for NullObserver {
    fn on_event(&mut self, _event: &ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn channel_observer_forwards_events() {
        let (tx, rx) = mpsc::channel();
        let mut observer = tx;
        observer.on_event(&ProgressEvent::StageStarted {
            stage: MergeStage::Loading,
        });
        assert_eq!(
            rx.recv().expect("event"),
            ProgressEvent::StageStarted {
                stage: MergeStage::Loading
            }
        );
    }

    #[test]
    fn events_serialize_with_tag() {
        let event = ProgressEvent::TypeDeduplicated {
            data_type: "tweets".into(),
            kept: 2,
            removed: 1,
        };
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["event"], "type_deduplicated");
        assert_eq!(value["removed"], 1);
    }
}
