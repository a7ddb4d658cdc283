use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::merge::orchestrator::MergeStage;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("invalid archive {}: {reason}", path.display())]
    InvalidArchive { path: PathBuf, reason: String },
    #[error("malformed record file {}: {reason}", path.display())]
    MalformedRecordFile { path: PathBuf, reason: String },
    #[error("media file unreadable {}: {reason}", path.display())]
    MediaRead { path: PathBuf, reason: String },
    #[error(
        "insufficient space under {}: need {needed_bytes} bytes, {available_bytes} available",
        path.display()
    )]
    InsufficientOutputSpace {
        path: PathBuf,
        needed_bytes: u64,
        available_bytes: u64,
    },
    #[error("failed to write {}: {source}", path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("manifest generation failed for `{data_type}`: {reason}")]
    ManifestGeneration { data_type: String, reason: String },
    #[error("no valid archives loaded ({attempted} attempted)")]
    NoValidArchives { attempted: usize },
    #[error("output directory {} is not empty (use --force to merge into it)", path.display())]
    OutputNotEmpty { path: PathBuf },
    #[error("output directory {} is locked by another merge run", path.display())]
    OutputLocked { path: PathBuf },
    #[error("merge aborted before stage {stage:?}")]
    Aborted { stage: MergeStage },
    #[error("illegal stage transition {from:?} -> {to:?}")]
    StageOrder { from: MergeStage, to: MergeStage },
}

impl MergeError {
    pub fn output_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::StorageFull {
            return Self::InsufficientOutputSpace {
                path,
                needed_bytes: 0,
                available_bytes: 0,
            };
        }
        Self::OutputWrite { path, source }
    }

    /// Per-archive and per-file failures degrade to warnings; everything else ends the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidArchive { .. } | Self::MalformedRecordFile { .. } | Self::MediaRead { .. }
        )
    }

    pub fn warning_code(&self) -> WarningCode {
        match self {
            Self::InvalidArchive { .. } => WarningCode::InvalidArchive,
            Self::MalformedRecordFile { .. } => WarningCode::MalformedRecordFile,
            Self::MediaRead { .. } => WarningCode::MediaRead,
            _ => WarningCode::Other,
        }
    }

    pub fn into_warning(self) -> MergeWarning {
        let code = self.warning_code();
        let path = match &self {
            Self::InvalidArchive { path, .. }
            | Self::MalformedRecordFile { path, .. }
            | Self::MediaRead { path, .. }
            | Self::InsufficientOutputSpace { path, .. }
            | Self::OutputWrite { path, .. }
            | Self::OutputNotEmpty { path }
            | Self::OutputLocked { path } => path.display().to_string(),
            _ => String::new(),
        };
        MergeWarning {
            code,
            path,
            message: self.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WarningCode {
    InvalidArchive,
    MalformedRecordFile,
    MediaRead,
    UnsafePath,
    MissingViewer,
    Other,
}

impl WarningCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArchive => "INVALID_ARCHIVE",
            Self::MalformedRecordFile => "MALFORMED_RECORD_FILE",
            Self::MediaRead => "MEDIA_READ",
            Self::UnsafePath => "UNSAFE_PATH",
            Self::MissingViewer => "MISSING_VIEWER",
            Self::Other => "OTHER",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeWarning {
    pub code: WarningCode,
    pub path: String,
    pub message: String,
}

impl MergeWarning {
    pub fn new(code: WarningCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            path: path.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_file_errors_are_recoverable() {
        let err = MergeError::MalformedRecordFile {
            path: PathBuf::from("/a/data/like.js"),
            reason: "no payload".into(),
        };
        assert!(err.is_recoverable());
        let warning = err.into_warning();
        assert_eq!(warning.code, WarningCode::MalformedRecordFile);
        assert_eq!(warning.path, "/a/data/like.js");
    }

    #[test]
    fn storage_full_maps_to_insufficient_space() {
        let err = MergeError::output_write(
            "/out/data/tweets.js",
            std::io::Error::from(std::io::ErrorKind::StorageFull),
        );
        assert!(matches!(err, MergeError::InsufficientOutputSpace { .. }));
        assert!(!err.is_recoverable());
    }
}
