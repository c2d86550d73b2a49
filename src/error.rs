use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by the archive engine.
///
/// Filesystem errors pass through untouched so callers can still inspect
/// `io::ErrorKind::NotFound`; every format problem gets its own variant.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{path}: {source}")]
    Path {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{0} is not a regular file, aborting")]
    NotRegularFile(PathBuf),
    #[error("malformed date segment `{segment}` in {name}")]
    MalformedDate { name: String, segment: String },
    #[error("local time {0} is ambiguous or missing in the reference timezone")]
    InvalidLocalTime(String),
    #[error("unexpected literal: {read:?}, should have been: {expected:?}")]
    UnexpectedLiteral { read: String, expected: String },
    #[error("failed parsing size {0:?}")]
    InvalidSize(String),
    #[error("log type {0} not yet implemented")]
    UnsupportedCategory(String),
    #[error("expected {expected} fields, got {got}")]
    FieldCount { expected: usize, got: usize },
    #[error("expected {expected} players, got {got}")]
    PlayerCount { expected: usize, got: usize },
    #[error("malformed {field}: {value:?}")]
    MalformedField { field: &'static str, value: String },
    #[error("unknown game mode {0:?}")]
    UnknownGameMode(String),
    #[error("invalid lobby format, expecting L[0-9]{{4}}, got {0}")]
    InvalidLobby(String),
    #[error("failed to parse {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: Box<ArchiveError>,
    },
    #[error("pipeline stage {0} failed to start or exited without reporting")]
    Pipeline(String),
    #[error("{0}")]
    Sink(String),
}

impl ArchiveError {
    pub fn at(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Path {
            path: path.into(),
            source,
        }
    }

    pub fn scan(path: impl Into<PathBuf>, source: ArchiveError) -> Self {
        Self::Scan {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// True when the underlying cause is a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Io(err) | Self::Path { source: err, .. } => err.kind() == io::ErrorKind::NotFound,
            Self::Scan { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;
