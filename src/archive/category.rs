use crate::error::{ArchiveError, ArchiveResult};
use std::fmt;

/// Log feed tag, also the first path segment under the archive root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Sca,
    Scb,
    Scc,
    Scd,
    Sce,
}

impl Category {
    /// Feeds that arrive as interval fragments and get merged per day.
    pub const AGGREGATED: [Category; 4] = [Self::Scb, Self::Scc, Self::Scd, Self::Sce];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sca => "sca",
            Self::Scb => "scb",
            Self::Scc => "scc",
            Self::Scd => "scd",
            Self::Sce => "sce",
        }
    }

    pub fn from_prefix(prefix: &str) -> ArchiveResult<Self> {
        match prefix {
            "sca" => Ok(Self::Sca),
            "scb" => Ok(Self::Scb),
            "scc" => Ok(Self::Scc),
            "scd" => Ok(Self::Scd),
            "sce" => Ok(Self::Sce),
            other => Err(ArchiveError::UnsupportedCategory(other.to_string())),
        }
    }

    /// Category encoded in the first three bytes of a base file name.
    pub fn from_file_name(name: &str) -> ArchiveResult<Self> {
        let prefix = name
            .get(..3)
            .ok_or_else(|| ArchiveError::UnsupportedCategory(name.to_string()))?;
        Self::from_prefix(prefix)
    }

    /// `scc` carries html pages, the rest plain text.
    pub fn aggregate_suffix(self) -> &'static str {
        match self {
            Self::Scc => "html.gz",
            _ => "log.gz",
        }
    }

    pub fn aggregate_file_name(self, yyyymmdd: &str) -> String {
        format!("{}{}.{}", self.as_str(), yyyymmdd, self.aggregate_suffix())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
