use crate::archive::category::Category;
use crate::archive::pipeline::{Pipeline, queue};
use crate::archive::scx_log::{LineRecord, ScxLog};
use crate::archive::users::UserListing;
use crate::error::{ArchiveError, ArchiveResult};
use chrono::{DateTime, Datelike};
use chrono_tz::Tz;
use crossbeam::channel::Sender;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct GrepQuery {
    pub lobby: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub tz: Tz,
}

/// What the scan streams back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrepOutput {
    Record(LineRecord),
    /// `<root>/sca/<year>` does not exist; the scan moved on.
    MissingYear(i32),
}

enum Walked {
    File(PathBuf),
    MissingYear(i32),
}

/// Lobby ids look like `L1234`; a lower-case `l` is accepted too.
pub fn validate_lobby(lobby: &str) -> ArchiveResult<()> {
    if !matches!(lobby.chars().next(), Some('L' | 'l')) || lobby.chars().count() != 5 {
        return Err(ArchiveError::InvalidLobby(lobby.to_string()));
    }
    Ok(())
}

fn closed() -> ArchiveError {
    ArchiveError::Sink("grep consumer went away".to_string())
}

/// Visit every file under `dir` in lexical order, depth first.
fn walk_sorted<F>(dir: &Path, visit: &mut F) -> ArchiveResult<()>
where
    F: FnMut(PathBuf) -> ArchiveResult<()>,
{
    let mut entries = fs::read_dir(dir)
        .map_err(|err| ArchiveError::at(dir, err))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| ArchiveError::at(dir, err))?;
    entries.sort();

    for path in entries {
        let meta = fs::metadata(&path).map_err(|err| ArchiveError::at(&path, err))?;
        if meta.is_dir() {
            walk_sorted(&path, visit)?;
        } else if meta.is_file() {
            visit(path)?;
        } else {
            return Err(ArchiveError::NotRegularFile(path));
        }
    }
    Ok(())
}

fn walk_years(root: &Path, first: i32, last: i32, out: &Sender<Walked>) -> ArchiveResult<()> {
    let base = root.join(Category::Sca.as_str());
    for year in first..=last {
        let dir = base.join(year.to_string());
        if !dir.exists() {
            out.send(Walked::MissingYear(year)).map_err(|_| closed())?;
            continue;
        }
        walk_sorted(&dir, &mut |path| out.send(Walked::File(path)).map_err(|_| closed()))?;
    }
    Ok(())
}

/// Apply the lobby and participant filters, rewriting aliased names.
///
/// Every mapped participant is renamed, not just the one that matched.
pub fn filter_record(mut record: LineRecord, lobby: &str, users: &UserListing) -> Option<LineRecord> {
    if record.lobby != lobby {
        return None;
    }
    let mut matched = false;
    for player in &mut record.scores {
        let resolved = users.resolve(&player.name);
        matched |= users.allowed(resolved);
        if resolved != player.name {
            player.name = resolved.to_string();
        }
    }
    matched.then_some(record)
}

fn scan_file(
    path: &Path,
    query: &GrepQuery,
    users: &UserListing,
    out: &Sender<GrepOutput>,
) -> ArchiveResult<()> {
    let mut log = ScxLog::open(path, query.tz).map_err(|err| ArchiveError::scan(path, err))?;
    if *log.date() < query.start || *log.date() > query.end {
        return Ok(());
    }
    for record in log.by_ref() {
        if let Some(kept) = filter_record(record, &query.lobby, users) {
            out.send(GrepOutput::Record(kept)).map_err(|_| closed())?;
        }
    }
    log.finish().map_err(|err| ArchiveError::scan(path, err))
}

/// Stream every matching record of `<root>/sca/<year>/...` into `sink`.
///
/// Runs as two stages: a directory walker feeding a decode-and-filter stage,
/// joined by bounded queues of `capacity` items.
pub fn grep_logs<F>(
    root: &Path,
    query: GrepQuery,
    users: Arc<UserListing>,
    capacity: usize,
    sink: F,
) -> ArchiveResult<()>
where
    F: FnMut(GrepOutput) -> ArchiveResult<()>,
{
    validate_lobby(&query.lobby)?;

    let mut pipeline = Pipeline::new();
    let (path_tx, path_rx) = queue::<Walked>(capacity);
    let (out_tx, out_rx) = queue::<GrepOutput>(capacity);

    let walk_root = root.to_path_buf();
    let (first, last) = (query.start.year(), query.end.year());
    pipeline.spawn("grep-walk", move || walk_years(&walk_root, first, last, &path_tx))?;

    pipeline.spawn("grep-decode", move || {
        for walked in path_rx {
            match walked {
                Walked::MissingYear(year) => out_tx
                    .send(GrepOutput::MissingYear(year))
                    .map_err(|_| closed())?,
                Walked::File(path) => scan_file(&path, &query, &users, &out_tx)?,
            }
        }
        Ok(())
    })?;

    pipeline.drive(out_rx, sink)
}
