use crate::archive::category::Category;
use crate::archive::match_set::{MatchSet, Slice, SliceCursor};
use crate::archive::warn::{self, WarnEvent};
use crate::error::{ArchiveError, ArchiveResult};
use chrono::DateTime;
use chrono_tz::Tz;
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    /// Fresh aggregate written from the fragments.
    Created,
    /// Aggregate already present and within tolerance; fragments dropped.
    Reconciled,
    /// Aggregate present but out of tolerance; deleted and written again.
    Rebuilt,
}

impl MergeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Reconciled => "reconciled",
            Self::Rebuilt => "rebuilt",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SliceOutcome {
    pub category: Category,
    pub date: DateTime<Tz>,
    pub target: PathBuf,
    pub fragments: usize,
    pub action: MergeAction,
}

#[derive(Debug, Clone, Copy)]
pub struct AggregateOptions {
    pub cutoff: DateTime<Tz>,
    pub tz: Tz,
    pub tolerance_pct: u64,
}

pub fn target_path(root: &Path, category: Category, date: &DateTime<Tz>) -> PathBuf {
    root.join(category.as_str())
        .join(date.format("%Y").to_string())
        .join(date.format("%m").to_string())
        .join(category.aggregate_file_name(&date.format("%Y%m%d").to_string()))
}

/// `existing` lies within `tolerance_pct` percent of `total`, bounds included.
pub fn within_tolerance(total: u64, existing: u64, tolerance_pct: u64) -> bool {
    let lower = total.saturating_mul(100u64.saturating_sub(tolerance_pct)) / 100;
    let upper = total.saturating_mul(100 + tolerance_pct) / 100;
    lower <= existing && existing <= upper
}

fn regular_file_len(path: &Path) -> ArchiveResult<u64> {
    let meta = fs::metadata(path).map_err(|err| ArchiveError::at(path, err))?;
    if !meta.is_file() {
        return Err(ArchiveError::NotRegularFile(path.to_path_buf()));
    }
    Ok(meta.len())
}

/// Compare an existing aggregate against the compressed size of its fragments.
pub fn is_complete(target: &Path, fragments: &[PathBuf], tolerance_pct: u64) -> ArchiveResult<bool> {
    let existing = regular_file_len(target)?;
    let mut total = 0u64;
    for fragment in fragments {
        total = total.saturating_add(regular_file_len(fragment)?);
    }
    Ok(within_tolerance(total, existing, tolerance_pct))
}

fn create_exclusive(path: &Path) -> io::Result<File> {
    let open = || OpenOptions::new().write(true).create_new(true).open(path);
    match open() {
        Err(err) if err.kind() == ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            open()
        }
        other => other,
    }
}

fn remove_fragment(path: &Path) -> ArchiveResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(ArchiveError::at(path, err)),
    }
}

fn encode_fragments(file: File, fragments: &[PathBuf]) -> ArchiveResult<()> {
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::best());
    for fragment in fragments {
        let input = File::open(fragment).map_err(|err| ArchiveError::at(fragment, err))?;
        let mut decoder = MultiGzDecoder::new(BufReader::new(input));
        io::copy(&mut decoder, &mut encoder).map_err(|err| ArchiveError::at(fragment, err))?;
        encoder.flush()?;
    }
    let writer = encoder.finish()?;
    let file = writer.into_inner().map_err(|err| err.into_error())?;
    file.sync_all()?;
    Ok(())
}

/// Write `target` from `fragments`, then drop the fragments.
///
/// The target is either complete and synced or removed again; fragments are
/// only deleted once it is durable.
fn write_aggregate(target: &Path, file: File, fragments: &[PathBuf]) -> ArchiveResult<()> {
    if let Err(err) = encode_fragments(file, fragments) {
        if let Err(rm_err) = fs::remove_file(target) {
            warn::emit(WarnEvent {
                code: "AGGREGATE_CLEANUP_FAILED",
                stage: "aggregate",
                action: "remove-partial",
                target: &target.display().to_string(),
                reason: "could not remove partially written aggregate",
                err: &rm_err.to_string(),
            });
        }
        return Err(err);
    }
    for fragment in fragments {
        remove_fragment(fragment)?;
    }
    Ok(())
}

/// Merge one slice into its daily aggregate.
pub fn aggregate_slice(
    root: &Path,
    category: Category,
    slice: &Slice<'_>,
    tolerance_pct: u64,
) -> ArchiveResult<SliceOutcome> {
    let target = target_path(root, category, &slice.date);
    let outcome = |action| SliceOutcome {
        category,
        date: slice.date,
        target: target.clone(),
        fragments: slice.fragments.len(),
        action,
    };

    let (file, action) = match create_exclusive(&target) {
        Ok(file) => (file, MergeAction::Created),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            if is_complete(&target, slice.fragments, tolerance_pct)? {
                for fragment in slice.fragments {
                    remove_fragment(fragment)?;
                }
                return Ok(outcome(MergeAction::Reconciled));
            }

            warn::emit(WarnEvent {
                code: "AGGREGATE_OUT_OF_TOLERANCE",
                stage: "aggregate",
                action: "rebuild",
                target: &target.display().to_string(),
                reason: "existing aggregate size outside tolerance of fragment sizes",
                err: "",
            });
            fs::remove_file(&target).map_err(|err| ArchiveError::at(&target, err))?;
            let file = create_exclusive(&target).map_err(|err| ArchiveError::at(&target, err))?;
            (file, MergeAction::Rebuilt)
        }
        Err(err) => return Err(ArchiveError::at(&target, err)),
    };

    write_aggregate(&target, file, slice.fragments)?;
    Ok(outcome(action))
}

/// Merge every eligible slice of one category, stopping at the first failure.
pub fn aggregate_category<F>(
    root: &Path,
    category: Category,
    opts: &AggregateOptions,
    on_slice: &mut F,
) -> ArchiveResult<usize>
where
    F: FnMut(&SliceOutcome),
{
    let matches = MatchSet::scan(root, category)?;
    if matches.is_empty() {
        return Ok(0);
    }

    let mut cursor = SliceCursor::default();
    let mut merged = 0usize;
    while let Some(slice) = matches.next_slice(&mut cursor, &opts.cutoff, opts.tz)? {
        let outcome = aggregate_slice(root, matches.category(), &slice, opts.tolerance_pct)?;
        on_slice(&outcome);
        merged += 1;
    }
    Ok(merged)
}

/// Run the aggregator over scb, scc, scd and sce in order.
pub fn aggregate_logs<F>(root: &Path, opts: &AggregateOptions, mut on_slice: F) -> ArchiveResult<usize>
where
    F: FnMut(&SliceOutcome),
{
    let mut merged = 0usize;
    for category in Category::AGGREGATED {
        merged += aggregate_category(root, category, opts, &mut on_slice)?;
    }
    Ok(merged)
}
