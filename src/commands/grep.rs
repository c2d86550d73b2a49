use anyhow::{Context as _, Result};
use clap::ValueEnum;
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::archive::grep::{GrepOutput, GrepQuery, grep_logs, validate_lobby};
use crate::archive::scx_log::{LineFormat, LineRecord};
use crate::archive::users::{UserListing, UserStorage};
use crate::archive::util::{parse_day, today_midnight};
use crate::archive::warn::{self, WarnEvent};
use crate::commands::{CommandReport, load_context};
use crate::error::{ArchiveError, ArchiveResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// The archive's own line format.
    #[default]
    Tenhou,
    /// One JSON array.
    Json,
    /// One JSON object per line.
    Jsonlines,
}

#[derive(Debug, Clone, Default)]
pub struct GrepOptions {
    pub root: Option<PathBuf>,
    pub lobby: String,
    pub start: Option<String>,
    pub end: Option<String>,
    pub users_file: Option<PathBuf>,
    pub format: OutputFormat,
}

#[derive(Serialize)]
struct ScoreView<'a> {
    name: &'a str,
    score: f64,
}

#[derive(Serialize)]
struct RecordView<'a> {
    lobby: &'a str,
    start: String,
    game_mode: &'a str,
    players: usize,
    scores: Vec<ScoreView<'a>>,
}

impl<'a> From<&'a LineRecord> for RecordView<'a> {
    fn from(record: &'a LineRecord) -> Self {
        Self {
            lobby: &record.lobby,
            start: record.start.to_rfc3339(),
            game_mode: &record.game_mode,
            players: record.player_count(),
            scores: record
                .scores
                .iter()
                .map(|s| ScoreView {
                    name: &s.name,
                    score: s.score.value(),
                })
                .collect(),
        }
    }
}

struct RecordWriter<'w, W: Write> {
    format: OutputFormat,
    out: &'w mut W,
    written: usize,
}

fn json_line(record: &LineRecord) -> ArchiveResult<String> {
    serde_json::to_string(&RecordView::from(record)).map_err(|err| ArchiveError::Sink(err.to_string()))
}

impl<'w, W: Write> RecordWriter<'w, W> {
    fn new(format: OutputFormat, out: &'w mut W) -> Self {
        Self {
            format,
            out,
            written: 0,
        }
    }

    fn begin(&mut self) -> ArchiveResult<()> {
        if self.format == OutputFormat::Json {
            writeln!(self.out, "[")?;
        }
        Ok(())
    }

    fn write(&mut self, record: &LineRecord) -> ArchiveResult<()> {
        match self.format {
            OutputFormat::Tenhou => writeln!(self.out, "{}", LineFormat::Sca.encode(record))?,
            OutputFormat::Jsonlines => writeln!(self.out, "{}", json_line(record)?)?,
            OutputFormat::Json => {
                if self.written > 0 {
                    writeln!(self.out, ",")?;
                }
                write!(self.out, "{}", json_line(record)?)?;
            }
        }
        self.written += 1;
        Ok(())
    }

    fn end(&mut self) -> ArchiveResult<()> {
        if self.format == OutputFormat::Json {
            if self.written > 0 {
                writeln!(self.out)?;
            }
            writeln!(self.out, "]")?;
        }
        self.out.flush()?;
        Ok(())
    }
}

fn load_listing(opts: &GrepOptions, default_file: &Path) -> Result<UserListing> {
    let storage = match &opts.users_file {
        Some(path) => UserStorage::load(path).context("error parsing user mapping")?,
        None => UserStorage::load_or_default(default_file).context("error parsing user mapping")?,
    };
    Ok(UserListing::from_storage(&storage))
}

pub fn run(opts: &GrepOptions) -> Result<CommandReport> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_with_writer(opts, &mut out)
}

/// Stream matching records to `out`; the report only carries the summary.
pub fn run_with_writer<W: Write>(opts: &GrepOptions, out: &mut W) -> Result<CommandReport> {
    validate_lobby(&opts.lobby)?;
    let ctx = load_context(opts.root.as_deref())?;
    let start_day = opts.start.as_deref().unwrap_or(&ctx.config.grep.default_start);
    let start = parse_day(start_day, ctx.tz).context("failed to parse start date")?;
    let end = match &opts.end {
        Some(day) => parse_day(day, ctx.tz).context("failed to parse end date")?,
        None => today_midnight(ctx.tz)?,
    };
    let users = Arc::new(load_listing(opts, &ctx.paths.users_file)?);

    let mut report = CommandReport::new("grep");
    report.detail(format!("archive_root={}", ctx.paths.archive_root.display()));
    report.detail(format!(
        "range={}..={}",
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    ));
    report.detail(format!(
        "allowed_users={} aliases={}",
        users.user_count(),
        users.alias_count()
    ));

    let query = GrepQuery {
        lobby: opts.lobby.clone(),
        start,
        end,
        tz: ctx.tz,
    };
    let sca_root = ctx.paths.archive_root.join("sca");
    let mut writer = RecordWriter::new(opts.format, out);
    let mut missing_years = Vec::new();
    writer.begin()?;
    grep_logs(
        &ctx.paths.archive_root,
        query,
        users,
        ctx.config.grep.queue_capacity,
        |item| match item {
            GrepOutput::Record(record) => writer.write(&record),
            GrepOutput::MissingYear(year) => {
                warn::emit(WarnEvent {
                    code: "NO_DATA_FOR_YEAR",
                    stage: "grep",
                    action: "walk-year",
                    target: &sca_root.join(year.to_string()).display().to_string(),
                    reason: "missing directory",
                    err: "",
                });
                missing_years.push(year);
                Ok(())
            }
        },
    )?;
    writer.end()?;

    report.detail(format!("matched={}", writer.written));
    for year in missing_years {
        report.detail(format!("no_data_for_year={year}"));
    }
    Ok(report)
}
