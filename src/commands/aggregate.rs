use anyhow::Result;
use std::path::PathBuf;

use crate::archive::aggregate::{AggregateOptions, SliceOutcome, aggregate_logs};
use crate::archive::audit;
use crate::archive::util::{default_cutoff, parse_day};
use crate::archive::warn::{self, WarnEvent};
use crate::commands::{CommandReport, load_context};

#[derive(Debug, Clone, Default)]
pub struct AggregateCmdOptions {
    pub root: Option<PathBuf>,
    /// `YYYY-MM-DD`; fragments dated on or after it are left alone.
    pub cutoff: Option<String>,
}

fn describe(outcome: &SliceOutcome) -> String {
    format!(
        "{} {} fragments={} target={}",
        outcome.category,
        outcome.date.format("%Y-%m-%d"),
        outcome.fragments,
        outcome.target.display()
    )
}

pub fn run(opts: &AggregateCmdOptions) -> Result<CommandReport> {
    let ctx = load_context(opts.root.as_deref())?;
    let cutoff = match &opts.cutoff {
        Some(day) => parse_day(day, ctx.tz)?,
        None => default_cutoff(ctx.tz, ctx.config.aggregate.safety_window_days)?,
    };

    let mut report = CommandReport::new("aggregate");
    report.detail(format!("archive_root={}", ctx.paths.archive_root.display()));
    report.detail(format!("cutoff={}", cutoff.format("%Y-%m-%d")));

    let agg_opts = AggregateOptions {
        cutoff,
        tz: ctx.tz,
        tolerance_pct: ctx.config.aggregate.size_tolerance_pct,
    };
    let logs_dir = ctx.paths.logs_dir.clone();
    let result = aggregate_logs(&ctx.paths.archive_root, &agg_opts, |outcome| {
        let message = describe(outcome);
        report.detail(format!("{} {message}", outcome.action.as_str()));
        if let Err(err) = audit::append_event(&logs_dir, "aggregate", outcome.action.as_str(), &message) {
            warn::emit(WarnEvent {
                code: "AUDIT_WRITE_FAILED",
                stage: "aggregate",
                action: "append-audit",
                target: &logs_dir.display().to_string(),
                reason: "audit log not writable",
                err: &format!("{err:#}"),
            });
        }
    });

    match result {
        Ok(merged) => report.detail(format!("merged_slices={merged}")),
        Err(err) => {
            let _ = audit::append_event(&logs_dir, "aggregate", "aborted", &err.to_string());
            report.issue(format!("aggregate pass aborted: {err}"));
        }
    }
    Ok(report)
}
