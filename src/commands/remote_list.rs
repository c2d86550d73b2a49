use anyhow::Result;

use crate::archive::remote::RemoteLister;
use crate::archive::util::{parse_day, today_midnight};
use crate::commands::{CommandReport, load_context};

#[derive(Debug, Clone, Default)]
pub struct RemoteListOptions {
    pub old: bool,
    pub start: Option<String>,
    pub end: Option<String>,
}

pub fn run(opts: &RemoteListOptions) -> Result<CommandReport> {
    let ctx = load_context(None)?;
    let start_day = opts.start.as_deref().unwrap_or(&ctx.config.grep.default_start);
    let start = parse_day(start_day, ctx.tz)?;
    let end = match &opts.end {
        Some(day) => parse_day(day, ctx.tz)?,
        None => today_midnight(ctx.tz)?,
    };

    let lister = RemoteLister::new(
        &ctx.config.remote.base_url,
        ctx.config.remote.request_timeout_secs,
    )?;
    let mut report = CommandReport::new("remote-list");
    report.detail(format!("url={}", lister.list_url(opts.old)));

    match lister.list(opts.old, &start, &end, ctx.tz) {
        Ok(entries) => {
            report.detail(format!("entries={}", entries.len()));
            for entry in entries {
                report.detail(format!(
                    "{} category={} date={} size={}",
                    entry.token.file,
                    entry.category,
                    entry.date.format("%Y-%m-%d"),
                    entry.token.size
                ));
            }
        }
        Err(err) => report.issue(format!("{err:#}")),
    }
    Ok(report)
}
