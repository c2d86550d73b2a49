use anyhow::Result;
use std::path::PathBuf;

use crate::archive::scx_log::ScxLog;
use crate::commands::{CommandReport, load_context};

const MAX_REPORTED_MISMATCHES: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    pub file: PathBuf,
}

/// Decode every line of one archive file and check it re-encodes byte for byte.
pub fn run(opts: &VerifyOptions) -> Result<CommandReport> {
    let ctx = load_context(None)?;
    let mut report = CommandReport::new("verify");
    report.detail(format!("file={}", opts.file.display()));

    let mut log = match ScxLog::open(&opts.file, ctx.tz) {
        Ok(log) => log,
        Err(err) => {
            report.issue(format!("cannot open: {err}"));
            return Ok(report);
        }
    };
    report.detail(format!("date={}", log.date().format("%Y-%m-%d")));

    let format = log.format();
    let mut lines = 0usize;
    let mut mismatches = 0usize;
    while let Some((line, record)) = log.next_with_line() {
        lines += 1;
        let encoded = format.encode(&record);
        if encoded != line {
            mismatches += 1;
            if mismatches <= MAX_REPORTED_MISMATCHES {
                report.issue(format!("line {lines}: {line:?} re-encodes as {encoded:?}"));
            }
        }
    }
    if let Err(err) = log.finish() {
        report.issue(format!("line {}: {err}", lines + 1));
    }

    report.detail(format!("lines={lines}"));
    report.detail(format!("mismatches={mismatches}"));
    Ok(report)
}
