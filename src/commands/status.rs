use anyhow::Result;
use std::env;

use crate::archive::category::Category;
use crate::archive::config::resolve_config_path;
use crate::commands::{CommandReport, load_context};

include!(concat!(env!("OUT_DIR"), "/scx_env_allowlist.rs"));

/// Recognised `SCX_*` variables currently set to a non-empty value.
pub fn set_env_keys() -> Vec<&'static str> {
    GENERATED_SCX_ENV_ALLOWLIST
        .iter()
        .copied()
        .filter(|key| env::var(key).map(|v| !v.trim().is_empty()).unwrap_or(false))
        .collect()
}

pub fn run(root: Option<&std::path::Path>) -> Result<CommandReport> {
    let ctx = load_context(root)?;
    let mut report = CommandReport::new("status");

    report.detail(format!("scx_home={}", ctx.paths.scx_home.display()));
    report.detail(format!("archive_root={}", ctx.paths.archive_root.display()));
    report.detail(format!("logs_dir={}", ctx.paths.logs_dir.display()));
    report.detail(format!("users_file={}", ctx.paths.users_file.display()));
    match resolve_config_path() {
        Some(path) if path.exists() => report.detail(format!("config_file={}", path.display())),
        _ => report.detail("config_file=none (defaults)"),
    }
    report.detail(format!("timezone={}", ctx.tz));
    report.detail(format!(
        "safety_window_days={}",
        ctx.config.aggregate.safety_window_days
    ));
    report.detail(format!(
        "size_tolerance_pct={}",
        ctx.config.aggregate.size_tolerance_pct
    ));
    report.detail(format!("grep_queue_capacity={}", ctx.config.grep.queue_capacity));
    report.detail(format!("remote_base_url={}", ctx.config.remote.base_url));

    let set = set_env_keys();
    if set.is_empty() {
        report.detail("env_overrides=none");
    } else {
        report.detail(format!("env_overrides={}", set.join(",")));
    }

    if !ctx.paths.archive_root.is_dir() {
        report.issue(format!(
            "missing archive root ({}); set SCX_ARCHIVE_ROOT or pass --root",
            ctx.paths.archive_root.display()
        ));
        return Ok(report);
    }
    for category in [Category::Sca]
        .into_iter()
        .chain(Category::AGGREGATED)
    {
        let dir = ctx.paths.archive_root.join(category.as_str());
        let state = if dir.is_dir() { "present" } else { "absent" };
        report.detail(format!("{category}_dir={state}"));
    }
    Ok(report)
}
