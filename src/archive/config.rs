use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeConfig {
    pub timezone: String,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            timezone: "Asia/Tokyo".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateConfig {
    pub safety_window_days: u64,
    pub size_tolerance_pct: u64,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            safety_window_days: 8,
            size_tolerance_pct: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrepConfig {
    pub queue_capacity: usize,
    pub default_start: String,
}

impl Default for GrepConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            default_start: "2006-07-01".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://tenhou.net/sc/raw".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ArchiveConfig {
    pub time: TimeConfig,
    pub aggregate: AggregateConfig,
    pub grep: GrepConfig,
    pub remote: RemoteConfig,
}

impl ArchiveConfig {
    /// Reference timezone for embedded dates and line timestamps.
    pub fn tz(&self) -> Result<Tz> {
        self.time
            .timezone
            .parse::<Tz>()
            .map_err(|err| anyhow!("invalid timezone `{}`: {err}", self.time.timezone))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialArchiveConfig {
    time: Option<TimeConfig>,
    aggregate: Option<AggregateConfig>,
    grep: Option<GrepConfig>,
    remote: Option<RemoteConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_usize(var: &str, fallback: usize) -> usize {
    match env::var(var) {
        Ok(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

pub fn validate(cfg: &ArchiveConfig) -> Result<()> {
    cfg.tz()?;
    if cfg.aggregate.size_tolerance_pct > 100 {
        return Err(anyhow!(
            "invalid size tolerance: require 0 <= tolerance <= 100 percent"
        ));
    }
    if cfg.grep.queue_capacity == 0 {
        return Err(anyhow!("invalid grep queue capacity: must be >= 1"));
    }
    NaiveDate::parse_from_str(&cfg.grep.default_start, "%Y-%m-%d").map_err(|err| {
        anyhow!(
            "invalid grep default start `{}`: {err}",
            cfg.grep.default_start
        )
    })?;
    if cfg.remote.base_url.trim().is_empty() {
        return Err(anyhow!("invalid remote base url: cannot be empty"));
    }
    if cfg.remote.request_timeout_secs == 0 {
        return Err(anyhow!("invalid remote request timeout: must be >= 1 second"));
    }
    Ok(())
}

pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("SCX_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".scx-archive").join("config.toml"))
}

fn merge_file_config(base: &mut ArchiveConfig, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: PartialArchiveConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse scx config {}: {err}", path.display()))?;
    if let Some(time) = parsed.time {
        base.time = time;
    }
    if let Some(aggregate) = parsed.aggregate {
        base.aggregate = aggregate;
    }
    if let Some(grep) = parsed.grep {
        base.grep = grep;
    }
    if let Some(remote) = parsed.remote {
        base.remote = remote;
    }
    Ok(())
}

fn apply_env_overrides(cfg: &mut ArchiveConfig) {
    cfg.time.timezone = env_or_string("SCX_TIMEZONE", &cfg.time.timezone);
    cfg.aggregate.safety_window_days = env_or_u64(
        "SCX_SAFETY_WINDOW_DAYS",
        cfg.aggregate.safety_window_days,
    );
    cfg.aggregate.size_tolerance_pct = env_or_u64(
        "SCX_SIZE_TOLERANCE_PCT",
        cfg.aggregate.size_tolerance_pct,
    );
    cfg.grep.queue_capacity = env_or_usize("SCX_GREP_QUEUE_CAPACITY", cfg.grep.queue_capacity);
    cfg.grep.default_start = env_or_string("SCX_GREP_START_DATE", &cfg.grep.default_start);
    cfg.remote.base_url = env_or_string("SCX_REMOTE_BASE_URL", &cfg.remote.base_url);
    cfg.remote.request_timeout_secs = env_or_u64(
        "SCX_REMOTE_TIMEOUT_SECS",
        cfg.remote.request_timeout_secs,
    );
}

/// Defaults, then the config file (if any), then `SCX_*` overrides.
pub fn load_config() -> Result<ArchiveConfig> {
    let mut cfg = ArchiveConfig::default();
    if let Some(path) = resolve_config_path() {
        merge_file_config(&mut cfg, &path)?;
    }
    apply_env_overrides(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_valid() {
        let cfg = ArchiveConfig::default();
        validate(&cfg).expect("defaults");
        assert_eq!(cfg.tz().expect("tz"), chrono_tz::Asia::Tokyo);
        assert_eq!(cfg.aggregate.safety_window_days, 8);
        assert_eq!(cfg.grep.queue_capacity, 10);
    }

    #[test]
    fn file_sections_replace_defaults() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            "[aggregate]\nsafety_window_days = 2\nsize_tolerance_pct = 10\n\n[time]\ntimezone = \"UTC\"\n",
        )
        .expect("write");

        let mut cfg = ArchiveConfig::default();
        merge_file_config(&mut cfg, &path).expect("merge");
        assert_eq!(cfg.aggregate.safety_window_days, 2);
        assert_eq!(cfg.aggregate.size_tolerance_pct, 10);
        assert_eq!(cfg.time.timezone, "UTC");
        assert_eq!(cfg.grep.queue_capacity, 10);
    }

    #[test]
    fn missing_file_keeps_defaults() {
        let tmp = tempdir().expect("tempdir");
        let mut cfg = ArchiveConfig::default();
        merge_file_config(&mut cfg, &tmp.path().join("absent.toml")).expect("merge");
        assert_eq!(cfg.remote.base_url, "http://tenhou.net/sc/raw");
    }

    #[test]
    fn malformed_file_is_rejected() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[grep\nqueue_capacity = 1\n").expect("write");
        let err = merge_file_config(&mut ArchiveConfig::default(), &path).expect_err("parse");
        assert!(err.to_string().contains("failed to parse scx config"));
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let mut cfg = ArchiveConfig::default();
        cfg.time.timezone = "Mars/Olympus".to_string();
        assert!(validate(&cfg).is_err());

        let mut cfg = ArchiveConfig::default();
        cfg.aggregate.size_tolerance_pct = 101;
        assert!(validate(&cfg).is_err());

        let mut cfg = ArchiveConfig::default();
        cfg.grep.queue_capacity = 0;
        assert!(validate(&cfg).is_err());

        let mut cfg = ArchiveConfig::default();
        cfg.grep.default_start = "2006/07/01".to_string();
        assert!(validate(&cfg).is_err());

        let mut cfg = ArchiveConfig::default();
        cfg.remote.request_timeout_secs = 0;
        assert!(validate(&cfg).is_err());
    }
}
