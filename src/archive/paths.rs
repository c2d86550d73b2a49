use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ArchivePaths {
    pub scx_home: PathBuf,
    pub archive_root: PathBuf,
    pub logs_dir: PathBuf,
    pub users_file: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

fn paths_under(scx_home: PathBuf) -> ArchivePaths {
    let archive_root = env_or_default_path("SCX_ARCHIVE_ROOT", scx_home.join("archive"));
    let logs_dir = env_or_default_path("SCX_LOGS_DIR", scx_home.join("logs"));
    let users_file = env_or_default_path("SCX_USERS_FILE", scx_home.join("users.json"));
    ArchivePaths {
        scx_home,
        archive_root,
        logs_dir,
        users_file,
    }
}

pub fn resolve_paths() -> Result<ArchivePaths> {
    let scx_home = match env::var("SCX_HOME") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => required_home_dir()?.join(".scx-archive"),
    };
    Ok(paths_under(scx_home))
}

impl ArchivePaths {
    /// Replace the archive root, e.g. from `--root`.
    pub fn with_root(mut self, root: Option<&Path>) -> Self {
        if let Some(root) = root {
            self.archive_root = root.to_path_buf();
        }
        self
    }
}
