pub mod aggregate;
pub mod grep;
pub mod remote_list;
pub mod status;
pub mod users;
pub mod verify;

use anyhow::Result;
use chrono_tz::Tz;
use serde::Serialize;
use std::path::Path;

use crate::archive::config::{ArchiveConfig, load_config};
use crate::archive::paths::{ArchivePaths, resolve_paths};

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }
}

/// Everything a command needs from the environment.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: ArchiveConfig,
    pub tz: Tz,
    pub paths: ArchivePaths,
}

pub fn load_context(root: Option<&Path>) -> Result<Context> {
    let config = load_config()?;
    let tz = config.tz()?;
    let paths = resolve_paths()?.with_root(root);
    Ok(Context { config, tz, paths })
}
