use anyhow::{Context as _, Result};
use std::path::PathBuf;

use crate::archive::paths::resolve_paths;
use crate::archive::users::UserStorage;
use crate::commands::CommandReport;

#[derive(Debug, Clone)]
pub enum UsersAction {
    Add { user: String, aliases: Vec<String> },
    Alias { user: String, aliases: Vec<String> },
    List,
}

#[derive(Debug, Clone)]
pub struct UsersOptions {
    pub file: Option<PathBuf>,
    pub action: UsersAction,
}

pub fn run(opts: &UsersOptions) -> Result<CommandReport> {
    let path = match &opts.file {
        Some(path) => path.clone(),
        None => resolve_paths()?.users_file,
    };
    let mut report = CommandReport::new("users");
    report.detail(format!("users_file={}", path.display()));

    match &opts.action {
        UsersAction::Add { user, aliases } => {
            let mut storage = UserStorage::load_or_default(&path)
                .context("error opening user/alias mapping")?;
            if let Err(err) = storage.add_user(user, aliases) {
                report.issue(err.to_string());
                return Ok(report);
            }
            storage.save(&path)?;
            report.detail(format!("added user {user} with {} aliases", aliases.len()));
        }
        UsersAction::Alias { user, aliases } => {
            let mut storage =
                UserStorage::load(&path).context("error opening user/alias mapping")?;
            if let Err(err) = storage.add_aliases(user, aliases) {
                report.issue(err.to_string());
                return Ok(report);
            }
            storage.save(&path)?;
            report.detail(format!("added {} aliases to {user}", aliases.len()));
        }
        UsersAction::List => {
            let storage =
                UserStorage::load(&path).context("error opening user/alias mapping")?;
            if storage.is_empty() {
                report.detail("no users defined");
            }
            for line in storage.to_string().lines() {
                report.detail(line.to_string());
            }
        }
    }
    Ok(report)
}
