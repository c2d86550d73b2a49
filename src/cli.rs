use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::aggregate::{self, AggregateCmdOptions};
use crate::commands::grep::{self, GrepOptions, OutputFormat};
use crate::commands::remote_list::{self, RemoteListOptions};
use crate::commands::users::{self, UsersAction, UsersOptions};
use crate::commands::verify::{self, VerifyOptions};
use crate::commands::{CommandReport, status};

#[derive(Debug, Parser)]
#[command(name = "scx-archive", version, about = "Date-sharded game log archive")]
struct Cli {
    /// Print the command report as JSON.
    #[arg(long, global = true)]
    json: bool,
    /// Archive root, overriding SCX_ARCHIVE_ROOT.
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Merge same-day fragments into daily aggregates.
    Aggregate {
        /// Only merge days strictly before this date (YYYY-MM-DD).
        #[arg(long)]
        cutoff: Option<String>,
    },
    /// Scan the score archive for games of known users in one lobby.
    Grep {
        lobby: String,
        #[arg(short = 's', long = "start", value_name = "DATE")]
        start: Option<String>,
        #[arg(short = 'e', long = "end", value_name = "DATE")]
        end: Option<String>,
        /// JSON file mapping users to their aliases.
        #[arg(short = 'a', long = "users", value_name = "FILE")]
        users: Option<PathBuf>,
        #[arg(short = 'f', long = "format", value_enum, default_value_t = OutputFormat::Tenhou)]
        format: OutputFormat,
    },
    /// Show the remote listing entries within a date range.
    RemoteList {
        /// Use the historical listing.
        #[arg(long)]
        old: bool,
        #[arg(short = 's', long = "start", value_name = "DATE")]
        start: Option<String>,
        #[arg(short = 'e', long = "end", value_name = "DATE")]
        end: Option<String>,
    },
    /// Edit or list the user/alias mapping.
    Users {
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
        #[command(subcommand)]
        action: UsersCommand,
    },
    /// Check that every line of an archive file decodes and re-encodes exactly.
    Verify { file: PathBuf },
    /// Show resolved paths, configuration and environment overrides.
    Status,
}

#[derive(Debug, Subcommand)]
enum UsersCommand {
    Add {
        user: String,
        aliases: Vec<String>,
    },
    #[command(alias = "add-alias")]
    Alias {
        user: String,
        #[arg(required = true)]
        aliases: Vec<String>,
    },
    List,
}

fn print_report(report: &CommandReport, json: bool, to_stderr: bool) -> Result<()> {
    let text = if json {
        serde_json::to_string_pretty(report)?
    } else {
        let mut lines = vec![format!(
            "{}: {}",
            report.command,
            if report.ok { "ok" } else { "failed" }
        )];
        lines.extend(report.details.iter().map(|d| format!("  {d}")));
        lines.extend(report.issues.iter().map(|i| format!("  issue: {i}")));
        lines.join("\n")
    };
    if to_stderr {
        eprintln!("{text}");
    } else {
        println!("{text}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let root = cli.root.clone();

    // Grep owns stdout for records, so its summary goes to stderr.
    let (report, to_stderr) = match cli.command {
        Command::Aggregate { cutoff } => (aggregate::run(&AggregateCmdOptions { root, cutoff })?, false),
        Command::Grep {
            lobby,
            start,
            end,
            users,
            format,
        } => {
            let opts = GrepOptions {
                root,
                lobby,
                start,
                end,
                users_file: users,
                format,
            };
            (grep::run(&opts)?, true)
        }
        Command::RemoteList { old, start, end } => {
            (remote_list::run(&RemoteListOptions { old, start, end })?, false)
        }
        Command::Users { file, action } => {
            let action = match action {
                UsersCommand::Add { user, aliases } => UsersAction::Add { user, aliases },
                UsersCommand::Alias { user, aliases } => UsersAction::Alias { user, aliases },
                UsersCommand::List => UsersAction::List,
            };
            (users::run(&UsersOptions { file, action })?, false)
        }
        Command::Verify { file } => (verify::run(&VerifyOptions { file })?, false),
        Command::Status => (status::run(root.as_deref())?, false),
    };

    print_report(&report, cli.json, to_stderr)?;
    if !report.ok {
        bail!("{} reported {} issue(s)", report.command, report.issues.len());
    }
    Ok(())
}
