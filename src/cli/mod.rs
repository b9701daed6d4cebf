pub mod process;
pub mod report;

use std::{env, path::PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use process::{kill_previous_servers, restart_server};
use report::{process_report_command, ReportCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::start_daemon,
    storage::{
        categories::{CategoryStore, CategoryStoreImpl},
        entities::{AppCategory, Category},
    },
    tracker::Tracker,
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Focusmeter", version, long_about = None)]
#[command(about = "Daemon for tracking application focus and coding activity", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts a daemon for the application")]
    Init {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(about = "Print focus score and per-application usage for a calendar window")]
    Report {
        #[command(flatten)]
        command: ReportCommand,
    },
    #[command(about = "Scan configured workspaces for new commits right now")]
    Scan {},
    #[command(about = "Inspect or maintain application categories")]
    Category {
        #[command(subcommand)]
        command: CategoryCommands,
    },
    #[command(
        about = "Run a daemon directly in current console. Used for creating a daemon internally and for debugging"
    )]
    Serve {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(about = "Stop currently running daemon.")]
    Stop {},
}

#[derive(Subcommand, Debug)]
enum CategoryCommands {
    #[command(about = "List all known application categories")]
    List {},
    #[command(about = "Assign a category to an application")]
    Set {
        #[arg(help = "Stable application key, e.g. com.apple.dt.Xcode")]
        app_id: String,
        #[arg(value_enum)]
        category: Category,
        #[arg(long, help = "Display name. Defaults to the application key")]
        name: Option<String>,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = create_application_default_path()?;

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &app_dir, logging_level, args.log)?;

    match args.commands {
        Commands::Init { .. } => {
            restart_server()?;
            Ok(())
        }
        Commands::Stop {} => {
            let process_name = env::current_exe().unwrap();
            kill_previous_servers(&process_name);
            Ok(())
        }
        Commands::Serve { dir } => {
            start_daemon(dir.unwrap_or(app_dir)).await?;
            Ok(())
        }
        Commands::Report { command } => process_report_command(command).await,
        Commands::Scan {} => process_scan_command(app_dir).await,
        Commands::Category { command } => process_category_command(app_dir, command).await,
    }
}

async fn process_scan_command(app_dir: PathBuf) -> Result<()> {
    let tracker = Tracker::new(app_dir).await?;
    let result = tracker.refresh_git_activity().await;

    println!(
        "Repositories: {}\nCommits examined: {}\nNew commits: {}\nTook: {:.1?}",
        result.repositories_found,
        result.commits_found,
        result.new_commits_added,
        result.scan_duration,
    );
    for error in &result.errors {
        eprintln!("error: {error}");
    }
    Ok(())
}

async fn process_category_command(app_dir: PathBuf, command: CategoryCommands) -> Result<()> {
    let store = CategoryStoreImpl::new(app_dir)?;
    match command {
        CategoryCommands::List {} => {
            for entry in store.query_all().await? {
                println!(
                    "{:?}\t{}\t{}{}",
                    entry.category,
                    entry.app_name,
                    entry.app_id,
                    if entry.is_default { "\t(default)" } else { "" }
                );
            }
        }
        CategoryCommands::Set {
            app_id,
            category,
            name,
        } => {
            store
                .assign(AppCategory {
                    app_name: name.unwrap_or_else(|| app_id.clone()).into(),
                    app_id: app_id.into(),
                    category,
                    is_default: false,
                })
                .await?;
            println!("Updated");
        }
    }
    Ok(())
}
