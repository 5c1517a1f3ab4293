use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgGroup, ArgMatches, Command};
use console::style;
use std::path::PathBuf;
use std::process::ExitCode;
use taleplay_config::{Config, ConfigManager};
use taleplay_core::AppError;
use taleplay_database::{DatabaseConfig, SqliteStore};

mod commands;
mod player;

use player::{PlayOptions, SleepRequest};

fn build_cli() -> Command {
    Command::new("taleplay")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Audiobook player that remembers where you left off")
        .arg(
            Arg::new("database")
                .short('d')
                .long("database")
                .value_name("PATH")
                .help("Path to the library database (overrides the config file)")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("config-dir")
                .long("config-dir")
                .value_name("DIR")
                .help("Directory holding config.toml")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .subcommand(Command::new("init").about("Create the config file and library database"))
        .subcommand(
            Command::new("add")
                .about("Add a directory of audio files as one book, one chapter per file")
                .arg(
                    Arg::new("dir")
                        .required(true)
                        .value_name("DIR")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory containing the chapter files"),
                )
                .arg(
                    Arg::new("title")
                        .short('t')
                        .long("title")
                        .value_name("TITLE")
                        .help("Book title (defaults to the directory name)"),
                )
                .arg(
                    Arg::new("author")
                        .short('a')
                        .long("author")
                        .value_name("AUTHOR")
                        .help("Book author"),
                ),
        )
        .subcommand(Command::new("list").about("List all books in the library"))
        .subcommand(
            Command::new("chapters")
                .about("Show a book's chapters and saved positions")
                .arg(book_id_arg()),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove a book and its progress from the library")
                .arg(book_id_arg())
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .help("Skip confirmation prompt")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("play")
                .about("Play a book, resuming from the saved position")
                .arg(book_id_arg())
                .arg(
                    Arg::new("chapter")
                        .short('c')
                        .long("chapter")
                        .value_name("N")
                        .help("Start at chapter N (1-based) instead of resuming")
                        .value_parser(value_parser!(u32).range(1..)),
                )
                .arg(
                    Arg::new("speed")
                        .short('s')
                        .long("speed")
                        .value_name("SPEED")
                        .help("Playback speed, 0.75 to 2.0")
                        .value_parser(value_parser!(f32)),
                )
                .arg(
                    Arg::new("sleep-minutes")
                        .long("sleep-minutes")
                        .value_name("M")
                        .help("Pause after M minutes")
                        .value_parser(value_parser!(u64).range(1..)),
                )
                .arg(
                    Arg::new("sleep-end-of-chapter")
                        .long("sleep-end-of-chapter")
                        .help("Pause when the current chapter ends")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("sleep-chapters")
                        .long("sleep-chapters")
                        .value_name("N")
                        .help("Pause after N chapters finish")
                        .value_parser(value_parser!(u32).range(1..)),
                )
                .group(
                    ArgGroup::new("sleep")
                        .args(["sleep-minutes", "sleep-end-of-chapter", "sleep-chapters"])
                        .multiple(false),
                ),
        )
}

fn book_id_arg() -> Arg {
    Arg::new("id")
        .required(true)
        .value_name("BOOK_ID")
        .help("Book ID (UUID)")
}

fn config_manager(matches: &ArgMatches) -> Result<ConfigManager> {
    match matches.get_one::<PathBuf>("config-dir") {
        Some(dir) => Ok(ConfigManager::with_directory(dir.clone())),
        None => ConfigManager::new().context("Failed to locate the config directory"),
    }
}

fn load_config(manager: &ConfigManager) -> Config {
    match manager.load_with_env_overrides() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: {}; using default settings", e);
            Config::default()
        }
    }
}

async fn open_store(
    matches: &ArgMatches,
    manager: &ConfigManager,
    config: &Config,
) -> Result<SqliteStore> {
    let path = match matches.get_one::<PathBuf>("database") {
        Some(path) => path.clone(),
        None => config.app.resolved_database_path(manager.config_dir()),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    log::debug!("Opening library at {}", path.display());
    SqliteStore::open(DatabaseConfig::new(path.to_string_lossy()))
        .await
        .with_context(|| format!("Failed to open library database {}", path.display()))
}

fn play_options(matches: &ArgMatches) -> PlayOptions {
    let sleep = if let Some(minutes) = matches.get_one::<u64>("sleep-minutes") {
        Some(SleepRequest::Minutes(*minutes))
    } else if matches.get_flag("sleep-end-of-chapter") {
        Some(SleepRequest::EndOfChapter)
    } else {
        matches
            .get_one::<u32>("sleep-chapters")
            .map(|n| SleepRequest::Chapters(*n))
    };

    PlayOptions {
        chapter: matches.get_one::<u32>("chapter").copied(),
        speed: matches.get_one::<f32>("speed").copied(),
        sleep,
    }
}

fn required_id(matches: &ArgMatches) -> Result<&str> {
    matches
        .get_one::<String>("id")
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("Book ID is required"))
}

/// Listener-facing text for the first library error in the chain
fn friendly_message(err: &anyhow::Error) -> Option<String> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<AppError>())
        .map(AppError::user_message)
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            if let Some(message) = friendly_message(&e) {
                eprintln!("  {}", message);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let matches = build_cli().get_matches();
    let manager = config_manager(&matches)?;
    let config = load_config(&manager);

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.app.log_level.as_filter()),
    )
    .init();

    match matches.subcommand() {
        Some(("init", _)) => {
            let created = manager
                .initialize()
                .context("Failed to write the config file")?;
            let store = open_store(&matches, &manager, &config).await?;
            commands::init(&manager, created);
            store.close().await;
            Ok(())
        }
        Some(("add", sub)) => {
            let dir = sub
                .get_one::<PathBuf>("dir")
                .ok_or_else(|| anyhow::anyhow!("Directory is required"))?;
            let store = open_store(&matches, &manager, &config).await?;
            let title = sub.get_one::<String>("title").map(String::as_str);
            let author = sub.get_one::<String>("author").map(String::as_str);
            commands::add_book(&store, dir, title, author).await?;
            Ok(())
        }
        Some(("list", _)) => {
            let store = open_store(&matches, &manager, &config).await?;
            commands::list_books(&store).await
        }
        Some(("chapters", sub)) => {
            let store = open_store(&matches, &manager, &config).await?;
            commands::show_chapters(&store, required_id(sub)?).await
        }
        Some(("remove", sub)) => {
            let store = open_store(&matches, &manager, &config).await?;
            commands::remove_book(&store, required_id(sub)?, sub.get_flag("force")).await
        }
        Some(("play", sub)) => {
            let store = open_store(&matches, &manager, &config).await?;
            let book_id = commands::parse_book_id(required_id(sub)?)?;
            player::start_playback(store, &config, book_id, play_options(sub)).await
        }
        _ => {
            build_cli().print_help()?;
            Ok(())
        }
    }
}
