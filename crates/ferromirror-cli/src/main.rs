//! FerroMirror - keep a local workspace mirrored on an FTP, FTPS or SFTP server
//!
//! The command line front end drives the mirror engine: it stores connection
//! settings per workspace, pulls the remote tree and pushes local changes.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use ferromirror_config::{
    FileSettingsProvider, LoggingConfig, SettingKey, SettingValue, Settings, SettingsProvider,
};
use ferromirror_engine::{SyncEngine, TransferOutcome};
use ferromirror_types::{FileKind, Logger, Notifier, Protocol};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;

mod json_output;
mod notifier;
mod progress;

use json_output::{print_json, ListingJson, OperationMetadata, PullJson, TransferJson};
use notifier::{ConsoleLogger, ConsoleNotifier};
use progress::format_bytes;

/// FerroMirror - mirror a workspace to a remote server
#[derive(Parser)]
#[command(
    name = "ferromirror",
    version = env!("CARGO_PKG_VERSION"),
    about = "Mirror a local workspace to an FTP, FTPS or SFTP server",
    long_about = "FerroMirror keeps a local directory and a remote directory in step.\n\
                  It pulls the remote tree on setup and pushes saved, created, deleted\n\
                  and renamed files one at a time over a single session."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Quiet mode - minimal output
    #[arg(short, long)]
    quiet: bool,

    /// Verbose mode - echo the output log
    #[arg(short, long)]
    verbose: bool,

    /// Workspace root mirrored by the remote root
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Settings file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect with the stored settings and report the result
    Connect,
    /// Pull the remote tree into the workspace
    Pull {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upload files, or directories with their contents
    Push {
        /// Local paths inside the workspace
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Print outcomes as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete the remote counterparts of local paths
    Rm {
        /// Local paths inside the workspace
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Move a remote entry to mirror a local rename
    Mv {
        /// Old local path
        old: PathBuf,
        /// New local path
        new: PathBuf,
    },
    /// Create a remote directory, relative to the remote root
    Mkdir {
        /// Remote directory
        dir: String,
    },
    /// List a remote directory
    Ls {
        /// Remote path, relative to the remote root
        #[arg(default_value = "")]
        path: String,
        /// List everything below the path
        #[arg(short, long)]
        recursive: bool,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or change stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Store connection settings, connect and optionally pull
    Setup(SetupArgs),
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the stored settings
    Show {
        /// Show the password too
        #[arg(long)]
        reveal: bool,
    },
    /// Set one key, e.g. `remoteRoot /public_html`
    Set {
        /// Setting key
        key: String,
        /// New value; lists are comma separated
        value: String,
    },
    /// Clear one key back to its default
    Unset {
        /// Setting key
        key: String,
    },
    /// Forget the connection settings of this workspace
    Reset {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(clap::Args)]
struct SetupArgs {
    /// Protocol
    #[arg(long, value_enum)]
    protocol: Option<ProtocolArg>,
    /// Server host
    #[arg(long)]
    host: Option<String>,
    /// Server port
    #[arg(long)]
    port: Option<u16>,
    /// Login name
    #[arg(short, long)]
    username: Option<String>,
    /// Login password
    #[arg(short, long, env = "FERROMIRROR_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Remote directory mirroring the workspace
    #[arg(long)]
    remote_root: Option<String>,
    /// Exclude patterns for sync
    #[arg(long)]
    exclude: Vec<String>,
    /// Do not pull the remote tree after connecting
    #[arg(long)]
    no_sync: bool,
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum ProtocolArg {
    Ftp,
    Ftps,
    Sftp,
}

impl From<ProtocolArg> for Protocol {
    fn from(protocol: ProtocolArg) -> Self {
        match protocol {
            ProtocolArg::Ftp => Protocol::Ftp,
            ProtocolArg::Ftps => Protocol::Ftps,
            ProtocolArg::Sftp => Protocol::Sftp,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let workspace = std::fs::canonicalize(&cli.workspace)
        .with_context(|| format!("Workspace {} not found", cli.workspace.display()))?;
    let provider = match &cli.config {
        Some(path) => FileSettingsProvider::open(path)?,
        None => FileSettingsProvider::for_workspace(&workspace)?,
    };
    let _guard = init_logging(&cli, &provider.settings().logging)?;
    info!("FerroMirror v{} starting", env!("CARGO_PKG_VERSION"));
    debug!("Settings file: {}", provider.path().display());

    let settings: Arc<dyn SettingsProvider> = Arc::new(provider);
    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier::new(cli.quiet));
    let logger: Arc<dyn Logger> = Arc::new(ConsoleLogger::new(cli.verbose));
    let engine = SyncEngine::builder(&workspace)
        .with_settings(Arc::clone(&settings))
        .with_notifier(notifier)
        .with_logger(logger)
        .build()
        .await?;

    let result = match cli.command {
        Commands::Connect => connect_command(&engine).await,
        Commands::Pull { json } => pull_command(&engine, json).await,
        Commands::Push { paths, json } => push_command(&engine, &paths, json).await,
        Commands::Rm { paths } => rm_command(&engine, &paths).await,
        Commands::Mv { old, new } => mv_command(&engine, &old, &new).await,
        Commands::Mkdir { dir } => mkdir_command(&engine, dir).await,
        Commands::Ls {
            path,
            recursive,
            json,
        } => ls_command(&engine, &path, recursive, json).await,
        Commands::Config { action } => config_command(&engine, settings.as_ref(), action).await,
        Commands::Setup(args) => setup_command(&engine, settings.as_ref(), args).await,
    };

    engine.shutdown().await;
    result
}

fn init_logging(cli: &Cli, logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        logging.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let registry = tracing_subscriber::registry().with(filter);

    let Some(path) = &logging.file else {
        if logging.json {
            registry
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()?;
        } else {
            registry
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .try_init()?;
        }
        return Ok(None);
    };

    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .context("Log file path has no file name")?;
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name));
    if logging.json {
        registry
            .with(fmt::layer().json().with_writer(writer))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_ansi(false).with_writer(writer))
            .try_init()?;
    }
    Ok(Some(guard))
}

/// Absolute form of a user supplied path; the file itself may not exist
fn absolute(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Ok(parent) = std::fs::canonicalize(parent) {
            return parent.join(name);
        }
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn print_outcome(operation: &str, outcome: &TransferOutcome) {
    match outcome {
        TransferOutcome::Completed => println!("{} {}", style("✓").green(), operation),
        TransferOutcome::Skipped { reason } => {
            println!("{} {} ({})", style("-").dim(), operation, style(reason).dim());
        }
        TransferOutcome::Dropped => {
            println!("{} {} (engine inactive)", style("-").yellow(), operation);
        }
        // The notifier already printed the failure
        TransferOutcome::Failed { .. } => {}
    }
}

fn count_failures<'a>(outcomes: impl IntoIterator<Item = &'a TransferOutcome>) -> usize {
    outcomes.into_iter().filter(|o| o.is_failed()).count()
}

async fn connect_command(engine: &SyncEngine) -> Result<()> {
    engine.connect().await?;
    let state = engine.connection_state().await;
    println!(
        "{} {} ({})",
        style("⇄").blue().bold(),
        style(engine.workspace_root().display()).cyan(),
        state
    );
    Ok(())
}

async fn pull_command(engine: &SyncEngine, json: bool) -> Result<()> {
    engine.connect().await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} Cancelling after the current item...", style("!").yellow());
            on_interrupt.cancel();
        }
    });

    let report = engine.initial_sync(&cancel).await?;
    if json {
        print_json(&PullJson {
            metadata: OperationMetadata::new("pull", engine.workspace_root()),
            report: report.clone(),
        })?;
    } else {
        for failure in &report.failures {
            println!("  {} {}: {}", style("✗").red(), failure.path, failure.message);
        }
        for path in &report.unreadable {
            println!("  {} could not list {}", style("!").yellow(), path);
        }
    }
    if report.cancelled {
        bail!("Pull cancelled");
    }
    Ok(())
}

async fn push_command(engine: &SyncEngine, paths: &[PathBuf], json: bool) -> Result<()> {
    engine.connect().await?;

    let mut results = Vec::new();
    for path in paths {
        let local = absolute(path);
        let outcomes = if local.is_dir() {
            engine.create_directory(&local).await?
        } else {
            vec![engine.upload_file(&local).await?]
        };
        for outcome in outcomes {
            let operation = format!("push {}", path.display());
            if !json {
                print_outcome(&operation, &outcome);
            }
            results.push(TransferJson::new(operation, &outcome));
        }
    }

    if json {
        print_json(&results)?;
    }
    let failed = results.iter().filter(|r| r.outcome == "failed").count();
    if failed > 0 {
        bail!("{failed} transfer(s) failed");
    }
    Ok(())
}

async fn rm_command(engine: &SyncEngine, paths: &[PathBuf]) -> Result<()> {
    engine.connect().await?;

    let mut outcomes = Vec::with_capacity(paths.len());
    for path in paths {
        let outcome = engine.delete_file(absolute(path)).await?;
        print_outcome(&format!("rm {}", path.display()), &outcome);
        outcomes.push(outcome);
    }
    match count_failures(&outcomes) {
        0 => Ok(()),
        failed => bail!("{failed} deletion(s) failed"),
    }
}

async fn mv_command(engine: &SyncEngine, old: &Path, new: &Path) -> Result<()> {
    engine.connect().await?;

    let outcome = engine.move_file(absolute(old), absolute(new)).await?;
    print_outcome(
        &format!("mv {} {}", old.display(), new.display()),
        &outcome,
    );
    if outcome.is_failed() {
        bail!("Move failed");
    }
    Ok(())
}

async fn mkdir_command(engine: &SyncEngine, dir: String) -> Result<()> {
    engine.connect().await?;

    let operation = format!("mkdir {dir}");
    let outcome = engine.queue().enqueue_mkdir(dir).await?;
    print_outcome(&operation, &outcome);
    if outcome.is_failed() {
        bail!("Creating the directory failed");
    }
    Ok(())
}

async fn ls_command(engine: &SyncEngine, path: &str, recursive: bool, json: bool) -> Result<()> {
    engine.connect().await?;

    if recursive {
        let manifest = engine.remote_manifest(path).await?;
        if json {
            return print_json(&ListingJson::tree(path, manifest));
        }
        for directory in &manifest.directories {
            println!("{}/", style(directory).blue().bold());
        }
        for file in &manifest.files {
            let size = manifest.sizes.get(file).copied().unwrap_or_default();
            println!("{file}  {}", style(format_bytes(size)).dim());
        }
        for unreadable in &manifest.unreadable {
            println!("{} {} (unreadable)", style("!").yellow(), unreadable);
        }
        return Ok(());
    }

    let mut entries = engine.list_remote(path).await?;
    entries.sort_by(|a, b| (b.is_dir(), &a.name).cmp(&(a.is_dir(), &b.name)));
    if json {
        return print_json(&ListingJson::Entries {
            path: path.to_string(),
            entries,
        });
    }
    for entry in entries {
        let modified = entry
            .modified_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        match entry.kind {
            FileKind::Directory => println!(
                "{:>16}  {:>10}  {}/",
                modified,
                "-",
                style(&entry.name).blue().bold()
            ),
            FileKind::File => println!(
                "{:>16}  {:>10}  {}",
                modified,
                format_bytes(entry.size),
                entry.name
            ),
        }
    }
    Ok(())
}

async fn config_command(
    engine: &SyncEngine,
    settings: &dyn SettingsProvider,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show { reveal } => {
            println!("{} Settings:", style("⚙").blue().bold());
            for key in SettingKey::ALL {
                let value = match (key, settings.get(key)) {
                    (SettingKey::Password, Some(_)) if !reveal => "********".to_string(),
                    (_, Some(value)) => value.to_string(),
                    (_, None) => style("<unset>").dim().to_string(),
                };
                println!("  {:<14} {}", style(key).cyan(), value);
            }
        }
        ConfigAction::Set { key, value } => {
            let key: SettingKey = key.parse()?;
            let value = SettingValue::parse_for(key, &value)?;
            let mut candidate = settings.settings();
            candidate.set(key, Some(value.clone()))?;
            candidate.validate()?;
            settings.set(key, Some(value))?;
            println!("{} {} updated", style("✓").green(), key);
        }
        ConfigAction::Unset { key } => {
            let key: SettingKey = key.parse()?;
            settings.set(key, None)?;
            println!("{} {} cleared", style("✓").green(), key);
        }
        ConfigAction::Reset { yes } => {
            if yes {
                engine.deactivate().await?;
                println!("{} Connection settings cleared", style("✓").green());
            } else if !engine.reset_config().await? {
                println!("Nothing changed");
            }
        }
    }
    Ok(())
}

async fn setup_command(
    engine: &SyncEngine,
    settings: &dyn SettingsProvider,
    args: SetupArgs,
) -> Result<()> {
    let mut updated: Settings = settings.settings();
    if let Some(protocol) = args.protocol {
        updated.protocol = protocol.into();
    }
    if args.host.is_some() {
        updated.host = args.host;
    }
    if args.port.is_some() {
        updated.port = args.port;
    }
    if args.username.is_some() {
        updated.username = args.username;
    }
    if args.password.is_some() {
        updated.password = args.password;
    }
    if let Some(remote_root) = args.remote_root {
        updated.remote_root = remote_root;
    }
    if !args.exclude.is_empty() {
        updated.sync_exclude = args.exclude;
    }
    if args.no_sync {
        updated.sync_on_connect = false;
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    match engine.configure(updated, &cancel).await? {
        Some(report) if report.cancelled => bail!("Initial sync cancelled"),
        Some(_) => {}
        None => println!(
            "{} Connected; run `ferromirror pull` to fetch the remote tree",
            style("✓").green()
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_setup() {
        let cli = Cli::try_parse_from([
            "ferromirror",
            "setup",
            "--protocol",
            "sftp",
            "--host",
            "example.com",
            "-u",
            "deploy",
            "--exclude",
            "dist",
            "--no-sync",
        ])
        .unwrap();
        match cli.command {
            Commands::Setup(args) => {
                assert!(matches!(args.protocol, Some(ProtocolArg::Sftp)));
                assert_eq!(args.host.as_deref(), Some("example.com"));
                assert_eq!(args.exclude, vec!["dist"]);
                assert!(args.no_sync);
            }
            _ => panic!("expected setup"),
        }
    }

    #[test]
    fn test_absolute_keeps_missing_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.txt");
        let resolved = absolute(&missing);
        assert_eq!(resolved.file_name().unwrap(), "gone.txt");
        assert!(resolved.is_absolute());
    }
}
