mod commands;
mod context;
mod error;
mod tracing;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use context::Context;
use error::CliResult;
use his_sync_config::HisSyncConfig;
use his_sync_store::{ExecutionMode, ImportStrategyKind, MergeModeKind, SyncType};

#[derive(Parser)]
#[command(name = "his-sync", about = "Operator CLI for the hierarchical health-information-server replication system")]
struct Cli {
    /// Path to a TOML configuration file. Falls back to `./his-sync.toml`, then built-in defaults.
    #[arg(long, global = true)]
    config_file: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Starts the monitor task for one configuration, or every eligible one,
    /// and blocks until interrupted (Ctrl-C) — this command is the daemon.
    StartAutoSync { config_id: Option<Uuid> },
    /// Disables auto-sync for one configuration, or every enabled one, and
    /// stops its monitor task if one is live in this process.
    StopAutoSync { config_id: Option<Uuid> },
    /// Creates or updates a configuration's automatic-execution settings.
    SetupAutoSync {
        #[arg(long)]
        config_id: Uuid,
        #[arg(long, default_value_t = 300)]
        interval: u64,
        #[arg(long, default_value_t = 10)]
        max_per_hour: u32,
        #[arg(long, default_value_t = 300)]
        cooldown: u64,
        #[arg(long, default_value_t = 0)]
        delay: u64,
    },
    /// Re-canonicalizes every stored instance's base URL.
    CleanupInstanceUrls {
        #[arg(long)]
        dry_run: bool,
    },
    /// Runs one diagnostic or live pass for a configuration without scheduling anything.
    TestSyncSystem {
        #[arg(long)]
        config_id: Option<Uuid>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        metadata_only: bool,
    },
    /// Instance CRUD.
    Instance {
        #[command(subcommand)]
        command: InstanceCommand,
    },
    /// Sync configuration CRUD.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum InstanceCommand {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        base_url: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        source: bool,
        #[arg(long)]
        destination: bool,
    },
    List,
}

#[derive(Subcommand)]
enum ConfigCommand {
    Add {
        #[arg(long)]
        source_id: Uuid,
        #[arg(long)]
        destination_id: Uuid,
        #[arg(long, value_enum)]
        sync_type: CliSyncType,
        #[arg(long, value_enum, default_value_t = CliImportStrategy::CreateAndUpdate)]
        import_strategy: CliImportStrategy,
        #[arg(long, value_enum, default_value_t = CliMergeMode::Merge)]
        merge_mode: CliMergeMode,
        #[arg(long, value_enum, default_value_t = CliExecutionMode::Manual)]
        execution_mode: CliExecutionMode,
        #[arg(long, default_value_t = 50)]
        page_size: u32,
    },
    List,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliSyncType {
    Metadata,
    AggregateData,
    Events,
    Tracker,
    AggregateMetadata,
    AllData,
    Complete,
}

impl From<CliSyncType> for SyncType {
    fn from(v: CliSyncType) -> Self {
        match v {
            CliSyncType::Metadata => SyncType::Metadata,
            CliSyncType::AggregateData => SyncType::AggregateData,
            CliSyncType::Events => SyncType::Events,
            CliSyncType::Tracker => SyncType::Tracker,
            CliSyncType::AggregateMetadata => SyncType::AggregateMetadata,
            CliSyncType::AllData => SyncType::AllData,
            CliSyncType::Complete => SyncType::Complete,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliImportStrategy {
    CreateOnly,
    UpdateOnly,
    CreateAndUpdate,
    Delete,
}

impl From<CliImportStrategy> for ImportStrategyKind {
    fn from(v: CliImportStrategy) -> Self {
        match v {
            CliImportStrategy::CreateOnly => ImportStrategyKind::CreateOnly,
            CliImportStrategy::UpdateOnly => ImportStrategyKind::UpdateOnly,
            CliImportStrategy::CreateAndUpdate => ImportStrategyKind::CreateAndUpdate,
            CliImportStrategy::Delete => ImportStrategyKind::Delete,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliMergeMode {
    Replace,
    Merge,
}

impl From<CliMergeMode> for MergeModeKind {
    fn from(v: CliMergeMode) -> Self {
        match v {
            CliMergeMode::Replace => MergeModeKind::Replace,
            CliMergeMode::Merge => MergeModeKind::Merge,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliExecutionMode {
    Manual,
    Scheduled,
    Automatic,
}

impl From<CliExecutionMode> for ExecutionMode {
    fn from(v: CliExecutionMode) -> Self {
        match v {
            CliExecutionMode::Manual => ExecutionMode::Manual,
            CliExecutionMode::Scheduled => ExecutionMode::Scheduled,
            CliExecutionMode::Automatic => ExecutionMode::Automatic,
        }
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let config = match HisSyncConfig::load(cli.config_file.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}, using defaults");
            HisSyncConfig::default()
        }
    };
    tracing::init_tracing(&config.log_level);

    match run(cli.command, &config).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: &HisSyncConfig) -> CliResult<()> {
    let ctx = Context::open(config)?;

    match command {
        Command::StartAutoSync { config_id } => commands::auto_sync::run_until_interrupted(&ctx, config_id).await,
        Command::StopAutoSync { config_id } => commands::auto_sync::stop(&ctx, config_id).await,
        Command::SetupAutoSync { config_id, interval, max_per_hour, cooldown, delay } => {
            commands::auto_sync::setup(&ctx, config_id, interval, max_per_hour, cooldown, delay)
        }
        Command::CleanupInstanceUrls { dry_run } => {
            let changed = commands::cleanup::run(&ctx, dry_run)?;
            println!("{changed} instance url(s) {}", if dry_run { "would be normalized" } else { "normalized" });
            Ok(())
        }
        Command::TestSyncSystem { config_id, dry_run, metadata_only } => {
            for config in commands::eligible_configurations(&ctx, config_id)? {
                let outcome = commands::test_sync::run_one(&ctx, &config, dry_run, metadata_only).await?;
                print_test_outcome(config.id, &outcome);
            }
            Ok(())
        }
        Command::Instance { command } => run_instance(&ctx, command),
        Command::Config { command } => run_config(&ctx, command),
    }
}

fn print_test_outcome(config_id: Uuid, outcome: &commands::test_sync::TestOutcome) {
    match outcome {
        commands::test_sync::TestOutcome::Diagnostic { source, destination, has_changes, metadata_changed } => {
            println!(
                "configuration {config_id}: source reachable={} ({}), destination reachable={} ({}), changes={} metadata={:?}",
                source.reachable, source.detail, destination.reachable, destination.detail, has_changes, metadata_changed
            );
        }
        commands::test_sync::TestOutcome::Ran(report) => {
            println!("configuration {config_id}: {report:?}");
        }
    }
}

fn run_instance(ctx: &Context, command: InstanceCommand) -> CliResult<()> {
    match command {
        InstanceCommand::Add { name, base_url, username, password, source, destination } => {
            let instance = commands::instance::add(ctx, name, base_url, username, password, source, destination)?;
            println!("created instance {} ({})", instance.name, instance.id);
        }
        InstanceCommand::List => {
            for instance in commands::instance::list(ctx)? {
                println!("{}\t{}\t{}\tsource={} destination={}", instance.id, instance.name, instance.base_url, instance.is_source, instance.is_destination);
            }
        }
    }
    Ok(())
}

fn run_config(ctx: &Context, command: ConfigCommand) -> CliResult<()> {
    match command {
        ConfigCommand::Add { source_id, destination_id, sync_type, import_strategy, merge_mode, execution_mode, page_size } => {
            let config = commands::config::add(
                ctx,
                source_id,
                destination_id,
                sync_type.into(),
                import_strategy.into(),
                merge_mode.into(),
                execution_mode.into(),
                page_size,
            )?;
            println!("created configuration {}", config.id);
        }
        ConfigCommand::List => {
            for config in commands::config::list(ctx)? {
                println!("{}\t{:?}\t{:?}\tactive={}", config.id, config.sync_type, config.execution_mode, config.active);
            }
        }
    }
    Ok(())
}
