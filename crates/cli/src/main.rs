use std::{path::PathBuf, sync::Arc};

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::EnvFilter,
};

use {
    lernio_config::{LernioConfig, loader},
    lernio_gateway::{Services, composer::TemplateComposer, courses::JsonCourseDirectory, server},
    lernio_queue::{JobCategory, JobFilter, JobState, JobStore, store_sqlite::SqliteJobStore},
};

#[derive(Parser)]
#[command(name = "lernio", about = "lernio — scheduled course delivery over messaging")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Custom config directory (overrides default ~/.config/lernio/).
    #[arg(long, global = true, env = "LERNIO_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
    /// Custom data directory (overrides default data dir).
    #[arg(long, global = true, env = "LERNIO_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server (default when no subcommand is provided).
    Gateway,
    /// Inspect the job queue.
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },
    /// Configuration inspection.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum JobsAction {
    /// List recent jobs (exhausted ones included until swept).
    List {
        /// Filter by state (queued, inFlight, retryPending, completed, exhausted).
        #[arg(long)]
        state: Option<String>,
        /// Filter by category (lesson, reminder, notification, welcome, text).
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Show one job by id.
    Show { id: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the config directory path.
    Path,
    /// Print the loaded config with secrets redacted.
    Show,
}

fn init_tracing(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let config = loader::discover_and_load(cli.config_dir.as_deref());

    match cli.command.as_ref().unwrap_or(&Commands::Gateway) {
        Commands::Gateway => run_gateway(&cli, &config).await,
        Commands::Jobs { action } => run_jobs(&cli, &config, action).await,
        Commands::Config { action } => run_config(&config, action),
    }
}

async fn run_gateway(cli: &Cli, config: &LernioConfig) -> anyhow::Result<()> {
    let database_path = loader::database_path(config, cli.data_dir.as_deref());
    let courses_path = database_path
        .parent()
        .map(|p| p.join("courses.json"))
        .unwrap_or_else(|| PathBuf::from("courses.json"));

    let directory = JsonCourseDirectory::load(&courses_path)?;
    let mut services = Services::build(
        config,
        &database_path,
        directory,
        Arc::new(TemplateComposer),
    )
    .await?;
    services.start().await?;

    let bind = cli.bind.clone().unwrap_or_else(|| config.server.bind.clone());
    let port = cli.port.unwrap_or(config.server.port);

    tokio::select! {
        result = server::run(services.app_state(), &bind, port) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        },
    }

    services.stop().await;
    Ok(())
}

async fn run_jobs(cli: &Cli, config: &LernioConfig, action: &JobsAction) -> anyhow::Result<()> {
    let database_path = loader::database_path(config, cli.data_dir.as_deref());
    let store = SqliteJobStore::new(&format!("sqlite:{}", database_path.display())).await?;

    match action {
        JobsAction::List {
            state,
            category,
            limit,
        } => {
            let filter = JobFilter {
                category: category.as_deref().and_then(JobCategory::parse),
                state: state.as_deref().and_then(JobState::parse),
                limit: *limit,
            };
            let jobs = store.list(filter).await?;
            println!("{}", serde_json::to_string_pretty(&jobs)?);
        },
        JobsAction::Show { id } => match store.get(id).await? {
            Some(job) => println!("{}", serde_json::to_string_pretty(&job)?),
            None => anyhow::bail!("job not found: {id}"),
        },
    }
    Ok(())
}

fn run_config(config: &LernioConfig, action: &ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Path => {
            match loader::config_dir() {
                Some(dir) => println!("{}", dir.display()),
                None => anyhow::bail!("no config directory available"),
            }
        },
        ConfigAction::Show => {
            println!(
                "{}",
                serde_json::to_string_pretty(&loader::redacted_summary(config))?
            );
        },
    }
    Ok(())
}
