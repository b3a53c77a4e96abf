use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use configuration::{LoggingSettings, Settings};
use core_types::{UserType, Validator};
use database::{connect, run_migrations, DbRepository, NewUser};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// The main entry point for the clubhouse LMS.
#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file, if there is one.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = configuration::load_config_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    // Held for the life of the process so buffered file output is flushed.
    let _guard = init_logging(&settings.logging)?;

    match cli.command {
        Commands::Serve => web_server::run_server(settings).await?,
        Commands::Migrate => handle_migrate(&settings).await?,
        Commands::CreateAdmin(args) => handle_create_admin(args, &settings).await?,
        Commands::PruneLogs(args) => handle_prune_logs(args, &settings).await?,
        Commands::LogStats(args) => handle_log_stats(args, &settings).await?,
    }

    Ok(())
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Clubhouse learning management API and maintenance tools.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API.
    Serve,
    /// Apply pending database migrations and exit.
    Migrate,
    /// Create an administrator account.
    CreateAdmin(CreateAdminArgs),
    /// Delete API request logs older than the retention window.
    PruneLogs(PruneLogsArgs),
    /// Print request volume and latency for a trailing window.
    LogStats(LogStatsArgs),
}

#[derive(Parser)]
struct CreateAdminArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    surname: String,
    /// Falls back to the CLUBHOUSE_ADMIN_PASSWORD environment variable.
    #[arg(long, env = "CLUBHOUSE_ADMIN_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Parser)]
struct PruneLogsArgs {
    /// Overrides `api_logging.retention_days`.
    #[arg(long)]
    days: Option<i64>,
}

#[derive(Parser)]
struct LogStatsArgs {
    /// Size of the trailing window, in hours.
    #[arg(long, default_value_t = 24)]
    hours: i32,
    /// Print JSON instead of a table.
    #[arg(long)]
    json: bool,
}

// ==============================================================================
// Logging
// ==============================================================================

/// Console output always; a daily-rolling file too when a directory is set.
fn init_logging(settings: &LoggingSettings) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .context("Invalid logging.level filter")?;

    let (file_layer, guard) = match &settings.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir))?;
            let appender = tracing_appender::rolling::daily(dir, "clubhouse.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .context("Failed to install the tracing subscriber")?;
    Ok(guard)
}

// ==============================================================================
// Command Handlers
// ==============================================================================

async fn open_repository(settings: &Settings) -> Result<DbRepository> {
    let pool = connect(&settings.database)
        .await
        .context("Failed to connect to database")?;
    run_migrations(&pool).await.context("Failed to run migrations")?;
    Ok(DbRepository::new(pool))
}

async fn handle_migrate(settings: &Settings) -> Result<()> {
    open_repository(settings).await?;
    println!("Migrations applied.");
    Ok(())
}

async fn handle_create_admin(args: CreateAdminArgs, settings: &Settings) -> Result<()> {
    let mut v = Validator::new();
    v.required("username", Some(args.username.as_str()))
        .max_len("username", Some(args.username.as_str()), 50)
        .email("email", Some(args.email.as_str()))
        .required("name", Some(args.name.as_str()))
        .required("surname", Some(args.surname.as_str()))
        .min_len("password", Some(args.password.as_str()), 8);
    if let Err(errors) = v.finish() {
        bail!("Invalid admin details: {}", errors);
    }

    let repo = open_repository(settings).await?;
    let username = args.username.trim().to_string();
    let email = args.email.trim().to_string();
    if repo.username_exists(&username).await? {
        bail!("Username '{}' already exists", username);
    }
    if repo.email_exists(&email, None).await? {
        bail!("Email '{}' already exists", email);
    }

    let password_hash = web_server::auth::hash_password(&args.password).await?;
    let user = repo
        .create_user(&NewUser {
            username,
            email,
            password_hash,
            name: args.name.trim().to_string(),
            surname: args.surname.trim().to_string(),
            user_type: UserType::Admin,
            phone: None,
            school: None,
            grade: None,
        })
        .await
        .context("Failed to create admin account")?;
    tracing::info!(user_id = user.id, username = %user.username, "Admin account created");
    println!("Created admin '{}' (id {}).", user.username, user.id);
    Ok(())
}

async fn handle_prune_logs(args: PruneLogsArgs, settings: &Settings) -> Result<()> {
    let days = args.days.unwrap_or(settings.api_logging.retention_days);
    if days < 1 {
        bail!("Retention must be at least one day");
    }
    let repo = open_repository(settings).await?;
    let deleted = repo.prune_api_logs(days).await?;
    tracing::info!(deleted, days, "Pruned API request logs");
    println!("Deleted {} API log entries older than {} days.", deleted, days);
    Ok(())
}

async fn handle_log_stats(args: LogStatsArgs, settings: &Settings) -> Result<()> {
    if args.hours < 1 {
        bail!("--hours must be at least 1");
    }
    let repo = open_repository(settings).await?;
    let stats = repo.api_performance_stats(args.hours).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Window".to_string(), format!("last {} hours", stats.hours)]);
    table.add_row(vec!["Total requests".to_string(), stats.total_requests.to_string()]);
    table.add_row(vec!["Successful".to_string(), stats.success_count.to_string()]);
    table.add_row(vec!["Errors".to_string(), stats.error_count.to_string()]);
    table.add_row(vec!["Error rate".to_string(), format!("{:.2}%", stats.error_rate)]);
    table.add_row(vec!["Avg duration".to_string(), format!("{:.2} ms", stats.avg_duration_ms)]);
    table.add_row(vec!["Min duration".to_string(), format!("{:.2} ms", stats.min_duration_ms)]);
    table.add_row(vec!["Max duration".to_string(), format!("{:.2} ms", stats.max_duration_ms)]);

    println!("API request statistics as of {}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
    println!("{table}");
    Ok(())
}
