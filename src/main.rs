use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info};
use uuid::Uuid;

use warranty_watch::clock::{Clock, SystemClock};
use warranty_watch::config::AppConfig;
use warranty_watch::dates;
use warranty_watch::logging::{init_from_config, init_logging, OperationTimer};
use warranty_watch::metrics::MetricsCollector;
use warranty_watch::models::{StatusFilter, Warranty};
use warranty_watch::repository::WarrantyRepository;
use warranty_watch::store::filter_by_status;
use warranty_watch::supabase::SupabaseClient;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Extra configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level for commands that do not read the configuration
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the due date of a warranty
    DueDate {
        /// Exchange date (YYYY-MM-DD, RFC 3339 or DD/MM/YYYY)
        #[arg(short, long)]
        exchange_date: String,

        /// Warranty length in days
        #[arg(short, long)]
        days: i64,
    },
    /// Status of a warranty with the given due date
    Status {
        /// Due date
        #[arg(short, long)]
        due_date: String,

        /// Day to evaluate on (defaults to today)
        #[arg(short, long)]
        today: Option<String>,
    },
    /// List an owner's warranties from the remote store
    List {
        /// Owner (auth user) id
        #[arg(short, long)]
        owner: Uuid,

        /// Access token of the owner's session
        #[arg(short, long)]
        token: String,

        /// Status filter (all, active, expiring, expired)
        #[arg(short, long, default_value = "all")]
        status: StatusFilter,
    },
    /// Print the effective configuration with the key redacted
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::DueDate {
            ref exchange_date,
            days,
        } => {
            let _guard = init_logging(Some(&cli.log_level), None)?;
            due_date(exchange_date, days)
        }
        Commands::Status {
            ref due_date,
            ref today,
        } => {
            let _guard = init_logging(Some(&cli.log_level), None)?;
            status(due_date, today.as_deref())
        }
        Commands::List {
            owner,
            ref token,
            status,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let _guard = init_from_config(&config.logging)?;
            MetricsCollector::init()?;
            list(&config, owner, token, status).await
        }
        Commands::Config => {
            let config = load_config(cli.config.as_deref())?;
            print_config(&config)
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
}

#[allow(clippy::print_stdout)]
fn due_date(exchange_date: &str, days: i64) -> Result<()> {
    let due = dates::calculate_due_date(exchange_date, days)?;
    let day = dates::local_day(&due);
    debug!(%due, "Due date computed");
    println!("{} ({})", dates::to_iso_date_string(day), dates::format_day(day));
    Ok(())
}

#[allow(clippy::print_stdout)]
fn status(due_date: &str, today: Option<&str>) -> Result<()> {
    let today = match today {
        Some(day) => dates::parse_calendar_date(day)?,
        None => SystemClock.today(),
    };
    let status = dates::determine_status_str(due_date, today)?;
    println!("{} ({})", status.as_str(), status.label());
    Ok(())
}

#[allow(clippy::print_stdout)]
async fn list(config: &AppConfig, owner: Uuid, token: &str, filter: StatusFilter) -> Result<()> {
    let timer = OperationTimer::new("list");
    let client = SupabaseClient::new(config)?.with_access_token(token);
    let warranties = client
        .list_for_owner(owner)
        .await
        .context("Failed to load warranties")?;
    let today = SystemClock.today();
    let shown = filter_by_status(&warranties, filter, today);
    info!(
        total = warranties.len(),
        shown = shown.len(),
        filter = filter.label(),
        "Warranties listed"
    );

    for warranty in &shown {
        println!("{}", render_row(warranty, today));
    }
    timer.finish();
    Ok(())
}

fn render_row(warranty: &Warranty, today: chrono::NaiveDate) -> String {
    let status = dates::determine_status(&warranty.due_date, today);
    format!(
        "{}  {:<9}  {}  {}  {}",
        dates::format_date(&warranty.due_date),
        status.label(),
        warranty.client_name,
        warranty.client_phone,
        warranty.id
    )
}

#[allow(clippy::print_stdout)]
fn print_config(config: &AppConfig) -> Result<()> {
    let rendered = serde_yaml::to_string(&config.redacted())
        .context("Failed to render configuration")?;
    println!("{rendered}");
    Ok(())
}
