//! repairdesk - command-line front-end for the repair shop backend.
//!
//! Reads go through the query cache and writes through `mutate`, the same
//! way the dashboard uses the data layer. Output is pretty-printed JSON.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repairdesk_core::models::{RepairStatus, StoreOrderStatus};
use repairdesk_core::{ApiError, Config, DataContext, ProductFilter, RepairFilter, Subscription};

/// Log file name prefix inside `--log-dir` (rotated daily)
const LOG_FILE_PREFIX: &str = "repairdesk.log";

#[derive(Parser, Debug)]
#[command(name = "repairdesk", version, about = "Repair shop dashboard data from the command line")]
struct Cli {
    /// Log in as this user before running the command
    #[arg(long, global = true)]
    username: Option<String>,

    /// Password for --username (prompted when absent)
    #[arg(long, hide = true, env = "REPAIRDESK_PASSWORD")]
    password: Option<String>,

    /// Also write logs to a daily-rotated file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List repairs
    Repairs {
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// saisie, en-cours, prete or en-attente
        #[arg(long, value_parser = parse_repair_status)]
        status: Option<RepairStatus>,
        /// Client user id
        #[arg(long)]
        client: Option<i64>,
        #[arg(long)]
        device_type: Option<String>,
    },
    /// Show one repair
    Repair { id: String },
    /// List store orders
    Orders,
    /// Change a store order's status, then print the refreshed order list
    OrderStatus {
        id: i64,
        /// pending, ordered, received or cancelled
        #[arg(value_parser = parse_order_status)]
        status: StoreOrderStatus,
    },
    /// List suppliers
    Suppliers,
    /// List stock items
    Stock {
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// List products
    Products {
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Name, SKU or EAN search
        #[arg(long)]
        search: Option<String>,
        /// Brand id
        #[arg(long)]
        brand: Option<i64>,
        #[arg(long)]
        in_stock: Option<bool>,
    },
    /// List spare parts
    Parts {
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Write the current configuration (defaults plus environment) to the config file
    ConfigInit,
}

fn parse_repair_status(value: &str) -> Result<RepairStatus, String> {
    RepairStatus::parse(value).ok_or_else(|| format!("unknown repair status '{}'", value))
}

fn parse_order_status(value: &str) -> Result<StoreOrderStatus, String> {
    StoreOrderStatus::parse(value).ok_or_else(|| format!("unknown order status '{}'", value))
}

/// Initialize the tracing subscriber for logging.
/// The returned guard flushes the file writer and must live until exit.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=repairdesk_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

/// Wait for a query to settle and return its data, or its error.
async fn read<T>(mut subscription: Subscription<T>) -> Result<Arc<T>>
where
    T: Send + Sync + 'static,
{
    let state = subscription.settled().await;
    match (state.data, state.error) {
        (Some(data), None) => Ok(data),
        (_, Some(ApiError::AuthExpired)) => Err(anyhow!(
            "Session expired - run again with --username to log in"
        )),
        (_, Some(e)) => {
            Err(anyhow::Error::new(e).context(format!("Query {} failed", subscription.key())))
        }
        (None, None) => Err(anyhow!("Query {} returned no data", subscription.key())),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn login(ctx: &DataContext, username: &str, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => rpassword::prompt_password("Password: ").context("Failed to read password")?,
    };
    let user = ctx
        .api()
        .login(username, &password)
        .await
        .context("Login failed")?;
    if let Some(user) = user {
        debug!(user_id = user.id, "Login response user");
    }
    Ok(())
}

async fn run(ctx: &DataContext, config: &Config, command: Commands) -> Result<()> {
    let queries = ctx.queries();
    match command {
        Commands::Repairs {
            page,
            status,
            client,
            device_type,
        } => {
            let filter = RepairFilter {
                status,
                client,
                device_type,
            };
            print_json(&*read(queries.repairs(page, filter)).await?)
        }
        Commands::Repair { id } => print_json(&*read(queries.repair(&id)).await?),
        Commands::Orders => print_json(&*read(queries.store_orders()).await?),
        Commands::OrderStatus { id, status } => {
            // Keep the list subscribed so the write's invalidation refetches it
            let orders = queries.store_orders();
            let updated = queries
                .update_store_order_status(id, status)
                .await
                .with_context(|| format!("Failed to set order {} to {}", id, status))?;
            info!(order = updated.id, status = %updated.status, "Store order updated");
            print_json(&*read(orders).await?)
        }
        Commands::Suppliers => print_json(&*read(queries.suppliers()).await?),
        Commands::Stock { page } => print_json(&*read(queries.stock_items(page)).await?),
        Commands::Products {
            page,
            search,
            brand,
            in_stock,
        } => {
            let filter = ProductFilter {
                search,
                brand,
                in_stock,
                ..Default::default()
            };
            print_json(&*read(queries.products(page, filter)).await?)
        }
        Commands::Parts { page } => print_json(&*read(queries.parts(page)).await?),
        Commands::ConfigInit => {
            let path = config.save()?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_deref());
    info!("repairdesk starting");

    let config = Config::load()?;
    let ctx = DataContext::new(&config)?;

    if let Some(ref username) = cli.username {
        login(&ctx, username, cli.password.clone()).await?;
    }

    let result = run(&ctx, &config, cli.command).await;

    ctx.shutdown();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repairs_filters() {
        let cli = Cli::try_parse_from([
            "repairdesk",
            "repairs",
            "--page",
            "3",
            "--status",
            "en-attente",
            "--client",
            "7",
        ])
        .unwrap();
        match cli.command {
            Commands::Repairs {
                page,
                status,
                client,
                device_type,
            } => {
                assert_eq!(page, 3);
                assert_eq!(status, Some(RepairStatus::EnAttente));
                assert_eq!(client, Some(7));
                assert!(device_type.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_order_status_rejects_unknown_status() {
        assert!(Cli::try_parse_from(["repairdesk", "order-status", "3", "shipped"]).is_err());
        assert!(Cli::try_parse_from(["repairdesk", "order-status", "3", "received"]).is_ok());
    }

    #[test]
    fn test_parse_products_filters() {
        let cli = Cli::try_parse_from([
            "repairdesk",
            "products",
            "--search",
            "ecran",
            "--in-stock",
            "true",
        ])
        .unwrap();
        match cli.command {
            Commands::Products {
                page,
                search,
                brand,
                in_stock,
            } => {
                assert_eq!(page, 1);
                assert_eq!(search.as_deref(), Some("ecran"));
                assert!(brand.is_none());
                assert_eq!(in_stock, Some(true));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_config_init() {
        let cli = Cli::try_parse_from(["repairdesk", "config-init"]).unwrap();
        assert!(matches!(cli.command, Commands::ConfigInit));
    }

    #[test]
    fn test_global_username() {
        let cli =
            Cli::try_parse_from(["repairdesk", "suppliers", "--username", "atelier"]).unwrap();
        assert_eq!(cli.username.as_deref(), Some("atelier"));
    }
}
