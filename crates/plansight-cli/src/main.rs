//! plansight command line
//!
//! Reads a report through the caching accessor and prints the settled
//! snapshot as JSON.

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use plansight_cache::{MemoryStore, ReportAccessor, ReportQuery, ReportStore, RestStore, RestStoreConfig};
use plansight_core::{sanitize_input, AccessorConfig, ReportId};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("plansight")
        .version(plansight_core::VERSION)
        .about("Read plan reports through a stale-while-revalidate cache")
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log at debug level"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Path to accessor config (TOML)"),
        )
        .subcommand(
            Command::new("fetch")
                .about("Fetch one report and print the snapshot")
                .arg(Arg::new("id").required(true).help("Report id"))
                .arg(
                    Arg::new("table")
                        .long("table")
                        .help("Table to read, overriding the config"),
                )
                .arg(
                    Arg::new("fixtures")
                        .long("fixtures")
                        .value_parser(value_parser!(PathBuf))
                        .conflicts_with("url")
                        .help("JSON array of rows to serve instead of a remote store"),
                )
                .arg(
                    Arg::new("url")
                        .long("url")
                        .env("PLANSIGHT_URL")
                        .help("Base URL of the remote store"),
                )
                .arg(
                    Arg::new("api-key")
                        .long("api-key")
                        .env("PLANSIGHT_API_KEY")
                        .hide_env_values(true)
                        .help("API key sent with every request"),
                )
                .arg(
                    Arg::new("refetch")
                        .long("refetch")
                        .action(ArgAction::SetTrue)
                        .help("Force a second read after the first settles"),
                ),
        )
        .subcommand(
            Command::new("sanitize")
                .about("Sanitize free text and print the result")
                .arg(Arg::new("text").required(true).help("Text to sanitize")),
        )
        .subcommand(Command::new("config").about("Print the effective config as TOML"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    match matches.subcommand() {
        Some(("fetch", args)) => {
            let mut config = load_config(&matches)?;
            if let Some(table) = args.get_one::<String>("table") {
                config = config.with_table(table.clone());
            }
            fetch(args, &config).await
        }
        Some(("sanitize", args)) => {
            let text = args.get_one::<String>("text").map_or("", String::as_str);
            println!("{}", sanitize_input(text));
            Ok(())
        }
        Some(("config", _)) => {
            let config = load_config(&matches)?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        _ => Ok(()),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn load_config(matches: &ArgMatches) -> Result<AccessorConfig> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => AccessorConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(AccessorConfig::default()),
    }
}

fn build_store(args: &ArgMatches, config: &AccessorConfig) -> Result<Arc<dyn ReportStore>> {
    if let Some(path) = args.get_one::<PathBuf>("fixtures") {
        let store = MemoryStore::from_json_file(&config.table, path)
            .with_context(|| format!("failed to load fixtures from {}", path.display()))?;
        return Ok(Arc::new(store));
    }

    let Some(url) = args.get_one::<String>("url") else {
        bail!("either --fixtures or --url is required");
    };
    let mut rest = RestStoreConfig::new(url.clone());
    if let Some(key) = args.get_one::<String>("api-key") {
        rest = rest.with_api_key(key.clone());
    }
    Ok(Arc::new(RestStore::new(&rest)?))
}

async fn fetch(args: &ArgMatches, config: &AccessorConfig) -> Result<()> {
    let store = build_store(args, config)?;
    let accessor = ReportAccessor::new(store, config)?;
    let id = args
        .get_one::<String>("id")
        .and_then(|raw| ReportId::parse(raw));
    if id.is_none() {
        tracing::warn!("empty report id, nothing to fetch");
    }

    let mut query = ReportQuery::new(accessor.clone(), id).await;
    let mut snapshot = query.settled().await;
    if args.get_flag("refetch") {
        query.refetch().await;
        snapshot = query.settled().await;
    }

    let stats = accessor.stats().await;
    tracing::debug!(
        store_calls = stats.store_calls,
        hits = stats.hits,
        misses = stats.misses,
        "accessor stats"
    );

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
