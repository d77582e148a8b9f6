//! tsdb-relay CLI
//!
//! Command-line interface for tsdb-relay operations:
//! - Parse URL-form requests into JSON
//! - Encode JSON requests into URL form
//! - Fan a request out to the configured targets and print the merged result
//! - Generate a default config file

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tsdb_relay::client::{Context, TsdbClient};
use tsdb_relay::config::{generate_default_config, Config, LoggingConfig};
use tsdb_relay::multi::MultiSource;
use tsdb_relay::query::{parse_query, parse_request, Request, Version};

#[derive(Parser)]
#[command(name = "tsdb-relay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "OpenTSDB query parser and multi-backend relay")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the usual locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a URL-form request (start=1h-ago&m=sum:cpu) and print it as JSON
    Parse {
        /// Request in URL form, or a single query with --single
        input: String,
        /// Treat the input as one compact query (sum:rate:cpu{host=*})
        #[arg(short, long)]
        single: bool,
        /// OpenTSDB version selecting the grammar (default: from config)
        #[arg(long = "tsdb-version")]
        tsdb_version: Option<Version>,
    },

    /// Encode a JSON request into URL form
    Encode {
        /// JSON request file (default: stdin)
        path: Option<PathBuf>,
    },

    /// Query every configured target and print the merged response
    Query {
        /// Request in URL form
        input: String,
        /// Downsample so each series returns about this many points
        #[arg(long)]
        points: Option<usize>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_logging(&config.logging);

    match cli.command {
        Commands::Parse {
            input,
            single,
            tsdb_version,
        } => {
            let version = tsdb_version.unwrap_or(config.tsdb.version);
            let json = if single {
                serde_json::to_string_pretty(&parse_query(&input, version)?)?
            } else {
                serde_json::to_string_pretty(&parse_request(&input, version)?)?
            };
            println!("{}", json);
        }

        Commands::Encode { path } => {
            let body = match path {
                Some(path) => std::fs::read(&path)
                    .with_context(|| format!("Failed to read {:?}", path))?,
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };
            let request = Request::from_json(&body)?;
            println!("{}", request.encode());
        }

        Commands::Query { input, points } => {
            if config.targets.is_empty() {
                anyhow::bail!("No targets configured; add [[targets]] or set TSDB_RELAY_TARGETS");
            }

            let client = TsdbClient::new(config.client_config())?;
            let mut multi = MultiSource::new();
            for target in config.build_targets(&client) {
                multi = multi.add(target);
            }

            let mut request = parse_request(&input, multi.version())?;
            if let Some(points) = points {
                request.auto_downsample(points)?;
            }

            tracing::info!(
                targets = multi.len(),
                queries = request.queries.len(),
                "Running multi-source query"
            );
            let merged = multi.query(&request).await?;
            println!("{}", serde_json::to_string_pretty(&merged)?);
        }

        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("Failed to write {:?}", path))?;
                    eprintln!("Wrote config to {:?}", path);
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable
fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("tsdb_relay={}", logging.level)),
    );

    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
