use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vendor_availability::availability::busy_slots;
use vendor_availability::config::Config;
use vendor_availability::error::Result;
use vendor_availability::fetcher::Fetcher;
use vendor_availability::ical::{IcsParser, ParseOptions, Window};
use vendor_availability::server::{AppState, create_router};
use vendor_availability::watcher::start_config_watcher;

#[derive(Parser)]
#[command(name = "vendor-availability")]
#[command(about = "Turn vendor ICS feeds into busy/free availability", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve vendor availability over HTTP
    Serve {
        #[arg(short, long, default_value = "config.json", env = "VENDOR_AVAILABILITY_CONFIG")]
        config: PathBuf,

        #[arg(long)]
        bind: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Parse a local ICS file (or `-` for stdin) and print JSON
    Parse {
        file: PathBuf,

        #[arg(long)]
        include_cancelled: bool,

        /// IANA zone for times without a TZID
        #[arg(long)]
        timezone: Option<String>,

        /// Window start (RFC 3339)
        #[arg(long)]
        from: Option<DateTime<Utc>>,

        /// Window end (RFC 3339)
        #[arg(long)]
        to: Option<DateTime<Utc>>,

        /// Print merged busy slots instead of events
        #[arg(long)]
        busy: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vendor_availability=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match Cli::parse().command {
        Command::Serve { config, bind, port } => serve(config, bind, port).await,
        Command::Parse {
            file,
            include_cancelled,
            timezone,
            from,
            to,
            busy,
        } => {
            let options = ParseOptions {
                include_cancelled,
                window: Window {
                    start: from,
                    end: to,
                },
                default_timezone: timezone,
            };
            parse_file(&file, &options, busy)
        }
    }
}

async fn serve(config_path: PathBuf, bind: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = Config::load(&config_path)?;
    config.validate()?;

    if let Some(bind) = bind {
        config.server.bind_address = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let address = format!("{}:{}", config.server.bind_address, config.server.port);
    tracing::info!(%address, "Starting server");
    tracing::info!("Configured vendors: {:?}", config.vendors.keys());

    let state = AppState::new(config, config_path, Fetcher::new()?);
    start_config_watcher(state.clone())?;

    let listener = tokio::net::TcpListener::bind(&address).await?;
    axum::serve(listener, create_router(state)).await?;

    Ok(())
}

fn parse_file(file: &Path, options: &ParseOptions, busy: bool) -> Result<()> {
    let source = if file.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        buf
    } else {
        std::fs::read(file)?
    };

    let events = IcsParser::new().parse(&source, options);
    tracing::info!(events = events.len(), "Parsed {}", file.display());

    let output = if busy {
        serde_json::to_string_pretty(&busy_slots(&events))?
    } else {
        serde_json::to_string_pretty(&events)?
    };
    println!("{}", output);

    Ok(())
}
