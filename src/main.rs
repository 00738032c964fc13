use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use mta_time::arrivals::{ArrivalFilter, Direction, next_arrival};
use mta_time::dashboard::{
    DEFAULT_BASE_URL, DEFAULT_CORRELATION_DAYS, DEFAULT_TRANSACTION_DAYS, DashboardClient,
};
use mta_time::display::lcd_lines;
use mta_time::server::{self, AppState};
use mta_time::stations::{self, Coordinates, Home, Station, haversine_miles};
use mta_time::tracker::{POLL_INTERVAL, Tracker};
use mta_time::{FeedConfig, FeedSource, HttpFeedSource};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, global = true, env = "MTA_FEEDS_CONFIG", help = "YAML feed map (defaults to the built-in one)")]
    feeds: Option<PathBuf>,

    #[arg(long, global = true, env = "MTA_API_KEY", hide_env_values = true, help = "Sent as the x-api-key header")]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Redraw the arrival board for the station nearest to a location every 30 seconds
    Track {
        #[arg(long, default_value_t = 40.7088, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, default_value_t = -73.9504, allow_negative_numbers = true)]
        lon: f64,
        #[arg(long, default_value_t = 40.7088, allow_negative_numbers = true)]
        home_lat: f64,
        #[arg(long, default_value_t = -73.9504, allow_negative_numbers = true)]
        home_lon: f64,
        #[arg(long, default_value = "L10", help = "Station used within 0.1 mi of home")]
        home_stop: String,
        #[arg(
            long,
            value_parser = clap::value_parser!(u64).range(1..),
            help = "Poll interval in seconds (default: 30)"
        )]
        interval: Option<u64>,
    },
    /// Print the next trains at one stop and exit
    Check {
        stop: String,
        #[arg(short, long, help = "N/S, uptown/downtown")]
        direction: Option<String>,
        #[arg(short, long)]
        line: Option<String>,
    },
    /// Print the next train as two short lines for an LCD
    Simple {
        #[arg(default_value = "L11")]
        stop: String,
    },
    /// Serve the status page and JSON API
    Serve {
        #[arg(short, long, env = "PORT", default_value_t = 3000)]
        port: u16,
        #[arg(long, default_value = "L11", help = "Station shown by / and /api")]
        stop: String,
    },
    /// Show how lines map to feed endpoints
    Feeds { lines: Vec<String> },
    /// Query the finance and health dashboard backend and print the JSON
    Dashboard {
        #[arg(long, env = "DASHBOARD_API_URL", default_value = DEFAULT_BASE_URL)]
        base_url: String,
        #[command(subcommand)]
        query: DashboardQuery,
    },
}

#[derive(Subcommand, Debug)]
enum DashboardQuery {
    Transactions {
        #[arg(long, default_value_t = DEFAULT_TRANSACTION_DAYS)]
        days: u32,
    },
    WhoopProfile,
    WhoopLatest,
    Health,
    UnifiedScore,
    WellnessRoi,
    Correlation {
        #[arg(long, default_value_t = DEFAULT_CORRELATION_DAYS)]
        days: u32,
    },
    /// Create a Plaid Link token for a user
    LinkToken { user_id: String },
    /// Swap a Plaid public token for an access token
    ExchangeToken { public_token: String },
}

fn init_logger() {
    let default_level = LevelFilter::INFO;
    let rust_log =
        std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| default_level.to_string());
    let env_filter = EnvFilter::try_new(rust_log).unwrap_or_else(|err| {
        eprintln!(
            "invalid {}, falling back to level '{default_level}' - {err}",
            EnvFilter::DEFAULT_ENV
        );
        EnvFilter::new(default_level.to_string())
    });
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn station(stop: &str) -> Result<&'static Station> {
    stations::station_by_stop_id(stop).ok_or_else(|| anyhow!("unknown stop id: {stop}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();

    let config = Arc::new(
        FeedConfig::load_or_embedded(args.feeds.as_deref()).context("loading feed configuration")?,
    );
    let api_key = args.api_key.filter(|key| !key.trim().is_empty());
    let source: Arc<dyn FeedSource> = Arc::new(HttpFeedSource::new(config.clone(), api_key));

    match args.command {
        Command::Track { lat, lon, home_lat, home_lon, home_stop, interval } => {
            let here = Coordinates::new(lat, lon)?;
            let home = Home { location: Coordinates::new(home_lat, home_lon)?, station: station(&home_stop)? };
            let selected = stations::select_station(here, Some(&home))
                .ok_or_else(|| anyhow!("no stations configured"))?;
            let distance = haversine_miles(here, selected.location());
            tracing::info!("selected station: {} ({} train)", selected.name, selected.lines.join("/"));

            let mut tracker = Tracker::new(source, config, selected).with_note(format!(
                "Distance: {:.0} feet ({distance:.2} miles)",
                distance * 5280.0
            ));
            if haversine_miles(here, home.location) <= stations::HOME_RADIUS_MILES {
                tracker = tracker.with_note(format!("Using {} (within 0.1 mile of home)", home.station.name));
            }
            let every = interval.map_or(POLL_INTERVAL, Duration::from_secs);
            tracker.run(every).await;
        }
        Command::Check { stop, direction, line } => {
            let station = station(&stop)?;
            let mut filter = ArrivalFilter::default();
            let mut title = format!("{} Status - {}", station.lines.join("/"), station.name);
            if let Some(line) = line {
                if !config.is_valid_line(&line) {
                    return Err(mta_time::Error::UnknownLine(line).into());
                }
                title = format!("{} Train Status - {}", line.to_uppercase(), station.name);
                filter = filter.with_line(line);
            }
            let mut tracker = Tracker::new(source, config, station);
            if let Some(direction) = direction {
                let direction =
                    Direction::parse(&direction).ok_or_else(|| anyhow!("invalid direction: {direction}"))?;
                filter.direction = Some(direction);
                tracker = tracker.with_note(format!("Direction: To {}", station.direction_label(direction)));
            }
            let board = tracker.with_title(title).with_filter(filter).board().await?;
            println!("{board}");
        }
        Command::Simple { stop } => {
            let station = station(&stop)?;
            let tracker = Tracker::new(source, config, station);
            let arrivals = tracker.arrivals().await.unwrap_or_else(|e| {
                tracing::error!("Error: {e}");
                Vec::new()
            });
            let lcd = lcd_lines(next_arrival(&arrivals));
            println!("{}", lcd.line1);
            println!("{}", lcd.line2);
        }
        Command::Serve { port, stop } => {
            let state = AppState { config, source, station: station(&stop)? };
            server::serve(state, port).await.context("running web server")?;
        }
        Command::Feeds { lines } => print_feeds(&config, &lines),
        Command::Dashboard { base_url, query } => {
            let value = dashboard_query(&DashboardClient::new(base_url), query).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}

async fn dashboard_query(
    client: &DashboardClient, query: DashboardQuery,
) -> mta_time::Result<serde_json::Value> {
    match query {
        DashboardQuery::Transactions { days } => client.banking_transactions(days).await,
        DashboardQuery::WhoopProfile => client.whoop_profile().await,
        DashboardQuery::WhoopLatest => client.whoop_latest().await,
        DashboardQuery::Health => Ok(client.health_check().await),
        DashboardQuery::UnifiedScore => client.unified_score().await,
        DashboardQuery::WellnessRoi => client.wellness_roi().await,
        DashboardQuery::Correlation { days } => client.health_correlation(days).await,
        DashboardQuery::LinkToken { user_id } => client.create_link_token(&user_id).await,
        DashboardQuery::ExchangeToken { public_token } => client.exchange_public_token(&public_token).await,
    }
}

fn print_feeds(config: &FeedConfig, lines: &[String]) {
    let rule = "-".repeat(70);
    let lines: Vec<String> = if lines.is_empty() {
        config.all_lines().into_iter().map(ToString::to_string).collect()
    } else {
        lines.to_vec()
    };

    println!("Endpoints\n{rule}");
    for line in &lines {
        match config.endpoint_for_line(line) {
            Ok(url) => println!(
                "   {line:<4} => {url} ({})",
                config.line_color(line).unwrap_or("no colour")
            ),
            Err(e) => println!("   {line:<4} => ERROR: {e}"),
        }
    }

    println!("\nFeed groups\n{rule}");
    for (group, lines) in config.lines_by_feed() {
        println!("   {group:<10} => [{}]", lines.join(", "));
    }

    let metadata = config.metadata();
    println!("\nMetadata\n{rule}");
    println!("   Base URL: {}", metadata.base_url);
    println!("   API Version: {}", metadata.api_version);
    println!("   Update Frequency: {}s", metadata.update_frequency_seconds);
    println!("   API Key Required: {}", metadata.api_key_required);
}
