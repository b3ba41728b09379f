//! Field service API entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use field_service::api::{create_router, AppState};
use field_service::config::Config;
use field_service::duration::sum_durations;
use field_service::geo::{is_within_radius, Coordinate};
use field_service::metrics;
use field_service::store::{DocumentStore, LocalFileStore, MemoryStore};
use field_service::utils::shutdown_signal;
use field_service::visits::GeofencePolicy;

/// REST API for field-service technicians.
#[derive(Parser, Debug)]
#[command(name = "field-service")]
#[command(about = "Visit tracking, punch-in/out, checklists, attachments and geofencing")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default).
    Serve {
        /// Listen port, overriding PORT.
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Distance between two coordinates.
    Distance {
        lat1: String,
        lon1: String,
        lat2: String,
        lon2: String,
        /// Radius in meters.
        #[arg(short, long, default_value_t = field_service::geo::DEFAULT_RADIUS_M)]
        radius: f64,
    },

    /// Add up "Xh Ym" durations.
    SumDurations {
        /// Durations such as "1h 30m" or "45m".
        entries: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("field_service=debug,tower_http=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(args.json_logs.then(|| fmt::layer().json()))
        .with((!args.json_logs).then(fmt::layer))
        .with(filter)
        .init();

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(),
        Some(Command::Distance {
            lat1,
            lon1,
            lat2,
            lon2,
            radius,
        }) => cmd_distance(&lat1, &lon1, &lat2, &lon2, radius),
        Some(Command::SumDurations { entries }) => {
            let total = sum_durations(&entries);
            println!("{} ({} minutes)", total.display, total.minutes);
            Ok(())
        }
        Some(Command::Serve { port }) => cmd_serve(port).await,
        None => cmd_serve(None).await,
    }
}

/// Check configuration validity.
fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("FIELD SERVICE - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    if let Some(seed) = &config.seed_file {
        print!("Loading seed data... ");
        match MemoryStore::load_seed_file(seed) {
            Ok(store) => println!("OK ({} documents)", store.len()),
            Err(e) => {
                println!("FAILED");
                println!("  Error: {}", e);
                return Err(anyhow::anyhow!("Seed data invalid"));
            }
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Port: {}", config.port);
    println!(
        "  Log Level: {}{}",
        config.rust_log,
        if config.verbose { " (verbose)" } else { "" }
    );
    println!("  Geofence Radius: {} m", config.geofence_radius_meters);
    println!(
        "  Geofence Enforcement: {}",
        if config.enforce_geofence { "Enabled" } else { "Disabled" }
    );
    println!("  Files: {} -> {}", config.files_dir.display(), config.files_url_prefix);
    println!(
        "  Metrics: {}",
        if config.metrics_enabled { "Enabled" } else { "Disabled" }
    );
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

fn cmd_distance(lat1: &str, lon1: &str, lat2: &str, lon2: &str, radius: f64) -> anyhow::Result<()> {
    let a = Coordinate::parse(lat1, lon1)?;
    let b = Coordinate::parse(lat2, lon2)?;
    let check = is_within_radius(a, b, radius);
    println!(
        "{:.1} m ({} {} m)",
        check.distance_m,
        if check.within_radius { "within" } else { "outside" },
        radius
    );
    Ok(())
}

/// Run the HTTP server until shutdown.
async fn cmd_serve(port_override: Option<u16>) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let mut config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;
    if let Some(port) = port_override {
        config.port = port;
    }
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    let store = match &config.seed_file {
        Some(path) => MemoryStore::load_seed_file(path)?,
        None => {
            warn!("No SEED_FILE set, starting with an empty store");
            MemoryStore::new()
        }
    };
    let store: Arc<dyn DocumentStore> = Arc::new(store);
    let files = Arc::new(LocalFileStore::new(&config.files_dir, &config.files_url_prefix));

    let mut app_state = AppState::new(store, files).with_geofence(GeofencePolicy {
        radius_m: config.geofence_radius_meters,
        enforce: config.enforce_geofence,
    });
    if config.metrics_enabled {
        app_state = app_state.with_metrics(metrics::install_recorder()?);
    }

    info!(
        radius_m = config.geofence_radius_meters,
        enforce = config.enforce_geofence,
        "Geofence configured"
    );

    let router = create_router(app_state.clone())
        .nest_service(&config.files_url_prefix, ServeDir::new(&config.files_dir));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    app_state.set_ready(true);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}
