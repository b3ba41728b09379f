//! Application configuration loaded from environment variables.

use std::path::PathBuf;

use serde::Deserialize;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Server Configuration ===
    /// HTTP server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,

    /// Install the Prometheus recorder and serve `/metrics`.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    // === Geofencing ===
    /// Radius around the customer site, in meters.
    #[serde(default = "default_radius")]
    pub geofence_radius_meters: f64,

    /// Require on-site coordinates when punching in.
    #[serde(default)]
    pub enforce_geofence: bool,

    // === Storage ===
    /// Directory uploaded images are written to.
    #[serde(default = "default_files_dir")]
    pub files_dir: PathBuf,

    /// URL prefix returned for stored files.
    #[serde(default = "default_files_url_prefix")]
    pub files_url_prefix: String,

    /// JSON file loaded into the document store at startup.
    #[serde(default)]
    pub seed_file: Option<PathBuf>,
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_radius() -> f64 {
    300.0
}

fn default_files_dir() -> PathBuf {
    PathBuf::from("./public/files")
}

fn default_files_url_prefix() -> String {
    "/files".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            rust_log: default_log_level(),
            verbose: false,
            metrics_enabled: default_true(),
            geofence_radius_meters: default_radius(),
            enforce_geofence: false,
            files_dir: default_files_dir(),
            files_url_prefix: default_files_url_prefix(),
            seed_file: None,
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if !self.geofence_radius_meters.is_finite() || self.geofence_radius_meters <= 0.0 {
            return Err("GEOFENCE_RADIUS_METERS must be a positive number".to_string());
        }

        if self.files_dir.as_os_str().is_empty() {
            return Err("FILES_DIR must not be empty".to_string());
        }

        if !self.files_url_prefix.starts_with('/') || self.files_url_prefix.len() < 2 {
            return Err("FILES_URL_PREFIX must start with / and name a path".to_string());
        }

        Ok(())
    }
}
