//! Layered settings: built-in defaults, then an optional TOML file, then
//! `BOOKING_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use occurrence_engine::{DstPolicy, WallClock};
use serde::Deserialize;

pub const DEFAULT_TIMEZONE: &str = "America/Montevideo";
const APP_DIR: &str = "booking";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// IANA zone every civil time lives in.
    pub timezone: String,
    /// Snapshot file backing the store.
    pub store: PathBuf,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
    pub dst_policy: DstPolicy,
}

impl Settings {
    /// `<config_dir>/booking/config.toml`, when the platform has a config dir.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
    }

    fn default_store_path() -> PathBuf {
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR).join("appointments.json"))
            .unwrap_or_else(|| PathBuf::from("appointments.json"))
    }

    /// Load settings. An explicit `path` must exist; the default path is optional.
    ///
    /// # Errors
    /// Returns an error if the file cannot be parsed or a value has the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (file, required) = match path {
            Some(path) => (Some(path.to_path_buf()), true),
            None => (Self::default_config_path(), false),
        };

        let mut builder = Config::builder()
            .set_default("timezone", DEFAULT_TIMEZONE)?
            .set_default(
                "store",
                Self::default_store_path().to_string_lossy().into_owned(),
            )?
            .set_default("log_level", "warn")?
            .set_default("dst_policy", "reject")?;

        if let Some(file) = &file {
            builder = builder
                .add_source(File::new(&file.to_string_lossy(), FileFormat::Toml).required(required));
        }

        builder
            .add_source(Environment::with_prefix("BOOKING").ignore_empty(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize::<Settings>()
            .context("Invalid configuration")
    }

    /// The wall clock for the configured zone and DST policy.
    pub fn clock(&self) -> Result<WallClock> {
        Ok(WallClock::from_name(&self.timezone)?.with_dst_policy(self.dst_policy))
    }
}
