pub mod capture;
pub mod catalog;
pub mod commands;
pub mod db;
pub mod decode;
pub mod error;
pub mod inventory;
pub mod session;
pub mod settings;
mod utils;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};

use catalog::Catalog;
use db::Database;
use decode::{DecoderChain, OpticalStrategy, VisionStrategy};
use session::ScanController;
use settings::SettingsStore;

pub use utils::logging::init as init_logging;

pub struct AppState {
    pub db: Database,
    pub scanner: ScanController,
    pub settings: SettingsStore,
}

#[derive(Debug, Clone)]
pub struct AppOptions {
    pub data_dir: PathBuf,
    /// Off disables the vision fallback for this run regardless of settings.
    pub allow_vision: bool,
}

impl AppOptions {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            allow_vision: true,
        }
    }
}

/// `<platform data dir>/stockscan`, or `./stockscan-data` when the platform
/// has no data directory.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("stockscan"))
        .unwrap_or_else(|| PathBuf::from("stockscan-data"))
}

/// Optical reader first, then the vision model when it is enabled and a key
/// is available.
pub fn build_chain(settings: &SettingsStore, allow_vision: bool) -> DecoderChain {
    let decoder = settings.decoder();
    let mut chain = DecoderChain::new(decoder.strategy_timeout())
        .with_strategy(OpticalStrategy::new(decoder.preprocess));

    let vision = settings.vision();
    if allow_vision && vision.enabled {
        match VisionStrategy::from_settings(&vision) {
            Ok(strategy) => {
                info!("vision fallback enabled ({})", strategy.model_name());
                chain.push(Box::new(strategy));
            }
            Err(err) => warn!("vision fallback disabled: {err:#}"),
        }
    }

    chain
}

pub fn bootstrap(options: &AppOptions) -> Result<AppState> {
    std::fs::create_dir_all(&options.data_dir).with_context(|| {
        format!("failed to create data dir {}", options.data_dir.display())
    })?;

    let db_path = options.data_dir.join("stockscan.sqlite3");
    let database = Database::new(db_path)?;

    let settings_path = options.data_dir.join("settings.json");
    let settings_store = SettingsStore::new(settings_path)?;

    let chain = build_chain(&settings_store, options.allow_vision);
    let catalog = Catalog::new(Arc::new(database.clone()));
    let scanner = ScanController::new(chain, catalog, Arc::new(database.clone()));

    info!("stockscan ready, data in {}", options.data_dir.display());

    Ok(AppState {
        db: database,
        scanner,
        settings: settings_store,
    })
}
