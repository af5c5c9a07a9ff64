//! butlerd - Flutter Butler native protection core
//!
//! This is the binary entry point. All logic lives in the library crates.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::Result;

use butler_app::config;
use butler_platform::DEFAULT_MAX_VOLUME;
use flutter_butler::HeadlessOptions;

/// butlerd - anti-theft protection core speaking NDJSON over stdio
#[derive(Parser, Debug)]
#[command(name = "butlerd")]
#[command(about = "Anti-theft protection core speaking NDJSON over stdio", long_about = None)]
struct Args {
    /// Config directory (default: $BUTLER_CONFIG_DIR, then the platform config dir)
    #[arg(long, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// JSON preference file holding the armed flag
    #[arg(long, value_name = "PATH", conflicts_with = "persist")]
    prefs: Option<PathBuf>,

    /// Keep preferences in the config dir instead of in memory
    #[arg(long)]
    persist: bool,

    /// Maximum volume of the simulated audio streams
    #[arg(long, default_value_t = DEFAULT_MAX_VOLUME)]
    max_volume: u32,

    /// Write a commented default config.toml and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    butler_core::logging::init()?;

    let config_dir = config::config_dir(args.config_dir.as_deref());
    if args.init_config {
        config::init_config_dir(&config_dir)?;
        eprintln!("Config written to {}", config_dir.display());
        return Ok(());
    }

    let settings = config::load_settings(&config_dir);
    settings.validate()?;

    let prefs_path = match (args.prefs, args.persist) {
        (Some(path), _) => Some(path),
        (None, true) => Some(config_dir.join(&settings.preferences.file_name)),
        (None, false) => None,
    };

    flutter_butler::run_headless(HeadlessOptions {
        settings,
        prefs_path,
        max_volume: args.max_volume,
    })
    .await?;

    Ok(())
}
