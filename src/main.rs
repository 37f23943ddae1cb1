mod config;
mod error;
mod logging;
mod models;
mod parse;
mod runner;
mod scrapers;
mod store;

use config::Settings;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    logging::init(&settings.log_dir);

    info!("VRBO Scout");
    info!(
        cities_file = %settings.cities_file.display(),
        data_dir = %settings.data_dir.display(),
        headless = settings.headless,
        "Starting crawl"
    );

    // The browser driver blocks; keep it off the async workers.
    let run_id = tokio::task::spawn_blocking(move || runner::run(&settings)).await??;

    info!(run_id, "Done");
    Ok(())
}
