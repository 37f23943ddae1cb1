use crate::config::{load_cities, Settings};
use crate::models::RunId;
use crate::scrapers::browser::inject_cookies;
use crate::scrapers::challenge::resolver_for;
use crate::scrapers::detail::process_detail_targets;
use crate::scrapers::search::run_city;
use crate::scrapers::types::CityConfig;
use crate::scrapers::{BrowserSession, ScrapeContext};
use crate::store::LocalStore;
use anyhow::Result;
use tracing::{error, info, warn};

/// Full scrape: every configured city, then every listing found.
pub fn run(settings: &Settings) -> Result<RunId> {
    let mut store = LocalStore::new(&settings.data_dir)?;
    let cities = load_cities(&settings.cities_file, settings.force_tomorrow)?;
    info!(cities = cities.len(), "Cities loaded");

    let session = BrowserSession::open(settings)?;
    let page = session.page();
    let resolver = resolver_for(settings);
    let ctx = ScrapeContext {
        page: &page,
        settings,
        resolver: resolver.as_ref(),
    };

    let outcome = run_pipeline(&ctx, &mut store, &cities);
    session.close();
    outcome
}

/// Run the search and detail phases on an already open page.
///
/// A failure after the run has started is recorded in the run summary
/// before being returned.
pub fn run_pipeline(
    ctx: &ScrapeContext<'_>,
    store: &mut LocalStore,
    cities: &[CityConfig],
) -> Result<RunId> {
    let injected = inject_cookies(ctx.page, ctx.settings)?;
    if injected > 0 {
        info!(total = injected, "Cookies injected");
    }

    let run_id = store.run_start();
    match scrape_all(ctx, store, run_id, cities) {
        Ok(()) => {
            let output = store.run_end(run_id, true, "ok")?;
            info!(run_id, output = %output.display(), "Crawler finished");
            Ok(run_id)
        }
        Err(err) => {
            error!(run_id, error = %format!("{err:#}"), "Crawler failed");
            if let Err(end_err) = store.run_end(run_id, false, &format!("{err:#}")) {
                warn!(error = %end_err, "Could not record failed run");
            }
            Err(err)
        }
    }
}

fn scrape_all(
    ctx: &ScrapeContext<'_>,
    store: &mut LocalStore,
    run_id: RunId,
    cities: &[CityConfig],
) -> Result<()> {
    for city in cities {
        let added = run_city(ctx, store, run_id, city)?;
        info!(city = %city.name, added, "City done");
    }
    let stats = process_detail_targets(ctx, store, run_id);
    info!(
        done = stats.done,
        empty = stats.empty,
        failed = stats.failed,
        "Details processed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Pacing;
    use crate::models::{Record, TargetStatus};
    use crate::scrapers::challenge::SkipResolver;
    use crate::scrapers::fake::FakePage;
    use crate::scrapers::types::build_entry_url;
    use serde_json::Value;

    const RESULTS: &str = r#"<html><body><div data-stid="results">
        <div data-stid="lodging-card-responsive">
          <a data-stid="open-hotel-information" href="/101ha?pos=1">Casa 101</a>
        </div>
        <div data-stid="lodging-card-responsive">
          <a data-stid="open-hotel-information" href="/102ha?pos=2">Casa 102</a>
        </div>
    </div></body></html>"#;

    const LISTING: &str = r#"<html><body>
        <div data-stid="content-hotel-title"><h1>Casa 101</h1></div>
        <div data-stid="property-offer-price-summary">$ 300.000</div>
    </body></html>"#;

    fn settings(data_dir: &std::path::Path) -> Settings {
        let data_dir = data_dir.display().to_string();
        let mut settings = Settings::from_lookup(move |key| match key {
            "VRBO_DATA_DIR" => Some(data_dir.clone()),
            "VRBO_SCROLL_PAUSE" | "VRBO_NAVIGATION_DELAY" => Some("0".to_string()),
            _ => None,
        })
        .unwrap();
        settings.pacing = Pacing::instant();
        settings
    }

    fn city() -> CityConfig {
        let mut city = CityConfig::new("Cartagena");
        city.checkin = Some("2030-01-01".into());
        city.checkout = Some("2030-01-02".into());
        city
    }

    #[test]
    fn pipeline_writes_results_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let page = FakePage::new()
            .with_route(&build_entry_url(&city()), RESULTS)
            .with_route("https://www.vrbo.com/101ha?pos=1", LISTING);
        let ctx = ScrapeContext {
            page: &page,
            settings: &settings,
            resolver: &SkipResolver,
        };
        let mut store = LocalStore::new(&settings.data_dir).unwrap();

        let run_id = run_pipeline(&ctx, &mut store, &[city()]).unwrap();

        let statuses: Vec<_> = store.targets().iter().map(|t| t.status).collect();
        assert_eq!(statuses, vec![TargetStatus::Done, TargetStatus::Empty]);

        let written = std::fs::read_to_string(store.results_path(run_id)).unwrap();
        let records: Vec<Record> = serde_json::from_str(&written).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "https://www.vrbo.com/101ha");
        assert_eq!(records[0].unit_name.as_deref(), Some("Casa 101"));
        assert_eq!(records[0].price_amount, Some(300_000.0));

        let summary: Value =
            serde_json::from_str(&std::fs::read_to_string(store.summary_path(run_id)).unwrap())
                .unwrap();
        assert_eq!(summary["success"], true);
        assert_eq!(summary["notes"], "ok");
        assert_eq!(summary["results"], 1);
    }

    #[test]
    fn navigation_failure_is_recorded_and_returned() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let page = FakePage::new().failing_navigation("net::ERR_CONNECTION_RESET");
        let ctx = ScrapeContext {
            page: &page,
            settings: &settings,
            resolver: &SkipResolver,
        };
        let mut store = LocalStore::new(&settings.data_dir).unwrap();

        let err = run_pipeline(&ctx, &mut store, &[city()]).unwrap_err();
        assert!(err.to_string().contains("ERR_CONNECTION_RESET"));

        let summary_file = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .find(|path| path.to_string_lossy().ends_with(".meta.json"))
            .unwrap();
        let summary: Value =
            serde_json::from_str(&std::fs::read_to_string(summary_file).unwrap()).unwrap();
        assert_eq!(summary["success"], false);
        assert!(summary["notes"]
            .as_str()
            .unwrap()
            .contains("ERR_CONNECTION_RESET"));
    }
}
