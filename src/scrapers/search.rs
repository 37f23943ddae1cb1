use crate::config::TARGET_TYPE_DETAIL;
use crate::models::RunId;
use crate::parse::{absolute_url, css, normalize_url, select_attr, select_text};
use crate::scrapers::challenge::is_blocked;
use crate::scrapers::traits::{ElementInfo, Resolution};
use crate::scrapers::types::{build_entry_url, CityConfig};
use crate::scrapers::ScrapeContext;
use crate::store::LocalStore;
use anyhow::Result;
use rand::Rng;
use scraper::Html;
use std::time::Duration;
use tracing::{debug, info, warn};

const CONTAINER_SELECTORS: &[&str] = &[
    ".scrollable-result-section.uitk-scrollable-vertical",
    "[data-stid='results']",
];

const CARD_SELECTORS: &[&str] = &[
    r#"[data-stid="lodging-card-responsive"]"#,
    r#"[data-stid="lodging-card"]"#,
    r#"[data-stid="property-listing"]"#,
    "article[data-stid]",
    r#"article[class*="PropertyCard"]"#,
];

const LINK_SELECTORS: &[&str] = &[
    r#"a[data-stid="open-hotel-information"]"#,
    r#"a[href*="/pdp/"]"#,
    r#"a[href*="/vacation-rental/"]"#,
    r#"a[href*="ha?"]"#,
];

const NEXT_SELECTORS: &[&str] = &[
    r#"[data-stid="pagination-next"]"#,
    r#"button[data-stid="next-button"]"#,
    r#"button[aria-label*="Siguiente" i]"#,
    r#"button[aria-label*="Next page" i]"#,
    r#"button[aria-label*="Next" i]"#,
    r#"a[aria-label*="Next" i]"#,
    r#"a[rel="next"]"#,
    "div.scrollable-result-section button.uitk-button-only-icon.uitk-button-primary",
];

const DISABLED_CLASSES: &[&str] = &["is-disabled", "uitk-button-disabled"];

const CONTAINER_SCROLL_STEP: i64 = 900;
const WINDOW_SCROLL_STEP: f64 = 800.0;
const MAX_SCROLL_STEPS: usize = 200;

/// Detects when a scrolled container has stopped growing at its bottom.
///
/// Done after three consecutive observations within 5px of the end that
/// also agree with each other within 5px.
#[derive(Debug)]
pub struct BottomTracker {
    stable: u32,
    last_seen: f64,
}

impl Default for BottomTracker {
    fn default() -> Self {
        Self {
            stable: 0,
            last_seen: -1.0,
        }
    }
}

impl BottomTracker {
    const TOLERANCE: f64 = 5.0;
    const REQUIRED: u32 = 3;

    /// Record one observation; `true` once the bottom is stable.
    pub fn observe(&mut self, bottom: f64, height: f64) -> bool {
        if height > 0.0 && bottom >= height - Self::TOLERANCE {
            if (self.last_seen - bottom).abs() < Self::TOLERANCE {
                self.stable += 1;
            } else {
                self.stable = 1;
                self.last_seen = bottom;
            }
        } else {
            self.stable = 0;
            self.last_seen = bottom;
        }
        self.stable >= Self::REQUIRED
    }
}

/// Scroll the results until the virtualized list has rendered everything.
pub fn scroll_results(ctx: &ScrapeContext<'_>) -> Result<()> {
    let page = ctx.page;
    let container = CONTAINER_SELECTORS.iter().copied().find(|sel| {
        page.elements(sel)
            .map(|found| !found.is_empty())
            .unwrap_or(false)
    });

    if let Some(selector) = container {
        let mut tracker = BottomTracker::default();
        for _ in 0..MAX_SCROLL_STEPS {
            if page.scroll_container(selector, CONTAINER_SCROLL_STEP)?.is_none() {
                break;
            }
            ctx.pause(ctx.settings.scroll_pause);
            let Some(position) = page.scroll_container(selector, 0)? else {
                break;
            };
            if tracker.observe(position.bottom, position.height) {
                break;
            }
        }
        page.scroll_container_to_end(selector)?;
        ctx.pause(ctx.settings.scroll_pause);
        return Ok(());
    }

    page.scroll_window_to(0.0)?;
    let mut height = page.document_height()?;
    let mut current = 0.0;
    for _ in 0..MAX_SCROLL_STEPS {
        if current >= height {
            break;
        }
        current += WINDOW_SCROLL_STEP;
        page.scroll_window_to(current)?;
        ctx.pause(ctx.settings.scroll_pause);
        height = page.document_height()?;
    }
    Ok(())
}

/// Listing stub read from a search result card
#[derive(Debug, Clone, PartialEq)]
pub struct CardStub {
    /// Normalized detail URL
    pub url: String,
    /// Absolute detail URL with its original query
    pub full_url: String,
    pub title: Option<String>,
    pub price: Option<String>,
}

/// Cards on the current results page, using the first card selector that matches.
pub fn extract_cards(html: &str) -> Vec<CardStub> {
    let document = Html::parse_document(html);
    let cards = CARD_SELECTORS
        .iter()
        .filter_map(|sel| css(sel))
        .map(|selector| document.select(&selector).collect::<Vec<_>>())
        .find(|found| !found.is_empty())
        .unwrap_or_default();

    cards
        .into_iter()
        .filter_map(|card| {
            let href = LINK_SELECTORS
                .iter()
                .find_map(|sel| select_attr(card, sel, "href"))?;
            let full_url = absolute_url(&href)
                .map(|url| url.to_string())
                .unwrap_or_else(|| href.clone());
            let url = normalize_url(&full_url);
            if url.is_empty() {
                return None;
            }
            Some(CardStub {
                url,
                full_url,
                title: select_text(card, "[data-stid*='title'], h2, h3"),
                price: select_text(card, "[data-stid*='price'], .uitk-type-500"),
            })
        })
        .collect()
}

/// Whether a control is marked disabled by attribute, ARIA state or class.
pub fn is_disabled(element: &ElementInfo) -> bool {
    if let Some(value) = element.attr("disabled") {
        if !matches!(value, "false" | "False") {
            return true;
        }
    }
    if element
        .attr("aria-disabled")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    {
        return true;
    }
    element
        .attr("class")
        .unwrap_or_default()
        .split_whitespace()
        .any(|class| DISABLED_CLASSES.contains(&class))
}

/// Click the first usable "next page" control; `false` when there is none.
pub fn click_next(ctx: &ScrapeContext<'_>) -> bool {
    for selector in NEXT_SELECTORS {
        let Ok(candidates) = ctx.page.elements(selector) else {
            continue;
        };
        for (index, element) in candidates.iter().enumerate() {
            if !element.visible || is_disabled(element) || !element.enabled {
                continue;
            }
            ctx.pause(ctx.settings.pacing.before_click);
            match ctx.page.click(selector, index) {
                Ok(()) => return true,
                Err(err) => debug!(selector, index, error = %err, "Next control click failed"),
            }
        }
    }
    false
}

fn pagination_pause(ctx: &ScrapeContext<'_>) -> Duration {
    let max_jitter = ctx.settings.pacing.max_jitter.as_secs_f64();
    let jitter = if max_jitter > 0.0 {
        rand::rng().random_range(0.0..max_jitter)
    } else {
        0.0
    };
    ctx.settings.navigation_delay + Duration::from_secs_f64(jitter)
}

/// Run the search for one city and queue every new listing found.
///
/// Returns the number of targets added. Only navigation failures are
/// returned as errors; anything that goes wrong mid-pagination ends the
/// city early.
pub fn run_city(
    ctx: &ScrapeContext<'_>,
    store: &mut LocalStore,
    run_id: RunId,
    city: &CityConfig,
) -> Result<usize> {
    let url = build_entry_url(city);
    info!(city = %city.name, url = %url, "Processing city");
    ctx.page.navigate(&url)?;
    ctx.pause(ctx.settings.pacing.after_navigation);

    if is_blocked(&ctx.page.content()?) {
        if ctx.resolve_challenge() == Resolution::TimedOut {
            warn!(city = %city.name, "Search page blocked; skipping city");
            return Ok(0);
        }
        ctx.pause(ctx.settings.pacing.after_navigation);
    }

    let mut added = 0;
    let mut page_num: u32 = 1;
    let mut block_checked = false;
    loop {
        let html = match scroll_results(ctx).and_then(|_| ctx.page.content()) {
            Ok(html) => html,
            Err(err) => {
                warn!(city = %city.name, page = page_num, error = %err, "Search page failed; stopping");
                break;
            }
        };

        let cards = extract_cards(&html);
        if cards.is_empty() {
            info!(page = page_num, "No visible cards");
            if !block_checked && is_blocked(&html) {
                block_checked = true;
                if ctx.resolve_challenge() == Resolution::Resolved {
                    continue;
                }
            }
            break;
        }

        let mut new_count = 0;
        for card in &cards {
            let inserted =
                store.add_target(run_id, TARGET_TYPE_DETAIL, &card.url, &card.full_url, Some(city.name.as_str()));
            if inserted.is_some() {
                debug!(url = %card.url, title = ?card.title, price = ?card.price, "Queued listing");
                new_count += 1;
            }
        }
        added += new_count;
        info!(page = page_num, new = new_count, total = added, "Search page scraped");

        if new_count == 0 {
            info!(page = page_num, "No new results; stopping pagination");
            break;
        }
        if ctx.settings.max_pages > 0 && page_num >= ctx.settings.max_pages {
            break;
        }
        if !click_next(ctx) {
            info!(page = page_num, "Next button not available");
            break;
        }
        page_num += 1;
        block_checked = false;
        ctx.pause(pagination_pause(ctx));
    }
    Ok(added)
}
