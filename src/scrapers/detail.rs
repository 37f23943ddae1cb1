//! Listing detail pages: every field is resolved on its own, so a missing
//! section only blanks that section.

use crate::config::{Settings, TARGET_TYPE_DETAIL};
use crate::models::{
    AmenitySection, ContentBlock, Coordinates, HostInfo, LocationSection, Provenance, Record,
    RunId, SearchInfo, Sections, Target, TargetStatus,
};
use crate::parse::{
    css, dedup_by_key, dedup_preserve_order, element_text, first_match, parse_amount,
    select_attr, select_first, select_text, sleeps_from_summary, split_languages, unit_size_m2,
    url_slug,
};
use crate::scrapers::challenge::is_blocked;
use crate::scrapers::dialog::{collect_from_dialog, text_item, DialogKind};
use crate::scrapers::state::fetch_page_state;
use crate::scrapers::traits::Resolution;
use crate::scrapers::ScrapeContext;
use crate::store::LocalStore;
use anyhow::Result;
use chrono::Utc;
use scraper::{ElementRef, Html};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

const HEADING_SELECTORS: &str = "#product-headline, \
     [data-stid=\"summary-headline\"] h1, \
     [data-stid=\"content-hotel-title\"] h1, \
     h1[data-stid=\"content-hotel-title\"], \
     h1.uitk-heading";

const TITLE_BLOCK_SELECTORS: &[&str] = &[
    r#"[data-stid="summary-headline"]"#,
    r#"[data-stid="content-hotel-title"]"#,
    "#product-headline",
    "header h1",
];

const HEADING_TIMEOUT: Duration = Duration::from_secs(30);
const SCROLL_CHECKPOINTS: &[f64] = &[0.25, 0.5, 0.75, 1.0];
const FALLBACK_DOCUMENT_HEIGHT: f64 = 2000.0;
const IMAGE_LIMIT: usize = 12;

const AMENITY_ITEMS: &str = r#"li[data-stid^="sp-content-item"] .uitk-text"#;
const CONTENT_ITEMS: &str = r#"[data-stid="content-item"]"#;

static NULL: Value = Value::Null;

fn at<'a>(value: &'a Value, path: &[&str]) -> &'a Value {
    path.iter()
        .try_fold(value, |current, key| current.get(key))
        .unwrap_or(&NULL)
}

/// String or number field as text.
fn text_of(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Slices of the plugin state the record draws on
struct ListingState {
    hotel: Value,
    tealium: Value,
    offer: Value,
    destination: Value,
}

impl ListingState {
    fn from_state(state: Value) -> Self {
        let hotel = at(&state, &["controllers", "stores", "currentHotel"]).clone();
        let tealium = at(&hotel, &["detailsPayload", "tealiumUtagData"]).clone();
        let offer = at(&hotel, &["offerSearchData"]).clone();
        let destination = at(&hotel, &["searchCriteria", "destination"]).clone();
        Self {
            hotel,
            tealium,
            offer,
            destination,
        }
    }

    fn property_id(&self) -> Option<String> {
        text_of(&self.hotel, "hotelId").or_else(|| text_of(&self.tealium, "hotelId"))
    }

    fn currency(&self) -> String {
        text_of(&self.tealium, "currencyCode")
            .or_else(|| text_of(&self.offer, "currency"))
            .unwrap_or_else(|| "USD".to_string())
    }

    fn listing_status(&self) -> String {
        text_of(&self.tealium, "listing_status").unwrap_or_else(|| "active".to_string())
    }

    fn region_name(&self) -> Option<String> {
        text_of(&self.destination, "regionName")
    }

    fn country(&self, address: Option<&str>) -> Option<String> {
        text_of(&self.destination, "countryName")
            .or_else(|| text_of(&self.destination, "country"))
            .or_else(|| text_of(&self.tealium, "propertyCountry"))
            .or_else(|| {
                let (_, last) = address?.rsplit_once(',')?;
                let last = last.trim();
                (!last.is_empty()).then(|| last.to_string())
            })
    }

    fn search_info(&self) -> SearchInfo {
        SearchInfo {
            check_in: text_of(&self.offer, "startDate"),
            check_out: text_of(&self.offer, "endDate"),
            adults: self.offer.get("adults").and_then(Value::as_u64),
            children: self.offer.get("children").and_then(Value::as_u64),
            destination: self.region_name(),
            region_id: text_of(&self.destination, "regionId"),
            lat_long: self
                .destination
                .get("coordinates")
                .filter(|v| !v.is_null())
                .cloned(),
        }
    }
}

/// Heading area of the listing
#[derive(Debug, Default)]
struct TitleBlock {
    headline: Option<String>,
    property_tag: Option<String>,
    property_type: Option<String>,
    subtitle: Option<String>,
}

impl TitleBlock {
    fn parse(block: ElementRef<'_>) -> Self {
        let spans: Vec<Option<String>> = css(".uitk-text")
            .map(|sel| block.select(&sel).take(2).map(element_text).collect())
            .unwrap_or_default();
        Self {
            headline: select_text(block, "h1"),
            property_tag: spans.first().cloned().flatten(),
            property_type: spans.get(1).cloned().flatten(),
            subtitle: select_text(block, "div.uitk-text"),
        }
    }

    /// Tag, type and subtitle, de-duplicated in that order.
    fn header_chips(&self) -> Vec<String> {
        dedup_preserve_order(
            [&self.property_tag, &self.property_type, &self.subtitle]
                .into_iter()
                .map(|chip| chip.as_deref().unwrap_or_default().trim().to_string()),
        )
    }
}

fn find_title_block(document: &Html) -> Option<ElementRef<'_>> {
    TITLE_BLOCK_SELECTORS
        .iter()
        .find_map(|sel| select_first(document.root_element(), sel))
}

/// Where the address may be found, most specific first
struct AddressSources<'a> {
    document: &'a Html,
    title_block: Option<ElementRef<'a>>,
}

fn address_in_title(sources: &AddressSources<'_>) -> Option<String> {
    select_text(sources.title_block?, r#"[data-stid="content-hotel-address"]"#)
}

fn address_anywhere(sources: &AddressSources<'_>) -> Option<String> {
    select_text(
        sources.document.root_element(),
        r#"[data-stid="content-hotel-address"]"#,
    )
}

fn address_in_summary(sources: &AddressSources<'_>) -> Option<String> {
    select_text(
        sources.document.root_element(),
        r#"[data-stid="summary-location"] .uitk-text"#,
    )
}

fn address_before_map_button(sources: &AddressSources<'_>) -> Option<String> {
    let button = select_first(
        sources.document.root_element(),
        r#"button[aria-label*="View in a map"]"#,
    )?;
    button
        .prev_siblings()
        .filter_map(ElementRef::wrap)
        .find(|sibling| sibling.value().name() == "span")
        .and_then(element_text)
}

fn extract_address(document: &Html, title_block: Option<ElementRef<'_>>) -> Option<String> {
    let sources = AddressSources {
        document,
        title_block,
    };
    first_match::<_, String>(
        &sources,
        &[
            &address_in_title,
            &address_anywhere,
            &address_in_summary,
            &address_before_map_button,
        ],
    )
}

fn meta_number(document: &Html, itemprop: &str) -> Option<f64> {
    select_attr(
        document.root_element(),
        &format!(r#"meta[itemprop="{itemprop}"]"#),
        "content",
    )?
    .parse()
    .ok()
}

fn extract_coordinates(document: &Html) -> Coordinates {
    Coordinates {
        lat: meta_number(document, "latitude"),
        lon: meta_number(document, "longitude"),
    }
}

fn extract_description(document: &Html) -> Option<String> {
    let selector = css(r#"[data-stid="content-markup"]"#)?;
    let text = document
        .select(&selector)
        .filter_map(element_text)
        .collect::<Vec<_>>()
        .join(" ");
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// The first `h3` after the first `h2` mentioning rooms.
fn extract_rooms_summary(document: &Html) -> Option<String> {
    let selector = css("h2, h3")?;
    let mut after_rooms_heading = false;
    for heading in document.select(&selector) {
        match heading.value().name() {
            "h2" if !after_rooms_heading => {
                let text = element_text(heading).unwrap_or_default().to_lowercase();
                after_rooms_heading = text.contains("rooms");
            }
            "h3" if after_rooms_heading => return element_text(heading),
            _ => {}
        }
    }
    None
}

/// Title from the first h3/h4/h5, the rest of the text as description.
fn parse_content_block(element: ElementRef<'_>) -> Option<ContentBlock> {
    let title = ["h3", "h4", "h5"]
        .iter()
        .find_map(|tag| select_first(element, tag))
        .and_then(element_text);
    let mut description = element_text(element);
    if let (Some(title), Some(body)) = (&title, &description) {
        let stripped = body.replacen(title.as_str(), "", 1).trim().to_string();
        description = (!stripped.is_empty()).then_some(stripped);
    }
    Some(ContentBlock { title, description })
}

fn extract_rooms(ctx: &ScrapeContext<'_>, document: &Html) -> Vec<ContentBlock> {
    let mut rooms: Vec<ContentBlock> =
        match (select_first(document.root_element(), "#Rooms"), css(CONTENT_ITEMS)) {
            (Some(section), Some(items)) => {
                section.select(&items).filter_map(parse_content_block).collect()
            }
            _ => Vec::new(),
        };
    rooms.extend(collect_from_dialog(
        ctx,
        &["rooms", "beds"],
        CONTENT_ITEMS,
        DialogKind::Spaces,
        parse_content_block,
    ));
    dedup_by_key(rooms, |block| (block.title.clone(), block.description.clone()))
}

/// Popular amenities shown on the page, and those plus the full dialog list.
fn extract_amenities(ctx: &ScrapeContext<'_>, document: &Html) -> (Vec<String>, Vec<String>) {
    let popular: Vec<String> = match (
        select_first(document.root_element(), "#PopularAmenities"),
        css(AMENITY_ITEMS),
    ) {
        (Some(root), Some(items)) => root.select(&items).filter_map(element_text).collect(),
        _ => Vec::new(),
    };
    let more = collect_from_dialog(
        ctx,
        &["amenities"],
        AMENITY_ITEMS,
        DialogKind::Amenities,
        text_item,
    );
    let all = dedup_preserve_order(popular.iter().cloned().chain(more));
    (popular, all)
}

fn extract_host(document: &Html) -> HostInfo {
    let Some(root) = select_first(document.root_element(), "#Host") else {
        return HostInfo::default();
    };

    let mut languages = Vec::new();
    if let Some(selector) = css("h5, div") {
        let mut after_heading = false;
        for element in root.select(&selector) {
            let is_heading = element.value().name() == "h5";
            if is_heading && !after_heading {
                after_heading = element_text(element)
                    .is_some_and(|t| t.to_lowercase().contains("language"));
            } else if !is_heading && after_heading {
                languages = element_text(element)
                    .map(|text| split_languages(&text))
                    .unwrap_or_default();
                break;
            }
        }
    }

    HostInfo {
        name: select_text(root, "h3"),
        avatar: select_attr(root, "img", "src"),
        languages,
        contact_url: select_attr(root, r#"a[data-stid*="contact-host"]"#, "href"),
    }
}

fn extract_policies(document: &Html) -> Vec<ContentBlock> {
    let Some(root) = select_first(document.root_element(), "#Policies") else {
        return Vec::new();
    };
    let mut policies: Vec<ContentBlock> = css(".uitk-layout-grid-item")
        .map(|sel| {
            root.select(&sel)
                .filter_map(parse_content_block)
                .filter(|block| block.title.is_some() || block.description.is_some())
                .collect()
        })
        .unwrap_or_default();
    if let Some(sel) = css("details") {
        for detail in root.select(&sel) {
            let title = select_text(detail, "summary");
            let description = element_text(detail);
            if title.is_some() || description.is_some() {
                policies.push(ContentBlock { title, description });
            }
        }
    }
    dedup_by_key(policies, |block| (block.title.clone(), block.description.clone()))
}

fn extract_images(document: &Html) -> Vec<String> {
    let Some(selector) = css("#Overview img") else {
        return Vec::new();
    };
    let mut images: Vec<String> = Vec::new();
    for src in document
        .select(&selector)
        .filter_map(|img| img.value().attr("src"))
        .filter(|src| !src.is_empty())
    {
        if !images.iter().any(|seen| seen == src) {
            images.push(src.to_string());
        }
        if images.len() >= IMAGE_LIMIT {
            break;
        }
    }
    images
}

/// Step down the page so lazy sections render.
fn scroll_detail_page(ctx: &ScrapeContext<'_>) -> Result<()> {
    let height = match ctx.page.document_height()? {
        h if h > 0.0 => h,
        _ => FALLBACK_DOCUMENT_HEIGHT,
    };
    for fraction in SCROLL_CHECKPOINTS {
        ctx.page.scroll_window_to(height * fraction)?;
        ctx.pause(ctx.settings.pacing.detail_scroll_step);
    }
    Ok(())
}

fn dump_html(settings: &Settings, clean_url: &str, html: &str) {
    if !settings.save_detail_html {
        return;
    }
    let path = settings
        .log_dir
        .join(format!("detail_dump_{}.html", url_slug(clean_url)));
    let written = std::fs::create_dir_all(&settings.log_dir).and_then(|_| std::fs::write(&path, html));
    match written {
        Ok(()) => info!(saved = %path.display(), "Detail HTML saved"),
        Err(err) => debug!(error = %err, "Could not save detail HTML"),
    }
}

/// Visit one listing and build its record.
///
/// `Ok(None)` means the page had nothing recognizable to extract.
pub fn scrape_detail(
    ctx: &ScrapeContext<'_>,
    target: &Target,
) -> Result<Option<(Record, Coordinates)>> {
    let clean_url = target.value.as_str();
    let full_url = if target.url.is_empty() {
        clean_url
    } else {
        target.url.as_str()
    };

    info!(url = clean_url, "Visiting detail");
    ctx.page.navigate(full_url)?;

    if !ctx.page.wait_for(HEADING_SELECTORS, HEADING_TIMEOUT) {
        warn!(
            url = clean_url,
            current = %ctx.page.current_url(),
            title = ?ctx.page.title(),
            "Detail page without heading"
        );
        let html = ctx.page.content().unwrap_or_default();
        if is_blocked(&html) {
            ctx.resolve_challenge();
        }
        dump_html(ctx.settings, clean_url, &html);
        return Ok(None);
    }

    if is_blocked(&ctx.page.content()?) && ctx.resolve_challenge() == Resolution::TimedOut {
        return Ok(None);
    }

    ctx.pause(ctx.settings.pacing.settle);
    scroll_detail_page(ctx)?;
    let page_html = ctx.page.content()?;

    let listing = ListingState::from_state(Value::Object(fetch_page_state(ctx.page, &page_html)));
    let document = Html::parse_document(&page_html);

    let Some(block) = find_title_block(&document) else {
        let count = |sel: &str| css(sel).map(|s| document.select(&s).count()).unwrap_or(0);
        warn!(
            url = clean_url,
            current = %ctx.page.current_url(),
            h1 = count("h1"),
            stid = count("[data-stid]"),
            "Detail page without title block"
        );
        dump_html(ctx.settings, clean_url, &page_html);
        return Ok(None);
    };
    let title = TitleBlock::parse(block);
    let address = extract_address(&document, Some(block));
    let coordinates = extract_coordinates(&document);
    let locale = ctx.settings.number_locale;

    let price_text = select_text(
        document.root_element(),
        r#"[data-stid="property-offer-price-summary"]"#,
    );
    let rooms_summary = extract_rooms_summary(&document);

    let rooms = extract_rooms(ctx, &document);
    let (popular_amenities, all_amenities) = extract_amenities(ctx, &document);

    let sections = Sections {
        rooms,
        amenities: AmenitySection {
            popular: popular_amenities.clone(),
            all: all_amenities.clone(),
        },
        policies: extract_policies(&document),
        host: extract_host(&document),
        location: LocationSection {
            address: address.clone(),
            coordinates,
        },
    };

    let record = Record {
        url: clean_url.to_string(),
        latitude: coordinates.lat,
        longitude: coordinates.lon,
        unit_id: listing.property_id().unwrap_or_else(|| clean_url.to_string()),
        unit_name: title.headline.clone(),
        price_amount: parse_amount(price_text.as_deref(), locale),
        price_currency: listing.currency(),
        price_text: price_text.clone(),
        price_row_text: price_text,
        plan_name: title.property_tag.clone().or_else(|| title.property_type.clone()),
        cancellation: None,
        sleeps: rooms_summary.as_deref().and_then(sleeps_from_summary),
        beds_text: rooms_summary,
        size_m2: unit_size_m2(&page_html, locale),
        amenities_parent: popular_amenities,
        amenities_unit: all_amenities,
        header_chips: title.header_chips(),
        sections,
        long_desc: extract_description(&document),
        comfort_score: None,
        images: extract_images(&document),
        listing_status: listing.listing_status(),
        property_type: title.property_type.clone().or_else(|| title.subtitle.clone()),
        city: listing.region_name().or_else(|| address.clone()),
        country: listing.country(address.as_deref()),
        address,
        source: Provenance {
            url: full_url.to_string(),
            city: target.city.clone(),
            collected_at: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            search: listing.search_info(),
        },
    };
    Ok(Some((record, coordinates)))
}

/// Counts of how the queued detail targets ended
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DetailStats {
    pub done: usize,
    pub empty: usize,
    pub failed: usize,
}

/// Scrape every queued detail target of the run, one at a time.
pub fn process_detail_targets(
    ctx: &ScrapeContext<'_>,
    store: &mut LocalStore,
    run_id: RunId,
) -> DetailStats {
    let mut targets = store.list_targets(run_id, TARGET_TYPE_DETAIL, TargetStatus::Queued);
    if ctx.settings.max_detail_targets > 0 {
        targets.truncate(ctx.settings.max_detail_targets);
    }
    let mut stats = DetailStats::default();
    if targets.is_empty() {
        info!(run_id, "No pending details");
        return stats;
    }

    info!(pending = targets.len(), "Processing details");
    for target in &targets {
        match scrape_detail(ctx, target) {
            Ok(Some((mut record, coordinates))) => {
                record.latitude = coordinates.lat;
                record.longitude = coordinates.lon;
                store.save_rental(record);
                store.update_target_status(target.id, TargetStatus::Done);
                stats.done += 1;
                info!(url = %target.value, "Detail saved");
            }
            Ok(None) => {
                store.update_target_status(target.id, TargetStatus::Empty);
                stats.empty += 1;
                info!(url = %target.value, "Detail without data");
            }
            Err(err) => {
                store.update_target_status(target.id, TargetStatus::Error);
                stats.failed += 1;
                warn!(url = %target.value, error = %err, "Detail failed");
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Pacing;
    use crate::scrapers::challenge::SkipResolver;
    use crate::scrapers::fake::FakePage;
    use chrono::DateTime;
    use serde_json::json;

    const LISTING_URL: &str = "https://www.vrbo.com/4471ha";
    const LISTING_FULL_URL: &str = "https://www.vrbo.com/4471ha?chkin=2030-01-01&pos=2";

    const LISTING: &str = r#"<html><head>
        <meta itemprop="latitude" content="10.42">
        <meta itemprop="longitude" content="-75.55">
    </head><body>
        <div data-stid="content-hotel-title">
          <h1>Casa del Mar</h1>
          <span class="uitk-text">Superhost</span>
          <span class="uitk-text">Apartment</span>
          <div class="uitk-text">Entire apartment</div>
          <div data-stid="content-hotel-address">Calle 5, Cartagena, Colombia</div>
        </div>
        <div id="Overview"><img src="a.jpg"><img src="b.jpg"><img src="a.jpg"></div>
        <div data-stid="content-markup">Lovely flat.</div>
        <div data-stid="content-markup">Near the beach.</div>
        <div data-stid="property-offer-price-summary">$ 1.250.000 COP total</div>
        <h2>Rooms and beds</h2>
        <h3>2 bedrooms · Sleeps 6</h3>
        <div id="Rooms">
          <div data-stid="content-item"><h4>Bedroom 1</h4><p>1 King bed</p></div>
        </div>
        <button>See all rooms and beds</button>
        <div id="PopularAmenities"><ul>
          <li data-stid="sp-content-item-1"><span class="uitk-text">Pool</span></li>
          <li data-stid="sp-content-item-2"><span class="uitk-text">Wifi</span></li>
        </ul></div>
        <button>See all amenities</button>
        <div id="Host">
          <h3>Ana</h3>
          <img src="ana.jpg">
          <h5>Languages</h5>
          <div>English, Spanish / French</div>
          <a data-stid="contact-host-button" href="/contact/4471">Contact host</a>
        </div>
        <div id="Policies">
          <div class="uitk-layout-grid-item"><h3>Check-in</h3><p>After 3 PM</p></div>
          <details><summary>House rules</summary><p>No parties</p></details>
        </div>
        <p>Unit size: 45 m²</p>
    </body></html>"#;

    const SPACES_DIALOG: &str = r#"<html><body>
        <div id="app-layer-property-content-section-detailed-dialog-spaces">
          <div data-stid="content-item"><h4>Bedroom 1</h4><p>1 King bed</p></div>
          <div data-stid="content-item"><h4>Bedroom 2</h4><p>2 Twin beds</p></div>
          <button>Close</button>
        </div>
    </body></html>"#;

    const AMENITIES_DIALOG: &str = r#"<html><body>
        <div id="app-layer-property-content-section-detailed-dialog-amenities-section-0">
          <ul>
            <li data-stid="sp-content-item-1"><span class="uitk-text">Pool</span></li>
            <li data-stid="sp-content-item-2"><span class="uitk-text">Kitchen</span></li>
          </ul>
          <button>Close</button>
        </div>
    </body></html>"#;

    fn settings(extra: &[(&str, String)]) -> Settings {
        let extra: Vec<(String, String)> = extra
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        let mut settings = Settings::from_lookup(move |key| {
            extra.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
        })
        .unwrap();
        settings.pacing = Pacing::instant();
        settings
    }

    fn plugin_state() -> Value {
        json!({
            "controllers": {"stores": {"currentHotel": {
                "hotelId": 4471,
                "detailsPayload": {"tealiumUtagData": {"currencyCode": "COP"}},
                "offerSearchData": {
                    "startDate": "2030-01-01",
                    "endDate": "2030-01-02",
                    "adults": 2,
                    "children": 0
                },
                "searchCriteria": {"destination": {
                    "regionName": "Cartagena",
                    "countryName": "Colombia",
                    "regionId": "6046"
                }}
            }}}
        })
    }

    fn listing_page() -> FakePage {
        FakePage::new()
            .with_route(LISTING_FULL_URL, LISTING)
            .on_click("button", 0, SPACES_DIALOG)
            .on_click("button", 1, AMENITIES_DIALOG)
            .with_plugin_state(plugin_state())
    }

    fn target(url: &str) -> Target {
        Target {
            id: 1,
            run_id: 1,
            kind: TARGET_TYPE_DETAIL.to_string(),
            value: LISTING_URL.to_string(),
            url: url.to_string(),
            city: Some("Cartagena".to_string()),
            status: TargetStatus::Queued,
        }
    }

    #[test]
    fn extracts_listing_fields() {
        let settings = settings(&[]);
        let page = listing_page();
        let ctx = ScrapeContext {
            page: &page,
            settings: &settings,
            resolver: &SkipResolver,
        };

        let (record, coordinates) = scrape_detail(&ctx, &target(LISTING_FULL_URL))
            .unwrap()
            .unwrap();

        assert_eq!(page.navigations(), vec![LISTING_FULL_URL.to_string()]);
        assert_eq!(coordinates.lat, Some(10.42));
        assert_eq!(coordinates.lon, Some(-75.55));
        assert_eq!(record.url, LISTING_URL);
        assert_eq!(record.unit_id, "4471");
        assert_eq!(record.unit_name.as_deref(), Some("Casa del Mar"));
        assert_eq!(record.price_amount, Some(1_250_000.0));
        assert_eq!(record.price_currency, "COP");
        assert_eq!(record.plan_name.as_deref(), Some("Superhost"));
        assert_eq!(record.property_type.as_deref(), Some("Apartment"));
        assert_eq!(
            record.header_chips,
            vec!["Superhost", "Apartment", "Entire apartment"]
        );
        assert_eq!(record.beds_text.as_deref(), Some("2 bedrooms · Sleeps 6"));
        assert_eq!(record.sleeps, Some(6));
        assert_eq!(record.size_m2, Some(45.0));
        assert_eq!(
            record.long_desc.as_deref(),
            Some("Lovely flat. Near the beach.")
        );
        assert_eq!(record.images, vec!["a.jpg", "b.jpg"]);
        assert_eq!(record.amenities_parent, vec!["Pool", "Wifi"]);
        assert_eq!(record.amenities_unit, vec!["Pool", "Wifi", "Kitchen"]);
        assert_eq!(record.address.as_deref(), Some("Calle 5, Cartagena, Colombia"));
        assert_eq!(record.city.as_deref(), Some("Cartagena"));
        assert_eq!(record.country.as_deref(), Some("Colombia"));
        assert_eq!(record.listing_status, "active");

        let rooms = &record.sections.rooms;
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].title.as_deref(), Some("Bedroom 1"));
        assert_eq!(rooms[0].description.as_deref(), Some("1 King bed"));
        assert_eq!(rooms[1].title.as_deref(), Some("Bedroom 2"));

        let host = &record.sections.host;
        assert_eq!(host.name.as_deref(), Some("Ana"));
        assert_eq!(host.avatar.as_deref(), Some("ana.jpg"));
        assert_eq!(host.languages, vec!["English", "Spanish", "French"]);
        assert_eq!(host.contact_url.as_deref(), Some("/contact/4471"));

        let policy_titles: Vec<_> = record
            .sections
            .policies
            .iter()
            .map(|p| p.title.as_deref())
            .collect();
        assert_eq!(policy_titles, vec![Some("Check-in"), Some("House rules")]);

        assert_eq!(record.source.url, LISTING_FULL_URL);
        assert_eq!(record.source.city.as_deref(), Some("Cartagena"));
        assert_eq!(record.source.search.check_in.as_deref(), Some("2030-01-01"));
        assert_eq!(record.source.search.adults, Some(2));
        assert_eq!(record.source.search.region_id.as_deref(), Some("6046"));
        // Both dialogs were opened and closed again.
        assert_eq!(page.clicks().len(), 4);
        assert!(page.current_html().contains("Casa del Mar"));
    }

    #[test]
    fn processed_target_is_done_with_one_record() {
        let settings = settings(&[]);
        let page = listing_page();
        let ctx = ScrapeContext {
            page: &page,
            settings: &settings,
            resolver: &SkipResolver,
        };
        let dir = tempfile::tempdir().unwrap();
        let mut store = LocalStore::new(dir.path()).unwrap();
        store
            .add_target(1, TARGET_TYPE_DETAIL, LISTING_URL, LISTING_FULL_URL, Some("Cartagena"))
            .unwrap();

        let stats = process_detail_targets(&ctx, &mut store, 1);

        assert_eq!(stats, DetailStats { done: 1, empty: 0, failed: 0 });
        assert_eq!(store.targets()[0].status, TargetStatus::Done);
        assert_eq!(store.results().len(), 1);
        let record = &store.results()[0];
        assert!(record.unit_name.is_some());
        assert_eq!(record.latitude, Some(10.42));
        assert!(DateTime::parse_from_rfc3339(&record.source.collected_at).is_ok());
    }

    #[test]
    fn page_without_heading_marks_target_empty() {
        let settings = settings(&[]);
        let page = FakePage::new().with_default_html("<html><body><p>Loading</p></body></html>");
        let ctx = ScrapeContext {
            page: &page,
            settings: &settings,
            resolver: &SkipResolver,
        };
        let dir = tempfile::tempdir().unwrap();
        let mut store = LocalStore::new(dir.path()).unwrap();
        store
            .add_target(1, TARGET_TYPE_DETAIL, LISTING_URL, "", None)
            .unwrap();

        let stats = process_detail_targets(&ctx, &mut store, 1);

        assert_eq!(stats.empty, 1);
        assert_eq!(store.targets()[0].status, TargetStatus::Empty);
        assert!(store.results().is_empty());
        // An empty full URL falls back to the normalized one.
        assert_eq!(page.navigations(), vec![LISTING_URL.to_string()]);
    }

    #[test]
    fn blocked_detail_is_empty_when_unattended() {
        let settings = settings(&[]);
        let html = LISTING.replace("Lovely flat.", "Show us your human side");
        let page = FakePage::new().with_route(LISTING_FULL_URL, &html);
        let ctx = ScrapeContext {
            page: &page,
            settings: &settings,
            resolver: &SkipResolver,
        };

        let result = scrape_detail(&ctx, &target(LISTING_FULL_URL)).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn missing_title_block_dumps_html_when_enabled() {
        let logs = tempfile::tempdir().unwrap();
        let settings = settings(&[
            ("VRBO_SAVE_DETAIL_HTML", "1".to_string()),
            ("VRBO_LOG_DIR", logs.path().display().to_string()),
        ]);
        let html = "<html><body><h1 class=\"uitk-heading\">Casa</h1></body></html>";
        let page = FakePage::new().with_route(LISTING_FULL_URL, html);
        let ctx = ScrapeContext {
            page: &page,
            settings: &settings,
            resolver: &SkipResolver,
        };

        assert!(scrape_detail(&ctx, &target(LISTING_FULL_URL)).unwrap().is_none());
        let dump = logs.path().join("detail_dump_4471ha.html");
        assert_eq!(std::fs::read_to_string(dump).unwrap(), html);
    }

    #[test]
    fn field_cap_limits_processed_targets() {
        let settings = settings(&[("VRBO_MAX_DETAIL_TARGETS", "1".to_string())]);
        let page = FakePage::new();
        let ctx = ScrapeContext {
            page: &page,
            settings: &settings,
            resolver: &SkipResolver,
        };
        let dir = tempfile::tempdir().unwrap();
        let mut store = LocalStore::new(dir.path()).unwrap();
        store.add_target(1, TARGET_TYPE_DETAIL, "https://www.vrbo.com/1ha", "", None);
        store.add_target(1, TARGET_TYPE_DETAIL, "https://www.vrbo.com/2ha", "", None);

        process_detail_targets(&ctx, &mut store, 1);

        assert_eq!(page.navigations().len(), 1);
        assert_eq!(
            store.list_targets(1, TARGET_TYPE_DETAIL, TargetStatus::Queued).len(),
            1
        );
    }

    #[test]
    fn country_falls_back_to_address_tail() {
        let listing = ListingState::from_state(Value::Null);
        assert_eq!(
            listing.country(Some("Calle 10, Medellín, Colombia")).as_deref(),
            Some("Colombia")
        );
        assert_eq!(listing.country(Some("Medellín")), None);
        assert_eq!(listing.country(None), None);

        let listing = ListingState::from_state(json!({
            "controllers": {"stores": {"currentHotel": {
                "detailsPayload": {"tealiumUtagData": {"propertyCountry": "Peru"}}
            }}}
        }));
        assert_eq!(listing.country(Some("Lima, Perú")).as_deref(), Some("Peru"));
        assert_eq!(listing.currency(), "USD");
    }

    #[test]
    fn address_falls_back_to_span_before_map_button() {
        let document = Html::parse_document(
            r#"<div><span>Getsemaní, Cartagena</span><button aria-label="View in a map">Map</button></div>"#,
        );
        assert_eq!(
            extract_address(&document, None).as_deref(),
            Some("Getsemaní, Cartagena")
        );
    }
}
