use crate::config::VRBO_BASE;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

/// Search request for one city, as read from the city file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityConfig {
    pub name: String,
    #[serde(default)]
    pub region_name: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub region_id: Option<String>,
    /// Full search URL; date and guest parameters are overlaid onto it.
    #[serde(default)]
    pub search_url: Option<String>,
    /// ISO 8601 date
    #[serde(default)]
    pub checkin: Option<String>,
    /// ISO 8601 date
    #[serde(default)]
    pub checkout: Option<String>,
    #[serde(default = "default_adults")]
    pub adults: u32,
    #[serde(default)]
    pub children: u32,
    #[serde(default = "default_one")]
    pub rooms: u32,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default = "default_one")]
    pub nights: u32,
    #[serde(default = "default_sort")]
    pub sort: String,
    #[serde(default = "default_flexibility")]
    pub flexibility: String,
}

/// Top-level layout of the city file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CityFile {
    #[serde(default)]
    pub cities: Vec<CityConfig>,
}

fn default_adults() -> u32 {
    2
}

fn default_one() -> u32 {
    1
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_locale() -> String {
    "es_CO".to_string()
}

fn default_lang() -> String {
    "es".to_string()
}

fn default_sort() -> String {
    "PRICE_LOW_TO_HIGH".to_string()
}

fn default_flexibility() -> String {
    "0_DAY".to_string()
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl CityConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region_name: None,
            region_id: None,
            search_url: None,
            checkin: None,
            checkout: None,
            adults: default_adults(),
            children: 0,
            rooms: default_one(),
            currency: default_currency(),
            locale: default_locale(),
            lang: default_lang(),
            nights: default_one(),
            sort: default_sort(),
            flexibility: default_flexibility(),
        }
    }
}

/// Fill in stay dates: tomorrow plus `max(1, nights)` when forced or missing.
pub fn ensure_dates(mut city: CityConfig, force_tomorrow: bool, today: NaiveDate) -> CityConfig {
    let has_dates = city.checkin.is_some() && city.checkout.is_some();
    if force_tomorrow || !has_dates {
        let checkin = today + Duration::days(1);
        let checkout = checkin + Duration::days(i64::from(city.nights.max(1)));
        city.checkin = Some(checkin.format("%Y-%m-%d").to_string());
        city.checkout = Some(checkout.format("%Y-%m-%d").to_string());
    }
    city
}

/// Search URL for a city.
///
/// An explicit `search_url` keeps its own parameters and gets dates, guests,
/// region and sort overlaid; otherwise a `/search` URL is synthesized.
pub fn build_entry_url(city: &CityConfig) -> String {
    if let Some(raw) = city.search_url.as_deref().filter(|s| !s.trim().is_empty()) {
        match Url::parse(raw.trim()) {
            Ok(url) => return overlay_search_url(url, city),
            Err(err) => {
                warn!(city = %city.name, url = raw, error = %err, "Ignoring unparseable search_url");
            }
        }
    }
    synthesize_search_url(city)
}

fn set_param(query: &mut Vec<(String, String)>, keys: &[&str], value: Option<&str>) {
    for key in keys {
        match value.filter(|v| !v.is_empty()) {
            Some(value) => match query.iter_mut().find(|(k, _)| k == key) {
                Some(entry) => entry.1 = value.to_string(),
                None => query.push((key.to_string(), value.to_string())),
            },
            None => query.retain(|(k, _)| k != key),
        }
    }
}

fn region_id(city: &CityConfig) -> Option<&str> {
    city.region_id.as_deref().filter(|id| !id.is_empty())
}

fn overlay_search_url(mut url: Url, city: &CityConfig) -> String {
    // Repeated keys collapse to one entry holding the last value.
    let mut query: Vec<(String, String)> = Vec::new();
    for (key, value) in url.query_pairs() {
        match query.iter_mut().find(|(k, _)| k.as_str() == key.as_ref()) {
            Some(entry) => entry.1 = value.into_owned(),
            None => query.push((key.into_owned(), value.into_owned())),
        }
    }

    set_param(&mut query, &["checkIn", "startDate", "d1"], city.checkin.as_deref());
    set_param(&mut query, &["checkOut", "endDate", "d2"], city.checkout.as_deref());

    let adults = city.adults.max(1).to_string();
    set_param(&mut query, &["adults"], Some(&adults));
    let children = (city.children > 0).then(|| city.children.to_string());
    set_param(&mut query, &["children"], children.as_deref());

    if let Some(region_id) = region_id(city) {
        set_param(&mut query, &["regionId"], Some(region_id));
    }
    if !city.sort.is_empty() {
        set_param(&mut query, &["sort"], Some(&city.sort));
    }

    url.query_pairs_mut().clear().extend_pairs(query);
    url.to_string()
}

fn synthesize_search_url(city: &CityConfig) -> String {
    let destination = city
        .region_name
        .as_deref()
        .filter(|s| !s.is_empty())
        .or(Some(city.name.as_str()).filter(|s| !s.is_empty()))
        .unwrap_or("Colombia");

    let mut query: Vec<(&str, String)> = vec![("destination", destination.to_string())];
    if let Some(region_id) = region_id(city) {
        query.push(("regionId", region_id.to_string()));
    }
    if !city.flexibility.is_empty() {
        query.push(("flexibility", city.flexibility.clone()));
    }
    if let Some(checkin) = &city.checkin {
        query.push(("d1", checkin.clone()));
        query.push(("startDate", checkin.clone()));
    }
    if let Some(checkout) = &city.checkout {
        query.push(("d2", checkout.clone()));
        query.push(("endDate", checkout.clone()));
    }
    query.push(("adults", city.adults.max(1).to_string()));
    if city.children > 0 {
        query.push(("children", city.children.to_string()));
    }
    if !city.sort.is_empty() {
        query.push(("sort", city.sort.clone()));
    }

    let mut url = match Url::parse(VRBO_BASE).and_then(|base| base.join("/search")) {
        Ok(url) => url,
        Err(_) => return format!("{VRBO_BASE}/search"),
    };
    url.query_pairs_mut().extend_pairs(query);
    url.to_string()
}
