use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Run identifier: epoch seconds at run start.
pub type RunId = i64;

/// Processing state of a discovered listing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    Queued,
    Done,
    Empty,
    Error,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Done => "done",
            Self::Empty => "empty",
            Self::Error => "error",
        }
    }
}

/// A listing URL discovered on a search page, waiting for its detail page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: u64,
    pub run_id: RunId,
    #[serde(rename = "type")]
    pub kind: String,
    /// Normalized URL (scheme, host, path); unique within a run.
    pub value: String,
    /// URL as found on the page, tracking parameters included.
    pub url: String,
    /// City whose search surfaced this listing.
    pub city: Option<String>,
    pub status: TargetStatus,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// Title/description pair used for rooms and policies
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ContentBlock {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AmenitySection {
    pub popular: Vec<String>,
    pub all: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HostInfo {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub languages: Vec<String>,
    pub contact_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LocationSection {
    pub address: Option<String>,
    pub coordinates: Coordinates,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Sections {
    pub rooms: Vec<ContentBlock>,
    pub amenities: AmenitySection,
    pub policies: Vec<ContentBlock>,
    pub host: HostInfo,
    pub location: LocationSection,
}

/// Search parameters the site reports for the visited listing
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchInfo {
    pub check_in: Option<String>,
    pub check_out: Option<String>,
    pub adults: Option<u64>,
    pub children: Option<u64>,
    pub destination: Option<String>,
    pub region_id: Option<String>,
    pub lat_long: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Provenance {
    pub url: String,
    pub city: Option<String>,
    pub collected_at: String,
    pub search: SearchInfo,
}

/// One scraped listing, as written to the results file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub url: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub unit_id: String,
    pub unit_name: Option<String>,
    pub price_amount: Option<f64>,
    pub price_currency: String,
    pub price_text: Option<String>,
    pub price_row_text: Option<String>,
    pub plan_name: Option<String>,
    pub cancellation: Option<String>,
    pub beds_text: Option<String>,
    pub sleeps: Option<u32>,
    pub size_m2: Option<f64>,
    pub amenities_parent: Vec<String>,
    pub amenities_unit: Vec<String>,
    pub header_chips: Vec<String>,
    pub sections: Sections,
    pub long_desc: Option<String>,
    pub comfort_score: Option<f64>,
    pub images: Vec<String>,
    pub listing_status: String,
    pub property_type: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    #[serde(rename = "_source")]
    pub source: Provenance,
}
