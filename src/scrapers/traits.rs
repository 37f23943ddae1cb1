use anyhow::Result;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;

/// Snapshot of a DOM element as seen by the browser
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ElementInfo {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub enabled: bool,
}

impl ElementInfo {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Scroll state of a scrollable element
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ScrollPosition {
    /// `scrollTop + clientHeight`
    pub bottom: f64,
    /// `scrollHeight`
    pub height: f64,
}

/// A cookie to set on the site before scraping
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub secure: Option<bool>,
}

/// Everything the page drivers need from a live browser tab.
///
/// Element lookups return empty results rather than errors when nothing
/// matches; errors mean the browser itself misbehaved.
pub trait Page {
    fn navigate(&self, url: &str) -> Result<()>;

    fn reload(&self) -> Result<()>;

    fn current_url(&self) -> String;

    fn title(&self) -> Option<String>;

    /// Serialized DOM of the current document.
    fn content(&self) -> Result<String>;

    /// Evaluate a JavaScript expression, returning its JSON value.
    fn evaluate(&self, expression: &str) -> Result<Option<Value>>;

    /// Wait until `selector` matches something; `false` on timeout.
    fn wait_for(&self, selector: &str, timeout: Duration) -> bool;

    fn elements(&self, selector: &str) -> Result<Vec<ElementInfo>>;

    /// Scroll the `index`-th match of `selector` into view and click it.
    fn click(&self, selector: &str, index: usize) -> Result<()>;

    fn press_escape(&self) -> Result<()>;

    /// Scroll the first match of `selector` by `delta` pixels.
    ///
    /// `None` when no element matches.
    fn scroll_container(&self, selector: &str, delta: i64) -> Result<Option<ScrollPosition>>;

    fn scroll_container_to_end(&self, selector: &str) -> Result<()>;

    fn scroll_window_to(&self, y: f64) -> Result<()>;

    fn document_height(&self) -> Result<f64>;

    fn set_cookie(&self, cookie: &Cookie) -> Result<()>;
}

/// Outcome of waiting for someone to clear an anti-bot challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved,
    TimedOut,
}

/// Policy for pages that show an anti-bot challenge
pub trait ChallengeResolver {
    fn await_resolution(&self, timeout: Option<Duration>) -> Resolution;
}

/// One way of reading the site's embedded plugin state
pub trait StateSource {
    fn name(&self) -> &'static str;

    fn fetch(&self, page: &dyn Page, html: &str) -> Option<Map<String, Value>>;
}
