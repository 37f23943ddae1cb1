//! In-memory `Page` over canned HTML, for driving the scrapers in tests.

use crate::parse::{css, element_text};
use crate::scrapers::traits::{Cookie, ElementInfo, Page, ScrollPosition};
use anyhow::{anyhow, Result};
use scraper::Html;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::time::Duration;

const EMPTY_PAGE: &str = "<html><body></body></html>";

struct ClickAction {
    selector: String,
    index: usize,
    html: String,
}

/// Serves HTML by URL; registered clicks swap in new HTML, any other
/// click or Escape goes back to the previous document.
#[derive(Default)]
pub struct FakePage {
    html: RefCell<String>,
    default_html: Option<String>,
    routes: HashMap<String, String>,
    click_actions: Vec<ClickAction>,
    plugin_state: Option<Value>,
    navigation_error: Option<String>,
    history: RefCell<Vec<String>>,
    navigations: RefCell<Vec<String>>,
    clicks: RefCell<Vec<(String, usize)>>,
    cookies: RefCell<Vec<Cookie>>,
    reloads: Cell<usize>,
    document_growth: f64,
    document_height: Cell<f64>,
    window_scrolls: RefCell<Vec<f64>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            html: RefCell::new(EMPTY_PAGE.to_string()),
            document_height: Cell::new(1600.0),
            ..Default::default()
        }
    }

    /// HTML for unrouted URLs; also becomes the current document.
    pub fn with_default_html(mut self, html: &str) -> Self {
        self.default_html = Some(html.to_string());
        self.html.replace(html.to_string());
        self
    }

    pub fn with_route(mut self, url: &str, html: &str) -> Self {
        self.routes.insert(url.to_string(), html.to_string());
        self
    }

    pub fn on_click(mut self, selector: &str, index: usize, html: &str) -> Self {
        self.click_actions.push(ClickAction {
            selector: selector.to_string(),
            index,
            html: html.to_string(),
        });
        self
    }

    /// Value of `window.__PLUGIN_STATE__` as seen by script evaluation.
    pub fn with_plugin_state(mut self, state: Value) -> Self {
        self.plugin_state = Some(state);
        self
    }

    /// Every navigation fails with `message`.
    pub fn failing_navigation(mut self, message: &str) -> Self {
        self.navigation_error = Some(message.to_string());
        self
    }

    /// The document gets `step` taller every time its height is read.
    pub fn with_growing_document(mut self, step: f64) -> Self {
        self.document_growth = step;
        self
    }

    /// Replace the current document, as a person working the browser would.
    pub fn show(&self, html: &str) {
        self.html.replace(html.to_string());
    }

    pub fn current_html(&self) -> String {
        self.html.borrow().clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.borrow().clone()
    }

    pub fn clicks(&self) -> Vec<(String, usize)> {
        self.clicks.borrow().clone()
    }

    pub fn cookies(&self) -> Vec<Cookie> {
        self.cookies.borrow().clone()
    }

    pub fn reloads(&self) -> usize {
        self.reloads.get()
    }

    pub fn window_scrolls(&self) -> Vec<f64> {
        self.window_scrolls.borrow().clone()
    }

    fn match_count(&self, selector: &str) -> usize {
        let Some(sel) = css(selector) else {
            return 0;
        };
        Html::parse_document(&self.html.borrow()).select(&sel).count()
    }

    fn go_back(&self) {
        if let Some(previous) = self.history.borrow_mut().pop() {
            self.html.replace(previous);
        }
    }
}

impl Page for FakePage {
    fn navigate(&self, url: &str) -> Result<()> {
        if let Some(message) = &self.navigation_error {
            return Err(anyhow!("{message}"));
        }
        self.navigations.borrow_mut().push(url.to_string());
        self.history.borrow_mut().clear();
        let html = self
            .routes
            .get(url)
            .or(self.default_html.as_ref())
            .cloned()
            .unwrap_or_else(|| EMPTY_PAGE.to_string());
        self.html.replace(html);
        Ok(())
    }

    fn reload(&self) -> Result<()> {
        self.reloads.set(self.reloads.get() + 1);
        Ok(())
    }

    fn current_url(&self) -> String {
        self.navigations.borrow().last().cloned().unwrap_or_default()
    }

    fn title(&self) -> Option<String> {
        None
    }

    fn content(&self) -> Result<String> {
        Ok(self.current_html())
    }

    fn evaluate(&self, expression: &str) -> Result<Option<Value>> {
        if !expression.contains("__PLUGIN_STATE__") {
            return Ok(None);
        }
        Ok(self
            .plugin_state
            .as_ref()
            .map(|state| Value::String(state.to_string())))
    }

    fn wait_for(&self, selector: &str, _timeout: Duration) -> bool {
        self.match_count(selector) > 0
    }

    fn elements(&self, selector: &str) -> Result<Vec<ElementInfo>> {
        let sel = css(selector).ok_or_else(|| anyhow!("invalid selector {selector}"))?;
        let document = Html::parse_document(&self.html.borrow());
        let elements = document
            .select(&sel)
            .map(|el| {
                let attributes: HashMap<String, String> = el
                    .value()
                    .attrs()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                ElementInfo {
                    text: element_text(el).unwrap_or_default(),
                    visible: !attributes.contains_key("hidden"),
                    enabled: !attributes.contains_key("disabled"),
                    attributes,
                }
            })
            .collect();
        Ok(elements)
    }

    fn click(&self, selector: &str, index: usize) -> Result<()> {
        if self.match_count(selector) <= index {
            return Err(anyhow!("no element {selector}[{index}]"));
        }
        self.clicks.borrow_mut().push((selector.to_string(), index));
        let action = self
            .click_actions
            .iter()
            .find(|action| action.selector == selector && action.index == index);
        match action {
            Some(action) => {
                let previous = self.html.replace(action.html.clone());
                self.history.borrow_mut().push(previous);
            }
            None => self.go_back(),
        }
        Ok(())
    }

    fn press_escape(&self) -> Result<()> {
        self.go_back();
        Ok(())
    }

    fn scroll_container(&self, selector: &str, _delta: i64) -> Result<Option<ScrollPosition>> {
        Ok((self.match_count(selector) > 0).then_some(ScrollPosition {
            bottom: 1000.0,
            height: 1000.0,
        }))
    }

    fn scroll_container_to_end(&self, _selector: &str) -> Result<()> {
        Ok(())
    }

    fn scroll_window_to(&self, y: f64) -> Result<()> {
        self.window_scrolls.borrow_mut().push(y);
        Ok(())
    }

    fn document_height(&self) -> Result<f64> {
        let height = self.document_height.get();
        self.document_height.set(height + self.document_growth);
        Ok(height)
    }

    fn set_cookie(&self, cookie: &Cookie) -> Result<()> {
        self.cookies.borrow_mut().push(cookie.clone());
        Ok(())
    }
}
