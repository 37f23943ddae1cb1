use crate::config::{Settings, VRBO_BASE, VRBO_COOKIE_DOMAIN};
use crate::error::ScrapeError;
use crate::scrapers::traits::{Cookie, ElementInfo, Page, ScrollPosition};
use anyhow::{anyhow, Context, Result};
use headless_chrome::types::Bounds;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info, warn};

const PAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(45);
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const PROFILE_SINGLETONS: &[&str] = &["SingletonLock", "SingletonCookie", "SingletonSocket"];

/// A running Chrome instance with the tab every driver works in
pub struct BrowserSession {
    tab: Arc<Tab>,
    _browser: Browser,
    /// Removed when the session drops.
    _temp_profile: Option<TempDir>,
}

impl BrowserSession {
    /// Launch Chrome, retrying once with a fresh profile if the saved one is unusable.
    pub fn open(settings: &Settings) -> Result<Self> {
        match Self::launch(settings, false) {
            Ok(session) => Ok(session),
            Err(err) if settings.fresh_profile || !is_session_not_created(&err) => Err(err),
            Err(err) => {
                warn!(
                    error = %err,
                    profile = %settings.profile_dir.display(),
                    "Chrome did not start with the saved profile, wiping it and retrying"
                );
                let _ = std::fs::remove_dir_all(&settings.profile_dir);
                Self::launch(settings, true)
            }
        }
    }

    fn launch(settings: &Settings, force_fresh: bool) -> Result<Self> {
        let (profile_dir, temp_profile) = resolve_profile_dir(settings, force_fresh)?;
        cleanup_profile_singletons(&profile_dir);

        let args: Vec<OsString> = launch_args(settings).into_iter().map(OsString::from).collect();
        let arg_refs: Vec<&OsStr> = args.iter().map(OsString::as_os_str).collect();

        info!(
            headless = settings.headless,
            window = %format!("{}x{}", settings.viewport_width, settings.viewport_height),
            lang = %settings.chrome_lang,
            profile = %profile_dir.display(),
            "Launching Chrome for VRBO"
        );

        let options = LaunchOptions::default_builder()
            .headless(settings.headless)
            .sandbox(!settings.disable_sandbox)
            .window_size(Some((settings.viewport_width, settings.viewport_height)))
            .user_data_dir(Some(profile_dir.clone()))
            .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
            .args(arg_refs)
            .build()
            .context("Failed to build launch options")?;

        let browser =
            Browser::new(options).map_err(|e| ScrapeError::SessionNotCreated(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| ScrapeError::SessionNotCreated(e.to_string()))?;

        tab.set_default_timeout(PAGE_LOAD_TIMEOUT);
        if let Err(err) = tab.set_user_agent(&settings.user_agent, Some(&settings.chrome_lang), None) {
            debug!(error = %err, "Could not override user agent");
        }
        if !settings.headless {
            let _ = tab.set_bounds(Bounds::Normal {
                left: None,
                top: None,
                width: Some(f64::from(settings.viewport_width)),
                height: Some(f64::from(settings.viewport_height)),
            });
        }

        Ok(Self {
            tab,
            _browser: browser,
            _temp_profile: temp_profile,
        })
    }

    pub fn page(&self) -> ChromePage {
        ChromePage {
            tab: Arc::clone(&self.tab),
        }
    }

    pub fn close(self) {
        info!("Closing Chrome");
    }
}

fn is_session_not_created(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<ScrapeError>(),
        Some(ScrapeError::SessionNotCreated(_))
    )
}

fn resolve_profile_dir(settings: &Settings, force_fresh: bool) -> Result<(PathBuf, Option<TempDir>)> {
    if settings.fresh_profile || force_fresh {
        let temp = tempfile::Builder::new()
            .prefix("vrbo_uc_profile_")
            .tempdir()
            .context("Failed to create temporary Chrome profile")?;
        info!(path = %temp.path().display(), "Using temporary Chrome profile");
        return Ok((temp.path().to_path_buf(), Some(temp)));
    }
    std::fs::create_dir_all(&settings.profile_dir).with_context(|| {
        format!("Failed to create profile dir {}", settings.profile_dir.display())
    })?;
    Ok((settings.profile_dir.clone(), None))
}

/// Remove lock files a crashed Chrome leaves in its profile.
fn cleanup_profile_singletons(profile_dir: &Path) {
    for name in PROFILE_SINGLETONS {
        let target = profile_dir.join(name);
        // The lock is a dangling symlink, so check the link itself.
        if std::fs::symlink_metadata(&target).is_err() {
            continue;
        }
        match std::fs::remove_file(&target) {
            Ok(()) => info!(file = %target.display(), "Removed stale profile lock"),
            Err(err) => warn!(file = %target.display(), error = %err, "Could not remove stale profile lock"),
        }
    }
}

/// Chrome flags beyond what `LaunchOptions` covers.
fn launch_args(settings: &Settings) -> Vec<String> {
    let mut args = vec![
        format!("--lang={}", settings.chrome_lang),
        format!("--user-agent={}", settings.user_agent),
        "--disable-blink-features=AutomationControlled".to_string(),
        format!(
            "--window-size={},{}",
            settings.viewport_width, settings.viewport_height
        ),
    ];
    if settings.disable_gpu {
        args.push("--disable-gpu".to_string());
    }
    if (settings.device_scale - 1.0).abs() > 1e-3 {
        args.push(format!("--force-device-scale-factor={}", settings.device_scale));
    }
    if !settings.extra_chrome_args.is_empty() {
        info!(total = settings.extra_chrome_args.len(), "Adding extra Chrome arguments");
        args.extend(settings.extra_chrome_args.iter().cloned());
    }
    args
}

/// Parse `name=value; other=value` into cookies.
pub fn parse_cookie_string(raw: &str) -> Vec<Cookie> {
    raw.split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .map(|(name, value)| Cookie {
            name: name.trim().to_string(),
            value: value.trim().to_string(),
            domain: None,
            path: None,
            secure: None,
        })
        .filter(|cookie| !cookie.name.is_empty())
        .collect()
}

/// Parse a JSON array of cookie objects; anything else yields no cookies.
pub fn parse_cookies_json(raw: &str) -> Vec<Cookie> {
    let items = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items,
        Ok(_) => return Vec::new(),
        Err(err) => {
            warn!(error = %err, "Could not parse VRBO_COOKIES_JSON");
            return Vec::new();
        }
    };
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<Cookie>(item).ok())
        .collect()
}

/// Set the configured cookies on the site root and reload.
pub fn inject_cookies(page: &dyn Page, settings: &Settings) -> Result<usize> {
    let mut cookies = Vec::new();
    if !settings.cookies_json.is_empty() {
        cookies.extend(parse_cookies_json(&settings.cookies_json));
    }
    if !settings.cookie_string.is_empty() {
        cookies.extend(parse_cookie_string(&settings.cookie_string));
    }
    if cookies.is_empty() {
        return Ok(0);
    }

    info!(total = cookies.len(), "Injecting manual cookies");
    page.navigate(VRBO_BASE)?;
    for mut cookie in cookies.iter().cloned() {
        cookie.domain.get_or_insert_with(|| VRBO_COOKIE_DOMAIN.to_string());
        if let Err(err) = page.set_cookie(&cookie) {
            debug!(cookie = %cookie.name, error = %err, "Cookie rejected");
        }
    }
    page.reload()?;
    Ok(cookies.len())
}

/// `Page` backed by a headless_chrome tab
pub struct ChromePage {
    tab: Arc<Tab>,
}

impl ChromePage {
    /// Run a script that returns `JSON.stringify(..)` and parse the result.
    fn eval_json(&self, script: &str) -> Result<Value> {
        match self.tab.evaluate(script, false)?.value {
            Some(Value::String(raw)) => Ok(serde_json::from_str(&raw)?),
            Some(other) => Ok(other),
            None => Ok(Value::Null),
        }
    }
}

fn js_string(value: &str) -> String {
    // A JSON string literal is a valid JavaScript string literal.
    Value::String(value.to_string()).to_string()
}

impl Page for ChromePage {
    fn navigate(&self, url: &str) -> Result<()> {
        self.tab.navigate_to(url)?;
        self.tab.wait_until_navigated()?;
        Ok(())
    }

    fn reload(&self) -> Result<()> {
        self.tab.reload(false, None)?;
        self.tab.wait_until_navigated()?;
        Ok(())
    }

    fn current_url(&self) -> String {
        self.tab.get_url()
    }

    fn title(&self) -> Option<String> {
        self.tab.get_title().ok()
    }

    fn content(&self) -> Result<String> {
        Ok(self.tab.get_content()?)
    }

    fn evaluate(&self, expression: &str) -> Result<Option<Value>> {
        Ok(self.tab.evaluate(expression, false)?.value)
    }

    fn wait_for(&self, selector: &str, timeout: Duration) -> bool {
        self.tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .is_ok()
    }

    fn elements(&self, selector: &str) -> Result<Vec<ElementInfo>> {
        let script = format!(
            r#"JSON.stringify(Array.from(document.querySelectorAll({sel})).map(el => {{
                const attributes = {{}};
                for (const a of el.attributes) attributes[a.name] = a.value;
                const rect = el.getBoundingClientRect();
                const style = window.getComputedStyle(el);
                return {{
                    text: (el.innerText || '').trim(),
                    attributes,
                    visible: rect.width > 0 && rect.height > 0
                        && style.visibility !== 'hidden' && style.display !== 'none',
                    enabled: !el.disabled
                }};
            }}))"#,
            sel = js_string(selector)
        );
        match self.eval_json(&script)? {
            Value::Null => Ok(Vec::new()),
            value => Ok(serde_json::from_value(value)?),
        }
    }

    fn click(&self, selector: &str, index: usize) -> Result<()> {
        let elements = self.tab.find_elements(selector)?;
        let element = elements
            .get(index)
            .ok_or_else(|| anyhow!("no element {index} for {selector}"))?;
        if let Err(err) = element.scroll_into_view() {
            debug!(selector, error = %err, "scroll_into_view failed");
        }
        element.click()?;
        Ok(())
    }

    fn press_escape(&self) -> Result<()> {
        self.tab.press_key("Escape")?;
        Ok(())
    }

    fn scroll_container(&self, selector: &str, delta: i64) -> Result<Option<ScrollPosition>> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return JSON.stringify(null);
                el.scrollBy(0, {delta});
                return JSON.stringify({{ bottom: el.scrollTop + el.clientHeight, height: el.scrollHeight }});
            }})()"#,
            sel = js_string(selector)
        );
        match self.eval_json(&script)? {
            Value::Null => Ok(None),
            value => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    fn scroll_container_to_end(&self, selector: &str) -> Result<()> {
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); if (el) el.scrollTop = el.scrollHeight; return true; }})()",
            sel = js_string(selector)
        );
        self.tab.evaluate(&script, false)?;
        Ok(())
    }

    fn scroll_window_to(&self, y: f64) -> Result<()> {
        self.tab
            .evaluate(&format!("window.scrollTo(0, {y}); true"), false)?;
        Ok(())
    }

    fn document_height(&self) -> Result<f64> {
        let value = self
            .tab
            .evaluate("document.body ? document.body.scrollHeight : 0", false)?
            .value;
        Ok(value.and_then(|v| v.as_f64()).unwrap_or(0.0))
    }

    fn set_cookie(&self, cookie: &Cookie) -> Result<()> {
        let mut parts = vec![format!("{}={}", cookie.name, cookie.value)];
        if let Some(domain) = &cookie.domain {
            parts.push(format!("domain={domain}"));
        }
        parts.push(format!("path={}", cookie.path.as_deref().unwrap_or("/")));
        if cookie.secure == Some(true) {
            parts.push("secure".to_string());
        }
        let script = format!("document.cookie = {}; true", js_string(&parts.join("; ")));
        self.tab.evaluate(&script, false)?;
        Ok(())
    }
}
