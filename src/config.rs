use crate::error::ScrapeError;
use crate::scrapers::types::{ensure_dates, CityConfig, CityFile};
use anyhow::{Context, Result};
use chrono::Local;
use dotenvy::dotenv;
use serde_json::json;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Site root, used for relative links and cookie injection.
pub const VRBO_BASE: &str = "https://www.vrbo.com";

/// Default cookie domain when a cookie does not carry one.
pub const VRBO_COOKIE_DOMAIN: &str = "www.vrbo.com";

/// Target type tag for listing detail pages.
pub const TARGET_TYPE_DETAIL: &str = "vrbo_detail";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const FLAG_TRUE: &[&str] = &["1", "true", "yes", "y", "on"];
const FLAG_FALSE: &[&str] = &["0", "false", "no", "off"];

/// How numbers shown on the site are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberLocale {
    /// `1.234,56`
    DecimalComma,
    /// `1,234.56`
    DecimalPoint,
}

impl FromStr for NumberLocale {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "decimal-comma" | "comma" | "es" => Ok(Self::DecimalComma),
            "decimal-point" | "point" | "dot" | "en" => Ok(Self::DecimalPoint),
            _ => Err(()),
        }
    }
}

/// What to do when the site serves an anti-bot challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeMode {
    /// Wait for someone to solve it in the browser and press Enter.
    Manual,
    /// Give up on the page immediately.
    Skip,
}

impl FromStr for ChallengeMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "manual" | "interactive" => Ok(Self::Manual),
            "skip" | "unattended" => Ok(Self::Skip),
            _ => Err(()),
        }
    }
}

/// Fixed waits between browser interactions.
#[derive(Debug, Clone)]
pub struct Pacing {
    pub after_navigation: Duration,
    pub settle: Duration,
    pub detail_scroll_step: Duration,
    pub before_click: Duration,
    pub after_dialog: Duration,
    pub max_jitter: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            after_navigation: Duration::from_secs(2),
            settle: Duration::from_millis(800),
            detail_scroll_step: Duration::from_millis(400),
            before_click: Duration::from_millis(500),
            after_dialog: Duration::from_millis(500),
            max_jitter: Duration::from_millis(500),
        }
    }
}

impl Pacing {
    /// No waits at all; used when driving a fake page.
    pub fn instant() -> Self {
        Self {
            after_navigation: Duration::ZERO,
            settle: Duration::ZERO,
            detail_scroll_step: Duration::ZERO,
            before_click: Duration::ZERO,
            after_dialog: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }
}

/// Scraper settings, read once at startup and passed by reference everywhere.
#[derive(Debug, Clone)]
pub struct Settings {
    pub log_dir: PathBuf,
    pub user_agent: String,
    pub profile_dir: PathBuf,
    pub fresh_profile: bool,
    pub extra_chrome_args: Vec<String>,
    pub cookie_string: String,
    pub cookies_json: String,
    pub scroll_pause: Duration,
    /// 0 means unlimited.
    pub max_pages: u32,
    pub navigation_delay: Duration,
    pub force_tomorrow: bool,
    pub data_dir: PathBuf,
    /// 0 means unlimited.
    pub max_detail_targets: usize,
    pub save_detail_html: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub device_scale: f64,
    pub chrome_lang: String,
    pub headless: bool,
    pub disable_gpu: bool,
    pub disable_sandbox: bool,
    pub cities_file: PathBuf,
    pub number_locale: NumberLocale,
    pub challenge_mode: ChallengeMode,
    pub challenge_timeout: Option<Duration>,
    pub pacing: Pacing,
}

impl Settings {
    /// Load settings from the process environment (and `.env` if present).
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(&lookup);

        let home = env
            .string("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let global_w: u32 = env.parse("VIEWPORT_W", 1920)?;
        let global_h: u32 = env.parse("VIEWPORT_H", 1080)?;
        let global_scale: f64 = env.parse("DEVICE_SCALE", 1.0)?;

        let extra_raw = env.string("VRBO_EXTRA_CHROME_ARGS").unwrap_or_default();
        let extra_chrome_args = shlex::split(&extra_raw)
            .ok_or_else(|| ScrapeError::InvalidSetting {
                name: "VRBO_EXTRA_CHROME_ARGS".to_string(),
                value: extra_raw.clone(),
            })?
            .into_iter()
            .filter(|arg| !arg.is_empty())
            .collect();

        let challenge_timeout = match env.parse::<u64>("VRBO_CHALLENGE_TIMEOUT", 0)? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            log_dir: env.path("VRBO_LOG_DIR", "logs", &home),
            user_agent: env
                .string("VRBO_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            profile_dir: env
                .string("VRBO_PROFILE_DIR")
                .map(|raw| expand_home(&raw, &home))
                .unwrap_or_else(|| home.join(".vrbo_uc_profile")),
            fresh_profile: env.flag("VRBO_FRESH_PROFILE", false),
            extra_chrome_args,
            cookie_string: env.string("VRBO_COOKIE_STRING").unwrap_or_default(),
            cookies_json: env.string("VRBO_COOKIES_JSON").unwrap_or_default(),
            scroll_pause: env.seconds("VRBO_SCROLL_PAUSE", 0.4)?,
            max_pages: env.parse("VRBO_MAX_PAGES", 1)?,
            navigation_delay: env.seconds("VRBO_NAVIGATION_DELAY", 2.5)?,
            force_tomorrow: env.flag("VRBO_FORCE_TOMORROW", true),
            data_dir: env.path("VRBO_DATA_DIR", "data", &home),
            max_detail_targets: env.parse("VRBO_MAX_DETAIL_TARGETS", 0)?,
            save_detail_html: env.flag("VRBO_SAVE_DETAIL_HTML", false),
            viewport_width: env.parse("VRBO_VIEWPORT_W", global_w)?,
            viewport_height: env.parse("VRBO_VIEWPORT_H", global_h)?,
            device_scale: env.parse("VRBO_DEVICE_SCALE", global_scale)?,
            chrome_lang: env
                .string("VRBO_CHROME_LANG")
                .unwrap_or_else(|| "es-ES".to_string()),
            headless: env.flag("VRBO_HEADLESS", true),
            disable_gpu: env.flag("VRBO_DISABLE_GPU", true),
            disable_sandbox: env.flag("VRBO_DISABLE_SANDBOX", true),
            cities_file: env.path("VRBO_CITIES_FILE", "cities.vrbo_col.json", &home),
            number_locale: env.parse("VRBO_NUMBER_LOCALE", NumberLocale::DecimalComma)?,
            challenge_mode: env.parse("VRBO_CHALLENGE_MODE", ChallengeMode::Manual)?,
            challenge_timeout,
            pacing: Pacing::default(),
        })
    }
}

struct Lookup<'a, F>(&'a F);

impl<F> Lookup<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn flag(&self, name: &str, default: bool) -> bool {
        let Some(raw) = self.string(name) else {
            return default;
        };
        let value = raw.to_lowercase();
        if FLAG_TRUE.contains(&value.as_str()) {
            true
        } else if FLAG_FALSE.contains(&value.as_str()) {
            false
        } else {
            default
        }
    }

    fn parse<T: FromStr>(&self, name: &str, default: T) -> Result<T> {
        match self.string(name) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| {
                ScrapeError::InvalidSetting {
                    name: name.to_string(),
                    value: raw,
                }
                .into()
            }),
        }
    }

    fn seconds(&self, name: &str, default: f64) -> Result<Duration> {
        let secs: f64 = self.parse(name, default)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            ScrapeError::InvalidSetting {
                name: name.to_string(),
                value: secs.to_string(),
            }
            .into()
        })
    }

    fn path(&self, name: &str, default: &str, home: &Path) -> PathBuf {
        self.string(name)
            .map(|raw| expand_home(&raw, home))
            .unwrap_or_else(|| PathBuf::from(default))
    }
}

fn expand_home(raw: &str, home: &Path) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => home.join(rest),
        None if raw == "~" => home.to_path_buf(),
        None => PathBuf::from(raw),
    }
}

/// Read the city file, writing a sample and failing when it does not exist.
pub fn load_cities(path: &Path, force_tomorrow: bool) -> Result<Vec<CityConfig>> {
    if !path.exists() {
        let sample = json!({
            "cities": [
                {
                    "name": "Bogota",
                    "region_name": "Bogota, Distrito Capital, Colombia",
                    "region_id": "-592318",
                    "nights": 2,
                    "adults": 2
                }
            ]
        });
        let body = serde_json::to_string_pretty(&sample)?;
        std::fs::write(path, body)
            .with_context(|| format!("Failed to write sample city file {}", path.display()))?;
        info!(path = %path.display(), "Sample city file created");
        return Err(ScrapeError::ConfigMissing {
            path: path.to_path_buf(),
        }
        .into());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read city file {}", path.display()))?;
    let file: CityFile =
        serde_json::from_str(&raw).map_err(|err| ScrapeError::InvalidConfig {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

    let today = Local::now().date_naive();
    let cities: Vec<CityConfig> = file
        .cities
        .into_iter()
        .map(|city| ensure_dates(city, force_tomorrow, today))
        .collect();

    if cities.is_empty() {
        return Err(ScrapeError::NoCities {
            path: path.to_path_buf(),
        }
        .into());
    }
    Ok(cities)
}
