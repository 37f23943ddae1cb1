//! Pure helpers shared by the page drivers: URL normalization, localized
//! number parsing, text clean-up and ordered fallback resolution.

use crate::config::{NumberLocale, VRBO_BASE};
use regex::Regex;
use scraper::{ElementRef, Selector};
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::LazyLock;
use url::Url;

/// Try each strategy in order and return the first result.
pub fn first_match<I: ?Sized, T>(input: &I, strategies: &[&dyn Fn(&I) -> Option<T>]) -> Option<T> {
    strategies.iter().find_map(|strategy| strategy(input))
}

/// Absolute form of `href`, relative links resolved against the site root.
pub fn absolute_url(href: &str) -> Option<Url> {
    match Url::parse(href) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(VRBO_BASE).ok()?.join(href).ok()
        }
        Err(_) => None,
    }
}

/// Scheme, host and path of `href`; query and fragment dropped.
///
/// Returns the input unchanged when it cannot be parsed as a URL.
pub fn normalize_url(href: &str) -> String {
    match absolute_url(href.trim()) {
        Some(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        None => href.to_string(),
    }
}

// Literal patterns; `regex_patterns_compile` below covers every one.
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9][0-9.,]*").expect("valid number regex"));
static UNIT_SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)Unit size:\s*([\d.,]+ [^"<]+)"#).expect("valid unit size regex")
});
static SLEEPS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)sleeps\s*(\d+)").expect("valid sleeps regex"));

/// First number in `text`, read with the given separator convention.
pub fn parse_amount(text: Option<&str>, locale: NumberLocale) -> Option<f64> {
    let raw = NUMBER_RE.find(text?)?.as_str();
    let cleaned = match locale {
        NumberLocale::DecimalComma => raw.replace('.', "").replace(',', "."),
        NumberLocale::DecimalPoint => raw.replace(',', ""),
    };
    cleaned.trim_end_matches('.').parse().ok()
}

/// Drop empty strings and repeats, keeping first-seen order.
pub fn dedup_preserve_order<I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| !item.is_empty() && seen.insert(item.clone()))
        .collect()
}

/// Drop repeats by `key`, keeping first-seen order.
pub fn dedup_by_key<T, K, F>(items: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(key(item))).collect()
}

/// Parse a CSS selector, `None` when it is malformed.
pub fn css(selector: &str) -> Option<Selector> {
    Selector::parse(selector).ok()
}

/// Visible text of an element with whitespace collapsed; `None` when blank.
pub fn element_text(element: ElementRef<'_>) -> Option<String> {
    let text = element
        .text()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

/// First descendant of `root` matching `selector`.
pub fn select_first<'a>(root: ElementRef<'a>, selector: &str) -> Option<ElementRef<'a>> {
    root.select(&css(selector)?).next()
}

/// Text of the first descendant matching `selector`.
pub fn select_text(root: ElementRef<'_>, selector: &str) -> Option<String> {
    select_first(root, selector).and_then(element_text)
}

/// Attribute of the first descendant matching `selector`.
pub fn select_attr(root: ElementRef<'_>, selector: &str, attr: &str) -> Option<String> {
    select_first(root, selector)
        .and_then(|el| el.value().attr(attr))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Floor area from a "Unit size: 45 m²" label anywhere in the page source.
pub fn unit_size_m2(html: &str, locale: NumberLocale) -> Option<f64> {
    let label = UNIT_SIZE_RE.captures(html)?.get(1)?.as_str();
    parse_amount(Some(label), locale)
}

/// Guest capacity from a summary such as "2 bedrooms · Sleeps 6".
pub fn sleeps_from_summary(summary: &str) -> Option<u32> {
    SLEEPS_RE.captures(summary)?.get(1)?.as_str().parse().ok()
}

/// Split "English, Spanish / French" into its languages.
pub fn split_languages(text: &str) -> Vec<String> {
    text.split([',', '/'])
        .map(str::trim)
        .filter(|lang| !lang.is_empty())
        .map(str::to_string)
        .collect()
}

/// Last path segment, used to name debug dumps.
pub fn url_slug(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|slug| !slug.is_empty() && !slug.contains(':'))
        .unwrap_or("detail")
        .to_string()
}
