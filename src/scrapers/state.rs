//! Reading `window.__PLUGIN_STATE__`, the JSON blob the site embeds with
//! authoritative listing and search metadata.

use crate::scrapers::traits::{Page, StateSource};
use serde_json::{Map, Value};
use std::str::Chars;
use tracing::debug;

const STATE_MARKER: &str = "window.__PLUGIN_STATE__ = JSON.parse(\"";
const STATE_END: &str = "\");";

/// Reads the global from the live page
pub struct LiveGlobalState;

impl StateSource for LiveGlobalState {
    fn name(&self) -> &'static str {
        "live-global"
    }

    fn fetch(&self, page: &dyn Page, _html: &str) -> Option<Map<String, Value>> {
        match page.evaluate("JSON.stringify(window.__PLUGIN_STATE__ || null)") {
            Ok(Some(Value::String(raw))) => match serde_json::from_str(&raw) {
                Ok(Value::Object(map)) => Some(map),
                _ => None,
            },
            Ok(Some(Value::Object(map))) => Some(map),
            Ok(_) => None,
            Err(err) => {
                debug!(error = %err, "Plugin state evaluation failed");
                None
            }
        }
    }
}

/// Slices the `JSON.parse("...")` literal out of the page source
pub struct EmbeddedLiteralState;

impl StateSource for EmbeddedLiteralState {
    fn name(&self) -> &'static str {
        "embedded-literal"
    }

    fn fetch(&self, _page: &dyn Page, html: &str) -> Option<Map<String, Value>> {
        parse_embedded_state(html)
    }
}

/// Parse the plugin state literal from raw HTML.
pub fn parse_embedded_state(html: &str) -> Option<Map<String, Value>> {
    let start = html.find(STATE_MARKER)? + STATE_MARKER.len();
    let len = html[start..].find(STATE_END)?;
    let decoded = unescape_js_string(&html[start..start + len]);
    match serde_json::from_str(&decoded).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Decode the body of a double-quoted JavaScript string literal.
///
/// Malformed hex escapes keep their text minus the backslash; unpaired
/// surrogates become U+FFFD.
fn unescape_js_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(escape) = chars.next() else {
            break;
        };
        match escape {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => out.push('\0'),
            'x' => match take_hex(&mut chars, 2).and_then(char::from_u32) {
                Some(ch) => out.push(ch),
                None => out.push('x'),
            },
            'u' => match take_code_point(&mut chars) {
                Some(ch) => out.push(ch),
                None => out.push('u'),
            },
            other => out.push(other),
        }
    }
    out
}

/// Exactly `digits` hex digits; `chars` is left untouched when they are not there.
fn take_hex(chars: &mut Chars<'_>, digits: usize) -> Option<u32> {
    let mut ahead = chars.clone();
    let mut value = 0;
    for _ in 0..digits {
        value = value * 16 + ahead.next()?.to_digit(16)?;
    }
    *chars = ahead;
    Some(value)
}

/// The part of a `\u` escape after the `u`: `{X..}` or `XXXX`, joining
/// a following low surrogate escape when there is one.
fn take_code_point(chars: &mut Chars<'_>) -> Option<char> {
    let mut ahead = chars.clone();
    if ahead.next() == Some('{') {
        let mut value: u32 = 0;
        let mut digits = 0;
        loop {
            let c = ahead.next()?;
            if c == '}' {
                break;
            }
            value = value.checked_mul(16)?.checked_add(c.to_digit(16)?)?;
            digits += 1;
        }
        let ch = char::from_u32(value).filter(|_| digits > 0)?;
        *chars = ahead;
        return Some(ch);
    }

    let unit = take_hex(chars, 4)?;
    if !(0xD800..0xDC00).contains(&unit) {
        return Some(char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER));
    }
    let mut ahead = chars.clone();
    let low = match (ahead.next(), ahead.next()) {
        (Some('\\'), Some('u')) => {
            take_hex(&mut ahead, 4).filter(|low| (0xDC00..0xE000).contains(low))
        }
        _ => None,
    };
    let Some(low) = low else {
        return Some(char::REPLACEMENT_CHARACTER);
    };
    *chars = ahead;
    let combined = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
    Some(char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER))
}

/// Plugin state from the live page, falling back to the page source.
pub fn fetch_page_state(page: &dyn Page, html: &str) -> Map<String, Value> {
    let sources: [&dyn StateSource; 2] = [&LiveGlobalState, &EmbeddedLiteralState];
    sources
        .iter()
        .find_map(|source| {
            let state = source.fetch(page, html)?;
            debug!(source = source.name(), keys = state.len(), "Plugin state found");
            Some(state)
        })
        .unwrap_or_default()
}
