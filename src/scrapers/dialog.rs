use crate::parse::{css, element_text};
use crate::scrapers::ScrapeContext;
use scraper::{ElementRef, Html};
use std::time::Duration;
use tracing::debug;

const DIALOG_ROOTS: &str = "#app-layer-property-content-section-detailed-dialog-spaces, \
     #app-layer-property-content-section-detailed-dialog-amenities-section-0, \
     div[role='dialog']";

const DIALOG_TIMEOUT: Duration = Duration::from_secs(8);

/// Which detail dialog is open; decides the close button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    Amenities,
    Spaces,
}

impl DialogKind {
    fn close_selector(&self) -> &'static str {
        match self {
            Self::Amenities => {
                "#app-layer-property-content-section-detailed-dialog-amenities-section-0 button"
            }
            Self::Spaces => "#app-layer-property-content-section-detailed-dialog-spaces button",
        }
    }
}

/// Open the dialog behind the button whose text has every keyword.
fn open_dialog(ctx: &ScrapeContext<'_>, keywords: &[&str]) -> bool {
    let lowered: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    let Ok(buttons) = ctx.page.elements("button") else {
        return false;
    };
    let Some(index) = buttons.iter().position(|button| {
        let text = button.text.to_lowercase();
        !text.is_empty() && lowered.iter().all(|k| text.contains(k.as_str()))
    }) else {
        debug!(?keywords, "No dialog trigger button");
        return false;
    };

    if let Err(err) = ctx.page.click("button", index) {
        debug!(?keywords, error = %err, "Dialog trigger click failed");
        return false;
    }
    ctx.page.wait_for(DIALOG_ROOTS, DIALOG_TIMEOUT)
}

fn close_dialog(ctx: &ScrapeContext<'_>, kind: DialogKind) {
    if ctx.page.click(kind.close_selector(), 0).is_err() {
        let _ = ctx.page.press_escape();
    }
    ctx.pause(ctx.settings.pacing.after_dialog);
}

/// Open a dialog, parse the items inside it, and close it again.
///
/// Any failure along the way yields an empty list.
pub fn collect_from_dialog<T, F>(
    ctx: &ScrapeContext<'_>,
    keywords: &[&str],
    item_selector: &str,
    kind: DialogKind,
    parse: F,
) -> Vec<T>
where
    F: Fn(ElementRef<'_>) -> Option<T>,
{
    if !open_dialog(ctx, keywords) {
        return Vec::new();
    }

    let items = match ctx.page.content() {
        Ok(html) => {
            let document = Html::parse_document(&html);
            let root = css(DIALOG_ROOTS).and_then(|sel| document.select(&sel).next());
            match (root, css(item_selector)) {
                (Some(root), Some(items)) => root.select(&items).filter_map(&parse).collect(),
                _ => Vec::new(),
            }
        }
        Err(err) => {
            debug!(error = %err, "Could not read dialog content");
            Vec::new()
        }
    };

    close_dialog(ctx, kind);
    items
}

/// Plain text of each dialog item.
pub fn text_item(element: ElementRef<'_>) -> Option<String> {
    element_text(element)
}
