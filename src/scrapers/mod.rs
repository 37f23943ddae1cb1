pub mod browser;
pub mod challenge;
pub mod detail;
pub mod dialog;
pub mod search;
pub mod state;
pub mod traits;
pub mod types;

#[cfg(test)]
pub mod fake;

pub use browser::BrowserSession;
pub use traits::{ChallengeResolver, Page, Resolution};

use crate::config::Settings;
use std::thread;
use std::time::Duration;

/// Shared handles for one scraping pass
pub struct ScrapeContext<'a> {
    pub page: &'a dyn Page,
    pub settings: &'a Settings,
    pub resolver: &'a dyn ChallengeResolver,
}

impl ScrapeContext<'_> {
    pub fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }

    /// Hand a blocked page to the challenge policy.
    pub fn resolve_challenge(&self) -> Resolution {
        self.resolver
            .await_resolution(self.settings.challenge_timeout)
    }
}
