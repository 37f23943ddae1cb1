use crate::config::{ChallengeMode, Settings};
use crate::scrapers::traits::{ChallengeResolver, Resolution};
use std::io::{self, BufRead, BufReader};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;
use tracing::warn;

const BLOCK_MARKERS: &[&str] = &["show us your human side", "access denied"];

/// Whether the page source is an anti-bot challenge rather than content.
pub fn is_blocked(html: &str) -> bool {
    let lowered = html.to_lowercase();
    BLOCK_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Waits for Enter on stdin while someone solves the challenge in the browser.
///
/// One reader thread lives as long as the resolver; lines typed while no
/// challenge is pending are discarded before the next wait.
pub struct ConsoleResolver {
    lines: Receiver<()>,
}

impl ConsoleResolver {
    pub fn new() -> Self {
        Self::from_lines(spawn_line_reader(BufReader::new(io::stdin())))
    }

    fn from_lines(lines: Receiver<()>) -> Self {
        Self { lines }
    }
}

/// Forward one signal per line read; stops at end of input.
fn spawn_line_reader<R>(reader: R) -> Receiver<()>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in reader.lines() {
            if line.is_err() || tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

impl ChallengeResolver for ConsoleResolver {
    fn await_resolution(&self, timeout: Option<Duration>) -> Resolution {
        while self.lines.try_recv().is_ok() {}
        warn!("Page blocked; solve the captcha in the browser and press Enter");
        let received = match timeout {
            Some(limit) => self.lines.recv_timeout(limit).is_ok(),
            None => self.lines.recv().is_ok(),
        };
        if received {
            Resolution::Resolved
        } else {
            warn!(timeout_secs = timeout.map(|t| t.as_secs()), "Challenge not resolved in time");
            Resolution::TimedOut
        }
    }
}

/// Never waits; for unattended runs
pub struct SkipResolver;

impl ChallengeResolver for SkipResolver {
    fn await_resolution(&self, _timeout: Option<Duration>) -> Resolution {
        warn!("Page blocked; skipping (unattended mode)");
        Resolution::TimedOut
    }
}

pub fn resolver_for(settings: &Settings) -> Box<dyn ChallengeResolver + Send> {
    match settings.challenge_mode {
        ChallengeMode::Manual => Box::new(ConsoleResolver::new()),
        ChallengeMode::Skip => Box::new(SkipResolver),
    }
}
