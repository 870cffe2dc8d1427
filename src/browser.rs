//! Opening booking pages
//!
//! The resolver never opens anything itself; it is handed a [`Navigator`].
//! [`SystemBrowser`] is the real one, tests supply fakes.

use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// Result of a single attempt to open a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    Opened,
    /// Popup blocked, launcher missing, or the window closed immediately.
    Blocked,
}

impl NavigationOutcome {
    pub fn is_opened(self) -> bool {
        self == NavigationOutcome::Opened
    }
}

/// Capability to open a URL in a new browsing context.
pub trait Navigator {
    fn open(&mut self, url: &str) -> NavigationOutcome;
}

impl<N: Navigator + ?Sized> Navigator for &mut N {
    fn open(&mut self, url: &str) -> NavigationOutcome {
        (**self).open(url)
    }
}

/// Opens URLs with the platform's default browser launcher.
///
/// `$BROWSER` takes precedence when set. A launcher that cannot be spawned or
/// exits unsuccessfully counts as blocked.
#[derive(Debug, Clone)]
pub struct SystemBrowser {
    browser_override: Option<String>,
}

impl SystemBrowser {
    pub fn new() -> Self {
        Self {
            browser_override: std::env::var("BROWSER").ok().filter(|b| !b.trim().is_empty()),
        }
    }

    /// Use a specific launcher program instead of the platform default.
    pub fn with_launcher(program: impl Into<String>) -> Self {
        Self {
            browser_override: Some(program.into()),
        }
    }

    fn command(&self, url: &str) -> Command {
        if let Some(program) = &self.browser_override {
            let mut cmd = Command::new(program);
            cmd.arg(url);
            return cmd;
        }

        if cfg!(target_os = "macos") {
            let mut cmd = Command::new("open");
            cmd.arg(url);
            cmd
        } else if cfg!(target_os = "windows") {
            let mut cmd = Command::new("rundll32");
            cmd.args(["url.dll,FileProtocolHandler", url]);
            cmd
        } else {
            let mut cmd = Command::new("xdg-open");
            cmd.arg(url);
            cmd
        }
    }
}

impl Default for SystemBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl Navigator for SystemBrowser {
    fn open(&mut self, url: &str) -> NavigationOutcome {
        let mut cmd = self.command(url);
        debug!(program = ?cmd.get_program(), url = url, "Launching browser");

        match cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) if status.success() => NavigationOutcome::Opened,
            Ok(status) => {
                warn!(status = %status, url = url, "Browser launcher exited unsuccessfully");
                NavigationOutcome::Blocked
            }
            Err(e) => {
                warn!(error = %e, url = url, "Failed to launch browser");
                NavigationOutcome::Blocked
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_launcher_is_blocked() {
        let mut browser = SystemBrowser::with_launcher("flight-tracker-no-such-launcher");
        assert_eq!(browser.open("https://www.google.com/travel/flights"), NavigationOutcome::Blocked);
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_launcher_is_opened() {
        let mut browser = SystemBrowser::with_launcher("true");
        assert!(browser.open("https://www.google.com/travel/flights").is_opened());
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_launcher_is_blocked() {
        let mut browser = SystemBrowser::with_launcher("false");
        assert!(!browser.open("https://www.google.com/travel/flights").is_opened());
    }

    #[test]
    fn test_navigator_through_mut_reference() {
        struct Counter(usize);
        impl Navigator for Counter {
            fn open(&mut self, _url: &str) -> NavigationOutcome {
                self.0 += 1;
                NavigationOutcome::Opened
            }
        }

        fn open_twice<N: Navigator>(mut navigator: N) {
            navigator.open("https://example.com");
            navigator.open("https://example.com");
        }

        let mut counter = Counter(0);
        open_twice(&mut counter);
        assert_eq!(counter.0, 2);
    }
}
