//! Headless Chrome for the rendered and stealth rungs and the rendered probe.
//!
//! Uses chromiumoxide (CDP). Every fetch launches its own browser and
//! closes it afterwards; instances are never shared between URLs.

mod stealth;

#[cfg(feature = "browser")]
mod session;

#[cfg(feature = "browser")]
pub use session::BrowserSession;
pub use stealth::{POINTER_WAIT, SCROLL_WAIT, SETTLE_WAIT};

use std::path::{Path, PathBuf};

use tracing::info;

use super::extract::PageFields;
use super::FetchError;
use crate::config::Settings;

/// Common Chrome executable paths to check.
const CHROME_PATHS: &[&str] = &[
    // Linux
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    // macOS
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    // Common install locations
    "/opt/google/chrome/google-chrome",
];

const CHROME_COMMANDS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];

/// Launch options shared by all browser fetches.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub chrome_args: Vec<String>,
    /// Hide automation fingerprints and send browser-like headers.
    pub stealth: bool,
    /// Each launch gets a throwaway profile directory under this root.
    pub profile_root: PathBuf,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            chrome_args: Vec::new(),
            stealth: false,
            profile_root: std::env::temp_dir(),
        }
    }
}

impl BrowserOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            headless: settings.headless,
            chrome_path: settings.chrome_path.clone(),
            chrome_args: settings.chrome_args.clone(),
            ..Self::default()
        }
    }

    pub fn with_stealth(mut self, stealth: bool) -> Self {
        self.stealth = stealth;
        self
    }
}

/// Where a navigation ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub status: u16,
    pub final_url: String,
}

/// Page HTML and extracted fields.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub html: String,
    pub fields: PageFields,
}

/// Find a Chrome executable: the configured path, well-known locations, then PATH.
pub fn find_chrome(configured: Option<&Path>) -> Result<PathBuf, FetchError> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(FetchError::Browser(format!(
            "configured Chrome not found at {}",
            path.display()
        )));
    }

    for path in CHROME_PATHS {
        let p = Path::new(path);
        if p.exists() {
            info!("Found Chrome at: {}", path);
            return Ok(p.to_path_buf());
        }
    }

    for cmd in CHROME_COMMANDS {
        if let Ok(path) = which::which(cmd) {
            info!("Found Chrome in PATH: {}", path.display());
            return Ok(path);
        }
    }

    Err(FetchError::Browser(
        "Chrome/Chromium not found. Install it or set chrome_path in the config".to_string(),
    ))
}

/// Stand-in used when built without the `browser` feature. It never launches.
#[cfg(not(feature = "browser"))]
pub struct BrowserSession {
    never: std::convert::Infallible,
}

#[cfg(not(feature = "browser"))]
impl BrowserSession {
    pub async fn launch(
        _options: &BrowserOptions,
        _proxy: Option<&str>,
        _user_agent: &str,
        _cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<Self, FetchError> {
        Err(FetchError::Browser(
            "browser support not compiled. Rebuild with: cargo build --features browser"
                .to_string(),
        ))
    }

    pub async fn navigate(
        &self,
        _url: &str,
        _timeout: std::time::Duration,
    ) -> Result<Navigation, FetchError> {
        match self.never {}
    }

    pub async fn snapshot(&self) -> Result<PageSnapshot, FetchError> {
        match self.never {}
    }

    pub async fn move_pointer(&self) {
        match self.never {}
    }

    pub async fn scroll(&self) {
        match self.never {}
    }

    pub async fn screenshot(&self, _path: &Path) -> Result<(), FetchError> {
        match self.never {}
    }

    pub async fn close(self) {
        match self.never {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_configured_chrome_is_an_error() {
        let result = find_chrome(Some(Path::new("/nonexistent/chrome-binary")));
        assert!(matches!(result, Err(FetchError::Browser(_))));
    }

    #[test]
    fn test_options_from_settings() {
        let mut settings = Settings::default();
        settings.headless = false;
        settings.chrome_args = vec!["--mute-audio".to_string()];
        let options = BrowserOptions::from_settings(&settings).with_stealth(true);
        assert!(!options.headless);
        assert!(options.stealth);
        assert_eq!(options.chrome_args, vec!["--mute-audio"]);
    }
}
