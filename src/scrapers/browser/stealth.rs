//! Chrome flags, fingerprint patches and humanization timings for browser rungs.

use crate::escalation::DelayRange;

/// Flags for every browser launch.
pub const BASE_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--no-first-run",
    "--no-default-browser-check",
    "--ignore-certificate-errors",
];

/// Extra flags that hide automation from the page.
pub const STEALTH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--disable-extensions",
    "--disable-component-extensions-with-background-pages",
    "--disable-features=TranslateUI,Translate,BlinkGenPropertyTrees",
    "--disable-ipc-flooding-protection",
    "--disable-background-networking",
    "--disable-sync",
    "--disable-accelerated-2d-canvas",
    "--force-color-profile=srgb",
    "--metrics-recording-only",
    "--lang=en-US",
];

/// Request headers a real Chrome on Windows sends on a top-level navigation.
pub const STEALTH_HEADERS: &[(&str, &str)] = &[
    ("Accept-Language", "en-US,en;q=0.9"),
    ("Cache-Control", "max-age=0"),
    ("Sec-Ch-Ua", "\"Chromium\";v=\"131\", \"Not_A Brand\";v=\"24\", \"Google Chrome\";v=\"131\""),
    ("Sec-Ch-Ua-Mobile", "?0"),
    ("Sec-Ch-Ua-Platform", "\"Windows\""),
    ("Upgrade-Insecure-Requests", "1"),
];

/// Fingerprint patches installed before any page script runs.
pub const STEALTH_SCRIPTS: &[&str] = &[
    // navigator.webdriver
    r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined,
        configurable: true
    });
    "#,
    // window.chrome exists in a real Chrome
    r#"
    window.chrome = window.chrome || {
        runtime: {},
        loadTimes: function() {},
        csi: function() {},
        app: {}
    };
    "#,
    // Notification permission query
    r#"
    if (window.navigator.permissions) {
        const originalQuery = window.navigator.permissions.query;
        window.navigator.permissions.query = (parameters) => (
            parameters.name === 'notifications' ?
            Promise.resolve({ state: Notification.permission }) :
            originalQuery(parameters)
        );
    }
    "#,
    // Plugins
    r#"
    Object.defineProperty(navigator, 'plugins', {
        get: () => [
            { name: 'PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
            { name: 'Chrome PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
            { name: 'Chromium PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' }
        ],
        configurable: true
    });
    "#,
    // Languages
    r#"
    Object.defineProperty(navigator, 'languages', {
        get: () => ['en-US', 'en'],
        configurable: true
    });
    "#,
    // ChromeDriver leftovers
    r#"
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Array;
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Promise;
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Symbol;
    "#,
    // WebGL vendor/renderer
    r#"
    if (window.WebGLRenderingContext) {
        const getParameter = WebGLRenderingContext.prototype.getParameter;
        WebGLRenderingContext.prototype.getParameter = function(parameter) {
            if (parameter === 37445) return 'Intel Inc.';
            if (parameter === 37446) return 'Intel Iris OpenGL Engine';
            return getParameter.call(this, parameter);
        };
    }
    "#,
];

/// Scroll a little, then a little further after a random beat.
pub const SCROLL_SCRIPT: &str = r#"
    (() => {
        window.scrollTo(0, Math.floor(Math.random() * 200));
        setTimeout(() => window.scrollTo(0, Math.floor(Math.random() * 500)), 300 + Math.floor(Math.random() * 700));
        return true;
    })()
"#;

/// Pointer coordinates are drawn from this range on both axes.
pub const POINTER_MIN: f64 = 100.0;
pub const POINTER_MAX: f64 = 500.0;

/// Wait after navigation before touching the page.
pub const SETTLE_WAIT: DelayRange = DelayRange {
    min_ms: 2000,
    max_ms: 4000,
};

/// Wait after the post-navigation pointer move.
pub const POINTER_WAIT: DelayRange = DelayRange {
    min_ms: 500,
    max_ms: 1500,
};

/// Wait after scrolling, before extraction.
pub const SCROLL_WAIT: DelayRange = DelayRange {
    min_ms: 1000,
    max_ms: 3000,
};
