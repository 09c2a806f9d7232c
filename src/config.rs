use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SERVICE_URL: &str = "https://ytmp3.as/cyPH/";
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/143.0.0.0 Safari/537.36";
/// Folder that holds the dated per-run output folders
pub const DEFAULT_SAVE_ROOT: &str = "saved";

const DEFAULT_CONVERSION_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_DRIVER_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CHUNK_SIZE: usize = 1024;

/// WebDriver connection settings
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    /// Run without a visible window
    pub headless: bool,
    /// Launch `chromedriver` ourselves instead of expecting one to be running
    pub spawn_driver: bool,
    pub driver_binary: PathBuf,
    pub driver_startup_timeout: Duration,
    /// Extra wait after `document.readyState` reports complete
    pub settle_delay: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            headless: true,
            spawn_driver: false,
            driver_binary: PathBuf::from("chromedriver"),
            driver_startup_timeout: DEFAULT_DRIVER_STARTUP_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

impl BrowserConfig {
    /// Port of the WebDriver URL, used when spawning the driver
    pub fn driver_port(&self) -> u16 {
        url::Url::parse(&self.webdriver_url)
            .ok()
            .and_then(|u| u.port_or_known_default())
            .unwrap_or(9515)
    }
}

/// HTTP settings for fetching converted files
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Write buffer size for streamed downloads
    pub chunk_size: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Everything a session needs besides its inputs
#[derive(Debug, Clone)]
pub struct Config {
    pub service_url: String,
    pub conversion_timeout: Duration,
    pub poll_interval: Duration,
    pub browser: BrowserConfig,
    pub fetch: FetchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            conversion_timeout: DEFAULT_CONVERSION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            browser: BrowserConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

impl Config {
    pub fn with_service_url(mut self, url: impl Into<String>) -> Self {
        self.service_url = url.into();
        self
    }

    pub fn with_conversion_timeout(mut self, timeout: Duration) -> Self {
        self.conversion_timeout = timeout;
        self
    }

    pub fn with_browser(mut self, browser: BrowserConfig) -> Self {
        self.browser = browser;
        self
    }
}

/// Default output folder: `{root}/{YYYY-MM-DD} #{n}` where `n` counts the
/// folders already created today.
pub fn default_destination(root: &Path) -> PathBuf {
    let today = chrono::Local::now().date_naive().to_string();
    let n = next_folder_number(root, &today);
    root.join(format!("{} #{}", today, n))
}

fn next_folder_number(root: &Path, date: &str) -> usize {
    let Ok(entries) = std::fs::read_dir(root) else {
        return 0;
    };
    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(date))
        .count()
}
