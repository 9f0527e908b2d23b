use crate::config::country::resolve_country;
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Main configuration structure for beforward-daily
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub fetcher: FetcherConfig,
    pub images: ImageConfig,
    pub output: OutputConfig,
    pub post: PostConfig,
    pub server: ServerConfig,
}

/// Stock list location and crawl bounds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Site root, used for index URLs and for resolving relative links
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Stock location, either a country name or a numeric stock code
    pub country: String,

    /// Listings shown per index page, used for the total estimate
    #[serde(rename = "page-size")]
    pub page_size: u32,

    /// Hard ceiling on the number of index pages walked per run
    #[serde(rename = "max-pages")]
    pub max_pages: u32,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.beforward.jp".to_string(),
            country: "uae".to_string(),
            page_size: 25,
            max_pages: 150,
        }
    }
}

impl SiteConfig {
    /// Numeric `stock_country` code for the configured country
    pub fn country_code(&self) -> Result<u32, ConfigError> {
        resolve_country(&self.country)
            .ok_or_else(|| ConfigError::UnknownCountry(self.country.clone()))
    }

    /// Parsed site root
    pub fn base(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid base-url '{}': {}", self.base_url, e))
        })
    }

    /// URL of a stock list page (1-based)
    ///
    /// Page 1 has no `page=` segment, later pages put it before the country.
    pub fn stock_page_url(&self, page: u32) -> Result<Url, ConfigError> {
        let code = self.country_code()?;
        let root = self.base_url.trim_end_matches('/');
        let url = if page <= 1 {
            format!("{root}/stocklist/stock_country={code}/sortkey=n")
        } else {
            format!("{root}/stocklist/page={page}/stock_country={code}/sortkey=n")
        };
        Url::parse(&url).map_err(|e| ConfigError::InvalidUrl(format!("{url}: {e}")))
    }
}

/// HTTP fetching behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Attempts per URL before giving up
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Lower bound of the pause after each successful fetch (milliseconds)
    #[serde(rename = "min-delay-ms")]
    pub min_delay_ms: u64,

    /// Upper bound of the pause after each successful fetch (milliseconds)
    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    /// Backoff before the second attempt, doubled for each further attempt (milliseconds)
    #[serde(rename = "backoff-base-ms")]
    pub backoff_base_ms: u64,

    /// User-Agent header sent with every request
    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout_secs: 30,
            min_delay_ms: 1000,
            max_delay_ms: 3000,
            backoff_base_ms: 1000,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
        }
    }
}

impl FetcherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// How vehicle photos are retrieved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImageMode {
    /// One request per photo
    #[default]
    Individual,
    /// The "download all images" archive, expanded locally
    Zip,
}

impl ImageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Zip => "zip",
        }
    }
}

impl fmt::Display for ImageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "individual" => Ok(Self::Individual),
            "zip" => Ok(Self::Zip),
            other => Err(ConfigError::Validation(format!(
                "image mode must be 'individual' or 'zip', got '{other}'"
            ))),
        }
    }
}

/// Photo retrieval and watermark cropping
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub mode: ImageMode,

    /// Crop the watermark strip off the bottom of each photo
    pub crop: bool,

    /// Share of the image height removed from the bottom
    #[serde(rename = "crop-percentage")]
    pub crop_percentage: u32,

    /// JPEG quality used when re-encoding cropped photos
    #[serde(rename = "crop-quality")]
    pub crop_quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            mode: ImageMode::Individual,
            crop: true,
            crop_percentage: 7,
            crop_quality: 95,
        }
    }
}

/// Output locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// One folder per processed vehicle is created here
    #[serde(rename = "vehicles-dir")]
    pub vehicles_dir: PathBuf,

    /// Durable crawl state (JSON)
    #[serde(rename = "state-path")]
    pub state_path: PathBuf,

    /// SQLite run history
    #[serde(rename = "history-path")]
    pub history_path: PathBuf,

    /// Vehicles already handed to the posting webhook (JSON)
    #[serde(rename = "posted-path")]
    pub posted_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            vehicles_dir: PathBuf::from("./output/vehicles"),
            state_path: PathBuf::from("./state/scraper_state.json"),
            history_path: PathBuf::from("./state/history.db"),
            posted_path: PathBuf::from("./state/posted_vehicles.json"),
        }
    }
}

/// Social post template settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostConfig {
    pub intro: String,

    /// Appended to the location line, e.g. "Dubai, UAE"
    #[serde(rename = "location-suffix")]
    pub location_suffix: Option<String>,

    /// Always-present hashtags
    pub hashtags: Vec<String>,
}

impl Default for PostConfig {
    fn default() -> Self {
        Self {
            intro: "Check out this amazing deal from BE FORWARD!".to_string(),
            location_suffix: Some("UAE".to_string()),
            hashtags: ["#BEFORWARD", "#Japanesecars", "#Dubai", "#UAE"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// HTTP API settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,

    /// Upper bound on one triggered run (seconds)
    #[serde(rename = "run-timeout-secs")]
    pub run_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            run_timeout_secs: 300,
        }
    }
}
