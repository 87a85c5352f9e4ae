//! Run configuration.
//!
//! [`Config`] holds the credentials and the two user-facing knobs of a run.
//! It is an explicit value handed to [`Pipeline::from_config`]; nothing in
//! the library reads the process environment.
//!
//! [`Pipeline::from_config`]: crate::Pipeline::from_config

use crate::sheets::ServiceAccountKey;

pub const DEFAULT_MIN_SCORE: u8 = 7;
pub const DEFAULT_MAX_CONCURRENT_SCRAPES: usize = 5;

/// Credentials and limits for one pipeline run.
///
/// # Example
///
/// ```rust
/// use leadgen_core::Config;
///
/// let config = Config::new("serp-key", "llm-key").min_score(8);
/// assert!(config.validate(false).is_empty());
/// assert!(!config.sheets_enabled());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub serpapi_key: String,
    pub llm_api_key: String,
    pub hunter_key: Option<String>,
    pub sheet_id: Option<String>,
    /// Service-account key file contents.
    pub sheets_credentials: Option<String>,
    pub min_score: u8,
    pub max_concurrent_scrapes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serpapi_key: String::new(),
            llm_api_key: String::new(),
            hunter_key: None,
            sheet_id: None,
            sheets_credentials: None,
            min_score: DEFAULT_MIN_SCORE,
            max_concurrent_scrapes: DEFAULT_MAX_CONCURRENT_SCRAPES,
        }
    }
}

impl Config {
    pub fn new(serpapi_key: impl Into<String>, llm_api_key: impl Into<String>) -> Self {
        Self { serpapi_key: serpapi_key.into(), llm_api_key: llm_api_key.into(), ..Default::default() }
    }

    pub fn hunter_key(mut self, key: impl Into<String>) -> Self {
        self.hunter_key = Some(key.into());
        self
    }

    pub fn sheets(mut self, sheet_id: impl Into<String>, credentials: impl Into<String>) -> Self {
        self.sheet_id = Some(sheet_id.into());
        self.sheets_credentials = Some(credentials.into());
        self
    }

    pub fn min_score(mut self, value: u8) -> Self {
        self.min_score = value;
        self
    }

    pub fn max_concurrent_scrapes(mut self, value: usize) -> Self {
        self.max_concurrent_scrapes = value;
        self
    }

    /// Both a sheet id and credentials are present.
    pub fn sheets_enabled(&self) -> bool {
        non_empty(&self.sheet_id).is_some() && non_empty(&self.sheets_credentials).is_some()
    }

    /// Hunter key, if set and non-empty.
    pub fn enrichment_key(&self) -> Option<&str> {
        non_empty(&self.hunter_key)
    }

    /// Human-readable problems; empty when the configuration can run.
    pub fn validate(&self, require_sheets: bool) -> Vec<String> {
        let mut problems = Vec::new();

        if self.serpapi_key.trim().is_empty() {
            problems.push("SERPAPI_KEY is not set".to_string());
        }
        if self.llm_api_key.trim().is_empty() {
            problems.push("OPENROUTER_KEY is not set".to_string());
        }
        if self.max_concurrent_scrapes == 0 {
            problems.push("MAX_CONCURRENT must be at least 1".to_string());
        }
        if self.min_score > 10 {
            problems.push(format!("MIN_SCORE must be between 0 and 10, got {}", self.min_score));
        }

        if require_sheets {
            if non_empty(&self.sheet_id).is_none() {
                problems.push("SHEET_ID is not set".to_string());
            }
            match non_empty(&self.sheets_credentials) {
                None => problems.push("Google service account credentials are not set".to_string()),
                Some(payload) => {
                    if let Err(e) = ServiceAccountKey::from_json(payload) {
                        problems.push(e.to_string());
                    }
                }
            }
        }

        problems
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
