//! Local-business search.
//!
//! Queries a Google Maps search provider (SerpAPI) for a business type in a
//! city and normalizes the provider's nested, shape-shifting JSON into
//! [`Lead`] records.

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, error};

use crate::lead::Lead;
use crate::site::{extract_domain, is_directory_site};
use crate::{LeadgenError, Result};

pub const SERPAPI_URL: &str = "https://serpapi.com/search";

/// Results requested per query.
pub const RESULTS_PER_QUERY: u32 = 20;

const SEARCH_TIMEOUT_SECS: u64 = 30;

/// Cities recognised when splitting free-text queries.
pub const KNOWN_CITIES: &[&str] = &[
    "Mumbai",
    "Delhi",
    "Bangalore",
    "Chennai",
    "Hyderabad",
    "Pune",
    "Ahmedabad",
    "Jaipur",
    "Surat",
    "Lucknow",
    "Indore",
    "Bhopal",
    "Nagpur",
    "Vadodara",
    "Chandigarh",
    "Kochi",
    "Thane",
    "Noida",
    "Gurgaon",
    "Coimbatore",
    "Ernakulam",
    "Kolkata",
    "Patna",
];

/// Search targets used when a run is started without queries.
pub const DEFAULT_QUERIES: &[(&str, &str)] = &[
    ("wedding planner", "Mumbai"),
    ("skin clinic", "Hyderabad"),
    ("dental clinic", "Pune"),
    ("fitness center", "Bangalore"),
    ("interior designer", "Delhi"),
    ("ca firm", "Chennai"),
    ("photography studio", "Jaipur"),
    ("event management", "Kochi"),
    ("restaurant", "Indore"),
    ("coaching institute", "Lucknow"),
];

static PHONE_JUNK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s\-()]").unwrap());
static STANDALONE_IN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bin\b").unwrap());

/// One (business type, city) search target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub business_type: String,
    pub city: String,
}

impl SearchQuery {
    pub fn new(business_type: impl Into<String>, city: impl Into<String>) -> Self {
        Self { business_type: business_type.into(), city: city.into() }
    }

    /// Splits free text such as `"dental clinic in Pune"` using the known
    /// city list. Unknown cities leave `city` empty and the whole text as
    /// the business type.
    pub fn parse(text: &str) -> Self {
        let lower = text.to_lowercase();
        for city in KNOWN_CITIES {
            if lower.contains(&city.to_lowercase()) {
                let without_city = replace_case_insensitive(text, city);
                let business_type = STANDALONE_IN_RE.replace_all(&without_city, "");
                let business_type = business_type.split_whitespace().collect::<Vec<_>>().join(" ");
                return Self::new(business_type, *city);
            }
        }
        Self::new(text.trim(), "")
    }

    /// The free-text form sent to the provider.
    pub fn text(&self) -> String {
        if self.city.is_empty() { self.business_type.clone() } else { format!("{} in {}", self.business_type, self.city) }
    }

    pub fn defaults() -> Vec<SearchQuery> {
        DEFAULT_QUERIES.iter().map(|(kind, city)| SearchQuery::new(*kind, *city)).collect()
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

impl From<(&str, &str)> for SearchQuery {
    fn from((business_type, city): (&str, &str)) -> Self {
        Self::new(business_type, city)
    }
}

/// A local-business directory that can be searched.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Returns normalized leads; provider failures yield an empty list.
    async fn search(&self, query: &SearchQuery) -> Vec<Lead>;
}

/// SerpAPI `google_maps` engine client.
#[derive(Clone)]
pub struct SerpApiClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl SerpApiClient {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self { client, api_key: api_key.into(), endpoint: SERPAPI_URL.to_string() }
    }

    /// Points the client at a different endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Performs the request and returns the raw provider JSON.
    pub async fn fetch_raw(&self, query: &SearchQuery) -> Result<Value> {
        let text = query.text();
        let num = RESULTS_PER_QUERY.to_string();
        let params = [
            ("engine", "google_maps"),
            ("q", text.as_str()),
            ("type", "search"),
            ("num", num.as_str()),
            ("api_key", self.api_key.as_str()),
            ("hl", "en"),
            ("gl", "in"),
        ];

        debug!(query = %text, "SerpAPI request");

        let resp = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .timeout(Duration::from_secs(SEARCH_TIMEOUT_SECS))
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(LeadgenError::Api { status: status.as_u16(), message: body });
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl SearchProvider for SerpApiClient {
    async fn search(&self, query: &SearchQuery) -> Vec<Lead> {
        match self.fetch_raw(query).await {
            Ok(data) => parse_results(&data, query),
            Err(e) => {
                error!(query = %query, error = %e, "SerpAPI search failed");
                Vec::new()
            }
        }
    }
}

/// Locates the list of places in any of the known response shapes:
/// `local_results` as an array, `local_results.places`, or `places_results`.
fn result_entries(data: &Value) -> Vec<&Value> {
    let candidates = [
        data.get("local_results").and_then(Value::as_array),
        data.get("local_results").and_then(|v| v.get("places")).and_then(Value::as_array),
        data.get("places_results").and_then(Value::as_array),
    ];

    candidates
        .into_iter()
        .flatten()
        .find(|entries| !entries.is_empty())
        .map(|entries| entries.iter().collect())
        .unwrap_or_default()
}

/// Normalizes a provider response into leads for `query`.
///
/// Entries without a name of at least three characters are dropped, as are
/// repeats of a name already seen in this response.
pub fn parse_results(data: &Value, query: &SearchQuery) -> Vec<Lead> {
    let mut seen = HashSet::new();
    let mut leads = Vec::new();

    for place in result_entries(data) {
        let name = str_field(place, &["title", "name"]).trim().to_string();
        if name.chars().count() < 3 {
            continue;
        }

        let key: String = name.to_lowercase().chars().filter(|c| c.is_ascii_alphanumeric()).collect();
        if !seen.insert(key) {
            continue;
        }

        let raw_url = str_field(place, &["website", "link"]).to_string();
        let website =
            if !raw_url.is_empty() && !is_directory_site(&raw_url) { extract_domain(&raw_url) } else { String::new() };

        let mut lead = Lead::named(name);
        lead.website = website;
        lead.raw_url = raw_url;
        lead.phone = PHONE_JUNK_RE.replace_all(str_field(place, &["phone"]), "").to_string();
        lead.city = query.city.clone();
        lead.business_type = query.business_type.clone();
        lead.address = str_field(place, &["address"]).to_string();
        lead.google_rating = place.get("rating").and_then(Value::as_f64);
        lead.google_reviews = ["reviews", "reviews_count"]
            .iter()
            .find_map(|field| place.get(*field).and_then(Value::as_u64))
            .unwrap_or(0);
        lead.raw_snippet = str_field(place, &["type", "description"]).to_string();

        leads.push(lead);
    }

    leads
}

/// First non-empty string among `fields`.
fn str_field<'a>(place: &'a Value, fields: &[&str]) -> &'a str {
    fields
        .iter()
        .filter_map(|field| place.get(*field).and_then(Value::as_str))
        .find(|value| !value.is_empty())
        .unwrap_or("")
}

fn replace_case_insensitive(text: &str, needle: &str) -> String {
    match Regex::new(&format!("(?i){}", regex::escape(needle))) {
        Ok(re) => re.replace_all(text, "").to_string(),
        Err(_) => text.to_string(),
    }
}
