//! Contact enrichment via Hunter.io domain search.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{LeadgenError, Result};

pub const HUNTER_URL: &str = "https://api.hunter.io/v2/domain-search";

const HUNTER_LIMIT: u32 = 3;
const HUNTER_TIMEOUT_SECS: u64 = 10;

/// Best contact found for a domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub email: String,
    pub contact_name: String,
}

/// Best-effort email lookup. `None` covers both "nothing found" and failures.
#[async_trait]
pub trait EmailFinder: Send + Sync {
    async fn lookup_email(&self, domain: &str) -> Option<Contact>;
}

#[derive(Debug, Deserialize)]
struct DomainSearch {
    #[serde(default)]
    data: DomainData,
}

#[derive(Debug, Default, Deserialize)]
struct DomainData {
    #[serde(default)]
    emails: Vec<HunterEmail>,
}

#[derive(Debug, Deserialize)]
struct HunterEmail {
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

impl From<HunterEmail> for Contact {
    fn from(e: HunterEmail) -> Self {
        let name = format!("{} {}", e.first_name.unwrap_or_default(), e.last_name.unwrap_or_default());
        Contact { email: e.value.unwrap_or_default(), contact_name: name.trim().to_string() }
    }
}

#[derive(Clone)]
pub struct HunterClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl HunterClient {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self { client, api_key: api_key.into(), endpoint: HUNTER_URL.to_string() }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn domain_search(&self, domain: &str) -> Result<Option<Contact>> {
        let limit = HUNTER_LIMIT.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("domain", domain), ("api_key", self.api_key.as_str()), ("limit", limit.as_str())])
            .timeout(Duration::from_secs(HUNTER_TIMEOUT_SECS))
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(LeadgenError::Api { status, message: format!("Hunter returned {}", status) });
        }

        let body: DomainSearch = response.json().await?;
        Ok(body.data.emails.into_iter().next().map(Contact::from))
    }
}

#[async_trait]
impl EmailFinder for HunterClient {
    async fn lookup_email(&self, domain: &str) -> Option<Contact> {
        if domain.is_empty() || self.api_key.is_empty() {
            return None;
        }

        match self.domain_search(domain).await {
            Ok(contact) => contact,
            Err(e) => {
                debug!(domain, error = %e, "Hunter lookup failed");
                None
            }
        }
    }
}
