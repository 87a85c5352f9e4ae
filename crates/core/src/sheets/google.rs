//! Google Sheets v4 REST backend with service-account authentication.
//!
//! An access token is obtained by signing an RS256 JWT with the service
//! account's private key and exchanging it at the account's `token_uri`.
//! Tokens are cached until shortly before they expire.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use super::{Row, SheetStore, Worksheet};
use crate::{LeadgenError, Result};

pub const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const SCOPES: &str = "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive";
const JWT_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN_SECS: i64 = 60;
const SHEETS_TIMEOUT_SECS: u64 = 30;

/// The fields of a service-account key file this backend needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_json(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).map_err(|e| LeadgenError::Config(format!("invalid service account JSON: {}", e)))
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: i64,
}

struct SheetsApi {
    client: Client,
    key: ServiceAccountKey,
    spreadsheet_id: String,
    api_base: String,
    token: Mutex<Option<AccessToken>>,
}

/// A spreadsheet addressed by id.
#[derive(Clone)]
pub struct GoogleSheets {
    api: Arc<SheetsApi>,
}

impl GoogleSheets {
    pub fn new(client: Client, key: ServiceAccountKey, spreadsheet_id: impl Into<String>) -> Self {
        Self {
            api: Arc::new(SheetsApi {
                client,
                key,
                spreadsheet_id: spreadsheet_id.into(),
                api_base: SHEETS_API.to_string(),
                token: Mutex::new(None),
            }),
        }
    }

    /// Points the backend at another API root. Only valid before first use.
    pub fn with_api_base(self, api_base: impl Into<String>) -> Self {
        let api = SheetsApi {
            client: self.api.client.clone(),
            key: self.api.key.clone(),
            spreadsheet_id: self.api.spreadsheet_id.clone(),
            api_base: api_base.into(),
            token: Mutex::new(None),
        };
        Self { api: Arc::new(api) }
    }

    /// Fetches (or reuses) an access token. Errors are [`LeadgenError::SheetsAuth`].
    pub async fn authorize(&self) -> Result<()> {
        self.api.access_token().await.map(|_| ())
    }
}

impl SheetsApi {
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        let now = OffsetDateTime::now_utc().unix_timestamp();

        if let Some(token) = cached.as_ref()
            && token.expires_at - REFRESH_MARGIN_SECS > now
        {
            return Ok(token.value.clone());
        }

        let token = self.exchange_token(now).await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn exchange_token(&self, now: i64) -> Result<AccessToken> {
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SCOPES,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        let signing_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())?;
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &signing_key)?;

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_GRANT), ("assertion", assertion.as_str())])
            .timeout(Duration::from_secs(SHEETS_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| LeadgenError::SheetsAuth(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(LeadgenError::SheetsAuth(format!("token endpoint returned {}: {}", status, body)));
        }

        let token: TokenResponse = response.json().await.map_err(|e| LeadgenError::SheetsAuth(e.to_string()))?;
        debug!(account = %self.key.client_email, "obtained sheets access token");

        Ok(AccessToken {
            value: token.access_token,
            expires_at: now + token.expires_in.unwrap_or(TOKEN_LIFETIME_SECS),
        })
    }

    /// `{api_base}/{spreadsheet_id}/{segments...}`, each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.api_base).map_err(|e| LeadgenError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| LeadgenError::InvalidUrl(self.api_base.clone()))?
            .pop_if_empty()
            .push(&self.spreadsheet_id)
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let token = self.access_token().await?;
        let response = request
            .bearer_auth(token)
            .timeout(Duration::from_secs(SHEETS_TIMEOUT_SECS))
            .send()
            .await?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(LeadgenError::Sheets(format!("API returned {}: {}", status, body)));
        }
        Ok(response)
    }

    async fn sheet_titles(&self) -> Result<Vec<String>> {
        let mut url = self.url(&[])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties.title");

        let body: Value = self.send(self.client.get(url)).await?.json().await?;
        Ok(body["sheets"]
            .as_array()
            .map(|sheets| {
                sheets
                    .iter()
                    .filter_map(|s| s["properties"]["title"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn add_sheet(&self, title: &str, rows: u32, cols: u32) -> Result<()> {
        let id = format!("{}:batchUpdate", self.spreadsheet_id);
        let mut url = self.url(&[])?;
        url.path_segments_mut()
            .map_err(|_| LeadgenError::InvalidUrl(self.api_base.clone()))?
            .pop()
            .push(&id);

        let body = json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": title,
                        "gridProperties": { "rowCount": rows, "columnCount": cols }
                    }
                }
            }]
        });
        self.send(self.client.post(url).json(&body)).await?;
        info!(title, "created worksheet");
        Ok(())
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let url = self.url(&["values", range])?;
        let body: Value = self.send(self.client.get(url)).await?.json().await?;
        Ok(grid_from(&body))
    }

    async fn put_values(&self, range: &str, values: Value) -> Result<()> {
        let mut url = self.url(&["values", range])?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        self.send(self.client.put(url).json(&json!({ "values": values }))).await?;
        Ok(())
    }

    async fn append_values(&self, range: &str, values: Value) -> Result<()> {
        let target = format!("{}:append", range);
        let mut url = self.url(&["values", &target])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");
        self.send(self.client.post(url).json(&json!({ "values": values }))).await?;
        Ok(())
    }
}

#[async_trait]
impl SheetStore for GoogleSheets {
    async fn worksheet(&self, title: &str, rows: u32, cols: u32) -> Result<Arc<dyn Worksheet>> {
        if !self.api.sheet_titles().await?.iter().any(|t| t == title) {
            self.api.add_sheet(title, rows, cols).await?;
        }
        Ok(Arc::new(GoogleWorksheet { api: Arc::clone(&self.api), title: title.to_string() }))
    }
}

struct GoogleWorksheet {
    api: Arc<SheetsApi>,
    title: String,
}

impl GoogleWorksheet {
    fn range(&self, cells: &str) -> String {
        format!("'{}'!{}", self.title.replace('\'', "''"), cells)
    }
}

#[async_trait]
impl Worksheet for GoogleWorksheet {
    async fn row_values(&self, row: usize) -> Result<Vec<String>> {
        let range = self.range(&format!("{row}:{row}"));
        Ok(self.api.get_values(&range).await?.into_iter().next().unwrap_or_default())
    }

    async fn all_values(&self) -> Result<Vec<Vec<String>>> {
        self.api.get_values(&self.range("A:ZZ")).await
    }

    async fn write_header(&self, headers: &[&str]) -> Result<()> {
        self.api.put_values(&self.range("A1"), json!([headers])).await
    }

    async fn append_rows(&self, rows: &[Row]) -> Result<()> {
        self.api.append_values(&self.range("A1"), json!(rows)).await
    }
}

/// Cells of a `ValueRange` response as strings.
fn grid_from(body: &Value) -> Vec<Vec<String>> {
    body["values"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    row.as_array()
                        .map(|cells| {
                            cells
                                .iter()
                                .map(|c| c.as_str().map_or_else(|| c.to_string(), str::to_string))
                                .collect()
                        })
                        .unwrap_or_default()
                })
                .collect()
        })
        .unwrap_or_default()
}
