//! Spreadsheet persistence.
//!
//! Qualified leads are appended to a `Leads` worksheet, one row per lead,
//! skipping rows whose `(company name, phone)` is already present. Header
//! rows are only ever written into an empty first row; existing data is
//! never rewritten.

pub mod google;
pub mod memory;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{error, info};

use crate::Result;
use crate::lead::{Lead, LeadScore};

pub use google::{GoogleSheets, ServiceAccountKey};
pub use memory::MemoryStore;

pub const LEADS_TAB: &str = "Leads";
pub const ERRORS_TAB: &str = "Errors";

pub const LEADS_HEADERS: &[&str] = &[
    "Company Name",
    "Website",
    "Phone",
    "Email",
    "Contact Name",
    "City",
    "Address",
    "Country",
    "Business Type",
    "Google Rating",
    "Google Reviews",
    "Lead Score",
    "Urgency",
    "Deal Size",
    "Scored By",
    "Service Opportunity",
    "Gaps Found",
    "Reasoning",
    "Recommended Pitch",
    "Has WhatsApp",
    "Has Booking",
    "Has SSL",
    "Mobile Optimized",
    "Has Payment",
    "Has Chatbot",
    "Has Contact Form",
    "Tech Stack",
    "Copyright Year",
    "Source",
    "Date Added",
];

pub const ERRORS_HEADERS: &[&str] = &["Timestamp", "Error", "Node", "Lead Info"];

/// A spreadsheet row. Numbers stay numbers so the sheet can sort on them.
pub type Row = Vec<Value>;

/// One tab of a spreadsheet.
#[async_trait]
pub trait Worksheet: Send + Sync {
    /// Values of a 1-based row; empty when the row is blank.
    async fn row_values(&self, row: usize) -> Result<Vec<String>>;

    /// Every populated row, as displayed strings.
    async fn all_values(&self) -> Result<Vec<Vec<String>>>;

    /// Writes `headers` into row 1.
    async fn write_header(&self, headers: &[&str]) -> Result<()>;

    async fn append_rows(&self, rows: &[Row]) -> Result<()>;
}

/// A spreadsheet document holding named worksheets.
#[async_trait]
pub trait SheetStore: Send + Sync {
    /// Opens the worksheet called `title`, creating it with the given grid
    /// size when it does not exist.
    async fn worksheet(&self, title: &str, rows: u32, cols: u32) -> Result<Arc<dyn Worksheet>>;
}

/// Outcome of one save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveStats {
    pub saved: usize,
    pub skipped_duplicates: usize,
}

/// Writes `headers` into row 1 only if row 1 is empty.
pub async fn ensure_headers(worksheet: &dyn Worksheet, headers: &[&str]) -> Result<()> {
    let existing = worksheet.row_values(1).await?;
    if existing.iter().all(|cell| cell.is_empty()) {
        worksheet.write_header(headers).await?;
    }
    Ok(())
}

/// `(lowercased name, phone)` keys of rows already in the sheet, header excluded.
pub async fn existing_keys(worksheet: &dyn Worksheet) -> Result<HashSet<(String, String)>> {
    let rows = worksheet.all_values().await?;
    Ok(rows
        .iter()
        .skip(1)
        .filter(|row| row.len() >= 3)
        .map(|row| (row[0].trim().to_lowercase(), row[2].trim().to_string()))
        .collect())
}

/// Appends leads not already present. Duplicates inside `leads` itself are
/// skipped too.
pub async fn save_leads(store: &dyn SheetStore, leads: &[Lead], date_added: &str) -> Result<SaveStats> {
    let worksheet = store.worksheet(LEADS_TAB, 1000, LEADS_HEADERS.len() as u32).await?;
    ensure_headers(worksheet.as_ref(), LEADS_HEADERS).await?;

    let mut seen = existing_keys(worksheet.as_ref()).await?;
    let mut stats = SaveStats::default();
    let mut rows = Vec::new();

    for lead in leads {
        if !seen.insert(lead.sheet_key()) {
            stats.skipped_duplicates += 1;
            continue;
        }
        rows.push(lead_to_row(lead, date_added));
    }

    if !rows.is_empty() {
        worksheet.append_rows(&rows).await?;
        stats.saved = rows.len();
    }

    info!(saved = stats.saved, skipped = stats.skipped_duplicates, "saved leads to sheet");
    Ok(stats)
}

/// Appends an entry to the `Errors` tab. Failures are only logged.
pub async fn log_error(store: &dyn SheetStore, timestamp: &str, message: &str, node: &str, lead_info: &str) {
    let result = async {
        let worksheet = store.worksheet(ERRORS_TAB, 200, ERRORS_HEADERS.len() as u32).await?;
        ensure_headers(worksheet.as_ref(), ERRORS_HEADERS).await?;
        worksheet.append_rows(&[vec![json!(timestamp), json!(message), json!(node), json!(lead_info)]]).await
    }
    .await;

    if let Err(e) = result {
        error!(error = %e, "error logging failed");
    }
}

/// Renders a lead in [`LEADS_HEADERS`] column order.
pub fn lead_to_row(lead: &Lead, date_added: &str) -> Row {
    let s = &lead.signals;
    let score = lead.score.as_ref();
    let text = |f: fn(&LeadScore) -> String| score.map(f).unwrap_or_default();

    let contact_name = match lead.contact_name.trim() {
        "None None" => "",
        name => name,
    };

    vec![
        json!(lead.company_name),
        json!(lead.display_website()),
        json!(lead.phone),
        json!(lead.email),
        json!(contact_name),
        json!(lead.city),
        json!(lead.address),
        json!(if lead.country.is_empty() { "India" } else { lead.country.as_str() }),
        json!(lead.business_type),
        lead.google_rating.map_or_else(|| json!(""), |r| json!(r)),
        json!(lead.google_reviews),
        json!(lead.lead_score()),
        json!(text(|sc| sc.urgency.to_string())),
        json!(text(|sc| sc.estimated_deal_size.to_string())),
        json!(text(|sc| sc.scored_by.to_string())),
        json!(text(|sc| sc.service_opportunity.clone())),
        json!(text(|sc| sc.gaps_found.clone())),
        json!(text(|sc| sc.reasoning.clone())),
        json!(text(|sc| sc.recommended_pitch.clone())),
        check(s.has_whatsapp),
        check(s.has_booking_form),
        check(s.has_ssl),
        check(s.has_mobile_viewport),
        check(s.has_online_payment),
        check(s.has_chatbot),
        check(s.has_contact_form),
        json!(s.tech_stack_detected.join(", ")),
        s.copyright_year.map_or_else(|| json!(""), |y| json!(y)),
        json!(if lead.source.is_empty() { "GoogleMaps" } else { lead.source.as_str() }),
        json!(date_added),
    ]
}

fn check(present: bool) -> Value {
    json!(if present { "✓" } else { "✗" })
}
