//! The lead record threaded through every pipeline stage.
//!
//! A [`Lead`] starts life in the search adapter with identity and provenance
//! fields, picks up a [`SignalSet`] from the website fetcher, a
//! [`RuleResult`] from the rule scorer, a [`LeadScore`] from the combined
//! scoring step and finally contact details from enrichment.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum length of the in-run deduplication key.
pub const NAME_KEY_LEN: usize = 30;

/// Digital-presence signals derived from a business website.
///
/// Built once per lead by the fetcher. When there is no site to look at the
/// booleans stay `false` and one of the failure flags explains why.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSet {
    pub page_title: String,
    pub meta_desc: String,
    pub headings: String,
    pub page_snippet: String,
    /// URL after redirects, empty when nothing was fetched.
    pub final_url: String,

    pub has_ssl: bool,
    pub has_mobile_viewport: bool,
    pub has_whatsapp: bool,
    pub has_booking_form: bool,
    pub has_chatbot: bool,
    pub has_online_payment: bool,
    pub has_contact_form: bool,
    pub has_gallery: bool,
    pub has_testimonials: bool,
    pub has_blog: bool,
    pub has_social_links: bool,

    pub copyright_year: Option<i32>,
    pub tech_stack_detected: Vec<String>,

    pub no_website: bool,
    pub scrape_failed: bool,
    pub scrape_error: String,
}

impl SignalSet {
    /// Signal set for a business with no website at all.
    pub fn no_website() -> Self {
        Self { no_website: true, ..Default::default() }
    }

    /// Signal set for a social/page-builder placeholder that was not fetched.
    ///
    /// Nothing is extracted, but the failure flags stay clear so the rule
    /// scorer can classify the lead by its URL.
    pub fn placeholder() -> Self {
        Self::default()
    }

    /// Signal set for a site that could not be fetched.
    pub fn failed(reason: &str) -> Self {
        Self { scrape_failed: true, scrape_error: truncate_chars(reason, 100), ..Default::default() }
    }
}

/// Coarse bucket deciding which scoring path applies to a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleTier {
    NoWebsite,
    WeakSite,
    HasWebsite,
}

impl RuleTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleTier::NoWebsite => "NO_WEBSITE",
            RuleTier::WeakSite => "WEAK_SITE",
            RuleTier::HasWebsite => "HAS_WEBSITE",
        }
    }
}

impl fmt::Display for RuleTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the deterministic rule scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule_score: u8,
    pub rule_gaps: Vec<String>,
    pub rule_tier: RuleTier,
    pub ai_needed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Urgency {
    High,
    Medium,
    Low,
}

impl Urgency {
    /// Lenient parse used for model output. Unknown values map to `Medium`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Urgency::High,
            "LOW" => Urgency::Low,
            _ => Urgency::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::High => "HIGH",
            Urgency::Medium => "MEDIUM",
            Urgency::Low => "LOW",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealSize {
    Small,
    Medium,
    Large,
}

impl DealSize {
    /// Lenient parse used for model output. Unknown values map to `Medium`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "small" => DealSize::Small,
            "large" => DealSize::Large,
            _ => DealSize::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DealSize::Small => "small",
            DealSize::Medium => "medium",
            DealSize::Large => "large",
        }
    }
}

impl fmt::Display for DealSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which path produced a lead's final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScoredBy {
    /// The LLM answered with a usable assessment.
    Ai,
    /// AI scoring was attempted and failed; rule output was used instead.
    RuleFallback,
    /// AI scoring was not needed (or not configured) for this lead.
    RuleAuto,
}

impl ScoredBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoredBy::Ai => "AI",
            ScoredBy::RuleFallback => "RULE_FALLBACK",
            ScoredBy::RuleAuto => "RULE_AUTO",
        }
    }
}

impl fmt::Display for ScoredBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final assessment attached to a lead by the combined scoring step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadScore {
    pub lead_score: u8,
    pub service_opportunity: String,
    pub gaps_found: String,
    pub reasoning: String,
    pub recommended_pitch: String,
    pub urgency: Urgency,
    pub estimated_deal_size: DealSize,
    pub scored_by: ScoredBy,
}

/// One candidate business.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub company_name: String,
    /// Bare domain of the business's own site; empty for directory listings.
    pub website: String,
    /// Link exactly as the search provider listed it.
    pub raw_url: String,
    pub phone: String,
    pub email: String,
    pub contact_name: String,
    pub city: String,
    pub country: String,
    pub business_type: String,
    pub address: String,
    pub google_rating: Option<f64>,
    pub google_reviews: u64,
    pub source: String,
    pub raw_snippet: String,

    #[serde(flatten)]
    pub signals: SignalSet,

    #[serde(flatten)]
    pub rule: Option<RuleResult>,

    #[serde(flatten)]
    pub score: Option<LeadScore>,
}

impl Lead {
    /// Creates a lead with only a name, as a starting point for builders and tests.
    pub fn named(company_name: impl Into<String>) -> Self {
        Self {
            company_name: company_name.into(),
            country: "India".to_string(),
            source: "GoogleMaps".to_string(),
            ..Default::default()
        }
    }

    /// Deduplication key used within a single run: lowercase, spaces removed,
    /// first 30 characters.
    pub fn name_key(&self) -> String {
        self.company_name
            .to_lowercase()
            .chars()
            .filter(|c| *c != ' ')
            .take(NAME_KEY_LEN)
            .collect()
    }

    /// Deduplication key used against persisted spreadsheet rows.
    pub fn sheet_key(&self) -> (String, String) {
        (self.company_name.trim().to_lowercase(), self.phone.trim().to_string())
    }

    /// URL the fetcher should visit: the provider link, falling back to the domain.
    pub fn fetch_url(&self) -> &str {
        if !self.raw_url.is_empty() { &self.raw_url } else { &self.website }
    }

    /// Website shown to humans, or an empty string.
    pub fn display_website(&self) -> &str {
        if !self.website.is_empty() { &self.website } else { &self.raw_url }
    }

    /// Final score, or 0 when the lead has not been scored.
    pub fn lead_score(&self) -> u8 {
        self.score.as_ref().map_or(0, |s| s.lead_score)
    }
}

/// Truncates to at most `max` characters without splitting a code point.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
