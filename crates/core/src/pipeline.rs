//! The lead-generation pipeline.
//!
//! A run moves every lead through seven strictly ordered stages, each
//! finishing before the next starts:
//!
//! 1. search: query the directory per (business type, city), merge and
//!    dedupe by name
//! 2. scrape: fetch website signals, bounded by a semaphore
//! 3. rule filter: drop leads whose rule score is below the pre-filter
//! 4. score: rule + AI scoring, bounded by a second, stricter semaphore
//! 5. qualify: keep leads at or above the minimum score, best first
//! 6. enrich: best-effort email lookup
//! 7. save: append to the spreadsheet when one is configured
//!
//! Provider failures never abort a run. Only spreadsheet errors are
//! reported, in [`PipelineResult::errors`].

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::{LeadgenError, Result};
use crate::config::{Config, DEFAULT_MAX_CONCURRENT_SCRAPES, DEFAULT_MIN_SCORE};
use crate::enrich::{EmailFinder, HunterClient};
use crate::fetch::{FetchConfig, HttpFetcher, PageFetcher, build_client};
use crate::lead::{Lead, truncate_chars};
use crate::scoring::ai::{AiScorer, LlmScorer, OpenAiCompatBackend, RetryPolicy};
use crate::scoring::{rule_score, score_lead};
use crate::search::{SearchProvider, SearchQuery, SerpApiClient};
use crate::sheets::{self, GoogleSheets, ServiceAccountKey, SheetStore};

/// Leads below this rule score never reach the AI stage.
pub const PREFILTER_THRESHOLD: u8 = 4;
/// Concurrent AI calls.
pub const DEFAULT_AI_CONCURRENCY: usize = 3;

/// Progress-reporting stages. Names are stable and lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Search,
    Scrape,
    Score,
    Enrich,
    Save,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Search => "search",
            Stage::Scrape => "scrape",
            Stage::Score => "score",
            Stage::Enrich => "enrich",
            Stage::Save => "save",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress observer: `(stage, current, total, message)`.
pub type ProgressFn = dyn Fn(Stage, usize, usize, &str) + Send + Sync;

/// Tunables of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Leads scoring below this are not qualified.
    pub min_score: u8,
    /// Concurrent website fetches.
    pub scrape_concurrency: usize,
    /// Concurrent AI scoring calls.
    pub ai_concurrency: usize,
    /// Rule score needed to enter the scoring stage.
    pub prefilter_threshold: u8,
    /// Pause between successive search calls.
    pub search_delay: Duration,
    /// Pause after each scored lead, inside the AI permit.
    pub score_delay: Duration,
    pub fetch: FetchConfig,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_score: DEFAULT_MIN_SCORE,
            scrape_concurrency: DEFAULT_MAX_CONCURRENT_SCRAPES,
            ai_concurrency: DEFAULT_AI_CONCURRENCY,
            prefilter_threshold: PREFILTER_THRESHOLD,
            search_delay: Duration::from_millis(500),
            score_delay: Duration::from_millis(300),
            fetch: FetchConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }
}

/// Builder for [`PipelineConfig`].
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use leadgen_core::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .min_score(8)
///     .scrape_concurrency(10)
///     .search_delay(Duration::ZERO)
///     .build();
/// assert_eq!(config.ai_concurrency, 3);
/// ```
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self { config: PipelineConfig::default() }
    }

    pub fn min_score(mut self, value: u8) -> Self {
        self.config.min_score = value;
        self
    }

    /// Clamped to at least one.
    pub fn scrape_concurrency(mut self, value: usize) -> Self {
        self.config.scrape_concurrency = value.max(1);
        self
    }

    /// Clamped to at least one.
    pub fn ai_concurrency(mut self, value: usize) -> Self {
        self.config.ai_concurrency = value.max(1);
        self
    }

    pub fn prefilter_threshold(mut self, value: u8) -> Self {
        self.config.prefilter_threshold = value;
        self
    }

    pub fn search_delay(mut self, value: Duration) -> Self {
        self.config.search_delay = value;
        self
    }

    pub fn score_delay(mut self, value: Duration) -> Self {
        self.config.score_delay = value;
        self
    }

    pub fn fetch(mut self, value: FetchConfig) -> Self {
        self.config.fetch = value;
        self
    }

    pub fn retry(mut self, value: RetryPolicy) -> Self {
        self.config.retry = value;
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineResult {
    /// Unique leads found by search.
    pub total_scraped: usize,
    /// Leads that passed the pre-filter and were scored.
    pub total_scored: usize,
    pub saved_to_sheet: usize,
    pub skipped_duplicates: usize,
    /// Qualified leads, best first.
    pub qualified_leads: Vec<Lead>,
    pub errors: Vec<String>,
    pub started_at: String,
    pub finished_at: String,
}

/// A configured pipeline. Collaborators are trait objects so any of them
/// can be swapped.
pub struct Pipeline {
    config: PipelineConfig,
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn PageFetcher>,
    ai: Option<Arc<dyn AiScorer>>,
    enricher: Option<Arc<dyn EmailFinder>>,
    sheets: Option<Arc<dyn SheetStore>>,
}

impl Pipeline {
    /// A pipeline with only the mandatory collaborators: no AI, no
    /// enrichment, no persistence.
    pub fn new(config: PipelineConfig, search: Arc<dyn SearchProvider>, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { config, search, fetcher, ai: None, enricher: None, sheets: None }
    }

    pub fn with_ai(mut self, ai: Arc<dyn AiScorer>) -> Self {
        self.ai = Some(ai);
        self
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn EmailFinder>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn with_sheets(mut self, sheets: Arc<dyn SheetStore>) -> Self {
        self.sheets = Some(sheets);
        self
    }

    /// Wires the HTTP adapters for `config` around one shared client.
    ///
    /// AI scoring, enrichment and persistence are enabled only when their
    /// keys are present. Malformed spreadsheet credentials fail here.
    pub fn from_config(config: &Config) -> Result<Self> {
        let settings = PipelineConfig::builder()
            .min_score(config.min_score)
            .scrape_concurrency(config.max_concurrent_scrapes)
            .build();
        Self::from_config_with(config, settings)
    }

    /// Like [`Pipeline::from_config`] with explicit tunables. The limits in
    /// `settings` take precedence over those in `config`.
    pub fn from_config_with(config: &Config, settings: PipelineConfig) -> Result<Self> {
        if config.serpapi_key.trim().is_empty() {
            return Err(LeadgenError::Config("SERPAPI_KEY is required".to_string()));
        }

        let client = build_client(&settings.fetch)?;
        let search = Arc::new(SerpApiClient::new(client.clone(), config.serpapi_key.trim()));
        let fetcher = Arc::new(HttpFetcher::new(client.clone(), settings.fetch.clone()));
        let retry = settings.retry.clone();

        let mut pipeline = Self::new(settings, search, fetcher);

        if !config.llm_api_key.trim().is_empty() {
            let backend = OpenAiCompatBackend::new(client.clone(), config.llm_api_key.trim());
            pipeline = pipeline.with_ai(Arc::new(LlmScorer::new(Arc::new(backend)).with_retry(retry)));
        } else {
            warn!("no LLM key configured, leads will be scored by rules only");
        }

        if let Some(key) = config.enrichment_key() {
            pipeline = pipeline.with_enricher(Arc::new(HunterClient::new(client.clone(), key)));
        }

        if config.sheets_enabled()
            && let (Some(sheet_id), Some(credentials)) = (&config.sheet_id, &config.sheets_credentials)
        {
            let key = ServiceAccountKey::from_json(credentials)?;
            pipeline = pipeline.with_sheets(Arc::new(GoogleSheets::new(client, key, sheet_id.trim())));
        }

        Ok(pipeline)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage. An empty `queries` runs the built-in defaults.
    pub async fn run(&self, queries: &[SearchQuery], progress: Option<&ProgressFn>) -> PipelineResult {
        let reporter = Reporter { observer: progress };
        let mut result = PipelineResult { started_at: timestamp(), ..Default::default() };

        let defaults;
        let queries = if queries.is_empty() {
            defaults = SearchQuery::defaults();
            &defaults[..]
        } else {
            queries
        };

        let leads = self.search_stage(queries, &reporter).await;
        result.total_scraped = leads.len();

        let leads = self.scrape_stage(leads, &reporter).await;
        let candidates = self.rule_filter(leads, &reporter);
        let scored = self.score_stage(candidates, &reporter).await;
        result.total_scored = scored.len();

        let qualified = qualify(scored, self.config.min_score);
        let qualified = self.enrich_stage(qualified, &reporter).await;

        if let Some(store) = &self.sheets {
            self.save_stage(store.as_ref(), &qualified, &mut result, &reporter).await;
        }

        result.qualified_leads = qualified;
        result.finished_at = timestamp();
        result
    }

    async fn search_stage(&self, queries: &[SearchQuery], reporter: &Reporter<'_>) -> Vec<Lead> {
        let total = queries.len();
        reporter.report(Stage::Search, 0, total, "Starting searches...");

        let mut seen = HashSet::new();
        let mut leads = Vec::new();

        for (i, query) in queries.iter().enumerate() {
            if i > 0 && !self.config.search_delay.is_zero() {
                tokio::time::sleep(self.config.search_delay).await;
            }
            reporter.report(Stage::Search, i + 1, total, &format!("Searching: {}", query));

            for lead in self.search.search(query).await {
                if seen.insert(lead.name_key()) {
                    leads.push(lead);
                }
            }
        }

        reporter.report(Stage::Search, total, total, &format!("Found {} unique leads", leads.len()));
        leads
    }

    async fn scrape_stage(&self, leads: Vec<Lead>, reporter: &Reporter<'_>) -> Vec<Lead> {
        let total = leads.len();
        reporter.report(Stage::Scrape, 0, total, "Scraping websites...");

        let semaphore = Semaphore::new(self.config.scrape_concurrency.max(1));
        let done = AtomicUsize::new(0);

        let tasks = leads.into_iter().map(|mut lead| {
            let semaphore = &semaphore;
            let done = &done;
            async move {
                let _permit = semaphore.acquire().await;
                lead.signals = self.fetcher.fetch_signals(lead.fetch_url()).await;
                let current = done.fetch_add(1, Ordering::SeqCst) + 1;
                reporter.report(
                    Stage::Scrape,
                    current,
                    total,
                    &format!("Scraped: {}", truncate_chars(&lead.company_name, 40)),
                );
                lead
            }
        });

        join_all(tasks).await
    }

    fn rule_filter(&self, leads: Vec<Lead>, reporter: &Reporter<'_>) -> Vec<Lead> {
        reporter.report(Stage::Score, 0, leads.len(), "Rule-based pre-filtering...");

        let candidates: Vec<Lead> = leads
            .into_iter()
            .filter_map(|mut lead| {
                let rule = rule_score(&lead);
                let keep = rule.rule_score >= self.config.prefilter_threshold;
                lead.rule = Some(rule);
                keep.then_some(lead)
            })
            .collect();

        reporter.report(
            Stage::Score,
            0,
            candidates.len(),
            &format!("Pre-filter: {} candidates for AI scoring", candidates.len()),
        );
        candidates
    }

    async fn score_stage(&self, leads: Vec<Lead>, reporter: &Reporter<'_>) -> Vec<Lead> {
        let total = leads.len();
        let semaphore = Semaphore::new(self.config.ai_concurrency.max(1));
        let done = AtomicUsize::new(0);
        let ai = self.ai.as_deref();

        let tasks = leads.into_iter().map(|mut lead| {
            let semaphore = &semaphore;
            let done = &done;
            async move {
                let _permit = semaphore.acquire().await;
                score_lead(&mut lead, ai).await;

                let current = done.fetch_add(1, Ordering::SeqCst) + 1;
                reporter.report(
                    Stage::Score,
                    current,
                    total,
                    &format!("Scored {}: {}/10", truncate_chars(&lead.company_name, 35), lead.lead_score()),
                );

                if !self.config.score_delay.is_zero() {
                    tokio::time::sleep(self.config.score_delay).await;
                }
                lead
            }
        });

        join_all(tasks).await
    }

    async fn enrich_stage(&self, leads: Vec<Lead>, reporter: &Reporter<'_>) -> Vec<Lead> {
        let total = leads.len();
        reporter.report(Stage::Enrich, 0, total, &format!("Enriching {} qualified leads...", total));

        let done = AtomicUsize::new(0);
        let enricher = self.enricher.as_deref();

        let tasks = leads.into_iter().map(|mut lead| {
            let done = &done;
            async move {
                if let Some(finder) = enricher
                    && !lead.website.is_empty()
                    && let Some(contact) = finder.lookup_email(&lead.website).await
                {
                    lead.email = contact.email;
                    lead.contact_name = contact.contact_name;
                }

                let current = done.fetch_add(1, Ordering::SeqCst) + 1;
                reporter.report(
                    Stage::Enrich,
                    current,
                    total,
                    &format!("Enriched: {}", truncate_chars(&lead.company_name, 40)),
                );
                lead
            }
        });

        join_all(tasks).await
    }

    async fn save_stage(
        &self, store: &dyn SheetStore, leads: &[Lead], result: &mut PipelineResult, reporter: &Reporter<'_>,
    ) {
        reporter.report(Stage::Save, 0, 1, "Saving to Google Sheets...");

        match sheets::save_leads(store, leads, &date_added()).await {
            Ok(stats) => {
                result.saved_to_sheet = stats.saved;
                result.skipped_duplicates = stats.skipped_duplicates;
                reporter.report(
                    Stage::Save,
                    1,
                    1,
                    &format!("Saved {} leads, skipped {} duplicates", stats.saved, stats.skipped_duplicates),
                );
            }
            Err(e @ LeadgenError::SheetsAuth(_)) => {
                error!(error = %e, "spreadsheet authentication failed");
                result.errors.push(e.to_string());
            }
            Err(e) => {
                let message = format!("Sheet save error: {}", e);
                error!("{}", message);
                sheets::log_error(store, &timestamp(), &message, Stage::Save.as_str(), &format!("{} leads", leads.len()))
                    .await;
                result.errors.push(message);
            }
        }
    }
}

/// Keeps leads scoring at least `min_score`, ordered by score then review
/// count, both descending. Ties keep their input order.
pub fn qualify(leads: Vec<Lead>, min_score: u8) -> Vec<Lead> {
    let mut qualified: Vec<Lead> = leads.into_iter().filter(|l| l.lead_score() >= min_score).collect();
    qualified.sort_by(|a, b| (b.lead_score(), b.google_reviews).cmp(&(a.lead_score(), a.google_reviews)));
    qualified
}

struct Reporter<'a> {
    observer: Option<&'a ProgressFn>,
}

impl Reporter<'_> {
    fn report(&self, stage: Stage, current: usize, total: usize, message: &str) {
        if let Some(observer) = self.observer {
            observer(stage, current, total, message);
        }
        info!("[{}] {}/{} - {}", stage, current, total, message);
    }
}

fn timestamp() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

/// Spreadsheet "Date Added" format.
fn date_added() -> String {
    OffsetDateTime::now_utc()
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .unwrap_or_default()
}
