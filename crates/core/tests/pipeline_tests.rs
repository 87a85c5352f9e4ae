//! Pipeline integration tests with stub collaborators
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use leadgen_core::search::parse_results;
use leadgen_core::sheets::{ERRORS_TAB, LEADS_TAB, Worksheet};
use leadgen_core::*;

fn get_fixture_path(name: &str) -> String {
    format!("../../tests/fixtures/{}", name)
}

fn read_fixture(name: &str) -> String {
    std::fs::read_to_string(get_fixture_path(name)).unwrap()
}

fn settings() -> PipelineConfigBuilder {
    PipelineConfig::builder().search_delay(Duration::ZERO).score_delay(Duration::ZERO)
}

fn site_lead(name: &str, url: &str) -> Lead {
    let mut lead = Lead::named(name);
    lead.raw_url = url.to_string();
    lead.website = extract_domain(url);
    lead
}

/// Returns canned leads per query text and records what was asked.
#[derive(Default)]
struct StubSearch {
    results: HashMap<String, Vec<Lead>>,
    asked: Mutex<Vec<String>>,
}

impl StubSearch {
    fn with(mut self, query: (&str, &str), leads: Vec<Lead>) -> Self {
        let query = SearchQuery::from(query);
        let leads = leads
            .into_iter()
            .map(|mut lead| {
                lead.city = query.city.clone();
                lead.business_type = query.business_type.clone();
                lead
            })
            .collect();
        self.results.insert(query.text(), leads);
        self
    }

    fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for StubSearch {
    async fn search(&self, query: &SearchQuery) -> Vec<Lead> {
        self.asked.lock().unwrap().push(query.text());
        self.results.get(&query.text()).cloned().unwrap_or_default()
    }
}

/// Serves fixture pages by URL; anything unknown fails like a blocked site.
#[derive(Default)]
struct FixtureFetcher {
    pages: HashMap<String, String>,
}

impl FixtureFetcher {
    fn page(mut self, url: &str, fixture: &str) -> Self {
        self.pages.insert(url.to_string(), read_fixture(fixture));
        self
    }
}

#[async_trait]
impl PageFetcher for FixtureFetcher {
    async fn fetch_signals(&self, url: &str) -> SignalSet {
        if url.is_empty() {
            return SignalSet::no_website();
        }
        if is_weak_site(url) {
            return SignalSet::placeholder();
        }
        match self.pages.get(url) {
            Some(html) => extract_signals(html, url),
            None => SignalSet::failed("HTTP 403 from site"),
        }
    }
}

/// Fetcher that sleeps and tracks how many calls overlap.
#[derive(Default)]
struct SlowFetcher {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl PageFetcher for SlowFetcher {
    async fn fetch_signals(&self, _url: &str) -> SignalSet {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        SignalSet::failed("timeout")
    }
}

/// AI that answers with a fixed score per company name.
#[derive(Default)]
struct ScriptedAi {
    scores: HashMap<String, u8>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedAi {
    fn score(mut self, name: &str, score: u8) -> Self {
        self.scores.insert(name.to_string(), score);
        self
    }
}

#[async_trait]
impl AiScorer for ScriptedAi {
    async fn ai_score(&self, lead: &Lead) -> Option<AiAssessment> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let score = *self.scores.get(&lead.company_name)?;
        Some(AiAssessment {
            lead_score: Some(score),
            service_opportunity: "Website Redesign".to_string(),
            gaps_found: "Outdated site, no booking".to_string(),
            reasoning: "Established clinic with weak funnel".to_string(),
            recommended_pitch: "Naya website, zyada patients".to_string(),
            urgency: Urgency::High,
            estimated_deal_size: DealSize::Medium,
        })
    }
}

/// Chat transport that is always down.
#[derive(Default)]
struct DownChat {
    attempts: AtomicUsize,
}

#[async_trait]
impl ChatBackend for DownChat {
    async fn complete(&self, _request: &scoring::ai::ChatRequest) -> std::result::Result<String, ChatError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ChatError::Status(503))
    }
}

#[derive(Default)]
struct StubFinder {
    asked: Mutex<Vec<String>>,
}

#[async_trait]
impl EmailFinder for StubFinder {
    async fn lookup_email(&self, domain: &str) -> Option<Contact> {
        self.asked.lock().unwrap().push(domain.to_string());
        (domain == "brightsmilesdental.in")
            .then(|| Contact { email: "dr.rao@brightsmilesdental.in".to_string(), contact_name: "Anita Rao".to_string() })
    }
}

/// Store whose `Leads` tab always fails with `error`; other tabs work.
struct BrokenSheets {
    auth: bool,
    fallback: MemoryStore,
}

#[async_trait]
impl SheetStore for BrokenSheets {
    async fn worksheet(&self, title: &str, rows: u32, cols: u32) -> Result<Arc<dyn Worksheet>> {
        if self.auth {
            return Err(LeadgenError::SheetsAuth("invalid_grant".to_string()));
        }
        if title == LEADS_TAB {
            return Err(LeadgenError::Sheets("API returned 429: quota exceeded".to_string()));
        }
        self.fallback.worksheet(title, rows, cols).await
    }
}

fn fixture_search() -> StubSearch {
    let data: serde_json::Value = serde_json::from_str(&read_fixture("serpapi_dental_pune.json")).unwrap();
    let query = SearchQuery::new("dental clinic", "Pune");
    let leads = parse_results(&data, &query);
    StubSearch::default().with(("dental clinic", "Pune"), leads)
}

fn fixture_fetcher() -> FixtureFetcher {
    FixtureFetcher::default().page("https://www.brightsmilesdental.in/", "sites/modern_clinic.html")
}

#[tokio::test]
async fn test_no_website_lead_is_auto_qualified() {
    let search = StubSearch::default().with(("dental clinic", "Pune"), vec![Lead::named("Kulkarni Dental Clinic")]);
    let pipeline = Pipeline::new(settings().build(), Arc::new(search), Arc::new(FixtureFetcher::default()))
        .with_ai(Arc::new(ScriptedAi::default()));

    let result = pipeline.run(&[SearchQuery::new("dental clinic", "Pune")], None).await;

    assert_eq!(result.qualified_leads.len(), 1);
    let lead = &result.qualified_leads[0];
    let score = lead.score.as_ref().unwrap();
    assert_eq!(score.lead_score, 10);
    assert_eq!(score.urgency, Urgency::High);
    assert_eq!(score.scored_by, ScoredBy::RuleAuto);
    assert!(lead.signals.no_website);
}

#[tokio::test]
async fn test_ai_outage_falls_back_to_rule_score() {
    let search = StubSearch::default().with(
        ("dental clinic", "Pune"),
        vec![site_lead("Bright Smiles Dental Care", "https://www.brightsmilesdental.in/")],
    );
    let chat = Arc::new(DownChat::default());
    let ai = LlmScorer::new(chat.clone()).with_retry(RetryPolicy::immediate(3));
    let pipeline = Pipeline::new(settings().min_score(1).build(), Arc::new(search), Arc::new(fixture_fetcher()))
        .with_ai(Arc::new(ai));

    let result = pipeline.run(&[SearchQuery::new("dental clinic", "Pune")], None).await;

    assert_eq!(chat.attempts.load(Ordering::SeqCst), 3);
    let lead = &result.qualified_leads[0];
    let signals = &lead.signals;
    assert!(signals.has_ssl && signals.has_mobile_viewport && signals.has_whatsapp);
    assert!(!signals.has_booking_form && !signals.has_contact_form && !signals.has_testimonials);

    let rule = lead.rule.as_ref().unwrap();
    let score = lead.score.as_ref().unwrap();
    assert_eq!(rule.rule_score, 5);
    assert_eq!(score.lead_score, rule.rule_score);
    assert_eq!(score.scored_by, ScoredBy::RuleFallback);
}

#[tokio::test]
async fn test_min_score_filters_and_orders() {
    let leads = vec![
        site_lead("Six Dental", "https://six.example.in"),
        site_lead("Nine Dental", "https://nine.example.in"),
        site_lead("Ten Dental", "https://ten.example.in"),
    ];
    let search = StubSearch::default().with(("dental clinic", "Pune"), leads);
    let ai = ScriptedAi::default().score("Six Dental", 6).score("Nine Dental", 9).score("Ten Dental", 10);
    let pipeline = Pipeline::new(settings().min_score(9).build(), Arc::new(search), Arc::new(FixtureFetcher::default()))
        .with_ai(Arc::new(ai));

    let result = pipeline.run(&[SearchQuery::new("dental clinic", "Pune")], None).await;

    let scores: Vec<u8> = result.qualified_leads.iter().map(Lead::lead_score).collect();
    assert_eq!(scores, [10, 9]);
    assert_eq!(result.total_scored, 3);
}

#[tokio::test]
async fn test_fixture_run_end_to_end() {
    let ai = Arc::new(ScriptedAi::default().score("Bright Smiles Dental Care", 9).score("City Dental Hospital", 6));
    let finder = Arc::new(StubFinder::default());
    let store = MemoryStore::new();

    let pipeline = Pipeline::new(settings().build(), Arc::new(fixture_search()), Arc::new(fixture_fetcher()))
        .with_ai(ai.clone())
        .with_enricher(finder.clone())
        .with_sheets(Arc::new(store.clone()));

    let result = pipeline.run(&[SearchQuery::new("dental clinic", "Pune")], None).await;

    // duplicate and two-letter entries are dropped by the search parser
    assert_eq!(result.total_scraped, 4);
    assert_eq!(result.total_scored, 4);
    // only the two real-website leads needed the model
    assert_eq!(ai.calls.load(Ordering::SeqCst), 2);

    let names: Vec<&str> = result.qualified_leads.iter().map(|l| l.company_name.as_str()).collect();
    assert_eq!(names, ["Kulkarni Dental Clinic", "Bright Smiles Dental Care", "Glow Dental Studio"]);

    let glow = &result.qualified_leads[2];
    assert_eq!(glow.rule.as_ref().unwrap().rule_tier, RuleTier::WeakSite);
    assert_eq!(glow.google_reviews, 41);

    let bright = &result.qualified_leads[1];
    assert_eq!(bright.email, "dr.rao@brightsmilesdental.in");
    assert_eq!(bright.contact_name, "Anita Rao");
    assert_eq!(bright.phone, "+919822012345");
    assert_eq!(bright.signals.copyright_year, Some(2018));

    // leads without their own domain are never looked up
    assert_eq!(finder.asked.lock().unwrap().clone(), ["brightsmilesdental.in"]);

    assert_eq!(result.saved_to_sheet, 3);
    assert!(result.errors.is_empty());
    let rows = store.rows(LEADS_TAB);
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0][0], "Company Name");
    assert_eq!(rows[1][0], "Kulkarni Dental Clinic");
}

#[tokio::test]
async fn test_first_occurrence_wins_across_queries() {
    let mut hyderabad = Lead::named("Glow Skin Clinic");
    hyderabad.phone = "111".to_string();
    let mut mumbai = Lead::named("glow skin  CLINIC");
    mumbai.phone = "222".to_string();

    let search = StubSearch::default()
        .with(("skin clinic", "Hyderabad"), vec![hyderabad])
        .with(("skin clinic", "Mumbai"), vec![mumbai, Lead::named("Radiance Skin Care")]);
    let pipeline = Pipeline::new(settings().build(), Arc::new(search), Arc::new(FixtureFetcher::default()));

    let queries = [SearchQuery::new("skin clinic", "Hyderabad"), SearchQuery::new("skin clinic", "Mumbai")];
    let result = pipeline.run(&queries, None).await;

    assert_eq!(result.total_scraped, 2);
    let glow = result.qualified_leads.iter().find(|l| l.name_key() == "glowskinclinic").unwrap();
    assert_eq!(glow.city, "Hyderabad");
    assert_eq!(glow.phone, "111");
}

#[tokio::test]
async fn test_scrape_concurrency_is_bounded() {
    let leads: Vec<Lead> =
        (0..20).map(|i| site_lead(&format!("Business {i}"), &format!("https://business{i}.example.in"))).collect();
    let search = StubSearch::default().with(("gym", "Pune"), leads);
    let fetcher = Arc::new(SlowFetcher::default());

    let pipeline = Pipeline::new(settings().scrape_concurrency(3).build(), Arc::new(search), fetcher.clone());
    pipeline.run(&[SearchQuery::new("gym", "Pune")], None).await;

    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 20);
    let peak = fetcher.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak in-flight fetches was {peak}");
    assert!(peak > 1);
}

#[tokio::test]
async fn test_ai_concurrency_is_bounded_separately() {
    let leads: Vec<Lead> =
        (0..12).map(|i| site_lead(&format!("Studio {i}"), &format!("https://studio{i}.example.in"))).collect();
    let search = StubSearch::default().with(("yoga studio", "Delhi"), leads);
    let ai = Arc::new(ScriptedAi::default());

    let pipeline = Pipeline::new(settings().scrape_concurrency(10).build(), Arc::new(search), Arc::new(SlowFetcher::default()))
        .with_ai(ai.clone());
    pipeline.run(&[SearchQuery::new("yoga studio", "Delhi")], None).await;

    assert_eq!(ai.calls.load(Ordering::SeqCst), 12);
    assert!(ai.peak.load(Ordering::SeqCst) <= 3);
}

#[tokio::test]
async fn test_prefilter_drops_complete_sites() {
    let search = StubSearch::default().with(
        ("ca firm", "Pune"),
        vec![site_lead("Sharma Associates", "https://sharmaassociates.in"), Lead::named("Joshi & Co")],
    );
    let fetcher = FixtureFetcher::default().page("https://sharmaassociates.in", "sites/full_featured.html");
    let ai = Arc::new(ScriptedAi::default());

    let pipeline = Pipeline::new(settings().min_score(1).build(), Arc::new(search), Arc::new(fetcher)).with_ai(ai.clone());
    let result = pipeline.run(&[SearchQuery::new("ca firm", "Pune")], None).await;

    assert_eq!(result.total_scraped, 2);
    assert_eq!(result.total_scored, 1);
    assert_eq!(result.qualified_leads[0].company_name, "Joshi & Co");
    assert_eq!(ai.calls.load(Ordering::SeqCst), 0);
}

async fn run_saving_to(store: &MemoryStore) -> PipelineResult {
    let pipeline = Pipeline::new(settings().build(), Arc::new(fixture_search()), Arc::new(fixture_fetcher()))
        .with_ai(Arc::new(ScriptedAi::default().score("Bright Smiles Dental Care", 9)))
        .with_sheets(Arc::new(store.clone()));
    pipeline.run(&[SearchQuery::new("dental clinic", "Pune")], None).await
}

#[tokio::test]
async fn test_saving_twice_skips_everything() {
    let store = MemoryStore::new();

    let first = run_saving_to(&store).await;
    assert_eq!(first.saved_to_sheet, first.qualified_leads.len());
    assert_eq!(first.skipped_duplicates, 0);

    let second = run_saving_to(&store).await;
    assert_eq!(second.saved_to_sheet, 0);
    assert_eq!(second.skipped_duplicates, second.qualified_leads.len());
    assert_eq!(store.rows(LEADS_TAB).len(), 1 + first.qualified_leads.len());
}

#[tokio::test]
async fn test_auth_failure_keeps_leads() {
    let sheets = BrokenSheets { auth: true, fallback: MemoryStore::new() };
    let pipeline = Pipeline::new(settings().build(), Arc::new(fixture_search()), Arc::new(fixture_fetcher()))
        .with_sheets(Arc::new(sheets));

    let result = pipeline.run(&[SearchQuery::new("dental clinic", "Pune")], None).await;

    assert!(!result.qualified_leads.is_empty());
    assert_eq!(result.saved_to_sheet, 0);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("Google Sheets auth failed"));
}

#[tokio::test]
async fn test_save_error_is_logged_to_errors_tab() {
    let fallback = MemoryStore::new();
    let sheets = BrokenSheets { auth: false, fallback: fallback.clone() };
    let pipeline = Pipeline::new(settings().build(), Arc::new(fixture_search()), Arc::new(fixture_fetcher()))
        .with_sheets(Arc::new(sheets));

    let result = pipeline.run(&[SearchQuery::new("dental clinic", "Pune")], None).await;

    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("quota exceeded"));

    let logged = fallback.rows(ERRORS_TAB);
    assert_eq!(logged[0], ["Timestamp", "Error", "Node", "Lead Info"]);
    assert_eq!(logged[1][2], "save");
    assert!(logged[1][1].contains("quota exceeded"));
}

#[tokio::test]
async fn test_progress_observer_sees_stages_in_order() {
    let seen: Arc<Mutex<Vec<(Stage, usize, usize)>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let observer = move |stage: Stage, current: usize, total: usize, _msg: &str| {
        sink.lock().unwrap().push((stage, current, total));
    };

    let pipeline = Pipeline::new(settings().build(), Arc::new(fixture_search()), Arc::new(fixture_fetcher()))
        .with_sheets(Arc::new(MemoryStore::new()));
    pipeline.run(&[SearchQuery::new("dental clinic", "Pune")], Some(&observer)).await;

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.first(), Some(&(Stage::Search, 0, 1)));
    assert_eq!(seen.last(), Some(&(Stage::Save, 1, 1)));

    let order = [Stage::Search, Stage::Scrape, Stage::Score, Stage::Enrich, Stage::Save];
    let ranks: Vec<usize> = seen.iter().map(|(s, _, _)| order.iter().position(|o| o == s).unwrap()).collect();
    assert!(ranks.windows(2).all(|w| w[0] <= w[1]));

    let scraped = seen.iter().filter(|(s, c, _)| *s == Stage::Scrape && *c > 0).count();
    assert_eq!(scraped, 4);
}

#[tokio::test]
async fn test_empty_queries_use_defaults() {
    let search = Arc::new(StubSearch::default());
    let pipeline = Pipeline::new(settings().build(), search.clone(), Arc::new(FixtureFetcher::default()));

    let result = pipeline.run(&[], None).await;

    let asked = search.asked();
    assert_eq!(asked.len(), 10);
    assert_eq!(asked[0], "wedding planner in Mumbai");
    assert!(result.qualified_leads.is_empty());
    assert!(result.started_at <= result.finished_at);
}
