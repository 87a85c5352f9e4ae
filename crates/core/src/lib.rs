pub mod config;
pub mod enrich;
pub mod error;
pub mod fetch;
pub mod lead;
pub mod pipeline;
pub mod scoring;
pub mod search;
pub mod sheets;
pub mod signals;
pub mod site;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use enrich::{Contact, EmailFinder, HunterClient};
pub use error::{LeadgenError, Result};
pub use fetch::{FetchConfig, HttpFetcher, PageFetcher, build_client};
pub use lead::{DealSize, Lead, LeadScore, RuleResult, RuleTier, ScoredBy, SignalSet, Urgency};
pub use pipeline::{Pipeline, PipelineConfig, PipelineConfigBuilder, PipelineResult, ProgressFn, Stage, qualify};
pub use scoring::ai::{AiAssessment, AiScorer, ChatBackend, ChatError, LlmScorer, OpenAiCompatBackend, RetryPolicy};
pub use scoring::{rule_score, rule_tier, score_lead};
pub use search::{SearchProvider, SearchQuery, SerpApiClient};
pub use sheets::{GoogleSheets, MemoryStore, SaveStats, ServiceAccountKey, SheetStore, Worksheet, save_leads};
pub use signals::extract_signals;
pub use site::{extract_domain, is_directory_site, is_weak_site};
