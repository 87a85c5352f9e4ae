use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use leadgen_core::config::{DEFAULT_MAX_CONCURRENT_SCRAPES, DEFAULT_MIN_SCORE};
use leadgen_core::{Config, Pipeline, PipelineResult, SearchQuery, Stage};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod echo;
mod schedule;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const TOP_LEADS: usize = 5;

/// Find, score and save website-services leads for Indian small businesses
#[derive(Parser, Debug)]
#[command(name = "leadgen")]
#[command(author = "Leadgen Contributors")]
#[command(version)]
#[command(about = "Find and qualify small-business leads", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline once
    Run(RunArgs),
    /// Show which settings are present and validate them
    CheckConfig {
        /// Also require Google Sheets settings
        #[arg(long)]
        require_sheets: bool,
    },
}

/// Credentials and limits, usually taken from the environment or `.env`
#[derive(Args, Debug)]
struct Settings {
    /// SerpAPI key
    #[arg(long, env = "SERPAPI_KEY", hide_env_values = true)]
    serpapi_key: Option<String>,

    /// Key for the OpenAI-compatible chat endpoint
    #[arg(long, env = "OPENROUTER_KEY", hide_env_values = true)]
    llm_key: Option<String>,

    /// Hunter.io key for email enrichment
    #[arg(long, env = "HUNTER_KEY", hide_env_values = true)]
    hunter_key: Option<String>,

    /// Google Sheets spreadsheet id
    #[arg(long, env = "SHEET_ID")]
    sheet_id: Option<String>,

    /// Service-account key as inline JSON
    #[arg(long, env = "GOOGLE_SERVICE_ACCOUNT_JSON", hide_env_values = true)]
    service_account_json: Option<String>,

    /// Service-account key file, read when no inline JSON is given
    #[arg(long, env = "GOOGLE_SERVICE_ACCOUNT_FILE", default_value = "service_account.json", value_name = "FILE")]
    service_account_file: PathBuf,

    /// Minimum final score for a lead to qualify
    #[arg(long, env = "MIN_SCORE", default_value_t = DEFAULT_MIN_SCORE, value_name = "SCORE")]
    min_score: u8,

    /// Concurrent website fetches
    #[arg(long, env = "MAX_CONCURRENT", default_value_t = DEFAULT_MAX_CONCURRENT_SCRAPES, value_name = "NUM")]
    max_concurrent: usize,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Search target as "<business type> in <city>"; repeatable
    #[arg(short, long = "query", value_name = "QUERY", value_parser = parse_query)]
    queries: Vec<SearchQuery>,

    /// Use the weekly rotating query list for today
    #[arg(long, conflicts_with = "queries")]
    schedule: bool,

    /// Weekday for --schedule (0 = Monday)
    #[arg(long, requires = "schedule", value_parser = clap::value_parser!(u8).range(0..7))]
    day: Option<u8>,

    /// JSON array of [business_type, city] pairs
    #[arg(long = "queries-json", env = "SEARCH_QUERIES", value_name = "JSON")]
    queries_json: Option<String>,

    /// Fail unless Google Sheets is configured (implied by --schedule)
    #[arg(long)]
    require_sheets: bool,

    /// Write the full result as JSON to this file
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Print the full result as JSON to stdout
    #[arg(long)]
    json: bool,
}

fn parse_query(text: &str) -> Result<SearchQuery, String> {
    let query = SearchQuery::parse(text);
    if query.city.is_empty() {
        return Err(format!("no known city in '{}', expected \"<business type> in <city>\"", text.trim()));
    }
    if query.business_type.is_empty() {
        return Err(format!("no business type in '{}'", text.trim()));
    }
    Ok(query)
}

fn parse_queries_json(json: &str) -> anyhow::Result<Vec<SearchQuery>> {
    let pairs: Vec<(String, String)> =
        serde_json::from_str(json).context("SEARCH_QUERIES must be a JSON array of [business_type, city] pairs")?;

    pairs
        .into_iter()
        .map(|(business_type, city)| {
            if business_type.trim().is_empty() || city.trim().is_empty() {
                bail!("SEARCH_QUERIES entries need both a business type and a city");
            }
            Ok(SearchQuery::new(business_type.trim(), city.trim()))
        })
        .collect()
}

/// Picks the queries for a run: explicit flags, then the schedule, then
/// `SEARCH_QUERIES`. An empty list means the pipeline's built-in defaults.
fn resolve_queries(args: &RunArgs) -> anyhow::Result<(Vec<SearchQuery>, String)> {
    if !args.queries.is_empty() {
        return Ok((args.queries.clone(), "command line".to_string()));
    }
    if args.schedule {
        let day = args.day.unwrap_or_else(schedule::today);
        return Ok((schedule::queries_for(day), format!("{} schedule", schedule::day_name(day))));
    }
    if let Some(json) = args.queries_json.as_deref().filter(|j| !j.trim().is_empty()) {
        return Ok((parse_queries_json(json)?, "SEARCH_QUERIES".to_string()));
    }
    Ok((Vec::new(), "defaults".to_string()))
}

fn load_credentials(settings: &Settings) -> anyhow::Result<Option<String>> {
    if let Some(json) = settings.service_account_json.as_deref().filter(|j| !j.trim().is_empty()) {
        return Ok(Some(json.to_string()));
    }

    let path = &settings.service_account_file;
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read service account file: {}", path.display()))?;
    Ok(Some(contents))
}

fn build_config(settings: &Settings) -> anyhow::Result<Config> {
    let mut config = Config::new(
        settings.serpapi_key.clone().unwrap_or_default(),
        settings.llm_key.clone().unwrap_or_default(),
    )
    .min_score(settings.min_score)
    .max_concurrent_scrapes(settings.max_concurrent);

    config.hunter_key = settings.hunter_key.clone();
    config.sheet_id = settings.sheet_id.clone();
    config.sheets_credentials = load_credentials(settings)?;
    Ok(config)
}

fn report_problems(problems: &[String]) -> anyhow::Result<()> {
    if problems.is_empty() {
        return Ok(());
    }
    echo::print_error("Configuration errors:");
    for problem in problems {
        eprintln!("    - {problem}");
    }
    bail!("invalid configuration ({} problem(s))", problems.len())
}

fn check_config(settings: &Settings, require_sheets: bool) -> anyhow::Result<()> {
    let config = build_config(settings)?;

    echo::print_banner("Configuration check");
    echo::print_key("SERPAPI_KEY", !config.serpapi_key.trim().is_empty());
    echo::print_key("OPENROUTER_KEY", !config.llm_api_key.trim().is_empty());
    echo::print_key("HUNTER_KEY (optional)", config.enrichment_key().is_some());
    echo::print_key("SHEET_ID", config.sheet_id.as_deref().is_some_and(|id| !id.trim().is_empty()));
    echo::print_key("Service account", config.sheets_credentials.is_some());
    echo::print_field("MIN_SCORE", &config.min_score.to_string());
    echo::print_field("MAX_CONCURRENT", &config.max_concurrent_scrapes.to_string());
    eprintln!();

    report_problems(&config.validate(require_sheets))?;
    echo::print_success("Configuration OK");
    Ok(())
}

fn write_result(path: &Path, result: &PipelineResult) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(result).context("Failed to serialize result")?;
    fs::write(path, json).with_context(|| format!("Failed to write to file: {}", path.display()))
}

async fn run(settings: &Settings, args: RunArgs) -> anyhow::Result<()> {
    let (queries, source) = resolve_queries(&args)?;
    let config = build_config(settings)?;
    report_problems(&config.validate(args.require_sheets || args.schedule))?;

    echo::print_banner("Lead generation run");
    if queries.is_empty() {
        echo::print_info("No queries given, using the built-in defaults");
    } else {
        let listed: Vec<String> = queries.iter().map(SearchQuery::text).collect();
        echo::print_info(&format!("Queries ({source}): {}", listed.join(", ")));
    }
    if !config.sheets_enabled() {
        echo::print_warning("Google Sheets not configured, results will not be saved");
    }

    let pipeline = Pipeline::from_config(&config).context("Failed to set up pipeline")?;

    let current: Arc<Mutex<Option<Stage>>> = Arc::default();
    let observer = move |stage: Stage, _current: usize, total: usize, _message: &str| {
        let mut current = current.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != Some(stage) {
            *current = Some(stage);
            echo::print_stage(stage, total);
        }
    };

    let started = Instant::now();
    info!(queries = queries.len(), source = source.as_str(), "run started");
    let result = pipeline.run(&queries, Some(&observer)).await;
    info!(elapsed_secs = started.elapsed().as_secs(), "run complete");

    echo::print_summary(&result, started.elapsed());
    echo::print_top_leads(&result.qualified_leads, TOP_LEADS);

    if let Some(path) = &args.output {
        write_result(path, &result)?;
        echo::print_success(&format!("Result written to {}", path.display()));
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&result).context("Failed to serialize result")?);
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info,leadgen_core=debug,leadgen=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run(args) => run(&cli.settings, args).await,
        Command::CheckConfig { require_sheets } => check_config(&cli.settings, require_sheets),
    }
}
