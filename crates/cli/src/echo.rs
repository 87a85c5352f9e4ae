use std::time::Duration;

use leadgen_core::{Lead, PipelineResult, Stage};
use owo_colors::OwoColorize;

use crate::VERSION;

const RULE_WIDTH: usize = 60;

/// Print a styled banner
pub fn print_banner(subtitle: &str) {
    eprintln!("\n{} {} {}", "Leadgen".bold().bright_blue(), "v".dimmed(), VERSION.dimmed());
    eprintln!("{}", format!("{subtitle}\n").dimmed());
}

/// Print the header of a pipeline stage
pub fn print_stage(stage: Stage, total: usize) {
    let step = match stage {
        Stage::Search => 1,
        Stage::Scrape => 2,
        Stage::Score => 3,
        Stage::Enrich => 4,
        Stage::Save => 5,
    };
    eprintln!(
        "{} {} {}",
        format!("[{}/5]", step).dimmed(),
        stage.as_str().to_uppercase().bright_cyan(),
        format!("({total} items)").dimmed()
    );
}

/// Print a success message
pub fn print_success(message: &str) {
    eprintln!("{} {}", "✓".green(), message.bright_green());
}

/// Print an info message
pub fn print_info(message: &str) {
    eprintln!("{} {}", "ℹ".blue(), message.bright_blue());
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow(), message.bright_yellow());
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message.bright_red());
}

/// Print whether a configuration key is present
pub fn print_key(name: &str, set: bool) {
    let status = if set { "set".green().to_string() } else { "missing".red().to_string() };
    eprintln!("  {:<30} {}", format!("{name}:").dimmed(), status);
}

/// Print a plain key/value line
pub fn print_field(label: &str, value: &str) {
    eprintln!("  {:<30} {}", format!("{label}:").dimmed(), value.bright_white());
}

fn print_rule(title: &str) {
    eprintln!("\n{}", "═".repeat(RULE_WIDTH).dimmed());
    eprintln!("{}", title.bold().cyan());
    eprintln!("{}", "═".repeat(RULE_WIDTH).dimmed());
}

/// Print run totals
pub fn print_summary(result: &PipelineResult, elapsed: Duration) {
    print_rule("Run Summary");
    print_field("Time taken", &format_elapsed(elapsed));
    print_field("Scraped", &result.total_scraped.to_string());
    print_field("Scored", &result.total_scored.to_string());
    print_field("Qualified", &result.qualified_leads.len().to_string());
    print_field("Saved to sheet", &result.saved_to_sheet.to_string());
    print_field("Skipped (dup)", &result.skipped_duplicates.to_string());
    print_field("Errors", &result.errors.len().to_string());

    for error in &result.errors {
        print_warning(error);
    }
}

/// Print the best `limit` leads, one line each
pub fn print_top_leads(leads: &[Lead], limit: usize) {
    if leads.is_empty() {
        return;
    }

    print_rule("Top Leads");
    for lead in leads.iter().take(limit) {
        let score = lead.lead_score();
        let badge = format!("[{score:>2}/10]");
        let badge = match score {
            9.. => badge.bright_green().to_string(),
            7..=8 => badge.bright_yellow().to_string(),
            _ => badge.dimmed().to_string(),
        };
        let service = lead.score.as_ref().map_or("", |s| s.service_opportunity.as_str());
        eprintln!(
            "  {} {} {} {} {} {}",
            badge,
            lead.company_name.bright_white(),
            "|".dimmed(),
            lead.city,
            "|".dimmed(),
            service
        );
    }
    eprintln!();
}

/// Format a duration as `1m 05s` or `42s`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 60 { format!("{}m {:02}s", secs / 60, secs % 60) } else { format!("{}s", secs) }
}
