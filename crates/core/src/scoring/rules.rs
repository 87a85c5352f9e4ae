//! Deterministic rule-based lead scoring.
//!
//! A lead with no web presence, or only a social/page-builder page, is an
//! obvious prospect and gets a fixed high score. Otherwise each missing
//! signal adds a penalty point value; the total is rounded and clamped so
//! rule scoring alone never exceeds 8 (the top of the range is left to the
//! AI pass).

use crate::lead::{Lead, RuleResult, RuleTier, SignalSet};
use crate::site::is_weak_site;

/// Score assigned to leads without any website.
pub const NO_WEBSITE_SCORE: u8 = 10;
/// Score assigned to leads whose only link is a placeholder host.
pub const WEAK_SITE_SCORE: u8 = 9;
/// Ceiling for scores computed from website signals.
pub const RULE_SCORE_CAP: u8 = 8;
/// Rule scores at or above this are worth an LLM call.
pub const AI_NEEDED_THRESHOLD: u8 = 5;
/// Copyright years before this mark a site as outdated.
pub const OUTDATED_BEFORE: i32 = 2020;

const OUTDATED_PENALTY: f64 = 1.0;

type Check = fn(&SignalSet) -> bool;

/// Missing-signal penalties in display order. The order of the resulting
/// gap list is part of the output contract.
static PENALTIES: &[(Check, f64, &str)] = &[
    (|s| s.has_ssl, 2.0, "No SSL certificate"),
    (|s| s.has_mobile_viewport, 2.0, "Not mobile optimized"),
    (|s| s.has_whatsapp, 1.5, "No WhatsApp integration"),
    (|s| s.has_booking_form, 1.5, "No online booking/scheduling"),
    (|s| s.has_chatbot, 0.5, "No live chat / chatbot"),
    (|s| s.has_online_payment, 0.5, "No online payment"),
    (|s| s.has_contact_form, 0.5, "No contact form"),
    (|s| s.has_gallery, 0.5, "No gallery/portfolio"),
    (|s| s.has_testimonials, 0.5, "No testimonials/reviews section"),
];

const NO_WEBSITE_GAPS: &[&str] = &[
    "No website",
    "No online booking",
    "No WhatsApp integration",
    "No SSL",
    "No mobile optimization",
    "No chatbot",
    "No payment gateway",
];

const WEAK_SITE_GAPS: &[&str] = &[
    "Only social media page (no real website)",
    "No booking system",
    "No WhatsApp integration",
    "No SSL",
];

/// Which tier a lead falls in, judged from its URLs and fetch flags.
pub fn rule_tier(lead: &Lead) -> RuleTier {
    if lead.signals.no_website || (lead.website.is_empty() && lead.raw_url.is_empty()) {
        RuleTier::NoWebsite
    } else if !lead.raw_url.is_empty() && is_weak_site(&lead.raw_url) {
        RuleTier::WeakSite
    } else {
        RuleTier::HasWebsite
    }
}

/// Scores a lead. Pure function, no I/O.
pub fn rule_score(lead: &Lead) -> RuleResult {
    match rule_tier(lead) {
        RuleTier::NoWebsite => RuleResult {
            rule_score: NO_WEBSITE_SCORE,
            rule_gaps: to_strings(NO_WEBSITE_GAPS),
            rule_tier: RuleTier::NoWebsite,
            ai_needed: false,
        },
        RuleTier::WeakSite => RuleResult {
            rule_score: WEAK_SITE_SCORE,
            rule_gaps: to_strings(WEAK_SITE_GAPS),
            rule_tier: RuleTier::WeakSite,
            ai_needed: false,
        },
        RuleTier::HasWebsite => {
            let (points, gaps) = penalty_points(&lead.signals);
            let rule_score = clamp_score(points);
            RuleResult { rule_score, rule_gaps: gaps, rule_tier: RuleTier::HasWebsite, ai_needed: rule_score >= AI_NEEDED_THRESHOLD }
        }
    }
}

/// Unclamped penalty total and gap list for a site's signals.
pub fn penalty_points(signals: &SignalSet) -> (f64, Vec<String>) {
    let mut points = 0.0;
    let mut gaps = Vec::new();

    for (present, weight, gap) in PENALTIES {
        if !present(signals) {
            points += weight;
            gaps.push(gap.to_string());
        }
    }

    if let Some(year) = signals.copyright_year
        && year < OUTDATED_BEFORE
    {
        points += OUTDATED_PENALTY;
        gaps.push(format!("Website last updated {} (very outdated)", year));
    }

    if signals.tech_stack_detected.iter().any(|t| t == "WordPress") {
        gaps.push("WordPress site (easy to modernize)".to_string());
    }

    (points, gaps)
}

/// Rounds half to even and clamps into `1..=8`.
fn clamp_score(points: f64) -> u8 {
    points.round_ties_even().clamp(1.0, RULE_SCORE_CAP as f64) as u8
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
