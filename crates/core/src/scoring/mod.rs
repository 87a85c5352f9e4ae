//! Lead scoring.
//!
//! Every lead is scored by the deterministic rules in [`rules`]. Leads with
//! a real website and a high enough rule score are then offered to an
//! [`AiScorer`]; the two results are combined into a single [`LeadScore`].

pub mod ai;
pub mod rules;

pub use ai::{AiAssessment, AiScorer, LlmScorer, RetryPolicy};
pub use rules::{rule_score, rule_tier};

use tracing::debug;

use crate::lead::{DealSize, Lead, LeadScore, RuleResult, RuleTier, ScoredBy, Urgency};

/// Scores a lead and stores both the rule result and the final score on it.
///
/// `ai` is `None` when no model is configured; such leads are scored by
/// rules alone and marked `RULE_AUTO`.
pub async fn score_lead(lead: &mut Lead, ai: Option<&dyn AiScorer>) {
    let rule = rule_score(lead);
    // the prompt builder reads the gaps off the lead
    lead.rule = Some(rule.clone());

    let score = match ai {
        Some(scorer) if rule.ai_needed => match scorer.ai_score(lead).await {
            Some(assessment) => from_assessment(assessment, &rule),
            None => {
                debug!(lead = %lead.company_name, "AI unavailable, using rule fallback");
                rule_fallback(&rule)
            }
        },
        _ => rule_auto(lead, &rule),
    };

    lead.score = Some(score);
}

/// Final score from a usable model answer. A missing model score falls back
/// to the rule score.
pub fn from_assessment(assessment: AiAssessment, rule: &RuleResult) -> LeadScore {
    LeadScore {
        lead_score: assessment.lead_score.unwrap_or(rule.rule_score),
        service_opportunity: assessment.service_opportunity,
        gaps_found: assessment.gaps_found,
        reasoning: assessment.reasoning,
        recommended_pitch: assessment.recommended_pitch,
        urgency: assessment.urgency,
        estimated_deal_size: assessment.estimated_deal_size,
        scored_by: ScoredBy::Ai,
    }
}

/// Final score when the model was needed but could not answer.
pub fn rule_fallback(rule: &RuleResult) -> LeadScore {
    LeadScore {
        lead_score: rule.rule_score,
        service_opportunity: "Digital Presence Upgrade".to_string(),
        gaps_found: top_gaps(&rule.rule_gaps, 3),
        reasoning: format!("Rule-based score: {}/10 based on {} missing signals", rule.rule_score, rule.rule_gaps.len()),
        recommended_pitch: upgrade_pitch(&rule.rule_gaps),
        urgency: Urgency::Medium,
        estimated_deal_size: DealSize::Medium,
        scored_by: ScoredBy::RuleFallback,
    }
}

/// Final score for leads that never go to the model.
pub fn rule_auto(lead: &Lead, rule: &RuleResult) -> LeadScore {
    let reasoning = format!("Auto-scored {}/10: {}", rule.rule_score, rule.rule_tier);

    let (service_opportunity, gaps_found, recommended_pitch, urgency) = match rule.rule_tier {
        RuleTier::NoWebsite => (
            "Website Development".to_string(),
            "Business has no website, completely invisible online".to_string(),
            format!(
                "{} ka koi website nahi hai - hum 7 din mein professional website bana sakte hain jo WhatsApp pe directly customers bheje.",
                lead.company_name
            ),
            Urgency::High,
        ),
        RuleTier::WeakSite => (
            "Professional Website".to_string(),
            "Only Instagram/Facebook page, no professional web presence".to_string(),
            "Sirf Instagram se business chalana risky hai - ek professional website aapko Google pe visible karega."
                .to_string(),
            Urgency::High,
        ),
        RuleTier::HasWebsite => (
            "Digital Presence Upgrade".to_string(),
            top_gaps(&rule.rule_gaps, 3),
            upgrade_pitch(&rule.rule_gaps),
            // a site scoring below the AI threshold is already in decent shape
            if rule.ai_needed { Urgency::Medium } else { Urgency::Low },
        ),
    };

    LeadScore {
        lead_score: rule.rule_score,
        service_opportunity,
        gaps_found,
        reasoning,
        recommended_pitch,
        urgency,
        estimated_deal_size: DealSize::Medium,
        scored_by: ScoredBy::RuleAuto,
    }
}

fn top_gaps(gaps: &[String], n: usize) -> String {
    gaps.iter().take(n).cloned().collect::<Vec<_>>().join(", ")
}

fn upgrade_pitch(gaps: &[String]) -> String {
    let focus = top_gaps(gaps, 2);
    if focus.is_empty() {
        "Aapke business ki digital presence mein improvements ki zaroorat hai.".to_string()
    } else {
        format!("Aapke business ki digital presence mein improvements ki zaroorat hai - {}", focus)
    }
}
