//! Digital-presence signal extraction from a fetched page.
//!
//! Signals are plain case-insensitive substring checks against known
//! markers: widget script hosts, payment gateway names, booking tools,
//! CMS fingerprints. The page title, description and headings come from
//! a parsed DOM; the text snippet is a tag-stripped, whitespace-collapsed
//! preview.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use crate::lead::{SignalSet, truncate_chars};

const TITLE_MAX: usize = 120;
const DESCRIPTION_MAX: usize = 200;
const SNIPPET_MAX: usize = 600;
const HEADINGS_MAX: usize = 5;

const WHATSAPP_MARKERS: &[&str] = &["wa.me", "api.whatsapp", "whatsapp.com/send"];
const BOOKING_MARKERS: &[&str] = &["calendly", "book now", "book appointment", "schedule", "typeform", "hubspot"];
const CHATBOT_MARKERS: &[&str] = &["tawk.to", "livechat", "freshchat", "intercom", "crisp.chat", "tidio"];
const PAYMENT_MARKERS: &[&str] = &["razorpay", "paytm", "upi", "phonepay", "instamojo", "cashfree"];
const CONTACT_FORM_MARKERS: &[&str] = &["contact form", "contact us", "<form", "contact-form"];
const GALLERY_MARKERS: &[&str] = &["gallery", "portfolio", "our work", "projects"];
const TESTIMONIAL_MARKERS: &[&str] = &["testimonial", "review", "what our clients"];
const BLOG_MARKERS: &[&str] = &["/blog", "/news", "/articles", "blog post"];
const SOCIAL_MARKERS: &[&str] = &["instagram.com", "facebook.com", "twitter.com", "linkedin.com"];

/// Platform fingerprints, in reporting order.
const TECH_FINGERPRINTS: &[(&str, &[&str])] = &[
    ("WordPress", &["wp-content", "wordpress"]),
    ("Shopify", &["shopify"]),
    ("Wix", &["wix.com"]),
    ("Squarespace", &["squarespace"]),
    ("Webflow", &["webflow"]),
    ("React/Next", &["react", "next.js"]),
];

static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap());
static STYLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static COPYRIGHT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"©\s*(\d{4})").unwrap());

static TITLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static META_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("meta[name][content]").unwrap());
static HEADING_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1, h2, h3").unwrap());

/// Extracts the full signal set from a page body.
///
/// `url` is the final URL after redirects; `has_ssl` is purely whether it
/// uses `https://`.
pub fn extract_signals(html: &str, url: &str) -> SignalSet {
    let lower = html.to_lowercase();
    let doc = Html::parse_document(html);

    SignalSet {
        page_title: page_title(&doc),
        meta_desc: meta_description(&doc),
        headings: headings(&doc),
        page_snippet: text_snippet(html),
        final_url: url.to_string(),

        has_ssl: url.starts_with("https://"),
        has_mobile_viewport: lower.contains("viewport") && lower.contains("width=device-width"),
        has_whatsapp: contains_any(&lower, WHATSAPP_MARKERS),
        has_booking_form: contains_any(&lower, BOOKING_MARKERS),
        has_chatbot: contains_any(&lower, CHATBOT_MARKERS),
        has_online_payment: contains_any(&lower, PAYMENT_MARKERS),
        has_contact_form: contains_any(&lower, CONTACT_FORM_MARKERS),
        has_gallery: contains_any(&lower, GALLERY_MARKERS),
        has_testimonials: contains_any(&lower, TESTIMONIAL_MARKERS),
        has_blog: contains_any(&lower, BLOG_MARKERS),
        has_social_links: contains_any(&lower, SOCIAL_MARKERS),

        copyright_year: copyright_year(html),
        tech_stack_detected: tech_stack(&lower),

        no_website: false,
        scrape_failed: false,
        scrape_error: String::new(),
    }
}

/// Year following a `©` glyph, if any. A page with no notice yields `None`.
pub fn copyright_year(html: &str) -> Option<i32> {
    COPYRIGHT_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Recognized platforms found in a lowercased page body.
pub fn tech_stack(lower_html: &str) -> Vec<String> {
    TECH_FINGERPRINTS
        .iter()
        .filter(|(_, markers)| contains_any(lower_html, markers))
        .map(|(name, _)| (*name).to_string())
        .collect()
}

/// Whitespace-normalized visible text, scripts and styles removed.
pub fn text_snippet(html: &str) -> String {
    let text = SCRIPT_RE.replace_all(html, "");
    let text = STYLE_RE.replace_all(&text, "");
    let text = TAG_RE.replace_all(&text, " ");
    let text = WHITESPACE_RE.replace_all(&text, " ");
    truncate_chars(text.trim(), SNIPPET_MAX)
}

fn page_title(doc: &Html) -> String {
    doc.select(&TITLE_SELECTOR)
        .next()
        .map(|el| truncate_chars(el.text().collect::<String>().trim(), TITLE_MAX))
        .unwrap_or_default()
}

fn meta_description(doc: &Html) -> String {
    doc.select(&META_SELECTOR)
        .find(|el| {
            el.value()
                .attr("name")
                .is_some_and(|name| name.eq_ignore_ascii_case("description"))
        })
        .and_then(|el| el.value().attr("content"))
        .map(|content| truncate_chars(content.trim(), DESCRIPTION_MAX))
        .unwrap_or_default()
}

fn headings(doc: &Html) -> String {
    doc.select(&HEADING_SELECTOR)
        .take(HEADINGS_MAX)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .collect::<Vec<_>>()
        .join(" | ")
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
