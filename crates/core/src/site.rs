//! URL and domain classification.
//!
//! Search results often point at directories, marketplaces or social pages
//! rather than a business's own site. These helpers decide which links are
//! worth treating as a real website.

use url::Url;

/// Directory, aggregator and social hosts that never count as a business's own site.
pub const DIRECTORY_DOMAINS: &[&str] = &[
    "justdial.com",
    "sulekha.com",
    "indiamart.com",
    "practo.com",
    "lybrate.com",
    "urbanclap.com",
    "google.com",
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "youtube.com",
    "wikipedia.org",
    "quora.com",
    "reddit.com",
    "99acres.com",
    "magicbricks.com",
    "housing.com",
    "yellowpages.in",
    "tradeindia.com",
    "linktr.ee",
    "linktree.com",
    "sites.google.com",
    "zomato.com",
    "swiggy.com",
    "amazon.in",
    "flipkart.com",
    "naukri.com",
    "linkedin.com",
    "olx.in",
    "quikr.com",
    "clickindia.com",
    "vivastreet.co.in",
];

/// Social and page-builder placeholder hosts. A business whose only link is
/// one of these has no real website.
pub const WEAK_DOMAINS: &[&str] = &["instagram.com", "facebook.com", "sites.google.com", "linktr.ee", "linktree.com"];

/// Extracts the lowercase host of a URL without a leading `www.`.
///
/// Scheme-less input such as `example.in/about` is accepted. Returns an
/// empty string when nothing sensible can be parsed.
pub fn extract_domain(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return String::new();
    }

    match Url::parse(&with_scheme(url)) {
        Ok(parsed) => parsed
            .host_str()
            .map(|host| host.to_lowercase().replace("www.", ""))
            .unwrap_or_default(),
        Err(_) => String::new(),
    }
}

/// True for empty URLs and social/page-builder placeholders.
pub fn is_weak_site(url: &str) -> bool {
    if url.trim().is_empty() {
        return true;
    }
    matches_any(&extract_domain(url), WEAK_DOMAINS)
}

/// True when the URL points at a directory or aggregator listing.
pub fn is_directory_site(url: &str) -> bool {
    matches_any(&extract_domain(url), DIRECTORY_DOMAINS)
}

/// Normalizes a URL for fetching by adding `https://` when no scheme is present.
pub fn with_scheme(url: &str) -> String {
    let url = url.trim();
    if has_scheme(url) { url.to_string() } else { format!("https://{}", url) }
}

fn has_scheme(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn matches_any(domain: &str, list: &[&str]) -> bool {
    !domain.is_empty() && list.iter().any(|entry| domain.contains(entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://www.SmileDental.in/contact", "smiledental.in")]
    #[case("smiledental.in", "smiledental.in")]
    #[case("http://shop.example.com:8080/x", "shop.example.com")]
    #[case("httpbin.org/get", "httpbin.org")]
    #[case("HTTPS://Clinic.in", "clinic.in")]
    #[case("", "")]
    #[case("   ", "")]
    fn test_extract_domain(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(extract_domain(input), expected);
    }

    #[rstest]
    #[case("https://instagram.com/glowskin", true)]
    #[case("https://www.facebook.com/pages/x", true)]
    #[case("https://sites.google.com/view/clinic", true)]
    #[case("linktr.ee/salon", true)]
    #[case("", true)]
    #[case("https://glowskin.in", false)]
    fn test_is_weak_site(#[case] url: &str, #[case] weak: bool) {
        assert_eq!(is_weak_site(url), weak);
    }

    #[test]
    fn test_is_directory_site() {
        assert!(is_directory_site("https://www.justdial.com/Pune/Dentists"));
        assert!(is_directory_site("https://www.practo.com/pune/clinic/x"));
        assert!(!is_directory_site("https://www.brightsmiles.co.in"));
        assert!(!is_directory_site(""));
    }

    #[test]
    fn test_with_scheme() {
        assert_eq!(with_scheme("acme.in"), "https://acme.in");
        assert_eq!(with_scheme("http://acme.in"), "http://acme.in");
        assert_eq!(with_scheme("  https://acme.in "), "https://acme.in");
        assert_eq!(with_scheme("httpbin.org"), "https://httpbin.org");
        assert_eq!(with_scheme("https-tools.in"), "https://https-tools.in");
    }
}
