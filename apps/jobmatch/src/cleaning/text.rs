//! Text normalisation rules shared by job postings and the resume.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{node::Node, Html};

/// Elements whose text never reaches the output.
const IGNORED_TAGS: &[&str] = &["script", "style", "noscript"];

/// Known spellings of a location, matched as substrings in order.
const LOCATION_TABLE: &[(&str, &str)] = &[
    ("st louis", "saint louis, mo"),
    ("st. louis", "saint louis, mo"),
    ("saint louis", "saint louis, mo"),
    ("st louis mo", "saint louis, mo"),
    ("st. louis, mo", "saint louis, mo"),
    ("saint louis, missouri", "saint louis, mo"),
    ("st louis, missouri", "saint louis, mo"),
];

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static SPECIAL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^0-9A-Za-z.,;:\-()\s%/@#&+']").expect("valid regex"));
static LOCATION_NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s,.]").expect("valid regex"));

/// Collapses every whitespace run to one space and trims the ends.
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Replaces anything outside the allowed character set with a space.
pub fn remove_special_characters(text: &str) -> String {
    SPECIAL_CHARS.replace_all(text, " ").into_owned()
}

/// Visible text of an HTML fragment, one space between text nodes.
pub fn html_to_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let fragment = Html::parse_fragment(html);
    let mut pieces = Vec::new();
    for node in fragment.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            matches!(a.value(), Node::Element(e) if IGNORED_TAGS.contains(&e.name()))
        });
        let piece = text.trim();
        if !hidden && !piece.is_empty() {
            pieces.push(piece);
        }
    }
    normalize_whitespace(&pieces.join(" "))
}

/// Lower-cases and strips punctuation from an address, then maps known
/// spellings onto a canonical form. Unknown locations pass through cleaned.
pub fn normalize_location(location: &str) -> String {
    let lowered = location.trim().to_lowercase();
    if lowered.is_empty() {
        return lowered;
    }
    let cleaned = LOCATION_NOISE
        .replace_all(&lowered, "")
        .replace("missouri", "mo")
        .replace("county", "");

    LOCATION_TABLE
        .iter()
        .find(|(spelling, _)| cleaned.contains(spelling))
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| normalize_whitespace(&cleaned))
}
