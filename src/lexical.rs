//! URL-string features. Pure and total: any input, however malformed,
//! produces a full set of values.

use crate::types::{LexicalFeatures, ParsedUrl};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static IP_HOST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+\.\d+$").expect("valid IP pattern"));

static TLD_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.(com|org|net|info|biz|io)").expect("valid TLD pattern"));

static DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d").expect("valid digit pattern"));

static WORD_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\W_]+").expect("valid separator pattern"));

const SHORTENING_SERVICES: [&str; 5] = ["bit.ly", "tinyurl.com", "goo.gl", "t.co", "ow.ly"];

const SUSPICIOUS_TLDS: [&str; 5] = ["tk", "ga", "cf", "ml", "gq"];

const PHISHING_HINTS: [&str; 5] = ["secure", "login", "bank", "account", "verify"];

pub fn analyze(url: &str) -> LexicalFeatures {
    let parsed = ParsedUrl::parse(url);
    let hostname = parsed.hostname.to_lowercase();
    let url_lower = url.to_lowercase();

    let url_len = url.chars().count();
    let host_len = hostname.chars().count();

    let subdomain_count = hostname.split('.').count().saturating_sub(2);

    let raw_words = split_words(url);
    let host_words = split_words(&hostname);
    let path_words = split_words(&parsed.path);

    let features = LexicalFeatures {
        length_url: url_len as f64,
        length_hostname: host_len as f64,
        ip: flag(IP_HOST.is_match(&hostname)),
        nb_dots: count_char(url, '.'),
        nb_hyphens: count_char(url, '-'),
        nb_at: count_char(url, '@'),
        nb_qm: count_char(url, '?'),
        nb_and: count_char(url, '&'),
        nb_slash: count_char(url, '/'),
        nb_semicolumn: count_char(url, ';'),
        nb_www: flag(hostname.contains("www")),
        nb_com: flag(url_lower.contains(".com")),
        // Looks for the literal token in the host, not the scheme.
        https_token: flag(hostname.contains("https")),
        ratio_digits_url: digit_ratio(url),
        ratio_digits_host: digit_ratio(&hostname),
        tld_in_subdomain: flag(tld_in_first_label(&hostname)),
        abnormal_subdomain: flag(subdomain_count > 2),
        nb_subdomains: subdomain_count as f64,
        prefix_suffix: flag(hostname.contains('-')),
        shortening_service: flag(SHORTENING_SERVICES.iter().any(|s| hostname.contains(s))),
        length_words_raw: raw_words.len() as f64,
        shortest_word_host: shortest(&host_words),
        longest_words_raw: longest(&raw_words),
        longest_word_host: longest(&host_words),
        avg_words_raw: average(&raw_words),
        avg_word_host: average(&host_words),
        avg_word_path: average(&path_words),
        phish_hints: flag(PHISHING_HINTS.iter().any(|h| url_lower.contains(h))),
        suspecious_tld: flag(
            SUSPICIOUS_TLDS
                .iter()
                .any(|tld| hostname.ends_with(&format!(".{}", tld))),
        ),
        // Reserved for an external statistical-report feed.
        statistical_report: 0.0,
    };

    debug!(hostname = %hostname, "lexical features: {:?}", features);
    features
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn count_char(text: &str, needle: char) -> f64 {
    text.chars().filter(|c| *c == needle).count() as f64
}

fn digit_ratio(text: &str) -> f64 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    // Decimal digits (Nd) only; numerals such as `Ⅻ` or `½` do not count.
    let digits = DIGIT.find_iter(text).count();
    digits as f64 / total as f64
}

/// The pattern requires a dot, which a single label never holds, so this is
/// `0` for every host.
fn tld_in_first_label(hostname: &str) -> bool {
    let first = hostname.split('.').next().unwrap_or_default();
    TLD_TOKEN.is_match(first)
}

/// Splits on runs of non-word characters. Leading and trailing separators
/// produce empty tokens, and empty input yields a single empty token.
fn split_words(text: &str) -> Vec<usize> {
    WORD_SEPARATOR
        .split(text)
        .map(|word| word.chars().count())
        .collect()
}

fn shortest(words: &[usize]) -> f64 {
    words.iter().min().copied().unwrap_or(0) as f64
}

fn longest(words: &[usize]) -> f64 {
    words.iter().max().copied().unwrap_or(0) as f64
}

fn average(words: &[usize]) -> f64 {
    if words.is_empty() {
        return 0.0;
    }
    words.iter().sum::<usize>() as f64 / words.len() as f64
}
