use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Number of features the classifier was fitted on.
pub const FEATURE_COUNT: usize = 46;

/// Sentinel for a feature whose computation failed.
pub const UNDETERMINED: f64 = -1.0;

/// Final verdict for a URL.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Label {
    Legitimate,
    Suspicious,
}

impl Label {
    /// Class `1` is legitimate, anything else is suspicious.
    pub fn from_class(class: u8) -> Self {
        if class == 1 {
            Label::Legitimate
        } else {
            Label::Suspicious
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Legitimate => "Legitimate",
            Label::Suspicious => "Suspicious",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Components of the input URL used by the lexical features.
///
/// Split on the raw text, never normalized: numeric, hex or percent-encoded
/// hosts stay exactly as written. `hostname` is the authority without
/// userinfo, port or IPv6 brackets, lowercased. Input with no `//` authority
/// has an empty hostname.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedUrl {
    pub scheme: String,
    pub hostname: String,
    pub path: String,
    pub query: String,
    pub fragment: String,
}

// RFC 3986 appendix B
static URI_PARTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^(?:([^:/?#]+):)?(?://([^/?#]*))?([^?#]*)(?:\?([^#]*))?(?:#(.*))?$")
        .expect("valid URI pattern")
});

impl ParsedUrl {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let Some(caps) = URI_PARTS.captures(raw) else {
            return Self::default();
        };
        let part = |i: usize| caps.get(i).map_or("", |m| m.as_str());

        Self {
            scheme: part(1).to_lowercase(),
            hostname: host_of(part(2)).to_lowercase(),
            path: part(3).to_string(),
            query: part(4).to_string(),
            fragment: part(5).to_string(),
        }
    }
}

fn host_of(authority: &str) -> &str {
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, rest)| rest);
    if let Some(bracketed) = host_port.strip_prefix('[') {
        return bracketed.split(']').next().unwrap_or_default();
    }
    host_port.split(':').next().unwrap_or_default()
}

/// Fetched page, owned by a single pipeline run.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub status: u16,
    pub body: String,
}

/// Features computed from the URL string alone.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LexicalFeatures {
    pub length_url: f64,
    pub length_hostname: f64,
    pub ip: f64,
    pub nb_dots: f64,
    pub nb_hyphens: f64,
    pub nb_at: f64,
    pub nb_qm: f64,
    pub nb_and: f64,
    pub nb_slash: f64,
    pub nb_semicolumn: f64,
    pub nb_www: f64,
    pub nb_com: f64,
    pub https_token: f64,
    pub ratio_digits_url: f64,
    pub ratio_digits_host: f64,
    pub tld_in_subdomain: f64,
    pub abnormal_subdomain: f64,
    pub nb_subdomains: f64,
    pub prefix_suffix: f64,
    pub shortening_service: f64,
    pub length_words_raw: f64,
    pub shortest_word_host: f64,
    pub longest_words_raw: f64,
    pub longest_word_host: f64,
    pub avg_words_raw: f64,
    pub avg_word_host: f64,
    pub avg_word_path: f64,
    pub phish_hints: f64,
    pub suspecious_tld: f64,
    pub statistical_report: f64,
}

/// Features computed from the fetched page markup.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DomFeatures {
    pub nb_hyperlinks: f64,
    pub ratio_int_hyperlinks: f64,
    pub ratio_ext_redirection: f64,
    pub external_favicon: f64,
    pub links_in_tags: f64,
    pub ratio_int_media: f64,
    pub ratio_ext_media: f64,
    pub safe_anchor: f64,
    pub empty_title: f64,
    pub domain_in_title: f64,
    pub domain_with_copyright: f64,
}

impl DomFeatures {
    pub fn undetermined() -> Self {
        Self {
            nb_hyperlinks: UNDETERMINED,
            ratio_int_hyperlinks: UNDETERMINED,
            ratio_ext_redirection: UNDETERMINED,
            external_favicon: UNDETERMINED,
            links_in_tags: UNDETERMINED,
            ratio_int_media: UNDETERMINED,
            ratio_ext_media: UNDETERMINED,
            safe_anchor: UNDETERMINED,
            empty_title: UNDETERMINED,
            domain_in_title: UNDETERMINED,
            domain_with_copyright: UNDETERMINED,
        }
    }
}

/// Results of the external reputation lookups.
///
/// `page_rank` is reserved for an external ranking service and is always `-1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReputationInfo {
    pub domain_registration_length: f64,
    pub domain_age: f64,
    pub dns_record: f64,
    pub google_index: f64,
    pub page_rank: f64,
}

impl Default for ReputationInfo {
    fn default() -> Self {
        Self {
            domain_registration_length: UNDETERMINED,
            domain_age: UNDETERMINED,
            dns_record: 0.0,
            google_index: UNDETERMINED,
            page_rank: UNDETERMINED,
        }
    }
}

/// Declares the feature record once so that the struct layout, the name list
/// and the vector conversion cannot drift apart.
macro_rules! feature_record {
    ($($field:ident => $name:literal),+ $(,)?) => {
        /// The 46-field vector sent to the classifier, in fitted order.
        #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
        pub struct FeatureRecord {
            $(
                #[serde(rename = $name)]
                pub $field: f64,
            )+
        }

        /// Canonical feature order.
        pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [$($name),+];

        impl FeatureRecord {
            pub fn to_vector(&self) -> [f64; FEATURE_COUNT] {
                [$(self.$field),+]
            }

            pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> {
                FEATURE_NAMES.into_iter().zip(self.to_vector())
            }
        }
    };
}

feature_record! {
    length_url => "length_url",
    length_hostname => "length_hostname",
    ip => "ip",
    nb_dots => "nb_dots",
    nb_hyphens => "nb_hyphens",
    nb_at => "nb_at",
    nb_qm => "nb_qm",
    nb_and => "nb_and",
    nb_slash => "nb_slash",
    nb_semicolumn => "nb_semicolumn",
    nb_www => "nb_www",
    nb_com => "nb_com",
    https_token => "https_token",
    ratio_digits_url => "ratio_digits_url",
    ratio_digits_host => "ratio_digits_host",
    tld_in_subdomain => "tld_in_subdomain",
    abnormal_subdomain => "abnormal_subdomain",
    nb_subdomains => "nb_subdomains",
    prefix_suffix => "prefix_suffix",
    shortening_service => "shortening_service",
    length_words_raw => "length_words_raw",
    shortest_word_host => "shortest_word_host",
    longest_words_raw => "longest_words_raw",
    longest_word_host => "longest_word_host",
    avg_words_raw => "avg_words_raw",
    avg_word_host => "avg_word_host",
    avg_word_path => "avg_word_path",
    phish_hints => "phish_hints",
    suspecious_tld => "suspecious_tld",
    statistical_report => "statistical_report",
    nb_hyperlinks => "nb_hyperlinks",
    ratio_int_hyperlinks => "ratio_intHyperlinks",
    ratio_ext_redirection => "ratio_extRedirection",
    external_favicon => "external_favicon",
    links_in_tags => "links_in_tags",
    ratio_int_media => "ratio_intMedia",
    ratio_ext_media => "ratio_extMedia",
    safe_anchor => "safe_anchor",
    empty_title => "empty_title",
    domain_in_title => "domain_in_title",
    domain_with_copyright => "domain_with_copyright",
    domain_registration_length => "domain_registration_length",
    domain_age => "domain_age",
    dns_record => "dns_record",
    google_index => "google_index",
    page_rank => "page_rank",
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub decision_id: Uuid,
    pub label: Label,
    pub features: FeatureRecord,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyRequest {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyResponse {
    pub label: Label,
    pub decision_id: Uuid,
    pub latency_ms: f64,
    pub features: FeatureRecord,
}

impl From<ClassificationResult> for ClassifyResponse {
    fn from(result: ClassificationResult) -> Self {
        Self {
            label: result.label,
            decision_id: result.decision_id,
            latency_ms: result.latency_ms,
            features: result.features,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSchemaResponse {
    pub count: usize,
    pub names: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_names_are_unique() {
        let mut names = FEATURE_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), FEATURE_COUNT);
    }

    #[test]
    fn test_feature_order_boundaries() {
        assert_eq!(FEATURE_NAMES[0], "length_url");
        assert_eq!(FEATURE_NAMES[29], "statistical_report");
        assert_eq!(FEATURE_NAMES[30], "nb_hyperlinks");
        assert_eq!(FEATURE_NAMES[40], "domain_with_copyright");
        assert_eq!(FEATURE_NAMES[45], "page_rank");
    }

    #[test]
    fn test_serialization_keeps_canonical_order() {
        let values: Vec<f64> = (0..FEATURE_COUNT).map(|i| i as f64).collect();
        let record: FeatureRecord = serde_json::from_value(serde_json::Value::Object(
            FEATURE_NAMES
                .iter()
                .zip(values.iter())
                .map(|(name, value)| (name.to_string(), serde_json::json!(value)))
                .collect(),
        ))
        .unwrap();
        assert_eq!(record.to_vector().to_vec(), values);

        let serialized = serde_json::to_string(&record).unwrap();
        let mut last = 0;
        for name in FEATURE_NAMES {
            let pos = serialized.find(&format!("\"{}\"", name)).unwrap();
            assert!(pos >= last, "{} out of order", name);
            last = pos;
        }
    }

    #[test]
    fn test_label_mapping() {
        assert_eq!(Label::from_class(1), Label::Legitimate);
        assert_eq!(Label::from_class(0), Label::Suspicious);
        assert_eq!(Label::from_class(7), Label::Suspicious);
        assert_eq!(Label::Legitimate.to_string(), "Legitimate");
    }

    #[test]
    fn test_parse_strips_port_and_userinfo() {
        let parsed = ParsedUrl::parse("https://user:pw@Example.com:8443/a/b?x=1#frag");
        assert_eq!(parsed.scheme, "https");
        assert_eq!(parsed.hostname, "example.com");
        assert_eq!(parsed.path, "/a/b");
        assert_eq!(parsed.query, "x=1");
        assert_eq!(parsed.fragment, "frag");
    }

    #[test]
    fn test_parse_keeps_raw_host_text() {
        assert_eq!(ParsedUrl::parse("http://3232235521/").hostname, "3232235521");
        assert_eq!(ParsedUrl::parse("http://0x7f.1/x").hostname, "0x7f.1");
        assert_eq!(ParsedUrl::parse("http://b%C3%BCcher.de/").hostname, "b%c3%bccher.de");
        assert_eq!(ParsedUrl::parse("http://bücher.de/").hostname, "bücher.de");
        assert_eq!(ParsedUrl::parse("http://[::1]:8080/").hostname, "::1");
    }

    #[test]
    fn test_parse_without_authority_has_no_host() {
        let parsed = ParsedUrl::parse("not a url");
        assert_eq!(parsed.hostname, "");
        assert_eq!(parsed.path, "not a url");

        assert_eq!(ParsedUrl::parse(""), ParsedUrl::default());
    }
}
