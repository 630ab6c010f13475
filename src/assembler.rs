use crate::{
    error::FeatureError,
    types::{DomFeatures, FeatureRecord, LexicalFeatures, ReputationInfo, UNDETERMINED},
};
use tracing::warn;

/// Merges the feature groups into the canonical 46-field record.
///
/// A failed DOM group replaces all 11 DOM fields with `-1`. A failed lexical
/// group replaces the lexical and DOM blocks (41 fields). Reputation values
/// pass through unchanged; each lookup has already applied its own default.
pub fn assemble(
    lexical: Result<LexicalFeatures, FeatureError>,
    dom: Result<DomFeatures, FeatureError>,
    reputation: ReputationInfo,
) -> FeatureRecord {
    let (lexical, dom) = match (lexical, dom) {
        (Ok(lexical), Ok(dom)) => (lexical, dom),
        (Ok(lexical), Err(e)) => {
            warn!("DOM features degraded: {}", e);
            metrics::counter!("degraded_steps_total", "step" => "dom").increment(1);
            (lexical, DomFeatures::undetermined())
        }
        (Err(e), _) => {
            warn!("Lexical and DOM features degraded: {}", e);
            metrics::counter!("degraded_steps_total", "step" => "lexical").increment(1);
            (undetermined_lexical(), DomFeatures::undetermined())
        }
    };

    FeatureRecord {
        length_url: lexical.length_url,
        length_hostname: lexical.length_hostname,
        ip: lexical.ip,
        nb_dots: lexical.nb_dots,
        nb_hyphens: lexical.nb_hyphens,
        nb_at: lexical.nb_at,
        nb_qm: lexical.nb_qm,
        nb_and: lexical.nb_and,
        nb_slash: lexical.nb_slash,
        nb_semicolumn: lexical.nb_semicolumn,
        nb_www: lexical.nb_www,
        nb_com: lexical.nb_com,
        https_token: lexical.https_token,
        ratio_digits_url: lexical.ratio_digits_url,
        ratio_digits_host: lexical.ratio_digits_host,
        tld_in_subdomain: lexical.tld_in_subdomain,
        abnormal_subdomain: lexical.abnormal_subdomain,
        nb_subdomains: lexical.nb_subdomains,
        prefix_suffix: lexical.prefix_suffix,
        shortening_service: lexical.shortening_service,
        length_words_raw: lexical.length_words_raw,
        shortest_word_host: lexical.shortest_word_host,
        longest_words_raw: lexical.longest_words_raw,
        longest_word_host: lexical.longest_word_host,
        avg_words_raw: lexical.avg_words_raw,
        avg_word_host: lexical.avg_word_host,
        avg_word_path: lexical.avg_word_path,
        phish_hints: lexical.phish_hints,
        suspecious_tld: lexical.suspecious_tld,
        statistical_report: lexical.statistical_report,
        nb_hyperlinks: dom.nb_hyperlinks,
        ratio_int_hyperlinks: dom.ratio_int_hyperlinks,
        ratio_ext_redirection: dom.ratio_ext_redirection,
        external_favicon: dom.external_favicon,
        links_in_tags: dom.links_in_tags,
        ratio_int_media: dom.ratio_int_media,
        ratio_ext_media: dom.ratio_ext_media,
        safe_anchor: dom.safe_anchor,
        empty_title: dom.empty_title,
        domain_in_title: dom.domain_in_title,
        domain_with_copyright: dom.domain_with_copyright,
        domain_registration_length: reputation.domain_registration_length,
        domain_age: reputation.domain_age,
        dns_record: reputation.dns_record,
        google_index: reputation.google_index,
        page_rank: reputation.page_rank,
    }
}

fn undetermined_lexical() -> LexicalFeatures {
    LexicalFeatures {
        length_url: UNDETERMINED,
        length_hostname: UNDETERMINED,
        ip: UNDETERMINED,
        nb_dots: UNDETERMINED,
        nb_hyphens: UNDETERMINED,
        nb_at: UNDETERMINED,
        nb_qm: UNDETERMINED,
        nb_and: UNDETERMINED,
        nb_slash: UNDETERMINED,
        nb_semicolumn: UNDETERMINED,
        nb_www: UNDETERMINED,
        nb_com: UNDETERMINED,
        https_token: UNDETERMINED,
        ratio_digits_url: UNDETERMINED,
        ratio_digits_host: UNDETERMINED,
        tld_in_subdomain: UNDETERMINED,
        abnormal_subdomain: UNDETERMINED,
        nb_subdomains: UNDETERMINED,
        prefix_suffix: UNDETERMINED,
        shortening_service: UNDETERMINED,
        length_words_raw: UNDETERMINED,
        shortest_word_host: UNDETERMINED,
        longest_words_raw: UNDETERMINED,
        longest_word_host: UNDETERMINED,
        avg_words_raw: UNDETERMINED,
        avg_word_host: UNDETERMINED,
        avg_word_path: UNDETERMINED,
        phish_hints: UNDETERMINED,
        suspecious_tld: UNDETERMINED,
        statistical_report: UNDETERMINED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dom::DomError,
        fetcher::FetchError,
        lexical,
        types::{FEATURE_COUNT, FEATURE_NAMES},
    };
    use std::time::Duration;

    const DOM_RANGE: std::ops::Range<usize> = 30..41;

    fn sample_dom() -> DomFeatures {
        DomFeatures {
            nb_hyperlinks: 4.0,
            ratio_int_hyperlinks: 0.5,
            ratio_ext_redirection: 0.5,
            external_favicon: 0.0,
            links_in_tags: 2.0,
            ratio_int_media: 1.0,
            ratio_ext_media: 0.0,
            safe_anchor: 0.25,
            empty_title: 0.0,
            domain_in_title: 1.0,
            domain_with_copyright: 1.0,
        }
    }

    fn sample_reputation() -> ReputationInfo {
        ReputationInfo {
            domain_registration_length: 365.0,
            domain_age: 1000.0,
            dns_record: 1.0,
            google_index: 1.0,
            page_rank: UNDETERMINED,
        }
    }

    #[test]
    fn test_all_groups_present() {
        let lex = lexical::analyze("http://example.com/");
        let record = assemble(Ok(lex), Ok(sample_dom()), sample_reputation());
        let v = record.to_vector();

        assert_eq!(v.len(), FEATURE_COUNT);
        assert_eq!(v[0], lex.length_url);
        assert_eq!(v[30], 4.0);
        assert_eq!(v[41], 365.0);
        assert_eq!(v[45], -1.0);
    }

    #[test]
    fn test_fetch_failure_degrades_dom_block_only() {
        let lex = lexical::analyze("http://unreachable.example/");
        let fetch_failure = FeatureError::from(FetchError::Timeout(Duration::from_secs(10)));
        let record = assemble(Ok(lex), Err(fetch_failure), sample_reputation());
        let v = record.to_vector();

        for i in DOM_RANGE {
            assert_eq!(v[i], -1.0, "{} not degraded", FEATURE_NAMES[i]);
        }
        assert_eq!(record.length_url, lex.length_url);
        assert_eq!(record.dns_record, 1.0);
    }

    #[test]
    fn test_lexical_failure_degrades_lexical_and_dom() {
        let record = assemble(
            Err(FeatureError::Lexical("boom".to_string())),
            Ok(sample_dom()),
            sample_reputation(),
        );
        let v = record.to_vector();

        assert!(v[..41].iter().all(|x| *x == -1.0));
        assert_eq!(&v[41..], &[365.0, 1000.0, 1.0, 1.0, -1.0]);
    }

    #[test]
    fn test_dom_error_is_atomic() {
        let lex = lexical::analyze("http://example.com/");
        let record = assemble(Ok(lex), Err(DomError::EmptyPage.into()), ReputationInfo::default());
        assert_eq!(record.nb_hyperlinks, -1.0);
        assert_eq!(record.ratio_ext_media, -1.0);
        assert_eq!(record.domain_with_copyright, -1.0);
        assert_eq!(record.dns_record, 0.0);
        assert_eq!(record.page_rank, -1.0);
    }
}
