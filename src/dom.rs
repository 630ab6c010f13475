//! Structural and content features derived from the fetched markup.

use crate::types::{DomFeatures, RawPage};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DomError {
    #[error("page body is empty")]
    EmptyPage,
    #[error("invalid selector {0}")]
    Selector(&'static str),
}

const PRESENCE_TAGS: [&str; 3] = ["form", "iframe", "input"];

const COPYRIGHT_MARKERS: [&str; 3] = ["©", "(c)", "copyright"];

fn selector(css: &'static str) -> Result<Selector, DomError> {
    Selector::parse(css).map_err(|_| DomError::Selector(css))
}

/// Computes the 11 DOM features for `page`. Host matching is a plain
/// substring test against attribute values, not an authority comparison.
pub fn extract(page: &RawPage, hostname: &str) -> Result<DomFeatures, DomError> {
    if page.body.trim().is_empty() {
        return Err(DomError::EmptyPage);
    }

    let document = Html::parse_document(&page.body);

    let anchor_selector = selector("a[href]")?;
    let hrefs: Vec<&str> = document
        .select(&anchor_selector)
        .filter_map(|a| a.value().attr("href"))
        .collect();

    let nb_hyperlinks = hrefs.len();
    let internal_links = hrefs.iter().filter(|href| href.contains(hostname)).count();
    let external_links = nb_hyperlinks - internal_links;
    let safe_anchors = hrefs
        .iter()
        .filter(|href| href.is_empty() || **href == "#")
        .count();

    let external_favicon = match favicon_href(&document)? {
        Some(href) => !href.contains(hostname),
        None => false,
    };

    let mut links_in_tags = 0;
    for tag in PRESENCE_TAGS {
        if document.select(&selector(tag)?).next().is_some() {
            links_in_tags += 1;
        }
    }

    let media_selector = selector("img, video, audio, source")?;
    let media_sources: Vec<&str> = document
        .select(&media_selector)
        .map(|m| m.value().attr("src").unwrap_or_default())
        .collect();
    let internal_media = media_sources.iter().filter(|src| src.contains(hostname)).count();
    let ratio_int_media = ratio(internal_media, media_sources.len());

    let title_selector = selector("title")?;
    let title = document
        .select(&title_selector)
        .next()
        .map(|t| t.text().collect::<String>());
    let empty_title = title.as_deref().map_or(true, |t| t.trim().is_empty());
    let domain_in_title = title.as_deref().map_or(false, |t| t.contains(hostname));

    let page_text = document.root_element().text().collect::<String>().to_lowercase();
    let has_copyright = COPYRIGHT_MARKERS.iter().any(|m| page_text.contains(m));

    let features = DomFeatures {
        nb_hyperlinks: nb_hyperlinks as f64,
        ratio_int_hyperlinks: ratio(internal_links, nb_hyperlinks),
        ratio_ext_redirection: ratio(external_links, nb_hyperlinks),
        external_favicon: flag(external_favicon),
        links_in_tags: links_in_tags as f64,
        ratio_int_media,
        // Complement of the internal ratio, so a page without media reports 1.
        ratio_ext_media: 1.0 - ratio_int_media,
        safe_anchor: ratio(safe_anchors, nb_hyperlinks),
        empty_title: flag(empty_title),
        domain_in_title: flag(domain_in_title),
        domain_with_copyright: flag(has_copyright),
    };

    debug!(status = page.status, "dom features: {:?}", features);
    Ok(features)
}

/// href of the first `<link>` whose rel tokens include `icon`; covers both
/// `icon` and `shortcut icon`.
fn favicon_href(document: &Html) -> Result<Option<String>, DomError> {
    let link_selector = selector("link[rel]")?;
    let favicon = document.select(&link_selector).find(|link| is_icon_link(link));
    Ok(favicon.map(|link| link.value().attr("href").unwrap_or_default().to_string()))
}

fn is_icon_link(link: &ElementRef<'_>) -> bool {
    link.value()
        .attr("rel")
        .map(|rel| rel.split_whitespace().any(|token| token.eq_ignore_ascii_case("icon")))
        .unwrap_or(false)
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> RawPage {
        RawPage {
            status: 200,
            body: body.to_string(),
        }
    }

    const SAMPLE: &str = r##"
        <html>
          <head>
            <title>Welcome to example.com</title>
            <link rel="shortcut icon" href="https://cdn.other.net/favicon.ico">
          </head>
          <body>
            <a href="https://example.com/about">About</a>
            <a href="https://evil.net/login">Login</a>
            <a href="#">Top</a>
            <a href="">Empty</a>
            <a>No href</a>
            <img src="https://example.com/logo.png">
            <img src="https://cdn.other.net/banner.png">
            <video src="/local.mp4"></video>
            <audio></audio>
            <form><input type="password"></form>
            <footer>&copy; 2024 Example Inc.</footer>
          </body>
        </html>
    "##;

    #[test]
    fn test_hyperlink_accounting() {
        let f = extract(&page(SAMPLE), "example.com").unwrap();
        assert_eq!(f.nb_hyperlinks, 4.0);
        assert_eq!(f.ratio_int_hyperlinks, 0.25);
        assert_eq!(f.ratio_ext_redirection, 0.75);
        assert_eq!(f.safe_anchor, 0.5);
    }

    #[test]
    fn test_media_ratios() {
        let f = extract(&page(SAMPLE), "example.com").unwrap();
        assert_eq!(f.ratio_int_media, 0.25);
        assert_eq!(f.ratio_ext_media, 0.75);
        assert_eq!(f.ratio_int_media + f.ratio_ext_media, 1.0);
    }

    #[test]
    fn test_no_media_reports_full_external_ratio() {
        let f = extract(&page("<html><body><p>text</p></body></html>"), "example.com").unwrap();
        assert_eq!(f.ratio_int_media, 0.0);
        assert_eq!(f.ratio_ext_media, 1.0);
        assert_eq!(f.nb_hyperlinks, 0.0);
        assert_eq!(f.ratio_int_hyperlinks, 0.0);
        assert_eq!(f.safe_anchor, 0.0);
    }

    #[test]
    fn test_tags_title_favicon_copyright() {
        let f = extract(&page(SAMPLE), "example.com").unwrap();
        assert_eq!(f.links_in_tags, 2.0);
        assert_eq!(f.external_favicon, 1.0);
        assert_eq!(f.empty_title, 0.0);
        assert_eq!(f.domain_in_title, 1.0);
        assert_eq!(f.domain_with_copyright, 1.0);
    }

    #[test]
    fn test_missing_title_and_internal_favicon() {
        let body = r#"<html><head><link rel="icon" href="/favicon.ico"></head>
            <body><iframe src="x"></iframe>Copyright holders</body></html>"#;
        let f = extract(&page(body), "example.com").unwrap();
        assert_eq!(f.empty_title, 1.0);
        assert_eq!(f.domain_in_title, 0.0);
        // relative favicon href does not contain the host
        assert_eq!(f.external_favicon, 1.0);
        assert_eq!(f.links_in_tags, 1.0);
        assert_eq!(f.domain_with_copyright, 1.0);

        let body = r#"<html><head><title>   </title>
            <link rel="icon" href="https://example.com/favicon.ico"></head></html>"#;
        let f = extract(&page(body), "example.com").unwrap();
        assert_eq!(f.empty_title, 1.0);
        assert_eq!(f.external_favicon, 0.0);
        assert_eq!(f.domain_with_copyright, 0.0);
    }

    #[test]
    fn test_empty_page_fails_closed() {
        assert!(matches!(extract(&page("   \n"), "example.com"), Err(DomError::EmptyPage)));
    }

    #[test]
    fn test_ratios_bounded() {
        let f = extract(&page(SAMPLE), "").unwrap();
        for r in [
            f.ratio_int_hyperlinks,
            f.ratio_ext_redirection,
            f.ratio_int_media,
            f.ratio_ext_media,
            f.safe_anchor,
        ] {
            assert!((0.0..=1.0).contains(&r));
        }
        // every href contains the empty host
        assert_eq!(f.ratio_int_hyperlinks, 1.0);
    }
}
