//! Anchor extraction from rendered markup.

use std::collections::HashSet;

use scraper::{Html, Selector};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::types::Link;

/// Link extraction failed. Never fails a capture; it is logged and the
/// summary carries no links.
#[derive(Debug, Error)]
pub enum ExtractionWarning {
    #[error("invalid base URL {url}: {source}")]
    InvalidBase {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid anchor selector: {0}")]
    Selector(String),
}

/// Collects every `<a href>` in document order, resolved against `base_url`.
///
/// Hrefs that do not resolve are skipped. When several anchors resolve to the
/// same URL only the first is kept.
pub fn extract_links(html: &str, base_url: &str) -> Result<Vec<Link>, ExtractionWarning> {
    let base = Url::parse(base_url).map_err(|source| ExtractionWarning::InvalidBase {
        url: base_url.to_string(),
        source,
    })?;
    let anchors =
        Selector::parse("a[href]").map_err(|err| ExtractionWarning::Selector(err.to_string()))?;

    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for anchor in document.select(&anchors) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let resolved = match base.join(href.trim()) {
            Ok(url) => url.to_string(),
            Err(err) => {
                debug!(href, error = %err, "Skipping unresolvable link");
                continue;
            }
        };
        if !seen.insert(resolved.clone()) {
            continue;
        }
        let text = anchor
            .text()
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" ");
        links.push(Link {
            text,
            href: resolved,
        });
    }

    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_and_absolute_links_in_order() {
        let html = r#"<html><body>
            <a href="/link1">Link 1</a>
            <a href="https://example.com/link2">Link 2</a>
            <a href="link3.html">Link 3</a>
        </body></html>"#;

        let links = extract_links(html, "http://h/").unwrap();
        let hrefs: Vec<_> = links.iter().map(|l| l.href.as_str()).collect();
        assert_eq!(
            hrefs,
            vec!["http://h/link1", "https://example.com/link2", "http://h/link3.html"]
        );
        assert_eq!(links[0].text, "Link 1");
    }

    #[test]
    fn duplicates_keep_first_occurrence() {
        let html = r#"<a href="/a">first</a><a href="http://h/a">second</a><a href="/b">b</a>"#;
        let links = extract_links(html, "http://h/").unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].text, "first");
        assert_eq!(links[1].href, "http://h/b");
    }

    #[test]
    fn relative_links_resolve_against_page_directory() {
        let html = r#"<a href="next.html">next</a><a href="../up">up</a>"#;
        let links = extract_links(html, "https://site.test/docs/page.html").unwrap();
        assert_eq!(links[0].href, "https://site.test/docs/next.html");
        assert_eq!(links[1].href, "https://site.test/up");
    }

    #[test]
    fn anchor_text_is_whitespace_normalised() {
        let html = "<a href='/x'>\n  Read <b>more</b>\n  here </a>";
        let links = extract_links(html, "http://h/").unwrap();
        assert_eq!(links[0].text, "Read more here");
    }

    #[test]
    fn anchors_without_href_are_ignored() {
        let html = r#"<a name="top">top</a><a>none</a>"#;
        assert!(extract_links(html, "http://h/").unwrap().is_empty());
    }

    #[test]
    fn invalid_base_is_a_warning() {
        let err = extract_links("<a href='/x'>x</a>", "not a url").unwrap_err();
        assert!(matches!(err, ExtractionWarning::InvalidBase { .. }));
        assert!(err.to_string().contains("not a url"));
    }
}
