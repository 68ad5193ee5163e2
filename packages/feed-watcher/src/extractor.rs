//! Turns rendered listing HTML into an ordered sequence of candidate posts.
//!
//! Pure DOM-query logic, separated from the renderer session so it can be
//! exercised against fixture HTML without a browser.

use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::types::{Post, PostId};

/// Anchor that marks one post card in the listing. Also handed to the
/// renderer as its wait-for target.
pub const CARD_SELECTOR: &str = r#"a.channel-card[href*="/post/"]"#;

const TITLE_SELECTOR: &str = ".channel-card-title";
const IMAGE_SELECTOR: &str = ".channel-card-thumbnail img";
const PUBLISHED_SELECTOR: &str = ".channel-card-info-group .channel-card-info";

/// Placeholder when a card carries no title text.
const UNTITLED: &str = "(untitled)";

lazy_static! {
    // Card links look like .../section/3498/post/12345/
    static ref POST_ID_RE: Regex = Regex::new(r"/post/(\d+)/").unwrap();
}

/// Extract candidate posts from rendered listing HTML, preserving document
/// order (the source lists newest first). Cards whose link carries no
/// parseable id are dropped silently.
pub fn extract_posts(html: &str, base_url: &str) -> Vec<Post> {
    let card_selector = match Selector::parse(CARD_SELECTOR) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    document
        .select(&card_selector)
        .filter_map(|card| {
            let href = card.value().attr("href")?;
            let link = absolutize(href, base.as_ref());

            let id = POST_ID_RE
                .captures(&link)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())?;

            let title = select_text(&card, TITLE_SELECTOR)
                .unwrap_or_else(|| UNTITLED.to_string());
            let image = select_attr(&card, IMAGE_SELECTOR, "src");
            let published_label = select_text(&card, PUBLISHED_SELECTOR);

            Some(Post {
                id: PostId::new(id),
                title,
                link,
                image,
                published_label,
                observed_at: Utc::now(),
            })
        })
        .collect()
}

/// First non-empty text content under `selector` within the card.
fn select_text(card: &ElementRef<'_>, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    card.select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
}

fn select_attr(card: &ElementRef<'_>, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    card.select(&selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|value| value.to_string())
}

/// Resolve a possibly-relative href against the page URL.
fn absolutize(href: &str, base: Option<&Url>) -> String {
    match base.and_then(|b| b.join(href).ok()) {
        Some(url) => url.to_string(),
        None => href.to_string(),
    }
}
