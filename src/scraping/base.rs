use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{ElementRef, Selector};

use crate::dates::clean_text;

const USER_AGENT: &str = "NightScrape/0.1 (+https://github.com/night-scrape/night-scrape)";

static CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(20))
        .user_agent(USER_AGENT)
        .build()
        .expect("http client")
});

pub fn first_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(inner_text)
        .filter(|text| !text.is_empty())
}

pub fn inner_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn first_attr(element: &ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
}

/// Image source, honouring the lazy-loading attributes page builders emit.
pub fn image_source(img: ElementRef<'_>) -> Option<String> {
    ["src", "data-src", "data-lazy-src"]
        .iter()
        .filter_map(|attr| img.value().attr(attr))
        .map(str::trim)
        .find(|src| !src.is_empty() && !src.starts_with("data:"))
        .map(str::to_string)
}

pub fn has_class(element: &ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

pub fn absolute_url(base: &str, href: Option<String>) -> Option<String> {
    let href = href?;
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    let base_url = reqwest::Url::parse(base).ok()?;
    base_url.join(href).ok().map(|u| u.to_string())
}

pub async fn fetch_html(url: &str) -> Result<String> {
    let response = CLIENT
        .get(url)
        .send()
        .await
        .with_context(|| format!("request failed for {url}"))?;
    let response = response
        .error_for_status()
        .with_context(|| format!("non-success status for {url}"))?;
    response
        .text()
        .await
        .with_context(|| format!("unable to read response body for {url}"))
}

pub async fn fetch_bytes(url: &str) -> Result<Vec<u8>> {
    let response = CLIENT
        .get(url)
        .send()
        .await
        .with_context(|| format!("request failed for {url}"))?
        .error_for_status()
        .with_context(|| format!("non-success status for {url}"))?;
    let bytes = response
        .bytes()
        .await
        .with_context(|| format!("unable to read response body for {url}"))?;
    Ok(bytes.to_vec())
}
