use std::sync::OnceLock;

use ammonia::Builder;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use html_escape::{decode_html_entities, encode_double_quoted_attribute, encode_text};
use regex::Regex;

use crate::config::MAX_RATING;

/// Formats an API timestamp as a day/month/year date. Unparsable values are
/// shown as received.
pub fn format_date(raw: &str) -> String {
    const DISPLAY: &str = "%-d/%-m/%Y";

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.format(DISPLAY).to_string();
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return dt.format(DISPLAY).to_string();
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d.format(DISPLAY).to_string();
    }
    raw.to_string()
}

/// Absolute URL of an image path stored by the API.
pub fn image_url(api_base: &str, image: &str) -> String {
    if image.starts_with("http://") || image.starts_with("https://") {
        image.to_string()
    } else if image.starts_with('/') {
        format!("{}{}", api_base, image)
    } else {
        format!("{}/{}", api_base, image)
    }
}

/// Accepts only local absolute paths as redirect targets.
pub fn safe_local_path(candidate: Option<&str>) -> Option<String> {
    let path = candidate?.trim();
    if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') {
        Some(path.to_string())
    } else {
        None
    }
}

pub fn stars(rating: u8) -> String {
    let filled = rating.min(MAX_RATING) as usize;
    let empty = MAX_RATING as usize - filled;
    format!("{}{}", "★".repeat(filled), "☆".repeat(empty))
}

pub fn average_rating(ratings: &[u8]) -> Option<f64> {
    if ratings.is_empty() {
        return None;
    }
    let sum: u32 = ratings.iter().map(|r| *r as u32).sum();
    Some(sum as f64 / ratings.len() as f64)
}

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"https?://[^\s<]+").expect("Regex should compile"))
}

/// Renders a post body as safe HTML: markup stripped, line breaks kept and
/// HTTP(S) URLs turned into links.
pub fn render_body(body: &str) -> String {
    let clean = Builder::default()
        .tags(std::collections::HashSet::new())
        .clean(body)
        .to_string();

    let linked = url_regex().replace_all(&clean, |caps: &regex::Captures| {
        // The sanitiser has already entity-encoded the text.
        let url = &caps[0];
        format!(
            r#"<a href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#,
            encode_double_quoted_attribute(&decode_html_entities(url)),
            url
        )
    });

    linked.replace('\n', "<br>")
}

pub fn escape(text: &str) -> String {
    encode_text(text).to_string()
}

pub fn escape_attr(text: &str) -> String {
    encode_double_quoted_attribute(text).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_date_variants() {
        assert_eq!(format_date("2024-05-01T10:00:00.000Z"), "1/5/2024");
        assert_eq!(format_date("2023-12-24 18:30:00"), "24/12/2023");
        assert_eq!(format_date("2023-02-03"), "3/2/2023");
        assert_eq!(format_date("ayer"), "ayer");
    }

    #[test]
    fn test_image_url_joins_api_origin() {
        assert_eq!(
            image_url("http://localhost:8080", "/uploads/a.png"),
            "http://localhost:8080/uploads/a.png"
        );
        assert_eq!(
            image_url("http://localhost:8080", "uploads/a.png"),
            "http://localhost:8080/uploads/a.png"
        );
        assert_eq!(
            image_url("http://localhost:8080", "https://cdn.example/a.png"),
            "https://cdn.example/a.png"
        );
    }

    #[test]
    fn test_safe_local_path_rejects_external_targets() {
        assert_eq!(safe_local_path(Some("/posts")), Some("/posts".to_string()));
        assert_eq!(safe_local_path(Some("//evil.example")), None);
        assert_eq!(safe_local_path(Some("https://evil.example")), None);
        assert_eq!(safe_local_path(Some("/\\evil")), None);
        assert_eq!(safe_local_path(None), None);
    }

    #[test]
    fn test_stars_and_average() {
        assert_eq!(stars(3), "★★★☆☆");
        assert_eq!(stars(9), "★★★★★");
        assert_eq!(average_rating(&[]), None);
        assert_eq!(average_rating(&[4, 5]), Some(4.5));
    }

    #[test]
    fn test_render_body_strips_markup_and_links_urls() {
        let html = render_body("<script>alert(1)</script>mira https://example.com\nfin");
        assert!(!html.contains("<script>"));
        assert!(html.contains(r#"<a href="https://example.com" target="_blank""#));
        assert!(html.contains("<br>fin"));
    }

    #[test]
    fn test_render_body_link_query_is_encoded_once() {
        let html = render_body("ver https://example.com/?a=1&b=2");
        assert!(html.contains(r#"href="https://example.com/?a=1&amp;b=2""#));
        assert!(!html.contains("&amp;amp;"));
    }
}
