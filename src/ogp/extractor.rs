use scraper::{Html, Selector};

use crate::models::OgpRecord;

/// Parse Open Graph tags from `html` and return an `OgpRecord`.
///
/// Never fails: the parser recovers from broken markup and missing tags are
/// left as `None`. When the same `og:*` property appears more than once the
/// last tag in document order wins. Non-empty `content` values are stored
/// verbatim. An `og:*` tag whose `content` is empty or whitespace-only counts
/// as absent, so the `<title>` and `<meta name="description">` fallbacks still
/// apply.
pub fn extract(html: &str) -> OgpRecord {
    let document = Html::parse_document(html);
    let mut record = OgpRecord::default();

    if let Ok(selector) = Selector::parse("meta[property]") {
        for el in document.select(&selector) {
            let slot = match el.value().attr("property") {
                Some("og:title") => &mut record.og_title,
                Some("og:description") => &mut record.og_description,
                Some("og:image") => &mut record.og_image,
                Some("og:url") => &mut record.og_url,
                Some("og:site_name") => &mut record.og_site_name,
                _ => continue,
            };
            if let Some(content) = non_empty_content(el.value().attr("content")) {
                *slot = Some(content);
            }
        }
    }

    if record.og_title.is_none() {
        record.og_title = get_title_tag(&document);
    }
    if record.og_description.is_none() {
        record.og_description = get_meta_name(&document, "description");
    }

    record
}

fn non_empty_content(content: Option<&str>) -> Option<String> {
    content
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// `content` of the first `<meta name=...>`, as written. Like an empty
/// `<title>`, an empty `content=""` is present-but-empty.
fn get_meta_name(doc: &Html, name: &str) -> Option<String> {
    let selector = Selector::parse(&format!(r#"meta[name="{name}"]"#)).ok()?;
    doc.select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(str::to_string)
}

/// `<title>` text, trimmed. An empty element yields `Some("")`; only a missing
/// element yields `None`.
fn get_title_tag(doc: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    doc.select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
}
