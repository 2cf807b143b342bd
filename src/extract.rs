use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::{error::ApiError, models::ImportCandidate};

/// Conventional class patterns for a resource block in third-party listing
/// markup.
static BLOCK_SEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".org-block, .resource, .organization, [class*=\"org\"]")
        .expect("valid block selector")
});
static NAME_SEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("h1, h2, h3, h4, .organization-name, .program-name, .title, .name")
        .expect("valid name selector")
});
static CATEGORY_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".category, .service-type, .type").expect("valid category selector"));
static ADDRESS_SEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".address, .location, [itemprop=\"address\"]").expect("valid address selector")
});
static PHONE_SEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".phone, .contact-phone, [itemprop=\"telephone\"]")
        .expect("valid phone selector")
});
static WEBSITE_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href^=\"http\"]").expect("valid website selector"));
static DESCRIPTION_SEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".description, .summary, .about").expect("valid description selector")
});
static CITY_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".city, .locality").expect("valid city selector"));
static HEADING_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2, h3, h4").expect("valid heading selector"));
static PARAGRAPH_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p").expect("valid paragraph selector"));

static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(?\b\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}\b").expect("valid phone regex")
});
static ZIP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{5}(?:-\d{4})?\b").expect("valid zip regex"));
static CITY_ST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z][A-Za-z .']*),\s*[A-Z]{2}\b").expect("valid city/state regex")
});
static STREET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,6}\s+[A-Za-z]").expect("valid street regex"));

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub default_category: Option<String>,
}

/// Best-effort extraction of candidate resources from arbitrary listing
/// HTML. Strategies are tried in order; the first one whose markup shape is
/// present wins. Candidates without a name are dropped silently; an empty
/// aggregate result is the only error.
pub fn extract_candidates(
    html: &str,
    opts: &ExtractOptions,
) -> Result<Vec<ImportCandidate>, ApiError> {
    let doc = Html::parse_document(html);

    let strategies: &[(&str, fn(&Html, &ExtractOptions) -> Option<Vec<ImportCandidate>>)] = &[
        ("structured", extract_structured),
        ("headings", extract_by_headings),
    ];

    for (label, strategy) in strategies {
        if let Some(candidates) = strategy(&doc, opts) {
            debug!(
                strategy = *label,
                candidates = candidates.len(),
                "Extraction strategy matched"
            );
            if candidates.is_empty() {
                // The markup shape matched but produced nothing usable; a
                // later strategy would only rediscover the same elements.
                break;
            }
            return Ok(candidates);
        }
    }

    Err(ApiError::validation("no resources found"))
}

/// Structured pass over conventional resource-block markup. Returns `None`
/// when no block-shaped element exists at all.
fn extract_structured(doc: &Html, opts: &ExtractOptions) -> Option<Vec<ImportCandidate>> {
    let blocks: Vec<ElementRef> = doc.select(&BLOCK_SEL).collect();
    if blocks.is_empty() {
        return None;
    }

    let mut visited = HashSet::new();
    let mut candidates = Vec::new();
    for block in blocks {
        let name = block
            .select(&NAME_SEL)
            .next()
            .map(text_of)
            .unwrap_or_default();
        if name.is_empty() || !visited.insert(name.clone()) {
            continue;
        }

        let address = block
            .select(&ADDRESS_SEL)
            .next()
            .map(text_of)
            .unwrap_or_default();
        let phone = block
            .select(&PHONE_SEL)
            .next()
            .map(text_of)
            .unwrap_or_default();
        let website = block
            .select(&WEBSITE_SEL)
            .next()
            .and_then(|a| a.value().attr("href"))
            .unwrap_or_default()
            .to_string();
        let description = block
            .select(&DESCRIPTION_SEL)
            .next()
            .map(text_of)
            .unwrap_or_default();
        let category = block
            .select(&CATEGORY_SEL)
            .next()
            .map(text_of)
            .filter(|c| !c.is_empty())
            .or_else(|| opts.default_category.clone())
            .unwrap_or_default();
        let city = block
            .select(&CITY_SEL)
            .next()
            .map(text_of)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| city_from_address(&address));

        candidates.push(ImportCandidate {
            name,
            category,
            address,
            phone,
            website,
            description,
            city,
            status: None,
        });
    }

    Some(candidates)
}

/// Fallback for unknown markup: every heading anchors a candidate and its
/// parent container is scanned for an address-like paragraph and a phone
/// number. Returns `None` when the document has no headings.
fn extract_by_headings(doc: &Html, opts: &ExtractOptions) -> Option<Vec<ImportCandidate>> {
    let headings: Vec<ElementRef> = doc.select(&HEADING_SEL).collect();
    if headings.is_empty() {
        return None;
    }

    let mut visited = HashSet::new();
    let mut candidates = Vec::new();
    for heading in headings {
        let name = text_of(heading);
        if name.is_empty() || !visited.insert(name.clone()) {
            continue;
        }

        let container = heading.parent().and_then(ElementRef::wrap);
        let (address, phone) = match container {
            Some(container) => {
                let address = container
                    .select(&PARAGRAPH_SEL)
                    .map(text_of)
                    .find(|text| looks_like_address(text))
                    .unwrap_or_default();
                let container_text = text_of(container);
                let phone = PHONE_RE
                    .find(&container_text)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                (address, phone)
            }
            None => (String::new(), String::new()),
        };

        candidates.push(ImportCandidate {
            name,
            category: opts.default_category.clone().unwrap_or_default(),
            city: city_from_address(&address),
            address,
            phone,
            website: String::new(),
            description: String::new(),
            status: None,
        });
    }

    Some(candidates)
}

fn looks_like_address(text: &str) -> bool {
    STREET_RE.is_match(text) || ZIP_RE.is_match(text)
}

fn city_from_address(address: &str) -> String {
    CITY_ST_RE
        .captures(address)
        .and_then(|caps| caps.get(1))
        .map(|m| {
            // The pattern can swallow the street part; keep the segment
            // after the last comma-delimited break before the state.
            m.as_str()
                .rsplit(',')
                .next()
                .unwrap_or("")
                .trim()
                .to_string()
        })
        .unwrap_or_default()
}

/// ZIP pattern pulled from the address, else the extracted city string.
pub fn derive_zipcode(address: &str, city: &str) -> String {
    ZIP_RE
        .find(address)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| city.to_string())
}

fn text_of(el: ElementRef) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_category(category: &str) -> ExtractOptions {
        ExtractOptions {
            default_category: Some(category.to_string()),
        }
    }

    #[test]
    fn structured_block_extracts_all_fields() {
        let html = r#"<div class="org-block">
            <h3>Acme Shelter</h3>
            <p class="address">1 Main St, Springfield, IL 62704</p>
            <span class="phone">(555) 111-2222</span>
        </div>"#;

        let candidates = extract_candidates(html, &with_category("housing")).unwrap();
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.name, "Acme Shelter");
        assert_eq!(c.category, "housing");
        assert_eq!(c.address, "1 Main St, Springfield, IL 62704");
        assert_eq!(c.phone, "(555) 111-2222");
        assert_eq!(c.city, "Springfield");
        assert_eq!(derive_zipcode(&c.address, &c.city), "62704");
    }

    #[test]
    fn structured_block_prefers_markup_category_over_default() {
        let html = r#"<div class="resource">
            <h2>Open Door Clinic</h2>
            <span class="category">Health</span>
            <a href="https://opendoor.example.org">site</a>
            <p class="description">Walk-in clinic.</p>
        </div>"#;

        let candidates = extract_candidates(html, &with_category("housing")).unwrap();
        assert_eq!(candidates[0].category, "Health");
        assert_eq!(candidates[0].website, "https://opendoor.example.org");
        assert_eq!(candidates[0].description, "Walk-in clinic.");
    }

    #[test]
    fn structured_block_without_default_category_leaves_it_empty() {
        let html = r#"<div class="organization"><h3>Acme</h3></div>"#;
        let candidates = extract_candidates(html, &ExtractOptions::default()).unwrap();
        assert_eq!(candidates[0].category, "");
    }

    #[test]
    fn nameless_blocks_are_dropped_silently() {
        let html = r#"
            <div class="org-block"><p class="address">1 Main St</p></div>
            <div class="org-block"><h3>Named One</h3></div>
        "#;
        let candidates = extract_candidates(html, &with_category("food")).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "Named One");
    }

    #[test]
    fn duplicate_names_collapse_to_one_candidate() {
        let html = r#"
            <div class="org-block"><h3>Acme</h3></div>
            <div class="org-block"><h3>Acme</h3></div>
        "#;
        let candidates = extract_candidates(html, &with_category("food")).unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn heading_fallback_scans_parent_container() {
        let html = r#"<div>
            <h2>Harbor Light Center</h2>
            <p>Emergency beds and meals.</p>
            <p>1275 Harrison St, San Francisco, CA 94103</p>
            <p>Call 555.867.5309 for intake.</p>
        </div>"#;

        let candidates = extract_candidates(html, &with_category("housing")).unwrap();
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.name, "Harbor Light Center");
        assert_eq!(c.category, "housing");
        assert_eq!(c.address, "1275 Harrison St, San Francisco, CA 94103");
        assert_eq!(c.phone, "555.867.5309");
        assert_eq!(c.city, "San Francisco");
    }

    #[test]
    fn heading_fallback_without_default_category() {
        let html = "<section><h3>Acme Pantry</h3><p>42 Oak Ave</p></section>";
        let candidates = extract_candidates(html, &ExtractOptions::default()).unwrap();
        assert_eq!(candidates[0].name, "Acme Pantry");
        assert_eq!(candidates[0].category, "");
        assert_eq!(candidates[0].address, "42 Oak Ave");
        assert_eq!(candidates[0].phone, "");
    }

    #[test]
    fn empty_document_yields_validation_error() {
        let err = extract_candidates("<html><body></body></html>", &ExtractOptions::default())
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn zipcode_derivation_prefers_zip_then_city() {
        assert_eq!(derive_zipcode("1 Main St, Springfield, IL 62704", ""), "62704");
        assert_eq!(
            derive_zipcode("1 Main St, Springfield, IL 62704-1234", ""),
            "62704-1234"
        );
        // The city string stands in when no ZIP exists.
        assert_eq!(derive_zipcode("1 Main St", "Springfield"), "Springfield");
        assert_eq!(derive_zipcode("", ""), "");
    }
}
