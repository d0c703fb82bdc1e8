//! Retailer product pages: structured data first, then page metadata.

use std::sync::Arc;
use std::time::Duration;

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::{debug, info, instrument};
use url::Url;

use copyforge_shared::{CopyforgeError, PageFetcher, RawCandidate, Result, SourceKind};

use super::bounded;
use crate::extract::{find_barcode, find_brand, find_sku};

const STRUCTURED_METHOD: &str = "page-structured-data";
const METADATA_METHOD: &str = "page-metadata";
const CONFIDENCE: f64 = 0.7;
const MAX_FEATURES: usize = 10;

pub struct PageAdapter {
    fetcher: Option<Arc<dyn PageFetcher>>,
    budget: Duration,
}

impl PageAdapter {
    pub fn new(fetcher: Option<Arc<dyn PageFetcher>>, budget: Duration) -> Self {
        Self { fetcher, budget }
    }

    #[instrument(skip_all, fields(url = %url))]
    pub async fn execute(&self, url: &str) -> Result<Vec<RawCandidate>> {
        let url = Url::parse(url.trim())
            .map_err(|e| CopyforgeError::input(format!("invalid URL '{url}': {e}")))?;
        let fetcher = self
            .fetcher
            .as_ref()
            .ok_or_else(|| CopyforgeError::upstream("page fetcher is not configured"))?;

        let html = bounded("page fetch", self.budget, fetcher.fetch(&url)).await?;
        // Html is not Send; keep parsing out of the await chain.
        let candidate = extract_page(&html, &url);
        match &candidate {
            Some(c) => info!(method = %c.extraction_method, "product found on page"),
            None => info!("no product name on page"),
        }
        Ok(candidate.into_iter().collect())
    }
}

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(doc: &Html, css: &str) -> Option<String> {
    doc.select(&sel(css))
        .map(element_text)
        .find(|t| !t.is_empty())
}

fn meta_content(doc: &Html, css: &str) -> Option<String> {
    doc.select(&sel(css))
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .find(|c| !c.is_empty())
        .map(str::to_string)
}

/// Item-prop value from a `content` attribute or the element text.
fn itemprop(doc: &Html, prop: &str) -> Option<String> {
    doc.select(&sel(&format!(r#"[itemprop="{prop}"]"#)))
        .map(|el| {
            el.value()
                .attr("content")
                .map(|c| c.trim().to_string())
                .unwrap_or_else(|| element_text(el))
        })
        .find(|v| !v.is_empty())
}

/// Build a candidate from page markup. `None` when no product name is found.
pub(crate) fn extract_page(html: &str, url: &Url) -> Option<RawCandidate> {
    let doc = Html::parse_document(html);
    let ld = json_ld_product(&doc);
    let method = if ld.is_some() {
        STRUCTURED_METHOD
    } else {
        METADATA_METHOD
    };
    let mut cand = RawCandidate::new(SourceKind::PageScrape, method, CONFIDENCE);
    cand.source_url = Some(url.to_string());

    if let Some(product) = &ld {
        apply_json_ld(&mut cand, product);
    }

    if cand.field("name").is_none() {
        let name = meta_content(&doc, r#"meta[property="og:title"]"#)
            .or_else(|| itemprop(&doc, "name"))
            .or_else(|| first_text(&doc, "h1"))
            .or_else(|| first_text(&doc, "title").map(|t| strip_site_suffix(&t)))
            .or_else(|| name_from_slug(url));
        cand.set_field("name", name.unwrap_or_default());
    }
    if cand.field("name").is_none() {
        debug!("page has no usable name");
        return None;
    }

    let body_text = first_text(&doc, "body").unwrap_or_default();

    if cand.field("brand").is_none() {
        let brand = itemprop(&doc, "brand")
            .or_else(|| meta_content(&doc, r#"meta[property="product:brand"], meta[property="og:brand"]"#))
            .or_else(|| first_text(&doc, ".product-brand, .brand"))
            .or_else(|| {
                let name = cand.field("name").unwrap_or_default();
                find_brand(&format!("{name} {body_text}")).map(str::to_string)
            });
        cand.set_field("brand", brand.unwrap_or_default());
    }
    if cand.field("sku").is_none() {
        let sku = itemprop(&doc, "sku").or_else(|| find_sku(&body_text));
        cand.set_field("sku", sku.unwrap_or_default());
    }
    if cand.field("barcode").is_none() {
        let barcode = itemprop(&doc, "gtin13")
            .or_else(|| itemprop(&doc, "gtin"))
            .or_else(|| find_barcode(&body_text));
        cand.set_field("barcode", barcode.unwrap_or_default());
    }

    let description = meta_content(&doc, r#"meta[name="description"]"#)
        .or_else(|| meta_content(&doc, r#"meta[property="og:description"]"#));
    if cand.raw_text.is_none() {
        cand.raw_text = description;
    }

    for feature in doc
        .select(&sel(".features li, .product-features li, .key-features li"))
        .map(element_text)
        .filter(|t| !t.is_empty())
    {
        if cand.features.len() >= MAX_FEATURES {
            break;
        }
        if !cand.features.contains(&feature) {
            cand.features.push(feature);
        }
    }

    for (key, value) in spec_pairs(&doc) {
        if !cand.fields.contains_key(&key) {
            cand.set_field(&key, value);
        }
    }

    Some(cand)
}

// ---------------------------------------------------------------------------
// Structured data
// ---------------------------------------------------------------------------

fn json_ld_product(doc: &Html) -> Option<Value> {
    doc.select(&sel(r#"script[type="application/ld+json"]"#))
        .filter_map(|el| serde_json::from_str::<Value>(&el.text().collect::<String>()).ok())
        .find_map(|v| find_product(&v).cloned())
}

fn is_product_type(v: &Value) -> bool {
    match v.get("@type") {
        Some(Value::String(t)) => t == "Product",
        Some(Value::Array(types)) => types.iter().any(|t| t == "Product"),
        _ => false,
    }
}

fn find_product(v: &Value) -> Option<&Value> {
    match v {
        Value::Array(items) => items.iter().find_map(find_product),
        Value::Object(map) => {
            if is_product_type(v) {
                Some(v)
            } else {
                map.get("@graph").and_then(find_product)
            }
        }
        _ => None,
    }
}

fn ld_string(v: &Value) -> Option<String> {
    let text = match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("name").and_then(ld_string),
        Value::Array(items) => items.iter().find_map(ld_string),
        _ => None,
    };
    text.filter(|s| !s.is_empty())
}

fn apply_json_ld(cand: &mut RawCandidate, product: &Value) {
    let get = |key: &str| product.get(key).and_then(ld_string);

    if let Some(name) = get("name") {
        cand.set_field("name", name);
    }
    if let Some(brand) = get("brand").or_else(|| get("manufacturer")) {
        cand.set_field("brand", brand);
    }
    if let Some(sku) = get("sku").or_else(|| get("mpn")) {
        cand.set_field("sku", sku);
    }
    if let Some(gtin) = ["gtin13", "gtin", "gtin14", "gtin12", "gtin8"]
        .into_iter()
        .find_map(get)
    {
        cand.set_field("barcode", gtin);
    }
    if let Some(description) = get("description") {
        cand.raw_text = Some(description);
    }
    if let Some(Value::Array(props)) = product.get("additionalProperty") {
        for prop in props {
            if let (Some(k), Some(v)) = (
                prop.get("name").and_then(ld_string),
                prop.get("value").and_then(ld_string),
            ) {
                cand.set_field(&k.to_lowercase(), v);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata fallbacks
// ---------------------------------------------------------------------------

/// "Casserole 24cm | Example Shop" -> "Casserole 24cm".
fn strip_site_suffix(title: &str) -> String {
    [" | ", " - ", " – ", " — "]
        .iter()
        .filter_map(|sep| title.split_once(sep).map(|(head, _)| head))
        .min_by_key(|head| head.len())
        .unwrap_or(title)
        .trim()
        .to_string()
}

fn name_from_slug(url: &Url) -> Option<String> {
    let segment = url
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()?;
    let stem = segment.split('.').next().unwrap_or(segment);
    let words: Vec<&str> = stem
        .split(['-', '_'])
        .filter(|w| !w.is_empty() && !w.chars().all(|c| c.is_ascii_digit()))
        .collect();
    if words.is_empty() {
        return None;
    }
    let joined = words.join(" ");
    let mut chars = joined.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
}

/// Key/value pairs from specification tables and definition lists.
fn spec_pairs(doc: &Html) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let cell = sel("th, td");
    for row in doc.select(&sel("table tr")) {
        let cells: Vec<String> = row.select(&cell).map(element_text).collect();
        if let [key, value] = cells.as_slice() {
            if !key.is_empty() && !value.is_empty() {
                pairs.push((key.trim_end_matches(':').to_lowercase(), value.clone()));
            }
        }
    }
    let (dt, dd) = (sel("dt"), sel("dd"));
    for list in doc.select(&sel("dl")) {
        let keys = list.select(&dt).map(element_text);
        let values = list.select(&dd).map(element_text);
        for (key, value) in keys.zip(values) {
            if !key.is_empty() && !value.is_empty() {
                pairs.push((key.trim_end_matches(':').to_lowercase(), value));
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use copyforge_shared::{CapabilityError, SourceErrorKind};

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    const LD_PAGE: &str = r#"<html><head>
        <title>Signature Casserole | Example Shop</title>
        <script type="application/ld+json">
        {"@context":"https://schema.org","@graph":[
          {"@type":"BreadcrumbList"},
          {"@type":"Product","name":"Signature Round Casserole 24cm",
           "brand":{"@type":"Brand","name":"Le Creuset"},
           "sku":"LC-21177","gtin13":"0024147212345",
           "description":"Enamelled cast iron casserole.",
           "additionalProperty":[{"name":"Material","value":"Cast iron"}]}
        ]}
        </script></head>
        <body><h1>Casserole</h1>
        <ul class="features"><li>Even heat</li><li>Oven safe to 260°C</li><li>Even heat</li></ul>
        <table><tr><th>Capacity</th><td>4.2L</td></tr><tr><th>Material</th><td>Iron</td></tr></table>
        </body></html>"#;

    #[test]
    fn json_ld_product_in_graph() {
        let c = extract_page(LD_PAGE, &url("https://shop.example.com/p/casserole")).unwrap();
        assert_eq!(c.extraction_method, STRUCTURED_METHOD);
        assert_eq!(c.field("name"), Some("Signature Round Casserole 24cm"));
        assert_eq!(c.field("brand"), Some("Le Creuset"));
        assert_eq!(c.field("sku"), Some("LC-21177"));
        assert_eq!(c.field("barcode"), Some("0024147212345"));
        assert_eq!(c.field("material"), Some("Cast iron"));
        assert_eq!(c.field("capacity"), Some("4.2L"));
        assert_eq!(c.features, vec!["Even heat", "Oven safe to 260°C"]);
        assert_eq!(c.raw_text.as_deref(), Some("Enamelled cast iron casserole."));
        assert_eq!(c.confidence, 0.7);
    }

    #[test]
    fn metadata_fallbacks() {
        let html = r#"<html><head>
            <meta property="og:title" content="Dualit Classic Kettle">
            <meta name="description" content="A polished kettle.">
            </head><body><span itemprop="sku">DK-72010</span>
            <dl><dt>Power</dt><dd>3000W</dd></dl></body></html>"#;
        let c = extract_page(html, &url("https://shop.example.com/kettle")).unwrap();
        assert_eq!(c.extraction_method, METADATA_METHOD);
        assert_eq!(c.field("name"), Some("Dualit Classic Kettle"));
        assert_eq!(c.field("brand"), Some("Dualit"));
        assert_eq!(c.field("sku"), Some("DK-72010"));
        assert_eq!(c.field("power"), Some("3000W"));
        assert_eq!(c.raw_text.as_deref(), Some("A polished kettle."));
    }

    #[test]
    fn title_and_slug_fallbacks() {
        assert_eq!(strip_site_suffix("Pie Dish - Example Shop"), "Pie Dish");
        assert_eq!(
            name_from_slug(&url("https://shop.example.com/p/stoneware-pie-dish-1234.html")),
            Some("Stoneware pie dish".into())
        );
        let c = extract_page("<html><body></body></html>", &url("https://x.example/p/bread-bin"))
            .unwrap();
        assert_eq!(c.field("name"), Some("Bread bin"));
    }

    #[test]
    fn no_name_means_no_product() {
        assert!(extract_page("<html><body><p></p></body></html>", &url("https://x.example/")).is_none());
    }

    struct Refusing;

    #[async_trait]
    impl PageFetcher for Refusing {
        async fn fetch(&self, _url: &Url) -> std::result::Result<String, CapabilityError> {
            Err(CapabilityError::Unreachable("HTTP 403 Forbidden".into()))
        }
    }

    #[tokio::test]
    async fn fetch_failure_is_unreachable() {
        let adapter = PageAdapter::new(Some(Arc::new(Refusing)), Duration::from_secs(1));
        let err = adapter.execute("https://shop.example.com/p/1").await.unwrap_err();
        assert_eq!(err.source_kind(), Some(SourceErrorKind::UnreachableSource));
    }
}
