//! Normalizer: raw candidate → canonical [`Product`].
//!
//! Resolves the free-form `fields` an adapter produced through alias lists,
//! canonicalises specification keys and values, and assigns the product id.
//! Never calls an external capability.

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use copyforge_markup::{split_sentences, strip_markup, truncate_at_boundary};
use copyforge_shared::{
    Category, CopyOrigin, Descriptions, Product, ProductId, RawCandidate, SpecValue,
};

use crate::voice::capitalise;

const UNNAMED: &str = "Unnamed product";
const META_LIMIT: usize = 160;
const MAX_FEATURES: usize = 12;

// ---------------------------------------------------------------------------
// Field aliases
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Name,
    Brand,
    Sku,
    Barcode,
    ShortCopy,
    LongCopy,
    MetaCopy,
    Features,
    Ignored,
    Spec(&'static str),
}

const FIELD_ALIASES: &[(Role, &[&str])] = &[
    (Role::Name, &["name", "product name", "title", "item name", "product title"]),
    (Role::Brand, &["brand", "manufacturer", "make"]),
    (
        Role::Sku,
        &["sku", "code", "product code", "item code", "article number", "model", "model number", "ref"],
    ),
    (Role::Barcode, &["barcode", "ean", "ean13", "upc", "gtin", "gtin13"]),
    (Role::ShortCopy, &["short description"]),
    (Role::LongCopy, &["long description"]),
    (Role::MetaCopy, &["meta description"]),
    (Role::Features, &["features", "key features", "highlights"]),
    (Role::Ignored, &["price", "rrp", "cost", "image", "image url", "url", "link", "stock"]),
    (Role::Spec("material"), &["material", "materials", "construction", "made from"]),
    (Role::Spec("bladeLength"), &["blade length", "bladelength", "blade"]),
    (Role::Spec("dimensions"), &["dimensions", "size", "measurements", "dims"]),
    (Role::Spec("capacity"), &["capacity", "volume"]),
    (Role::Spec("weight"), &["weight"]),
    (Role::Spec("powerW"), &["powerw", "power w", "power", "wattage", "watts"]),
    (Role::Spec("programs"), &["programs", "programmes", "settings", "modes", "functions"]),
    (Role::Spec("origin"), &["origin", "made in", "country", "country of origin"]),
    (Role::Spec("guarantee"), &["guarantee", "warranty", "guarantee years"]),
    (Role::Spec("care"), &["care", "care instructions", "cleaning", "maintenance"]),
];

/// Lower-case, `_`/`-` to spaces, single-spaced, no trailing colon.
fn fold_key(key: &str) -> String {
    key.trim()
        .trim_end_matches(':')
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn role_of(key: &str) -> Option<Role> {
    let folded = fold_key(key);
    FIELD_ALIASES
        .iter()
        .find(|(_, aliases)| aliases.contains(&folded.as_str()))
        .map(|(role, _)| *role)
}

/// Canonical specification key: an alias target, or camelCase of the key.
fn spec_key(key: &str) -> String {
    match role_of(key) {
        Some(Role::Spec(canonical)) => canonical.to_string(),
        _ => camel_case(&fold_key(key)),
    }
}

fn camel_case(folded: &str) -> String {
    folded
        .split(' ')
        .enumerate()
        .map(|(i, w)| if i == 0 { w.to_string() } else { capitalise(w) })
        .collect()
}

fn is_placeholder(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "" | "n/a" | "na" | "none" | "null" | "-" | "tbc" | "unknown"
    )
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Turns raw candidates into products with session-unique ids.
pub struct Normalizer {
    salt: String,
    sequence: AtomicU64,
}

impl Normalizer {
    pub fn new() -> Self {
        Self {
            salt: Uuid::now_v7().to_string(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn normalize(&self, candidate: RawCandidate, category: Category) -> Product {
        let mut identity = Identity::default();
        let mut specs: BTreeMap<String, SpecValue> = BTreeMap::new();
        let mut features = candidate.features.clone();

        // Adapter-parsed specs first; labelled fields override them.
        for (key, value) in &candidate.specifications {
            specs.insert(spec_key(key), value.clone());
        }
        for (key, value) in &candidate.fields {
            if is_placeholder(value) {
                continue;
            }
            match role_of(key) {
                Some(Role::Name) => identity.name.get_or_insert_with(|| value.clone()),
                Some(Role::Brand) => identity.brand.get_or_insert_with(|| value.clone()),
                Some(Role::Sku) => identity.sku.get_or_insert_with(|| value.clone()),
                Some(Role::Barcode) => identity.barcode.get_or_insert_with(|| value.clone()),
                Some(Role::ShortCopy) => identity.short.get_or_insert_with(|| value.clone()),
                Some(Role::LongCopy) => identity.long.get_or_insert_with(|| value.clone()),
                Some(Role::MetaCopy) => identity.meta.get_or_insert_with(|| value.clone()),
                Some(Role::Features) => {
                    features.extend(value.split(['|', ';', '\n']).map(str::to_string));
                    continue;
                }
                Some(Role::Ignored) => continue,
                Some(Role::Spec(canonical)) => {
                    specs.insert(canonical.to_string(), SpecValue::from(value.trim()));
                    continue;
                }
                None => {
                    specs.insert(spec_key(key), SpecValue::from(value.trim()));
                    continue;
                }
            };
        }

        let sku = clean(identity.sku.as_deref());
        let name = match clean(identity.name.as_deref()) {
            n if !n.is_empty() => tidy_name(&n),
            _ if !sku.is_empty() => sku.clone(),
            _ => UNNAMED.to_string(),
        };

        let mut product = Product::new(self.next_id(&candidate, &name, &sku), name, candidate.source);
        product.brand = clean(identity.brand.as_deref());
        product.sku = sku;
        product.barcode = clean(identity.barcode.as_deref()).replace([' ', '-'], "");
        product.category = Some(category);
        product.features = clean_features(features);
        product.confidence = candidate.confidence.clamp(0.0, 1.0);
        product.extraction_method = candidate.extraction_method;
        product.source_url = candidate.source_url;
        product.raw_text = candidate.raw_text;

        let (specs, weight) = canonical_specs(specs);
        product.specifications = specs;
        if let Some(grams) = weight {
            product.weight_grams = Some(grams);
            product.weight_human = Some(human_weight(grams));
        }
        product.is_non_stick = detect_non_stick(&product);

        let supplied = supplied_copy(&identity);
        if !supplied.is_empty() {
            product.descriptions = supplied;
            product.copy_origin = CopyOrigin::Supplied;
        }

        debug!(
            id = %product.id,
            name = %product.name,
            specs = product.specifications.len(),
            "candidate normalized"
        );
        product
    }

    /// `{prefix}-{12 hex}` over the session salt, a sequence number and
    /// the identity fields.
    fn next_id(&self, candidate: &RawCandidate, name: &str, sku: &str) -> ProductId {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(seq.to_le_bytes());
        hasher.update(candidate.source.as_str().as_bytes());
        hasher.update(name.as_bytes());
        hasher.update(sku.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        ProductId::new(format!("{}-{}", candidate.source.id_prefix(), &digest[..12]))
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct Identity {
    name: Option<String>,
    brand: Option<String>,
    sku: Option<String>,
    barcode: Option<String>,
    short: Option<String>,
    long: Option<String>,
    meta: Option<String>,
}

fn clean(value: Option<&str>) -> String {
    value
        .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|v| !is_placeholder(v))
        .unwrap_or_default()
}

/// ALL-CAPS names become title case.
fn tidy_name(name: &str) -> String {
    let letters: Vec<char> = name.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() < 4 || !letters.iter().all(|c| c.is_uppercase()) {
        return name.to_string();
    }
    name.split(' ')
        .map(|w| capitalise(&w.to_lowercase()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn clean_features(raw: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for feature in raw {
        let f = feature
            .trim()
            .trim_start_matches(['-', '*', '•'])
            .trim()
            .to_string();
        if is_placeholder(&f) || out.iter().any(|o| o.eq_ignore_ascii_case(&f)) {
            continue;
        }
        out.push(f);
        if out.len() >= MAX_FEATURES {
            break;
        }
    }
    out
}

fn supplied_copy(identity: &Identity) -> Descriptions {
    let short = identity.short.clone().unwrap_or_default();
    let long = identity.long.clone().unwrap_or_default();
    let meta = match identity.meta.as_deref() {
        Some(m) => m.trim().to_string(),
        None => derive_meta(&short),
    };
    Descriptions {
        short_description: short.trim().to_string(),
        long_description: long.trim().to_string(),
        meta_description: meta,
    }
}

/// First sentence of the short copy, within the meta limit.
fn derive_meta(short: &str) -> String {
    let visible = strip_markup(short);
    split_sentences(&visible)
        .into_iter()
        .next()
        .map(|s| truncate_at_boundary(&s, META_LIMIT))
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Specification values
// ---------------------------------------------------------------------------

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:[.,]\d+)?").expect("valid regex"));

fn parse_number(s: &str) -> Option<f64> {
    s.replace(',', ".").parse().ok()
}

/// Canonical keys and values, plus the parsed weight in grams.
fn canonical_specs(specs: BTreeMap<String, SpecValue>) -> (BTreeMap<String, SpecValue>, Option<u32>) {
    let mut out = BTreeMap::new();
    let mut grams = None;

    for (key, value) in specs {
        if matches!(&value, SpecValue::Text(t) if is_placeholder(t)) {
            continue;
        }
        let value = match key.as_str() {
            "dimensions" => canonical_dimensions(&value.to_string()).map(SpecValue::from),
            "powerW" => watts(&value).map(SpecValue::Number),
            "weight" => {
                grams = parse_grams(&value.to_string());
                grams.map(|g| SpecValue::from(human_weight(g)))
            }
            _ => Some(value),
        };
        if let Some(value) = value {
            out.insert(key, value);
        }
    }
    (out, grams)
}

/// `H x W x D cm` (or two measures). Anything else is kept as written.
fn canonical_dimensions(text: &str) -> Option<String> {
    let numbers: Vec<&str> = NUMBER_RE.find_iter(text).map(|m| m.as_str()).collect();
    if !(2..=3).contains(&numbers.len()) {
        return Some(text.trim().to_string()).filter(|t| !t.is_empty());
    }
    let unit = if text.to_lowercase().contains("mm") { "mm" } else { "cm" };
    let numbers: Vec<String> = numbers.iter().map(|n| n.replace(',', ".")).collect();
    Some(format!("{} {unit}", numbers.join(" x ")))
}

fn watts(value: &SpecValue) -> Option<f64> {
    if let SpecValue::Number(n) = value {
        return Some(n.round());
    }
    let text = value.to_string().to_lowercase();
    let n = parse_number(NUMBER_RE.find(&text)?.as_str())?;
    let scale = if text.contains("kw") { 1000.0 } else { 1.0 };
    Some((n * scale).round())
}

/// Grams from `1.2kg`, `850 g`, `850`. A bare number is grams.
fn parse_grams(text: &str) -> Option<u32> {
    static WEIGHT_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(kilograms?|kgs?|grams?|g)?\b").expect("valid regex")
    });
    let caps = WEIGHT_RE.captures(text)?;
    let n = parse_number(&caps[1])?;
    let is_kg = caps
        .get(2)
        .is_some_and(|u| u.as_str().to_lowercase().starts_with('k'));
    let grams = if is_kg { n * 1000.0 } else { n };
    (grams > 0.0).then_some(grams.round() as u32)
}

/// `850g`, `1.2kg`, `2kg`.
pub(crate) fn human_weight(grams: u32) -> String {
    if grams >= 1000 {
        let kg = format!("{:.2}", grams as f64 / 1000.0);
        format!("{}kg", kg.trim_end_matches('0').trim_end_matches('.'))
    } else {
        format!("{grams}g")
    }
}

fn detect_non_stick(product: &Product) -> bool {
    static NON_STICK_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)\bnon[- ]?stick\b|\bteflon\b|\bptfe\b|\bceramic[- ]coated\b")
            .expect("valid regex")
    });
    std::iter::once(product.name.clone())
        .chain(product.features.iter().cloned())
        .chain(product.specifications.values().map(ToString::to_string))
        .any(|text| NON_STICK_RE.is_match(&text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use copyforge_shared::SourceKind;

    fn tabular(fields: &[(&str, &str)]) -> RawCandidate {
        fields.iter().fold(
            RawCandidate::new(SourceKind::TabularFile, "tabular-row", 0.95),
            |c, (k, v)| c.with_field(k, v),
        )
    }

    #[test]
    fn resolves_aliases_and_canonical_specs() {
        let cand = tabular(&[
            ("name", "Frying Pan 28cm"),
            ("brand", "Tala"),
            ("product code", "TL-28"),
            ("ean", "5012 9046 01234"),
            ("materials", "Carbon steel, non-stick"),
            ("size", "5.5 x 28 x 48cm"),
            ("wattage", "N/A"),
            ("weight", "1.25kg"),
            ("colour finish", "Black"),
            ("price", "19.99"),
        ]);
        let p = Normalizer::new().normalize(cand, Category::BakewareCookware);

        assert!(p.id.as_str().starts_with("tab-"));
        assert_eq!(p.id.as_str().len(), 4 + 12);
        assert_eq!(p.brand, "Tala");
        assert_eq!(p.sku, "TL-28");
        assert_eq!(p.barcode, "5012904601234");
        assert_eq!(p.specifications["material"], SpecValue::from("Carbon steel, non-stick"));
        assert_eq!(p.specifications["dimensions"], SpecValue::from("5.5 x 28 x 48 cm"));
        assert_eq!(p.specifications["colourFinish"], SpecValue::from("Black"));
        assert!(!p.specifications.contains_key("powerW"));
        assert!(!p.specifications.contains_key("price"));
        assert_eq!(p.weight_grams, Some(1250));
        assert_eq!(p.weight_human.as_deref(), Some("1.25kg"));
        assert!(p.is_non_stick);
        assert_eq!(p.category, Some(Category::BakewareCookware));
        assert_eq!(p.copy_origin, CopyOrigin::Pending);
    }

    #[test]
    fn ids_are_unique_within_a_session() {
        let n = Normalizer::new();
        let a = n.normalize(tabular(&[("name", "Mug")]), Category::DiningDrinkLiving);
        let b = n.normalize(tabular(&[("name", "Mug")]), Category::DiningDrinkLiving);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn power_is_integer_watts() {
        let cand = RawCandidate::new(SourceKind::FreeText, "text-heuristic", 0.5)
            .with_field("name", "Kettle")
            .with_field("power", "2.2kW")
            .with_spec("capacity", "1.7L");
        let p = Normalizer::new().normalize(cand, Category::Electricals);
        assert_eq!(p.specifications["powerW"], SpecValue::Number(2200.0));
        assert_eq!(p.specifications["capacity"], SpecValue::from("1.7L"));
    }

    #[test]
    fn name_falls_back_and_caps_are_tidied() {
        let n = Normalizer::new();
        let p = n.normalize(tabular(&[("sku", "ZW-1")]), Category::KnivesCutlery);
        assert_eq!(p.name, "ZW-1");

        let p = n.normalize(tabular(&[("name", "none")]), Category::KnivesCutlery);
        assert_eq!(p.name, UNNAMED);

        let p = n.normalize(tabular(&[("name", "PARING KNIFE 9CM")]), Category::KnivesCutlery);
        assert_eq!(p.name, "Paring Knife 9cm");
    }

    #[test]
    fn features_split_and_deduplicated() {
        let cand = tabular(&[("name", "Grater"), ("key features", "Fine blade | coarse blade; Fine Blade")])
            .with_feature("Dishwasher safe");
        let p = Normalizer::new().normalize(cand, Category::FoodPrepTools);
        assert_eq!(p.features, vec!["Dishwasher safe", "Fine blade", "coarse blade"]);
    }

    #[test]
    fn supplier_copy_is_carried_with_derived_meta() {
        let cand = tabular(&[
            ("name", "Pie Dish"),
            ("short_description", "Deep ceramic dish. Oven to table."),
        ]);
        let p = Normalizer::new().normalize(cand, Category::BakewareCookware);
        assert_eq!(p.copy_origin, CopyOrigin::Supplied);
        assert_eq!(p.descriptions.short_description, "Deep ceramic dish. Oven to table.");
        assert_eq!(p.descriptions.meta_description, "Deep ceramic dish.");
        assert!(p.descriptions.long_description.is_empty());
    }

    #[test]
    fn weights() {
        assert_eq!(parse_grams("850 g"), Some(850));
        assert_eq!(parse_grams("2 kg"), Some(2000));
        assert_eq!(parse_grams("430"), Some(430));
        assert_eq!(human_weight(850), "850g");
        assert_eq!(human_weight(2000), "2kg");
        assert_eq!(human_weight(1200), "1.2kg");
    }

    #[test]
    fn spec_keys_fold_to_canonical() {
        assert_eq!(spec_key("Blade_Length"), "bladeLength");
        assert_eq!(spec_key("powerW"), "powerW");
        assert_eq!(spec_key("Country of Origin"), "origin");
        assert_eq!(spec_key("pack size"), "packSize");
    }
}
