//! Pattern extraction shared by the text-reading adapters (OCR, page, free text).

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use copyforge_shared::SpecValue;

/// Brands recognised in unlabelled text, in display form.
const KNOWN_BRANDS: &[&str] = &[
    "Le Creuset",
    "Zwilling",
    "KitchenAid",
    "Kenwood",
    "Dualit",
    "Sage",
    "Joseph Joseph",
    "Robert Welch",
    "Denby",
    "Smeg",
    "Tefal",
    "Victorinox",
    "Mason Cash",
    "Stellar",
];

/// A known brand mentioned anywhere in `text`, matched on word boundaries.
pub(crate) fn find_brand(text: &str) -> Option<&'static str> {
    static BRAND_RES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
        KNOWN_BRANDS
            .iter()
            .map(|b| {
                let re = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(b))).expect("valid regex");
                (re, *b)
            })
            .collect()
    });

    BRAND_RES
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, b)| *b)
}

/// Whether `segment` names a known brand exactly.
pub(crate) fn is_known_brand(segment: &str) -> Option<&'static str> {
    let s = segment.trim();
    KNOWN_BRANDS
        .iter()
        .find(|b| b.eq_ignore_ascii_case(s))
        .copied()
}

/// Product code: labelled (`SKU: ABC-123`) first, then bare letter+digit tokens.
pub(crate) fn find_sku(text: &str) -> Option<String> {
    static LABELLED_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)\b(?:SKU|Item\s+No\.?|Item|Code|Model|Article\s+No\.?)\s*[:#]?\s*([A-Z0-9][A-Z0-9\-_.]{2,})")
            .expect("valid regex")
    });
    static TOKEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\b([A-Z]{2,}[0-9]{4,})\b").expect("valid regex"));

    LABELLED_RE
        .captures_iter(text)
        .map(|c| c[1].trim_end_matches('.').to_string())
        .find(|code| code.chars().any(|ch| ch.is_ascii_digit()))
        .or_else(|| TOKEN_RE.captures(text).map(|c| c[1].to_string()))
}

/// Scan code: labelled (`EAN: 5012345678900`) first, then any 12–14 digit run.
pub(crate) fn find_barcode(text: &str) -> Option<String> {
    static LABELLED_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)\b(?:EAN|GTIN|UPC|Barcode)\s*[:#]?\s*([0-9]{8,14})\b").expect("valid regex")
    });
    static TOKEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\b([0-9]{12,14})\b").expect("valid regex"));

    LABELLED_RE
        .captures(text)
        .or_else(|| TOKEN_RE.captures(text))
        .map(|c| c[1].to_string())
}

/// Whether `query` looks like a scan code (8–14 digits).
pub(crate) fn is_scan_code(query: &str) -> bool {
    let q = query.trim();
    (8..=14).contains(&q.len()) && q.chars().all(|c| c.is_ascii_digit())
}

/// Measurements mentioned in free text: dimensions, capacity, weight, power.
pub(crate) fn specs_from_text(text: &str) -> BTreeMap<String, SpecValue> {
    static DIMENSIONS_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?i)\b\d+(?:\.\d+)?\s*(?:cm|mm)?\s*[x×]\s*\d+(?:\.\d+)?\s*(?:cm|mm)?\s*[x×]\s*\d+(?:\.\d+)?\s*(?:cm|mm)\b",
        )
        .expect("valid regex")
    });
    static CAPACITY_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)\b\d+(?:\.\d+)?\s*(?:ml|cl|litres?|liters?|l)\b").expect("valid regex")
    });
    static WEIGHT_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)\b\d+(?:\.\d+)?\s*(?:kg|grams?|g)\b").expect("valid regex")
    });
    static POWER_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)\b(\d{2,5})\s*(?:w|watts?)\b").expect("valid regex")
    });

    let mut specs = BTreeMap::new();
    if let Some(m) = DIMENSIONS_RE.find(text) {
        specs.insert("dimensions".into(), SpecValue::from(m.as_str()));
    }
    if let Some(m) = CAPACITY_RE.find(text) {
        specs.insert("capacity".into(), SpecValue::from(m.as_str()));
    }
    if let Some(m) = WEIGHT_RE.find(text) {
        specs.insert("weight".into(), SpecValue::from(m.as_str()));
    }
    if let Some(watts) = POWER_RE
        .captures(text)
        .and_then(|c| c[1].parse::<f64>().ok())
    {
        specs.insert("powerW".into(), SpecValue::Number(watts));
    }
    specs
}

/// `Key: Value` split for labelled lines. Keys are at most four words.
pub(crate) fn key_value(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    let value = value.trim();
    if key.is_empty() || value.is_empty() || key.split_whitespace().count() > 4 {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}
