//! Deterministic description template, used when no language model is
//! configured or a generation call fails.

use std::sync::LazyLock;

use regex::Regex;

use copyforge_markup::{line_break_block, paragraph_blocks, truncate_at_boundary, visible_len};
use copyforge_shared::{Category, Descriptions, Product, SpecValue};

use crate::validation::{SHORT_LIMIT, finish_meta};
use crate::voice::capitalise;

const FRAGMENT_WORDS: usize = 8;
const FILLERS: [&str; 3] = ["Everyday use", "Practical details", "Easy to look after"];
const UK_ORIGINS: [&str; 6] = [
    "UK",
    "UNITED KINGDOM",
    "ENGLAND",
    "SCOTLAND",
    "WALES",
    "NORTHERN IRELAND",
];

/// Template copy for `product`. Every field is non-empty.
pub fn fallback_descriptions(product: &Product) -> Descriptions {
    Descriptions {
        short_description: line_break_block(&short_fragments(product)),
        long_description: paragraph_blocks(&long_statements(product)),
        meta_description: meta_sentence(product),
    }
}

/// A specification the product's category allows, as display text.
fn spec(product: &Product, key: &str) -> Option<String> {
    product
        .allowed_specifications()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| match v {
            SpecValue::Text(t) => t.trim().trim_end_matches('.').to_string(),
            other => other.to_string(),
        })
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Short copy
// ---------------------------------------------------------------------------

/// Three fragments of at most eight words, led by the category's themes.
pub(crate) fn short_fragments(product: &Product) -> Vec<String> {
    static BLADE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2}\s?cm)\b").expect("valid regex"));

    let mut frags: Vec<String> = Vec::new();
    match product.category {
        Some(Category::KnivesCutlery) => {
            frags.extend(spec(product, "material"));
            let blade = spec(product, "bladeLength")
                .or_else(|| BLADE_RE.captures(&product.name).map(|c| c[1].to_string()));
            frags.extend(blade.map(|b| format!("{b} blade")));
            if spec(product, "guarantee").is_some() {
                frags.push("Includes guarantee".into());
            }
        }
        Some(Category::Electricals) => {
            frags.extend(spec(product, "powerW").map(|w| format!("{w}W power")));
            frags.extend(spec(product, "capacity").map(|c| format!("{c} capacity")));
        }
        Some(Category::BakewareCookware) => {
            if product.is_non_stick {
                frags.push("Non-stick coating".into());
            }
            frags.extend(spec(product, "material"));
            frags.extend(spec(product, "capacity").map(|c| format!("{c} capacity")));
        }
        Some(Category::DiningDrinkLiving) => {
            frags.extend(spec(product, "material"));
            frags.extend(spec(product, "capacity").map(|c| format!("{c} capacity")));
        }
        Some(Category::FoodPrepTools) | Some(Category::Clothing) | None => {
            frags.extend(spec(product, "material"));
        }
    }
    frags.extend(product.features.iter().cloned());
    frags.extend(FILLERS.iter().map(|f| f.to_string()));

    let mut out: Vec<String> = Vec::new();
    for frag in frags {
        let tidy = tidy_fragment(&frag);
        if tidy.is_empty() || out.iter().any(|o| o.eq_ignore_ascii_case(&tidy)) {
            continue;
        }
        out.push(tidy);
        if out.len() == 3 {
            break;
        }
    }

    // Trim the longest fragment a word at a time until the block fits.
    while visible_len(&line_break_block(&out)) > SHORT_LIMIT {
        let Some((i, frag)) = out
            .iter()
            .enumerate()
            .max_by_key(|(_, f)| f.chars().count())
            .filter(|(_, f)| f.split_whitespace().count() > 2)
            .map(|(i, f)| (i, f.clone()))
        else {
            break;
        };
        out[i] = truncate_at_boundary(&frag, frag.chars().count() - 1);
    }
    out
}

fn tidy_fragment(frag: &str) -> String {
    let words: Vec<&str> = frag
        .trim()
        .trim_end_matches('.')
        .split_whitespace()
        .take(FRAGMENT_WORDS)
        .collect();
    capitalise(&words.join(" "))
}

// ---------------------------------------------------------------------------
// Meta and long copy
// ---------------------------------------------------------------------------

/// "The {name} by {brand} provides reliable performance for everyday use."
pub(crate) fn meta_sentence(product: &Product) -> String {
    let name = product.name.trim();
    let brand = product.brand.trim();
    let subject = if brand.is_empty() || name.to_lowercase().contains(&brand.to_lowercase()) {
        name.to_string()
    } else {
        format!("{name} by {brand}")
    };
    finish_meta(&format!(
        "The {subject} provides reliable performance for everyday use"
    ))
}

/// Meta sentence, a general statement, features, then one line per allowed
/// specification.
pub(crate) fn long_statements(product: &Product) -> Vec<String> {
    let name = product.name.trim();
    let mut lines = vec![
        meta_sentence(product),
        format!(
            "{name} is designed for everyday use with clear, accurate details to help you choose with confidence."
        ),
    ];

    let features: Vec<&str> = product
        .features
        .iter()
        .map(|f| f.trim().trim_end_matches('.'))
        .filter(|f| !f.is_empty())
        .take(3)
        .collect();
    match features.as_slice() {
        [] => {}
        [one] => lines.push(format!("Key features include {one}.")),
        [init @ .., last] => lines.push(format!(
            "Key features include {} and {last}.",
            init.join(", ")
        )),
    }

    if let Some(material) = spec(product, "material") {
        lines.push(format!("Made from {material}."));
    }
    if let Some(blade) = spec(product, "bladeLength") {
        lines.push(format!("Blade length: {blade}."));
    }
    if let Some(capacity) = spec(product, "capacity") {
        lines.push(format!("Capacity: {capacity}."));
    }
    if let Some(dimensions) = spec(product, "dimensions") {
        lines.push(format!("Dimensions: {dimensions}."));
    }
    if product
        .category
        .is_none_or(|c| c.allows_spec("weight"))
    {
        let weight = product.weight_human.clone().or_else(|| spec(product, "weight"));
        if let Some(weight) = weight {
            lines.push(format!("Weight: {weight}."));
        }
    }
    if let Some(watts) = spec(product, "powerW") {
        lines.push(format!("Power: {watts}W."));
    }
    if let Some(programs) = spec(product, "programs") {
        lines.push(format!("Settings: {programs}."));
    }
    if let Some(origin) = spec(product, "origin") {
        let upper = origin.to_uppercase();
        if UK_ORIGINS.iter().any(|o| upper.contains(o)) {
            lines.push("Made in UK.".into());
        } else {
            lines.push(format!("Made in {origin}."));
        }
    }
    match spec(product, "guarantee") {
        Some(guarantee) => lines.push(format!("Guarantee: {guarantee}.")),
        None if product.is_non_stick
            && product.category.is_none_or(|c| c.allows_spec("guarantee")) =>
        {
            lines.push("10-year guarantee.".into());
        }
        None => {}
    }
    if let Some(care) = spec(product, "care") {
        lines.push(format!("Care: {care}."));
    }
    lines
}
