//! Typed or pasted product descriptions.
//!
//! Labelled lines (`SKU: ...`, `Brand: ...`) are read first. The rest is
//! handed to the language model for field inference when one is available,
//! otherwise split heuristically on commas and line breaks.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use tracing::{info, instrument, warn};

use copyforge_shared::{
    Category, CopyforgeError, LanguageModel, Prompt, RawCandidate, Result, SourceKind,
    parse_json_reply,
};

use super::bounded;
use crate::extract::{find_barcode, find_brand, find_sku, is_known_brand, specs_from_text};

const MODEL_METHOD: &str = "model-inference";
const MODEL_CONFIDENCE: f64 = 0.6;
const HEURISTIC_METHOD: &str = "text-heuristic";
const HEURISTIC_CONFIDENCE: f64 = 0.5;
const MAX_FEATURES: usize = 10;

const INFERENCE_BRIEF: &str = "You extract product fields from a short retail description. \
Reply with JSON only, shaped as {\"name\": string, \"brand\": string or null, \
\"features\": [string], \"specifications\": {string: string}}. \
Use only facts present in the text. Do not invent values.";

pub struct FreeTextAdapter {
    model: Option<Arc<dyn LanguageModel>>,
    budget: Duration,
    max_chars: usize,
}

impl FreeTextAdapter {
    pub fn new(model: Option<Arc<dyn LanguageModel>>, budget: Duration, max_chars: usize) -> Self {
        Self {
            model,
            budget,
            max_chars,
        }
    }

    #[instrument(skip_all, fields(chars = text.chars().count()))]
    pub async fn execute(&self, text: &str, category: Category) -> Result<Vec<RawCandidate>> {
        let text: String = text.trim().chars().take(self.max_chars).collect();
        let (labelled, rest) = labelled_lines(&text);

        let mut cand = match &self.model {
            Some(model) if !rest.trim().is_empty() => {
                match self.infer(model.as_ref(), &rest, category).await {
                    Ok(cand) if cand.field("name").is_some() => cand,
                    Ok(_) => {
                        warn!("model inference returned no name, using heuristic split");
                        heuristic_candidate(&rest)
                    }
                    Err(e) => {
                        warn!(error = %e, "model inference failed, using heuristic split");
                        heuristic_candidate(&rest)
                    }
                }
            }
            _ => heuristic_candidate(&rest),
        };

        // labelled values win over inferred ones
        for (key, value) in labelled {
            cand.set_field(key, value);
        }
        if cand.field("sku").is_none() {
            cand.set_field("sku", find_sku(&text).unwrap_or_default());
        }
        if cand.field("barcode").is_none() {
            cand.set_field("barcode", find_barcode(&text).unwrap_or_default());
        }
        for (key, value) in specs_from_text(&text) {
            cand.specifications.entry(key).or_insert(value);
        }
        cand.raw_text = Some(text);

        if cand.field("name").is_none() {
            info!("no product name in text");
            return Ok(Vec::new());
        }
        Ok(vec![cand])
    }

    async fn infer(
        &self,
        model: &dyn LanguageModel,
        text: &str,
        category: Category,
    ) -> Result<RawCandidate> {
        let prompt = Prompt {
            system: INFERENCE_BRIEF.to_string(),
            user: format!("Category: {category}\nText:\n{text}"),
            temperature: 0.0,
            max_tokens: 400,
        };
        let reply = bounded("field inference", self.budget, model.complete(&prompt)).await?;
        let value = parse_json_reply(&reply)
            .map_err(|e| CopyforgeError::from_capability("field inference", e))?;
        Ok(candidate_from_json(&value))
    }
}

/// Split off `Label: value` lines for the identity fields.
fn labelled_lines(text: &str) -> (Vec<(&'static str, String)>, String) {
    static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?i)^\s*(sku|code|item code|product code|brand|manufacturer|ean|barcode|gtin|name|product name)\s*[:#]\s*(.+?)\s*$",
        )
        .expect("valid regex")
    });

    let mut labelled = Vec::new();
    let mut rest = Vec::new();
    for line in text.lines() {
        match LABEL_RE.captures(line) {
            Some(c) => {
                let key = match c[1].to_lowercase().as_str() {
                    "brand" | "manufacturer" => "brand",
                    "ean" | "barcode" | "gtin" => "barcode",
                    "name" | "product name" => "name",
                    _ => "sku",
                };
                labelled.push((key, c[2].to_string()));
            }
            None => rest.push(line),
        }
    }
    (labelled, rest.join("\n"))
}

fn candidate_from_json(value: &Value) -> RawCandidate {
    let mut cand = RawCandidate::new(SourceKind::FreeText, MODEL_METHOD, MODEL_CONFIDENCE);
    let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::trim);

    cand.set_field("name", text("name").unwrap_or_default());
    cand.set_field("brand", text("brand").unwrap_or_default());

    if let Some(Value::Array(items)) = value.get("features") {
        cand.features = items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .take(MAX_FEATURES)
            .map(str::to_string)
            .collect();
    }
    if let Some(Value::Object(specs)) = value.get("specifications") {
        let mut fields = BTreeMap::new();
        for (key, v) in specs {
            let rendered = match v {
                Value::String(s) => s.trim().to_string(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            fields.insert(key.to_lowercase(), rendered);
        }
        for (key, v) in fields {
            cand.set_field(&key, v);
        }
    }
    cand
}

/// Comma/line split: first segment is the name, a brand-looking segment is
/// the brand, everything else is a feature.
fn heuristic_candidate(text: &str) -> RawCandidate {
    let mut cand = RawCandidate::new(SourceKind::FreeText, HEURISTIC_METHOD, HEURISTIC_CONFIDENCE);
    let segments: Vec<&str> = text
        .split([',', '\n', ';', '|'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    let Some((name, rest)) = segments.split_first() else {
        return cand;
    };
    cand.set_field("name", name);

    let brand_index = rest
        .iter()
        .position(|s| is_known_brand(s).is_some())
        .or_else(|| (rest.len() >= 2 && looks_like_brand(rest[0])).then_some(0));
    let brand = brand_index
        .map(|i| is_known_brand(rest[i]).map(str::to_string).unwrap_or_else(|| rest[i].to_string()))
        .or_else(|| find_brand(name).map(str::to_string));
    if let Some(brand) = brand {
        cand.set_field("brand", brand);
    }

    cand.features = rest
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != brand_index)
        .map(|(_, s)| s.trim_end_matches('.').to_string())
        .take(MAX_FEATURES)
        .collect();
    cand
}

/// One to three capitalised words without digits.
fn looks_like_brand(segment: &str) -> bool {
    let words: Vec<&str> = segment.split_whitespace().collect();
    (1..=3).contains(&words.len())
        && !segment.chars().any(|c| c.is_ascii_digit())
        && words
            .iter()
            .all(|w| w.chars().next().is_some_and(char::is_uppercase))
}
