//! Content generator: product → description copy via the language model,
//! falling back to the deterministic template on any failure.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value, json};
use tracing::{debug, instrument, warn};

use copyforge_markup::{blocks, list_to_line_breaks, sentence_blocks};
use copyforge_shared::{
    AppConfig, Category, CopyOrigin, CopyforgeError, Descriptions, LanguageModel, Product, Prompt,
    Result, parse_json_reply,
};

use crate::fallback::fallback_descriptions;
use crate::validation::{Violation, finish_meta};
use crate::voice::Lexicon;

/// Source text beyond this is cut before it reaches the prompt.
const SOURCE_TEXT_CHARS: usize = 2000;
const MAX_SEO_KEYWORDS: usize = 6;

/// Generation call settings.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub timeout: Duration,
    pub temperature: f64,
    pub max_tokens: u32,
    pub extra_banned_phrases: Vec<String>,
}

impl From<&AppConfig> for GenerationSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.generation.timeout_secs),
            temperature: config.generation.temperature,
            max_tokens: config.generation.max_tokens,
            extra_banned_phrases: config.voice.extra_banned_phrases.clone(),
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// Copy plus where it came from ([`CopyOrigin::Generated`] or
/// [`CopyOrigin::Fallback`]).
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedCopy {
    pub descriptions: Descriptions,
    pub origin: CopyOrigin,
}

pub struct ContentGenerator {
    model: Option<Arc<dyn LanguageModel>>,
    settings: GenerationSettings,
}

impl ContentGenerator {
    pub fn new(model: Option<Arc<dyn LanguageModel>>, settings: GenerationSettings) -> Self {
        Self { model, settings }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Generate copy for `product`. `violations` from a previous attempt are
    /// fed back to the model. Never fails: without a model, or when the call
    /// or its reply is unusable, the template is returned instead.
    #[instrument(skip_all, fields(product = %product.id, retry = !violations.is_empty()))]
    pub async fn generate(&self, product: &Product, violations: &[Violation]) -> GeneratedCopy {
        let Some(model) = &self.model else {
            debug!("no language model, using template");
            return template(product);
        };

        match self.request(model.as_ref(), product, violations).await {
            Ok(descriptions) => GeneratedCopy {
                descriptions,
                origin: CopyOrigin::Generated,
            },
            Err(e) => {
                warn!(model = model.name(), error = %e, "generation failed, using template");
                template(product)
            }
        }
    }

    async fn request(
        &self,
        model: &dyn LanguageModel,
        product: &Product,
        violations: &[Violation],
    ) -> Result<Descriptions> {
        let prompt = build_prompt(product, violations, &self.settings);
        let budget = self.settings.timeout;
        let reply = tokio::time::timeout(budget, model.complete(&prompt))
            .await
            .map_err(|_| CopyforgeError::timeout("copy generation", budget.as_secs()))?
            .map_err(|e| CopyforgeError::Generation(e.to_string()))?;
        parse_reply(&reply)
    }
}

/// Search keywords and a meta sentence suggested for a product query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeoKeywords {
    pub keywords: Vec<String>,
    pub meta_description: Option<String>,
}

impl SeoKeywords {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.meta_description.is_none()
    }
}

impl ContentGenerator {
    /// Ask the model for search keywords and a meta sentence for `query`.
    /// Empty without a model or when the call or reply is unusable.
    #[instrument(skip_all, fields(query = %query))]
    pub async fn seo_keywords(&self, query: &str, brand: &str) -> SeoKeywords {
        let Some(model) = &self.model else {
            debug!("no language model, no keyword suggestions");
            return SeoKeywords::default();
        };

        let prompt = seo_prompt(query, brand, &self.settings);
        let budget = self.settings.timeout;
        let reply = match tokio::time::timeout(budget, model.complete(&prompt)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!(model = model.name(), error = %e, "keyword suggestion failed");
                return SeoKeywords::default();
            }
            Err(_) => {
                warn!(secs = budget.as_secs(), "keyword suggestion timed out");
                return SeoKeywords::default();
            }
        };

        let lexicon = Lexicon::new(&self.settings.extra_banned_phrases);
        match parse_seo_reply(&reply, &lexicon) {
            Ok(seo) => {
                debug!(keywords = seo.keywords.len(), "keywords suggested");
                seo
            }
            Err(e) => {
                warn!(error = %e, "unusable keyword reply");
                SeoKeywords::default()
            }
        }
    }
}

fn template(product: &Product) -> GeneratedCopy {
    GeneratedCopy {
        descriptions: fallback_descriptions(product),
        origin: CopyOrigin::Fallback,
    }
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

const BRIEF: &str = "You write product descriptions for a homeware retailer catalogue.

Voice: UK English spelling, warm and benefit-led, retailer-neutral. Plain punctuation, no em dashes.
Never use transactional words (buy, shop, order, price, sale, deal, discount, delivery, shipping).
Never mention heritage or provenance claims such as founding years, 'since <year>', 'family-run' or 'imported from'.
Use only facts from the product data. Never invent specifications.

Reply with JSON only: {\"short_html\": string, \"long_html\": string}.

short_html: exactly one <p> element holding three fragments of two to eight words, separated by <br>. At most 150 visible characters. No full stops.
long_html: a sequence of <p> elements, one sentence each, at most 2000 visible characters.
The first <p> is a single sentence of at most 160 characters that summarises the product without naming its category; it is reused as the meta description.
Follow the category's lifestyle to technical balance, then finish with one <p> per specification line (capacity, dimensions as H x W x D cm, weight, origin, guarantee, care) where the data has them.";

fn brief(category: Option<Category>, extra_banned: &[String]) -> String {
    let mut out = BRIEF.to_string();
    if let Some(category) = category {
        let (lifestyle, technical) = category.copy_ratio();
        out.push_str(&format!(
            "\n\nCategory: {}. Balance: {lifestyle}% lifestyle, {technical}% technical. Allowed specifications: {}.",
            category.label(),
            category.allowed_specs().join(", ")
        ));
    }
    if !extra_banned.is_empty() {
        out.push_str(&format!("\nAlso never use: {}.", extra_banned.join(", ")));
    }
    out
}

/// The generation prompt: brand voice brief plus product data, with the
/// previous attempt's violations when retrying.
pub fn build_prompt(
    product: &Product,
    violations: &[Violation],
    settings: &GenerationSettings,
) -> Prompt {
    let specs: Map<String, Value> = product
        .allowed_specifications()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect();
    let source_text: Option<String> = product
        .raw_text
        .as_deref()
        .map(|t| t.chars().take(SOURCE_TEXT_CHARS).collect());

    let data = json!({
        "name": product.name,
        "brand": product.brand,
        "category": product.category.map(|c| c.label()),
        "features": product.features,
        "specifications": specs,
        "weight": product.weight_human,
        "nonStick": product.is_non_stick,
        "sourceText": source_text,
    });
    let data = serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string());

    let mut user = format!("Product data:\n{data}");
    if !product.seo_keywords.is_empty() || product.seo_meta_seed.is_some() {
        let hints = json!({
            "keywords": product.seo_keywords,
            "metaSeed": product.seo_meta_seed.as_deref().unwrap_or_default(),
        });
        user.push_str(&format!(
            "\n\nSearch hints (work them in naturally, never list them):\n{hints}"
        ));
    }
    if !violations.is_empty() {
        user.push_str("\n\nPrevious attempt violated:");
        for v in violations {
            user.push_str(&format!("\n- {v}"));
        }
    }

    Prompt {
        system: brief(product.category, &settings.extra_banned_phrases),
        user,
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
    }
}

const SEO_BRIEF: &str = "You suggest search keywords for a UK homeware retailer's product pages. \
Give up to six phrases shoppers would search for, and one meta description of 150 to 160 characters \
that names the brand when one is given. UK English spelling. No transactional words. \
Reply with JSON only: {\"keywords\": [string], \"description\": string}.";

fn seo_prompt(query: &str, brand: &str, settings: &GenerationSettings) -> Prompt {
    let mut user = format!("Query: {}", query.trim());
    if !brand.trim().is_empty() {
        user.push_str(&format!("\nBrand: {}", brand.trim()));
    }
    Prompt {
        system: SEO_BRIEF.to_string(),
        user,
        temperature: 0.3,
        max_tokens: 500,
    }
}

// ---------------------------------------------------------------------------
// Reply
// ---------------------------------------------------------------------------

/// Read `{short_html, long_html}` from a reply and shape it: short copy as
/// a line-break block, long copy as one block per sentence, meta from the
/// first long block.
pub fn parse_reply(reply: &str) -> Result<Descriptions> {
    let value = parse_json_reply(reply)
        .map_err(|e| CopyforgeError::Generation(format!("unreadable reply: {e}")))?;
    let field = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };
    let (Some(short_html), Some(long_html)) = (field("short_html"), field("long_html")) else {
        return Err(CopyforgeError::Generation(
            "reply is missing short_html or long_html".into(),
        ));
    };

    let short = list_to_line_breaks(short_html);
    let long = sentence_blocks(long_html);
    let meta = blocks(&long)
        .first()
        .map(|first| finish_meta(first))
        .unwrap_or_default();
    if short.is_empty() || long.is_empty() || meta.is_empty() {
        return Err(CopyforgeError::Generation(
            "reply has no usable copy after sanitising".into(),
        ));
    }

    Ok(Descriptions {
        short_description: short,
        long_description: long,
        meta_description: meta,
    })
}

/// Read `{keywords, description}`: at most six distinct keywords free of
/// banned terms, and the description as one meta sentence.
pub fn parse_seo_reply(reply: &str, lexicon: &Lexicon) -> Result<SeoKeywords> {
    let value = parse_json_reply(reply)
        .map_err(|e| CopyforgeError::Generation(format!("unreadable keyword reply: {e}")))?;

    let mut keywords: Vec<String> = Vec::new();
    if let Some(Value::Array(items)) = value.get("keywords") {
        for item in items.iter().filter_map(Value::as_str) {
            let keyword = item.split_whitespace().collect::<Vec<_>>().join(" ");
            if keyword.is_empty()
                || lexicon.find(&keyword).is_some()
                || keywords.iter().any(|k| k.eq_ignore_ascii_case(&keyword))
            {
                continue;
            }
            keywords.push(keyword);
            if keywords.len() == MAX_SEO_KEYWORDS {
                break;
            }
        }
    }
    let meta_description = value
        .get("description")
        .and_then(Value::as_str)
        .map(|d| finish_meta(&lexicon.remove(d)))
        .filter(|d| !d.is_empty());

    let seo = SeoKeywords {
        keywords,
        meta_description,
    };
    if seo.is_empty() {
        return Err(CopyforgeError::Generation(
            "keyword reply has no keywords or description".into(),
        ));
    }
    Ok(seo)
}
