//! Validation engine: brand voice checks and the final clamp.
//!
//! Each copy field runs length → shape → lexicon → spelling and stops at its
//! first failure. [`Validator::clamp`] repairs copy in the order lexicon
//! removal → spelling fix → reshape → truncate, and its output always passes
//! [`Validator::validate`].

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use copyforge_markup::{
    blocks, has_encoded_markup, has_markup, is_block_sequence, is_line_break_block, line_break_block,
    paragraph_blocks, split_sentences, strip_markup, truncate_at_boundary, visible_len,
};
use copyforge_shared::{Descriptions, Product};

use crate::fallback;
use crate::voice::{Lexicon, capitalise, find_us_spelling, to_uk_spelling};

pub const SHORT_LIMIT: usize = 150;
pub const LONG_LIMIT: usize = 2000;
pub const META_LIMIT: usize = 160;

const SHORT_ITEMS: usize = 3;
const LAST_RESORT_SHORT: &str = "Everyday use";
const LAST_RESORT_META: &str = "Product details.";

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// The three description fields, in check order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyField {
    Short,
    Long,
    Meta,
}

impl CopyField {
    pub const ALL: [CopyField; 3] = [Self::Short, Self::Long, Self::Meta];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Short => "shortDescription",
            Self::Long => "longDescription",
            Self::Meta => "metaDescription",
        }
    }

    /// Maximum visible characters.
    pub fn limit(&self) -> usize {
        match self {
            Self::Short => SHORT_LIMIT,
            Self::Long => LONG_LIMIT,
            Self::Meta => META_LIMIT,
        }
    }

    fn text<'a>(&self, d: &'a Descriptions) -> &'a str {
        match self {
            Self::Short => &d.short_description,
            Self::Long => &d.long_description,
            Self::Meta => &d.meta_description,
        }
    }
}

impl fmt::Display for CopyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Length,
    Shape,
    Lexicon,
    Spelling,
}

/// The first constraint a field failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: CopyField,
    pub check: Check,
    pub detail: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.detail)
    }
}

/// Per-field outcome: a field passed unless it has a violation here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violation(&self, field: CopyField) -> Option<&Violation> {
        self.violations.iter().find(|v| v.field == field)
    }

    pub fn field_passed(&self, field: CopyField) -> bool {
        self.violation(field).is_none()
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

pub struct Validator {
    lexicon: Lexicon,
}

impl Validator {
    pub fn new(extra_banned: &[String]) -> Self {
        Self {
            lexicon: Lexicon::new(extra_banned),
        }
    }

    pub fn validate(&self, copy: &Descriptions) -> ValidationResult {
        let violations = CopyField::ALL
            .into_iter()
            .filter_map(|field| self.check_field(field, field.text(copy)))
            .collect();
        ValidationResult { violations }
    }

    fn check_field(&self, field: CopyField, text: &str) -> Option<Violation> {
        let violation = |check, detail: String| Some(Violation { field, check, detail });

        let visible = match field {
            CopyField::Meta => text.trim().to_string(),
            _ => strip_markup(text),
        };
        let len = match field {
            CopyField::Meta => visible.chars().count(),
            _ => visible_len(text),
        };
        if !(1..=field.limit()).contains(&len) {
            return violation(
                Check::Length,
                format!("visible length {len} is outside 1..={}", field.limit()),
            );
        }

        let shape_ok = !has_encoded_markup(text)
            && match field {
                CopyField::Short => is_line_break_block(text),
                CopyField::Long => is_block_sequence(text),
                CopyField::Meta => !has_markup(text) && split_sentences(&visible).len() == 1,
            };
        if !shape_ok {
            let expected = match field {
                CopyField::Short => "one <p> block with <br> separated items",
                CopyField::Long => "a sequence of <p> blocks",
                CopyField::Meta => "a single plain sentence",
            };
            return violation(Check::Shape, format!("expected {expected}"));
        }

        if let Some(term) = self.lexicon.find(&visible) {
            return violation(Check::Lexicon, format!("banned term '{term}'"));
        }
        if let Some((us, uk)) = find_us_spelling(&visible) {
            return violation(Check::Spelling, format!("US spelling '{us}', use '{uk}'"));
        }
        None
    }

    /// Repair copy so it passes every check. Empty fields are filled from
    /// the template for `product`.
    pub fn clamp(&self, copy: &Descriptions, product: &Product) -> Descriptions {
        Descriptions {
            short_description: self.clamp_short(&copy.short_description, product),
            long_description: self.clamp_long(&copy.long_description, product),
            meta_description: self.clamp_meta(&copy.meta_description, product),
        }
    }

    fn clean(&self, text: &str) -> String {
        let removed = self.lexicon.remove(text);
        let spelled = to_uk_spelling(&removed);
        capitalise(spelled.trim().trim_start_matches(['-', '*', '•']).trim())
    }

    fn clamp_short(&self, html: &str, product: &Product) -> String {
        let clean_items = |items: Vec<String>| -> Vec<String> {
            items
                .iter()
                .map(|i| self.clean(i.trim_end_matches(['.', ';', ','])))
                .filter(|i| !i.is_empty())
                .collect()
        };

        let mut items = clean_items(blocks(html));
        if items.is_empty() {
            items = clean_items(fallback::short_fragments(product));
        }
        if items.is_empty() {
            items.push(LAST_RESORT_SHORT.to_string());
        }

        items.truncate(SHORT_ITEMS);

        loop {
            let block = line_break_block(&items);
            let len = visible_len(&block);
            if len <= SHORT_LIMIT {
                return block;
            }
            let (longest, item) = items
                .iter()
                .enumerate()
                .max_by_key(|(_, i)| i.chars().count())
                .map(|(idx, i)| (idx, i.clone()))
                .unwrap_or_default();
            let chars = item.chars().count();
            if item.split_whitespace().count() > 2 {
                items[longest] = truncate_at_boundary(&item, chars - 1);
            } else if items.len() > 1 {
                items.pop();
            } else {
                items[0] = truncate_at_boundary(&item, SHORT_LIMIT);
            }
        }
    }

    fn clamp_long(&self, html: &str, product: &Product) -> String {
        let clean_statements = |statements: Vec<String>| -> Vec<String> {
            statements
                .iter()
                .flat_map(|b| split_sentences(b))
                .map(|s| self.clean(&s))
                .filter(|s| s.chars().any(char::is_alphanumeric))
                .collect()
        };

        let mut statements = clean_statements(blocks(html));
        if statements.is_empty() {
            statements = clean_statements(fallback::long_statements(product));
        }

        let mut kept: Vec<String> = Vec::new();
        for statement in statements {
            kept.push(statement);
            if visible_len(&paragraph_blocks(&kept)) > LONG_LIMIT {
                kept.pop();
                break;
            }
        }
        if kept.is_empty() {
            let first = blocks(html)
                .into_iter()
                .map(|b| self.clean(&b))
                .find(|b| !b.is_empty())
                .unwrap_or_else(|| fallback::meta_sentence(product));
            kept.push(truncate_at_boundary(&first, LONG_LIMIT));
        }
        paragraph_blocks(&kept)
    }

    fn clamp_meta(&self, text: &str, product: &Product) -> String {
        let meta = finish_meta(&self.clean(&strip_markup(text)));
        if !meta.is_empty() {
            return meta;
        }
        let meta = finish_meta(&self.clean(&fallback::meta_sentence(product)));
        if meta.is_empty() {
            LAST_RESORT_META.to_string()
        } else {
            meta
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(&[])
    }
}

// ---------------------------------------------------------------------------
// Meta sentence
// ---------------------------------------------------------------------------

/// One capitalised plain sentence of at most [`META_LIMIT`] characters,
/// ending in a full stop. Empty when `text` has no words.
pub(crate) fn finish_meta(text: &str) -> String {
    static DANGLING_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?i)(?:\s+(?:and|or|with|including|for|to|that|which|are|is|was|were|by|of|in))+\s*$",
        )
        .expect("valid regex")
    });
    static SENTENCE_END_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[.!?](?:\s|$)").expect("valid regex"));

    let plain: String = text
        .replace(['<', '>'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let first = match SENTENCE_END_RE.find(&plain) {
        Some(end) => &plain[..end.start()],
        None => plain.as_str(),
    };

    let trim = |s: &str| -> String {
        let s = DANGLING_RE.replace(s.trim(), "");
        s.trim_end_matches(|c: char| {
            c.is_whitespace() || matches!(c, '.' | '!' | '?' | ',' | ';' | ':' | '-' | '\u{2013}' | '\u{2014}')
        })
        .to_string()
    };

    let body = trim(&truncate_at_boundary(&trim(first), META_LIMIT - 1));
    if !body.chars().any(char::is_alphanumeric) {
        return String::new();
    }
    format!("{}.", capitalise(&body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use copyforge_shared::{Category, ProductId, SourceKind};

    fn good() -> Descriptions {
        Descriptions {
            short_description: "<p>Triple layer base<br>Even heat on every hob<br>Stainless steel finish</p>"
                .into(),
            long_description: "<p>A stainless steel saucepan for simmering sauces.</p><p>The base spreads heat evenly.</p>"
                .into(),
            meta_description: "A stainless steel saucepan for simmering sauces.".into(),
        }
    }

    fn product() -> Product {
        let mut p = Product::new(ProductId::new("txt-1"), "Saucepan 20cm", SourceKind::FreeText);
        p.brand = "Le Creuset".into();
        p.category = Some(Category::BakewareCookware);
        p.features = vec!["Triple layer base".into()];
        p
    }

    #[test]
    fn good_copy_passes() {
        let result = Validator::default().validate(&good());
        assert!(result.passed(), "{:?}", result.violations);
    }

    #[test]
    fn length_is_checked_first() {
        let mut copy = good();
        copy.short_description = format!("<p>{}</p>", "buy ".repeat(50));
        let result = Validator::default().validate(&copy);
        let v = result.violation(CopyField::Short).unwrap();
        assert_eq!(v.check, Check::Length);
        assert!(result.field_passed(CopyField::Long));
    }

    #[test]
    fn shape_lexicon_and_spelling() {
        let mut copy = good();
        copy.short_description = "<ul><li>One</li><li>Two</li></ul>".into();
        copy.long_description = "<p>Shop the range today.</p>".into();
        copy.meta_description = "A saucepan in gray enamel.".into();
        let result = Validator::default().validate(&copy);

        assert_eq!(result.violation(CopyField::Short).unwrap().check, Check::Shape);
        assert_eq!(result.violation(CopyField::Long).unwrap().check, Check::Lexicon);
        let meta = result.violation(CopyField::Meta).unwrap();
        assert_eq!(meta.check, Check::Spelling);
        assert_eq!(meta.to_string(), "metaDescription: US spelling 'gray', use 'grey'");
    }

    #[test]
    fn meta_must_be_one_plain_sentence() {
        let mut copy = good();
        copy.meta_description = "A saucepan. It simmers.".into();
        let result = Validator::default().validate(&copy);
        assert_eq!(result.violation(CopyField::Meta).unwrap().check, Check::Shape);

        copy.meta_description = String::new();
        let result = Validator::default().validate(&copy);
        assert_eq!(result.violation(CopyField::Meta).unwrap().check, Check::Length);
    }

    #[test]
    fn extra_phrases_are_enforced() {
        let mut copy = good();
        copy.long_description = "<p>A limited edition glaze.</p>".into();
        let validator = Validator::new(&["limited edition".to_string()]);
        let result = validator.validate(&copy);
        assert_eq!(result.violation(CopyField::Long).unwrap().check, Check::Lexicon);
    }

    #[test]
    fn encoded_tags_fail_shape_and_clamp_away() {
        let validator = Validator::default();
        let copy = Descriptions {
            short_description: "<p>Even heat &lt;b&gt;fast&lt;/b&gt;<br>Steel body</p>".into(),
            long_description: "<p>A saucepan with &lt;i&gt;style&lt;/i&gt; for sauces.</p>".into(),
            meta_description: "A saucepan with &lt;i&gt;style&lt;/i&gt;.".into(),
        };
        let result = validator.validate(&copy);
        for field in CopyField::ALL {
            let v = result.violation(field).expect("field rejected");
            assert_eq!(v.check, Check::Shape);
        }

        let p = Product::new(ProductId::new("txt-1"), "Saucepan", SourceKind::FreeText);
        let clamped = validator.clamp(&copy, &p);
        assert!(validator.validate(&clamped).passed());
        assert_eq!(clamped.short_description, "<p>Even heat fast<br>Steel body</p>");
        assert_eq!(clamped.long_description, "<p>A saucepan with style for sauces.</p>");
        assert_eq!(clamped.meta_description, "A saucepan with style.");
    }

    #[test]
    fn clamp_always_passes() {
        let validator = Validator::default();
        let bad = Descriptions {
            short_description: format!(
                "<ul><li>Buy now</li><li>{}</li><li>Gray color</li></ul>",
                "very long fragment ".repeat(12)
            ),
            long_description: format!(
                "Shop our family-run range. {} Made from aluminum.",
                "The pan is sturdy and heats evenly. ".repeat(80)
            ),
            meta_description: "Buy the best saucepan. Since 1919 we have made pans and".into(),
        };
        let clamped = validator.clamp(&bad, &product());
        let result = validator.validate(&clamped);
        assert!(result.passed(), "{:?} {clamped:?}", result.violations);
        assert!(clamped.short_description.starts_with("<p>Now<br>"));
        assert!(!clamped.long_description.contains("aluminum"));
        assert_eq!(clamped.meta_description, "The best saucepan.");
    }

    #[test]
    fn clamp_fills_empty_fields_from_template() {
        let validator = Validator::default();
        let clamped = validator.clamp(&Descriptions::default(), &product());
        assert!(validator.validate(&clamped).passed());
        assert!(clamped.meta_description.contains("Saucepan 20cm"));
        assert!(clamped.short_description.contains("Triple layer base"));
    }

    #[test]
    fn meta_is_finished_as_one_sentence() {
        assert_eq!(finish_meta("a pan for sauces and"), "A pan for sauces.");
        assert_eq!(finish_meta("First one. Second one."), "First one.");
        assert_eq!(finish_meta("  "), "");
        let long = "word ".repeat(60);
        let meta = finish_meta(&long);
        assert!(meta.chars().count() <= META_LIMIT);
        assert!(meta.ends_with('.'));
    }
}
