//! Brand voice rules: the banned lexicon and UK spelling.
//!
//! Both work on raw copy (markup included). Description markup only ever
//! uses `<p>` and `<br>`, so neither pattern set can match inside a tag.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

// ---------------------------------------------------------------------------
// Banned lexicon
// ---------------------------------------------------------------------------

const TRANSACTIONAL: &str = r"(?i)\b(?:buy|buys|buying|shop|shops|shopping|order|orders|ordering|ordered|price|prices|priced|pricing|sale|sales|deal|deals|discount|discounts|discounted|delivery|shipping)\b";

const HERITAGE: &[&str] = &[
    r"(?i)\bsince\s+(?:1[5-9]|20)\d{2}\b",
    r"(?i)\b(?:established|founded)\s+(?:in\s+)?(?:1[5-9]|20)\d{2}\b",
    r"(?i)\best\.?\s*(?:1[5-9]|20)\d{2}\b",
    r"(?i)\bfamily[- ]run\b",
    r"(?i)\bimported\s+from\b",
];

/// Words and phrases that may never appear in description copy.
pub struct Lexicon {
    terms: Vec<Regex>,
}

impl Lexicon {
    /// Built-in terms plus `extra` phrases (matched case-insensitively,
    /// whole words, any run of whitespace between words).
    pub fn new(extra: &[String]) -> Self {
        let terms = std::iter::once(TRANSACTIONAL)
            .chain(HERITAGE.iter().copied())
            .filter_map(|p| Regex::new(p).ok())
            .chain(extra.iter().filter_map(|phrase| phrase_pattern(phrase)))
            .collect();
        Self { terms }
    }

    /// The first banned term found, as it appears in `text`.
    pub fn find(&self, text: &str) -> Option<String> {
        self.terms
            .iter()
            .filter_map(|t| t.find(text))
            .min_by_key(|m| m.start())
            .map(|m| m.as_str().to_string())
    }

    /// Remove every banned term and tidy the whitespace and punctuation
    /// left behind.
    pub fn remove(&self, text: &str) -> String {
        let mut out = text.to_string();
        for term in &self.terms {
            out = term.replace_all(&out, "").into_owned();
        }
        tidy(&out)
    }
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::new(&[])
    }
}

fn phrase_pattern(phrase: &str) -> Option<Regex> {
    let words: Vec<String> = phrase.split_whitespace().map(regex::escape).collect();
    if words.is_empty() {
        return None;
    }
    let body = words.join(r"\s+");
    let starts_word = phrase.trim().starts_with(|c: char| c.is_alphanumeric());
    let ends_word = phrase.trim().ends_with(|c: char| c.is_alphanumeric());
    let pattern = format!(
        "(?i){}{body}{}",
        if starts_word { r"\b" } else { "" },
        if ends_word { r"\b" } else { "" }
    );
    Regex::new(&pattern).ok()
}

/// Collapse the gaps a removal leaves: doubled spaces, orphaned commas,
/// space before punctuation, space hugging tags.
fn tidy(text: &str) -> String {
    static SPACES_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("valid regex"));
    static BEFORE_PUNCT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\s+([,.;:!?])").expect("valid regex"));
    static DOUBLE_PUNCT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"([,;:])\s*[,;:]+").expect("valid regex"));
    static LEADING_PUNCT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(^|>)\s*[,;:.]+\s*").expect("valid regex"));
    static TAG_SPACE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\s*(<[^>]+>)\s*").expect("valid regex"));
    static EMPTY_PARENS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\(\s*\)").expect("valid regex"));

    let out = EMPTY_PARENS_RE.replace_all(text, "");
    let out = SPACES_RE.replace_all(&out, " ");
    let out = BEFORE_PUNCT_RE.replace_all(&out, "$1");
    let out = DOUBLE_PUNCT_RE.replace_all(&out, "$1");
    let out = TAG_SPACE_RE.replace_all(&out, "$1");
    let out = LEADING_PUNCT_RE.replace_all(&out, "$1");
    out.trim().to_string()
}

// ---------------------------------------------------------------------------
// UK spelling
// ---------------------------------------------------------------------------

const US_TO_UK: &[(&str, &str)] = &[
    ("color", "colour"),
    ("colors", "colours"),
    ("colored", "coloured"),
    ("colorful", "colourful"),
    ("colorway", "colourway"),
    ("flavor", "flavour"),
    ("flavors", "flavours"),
    ("flavorful", "flavourful"),
    ("aluminum", "aluminium"),
    ("center", "centre"),
    ("centers", "centres"),
    ("centered", "centred"),
    ("gray", "grey"),
    ("liter", "litre"),
    ("liters", "litres"),
    ("milliliter", "millilitre"),
    ("milliliters", "millilitres"),
    ("fiber", "fibre"),
    ("fibers", "fibres"),
    ("jewelry", "jewellery"),
    ("organize", "organise"),
    ("organized", "organised"),
    ("organizer", "organiser"),
    ("organizers", "organisers"),
    ("personalize", "personalise"),
    ("personalized", "personalised"),
    ("customize", "customise"),
    ("customized", "customised"),
    ("favorite", "favourite"),
    ("favorites", "favourites"),
    ("optimize", "optimise"),
    ("optimized", "optimised"),
    ("minimize", "minimise"),
    ("maximize", "maximise"),
    ("sanitize", "sanitise"),
    ("sanitized", "sanitised"),
    ("caramelize", "caramelise"),
    ("caramelized", "caramelised"),
    ("mold", "mould"),
    ("molds", "moulds"),
    ("cozy", "cosy"),
    ("catalog", "catalogue"),
    ("odor", "odour"),
    ("odors", "odours"),
    ("odorless", "odourless"),
    ("savory", "savoury"),
    ("neighbor", "neighbour"),
    ("harbor", "harbour"),
    ("humor", "humour"),
    ("traveling", "travelling"),
    ("labeled", "labelled"),
    ("labeling", "labelling"),
    ("specialty", "speciality"),
    ("plow", "plough"),
];

static US_WORDS: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| US_TO_UK.iter().copied().collect());

static US_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alternation: Vec<&str> = US_TO_UK.iter().map(|(us, _)| *us).collect();
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternation.join("|"))).expect("valid regex")
});

/// The first US spelling in `text`, with its UK form.
pub fn find_us_spelling(text: &str) -> Option<(String, &'static str)> {
    let found = US_RE.find(text)?;
    let uk = US_WORDS.get(found.as_str().to_lowercase().as_str())?;
    Some((found.as_str().to_string(), *uk))
}

/// Replace US spellings with UK ones, keeping the case of each word.
pub fn to_uk_spelling(text: &str) -> String {
    US_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let word = &caps[0];
            let Some(uk) = US_WORDS.get(word.to_lowercase().as_str()) else {
                return word.to_string();
            };
            match_case(word, uk)
        })
        .into_owned()
}

fn match_case(original: &str, replacement: &str) -> String {
    let letters: Vec<char> = original.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
        return replacement.to_uppercase();
    }
    if original.chars().next().is_some_and(char::is_uppercase) {
        return capitalise(replacement);
    }
    replacement.to_string()
}

/// Upper-case the first letter.
pub(crate) fn capitalise(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transactional_words_are_banned() {
        let lexicon = Lexicon::default();
        assert_eq!(lexicon.find("Buy yours today"), Some("Buy".to_string()));
        assert_eq!(lexicon.find("Great prices on pans"), Some("prices".to_string()));
        assert!(lexicon.find("A bowl for everyday baking").is_none());
        // whole words only
        assert!(lexicon.find("Shopper favourite, ordinary shape").is_none());
    }

    #[test]
    fn heritage_phrases_are_banned() {
        let lexicon = Lexicon::default();
        assert!(lexicon.find("Crafted since 1919 by hand").is_some());
        assert!(lexicon.find("A family-run pottery").is_some());
        assert!(lexicon.find("Est. 1885").is_some());
        assert!(lexicon.find("Holds 1919 grams").is_none());
    }

    #[test]
    fn extra_phrases_match_across_whitespace() {
        let lexicon = Lexicon::new(&["limited edition".to_string()]);
        assert!(lexicon.find("A Limited\n Edition glaze").is_some());
        assert!(lexicon.find("Unlimited editions").is_none());
    }

    #[test]
    fn removal_tidies_gaps() {
        let lexicon = Lexicon::default();
        assert_eq!(
            lexicon.remove("<p>Shop now, a sturdy pan.</p>"),
            "<p>now, a sturdy pan.</p>"
        );
        assert_eq!(
            lexicon.remove("<p>Family-run, hand glazed</p>"),
            "<p>hand glazed</p>"
        );
        assert_eq!(lexicon.remove("Great value (sale) bowl"), "Great value bowl");
    }

    #[test]
    fn uk_spelling_keeps_case() {
        assert_eq!(
            to_uk_spelling("Color options in gray and COLOR-matched Aluminum"),
            "Colour options in grey and COLOUR-matched Aluminium"
        );
        assert_eq!(to_uk_spelling("Colourful enamel"), "Colourful enamel");
    }

    #[test]
    fn finds_first_us_spelling() {
        assert_eq!(
            find_us_spelling("A favorite flavor"),
            Some(("favorite".to_string(), "favourite"))
        );
        assert!(find_us_spelling("A favourite flavour").is_none());
    }
}
