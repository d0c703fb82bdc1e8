//! Sanitising passes for model-written or scraped markup.
//!
//! Each pass is a function `&str -> String` applied in sequence.

use std::sync::LazyLock;

use regex::Regex;

/// Run every sanitising pass over `html`.
pub(crate) fn run_pipeline(html: &str) -> String {
    let mut result = html.to_string();

    result = remove_active_elements(&result);
    result = remove_event_handlers(&result);
    result = remove_script_urls(&result);
    result = drop_empty_paragraphs(&result);
    result = collapse_whitespace(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Active content
// ---------------------------------------------------------------------------

/// Remove script/style/iframe/object/embed elements with their content,
/// plus any stray `<link>`/`<meta>` tags.
fn remove_active_elements(html: &str) -> String {
    static PAIRED_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<iframe\b.*?</iframe\s*>|<object\b.*?</object\s*>|<embed\b.*?</embed\s*>",
        )
        .expect("valid regex")
    });
    static SINGLE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)</?(?:script|style|iframe|object|embed|link|meta)\b[^>]*>")
            .expect("valid regex")
    });

    let result = PAIRED_RE.replace_all(html, "");
    SINGLE_RE.replace_all(&result, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: Inline event handlers
// ---------------------------------------------------------------------------

fn remove_event_handlers(html: &str) -> String {
    static ON_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(?i)\s+on[a-z]+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#).expect("valid regex")
    });

    ON_ATTR_RE.replace_all(html, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: javascript: URLs
// ---------------------------------------------------------------------------

fn remove_script_urls(html: &str) -> String {
    static JS_URL_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)javascript\s*:").expect("valid regex"));

    JS_URL_RE.replace_all(html, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 4: Empty paragraphs
// ---------------------------------------------------------------------------

fn drop_empty_paragraphs(html: &str) -> String {
    static EMPTY_P_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)<p>(?:\s|&nbsp;|<br\s*/?>)*</p>").expect("valid regex"));

    EMPTY_P_RE.replace_all(html, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 5: Whitespace
// ---------------------------------------------------------------------------

/// Collapse runs of spaces and runs of line breaks, keeping one of each.
fn collapse_whitespace(html: &str) -> String {
    static SPACE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t\r\x0B\x0C]+").expect("valid regex"));
    static NEWLINE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r" ?\n[\s]*").expect("valid regex"));

    let spaced = SPACE_RE.replace_all(html, " ");
    NEWLINE_RE.replace_all(&spaced, "\n").trim().to_string()
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// Decode the HTML entities that show up in product copy.
///
/// Unknown named entities are left untouched.
pub(crate) fn decode_entities(text: &str) -> String {
    static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("valid regex")
    });

    if !text.contains('&') {
        return text.to_string();
    }

    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures| {
            let body = &caps[1];
            let decoded = if let Some(hex) = body.strip_prefix("#x").or(body.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(body)
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .to_string()
}

fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "ndash" => '–',
        "mdash" => '—',
        "hellip" => '…',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "pound" => '£',
        "euro" => '€',
        "deg" => '°',
        "times" => '×',
        "frac12" => '½',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        _ => return None,
    };
    Some(c)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
