//! Markup transforms for product description copy.
//!
//! Descriptions use a deliberately small markup vocabulary:
//! - short copy is one `<p>` block whose items are separated by `<br>`
//! - long copy is a sequence of `<p>` blocks, one statement each
//! - meta copy carries no markup at all
//!
//! This crate builds those shapes, checks them, and projects any markup
//! back to visible text.

mod sanitize;

use std::sync::LazyLock;

use regex::Regex;

// ---------------------------------------------------------------------------
// Visible text
// ---------------------------------------------------------------------------

/// Remove script-bearing elements, event handlers and empty blocks.
pub fn sanitize(html: &str) -> String {
    sanitize::run_pipeline(html)
}

/// Decode HTML entities (`&amp;`, `&deg;`, `&#39;`, ...).
pub fn decode_entities(text: &str) -> String {
    sanitize::decode_entities(text)
}

/// Escape text for inclusion inside a `<p>` block.
pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Visible text of each block, in order.
///
/// Block boundaries are paragraph, list item, heading, table row and `<br>`
/// tags. Input without any block tags is split on bare newlines instead.
/// Inline tags are dropped and entities decoded.
pub fn blocks(html: &str) -> Vec<String> {
    static BREAK_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?i)<br\s*/?>|</?(?:p|div|li|ul|ol|h[1-6]|tr|td|th|table|section|article|dt|dd)(?:\s[^>]*)?>",
        )
        .expect("valid regex")
    });
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
    static WS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t\r\u{a0}]+").expect("valid regex"));
    static NEWLINE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\r?\n").expect("valid regex"));
    static ENCODED_TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"</?[a-zA-Z][^<>]*>").expect("valid regex"));

    let flattened = if BREAK_RE.is_match(html) {
        NEWLINE_RE.replace_all(html, " ")
    } else {
        std::borrow::Cow::Borrowed(html)
    };
    let broken = BREAK_RE.replace_all(&flattened, "\n");
    let untagged = TAG_RE.replace_all(&broken, "");
    let decoded = decode_entities(&untagged);
    // entity-encoded tags surface only after decoding
    let decoded = ENCODED_TAG_RE.replace_all(&decoded, "");

    decoded
        .split('\n')
        .map(|line| WS_RE.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

/// Visible text with all markup removed, blocks joined by a single space.
pub fn strip_markup(html: &str) -> String {
    blocks(html).join(" ")
}

/// Character count of the visible text.
pub fn visible_len(html: &str) -> usize {
    strip_markup(html).chars().count()
}

/// Whether the text contains anything tag-shaped.
pub fn has_markup(text: &str) -> bool {
    static ANY_TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").expect("valid regex"));
    ANY_TAG_RE.is_match(text)
}

/// Whether decoding entities would reveal tag-shaped text, as in
/// `&lt;b&gt;bold&lt;/b&gt;`.
pub fn has_encoded_markup(html: &str) -> bool {
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
    has_markup(&decode_entities(&TAG_RE.replace_all(html, " ")))
}

// ---------------------------------------------------------------------------
// Short copy: list to line breaks
// ---------------------------------------------------------------------------

/// Build a single `<p>` block with `<br>` between items.
///
/// Items are escaped; blank items are skipped. Returns an empty string when
/// nothing remains.
pub fn line_break_block<S: AsRef<str>>(items: &[S]) -> String {
    let escaped: Vec<String> = items
        .iter()
        .map(|i| i.as_ref().trim())
        .filter(|i| !i.is_empty())
        .map(escape_text)
        .collect();

    if escaped.is_empty() {
        return String::new();
    }
    format!("<p>{}</p>", escaped.join("<br>"))
}

/// Turn a list in any shape (`<ul>`, `<br>` lines, bullets, newlines) into a
/// line-break block.
pub fn list_to_line_breaks(input: &str) -> String {
    let items: Vec<String> = blocks(&sanitize(input))
        .into_iter()
        .map(|item| strip_bullet(&item).to_string())
        .collect();
    line_break_block(&items)
}

fn strip_bullet(item: &str) -> &str {
    item.trim_start_matches(['-', '*', '•', '·', '–'])
        .trim_start()
        .trim_end_matches(['.', ';', ','])
        .trim_end()
}

/// Whether `html` is exactly one `<p>` block with `<br>` separated items.
pub fn is_line_break_block(html: &str) -> bool {
    static SHAPE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^<p>[^<>]+(?:<br\s*/?>[^<>]+)*</p>$").expect("valid regex")
    });
    SHAPE_RE.is_match(html.trim())
}

// ---------------------------------------------------------------------------
// Long copy: sentence to block
// ---------------------------------------------------------------------------

/// Split visible text into sentences.
///
/// A sentence ends at `.`, `!` or `?` followed by whitespace and an
/// upper-case letter or digit, so decimals and abbreviations like "e.g."
/// stay intact.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        current.push(c);

        if matches!(c, '.' | '!' | '?') {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            let has_gap = j > i + 1;
            let next_starts = chars
                .get(j)
                .is_some_and(|n| n.is_uppercase() || n.is_ascii_digit());
            if has_gap && next_starts {
                push_trimmed(&mut sentences, &current);
                current.clear();
                i = j;
                continue;
            }
        }
        i += 1;
    }
    push_trimmed(&mut sentences, &current);
    sentences
}

fn push_trimmed(out: &mut Vec<String>, s: &str) {
    let t = s.trim();
    if !t.is_empty() {
        out.push(t.to_string());
    }
}

/// Wrap each statement in its own `<p>` block.
pub fn paragraph_blocks<S: AsRef<str>>(statements: &[S]) -> String {
    statements
        .iter()
        .map(|s| s.as_ref().trim())
        .filter(|s| !s.is_empty())
        .map(|s| format!("<p>{}</p>", escape_text(s)))
        .collect()
}

/// Split copy in any shape into one `<p>` block per sentence.
pub fn sentence_blocks(input: &str) -> String {
    let statements: Vec<String> = blocks(&sanitize(input))
        .iter()
        .flat_map(|b| split_sentences(b))
        .collect();
    paragraph_blocks(&statements)
}

/// Whether `html` is a non-empty sequence of `<p>` blocks and nothing else.
pub fn is_block_sequence(html: &str) -> bool {
    static SHAPE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(?:<p>[^<>]+</p>\s*)+$").expect("valid regex"));
    SHAPE_RE.is_match(html.trim())
}

// ---------------------------------------------------------------------------
// Truncation
// ---------------------------------------------------------------------------

/// Truncate visible text to at most `max_chars`, cutting at a word boundary
/// when one exists and dropping dangling punctuation.
pub fn truncate_at_boundary(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let head: String = text.chars().take(max_chars).collect();
    let next_is_space = text
        .chars()
        .nth(max_chars)
        .is_some_and(char::is_whitespace);

    let cut = if next_is_space {
        head.as_str()
    } else {
        match head.rfind(char::is_whitespace) {
            Some(pos) if pos > 0 => &head[..pos],
            _ => head.as_str(),
        }
    };

    cut.trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':' | '-' | '('))
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
