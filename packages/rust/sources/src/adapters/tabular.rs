//! Delimited product lists (CSV, semicolon or tab separated).

use csv::{ReaderBuilder, Trim};
use tracing::{debug, info, instrument, warn};

use copyforge_shared::{CopyforgeError, RawCandidate, Result, SourceKind};

use super::canonical_header;

const METHOD: &str = "tabular-row";
const CONFIDENCE: f64 = 0.95;

/// Columns that are read but never carried onto a product.
const IGNORED_COLUMNS: &[&str] = &["price", "image"];

pub struct TabularAdapter;

impl TabularAdapter {
    /// One candidate per row with a name. Rows without one are skipped.
    #[instrument(skip_all, fields(bytes = bytes.len()))]
    pub fn execute(&self, bytes: &[u8]) -> Result<Vec<RawCandidate>> {
        if bytes.starts_with(b"PK\x03\x04") {
            return Err(CopyforgeError::unsupported(
                "spreadsheet workbooks are not read directly; export the sheet as CSV",
            ));
        }

        let text = decode_text(bytes);
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let delimiter = sniff_delimiter(text.lines().next().unwrap_or_default());
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .delimiter(delimiter)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| CopyforgeError::unsupported(format!("could not read header row: {e}")))?
            .iter()
            .map(canonical_header)
            .collect();
        debug!(?headers, delimiter = %(delimiter as char), "tabular headers");

        let mut out = Vec::new();
        let mut skipped = 0usize;
        for (index, record) in reader.records().enumerate() {
            // header is line 1
            let line = index + 2;
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    warn!(line, error = %e, "skipping unreadable row");
                    skipped += 1;
                    continue;
                }
            };

            let mut cand = RawCandidate::new(SourceKind::TabularFile, METHOD, CONFIDENCE);
            for (key, value) in headers.iter().zip(record.iter()) {
                if IGNORED_COLUMNS.contains(&key.as_str()) || cand.fields.contains_key(key) {
                    continue;
                }
                cand.set_field(key, value);
            }

            if cand.field("name").is_none() {
                debug!(line, "row has no name, skipping");
                skipped += 1;
                continue;
            }
            out.push(cand);
        }

        info!(rows = out.len(), skipped, "tabular file read");
        Ok(out)
    }
}

/// UTF-8 (with or without BOM), falling back to Latin-1.
fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Pick the most frequent of `,` `;` and tab in the header line.
fn sniff_delimiter(header: &str) -> u8 {
    [b',', b';', b'\t']
        .into_iter()
        .map(|d| (d, header.bytes().filter(|b| *b == d).count()))
        .fold((b',', 0), |best, cur| if cur.1 > best.1 { cur } else { best })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_rows_with_aliased_headers() {
        let csv = "\u{feff}Product Name,Code,EAN,Brand,Price,Material\n\
                   Chef's Knife 20cm,ZW-3820,4009839123456,Zwilling,89.00,Stainless steel\n\
                   ,ORPHAN-1,,,,\n\
                   \"Bread Knife, 23cm\",ZW-3823,,Zwilling,79.00,\n";
        let candidates = TabularAdapter.execute(csv.as_bytes()).unwrap();
        assert_eq!(candidates.len(), 2);

        let knife = &candidates[0];
        assert_eq!(knife.field("name"), Some("Chef's Knife 20cm"));
        assert_eq!(knife.field("sku"), Some("ZW-3820"));
        assert_eq!(knife.field("barcode"), Some("4009839123456"));
        assert_eq!(knife.field("brand"), Some("Zwilling"));
        assert_eq!(knife.field("material"), Some("Stainless steel"));
        assert_eq!(knife.field("price"), None);
        assert_eq!(knife.confidence, 0.95);

        assert_eq!(candidates[1].field("name"), Some("Bread Knife, 23cm"));
    }

    #[test]
    fn semicolon_and_latin1() {
        let mut bytes = b"Name;Description courte\nCr".to_vec();
        bytes.push(0xE8); // è in Latin-1
        bytes.extend_from_slice(b"me Pot;Small pot\n");
        let candidates = TabularAdapter.execute(&bytes).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].field("name"), Some("Crème Pot"));
    }

    #[test]
    fn tab_delimited_with_short_rows() {
        let tsv = "Title\tSKU\tShort Description\nMixing Bowl\tMC-01\nPie Dish\tMC-02\tDeep ceramic dish\n";
        let candidates = TabularAdapter.execute(tsv.as_bytes()).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].field("short_description"), None);
        assert_eq!(
            candidates[1].field("short_description"),
            Some("Deep ceramic dish")
        );
    }

    #[test]
    fn header_only_file_is_empty() {
        assert!(TabularAdapter.execute(b"Name,SKU\n").unwrap().is_empty());
        assert!(TabularAdapter.execute(b"   ").unwrap().is_empty());
    }

    #[test]
    fn workbook_rejected() {
        let err = TabularAdapter.execute(b"PK\x03\x04rest").unwrap_err();
        assert_eq!(
            err.source_kind(),
            Some(copyforge_shared::SourceErrorKind::UnsupportedFormat)
        );
    }
}
