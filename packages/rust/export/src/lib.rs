//! Export serializer: project a product set into a spreadsheet-safe CSV blob.
//!
//! Every cell is quoted, markup is stripped from all text, and the output
//! starts with a UTF-8 byte-order mark so spreadsheet tools pick the right
//! encoding. For the same products the bytes are always the same.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use csv::{QuoteStyle, WriterBuilder};
use tracing::{info, instrument};

use copyforge_markup::{blocks, strip_markup};
use copyforge_shared::{CopyforgeError, Product, Result};

/// UTF-8 byte-order mark.
pub const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Fixed leading columns, before the per-specification ones.
pub const BASE_COLUMNS: [&str; 11] = [
    "id",
    "sku",
    "barcode",
    "name",
    "brand",
    "category",
    "shortDescription",
    "longDescription",
    "metaDescription",
    "weightGrams",
    "weightHuman",
];

const SPEC_PREFIX: &str = "spec_";

/// Serialize products to CSV bytes (BOM, header row, one row per product).
#[instrument(skip_all, fields(products = products.len()))]
pub fn export_csv(products: &[Product]) -> Result<Vec<u8>> {
    let spec_keys: BTreeSet<&str> = products
        .iter()
        .flat_map(|p| p.specifications.keys().map(String::as_str))
        .collect();

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(BOM.to_vec());

    let header: Vec<String> = BASE_COLUMNS
        .iter()
        .map(|c| (*c).to_string())
        .chain(spec_keys.iter().map(|k| format!("{SPEC_PREFIX}{k}")))
        .collect();
    writer.write_record(&header).map_err(export_error)?;

    for product in products {
        let mut row = vec![
            product.id.to_string(),
            product.sku.clone(),
            product.barcode.clone(),
            product.name.clone(),
            product.brand.clone(),
            product
                .category
                .map(|c| c.label().to_string())
                .unwrap_or_default(),
        ]
        .into_iter()
        .map(|v| strip_markup(&v))
        .collect::<Vec<_>>();

        row.push(blocks(&product.descriptions.short_description).join("; "));
        row.push(blocks(&product.descriptions.long_description).join("\n"));
        row.push(strip_markup(&product.descriptions.meta_description));
        row.push(product.weight_grams.map(|g| g.to_string()).unwrap_or_default());
        row.push(strip_markup(product.weight_human.as_deref().unwrap_or_default()));

        for key in &spec_keys {
            let value = product
                .specifications
                .get(*key)
                .map(|v| strip_markup(&v.to_string()))
                .unwrap_or_default();
            row.push(value);
        }

        let row: Vec<String> = row.into_iter().map(|cell| guard_formula(&cell)).collect();
        writer.write_record(&row).map_err(export_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| CopyforgeError::Export(format!("failed to finish CSV: {e}")))?;
    info!(bytes = bytes.len(), columns = header.len(), "CSV export written");
    Ok(bytes)
}

/// Pretty JSON projection of the same product set.
pub fn export_json(products: &[Product]) -> Result<String> {
    serde_json::to_string_pretty(products)
        .map_err(|e| CopyforgeError::Export(format!("failed to serialize products: {e}")))
}

/// `products_export_<YYYYMMDD_HHMMSS>.csv`, in UTC.
pub fn suggested_filename(now: DateTime<Utc>) -> String {
    format!("products_export_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

fn export_error(e: csv::Error) -> CopyforgeError {
    CopyforgeError::Export(format!("failed to write CSV row: {e}"))
}

/// Cells that a spreadsheet would evaluate are prefixed with `'`.
fn guard_formula(cell: &str) -> String {
    if cell.starts_with(['=', '+', '-', '@']) {
        format!("'{cell}")
    } else {
        cell.to_string()
    }
}
