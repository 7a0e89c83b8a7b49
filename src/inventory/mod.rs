//! User-supplied inventory rows and their CSV import/export.
//!
//! The inventory is mutable independently of the OCR pipeline; the pipeline
//! only reads it to filter rows for a matched canonical card name.

use serde::{Deserialize, Serialize};

use crate::catalog::PriceQuote;
use crate::error::ScanError;

const CSV_HEADERS: [&str; 11] = [
    "Card Name",
    "Set Name",
    "Set Code",
    "Edition",
    "Rarity",
    "Condition",
    "Description",
    "Image URL",
    "eBay Price",
    "TCGPlayer Price",
    "Cardmarket Price",
];

/// One inventory row as the user supplies it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRow {
    pub card_name: String,
    pub set_name: String,
    pub set_code: String,
    pub edition: String,
    pub rarity: String,
    pub condition: String,
    pub description: String,
    pub image_url: String,
    pub prices: PriceQuote,
}

impl InventoryRow {
    pub fn named(card_name: impl Into<String>) -> Self {
        Self {
            card_name: card_name.into(),
            set_name: String::new(),
            set_code: String::new(),
            edition: String::new(),
            rarity: String::new(),
            condition: "Near Mint".to_string(),
            description: String::new(),
            image_url: String::new(),
            prices: PriceQuote::default(),
        }
    }
}

/// Serialize inventory rows to CSV with a header row. Fields are quoted with
/// doubled-quote escaping.
pub fn write_inventory_csv(rows: &[InventoryRow]) -> String {
    let mut out = String::new();
    out.push_str(&CSV_HEADERS.join(","));
    out.push('\n');
    for row in rows {
        let fields = [
            quote(&row.card_name),
            quote(&row.set_name),
            quote(&row.set_code),
            quote(&row.edition),
            quote(&row.rarity),
            quote(&row.condition),
            quote(&row.description),
            quote(&row.image_url),
            row.prices.ebay.clone(),
            row.prices.tcgplayer.clone(),
            row.prices.cardmarket.clone(),
        ];
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

/// Parse CSV content (with header row) back into inventory rows.
pub fn parse_inventory_csv(content: &str) -> Result<Vec<InventoryRow>, ScanError> {
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() < 2 {
        return Err(ScanError::Csv {
            line: 1,
            message: "expected a header row and at least one data row".to_string(),
        });
    }

    let mut rows = Vec::new();
    for (index, line) in lines.iter().enumerate().skip(1) {
        let fields = parse_csv_line(line);
        if fields.len() < CSV_HEADERS.len() {
            return Err(ScanError::Csv {
                line: index + 1,
                message: format!(
                    "expected {} fields, found {}",
                    CSV_HEADERS.len(),
                    fields.len()
                ),
            });
        }
        let value = |i: usize| fields[i].clone();
        let price = |i: usize| {
            let v = value(i);
            if v.is_empty() {
                "0.00".to_string()
            } else {
                v
            }
        };
        rows.push(InventoryRow {
            card_name: value(0),
            set_name: value(1),
            set_code: value(2),
            edition: value(3),
            rarity: value(4),
            condition: if fields[5].is_empty() {
                "Near Mint".to_string()
            } else {
                value(5)
            },
            description: value(6),
            image_url: value(7),
            prices: PriceQuote {
                ebay: price(8),
                tcgplayer: price(9),
                cardmarket: price(10),
            },
        });
    }
    Ok(rows)
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Split one CSV line into fields, honoring quotes and doubled-quote escapes.
fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rows() -> Vec<InventoryRow> {
        vec![
            InventoryRow {
                card_name: "Blue-Eyes White Dragon".to_string(),
                set_name: "Legend of Blue Eyes".to_string(),
                set_code: "LOB-001".to_string(),
                edition: "1st Edition".to_string(),
                rarity: "Ultra Rare".to_string(),
                condition: "Near Mint".to_string(),
                description: "This legendary dragon is a powerful engine of destruction."
                    .to_string(),
                image_url: "https://img.example/lob-001.jpg".to_string(),
                prices: PriceQuote {
                    ebay: "45.00".to_string(),
                    tcgplayer: "39.99".to_string(),
                    cardmarket: "35.50".to_string(),
                },
            },
            InventoryRow::named("Pot of Greed"),
        ]
    }

    #[test]
    fn test_csv_round_trip() {
        let rows = sample_rows();
        let csv = write_inventory_csv(&rows);
        let parsed = parse_inventory_csv(&csv).unwrap();
        assert_eq!(parsed, rows);
    }

    #[test]
    fn test_quotes_escaped_in_round_trip() {
        let mut row = InventoryRow::named("\"Infernoble\" Knight, the Chosen");
        row.description = "Text with \"quotes\" and, commas".to_string();
        let csv = write_inventory_csv(&[row.clone()]);
        let parsed = parse_inventory_csv(&csv).unwrap();
        assert_eq!(parsed[0], row);
    }

    #[test]
    fn test_parse_missing_fields_rejected() {
        let err = parse_inventory_csv("Card Name,Set Name\n\"A\",\"B\"\n").unwrap_err();
        assert!(matches!(err, ScanError::Csv { line: 2, .. }));
    }

    #[test]
    fn test_parse_header_only_rejected() {
        let csv = CSV_HEADERS.join(",") + "\n";
        assert!(parse_inventory_csv(&csv).is_err());
    }

    #[test]
    fn test_defaults_applied_on_empty_fields() {
        let line = "\"Card\",\"\",\"\",\"\",\"\",\"\",\"\",\"\",,,\n";
        let csv = CSV_HEADERS.join(",") + "\n" + line;
        let rows = parse_inventory_csv(&csv).unwrap();
        assert_eq!(rows[0].condition, "Near Mint");
        assert_eq!(rows[0].prices, PriceQuote::default());
    }

    #[test]
    fn test_parse_csv_line_quoting() {
        let fields = parse_csv_line("\"a,b\",\"say \"\"hi\"\"\",plain");
        assert_eq!(fields, vec!["a,b", "say \"hi\"", "plain"]);
    }
}
