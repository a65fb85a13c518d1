use crate::error::{PnlError, Result};
use crate::schema::{CellValue, ColumnKey, RawRow};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

/// An external collaborator able to describe the layout of an irregular ledger.
///
/// Implementations must be cheap to share: the pipeline holds one instance for
/// the lifetime of the process and may call it from several uploads at once.
/// Any error is treated as [`PnlError::StructureInferenceUnavailable`] by the resolver.
pub trait StructureInference {
    fn infer_structure(&self, sample: &[RawRow]) -> Result<StructureHint>;
}

/// Column-role hint returned by structure inference.
///
/// Column references are kept as raw strings ("D", "3", ...) and only turned
/// into indices through [`column_index`], so a malformed reference degrades to
/// column 0 instead of failing the upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StructureHint {
    #[serde(default, deserialize_with = "string_or_number")]
    #[schemars(with = "Option<u32>", description = "0-based index of the header row")]
    pub header_row: Option<String>,

    #[serde(default, deserialize_with = "string_or_number")]
    #[schemars(with = "Option<String>", description = "Column letter or index holding dates/periods")]
    pub date_column: Option<String>,

    #[serde(default, deserialize_with = "string_or_number")]
    #[schemars(with = "Option<String>", description = "Column letter or index telling income rows from expense rows")]
    pub income_expense_column: Option<String>,

    #[serde(default, deserialize_with = "string_or_number")]
    #[schemars(with = "Option<String>", description = "Column letter or index holding the line category")]
    pub category_column: Option<String>,

    #[serde(default, deserialize_with = "string_or_number")]
    #[schemars(with = "Option<String>", description = "Column letter or index holding the expense code")]
    pub expense_code_column: Option<String>,

    #[serde(default, deserialize_with = "string_or_number")]
    #[schemars(with = "Option<String>", description = "Column letter or index holding the subcategory")]
    pub subcategory_column: Option<String>,

    #[serde(default, deserialize_with = "string_or_number")]
    #[schemars(with = "Option<String>", description = "Column letter or index holding the amount")]
    pub amount_column: Option<String>,
}

impl StructureHint {
    /// Parses a model response, tolerating Markdown fences and surrounding prose.
    pub fn from_response(raw: &str) -> Result<Self> {
        let cleaned = clean_json_output(raw);
        serde_json::from_str(&cleaned).map_err(|e| {
            PnlError::StructureInferenceUnavailable(format!(
                "Malformed structure response: {}",
                e
            ))
        })
    }

    /// Header row index; absent or unparsable values mean row 0.
    pub fn header_row_index(&self) -> usize {
        self.header_row
            .as_deref()
            .and_then(parse_index)
            .unwrap_or(0)
    }

    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(StructureHint)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn parse_index(raw: &str) -> Option<usize> {
    let raw = raw.trim();
    if let Ok(idx) = raw.parse::<usize>() {
        return Some(idx);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 && v.fract() == 0.0 => Some(v as usize),
        _ => None,
    }
}

/// Maps a column reference to a 0-based index.
///
/// Numeric strings are used directly, a single letter maps via `letter - 'A'`,
/// and anything else (including a missing reference) is column 0.
pub fn column_index(reference: Option<&str>) -> usize {
    let Some(reference) = reference.map(str::trim).filter(|r| !r.is_empty()) else {
        return 0;
    };

    if let Some(idx) = parse_index(reference) {
        return idx;
    }

    let mut chars = reference.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None) if letter.is_ascii_alphabetic() => {
            (letter.to_ascii_uppercase() as u8 - b'A') as usize
        }
        _ => 0,
    }
}

/// Renders sampled rows as JSON arrays (index keyed) or objects (label keyed).
pub fn sample_to_json(sample: &[RawRow]) -> serde_json::Value {
    serde_json::Value::Array(
        sample
            .iter()
            .map(|row| {
                if row.keys().all(|k| matches!(k, ColumnKey::Index(_))) {
                    let width = row
                        .keys()
                        .filter_map(|k| match k {
                            ColumnKey::Index(idx) => Some(*idx + 1),
                            ColumnKey::Label(_) => None,
                        })
                        .max()
                        .unwrap_or(0);
                    let mut values = vec![serde_json::Value::Null; width];
                    for (key, cell) in row.iter() {
                        if let ColumnKey::Index(idx) = key {
                            values[*idx] = cell_to_json(cell);
                        }
                    }
                    serde_json::Value::Array(values)
                } else {
                    serde_json::Value::Object(
                        row.iter()
                            .map(|(key, cell)| {
                                let name = match key {
                                    ColumnKey::Label(label) => label.clone(),
                                    ColumnKey::Index(idx) => idx.to_string(),
                                };
                                (name, cell_to_json(cell))
                            })
                            .collect(),
                    )
                }
            })
            .collect(),
    )
}

fn cell_to_json(cell: &CellValue) -> serde_json::Value {
    serde_json::to_value(cell).unwrap_or(serde_json::Value::Null)
}

/// The fixed instruction prompt sent alongside the sampled rows.
pub fn structure_prompt(sample: &[RawRow]) -> String {
    let sample_json = serde_json::to_string_pretty(&sample_to_json(sample))
        .unwrap_or_else(|_| "[]".to_string());

    format!(
        "Analyze this spreadsheet data and identify its structure. Typical layout:\n\
        - The first or second row holds dates\n\
        - Column D tells income rows from expense rows\n\
        - Column E is the category\n\
        - Column F is the expense code within the category\n\
        - Column G is the subcategory\n\
        - Some rows in column E contain 'total' (sum of the items above since the previous total)\n\n\
        Sample data:\n{}\n\n\
        Respond with JSON only:\n\
        {{\n\
          \"headerRow\": number (0-based index of header row),\n\
          \"dateColumn\": \"column letter or index\",\n\
          \"incomeExpenseColumn\": \"column letter or index\",\n\
          \"categoryColumn\": \"column letter or index\",\n\
          \"expenseCodeColumn\": \"column letter or index\",\n\
          \"subcategoryColumn\": \"column letter or index\",\n\
          \"amountColumn\": \"column letter or index\"\n\
        }}",
        sample_json
    )
}

/// Strips Markdown fences or prose around the outermost JSON object.
pub fn clean_json_output(raw: &str) -> String {
    if let Some(start) = raw.find('{') {
        if let Some(end) = raw.rfind('}') {
            if end > start {
                return raw[start..=end].to_string();
            }
        }
    }
    raw.trim().to_string()
}
