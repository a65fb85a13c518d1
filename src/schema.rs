use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// An untyped spreadsheet/CSV cell as it leaves the decoder.
///
/// Serializes as a bare JSON scalar (`number`, `string` or `null`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Empty,
}

impl CellValue {
    /// Builds a text cell, collapsing whitespace-only strings to `Empty`.
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value)
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) => false,
        }
    }

    /// Numeric reading of the cell, `None` when it holds no finite number.
    ///
    /// Text has `$`, `,`, `(` and `)` removed before the leading decimal is read,
    /// so `"(500)"` reads as `500`, not `-500`.
    pub fn numeric(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n).filter(|v| v.is_finite()),
            CellValue::Text(s) => {
                let cleaned: String = s
                    .chars()
                    .filter(|c| !matches!(c, '$' | ',' | '(' | ')'))
                    .collect();
                leading_decimal(cleaned.trim())
            }
            CellValue::Empty => None,
        }
    }

    /// Display form used for labels and categories (trimmed, `""` for empty).
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) => format_number(*n),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_text())
    }
}

// Reads the longest `[+-]digits[.digits][e[+-]digits]` prefix; trailing text is ignored.
fn leading_decimal(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let mut frac_end = end + 1;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - (end + 1);
        end = frac_end;
    }

    if digits == 0 {
        return None;
    }

    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnKey {
    Label(String),
    Index(usize),
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKey::Label(label) => write!(f, "'{}'", label),
            ColumnKey::Index(idx) => write!(f, "#{}", idx),
        }
    }
}

/// One decoded row: an ordered column key → cell mapping.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawRow {
    cells: Vec<(ColumnKey, CellValue)>,
}

impl RawRow {
    pub fn new(cells: Vec<(ColumnKey, CellValue)>) -> Self {
        Self { cells }
    }

    /// Row-as-array constructor: keys are the 0-based positions.
    pub fn from_values(values: Vec<CellValue>) -> Self {
        Self {
            cells: values
                .into_iter()
                .enumerate()
                .map(|(idx, value)| (ColumnKey::Index(idx), value))
                .collect(),
        }
    }

    /// Returns the first cell stored under `key`.
    pub fn get(&self, key: &ColumnKey) -> Option<&CellValue> {
        self.cells.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_label(&self, label: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(k, _)| matches!(k, ColumnKey::Label(l) if l == label))
            .map(|(_, v)| v)
    }

    pub fn get_index(&self, idx: usize) -> Option<&CellValue> {
        self.get(&ColumnKey::Index(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ColumnKey, CellValue)> {
        self.cells.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ColumnKey> {
        self.cells.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, v)| v.is_empty())
    }
}

/// Whether the first decoded row is treated as a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum DecodeMode {
    RowAsRecord,
    RowAsArray,
}

/// Logical financial meaning assigned to a raw column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColumnRole {
    Period,
    Revenue,
    Cogs,
    OperatingExpenses,
    Category,
    Amount,
    IncomeExpenseFlag,
    ExpenseCode,
    Subcategory,
}

/// Role assignment for a single document. Any role may be absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnRoleMap {
    pub roles: BTreeMap<ColumnRole, ColumnKey>,
    /// Header row position for row-as-array documents.
    pub header_row: Option<usize>,
    /// No header row was found; ledger lines start at row 0.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub headerless: bool,
}

impl ColumnRoleMap {
    /// First row holding ledger lines.
    pub fn first_data_row(&self) -> usize {
        if self.headerless {
            0
        } else {
            self.header_row.map_or(0, |row| row + 1)
        }
    }

    pub fn get(&self, role: ColumnRole) -> Option<&ColumnKey> {
        self.roles.get(&role)
    }

    pub fn insert(&mut self, role: ColumnRole, key: ColumnKey) {
        self.roles.insert(role, key);
    }

    pub fn contains(&self, role: ColumnRole) -> bool {
        self.roles.contains_key(&role)
    }

    /// Column position of `role`, if it was resolved to an index.
    pub fn index_of(&self, role: ColumnRole) -> Option<usize> {
        match self.roles.get(&role) {
            Some(ColumnKey::Index(idx)) => Some(*idx),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Canonical normalized financial snapshot for one reporting period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PeriodRecord {
    #[schemars(description = "Free-form period label, 'Unknown Period' when none was found")]
    pub period: String,

    pub revenue: f64,

    #[schemars(description = "Cost of goods sold")]
    pub cogs: f64,

    pub operating_expenses: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Expense category to summed amount; only positive sums are kept")]
    pub expense_breakdown: Option<BTreeMap<String, f64>>,
}

impl PeriodRecord {
    pub fn gross_profit(&self) -> f64 {
        self.revenue - self.cogs
    }

    pub fn operating_income(&self) -> f64 {
        self.gross_profit() - self.operating_expenses
    }

    /// Net income is reported as operating income; no below-the-line items are parsed.
    pub fn net_income(&self) -> f64 {
        self.operating_income()
    }

    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PeriodRecord)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::json_schema())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Income,
    Expense,
}

/// A classified line of an irregular (row-as-array) ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub category: String,
    pub amount: f64,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub expense_code: String,
    pub subcategory: String,
    /// Category mentions "total"; carried through, never used to exclude.
    pub is_total: bool,
}
