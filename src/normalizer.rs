use crate::config::PipelineConfig;
use crate::error::{PnlError, Result};
use crate::resolver::PERIOD_LABELS;
use crate::schema::{
    CellValue, ColumnKey, ColumnRole, ColumnRoleMap, EntryType, LedgerEntry, PeriodRecord, RawRow,
};
use log::{debug, warn};
use std::collections::BTreeMap;
use thiserror::Error;

/// Category keywords that classify an expense line as cost of goods sold.
pub const COGS_KEYWORDS: [&str; 5] = [
    "cost of goods",
    "cogs",
    "direct cost",
    "materials",
    "inventory",
];

/// Why a single row was skipped. Never fails the upload on its own.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("row has no values")]
    Blank,

    #[error("row has no category")]
    MissingCategory,

    #[error("row amount is zero or unreadable")]
    ZeroAmount,
}

/// Resolves a cell to a definite, finite number. Unreadable values are 0.
///
/// Accounting negatives such as `(500)` lose their parentheses and read as `500`.
pub fn parse_number(value: &CellValue) -> f64 {
    value.numeric().unwrap_or(0.0)
}

fn cell_number(row: &RawRow, key: Option<&ColumnKey>) -> f64 {
    key.and_then(|k| row.get(k)).map(parse_number).unwrap_or(0.0)
}

fn cell_text(row: &RawRow, idx: usize) -> String {
    row.get_index(idx)
        .map(CellValue::as_text)
        .unwrap_or_default()
}

/// Normalizes decoded rows into period records.
///
/// A role map carrying a header row came from ledger resolution and is routed
/// through [`parse_ledger_entries`]; otherwise every row is one period.
pub fn normalize(
    rows: &[RawRow],
    roles: &ColumnRoleMap,
    config: &PipelineConfig,
) -> Result<Vec<PeriodRecord>> {
    let records = if roles.header_row.is_some() {
        let entries = parse_ledger_entries(rows, roles);
        ledger_to_period_records(&entries, config)
    } else {
        normalize_records(rows, roles, config)
    };

    if records.is_empty() {
        return Err(PnlError::NoValidRows);
    }
    Ok(records)
}

fn normalize_records(
    rows: &[RawRow],
    roles: &ColumnRoleMap,
    config: &PipelineConfig,
) -> Vec<PeriodRecord> {
    let mut records = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        match normalize_row(row, roles, config) {
            Ok(record) => records.push(record),
            Err(reason) => warn!("Skipping invalid row {}: {}", idx + 1, reason),
        }
    }
    records
}

pub fn normalize_row(
    row: &RawRow,
    roles: &ColumnRoleMap,
    config: &PipelineConfig,
) -> std::result::Result<PeriodRecord, RowError> {
    if row.is_blank() {
        return Err(RowError::Blank);
    }

    let breakdown = expense_breakdown(row);

    Ok(PeriodRecord {
        period: extract_period(row, roles, &config.default_period_label),
        revenue: cell_number(row, roles.get(ColumnRole::Revenue)),
        cogs: cell_number(row, roles.get(ColumnRole::Cogs)),
        operating_expenses: cell_number(row, roles.get(ColumnRole::OperatingExpenses)),
        expense_breakdown: (!breakdown.is_empty()).then_some(breakdown),
    })
}

/// The resolved period column first, then the fixed label priority list.
pub fn extract_period(row: &RawRow, roles: &ColumnRoleMap, default: &str) -> String {
    roles
        .get(ColumnRole::Period)
        .and_then(|key| row.get(key))
        .filter(|cell| !cell.is_empty())
        .or_else(|| {
            PERIOD_LABELS
                .iter()
                .filter_map(|label| row.get_label(label))
                .find(|cell| !cell.is_empty())
        })
        .map(CellValue::as_text)
        .unwrap_or_else(|| default.to_string())
}

/// Labelled columns mentioning "expense" (but not "total") with a positive value.
pub fn expense_breakdown(row: &RawRow) -> BTreeMap<String, f64> {
    let mut breakdown = BTreeMap::new();
    for (key, cell) in row.iter() {
        let ColumnKey::Label(label) = key else {
            continue;
        };
        let lower = label.to_lowercase();
        if !lower.contains("expense") || lower.contains("total") {
            continue;
        }
        let value = parse_number(cell);
        if value > 0.0 {
            breakdown.entry(label.clone()).or_insert(value);
        }
    }
    breakdown
}

pub fn is_cogs(category: &str) -> bool {
    let category = category.to_lowercase();
    COGS_KEYWORDS.iter().any(|keyword| category.contains(keyword))
}

/// Reads classified ledger lines from the rows following the header row.
pub fn parse_ledger_entries(rows: &[RawRow], roles: &ColumnRoleMap) -> Vec<LedgerEntry> {
    rows.iter()
        .enumerate()
        .skip(roles.first_data_row())
        .filter_map(|(idx, row)| match ledger_entry(row, roles) {
            Ok(entry) => Some(entry),
            Err(reason) => {
                debug!("Ledger row {} skipped: {}", idx + 1, reason);
                None
            }
        })
        .collect()
}

pub fn ledger_entry(
    row: &RawRow,
    roles: &ColumnRoleMap,
) -> std::result::Result<LedgerEntry, RowError> {
    if row.is_blank() {
        return Err(RowError::Blank);
    }

    let column = |role| roles.index_of(role).unwrap_or(0);

    let category = cell_text(row, column(ColumnRole::Category));
    if category.is_empty() {
        return Err(RowError::MissingCategory);
    }

    let amount = row
        .get_index(column(ColumnRole::Amount))
        .map(parse_number)
        .unwrap_or(0.0);
    if amount == 0.0 {
        return Err(RowError::ZeroAmount);
    }

    let flag = cell_text(row, column(ColumnRole::IncomeExpenseFlag)).to_lowercase();
    let entry_type = if flag.contains("income") {
        EntryType::Income
    } else {
        EntryType::Expense
    };

    Ok(LedgerEntry {
        is_total: category.to_lowercase().contains("total"),
        category,
        amount,
        entry_type,
        expense_code: cell_text(row, column(ColumnRole::ExpenseCode)),
        subcategory: cell_text(row, column(ColumnRole::Subcategory)),
    })
}

/// Groups ledger lines into periods.
///
/// Date columns are not consulted yet: every line lands in one group labelled
/// `period_label`. Multi-period ledgers should split here.
pub fn group_by_period<'a>(
    entries: &'a [LedgerEntry],
    period_label: &str,
) -> Vec<(String, Vec<&'a LedgerEntry>)> {
    if entries.is_empty() {
        return Vec::new();
    }
    vec![(period_label.to_string(), entries.iter().collect())]
}

pub fn ledger_to_period_records(
    entries: &[LedgerEntry],
    config: &PipelineConfig,
) -> Vec<PeriodRecord> {
    group_by_period(entries, &config.ledger_period_label)
        .into_iter()
        .map(|(period, group)| {
            let mut revenue = 0.0;
            let mut cogs = 0.0;
            let mut operating_expenses = 0.0;
            let mut by_category: BTreeMap<String, f64> = BTreeMap::new();

            for entry in group {
                match entry.entry_type {
                    EntryType::Income => revenue += entry.amount,
                    EntryType::Expense => {
                        if is_cogs(&entry.category) {
                            cogs += entry.amount;
                        } else {
                            operating_expenses += entry.amount;
                        }
                        *by_category.entry(entry.category.clone()).or_insert(0.0) += entry.amount;
                    }
                }
            }

            by_category.retain(|_, total| *total > 0.0);

            PeriodRecord {
                period,
                revenue,
                cogs,
                operating_expenses,
                expense_breakdown: (!by_category.is_empty()).then_some(by_category),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labelled(cells: &[(&str, &str)]) -> RawRow {
        RawRow::new(
            cells
                .iter()
                .map(|(k, v)| (ColumnKey::Label(k.to_string()), CellValue::text(*v)))
                .collect(),
        )
    }

    fn array_row(cells: &[&str]) -> RawRow {
        RawRow::from_values(cells.iter().map(|c| CellValue::text(*c)).collect())
    }

    fn direct_roles() -> ColumnRoleMap {
        let mut roles = ColumnRoleMap::default();
        roles.insert(ColumnRole::Revenue, ColumnKey::Label("Revenue".into()));
        roles.insert(ColumnRole::Cogs, ColumnKey::Label("COGS".into()));
        roles.insert(
            ColumnRole::OperatingExpenses,
            ColumnKey::Label("Operating Expenses".into()),
        );
        roles
    }

    fn ledger_roles() -> ColumnRoleMap {
        let mut roles = ColumnRoleMap {
            header_row: Some(0),
            ..ColumnRoleMap::default()
        };
        roles.insert(ColumnRole::IncomeExpenseFlag, ColumnKey::Index(0));
        roles.insert(ColumnRole::Category, ColumnKey::Index(1));
        roles.insert(ColumnRole::ExpenseCode, ColumnKey::Index(2));
        roles.insert(ColumnRole::Subcategory, ColumnKey::Index(3));
        roles.insert(ColumnRole::Amount, ColumnKey::Index(4));
        roles
    }

    #[test]
    fn test_parse_number_cleansing() {
        assert_eq!(parse_number(&CellValue::text("$1,234.50")), 1234.50);
        assert_eq!(parse_number(&CellValue::text("abc")), 0.0);
        assert_eq!(parse_number(&CellValue::text("")), 0.0);
        assert_eq!(parse_number(&CellValue::Number(-12.0)), -12.0);
        assert_eq!(parse_number(&CellValue::Number(f64::INFINITY)), 0.0);
    }

    #[test]
    fn test_parenthesized_values_are_not_negated() {
        // Accounting negatives are stripped, not negated. Kept as current behaviour.
        assert_eq!(parse_number(&CellValue::text("(500)")), 500.0);
        assert_eq!(parse_number(&CellValue::text("$(1,250.00)")), 1250.0);
    }

    #[test]
    fn test_period_priority_and_default() {
        let config = PipelineConfig::default();
        let roles = ColumnRoleMap::default();

        // Label priority decides, not column order.
        let row = labelled(&[("Month", "Jan"), ("date", "2024-01"), ("Revenue", "5")]);
        assert_eq!(extract_period(&row, &roles, "Unknown Period"), "2024-01");

        let row = labelled(&[("Period", ""), ("Quarter", "Q2")]);
        assert_eq!(extract_period(&row, &roles, "Unknown Period"), "Q2");

        let record = normalize_row(&labelled(&[("Revenue", "100")]), &roles, &config).unwrap();
        assert_eq!(record.period, "Unknown Period");
    }

    #[test]
    fn test_numeric_period_rendered_without_fraction() {
        let row = RawRow::new(vec![(
            ColumnKey::Label("Period".into()),
            CellValue::Number(2024.0),
        )]);
        assert_eq!(
            extract_period(&row, &ColumnRoleMap::default(), "Unknown Period"),
            "2024"
        );
    }

    #[test]
    fn test_expense_breakdown_filters() {
        let row = labelled(&[
            ("Revenue", "1000"),
            ("Marketing Expense", "$200"),
            ("Rent expense", "0"),
            ("Total Expenses", "900"),
            ("Travel Expenses", "(50)"),
        ]);
        let breakdown = expense_breakdown(&row);
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown.get("Marketing Expense"), Some(&200.0));
        assert_eq!(breakdown.get("Travel Expenses"), Some(&50.0));
    }

    #[test]
    fn test_normalize_records_skips_blank_rows() {
        let rows = vec![
            labelled(&[
                ("Period", "Jan"),
                ("Revenue", "$100,000"),
                ("COGS", "$40,000"),
                ("Operating Expenses", "$20,000"),
            ]),
            labelled(&[
                ("Period", ""),
                ("Revenue", ""),
                ("COGS", ""),
                ("Operating Expenses", ""),
            ]),
        ];
        let records = normalize(&rows, &direct_roles(), &PipelineConfig::default()).unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.period, "Jan");
        assert_eq!(record.revenue, 100_000.0);
        assert_eq!(record.cogs, 40_000.0);
        assert_eq!(record.operating_expenses, 20_000.0);
        assert_eq!(
            record
                .expense_breakdown
                .as_ref()
                .and_then(|b| b.get("Operating Expenses")),
            Some(&20_000.0)
        );
    }

    #[test]
    fn test_missing_columns_default_to_zero() {
        let rows = vec![labelled(&[("Revenue", "n/a"), ("Notes", "draft")])];
        let records = normalize(&rows, &direct_roles(), &PipelineConfig::default()).unwrap();
        assert_eq!(records[0].revenue, 0.0);
        assert_eq!(records[0].cogs, 0.0);
        assert_eq!(records[0].operating_expenses, 0.0);
        assert!(records[0].expense_breakdown.is_none());
    }

    #[test]
    fn test_all_blank_rows_is_no_valid_rows() {
        let rows = vec![labelled(&[("Revenue", "")])];
        let result = normalize(&rows, &direct_roles(), &PipelineConfig::default());
        assert!(matches!(result, Err(PnlError::NoValidRows)));
    }

    #[test]
    fn test_ledger_entry_classification() {
        let roles = ledger_roles();
        let entry = ledger_entry(
            &array_row(&["Other Income", "Interest", "", "", "15"]),
            &roles,
        )
        .unwrap();
        assert_eq!(entry.entry_type, EntryType::Income);

        let entry = ledger_entry(
            &array_row(&["EXP", "Total Payroll", "5000", "Wages", "$2,000"]),
            &roles,
        )
        .unwrap();
        assert_eq!(entry.entry_type, EntryType::Expense);
        assert!(entry.is_total);
        assert_eq!(entry.expense_code, "5000");
        assert_eq!(entry.subcategory, "Wages");

        assert_eq!(
            ledger_entry(&array_row(&["Expense", "", "", "", "10"]), &roles),
            Err(RowError::MissingCategory)
        );
        assert_eq!(
            ledger_entry(&array_row(&["Expense", "Rent", "", "", "-"]), &roles),
            Err(RowError::ZeroAmount)
        );
        assert_eq!(
            ledger_entry(&array_row(&["", "", ""]), &roles),
            Err(RowError::Blank)
        );
    }

    #[test]
    fn test_cogs_keywords() {
        assert!(is_cogs("Cost of Goods - Widgets"));
        assert!(is_cogs("Raw Materials"));
        assert!(is_cogs("Inventory adjustments"));
        assert!(is_cogs("Direct Costs"));
        assert!(!is_cogs("Office Rent"));
    }

    #[test]
    fn test_ledger_rolls_up_into_single_period() {
        let rows = vec![
            array_row(&["Type", "Category", "Code", "Subcategory", "Amount"]),
            array_row(&["Income", "Sales", "4000", "", "10,000"]),
            array_row(&["Income", "Total Income", "", "", "10,000"]),
            array_row(&["Expense", "Materials", "5100", "Steel", "3,000"]),
            array_row(&["Expense", "Rent", "6100", "", "1,500"]),
            array_row(&["Expense", "Rent", "6100", "Storage", "500"]),
            array_row(&["", "", "", "", ""]),
            array_row(&["Expense", "Refunds", "6900", "", "-200"]),
        ];
        let records = normalize(&rows, &ledger_roles(), &PipelineConfig::default()).unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.period, "Analyzed Period");
        // Total lines are carried, not deduplicated.
        assert_eq!(record.revenue, 20_000.0);
        assert_eq!(record.cogs, 3_000.0);
        assert_eq!(record.operating_expenses, 1_800.0);

        let breakdown = record.expense_breakdown.as_ref().unwrap();
        assert_eq!(breakdown.get("Rent"), Some(&2_000.0));
        assert_eq!(breakdown.get("Materials"), Some(&3_000.0));
        assert!(!breakdown.contains_key("Refunds"));
    }

    #[test]
    fn test_ledger_without_entries_is_no_valid_rows() {
        let rows = vec![array_row(&["Type", "Category", "Code", "Subcategory", "Amount"])];
        let result = normalize(&rows, &ledger_roles(), &PipelineConfig::default());
        assert!(matches!(result, Err(PnlError::NoValidRows)));
    }
}
