//! Column role resolution.
//!
//! Row-as-record documents are resolved by exact synonym matching on the header
//! labels. Row-as-array ledgers go through structural inference: an injected
//! [`StructureInference`] collaborator when available, a local header/keyword
//! guess otherwise. Resolution never fails; unresolved roles are left to the
//! normalizer's defaults.

use crate::inference::{column_index, StructureHint, StructureInference};
use crate::schema::{CellValue, ColumnKey, ColumnRole, ColumnRoleMap, DecodeMode, RawRow};
use log::{debug, warn};
use std::collections::BTreeSet;

pub const PERIOD_LABELS: [&str; 8] = [
    "Period", "period", "Date", "date", "Month", "month", "Quarter", "quarter",
];

pub const REVENUE_LABELS: [&str; 3] = ["Revenue", "revenue", "Total Revenue"];

pub const COGS_LABELS: [&str; 3] = ["COGS", "cogs", "Cost of Goods Sold"];

pub const OPERATING_EXPENSE_LABELS: [&str; 3] = [
    "Operating Expenses",
    "operatingExpenses",
    "Total Operating Expenses",
];

/// Roles every ledger layout carries, defaulting to column 0.
pub const LEDGER_ROLES: [ColumnRole; 5] = [
    ColumnRole::Category,
    ColumnRole::Amount,
    ColumnRole::IncomeExpenseFlag,
    ColumnRole::ExpenseCode,
    ColumnRole::Subcategory,
];

pub fn resolve(
    sample: &[RawRow],
    mode: DecodeMode,
    inference: Option<&dyn StructureInference>,
) -> ColumnRoleMap {
    match mode {
        DecodeMode::RowAsRecord => resolve_direct(sample),
        DecodeMode::RowAsArray => resolve_heuristic(sample, inference),
    }
}

/// Exact, case-sensitive synonym matching; the first synonym present wins.
pub fn resolve_direct(sample: &[RawRow]) -> ColumnRoleMap {
    let labels: BTreeSet<&str> = sample
        .iter()
        .flat_map(|row| row.keys())
        .filter_map(|key| match key {
            ColumnKey::Label(label) => Some(label.as_str()),
            ColumnKey::Index(_) => None,
        })
        .collect();

    let mut roles = ColumnRoleMap::default();
    let candidates: [(ColumnRole, &[&str]); 4] = [
        (ColumnRole::Period, &PERIOD_LABELS),
        (ColumnRole::Revenue, &REVENUE_LABELS),
        (ColumnRole::Cogs, &COGS_LABELS),
        (ColumnRole::OperatingExpenses, &OPERATING_EXPENSE_LABELS),
    ];

    for (role, synonyms) in candidates {
        if let Some(label) = synonyms.iter().find(|s| labels.contains(**s)) {
            roles.insert(role, ColumnKey::Label(label.to_string()));
        }
    }

    debug!("Direct column resolution: {:?}", roles.roles);
    roles
}

/// True when direct matching recognised at least one monetary column.
pub fn has_financial_columns(roles: &ColumnRoleMap) -> bool {
    [
        ColumnRole::Revenue,
        ColumnRole::Cogs,
        ColumnRole::OperatingExpenses,
    ]
    .iter()
    .any(|role| roles.contains(*role))
}

pub fn resolve_heuristic(
    sample: &[RawRow],
    inference: Option<&dyn StructureInference>,
) -> ColumnRoleMap {
    if let Some(inference) = inference {
        match inference.infer_structure(sample) {
            Ok(hint) => {
                let roles = roles_from_hint(&hint);
                debug!(
                    "Structure hint resolved header row {:?}: {:?}",
                    roles.header_row, roles.roles
                );
                return roles;
            }
            Err(e) => warn!(
                "Structure inference unavailable, using local layout guess: {}",
                e
            ),
        }
    }

    let roles = infer_layout(sample);
    debug!(
        "Local layout guess resolved header row {:?}: {:?}",
        roles.header_row, roles.roles
    );
    roles
}

/// Applies a collaborator hint. Omitted or malformed references fall back to column 0.
pub fn roles_from_hint(hint: &StructureHint) -> ColumnRoleMap {
    let mut roles = ColumnRoleMap {
        header_row: Some(hint.header_row_index()),
        ..ColumnRoleMap::default()
    };

    let references = [
        (ColumnRole::Category, &hint.category_column),
        (ColumnRole::Amount, &hint.amount_column),
        (ColumnRole::IncomeExpenseFlag, &hint.income_expense_column),
        (ColumnRole::ExpenseCode, &hint.expense_code_column),
        (ColumnRole::Subcategory, &hint.subcategory_column),
    ];
    for (role, reference) in references {
        roles.insert(role, ColumnKey::Index(column_index(reference.as_deref())));
    }

    if let Some(date_column) = hint.date_column.as_deref() {
        roles.insert(
            ColumnRole::Period,
            ColumnKey::Index(column_index(Some(date_column))),
        );
    }

    roles
}

fn role_for_header(label: &str) -> Option<ColumnRole> {
    let label = label.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| label.contains(n));

    if has(&["subcategor", "sub category", "sub-category"]) {
        Some(ColumnRole::Subcategory)
    } else if has(&["code"]) {
        Some(ColumnRole::ExpenseCode)
    } else if has(&["categor", "account", "description", "item"]) {
        Some(ColumnRole::Category)
    } else if has(&["amount", "value", "balance"]) {
        Some(ColumnRole::Amount)
    } else if has(&["income", "expense", "type", "kind"]) {
        Some(ColumnRole::IncomeExpenseFlag)
    } else if has(&["date", "period", "month", "quarter", "year"]) {
        Some(ColumnRole::Period)
    } else {
        None
    }
}

fn header_roles(row: &RawRow) -> BTreeSet<ColumnRole> {
    row.iter()
        .filter_map(|(_, cell)| match cell {
            CellValue::Text(text) => role_for_header(text),
            _ => None,
        })
        .collect()
}

/// Picks the sample row naming the most distinct roles, else the first all-text row.
///
/// Rows holding a number are data, whatever keywords they contain. `None` when
/// no row looks like a header.
pub fn detect_header_row(sample: &[RawRow]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (idx, row) in sample.iter().enumerate() {
        if has_number(row) {
            continue;
        }
        let score = header_roles(row).len();
        if score > 0 && best.map_or(true, |(_, top)| score > top) {
            best = Some((idx, score));
        }
    }
    if let Some((idx, _)) = best {
        return Some(idx);
    }

    sample.iter().position(|row| {
        let filled = row.iter().filter(|(_, cell)| !cell.is_empty()).count();
        filled >= 2 && !has_number(row)
    })
}

fn has_number(row: &RawRow) -> bool {
    row.iter().any(|(_, cell)| cell.numeric().is_some())
}

/// Local structural guess for irregular ledgers.
pub fn infer_layout(sample: &[RawRow]) -> ColumnRoleMap {
    let detected = detect_header_row(sample);
    let mut roles = ColumnRoleMap {
        header_row: Some(detected.unwrap_or(0)),
        headerless: detected.is_none(),
        ..ColumnRoleMap::default()
    };
    let mut taken = BTreeSet::new();

    if let Some(header) = detected.and_then(|row| sample.get(row)) {
        for (key, cell) in header.iter() {
            let (ColumnKey::Index(idx), CellValue::Text(text)) = (key, cell) else {
                continue;
            };
            if let Some(role) = role_for_header(text) {
                if !roles.contains(role) && taken.insert(*idx) {
                    roles.insert(role, ColumnKey::Index(*idx));
                }
            }
        }
    }

    let body = sample.get(roles.first_data_row()..).unwrap_or(&[]);

    if !roles.contains(ColumnRole::Amount) {
        if let Some(idx) = busiest_column(body, &taken, |cell| cell.numeric().is_some()) {
            taken.insert(idx);
            roles.insert(ColumnRole::Amount, ColumnKey::Index(idx));
        }
    }
    if !roles.contains(ColumnRole::IncomeExpenseFlag) {
        if let Some(idx) = busiest_column(body, &taken, |cell| {
            let text = cell.as_text().to_lowercase();
            text.contains("income") || text.contains("expense")
        }) {
            taken.insert(idx);
            roles.insert(ColumnRole::IncomeExpenseFlag, ColumnKey::Index(idx));
        }
    }
    if !roles.contains(ColumnRole::Category) {
        if let Some(idx) = busiest_column(body, &taken, |cell| {
            !cell.is_empty() && cell.numeric().is_none()
        }) {
            taken.insert(idx);
            roles.insert(ColumnRole::Category, ColumnKey::Index(idx));
        }
    }

    for role in LEDGER_ROLES {
        if !roles.contains(role) {
            roles.insert(role, ColumnKey::Index(0));
        }
    }

    roles
}

// Column (not yet taken) with the most cells satisfying `pred`; ties go to the leftmost.
fn busiest_column<F>(rows: &[RawRow], taken: &BTreeSet<usize>, pred: F) -> Option<usize>
where
    F: Fn(&CellValue) -> bool,
{
    let mut counts: Vec<usize> = Vec::new();
    for row in rows {
        for (key, cell) in row.iter() {
            if let ColumnKey::Index(idx) = key {
                if taken.contains(idx) || !pred(cell) {
                    continue;
                }
                if counts.len() <= *idx {
                    counts.resize(*idx + 1, 0);
                }
                counts[*idx] += 1;
            }
        }
    }

    counts
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .fold(None, |best: Option<(usize, usize)>, (idx, count)| match best {
            Some((_, top)) if top >= *count => best,
            _ => Some((idx, *count)),
        })
        .map(|(idx, _)| idx)
}
