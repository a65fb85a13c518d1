use crate::kpi::KpiMap;
use crate::schema::PeriodRecord;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const FALLBACK_TITLE_PERIOD: &str = "Recent Period";

/// One period as persisted alongside a report.
///
/// Monetary fields are fixed two-decimal strings so storage never carries
/// binary floating point noise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoredPeriodRow {
    pub period: String,
    pub revenue: String,
    pub cogs: String,
    pub gross_profit: String,
    pub operating_expenses: String,
    pub operating_income: String,
    pub net_income: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expense_breakdown: Option<serde_json::Value>,
}

impl StoredPeriodRow {
    pub fn from_record(record: &PeriodRecord) -> Self {
        Self {
            period: record.period.clone(),
            revenue: decimal(record.revenue),
            cogs: decimal(record.cogs),
            gross_profit: decimal(record.gross_profit()),
            operating_expenses: decimal(record.operating_expenses),
            operating_income: decimal(record.operating_income()),
            net_income: decimal(record.net_income()),
            expense_breakdown: record
                .expense_breakdown
                .as_ref()
                .and_then(|b| serde_json::to_value(b).ok()),
        }
    }
}

pub fn stored_rows(records: &[PeriodRecord]) -> Vec<StoredPeriodRow> {
    records.iter().map(StoredPeriodRow::from_record).collect()
}

fn decimal(value: f64) -> String {
    let rounded = format!("{:.2}", value);
    // "-0.00" reads as a loss in storage.
    if rounded == "-0.00" {
        "0.00".to_string()
    } else {
        rounded
    }
}

/// "Financial Analysis - {first period}".
pub fn report_title(records: &[PeriodRecord]) -> String {
    let period = records
        .first()
        .map(|r| r.period.trim())
        .filter(|p| !p.is_empty())
        .unwrap_or(FALLBACK_TITLE_PERIOD);
    format!("Financial Analysis - {}", period)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AudienceLevel {
    #[default]
    Executive,
    TeamLeads,
    AllCompany,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    #[default]
    ExecutiveSummary,
    KpiAnalysis,
    TrendAnalysis,
}

/// Payload handed to the narrative generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeInput {
    pub kpis: KpiMap,
    pub pl_data: Vec<PeriodRecord>,
    pub audience_level: AudienceLevel,
    pub report_type: ReportType,
}

impl NarrativeInput {
    pub fn new(kpis: KpiMap, pl_data: Vec<PeriodRecord>) -> Self {
        Self {
            kpis,
            pl_data,
            audience_level: AudienceLevel::default(),
            report_type: ReportType::default(),
        }
    }

    pub fn with_audience(mut self, audience_level: AudienceLevel) -> Self {
        self.audience_level = audience_level;
        self
    }

    pub fn with_report_type(mut self, report_type: ReportType) -> Self {
        self.report_type = report_type;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpi::calculate_kpis;
    use std::collections::BTreeMap;

    fn record(period: &str, revenue: f64, cogs: f64, opex: f64) -> PeriodRecord {
        PeriodRecord {
            period: period.to_string(),
            revenue,
            cogs,
            operating_expenses: opex,
            expense_breakdown: None,
        }
    }

    #[test]
    fn test_stored_row_uses_two_decimals() {
        let row = StoredPeriodRow::from_record(&record("Q1", 100000.0, 40000.5, 19999.999));
        assert_eq!(row.revenue, "100000.00");
        assert_eq!(row.cogs, "40000.50");
        assert_eq!(row.gross_profit, "59999.50");
        assert_eq!(row.operating_expenses, "20000.00");
        assert_eq!(row.operating_income, "39999.50");
        assert_eq!(row.net_income, row.operating_income);
        assert!(row.expense_breakdown.is_none());
    }

    #[test]
    fn test_stored_row_keeps_breakdown_and_losses() {
        let mut breakdown = BTreeMap::new();
        breakdown.insert("Rent".to_string(), 1200.0);
        let mut rec = record("Analyzed Period", 0.0, 0.0, 1200.0);
        rec.expense_breakdown = Some(breakdown);

        let row = StoredPeriodRow::from_record(&rec);
        assert_eq!(row.operating_income, "-1200.00");
        assert_eq!(row.revenue, "0.00");
        assert_eq!(row.expense_breakdown.unwrap()["Rent"], 1200.0);
    }

    #[test]
    fn test_stored_row_json_field_names() {
        let json = serde_json::to_value(StoredPeriodRow::from_record(&record("Jan", 1.0, 0.0, 0.0)))
            .unwrap();
        assert_eq!(json["grossProfit"], "1.00");
        assert_eq!(json["netIncome"], "1.00");
        assert!(json.get("expenseBreakdown").is_none());
    }

    #[test]
    fn test_report_title() {
        let records = vec![record("Q1 2024", 1.0, 0.0, 0.0), record("Q2 2024", 1.0, 0.0, 0.0)];
        assert_eq!(report_title(&records), "Financial Analysis - Q1 2024");
        assert_eq!(report_title(&[]), "Financial Analysis - Recent Period");
        assert_eq!(
            report_title(&[record("  ", 1.0, 0.0, 0.0)]),
            "Financial Analysis - Recent Period"
        );
    }

    #[test]
    fn test_narrative_input_shape() {
        let records = vec![record("Jan", 100.0, 40.0, 20.0)];
        let input = NarrativeInput::new(calculate_kpis(&records), records)
            .with_audience(AudienceLevel::TeamLeads)
            .with_report_type(ReportType::KpiAnalysis);

        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["audienceLevel"], "team_leads");
        assert_eq!(json["reportType"], "kpi_analysis");
        assert_eq!(json["kpis"]["grossProfitMargin"], 60.0);
        assert_eq!(json["plData"][0]["operatingExpenses"], 20.0);
    }
}
