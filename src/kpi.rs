use crate::schema::PeriodRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metric names as consumed by the narrative generator and report storage.
pub mod metric {
    pub const GROSS_PROFIT_MARGIN: &str = "grossProfitMargin";
    pub const OPERATING_MARGIN: &str = "operatingMargin";
    pub const NET_PROFIT_MARGIN: &str = "netProfitMargin";
    pub const TOTAL_REVENUE: &str = "totalRevenue";
    pub const TOTAL_COGS: &str = "totalCogs";
    pub const TOTAL_OPERATING_EXPENSES: &str = "totalOperatingExpenses";
    pub const GROSS_PROFIT: &str = "grossProfit";
    pub const OPERATING_INCOME: &str = "operatingIncome";
    pub const REVENUE_GROWTH: &str = "revenueGrowth";
    pub const TREND: &str = "trend";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KpiValue {
    Number(f64),
    Tag(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Positive,
    Negative,
    Stable,
}

impl Trend {
    pub fn from_growth(growth: f64) -> Self {
        if growth > 0.0 {
            Trend::Positive
        } else if growth < 0.0 {
            Trend::Negative
        } else {
            Trend::Stable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Positive => "positive",
            Trend::Negative => "negative",
            Trend::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KpiMap(BTreeMap<String, KpiValue>);

impl KpiMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_number(&mut self, name: &str, value: f64) {
        self.0.insert(name.to_string(), KpiValue::Number(value));
    }

    pub fn insert_tag(&mut self, name: &str, tag: &str) {
        self.0.insert(name.to_string(), KpiValue::Tag(tag.to_string()));
    }

    pub fn get(&self, name: &str) -> Option<&KpiValue> {
        self.0.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.0.get(name) {
            Some(KpiValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn tag(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(KpiValue::Tag(t)) => Some(t.as_str()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &KpiValue)> {
        self.0.iter()
    }
}

fn percentage(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        part / whole * 100.0
    }
}

/// Derives point-in-time and trend metrics.
///
/// The last record is the current period; with two or more records the
/// second-to-last is the previous period for growth and trend. Margins are
/// percentages of current revenue and are 0 when revenue is 0. No clamping.
pub fn calculate_kpis(records: &[PeriodRecord]) -> KpiMap {
    let mut kpis = KpiMap::new();
    let Some(latest) = records.last() else {
        return kpis;
    };

    let gross_profit = latest.gross_profit();
    let operating_income = latest.operating_income();
    let operating_margin = percentage(operating_income, latest.revenue);

    kpis.insert_number(
        metric::GROSS_PROFIT_MARGIN,
        percentage(gross_profit, latest.revenue),
    );
    kpis.insert_number(metric::OPERATING_MARGIN, operating_margin);
    // Same figure as the operating margin: no below-the-line items are parsed.
    kpis.insert_number(metric::NET_PROFIT_MARGIN, operating_margin);
    kpis.insert_number(metric::TOTAL_REVENUE, latest.revenue);
    kpis.insert_number(metric::TOTAL_COGS, latest.cogs);
    kpis.insert_number(metric::TOTAL_OPERATING_EXPENSES, latest.operating_expenses);
    kpis.insert_number(metric::GROSS_PROFIT, gross_profit);
    kpis.insert_number(metric::OPERATING_INCOME, operating_income);

    if records.len() >= 2 {
        let previous = &records[records.len() - 2];
        let growth = percentage(latest.revenue - previous.revenue, previous.revenue);
        kpis.insert_number(metric::REVENUE_GROWTH, growth);
        kpis.insert_tag(metric::TREND, Trend::from_growth(growth).as_str());
    }

    kpis
}
