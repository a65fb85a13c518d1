//! # P&L Ingest
//!
//! A library for turning uploaded profit-and-loss spreadsheets (CSV, XLSX, XLS)
//! into normalized per-period financial records and derived KPIs.
//!
//! ## Pipeline
//!
//! - **Tabular Decoder** ([`decoder`]): bytes + MIME type + filename into raw rows
//! - **Column Resolver** ([`resolver`]): decides which column plays which financial role,
//!   by synonym matching for tidy tables or structural inference for irregular ledgers
//! - **Record Normalizer** ([`normalizer`]): parses amounts and assembles [`PeriodRecord`]s
//! - **KPI Engine** ([`kpi`]): margins, totals, growth and trend
//!
//! ## Example
//!
//! ```rust
//! use pnl_ingest::*;
//!
//! let csv = b"Month,Revenue,COGS,Operating Expenses\nJan,\"$100,000\",\"$40,000\",\"$20,000\"\n";
//! let processor = FileProcessor::new(PipelineConfig::default()).unwrap();
//!
//! let records = processor.process(csv, "pl.csv", "text/csv").unwrap();
//! assert_eq!(records[0].period, "Jan");
//!
//! let kpis = calculate_kpis(&records);
//! assert_eq!(kpis.number(kpi::metric::GROSS_PROFIT_MARGIN), Some(60.0));
//! ```
//!
//! Irregular ledgers can be routed through an injected [`StructureInference`]
//! collaborator (see the `gemini` feature) with [`FileProcessor::with_inference`].

pub mod config;
pub mod decoder;
pub mod error;
pub mod inference;
pub mod kpi;
pub mod normalizer;
pub mod report;
pub mod resolver;
pub mod schema;

#[cfg(feature = "gemini")]
pub mod llm;

pub use config::{ParseStrategy, PipelineConfig};
pub use decoder::{decode, DocumentFormat};
pub use error::{PnlError, Result};
pub use inference::{column_index, structure_prompt, StructureHint, StructureInference};
pub use kpi::{calculate_kpis, KpiMap, KpiValue, Trend};
pub use normalizer::{normalize, parse_number};
pub use report::{report_title, AudienceLevel, NarrativeInput, ReportType, StoredPeriodRow};
pub use resolver::resolve;
pub use schema::*;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Output of the row-as-array path: the structure used and what it produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerParse {
    pub structure: ColumnRoleMap,
    pub entries: Vec<LedgerEntry>,
    pub records: Vec<PeriodRecord>,
}

/// Tagged outcome handed back to upload callers.
///
/// Serializes as `{"success": true, "data": [...]}` or
/// `{"success": false, "error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<PeriodRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<Vec<PeriodRecord>>> for ProcessingResult {
    fn from(result: Result<Vec<PeriodRecord>>) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                data: Some(data),
                error: None,
            },
            Err(e) => Self {
                success: false,
                data: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Stateless pipeline facade. Safe to share across threads.
#[derive(Clone)]
pub struct FileProcessor {
    config: PipelineConfig,
    inference: Option<Arc<dyn StructureInference + Send + Sync>>,
}

impl std::fmt::Debug for FileProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileProcessor")
            .field("config", &self.config)
            .field("inference", &self.inference.is_some())
            .finish()
    }
}

impl FileProcessor {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            inference: None,
        })
    }

    pub fn with_inference(mut self, inference: Arc<dyn StructureInference + Send + Sync>) -> Self {
        self.inference = Some(inference);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn inference(&self) -> Option<&dyn StructureInference> {
        self.inference
            .as_deref()
            .map(|i| i as &dyn StructureInference)
    }

    /// Runs decode, resolve and normalize according to the configured strategy.
    pub fn process(&self, bytes: &[u8], filename: &str, mime: &str) -> Result<Vec<PeriodRecord>> {
        info!(
            "Processing upload '{}' ({} bytes, mime '{}') with {:?} strategy",
            filename,
            bytes.len(),
            mime,
            self.config.strategy
        );

        let records = match self.config.strategy {
            ParseStrategy::Direct => self.process_tabular(bytes, filename, mime)?,
            ParseStrategy::Heuristic => {
                self.parse_complex_spreadsheet(bytes, filename, mime)?
                    .records
            }
            ParseStrategy::Auto => {
                let rows = decode(bytes, mime, filename, DecodeMode::RowAsRecord, &self.config)?;
                let roles = resolve(&rows, DecodeMode::RowAsRecord, None);
                if resolver::has_financial_columns(&roles) {
                    normalize(&rows, &roles, &self.config)?
                } else {
                    info!(
                        "No Revenue/COGS/Operating Expenses header in '{}', treating it as a ledger",
                        filename
                    );
                    self.parse_complex_spreadsheet(bytes, filename, mime)?
                        .records
                }
            }
        };

        info!(
            "Extracted {} period record(s) from '{}'",
            records.len(),
            filename
        );
        Ok(records)
    }

    /// [`FileProcessor::process`] folded into the tagged result shape.
    pub fn process_file(&self, bytes: &[u8], filename: &str, mime: &str) -> ProcessingResult {
        ProcessingResult::from(self.process(bytes, filename, mime))
    }

    fn process_tabular(&self, bytes: &[u8], filename: &str, mime: &str) -> Result<Vec<PeriodRecord>> {
        let rows = decode(bytes, mime, filename, DecodeMode::RowAsRecord, &self.config)?;
        let roles = resolve(&rows, DecodeMode::RowAsRecord, None);
        normalize(&rows, &roles, &self.config)
    }

    /// Row-as-array path for irregular ledgers.
    ///
    /// Only the first `structure_sample_rows` rows are shown to the resolver;
    /// every row is then parsed against the resolved structure.
    pub fn parse_complex_spreadsheet(
        &self,
        bytes: &[u8],
        filename: &str,
        mime: &str,
    ) -> Result<LedgerParse> {
        let rows = decode(bytes, mime, filename, DecodeMode::RowAsArray, &self.config)?;
        let sample = &rows[..rows.len().min(self.config.structure_sample_rows)];
        let structure = resolve(sample, DecodeMode::RowAsArray, self.inference());

        let entries = normalizer::parse_ledger_entries(&rows, &structure);
        debug!(
            "Parsed {} ledger entries from {} rows of '{}'",
            entries.len(),
            rows.len(),
            filename
        );

        let records = normalizer::ledger_to_period_records(&entries, &self.config);
        if records.is_empty() {
            return Err(PnlError::NoValidRows);
        }

        Ok(LedgerParse {
            structure,
            entries,
            records,
        })
    }

    pub fn calculate_kpis(&self, records: &[PeriodRecord]) -> KpiMap {
        calculate_kpis(records)
    }
}

/// One-shot helper with the default configuration and no structure inference.
pub fn process_file(bytes: &[u8], filename: &str, mime: &str) -> ProcessingResult {
    match FileProcessor::new(PipelineConfig::default()) {
        Ok(processor) => processor.process_file(bytes, filename, mime),
        Err(e) => ProcessingResult::from(Err(e)),
    }
}
