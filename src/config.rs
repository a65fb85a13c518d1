use crate::error::{PnlError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Upload ceiling enforced before any decoding: 10 MiB.
pub const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// Rows handed to structure inference.
pub const DEFAULT_STRUCTURE_SAMPLE_ROWS: usize = 10;

pub const UNKNOWN_PERIOD: &str = "Unknown Period";

pub const ANALYZED_PERIOD: &str = "Analyzed Period";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum ParseStrategy {
    #[schemars(description = "Header row plus synonym matching for Revenue/COGS/Operating Expenses columns")]
    Direct,

    #[schemars(description = "Irregular ledger: header detection and category/amount/type column inference")]
    Heuristic,

    #[schemars(description = "Direct matching first, heuristic ledger parsing when no financial column is recognized")]
    Auto,
}

impl Default for ParseStrategy {
    fn default() -> Self {
        Self::Auto
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PipelineConfig {
    #[schemars(description = "Largest accepted upload in bytes")]
    pub max_file_size: usize,

    #[schemars(description = "Leading rows sampled for structure inference on irregular ledgers")]
    pub structure_sample_rows: usize,

    #[schemars(description = "Period label used when a row has no period-like column")]
    pub default_period_label: String,

    #[schemars(description = "Period label given to the single group produced from an irregular ledger")]
    pub ledger_period_label: String,

    pub strategy: ParseStrategy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            structure_sample_rows: DEFAULT_STRUCTURE_SAMPLE_ROWS,
            default_period_label: UNKNOWN_PERIOD.to_string(),
            ledger_period_label: ANALYZED_PERIOD.to_string(),
            strategy: ParseStrategy::Auto,
        }
    }
}

impl PipelineConfig {
    pub fn with_strategy(mut self, strategy: ParseStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_file_size == 0 {
            return Err(PnlError::InvalidConfig(
                "max_file_size must be greater than zero".to_string(),
            ));
        }
        if self.structure_sample_rows == 0 {
            return Err(PnlError::InvalidConfig(
                "structure_sample_rows must be greater than zero".to_string(),
            ));
        }
        if self.default_period_label.trim().is_empty() {
            return Err(PnlError::InvalidConfig(
                "default_period_label must not be blank".to_string(),
            ));
        }
        if self.ledger_period_label.trim().is_empty() {
            return Err(PnlError::InvalidConfig(
                "ledger_period_label must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}
