use crate::error::{PnlError, Result};
use crate::inference::{structure_prompt, StructureHint, StructureInference};
use crate::llm::client::{GeminiClient, GeminiConfig};
use crate::llm::types::Content;
use crate::schema::RawRow;
use log::{debug, warn};
use serde_json::json;

const SYSTEM_PROMPT: &str = "You are a financial data analyst. You read raw spreadsheet rows \
and report which columns hold dates, income/expense flags, categories, expense codes, \
subcategories and amounts. Answer with JSON only.";

/// Gemini's OpenAPI-subset schema for [`StructureHint`].
pub fn response_schema() -> serde_json::Value {
    let column = json!({ "type": "STRING", "nullable": true });
    json!({
        "type": "OBJECT",
        "properties": {
            "headerRow": { "type": "INTEGER" },
            "dateColumn": column,
            "incomeExpenseColumn": column,
            "categoryColumn": column,
            "expenseCodeColumn": column,
            "subcategoryColumn": column,
            "amountColumn": column
        },
        "required": ["headerRow", "categoryColumn", "amountColumn"]
    })
}

/// [`StructureInference`] backed by a Gemini model.
#[derive(Debug, Clone)]
pub struct GeminiStructureInference {
    client: GeminiClient,
}

impl GeminiStructureInference {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: GeminiConfig) -> Result<Self> {
        Ok(Self::new(GeminiClient::new(config)?))
    }

    pub fn from_env() -> Result<Self> {
        Self::from_config(GeminiConfig::from_env()?)
    }
}

impl StructureInference for GeminiStructureInference {
    fn infer_structure(&self, sample: &[RawRow]) -> Result<StructureHint> {
        debug!(
            "Requesting structure for {} sample rows from '{}'",
            sample.len(),
            self.client.model()
        );

        let text = self
            .client
            .generate_content(
                SYSTEM_PROMPT,
                vec![Content::user(structure_prompt(sample))],
                Some(response_schema()),
            )
            .map_err(|e| {
                warn!("Gemini structure request failed: {}", e);
                match e {
                    unavailable @ PnlError::StructureInferenceUnavailable(_) => unavailable,
                    other => PnlError::StructureInferenceUnavailable(other.to_string()),
                }
            })?;

        StructureHint::from_response(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CellValue;

    #[test]
    fn test_response_schema_matches_hint_fields() {
        let schema = response_schema();
        let properties = schema["properties"].as_object().unwrap();
        for field in [
            "headerRow",
            "dateColumn",
            "incomeExpenseColumn",
            "categoryColumn",
            "expenseCodeColumn",
            "subcategoryColumn",
            "amountColumn",
        ] {
            assert!(properties.contains_key(field), "missing {}", field);
        }
        assert_eq!(schema["properties"]["headerRow"]["type"], "INTEGER");
    }

    #[test]
    fn test_unreachable_service_is_unavailable() {
        let client = GeminiClient::new(GeminiConfig::new("key").with_timeout_secs(2))
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        let inference = GeminiStructureInference::new(client);

        let sample = vec![RawRow::from_values(vec![CellValue::text("Category")])];
        let result = inference.infer_structure(&sample);
        assert!(matches!(
            result,
            Err(PnlError::StructureInferenceUnavailable(_))
        ));
    }
}
