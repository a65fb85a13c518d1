use anyhow::{bail, Context};
use dotenv::dotenv;
use pnl_ingest::report::{report_title, stored_rows, NarrativeInput};
use pnl_ingest::{FileProcessor, PipelineConfig};
use std::path::Path;

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("csv") => "text/csv",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("xls") => "application/vnd.ms-excel",
        _ => "application/octet-stream",
    }
}

#[cfg(feature = "gemini")]
fn build_processor(config: PipelineConfig) -> anyhow::Result<FileProcessor> {
    use pnl_ingest::llm::GeminiStructureInference;
    use std::sync::Arc;

    let processor = FileProcessor::new(config)?;
    match GeminiStructureInference::from_env() {
        Ok(inference) => {
            println!("🤖 Gemini structure inference enabled");
            Ok(processor.with_inference(Arc::new(inference)))
        }
        Err(e) => {
            println!("⚠️  {} - irregular ledgers use the local layout guess", e);
            Ok(processor)
        }
    }
}

#[cfg(not(feature = "gemini"))]
fn build_processor(config: PipelineConfig) -> anyhow::Result<FileProcessor> {
    Ok(FileProcessor::new(config)?)
}

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("usage: analyze_upload <file.csv|file.xlsx> [mime-type]");
    };
    let path = Path::new(&path);
    let mime = args.next().unwrap_or_else(|| mime_for(path).to_string());
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("file name is not valid UTF-8")?;

    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let processor = build_processor(PipelineConfig::default())?;

    println!("📄 Analyzing {} ({} bytes, {})\n", filename, bytes.len(), mime);
    let records = processor.process(&bytes, filename, &mime)?;
    let kpis = processor.calculate_kpis(&records);

    println!("{}\n", report_title(&records));
    println!("Period records:\n{}\n", serde_json::to_string_pretty(&records)?);
    println!("KPIs:\n{}\n", serde_json::to_string_pretty(&kpis)?);
    println!(
        "Stored rows:\n{}\n",
        serde_json::to_string_pretty(&stored_rows(&records))?
    );
    println!(
        "Narrative input:\n{}",
        serde_json::to_string_pretty(&NarrativeInput::new(kpis, records))?
    );

    Ok(())
}
