use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use sightline_lib::document::PdfDocument;
use sightline_lib::rag::IngestReport;

use crate::app::App;
use crate::render::terminal::{paint, Color};
use crate::OutputFormat;

pub fn run_pdf(app: &App, path: &Path, format: &OutputFormat, use_color: bool) -> Result<()> {
    let document = PdfDocument::open(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let report = app.pipeline()?.ingest_document(&document)?;
    print_report(&report, &path.display().to_string(), format, use_color)
}

/// Index a text file, or stdin when `source` is "-".
pub fn run_text(app: &App, source: &str, format: &OutputFormat, use_color: bool) -> Result<()> {
    let text = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read {}", source))?
    };
    let report = app.pipeline()?.ingest_text(&text)?;
    print_report(&report, source, format, use_color)
}

pub fn run_image(app: &App, path: &Path, format: &OutputFormat, use_color: bool) -> Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let report = app.pipeline()?.ingest_image(&bytes)?;
    print_report(&report, &path.display().to_string(), format, use_color)
}

#[derive(Serialize)]
struct IndexOutput<'a> {
    source: &'a str,
    #[serde(flatten)]
    report: &'a IngestReport,
}

fn print_report(
    report: &IngestReport,
    source: &str,
    format: &OutputFormat,
    use_color: bool,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let output = IndexOutput { source, report };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            println!(
                "{} {}",
                paint("Indexed", Color::GREEN, use_color),
                source
            );
            println!("  text fragments:  {}", report.text_fragments);
            println!("  image fragments: {}", report.image_fragments);
            for skipped in &report.skipped_images {
                println!(
                    "  {} image {} on page {}: {}",
                    paint("skipped", Color::YELLOW, use_color),
                    skipped.position,
                    skipped.page,
                    skipped.reason
                );
            }
        }
    }
    Ok(())
}
