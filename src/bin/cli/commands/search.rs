use anyhow::Result;

use sightline_lib::rag::DEFAULT_PREVIEW_CHARS;

use crate::app::App;
use crate::render::terminal::render_records;
use crate::OutputFormat;

pub fn run(
    app: &App,
    query: &str,
    k: Option<usize>,
    format: &OutputFormat,
    use_color: bool,
) -> Result<()> {
    let retriever = app.retriever()?;
    let records = retriever.retrieve_k(query, k.unwrap_or(retriever.top_k()))?;

    match format {
        OutputFormat::Json => {
            let output: Vec<serde_json::Value> = records
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "id": r.id,
                        "kind": r.kind(),
                        "page": r.page(),
                        "distance": r.distance,
                        "imageRef": r.fragment.image_ref(),
                        "preview": r.preview(DEFAULT_PREVIEW_CHARS),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            if records.is_empty() {
                println!("No results found for '{}'.", query);
                return Ok(());
            }
            println!("{}", render_records(&records, use_color));
            println!("\n{} results", records.len());
        }
    }

    Ok(())
}
