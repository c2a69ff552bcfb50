use anyhow::Result;

use sightline_lib::rag::lock;

use crate::app::App;
use crate::OutputFormat;

pub fn run(app: &App, format: &OutputFormat) -> Result<()> {
    let mut kb = lock(&app.knowledge_base)?;
    let removed = kb.count()?;
    kb.clear()?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "collection": kb.collection(),
                "removed": removed,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            println!("Removed {} fragments from '{}'", removed, kb.collection());
        }
    }

    Ok(())
}
