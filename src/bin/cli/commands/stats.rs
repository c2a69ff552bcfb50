use anyhow::Result;

use sightline_lib::rag::lock;

use crate::app::App;
use crate::OutputFormat;

pub fn run(app: &App, format: &OutputFormat) -> Result<()> {
    let stats = lock(&app.knowledge_base)?.stats()?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        OutputFormat::Plain => {
            println!("Collection:  {}", stats.collection);
            println!("Dimension:   {}", stats.dimension);
            println!("Fragments:   {}", stats.fragment_count);
            println!("  text:      {}", stats.text_count);
            println!("  image:     {}", stats.image_count);
            println!("Image blobs: {}", stats.image_blob_count);
        }
    }

    Ok(())
}
