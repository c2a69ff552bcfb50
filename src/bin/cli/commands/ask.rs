use anyhow::Result;

use crate::app::App;
use crate::render::terminal::{paint, render_records, Color};
use crate::OutputFormat;

pub fn run(
    app: &App,
    question: &str,
    k: Option<usize>,
    format: &OutputFormat,
    use_color: bool,
) -> Result<()> {
    let generator = app.generator()?;
    let k = k.unwrap_or(generator.retriever().top_k());
    let answer = generator.answer_k(question, k)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&answer)?);
        }
        OutputFormat::Plain => {
            println!("{}", answer.text.trim());
            if !answer.evidence.is_empty() {
                println!("\n{}", paint("Sources", Color::BOLD, use_color));
                println!("{}", render_records(&answer.evidence, use_color));
            }
        }
    }

    Ok(())
}
