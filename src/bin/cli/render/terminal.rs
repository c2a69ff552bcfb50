use sightline_lib::rag::{ContentKind, RetrievedRecord, DEFAULT_PREVIEW_CHARS};

/// ANSI color codes
pub struct Color;

impl Color {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const CYAN: &str = "\x1b[36m";
}

const WRAP_WIDTH: usize = 96;

/// Wrap `text` in a color when enabled.
pub fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("{}{}{}", color, text, Color::RESET)
    } else {
        text.to_string()
    }
}

/// Render ranked records as numbered citations.
pub fn render_records(records: &[RetrievedRecord], use_color: bool) -> String {
    let mut lines = Vec::new();

    for (rank, record) in records.iter().enumerate() {
        let label = match record.kind() {
            ContentKind::Text => paint("text ", Color::CYAN, use_color),
            ContentKind::Image => paint("image", Color::YELLOW, use_color),
        };
        let header = format!(
            "{} {} page {:<4} {}",
            paint(&format!("[{}]", rank + 1), Color::BOLD, use_color),
            label,
            record.page(),
            paint(&format!("distance {:.4}", record.distance), Color::DIM, use_color),
        );
        lines.push(header);
        lines.extend(wrap_lines(&record.preview(DEFAULT_PREVIEW_CHARS), "    ", WRAP_WIDTH));
        lines.push(String::new()); // blank line between records
    }

    // Remove trailing blank line
    while lines.last().map_or(false, |l| l.is_empty()) {
        lines.pop();
    }

    lines.join("\n")
}

fn wrap_lines(text: &str, prefix: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let effective_width = max_width.saturating_sub(prefix.len());

    for line in text.lines() {
        if line.chars().count() <= effective_width {
            lines.push(format!("{}{}", prefix, line));
        } else {
            // Simple word wrap
            let mut current_line = String::new();
            for word in line.split_whitespace() {
                if current_line.is_empty() {
                    current_line = word.to_string();
                } else if current_line.chars().count() + 1 + word.chars().count() <= effective_width {
                    current_line.push(' ');
                    current_line.push_str(word);
                } else {
                    lines.push(format!("{}{}", prefix, current_line));
                    current_line = word.to_string();
                }
            }
            if !current_line.is_empty() {
                lines.push(format!("{}{}", prefix, current_line));
            }
        }
    }

    if lines.is_empty() && !text.is_empty() {
        lines.push(format!("{}{}", prefix, text));
    }

    lines
}
