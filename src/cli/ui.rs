use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Text roles used across the reports.
pub enum StyleType {
    Title,
    Label,
    Gain,
    Loss,
    Note,
}

pub fn style_text(text: &str, style_type: StyleType) -> String {
    let styled = match style_type {
        StyleType::Title => style(text).bold().underlined(),
        StyleType::Label => style(text).bold(),
        StyleType::Gain => style(text).green().bold(),
        StyleType::Loss => style(text).red().bold(),
        StyleType::Note => style(text).dim(),
    };
    styled.to_string()
}

/// Rounded UTF-8 table that wraps to the terminal width.
pub fn new_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn numeric_cell(text: String) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Right)
}

/// `None` renders as a grey "N/A".
pub fn format_optional_cell<T>(value: Option<T>, format_fn: impl Fn(T) -> String) -> Cell {
    match value {
        Some(v) => numeric_cell(format_fn(v)),
        None => numeric_cell("N/A".to_string()).fg(Color::DarkGrey),
    }
}

pub fn money_cell(value: f64) -> Cell {
    numeric_cell(format_money(value))
}

/// Percentage, green when non-negative and red otherwise.
pub fn return_cell(rate_pct: f64) -> Cell {
    let color = if rate_pct >= 0.0 { Color::Green } else { Color::Red };
    numeric_cell(format!("{rate_pct:.2}%")).fg(color)
}

/// Red cell for a position that could not be simulated.
pub fn skipped_cell(text: &str) -> Cell {
    Cell::new(text).fg(Color::Red)
}

/// Two decimals with thousands separators, e.g. `12,345.60`.
pub fn format_money(value: f64) -> String {
    let formatted = format!("{:.2}", value.abs());
    let (whole, fraction) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if value < 0.0 && formatted != "0.00" { "-" } else { "" };
    format!("{sign}{grouped}.{fraction}")
}

/// One `label  value` line of a KPI block.
pub fn kpi_line(label: &str, value: &str) -> String {
    format!("{:<32} {}", style_text(label, StyleType::Label), value)
}

/// Progress bar for concurrent price downloads.
pub fn fetch_progress_bar(len: u64, message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(message);
    pb
}

/// Prints a rule across the terminal, 80 columns when the width is unknown.
pub fn print_separator() {
    let term_width = console::Term::stdout()
        .size_checked()
        .map_or(80, |(_, w)| w as usize);
    println!("\n{}", "─".repeat(term_width));
}
